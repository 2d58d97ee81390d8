use cosmwasm_schema::cw_serde;
use cosmwasm_std::Order::{Ascending, Descending};
use cosmwasm_std::{StdResult, Storage, Uint256};
use cw_storage_plus::{Bound, Item, Map};

use babylon_apis::Bytes;
use babylon_bitcoin::{BlockHash, BlockHeader};

use crate::error::ContractError;

pub const BTC_HEADERS: Map<u32, BtcHeaderInfo> = Map::new("btc_lc_headers");
pub const BTC_HEADER_BASE: Item<BtcHeaderInfo> = Item::new("btc_lc_header_base");
pub const BTC_HEIGHTS: Map<&[u8], u32> = Map::new("btc_lc_heights");
pub const BTC_TIP: Item<BtcHeaderInfo> = Item::new("btc_lc_tip");

/// BtcHeaderInfo is a canonical BTC header together with its position in the chain
#[cw_serde]
pub struct BtcHeaderInfo {
    /// header is the consensus-encoded header
    pub header: Bytes,
    /// hash is the block hash in internal byte order
    pub hash: Bytes,
    pub height: u32,
    /// work is the cumulative work of the chain up to and including this header
    pub work: Uint256,
}

impl BtcHeaderInfo {
    pub fn new(block_header: &BlockHeader, height: u32, work: Uint256) -> Self {
        BtcHeaderInfo {
            header: babylon_bitcoin::serialize(block_header),
            hash: babylon_bitcoin::serialize(&block_header.block_hash()),
            height,
            work,
        }
    }

    pub fn block_header(&self) -> Result<BlockHeader, ContractError> {
        babylon_bitcoin::deserialize(&self.header).map_err(|_| ContractError::BtcHeaderDecodeError)
    }

    pub fn block_hash(&self) -> Result<BlockHash, ContractError> {
        babylon_bitcoin::deserialize(&self.hash).map_err(|_| ContractError::BtcHeaderDecodeError)
    }
}

// getter/setter for base header
pub fn get_base_header(storage: &dyn Storage) -> Result<BtcHeaderInfo, ContractError> {
    Ok(BTC_HEADER_BASE.load(storage)?)
}

// getter/setter for chain tip
pub fn get_tip(storage: &dyn Storage) -> Result<BtcHeaderInfo, ContractError> {
    Ok(BTC_TIP.load(storage)?)
}

pub fn set_tip(storage: &mut dyn Storage, tip: &BtcHeaderInfo) -> StdResult<()> {
    BTC_TIP.save(storage, tip)
}

// insert_headers inserts BTC headers that have passed the verification to the header chain
// storages, including
// - insert all headers
// - insert all hash-to-height indices
pub fn insert_headers(storage: &mut dyn Storage, new_headers: &[BtcHeaderInfo]) -> StdResult<()> {
    for new_header in new_headers.iter() {
        BTC_HEADERS.save(storage, new_header.height, new_header)?;
        BTC_HEIGHTS.save(storage, &new_header.hash, &new_header.height)?;
    }
    Ok(())
}

// remove_headers removes the BTC headers above `parent_header` up to `tip_header` from the
// header chain storages
pub fn remove_headers(
    storage: &mut dyn Storage,
    tip_header: &BtcHeaderInfo,
    parent_header: &BtcHeaderInfo,
) -> Result<(), ContractError> {
    let mut rem_header = tip_header.clone();
    while rem_header.hash != parent_header.hash {
        BTC_HEIGHTS.remove(storage, &rem_header.hash);
        BTC_HEADERS.remove(storage, rem_header.height);
        rem_header = get_header(storage, rem_header.height - 1)?;
    }
    Ok(())
}

// get_header retrieves the BTC header of a given height
pub fn get_header(storage: &dyn Storage, height: u32) -> Result<BtcHeaderInfo, ContractError> {
    BTC_HEADERS
        .may_load(storage, height)?
        .ok_or(ContractError::BtcHeightNotFound(height))
}

// get_header_by_hash retrieves the BTC header of a given hash
pub fn get_header_by_hash(
    storage: &dyn Storage,
    hash: &[u8],
) -> Result<BtcHeaderInfo, ContractError> {
    let height = get_header_height(storage, hash)?;
    get_header(storage, height)
}

// get_header_height retrieves the height of the canonical BTC header with the given hash
pub fn get_header_height(storage: &dyn Storage, hash: &[u8]) -> Result<u32, ContractError> {
    BTC_HEIGHTS
        .may_load(storage, hash)?
        .ok_or_else(|| ContractError::BtcHeaderNotFound(display_hash(hash)))
}

fn display_hash(hash: &[u8]) -> String {
    babylon_bitcoin::deserialize::<BlockHash>(hash)
        .map(|h| h.to_string())
        .unwrap_or_else(|_| hex::encode(hash))
}

// get_headers retrieves BTC headers in a given range
pub fn get_headers(
    storage: &dyn Storage,
    start_after: Option<u32>,
    limit: Option<u32>,
    reverse: Option<bool>,
) -> Result<Vec<BtcHeaderInfo>, ContractError> {
    let limit = limit.unwrap_or(10) as usize;
    let reverse = reverse.unwrap_or(false);

    let (start, end, order) = match (start_after, reverse) {
        (Some(start), true) => (None, Some(Bound::exclusive(start)), Descending),
        (Some(start), false) => (Some(Bound::exclusive(start)), None, Ascending),
        (None, true) => (None, None, Descending),
        (None, false) => (None, None, Ascending),
    };

    let headers = BTC_HEADERS
        .range(storage, start, end, order)
        .take(limit)
        .map(|item| item.map(|(_, header)| header))
        .collect::<StdResult<Vec<_>>>()?;

    Ok(headers)
}

/// verify_headers verifies whether `new_headers` are valid consecutive headers
/// after the given `first_header`
pub fn verify_headers(
    chain_params: &babylon_bitcoin::chain_params::Params,
    first_header: &BtcHeaderInfo,
    new_headers: &[BtcHeaderInfo],
) -> Result<(), ContractError> {
    let mut last_btc_header = first_header.block_header()?;
    for new_header in new_headers.iter() {
        let btc_header = new_header.block_header()?;
        babylon_bitcoin::pow::verify_next_header_pow(chain_params, &last_btc_header, &btc_header)
            .map_err(|_| ContractError::BtcHeaderError)?;
        last_btc_header = btc_header;
    }
    Ok(())
}
