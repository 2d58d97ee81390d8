use std::str::FromStr;

use cosmwasm_schema::cw_serde;
use cosmwasm_std::{StdError, Uint256};

use babylon_bitcoin::hash_types::TxMerkleNode;
use babylon_bitcoin::{work_to_uint256, BlockHash, BlockHeader};

use crate::error::ContractError;
use crate::state::light_client::BtcHeaderInfo;

/// Bitcoin header.
///
/// Contains all the block's information except the actual transactions, but
/// including a root of a merkle tree committing to all transactions in the block.
///
/// This struct is for use in RPC requests and responses. It converts to and from the
/// internal representation (`BlockHeader`).
#[cw_serde]
pub struct BtcHeader {
    /// Originally protocol version, but repurposed for soft-fork signaling.
    pub version: i32,
    /// Reference to the previous block in the chain.
    /// Encoded as a (byte-reversed) hex string.
    pub prev_blockhash: String,
    /// The root hash of the merkle tree of transactions in the block.
    /// Encoded as a (byte-reversed) hex string.
    pub merkle_root: String,
    pub time: u32,
    /// The target value below which the blockhash must lie, in compact form
    pub bits: u32,
    /// The nonce, selected to obtain a low enough blockhash.
    pub nonce: u32,
}

impl BtcHeader {
    /// to_btc_header_info extends a chain ending at `prev_height` with cumulative work
    /// `prev_work` by this header
    pub fn to_btc_header_info(
        &self,
        prev_height: u32,
        prev_work: Uint256,
    ) -> Result<BtcHeaderInfo, ContractError> {
        let block_header: BlockHeader = self.try_into()?;
        let work = prev_work
            .checked_add(work_to_uint256(block_header.work()))
            .map_err(StdError::from)?;
        Ok(BtcHeaderInfo::new(&block_header, prev_height + 1, work))
    }
}

impl From<&BlockHeader> for BtcHeader {
    fn from(block_header: &BlockHeader) -> Self {
        BtcHeader {
            version: block_header.version.to_consensus(),
            prev_blockhash: block_header.prev_blockhash.to_string(),
            merkle_root: block_header.merkle_root.to_string(),
            time: block_header.time,
            bits: block_header.bits.to_consensus(),
            nonce: block_header.nonce,
        }
    }
}

/// Try to convert &BtcHeader to/into BlockHeader
impl TryFrom<&BtcHeader> for BlockHeader {
    type Error = ContractError;
    fn try_from(btc_header: &BtcHeader) -> Result<Self, Self::Error> {
        Ok(BlockHeader {
            version: babylon_bitcoin::Version::from_consensus(btc_header.version),
            prev_blockhash: BlockHash::from_str(&btc_header.prev_blockhash)?,
            merkle_root: TxMerkleNode::from_str(&btc_header.merkle_root)?,
            time: btc_header.time,
            bits: babylon_bitcoin::CompactTarget::from_consensus(btc_header.bits),
            nonce: btc_header.nonce,
        })
    }
}

/// BaseHeader is the trusted header the light client starts from
#[cw_serde]
pub struct BaseHeader {
    pub header: BtcHeader,
    pub height: u32,
    /// total_work is the cumulative work of the chain up to and including this header
    pub total_work: Uint256,
}

impl BaseHeader {
    pub fn to_btc_header_info(&self) -> Result<BtcHeaderInfo, ContractError> {
        let block_header: BlockHeader = (&self.header).try_into()?;
        Ok(BtcHeaderInfo::new(&block_header, self.height, self.total_work))
    }
}

/// Response for a BTC header query
#[cw_serde]
pub struct BtcHeaderResponse {
    pub header: BtcHeader,
    /// hash is the block hash, in its (byte-reversed) display form
    pub hash: String,
    pub height: u32,
    pub work: Uint256,
}

impl TryFrom<&BtcHeaderInfo> for BtcHeaderResponse {
    type Error = ContractError;
    fn try_from(info: &BtcHeaderInfo) -> Result<Self, Self::Error> {
        let block_header = info.block_header()?;
        Ok(Self {
            header: BtcHeader::from(&block_header),
            hash: block_header.block_hash().to_string(),
            height: info.height,
            work: info.work,
        })
    }
}

#[cw_serde]
pub struct BtcHeadersResponse {
    pub headers: Vec<BtcHeaderResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use test_utils::TestChain;

    #[test]
    fn header_conversion_preserves_hash() {
        let mut chain = TestChain::new(0);
        let header = chain.extend(1)[0];
        let msg = BtcHeader::from(&header);
        let back: BlockHeader = (&msg).try_into().unwrap();
        assert_eq!(back.block_hash(), header.block_hash());
    }

    #[test]
    fn header_info_accumulates_work() {
        let mut chain = TestChain::new(10);
        let header = chain.extend(1)[0];
        let info = BtcHeader::from(&header)
            .to_btc_header_info(10, Uint256::from(5u8))
            .unwrap();
        assert_eq!(info.height, 11);
        assert_eq!(
            info.work,
            Uint256::from(5u8) + work_to_uint256(header.work())
        );
        let response = BtcHeaderResponse::try_from(&info).unwrap();
        assert_eq!(response.hash, header.block_hash().to_string());
    }

    #[test]
    fn malformed_hash_is_rejected() {
        let mut msg = BtcHeader::from(TestChain::new(0).base());
        msg.prev_blockhash = "zz".to_string();
        assert_matches!(
            BlockHeader::try_from(&msg),
            Err(ContractError::HashError(_))
        );
    }
}
