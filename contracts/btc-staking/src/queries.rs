use std::str::FromStr;

use bitcoin::hashes::Hash;
use cosmwasm_std::{Deps, Order, StdResult, Storage};
use cw_storage_plus::Bound;

use crate::error::ContractError;
use crate::msg::btc_header::{BtcHeaderResponse, BtcHeadersResponse};
use crate::msg::{
    DelegationResponse, DelegationsByFpResponse, DelegationsResponse, FinalityProviderInfo,
    FinalityProvidersByPowerResponse, FinalityProvidersResponse, ParamsResponse,
    SignedSlashingTxResponse,
};
use crate::state::config::{Config, CONFIG};
use crate::state::light_client::{
    get_base_header, get_header, get_header_by_hash, get_headers, get_tip,
};
use crate::state::params::{get_latest_params, get_params_at_btc_height, get_params_by_version};
use crate::state::reorg::{LargestBtcReorg, LARGEST_REORG};
use crate::state::staking::{
    fps, get_delegation, get_fp, parse_tx_hash, tx_hash_hex, BtcDelegation, DelegationStatus,
    FinalityProvider, FinalityProviderState, DELEGATIONS, DELEGATOR_DELEGATIONS, FPS,
    FP_BY_BSN, FP_DELEGATIONS, SIGNED_SLASHING_TXS,
};

// Settings for pagination
const MAX_LIMIT: u32 = 30;
const DEFAULT_LIMIT: u32 = 10;

pub fn config(deps: Deps) -> StdResult<Config> {
    CONFIG.load(deps.storage)
}

/// params returns the given params version, or the latest one
pub fn params(deps: Deps, version: Option<u32>) -> Result<ParamsResponse, ContractError> {
    let (version, params) = match version {
        Some(version) => (version, get_params_by_version(deps.storage, version)?),
        None => get_latest_params(deps.storage)?.ok_or(ContractError::ParamsVersionNotFound(0))?,
    };
    Ok(ParamsResponse { version, params })
}

pub fn params_at_btc_height(deps: Deps, height: u32) -> Result<ParamsResponse, ContractError> {
    let (version, params) = get_params_at_btc_height(deps.storage, height)?;
    Ok(ParamsResponse { version, params })
}

pub fn finality_provider(
    deps: Deps,
    btc_pk_hex: String,
) -> Result<FinalityProvider, ContractError> {
    get_fp(deps.storage, &btc_pk_hex)
}

pub fn finality_providers(
    deps: Deps,
    start_after: Option<String>,
    limit: Option<u32>,
) -> StdResult<FinalityProvidersResponse> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as usize;
    let start_after = start_after.as_deref().map(Bound::exclusive);
    let fps = FPS
        .range(deps.storage, start_after, None, Order::Ascending)
        .take(limit)
        .map(|item| item.map(|(_, v)| v))
        .collect::<StdResult<Vec<FinalityProvider>>>()?;
    Ok(FinalityProvidersResponse { fps })
}

/// finality_providers_by_bsn lists the finality providers securing `bsn_id`, by BTC PK
pub fn finality_providers_by_bsn(
    deps: Deps,
    bsn_id: String,
    start_after: Option<String>,
    limit: Option<u32>,
) -> StdResult<FinalityProvidersResponse> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as usize;
    let start_after = start_after.as_deref().map(Bound::exclusive);
    let fps = FP_BY_BSN
        .prefix(&bsn_id)
        .keys(deps.storage, start_after, None, Order::Ascending)
        .take(limit)
        .map(|btc_pk_hex| FPS.load(deps.storage, &btc_pk_hex?))
        .collect::<StdResult<Vec<FinalityProvider>>>()?;
    Ok(FinalityProvidersResponse { fps })
}

/// finality_provider_info returns the power a finality provider votes with.
///
/// Jailed finality providers have no power while jailed, and slashed ones from the slashing
/// height on. `height` selects a past staking-chain height.
pub fn finality_provider_info(
    deps: Deps,
    btc_pk_hex: String,
    height: Option<u64>,
) -> Result<FinalityProviderInfo, ContractError> {
    let fp = get_fp(deps.storage, &btc_pk_hex)?;
    let (fp_state, effective) = match height {
        Some(h) => (
            fps().may_load_at_height(deps.storage, &btc_pk_hex, h)?,
            fp.slashed_height.map(|slashed| h < slashed).unwrap_or(true),
        ),
        None => (
            fps().may_load(deps.storage, &btc_pk_hex)?,
            !fp.jailed && !fp.is_slashed(),
        ),
    };
    let power = if effective {
        fp_state.unwrap_or_default().power
    } else {
        0
    };

    Ok(FinalityProviderInfo { btc_pk_hex, power })
}

pub fn finality_providers_by_power(
    deps: Deps,
    start_after: Option<FinalityProviderInfo>,
    limit: Option<u32>,
) -> StdResult<FinalityProvidersByPowerResponse> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as usize;
    let start = start_after.map(|fpp| Bound::exclusive((fpp.power, fpp.btc_pk_hex.clone())));
    let fps = fps()
        .idx
        .power
        .range(deps.storage, None, start, Order::Descending)
        .take(limit)
        .map(|item| {
            let (btc_pk_hex, FinalityProviderState { power }) = item?;
            Ok(FinalityProviderInfo { btc_pk_hex, power })
        })
        .collect::<StdResult<Vec<_>>>()?;

    Ok(FinalityProvidersByPowerResponse { fps })
}

fn delegation_status(
    storage: &dyn Storage,
    btc_height: u32,
    del: &BtcDelegation,
) -> Result<DelegationStatus, ContractError> {
    let params = get_params_by_version(storage, del.params_version)?;
    Ok(del.get_status(btc_height, params.covenant_quorum))
}

/// Get the delegation info by staking tx hash, with its status at the current BTC tip.
/// `staking_tx_hash_hex`: The (reversed) staking tx hash, in hex
pub fn delegation(
    deps: Deps,
    staking_tx_hash_hex: String,
) -> Result<DelegationResponse, ContractError> {
    let hash = parse_tx_hash(&staking_tx_hash_hex)?;
    let delegation = get_delegation(deps.storage, &hash)?;
    let btc_height = get_tip(deps.storage)?.height;
    Ok(DelegationResponse {
        staking_tx_hash: tx_hash_hex(&hash),
        status: delegation_status(deps.storage, btc_height, &delegation)?,
        delegation,
    })
}

/// Get list of delegations, by internal staking tx hash.
/// `start_after`: The (reversed) associated staking tx hash of the delegation in hex, if provided.
/// `status`: List only the delegations with this status at the current BTC tip, if provided.
pub fn delegations(
    deps: Deps,
    status: Option<DelegationStatus>,
    start_after: Option<String>,
    limit: Option<u32>,
) -> Result<DelegationsResponse, ContractError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as usize;
    let start_after = start_after.as_deref().map(parse_tx_hash).transpose()?;
    let start_after = start_after.as_ref().map(|h| Bound::exclusive(h.as_slice()));
    let btc_height = get_tip(deps.storage)?.height;

    let mut delegations = vec![];
    for item in DELEGATIONS.range(deps.storage, start_after, None, Order::Ascending) {
        if delegations.len() == limit {
            break;
        }
        let (hash, delegation) = item?;
        let del_status = delegation_status(deps.storage, btc_height, &delegation)?;
        if status.map(|s| s == del_status).unwrap_or(true) {
            delegations.push(DelegationResponse {
                staking_tx_hash: tx_hash_hex(&hash),
                status: del_status,
                delegation,
            });
        }
    }
    Ok(DelegationsResponse { delegations })
}

/// Delegation hashes by FP query.
///
/// `btc_pk_hex`: The BTC public key of the finality provider, in hex
pub fn delegations_by_fp(
    deps: Deps,
    btc_pk_hex: String,
    start_after: Option<String>,
    limit: Option<u32>,
) -> Result<DelegationsByFpResponse, ContractError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as usize;
    let start_after = start_after.as_deref().map(parse_tx_hash).transpose()?;
    let start_after = start_after.as_ref().map(|h| Bound::exclusive(h.as_slice()));
    let hashes = FP_DELEGATIONS
        .prefix(&btc_pk_hex)
        .keys(deps.storage, start_after, None, Order::Ascending)
        .take(limit)
        .map(|hash| hash.map(|h| tx_hash_hex(&h)))
        .collect::<StdResult<Vec<_>>>()?;
    Ok(DelegationsByFpResponse { hashes })
}

/// Delegations of a staker, in submission order.
///
/// `start_after`: the position of the last delegation of the previous page
pub fn delegations_by_staker(
    deps: Deps,
    staker_addr: String,
    start_after: Option<u64>,
    limit: Option<u32>,
) -> Result<DelegationsResponse, ContractError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as usize;
    let start_after = start_after.map(Bound::exclusive);
    let btc_height = get_tip(deps.storage)?.height;
    let delegations = DELEGATOR_DELEGATIONS
        .prefix(&staker_addr)
        .range(deps.storage, start_after, None, Order::Ascending)
        .take(limit)
        .map(|item| {
            let (_, hash) = item?;
            let delegation = get_delegation(deps.storage, &hash)?;
            Ok(DelegationResponse {
                staking_tx_hash: tx_hash_hex(&hash),
                status: delegation_status(deps.storage, btc_height, &delegation)?,
                delegation,
            })
        })
        .collect::<Result<Vec<_>, ContractError>>()?;
    Ok(DelegationsResponse { delegations })
}

pub fn largest_btc_reorg(deps: Deps) -> StdResult<Option<LargestBtcReorg>> {
    LARGEST_REORG.may_load(deps.storage)
}

pub fn btc_base_header(deps: Deps) -> Result<BtcHeaderResponse, ContractError> {
    BtcHeaderResponse::try_from(&get_base_header(deps.storage)?)
}

pub fn btc_tip_header(deps: Deps) -> Result<BtcHeaderResponse, ContractError> {
    BtcHeaderResponse::try_from(&get_tip(deps.storage)?)
}

pub fn btc_header(deps: Deps, height: u32) -> Result<BtcHeaderResponse, ContractError> {
    BtcHeaderResponse::try_from(&get_header(deps.storage, height)?)
}

/// btc_header_by_hash looks a canonical header up by its (byte-reversed) hex hash
pub fn btc_header_by_hash(deps: Deps, hash: String) -> Result<BtcHeaderResponse, ContractError> {
    let hash = babylon_bitcoin::BlockHash::from_str(&hash)?;
    BtcHeaderResponse::try_from(&get_header_by_hash(deps.storage, hash.as_byte_array())?)
}

pub fn btc_headers(
    deps: Deps,
    start_after: Option<u32>,
    limit: Option<u32>,
    reverse: Option<bool>,
) -> Result<BtcHeadersResponse, ContractError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let headers = get_headers(deps.storage, start_after, Some(limit), reverse)?
        .iter()
        .map(BtcHeaderResponse::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(BtcHeadersResponse { headers })
}

pub fn signed_slashing_tx(
    deps: Deps,
    staking_tx_hash_hex: String,
    fp_btc_pk_hex: String,
) -> Result<SignedSlashingTxResponse, ContractError> {
    let hash = parse_tx_hash(&staking_tx_hash_hex)?;
    let tx = SIGNED_SLASHING_TXS
        .may_load(deps.storage, (hash.as_slice(), fp_btc_pk_hex.as_str()))?
        .ok_or_else(|| ContractError::DelegationNotFound(staking_tx_hash_hex.clone()))?;
    Ok(SignedSlashingTxResponse {
        signed_tx_hex: hex::encode(tx),
    })
}
