#[cfg(not(feature = "library"))]
use cosmwasm_std::entry_point;
use cosmwasm_std::{
    to_json_binary, Deps, DepsMut, Empty, Env, MessageInfo, QueryResponse, Response, StdResult,
};
use cw2::set_contract_version;
use cw_utils::{maybe_addr, nonpayable};

use crate::error::ContractError;
use crate::msg::{ExecuteMsg, InstantiateMsg, QueryMsg, SudoMsg};
use crate::state::config::{Config, ADMIN, CONFIG};
use crate::state::params::save_params;
use crate::{finality, light_client, power, queries, staking};

pub const CONTRACT_NAME: &str = env!("CARGO_PKG_NAME");
pub const CONTRACT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn instantiate(
    mut deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    msg: InstantiateMsg,
) -> Result<Response, ContractError> {
    nonpayable(&info)?;
    msg.validate()?;

    let config = Config {
        network: msg.network,
        btc_confirmation_depth: msg.btc_confirmation_depth,
        checkpoint_finalization_timeout: msg.checkpoint_finalization_timeout,
        bsn_id: msg.bsn_id,
        allow_list_expiration_height: msg.allow_list_expiration_height,
    };
    CONFIG.save(deps.storage, &config)?;

    let api = deps.api;
    ADMIN.set(deps.branch(), maybe_addr(api, msg.admin)?)?;

    save_params(deps.storage, &msg.params)?;
    // the base header is the first tip, and expiries are processed from it on
    light_client::init(deps.storage, &msg.base_header)?;

    set_contract_version(deps.storage, CONTRACT_NAME, CONTRACT_VERSION)?;
    Ok(Response::new()
        .add_attribute("action", "instantiate")
        .add_attribute("base_height", msg.base_header.height.to_string()))
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn query(deps: Deps, _env: Env, msg: QueryMsg) -> Result<QueryResponse, ContractError> {
    match msg {
        QueryMsg::Config {} => Ok(to_json_binary(&queries::config(deps)?)?),
        QueryMsg::Admin {} => to_json_binary(&ADMIN.query_admin(deps)?).map_err(Into::into),
        QueryMsg::Params { version } => Ok(to_json_binary(&queries::params(deps, version)?)?),
        QueryMsg::ParamsAtBtcHeight { height } => Ok(to_json_binary(
            &queries::params_at_btc_height(deps, height)?,
        )?),
        QueryMsg::FinalityProvider { btc_pk_hex } => Ok(to_json_binary(
            &queries::finality_provider(deps, btc_pk_hex)?,
        )?),
        QueryMsg::FinalityProviders { start_after, limit } => Ok(to_json_binary(
            &queries::finality_providers(deps, start_after, limit)?,
        )?),
        QueryMsg::FinalityProvidersByBsn {
            bsn_id,
            start_after,
            limit,
        } => Ok(to_json_binary(&queries::finality_providers_by_bsn(
            deps,
            bsn_id,
            start_after,
            limit,
        )?)?),
        QueryMsg::FinalityProviderInfo { btc_pk_hex, height } => Ok(to_json_binary(
            &queries::finality_provider_info(deps, btc_pk_hex, height)?,
        )?),
        QueryMsg::FinalityProvidersByPower { start_after, limit } => Ok(to_json_binary(
            &queries::finality_providers_by_power(deps, start_after, limit)?,
        )?),
        QueryMsg::Delegation {
            staking_tx_hash_hex,
        } => Ok(to_json_binary(&queries::delegation(
            deps,
            staking_tx_hash_hex,
        )?)?),
        QueryMsg::Delegations {
            status,
            start_after,
            limit,
        } => Ok(to_json_binary(&queries::delegations(
            deps,
            status,
            start_after,
            limit,
        )?)?),
        QueryMsg::DelegationsByFp {
            btc_pk_hex,
            start_after,
            limit,
        } => Ok(to_json_binary(&queries::delegations_by_fp(
            deps,
            btc_pk_hex,
            start_after,
            limit,
        )?)?),
        QueryMsg::DelegationsByStaker {
            staker_addr,
            start_after,
            limit,
        } => Ok(to_json_binary(&queries::delegations_by_staker(
            deps,
            staker_addr,
            start_after,
            limit,
        )?)?),
        QueryMsg::LargestBtcReorg {} => Ok(to_json_binary(&queries::largest_btc_reorg(deps)?)?),
        QueryMsg::BtcBaseHeader {} => Ok(to_json_binary(&queries::btc_base_header(deps)?)?),
        QueryMsg::BtcTipHeader {} => Ok(to_json_binary(&queries::btc_tip_header(deps)?)?),
        QueryMsg::BtcHeader { height } => {
            Ok(to_json_binary(&queries::btc_header(deps, height)?)?)
        }
        QueryMsg::BtcHeaderByHash { hash } => {
            Ok(to_json_binary(&queries::btc_header_by_hash(deps, hash)?)?)
        }
        QueryMsg::BtcHeaders {
            start_after,
            limit,
            reverse,
        } => Ok(to_json_binary(&queries::btc_headers(
            deps,
            start_after,
            limit,
            reverse,
        )?)?),
        QueryMsg::SignedSlashingTx {
            staking_tx_hash_hex,
            fp_btc_pk_hex,
        } => Ok(to_json_binary(&queries::signed_slashing_tx(
            deps,
            staking_tx_hash_hex,
            fp_btc_pk_hex,
        )?)?),
    }
}

/// This is a no-op just to test how this integrates with wasmd
#[cfg_attr(not(feature = "library"), entry_point)]
pub fn migrate(_deps: DepsMut, _env: Env, _msg: Empty) -> StdResult<Response> {
    Ok(Response::default())
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn execute(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    msg: ExecuteMsg,
) -> Result<Response, ContractError> {
    let api = deps.api;
    match msg {
        ExecuteMsg::UpdateAdmin { admin } => ADMIN
            .execute_update_admin(deps, info, maybe_addr(api, admin)?)
            .map_err(Into::into),
        ExecuteMsg::UpdateParams { params } => handle_update_params(deps, &info, &params),
        ExecuteMsg::BtcHeaders { headers } => {
            light_client::handle_headers_msg(deps, &info, &headers)
        }
        ExecuteMsg::CreateFinalityProvider(new_fp) => {
            staking::handle_create_fp(deps, &env, &new_fp)
        }
        ExecuteMsg::EditFinalityProvider(edit) => {
            staking::handle_edit_fp(deps, &env, &info, &edit)
        }
        ExecuteMsg::CreateBtcDelegation(new_del) => {
            staking::handle_create_delegation(deps, &env, &new_del)
        }
        ExecuteMsg::AddCovenantSigs(sigs) => staking::handle_covenant_sigs(deps, &sigs),
        ExecuteMsg::AddBtcDelegationInclusionProof {
            staking_tx_hash,
            proof,
        } => staking::handle_inclusion_proof(deps, &staking_tx_hash, &proof),
        ExecuteMsg::BtcUndelegate(undelegate) => staking::handle_undelegate(deps, &undelegate),
        ExecuteMsg::SelectiveSlashingEvidence(evidence) => {
            finality::handle_selective_slashing_evidence(deps, &env, &evidence)
        }
        ExecuteMsg::AddAllowedStakingTxs { staking_tx_hashes } => {
            staking::handle_add_allowed_staking_txs(deps, &info, &staking_tx_hashes)
        }
    }
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn sudo(deps: DepsMut, env: Env, msg: SudoMsg) -> Result<Response, ContractError> {
    match msg {
        SudoMsg::BeginBlock {} => Ok(Response::new().add_attribute("action", "begin_block")),
        SudoMsg::EndBlock {} => power::handle_end_block(deps, &env),
        SudoMsg::SlashFp { evidence } => finality::handle_slash_fp(deps, &env, &evidence),
        SudoMsg::JailFp { fp_btc_pk_hex } => finality::handle_jail_fp(deps, &fp_btc_pk_hex),
        SudoMsg::UnjailFp { fp_btc_pk_hex } => finality::handle_unjail_fp(deps, &fp_btc_pk_hex),
        SudoMsg::RecordVote {
            fp_btc_pk_hex,
            height,
        } => finality::handle_record_vote(deps, &fp_btc_pk_hex, height),
    }
}

/// handle_update_params appends a new params version, governing delegations created once the
/// BTC tip reaches its activation height
fn handle_update_params(
    deps: DepsMut,
    info: &MessageInfo,
    params: &crate::state::params::Params,
) -> Result<Response, ContractError> {
    ADMIN
        .assert_admin(deps.as_ref(), &info.sender)
        .map_err(|_| ContractError::Unauthorized)?;
    let version = save_params(deps.storage, params)?;
    Ok(Response::new()
        .add_attribute("action", "update_params")
        .add_attribute("version", version.to_string())
        .add_attribute(
            "btc_activation_height",
            params.btc_activation_height.to_string(),
        ))
}
