use std::str::FromStr;

use bitcoin::hashes::Hash;
use bitcoin::Txid;
use cosmwasm_std::{Decimal, DepsMut, Env, Event, MessageInfo, Response, Storage};

use babylon_apis::btc_staking_api::{
    BtcUndelegate, CovenantAdaptorSignatures, CovenantSignatures, EditFinalityProvider,
    InclusionProof, NewBtcDelegation, NewFinalityProvider, SignatureInfo,
};
use babylon_apis::error::StakingApiError;
use babylon_apis::events::StakingEvent;
use babylon_apis::Validate;
use babylon_bitcoin::merkle::{split_proof, verify_merkle_proof};
use babylon_bitcoin::BlockHash;
use babylon_btcstaking::pop::{fp_pop_context, staker_pop_context};
use babylon_btcstaking::PopMessage;

use crate::error::ContractError;
use crate::state::config::{ADMIN, CONFIG};
use crate::state::light_client::{get_header_by_hash, get_tip, BtcHeaderInfo};
use crate::state::params::{
    get_latest_params, get_params_at_btc_height, get_params_by_version, parse_x_only,
};
use crate::state::staking::{
    fps, get_delegation, get_fp, insert_delegation, parse_tx_hash, touch, tx_hash_hex,
    BtcDelegation, CommissionInfo, DelegatorUnbondingInfo, FinalityProvider,
    FinalityProviderState, UndelegationInfo, ALLOWED_STAKING_TXS, DELEGATIONS, EXPIRY_QUEUE,
    FPS, FP_BY_BSN, INCLUSIONS,
};
use crate::validation::{
    decode_tx, verify_covenant_sigs, verify_new_delegation, verify_pop, verify_stake_spend,
};

/// Minimum time between two commission rate changes, in seconds
pub const COMMISSION_UPDATE_INTERVAL: u64 = 24 * 60 * 60;

/// handle_create_fp handles registering a new finality provider
pub fn handle_create_fp(
    deps: DepsMut,
    env: &Env,
    new_fp: &NewFinalityProvider,
) -> Result<Response, ContractError> {
    // validate the finality provider data
    new_fp.validate()?;
    // Avoid overwriting existing finality providers
    if FPS.has(deps.storage, &new_fp.btc_pk_hex) {
        return Err(ContractError::FpAlreadyRegistered(
            new_fp.btc_pk_hex.clone(),
        ));
    }
    let min_commission_rate = get_latest_params(deps.storage)?
        .map(|(_, params)| params.min_commission_rate)
        .unwrap_or_default();
    if new_fp.commission.rate < min_commission_rate {
        return Err(ContractError::CommissionLtMin(
            new_fp.commission.rate,
            min_commission_rate,
        ));
    }

    // the finality provider proves it controls its BTC key on behalf of its address
    let cfg = CONFIG.load(deps.storage)?;
    let addr = deps.api.addr_validate(&new_fp.addr)?;
    let canonical_addr = deps.api.addr_canonicalize(addr.as_str())?;
    let pop_msg = PopMessage::new(
        &fp_pop_context(&env.block.chain_id, env.contract.address.as_str()),
        addr.as_str(),
        canonical_addr.as_slice(),
    );
    verify_pop(
        cfg.network,
        &parse_x_only(&new_fp.btc_pk_hex)?,
        new_fp.pop.as_ref(),
        &pop_msg,
    )?;

    let fp = FinalityProvider {
        addr: addr.to_string(),
        description: new_fp.description.clone(),
        commission: CommissionInfo {
            rate: new_fp.commission.rate,
            max_rate: new_fp.commission.max_rate,
            max_change_rate: new_fp.commission.max_change_rate,
            update_time: env.block.time.seconds(),
        },
        btc_pk_hex: new_fp.btc_pk_hex.clone(),
        pop: new_fp.pop.clone(),
        bsn_id: new_fp.bsn_id.clone(),
        jailed: false,
        slashed_btc_height: None,
        slashed_height: None,
        highest_voted_height: 0,
    };
    FPS.save(deps.storage, &fp.btc_pk_hex, &fp)?;
    FP_BY_BSN.save(
        deps.storage,
        (fp.bsn_id.as_str(), fp.btc_pk_hex.as_str()),
        &(),
    )?;
    fps().save(
        deps.storage,
        &fp.btc_pk_hex,
        &FinalityProviderState::default(),
        env.block.height,
    )?;

    Ok(Response::new()
        .add_attribute("action", "create_finality_provider")
        .add_event(StakingEvent::FinalityProviderCreated {
            btc_pk_hex: fp.btc_pk_hex,
            addr: fp.addr,
            bsn_id: fp.bsn_id,
        }))
}

/// handle_edit_fp updates the description and commission rate of a finality provider.
/// Only the finality provider's own address can edit it.
pub fn handle_edit_fp(
    deps: DepsMut,
    env: &Env,
    info: &MessageInfo,
    edit: &EditFinalityProvider,
) -> Result<Response, ContractError> {
    edit.validate()?;
    let mut fp = get_fp(deps.storage, &edit.btc_pk_hex)?;
    if info.sender.as_str() != fp.addr || edit.addr != fp.addr {
        return Err(ContractError::Unauthorized);
    }

    if let Some(description) = &edit.description {
        fp.description = Some(description.clone());
    }
    if let Some(rate) = edit.commission {
        let min_commission_rate = get_latest_params(deps.storage)?
            .map(|(_, params)| params.min_commission_rate)
            .unwrap_or_default();
        fp.commission = updated_commission(
            &fp.commission,
            rate,
            min_commission_rate,
            env.block.time.seconds(),
        )?;
    }
    FPS.save(deps.storage, &fp.btc_pk_hex, &fp)?;

    Ok(Response::new()
        .add_attribute("action", "edit_finality_provider")
        .add_event(StakingEvent::FinalityProviderEdited {
            btc_pk_hex: fp.btc_pk_hex,
        }))
}

fn updated_commission(
    current: &CommissionInfo,
    rate: Decimal,
    min_rate: Decimal,
    now: u64,
) -> Result<CommissionInfo, ContractError> {
    if rate > current.max_rate {
        return Err(ContractError::CommissionGtMax(rate, current.max_rate));
    }
    if rate < min_rate {
        return Err(ContractError::CommissionLtMin(rate, min_rate));
    }
    let change = if rate > current.rate {
        rate - current.rate
    } else {
        current.rate - rate
    };
    if change > current.max_change_rate {
        return Err(ContractError::CommissionChangeTooLarge(
            current.max_change_rate,
        ));
    }
    if now < current.update_time.saturating_add(COMMISSION_UPDATE_INTERVAL) {
        return Err(ContractError::CommissionUpdateTooSoon(current.update_time));
    }
    Ok(CommissionInfo {
        rate,
        update_time: now,
        ..current.clone()
    })
}

/// new_delegation is the stored form of an accepted delegation request, before any covenant
/// signature or inclusion proof
pub(crate) fn new_delegation(
    msg: &NewBtcDelegation,
    staking_output_idx: u32,
    params_version: u32,
) -> BtcDelegation {
    BtcDelegation {
        staker_addr: msg.staker_addr.clone(),
        btc_pk_hex: msg.btc_pk_hex.clone(),
        fp_btc_pk_list: msg.fp_btc_pk_list.clone(),
        start_height: 0,
        end_height: 0,
        total_sat: msg.staking_value,
        staking_time: msg.staking_time,
        staking_tx: msg.staking_tx.clone(),
        staking_output_idx,
        slashing_tx: msg.slashing_tx.clone(),
        delegator_slashing_sig: msg.delegator_slashing_sig.clone(),
        covenant_sigs: vec![],
        unbonding_time: msg.unbonding_time,
        undelegation_info: UndelegationInfo {
            unbonding_tx: msg.unbonding_tx.clone(),
            delegator_unbonding_info: None,
            covenant_unbonding_sig_list: vec![],
            slashing_tx: msg.unbonding_slashing_tx.clone(),
            delegator_slashing_sig: msg.delegator_unbonding_slashing_sig.clone(),
            covenant_slashing_sigs: vec![],
        },
        params_version,
    }
}

fn map_validate_err(err: StakingApiError) -> ContractError {
    match err {
        StakingApiError::EmptyBtcPkList => ContractError::EmptyFpList,
        StakingApiError::DuplicatedBtcPk(pk) => ContractError::DuplicatedFp(pk),
        err => ContractError::StakingApi(err),
    }
}

/// handle_create_delegation handles a new BTC delegation request.
///
/// The delegation is validated against the params version active at the current BTC tip and
/// stored as pending. It only gains voting power once it has a covenant quorum and an
/// inclusion proof.
pub fn handle_create_delegation(
    deps: DepsMut,
    env: &Env,
    msg: &NewBtcDelegation,
) -> Result<Response, ContractError> {
    // Basic stateless checks
    msg.validate().map_err(map_validate_err)?;

    let cfg = CONFIG.load(deps.storage)?;
    let tip = get_tip(deps.storage)?;
    let (params_version, params) = get_params_at_btc_height(deps.storage, tip.height)?;
    if msg.fp_btc_pk_list.len() > params.max_finality_providers as usize {
        return Err(ContractError::TooManyFps(
            msg.fp_btc_pk_list.len(),
            params.max_finality_providers,
        ));
    }

    let staking_tx_hash = decode_tx(&msg.staking_tx)?.compute_txid();
    let hash = staking_tx_hash.to_byte_array();
    if cfg.allow_list_active(env.block.height) && !ALLOWED_STAKING_TXS.has(deps.storage, &hash)
    {
        return Err(ContractError::StakingTxNotAllowed(
            staking_tx_hash.to_string(),
        ));
    }
    // Check staking tx is not duplicated
    if DELEGATIONS.has(deps.storage, &hash) {
        return Err(ContractError::ReusedStakingTx(staking_tx_hash.to_string()));
    }
    for fp_btc_pk in &msg.fp_btc_pk_list {
        if get_fp(deps.storage, fp_btc_pk)?.is_slashed() {
            return Err(ContractError::FpAlreadySlashed(fp_btc_pk.clone()));
        }
    }

    let staker_addr = deps.api.addr_validate(&msg.staker_addr)?;
    let canonical_addr = deps.api.addr_canonicalize(staker_addr.as_str())?;
    let pop_msg = PopMessage::new(
        &staker_pop_context(&env.block.chain_id, env.contract.address.as_str()),
        staker_addr.as_str(),
        canonical_addr.as_slice(),
    );
    let min_unbonding_time = params
        .unbonding_time_blocks
        .max(cfg.checkpoint_finalization_timeout);
    let txs = verify_new_delegation(cfg.network, &params, min_unbonding_time, msg, &pop_msg)?;

    let mut delegation = new_delegation(msg, txs.staking_output_idx, params_version);
    let mut events: Vec<Event> = vec![StakingEvent::DelegationCreated {
        staking_tx_hash: staking_tx_hash.to_string(),
        staker_addr: delegation.staker_addr.clone(),
        fp_btc_pk_list: delegation.fp_btc_pk_list.clone(),
        total_sat: delegation.total_sat,
        params_version,
    }
    .into()];
    if let Some(proof) = &msg.staking_tx_inclusion_proof {
        events.push(apply_inclusion_proof(
            deps.storage,
            &hash,
            &mut delegation,
            proof,
        )?);
    }
    insert_delegation(deps.storage, &hash, &delegation)?;

    Ok(Response::new()
        .add_attribute("action", "create_btc_delegation")
        .add_attribute("staking_tx_hash", staking_tx_hash.to_string())
        .add_events(events))
}

/// handle_covenant_sigs adds the signatures of one covenant member to a delegation
pub fn handle_covenant_sigs(
    deps: DepsMut,
    sigs: &CovenantSignatures,
) -> Result<Response, ContractError> {
    sigs.validate()?;
    let hash = parse_tx_hash(&sigs.staking_tx_hash)?;
    let mut del = get_delegation(deps.storage, &hash)?;
    let params = get_params_by_version(deps.storage, del.params_version)?;

    if !params.has_covenant_pk(&sigs.cov_pk_hex) {
        return Err(ContractError::InvalidCovenantPk(sigs.cov_pk_hex.clone()));
    }
    let cov_pk = hex::decode(&sigs.cov_pk_hex)?;
    if del.has_covenant_sig_from(&cov_pk) {
        return Err(ContractError::DuplicatedCovenantSig(
            sigs.cov_pk_hex.clone(),
        ));
    }
    verify_covenant_sigs(&params, &del, sigs)?;

    let had_quorum = del.has_covenant_quorum(params.covenant_quorum);
    del.covenant_sigs.push(CovenantAdaptorSignatures {
        cov_pk: cov_pk.clone(),
        adaptor_sigs: sigs.slashing_tx_sigs.clone(),
    });
    del.undelegation_info
        .covenant_unbonding_sig_list
        .push(SignatureInfo {
            pk: cov_pk.clone(),
            sig: sigs.unbonding_tx_sig.clone(),
        });
    del.undelegation_info
        .covenant_slashing_sigs
        .push(CovenantAdaptorSignatures {
            cov_pk,
            adaptor_sigs: sigs.slashing_unbonding_tx_sigs.clone(),
        });
    DELEGATIONS.save(deps.storage, &hash, &del)?;

    let staking_tx_hash = tx_hash_hex(&hash);
    let mut res = Response::new()
        .add_attribute("action", "add_covenant_sigs")
        .add_event(StakingEvent::CovenantSignatureReceived {
            staking_tx_hash: staking_tx_hash.clone(),
            cov_pk_hex: sigs.cov_pk_hex.clone(),
        });
    if !had_quorum && del.has_covenant_quorum(params.covenant_quorum) {
        touch(deps.storage, &hash)?;
        res = res.add_event(StakingEvent::CovenantQuorumReached { staking_tx_hash });
    }
    Ok(res)
}

/// verify_inclusion checks that `txid` is committed to by a block of the canonical BTC chain,
/// returning that block
pub fn verify_inclusion(
    storage: &dyn Storage,
    txid: &Txid,
    proof: &InclusionProof,
) -> Result<BtcHeaderInfo, ContractError> {
    let block_hash = BlockHash::from_str(&proof.block_hash_hex)?;
    let header = get_header_by_hash(storage, block_hash.as_byte_array()).map_err(|_| {
        ContractError::InvalidInclusionProof(format!(
            "block {} is not on the canonical BTC chain",
            proof.block_hash_hex
        ))
    })?;
    let merkle_root = header.block_header()?.merkle_root;
    let proof_hashes = split_proof(&proof.proof)?;
    if !verify_merkle_proof(txid, &proof_hashes, proof.tx_index as usize, &merkle_root) {
        return Err(ContractError::InvalidInclusionProof(format!(
            "tx {} is not at index {} of block {}",
            txid, proof.tx_index, proof.block_hash_hex
        )));
    }
    Ok(header)
}

/// apply_inclusion_proof sets the BTC time window of a delegation from the block including its
/// staking tx
fn apply_inclusion_proof(
    storage: &mut dyn Storage,
    hash: &[u8],
    del: &mut BtcDelegation,
    proof: &InclusionProof,
) -> Result<Event, ContractError> {
    proof.validate()?;
    let staking_txid = decode_tx(&del.staking_tx)?.compute_txid();
    let header = verify_inclusion(storage, &staking_txid, proof)?;

    del.start_height = header.height;
    del.end_height = header.height + del.staking_time;
    INCLUSIONS.save(storage, (del.start_height, hash), &())?;
    EXPIRY_QUEUE.save(storage, (del.expiry_height(), hash), &())?;
    touch(storage, hash)?;

    Ok(StakingEvent::InclusionProofReceived {
        staking_tx_hash: tx_hash_hex(hash),
        start_height: del.start_height,
        end_height: del.end_height,
    }
    .into())
}

/// handle_inclusion_proof handles a late inclusion proof for a pending or verified delegation
pub fn handle_inclusion_proof(
    deps: DepsMut,
    staking_tx_hash: &str,
    proof: &InclusionProof,
) -> Result<Response, ContractError> {
    let hash = parse_tx_hash(staking_tx_hash)?;
    let mut del = get_delegation(deps.storage, &hash)?;
    if del.has_inclusion_proof() {
        return Err(ContractError::InclusionProofAlreadySet(
            staking_tx_hash.to_string(),
        ));
    }
    let event = apply_inclusion_proof(deps.storage, &hash, &mut del, proof)?;
    DELEGATIONS.save(deps.storage, &hash, &del)?;

    Ok(Response::new()
        .add_attribute("action", "add_btc_delegation_inclusion_proof")
        .add_event(event))
}

/// handle_undelegate marks a delegation unbonded once its staking output is seen spent through
/// the unbonding path in a k-deep BTC block
pub fn handle_undelegate(deps: DepsMut, msg: &BtcUndelegate) -> Result<Response, ContractError> {
    msg.validate()?;
    let hash = parse_tx_hash(&msg.staking_tx_hash)?;
    let mut del = get_delegation(deps.storage, &hash)?;
    if del.is_unbonded_early() {
        return Err(ContractError::InvalidUndelegationRequest(
            "delegation is already unbonded".to_string(),
        ));
    }

    let cfg = CONFIG.load(deps.storage)?;
    let params = get_params_by_version(deps.storage, del.params_version)?;
    let spend_tx = decode_tx(&msg.stake_spending_tx)?;
    let funding_txs = msg
        .funding_transactions
        .iter()
        .map(|tx| decode_tx(tx))
        .collect::<Result<Vec<_>, _>>()?;

    let spend_txid = spend_tx.compute_txid();
    let header = verify_inclusion(
        deps.storage,
        &spend_txid,
        &msg.stake_spending_tx_inclusion_proof,
    )?;
    let tip = get_tip(deps.storage)?;
    if tip.height + 1 < header.height + cfg.btc_confirmation_depth {
        return Err(ContractError::InvalidUndelegationRequest(format!(
            "spending tx block {} is not {}-deep",
            header.height, cfg.btc_confirmation_depth
        )));
    }
    verify_stake_spend(&params, &del, &spend_tx, &funding_txs)?;

    del.undelegation_info.delegator_unbonding_info = Some(DelegatorUnbondingInfo {
        spend_stake_tx: msg.stake_spending_tx.clone(),
    });
    DELEGATIONS.save(deps.storage, &hash, &del)?;
    touch(deps.storage, &hash)?;

    Ok(Response::new()
        .add_attribute("action", "btc_undelegate")
        .add_event(StakingEvent::DelegationUnbondedEarly {
            staking_tx_hash: tx_hash_hex(&hash),
            spend_tx_hash: spend_txid.to_string(),
        }))
}

/// handle_add_allowed_staking_txs extends the allow list. Admin only
pub fn handle_add_allowed_staking_txs(
    deps: DepsMut,
    info: &MessageInfo,
    staking_tx_hashes: &[String],
) -> Result<Response, ContractError> {
    ADMIN
        .assert_admin(deps.as_ref(), &info.sender)
        .map_err(|_| ContractError::Unauthorized)?;
    for hash_hex in staking_tx_hashes {
        ALLOWED_STAKING_TXS.save(deps.storage, &parse_tx_hash(hash_hex)?, &())?;
    }
    Ok(Response::new()
        .add_attribute("action", "add_allowed_staking_txs")
        .add_attribute("count", staking_tx_hashes.len().to_string()))
}
