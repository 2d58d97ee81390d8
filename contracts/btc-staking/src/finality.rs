use bitcoin::consensus::serialize;
use bitcoin::secp256k1::SecretKey;
use bitcoin::{Transaction, XOnlyPublicKey};
use cosmwasm_std::{DepsMut, Env, Event, Order, Response, StdResult};

use babylon_apis::btc_staking_api::{Evidence, SelectiveSlashingEvidence};
use babylon_apis::error::StakingApiError;
use babylon_apis::events::StakingEvent;
use babylon_apis::Validate;
use babylon_btcstaking::witness::finalize_slashing_tx;
use babylon_btcstaking::AdaptorSignature;

use crate::error::ContractError;
use crate::state::light_client::get_tip;
use crate::state::params::{get_params_by_version, Params};
use crate::state::staking::{
    fps, get_delegation, get_fp, parse_tx_hash, tx_hash_hex, BtcDelegation, FP_DELEGATIONS, FPS,
    SIGNED_SLASHING_TXS,
};
use crate::validation::{decode_tx, recovered_fp_key, staking_info};

/// handle_selective_slashing_evidence slashes the finality provider whose secret key was revealed
/// through the slashing tx of one of its delegations
pub fn handle_selective_slashing_evidence(
    deps: DepsMut,
    env: &Env,
    evidence: &SelectiveSlashingEvidence,
) -> Result<Response, ContractError> {
    evidence.validate()?;
    let hash = parse_tx_hash(&evidence.staking_tx_hash)?;
    let del = get_delegation(deps.storage, &hash)?;
    let (fp_sk, fp_btc_pk_hex) = recovered_fp_key(evidence, &del.fp_btc_pk_list)?;

    let event = slash_fp(deps, env, &fp_btc_pk_hex, &fp_sk)?;
    Ok(Response::new()
        .add_attribute("action", "selective_slashing_evidence")
        .add_event(event))
}

/// handle_slash_fp slashes a finality provider that signed two conflicting blocks at the same
/// height, extracting its secret key from the two signatures
pub fn handle_slash_fp(
    deps: DepsMut,
    env: &Env,
    evidence: &Evidence,
) -> Result<Response, ContractError> {
    let fp_btc_pk_hex = hex::encode(&evidence.fp_btc_pk);
    let pk_bytes: [u8; 32] = evidence
        .fp_btc_pk
        .as_slice()
        .try_into()
        .map_err(|_| StakingApiError::InvalidBtcPk(fp_btc_pk_hex.clone()))?;
    let fp_pk = eots::PublicKey::from_bytes(pk_bytes)?;
    let eots_sk = fp_pk.extract_secret_key(
        &evidence.pub_rand,
        &Evidence::msg_to_sign(evidence.block_height, &evidence.canonical_app_hash),
        &evidence.canonical_finality_sig,
        &Evidence::msg_to_sign(evidence.block_height, &evidence.fork_app_hash),
        &evidence.fork_finality_sig,
    )?;
    let fp_sk = SecretKey::from_slice(&eots_sk.to_bytes())
        .map_err(|_| StakingApiError::InvalidBtcSk(32))?;

    let event = slash_fp(deps, env, &fp_btc_pk_hex, &fp_sk)?;
    Ok(Response::new()
        .add_attribute("action", "slash_fp")
        .add_attribute("block_height", evidence.block_height.to_string())
        .add_event(event))
}

/// slash_fp marks a finality provider slashed, drops its voting power and signs the slashing
/// txs of its delegations with the revealed key
fn slash_fp(
    deps: DepsMut,
    env: &Env,
    fp_btc_pk_hex: &str,
    fp_sk: &SecretKey,
) -> Result<Event, ContractError> {
    let mut fp = get_fp(deps.storage, fp_btc_pk_hex)?;
    if fp.is_slashed() {
        return Err(ContractError::FpAlreadySlashed(fp_btc_pk_hex.to_string()));
    }
    // every slashing tx is signed before anything is written
    let hashes = FP_DELEGATIONS
        .prefix(fp_btc_pk_hex)
        .keys(deps.storage, None, None, Order::Ascending)
        .collect::<StdResult<Vec<_>>>()?;
    let mut signed = Vec::with_capacity(hashes.len());
    for hash in hashes {
        let del = get_delegation(deps.storage, &hash)?;
        let params = get_params_by_version(deps.storage, del.params_version)?;
        if del.is_unbonded_early() || !del.has_covenant_quorum(params.covenant_quorum) {
            continue;
        }
        let tx = signed_slashing_tx(&params, &del, fp_btc_pk_hex, fp_sk).map_err(|err| {
            deps.api.debug(&format!(
                "cannot sign slashing tx of delegation {}: {}",
                tx_hash_hex(&hash),
                err
            ));
            err
        })?;
        signed.push((hash, tx));
    }

    let btc_height = get_tip(deps.storage)?.height;
    fp.slashed_btc_height = Some(btc_height);
    fp.slashed_height = Some(env.block.height);
    FPS.save(deps.storage, fp_btc_pk_hex, &fp)?;

    // a slashed finality provider never regains power
    fps().update(deps.storage, fp_btc_pk_hex, env.block.height, |state| {
        let mut state = state.unwrap_or_default();
        state.power = 0;
        Ok::<_, ContractError>(state)
    })?;

    for (hash, tx) in signed {
        SIGNED_SLASHING_TXS.save(
            deps.storage,
            (hash.as_slice(), fp_btc_pk_hex),
            &serialize(&tx),
        )?;
    }

    Ok(StakingEvent::FpSlashed {
        btc_pk_hex: fp_btc_pk_hex.to_string(),
        btc_height,
    }
    .into())
}

/// signed_slashing_tx completes the slashing tx of a delegation with the finality provider
/// signature and the decrypted covenant adaptor signatures
fn signed_slashing_tx(
    params: &Params,
    del: &BtcDelegation,
    fp_btc_pk_hex: &str,
    fp_sk: &SecretKey,
) -> Result<Transaction, ContractError> {
    let fp_idx = del
        .fp_btc_pk_list
        .iter()
        .position(|pk| pk == fp_btc_pk_hex)
        .ok_or_else(|| ContractError::FpNotInDelegation(fp_btc_pk_hex.to_string(), String::new()))?;
    let covenant_sigs = del
        .covenant_sigs
        .iter()
        .map(|cov| {
            let cov_pk = XOnlyPublicKey::from_slice(&cov.cov_pk)
                .map_err(|_| ContractError::InvalidCovenantPk(hex::encode(&cov.cov_pk)))?;
            let asig = cov.adaptor_sigs.get(fp_idx).ok_or_else(|| {
                ContractError::InvalidCovenantSig("missing adaptor signature".to_string())
            })?;
            let asig = AdaptorSignature::new(asig)
                .map_err(|e| ContractError::InvalidCovenantSig(e.to_string()))?;
            Ok((cov_pk, asig))
        })
        .collect::<Result<Vec<_>, ContractError>>()?;

    let slashing_tx = decode_tx(&del.slashing_tx)?;
    finalize_slashing_tx(
        &slashing_tx,
        &staking_info(params, del)?,
        &del.delegator_slashing_sig,
        fp_sk,
        &covenant_sigs,
    )
    .map_err(|e| ContractError::InvalidSlashingTx(e.to_string()))
}

/// handle_jail_fp takes the voting power of a finality provider away until it is unjailed.
/// Its delegations keep counting towards its cached power meanwhile.
pub fn handle_jail_fp(deps: DepsMut, fp_btc_pk_hex: &str) -> Result<Response, ContractError> {
    let mut fp = get_fp(deps.storage, fp_btc_pk_hex)?;
    if fp.jailed {
        return Err(ContractError::FpAlreadyJailed(fp_btc_pk_hex.to_string()));
    }
    fp.jailed = true;
    FPS.save(deps.storage, fp_btc_pk_hex, &fp)?;
    Ok(Response::new()
        .add_attribute("action", "jail_fp")
        .add_event(StakingEvent::FpJailed {
            btc_pk_hex: fp.btc_pk_hex,
        }))
}

pub fn handle_unjail_fp(deps: DepsMut, fp_btc_pk_hex: &str) -> Result<Response, ContractError> {
    let mut fp = get_fp(deps.storage, fp_btc_pk_hex)?;
    if !fp.jailed {
        return Err(ContractError::FpNotJailed(fp_btc_pk_hex.to_string()));
    }
    if fp.is_slashed() {
        return Err(ContractError::FpAlreadySlashed(fp_btc_pk_hex.to_string()));
    }
    fp.jailed = false;
    FPS.save(deps.storage, fp_btc_pk_hex, &fp)?;
    Ok(Response::new()
        .add_attribute("action", "unjail_fp")
        .add_event(StakingEvent::FpUnjailed {
            btc_pk_hex: fp.btc_pk_hex,
        }))
}

/// handle_record_vote keeps track of the highest block a finality provider voted for
pub fn handle_record_vote(
    deps: DepsMut,
    fp_btc_pk_hex: &str,
    height: u64,
) -> Result<Response, ContractError> {
    let mut fp = get_fp(deps.storage, fp_btc_pk_hex)?;
    if height > fp.highest_voted_height {
        fp.highest_voted_height = height;
        FPS.save(deps.storage, fp_btc_pk_hex, &fp)?;
    }
    Ok(Response::new()
        .add_attribute("action", "record_vote")
        .add_attribute("highest_voted_height", fp.highest_voted_height.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmwasm_std::testing::{mock_dependencies, mock_env};

    use babylon_apis::btc_staking_api::CovenantAdaptorSignatures;
    use test_utils::finality::double_sign_evidence;
    use test_utils::keys::{fp_sk, staker_sk, x_only};
    use test_utils::DelegationFixture;

    use crate::contract::tests::{instantiate_at, new_fp};
    use crate::staking::handle_create_fp;
    use crate::state::staking::insert_delegation;
    use crate::test_utils::{fixture_params, staking_tx_hash, stored_delegation};

    #[test]
    fn jailing_round_trip() {
        let mut deps = mock_dependencies();
        instantiate_at(deps.as_mut(), 100);
        let fp = new_fp(&deps.api, 1);
        handle_create_fp(deps.as_mut(), &mock_env(), &fp).unwrap();

        assert_eq!(
            handle_unjail_fp(deps.as_mut(), &fp.btc_pk_hex).unwrap_err(),
            ContractError::FpNotJailed(fp.btc_pk_hex.clone())
        );
        handle_jail_fp(deps.as_mut(), &fp.btc_pk_hex).unwrap();
        assert!(get_fp(&deps.storage, &fp.btc_pk_hex).unwrap().jailed);
        assert_eq!(
            handle_jail_fp(deps.as_mut(), &fp.btc_pk_hex).unwrap_err(),
            ContractError::FpAlreadyJailed(fp.btc_pk_hex.clone())
        );
        handle_unjail_fp(deps.as_mut(), &fp.btc_pk_hex).unwrap();
        assert!(!get_fp(&deps.storage, &fp.btc_pk_hex).unwrap().jailed);
    }

    #[test]
    fn votes_only_move_forward() {
        let mut deps = mock_dependencies();
        instantiate_at(deps.as_mut(), 100);
        let fp = new_fp(&deps.api, 1);
        handle_create_fp(deps.as_mut(), &mock_env(), &fp).unwrap();

        handle_record_vote(deps.as_mut(), &fp.btc_pk_hex, 10).unwrap();
        handle_record_vote(deps.as_mut(), &fp.btc_pk_hex, 7).unwrap();
        let stored = get_fp(&deps.storage, &fp.btc_pk_hex).unwrap();
        assert_eq!(stored.highest_voted_height, 10);
    }

    #[test]
    fn double_sign_slashes_once() {
        let mut deps = mock_dependencies();
        instantiate_at(deps.as_mut(), 100);
        let fp = new_fp(&deps.api, 1);
        handle_create_fp(deps.as_mut(), &mock_env(), &fp).unwrap();

        let evidence = double_sign_evidence(&fp_sk(1), 42);
        let res = handle_slash_fp(deps.as_mut(), &mock_env(), &evidence).unwrap();
        assert_eq!(res.events[0].ty, "fp_slashed");

        let stored = get_fp(&deps.storage, &fp.btc_pk_hex).unwrap();
        assert_eq!(stored.slashed_btc_height, Some(100));
        assert_eq!(stored.slashed_height, Some(mock_env().block.height));

        assert_eq!(
            handle_slash_fp(deps.as_mut(), &mock_env(), &evidence).unwrap_err(),
            ContractError::FpAlreadySlashed(fp.btc_pk_hex.clone())
        );
        // slashing is permanent
        handle_jail_fp(deps.as_mut(), &fp.btc_pk_hex).unwrap();
        assert_eq!(
            handle_unjail_fp(deps.as_mut(), &fp.btc_pk_hex).unwrap_err(),
            ContractError::FpAlreadySlashed(fp.btc_pk_hex.clone())
        );
    }

    #[test]
    fn forged_evidence_is_rejected() {
        let mut deps = mock_dependencies();
        instantiate_at(deps.as_mut(), 100);
        let fp = new_fp(&deps.api, 1);
        handle_create_fp(deps.as_mut(), &mock_env(), &fp).unwrap();

        let mut evidence = double_sign_evidence(&fp_sk(1), 42);
        evidence.fork_finality_sig = evidence.canonical_finality_sig.clone();
        assert!(handle_slash_fp(deps.as_mut(), &mock_env(), &evidence).is_err());
        assert!(!get_fp(&deps.storage, &fp.btc_pk_hex).unwrap().is_slashed());
    }

    #[test]
    fn unusable_covenant_signature_aborts_the_slash() {
        let mut deps = mock_dependencies();
        instantiate_at(deps.as_mut(), 100);
        let fp = new_fp(&deps.api, 1);
        handle_create_fp(deps.as_mut(), &mock_env(), &fp).unwrap();

        let fixture = DelegationFixture::new(
            &fixture_params(),
            staker_sk(1),
            &[x_only(&fp_sk(1))],
            500,
            150,
            100_000,
        );
        let mut del = stored_delegation(&fixture);
        for sk in &fixture_params().covenant_sks {
            let sigs = fixture.covenant_sigs(sk);
            del.covenant_sigs.push(CovenantAdaptorSignatures {
                cov_pk: hex::decode(&sigs.cov_pk_hex).unwrap(),
                adaptor_sigs: sigs.slashing_tx_sigs,
            });
        }
        // R is no longer a compressed point
        del.covenant_sigs[0].adaptor_sigs[0][0] = 0x05;
        let hash = staking_tx_hash(&fixture);
        insert_delegation(&mut deps.storage, &hash, &del).unwrap();

        let evidence = double_sign_evidence(&fp_sk(1), 42);
        assert!(matches!(
            handle_slash_fp(deps.as_mut(), &mock_env(), &evidence).unwrap_err(),
            ContractError::InvalidCovenantSig(_)
        ));
        assert!(!get_fp(&deps.storage, &fp.btc_pk_hex).unwrap().is_slashed());
        assert!(!SIGNED_SLASHING_TXS.has(
            &deps.storage,
            (hash.as_slice(), fp.btc_pk_hex.as_str())
        ));
    }
}
