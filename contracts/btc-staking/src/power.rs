use cosmwasm_std::Order::Ascending;
use cosmwasm_std::{DepsMut, Env, Event, Response, StdResult};
use cw_storage_plus::PrefixBound;

use babylon_apis::events::StakingEvent;

use crate::error::ContractError;
use crate::state::config::CONFIG;
use crate::state::light_client::get_tip;
use crate::state::params::get_params_by_version;
use crate::state::reorg::LARGEST_REORG;
use crate::state::staking::{
    add_power, get_delegation, get_fp, sub_power, touch, touched, tx_hash_hex, DelegationStatus,
    EXPIRED, EXPIRY_QUEUE, LAST_PROCESSED_BTC_HEIGHT, POWERED, TOUCHED,
};

/// handle_end_block applies the status changes of this block to the voting power of the finality
/// providers. A delegation counts towards the power of each of its non-slashed finality providers
/// exactly while it is active.
pub fn handle_end_block(mut deps: DepsMut, env: &Env) -> Result<Response, ContractError> {
    let cfg = CONFIG.load(deps.storage)?;
    if let Some(reorg) = LARGEST_REORG.may_load(deps.storage)? {
        if reorg.block_diff >= cfg.btc_confirmation_depth {
            deps.api.debug(&format!(
                "halting: BTC reorg of {} blocks from height {} to {}",
                reorg.block_diff, reorg.rollback_from.height, reorg.rollback_to.height
            ));
            return Err(ContractError::BtcReorgTooDeep {
                block_diff: reorg.block_diff,
                depth: cfg.btc_confirmation_depth,
            });
        }
    }

    let btc_height = get_tip(deps.storage)?.height;
    touch_expired(deps.branch(), btc_height)?;

    let height = env.block.height;
    let mut events: Vec<Event> = vec![];
    for hash in touched(deps.storage)? {
        let del = get_delegation(deps.storage, &hash)?;
        let params = get_params_by_version(deps.storage, del.params_version)?;
        let status = del.get_status(btc_height, params.covenant_quorum);
        let powered = POWERED.has(deps.storage, &hash);
        let staking_tx_hash = tx_hash_hex(&hash);

        if status == DelegationStatus::Active && !powered {
            events.push(
                StakingEvent::DelegationActivated {
                    staking_tx_hash: staking_tx_hash.clone(),
                    fp_btc_pk_list: del.fp_btc_pk_list.clone(),
                    total_sat: del.total_sat,
                    btc_height,
                }
                .into(),
            );
            for fp_btc_pk_hex in &del.fp_btc_pk_list {
                if get_fp(deps.storage, fp_btc_pk_hex)?.is_slashed() {
                    continue;
                }
                add_power(deps.storage, height, fp_btc_pk_hex, del.total_sat)?;
                events.push(
                    StakingEvent::PowerUp {
                        fp_btc_pk_hex: fp_btc_pk_hex.clone(),
                        staking_tx_hash: staking_tx_hash.clone(),
                        sat: del.total_sat,
                        btc_height,
                    }
                    .into(),
                );
            }
            POWERED.save(deps.storage, &hash, &())?;
        } else if status != DelegationStatus::Active && powered {
            for fp_btc_pk_hex in &del.fp_btc_pk_list {
                // the power of a slashed finality provider was already dropped
                if get_fp(deps.storage, fp_btc_pk_hex)?.is_slashed() {
                    continue;
                }
                sub_power(deps.storage, height, fp_btc_pk_hex, del.total_sat)?;
                events.push(
                    StakingEvent::PowerDown {
                        fp_btc_pk_hex: fp_btc_pk_hex.clone(),
                        staking_tx_hash: staking_tx_hash.clone(),
                        sat: del.total_sat,
                        btc_height,
                    }
                    .into(),
                );
            }
            POWERED.remove(deps.storage, &hash);
        }

        // a delegation may expire without ever having been active, e.g. when its inclusion
        // proof arrives too late
        let reported = EXPIRED.has(deps.storage, &hash);
        if status == DelegationStatus::Expired && !reported {
            events.push(
                StakingEvent::DelegationExpired {
                    staking_tx_hash,
                    btc_height,
                }
                .into(),
            );
            EXPIRED.save(deps.storage, &hash, &())?;
        } else if status != DelegationStatus::Expired && reported {
            EXPIRED.remove(deps.storage, &hash);
        }
        TOUCHED.remove(deps.storage, &hash);
    }

    Ok(Response::new()
        .add_attribute("action", "end_block")
        .add_attribute("btc_height", btc_height.to_string())
        .add_events(events))
}

/// touch_expired marks the delegations expiring between the last processed BTC height and the
/// tip, then moves the cursor to the tip
fn touch_expired(deps: DepsMut, btc_height: u32) -> Result<(), ContractError> {
    let last = LAST_PROCESSED_BTC_HEIGHT.load(deps.storage)?;
    if btc_height <= last {
        return Ok(());
    }
    let expiring = EXPIRY_QUEUE
        .prefix_range(
            deps.storage,
            Some(PrefixBound::exclusive(last)),
            Some(PrefixBound::inclusive(btc_height)),
            Ascending,
        )
        .map(|item| item.map(|((_, hash), _)| hash))
        .collect::<StdResult<Vec<_>>>()?;
    for hash in expiring {
        touch(deps.storage, &hash)?;
    }
    LAST_PROCESSED_BTC_HEIGHT.save(deps.storage, &btc_height)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmwasm_std::testing::{mock_dependencies, mock_env};
    use cosmwasm_std::Storage;

    use babylon_apis::btc_staking_api::{CovenantAdaptorSignatures, SignatureInfo};
    use test_utils::keys::{fp_pk_hex, fp_sk, staker_sk, x_only};
    use test_utils::DelegationFixture;

    use crate::contract::tests::{instantiate_at, new_fp};
    use crate::staking::handle_create_fp;
    use crate::state::light_client::{set_tip, BTC_HEADERS};
    use crate::state::reorg::{LargestBtcReorg, ReorgPoint};
    use crate::state::staking::{fps, insert_delegation, INCLUSIONS, FPS};
    use crate::test_utils::{fixture_params, staking_tx_hash, stored_delegation};

    fn move_tip(deps: DepsMut, height: u32) {
        let mut tip = get_tip(deps.storage).unwrap();
        tip.height = height;
        BTC_HEADERS.save(deps.storage, height, &tip).unwrap();
        set_tip(deps.storage, &tip).unwrap();
    }

    /// included_delegation stores a delegation with covenant quorum, included at `start`
    fn included_delegation(deps: DepsMut, fp_ids: &[usize], start: u32) -> Vec<u8> {
        let fp_pks: Vec<_> = fp_ids.iter().map(|i| x_only(&fp_sk(*i))).collect();
        let fixture =
            DelegationFixture::new(&fixture_params(), staker_sk(1), &fp_pks, 500, 150, 100_000);
        let mut del = stored_delegation(&fixture);
        for sk in &fixture_params().covenant_sks {
            let sigs = fixture.covenant_sigs(sk);
            let cov_pk = hex::decode(&sigs.cov_pk_hex).unwrap();
            del.covenant_sigs.push(CovenantAdaptorSignatures {
                cov_pk: cov_pk.clone(),
                adaptor_sigs: sigs.slashing_tx_sigs,
            });
            del.undelegation_info
                .covenant_unbonding_sig_list
                .push(SignatureInfo {
                    pk: cov_pk.clone(),
                    sig: sigs.unbonding_tx_sig,
                });
            del.undelegation_info
                .covenant_slashing_sigs
                .push(CovenantAdaptorSignatures {
                    cov_pk,
                    adaptor_sigs: sigs.slashing_unbonding_tx_sigs,
                });
        }
        del.start_height = start;
        del.end_height = start + 500;
        let hash = staking_tx_hash(&fixture).to_vec();
        insert_delegation(deps.storage, &hash, &del).unwrap();
        INCLUSIONS.save(deps.storage, (start, hash.as_slice()), &()).unwrap();
        EXPIRY_QUEUE
            .save(deps.storage, (del.expiry_height(), hash.as_slice()), &())
            .unwrap();
        touch(deps.storage, &hash).unwrap();
        hash
    }

    fn power(storage: &dyn Storage, fp: usize) -> u64 {
        fps().load(storage, &fp_pk_hex(fp)).unwrap().power
    }

    #[test]
    fn delegation_powers_up_then_expires() {
        let mut deps = mock_dependencies();
        instantiate_at(deps.as_mut(), 100);
        for i in [1, 2] {
            let fp = new_fp(&deps.api, i);
            handle_create_fp(deps.as_mut(), &mock_env(), &fp).unwrap();
        }
        let hash = included_delegation(deps.as_mut(), &[1, 2], 100);

        let res = handle_end_block(deps.as_mut(), &mock_env()).unwrap();
        let types: Vec<_> = res.events.iter().map(|e| e.ty.as_str()).collect();
        assert_eq!(types, vec!["delegation_activated", "power_up", "power_up"]);
        assert_eq!(power(&deps.storage, 1), 100_000);
        assert_eq!(power(&deps.storage, 2), 100_000);
        assert!(touched(&deps.storage).unwrap().is_empty());

        // nothing changed, nothing happens
        let res = handle_end_block(deps.as_mut(), &mock_env()).unwrap();
        assert!(res.events.is_empty());

        // expiry height is 100 + 500 + 1 - 150
        move_tip(deps.as_mut(), 450);
        let res = handle_end_block(deps.as_mut(), &mock_env()).unwrap();
        assert!(res.events.is_empty());
        move_tip(deps.as_mut(), 451);
        let res = handle_end_block(deps.as_mut(), &mock_env()).unwrap();
        let types: Vec<_> = res.events.iter().map(|e| e.ty.as_str()).collect();
        assert_eq!(types, vec!["power_down", "power_down", "delegation_expired"]);
        assert_eq!(power(&deps.storage, 1), 0);
        assert!(!POWERED.has(&deps.storage, &hash));
    }

    #[test]
    fn late_inclusion_reports_the_expiry_once() {
        let mut deps = mock_dependencies();
        instantiate_at(deps.as_mut(), 100);
        let fp = new_fp(&deps.api, 1);
        handle_create_fp(deps.as_mut(), &mock_env(), &fp).unwrap();

        // included at 100 but only seen once the tip is past its expiry height 451
        let hash = included_delegation(deps.as_mut(), &[1], 100);
        move_tip(deps.as_mut(), 460);
        let res = handle_end_block(deps.as_mut(), &mock_env()).unwrap();
        let types: Vec<_> = res.events.iter().map(|e| e.ty.as_str()).collect();
        assert_eq!(types, vec!["delegation_expired"]);
        assert_eq!(power(&deps.storage, 1), 0);
        assert!(!POWERED.has(&deps.storage, &hash));

        touch(&mut deps.storage, &hash).unwrap();
        let res = handle_end_block(deps.as_mut(), &mock_env()).unwrap();
        assert!(res.events.is_empty());
    }

    #[test]
    fn slashed_fps_get_no_power() {
        let mut deps = mock_dependencies();
        instantiate_at(deps.as_mut(), 100);
        for i in [1, 2] {
            let fp = new_fp(&deps.api, i);
            handle_create_fp(deps.as_mut(), &mock_env(), &fp).unwrap();
        }
        let fp1 = fp_pk_hex(1);
        let mut slashed = get_fp(&deps.storage, &fp1).unwrap();
        slashed.slashed_btc_height = Some(100);
        FPS.save(&mut deps.storage, &fp1, &slashed).unwrap();

        included_delegation(deps.as_mut(), &[1, 2], 100);
        let res = handle_end_block(deps.as_mut(), &mock_env()).unwrap();
        assert_eq!(res.events.len(), 2);
        assert_eq!(power(&deps.storage, 1), 0);
        assert_eq!(power(&deps.storage, 2), 100_000);
    }

    #[test]
    fn power_is_snapshotted_per_block() {
        let mut deps = mock_dependencies();
        instantiate_at(deps.as_mut(), 100);
        let fp = new_fp(&deps.api, 1);
        handle_create_fp(deps.as_mut(), &mock_env(), &fp).unwrap();
        included_delegation(deps.as_mut(), &[1], 100);

        let mut env = mock_env();
        let height = env.block.height + 5;
        env.block.height = height;
        handle_end_block(deps.as_mut(), &env).unwrap();

        let fp = fp_pk_hex(1);
        let at = |h| {
            fps()
                .may_load_at_height(&deps.storage, &fp, h)
                .unwrap()
                .map(|s| s.power)
        };
        // the state is visible from the following block on
        assert_eq!(at(height), Some(0));
        assert_eq!(at(height + 1), Some(100_000));
    }

    #[test]
    fn deep_reorg_halts_the_power_update() {
        let mut deps = mock_dependencies();
        instantiate_at(deps.as_mut(), 100);
        let depth = CONFIG.load(&deps.storage).unwrap().btc_confirmation_depth;
        let point = |height| ReorgPoint {
            hash: String::new(),
            height,
        };
        LARGEST_REORG
            .save(
                &mut deps.storage,
                &LargestBtcReorg {
                    rollback_from: point(100 + depth),
                    rollback_to: point(100),
                    block_diff: depth,
                },
            )
            .unwrap();
        assert_eq!(
            handle_end_block(deps.as_mut(), &mock_env()).unwrap_err(),
            ContractError::BtcReorgTooDeep {
                block_diff: depth,
                depth
            }
        );
    }
}
