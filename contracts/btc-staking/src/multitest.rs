mod suite;

use assert_matches::assert_matches;
use suite::{has_event, SuiteBuilder};

use crate::error::ContractError;
use crate::state::staking::DelegationStatus;

mod instantiation {
    use super::*;
    use test_utils::keys::fp_pk_hex;

    #[test]
    fn instantiate_works() {
        let suite = SuiteBuilder::new().with_base_height(200).build();

        let tip = suite.get_btc_tip_header();
        assert_eq!(tip.height, 200);
        assert_eq!(tip.hash, suite.chain.base().block_hash().to_string());
        assert_eq!(suite.get_largest_btc_reorg(), None);
    }

    #[test]
    fn finality_providers_register_once() {
        let mut suite = SuiteBuilder::new().build();
        suite.register_finality_providers(&[1, 2]).unwrap();

        let fp = suite.get_finality_provider(2);
        assert_eq!(fp.addr, suite.app.api().addr_make("fp2").to_string());
        assert!(!fp.jailed);
        assert_eq!(suite.get_power(2, None), 0);

        let err = suite.register_finality_providers(&[1]).unwrap_err();
        assert_eq!(
            ContractError::FpAlreadyRegistered(fp_pk_hex(1)),
            err.downcast().unwrap()
        );
    }
}

mod delegation_lifecycle {
    use super::*;

    #[test]
    fn delegation_gains_power_then_expires() {
        let mut suite = SuiteBuilder::new().build();
        suite.register_finality_providers(&[1, 2]).unwrap();
        let del = suite.fixture(&[1, 2]);

        suite.create_delegation(&del).unwrap();
        assert_eq!(suite.get_delegation(&del).status, DelegationStatus::Pending);
        suite.add_covenant_sigs(&del, 3).unwrap();
        assert_eq!(suite.get_delegation(&del).status, DelegationStatus::Verified);

        let res = suite.include_delegation(&del).unwrap();
        assert!(has_event(&res, "inclusion_proof_received"));
        let stored = suite.get_delegation(&del);
        assert_eq!(stored.status, DelegationStatus::Active);
        assert_eq!(stored.delegation.start_height, 101);
        assert_eq!(stored.delegation.end_height, 601);

        // power only moves at the end of the block
        assert_eq!(suite.get_power(1, None), 0);
        let res = suite.end_block().unwrap();
        assert!(has_event(&res, "delegation_activated"));
        assert_eq!(suite.get_power(1, None), 100_000);
        assert_eq!(suite.get_power(2, None), 100_000);

        // the delegation leaves the active set once less than the unbonding time remains
        suite.mine_to(401).unwrap();
        suite.end_block().unwrap();
        assert_eq!(suite.get_power(1, None), 100_000);
        suite.mine_to(402).unwrap();
        let res = suite.end_block().unwrap();
        assert!(has_event(&res, "delegation_expired"));
        assert_eq!(suite.get_power(1, None), 0);
        assert_eq!(suite.get_delegation(&del).status, DelegationStatus::Expired);
    }

    #[test]
    fn short_of_quorum_never_gains_power() {
        let mut suite = SuiteBuilder::new().build();
        suite.register_finality_providers(&[1]).unwrap();
        let del = suite.fixture(&[1]);

        suite.create_delegation(&del).unwrap();
        suite.add_covenant_sigs(&del, 2).unwrap();
        suite.include_delegation(&del).unwrap();
        assert_eq!(suite.get_delegation(&del).status, DelegationStatus::Pending);

        for height in [110, 200, 300] {
            suite.mine_to(height).unwrap();
            let res = suite.end_block().unwrap();
            assert!(!has_event(&res, "power_up"));
            assert!(!has_event(&res, "delegation_activated"));
            assert_eq!(suite.get_power(1, None), 0);
        }
        assert_eq!(suite.get_delegation(&del).status, DelegationStatus::Pending);
    }

    #[test]
    fn past_power_stays_queryable() {
        let mut suite = SuiteBuilder::new().build();
        suite.register_finality_providers(&[1]).unwrap();
        let del = suite.fixture(&[1]);
        suite.activate_delegation(&del).unwrap();
        let activated_at = suite.app.block_info().height;

        suite.mine_to(402).unwrap();
        suite.end_block().unwrap();
        assert_eq!(suite.get_power(1, Some(activated_at)), 0);
        assert_eq!(suite.get_power(1, Some(activated_at + 1)), 100_000);
        assert_eq!(suite.get_power(1, None), 0);
    }

    #[test]
    fn early_unbonding_needs_a_deep_spend() {
        let mut suite = SuiteBuilder::new().build();
        suite.register_finality_providers(&[1]).unwrap();
        let del = suite.fixture(&[1]);
        suite.activate_delegation(&del).unwrap();
        assert_eq!(suite.get_power(1, None), 100_000);

        let err = suite.unbond(&del, 1).unwrap_err();
        assert_matches!(
            err.downcast::<ContractError>().unwrap(),
            ContractError::InvalidUndelegationRequest(_)
        );
        assert_eq!(suite.get_delegation(&del).status, DelegationStatus::Active);
    }

    #[test]
    fn early_unbonding_drops_the_power() {
        let mut suite = SuiteBuilder::new().build();
        suite.register_finality_providers(&[1]).unwrap();
        let del = suite.fixture(&[1]);
        suite.activate_delegation(&del).unwrap();

        let res = suite.unbond(&del, 6).unwrap();
        assert!(has_event(&res, "delegation_unbonded_early"));
        assert_eq!(suite.get_delegation(&del).status, DelegationStatus::Unbonded);

        let res = suite.end_block().unwrap();
        assert!(has_event(&res, "power_down"));
        assert!(!has_event(&res, "delegation_expired"));
        assert_eq!(suite.get_power(1, None), 0);

        let err = suite.unbond(&del, 6).unwrap_err();
        assert_matches!(
            err.downcast::<ContractError>().unwrap(),
            ContractError::InvalidUndelegationRequest(_)
        );
    }

    #[test]
    fn allow_list_is_lifted_after_its_expiration() {
        let mut suite = SuiteBuilder::new()
            .with_height(1_000)
            .with_allow_list_until(1_002)
            .build();
        suite.register_finality_providers(&[1]).unwrap();
        let del = suite.fixture(&[1]);

        let err = suite.create_delegation(&del).unwrap_err();
        assert_eq!(
            ContractError::StakingTxNotAllowed(del.staking_tx_hash()),
            err.downcast().unwrap()
        );

        suite.app.update_block(|block| block.height = 1_003);
        suite.create_delegation(&del).unwrap();
    }
}

mod slashing {
    use super::*;
    use crate::msg::SudoMsg;
    use test_utils::finality::double_sign_evidence;
    use test_utils::keys::{fp_pk_hex, fp_sk};

    #[test]
    fn selective_slashing_signs_the_slashing_tx() {
        let mut suite = SuiteBuilder::new().build();
        suite.register_finality_providers(&[1, 2]).unwrap();
        let del = suite.fixture(&[1, 2]);
        suite.activate_delegation(&del).unwrap();

        // no slashing tx before the finality provider is slashed
        suite.get_signed_slashing_tx(&del, 1).unwrap_err();

        let res = suite.slash_selectively(&del, 1).unwrap();
        assert!(has_event(&res, "fp_slashed"));
        let fp = suite.get_finality_provider(1);
        assert_eq!(fp.slashed_btc_height, Some(101));
        assert_eq!(suite.get_power(1, None), 0);
        assert_eq!(suite.get_power(2, None), 100_000);

        let signed = suite.get_signed_slashing_tx(&del, 1).unwrap();
        assert!(!signed.signed_tx_hex.is_empty());

        // the delegation keeps restaking to the other finality provider
        let res = suite.end_block().unwrap();
        assert!(!has_event(&res, "power_down"));
        assert_eq!(suite.get_power(2, None), 100_000);

        let err = suite.slash_selectively(&del, 1).unwrap_err();
        assert_eq!(
            ContractError::FpAlreadySlashed(fp_pk_hex(1)),
            err.downcast().unwrap()
        );
        // slashed finality providers take no new delegations
        let other = suite.fixture(&[1]);
        let err = suite.create_delegation(&other).unwrap_err();
        assert_eq!(
            ContractError::FpAlreadySlashed(fp_pk_hex(1)),
            err.downcast().unwrap()
        );
    }

    #[test]
    fn double_signing_slashes_through_sudo() {
        let mut suite = SuiteBuilder::new().build();
        suite.register_finality_providers(&[1]).unwrap();
        let del = suite.fixture(&[1]);
        suite.activate_delegation(&del).unwrap();

        suite
            .sudo(&SudoMsg::JailFp {
                fp_btc_pk_hex: fp_pk_hex(1),
            })
            .unwrap();
        let res = suite
            .sudo(&SudoMsg::SlashFp {
                evidence: double_sign_evidence(&fp_sk(1), 42),
            })
            .unwrap();
        assert!(has_event(&res, "fp_slashed"));
        assert!(suite.get_finality_provider(1).is_slashed());
        assert_eq!(suite.get_power(1, None), 0);
        suite.get_signed_slashing_tx(&del, 1).unwrap();

        // a slashed finality provider stays down
        let err = suite
            .sudo(&SudoMsg::UnjailFp {
                fp_btc_pk_hex: fp_pk_hex(1),
            })
            .unwrap_err();
        assert_eq!(
            ContractError::FpAlreadySlashed(fp_pk_hex(1)),
            err.downcast().unwrap()
        );
    }

    #[test]
    fn jailing_hides_the_power() {
        let mut suite = SuiteBuilder::new().build();
        suite.register_finality_providers(&[1]).unwrap();
        let del = suite.fixture(&[1]);
        suite.activate_delegation(&del).unwrap();
        let fp_btc_pk_hex = fp_pk_hex(1);

        suite
            .sudo(&SudoMsg::JailFp {
                fp_btc_pk_hex: fp_btc_pk_hex.clone(),
            })
            .unwrap();
        assert_eq!(suite.get_power(1, None), 0);

        suite.sudo(&SudoMsg::UnjailFp { fp_btc_pk_hex }).unwrap();
        assert_eq!(suite.get_power(1, None), 100_000);
    }
}

mod reorg {
    use super::*;

    #[test]
    fn shallow_reorg_rolls_back_the_inclusion() {
        let mut suite = SuiteBuilder::new().build();
        suite.register_finality_providers(&[1]).unwrap();
        let del = suite.fixture(&[1]);
        suite.activate_delegation(&del).unwrap();
        assert_eq!(suite.get_power(1, None), 100_000);

        // a heavier branch without the staking tx replaces block 101
        let res = suite.reorg(100, 2).unwrap();
        assert!(has_event(&res, "btc_reorg"));
        assert!(has_event(&res, "inclusion_rolled_back"));
        let reorg = suite.get_largest_btc_reorg().unwrap();
        assert_eq!(reorg.block_diff, 1);
        assert_eq!(reorg.rollback_to.height, 100);

        let stored = suite.get_delegation(&del);
        assert_eq!(stored.status, DelegationStatus::Verified);
        assert_eq!(stored.delegation.start_height, 0);
        suite.end_block().unwrap();
        assert_eq!(suite.get_power(1, None), 0);

        // the staking tx lands again on the new branch
        suite.include_delegation(&del).unwrap();
        assert_eq!(suite.get_delegation(&del).delegation.start_height, 103);
        suite.end_block().unwrap();
        assert_eq!(suite.get_power(1, None), 100_000);
    }

    #[test]
    fn deep_reorg_halts_the_end_block() {
        let mut suite = SuiteBuilder::new().build();
        suite.register_finality_providers(&[1]).unwrap();
        suite.mine_to(110).unwrap();

        suite.reorg(103, 8).unwrap();
        assert_eq!(suite.get_btc_tip_header().height, 111);
        assert_eq!(suite.get_largest_btc_reorg().unwrap().block_diff, 7);

        let err = suite.end_block().unwrap_err();
        assert_eq!(
            ContractError::BtcReorgTooDeep {
                block_diff: 7,
                depth: 6
            },
            err.downcast().unwrap()
        );
    }

    #[test]
    fn lighter_branch_is_ignored() {
        let mut suite = SuiteBuilder::new().build();
        suite.mine_to(105).unwrap();

        let mut fork = suite.chain.fork(102);
        fork.extend(2);
        let err = suite.submit_headers(&fork.headers_after(102)).unwrap_err();
        assert_matches!(
            err.downcast::<ContractError>().unwrap(),
            ContractError::BtcChainWithNotEnoughWork(_, _)
        );
        assert_eq!(suite.get_btc_tip_header().height, 105);
        assert_eq!(suite.get_largest_btc_reorg(), None);
    }
}
