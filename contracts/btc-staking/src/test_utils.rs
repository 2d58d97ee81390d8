use bitcoin::hashes::Hash;
use cosmwasm_std::Decimal;

use babylon_btcstaking::pop::staker_pop_context;
use test_utils::delegation::default_slashing_pk_script;
use test_utils::{DelegationFixture, FixtureParams};

use crate::staking::new_delegation;
use crate::state::params::Params;
use crate::state::staking::BtcDelegation;

pub fn fixture_params() -> FixtureParams {
    FixtureParams::default()
}

/// staking_params are the params version matching the delegation fixtures
pub fn staking_params() -> Params {
    let fixture = fixture_params();
    Params {
        covenant_pks: fixture
            .covenant_pks()
            .iter()
            .map(|pk| hex::encode(pk.serialize()))
            .collect(),
        covenant_quorum: fixture.covenant_quorum,
        slashing_pk_script: hex::encode(default_slashing_pk_script().as_bytes()),
        min_slashing_tx_fee_sat: fixture.min_slashing_tx_fee_sat,
        slashing_rate: Decimal::percent(10),
        unbonding_time_blocks: 150,
        unbonding_fee_sat: fixture.unbonding_fee_sat,
        ..Params::default()
    }
}

/// stored_delegation is the delegation the contract keeps for an accepted fixture
pub fn stored_delegation(del: &DelegationFixture) -> BtcDelegation {
    let msg = del.to_msg(
        "staker",
        &[0u8; 20],
        &staker_pop_context("chain", "contract"),
    );
    new_delegation(&msg, del.staking_output_idx, 0)
}

pub fn staking_tx_hash(del: &DelegationFixture) -> [u8; 32] {
    del.staking_tx.compute_txid().to_byte_array()
}
