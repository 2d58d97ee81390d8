//! Typed events emitted by the btc-staking contract.
//!
//! Every event is converted into a [`cosmwasm_std::Event`] whose type is the snake case name
//! of the variant. Events carry enough data for an off-chain voting power cache to follow
//! along without reading delegations back.

use cosmwasm_std::Event;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StakingEvent {
    FinalityProviderCreated {
        btc_pk_hex: String,
        addr: String,
        bsn_id: String,
    },
    FinalityProviderEdited {
        btc_pk_hex: String,
    },
    DelegationCreated {
        staking_tx_hash: String,
        staker_addr: String,
        fp_btc_pk_list: Vec<String>,
        total_sat: u64,
        params_version: u32,
    },
    CovenantSignatureReceived {
        staking_tx_hash: String,
        cov_pk_hex: String,
    },
    CovenantQuorumReached {
        staking_tx_hash: String,
    },
    InclusionProofReceived {
        staking_tx_hash: String,
        start_height: u32,
        end_height: u32,
    },
    InclusionRolledBack {
        staking_tx_hash: String,
        start_height: u32,
    },
    DelegationActivated {
        staking_tx_hash: String,
        fp_btc_pk_list: Vec<String>,
        total_sat: u64,
        btc_height: u32,
    },
    DelegationUnbondedEarly {
        staking_tx_hash: String,
        spend_tx_hash: String,
    },
    DelegationExpired {
        staking_tx_hash: String,
        btc_height: u32,
    },
    FpSlashed {
        btc_pk_hex: String,
        btc_height: u32,
    },
    FpJailed {
        btc_pk_hex: String,
    },
    FpUnjailed {
        btc_pk_hex: String,
    },
    PowerUp {
        fp_btc_pk_hex: String,
        staking_tx_hash: String,
        sat: u64,
        btc_height: u32,
    },
    PowerDown {
        fp_btc_pk_hex: String,
        staking_tx_hash: String,
        sat: u64,
        btc_height: u32,
    },
    BtcReorg {
        rollback_from_height: u32,
        rollback_to_height: u32,
        block_diff: u32,
    },
}

impl StakingEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            StakingEvent::FinalityProviderCreated { .. } => "finality_provider_created",
            StakingEvent::FinalityProviderEdited { .. } => "finality_provider_edited",
            StakingEvent::DelegationCreated { .. } => "delegation_created",
            StakingEvent::CovenantSignatureReceived { .. } => "covenant_signature_received",
            StakingEvent::CovenantQuorumReached { .. } => "covenant_quorum_reached",
            StakingEvent::InclusionProofReceived { .. } => "inclusion_proof_received",
            StakingEvent::InclusionRolledBack { .. } => "inclusion_rolled_back",
            StakingEvent::DelegationActivated { .. } => "delegation_activated",
            StakingEvent::DelegationUnbondedEarly { .. } => "delegation_unbonded_early",
            StakingEvent::DelegationExpired { .. } => "delegation_expired",
            StakingEvent::FpSlashed { .. } => "fp_slashed",
            StakingEvent::FpJailed { .. } => "fp_jailed",
            StakingEvent::FpUnjailed { .. } => "fp_unjailed",
            StakingEvent::PowerUp { .. } => "power_up",
            StakingEvent::PowerDown { .. } => "power_down",
            StakingEvent::BtcReorg { .. } => "btc_reorg",
        }
    }
}

impl From<StakingEvent> for Event {
    fn from(ev: StakingEvent) -> Self {
        let event = Event::new(ev.event_type());
        match ev {
            StakingEvent::FinalityProviderCreated {
                btc_pk_hex,
                addr,
                bsn_id,
            } => event
                .add_attribute("btc_pk", btc_pk_hex)
                .add_attribute("addr", addr)
                .add_attribute("bsn_id", bsn_id),
            StakingEvent::FinalityProviderEdited { btc_pk_hex }
            | StakingEvent::FpJailed { btc_pk_hex }
            | StakingEvent::FpUnjailed { btc_pk_hex } => event.add_attribute("btc_pk", btc_pk_hex),
            StakingEvent::DelegationCreated {
                staking_tx_hash,
                staker_addr,
                fp_btc_pk_list,
                total_sat,
                params_version,
            } => event
                .add_attribute("staking_tx_hash", staking_tx_hash)
                .add_attribute("staker_addr", staker_addr)
                .add_attribute("fp_btc_pk_list", fp_btc_pk_list.join(","))
                .add_attribute("total_sat", total_sat.to_string())
                .add_attribute("params_version", params_version.to_string()),
            StakingEvent::CovenantSignatureReceived {
                staking_tx_hash,
                cov_pk_hex,
            } => event
                .add_attribute("staking_tx_hash", staking_tx_hash)
                .add_attribute("cov_pk", cov_pk_hex),
            StakingEvent::CovenantQuorumReached { staking_tx_hash } => {
                event.add_attribute("staking_tx_hash", staking_tx_hash)
            }
            StakingEvent::InclusionProofReceived {
                staking_tx_hash,
                start_height,
                end_height,
            } => event
                .add_attribute("staking_tx_hash", staking_tx_hash)
                .add_attribute("start_height", start_height.to_string())
                .add_attribute("end_height", end_height.to_string()),
            StakingEvent::InclusionRolledBack {
                staking_tx_hash,
                start_height,
            } => event
                .add_attribute("staking_tx_hash", staking_tx_hash)
                .add_attribute("start_height", start_height.to_string()),
            StakingEvent::DelegationActivated {
                staking_tx_hash,
                fp_btc_pk_list,
                total_sat,
                btc_height,
            } => event
                .add_attribute("staking_tx_hash", staking_tx_hash)
                .add_attribute("fp_btc_pk_list", fp_btc_pk_list.join(","))
                .add_attribute("total_sat", total_sat.to_string())
                .add_attribute("btc_height", btc_height.to_string()),
            StakingEvent::DelegationUnbondedEarly {
                staking_tx_hash,
                spend_tx_hash,
            } => event
                .add_attribute("staking_tx_hash", staking_tx_hash)
                .add_attribute("spend_tx_hash", spend_tx_hash),
            StakingEvent::DelegationExpired {
                staking_tx_hash,
                btc_height,
            } => event
                .add_attribute("staking_tx_hash", staking_tx_hash)
                .add_attribute("btc_height", btc_height.to_string()),
            StakingEvent::FpSlashed {
                btc_pk_hex,
                btc_height,
            } => event
                .add_attribute("btc_pk", btc_pk_hex)
                .add_attribute("btc_height", btc_height.to_string()),
            StakingEvent::PowerUp {
                fp_btc_pk_hex,
                staking_tx_hash,
                sat,
                btc_height,
            }
            | StakingEvent::PowerDown {
                fp_btc_pk_hex,
                staking_tx_hash,
                sat,
                btc_height,
            } => event
                .add_attribute("fp_btc_pk", fp_btc_pk_hex)
                .add_attribute("staking_tx_hash", staking_tx_hash)
                .add_attribute("sat", sat.to_string())
                .add_attribute("btc_height", btc_height.to_string()),
            StakingEvent::BtcReorg {
                rollback_from_height,
                rollback_to_height,
                block_diff,
            } => event
                .add_attribute("rollback_from_height", rollback_from_height.to_string())
                .add_attribute("rollback_to_height", rollback_to_height.to_string())
                .add_attribute("block_diff", block_diff.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_events_share_attributes() {
        let up: Event = StakingEvent::PowerUp {
            fp_btc_pk_hex: "aa".to_string(),
            staking_tx_hash: "bb".to_string(),
            sat: 100,
            btc_height: 7,
        }
        .into();
        assert_eq!(up.ty, "power_up");
        assert_eq!(up.attributes.len(), 4);
        assert_eq!(up.attributes[2].value, "100");
    }

    #[test]
    fn fp_slashed_carries_height() {
        let ev: Event = StakingEvent::FpSlashed {
            btc_pk_hex: "cc".to_string(),
            btc_height: 120,
        }
        .into();
        assert_eq!(ev.ty, "fp_slashed");
        assert_eq!(ev.attributes[1].key, "btc_height");
        assert_eq!(ev.attributes[1].value, "120");
    }
}
