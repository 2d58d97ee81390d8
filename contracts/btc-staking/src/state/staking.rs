use std::str::FromStr;

use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Decimal, Order, StdResult, Storage};
use cw_storage_plus::{Index, IndexList, IndexedSnapshotMap, Item, Map, MultiIndex, Strategy};

use babylon_apis::btc_staking_api::{
    CovenantAdaptorSignatures, FinalityProviderDescription, ProofOfPossessionBtc, SignatureInfo,
    HASH_SIZE,
};
use babylon_apis::error::StakingApiError;
use babylon_apis::Bytes;
use bitcoin::hashes::Hash;
use bitcoin::Txid;

use crate::error::ContractError;

/// CommissionInfo is the commission a finality provider charges and the bounds of its changes
#[cw_serde]
pub struct CommissionInfo {
    pub rate: Decimal,
    pub max_rate: Decimal,
    pub max_change_rate: Decimal,
    /// update_time is the block time (in seconds) of the last rate change
    pub update_time: u64,
}

#[cw_serde]
pub struct FinalityProvider {
    /// addr is the staking-chain address of the finality provider
    pub addr: String,
    pub description: Option<FinalityProviderDescription>,
    pub commission: CommissionInfo,
    /// btc_pk_hex is the Bitcoin secp256k1 PK of this finality provider
    /// the PK follows encoding in BIP-340 spec in hex format
    pub btc_pk_hex: String,
    pub pop: Option<ProofOfPossessionBtc>,
    /// bsn_id is the id of the network the finality provider secures
    pub bsn_id: String,
    pub jailed: bool,
    /// slashed_btc_height is the BTC tip at slashing time. Once set, it is never cleared
    pub slashed_btc_height: Option<u32>,
    /// slashed_height is the block height of the staking chain at slashing time
    pub slashed_height: Option<u64>,
    /// highest_voted_height is the highest block the finality provider voted for
    pub highest_voted_height: u64,
}

impl FinalityProvider {
    pub fn is_slashed(&self) -> bool {
        self.slashed_btc_height.is_some()
    }
}

#[cw_serde]
pub struct BtcDelegation {
    /// staker_addr is the address to receive rewards from BTC delegation
    pub staker_addr: String,
    /// btc_pk_hex is the Bitcoin secp256k1 PK of the BTC delegator.
    /// The PK follows encoding in BIP-340 spec in hex format
    pub btc_pk_hex: String,
    /// fp_btc_pk_list is the list of BIP-340 PKs of the finality providers that
    /// this BTC delegation delegates to
    pub fp_btc_pk_list: Vec<String>,
    /// start_height is the start BTC height of the BTC delegation.
    /// It is the height of the block including the staking tx
    pub start_height: u32,
    /// end_height is the end height of the BTC delegation,
    /// i.e. start_height + staking_time
    pub end_height: u32,
    /// total_sat is the total BTC stakes in this delegation, quantified in satoshi
    pub total_sat: u64,
    /// staking_time is the time lock of the staking output, in BTC blocks
    pub staking_time: u32,
    /// staking_tx is the staking tx
    pub staking_tx: Bytes,
    /// staking_output_idx is the index of the staking output in the staking tx
    pub staking_output_idx: u32,
    /// slashing_tx is the slashing tx
    pub slashing_tx: Bytes,
    /// delegator_slashing_sig is the signature on the slashing tx
    /// by the delegator (i.e. SK corresponding to btc_pk).
    /// It will be a part of the witness for the staking tx output.
    pub delegator_slashing_sig: Bytes,
    /// covenant_sigs is a list of adaptor signatures on the slashing tx
    /// by each covenant member.
    /// It will be a part of the witness for the staking tx output.
    pub covenant_sigs: Vec<CovenantAdaptorSignatures>,
    /// unbonding_time is used in unbonding output time-lock path and in slashing transactions
    /// change outputs
    pub unbonding_time: u32,
    /// undelegation_info is the undelegation info of this delegation.
    pub undelegation_info: UndelegationInfo,
    /// params version used to validate the delegation
    pub params_version: u32,
}

#[cw_serde]
pub struct UndelegationInfo {
    /// unbonding_tx is the transaction which will transfer the funds from staking
    /// output to unbonding output. Unbonding output will usually have lower timelock
    /// than staking output.
    pub unbonding_tx: Bytes,
    /// delegator_unbonding_info is set once the staking output was seen spent on Bitcoin
    pub delegator_unbonding_info: Option<DelegatorUnbondingInfo>,
    /// covenant_unbonding_sig_list is the list of signatures on the unbonding tx
    /// by covenant members
    pub covenant_unbonding_sig_list: Vec<SignatureInfo>,
    /// slashing_tx is the unbonding slashing tx
    pub slashing_tx: Bytes,
    /// delegator_slashing_sig is the signature on the slashing tx
    /// by the delegator (i.e. SK corresponding to btc_pk).
    /// It will be a part of the witness for the unbonding tx output.
    pub delegator_slashing_sig: Bytes,
    /// covenant_slashing_sigs is a list of adaptor signatures on the
    /// unbonding slashing tx by each covenant member
    pub covenant_slashing_sigs: Vec<CovenantAdaptorSignatures>,
}

#[cw_serde]
pub struct DelegatorUnbondingInfo {
    /// spend_stake_tx is the Bitcoin tx that spent the staking output
    pub spend_stake_tx: Bytes,
}

#[cw_serde]
#[derive(Copy, Eq)]
pub enum DelegationStatus {
    Pending,
    Verified,
    Active,
    Unbonded,
    Expired,
}

impl BtcDelegation {
    pub fn is_unbonded_early(&self) -> bool {
        self.undelegation_info.delegator_unbonding_info.is_some()
    }

    /// has_covenant_quorum tells whether all three covenant signature lists reached `quorum`
    pub fn has_covenant_quorum(&self, quorum: u32) -> bool {
        let quorum = quorum as usize;
        self.covenant_sigs.len() >= quorum
            && self.undelegation_info.covenant_unbonding_sig_list.len() >= quorum
            && self.undelegation_info.covenant_slashing_sigs.len() >= quorum
    }

    pub fn has_inclusion_proof(&self) -> bool {
        self.start_height != 0 || self.end_height != 0
    }

    pub fn has_covenant_sig_from(&self, cov_pk: &[u8]) -> bool {
        self.covenant_sigs.iter().any(|sig| sig.cov_pk == cov_pk)
            || self
                .undelegation_info
                .covenant_unbonding_sig_list
                .iter()
                .any(|sig| sig.pk == cov_pk)
            || self
                .undelegation_info
                .covenant_slashing_sigs
                .iter()
                .any(|sig| sig.cov_pk == cov_pk)
    }

    /// get_status derives the status at BTC tip `btc_height`
    pub fn get_status(&self, btc_height: u32, covenant_quorum: u32) -> DelegationStatus {
        if self.is_unbonded_early() {
            DelegationStatus::Unbonded
        } else if !self.has_covenant_quorum(covenant_quorum) {
            DelegationStatus::Pending
        } else if !self.has_inclusion_proof() {
            DelegationStatus::Verified
        } else if btc_height < self.start_height {
            // the tip moved below the inclusion block
            DelegationStatus::Unbonded
        } else if btc_height as u64 + self.unbonding_time as u64 > self.end_height as u64 {
            DelegationStatus::Expired
        } else {
            DelegationStatus::Active
        }
    }

    /// expiry_height is the first BTC height at which an included delegation is expired
    pub fn expiry_height(&self) -> u32 {
        (self.end_height + 1).saturating_sub(self.unbonding_time)
    }
}

/// Finality providers by their BTC public key
pub(crate) const FPS: Map<&str, FinalityProvider> = Map::new("fps");
/// Finality providers by the network they secure
pub(crate) const FP_BY_BSN: Map<(&str, &str), ()> = Map::new("fp_by_bsn");

/// Delegations by staking tx hash, in internal byte order
pub(crate) const DELEGATIONS: Map<&[u8], BtcDelegation> = Map::new("delegations");
/// Staking tx hashes by finality provider
pub(crate) const FP_DELEGATIONS: Map<(&str, &[u8]), ()> = Map::new("fp_delegations");
/// Staking tx hashes by staker, in insertion order
pub(crate) const DELEGATOR_DELEGATIONS: Map<(&str, u64), Vec<u8>> =
    Map::new("delegator_delegations");
pub(crate) const DELEGATOR_DELEGATION_COUNT: Map<&str, u64> = Map::new("delegator_count");
/// Staking tx hashes accepted while the allow list is active
pub(crate) const ALLOWED_STAKING_TXS: Map<&[u8], ()> = Map::new("allowed_staking_tx");
/// Fully signed slashing txs, by staking tx hash and slashed finality provider
pub(crate) const SIGNED_SLASHING_TXS: Map<(&[u8], &str), Bytes> = Map::new("signed_slashing_txs");

/// Included delegations by inclusion height, so a reorg can find the ones to roll back
pub(crate) const INCLUSIONS: Map<(u32, &[u8]), ()> = Map::new("inclusions");
/// Included delegations by the BTC height at which they expire
pub(crate) const EXPIRY_QUEUE: Map<(u32, &[u8]), ()> = Map::new("expiry_queue");
/// Delegations whose status may have changed during the current block
pub(crate) const TOUCHED: Map<&[u8], ()> = Map::new("touched");
/// Delegations currently counted in the power of their finality providers
pub(crate) const POWERED: Map<&[u8], ()> = Map::new("powered");
/// Delegations whose expiry was already reported
pub(crate) const EXPIRED: Map<&[u8], ()> = Map::new("expired");
/// The BTC tip the expiry queue was last drained up to
pub(crate) const LAST_PROCESSED_BTC_HEIGHT: Item<u32> = Item::new("last_processed_btc_height");

pub const FP_STATE_KEY: &str = "fp_state";
const FP_STATE_CHECKPOINTS: &str = "fp_state__checkpoints";
const FP_STATE_CHANGELOG: &str = "fp_state__changelog";
pub const FP_POWER_KEY: &str = "fp_state__power";

/// fps holds the power of each finality provider, checkpointed every block so the power at
/// any past height can be read back.
///
/// Only the current power is indexed.
pub fn fps<'a>() -> IndexedSnapshotMap<&'a str, FinalityProviderState, FpPowerIndexes<'a>>
{
    let indexes = FpPowerIndexes {
        power: MultiIndex::new(|_, fp_state| fp_state.power, FP_STATE_KEY, FP_POWER_KEY),
    };
    IndexedSnapshotMap::new(
        FP_STATE_KEY,
        FP_STATE_CHECKPOINTS,
        FP_STATE_CHANGELOG,
        Strategy::EveryBlock,
        indexes,
    )
}

#[cw_serde]
#[derive(Default)]
pub struct FinalityProviderState {
    /// Finality provider power, in satoshis
    pub power: u64,
}

pub struct FpPowerIndexes<'a> {
    /// `power` allows duplicates, with the BTC PK hex as primary key
    pub power: MultiIndex<'a, u64, FinalityProviderState, String>,
}

impl<'a> IndexList<FinalityProviderState> for FpPowerIndexes<'a> {
    fn get_indexes(
        &'_ self,
    ) -> Box<dyn Iterator<Item = &'_ dyn Index<FinalityProviderState>> + '_> {
        let v: Vec<&dyn Index<FinalityProviderState>> = vec![&self.power];
        Box::new(v.into_iter())
    }
}

/// parse_tx_hash decodes a displayed (byte-reversed) tx hash into its internal byte order
pub fn parse_tx_hash(hash_hex: &str) -> Result<[u8; HASH_SIZE], ContractError> {
    let txid = Txid::from_str(hash_hex)
        .map_err(|_| StakingApiError::InvalidStakingTxHash(HASH_SIZE * 2))?;
    Ok(txid.to_byte_array())
}

/// tx_hash_hex displays a tx hash given in internal byte order
pub fn tx_hash_hex(hash: &[u8]) -> String {
    hash.iter().rev().map(|b| format!("{b:02x}")).collect()
}

pub fn get_delegation(storage: &dyn Storage, hash: &[u8]) -> Result<BtcDelegation, ContractError> {
    DELEGATIONS
        .may_load(storage, hash)?
        .ok_or_else(|| ContractError::DelegationNotFound(tx_hash_hex(hash)))
}

pub fn get_fp(storage: &dyn Storage, btc_pk_hex: &str) -> Result<FinalityProvider, ContractError> {
    FPS.may_load(storage, btc_pk_hex)?
        .ok_or_else(|| ContractError::FpNotFound(btc_pk_hex.to_string()))
}

/// insert_delegation stores a new delegation and indexes it by staker and finality provider
pub fn insert_delegation(
    storage: &mut dyn Storage,
    hash: &[u8],
    delegation: &BtcDelegation,
) -> StdResult<()> {
    DELEGATIONS.save(storage, hash, delegation)?;
    for fp in &delegation.fp_btc_pk_list {
        FP_DELEGATIONS.save(storage, (fp.as_str(), hash), &())?;
    }
    let staker = delegation.staker_addr.as_str();
    let seq = DELEGATOR_DELEGATION_COUNT
        .may_load(storage, staker)?
        .unwrap_or_default();
    DELEGATOR_DELEGATIONS.save(storage, (staker, seq), &hash.to_vec())?;
    DELEGATOR_DELEGATION_COUNT.save(storage, staker, &(seq + 1))
}

pub fn touch(storage: &mut dyn Storage, hash: &[u8]) -> StdResult<()> {
    TOUCHED.save(storage, hash, &())
}

pub fn touched(storage: &dyn Storage) -> StdResult<Vec<Vec<u8>>> {
    TOUCHED.keys(storage, None, None, Order::Ascending).collect()
}

pub fn add_power(storage: &mut dyn Storage, height: u64, fp: &str, sat: u64) -> StdResult<()> {
    fps().update(storage, fp, height, |state| -> StdResult<_> {
        let mut state = state.unwrap_or_default();
        state.power = state.power.saturating_add(sat);
        Ok(state)
    })?;
    Ok(())
}

pub fn sub_power(storage: &mut dyn Storage, height: u64, fp: &str, sat: u64) -> StdResult<()> {
    fps().update(storage, fp, height, |state| -> StdResult<_> {
        let mut state = state.unwrap_or_default();
        state.power = state.power.saturating_sub(sat);
        Ok(state)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmwasm_std::testing::mock_dependencies;

    fn delegation() -> BtcDelegation {
        BtcDelegation {
            staker_addr: "staker".to_string(),
            btc_pk_hex: "aa".to_string(),
            fp_btc_pk_list: vec!["f1".to_string(), "f2".to_string()],
            start_height: 0,
            end_height: 0,
            total_sat: 100,
            staking_time: 500,
            staking_tx: vec![],
            staking_output_idx: 0,
            slashing_tx: vec![],
            delegator_slashing_sig: vec![],
            covenant_sigs: vec![],
            unbonding_time: 200,
            undelegation_info: UndelegationInfo {
                unbonding_tx: vec![],
                delegator_unbonding_info: None,
                covenant_unbonding_sig_list: vec![],
                slashing_tx: vec![],
                delegator_slashing_sig: vec![],
                covenant_slashing_sigs: vec![],
            },
            params_version: 0,
        }
    }

    fn add_covenant(del: &mut BtcDelegation, i: u8) {
        del.covenant_sigs.push(CovenantAdaptorSignatures {
            cov_pk: vec![i],
            adaptor_sigs: vec![],
        });
        del.undelegation_info
            .covenant_unbonding_sig_list
            .push(SignatureInfo {
                pk: vec![i],
                sig: vec![],
            });
        del.undelegation_info
            .covenant_slashing_sigs
            .push(CovenantAdaptorSignatures {
                cov_pk: vec![i],
                adaptor_sigs: vec![],
            });
    }

    #[test]
    fn status_follows_lifecycle() {
        let mut del = delegation();
        assert_eq!(del.get_status(0, 2), DelegationStatus::Pending);

        add_covenant(&mut del, 1);
        assert_eq!(del.get_status(0, 2), DelegationStatus::Pending);
        add_covenant(&mut del, 2);
        assert_eq!(del.get_status(0, 2), DelegationStatus::Verified);
        assert!(del.has_covenant_sig_from(&[2]));

        del.start_height = 100;
        del.end_height = 600;
        assert_eq!(del.get_status(99, 2), DelegationStatus::Unbonded);
        assert_eq!(del.get_status(100, 2), DelegationStatus::Active);
        assert_eq!(del.get_status(400, 2), DelegationStatus::Active);
        assert_eq!(del.get_status(401, 2), DelegationStatus::Expired);
        assert_eq!(del.expiry_height(), 401);

        del.undelegation_info.delegator_unbonding_info = Some(DelegatorUnbondingInfo {
            spend_stake_tx: vec![],
        });
        assert_eq!(del.get_status(200, 2), DelegationStatus::Unbonded);
    }

    #[test]
    fn partial_covenant_lists_stay_pending() {
        let mut del = delegation();
        add_covenant(&mut del, 1);
        del.undelegation_info.covenant_slashing_sigs.clear();
        assert_eq!(del.get_status(0, 1), DelegationStatus::Pending);
    }

    #[test]
    fn tx_hash_display_round_trip() {
        let display = "01".repeat(31) + "ff";
        let internal = parse_tx_hash(&display).unwrap();
        assert_eq!(internal[0], 0xff);
        assert_eq!(tx_hash_hex(&internal), display);
        assert!(parse_tx_hash("abcd").is_err());
    }

    #[test]
    fn delegations_are_indexed_in_insertion_order() {
        let mut deps = mock_dependencies();
        let storage = deps.as_mut().storage;
        let del = delegation();
        insert_delegation(storage, &[2u8; 32], &del).unwrap();
        insert_delegation(storage, &[1u8; 32], &del).unwrap();

        let hashes: Vec<Vec<u8>> = DELEGATOR_DELEGATIONS
            .prefix("staker")
            .range(storage, None, None, Order::Ascending)
            .map(|item| item.unwrap().1)
            .collect();
        assert_eq!(hashes, vec![vec![2u8; 32], vec![1u8; 32]]);

        let by_fp = FP_DELEGATIONS
            .prefix("f2")
            .keys(storage, None, None, Order::Ascending)
            .count();
        assert_eq!(by_fp, 2);
    }

    #[test]
    fn power_saturates() {
        let mut deps = mock_dependencies();
        let storage = deps.as_mut().storage;
        add_power(storage, 1, "f1", 100).unwrap();
        sub_power(storage, 2, "f1", 150).unwrap();
        assert_eq!(fps().load(storage, "f1").unwrap().power, 0);
        assert_eq!(
            fps().may_load_at_height(storage, "f1", 2).unwrap().unwrap().power,
            100
        );
    }
}
