//! Honest delegation fixtures: a staking tx together with every pre-signed transaction a
//! staker and the covenant committee exchange before the stake becomes active.

use std::collections::HashMap;

use bitcoin::absolute::LockTime;
use bitcoin::consensus::serialize;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::SecretKey;
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, WPubkeyHash, Witness,
    XOnlyPublicKey,
};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use babylon_apis::btc_staking_api::{CovenantSignatures, NewBtcDelegation, ProofOfPossessionBtc};
use babylon_btcstaking::signer::{enc_sign_tx, schnorr_sign_tx, sign_pop_bip340};
use babylon_btcstaking::tx_verify::{build_slashing_tx, SlashingTxParams};
use babylon_btcstaking::witness::build_unbonding_witness;
use babylon_btcstaking::{PopMessage, ProofOfPossession, SpendPath, StakingInfo};

use crate::keys::{covenant_sks, x_only};

const CHANGE_VALUE: u64 = 10_000;

/// Staking parameters the fixtures are built against. They must mirror the params version the
/// contract under test validates with.
#[derive(Clone, Debug)]
pub struct FixtureParams {
    pub covenant_sks: Vec<SecretKey>,
    pub covenant_quorum: u32,
    pub slashing_pk_script: ScriptBuf,
    pub slashing_rate: Decimal,
    pub min_slashing_tx_fee_sat: u64,
    pub unbonding_fee_sat: u64,
}

impl Default for FixtureParams {
    fn default() -> Self {
        FixtureParams {
            covenant_sks: covenant_sks(5),
            covenant_quorum: 3,
            slashing_pk_script: default_slashing_pk_script(),
            slashing_rate: Decimal::new(1, 1),
            min_slashing_tx_fee_sat: 1_000,
            unbonding_fee_sat: 1_000,
        }
    }
}

impl FixtureParams {
    pub fn covenant_pks(&self) -> Vec<XOnlyPublicKey> {
        self.covenant_sks.iter().map(x_only).collect()
    }

    fn slashing_params(&self, change_lock_time: u16) -> SlashingTxParams {
        SlashingTxParams {
            slashing_pk_script: &self.slashing_pk_script,
            slashing_rate: self.slashing_rate,
            min_fee: self.min_slashing_tx_fee_sat,
            change_lock_time,
        }
    }
}

pub fn default_slashing_pk_script() -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([0x5a; 20]))
}

/// DelegationFixture holds an honestly constructed delegation
#[derive(Clone, Debug)]
pub struct DelegationFixture {
    pub staker_sk: SecretKey,
    pub fp_pks: Vec<XOnlyPublicKey>,
    pub staking_time: u16,
    pub unbonding_time: u16,
    pub staking_value: u64,
    pub staking_info: StakingInfo,
    pub staking_tx: Transaction,
    pub staking_output_idx: u32,
    pub slashing_tx: Transaction,
    pub delegator_slashing_sig: Vec<u8>,
    pub unbonding_info: StakingInfo,
    pub unbonding_tx: Transaction,
    pub unbonding_slashing_tx: Transaction,
    pub delegator_unbonding_slashing_sig: Vec<u8>,
}

impl DelegationFixture {
    pub fn new(
        params: &FixtureParams,
        staker_sk: SecretKey,
        fp_pks: &[XOnlyPublicKey],
        staking_time: u16,
        unbonding_time: u16,
        staking_value: u64,
    ) -> Self {
        let staker_pk = x_only(&staker_sk);
        let covenant_pks = params.covenant_pks();
        let quorum = params.covenant_quorum as usize;

        let staking_info = StakingInfo::staking(
            &staker_pk,
            fp_pks,
            &covenant_pks,
            quorum,
            staking_time,
            Amount::from_sat(staking_value),
        )
        .unwrap();

        // the staking output sits behind a change output so its index is non-trivial
        let staking_tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::new(
                    funding_txid(&staker_pk, fp_pks, staking_time, staking_value),
                    0,
                ),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![
                TxOut {
                    value: Amount::from_sat(CHANGE_VALUE),
                    script_pubkey: ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array(
                        [0x11; 20],
                    )),
                },
                staking_info.output.clone(),
            ],
        };
        let staking_output_idx = 1;
        let staking_txid = staking_tx.compute_txid();

        let slashing_tx = build_slashing_tx(
            staking_txid,
            staking_output_idx,
            staking_value,
            &staker_pk,
            &params.slashing_params(unbonding_time),
            params.min_slashing_tx_fee_sat,
        )
        .unwrap();
        let slashing_script = staking_info.spend_info(SpendPath::Slashing).unwrap().script;
        let delegator_slashing_sig =
            schnorr_sign_tx(&slashing_tx, &staking_info.output, &slashing_script, &staker_sk)
                .unwrap();

        let unbonding_value = staking_value - params.unbonding_fee_sat;
        let unbonding_info = StakingInfo::unbonding(
            &staker_pk,
            fp_pks,
            &covenant_pks,
            quorum,
            unbonding_time,
            Amount::from_sat(unbonding_value),
        )
        .unwrap();
        let unbonding_tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::new(staking_txid, staking_output_idx),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![unbonding_info.output.clone()],
        };

        let unbonding_slashing_tx = build_slashing_tx(
            unbonding_tx.compute_txid(),
            0,
            unbonding_value,
            &staker_pk,
            &params.slashing_params(unbonding_time),
            params.min_slashing_tx_fee_sat,
        )
        .unwrap();
        let unbonding_slashing_script =
            unbonding_info.spend_info(SpendPath::Slashing).unwrap().script;
        let delegator_unbonding_slashing_sig = schnorr_sign_tx(
            &unbonding_slashing_tx,
            &unbonding_info.output,
            &unbonding_slashing_script,
            &staker_sk,
        )
        .unwrap();

        DelegationFixture {
            staker_sk,
            fp_pks: fp_pks.to_vec(),
            staking_time,
            unbonding_time,
            staking_value,
            staking_info,
            staking_tx,
            staking_output_idx,
            slashing_tx,
            delegator_slashing_sig,
            unbonding_info,
            unbonding_tx,
            unbonding_slashing_tx,
            delegator_unbonding_slashing_sig,
        }
    }

    /// staking_tx_hash is the staking txid in its displayed (byte-reversed) hex form
    pub fn staking_tx_hash(&self) -> String {
        self.staking_tx.compute_txid().to_string()
    }

    pub fn staker_pk_hex(&self) -> String {
        hex::encode(x_only(&self.staker_sk).serialize())
    }

    pub fn fp_pk_hexes(&self) -> Vec<String> {
        self.fp_pks
            .iter()
            .map(|pk| hex::encode(pk.serialize()))
            .collect()
    }

    /// to_msg builds the creation request, signing a BIP-340 proof of possession for
    /// `staker_addr` under `pop_context`
    pub fn to_msg(
        &self,
        staker_addr: &str,
        staker_addr_bytes: &[u8],
        pop_context: &str,
    ) -> NewBtcDelegation {
        let pop = staker_pop(&self.staker_sk, pop_context, staker_addr, staker_addr_bytes);
        NewBtcDelegation {
            staker_addr: staker_addr.to_string(),
            btc_pk_hex: self.staker_pk_hex(),
            pop: Some(pop),
            fp_btc_pk_list: self.fp_pk_hexes(),
            staking_time: self.staking_time as u32,
            staking_value: self.staking_value,
            staking_tx: serialize(&self.staking_tx),
            staking_tx_inclusion_proof: None,
            slashing_tx: serialize(&self.slashing_tx),
            delegator_slashing_sig: self.delegator_slashing_sig.clone(),
            unbonding_time: self.unbonding_time as u32,
            unbonding_tx: serialize(&self.unbonding_tx),
            unbonding_value: self.unbonding_info.output.value.to_sat(),
            unbonding_slashing_tx: serialize(&self.unbonding_slashing_tx),
            delegator_unbonding_slashing_sig: self.delegator_unbonding_slashing_sig.clone(),
        }
    }

    /// covenant_sigs produces the full submission of one covenant member
    pub fn covenant_sigs(&self, cov_sk: &SecretKey) -> CovenantSignatures {
        let slashing_script = self
            .staking_info
            .spend_info(SpendPath::Slashing)
            .unwrap()
            .script;
        let unbonding_script = self
            .staking_info
            .spend_info(SpendPath::Unbonding)
            .unwrap()
            .script;
        let unbonding_slashing_script = self
            .unbonding_info
            .spend_info(SpendPath::Slashing)
            .unwrap()
            .script;

        let slashing_tx_sigs = self
            .fp_pks
            .iter()
            .map(|fp_pk| {
                enc_sign_tx(
                    &self.slashing_tx,
                    &self.staking_info.output,
                    &slashing_script,
                    cov_sk,
                    fp_pk,
                )
                .unwrap()
                .to_bytes()
            })
            .collect();
        let slashing_unbonding_tx_sigs = self
            .fp_pks
            .iter()
            .map(|fp_pk| {
                enc_sign_tx(
                    &self.unbonding_slashing_tx,
                    &self.unbonding_info.output,
                    &unbonding_slashing_script,
                    cov_sk,
                    fp_pk,
                )
                .unwrap()
                .to_bytes()
            })
            .collect();
        let unbonding_tx_sig = schnorr_sign_tx(
            &self.unbonding_tx,
            &self.staking_info.output,
            &unbonding_script,
            cov_sk,
        )
        .unwrap();

        CovenantSignatures {
            cov_pk_hex: hex::encode(x_only(cov_sk).serialize()),
            staking_tx_hash: self.staking_tx_hash(),
            slashing_tx_sigs,
            unbonding_tx_sig,
            slashing_unbonding_tx_sigs,
            stake_expansion_tx_sig: None,
        }
    }

    /// signed_unbonding_tx is the unbonding tx with a complete witness, as it would appear on
    /// Bitcoin once the staker unbonds early
    pub fn signed_unbonding_tx(&self, cov_sks: &[SecretKey]) -> Transaction {
        let script = self
            .staking_info
            .spend_info(SpendPath::Unbonding)
            .unwrap()
            .script;
        let staker_sig = schnorr_sign_tx(
            &self.unbonding_tx,
            &self.staking_info.output,
            &script,
            &self.staker_sk,
        )
        .unwrap();
        let cov_sigs: HashMap<_, _> = cov_sks
            .iter()
            .map(|sk| {
                let sig =
                    schnorr_sign_tx(&self.unbonding_tx, &self.staking_info.output, &script, sk)
                        .unwrap();
                (x_only(sk), sig)
            })
            .collect();
        let mut tx = self.unbonding_tx.clone();
        tx.input[0].witness =
            build_unbonding_witness(&self.staking_info, &staker_sig, &cov_sigs).unwrap();
        tx
    }
}

fn funding_txid(
    staker_pk: &XOnlyPublicKey,
    fp_pks: &[XOnlyPublicKey],
    staking_time: u16,
    staking_value: u64,
) -> Txid {
    let mut hasher = Sha256::new()
        .chain_update(staker_pk.serialize())
        .chain_update(staking_time.to_be_bytes())
        .chain_update(staking_value.to_be_bytes());
    for fp_pk in fp_pks {
        hasher.update(fp_pk.serialize());
    }
    Txid::from_byte_array(hasher.finalize().into())
}

/// staker_pop signs a BIP-340 proof of possession binding `address` to the key of `sk`
pub fn staker_pop(
    sk: &SecretKey,
    context: &str,
    address: &str,
    address_bytes: &[u8],
) -> ProofOfPossessionBtc {
    let msg = PopMessage::new(context, address, address_bytes);
    to_api_pop(sign_pop_bip340(sk, &msg))
}

pub fn to_api_pop(pop: ProofOfPossession) -> ProofOfPossessionBtc {
    match pop {
        ProofOfPossession::Bip340(sig) => ProofOfPossessionBtc::Bip340 { sig },
        ProofOfPossession::Bip322(bip322) => ProofOfPossessionBtc::Bip322 {
            address: bip322.address,
            sig: bip322.sig,
        },
        ProofOfPossession::Ecdsa(sig) => ProofOfPossessionBtc::Ecdsa { sig },
    }
}
