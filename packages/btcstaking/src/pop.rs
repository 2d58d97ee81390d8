//! Proof of possession: evidence that the owner of an address on the staking chain also
//! controls a Bitcoin key.
//!
//! Three encodings are accepted:
//! - BIP-340: Schnorr signature over `sha256(context || address_bytes)`
//! - BIP-322 "simple": a witness for a P2WPKH or BIP-86 P2TR address over `context || address`
//! - ECDSA: compact recoverable signature over the Bitcoin signed-message hash of
//!   `context || address`

use crate::error::Error;
use crate::sig_verify::verify_schnorr_sig;
use crate::Result;
use bitcoin::absolute::LockTime;
use bitcoin::address::AddressType;
use bitcoin::blockdata::opcodes::all::OP_RETURN;
use bitcoin::blockdata::opcodes::OP_0;
use bitcoin::blockdata::script::Builder;
use bitcoin::hashes::Hash;
use bitcoin::key::TapTweak;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::sighash::{EcdsaSighashType, Prevouts, SighashCache, TapSighashType};
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, CompressedPublicKey, Network, OutPoint, ScriptBuf, Sequence, Transaction,
    TxIn, TxOut, Txid, Witness, XOnlyPublicKey,
};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::{Digest, Sha256};
use std::str::FromStr;

const BIP322_TAG: &[u8] = b"BIP0322-signed-message";

/// ECDSA_SIG_SIZE is the size of a compact recoverable signature with its header byte
pub const ECDSA_SIG_SIZE: usize = 65;

const STAKER_POP_CONTEXT: &str = "staker_pop";
const FP_POP_CONTEXT: &str = "fp_pop";
const PROTOCOL_NAME: &str = "btcstaking";
const VERSION: u8 = 0;

fn signing_context(kind: &str, chain_id: &str, contract_addr: &str) -> String {
    let raw = format!("{PROTOCOL_NAME}/{VERSION}/{kind}/{chain_id}/{contract_addr}");
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// staker_pop_context is the signing context of a staker's proof of possession
pub fn staker_pop_context(chain_id: &str, contract_addr: &str) -> String {
    signing_context(STAKER_POP_CONTEXT, chain_id, contract_addr)
}

/// fp_pop_context is the signing context of a finality provider's proof of possession
pub fn fp_pop_context(chain_id: &str, contract_addr: &str) -> String {
    signing_context(FP_POP_CONTEXT, chain_id, contract_addr)
}

/// PopMessage is the statement a proof of possession signs: a signing context followed by
/// the staking-chain address, either in canonical byte form or as its bech32 string
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PopMessage {
    pub context: String,
    pub address: String,
    pub address_bytes: Vec<u8>,
}

impl PopMessage {
    pub fn new(context: &str, address: &str, address_bytes: &[u8]) -> Self {
        PopMessage {
            context: context.to_string(),
            address: address.to_string(),
            address_bytes: address_bytes.to_vec(),
        }
    }

    /// bip340_digest is the message signed by a BIP-340 proof
    pub fn bip340_digest(&self) -> [u8; 32] {
        Sha256::new()
            .chain_update(self.context.as_bytes())
            .chain_update(&self.address_bytes)
            .finalize()
            .into()
    }

    /// text is the message signed by BIP-322 and ECDSA proofs
    pub fn text(&self) -> String {
        format!("{}{}", self.context, self.address)
    }

    /// ecdsa_digest is the Bitcoin signed-message hash of `text`
    pub fn ecdsa_digest(&self) -> [u8; 32] {
        bitcoin::sign_message::signed_msg_hash(&self.text()).to_byte_array()
    }
}

/// Bip322Sig carries the signing address and the consensus-encoded witness
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bip322Sig {
    pub address: String,
    pub sig: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProofOfPossession {
    Bip340(Vec<u8>),
    Bip322(Bip322Sig),
    Ecdsa(Vec<u8>),
}

impl ProofOfPossession {
    pub fn verify(&self, btc_pk: &XOnlyPublicKey, msg: &PopMessage, network: Network) -> Result<()> {
        match self {
            ProofOfPossession::Bip340(sig) => verify_schnorr_sig(&msg.bip340_digest(), btc_pk, sig),
            ProofOfPossession::Bip322(bip322) => verify_bip322(bip322, btc_pk, msg, network),
            ProofOfPossession::Ecdsa(sig) => verify_ecdsa(sig, btc_pk, msg),
        }
    }
}

/// bip322_msg_hash is the tagged hash committed to by the BIP-322 virtual transaction
pub fn bip322_msg_hash(msg: &[u8]) -> [u8; 32] {
    let tag_hash = Sha256::digest(BIP322_TAG);
    Sha256::new()
        .chain_update(tag_hash)
        .chain_update(tag_hash)
        .chain_update(msg)
        .finalize()
        .into()
}

/// bip322_to_spend builds the virtual transaction whose output the signer "spends"
pub fn bip322_to_spend(msg: &[u8], script_pubkey: &ScriptBuf) -> Transaction {
    let script_sig = Builder::new()
        .push_opcode(OP_0)
        .push_slice(bip322_msg_hash(msg))
        .into_script();
    Transaction {
        version: Version(0),
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint {
                txid: Txid::all_zeros(),
                vout: 0xFFFF_FFFF,
            },
            script_sig,
            sequence: Sequence::ZERO,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::ZERO,
            script_pubkey: script_pubkey.clone(),
        }],
    }
}

/// bip322_to_sign builds the virtual transaction carrying the signature witness
pub fn bip322_to_sign(to_spend: &Transaction, witness: Witness) -> Transaction {
    Transaction {
        version: Version(0),
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint {
                txid: to_spend.compute_txid(),
                vout: 0,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ZERO,
            witness,
        }],
        output: vec![TxOut {
            value: Amount::ZERO,
            script_pubkey: Builder::new().push_opcode(OP_RETURN).into_script(),
        }],
    }
}

pub fn p2wpkh_sighash(to_sign: &Transaction, script_pubkey: &ScriptBuf) -> Result<[u8; 32]> {
    let sighash = SighashCache::new(to_sign)
        .p2wpkh_signature_hash(0, script_pubkey, Amount::ZERO, EcdsaSighashType::All)
        .map_err(|e| Error::SighashFailed(e.to_string()))?;
    Ok(sighash.to_byte_array())
}

pub fn p2tr_key_spend_sighash(to_sign: &Transaction, to_spend: &Transaction) -> Result<[u8; 32]> {
    let sighash = SighashCache::new(to_sign)
        .taproot_key_spend_signature_hash(
            0,
            &Prevouts::All(&to_spend.output[..]),
            TapSighashType::Default,
        )
        .map_err(|e| Error::SighashFailed(e.to_string()))?;
    Ok(sighash.to_byte_array())
}

fn verify_bip322(
    bip322: &Bip322Sig,
    btc_pk: &XOnlyPublicKey,
    msg: &PopMessage,
    network: Network,
) -> Result<()> {
    let address = Address::from_str(&bip322.address)
        .map_err(|e| Error::InvalidBip322Address(e.to_string()))?
        .require_network(network)
        .map_err(|e| Error::InvalidBip322Address(e.to_string()))?;
    let witness: Witness = bitcoin::consensus::deserialize(&bip322.sig)
        .map_err(|e| Error::InvalidBip322Witness(e.to_string()))?;

    let script_pubkey = address.script_pubkey();
    let to_spend = bip322_to_spend(msg.text().as_bytes(), &script_pubkey);
    let to_sign = bip322_to_sign(&to_spend, witness.clone());

    match address.address_type() {
        Some(AddressType::P2wpkh) => {
            if witness.len() != 2 {
                return Err(Error::InvalidBip322Witness(format!(
                    "p2wpkh witness must have 2 elements, got {}",
                    witness.len()
                )));
            }
            let (sig, pk) = (&witness[0], &witness[1]);
            let pk = CompressedPublicKey::from_slice(pk)
                .map_err(|e| Error::FailedToParsePublicKey(e.to_string()))?;
            if ScriptBuf::new_p2wpkh(&pk.wpubkey_hash()) != script_pubkey {
                return Err(Error::InvalidBip322Witness(
                    "public key does not match address".to_string(),
                ));
            }
            let (sighash_type, der) = sig
                .split_last()
                .ok_or(Error::InvalidEcdsaSignature("empty signature".to_string()))?;
            if *sighash_type != EcdsaSighashType::All as u8 {
                return Err(Error::InvalidEcdsaSignature(format!(
                    "unsupported sighash type {sighash_type}"
                )));
            }
            let signature = k256::ecdsa::Signature::from_der(der)
                .map_err(|e| Error::InvalidEcdsaSignature(e.to_string()))?;
            let signature = signature.normalize_s().unwrap_or(signature);
            let verifying_key = k256::ecdsa::VerifyingKey::from_sec1_bytes(&pk.to_bytes())
                .map_err(|e| Error::FailedToParsePublicKey(e.to_string()))?;
            verifying_key
                .verify_prehash(&p2wpkh_sighash(&to_sign, &script_pubkey)?, &signature)
                .map_err(|e| Error::InvalidEcdsaSignature(e.to_string()))?;

            if pk.0.x_only_public_key().0 != *btc_pk {
                return Err(Error::PopKeyMismatch {});
            }
            Ok(())
        }
        Some(AddressType::P2tr) => {
            // only BIP-86 key-spend outputs of the claimed key are accepted
            let secp = Secp256k1::verification_only();
            if ScriptBuf::new_p2tr(&secp, *btc_pk, None) != script_pubkey {
                return Err(Error::PopKeyMismatch {});
            }
            if witness.len() != 1 {
                return Err(Error::InvalidBip322Witness(format!(
                    "p2tr witness must have 1 element, got {}",
                    witness.len()
                )));
            }
            let sig = &witness[0];
            let sig = match sig.len() {
                64 => sig,
                65 if sig[64] == TapSighashType::All as u8 => &sig[..64],
                _ => {
                    return Err(Error::InvalidSchnorrSignature(format!(
                        "invalid taproot signature length {}",
                        sig.len()
                    )))
                }
            };
            let (output_key, _) = btc_pk.tap_tweak(&secp, None);
            verify_schnorr_sig(
                &p2tr_key_spend_sighash(&to_sign, &to_spend)?,
                &output_key.to_inner(),
                sig,
            )
        }
        _ => Err(Error::UnsupportedBip322Address(bip322.address.clone())),
    }
}

fn verify_ecdsa(sig: &[u8], btc_pk: &XOnlyPublicKey, msg: &PopMessage) -> Result<()> {
    if sig.len() != ECDSA_SIG_SIZE {
        return Err(Error::InvalidEcdsaSignature(format!(
            "expected {ECDSA_SIG_SIZE} bytes, got {}",
            sig.len()
        )));
    }
    // header byte: 27 + recovery id, plus 4 for compressed keys
    let header = sig[0];
    if !(27..=34).contains(&header) {
        return Err(Error::InvalidEcdsaSignature(format!(
            "invalid header byte {header}"
        )));
    }
    let recovery_id = k256::ecdsa::RecoveryId::from_byte((header - 27) & 3).ok_or(
        Error::InvalidEcdsaSignature(format!("invalid recovery id in header {header}")),
    )?;
    let signature = k256::ecdsa::Signature::from_slice(&sig[1..])
        .map_err(|e| Error::InvalidEcdsaSignature(e.to_string()))?;
    let recovered = k256::ecdsa::VerifyingKey::recover_from_prehash(
        &msg.ecdsa_digest(),
        &signature,
        recovery_id,
    )
    .map_err(|e| Error::InvalidEcdsaSignature(e.to_string()))?;

    let encoded = recovered.to_encoded_point(true);
    if encoded.as_bytes()[1..] != btc_pk.serialize()[..] {
        return Err(Error::PopKeyMismatch {});
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::{
        bip322_p2tr_address, bip322_p2wpkh_address, sign_pop_bip322_p2tr,
        sign_pop_bip322_p2wpkh, sign_pop_bip340, sign_pop_ecdsa,
    };
    use crate::test_keys::{secret_key, x_only};
    use rand::RngCore;

    fn message(addr: &str) -> PopMessage {
        PopMessage::new(
            &staker_pop_context("test-chain", "contract"),
            addr,
            addr.as_bytes(),
        )
    }

    #[test]
    fn all_encodings_verify_for_random_keys() {
        let mut rng = rand::thread_rng();
        for i in 0..8 {
            let mut seed = [0u8; 16];
            rng.fill_bytes(&mut seed);
            let sk = secret_key(&hex::encode(seed));
            let pk = x_only(&sk);
            let msg = message(&format!("bbn1staker{i}"));

            let pops = vec![
                sign_pop_bip340(&sk, &msg),
                sign_pop_ecdsa(&sk, &msg).unwrap(),
                sign_pop_bip322_p2wpkh(&sk, &msg, Network::Regtest).unwrap(),
                sign_pop_bip322_p2tr(&sk, &msg, Network::Regtest).unwrap(),
            ];
            for pop in pops {
                pop.verify(&pk, &msg, Network::Regtest).unwrap();
            }
        }
    }

    #[test]
    fn proofs_do_not_transfer_to_other_addresses() {
        let sk = secret_key("staker");
        let pk = x_only(&sk);
        let msg = message("bbn1alice");
        let other = message("bbn1bob");

        let pops = vec![
            sign_pop_bip340(&sk, &msg),
            sign_pop_ecdsa(&sk, &msg).unwrap(),
            sign_pop_bip322_p2wpkh(&sk, &msg, Network::Regtest).unwrap(),
            sign_pop_bip322_p2tr(&sk, &msg, Network::Regtest).unwrap(),
        ];
        for pop in pops {
            assert!(pop.verify(&pk, &other, Network::Regtest).is_err());
        }
    }

    #[test]
    fn proofs_do_not_transfer_to_other_keys() {
        let sk = secret_key("staker");
        let other_pk = x_only(&secret_key("mallory"));
        let msg = message("bbn1alice");

        assert!(sign_pop_bip340(&sk, &msg)
            .verify(&other_pk, &msg, Network::Regtest)
            .is_err());
        assert_eq!(
            sign_pop_ecdsa(&sk, &msg)
                .unwrap()
                .verify(&other_pk, &msg, Network::Regtest),
            Err(Error::PopKeyMismatch {})
        );
        assert_eq!(
            sign_pop_bip322_p2wpkh(&sk, &msg, Network::Regtest)
                .unwrap()
                .verify(&other_pk, &msg, Network::Regtest),
            Err(Error::PopKeyMismatch {})
        );
        assert_eq!(
            sign_pop_bip322_p2tr(&sk, &msg, Network::Regtest)
                .unwrap()
                .verify(&other_pk, &msg, Network::Regtest),
            Err(Error::PopKeyMismatch {})
        );
    }

    #[test]
    fn bip322_rejects_unsupported_addresses() {
        let sk = secret_key("staker");
        let pk = x_only(&sk);
        let msg = message("bbn1alice");
        let pubkey = bitcoin::PublicKey::new(bitcoin::secp256k1::PublicKey::from_secret_key(
            &Secp256k1::new(),
            &sk,
        ));
        let p2pkh = Address::p2pkh(pubkey.pubkey_hash(), Network::Regtest).to_string();
        let pop = ProofOfPossession::Bip322(Bip322Sig {
            address: p2pkh.clone(),
            sig: bitcoin::consensus::serialize(&Witness::new()),
        });
        assert_eq!(
            pop.verify(&pk, &msg, Network::Regtest),
            Err(Error::UnsupportedBip322Address(p2pkh))
        );

        // address for a different network
        let mainnet = bip322_p2wpkh_address(&sk, Network::Bitcoin);
        let pop = ProofOfPossession::Bip322(Bip322Sig {
            address: mainnet,
            sig: vec![],
        });
        assert!(matches!(
            pop.verify(&pk, &msg, Network::Regtest),
            Err(Error::InvalidBip322Address(_))
        ));
        assert!(bip322_p2tr_address(&sk, Network::Regtest).starts_with("bcrt1p"));
    }

    #[test]
    fn contexts_differ_by_role() {
        assert_ne!(
            staker_pop_context("chain", "addr"),
            fp_pop_context("chain", "addr")
        );
        assert_eq!(staker_pop_context("chain", "addr").len(), 64);
    }
}
