//! Signing counterparts of the verifiers in this crate, used by stakers, covenant members
//! and to finalize slashing transactions once a finality provider key is known.

use crate::adaptor_sig::AdaptorSignature;
use crate::error::Error;
use crate::pop::{
    bip322_to_sign, bip322_to_spend, p2tr_key_spend_sighash, p2wpkh_sighash, Bip322Sig,
    PopMessage, ProofOfPossession,
};
use crate::sig_verify::{calc_sighash, calc_sighash_with_prevouts, to_verifying_key};
use crate::Result;
use bitcoin::key::TapTweak;
use bitcoin::secp256k1::{Keypair, Message, Secp256k1, SecretKey};
use bitcoin::{Address, CompressedPublicKey, Network, Script, Transaction, TxOut, Witness};
use bitcoin::XOnlyPublicKey;
use k256::ecdsa::signature::hazmat::PrehashSigner;

fn sign_digest(digest: [u8; 32], sk: &SecretKey) -> [u8; 64] {
    let secp = Secp256k1::signing_only();
    let keypair = Keypair::from_secret_key(&secp, sk);
    secp.sign_schnorr_no_aux_rand(&Message::from_digest(digest), &keypair)
        .serialize()
}

/// schnorr_sign_tx signs a single-input transaction spending `funding_output` via `path_script`
pub fn schnorr_sign_tx(
    tx: &Transaction,
    funding_output: &TxOut,
    path_script: &Script,
    sk: &SecretKey,
) -> Result<Vec<u8>> {
    let sighash = calc_sighash(tx, funding_output, path_script)?;
    Ok(sign_digest(sighash, sk).to_vec())
}

/// schnorr_sign_tx_input signs input `input_idx` of a transaction with several inputs
pub fn schnorr_sign_tx_input(
    tx: &Transaction,
    input_idx: usize,
    prevouts: &[TxOut],
    path_script: &Script,
    sk: &SecretKey,
) -> Result<Vec<u8>> {
    let sighash = calc_sighash_with_prevouts(tx, input_idx, prevouts, path_script)?;
    Ok(sign_digest(sighash, sk).to_vec())
}

/// enc_sign_tx produces a covenant adaptor signature over a slashing transaction,
/// encrypted by a finality provider key
pub fn enc_sign_tx(
    tx: &Transaction,
    funding_output: &TxOut,
    path_script: &Script,
    sk: &SecretKey,
    enc_key: &XOnlyPublicKey,
) -> Result<AdaptorSignature> {
    let sighash = calc_sighash(tx, funding_output, path_script)?;
    AdaptorSignature::enc_sign(&to_schnorr_key(sk)?, &to_verifying_key(enc_key)?, sighash)
}

pub fn to_schnorr_key(sk: &SecretKey) -> Result<k256::schnorr::SigningKey> {
    k256::schnorr::SigningKey::from_bytes(&sk.secret_bytes())
        .map_err(|e| Error::FailedToParseSecretKey(e.to_string()))
}

fn to_ecdsa_key(sk: &SecretKey) -> Result<k256::ecdsa::SigningKey> {
    k256::ecdsa::SigningKey::from_slice(&sk.secret_bytes())
        .map_err(|e| Error::FailedToParseSecretKey(e.to_string()))
}

fn compressed_pk(sk: &SecretKey) -> CompressedPublicKey {
    CompressedPublicKey(bitcoin::secp256k1::PublicKey::from_secret_key(
        &Secp256k1::signing_only(),
        sk,
    ))
}

pub fn sign_pop_bip340(sk: &SecretKey, msg: &PopMessage) -> ProofOfPossession {
    ProofOfPossession::Bip340(sign_digest(msg.bip340_digest(), sk).to_vec())
}

pub fn sign_pop_ecdsa(sk: &SecretKey, msg: &PopMessage) -> Result<ProofOfPossession> {
    let (signature, recovery_id) = to_ecdsa_key(sk)?
        .sign_prehash_recoverable(&msg.ecdsa_digest())
        .map_err(|e| Error::InvalidEcdsaSignature(e.to_string()))?;
    let mut sig = Vec::with_capacity(65);
    // compressed key flag
    sig.push(27 + 4 + recovery_id.to_byte());
    sig.extend_from_slice(&signature.to_bytes());
    Ok(ProofOfPossession::Ecdsa(sig))
}

pub fn bip322_p2wpkh_address(sk: &SecretKey, network: Network) -> String {
    Address::p2wpkh(&compressed_pk(sk), network).to_string()
}

pub fn bip322_p2tr_address(sk: &SecretKey, network: Network) -> String {
    let secp = Secp256k1::signing_only();
    let (internal_key, _) = Keypair::from_secret_key(&secp, sk).x_only_public_key();
    Address::p2tr(&Secp256k1::verification_only(), internal_key, None, network).to_string()
}

pub fn sign_pop_bip322_p2wpkh(
    sk: &SecretKey,
    msg: &PopMessage,
    network: Network,
) -> Result<ProofOfPossession> {
    let pk = compressed_pk(sk);
    let address = Address::p2wpkh(&pk, network);
    let script_pubkey = address.script_pubkey();
    let to_spend = bip322_to_spend(msg.text().as_bytes(), &script_pubkey);
    let unsigned = bip322_to_sign(&to_spend, Witness::new());

    let signature: k256::ecdsa::Signature = to_ecdsa_key(sk)?
        .sign_prehash(&p2wpkh_sighash(&unsigned, &script_pubkey)?)
        .map_err(|e| Error::InvalidEcdsaSignature(e.to_string()))?;
    let mut sig = signature.to_der().as_bytes().to_vec();
    sig.push(bitcoin::EcdsaSighashType::All as u8);

    let witness = Witness::from_slice(&[sig, pk.to_bytes().to_vec()]);
    Ok(ProofOfPossession::Bip322(Bip322Sig {
        address: address.to_string(),
        sig: bitcoin::consensus::serialize(&witness),
    }))
}

pub fn sign_pop_bip322_p2tr(
    sk: &SecretKey,
    msg: &PopMessage,
    network: Network,
) -> Result<ProofOfPossession> {
    let secp = Secp256k1::new();
    let keypair = Keypair::from_secret_key(&secp, sk);
    let address = Address::p2tr(&secp, keypair.x_only_public_key().0, None, network);
    let script_pubkey = address.script_pubkey();
    let to_spend = bip322_to_spend(msg.text().as_bytes(), &script_pubkey);
    let unsigned = bip322_to_sign(&to_spend, Witness::new());

    let sighash = p2tr_key_spend_sighash(&unsigned, &to_spend)?;
    let tweaked = keypair.tap_tweak(&secp, None).to_inner();
    let sig = secp
        .sign_schnorr_no_aux_rand(&Message::from_digest(sighash), &tweaked)
        .serialize();

    let witness = Witness::from_slice(&[sig.to_vec()]);
    Ok(ProofOfPossession::Bip322(Bip322Sig {
        address: address.to_string(),
        sig: bitcoin::consensus::serialize(&witness),
    }))
}
