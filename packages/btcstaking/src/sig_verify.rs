use crate::adaptor_sig::AdaptorSignature;
use crate::error::Error;
use crate::Result;
use bitcoin::hashes::Hash;
use bitcoin::sighash::{Prevouts, SighashCache};
use bitcoin::{Script, Transaction, TxOut, XOnlyPublicKey};
use k256::schnorr::signature::hazmat::PrehashVerifier;
use k256::schnorr::Signature as SchnorrSignature;
use k256::schnorr::VerifyingKey;

/// BIP340_SIG_SIZE is the size of a Schnorr signature with the default sighash type
pub const BIP340_SIG_SIZE: usize = 64;

/// calc_sighash computes the taproot script-spend sighash of a single-input transaction
/// spending `funding_output` via `path_script`
pub fn calc_sighash(
    transaction: &Transaction,
    funding_output: &TxOut,
    path_script: &Script,
) -> Result<[u8; 32]> {
    // Check for incorrect input count
    if transaction.input.len() != 1 {
        return Err(Error::TxInputCountMismatch(1, transaction.input.len()));
    }

    calc_sighash_with_prevouts(transaction, 0, &[funding_output.clone()], path_script)
}

/// calc_sighash_with_prevouts computes the taproot script-spend sighash of input `input_idx`,
/// given the outputs spent by every input of the transaction
pub fn calc_sighash_with_prevouts(
    transaction: &Transaction,
    input_idx: usize,
    prevouts: &[TxOut],
    path_script: &Script,
) -> Result<[u8; 32]> {
    if prevouts.len() != transaction.input.len() {
        return Err(Error::TxInputCountMismatch(
            transaction.input.len(),
            prevouts.len(),
        ));
    }

    // calculate tap leaf hash for the given path of the script
    let tap_leaf_hash = path_script.tapscript_leaf_hash();

    let mut sighash_cache = SighashCache::new(transaction);
    let sighash = sighash_cache
        .taproot_script_spend_signature_hash(
            input_idx,
            &Prevouts::All(prevouts),
            tap_leaf_hash,
            bitcoin::TapSighashType::Default,
        )
        .map_err(|e| Error::SighashFailed(e.to_string()))?;

    Ok(sighash.to_raw_hash().to_byte_array())
}

pub fn to_verifying_key(pub_key: &XOnlyPublicKey) -> Result<VerifyingKey> {
    VerifyingKey::from_bytes(&pub_key.serialize())
        .map_err(|e| Error::FailedToParsePublicKey(e.to_string()))
}

/// verify_schnorr_sig checks a BIP-340 signature over a precomputed 32-byte digest
pub fn verify_schnorr_sig(digest: &[u8; 32], pub_key: &XOnlyPublicKey, sig: &[u8]) -> Result<()> {
    if sig.len() != BIP340_SIG_SIZE {
        return Err(Error::InvalidSchnorrSignature(format!(
            "expected {BIP340_SIG_SIZE} bytes, got {}",
            sig.len()
        )));
    }
    let signature = SchnorrSignature::try_from(sig)
        .map_err(|e| Error::InvalidSchnorrSignature(e.to_string()))?;
    to_verifying_key(pub_key)?
        .verify_prehash(digest, &signature)
        .map_err(|e| Error::InvalidSchnorrSignature(e.to_string()))
}

/// verify_transaction_sig_with_output verifies the validity of a Schnorr signature for a given transaction
pub fn verify_transaction_sig_with_output(
    transaction: &Transaction,
    funding_output: &TxOut,
    path_script: &Script,
    pub_key: &XOnlyPublicKey,
    signature: &[u8],
) -> Result<()> {
    let sighash = calc_sighash(transaction, funding_output, path_script)?;
    verify_schnorr_sig(&sighash, pub_key, signature)
}

/// enc_verify_transaction_sig_with_output verifies the validity of a Schnorr adaptor signature for a given transaction
pub fn enc_verify_transaction_sig_with_output(
    transaction: &Transaction,
    funding_output: &TxOut,
    path_script: &Script,
    pub_key: &XOnlyPublicKey,
    enc_key: &XOnlyPublicKey,
    signature: &AdaptorSignature,
) -> Result<()> {
    let sighash_msg = calc_sighash(transaction, funding_output, path_script)?;
    signature.verify(
        &to_verifying_key(pub_key)?,
        &to_verifying_key(enc_key)?,
        sighash_msg,
    )
}
