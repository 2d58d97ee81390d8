//! Witness assembly for spends of staking and unbonding outputs.
//!
//! Leaf scripts consume signatures in key order, so a witness lists them bottom-up:
//! covenant signatures for the sorted covenant keys in reverse order, then the finality
//! provider signatures in reverse order, then the staker signature, then the revealed
//! script and its control block. Keys that did not sign get an empty element.

use std::collections::HashMap;

use bitcoin::secp256k1::{Keypair, Secp256k1, SecretKey};
use bitcoin::{Transaction, Witness, XOnlyPublicKey};

use crate::adaptor_sig::AdaptorSignature;
use crate::error::Error;
use crate::scripts_utils::{SpendInfo, SpendPath, StakingInfo};
use crate::signer::{schnorr_sign_tx, to_schnorr_key};
use crate::Result;

/// covenant_witness_elements picks the signatures of the first `quorum` signers in key order
/// and lays them out as the covenant part of a witness
pub fn covenant_witness_elements(
    covenant_keys: &[XOnlyPublicKey],
    sigs: &HashMap<XOnlyPublicKey, Vec<u8>>,
    quorum: usize,
) -> Result<Vec<Vec<u8>>> {
    let mut included = 0usize;
    let mut elements: Vec<Vec<u8>> = covenant_keys
        .iter()
        .map(|key| match sigs.get(key) {
            Some(sig) if included < quorum => {
                included += 1;
                sig.clone()
            }
            _ => vec![],
        })
        .collect();
    if included < quorum {
        return Err(Error::InsufficientCovenantSigs(quorum, included));
    }
    elements.reverse();
    Ok(elements)
}

/// fp_witness_elements lays out the finality provider part of a slashing witness, where only
/// `signer` contributes a signature
pub fn fp_witness_elements(
    fp_keys: &[XOnlyPublicKey],
    signer: &XOnlyPublicKey,
    sig: Vec<u8>,
) -> Result<Vec<Vec<u8>>> {
    if !fp_keys.contains(signer) {
        return Err(Error::FpKeyNotInScript {});
    }
    let mut sig = Some(sig);
    let mut elements: Vec<Vec<u8>> = fp_keys
        .iter()
        .map(|key| {
            if key == signer {
                sig.take().unwrap_or_default()
            } else {
                vec![]
            }
        })
        .collect();
    elements.reverse();
    Ok(elements)
}

fn assemble(
    mut elements: Vec<Vec<u8>>,
    staker_sig: &[u8],
    spend_info: &SpendInfo,
) -> Witness {
    elements.push(staker_sig.to_vec());
    elements.push(spend_info.script.to_bytes());
    elements.push(spend_info.control_block_bytes());
    Witness::from_slice(&elements)
}

/// build_timelock_witness spends the output after its timelock with the staker key only
pub fn build_timelock_witness(info: &StakingInfo, staker_sig: &[u8]) -> Result<Witness> {
    Ok(assemble(
        vec![],
        staker_sig,
        &info.spend_info(SpendPath::Timelock)?,
    ))
}

/// build_unbonding_witness spends a staking output through the unbonding path
pub fn build_unbonding_witness(
    info: &StakingInfo,
    staker_sig: &[u8],
    covenant_sigs: &HashMap<XOnlyPublicKey, Vec<u8>>,
) -> Result<Witness> {
    let elements =
        covenant_witness_elements(&info.covenant_keys, covenant_sigs, info.covenant_quorum)?;
    Ok(assemble(
        elements,
        staker_sig,
        &info.spend_info(SpendPath::Unbonding)?,
    ))
}

/// build_slashing_witness spends an output through the slashing path
pub fn build_slashing_witness(
    info: &StakingInfo,
    staker_sig: &[u8],
    fp_key: &XOnlyPublicKey,
    fp_sig: Vec<u8>,
    covenant_sigs: &HashMap<XOnlyPublicKey, Vec<u8>>,
) -> Result<Witness> {
    let mut elements =
        covenant_witness_elements(&info.covenant_keys, covenant_sigs, info.covenant_quorum)?;
    elements.extend(fp_witness_elements(&info.fp_keys, fp_key, fp_sig)?);
    Ok(assemble(
        elements,
        staker_sig,
        &info.spend_info(SpendPath::Slashing)?,
    ))
}

/// finalize_slashing_tx signs the slashing tx with the finality provider secret key, decrypts
/// the covenant adaptor signatures encrypted under that provider's key, and fills in the
/// witness of its only input
pub fn finalize_slashing_tx(
    slashing_tx: &Transaction,
    info: &StakingInfo,
    staker_sig: &[u8],
    fp_sk: &SecretKey,
    covenant_adaptor_sigs: &[(XOnlyPublicKey, AdaptorSignature)],
) -> Result<Transaction> {
    let fp_key = Keypair::from_secret_key(&Secp256k1::signing_only(), fp_sk)
        .x_only_public_key()
        .0;
    if !info.fp_keys.contains(&fp_key) {
        return Err(Error::FpKeyNotInScript {});
    }

    let script = info.spend_info(SpendPath::Slashing)?.script;
    let fp_sig = schnorr_sign_tx(slashing_tx, &info.output, &script, fp_sk)?;

    let dec_key = to_schnorr_key(fp_sk)?;
    let covenant_sigs = covenant_adaptor_sigs
        .iter()
        .map(|(cov_pk, asig)| {
            let sig = asig.decrypt(&dec_key)?;
            Ok((*cov_pk, sig.to_bytes().to_vec()))
        })
        .collect::<Result<HashMap<_, _>>>()?;

    let mut signed = slashing_tx.clone();
    signed.input[0].witness =
        build_slashing_witness(info, staker_sig, &fp_key, fp_sig, &covenant_sigs)?;
    Ok(signed)
}
