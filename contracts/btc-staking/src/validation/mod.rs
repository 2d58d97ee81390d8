use babylon_apis::btc_staking_api::{
    CovenantSignatures, NewBtcDelegation, ProofOfPossessionBtc, SelectiveSlashingEvidence,
};
use babylon_apis::error::StakingApiError;
use babylon_bitcoin::chain_params::{get_bitcoin_network, Network};
use babylon_btcstaking::sig_verify::{
    calc_sighash_with_prevouts, enc_verify_transaction_sig_with_output,
    verify_schnorr_sig, verify_transaction_sig_with_output,
};
use babylon_btcstaking::tapscript::verify_taproot_spend;
use babylon_btcstaking::tx_verify::{check_transactions, is_simple_transfer};
use babylon_btcstaking::{
    AdaptorSignature, Bip322Sig, PopMessage, ProofOfPossession, SpendPath, StakingInfo,
};
use bitcoin::consensus::deserialize;
use bitcoin::secp256k1::{Keypair, Secp256k1, SecretKey};
use bitcoin::{Amount, OutPoint, Transaction, TxOut, XOnlyPublicKey};

use crate::error::ContractError;
use crate::state::params::{parse_x_only, Params};
use crate::state::staking::BtcDelegation;

/// StakingTxs are the decoded transactions of a delegation request that passed validation
#[derive(Debug)]
pub struct StakingTxs {
    pub staking_tx: Transaction,
    pub staking_output_idx: u32,
    pub staker_pk: XOnlyPublicKey,
    pub fp_pks: Vec<XOnlyPublicKey>,
}

pub fn decode_tx(bytes: &[u8]) -> Result<Transaction, StakingApiError> {
    deserialize(bytes).map_err(|e| StakingApiError::InvalidBtcTx(e.to_string()))
}

fn parse_fp_pks(fp_btc_pk_list: &[String]) -> Result<Vec<XOnlyPublicKey>, ContractError> {
    fp_btc_pk_list.iter().map(|pk| parse_x_only(pk)).collect()
}

/// pop_from converts a wire proof of possession into the form the verifier takes
fn pop_from(pop: &ProofOfPossessionBtc) -> ProofOfPossession {
    match pop {
        ProofOfPossessionBtc::Bip340 { sig } => ProofOfPossession::Bip340(sig.clone()),
        ProofOfPossessionBtc::Bip322 { address, sig } => ProofOfPossession::Bip322(Bip322Sig {
            address: address.clone(),
            sig: sig.clone(),
        }),
        ProofOfPossessionBtc::Ecdsa { sig } => ProofOfPossession::Ecdsa(sig.clone()),
    }
}

/// verify_pop checks that the holder of `btc_pk` signed `msg`
pub fn verify_pop(
    network: Network,
    btc_pk: &XOnlyPublicKey,
    pop: Option<&ProofOfPossessionBtc>,
    msg: &PopMessage,
) -> Result<(), ContractError> {
    let pop = pop.ok_or(ContractError::InvalidProofOfPossession(
        "proof of possession is missing".to_string(),
    ))?;
    pop_from(pop)
        .verify(btc_pk, msg, get_bitcoin_network(network))
        .map_err(|e| ContractError::InvalidProofOfPossession(e.to_string()))
}

/// verify_new_delegation verifies a delegation request against the params version it is
/// created under. `min_unbonding_time` is the largest of the params' unbonding time and the
/// checkpoint finalization timeout.
pub fn verify_new_delegation(
    network: Network,
    params: &Params,
    min_unbonding_time: u32,
    del: &NewBtcDelegation,
    pop_msg: &PopMessage,
) -> Result<StakingTxs, ContractError> {
    let staker_pk = parse_x_only(&del.btc_pk_hex)?;
    let fp_pks = parse_fp_pks(&del.fp_btc_pk_list)?;
    let covenant_pks = params.covenant_keys()?;
    let quorum = params.covenant_quorum as usize;

    if del.unbonding_time <= min_unbonding_time {
        return Err(ContractError::InvalidUnbondingTx(format!(
            "unbonding time {} must be larger than {}",
            del.unbonding_time, min_unbonding_time
        )));
    }

    // the staking tx must carry the output the request commits to
    let staking_tx = decode_tx(&del.staking_tx)?;
    let staking_info = StakingInfo::staking(
        &staker_pk,
        &fp_pks,
        &covenant_pks,
        quorum,
        del.staking_time as u16,
        Amount::from_sat(del.staking_value),
    )?;
    let staking_output_idx = staking_info
        .find_output_index(&staking_tx.output)
        .ok_or_else(|| {
            ContractError::InvalidStakingTx("staking tx has no matching staking output".to_string())
        })?;

    if del.staking_time < params.min_staking_time_blocks
        || del.staking_time > params.max_staking_time_blocks
    {
        return Err(ContractError::InvalidStakingTx(format!(
            "staking time {} out of range [{}, {}]",
            del.staking_time, params.min_staking_time_blocks, params.max_staking_time_blocks
        )));
    }
    if del.staking_value < params.min_staking_value_sat
        || del.staking_value > params.max_staking_value_sat
    {
        return Err(ContractError::InvalidStakingTx(format!(
            "staking value {} out of range [{}, {}]",
            del.staking_value, params.min_staking_value_sat, params.max_staking_value_sat
        )));
    }

    let slashing_script = params.slashing_script()?;
    let slashing_params = params.slashing_tx_params(&slashing_script, del.unbonding_time as u16)?;

    // slashing tx of the staking output
    let slashing_tx = decode_tx(&del.slashing_tx)?;
    check_transactions(
        &slashing_tx,
        &staking_tx,
        staking_output_idx,
        &slashing_params,
        &staker_pk,
    )
    .map_err(|e| ContractError::InvalidSlashingTx(e.to_string()))?;
    verify_transaction_sig_with_output(
        &slashing_tx,
        &staking_info.output,
        staking_info.path_script(SpendPath::Slashing)?,
        &staker_pk,
        &del.delegator_slashing_sig,
    )
    .map_err(|e| ContractError::InvalidSlashingTx(e.to_string()))?;

    // unbonding tx
    let unbonding_tx = decode_tx(&del.unbonding_tx)?;
    is_simple_transfer(&unbonding_tx)
        .map_err(|e| ContractError::InvalidUnbondingTx(e.to_string()))?;
    let staking_outpoint = OutPoint::new(staking_tx.compute_txid(), staking_output_idx);
    if unbonding_tx.input[0].previous_output != staking_outpoint {
        return Err(ContractError::InvalidUnbondingTx(
            "unbonding tx does not spend the staking output".to_string(),
        ));
    }
    let expected_unbonding_value = del
        .staking_value
        .checked_sub(params.unbonding_fee_sat)
        .ok_or_else(|| {
            ContractError::InvalidUnbondingTx("staking value does not cover the fee".to_string())
        })?;
    if del.unbonding_value != expected_unbonding_value {
        return Err(ContractError::InvalidUnbondingTx(format!(
            "unbonding value {} must be {}",
            del.unbonding_value, expected_unbonding_value
        )));
    }
    let unbonding_info = StakingInfo::unbonding(
        &staker_pk,
        &fp_pks,
        &covenant_pks,
        quorum,
        del.unbonding_time as u16,
        Amount::from_sat(del.unbonding_value),
    )?;
    if unbonding_tx.output[0] != unbonding_info.output {
        return Err(ContractError::InvalidUnbondingTx(
            "unbonding tx output does not match the unbonding script".to_string(),
        ));
    }

    // slashing tx of the unbonding output
    let unbonding_slashing_tx = decode_tx(&del.unbonding_slashing_tx)?;
    check_transactions(
        &unbonding_slashing_tx,
        &unbonding_tx,
        0,
        &slashing_params,
        &staker_pk,
    )
    .map_err(|e| ContractError::InvalidSlashingTx(e.to_string()))?;
    verify_transaction_sig_with_output(
        &unbonding_slashing_tx,
        &unbonding_info.output,
        unbonding_info.path_script(SpendPath::Slashing)?,
        &staker_pk,
        &del.delegator_unbonding_slashing_sig,
    )
    .map_err(|e| ContractError::InvalidSlashingTx(e.to_string()))?;

    verify_pop(network, &staker_pk, del.pop.as_ref(), pop_msg)?;

    Ok(StakingTxs {
        staking_tx,
        staking_output_idx,
        staker_pk,
        fp_pks,
    })
}

/// staking_info rebuilds the staking output script of a stored delegation
pub fn staking_info(params: &Params, del: &BtcDelegation) -> Result<StakingInfo, ContractError> {
    Ok(StakingInfo::staking(
        &parse_x_only(&del.btc_pk_hex)?,
        &parse_fp_pks(&del.fp_btc_pk_list)?,
        &params.covenant_keys()?,
        params.covenant_quorum as usize,
        del.staking_time as u16,
        Amount::from_sat(del.total_sat),
    )?)
}

/// unbonding_info rebuilds the unbonding output script of a stored delegation
pub fn unbonding_info(
    params: &Params,
    del: &BtcDelegation,
) -> Result<(Transaction, StakingInfo), ContractError> {
    let unbonding_tx = decode_tx(&del.undelegation_info.unbonding_tx)?;
    let value = unbonding_tx
        .output
        .first()
        .map(|out| out.value)
        .ok_or_else(|| ContractError::InvalidUnbondingTx("no unbonding output".to_string()))?;
    let info = StakingInfo::unbonding(
        &parse_x_only(&del.btc_pk_hex)?,
        &parse_fp_pks(&del.fp_btc_pk_list)?,
        &params.covenant_keys()?,
        params.covenant_quorum as usize,
        del.unbonding_time as u16,
        value,
    )?;
    Ok((unbonding_tx, info))
}

fn verify_adaptor_sigs(
    tx: &Transaction,
    info: &StakingInfo,
    cov_pk: &XOnlyPublicKey,
    fp_pks: &[XOnlyPublicKey],
    sigs: &[Vec<u8>],
) -> Result<(), ContractError> {
    let script = info.path_script(SpendPath::Slashing)?;
    for (fp_pk, sig) in fp_pks.iter().zip(sigs) {
        let asig = AdaptorSignature::new(sig)
            .map_err(|e| ContractError::InvalidCovenantSig(e.to_string()))?;
        enc_verify_transaction_sig_with_output(tx, &info.output, script, cov_pk, fp_pk, &asig)
            .map_err(|e| ContractError::InvalidCovenantSig(e.to_string()))?;
    }
    Ok(())
}

/// verify_covenant_sigs checks a covenant member's submission for a delegation: one adaptor
/// signature per finality provider on each slashing tx, plus a signature on the unbonding tx
pub fn verify_covenant_sigs(
    params: &Params,
    del: &BtcDelegation,
    sigs: &CovenantSignatures,
) -> Result<(), ContractError> {
    if !params.has_covenant_pk(&sigs.cov_pk_hex) {
        return Err(ContractError::InvalidCovenantPk(sigs.cov_pk_hex.clone()));
    }
    let cov_pk = parse_x_only(&sigs.cov_pk_hex)?;
    let fp_pks = parse_fp_pks(&del.fp_btc_pk_list)?;

    let fp_count = fp_pks.len();
    if sigs.slashing_tx_sigs.len() != fp_count || sigs.slashing_unbonding_tx_sigs.len() != fp_count
    {
        return Err(ContractError::InvalidCovenantSig(format!(
            "expected {} adaptor signatures per slashing tx",
            fp_count
        )));
    }

    let staking_info = staking_info(params, del)?;
    let slashing_tx = decode_tx(&del.slashing_tx)?;
    verify_adaptor_sigs(
        &slashing_tx,
        &staking_info,
        &cov_pk,
        &fp_pks,
        &sigs.slashing_tx_sigs,
    )?;

    let (unbonding_tx, unbonding_info) = unbonding_info(params, del)?;
    let unbonding_slashing_tx = decode_tx(&del.undelegation_info.slashing_tx)?;
    verify_adaptor_sigs(
        &unbonding_slashing_tx,
        &unbonding_info,
        &cov_pk,
        &fp_pks,
        &sigs.slashing_unbonding_tx_sigs,
    )?;

    verify_transaction_sig_with_output(
        &unbonding_tx,
        &staking_info.output,
        staking_info.path_script(SpendPath::Unbonding)?,
        &cov_pk,
        &sigs.unbonding_tx_sig,
    )
    .map_err(|e| ContractError::InvalidCovenantSig(e.to_string()))
}

/// verify_stake_spend checks that `spend_tx` spends the staking output of `del` through the
/// unbonding path with a valid staker signature.
/// `funding_txs` provide the outputs spent by the other inputs of `spend_tx`.
pub fn verify_stake_spend(
    params: &Params,
    del: &BtcDelegation,
    spend_tx: &Transaction,
    funding_txs: &[Transaction],
) -> Result<(), ContractError> {
    let staking_tx = decode_tx(&del.staking_tx)?;
    let staking_outpoint = OutPoint::new(staking_tx.compute_txid(), del.staking_output_idx);
    let input_idx = spend_tx
        .input
        .iter()
        .position(|input| input.previous_output == staking_outpoint)
        .ok_or_else(|| {
            ContractError::InvalidUndelegationRequest(
                "tx does not spend the staking output".to_string(),
            )
        })?;

    let staking_info = staking_info(params, del)?;
    let prevouts = spend_tx
        .input
        .iter()
        .enumerate()
        .map(|(i, input)| {
            if i == input_idx {
                return Ok(staking_info.output.clone());
            }
            find_prevout(&input.previous_output, funding_txs).ok_or_else(|| {
                ContractError::InvalidUndelegationRequest(format!(
                    "missing funding tx for input {}",
                    i
                ))
            })
        })
        .collect::<Result<Vec<TxOut>, ContractError>>()?;

    // witness: [covenant sigs.., staker sig, unbonding script, control block]
    let unbonding_script = staking_info.path_script(SpendPath::Unbonding)?;
    let witness = &spend_tx.input[input_idx].witness;
    let len = witness.len();
    if len < 3 || witness.nth(len - 2) != Some(unbonding_script.as_bytes()) {
        return Err(ContractError::InvalidUndelegationRequest(
            "staking output is not spent through the unbonding path".to_string(),
        ));
    }
    let staker_sig = witness.nth(len - 3).unwrap_or_default();
    let sighash = calc_sighash_with_prevouts(spend_tx, input_idx, &prevouts, unbonding_script)?;
    verify_schnorr_sig(&sighash, &parse_x_only(&del.btc_pk_hex)?, staker_sig).map_err(|e| {
        ContractError::InvalidUndelegationRequest(format!("invalid staker signature: {e}"))
    })?;

    // the whole witness, covenant signatures included, must satisfy the unbonding script
    verify_taproot_spend(spend_tx, input_idx, &prevouts)
        .map_err(|e| ContractError::InvalidUndelegationRequest(e.to_string()))
}

fn find_prevout(outpoint: &OutPoint, funding_txs: &[Transaction]) -> Option<TxOut> {
    funding_txs
        .iter()
        .find(|tx| tx.compute_txid() == outpoint.txid)
        .and_then(|tx| tx.output.get(outpoint.vout as usize).cloned())
}

/// recovered_fp_key parses a revealed finality provider secret key and finds the finality
/// provider of `fp_btc_pk_list` it belongs to
pub fn recovered_fp_key(
    evidence: &SelectiveSlashingEvidence,
    fp_btc_pk_list: &[String],
) -> Result<(SecretKey, String), ContractError> {
    let bytes = hex::decode(&evidence.recovered_fp_btc_sk)?;
    let sk = SecretKey::from_slice(&bytes)
        .map_err(|_| StakingApiError::InvalidBtcSk(bytes.len()))?;
    let (pk, _) = Keypair::from_secret_key(&Secp256k1::signing_only(), &sk).x_only_public_key();
    let pk_hex = hex::encode(pk.serialize());
    let fp_btc_pk_hex = fp_btc_pk_list
        .iter()
        .find(|fp| fp.eq_ignore_ascii_case(&pk_hex))
        .ok_or_else(|| {
            ContractError::FpNotInDelegation(pk_hex.clone(), evidence.staking_tx_hash.clone())
        })?;
    Ok((sk, fp_btc_pk_hex.clone()))
}
