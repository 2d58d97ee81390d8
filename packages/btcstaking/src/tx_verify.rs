use bitcoin::absolute::LockTime;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, Script, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid};
use bitcoin::{Witness, XOnlyPublicKey};
use rust_decimal::{prelude::*, Decimal};

use crate::error::Error;
use crate::scripts_utils;
use crate::Result;

/// DUST_THRESHOLD is the largest output value regarded as dust
pub const DUST_THRESHOLD: u64 = 546;

/// Checks if a transaction has exactly one input and one output.
fn is_transfer_tx(tx: &Transaction) -> Result<()> {
    if tx.input.len() != 1 {
        return Err(Error::TxInputCountMismatch(1, tx.input.len()));
    }

    if tx.output.len() != 1 {
        return Err(Error::TxOutputCountMismatch(1, tx.output.len()));
    }

    Ok(())
}

/// Checks if a transaction is a simple transfer, meaning it has exactly one input and one output,
/// is not replaceable, and has no locktime.
pub fn is_simple_transfer(tx: &Transaction) -> Result<()> {
    is_transfer_tx(tx)?;

    if tx.input[0].sequence.is_rbf() {
        return Err(Error::TxIsReplaceable {});
    }

    if tx.lock_time.to_consensus_u32() > 0 {
        return Err(Error::TxHasLocktime {});
    }

    Ok(())
}

/// Checks if the given rate is between the valid range i.e., (0,1) with a precision of at most 2 decimal places.
pub fn is_rate_valid(rate: Decimal) -> bool {
    if rate <= Decimal::ZERO || rate >= Decimal::ONE {
        return false;
    }

    // Multiply by 100 to move the decimal places and check if precision is at most 2 decimal places
    let multiplied_rate = rate * Decimal::ONE_HUNDRED;
    multiplied_rate == multiplied_rate.trunc()
}

/// slashing_amount is the share of `value` sent to the slashing script, rounded down
pub fn slashing_amount(value: u64, slashing_rate: Decimal) -> Result<u64> {
    (Decimal::from(value) * slashing_rate)
        .floor()
        .to_u64()
        .ok_or(Error::ValueOverflow {})
}

/// SlashingTxParams are the parameters that fix the shape of a slashing transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashingTxParams<'a> {
    pub slashing_pk_script: &'a Script,
    pub slashing_rate: Decimal,
    pub min_fee: u64,
    pub change_lock_time: u16,
}

/// build_slashing_tx builds the unsigned slashing transaction spending output `funding_output_idx`
/// of `funding_tx_hash`, paying `fee` to miners
pub fn build_slashing_tx(
    funding_tx_hash: Txid,
    funding_output_idx: u32,
    funding_value: u64,
    staker_pk: &XOnlyPublicKey,
    params: &SlashingTxParams,
    fee: u64,
) -> Result<Transaction> {
    if !is_rate_valid(params.slashing_rate) {
        return Err(Error::InvalidSlashingRate {});
    }
    let slashed = slashing_amount(funding_value, params.slashing_rate)?;
    let change = funding_value
        .checked_sub(slashed)
        .and_then(|v| v.checked_sub(fee))
        .ok_or(Error::SlashingTxOverspend {})?;
    let change_script =
        scripts_utils::build_relative_time_lock_pk_script(staker_pk, params.change_lock_time)?;

    Ok(Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint {
                txid: funding_tx_hash,
                vout: funding_output_idx,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![
            TxOut {
                value: Amount::from_sat(slashed),
                script_pubkey: params.slashing_pk_script.to_owned(),
            },
            TxOut {
                value: Amount::from_sat(change),
                script_pubkey: change_script,
            },
        ],
    })
}

/// Validates a slashing transaction with strict criteria
pub fn validate_slashing_tx(
    slashing_tx: &Transaction,
    params: &SlashingTxParams,
    staking_output_value: u64,
    staker_pk: &XOnlyPublicKey,
) -> Result<()> {
    if slashing_tx.input.len() != 1 {
        return Err(Error::TxInputCountMismatch(1, slashing_tx.input.len()));
    }

    if slashing_tx.input[0].sequence.is_rbf() {
        return Err(Error::TxIsReplaceable {});
    }

    if slashing_tx.lock_time.to_consensus_u32() > 0 {
        return Err(Error::TxHasLocktime {});
    }

    if slashing_tx.output.len() != 2 {
        return Err(Error::TxOutputCountMismatch(2, slashing_tx.output.len()));
    }

    let expected_slashing_amount = slashing_amount(staking_output_value, params.slashing_rate)?;
    if slashing_tx.output[0].value.to_sat() != expected_slashing_amount {
        return Err(Error::InvalidSlashingAmount(expected_slashing_amount));
    }

    if slashing_tx.output[0].script_pubkey.as_script() != params.slashing_pk_script {
        return Err(Error::InvalidSlashingAddress {});
    }

    // the change output returns the rest to the staker behind a relative timelock
    let expected_pk_script =
        scripts_utils::build_relative_time_lock_pk_script(staker_pk, params.change_lock_time)?;
    if slashing_tx.output[1].script_pubkey != expected_pk_script {
        return Err(Error::InvalidSlashingTxChangeOutputScript {});
    }

    if slashing_tx
        .output
        .iter()
        .any(|out| out.value.to_sat() <= DUST_THRESHOLD)
    {
        return Err(Error::TxContainsDustOutputs {});
    }

    let total_output_value = slashing_tx
        .output
        .iter()
        .try_fold(0u64, |acc, out| acc.checked_add(out.value.to_sat()))
        .ok_or(Error::ValueOverflow {})?;
    if staking_output_value <= total_output_value {
        return Err(Error::SlashingTxOverspend {});
    }

    let calculated_fee = staking_output_value - total_output_value;
    if calculated_fee < params.min_fee {
        return Err(Error::InsufficientSlashingFee(params.min_fee));
    }

    Ok(())
}

/// Validates all relevant data of slashing and funding transactions.
pub fn check_transactions(
    slashing_tx: &Transaction,
    funding_transaction: &Transaction,
    funding_output_idx: u32,
    params: &SlashingTxParams,
    staker_pk: &XOnlyPublicKey,
) -> Result<()> {
    if params.min_fee == 0 {
        return Err(Error::InsufficientSlashingFee(0));
    }

    if !is_rate_valid(params.slashing_rate) {
        return Err(Error::InvalidSlashingRate {});
    }

    let staking_output = funding_transaction
        .output
        .get(funding_output_idx as usize)
        .ok_or(Error::InvalidFundingOutputIndex(
            funding_output_idx,
            funding_transaction.output.len(),
        ))?;

    validate_slashing_tx(
        slashing_tx,
        params,
        staking_output.value.to_sat(),
        staker_pk,
    )?;

    // the slashing tx must spend exactly the funding output
    let prev = slashing_tx.input[0].previous_output;
    if prev.txid != funding_transaction.compute_txid() || prev.vout != funding_output_idx {
        return Err(Error::StakingOutputNotSpentBySlashingTx {});
    }

    Ok(())
}
