//! A tapscript interpreter restricted to the opcodes that appear in staking and unbonding
//! leaves. It is used to check that assembled witnesses really unlock their outputs.

use bitcoin::blockdata::opcodes::all::*;
use bitcoin::blockdata::opcodes::Opcode;
use bitcoin::blockdata::script::Instruction;
use bitcoin::relative;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::taproot::{ControlBlock, LeafVersion};
use bitcoin::{Script, Sequence, Transaction, TxOut, XOnlyPublicKey};

use crate::error::Error;
use crate::sig_verify::{calc_sighash_with_prevouts, verify_schnorr_sig};
use crate::Result;

const ANNEX_TAG: u8 = 0x50;
const MAX_NUM_SIZE: usize = 4;
const MAX_CSV_NUM_SIZE: usize = 5;
const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;

fn exec_err(msg: impl Into<String>) -> Error {
    Error::ScriptExecution(msg.into())
}

fn decode_num(bytes: &[u8], max_size: usize) -> Result<i64> {
    if bytes.len() > max_size {
        return Err(exec_err("script number overflow"));
    }
    let Some((last, _)) = bytes.split_last() else {
        return Ok(0);
    };
    let mut value: i64 = 0;
    for (i, b) in bytes.iter().enumerate() {
        value |= (*b as i64) << (8 * i);
    }
    if last & 0x80 != 0 {
        // clear the sign bit and negate
        value &= !(0x80i64 << (8 * (bytes.len() - 1)));
        value = -value;
    }
    Ok(value)
}

fn encode_num(value: i64) -> Vec<u8> {
    if value == 0 {
        return vec![];
    }
    let negative = value < 0;
    let mut abs = value.unsigned_abs();
    let mut out = Vec::new();
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    match out.last_mut() {
        Some(last) if *last & 0x80 != 0 => out.push(if negative { 0x80 } else { 0x00 }),
        Some(last) if negative => *last |= 0x80,
        _ => {}
    }
    out
}

fn cast_to_bool(bytes: &[u8]) -> bool {
    match bytes.split_last() {
        None => false,
        Some((last, rest)) => rest.iter().any(|b| *b != 0) || (*last != 0 && *last != 0x80),
    }
}

struct Interpreter<'a> {
    tx: &'a Transaction,
    input_idx: usize,
    sighash: [u8; 32],
    stack: Vec<Vec<u8>>,
}

impl<'a> Interpreter<'a> {
    fn pop(&mut self) -> Result<Vec<u8>> {
        self.stack
            .pop()
            .ok_or_else(|| exec_err("stack underflow"))
    }

    fn pop_num(&mut self) -> Result<i64> {
        let item = self.pop()?;
        decode_num(&item, MAX_NUM_SIZE)
    }

    /// check_sig returns whether a signature was supplied; a supplied signature that does not
    /// verify aborts execution
    fn check_sig(&mut self) -> Result<bool> {
        let pk = self.pop()?;
        let sig = self.pop()?;
        if sig.is_empty() {
            return Ok(false);
        }
        let pk = XOnlyPublicKey::from_slice(&pk)
            .map_err(|e| exec_err(format!("invalid public key: {e}")))?;
        verify_schnorr_sig(&self.sighash, &pk, &sig)?;
        Ok(true)
    }

    fn check_sequence(&self, lock: i64) -> Result<()> {
        if lock < 0 {
            return Err(exec_err("negative locktime"));
        }
        let lock = lock as u32;
        if lock & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
            return Ok(());
        }
        if self.tx.version.0 < 2 {
            return Err(exec_err("relative locktime requires tx version 2"));
        }
        let required = relative::LockTime::from_sequence(Sequence(lock))
            .map_err(|e| exec_err(e.to_string()))?;
        let actual = self.tx.input[self.input_idx]
            .sequence
            .to_relative_lock_time()
            .ok_or_else(|| exec_err("input sequence has relative locktime disabled"))?;
        if !required.is_implied_by(actual) {
            return Err(exec_err("relative locktime not satisfied"));
        }
        Ok(())
    }

    fn exec_op(&mut self, op: Opcode) -> Result<()> {
        let code = op.to_u8();
        if (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8()).contains(&code) {
            let n = (code - OP_PUSHNUM_1.to_u8() + 1) as i64;
            self.stack.push(encode_num(n));
        } else if op == OP_PUSHNUM_NEG1 {
            self.stack.push(encode_num(-1));
        } else if op == OP_CHECKSIG {
            let ok = self.check_sig()?;
            self.stack.push(encode_num(ok as i64));
        } else if op == OP_CHECKSIGVERIFY {
            if !self.check_sig()? {
                return Err(exec_err("OP_CHECKSIGVERIFY failed"));
            }
        } else if op == OP_CHECKSIGADD {
            let pk = self.pop()?;
            let n = self.pop_num()?;
            let sig = self.pop()?;
            self.stack.push(sig);
            self.stack.push(pk);
            let ok = self.check_sig()?;
            self.stack.push(encode_num(n + ok as i64));
        } else if op == OP_NUMEQUAL || op == OP_NUMEQUALVERIFY {
            let b = self.pop_num()?;
            let a = self.pop_num()?;
            if op == OP_NUMEQUALVERIFY {
                if a != b {
                    return Err(exec_err("OP_NUMEQUALVERIFY failed"));
                }
            } else {
                self.stack.push(encode_num((a == b) as i64));
            }
        } else if op == OP_CSV {
            let top = self
                .stack
                .last()
                .ok_or_else(|| exec_err("stack underflow"))?;
            let lock = decode_num(top, MAX_CSV_NUM_SIZE)?;
            self.check_sequence(lock)?;
        } else {
            return Err(exec_err(format!("unsupported opcode {op}")));
        }
        Ok(())
    }

    fn run(&mut self, script: &Script) -> Result<()> {
        for instruction in script.instructions() {
            match instruction.map_err(|e| exec_err(e.to_string()))? {
                Instruction::PushBytes(bytes) => self.stack.push(bytes.as_bytes().to_vec()),
                Instruction::Op(op) => self.exec_op(op)?,
            }
        }
        if self.stack.len() != 1 || !cast_to_bool(&self.stack[0]) {
            return Err(exec_err("script did not leave a single true element"));
        }
        Ok(())
    }
}

/// verify_taproot_spend checks that input `input_idx` of `tx` unlocks its taproot prevout
/// through a script path: the revealed script must be committed to by the output key and
/// must execute successfully on the rest of the witness
pub fn verify_taproot_spend(tx: &Transaction, input_idx: usize, prevouts: &[TxOut]) -> Result<()> {
    let input = tx
        .input
        .get(input_idx)
        .ok_or(Error::TxInputCountMismatch(input_idx + 1, tx.input.len()))?;
    let prevout = prevouts
        .get(input_idx)
        .ok_or(Error::TxInputCountMismatch(tx.input.len(), prevouts.len()))?;
    if !prevout.script_pubkey.is_p2tr() {
        return Err(exec_err("prevout is not a taproot output"));
    }
    let output_key = XOnlyPublicKey::from_slice(&prevout.script_pubkey.as_bytes()[2..34])
        .map_err(|e| Error::FailedToParsePublicKey(e.to_string()))?;

    let mut elements: Vec<Vec<u8>> = input.witness.iter().map(|e| e.to_vec()).collect();
    if elements.len() < 2 {
        return Err(exec_err("witness too short for a script path spend"));
    }
    if elements.last().and_then(|e| e.first()) == Some(&ANNEX_TAG) {
        return Err(exec_err("annex is not supported"));
    }
    let control_block = elements.pop().unwrap_or_default();
    let script = bitcoin::ScriptBuf::from_bytes(elements.pop().unwrap_or_default());

    let control_block =
        ControlBlock::decode(&control_block).map_err(|e| exec_err(e.to_string()))?;
    if control_block.leaf_version != LeafVersion::TapScript {
        return Err(exec_err("unsupported leaf version"));
    }
    let secp = Secp256k1::verification_only();
    if !control_block.verify_taproot_commitment(&secp, output_key, &script) {
        return Err(exec_err("control block does not commit to the script"));
    }

    let sighash = calc_sighash_with_prevouts(tx, input_idx, prevouts, &script)?;
    Interpreter {
        tx,
        input_idx,
        sighash,
        stack: elements,
    }
    .run(&script)
}
