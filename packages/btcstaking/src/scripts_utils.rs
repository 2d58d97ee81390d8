use crate::error::Error;
use crate::Result;
use bitcoin::blockdata::opcodes::all::*;
use bitcoin::blockdata::script::Builder;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::taproot::{ControlBlock, LeafVersion, TaprootBuilder, TaprootSpendInfo};
use bitcoin::{Amount, ScriptBuf, TxOut, XOnlyPublicKey};

/// x coordinate of the NUMS point H = lift_x(sha256(G)), which nobody knows the discrete log of
const UNSPENDABLE_KEY_X: [u8; 32] = [
    0x50, 0x92, 0x9b, 0x74, 0xc1, 0xa0, 0x49, 0x54, 0xb7, 0x8b, 0x4b, 0x60, 0x35, 0xe9, 0x7a, 0x5e,
    0x07, 0x8a, 0x5a, 0x0f, 0x28, 0xec, 0x96, 0xd5, 0x47, 0xbf, 0xee, 0x9a, 0xce, 0x80, 0x3a, 0xc0,
];

pub fn unspendable_key_path_internal_pub_key() -> Result<XOnlyPublicKey> {
    XOnlyPublicKey::from_slice(&UNSPENDABLE_KEY_X)
        .map_err(|e| Error::FailedToParsePublicKey(e.to_string()))
}

// sort_keys sorts public keys in lexicographical order
pub fn sort_keys(keys: &mut [XOnlyPublicKey]) {
    keys.sort_by(|a, b| {
        let a_serialized = a.serialize();
        let b_serialized = b.serialize();
        a_serialized.cmp(&b_serialized)
    });
}

/// prepare_keys_for_multisig_script sorts the keys, ensuring there are no duplicates
pub fn prepare_keys_for_multisig_script(keys: &[XOnlyPublicKey]) -> Result<Vec<XOnlyPublicKey>> {
    if keys.is_empty() {
        return Err(Error::InsufficientMultisigKeys {});
    }

    let mut sorted_keys = keys.to_vec();
    sort_keys(&mut sorted_keys);

    if sorted_keys.windows(2).any(|w| w[0] == w[1]) {
        return Err(Error::DuplicateKeys {});
    }

    Ok(sorted_keys)
}

/// assemble_multisig_script assembles a multisig script from already sorted keys
fn assemble_multisig_script(
    pubkeys: &[XOnlyPublicKey],
    quorum: usize,
    with_verify: bool,
) -> Result<ScriptBuf> {
    let mut builder = Builder::new();
    for (i, key) in pubkeys.iter().enumerate() {
        builder = builder.push_slice(key.serialize());
        if i == 0 {
            builder = builder.push_opcode(OP_CHECKSIG);
        } else {
            builder = builder.push_opcode(OP_CHECKSIGADD);
        }
    }

    builder = builder.push_int(quorum as i64);
    if with_verify {
        builder = builder.push_opcode(OP_NUMEQUALVERIFY);
    } else {
        builder = builder.push_opcode(OP_NUMEQUAL);
    }

    Ok(builder.into_script())
}

/// build_multisig_script creates a `quorum`-of-`keys` script, or a plain signature check when
/// there is a single key
pub fn build_multisig_script(
    keys: &[XOnlyPublicKey],
    quorum: usize,
    with_verify: bool,
) -> Result<ScriptBuf> {
    let prepared_keys = prepare_keys_for_multisig_script(keys)?;
    if quorum == 0 {
        return Err(Error::ZeroQuorum {});
    }
    if quorum > prepared_keys.len() {
        return Err(Error::QuorumExceedsKeyCount {});
    }
    if prepared_keys.len() == 1 {
        return build_single_key_sig_script(&prepared_keys[0], with_verify);
    }
    assemble_multisig_script(&prepared_keys, quorum, with_verify)
}

/// build_time_lock_script creates a timelock script
pub fn build_time_lock_script(pub_key: &XOnlyPublicKey, lock_time: u16) -> Result<ScriptBuf> {
    let builder = Builder::new()
        .push_slice(pub_key.serialize())
        .push_opcode(OP_CHECKSIGVERIFY)
        .push_int(lock_time as i64)
        .push_opcode(OP_CSV);
    Ok(builder.into_script())
}

/// build_single_key_sig_script builds a single key signature script
pub fn build_single_key_sig_script(
    pub_key: &XOnlyPublicKey,
    with_verify: bool,
) -> Result<ScriptBuf> {
    let mut builder = Builder::new().push_slice(pub_key.serialize());

    if with_verify {
        builder = builder.push_opcode(OP_CHECKSIGVERIFY);
    } else {
        builder = builder.push_opcode(OP_CHECKSIG);
    }

    Ok(builder.into_script())
}

/// build_relative_time_lock_pk_script builds the pk script of a taproot output which can only
/// be spent by `pk` after `lock_time` blocks
pub fn build_relative_time_lock_pk_script(pk: &XOnlyPublicKey, lock_time: u16) -> Result<ScriptBuf> {
    let script = build_time_lock_script(pk, lock_time)?;
    let spend_info = finalize_tree(&[(0, script)])?;
    Ok(ScriptBuf::new_p2tr_tweaked(spend_info.output_key()))
}

fn aggregate_scripts(scripts: &[ScriptBuf]) -> ScriptBuf {
    let mut final_script = Vec::new();

    for script in scripts {
        final_script.extend_from_slice(script.as_bytes());
    }

    ScriptBuf::from_bytes(final_script)
}

/// finalize_tree builds a taproot tree over the NUMS internal key; leaves must be given in
/// depth-first order
fn finalize_tree(leaves: &[(u8, ScriptBuf)]) -> Result<TaprootSpendInfo> {
    let secp = Secp256k1::verification_only();
    let mut builder = TaprootBuilder::new();
    for (depth, script) in leaves {
        builder = builder
            .add_leaf(*depth, script.clone())
            .map_err(|_| Error::AddLeafFailed {})?;
    }
    builder
        .finalize(&secp, unspendable_key_path_internal_pub_key()?)
        .map_err(|_| Error::FinalizeTaprootFailed {})
}

/// BabylonScriptPaths is a structure that holds all paths of a Babylon staking
/// script, including timelock path, on-demand unbonding path, and slashing path
/// It is used in the output of the staking tx and unbonding tx
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BabylonScriptPaths {
    // time_lock_path_script is the script path for normal unbonding
    // <Staker_PK> OP_CHECKSIGVERIFY  <Staking_Time_Blocks> OP_CHECKSEQUENCEVERIFY
    pub time_lock_path_script: ScriptBuf,
    // unbonding_path_script is the script path for on-demand early unbonding
    // <Staker_PK> OP_CHECKSIGVERIFY
    // <Covenant_PK1> OP_CHECKSIG ... <Covenant_PKN> OP_CHECKSIGADD M OP_NUMEQUAL
    pub unbonding_path_script: ScriptBuf,
    // slashing_path_script is the script path for slashing
    // <Staker_PK> OP_CHECKSIGVERIFY
    // <FP_PK1> OP_CHECKSIG ... <FP_PKN> OP_CHECKSIGADD 1 OP_NUMEQUALVERIFY
    // <Covenant_PK1> OP_CHECKSIG ... <Covenant_PKN> OP_CHECKSIGADD M OP_NUMEQUAL
    pub slashing_path_script: ScriptBuf,
}

impl BabylonScriptPaths {
    pub fn new(
        staker_key: &XOnlyPublicKey,
        fp_keys: &[XOnlyPublicKey],
        covenant_keys: &[XOnlyPublicKey],
        covenant_quorum: usize,
        lock_time: u16,
    ) -> Result<Self> {
        // the staker must not double as a finality provider or covenant member
        if fp_keys.contains(staker_key) || covenant_keys.contains(staker_key) {
            return Err(Error::DuplicateKeys {});
        }
        let time_lock_path_script = build_time_lock_script(staker_key, lock_time)?;
        let covenant_multisig_script =
            build_multisig_script(covenant_keys, covenant_quorum, false)?;
        let staker_sig_script = build_single_key_sig_script(staker_key, true)?;
        // any single finality provider key unlocks its share of the slashing path
        let fp_script = build_multisig_script(fp_keys, 1, true)?;
        let unbonding_path_script =
            aggregate_scripts(&[staker_sig_script.clone(), covenant_multisig_script.clone()]);
        let slashing_path_script =
            aggregate_scripts(&[staker_sig_script, fp_script, covenant_multisig_script]);

        Ok(BabylonScriptPaths {
            time_lock_path_script,
            unbonding_path_script,
            slashing_path_script,
        })
    }
}

/// SpendPath names a leaf of a staking or unbonding output
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpendPath {
    Timelock,
    Unbonding,
    Slashing,
}

impl std::fmt::Display for SpendPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpendPath::Timelock => write!(f, "timelock"),
            SpendPath::Unbonding => write!(f, "unbonding"),
            SpendPath::Slashing => write!(f, "slashing"),
        }
    }
}

/// SpendInfo is what a witness needs to reveal for a given leaf
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpendInfo {
    pub script: ScriptBuf,
    pub control_block: ControlBlock,
}

impl SpendInfo {
    pub fn control_block_bytes(&self) -> Vec<u8> {
        self.control_block.serialize()
    }
}

/// StakingInfo is a taproot staking (or unbonding) output together with the scripts and keys
/// committed to in its tree
#[derive(Clone, Debug)]
pub struct StakingInfo {
    pub output: TxOut,
    pub script_paths: BabylonScriptPaths,
    pub staker_key: XOnlyPublicKey,
    /// finality provider keys in script order
    pub fp_keys: Vec<XOnlyPublicKey>,
    /// covenant keys in script order
    pub covenant_keys: Vec<XOnlyPublicKey>,
    pub covenant_quorum: usize,
    has_unbonding_path: bool,
    spend_info: TaprootSpendInfo,
}

impl StakingInfo {
    /// staking builds the output locked in a staking tx: timelock and unbonding leaves at depth 2,
    /// slashing leaf at depth 1
    pub fn staking(
        staker_key: &XOnlyPublicKey,
        fp_keys: &[XOnlyPublicKey],
        covenant_keys: &[XOnlyPublicKey],
        covenant_quorum: usize,
        staking_time: u16,
        staking_value: Amount,
    ) -> Result<Self> {
        let paths = BabylonScriptPaths::new(
            staker_key,
            fp_keys,
            covenant_keys,
            covenant_quorum,
            staking_time,
        )?;
        let spend_info = finalize_tree(&[
            (2, paths.time_lock_path_script.clone()),
            (2, paths.unbonding_path_script.clone()),
            (1, paths.slashing_path_script.clone()),
        ])?;
        Self::assemble(
            staker_key,
            fp_keys,
            covenant_keys,
            covenant_quorum,
            paths,
            spend_info,
            staking_value,
            true,
        )
    }

    /// unbonding builds the output of an unbonding tx, which keeps the timelock and slashing
    /// leaves but cannot be unbonded again
    pub fn unbonding(
        staker_key: &XOnlyPublicKey,
        fp_keys: &[XOnlyPublicKey],
        covenant_keys: &[XOnlyPublicKey],
        covenant_quorum: usize,
        unbonding_time: u16,
        unbonding_value: Amount,
    ) -> Result<Self> {
        let paths = BabylonScriptPaths::new(
            staker_key,
            fp_keys,
            covenant_keys,
            covenant_quorum,
            unbonding_time,
        )?;
        let spend_info = finalize_tree(&[
            (1, paths.time_lock_path_script.clone()),
            (1, paths.slashing_path_script.clone()),
        ])?;
        Self::assemble(
            staker_key,
            fp_keys,
            covenant_keys,
            covenant_quorum,
            paths,
            spend_info,
            unbonding_value,
            false,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        staker_key: &XOnlyPublicKey,
        fp_keys: &[XOnlyPublicKey],
        covenant_keys: &[XOnlyPublicKey],
        covenant_quorum: usize,
        script_paths: BabylonScriptPaths,
        spend_info: TaprootSpendInfo,
        value: Amount,
        has_unbonding_path: bool,
    ) -> Result<Self> {
        let output = TxOut {
            value,
            script_pubkey: ScriptBuf::new_p2tr_tweaked(spend_info.output_key()),
        };
        Ok(StakingInfo {
            output,
            script_paths,
            staker_key: *staker_key,
            fp_keys: prepare_keys_for_multisig_script(fp_keys)?,
            covenant_keys: prepare_keys_for_multisig_script(covenant_keys)?,
            covenant_quorum,
            has_unbonding_path,
            spend_info,
        })
    }

    pub fn path_script(&self, path: SpendPath) -> Result<&ScriptBuf> {
        match path {
            SpendPath::Timelock => Ok(&self.script_paths.time_lock_path_script),
            SpendPath::Unbonding if self.has_unbonding_path => {
                Ok(&self.script_paths.unbonding_path_script)
            }
            SpendPath::Unbonding => Err(Error::MissingSpendPath(path.to_string())),
            SpendPath::Slashing => Ok(&self.script_paths.slashing_path_script),
        }
    }

    /// spend_info returns the revealed leaf script and control block for `path`
    pub fn spend_info(&self, path: SpendPath) -> Result<SpendInfo> {
        let script = self.path_script(path)?.clone();
        let control_block = self
            .spend_info
            .control_block(&(script.clone(), LeafVersion::TapScript))
            .ok_or(Error::MissingSpendPath(path.to_string()))?;
        Ok(SpendInfo {
            script,
            control_block,
        })
    }

    /// find_output_index locates this output in `outputs`
    pub fn find_output_index(&self, outputs: &[TxOut]) -> Option<u32> {
        outputs
            .iter()
            .position(|out| *out == self.output)
            .map(|idx| idx as u32)
    }
}
