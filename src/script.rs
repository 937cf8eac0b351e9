//! Script inspection for consensus accounting
//!
//! Signature-operation counting, pay-to-script-hash detection and the
//! unspendable-output test. Script execution itself is delegated to a
//! `ScriptVerifier` implementation supplied by the node.

use crate::constants::{MAX_PUBKEYS_PER_MULTISIG, MAX_SCRIPT_SIZE};
use crate::types::*;
use crate::utxo::UtxoViewpoint;

pub const OP_0: u8 = 0x00;
pub const OP_DATA_20: u8 = 0x14;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

/// One parsed opcode and its push payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedOp<'a> {
    pub opcode: u8,
    pub data: &'a [u8],
}

/// Splits a script into opcodes.
///
/// Returns the opcodes parsed so far and whether the whole script parsed; a
/// push running past the end of the script stops parsing.
pub fn parse_script(script: &[u8]) -> (Vec<ParsedOp<'_>>, bool) {
    let mut ops = Vec::new();
    let mut i = 0;
    while i < script.len() {
        let opcode = script[i];
        let (header, len) = match opcode {
            0x01..=0x4b => (1, opcode as usize),
            OP_PUSHDATA1 => match script.get(i + 1) {
                Some(&n) => (2, n as usize),
                None => return (ops, false),
            },
            OP_PUSHDATA2 => match script.get(i + 1..i + 3) {
                Some(b) => (3, u16::from_le_bytes([b[0], b[1]]) as usize),
                None => return (ops, false),
            },
            OP_PUSHDATA4 => match script.get(i + 1..i + 5) {
                Some(b) => (5, u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize),
                None => return (ops, false),
            },
            _ => (1, 0),
        };
        let start = i + header;
        let end = match start.checked_add(len) {
            Some(end) if end <= script.len() => end,
            _ => return (ops, false),
        };
        ops.push(ParsedOp {
            opcode,
            data: &script[start..end],
        });
        i = end;
    }
    (ops, true)
}

fn is_small_int(opcode: u8) -> bool {
    opcode == OP_0 || (OP_1..=OP_16).contains(&opcode)
}

fn small_int_value(opcode: u8) -> usize {
    if opcode == OP_0 {
        0
    } else {
        (opcode - (OP_1 - 1)) as usize
    }
}

fn count_sig_ops_in(ops: &[ParsedOp<'_>], precise: bool) -> usize {
    let mut count = 0usize;
    for (i, op) in ops.iter().enumerate() {
        match op.opcode {
            OP_CHECKSIG | OP_CHECKSIGVERIFY => count += 1,
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                if precise && i > 0 && (OP_1..=OP_16).contains(&ops[i - 1].opcode) {
                    count += small_int_value(ops[i - 1].opcode);
                } else {
                    count += MAX_PUBKEYS_PER_MULTISIG;
                }
            }
            _ => {}
        }
    }
    count
}

/// Imprecise signature-operation count: every multisig counts as the maximum
/// number of keys. A malformed script counts up to the point of failure.
pub fn get_sig_op_count(script: &[u8]) -> usize {
    let (ops, _) = parse_script(script);
    count_sig_ops_in(&ops, false)
}

/// Precise signature-operation count for an input spending `script_pubkey`.
///
/// For pay-to-script-hash outputs, with `bip16` set, the count comes from the
/// redeem script pushed last by `script_sig`.
pub fn get_precise_sig_op_count(script_sig: &[u8], script_pubkey: &[u8], bip16: bool) -> usize {
    let (pk_ops, _) = parse_script(script_pubkey);
    if !(bip16 && is_pay_to_script_hash(script_pubkey)) {
        return count_sig_ops_in(&pk_ops, true);
    }

    let (sig_ops, complete) = parse_script(script_sig);
    if !complete || sig_ops.is_empty() || !is_push_only_ops(&sig_ops) {
        return 0;
    }
    let redeem_script = sig_ops[sig_ops.len() - 1].data;
    let (redeem_ops, _) = parse_script(redeem_script);
    count_sig_ops_in(&redeem_ops, true)
}

/// OP_HASH160 <20 bytes> OP_EQUAL
pub fn is_pay_to_script_hash(script: &[u8]) -> bool {
    script.len() == 23
        && script[0] == OP_HASH160
        && script[1] == OP_DATA_20
        && script[22] == OP_EQUAL
}

fn is_push_only_ops(ops: &[ParsedOp<'_>]) -> bool {
    ops.iter().all(|op| op.opcode <= OP_16)
}

/// True when the script consists only of data pushes and small integers
pub fn is_push_only(script: &[u8]) -> bool {
    let (ops, complete) = parse_script(script);
    complete && is_push_only_ops(&ops)
}

/// Outputs that can never be spent: oversized, OP_RETURN-prefixed or malformed scripts
pub fn is_unspendable(script: &[u8]) -> bool {
    if script.len() > MAX_SCRIPT_SIZE {
        return true;
    }
    if script.first() == Some(&OP_RETURN) {
        return true;
    }
    let (_, complete) = parse_script(script);
    !complete
}

/// Value pushed by OP_0 and OP_1 through OP_16
pub fn small_script_num(opcode: u8) -> Option<usize> {
    is_small_int(opcode).then(|| small_int_value(opcode))
}

/// Script verification rules active for a block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptFlags {
    /// Evaluate pay-to-script-hash redeem scripts
    pub bip16: bool,
}

/// Script and signature verification over a whole block.
///
/// Implementations own their signature and hash caches and must be safe to call
/// from concurrent validations. Any error rejects the block.
pub trait ScriptVerifier: Send + Sync {
    fn verify_scripts(
        &self,
        block: &Block,
        view: &UtxoViewpoint,
        flags: ScriptFlags,
    ) -> anyhow::Result<()>;
}
