//! Transaction validation: context-free sanity, input checks against a UTXO
//! view, lock-time finality, signature-operation accounting and the coinbase
//! height commitment.

use crate::constants::*;
use crate::error::{rule_error, ErrorKind, Result};
use crate::params::ChainParams;
use crate::script::{
    get_precise_sig_op_count, get_sig_op_count, is_pay_to_script_hash, small_script_num,
};
use crate::types::*;
use crate::utxo::UtxoViewpoint;
use std::collections::HashSet;

/// A coinbase has exactly one input, spending the null outpoint
pub fn is_coinbase(tx: &Transaction) -> bool {
    tx.inputs.len() == 1 && is_null_outpoint(&tx.inputs[0].prevout)
}

pub fn is_null_outpoint(outpoint: &OutPoint) -> bool {
    outpoint.is_null()
}

/// CheckTransaction: 𝒯𝒳 → {valid, invalid}
///
/// A transaction tx = (v, ins, outs, lt) is sane if and only if:
/// 1. |ins| > 0 ∧ |outs| > 0
/// 2. |tx| ≤ MAX_BLOCK_BASE_SIZE (witness stripped)
/// 3. ∀o ∈ outs: 0 ≤ o.value ≤ M_max and Σ o.value ≤ M_max
/// 4. no two inputs spend the same outpoint
/// 5. coinbase: 2 ≤ |ins[0].script_sig| ≤ 100; otherwise no input is null
pub fn check_transaction_sanity(tx: &Transaction) -> Result<()> {
    if tx.inputs.is_empty() {
        return Err(rule_error(ErrorKind::NoTxInputs, "transaction has no inputs"));
    }
    if tx.outputs.is_empty() {
        return Err(rule_error(ErrorKind::NoTxOutputs, "transaction has no outputs"));
    }

    let size = tx.serialize_size_stripped();
    if size > MAX_BLOCK_BASE_SIZE {
        return Err(rule_error(
            ErrorKind::TxTooBig,
            format!(
                "serialized transaction is too big - got {}, max {}",
                size, MAX_BLOCK_BASE_SIZE
            ),
        ));
    }

    let mut total: Amount = 0;
    for output in &tx.outputs {
        let value = output.value;
        if value < 0 {
            return Err(rule_error(
                ErrorKind::BadTxOutValue,
                format!("transaction output has negative value of {}", value),
            ));
        }
        if value > MAX_SATOSHI {
            return Err(rule_error(
                ErrorKind::BadTxOutValue,
                format!(
                    "transaction output value of {} is higher than max allowed value of {}",
                    value, MAX_SATOSHI
                ),
            ));
        }
        total = match total.checked_add(value) {
            Some(sum) if sum <= MAX_SATOSHI => sum,
            _ => {
                return Err(rule_error(
                    ErrorKind::BadTxOutValue,
                    format!(
                        "total value of all transaction outputs exceeds max allowed value of {}",
                        MAX_SATOSHI
                    ),
                ))
            }
        };
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !seen.insert(input.prevout) {
            return Err(rule_error(
                ErrorKind::DuplicateTxInputs,
                "transaction contains duplicate inputs",
            ));
        }
    }

    if is_coinbase(tx) {
        let len = tx.inputs[0].script_sig.len();
        if !(MIN_COINBASE_SCRIPT_LEN..=MAX_COINBASE_SCRIPT_LEN).contains(&len) {
            return Err(rule_error(
                ErrorKind::BadCoinbaseScriptLen,
                format!(
                    "coinbase transaction script length of {} is out of range (min: {}, max: {})",
                    len, MIN_COINBASE_SCRIPT_LEN, MAX_COINBASE_SCRIPT_LEN
                ),
            ));
        }
    } else if tx.inputs.iter().any(|input| is_null_outpoint(&input.prevout)) {
        return Err(rule_error(
            ErrorKind::BadTxInput,
            "transaction input refers to previous output that is null",
        ));
    }

    Ok(())
}

/// CheckTxInputs: 𝒯𝒳 × 𝒰𝒱 × ℕ → ℤ
///
/// Returns the fee Σ inputs − Σ outputs of a non-coinbase transaction at
/// `height`. Every input must be unspent in `view`, coinbase outputs must have
/// matured, and input amounts are range checked as they accumulate.
pub fn check_transaction_inputs(
    tx: &Transaction,
    height: Height,
    view: &UtxoViewpoint,
    params: &ChainParams,
) -> Result<Amount> {
    if is_coinbase(tx) {
        return Ok(0);
    }

    let txid = tx.txid();
    let mut total_in: Amount = 0;
    for (index, input) in tx.inputs.iter().enumerate() {
        let entry = match view.lookup_entry(&input.prevout) {
            Some(entry) if !entry.is_spent() => entry,
            _ => {
                return Err(rule_error(
                    ErrorKind::MissingTxOut,
                    format!(
                        "output {}:{} referenced from transaction {}:{} either does not exist or has already been spent",
                        input.prevout.hash, input.prevout.index, txid, index
                    ),
                ))
            }
        };

        if entry.is_coinbase() {
            let blocks_since = height as i64 - entry.block_height as i64;
            if blocks_since < params.coinbase_maturity as i64 {
                return Err(rule_error(
                    ErrorKind::ImmatureSpend,
                    format!(
                        "tried to spend coinbase transaction output {}:{} from height {} at height {} before required maturity of {} blocks",
                        input.prevout.hash,
                        input.prevout.index,
                        entry.block_height,
                        height,
                        params.coinbase_maturity
                    ),
                ));
            }
        }

        let amount = entry.amount;
        if amount < 0 {
            return Err(rule_error(
                ErrorKind::BadTxOutValue,
                format!("transaction output has negative value of {}", amount),
            ));
        }
        if amount > MAX_SATOSHI {
            return Err(rule_error(
                ErrorKind::BadTxOutValue,
                format!(
                    "transaction output value of {} is higher than max allowed value of {}",
                    amount, MAX_SATOSHI
                ),
            ));
        }
        total_in = match total_in.checked_add(amount) {
            Some(sum) if sum <= MAX_SATOSHI => sum,
            _ => {
                return Err(rule_error(
                    ErrorKind::BadTxOutValue,
                    format!(
                        "total value of all transaction inputs is higher than max allowed value of {}",
                        MAX_SATOSHI
                    ),
                ))
            }
        };
    }

    // sanity already bounded every output and their sum
    let total_out: Amount = tx.outputs.iter().map(|o| o.value).sum();
    if total_in < total_out {
        return Err(rule_error(
            ErrorKind::SpendTooHigh,
            format!(
                "total value of all transaction inputs for transaction {} is {} which is less than the amount spent of {}",
                txid, total_in, total_out
            ),
        ));
    }

    Ok(total_in - total_out)
}

/// IsFinal: 𝒯𝒳 × ℕ × ℕ → {true, false}
///
/// A lock time below LOCKTIME_THRESHOLD is a height, otherwise a Unix time.
/// The transaction is final when its lock time is zero or strictly below the
/// block height (or time), or when every input sequence is final.
pub fn is_finalized_transaction(tx: &Transaction, height: Height, block_time: i64) -> bool {
    let lock_time = tx.lock_time;
    if lock_time == 0 {
        return true;
    }

    let threshold = if lock_time < LOCKTIME_THRESHOLD {
        height as i64
    } else {
        block_time
    };
    if (lock_time as i64) < threshold {
        return true;
    }

    tx.inputs.iter().all(|input| input.sequence == SEQUENCE_FINAL)
}

/// Imprecise signature-operation count over every input and output script
pub fn count_sig_ops(tx: &Transaction) -> usize {
    let inputs: usize = tx.inputs.iter().map(|i| get_sig_op_count(&i.script_sig)).sum();
    let outputs: usize = tx
        .outputs
        .iter()
        .map(|o| get_sig_op_count(&o.script_pubkey))
        .sum();
    inputs + outputs
}

/// Precise signature operations in the redeem scripts of pay-to-script-hash
/// inputs. Each referenced output must be present and unspent in `view`.
pub fn count_p2sh_sig_ops(tx: &Transaction, is_coinbase: bool, view: &UtxoViewpoint) -> Result<usize> {
    if is_coinbase {
        return Ok(0);
    }

    let mut total: usize = 0;
    for (index, input) in tx.inputs.iter().enumerate() {
        let entry = match view.lookup_entry(&input.prevout) {
            Some(entry) if !entry.is_spent() => entry,
            _ => {
                return Err(rule_error(
                    ErrorKind::MissingTxOut,
                    format!(
                        "output {}:{} referenced from transaction {}:{} either does not exist or has already been spent",
                        input.prevout.hash,
                        input.prevout.index,
                        tx.txid(),
                        index
                    ),
                ))
            }
        };
        if !is_pay_to_script_hash(&entry.pk_script) {
            continue;
        }
        let count = get_precise_sig_op_count(&input.script_sig, &entry.pk_script, true);
        total = total.checked_add(count).ok_or_else(|| {
            rule_error(
                ErrorKind::TooManySigOps,
                format!(
                    "the public key script from output {}:{} contains too many signature operations - overflow",
                    input.prevout.hash, input.prevout.index
                ),
            )
        })?;
    }
    Ok(total)
}

/// Signature-operation cost of a transaction: legacy operations, plus
/// pay-to-script-hash redeem script operations once BIP16 is active, each
/// scaled by WITNESS_SCALE_FACTOR.
pub fn get_sig_op_cost(
    tx: &Transaction,
    is_coinbase: bool,
    view: &UtxoViewpoint,
    bip16: bool,
) -> Result<usize> {
    let mut cost = count_sig_ops(tx) * WITNESS_SCALE_FACTOR;
    if bip16 {
        cost += count_p2sh_sig_ops(tx, is_coinbase, view)? * WITNESS_SCALE_FACTOR;
    }
    Ok(cost)
}

/// Block height committed at the start of a coinbase signature script
pub fn extract_coinbase_height(coinbase: &Transaction) -> Result<Height> {
    let script = match coinbase.inputs.first() {
        Some(input) if !input.script_sig.is_empty() => &input.script_sig,
        _ => {
            return Err(rule_error(
                ErrorKind::MissingCoinbaseHeight,
                format!(
                    "the coinbase signature script for blocks of version {} or greater must start with the length of the serialized block height",
                    SERIALIZED_HEIGHT_VERSION
                ),
            ))
        }
    };

    if let Some(value) = small_script_num(script[0]) {
        return Ok(value as Height);
    }

    let len = script[0] as usize;
    let serialized = match script.get(1..1 + len) {
        Some(bytes) => bytes,
        None => {
            return Err(rule_error(
                ErrorKind::MissingCoinbaseHeight,
                format!(
                    "the coinbase signature script for blocks of version {} or greater must start with the serialized block height",
                    SERIALIZED_HEIGHT_VERSION
                ),
            ))
        }
    };
    let mut buf = [0u8; 8];
    for (slot, byte) in buf.iter_mut().zip(serialized) {
        *slot = *byte;
    }
    Ok(u64::from_le_bytes(buf) as Height)
}

/// The coinbase must commit to `want_height`
pub fn check_serialized_height(coinbase: &Transaction, want_height: Height) -> Result<()> {
    let serialized = extract_coinbase_height(coinbase)?;
    if serialized != want_height {
        return Err(rule_error(
            ErrorKind::BadCoinbaseHeight,
            format!(
                "the coinbase signature script serialized block height is {} when {} was expected",
                serialized, want_height
            ),
        ));
    }
    Ok(())
}

/// Headers of version 2 and above commit to their height in the coinbase
pub fn should_have_serialized_block_height(header: &BlockHeader) -> bool {
    header.version >= SERIALIZED_HEIGHT_VERSION
}
