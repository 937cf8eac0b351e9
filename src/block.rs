//! Context-free block validation
//!
//! These checks need nothing beyond the block itself, the proof-of-work limit of
//! its algorithm, the adjusted time and the timestamp of its parent.

use crate::config::BehaviorFlags;
use crate::constants::*;
use crate::error::{rule_error, ErrorKind, Result};
use crate::merkle::build_merkle_tree_store;
use crate::params::ChainParams;
use crate::pow::{check_proof_of_work, U256};
use crate::timesource::MedianTimeSource;
use crate::transaction::{check_transaction_sanity, count_sig_ops, is_coinbase};
use crate::types::*;
use log::{debug, trace};
use std::collections::HashSet;

/// CheckBlockHeader: ℋ × ℕ → {valid, invalid}
///
/// 1. bits encode a target in (0, pow_limit] and, unless skipped, the
///    algorithm hash at `height` meets it
/// 2. timestamp ≤ adjusted time + MAX_TIME_OFFSET_SECONDS
/// 3. after the first hard fork, timestamp > prev_timestamp
pub fn check_block_header_sanity(
    header: &BlockHeader,
    pow_limit: &U256,
    time_source: &dyn MedianTimeSource,
    flags: BehaviorFlags,
    height: Height,
    prev_timestamp: u32,
    params: &ChainParams,
) -> Result<()> {
    check_proof_of_work(header, pow_limit, flags, height, params)?;

    let adjusted = time_source.adjusted_time();
    if adjusted < 0 {
        return Err(rule_error(
            ErrorKind::InvalidTime,
            format!("adjusted time of {} is not a valid timestamp", adjusted),
        ));
    }
    let max_timestamp = adjusted + MAX_TIME_OFFSET_SECONDS;
    if header.timestamp as i64 > max_timestamp {
        return Err(rule_error(
            ErrorKind::TimeTooNew,
            format!("block timestamp of {} is too far in the future", header.timestamp),
        ));
    }

    if params.hard_fork_index(height) > 0 && header.timestamp <= prev_timestamp {
        return Err(rule_error(
            ErrorKind::TimeTooOld,
            format!(
                "block timestamp of {} is not at least one second after the chain tip at {}",
                header.timestamp, prev_timestamp
            ),
        ));
    }

    Ok(())
}

/// CheckBlock: ℬ → {valid, invalid}
///
/// Header sanity, then for block b = (h, txs):
/// 1. |txs| > 0
/// 2. |txs| ≤ MAX_BLOCK_BASE_SIZE and |b| ≤ MAX_BLOCK_BASE_SIZE (witness stripped)
/// 3. txs[0] is the only coinbase
/// 4. ∀tx ∈ txs: CheckTransaction(tx)
/// 5. MerkleRoot(txs) = h.merkle_root
/// 6. txids are unique
/// 7. Σ sigops(tx) · WITNESS_SCALE_FACTOR ≤ MAX_BLOCK_SIG_OPS_COST
#[allow(clippy::too_many_arguments)]
pub fn check_block_sanity_with_flags(
    block: &Block,
    pow_limit: &U256,
    time_source: &dyn MedianTimeSource,
    flags: BehaviorFlags,
    height: Height,
    prev_timestamp: u32,
    params: &ChainParams,
) -> Result<()> {
    let header = &block.header;
    trace!("checkBlockSanity {:08x} {:064x}", header.bits, pow_limit);

    if let Err(e) = check_block_header_sanity(
        header,
        pow_limit,
        time_source,
        flags,
        height,
        prev_timestamp,
        params,
    ) {
        debug!("block processing error: version {} {}", header.version, e);
        return Err(e);
    }

    let transactions = &block.transactions;
    if transactions.is_empty() {
        return Err(rule_error(
            ErrorKind::NoTransactions,
            "block does not contain any transactions",
        ));
    }

    if transactions.len() > MAX_BLOCK_BASE_SIZE {
        return Err(rule_error(
            ErrorKind::BlockTooBig,
            format!(
                "block contains too many transactions - got {}, max {}",
                transactions.len(),
                MAX_BLOCK_BASE_SIZE
            ),
        ));
    }

    let size = block.serialize_size_stripped();
    if size > MAX_BLOCK_BASE_SIZE {
        return Err(rule_error(
            ErrorKind::BlockTooBig,
            format!("serialized block is too big - got {}, max {}", size, MAX_BLOCK_BASE_SIZE),
        ));
    }

    if !is_coinbase(&transactions[0]) {
        return Err(rule_error(
            ErrorKind::FirstTxNotCoinbase,
            "first transaction in block is not a coinbase",
        ));
    }
    if let Some(index) = transactions.iter().skip(1).position(is_coinbase) {
        return Err(rule_error(
            ErrorKind::MultipleCoinbases,
            format!("block contains second coinbase at index {}", index + 1),
        ));
    }

    for tx in transactions {
        check_transaction_sanity(tx)?;
    }

    let merkle_root = build_merkle_tree_store(transactions, false).root();
    if header.merkle_root != merkle_root {
        return Err(rule_error(
            ErrorKind::BadMerkleRoot,
            format!(
                "block merkle root is invalid - block header indicates {}, but calculated value is {} with version {}",
                header.merkle_root, merkle_root, header.version
            ),
        ));
    }

    let mut seen = HashSet::with_capacity(transactions.len());
    for tx in transactions {
        let txid = tx.txid();
        if !seen.insert(txid) {
            return Err(rule_error(
                ErrorKind::DuplicateTx,
                format!("block contains duplicate transaction {}", txid),
            ));
        }
    }

    let mut total_sig_ops: usize = 0;
    for tx in transactions {
        total_sig_ops = count_sig_ops(tx)
            .checked_mul(WITNESS_SCALE_FACTOR)
            .and_then(|cost| total_sig_ops.checked_add(cost))
            .filter(|total| *total <= MAX_BLOCK_SIG_OPS_COST)
            .ok_or_else(|| {
                rule_error(
                    ErrorKind::TooManySigOps,
                    format!(
                        "block contains too many signature operations - got more than {}",
                        MAX_BLOCK_SIG_OPS_COST
                    ),
                )
            })?;
    }

    Ok(())
}

/// Context-free block check with default flags. `skip_pow` leaves out the
/// hash-below-target comparison but still range checks the target.
#[allow(clippy::too_many_arguments)]
pub fn check_block_sanity(
    block: &Block,
    pow_limit: &U256,
    time_source: &dyn MedianTimeSource,
    skip_pow: bool,
    height: Height,
    prev_timestamp: u32,
    params: &ChainParams,
) -> Result<()> {
    let flags = BehaviorFlags {
        no_pow_check: skip_pow,
        ..BehaviorFlags::NONE
    };
    check_block_sanity_with_flags(
        block,
        pow_limit,
        time_source,
        flags,
        height,
        prev_timestamp,
        params,
    )
}
