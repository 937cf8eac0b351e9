//! Per-algorithm difficulty retargeting
//!
//! Each mining algorithm retargets independently. The required target for the
//! next block of an algorithm scales the target of its last block by the time
//! its most recent `averaging_interval` blocks actually took, relative to the
//! time they should have taken, within the hard fork's adjustment bounds.

use crate::chain_index::{BlockIndex, NodeId};
use crate::error::{rule_error, ErrorKind, Result};
use crate::params::ChainParams;
use crate::pow::{big_to_compact, compact_to_big, U256};
use log::{trace, warn};
use num_bigint::BigUint;

/// CalcNextRequiredDifficulty: ℬ𝒩 × 𝒜 × 𝒫 → ℕ
///
/// Required compact bits for a block of `algo` built on `last`. With no
/// parent, or too little same-algorithm history in the current hard fork, the
/// algorithm's proof-of-work limit applies.
pub fn calc_next_required_difficulty(
    index: &BlockIndex,
    last: Option<NodeId>,
    algo: &str,
    params: &ChainParams,
) -> Result<u32> {
    let next_height = last.map_or(0, |id| index.node(id).height + 1);
    let fork = params.hard_fork(next_height).ok_or_else(|| {
        rule_error(
            ErrorKind::UnexpectedDifficulty,
            format!("no hard fork defined at height {}", next_height),
        )
    })?;
    let algo_params = fork.algo(algo).ok_or_else(|| {
        rule_error(
            ErrorKind::UnexpectedDifficulty,
            format!("algorithm {} is not mined at height {}", algo, next_height),
        )
    })?;
    let limit_bits = algo_params.pow_limit_bits;

    let last = match last {
        Some(last) => last,
        None => return Ok(limit_bits),
    };

    let floor = fork.activation_height;
    let prev = match index.last_with_algo(Some(last), algo, floor, params) {
        Some(prev) => prev,
        None => return Ok(limit_bits),
    };

    if params.pow_no_retargeting {
        return Ok(index.node(prev).bits);
    }

    let mut first = prev;
    for _ in 0..fork.averaging_interval {
        first = match index
            .parent(first)
            .and_then(|p| index.last_with_algo(Some(p), algo, floor, params))
        {
            Some(node) => node,
            None => return Ok(limit_bits),
        };
    }

    let target_timespan = algo_params.version_interval * fork.averaging_interval as i64;
    if target_timespan <= 0 {
        return Ok(limit_bits);
    }
    let min_timespan = target_timespan * (100 - fork.max_adjust_up) / 100;
    let max_timespan = target_timespan * (100 + fork.max_adjust_down) / 100;
    let actual_timespan = (index.node(prev).timestamp as i64 - index.node(first).timestamp as i64)
        .max(min_timespan)
        .min(max_timespan)
        .max(1);

    let old_target = compact_to_big(index.node(prev).bits).value.to_biguint();
    let new_target = old_target * BigUint::from(actual_timespan as u64)
        / BigUint::from(target_timespan as u64);

    let limit = compact_to_big(limit_bits).value;
    let new_target = match U256::from_biguint(&new_target) {
        Some(target) if target <= limit => target,
        _ => limit,
    };
    let new_bits = big_to_compact(&new_target);

    if new_bits != index.node(prev).bits {
        trace!(
            "{} retarget at height {}: actual timespan {}s, target timespan {}s, bits {:08x} -> {:08x}",
            algo,
            next_height,
            actual_timespan,
            target_timespan,
            index.node(prev).bits,
            new_bits
        );
    }
    if new_target.is_zero() {
        warn!("{} retarget at height {} reached a zero target", algo, next_height);
    }
    Ok(new_bits)
}
