//! Block subsidy schedule

use crate::constants::*;
use crate::params::ChainParams;
use crate::types::*;

/// CalcBlockSubsidy: ℕ × 𝒫 × ℤ → ℤ
///
/// Before the Plan 9 hard fork the subsidy halves every
/// `subsidy_reduction_interval` blocks:
///
/// subsidy = B >> ⌊h/H⌋
///
/// From Plan 9 on the subsidy decays smoothly with height, scaled by the
/// repeat interval T of the algorithm selected by `version`:
///
/// subsidy = ⌊2.7 · T/300 · 2.7^(−h·300·9/T/375000) · C/9⌋
///
/// The floating-point operations run in the same order as the live network so
/// results match to the unit. An unknown algorithm earns nothing.
pub fn calc_block_subsidy(height: Height, params: &ChainParams, version: i32) -> Amount {
    if params.subsidy_reduction_interval == 0 {
        return BASE_SUBSIDY;
    }

    if params.hard_fork_index(height) == 0 {
        let halvings = height / params.subsidy_reduction_interval;
        return BASE_SUBSIDY.checked_shr(halvings).unwrap_or(0);
    }

    let interval = match params
        .algo_name(version, height)
        .and_then(|name| params.algo_params(name, height))
    {
        Some(algo) => algo.version_interval as f64,
        None => return 0,
    };
    let decay = 2.7f64.powf(-(height as f64) * 300.0 * 9.0 / interval / 375000.0);
    (2.7 * interval / 300.0 * decay * SATOSHI_PER_COIN as f64 / 9.0) as Amount
}
