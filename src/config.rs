//! Validation behavior and chain configuration
//!
//! `ChainConfig` can be loaded from JSON and resolves to a `ChainParams` for the
//! selected network. `BehaviorFlags` tunes individual validation passes.

use crate::error::{ConsensusError, Result};
use crate::params::{ChainParams, Checkpoint};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Named switches that relax parts of block validation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorFlags {
    /// Skip everything except the checkpoint checks in contextual validation.
    /// Used when reindexing blocks that were already fully validated.
    #[serde(default)]
    pub fast_add: bool,

    /// Skip the hash-below-target comparison. Used for block templates.
    #[serde(default)]
    pub no_pow_check: bool,
}

impl BehaviorFlags {
    pub const NONE: BehaviorFlags = BehaviorFlags {
        fast_add: false,
        no_pow_check: false,
    };

    /// Flags used when checking a mining template
    pub fn template() -> Self {
        BehaviorFlags {
            no_pow_check: true,
            ..Self::NONE
        }
    }

    pub fn fast_add() -> Self {
        BehaviorFlags {
            fast_add: true,
            ..Self::NONE
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// One of "mainnet", "testnet", "regtest"
    #[serde(default = "default_network")]
    pub network: String,

    /// Disable checkpoint enforcement entirely
    #[serde(default)]
    pub no_checkpoints: bool,

    /// Checkpoints appended to the network's built-in list
    #[serde(default)]
    pub extra_checkpoints: Vec<Checkpoint>,

    /// Override of the Plan 9 activation height
    #[serde(default)]
    pub plan9_height: Option<u32>,
}

fn default_network() -> String {
    "mainnet".to_string()
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            no_checkpoints: false,
            extra_checkpoints: Vec::new(),
            plan9_height: None,
        }
    }
}

impl ChainConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConsensusError::Config(format!("reading {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&contents)
    }

    /// Builds the parameter set for the configured network
    pub fn chain_params(&self) -> Result<ChainParams> {
        let mut params = ChainParams::for_network(&self.network).ok_or_else(|| {
            ConsensusError::Config(format!("unknown network {:?}", self.network))
        })?;
        if let Some(height) = self.plan9_height {
            params = params.with_plan9_height(height);
        }
        if self.no_checkpoints {
            params.checkpoints.clear();
        } else {
            params.checkpoints.extend(self.extra_checkpoints.iter().copied());
            params.checkpoints.sort_by_key(|c| c.height);
            params.checkpoints.dedup_by_key(|c| c.height);
        }
        Ok(params)
    }
}
