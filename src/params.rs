//! Network parameters
//!
//! Read-only constants for each supported network: genesis block, subsidy
//! schedule, coinbase maturity, checkpoints and the hard-fork table that maps
//! block versions to mining algorithms.

use crate::hash::Hash;
use crate::pow::{compact_to_big, U256};
use crate::types::*;
use serde::{Deserialize, Serialize};

pub const SHA256D: &str = "sha256d";
pub const SCRYPT: &str = "scrypt";

/// Mining algorithm parameters within one hard fork
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgoParams {
    pub name: String,
    /// Block version that selects this algorithm
    pub version: i32,
    /// Target seconds between two blocks of this algorithm
    pub version_interval: i64,
    /// Proof-of-work limit in compact form
    pub pow_limit_bits: u32,
}

/// One consensus epoch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardFork {
    pub name: String,
    pub activation_height: Height,
    pub algos: Vec<AlgoParams>,
    /// Algorithm assumed for versions missing from `algos`
    #[serde(default)]
    pub default_algo: Option<String>,
    /// Same-algorithm blocks averaged per retarget
    pub averaging_interval: u32,
    /// Largest per-retarget difficulty increase, in percent
    pub max_adjust_up: i64,
    /// Largest per-retarget difficulty decrease, in percent
    pub max_adjust_down: i64,
}

impl HardFork {
    pub fn algo(&self, name: &str) -> Option<&AlgoParams> {
        self.algos.iter().find(|a| a.name == name)
    }

    pub fn algo_by_version(&self, version: i32) -> Option<&AlgoParams> {
        self.algos.iter().find(|a| a.version == version)
    }
}

/// Hard-coded trust anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub height: Height,
    pub hash: Hash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    pub name: String,
    pub genesis_block: Block,
    /// Blocks between subsidy halvings before the first hard fork; zero disables halving
    pub subsidy_reduction_interval: u32,
    pub coinbase_maturity: u32,
    /// Sorted by ascending height
    pub checkpoints: Vec<Checkpoint>,
    /// Sorted by ascending activation height; the first entry activates at height 0
    pub hard_forks: Vec<HardFork>,
    pub pow_no_retargeting: bool,
}

impl ChainParams {
    pub fn mainnet() -> Self {
        ChainParams {
            name: "mainnet".to_string(),
            genesis_block: genesis_block(1231006505, 0x1d00ffff, 2083236893),
            subsidy_reduction_interval: 250_000,
            coinbase_maturity: 100,
            checkpoints: Vec::new(),
            hard_forks: vec![halcyon(0x1d00ffff, 0x1e0fffff), plan9(250_000, 0x1e0fffff)],
            pow_no_retargeting: false,
        }
    }

    pub fn testnet() -> Self {
        ChainParams {
            name: "testnet".to_string(),
            genesis_block: genesis_block(1296688602, 0x1d00ffff, 414098458),
            subsidy_reduction_interval: 250_000,
            coinbase_maturity: 100,
            checkpoints: Vec::new(),
            hard_forks: vec![halcyon(0x1e0fffff, 0x1e0fffff), plan9(1_000, 0x1e0fffff)],
            pow_no_retargeting: false,
        }
    }

    pub fn regtest() -> Self {
        ChainParams {
            name: "regtest".to_string(),
            genesis_block: genesis_block(1296688602, 0x207fffff, 2),
            subsidy_reduction_interval: 150,
            coinbase_maturity: 100,
            checkpoints: Vec::new(),
            hard_forks: vec![halcyon(0x207fffff, 0x207fffff), plan9(2_000, 0x207fffff)],
            pow_no_retargeting: true,
        }
    }

    /// Looks up a network by name
    pub fn for_network(name: &str) -> Option<Self> {
        match name {
            "mainnet" | "main" => Some(Self::mainnet()),
            "testnet" | "test" => Some(Self::testnet()),
            "regtest" => Some(Self::regtest()),
            _ => None,
        }
    }

    /// Moves the activation of every hard fork after the first to `height`
    pub fn with_plan9_height(mut self, height: Height) -> Self {
        for fork in self.hard_forks.iter_mut().skip(1) {
            fork.activation_height = height;
        }
        self
    }

    pub fn genesis_hash(&self) -> Hash {
        self.genesis_block.block_hash()
    }

    /// Index of the hard fork in effect at `height`
    pub fn hard_fork_index(&self, height: Height) -> usize {
        self.hard_forks
            .iter()
            .rposition(|f| f.activation_height <= height)
            .unwrap_or(0)
    }

    pub fn hard_fork(&self, height: Height) -> Option<&HardFork> {
        self.hard_forks.get(self.hard_fork_index(height))
    }

    /// Name of the mining algorithm selected by `version` at `height`
    pub fn algo_name(&self, version: i32, height: Height) -> Option<&str> {
        let fork = self.hard_fork(height)?;
        match fork.algo_by_version(version) {
            Some(algo) => Some(algo.name.as_str()),
            None => fork.default_algo.as_deref(),
        }
    }

    pub fn algo_params(&self, name: &str, height: Height) -> Option<&AlgoParams> {
        self.hard_fork(height)?.algo(name)
    }

    pub fn pow_limit_bits(&self, name: &str, height: Height) -> Option<u32> {
        self.algo_params(name, height).map(|a| a.pow_limit_bits)
    }

    /// Proof-of-work limit of the algorithm `name` at `height`
    pub fn pow_limit(&self, name: &str, height: Height) -> Option<U256> {
        self.pow_limit_bits(name, height)
            .map(|bits| compact_to_big(bits).value)
    }

    pub fn latest_checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoints.last()
    }

    pub fn checkpoint_at(&self, height: Height) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| c.height == height)
    }
}

fn halcyon(sha_limit: u32, scrypt_limit: u32) -> HardFork {
    HardFork {
        name: "halcyon".to_string(),
        activation_height: 0,
        algos: vec![
            AlgoParams {
                name: SHA256D.to_string(),
                version: 2,
                version_interval: 300,
                pow_limit_bits: sha_limit,
            },
            AlgoParams {
                name: SCRYPT.to_string(),
                version: 514,
                version_interval: 300,
                pow_limit_bits: scrypt_limit,
            },
        ],
        default_algo: Some(SHA256D.to_string()),
        averaging_interval: 10,
        max_adjust_up: 20,
        max_adjust_down: 10,
    }
}

const PLAN9_ALGOS: [&str; 9] = [
    "blake2b", "argon2i", "cn7v2", "keccak", SCRYPT, SHA256D, "skein", "stribog", "x11",
];

const PLAN9_PRIMES: [i64; 9] = [2, 3, 5, 7, 11, 13, 17, 19, 23];

fn plan9(activation_height: Height, pow_limit_bits: u32) -> HardFork {
    let algos = PLAN9_ALGOS
        .iter()
        .zip(PLAN9_PRIMES.iter())
        .enumerate()
        .map(|(i, (name, prime))| AlgoParams {
            name: name.to_string(),
            version: 5 + i as i32,
            version_interval: 54 * prime,
            pow_limit_bits,
        })
        .collect();
    HardFork {
        name: "plan9".to_string(),
        activation_height,
        algos,
        default_algo: None,
        averaging_interval: 9,
        max_adjust_up: 20,
        max_adjust_down: 10,
    }
}

fn genesis_block(timestamp: u32, bits: u32, nonce: u32) -> Block {
    let coinbase = Transaction {
        version: 1,
        inputs: vec![TransactionInput {
            prevout: OutPoint::null(),
            script_sig: GENESIS_SCRIPT_SIG.to_vec(),
            sequence: 0xffffffff,
            witness: Vec::new(),
        }],
        outputs: vec![TransactionOutput {
            value: 5_000_000_000,
            script_pubkey: GENESIS_SCRIPT_PUBKEY.to_vec(),
        }],
        lock_time: 0,
    };
    Block {
        header: BlockHeader {
            version: 1,
            prev_block_hash: Hash::ZERO,
            merkle_root: coinbase.txid(),
            timestamp,
            bits,
            nonce,
        },
        transactions: vec![coinbase],
    }
}

const GENESIS_SCRIPT_SIG: [u8; 77] = [
    0x04, 0xff, 0xff, 0x00, 0x1d, 0x01, 0x04, 0x45, 0x54, 0x68, 0x65, 0x20, 0x54, 0x69, 0x6d, 0x65,
    0x73, 0x20, 0x30, 0x33, 0x2f, 0x4a, 0x61, 0x6e, 0x2f, 0x32, 0x30, 0x30, 0x39, 0x20, 0x43, 0x68,
    0x61, 0x6e, 0x63, 0x65, 0x6c, 0x6c, 0x6f, 0x72, 0x20, 0x6f, 0x6e, 0x20, 0x62, 0x72, 0x69, 0x6e,
    0x6b, 0x20, 0x6f, 0x66, 0x20, 0x73, 0x65, 0x63, 0x6f, 0x6e, 0x64, 0x20, 0x62, 0x61, 0x69, 0x6c,
    0x6f, 0x75, 0x74, 0x20, 0x66, 0x6f, 0x72, 0x20, 0x62, 0x61, 0x6e, 0x6b, 0x73,
];

const GENESIS_SCRIPT_PUBKEY: [u8; 67] = [
    0x41, 0x04, 0x67, 0x8a, 0xfd, 0xb0, 0xfe, 0x55, 0x48, 0x27, 0x19, 0x67, 0xf1, 0xa6, 0x71, 0x30,
    0xb7, 0x10, 0x5c, 0xd6, 0xa8, 0x28, 0xe0, 0x39, 0x09, 0xa6, 0x79, 0x62, 0xe0, 0xea, 0x1f, 0x61,
    0xde, 0xb6, 0x49, 0xf6, 0xbc, 0x3f, 0x4c, 0xef, 0x38, 0xc4, 0xf3, 0x55, 0x04, 0xe5, 0x1e, 0xc1,
    0x12, 0xde, 0x5c, 0x38, 0x4d, 0xf7, 0xba, 0x0b, 0x8d, 0x57, 0x8a, 0x4c, 0x70, 0x2b, 0x6b, 0xf1,
    0x1d, 0x5f, 0xac,
];
