//! # Consensus-Engine
//!
//! Block validation for a multi-algorithm chain with scheduled hard forks.
//!
//! Every block declares its mining algorithm through its header version. Each
//! algorithm keeps its own proof-of-work limit and retargets on its own
//! history. The hard fork in effect at a height decides which algorithms exist,
//! how blocks are hashed for proof of work, how timestamps are ordered and how
//! the block subsidy is computed.
//!
//! ## Architecture
//!
//! The validation pipeline is layered:
//! - Sanity (`block`, `transaction`): context-free structure and proof of work
//! - Context (`chain`, `difficulty`, `checkpoints`): position in the block tree
//! - Connection (`chain`, `utxo`, `economic`): spending, fees and coinbase payout
//! - Scripts (`script`): delegated to a `ScriptVerifier` supplied by the caller
//!
//! ## Design Principles
//!
//! 1. **Explicit Context**: network parameters, time and storage are passed in
//! 2. **Exact Arithmetic**: targets and amounts never go through lossy conversions
//! 3. **Exact Version Pinning**: all consensus-critical dependencies pinned to exact versions
//! 4. **Typed Failures**: every rejection carries an `ErrorKind`
//!
//! ## Usage
//!
//! ```rust
//! use consensus_engine::economic::calc_block_subsidy;
//! use consensus_engine::params::ChainParams;
//! use consensus_engine::BASE_SUBSIDY;
//!
//! let params = ChainParams::mainnet();
//! assert_eq!(calc_block_subsidy(0, &params, 2), BASE_SUBSIDY);
//! ```

pub mod types;
pub mod constants;
pub mod hash;
pub mod error;
pub mod config;
pub mod params;
pub mod pow;
pub mod forkhash;
pub mod merkle;
pub mod script;
pub mod transaction;
pub mod block;
pub mod utxo;
pub mod chain_index;
pub mod timesource;
pub mod economic;
pub mod difficulty;
pub mod checkpoints;
pub mod chain;

// Re-export commonly used types
pub use types::*;
pub use constants::*;
pub use hash::Hash;
pub use error::{rule_error, ConsensusError, ErrorKind, Result};
pub use config::{BehaviorFlags, ChainConfig};
pub use params::ChainParams;
pub use chain::{BestState, BlockChain, BlockStatus};
pub use script::{ScriptFlags, ScriptVerifier};
pub use timesource::{FixedTimeSource, MedianTimeSource, SystemTimeSource};
pub use utxo::{MemoryUtxoStore, UtxoEntry, UtxoStore, UtxoViewpoint};
