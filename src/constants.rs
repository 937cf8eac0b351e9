//! Consensus constants

/// Number of base units in one coin
pub const SATOSHI_PER_COIN: i64 = 100_000_000;

/// Maximum amount any output or sum of outputs may carry
pub const MAX_SATOSHI: i64 = 21_000_000 * SATOSHI_PER_COIN;

/// Starting block subsidy before the first hard fork: 2 coins
pub const BASE_SUBSIDY: i64 = 2 * SATOSHI_PER_COIN;

/// Maximum serialized block size, excluding witness data
pub const MAX_BLOCK_BASE_SIZE: usize = 1_000_000;

/// Scale factor applied to legacy signature operations
pub const WITNESS_SCALE_FACTOR: usize = 4;

/// Maximum signature operation cost per block
pub const MAX_BLOCK_SIG_OPS_COST: usize = 80_000;

/// Maximum number of seconds a block time may be ahead of adjusted time
pub const MAX_TIME_OFFSET_SECONDS: i64 = 300;

/// Coinbase signature script length bounds
pub const MIN_COINBASE_SCRIPT_LEN: usize = 2;
pub const MAX_COINBASE_SCRIPT_LEN: usize = 100;

/// Number of previous blocks used for the median time past
pub const MEDIAN_TIME_BLOCKS: usize = 11;

/// Block version from which coinbases start with the serialized height
pub const SERIALIZED_HEIGHT_VERSION: i32 = 2;

/// Lock time threshold: lock times below this are block heights, otherwise unix timestamps
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Sequence number marking an input as final
pub const SEQUENCE_FINAL: u32 = 0xffffffff;

/// Output index of the null outpoint reserved for coinbase inputs
pub const NULL_OUTPOINT_INDEX: u32 = u32::MAX;

/// Pay-to-script-hash rules apply to blocks with timestamps at or after this instant
pub const BIP16_ACTIVATION_TIME: u32 = 1_333_238_400;

/// Maximum script length; longer output scripts are provably unspendable
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Maximum public keys counted for an imprecise CHECKMULTISIG
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

/// Default number of latest main-chain blocks whose spent outputs are kept
/// for disconnection
pub const DEFAULT_SPEND_JOURNAL_DEPTH: u32 = 288;
