//! Chain-position validation and tip management
//!
//! `BlockChain` owns the block index, the active chain and the spend journal
//! behind one readers-writer lock. Contextual checks read the chain state;
//! connecting a block requires the write guard, which is passed explicitly so
//! that holding the lock is part of the function signature.
//!
//! ```text
//!   process_block
//!     ├─ check_block_sanity_with_flags   (context free)
//!     ├─ check_block_context             (header context, finality)
//!     ├─ check_connect_block             (utxo view, fees, scripts)
//!     └─ commit view to the UtxoStore, extend the tip
//! ```

use crate::block::check_block_sanity_with_flags;
use crate::chain_index::{BlockIndex, BlockNode, ChainView, NodeId};
use crate::checkpoints::{find_previous_checkpoint, latest_checkpoint, verify_checkpoint};
use crate::config::{BehaviorFlags, ChainConfig};
use crate::constants::*;
use crate::difficulty::calc_next_required_difficulty;
use crate::economic::calc_block_subsidy;
use crate::error::{rule_error, ConsensusError, ErrorKind, Result};
use crate::hash::Hash;
use crate::params::ChainParams;
use crate::pow::U256;
use crate::script::{ScriptFlags, ScriptVerifier};
use crate::timesource::MedianTimeSource;
use crate::transaction::{check_transaction_inputs, get_sig_op_cost, is_finalized_transaction};
use crate::types::*;
use crate::utxo::{SpentTxOut, UtxoStore, UtxoViewpoint};
use log::{debug, error, warn};
use parking_lot::{RwLock, RwLockWriteGuard};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Where an accepted block ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// Connected and now the chain tip
    MainChain,
    /// Valid in context but its parent is not the tip; indexed only
    SideChain,
}

/// Summary of the active chain tip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BestState {
    pub hash: Hash,
    pub height: Height,
    pub timestamp: u32,
    pub bits: u32,
}

/// Everything guarded by the chain-state lock
#[derive(Debug, Default)]
pub struct ChainState {
    index: BlockIndex,
    best_chain: ChainView,
    spend_journal: HashMap<Hash, Vec<SpentTxOut>>,
}

impl ChainState {
    pub fn index(&self) -> &BlockIndex {
        &self.index
    }

    pub fn best_chain(&self) -> &ChainView {
        &self.best_chain
    }

    /// Tip of the active chain; the genesis node is indexed at construction
    fn tip(&self) -> Result<NodeId> {
        self.best_chain.tip().ok_or_else(|| {
            let msg = "chain has no tip".to_string();
            error!("{}", msg);
            ConsensusError::Assert(msg)
        })
    }

    /// Spent outputs recorded when the block `hash` was connected
    pub fn spend_journal(&self, hash: &Hash) -> Option<&[SpentTxOut]> {
        self.spend_journal.get(hash).map(Vec::as_slice)
    }
}

/// Exclusive access to the chain state of one `BlockChain` for the lifetime
/// of the guard
pub struct ChainStateGuard<'a> {
    chain: &'a BlockChain,
    state: RwLockWriteGuard<'a, ChainState>,
}

impl Deref for ChainStateGuard<'_> {
    type Target = ChainState;

    fn deref(&self) -> &ChainState {
        &self.state
    }
}

impl DerefMut for ChainStateGuard<'_> {
    fn deref_mut(&mut self) -> &mut ChainState {
        &mut self.state
    }
}

pub struct BlockChain {
    params: ChainParams,
    /// Number of most recent main-chain blocks that keep a spend journal
    journal_depth: Height,
    store: Arc<dyn UtxoStore>,
    verifier: Arc<dyn ScriptVerifier>,
    time_source: Arc<dyn MedianTimeSource>,
    state: RwLock<ChainState>,
}

impl BlockChain {
    /// Creates a chain whose only block is the network's genesis block
    pub fn new(
        params: ChainParams,
        store: Arc<dyn UtxoStore>,
        verifier: Arc<dyn ScriptVerifier>,
        time_source: Arc<dyn MedianTimeSource>,
    ) -> Self {
        let mut state = ChainState::default();
        let genesis = state.index.add_node(&params.genesis_block.header, None);
        let ChainState {
            index, best_chain, ..
        } = &mut state;
        best_chain.set_tip(index, Some(genesis));

        BlockChain {
            params,
            journal_depth: DEFAULT_SPEND_JOURNAL_DEPTH,
            store,
            verifier,
            time_source,
            state: RwLock::new(state),
        }
    }

    pub fn from_config(
        config: &ChainConfig,
        store: Arc<dyn UtxoStore>,
        verifier: Arc<dyn ScriptVerifier>,
        time_source: Arc<dyn MedianTimeSource>,
    ) -> Result<Self> {
        Ok(Self::new(config.chain_params()?, store, verifier, time_source))
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Limits how many of the latest main-chain blocks can be disconnected.
    /// Older spend journal entries are dropped as the tip advances.
    pub fn with_spend_journal_depth(mut self, depth: Height) -> Self {
        self.journal_depth = depth.max(1);
        self
    }

    /// Takes the chain-state lock for writing. The lock is released when the
    /// guard drops, on every exit path.
    pub fn lock_chain_state(&self) -> ChainStateGuard<'_> {
        ChainStateGuard {
            chain: self,
            state: self.state.write(),
        }
    }

    pub fn best_snapshot(&self) -> Result<BestState> {
        let state = self.state.read();
        let node = state.index.node(state.tip()?);
        Ok(BestState {
            hash: node.hash,
            height: node.height,
            timestamp: node.timestamp,
            bits: node.bits,
        })
    }

    /// Whether `hash` is part of the active chain
    pub fn main_chain_has_block(&self, hash: &Hash) -> bool {
        let state = self.state.read();
        state
            .index
            .lookup(hash)
            .map_or(false, |id| state.best_chain.contains(&state.index, id))
    }

    /// Bits required of the next block of `algo` on top of the tip
    pub fn calc_next_required_difficulty(&self, algo: &str) -> Result<u32> {
        let state = self.state.read();
        calc_next_required_difficulty(&state.index, Some(state.tip()?), algo, &self.params)
    }

    /// Algorithm and proof-of-work limit selected by `version` at `height`
    fn algo_limit(&self, version: i32, height: Height) -> Result<U256> {
        self.params
            .algo_name(version, height)
            .and_then(|algo| self.params.pow_limit(algo, height))
            .ok_or_else(|| {
                rule_error(
                    ErrorKind::UnexpectedDifficulty,
                    format!("block version {} selects no algorithm at height {}", version, height),
                )
            })
    }

    /// CheckBlockHeaderContext: ℋ × ℬ𝒩 → {valid, invalid}
    ///
    /// Unless `fast_add` is set the header must carry exactly the required
    /// difficulty for its algorithm and a timestamp past its parent (after the
    /// first hard fork) or past the median time of recent blocks (before it).
    /// Checkpoint checks always run.
    pub fn check_block_header_context(
        &self,
        state: &ChainState,
        header: &BlockHeader,
        prev: Option<NodeId>,
        flags: BehaviorFlags,
    ) -> Result<()> {
        let prev = match prev {
            Some(prev) => prev,
            None => return Ok(()),
        };
        let prev_node = state.index.node(prev);
        let height = prev_node.height + 1;

        if !flags.fast_add {
            let algo = self.params.algo_name(header.version, height).ok_or_else(|| {
                rule_error(
                    ErrorKind::UnexpectedDifficulty,
                    format!("block version {} selects no algorithm at height {}", header.version, height),
                )
            })?;
            let expected = calc_next_required_difficulty(&state.index, Some(prev), algo, &self.params)?;
            if header.bits != expected {
                let msg = format!(
                    "block difficulty of {:08x} is not the expected value of {:08x}",
                    header.bits, expected
                );
                warn!("{}", msg);
                return Err(rule_error(ErrorKind::UnexpectedDifficulty, msg));
            }

            if self.params.hard_fork_index(height) > 0 {
                if header.timestamp <= prev_node.timestamp {
                    return Err(rule_error(
                        ErrorKind::TimeTooOld,
                        "timestamp is equal to or less than the chain tip",
                    ));
                }
            } else {
                let median = state.index.calc_past_median_time(prev);
                if header.timestamp <= median {
                    return Err(rule_error(
                        ErrorKind::TimeTooOld,
                        format!(
                            "block timestamp of {} is not after expected {}",
                            header.timestamp, median
                        ),
                    ));
                }
            }
        }

        let hash = header.block_hash();
        if !verify_checkpoint(&self.params, height, &hash) {
            return Err(rule_error(
                ErrorKind::BadCheckpoint,
                format!("block at height {} does not match checkpoint hash", height),
            ));
        }

        if let Some(checkpoint) = find_previous_checkpoint(&self.params, &state.index, &state.best_chain) {
            let checkpoint_height = state.index.node(checkpoint).height;
            if height < checkpoint_height {
                return Err(rule_error(
                    ErrorKind::ForkTooOld,
                    format!(
                        "block at height {} forks the main chain before the previous checkpoint at height {}",
                        height, checkpoint_height
                    ),
                ));
            }
        }

        Ok(())
    }

    /// Header context plus, unless `fast_add` is set, lock-time finality of
    /// every transaction at the block's height and timestamp.
    pub fn check_block_context(
        &self,
        state: &ChainState,
        block: &Block,
        prev: Option<NodeId>,
        flags: BehaviorFlags,
    ) -> Result<()> {
        let header = &block.header;
        self.check_block_header_context(state, header, prev, flags)?;
        if flags.fast_add {
            return Ok(());
        }

        let height = prev.map_or(0, |p| state.index.node(p).height + 1);
        let block_time = header.timestamp as i64;
        for tx in &block.transactions {
            if !is_finalized_transaction(tx, height, block_time) {
                return Err(rule_error(
                    ErrorKind::UnfinalizedTx,
                    format!("block contains unfinalized transaction {}", tx.txid()),
                ));
            }
        }
        Ok(())
    }

    /// ConnectBlock: ℬ × 𝒰𝒱 → 𝒰𝒱
    ///
    /// Applies `block` at `node` to `view`, which must represent the state at the
    /// block's parent. Checks signature-operation cost, inputs and fees, the
    /// coinbase payout against subsidy plus fees, and scripts above the latest
    /// checkpoint. On success the view's best hash becomes the block's hash;
    /// on failure the view must be discarded.
    ///
    /// `state` must be the guard of this chain's own lock.
    pub fn check_connect_block(
        &self,
        state: &mut ChainStateGuard<'_>,
        node: &BlockNode,
        block: &Block,
        view: &mut UtxoViewpoint,
        mut stxos: Option<&mut Vec<SpentTxOut>>,
    ) -> Result<()> {
        if !std::ptr::eq(state.chain, self) {
            let msg = "chain state guard belongs to another chain".to_string();
            error!("{}", msg);
            return Err(ConsensusError::Assert(msg));
        }

        if node.hash == self.params.genesis_hash() {
            return Err(rule_error(
                ErrorKind::MissingTxOut,
                "the coinbase for the genesis block is not spendable",
            ));
        }

        let parent_hash = block.header.prev_block_hash;
        if view.best_hash() != parent_hash {
            let msg = format!(
                "inconsistent view when checking block connection: best hash is {} instead of expected {}",
                view.best_hash(),
                parent_hash
            );
            error!("{}", msg);
            return Err(ConsensusError::Assert(msg));
        }

        view.fetch_input_utxos(self.store.as_ref(), block, node.height)?;

        let bip16 = node.timestamp >= BIP16_ACTIVATION_TIME;
        let transactions = &block.transactions;

        let mut total_sig_op_cost: usize = 0;
        for (i, tx) in transactions.iter().enumerate() {
            let cost = get_sig_op_cost(tx, i == 0, view, bip16)?;
            total_sig_op_cost = total_sig_op_cost
                .checked_add(cost)
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

        let mut total_fees: Amount = 0;
        for tx in transactions {
            let fee = check_transaction_inputs(tx, node.height, view, &self.params)?;
            total_fees = total_fees.checked_add(fee).ok_or_else(|| {
                rule_error(ErrorKind::BadFees, "total fees for block overflows accumulator")
            })?;
            view.connect_transaction(tx, node.height, stxos.as_deref_mut())?;
        }

        let coinbase = transactions.first().ok_or_else(|| {
            rule_error(ErrorKind::NoTransactions, "block does not contain any transactions")
        })?;
        // output values were range checked by sanity
        let total_out: Amount = coinbase.outputs.iter().map(|o| o.value).sum();
        let expected = calc_block_subsidy(node.height, &self.params, node.version).saturating_add(total_fees);
        if total_out > expected {
            return Err(rule_error(
                ErrorKind::BadCoinbaseValue,
                format!(
                    "coinbase transaction for block pays {} which is more than expected value of {}",
                    total_out, expected
                ),
            ));
        }

        let run_scripts = match latest_checkpoint(&self.params) {
            Some(checkpoint) => node.height > checkpoint.height,
            None => true,
        };
        if run_scripts {
            let flags = ScriptFlags { bip16 };
            self.verifier
                .verify_scripts(block, view, flags)
                .map_err(|e| rule_error(ErrorKind::ScriptValidation, e.to_string()))?;
        } else {
            debug!(
                "skipping script validation for block {} at height {} below the latest checkpoint",
                node.hash, node.height
            );
        }

        view.set_best_hash(node.hash);
        Ok(())
    }

    /// Fully validates a block template built on the current tip, except for
    /// the hash-below-target comparison. Nothing is committed.
    pub fn check_connect_block_template(&self, block: &Block) -> Result<()> {
        let flags = BehaviorFlags::template();
        let mut state = self.lock_chain_state();
        let tip = state.tip()?;
        let tip_node = state.index.node(tip).clone();

        let header = &block.header;
        if header.prev_block_hash != tip_node.hash {
            return Err(rule_error(
                ErrorKind::PrevBlockNotBest,
                format!(
                    "previous block must be the current chain tip {}, instead got {}",
                    tip_node.hash, header.prev_block_hash
                ),
            ));
        }

        let height = tip_node.height + 1;
        let pow_limit = self.algo_limit(header.version, height)?;
        check_block_sanity_with_flags(
            block,
            &pow_limit,
            self.time_source.as_ref(),
            flags,
            height,
            tip_node.timestamp,
            &self.params,
        )?;
        self.check_block_context(&state, block, Some(tip), flags)?;

        let mut view = UtxoViewpoint::new();
        view.set_best_hash(tip_node.hash);
        let node = BlockNode::new(header, Some((tip, tip_node.height)));
        self.check_connect_block(&mut state, &node, block, &mut view, None)
    }

    /// Validates `block` and, when it extends the tip, connects it: the UTXO
    /// changes are committed to the store and the block becomes the new tip.
    /// A valid block on another branch is indexed without being connected.
    ///
    /// An indexed block that is off the active chain is connected once its
    /// parent is the tip, so a branch can be switched to by disconnecting back
    /// to the fork point and processing the branch's blocks in order.
    pub fn process_block(&self, block: &Block, flags: BehaviorFlags) -> Result<BlockStatus> {
        let mut state = self.lock_chain_state();
        let header = &block.header;
        let hash = header.block_hash();

        if let Some(id) = state.index.lookup(&hash) {
            let connectable = !state.best_chain.contains(&state.index, id)
                && state.index.node(id).parent == state.best_chain.tip();
            if !connectable {
                return Err(rule_error(
                    ErrorKind::DuplicateBlock,
                    format!("already have block {}", hash),
                ));
            }
        }
        let parent = state.index.lookup(&header.prev_block_hash).ok_or_else(|| {
            rule_error(
                ErrorKind::MissingParent,
                format!("previous block {} is unknown", header.prev_block_hash),
            )
        })?;
        let parent_node = state.index.node(parent).clone();
        let height = parent_node.height + 1;

        let pow_limit = self.algo_limit(header.version, height)?;
        check_block_sanity_with_flags(
            block,
            &pow_limit,
            self.time_source.as_ref(),
            flags,
            height,
            parent_node.timestamp,
            &self.params,
        )?;
        self.check_block_context(&state, block, Some(parent), flags)?;

        if state.best_chain.tip() != Some(parent) {
            state.index.add_node(header, Some(parent));
            debug!("accepted side chain block {} at height {}", hash, height);
            return Ok(BlockStatus::SideChain);
        }

        let node = BlockNode::new(header, Some((parent, parent_node.height)));
        let mut view = UtxoViewpoint::new();
        view.set_best_hash(parent_node.hash);
        let mut stxos = Vec::new();
        self.check_connect_block(&mut state, &node, block, &mut view, Some(&mut stxos))?;

        self.store.commit_view(&view)?;
        view.commit();

        let ChainState {
            index,
            best_chain,
            spend_journal,
        } = &mut *state;
        let id = index.add_node(header, Some(parent));
        best_chain.set_tip(index, Some(id));
        spend_journal.insert(hash, stxos);
        if let Some(expired) = height
            .checked_sub(self.journal_depth)
            .and_then(|h| best_chain.node_by_height(h))
        {
            spend_journal.remove(&index.node(expired).hash);
        }

        debug!(
            "connected block {} at height {} with {} transactions",
            hash,
            height,
            block.transactions.len()
        );
        Ok(BlockStatus::MainChain)
    }

    /// Disconnects the tip, which must be `block`, restoring the outputs it
    /// spent from the spend journal. The parent becomes the tip; the block stays
    /// indexed.
    pub fn disconnect_tip(&self, block: &Block) -> Result<()> {
        let mut state = self.lock_chain_state();
        let tip = state.tip()?;
        let tip_node = state.index.node(tip).clone();
        let hash = block.block_hash();

        if tip_node.hash != hash {
            let msg = format!("block {} is not the chain tip {}", hash, tip_node.hash);
            error!("{}", msg);
            return Err(ConsensusError::Assert(msg));
        }
        let parent = match tip_node.parent {
            Some(parent) => parent,
            None => {
                let msg = "cannot disconnect the genesis block".to_string();
                error!("{}", msg);
                return Err(ConsensusError::Assert(msg));
            }
        };
        let stxos = match state.spend_journal.get(&hash) {
            Some(stxos) => stxos.clone(),
            None => {
                let msg = format!("no spend journal entry for block {}", hash);
                error!("{}", msg);
                return Err(ConsensusError::Assert(msg));
            }
        };

        let mut view = UtxoViewpoint::new();
        view.set_best_hash(hash);
        view.disconnect_transactions(block, tip_node.height, &stxos)?;
        self.store.commit_view(&view)?;

        let ChainState {
            index,
            best_chain,
            spend_journal,
        } = &mut *state;
        spend_journal.remove(&hash);
        best_chain.set_tip(index, Some(parent));

        debug!("disconnected block {} at height {}", hash, tip_node.height);
        Ok(())
    }
}
