//! Unspent transaction output view
//!
//! A `UtxoViewpoint` is an in-memory overlay of the UTXO set as of some block.
//! Each validation attempt owns its own view: entries are fetched on demand
//! from a `UtxoStore`, mutated as transactions connect, and either discarded
//! or committed back to the store.

use crate::error::{ConsensusError, Result};
use crate::hash::Hash;
use crate::script::is_unspendable;
use crate::transaction::is_coinbase;
use crate::types::*;
use log::error;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// One unspent (or just-spent) output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoEntry {
    pub amount: Amount,
    pub pk_script: ByteString,
    /// Height of the block that created the output
    pub block_height: Height,
    is_coinbase: bool,
    spent: bool,
    modified: bool,
}

impl UtxoEntry {
    pub fn new(amount: Amount, pk_script: ByteString, block_height: Height, is_coinbase: bool) -> Self {
        UtxoEntry {
            amount,
            pk_script,
            block_height,
            is_coinbase,
            spent: false,
            modified: false,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.is_coinbase
    }

    pub fn is_spent(&self) -> bool {
        self.spent
    }

    /// Changed since the view was loaded or last committed
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn spend(&mut self) {
        if self.spent {
            return;
        }
        self.spent = true;
        self.modified = true;
    }
}

/// State of an output immediately before a block spent it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpentTxOut {
    pub amount: Amount,
    pub pk_script: ByteString,
    pub height: Height,
    pub is_coinbase: bool,
}

impl From<&UtxoEntry> for SpentTxOut {
    fn from(entry: &UtxoEntry) -> Self {
        SpentTxOut {
            amount: entry.amount,
            pk_script: entry.pk_script.clone(),
            height: entry.block_height,
            is_coinbase: entry.is_coinbase,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UtxoViewpoint {
    entries: HashMap<OutPoint, UtxoEntry>,
    best_hash: Hash,
}

impl UtxoViewpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash of the block whose state this view represents
    pub fn best_hash(&self) -> Hash {
        self.best_hash
    }

    pub fn set_best_hash(&mut self, hash: Hash) {
        self.best_hash = hash;
    }

    pub fn lookup_entry(&self, outpoint: &OutPoint) -> Option<&UtxoEntry> {
        self.entries.get(outpoint)
    }

    pub fn entries(&self) -> &HashMap<OutPoint, UtxoEntry> {
        &self.entries
    }

    /// Adds output `index` of `tx` as unspent, replacing any existing entry.
    /// Provably unspendable outputs are never added.
    pub fn add_tx_out(&mut self, txid: Hash, tx: &Transaction, index: u32, height: Height) {
        let output = match tx.outputs.get(index as usize) {
            Some(output) => output,
            None => return,
        };
        if is_unspendable(&output.script_pubkey) {
            return;
        }
        let mut entry = UtxoEntry::new(
            output.value,
            output.script_pubkey.clone(),
            height,
            is_coinbase(tx),
        );
        entry.modified = true;
        self.entries.insert(OutPoint::new(txid, index), entry);
    }

    pub fn add_tx_outs(&mut self, tx: &Transaction, height: Height) {
        let txid = tx.txid();
        for index in 0..tx.outputs.len() as u32 {
            self.add_tx_out(txid, tx, index, height);
        }
    }

    /// Spends every input of `tx` and adds its outputs.
    ///
    /// The pre-spend state of each input is appended to `stxos` when given.
    /// Every input must already be present in the view.
    pub fn connect_transaction(
        &mut self,
        tx: &Transaction,
        height: Height,
        mut stxos: Option<&mut Vec<SpentTxOut>>,
    ) -> Result<()> {
        if is_coinbase(tx) {
            self.add_tx_outs(tx, height);
            return Ok(());
        }

        for input in &tx.inputs {
            let entry = match self.entries.get_mut(&input.prevout) {
                Some(entry) => entry,
                None => {
                    let msg = format!(
                        "view missing input {}:{}",
                        input.prevout.hash, input.prevout.index
                    );
                    error!("{}", msg);
                    return Err(ConsensusError::Assert(msg));
                }
            };
            if let Some(stxos) = stxos.as_deref_mut() {
                stxos.push(SpentTxOut::from(&*entry));
            }
            entry.spend();
        }

        self.add_tx_outs(tx, height);
        Ok(())
    }

    pub fn connect_transactions(
        &mut self,
        block: &Block,
        height: Height,
        mut stxos: Option<&mut Vec<SpentTxOut>>,
    ) -> Result<()> {
        for tx in &block.transactions {
            self.connect_transaction(tx, height, stxos.as_deref_mut())?;
        }
        Ok(())
    }

    /// Undoes `block` at `height` by replaying its spend journal in reverse.
    ///
    /// Outputs the block created are marked spent and the outputs it consumed
    /// are restored. The view's best hash moves back to the block's parent.
    pub fn disconnect_transactions(
        &mut self,
        block: &Block,
        height: Height,
        stxos: &[SpentTxOut],
    ) -> Result<()> {
        let spent_count: usize = block
            .transactions
            .iter()
            .filter(|tx| !is_coinbase(tx))
            .map(|tx| tx.inputs.len())
            .sum();
        if stxos.len() != spent_count {
            let msg = format!(
                "spend journal has {} entries, block spends {} outputs",
                stxos.len(),
                spent_count
            );
            error!("{}", msg);
            return Err(ConsensusError::Assert(msg));
        }

        let mut stxo_index = stxos.len();
        for tx in block.transactions.iter().rev() {
            let txid = tx.txid();
            let coinbase = is_coinbase(tx);
            for (index, output) in tx.outputs.iter().enumerate() {
                if is_unspendable(&output.script_pubkey) {
                    continue;
                }
                let outpoint = OutPoint::new(txid, index as u32);
                let entry = self.entries.entry(outpoint).or_insert_with(|| {
                    UtxoEntry::new(output.value, output.script_pubkey.clone(), height, coinbase)
                });
                entry.spend();
            }

            if coinbase {
                continue;
            }
            for input in tx.inputs.iter().rev() {
                stxo_index -= 1;
                let stxo = &stxos[stxo_index];
                let mut entry = UtxoEntry::new(
                    stxo.amount,
                    stxo.pk_script.clone(),
                    stxo.height,
                    stxo.is_coinbase,
                );
                entry.modified = true;
                self.entries.insert(input.prevout, entry);
            }
        }

        self.best_hash = block.header.prev_block_hash;
        Ok(())
    }

    /// Loads the requested outputs that are not already in the view.
    /// Outputs the store does not have stay absent.
    pub fn fetch_utxos(&mut self, store: &dyn UtxoStore, outpoints: &HashSet<OutPoint>) -> Result<()> {
        let needed: Vec<OutPoint> = outpoints
            .iter()
            .filter(|op| !self.entries.contains_key(op))
            .copied()
            .collect();
        if needed.is_empty() {
            return Ok(());
        }
        let fetched = store.fetch_utxos(&needed)?;
        for (outpoint, entry) in fetched {
            self.entries.entry(outpoint).or_insert(entry);
        }
        Ok(())
    }

    /// Loads every output referenced by the inputs of `block`.
    ///
    /// Outputs created by an earlier transaction of the same block are added
    /// directly instead of being fetched.
    pub fn fetch_input_utxos(&mut self, store: &dyn UtxoStore, block: &Block, height: Height) -> Result<()> {
        let in_flight: HashMap<Hash, usize> = block
            .transactions
            .iter()
            .enumerate()
            .map(|(i, tx)| (tx.txid(), i))
            .collect();

        let mut needed = HashSet::new();
        for (i, tx) in block.transactions.iter().enumerate().skip(1) {
            for input in &tx.inputs {
                if let Some(&origin) = in_flight.get(&input.prevout.hash) {
                    if origin < i {
                        self.add_tx_outs(&block.transactions[origin], height);
                        continue;
                    }
                }
                if self.entries.contains_key(&input.prevout) {
                    continue;
                }
                needed.insert(input.prevout);
            }
        }
        self.fetch_utxos(store, &needed)
    }

    /// Drops spent entries
    pub fn prune(&mut self) {
        self.entries.retain(|_, entry| !entry.spent);
    }

    /// Marks the view as persisted: spent entries are dropped and the
    /// remaining ones are no longer modified.
    pub fn commit(&mut self) {
        self.prune();
        for entry in self.entries.values_mut() {
            entry.modified = false;
        }
    }
}

/// Backing storage of the UTXO set
pub trait UtxoStore: Send + Sync {
    /// Returns the unspent entries among `outpoints`; missing outputs are omitted.
    fn fetch_utxos(&self, outpoints: &[OutPoint]) -> anyhow::Result<HashMap<OutPoint, UtxoEntry>>;

    /// Persists the modified entries of `view` and records its best hash.
    fn commit_view(&self, view: &UtxoViewpoint) -> anyhow::Result<()>;

    fn best_hash(&self) -> anyhow::Result<Hash>;
}

#[derive(Debug, Default)]
struct MemoryState {
    utxos: HashMap<OutPoint, UtxoEntry>,
    best_hash: Hash,
}

/// UTXO store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryUtxoStore {
    state: RwLock<MemoryState>,
}

impl MemoryUtxoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, outpoint: OutPoint, entry: UtxoEntry) {
        self.state.write().utxos.insert(outpoint, entry);
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<UtxoEntry> {
        self.state.read().utxos.get(outpoint).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UtxoStore for MemoryUtxoStore {
    fn fetch_utxos(&self, outpoints: &[OutPoint]) -> anyhow::Result<HashMap<OutPoint, UtxoEntry>> {
        let state = self.state.read();
        Ok(outpoints
            .iter()
            .filter_map(|op| state.utxos.get(op).map(|entry| (*op, entry.clone())))
            .collect())
    }

    fn commit_view(&self, view: &UtxoViewpoint) -> anyhow::Result<()> {
        let mut state = self.state.write();
        for (outpoint, entry) in view.entries() {
            if !entry.is_modified() {
                continue;
            }
            if entry.is_spent() {
                state.utxos.remove(outpoint);
            } else {
                let mut stored = entry.clone();
                stored.modified = false;
                state.utxos.insert(*outpoint, stored);
            }
        }
        state.best_hash = view.best_hash();
        Ok(())
    }

    fn best_hash(&self) -> anyhow::Result<Hash> {
        Ok(self.state.read().best_hash)
    }
}
