//! Shared fixtures: a regtest chain backed by the in-memory UTXO store and a
//! block builder that solves proof of work for the regtest limit.

#![allow(dead_code)]

use consensus_engine::economic::calc_block_subsidy;
use consensus_engine::forkhash::pow_hash;
use consensus_engine::merkle::build_merkle_tree_store;
use consensus_engine::pow::{compact_to_big, hash_to_big};
use consensus_engine::*;
use std::sync::Arc;

pub struct AcceptAll;

impl ScriptVerifier for AcceptAll {
    fn verify_scripts(&self, _: &Block, _: &UtxoViewpoint, _: ScriptFlags) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct RejectAll;

impl ScriptVerifier for RejectAll {
    fn verify_scripts(&self, _: &Block, _: &UtxoViewpoint, _: ScriptFlags) -> anyhow::Result<()> {
        anyhow::bail!("signature check failed")
    }
}

/// Far enough past genesis that no test block is "too new", including blocks
/// stamped after the BIP16 switch time
pub fn test_time(params: &ChainParams) -> FixedTimeSource {
    FixedTimeSource(params.genesis_block.header.timestamp as i64 + 1_000_000_000)
}

pub struct TestChain {
    pub chain: BlockChain,
    pub store: Arc<MemoryUtxoStore>,
    /// Active chain, genesis first
    pub blocks: Vec<Block>,
}

impl TestChain {
    pub fn regtest() -> Self {
        Self::with_params(ChainParams::regtest(), Arc::new(AcceptAll))
    }

    pub fn with_params(params: ChainParams, verifier: Arc<dyn ScriptVerifier>) -> Self {
        let store = Arc::new(MemoryUtxoStore::new());
        let time = Arc::new(test_time(&params));
        let genesis = params.genesis_block.clone();
        let chain = BlockChain::new(params, store.clone(), verifier, time);
        TestChain {
            chain,
            store,
            blocks: vec![genesis],
        }
    }

    pub fn with_spend_journal_depth(mut self, depth: Height) -> Self {
        self.chain = self.chain.with_spend_journal_depth(depth);
        self
    }

    pub fn params(&self) -> &ChainParams {
        self.chain.params()
    }

    pub fn tip(&self) -> &Block {
        self.blocks.last().expect("genesis is always present")
    }

    pub fn height(&self) -> Height {
        self.blocks.len() as Height - 1
    }

    /// Template for the next block on the tip
    pub fn next(&self) -> BlockTemplate {
        BlockTemplate::new(self.params(), &self.tip().header, self.height() + 1)
    }

    /// Processes `block`, tracking it when it becomes the new tip
    pub fn process(&mut self, block: Block) -> Result<BlockStatus> {
        let status = self.chain.process_block(&block, BehaviorFlags::NONE)?;
        if status == BlockStatus::MainChain {
            self.blocks.push(block);
        }
        Ok(status)
    }

    /// Extends the tip with `count` coinbase-only blocks
    pub fn mine(&mut self, count: usize) {
        for _ in 0..count {
            let block = self.next().build(self.params());
            assert_eq!(self.process(block).unwrap(), BlockStatus::MainChain);
        }
    }

    pub fn disconnect_tip(&mut self) -> Result<()> {
        let block = self.tip().clone();
        self.chain.disconnect_tip(&block)?;
        self.blocks.pop();
        Ok(())
    }

    /// First output of the coinbase at `height` on the active chain
    pub fn coinbase_outpoint(&self, height: Height) -> OutPoint {
        OutPoint::new(self.blocks[height as usize].transactions[0].txid(), 0)
    }
}

/// Parameters of a block to build on top of `prev`
#[derive(Clone)]
pub struct BlockTemplate {
    pub prev: BlockHeader,
    pub height: Height,
    pub version: i32,
    pub timestamp: u32,
    pub bits: u32,
    pub coinbase_value: Amount,
    /// Distinguishes otherwise identical coinbases
    pub coinbase_tag: u8,
    pub coinbase_lock_time: u32,
    pub coinbase_sequence: u32,
    pub transactions: Vec<Transaction>,
}

impl BlockTemplate {
    pub fn new(params: &ChainParams, prev: &BlockHeader, height: Height) -> Self {
        let mut template = BlockTemplate {
            prev: prev.clone(),
            height,
            version: 2,
            timestamp: prev.timestamp + 60,
            bits: 0,
            coinbase_value: 0,
            coinbase_tag: 0,
            coinbase_lock_time: 0,
            coinbase_sequence: SEQUENCE_FINAL,
            transactions: Vec::new(),
        };
        template.set_version(params, 2);
        template
    }

    /// Selects the algorithm by version and resets bits and payout to match it
    pub fn set_version(&mut self, params: &ChainParams, version: i32) {
        self.version = version;
        self.bits = params
            .algo_name(version, self.height)
            .and_then(|algo| params.pow_limit_bits(algo, self.height))
            .unwrap_or(0x207fffff);
        self.coinbase_value = calc_block_subsidy(self.height, params, version);
    }

    pub fn coinbase(&self) -> Transaction {
        let mut script_sig = vec![0x04];
        script_sig.extend_from_slice(&self.height.to_le_bytes());
        script_sig.push(self.coinbase_tag);
        Transaction {
            version: 1,
            inputs: vec![TransactionInput {
                prevout: OutPoint::null(),
                script_sig,
                sequence: self.coinbase_sequence,
                witness: Vec::new(),
            }],
            outputs: vec![TransactionOutput {
                value: self.coinbase_value,
                script_pubkey: vec![0x51],
            }],
            lock_time: self.coinbase_lock_time,
        }
    }

    fn assemble(&self) -> Block {
        let mut transactions = vec![self.coinbase()];
        transactions.extend(self.transactions.iter().cloned());
        Block {
            header: BlockHeader {
                version: self.version,
                prev_block_hash: self.prev.block_hash(),
                merkle_root: build_merkle_tree_store(&transactions, false).root(),
                timestamp: self.timestamp,
                bits: self.bits,
                nonce: 0,
            },
            transactions,
        }
    }

    /// Assembles the block and grinds the nonce until its hash meets the target
    pub fn build(&self, params: &ChainParams) -> Block {
        self.grind(params, true)
    }

    /// Same block, but with a nonce whose hash misses the target
    pub fn build_unsolved(&self, params: &ChainParams) -> Block {
        self.grind(params, false)
    }

    fn grind(&self, params: &ChainParams, solved: bool) -> Block {
        let mut block = self.assemble();
        let target = compact_to_big(block.header.bits).value;
        loop {
            let hash = hash_to_big(&pow_hash(&block.header, self.height, params));
            if (hash <= target) == solved {
                return block;
            }
            block.header.nonce += 1;
        }
    }
}

/// Spends `prevout` into a single anyone-can-spend output of `value`
pub fn spend(prevout: OutPoint, value: Amount) -> Transaction {
    spend_with_scripts(prevout, value, vec![0x51], vec![0x51])
}

/// Spends `prevout` with `script_sig` into a single output locked by `script_pubkey`
pub fn spend_with_scripts(
    prevout: OutPoint,
    value: Amount,
    script_sig: Vec<u8>,
    script_pubkey: Vec<u8>,
) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TransactionInput {
            prevout,
            script_sig,
            sequence: SEQUENCE_FINAL,
            witness: Vec::new(),
        }],
        outputs: vec![TransactionOutput {
            value,
            script_pubkey,
        }],
        lock_time: 0,
    }
}

/// OP_HASH160 <20 bytes> OP_EQUAL
pub fn p2sh_script(script_hash: [u8; 20]) -> Vec<u8> {
    let mut script = vec![0xa9, 0x14];
    script.extend_from_slice(&script_hash);
    script.push(0x87);
    script
}

/// Script sig whose only push, via OP_PUSHDATA2, is `redeem_script`
pub fn push_redeem_script(redeem_script: &[u8]) -> Vec<u8> {
    let mut script_sig = vec![0x4d];
    script_sig.extend_from_slice(&(redeem_script.len() as u16).to_le_bytes());
    script_sig.extend_from_slice(redeem_script);
    script_sig
}
