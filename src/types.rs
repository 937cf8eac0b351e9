//! Core chain types consumed by the validation engine
//!
//! These are already-decoded structures. The only byte layout defined here is
//! the canonical serialization needed to compute identity hashes and sizes.

use crate::constants::NULL_OUTPOINT_INDEX;
use crate::hash::{double_sha256, Hash};
use serde::{Deserialize, Serialize};

/// Byte string type
pub type ByteString = Vec<u8>;

/// Amount in the smallest currency unit
pub type Amount = i64;

/// Block height
pub type Height = u32;

/// Witness stack of one input
pub type Witness = Vec<ByteString>;

/// Identifies one spendable output: (transaction hash, output index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

impl OutPoint {
    pub fn new(hash: Hash, index: u32) -> Self {
        OutPoint { hash, index }
    }

    /// The outpoint reserved for coinbase inputs
    pub fn null() -> Self {
        OutPoint {
            hash: Hash::ZERO,
            index: NULL_OUTPOINT_INDEX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.index == NULL_OUTPOINT_INDEX && self.hash.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub prevout: OutPoint,
    pub script_sig: ByteString,
    pub sequence: u32,
    #[serde(default)]
    pub witness: Witness,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub value: Amount,
    pub script_pubkey: ByteString,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u32,
}

impl Transaction {
    /// Transaction hash over the serialization without witness data
    pub fn txid(&self) -> Hash {
        double_sha256(&self.serialize_no_witness())
    }

    /// Witness transaction hash; equals the txid when no input carries witness data
    pub fn wtxid(&self) -> Hash {
        double_sha256(&self.serialize_with_witness())
    }

    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|input| !input.witness.is_empty())
    }

    pub fn serialize_no_witness(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.serialize_size_stripped());
        data.extend_from_slice(&self.version.to_le_bytes());
        self.write_inputs_outputs(&mut data);
        data.extend_from_slice(&self.lock_time.to_le_bytes());
        data
    }

    pub fn serialize_with_witness(&self) -> Vec<u8> {
        if !self.has_witness() {
            return self.serialize_no_witness();
        }
        let mut data = Vec::new();
        data.extend_from_slice(&self.version.to_le_bytes());
        // marker and flag
        data.push(0x00);
        data.push(0x01);
        self.write_inputs_outputs(&mut data);
        for input in &self.inputs {
            write_varint(&mut data, input.witness.len() as u64);
            for item in &input.witness {
                write_varint(&mut data, item.len() as u64);
                data.extend_from_slice(item);
            }
        }
        data.extend_from_slice(&self.lock_time.to_le_bytes());
        data
    }

    /// Serialized size without witness data
    pub fn serialize_size_stripped(&self) -> usize {
        let mut n = 4 + varint_size(self.inputs.len() as u64) + varint_size(self.outputs.len() as u64) + 4;
        for input in &self.inputs {
            n += 32 + 4 + varint_size(input.script_sig.len() as u64) + input.script_sig.len() + 4;
        }
        for output in &self.outputs {
            n += 8 + varint_size(output.script_pubkey.len() as u64) + output.script_pubkey.len();
        }
        n
    }

    fn write_inputs_outputs(&self, data: &mut Vec<u8>) {
        write_varint(data, self.inputs.len() as u64);
        for input in &self.inputs {
            data.extend_from_slice(input.prevout.hash.as_bytes());
            data.extend_from_slice(&input.prevout.index.to_le_bytes());
            write_varint(data, input.script_sig.len() as u64);
            data.extend_from_slice(&input.script_sig);
            data.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_varint(data, self.outputs.len() as u64);
        for output in &self.outputs {
            data.extend_from_slice(&output.value.to_le_bytes());
            write_varint(data, output.script_pubkey.len() as u64);
            data.extend_from_slice(&output.script_pubkey);
        }
    }
}

pub const BLOCK_HEADER_SIZE: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block_hash: Hash,
    pub merkle_root: Hash,
    /// Unix time in seconds
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn serialize(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut bytes = [0u8; BLOCK_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.version.to_le_bytes());
        bytes[4..36].copy_from_slice(self.prev_block_hash.as_bytes());
        bytes[36..68].copy_from_slice(self.merkle_root.as_bytes());
        bytes[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        bytes[72..76].copy_from_slice(&self.bits.to_le_bytes());
        bytes[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    /// Identity hash of the header: SHA256(SHA256(header)).
    ///
    /// Proof of work uses the algorithm-specific hash from `forkhash` instead.
    pub fn block_hash(&self) -> Hash {
        double_sha256(&self.serialize())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn block_hash(&self) -> Hash {
        self.header.block_hash()
    }

    /// Serialized size without witness data
    pub fn serialize_size_stripped(&self) -> usize {
        BLOCK_HEADER_SIZE
            + varint_size(self.transactions.len() as u64)
            + self
                .transactions
                .iter()
                .map(Transaction::serialize_size_stripped)
                .sum::<usize>()
    }
}

fn write_varint(data: &mut Vec<u8>, value: u64) {
    if value < 0xfd {
        data.push(value as u8);
    } else if value <= 0xffff {
        data.push(0xfd);
        data.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xffff_ffff {
        data.push(0xfe);
        data.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        data.push(0xff);
        data.extend_from_slice(&value.to_le_bytes());
    }
}

fn varint_size(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x10000..=0xffff_ffff => 5,
        _ => 9,
    }
}
