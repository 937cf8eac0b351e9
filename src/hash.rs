//! Fixed-size hash type

use crate::error::ConsensusError;
use bitcoin_hashes::hex::{FromHex, ToHex};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

pub const HASH_SIZE: usize = 32;

/// 32-byte hash in internal byte order.
///
/// Equality is byte-exact. The textual form is the byte-reversed hex string,
/// which is for display only.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Hash(pub [u8; HASH_SIZE]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; HASH_SIZE]);

    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_SIZE]
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        f.write_str(&reversed.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self)
    }
}

impl FromStr for Hash {
    type Err = ConsensusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = Vec::<u8>::from_hex(s)
            .map_err(|e| ConsensusError::Config(format!("invalid hash string {:?}: {}", s, e)))?;
        if bytes.len() != HASH_SIZE {
            return Err(ConsensusError::Config(format!(
                "hash string {:?} decodes to {} bytes, want {}",
                s,
                bytes.len(),
                HASH_SIZE
            )));
        }
        let mut out = [0u8; HASH_SIZE];
        for (i, b) in bytes.iter().rev().enumerate() {
            out[i] = *b;
        }
        Ok(Hash(out))
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// SHA256(SHA256(data))
pub fn double_sha256(data: &[u8]) -> Hash {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; HASH_SIZE];
    out.copy_from_slice(&second);
    Hash(out)
}
