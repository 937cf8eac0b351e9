//! Proof-of-work targets
//!
//! Compact difficulty encoding, 256-bit target arithmetic and the header
//! proof-of-work check.

use crate::config::BehaviorFlags;
use crate::error::{rule_error, ErrorKind, Result};
use crate::forkhash::pow_hash;
use crate::hash::Hash;
use crate::params::ChainParams;
use crate::types::*;
use log::warn;
use num_bigint::BigUint;
use std::cmp::Ordering;
use std::fmt;

/// 256-bit unsigned integer, least significant word first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct U256([u64; 4]);

impl U256 {
    pub const ZERO: U256 = U256([0; 4]);
    pub const MAX: U256 = U256([u64::MAX; 4]);

    pub fn from_u64(value: u64) -> Self {
        U256([value, 0, 0, 0])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&x| x == 0)
    }

    pub fn low_u64(&self) -> u64 {
        self.0[0]
    }

    /// Number of significant bits
    pub fn bits(&self) -> u32 {
        for i in (0..4).rev() {
            if self.0[i] != 0 {
                return 64 * i as u32 + (64 - self.0[i].leading_zeros());
            }
        }
        0
    }

    pub fn shl(&self, shift: u32) -> Self {
        if shift >= 256 {
            return U256::ZERO;
        }
        let mut result = U256::ZERO;
        let word_shift = (shift / 64) as usize;
        let bit_shift = shift % 64;
        for i in 0..(4 - word_shift) {
            let mut word = self.0[i] << bit_shift;
            if bit_shift > 0 && i > 0 {
                word |= self.0[i - 1] >> (64 - bit_shift);
            }
            result.0[i + word_shift] = word;
        }
        result
    }

    pub fn shr(&self, shift: u32) -> Self {
        if shift >= 256 {
            return U256::ZERO;
        }
        let mut result = U256::ZERO;
        let word_shift = (shift / 64) as usize;
        let bit_shift = shift % 64;
        for i in word_shift..4 {
            let mut word = self.0[i] >> bit_shift;
            if bit_shift > 0 && i + 1 < 4 {
                word |= self.0[i + 1] << (64 - bit_shift);
            }
            result.0[i - word_shift] = word;
        }
        result
    }

    pub fn from_le_bytes(bytes: &[u8; 32]) -> Self {
        let mut words = [0u64; 4];
        for (i, word) in words.iter_mut().enumerate() {
            let mut chunk = [0u8; 8];
            chunk.copy_from_slice(&bytes[i * 8..(i + 1) * 8]);
            *word = u64::from_le_bytes(chunk);
        }
        U256(words)
    }

    pub fn to_le_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for (i, word) in self.0.iter().enumerate() {
            bytes[i * 8..(i + 1) * 8].copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut bytes = self.to_le_bytes();
        bytes.reverse();
        bytes
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_le(&self.to_le_bytes())
    }

    /// `None` when the value does not fit in 256 bits
    pub fn from_biguint(value: &BigUint) -> Option<Self> {
        let bytes = value.to_bytes_le();
        if bytes.len() > 32 {
            return None;
        }
        let mut buf = [0u8; 32];
        buf[..bytes.len()].copy_from_slice(&bytes);
        Some(U256::from_le_bytes(&buf))
    }
}

impl PartialOrd for U256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for U256 {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().rev().zip(other.0.iter().rev()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }
}

impl fmt::LowerHex for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.to_be_bytes() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Target decoded from compact form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactTarget {
    pub value: U256,
    pub negative: bool,
}

/// Expands compact difficulty bits.
///
/// The encoding is a base-256 float: the top byte is the exponent (length in
/// bytes), bit 23 is a sign bit and the low 23 bits are the mantissa.
/// target = mantissa * 256^(exponent-3). Values beyond 256 bits saturate.
pub fn compact_to_big(bits: u32) -> CompactTarget {
    let mantissa = bits & 0x007f_ffff;
    let negative = bits & 0x0080_0000 != 0;
    let exponent = bits >> 24;

    let value = if exponent <= 3 {
        U256::from_u64((mantissa >> (8 * (3 - exponent))) as u64)
    } else {
        let m = U256::from_u64(mantissa as u64);
        let shift = 8 * (exponent - 3);
        if mantissa != 0 && m.bits() + shift > 256 {
            U256::MAX
        } else {
            m.shl(shift)
        }
    };

    CompactTarget {
        value,
        negative: negative && !value.is_zero(),
    }
}

/// Encodes a non-negative target in compact form, the inverse of
/// `compact_to_big` up to mantissa precision.
pub fn big_to_compact(n: &U256) -> u32 {
    if n.is_zero() {
        return 0;
    }
    let mut exponent = (n.bits() + 7) / 8;
    let mut mantissa = if exponent <= 3 {
        (n.low_u64() as u32) << (8 * (3 - exponent))
    } else {
        n.shr(8 * (exponent - 3)).low_u64() as u32
    };
    if mantissa & 0x0080_0000 != 0 {
        mantissa >>= 8;
        exponent += 1;
    }
    (exponent << 24) | mantissa
}

/// Interprets a hash as a little-endian 256-bit integer
pub fn hash_to_big(hash: &Hash) -> U256 {
    U256::from_le_bytes(hash.as_bytes())
}

/// CheckProofOfWork: ℋ × ℕ → {valid, invalid}
///
/// The target expanded from `header.bits` must lie in (0, pow_limit]. Unless
/// `flags.no_pow_check` is set, the algorithm-specific hash of the header at
/// `height` must not exceed the target.
pub fn check_proof_of_work(
    header: &BlockHeader,
    pow_limit: &U256,
    flags: BehaviorFlags,
    height: Height,
    params: &ChainParams,
) -> Result<()> {
    let target = compact_to_big(header.bits);
    if target.negative || target.value.is_zero() {
        return Err(rule_error(
            ErrorKind::UnexpectedDifficulty,
            format!("block target difficulty of {:064x} is too low", target.value),
        ));
    }

    if target.value > *pow_limit {
        let msg = format!(
            "height {} block target difficulty of {:064x} is higher than max of {:064x}",
            height, target.value, pow_limit
        );
        warn!("{}", msg);
        return Err(rule_error(ErrorKind::UnexpectedDifficulty, msg));
    }

    if !flags.no_pow_check {
        let hash = pow_hash(header, height, params);
        let big_hash = hash_to_big(&hash);
        if big_hash > target.value {
            let msg = format!(
                "block hash of {} {:064x} is higher than expected max of {:064x}",
                height, big_hash, target.value
            );
            warn!("{}", msg);
            return Err(rule_error(ErrorKind::HighHash, msg));
        }
    }

    Ok(())
}

/// Full proof-of-work check of a block, hash comparison included
pub fn check_block_proof_of_work(
    block: &Block,
    pow_limit: &U256,
    height: Height,
    params: &ChainParams,
) -> Result<()> {
    check_proof_of_work(&block.header, pow_limit, BehaviorFlags::NONE, height, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_to_big_genesis_bits() {
        let target = compact_to_big(0x1d00ffff);
        assert!(!target.negative);
        assert_eq!(target.value, U256::from_u64(0xffff).shl(208));
    }

    #[test]
    fn test_compact_to_big_small_exponents() {
        assert_eq!(compact_to_big(0x03123456).value, U256::from_u64(0x123456));
        assert_eq!(compact_to_big(0x02123456).value, U256::from_u64(0x1234));
        assert_eq!(compact_to_big(0x01003456).value, U256::ZERO);
        assert_eq!(compact_to_big(0x05009234).value, U256::from_u64(0x92340000));
    }

    #[test]
    fn test_compact_to_big_sign_bit() {
        let target = compact_to_big(0x04923456);
        assert!(target.negative);
        assert_eq!(target.value, U256::from_u64(0x12345600));

        let target = compact_to_big(0x01fedcba);
        assert!(target.negative);
        assert_eq!(target.value, U256::from_u64(0x7e));

        // sign of zero is dropped
        assert!(!compact_to_big(0x01800000).negative);
    }

    #[test]
    fn test_compact_to_big_saturates() {
        assert_eq!(compact_to_big(0xff123456).value, U256::MAX);
        assert_eq!(compact_to_big(0x21010000).value, U256::MAX);
        assert_ne!(compact_to_big(0x20010000).value, U256::MAX);
    }

    #[test]
    fn test_big_to_compact() {
        assert_eq!(big_to_compact(&U256::ZERO), 0);
        assert_eq!(big_to_compact(&U256::from_u64(0x80)), 0x02008000);
        assert_eq!(big_to_compact(&U256::from_u64(0x92340000)), 0x05009234);
        assert_eq!(big_to_compact(&U256::from_u64(0x12345600)), 0x04123456);
    }

    #[test]
    fn test_compact_round_trip_known_bits() {
        for bits in [0x1d00ffffu32, 0x207fffff, 0x1b0404cb, 0x1e0fffff, 0x1e0ffff0] {
            assert_eq!(big_to_compact(&compact_to_big(bits).value), bits);
        }
    }

    #[test]
    fn test_u256_shifts() {
        let v = U256::from_u64(0x8000_0000_0000_0001);
        assert_eq!(v.shl(1), U256([2, 1, 0, 0]));
        assert_eq!(v.shl(1).shr(1), v);
        assert_eq!(v.shl(192).shr(192), v);
        assert_eq!(v.shl(256), U256::ZERO);
        assert_eq!(U256::MAX.shr(255), U256::from_u64(1));
        assert_eq!(U256::MAX.bits(), 256);
        assert_eq!(U256::ZERO.bits(), 0);
    }

    #[test]
    fn test_u256_ordering_and_biguint() {
        let small = U256::from_u64(5).shl(64);
        let large = U256::from_u64(1).shl(200);
        assert!(small < large);
        let big = large.to_biguint();
        assert_eq!(U256::from_biguint(&big), Some(large));
        assert_eq!(U256::from_biguint(&(U256::MAX.to_biguint() + 1u32)), None);
    }

    #[test]
    fn test_hash_to_big_is_little_endian() {
        let mut bytes = [0u8; 32];
        bytes[31] = 0x01;
        assert_eq!(hash_to_big(&Hash(bytes)), U256::from_u64(1).shl(248));
        let mut bytes = [0u8; 32];
        bytes[0] = 0x01;
        assert_eq!(hash_to_big(&Hash(bytes)), U256::from_u64(1));
    }

    #[test]
    fn test_lower_hex_width() {
        assert_eq!(format!("{:x}", U256::from_u64(0xab)).len(), 64);
        assert!(format!("{:x}", U256::from_u64(0xab)).ends_with("00ab"));
    }

    #[test]
    fn test_check_proof_of_work_genesis() {
        let params = ChainParams::mainnet();
        let limit = compact_to_big(0x1d00ffff).value;
        let block = &params.genesis_block;
        assert!(check_block_proof_of_work(block, &limit, 0, &params).is_ok());
    }

    #[test]
    fn test_check_proof_of_work_high_hash() {
        let params = ChainParams::mainnet();
        let limit = compact_to_big(0x1d00ffff).value;
        let mut header = params.genesis_block.header.clone();
        header.nonce = header.nonce.wrapping_add(1);
        let err = check_proof_of_work(&header, &limit, BehaviorFlags::NONE, 0, &params).unwrap_err();
        assert_eq!(err.rule_kind(), Some(ErrorKind::HighHash));
        assert!(check_proof_of_work(&header, &limit, BehaviorFlags::template(), 0, &params).is_ok());
    }

    #[test]
    fn test_check_proof_of_work_target_range() {
        let params = ChainParams::mainnet();
        let limit = compact_to_big(0x1d00ffff).value;
        let mut header = params.genesis_block.header.clone();

        header.bits = 0x207fffff;
        let err = check_proof_of_work(&header, &limit, BehaviorFlags::template(), 0, &params).unwrap_err();
        assert_eq!(err.rule_kind(), Some(ErrorKind::UnexpectedDifficulty));

        header.bits = 0;
        let err = check_proof_of_work(&header, &limit, BehaviorFlags::template(), 0, &params).unwrap_err();
        assert_eq!(err.rule_kind(), Some(ErrorKind::UnexpectedDifficulty));

        header.bits = 0x04923456;
        let err = check_proof_of_work(&header, &limit, BehaviorFlags::template(), 0, &params).unwrap_err();
        assert_eq!(err.rule_kind(), Some(ErrorKind::UnexpectedDifficulty));
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_normalized_compact_round_trip(exponent in 3u32..=32, mantissa in 0x010000u32..=0x7fffff) {
            let bits = (exponent << 24) | mantissa;
            prop_assert_eq!(big_to_compact(&compact_to_big(bits).value), bits);
        }
    }
}
