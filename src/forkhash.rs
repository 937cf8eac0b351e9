//! Algorithm-specific proof-of-work hashing
//!
//! Before the Plan 9 hard fork a header is hashed with SHA256d or scrypt
//! depending on its version. From Plan 9 on every algorithm uses DivHash, which
//! alternates big-integer square/multiply/divide rounds with blake3.

use crate::hash::{double_sha256, Hash, HASH_SIZE};
use crate::params::{ChainParams, SCRYPT};
use crate::types::{BlockHeader, Height};
use log::error;
use num_bigint::BigUint;

/// DivHash rounds applied to block headers
pub const HEADER_DIVHASH_REPETITIONS: u32 = 4;

/// Proof-of-work hash of `header` at `height`.
///
/// The result is compared against the target as a little-endian integer, like
/// the identity hash.
pub fn pow_hash(header: &BlockHeader, height: Height, params: &ChainParams) -> Hash {
    let bytes = header.serialize();
    if params.hard_fork_index(height) > 0 {
        return div_hash4(&bytes);
    }
    match params.algo_name(header.version, height) {
        Some(SCRYPT) => scrypt_hash(&bytes),
        _ => double_sha256(&bytes),
    }
}

/// scrypt with N=1024, r=1, p=1 using the data as both password and salt
pub fn scrypt_hash(data: &[u8]) -> Hash {
    let mut out = [0u8; HASH_SIZE];
    let params = match scrypt::Params::new(10, 1, 1, HASH_SIZE) {
        Ok(params) => params,
        Err(e) => {
            error!("scrypt parameters rejected: {}", e);
            return Hash(out);
        }
    };
    if let Err(e) = scrypt::scrypt(data, data, &params, &mut out) {
        error!("scrypt failed: {}", e);
        return Hash([0u8; HASH_SIZE]);
    }
    Hash(out)
}

pub fn div_hash4(data: &[u8]) -> Hash {
    div_hash(data, HEADER_DIVHASH_REPETITIONS)
}

/// DivHash over `data` with `repetitions` extra rounds.
///
/// Inputs shorter than two bytes, or whose rotated value is zero, have no
/// defined hash and map to the all-ones value, which exceeds every target.
pub fn div_hash(data: &[u8], repetitions: u32) -> Hash {
    let mut current = data.to_vec();
    let mut remaining = repetitions;
    loop {
        let scrambled = match div_round(&current) {
            Some(bytes) => bytes,
            None => return Hash([0xff; HASH_SIZE]),
        };
        if remaining == 0 {
            let mut out = *blake3::hash(&scrambled).as_bytes();
            out.reverse();
            return Hash(out);
        }
        remaining -= 1;
        current = scrambled;
    }
}

/// One square/multiply/divide round followed by per-segment blake3.
fn div_round(block: &[u8]) -> Option<Vec<u8>> {
    let len = block.len();
    if len < 2 {
        return None;
    }
    let half = len / 2;
    let (front, back) = block.split_at(half);
    let front_rev: Vec<u8> = front.iter().rev().copied().collect();
    let back_rev: Vec<u8> = back.iter().rev().copied().collect();

    // block followed by its reversed first half
    let mut first = Vec::with_capacity(len + half);
    first.extend_from_slice(block);
    first.extend_from_slice(&front_rev);

    // the block with its first half reversed, followed by the head of its
    // reversed second half, truncated to the same length as `first`
    let mut second = Vec::with_capacity(len + half);
    second.extend_from_slice(&front_rev);
    second.extend_from_slice(back);
    second.extend_from_slice(&back_rev[..half]);

    // divisor: second half followed by first half
    let mut rotated = Vec::with_capacity(len);
    rotated.extend_from_slice(back);
    rotated.extend_from_slice(front);

    let divisor = BigUint::from_bytes_be(&rotated);
    if divisor.bits() == 0 {
        return None;
    }
    let first_int = BigUint::from_bytes_be(&first);
    let second_int = BigUint::from_bytes_be(&second);
    let product = (&first_int * &first_int) * (&second_int * &second_int) / divisor;
    let product_bytes = if product.bits() == 0 {
        Vec::new()
    } else {
        product.to_bytes_be()
    };

    let mut out = Vec::with_capacity(product_bytes.len());
    for segment in product_bytes.chunks(HASH_SIZE) {
        let digest = blake3::hash(segment);
        out.extend_from_slice(&digest.as_bytes()[..segment.len()]);
    }
    Some(out)
}
