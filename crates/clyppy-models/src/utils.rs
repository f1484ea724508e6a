//! Identifier derivation helpers.

use sha2::{Digest, Sha256};

const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Encode bytes, interpreted as a big-endian unsigned integer, in lowercase
/// base36. An all-zero (or empty) input encodes as `"0"`.
pub fn encode_base36(bytes: &[u8]) -> String {
    let mut digits: Vec<u8> = bytes.to_vec();
    let mut out: Vec<u8> = Vec::new();

    // Long division by 36 over the base-256 digits, least significant first.
    while digits.iter().any(|&d| d != 0) {
        let mut remainder: u32 = 0;
        for d in digits.iter_mut() {
            let acc = remainder * 256 + u32::from(*d);
            *d = (acc / 36) as u8;
            remainder = acc % 36;
        }
        out.push(BASE36_ALPHABET[remainder as usize]);
    }

    if out.is_empty() {
        return "0".to_string();
    }
    out.iter().rev().map(|&b| b as char).collect()
}

/// First `len` base36 chars of SHA-256 over `input`, padded with `a` when the
/// encoding is shorter than `len`.
///
/// This is the derivation behind every public clip identifier: deterministic,
/// lowercase, `[0-9a-z]` only.
pub fn short_hash(input: &str, len: usize) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut encoded = encode_base36(&digest);
    encoded.truncate(len);
    while encoded.len() < len {
        encoded.push('a');
    }
    encoded
}
