//! Character N-grams and Bucket Hashing
//!
//! Every entity is wrapped in `<` and `>` before n-grams are taken. Two
//! schemes exist:
//!
//! - compatible: UTF-8 byte slices aligned on character boundaries, ordered
//!   by start then length, lone boundary markers skipped, hashed with FNV-1a
//!   over sign-extended bytes.
//! - legacy: Unicode character slices ordered by length then start, hashed
//!   with FNV-1a over code points.

use super::config::SubwordConfig;

const FNV_OFFSET: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

fn wrap(entity: &str) -> String {
    format!("<{}>", entity)
}

/// FNV-1a over bytes, each byte sign-extended first
pub fn hash_bytes(bytes: &[u8]) -> u32 {
    let mut h = FNV_OFFSET;
    for &b in bytes {
        h ^= b as i8 as u32;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// FNV-1a over Unicode code points
pub fn hash_legacy(ngram: &str) -> u32 {
    let mut h = FNV_OFFSET;
    for c in ngram.chars() {
        h ^= c as u32;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// Character n-grams of `<entity>`, shortest first
pub fn char_ngrams(entity: &str, min_n: usize, max_n: usize) -> Vec<String> {
    let chars: Vec<char> = wrap(entity).chars().collect();
    let len = chars.len();
    let mut ngrams = Vec::new();

    for n in min_n.max(1)..=max_n.min(len) {
        for start in 0..=len - n {
            ngrams.push(chars[start..start + n].iter().collect());
        }
    }
    ngrams
}

#[inline]
fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

/// Byte n-grams of `<entity>` on character boundaries, by start position
pub fn byte_ngrams(entity: &str, min_n: usize, max_n: usize) -> Vec<Vec<u8>> {
    let bytes = wrap(entity).into_bytes();
    let len = bytes.len();
    let mut ngrams = Vec::new();

    for start in 0..len {
        if is_continuation(bytes[start]) {
            continue;
        }

        let mut end = start;
        let mut n = 1;
        while end < len && n <= max_n {
            end += 1;
            while end < len && is_continuation(bytes[end]) {
                end += 1;
            }
            // a lone `<` or `>` is not an n-gram
            if n >= min_n && !(n == 1 && (start == 0 || end == len)) {
                ngrams.push(bytes[start..end].to_vec());
            }
            n += 1;
        }
    }
    ngrams
}

/// Bucket indices of an entity's n-grams, repeats kept, in n-gram order
pub fn ngram_hashes(entity: &str, config: &SubwordConfig) -> Vec<u32> {
    if config.bucket == 0 {
        return Vec::new();
    }
    let bucket = config.bucket as u64;
    let to_bucket = |h: u32| (u64::from(h) % bucket) as u32;

    if config.compatible_hash {
        byte_ngrams(entity, config.min_n, config.max_n)
            .iter()
            .map(|ngram| to_bucket(hash_bytes(ngram)))
            .collect()
    } else {
        char_ngrams(entity, config.min_n, config.max_n)
            .iter()
            .map(|ngram| to_bucket(hash_legacy(ngram)))
            .collect()
    }
}
