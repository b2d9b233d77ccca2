//! Deterministic, non-cryptographic hashing.
//!
//! - [`murmur3_32`] / [`murmur3_x64_128`]: MurmurHash3 (x86_32 and x64_128),
//!   bit-compatible with the reference implementation, used to pick feature
//!   columns and signs.
//! - [`tie_break_key`]: SplitMix64-finalized key used to order exactly-equal
//!   scores reproducibly within one decision.
//!
//! None of these provide cryptographic guarantees.

const C1_32: u32 = 0xcc9e_2d51;
const C2_32: u32 = 0x1b87_3593;

const C1_64: u64 = 0x87c3_7b91_1142_53d5;
const C2_64: u64 = 0x4cf5_ad43_2745_937f;

/// MurmurHash3 x86_32.
#[must_use]
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let mut h = seed;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        h ^= mix_k32(k);
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, &b) in tail.iter().enumerate() {
            k ^= u32::from(b) << (8 * i);
        }
        h ^= mix_k32(k);
    }

    // Reference implementation mixes in the length as a 32-bit value.
    h ^= data.len() as u32;
    fmix32(h)
}

/// MurmurHash3 x64_128, returned as `(h1, h2)`.
#[must_use]
pub fn murmur3_x64_128(data: &[u8], seed: u32) -> (u64, u64) {
    let mut h1 = u64::from(seed);
    let mut h2 = u64::from(seed);

    let mut blocks = data.chunks_exact(16);
    for block in &mut blocks {
        let mut k1 = u64::from_le_bytes(block[0..8].try_into().unwrap_or([0; 8]));
        let mut k2 = u64::from_le_bytes(block[8..16].try_into().unwrap_or([0; 8]));

        k1 = k1.wrapping_mul(C1_64).rotate_left(31).wrapping_mul(C2_64);
        h1 ^= k1;
        h1 = h1.rotate_left(27).wrapping_add(h2);
        h1 = h1.wrapping_mul(5).wrapping_add(0x52dc_e729);

        k2 = k2.wrapping_mul(C2_64).rotate_left(33).wrapping_mul(C1_64);
        h2 ^= k2;
        h2 = h2.rotate_left(31).wrapping_add(h1);
        h2 = h2.wrapping_mul(5).wrapping_add(0x3849_5ab5);
    }

    let tail = blocks.remainder();
    if tail.len() > 8 {
        let mut k2 = 0u64;
        for (i, &b) in tail[8..].iter().enumerate() {
            k2 ^= u64::from(b) << (8 * i);
        }
        k2 = k2.wrapping_mul(C2_64).rotate_left(33).wrapping_mul(C1_64);
        h2 ^= k2;
    }
    if !tail.is_empty() {
        let mut k1 = 0u64;
        for (i, &b) in tail.iter().take(8).enumerate() {
            k1 ^= u64::from(b) << (8 * i);
        }
        k1 = k1.wrapping_mul(C1_64).rotate_left(31).wrapping_mul(C2_64);
        h1 ^= k1;
    }

    let len = data.len() as u64;
    h1 ^= len;
    h2 ^= len;
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    h1 = fmix64(h1);
    h2 = fmix64(h2);
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    (h1, h2)
}

/// 32-bit hash of a string's UTF-8 bytes.
#[must_use]
pub fn hash32(s: &str, seed: u32) -> u32 {
    murmur3_32(s.as_bytes(), seed)
}

/// 64-bit hash of a string's UTF-8 bytes (low half of x64_128).
#[must_use]
pub fn hash64(s: &str, seed: u32) -> u64 {
    murmur3_x64_128(s.as_bytes(), seed).0
}

/// Ordering key for breaking exact score ties.
///
/// Same `(noise, index)` always yields the same key; a different noise draw
/// reshuffles the relative order of tied entries.
#[must_use]
pub fn tie_break_key(noise: f64, index: usize) -> u64 {
    splitmix64(noise.to_bits() ^ splitmix64(index as u64))
}

#[inline]
fn mix_k32(k: u32) -> u32 {
    k.wrapping_mul(C1_32).rotate_left(15).wrapping_mul(C2_32)
}

#[inline]
fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^ (h >> 16)
}

#[inline]
fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^ (k >> 33)
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
