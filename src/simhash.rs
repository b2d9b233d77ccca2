//! SimHash fingerprints and feature-name lookup for table-based models.
//!
//! Older models ship an explicit list of feature names instead of relying on
//! the hashing trick. [`FeatureNameTable`] resolves a flattened path to a
//! column of such a model: exact matches first, then (optionally) the nearest
//! name by SimHash Hamming distance, which tolerates small renames such as a
//! changed separator.

use std::collections::HashMap;

use crate::hash::hash64;

/// Number of bits in a fingerprint.
pub const SIMHASH_BITS: usize = 64;

/// Running SimHash state: one signed counter per fingerprint bit.
#[derive(Debug, Clone, PartialEq)]
pub struct SimHash {
    seed: u32,
    counters: [i64; SIMHASH_BITS],
}

impl SimHash {
    /// Empty accumulator keyed by `seed`.
    pub fn new(seed: u32) -> Self {
        Self {
            seed,
            counters: [0; SIMHASH_BITS],
        }
    }

    /// Fingerprint of a token set, each token weighted 1.
    pub fn of_tokens<'a, I>(tokens: I, seed: u32) -> u64
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut s = Self::new(seed);
        for t in tokens {
            s.add(t, 1);
        }
        s.fingerprint()
    }

    /// Add a token with an integer weight.
    pub fn add(&mut self, token: &str, weight: i64) {
        let h = hash64(token, self.seed);
        for (bit, counter) in self.counters.iter_mut().enumerate() {
            if (h >> bit) & 1 == 1 {
                *counter += weight;
            } else {
                *counter -= weight;
            }
        }
    }

    /// Per-bit weighted counters.
    pub fn counters(&self) -> &[i64; SIMHASH_BITS] {
        &self.counters
    }

    /// Bit `i` is set when counter `i` is positive.
    pub fn fingerprint(&self) -> u64 {
        self.counters
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .fold(0u64, |acc, (bit, _)| acc | (1u64 << bit))
    }
}

/// Number of differing bits between two fingerprints.
#[must_use]
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Character trigrams of a name, padded so short names still yield tokens.
fn trigrams(name: &str) -> Vec<String> {
    let padded: Vec<char> = std::iter::once('^')
        .chain(name.chars())
        .chain(std::iter::once('$'))
        .collect();
    if padded.len() < 3 {
        return vec![padded.iter().collect()];
    }
    padded.windows(3).map(|w| w.iter().collect()).collect()
}

/// Feature-name to column resolver for table-based models.
#[derive(Debug, Clone)]
pub struct FeatureNameTable {
    seed: u32,
    names: Vec<String>,
    index: HashMap<String, usize>,
    fingerprints: Vec<u64>,
}

impl FeatureNameTable {
    /// Table over `names`, column `i` holding the `i`-th name.
    pub fn new<I, S>(names: I, seed: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut index = HashMap::with_capacity(names.len());
        for (i, n) in names.iter().enumerate() {
            // First occurrence wins for duplicated names.
            index.entry(n.clone()).or_insert(i);
        }
        let fingerprints = names.iter().map(|n| name_fingerprint(n, seed)).collect();
        Self {
            seed,
            names,
            index,
            fingerprints,
        }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True for a table with no names.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name at `column`.
    pub fn name(&self, column: usize) -> Option<&str> {
        self.names.get(column).map(String::as_str)
    }

    /// Exact column lookup.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Exact lookup, falling back to the closest name within `max_distance` bits.
    ///
    /// Returns `(column, distance)`; ties go to the lower column.
    pub fn nearest(&self, name: &str, max_distance: u32) -> Option<(usize, u32)> {
        if let Some(col) = self.column(name) {
            return Some((col, 0));
        }
        let fp = name_fingerprint(name, self.seed);
        self.fingerprints
            .iter()
            .enumerate()
            .map(|(i, &other)| (i, hamming_distance(fp, other)))
            .filter(|&(_, d)| d <= max_distance)
            .min_by_key(|&(i, d)| (d, i))
    }
}

fn name_fingerprint(name: &str, seed: u32) -> u64 {
    let grams = trigrams(name);
    SimHash::of_tokens(grams.iter().map(String::as_str), seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_token_sets_share_fingerprint() {
        let a = SimHash::of_tokens(["a", "b", "c"], 7);
        let b = SimHash::of_tokens(["c", "b", "a"], 7);
        assert_eq!(a, b);
    }

    #[test]
    fn single_token_fingerprint_is_its_hash() {
        assert_eq!(SimHash::of_tokens(["x"], 3), hash64("x", 3));
    }

    #[test]
    fn similar_names_are_closer_than_unrelated_ones() {
        let seed = 11;
        let base = name_fingerprint("variant.user.country", seed);
        let near = name_fingerprint("variant_user_country", seed);
        let far = name_fingerprint("givens.device.screen_pixels", seed);
        assert!(hamming_distance(base, near) < hamming_distance(base, far));
    }

    #[test]
    fn table_prefers_exact_then_nearest() {
        let t = FeatureNameTable::new(["item.color", "item.size", "context.lang"], 5);
        assert_eq!(t.column("item.size"), Some(1));
        assert_eq!(t.nearest("item.size", 0), Some((1, 0)));
        assert_eq!(t.nearest("zzzzzzzz", 0), None);
        let (col, _) = t.nearest("item.colour", SIMHASH_BITS as u32).unwrap();
        assert_eq!(t.name(col), Some("item.color"));
    }
}
