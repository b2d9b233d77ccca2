//! Full-factorial expansion of a variant map.
//!
//! `{"color": ["red", "blue"], "size": [1, 2]}` expands to the four mappings
//! `{color, size}` in odometer order (the last key varies fastest).

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::variant::Variant;

/// Largest number of combinations an expansion may produce (2^20).
pub const MAX_COMBINATIONS: usize = 1 << 20;

/// Cartesian product over `entries`, in the given key order.
///
/// A non-sequence value is a single-element choice. Keys whose sequence is
/// empty are left out of every combination. At least one key must remain, and
/// the product of the choice counts may not exceed [`MAX_COMBINATIONS`].
pub fn expand_full_factorial(entries: &[(String, Variant)]) -> Result<Vec<Variant>> {
    let mut keys: Vec<&str> = Vec::with_capacity(entries.len());
    let mut choices: Vec<&[Variant]> = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        let options = match value {
            Variant::Sequence(items) => items.as_slice(),
            single => std::slice::from_ref(single),
        };
        if options.is_empty() {
            continue;
        }
        keys.push(key.as_str());
        choices.push(options);
    }
    if keys.is_empty() {
        return Err(Error::invalid_argument(
            "variant map must contain at least one key with a non-empty value",
        ));
    }

    let total = choices
        .iter()
        .try_fold(1usize, |acc, c| acc.checked_mul(c.len()).filter(|&n| n <= MAX_COMBINATIONS))
        .ok_or_else(|| {
            Error::invalid_argument(format!(
                "full factorial expansion exceeds {MAX_COMBINATIONS} combinations"
            ))
        })?;

    let mut out = Vec::with_capacity(total);
    let mut odometer = vec![0usize; keys.len()];
    for _ in 0..total {
        let combo: BTreeMap<String, Variant> = keys
            .iter()
            .zip(&choices)
            .zip(&odometer)
            .map(|((k, c), &i)| ((*k).to_string(), c[i].clone()))
            .collect();
        out.push(Variant::Mapping(combo));

        for pos in (0..odometer.len()).rev() {
            odometer[pos] += 1;
            if odometer[pos] < choices[pos].len() {
                break;
            }
            odometer[pos] = 0;
        }
    }
    Ok(out)
}

/// [`expand_full_factorial`] over a `Variant::Mapping` (keys in sorted order).
pub fn expand_full_factorial_map(variant_map: &Variant) -> Result<Vec<Variant>> {
    let map = variant_map
        .as_mapping()
        .ok_or_else(|| Error::invalid_argument("variant map must be a mapping"))?;
    let entries: Vec<(String, Variant)> = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    expand_full_factorial(&entries)
}
