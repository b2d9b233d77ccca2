//! Flatten nested variants into `path -> scalar` maps.
//!
//! Mapping children extend the path with their key, sequence children with
//! their zero-based index, joined by a configurable separator. The output is a
//! `BTreeMap`, so the key set and its iteration order depend only on the
//! paths, never on how the input was built.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::variant::{Scalar, Variant};

/// Flattening options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenConfig {
    /// Joins path segments (default `"_"`).
    pub separator: String,
    /// Stored at the path of an empty mapping. `None` drops it.
    pub empty_mapping: Option<Scalar>,
    /// Stored at the path of an empty sequence. `None` drops it.
    pub empty_sequence: Option<Scalar>,
    /// Nesting deeper than this is rejected.
    pub max_depth: usize,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        Self {
            separator: "_".to_string(),
            empty_mapping: None,
            empty_sequence: None,
            max_depth: 128,
        }
    }
}

impl FlattenConfig {
    /// Defaults with a custom separator.
    pub fn with_separator(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
            ..Self::default()
        }
    }
}

/// Flatten `value` with no path prefix.
///
/// A bare scalar lands under the empty path.
pub fn flatten(value: &Variant, cfg: &FlattenConfig) -> Result<BTreeMap<String, Scalar>> {
    let mut out = BTreeMap::new();
    flatten_into(value, "", cfg, &mut out)?;
    Ok(out)
}

/// Flatten `value` under `prefix`, inserting into `out`.
pub fn flatten_into(
    value: &Variant,
    prefix: &str,
    cfg: &FlattenConfig,
    out: &mut BTreeMap<String, Scalar>,
) -> Result<()> {
    let mut path = prefix.to_string();
    walk(value, &mut path, 0, cfg, out)
}

fn push_segment(path: &mut String, segment: &str, separator: &str) -> usize {
    let restore = path.len();
    if !path.is_empty() {
        path.push_str(separator);
    }
    path.push_str(segment);
    restore
}

fn walk(
    value: &Variant,
    path: &mut String,
    depth: usize,
    cfg: &FlattenConfig,
    out: &mut BTreeMap<String, Scalar>,
) -> Result<()> {
    if depth > cfg.max_depth {
        return Err(Error::invalid_argument(format!(
            "nesting deeper than {} levels at `{path}`",
            cfg.max_depth
        )));
    }
    match value {
        Variant::Null => {
            out.insert(path.clone(), Scalar::Null);
        }
        Variant::Bool(b) => {
            out.insert(path.clone(), Scalar::Bool(*b));
        }
        Variant::Number(x) => {
            out.insert(path.clone(), Scalar::Number(*x));
        }
        Variant::String(s) => {
            out.insert(path.clone(), Scalar::String(s.clone()));
        }
        Variant::Sequence(items) => {
            if items.is_empty() {
                if let Some(sentinel) = &cfg.empty_sequence {
                    out.insert(path.clone(), sentinel.clone());
                }
                return Ok(());
            }
            for (i, item) in items.iter().enumerate() {
                let restore = push_segment(path, &i.to_string(), &cfg.separator);
                walk(item, path, depth + 1, cfg, out)?;
                path.truncate(restore);
            }
        }
        Variant::Mapping(entries) => {
            if entries.is_empty() {
                if let Some(sentinel) = &cfg.empty_mapping {
                    out.insert(path.clone(), sentinel.clone());
                }
                return Ok(());
            }
            for (key, item) in entries {
                let restore = push_segment(path, key, &cfg.separator);
                walk(item, path, depth + 1, cfg, out)?;
                path.truncate(restore);
            }
        }
    }
    Ok(())
}
