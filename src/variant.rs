//! The JSON-like value type that variants and givens are made of.
//!
//! A [`Variant`] is a closed sum type: every consumer matches on it
//! exhaustively instead of probing runtime types. Mappings are ordered by key
//! (`BTreeMap`) so flattening, hashing, and serialization never depend on
//! insertion order.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

/// Contextual side information combined with every variant before scoring.
pub type Givens = BTreeMap<String, Variant>;

/// Largest magnitude at which every integer is exactly representable in `f64`.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// One candidate value (or a piece of context).
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(untagged)]
pub enum Variant {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Sequence(Vec<Variant>),
    Mapping(BTreeMap<String, Variant>),
}

/// Leaf values produced by flattening a [`Variant`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl Variant {
    /// True for `Variant::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }

    /// The string, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
            _ => None,
        }
    }

    /// The number, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Variant::Number(x) => Some(*x),
            _ => None,
        }
    }

    /// The entries, if this is a mapping.
    pub fn as_mapping(&self) -> Option<&BTreeMap<String, Variant>> {
        match self {
            Variant::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// The items, if this is a sequence.
    pub fn as_sequence(&self) -> Option<&[Variant]> {
        match self {
            Variant::Sequence(v) => Some(v),
            _ => None,
        }
    }

    /// The scalar form of this value, if it is a leaf.
    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Variant::Null => Some(Scalar::Null),
            Variant::Bool(b) => Some(Scalar::Bool(*b)),
            Variant::Number(x) => Some(Scalar::Number(*x)),
            Variant::String(s) => Some(Scalar::String(s.clone())),
            Variant::Sequence(_) | Variant::Mapping(_) => None,
        }
    }

    /// Build a mapping from `(key, value)` pairs.
    pub fn mapping<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Variant>,
        I: IntoIterator<Item = (K, V)>,
    {
        Variant::Mapping(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

fn serialize_number<S: Serializer>(x: f64, serializer: S) -> Result<S::Ok, S::Error> {
    // Integral values go out as integers so payloads read like the input JSON.
    if x.is_finite() && x.fract() == 0.0 && x.abs() <= MAX_EXACT_INT {
        serializer.serialize_i64(x as i64)
    } else {
        serializer.serialize_f64(x)
    }
}

impl Serialize for Variant {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Variant::Null => serializer.serialize_unit(),
            Variant::Bool(b) => serializer.serialize_bool(*b),
            Variant::Number(x) => serialize_number(*x, serializer),
            Variant::String(s) => serializer.serialize_str(s),
            Variant::Sequence(v) => v.serialize(serializer),
            Variant::Mapping(m) => m.serialize(serializer),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}

impl From<Scalar> for Variant {
    fn from(s: Scalar) -> Self {
        match s {
            Scalar::Null => Variant::Null,
            Scalar::Bool(b) => Variant::Bool(b),
            Scalar::Number(x) => Variant::Number(x),
            Scalar::String(s) => Variant::String(s),
        }
    }
}

impl From<bool> for Variant {
    fn from(b: bool) -> Self {
        Variant::Bool(b)
    }
}

impl From<f64> for Variant {
    fn from(x: f64) -> Self {
        Variant::Number(x)
    }
}

impl From<f32> for Variant {
    fn from(x: f32) -> Self {
        Variant::Number(f64::from(x))
    }
}

impl From<i32> for Variant {
    fn from(x: i32) -> Self {
        Variant::Number(f64::from(x))
    }
}

impl From<i64> for Variant {
    fn from(x: i64) -> Self {
        Variant::Number(x as f64)
    }
}

impl From<u32> for Variant {
    fn from(x: u32) -> Self {
        Variant::Number(f64::from(x))
    }
}

impl From<&str> for Variant {
    fn from(s: &str) -> Self {
        Variant::String(s.to_string())
    }
}

impl From<String> for Variant {
    fn from(s: String) -> Self {
        Variant::String(s)
    }
}

impl<T: Into<Variant>> From<Option<T>> for Variant {
    fn from(v: Option<T>) -> Self {
        v.map_or(Variant::Null, Into::into)
    }
}

impl<T: Into<Variant>> From<Vec<T>> for Variant {
    fn from(v: Vec<T>) -> Self {
        Variant::Sequence(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Variant>> From<BTreeMap<String, T>> for Variant {
    fn from(m: BTreeMap<String, T>) -> Self {
        Variant::Mapping(m.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl From<serde_json::Value> for Variant {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value;
        match v {
            Value::Null => Variant::Null,
            Value::Bool(b) => Variant::Bool(b),
            // serde_json numbers always have an f64 view (possibly lossy for huge u64).
            Value::Number(n) => Variant::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Variant::String(s),
            Value::Array(a) => Variant::Sequence(a.into_iter().map(Variant::from).collect()),
            Value::Object(o) => Variant::Mapping(o.into_iter().map(|(k, v)| (k, v.into())).collect()),
        }
    }
}
