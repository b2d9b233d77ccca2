//! Feature hashing for variants and givens.
//!
//! Every flattened `(path, scalar)` pair becomes one contribution to a sparse
//! [`FeatureVector`]:
//!
//! - numbers contribute their value at `hash32(path)`,
//! - strings contribute `1.0` at `hash32("path=value")`,
//! - booleans contribute `1.0` / `0.0` at `hash32(path)`,
//! - nulls contribute nothing.
//!
//! Givens are flattened under the `givens` namespace and variants under the
//! `variant` namespace, so a given and a variant with the same key can only
//! share a column through an ordinary hash collision. Contributions that land
//! on the same column are summed.
//!
//! The per-call exploration noise is stored on every vector and, when
//! `sprinkle` is enabled, folded into each column value as
//! `(x + noise·2⁻¹⁴²)·(1 + noise·2⁻¹⁷)`. The shift keeps zero-valued columns
//! distinguishable; the scale is far below any meaningful feature resolution.
//!
//! Encoding never yields a non-finite column: a sum or a sprinkled value that
//! overflows is reported as [`Error::Encoding`] instead.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::flatten::{flatten_into, FlattenConfig};
use crate::hash::hash32;
use crate::variant::{Givens, Scalar, Variant};

/// First path segment of every given.
pub const GIVENS_NAMESPACE: &str = "givens";
/// First path segment of every variant.
pub const VARIANT_NAMESPACE: &str = "variant";

/// Default feature width (2^20).
pub const DEFAULT_NUMBER_OF_FEATURES: u32 = 1 << 20;

// Sign hashes use an independent seed so sign and column are uncorrelated.
const SIGN_SEED_SALT: u32 = 0x5349_474E; // "SIGN"

/// Encoder options. One encoder per model; the seed keys every hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub seed: u32,
    /// Column count; must be a non-zero power of two.
    pub number_of_features: u32,
    /// Multiply each contribution by a hashed `±1` sign.
    pub alternate_sign: bool,
    /// Path separator used while flattening.
    pub separator: String,
    /// Fold the noise value into column values.
    pub sprinkle: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            number_of_features: DEFAULT_NUMBER_OF_FEATURES,
            alternate_sign: false,
            separator: ".".to_string(),
            sprinkle: true,
        }
    }
}

/// Sparse feature vector: column index to value, plus the decision's noise.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    entries: BTreeMap<u32, f64>,
    noise: f64,
}

impl FeatureVector {
    /// Empty vector carrying `noise`.
    pub fn new(noise: f64) -> Self {
        Self {
            entries: BTreeMap::new(),
            noise,
        }
    }

    /// Add `value` to column `column` (collisions accumulate).
    pub fn add(&mut self, column: u32, value: f64) {
        *self.entries.entry(column).or_insert(0.0) += value;
    }

    /// Value at `column` (zero when absent).
    pub fn get(&self, column: u32) -> f64 {
        self.entries.get(&column).copied().unwrap_or(0.0)
    }

    /// Whether anything was written to `column`, even a zero.
    pub fn contains(&self, column: u32) -> bool {
        self.entries.contains_key(&column)
    }

    /// `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.entries.iter().map(|(&c, &v)| (c, v))
    }

    /// The underlying sparse map.
    pub fn entries(&self) -> &BTreeMap<u32, f64> {
        &self.entries
    }

    /// Number of populated columns.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no column is populated.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The exploration noise shared by every vector of one encoding call.
    pub fn noise(&self) -> f64 {
        self.noise
    }

    /// Fold the noise into every value. Returns the first column whose
    /// sprinkled value is no longer finite.
    fn sprinkle(&mut self) -> Option<u32> {
        let shift = self.noise * 2f64.powi(-142);
        let scale = 1.0 + self.noise * 2f64.powi(-17);
        let mut overflowed = None;
        for (&col, v) in self.entries.iter_mut() {
            *v = (*v + shift) * scale;
            if overflowed.is_none() && !v.is_finite() {
                overflowed = Some(col);
            }
        }
        overflowed
    }
}

/// Hashing-trick encoder.
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    cfg: EncoderConfig,
    flatten: FlattenConfig,
    mask: u32,
}

impl FeatureEncoder {
    /// Validate `cfg` and build the encoder.
    pub fn new(cfg: EncoderConfig) -> Result<Self> {
        if cfg.number_of_features == 0 || !cfg.number_of_features.is_power_of_two() {
            return Err(Error::invalid_argument(format!(
                "number_of_features must be a power of two, got {}",
                cfg.number_of_features
            )));
        }
        if cfg.separator.is_empty() {
            return Err(Error::invalid_argument("separator can't be empty"));
        }
        let flatten = FlattenConfig::with_separator(cfg.separator.clone());
        let mask = cfg.number_of_features - 1;
        Ok(Self { cfg, flatten, mask })
    }

    /// The options this encoder was built with.
    pub fn config(&self) -> &EncoderConfig {
        &self.cfg
    }

    /// Hash seed shared by column and sign hashes.
    pub fn seed(&self) -> u32 {
        self.cfg.seed
    }

    /// Column count (a power of two).
    pub fn number_of_features(&self) -> u32 {
        self.cfg.number_of_features
    }

    /// Column (and sign) for a hashed feature key.
    pub fn column(&self, key: &str) -> (u32, f64) {
        let col = hash32(key, self.cfg.seed) & self.mask;
        let sign = if self.cfg.alternate_sign
            && hash32(key, self.cfg.seed ^ SIGN_SEED_SALT) & 0x8000_0000 != 0
        {
            -1.0
        } else {
            1.0
        };
        (col, sign)
    }

    /// Encode each variant combined with the (shared) givens.
    ///
    /// `noise` must be finite; it is copied to every output vector.
    pub fn encode_variants(
        &self,
        variants: &[Variant],
        givens: Option<&Givens>,
        noise: f64,
    ) -> Result<Vec<FeatureVector>> {
        if !noise.is_finite() {
            return Err(Error::invalid_argument("noise must be finite"));
        }

        let mut base = FeatureVector::new(noise);
        if let Some(givens) = givens {
            let mut flat = BTreeMap::new();
            for (key, value) in givens {
                let prefix = format!("{GIVENS_NAMESPACE}{}{key}", self.cfg.separator);
                flatten_into(value, &prefix, &self.flatten, &mut flat)?;
            }
            self.accumulate(&flat, &mut base)?;
        }

        variants
            .iter()
            .map(|variant| {
                let mut flat = BTreeMap::new();
                flatten_into(variant, VARIANT_NAMESPACE, &self.flatten, &mut flat)?;
                let mut fv = base.clone();
                self.accumulate(&flat, &mut fv)?;
                if self.cfg.sprinkle {
                    if let Some(col) = fv.sprinkle() {
                        return Err(Error::encoding(
                            VARIANT_NAMESPACE,
                            format!("column {col} overflowed while adding noise {noise}"),
                        ));
                    }
                }
                Ok(fv)
            })
            .collect()
    }

    /// Encode a single variant.
    pub fn encode_variant(
        &self,
        variant: &Variant,
        givens: Option<&Givens>,
        noise: f64,
    ) -> Result<FeatureVector> {
        let mut out = self.encode_variants(std::slice::from_ref(variant), givens, noise)?;
        out.pop()
            .ok_or_else(|| Error::invalid_argument("nothing to encode"))
    }

    // Collisions sum, so every touched column is checked after the add.
    fn accumulate(&self, flat: &BTreeMap<String, Scalar>, into: &mut FeatureVector) -> Result<()> {
        for (path, scalar) in flat {
            let col = match scalar {
                Scalar::Null => continue,
                Scalar::Bool(b) => {
                    let (col, sign) = self.column(path);
                    into.add(col, sign * if *b { 1.0 } else { 0.0 });
                    col
                }
                Scalar::Number(x) => {
                    if !x.is_finite() {
                        return Err(Error::encoding(path.clone(), format!("non-finite number {x}")));
                    }
                    let (col, sign) = self.column(path);
                    into.add(col, sign * x);
                    col
                }
                Scalar::String(s) => {
                    let (col, sign) = self.column(&format!("{path}={s}"));
                    into.add(col, sign);
                    col
                }
            };
            if !into.get(col).is_finite() {
                return Err(Error::encoding(
                    path.clone(),
                    format!("sum at column {col} overflowed"),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder(n: u32) -> FeatureEncoder {
        FeatureEncoder::new(EncoderConfig {
            seed: 42,
            number_of_features: n,
            ..EncoderConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn rejects_non_power_of_two_width() {
        for n in [0, 3, 1000] {
            let r = FeatureEncoder::new(EncoderConfig {
                number_of_features: n,
                ..EncoderConfig::default()
            });
            assert!(matches!(r, Err(Error::InvalidArgument(_))), "n={n}");
        }
    }

    #[test]
    fn scalar_contributions() {
        let enc = encoder(1 << 16);
        let fv = enc
            .encode_variant(&Variant::from("red"), None, 0.0)
            .unwrap();
        let (col, _) = enc.column("variant=red");
        assert_eq!(fv.len(), 1);
        assert_eq!(fv.get(col), 1.0);

        let fv = enc.encode_variant(&Variant::from(2.5), None, 0.0).unwrap();
        assert_eq!(fv.get(enc.column("variant").0), 2.5);

        let fv = enc.encode_variant(&Variant::Null, None, 0.0).unwrap();
        assert!(fv.is_empty());

        let fv = enc.encode_variant(&Variant::from(false), None, 0.0).unwrap();
        assert_eq!(fv.get(enc.column("variant").0), 0.0);
        assert!(fv.contains(enc.column("variant").0));
    }

    #[test]
    fn givens_and_variants_use_separate_namespaces() {
        let enc = encoder(1 << 20);
        let givens: Givens = [("lang".to_string(), Variant::from("en"))].into_iter().collect();
        let variant = Variant::mapping([("lang", "en")]);
        let fv = enc.encode_variant(&variant, Some(&givens), 0.0).unwrap();
        let g = enc.column("givens.lang=en").0;
        let v = enc.column("variant.lang=en").0;
        assert_ne!(g, v);
        assert_eq!(fv.get(g), 1.0);
        assert_eq!(fv.get(v), 1.0);
    }

    #[test]
    fn collisions_accumulate() {
        // Width 1 puts every feature in column 0.
        let enc = encoder(1);
        let variant = Variant::mapping([("a", 1.5), ("b", 2.0)]);
        let fv = enc.encode_variant(&variant, None, 0.0).unwrap();
        assert_eq!(fv.len(), 1);
        assert_eq!(fv.get(0), 3.5);
    }

    #[test]
    fn overflowing_sums_are_rejected() {
        let enc = FeatureEncoder::new(EncoderConfig {
            seed: 1,
            number_of_features: 1,
            ..EncoderConfig::default()
        })
        .unwrap();
        let variant = Variant::mapping([("a", 1e308), ("b", 1e308)]);
        let err = enc.encode_variant(&variant, None, 0.0);
        assert!(matches!(err, Err(Error::Encoding { ref path, .. }) if path == "variant.b"));

        // A given and a variant can overflow the same column too.
        let givens: Givens = [("g".to_string(), Variant::from(-1e308))].into_iter().collect();
        let fv = enc.encode_variant(&Variant::mapping([("a", -1e308)]), Some(&givens), 0.0);
        assert!(matches!(fv, Err(Error::Encoding { ref path, .. }) if path == "variant.a"));
    }

    #[test]
    fn overflowing_noise_is_rejected() {
        let enc = encoder(1 << 10);
        let variant = Variant::from(f64::MAX);
        let fv = enc.encode_variant(&variant, None, 0.0).unwrap();
        assert!(fv.iter().all(|(_, x)| x.is_finite()));
        assert!(matches!(
            enc.encode_variant(&variant, None, 1.0),
            Err(Error::Encoding { .. })
        ));
    }

    #[test]
    fn non_finite_scalars_are_rejected() {
        let enc = encoder(1 << 10);
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = enc.encode_variant(&Variant::mapping([("x", bad)]), None, 0.0);
            assert!(matches!(err, Err(Error::Encoding { ref path, .. }) if path == "variant.x"));

            let givens: Givens = [("g".to_string(), Variant::from(bad))].into_iter().collect();
            let err = enc.encode_variant(&Variant::from(1), Some(&givens), 0.0);
            assert!(matches!(err, Err(Error::Encoding { .. })));
        }
    }

    #[test]
    fn noise_is_shared_and_perturbs_values() {
        let enc = encoder(1 << 12);
        let variants = vec![Variant::from("a"), Variant::from("b")];
        let plain = enc.encode_variants(&variants, None, 0.0).unwrap();
        let noisy = enc.encode_variants(&variants, None, 0.5).unwrap();
        assert!(noisy.iter().all(|fv| fv.noise() == 0.5));
        let col = enc.column("variant=a").0;
        assert_eq!(plain[0].get(col), 1.0);
        assert!(noisy[0].get(col) > 1.0);
        assert!(noisy[0].get(col) - 1.0 < 1e-5);
    }

    #[test]
    fn alternate_sign_only_flips_sign() {
        let signed = FeatureEncoder::new(EncoderConfig {
            seed: 9,
            number_of_features: 1 << 16,
            alternate_sign: true,
            ..EncoderConfig::default()
        })
        .unwrap();
        let plain = encoder(1 << 16);
        let v = Variant::mapping([("w", 3.0)]);
        let a = signed.encode_variant(&v, None, 0.0).unwrap();
        let b = FeatureEncoder::new(EncoderConfig {
            seed: 9,
            ..plain.config().clone()
        })
        .unwrap()
        .encode_variant(&v, None, 0.0)
        .unwrap();
        let col = signed.column("variant.w").0;
        assert_eq!(a.get(col).abs(), b.get(col));
    }
}
