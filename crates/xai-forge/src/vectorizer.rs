//! Encoding of raw string values into numeric features.
//!
//! Both training tables and inference inputs go through
//! [`FeatureVectorizer::encode_value`], so a value is always mapped to the
//! same number whichever path it takes.
//!
//! # Encoding rule
//!
//! 1. Trim the value and parse it as a decimal. A finite result is used as-is.
//! 2. Anything else (words, `NaN`, `inf`, malformed numbers) is replaced by a
//!    surrogate: the 31-multiplier string hash of the original value, as a
//!    signed 32-bit integer converted to `f64`.
//!
//! The surrogate is deterministic across processes but lossy: distinct
//! strings can collide and the numeric distance between surrogates carries no
//! meaning.

use crate::types::{FeatureVector, RawInput};

/// A single encoded value, tagged with how it was obtained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EncodedValue {
    /// The string parsed as a finite decimal.
    Numeric(f64),
    /// The string did not parse; this is its hash surrogate.
    Surrogate(f64),
}

impl EncodedValue {
    /// The numeric value, whichever way it was produced.
    #[must_use]
    pub fn value(&self) -> f64 {
        match *self {
            EncodedValue::Numeric(v) | EncodedValue::Surrogate(v) => v,
        }
    }

    #[must_use]
    pub fn is_surrogate(&self) -> bool {
        matches!(self, EncodedValue::Surrogate(_))
    }
}

/// Converts raw `{feature: value}` maps into [`FeatureVector`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureVectorizer;

impl FeatureVectorizer {
    /// Vectorizes `raw` against the declared `feature_names`.
    ///
    /// Output order follows `feature_names`. Features absent from `raw` are
    /// omitted; keys in `raw` that are not declared features are ignored.
    /// Never fails: unparseable values take the surrogate path.
    ///
    /// # Example
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use xai_forge::FeatureVectorizer;
    ///
    /// let raw = HashMap::from([("age".to_string(), "34".to_string())]);
    /// let names = vec!["age".to_string(), "income".to_string()];
    ///
    /// let vector = FeatureVectorizer::vectorize(&raw, &names);
    /// assert_eq!(vector.get("age"), Some(34.0));
    /// assert!(!vector.contains("income"));
    /// ```
    #[must_use]
    pub fn vectorize(raw: &RawInput, feature_names: &[String]) -> FeatureVector {
        let mut vector = FeatureVector::new();
        for name in feature_names {
            if let Some(value) = raw.get(name) {
                vector.push(name.as_str(), Self::encode_value(value).value());
            }
        }
        vector
    }

    /// Encodes one raw value.
    ///
    /// Surrounding whitespace is ignored on both paths, so `" red"` and
    /// `"red"` encode identically.
    #[must_use]
    pub fn encode_value(raw: &str) -> EncodedValue {
        let raw = raw.trim();
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => EncodedValue::Numeric(v),
            _ => EncodedValue::Surrogate(f64::from(string_hash(raw))),
        }
    }
}

/// `h = 31 * h + c` over UTF-16 code units with wrapping `i32` arithmetic.
fn string_hash(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
}
