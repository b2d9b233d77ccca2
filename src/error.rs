//! Error types shared by every module of the crate.

use thiserror::Error;

/// Errors raised synchronously by encoding, scoring, deciding, and tracking.
///
/// Transport failures are not represented here: dispatch is fire-and-forget
/// and delivery problems are logged by the transport itself.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller passed something unusable (empty variants, bad model name,
    /// non-finite reward, mismatched lengths, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not valid in the current state (no track URL, nothing
    /// tracked yet, already tracked in strict mode).
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// A scalar inside a variant or given cannot become a feature value.
    #[error("cannot encode `{path}`: {reason}")]
    Encoding {
        /// Flattened path of the offending scalar.
        path: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The scorer failed or returned an unusable batch.
    #[error("scorer failed: {0}")]
    Scorer(String),

    /// A model loader could not produce a scorer.
    #[error("model load failed: {0}")]
    Load(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Bad input from the caller.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Call made in the wrong state.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }

    /// A value at `path` could not be encoded.
    pub fn encoding(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Encoding {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_name_the_category() {
        let errors = vec![
            (Error::invalid_argument("variants can't be empty"), "invalid argument"),
            (Error::illegal_state("trackURL is not set"), "illegal state"),
            (Error::encoding("variant.x", "NaN"), "cannot encode `variant.x`"),
            (Error::Scorer("boom".into()), "scorer failed"),
        ];
        for (e, prefix) in errors {
            let msg = e.to_string();
            assert!(msg.starts_with(prefix), "{msg}");
        }
    }
}
