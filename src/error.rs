//! Typed store failures.
//!
//! Every fallible core operation returns [`StoreResult`], carrying a
//! [`StoreError`] from the taxonomy in spec §8:
//!
//! - [`StoreError::NotFound`] — a named model/comparison/corpus/article is
//!   missing.
//! - [`StoreError::Uniqueness`] — a name/path/identifier collision, reported
//!   against the specific column that collided.
//! - [`StoreError::Validation`] — input rejected before any write (shape
//!   mismatch, `top_n < 1`, same-model comparison, empty abstract, …).
//! - [`StoreError::ArtifactLoad`] — a missing/unreadable/corrupt artifact;
//!   the operation aborts with a full rollback.
//! - [`StoreError::Database`] — any other `sqlx` failure, propagated from the
//!   store boundary.
//!
//! [`map_unique`] maps a SQLite UNIQUE-constraint violation into a
//! [`StoreError::Uniqueness`] by matching the offending constraint against a
//! caller-supplied list of `(constraint, what, value)` triples; anything that
//! is not a unique violation propagates unchanged as [`StoreError::Database`].

use std::fmt::Display;
use std::path::Path;

/// Result alias for every fallible store operation.
pub type StoreResult<T> = Result<T, StoreError>;

/// The core failure taxonomy. Every variant carries a human-readable message
/// rendered via [`Display`]; the CLI prints that message and exits nonzero.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A named entity could not be found.
    #[error("{what} '{name}' was not found")]
    NotFound { what: String, name: String },

    /// A name/path/identifier collided with an existing row.
    #[error("{what} '{value}' is already in use")]
    Uniqueness { what: String, value: String },

    /// Input rejected before any write.
    #[error("{0}")]
    Validation(String),

    /// A model/corpus/matrix artifact was missing, unreadable, or corrupt.
    #[error("failed to load artifact {path}: {reason}")]
    ArtifactLoad { path: String, reason: String },

    /// Any other database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// A named entity (`what`, e.g. `"model"`) with key `name` is missing.
    pub fn not_found(what: impl Into<String>, name: impl Into<String>) -> Self {
        StoreError::NotFound {
            what: what.into(),
            name: name.into(),
        }
    }

    /// Input was rejected before any write; `msg` is surfaced verbatim.
    pub fn validation(msg: impl Into<String>) -> Self {
        StoreError::Validation(msg.into())
    }

    /// An artifact at `path` failed to load; `source` describes why.
    pub fn artifact(path: impl AsRef<Path>, source: impl Display) -> Self {
        StoreError::ArtifactLoad {
            path: path.as_ref().display().to_string(),
            reason: source.to_string(),
        }
    }
}

/// Map a `sqlx` error into the taxonomy.
///
/// When `err` is a SQLite UNIQUE-constraint violation, each
/// `(constraint, what, value)` triple is tried in order: the first whose
/// `constraint` (e.g. `"models.name"`) appears in the database error message
/// yields a [`StoreError::Uniqueness`] naming that `what`/`value`. A unique
/// violation that matches none of the supplied triples still reports a
/// uniqueness collision against the first triple. Anything that is not a
/// unique violation propagates unchanged as [`StoreError::Database`].
pub fn map_unique(err: sqlx::Error, constraints: &[(&str, &str, &str)]) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let message = db_err.message();
            for (constraint, what, value) in constraints {
                if message.contains(constraint) {
                    return StoreError::Uniqueness {
                        what: (*what).to_string(),
                        value: (*value).to_string(),
                    };
                }
            }
            if let Some((_, what, value)) = constraints.first() {
                return StoreError::Uniqueness {
                    what: (*what).to_string(),
                    value: (*value).to_string(),
                };
            }
        }
    }
    StoreError::Database(err)
}
