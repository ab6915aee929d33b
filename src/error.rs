//! Crate-wide error types.
//!
//! Library modules use specific error types via `thiserror`
//! ([`StoreError`], [`SessionError`](crate::identity::SessionError),
//! [`ConfigError`](crate::config::ConfigError)). Personalization operations
//! return [`Error`]; the CLI uses `anyhow` for convenient error propagation.
//!
//! # Example
//!
//! ```ignore
//! use tuneweaver::error::ResultExt;
//!
//! let songs = store.fetch_songs().await.with_context("loading catalog")?;
//! ```

use crate::store::StoreError;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Remote store read or write failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The operation needs an effective identity and there is none
    #[error("No signed-in user")]
    NotSignedIn,

    /// A referenced entity is not loaded
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Caller supplied an unusable value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a not found error.
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for std::result::Result<T, StoreError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Store(e).context(ctx))
    }
}
