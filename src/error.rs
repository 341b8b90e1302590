use serde::Deserialize;

use crate::types::RRSet;

/// Body PowerDNS returns alongside an error status: a human readable
/// message plus, sometimes, a list of more specific errors.
#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
#[serde_with::skip_serializing_none]
pub struct ApiErrorBody {
    pub error: String,
    pub errors: Option<Vec<String>>,
}

impl std::fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(errors) = &self.errors {
            if !errors.is_empty() {
                write!(f, " ({})", errors.join("; "))?;
            }
        }
        Ok(())
    }
}

/// The error taxonomy shared by every component: client, sanitizer, diff
/// engine, migrator and batch driver all surface one of these variants.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Invalid or missing configuration, caught before any network call.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection failed, TLS failed, or all retries were exhausted on a
    /// transient transport error.
    #[error("transport error talking to {server}: {source}")]
    Transport {
        server: String,
        #[source]
        source: reqwest::Error,
    },

    /// A non-retriable HTTP status returned by the server.
    #[error("{method} {path} returned {status}: {body}")]
    Http {
        status: u16,
        method: String,
        path: String,
        body: String,
    },

    /// Specialization of `Http` on 404 for callers that treat absence as a
    /// plain signal rather than an error (the probe path returns `Ok(false)`
    /// instead of this variant; this is for callers that do want a 404 to
    /// surface as an error).
    #[error("{path} not found")]
    NotFound { path: String },

    /// The sanitizer found a structural impossibility not resolved by the
    /// configured auto-fix flags (e.g. a duplicate `(name, type)` pair).
    #[error("zone failed validation: {0}")]
    Validation(String),

    /// The target rejected a change with 409/422.
    #[error("target rejected change to {}/{}: {status} {body}", .rrset.name, .rrset.rrset_type)]
    Conflict {
        status: u16,
        rrset: Box<RRSet>,
        body: String,
    },

    /// Operation aborted by external signal or by the `stop` on-error
    /// policy.
    #[error("cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Retriable per spec: transport failure or one of 429/500/502/503/504.
    pub fn is_retriable_status(status: reqwest::StatusCode) -> bool {
        matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
    }
}

pub type Result<T> = std::result::Result<T, MigrateError>;
