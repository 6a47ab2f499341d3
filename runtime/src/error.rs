//! Error types for the aggregation pipeline.
//!
//! Record-level ([`GeometryError`]) and page-level ([`NadError::PageFetch`])
//! failures are absorbed inside a source run and only surface as logs and
//! report counts. Source-level failures ([`NadError::SourceUnreachable`]) reach
//! the aggregator but never abort sibling sources.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, NadError>;

/// Top-level pipeline errors.
#[derive(Debug, Error)]
pub enum NadError {
    /// The pagination probe for a source could not be completed.
    #[error("source {url} unreachable: {reason}")]
    SourceUnreachable {
        /// Feature service URL of the failed source.
        url: String,
        /// Human-readable failure details.
        reason: String,
    },

    /// One page of a source could not be fetched or parsed.
    #[error("page {page} of {url} failed: {reason}")]
    PageFetch {
        /// Feature service URL of the source.
        url: String,
        /// Zero-based page index within the source.
        page: usize,
        /// Human-readable failure details.
        reason: String,
    },

    /// A single record's geometry could not be translated.
    #[error("geometry translation failed: {0}")]
    GeometryTranslation(#[from] GeometryError),

    /// The configuration (and with it the source list) could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The transport failed outside of a page or probe context.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The caller cancelled the aggregation before it completed.
    #[error("aggregation cancelled")]
    Cancelled,
}

impl NadError {
    /// Creates a source-unreachable error.
    #[must_use]
    pub fn source_unreachable(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnreachable {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a page fetch error.
    #[must_use]
    pub fn page_fetch(url: impl Into<String>, page: usize, reason: impl ToString) -> Self {
        Self::PageFetch {
            url: url.into(),
            page,
            reason: reason.to_string(),
        }
    }
}

/// Failures reported by a [`crate::acquisition::http_client::Transport`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request could not be sent or the connection failed.
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// The request did not complete within its deadline.
    #[error("request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The body could not be decompressed or decoded as JSON.
    #[error("{url} returned an undecodable body: {message}")]
    Decode { url: String, message: String },
}

impl TransportError {
    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode { .. } => false,
        }
    }
}

/// Geometry translation failures. Always scoped to one record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    /// The geometry object matches no known Esri encoding.
    #[error("unrecognized geometry encoding ({0})")]
    Unrecognized(String),

    /// Coordinates are non-finite, have the wrong arity, or parts are empty.
    #[error("malformed coordinates: {0}")]
    Malformed(String),

    /// The record itself is not an Esri feature object.
    #[error("malformed record: {0}")]
    Record(String),
}

/// Configuration load and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// None of the candidate locations held a configuration file.
    #[error("no configuration file found (tried {tried})")]
    NotFound { tried: String },

    /// The configuration file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`crate::NadConfig`].
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The configuration parsed but violates a constraint.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let url = "https://example.com/0".to_string();
        assert!(TransportError::Timeout {
            url: url.clone(),
            timeout_ms: 10
        }
        .is_retryable());
        assert!(TransportError::Status {
            url: url.clone(),
            status: 503
        }
        .is_retryable());
        assert!(TransportError::Status {
            url: url.clone(),
            status: 429
        }
        .is_retryable());
        assert!(!TransportError::Status {
            url: url.clone(),
            status: 404
        }
        .is_retryable());
        assert!(!TransportError::Decode {
            url,
            message: "eof".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_error_messages_name_source_and_page() {
        let err = NadError::page_fetch("https://example.com/FeatureServer", 2, "HTTP 500");
        assert_eq!(
            err.to_string(),
            "page 2 of https://example.com/FeatureServer failed: HTTP 500"
        );

        let err = NadError::source_unreachable("https://example.com/FeatureServer", "timeout");
        assert!(err.to_string().contains("unreachable"));
    }
}
