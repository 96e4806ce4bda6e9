//! Error types for the chainpay-core library.
//!
//! This module defines all error types that can occur during conversion,
//! rate fetching, event handling, and fulfillment operations.

use thiserror::Error;

/// Main error type for ChainPay core operations.
#[derive(Error, Debug)]
pub enum ChainPayError {
    /// Transport-level failure talking to an external HTTP API
    /// (timeout, DNS, connection refused).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx or malformed response from an external API.
    #[error("upstream error (HTTP {status}): {body}")]
    Upstream {
        /// HTTP status code returned by the upstream service
        status: u16,
        /// Response body or reason phrase, for diagnostics
        body: String,
    },

    /// Error during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error during blockchain RPC operations
    #[error("blockchain error: {0}")]
    Blockchain(String),

    /// Missing or invalid configuration (contract address, RPC URL,
    /// API credentials, ABI missing the expected event)
    #[error("configuration error: {0}")]
    Config(String),

    /// Non-numeric or otherwise unusable input to a conversion function
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Token acquisition against the top-up provider failed
    #[error("authentication error: {0}")]
    Auth(String),

    /// The on-chain network enum has no known operator mapping.
    /// Per-event skip, never fatal to the listener.
    #[error("unmapped network enum: {0}")]
    UnmappedNetwork(u8),

    /// Error parsing URL
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

/// Result type alias for ChainPay operations.
pub type Result<T> = std::result::Result<T, ChainPayError>;

impl From<ethers::providers::ProviderError> for ChainPayError {
    fn from(err: ethers::providers::ProviderError) -> Self {
        ChainPayError::Blockchain(err.to_string())
    }
}

impl ChainPayError {
    /// Returns `true` if retrying the failed operation could plausibly help.
    ///
    /// Classification rule:
    /// - HTTP 429, HTTP 5xx, and transport failures are retry candidates.
    /// - Any other HTTP 4xx is a client error; retrying cannot help.
    /// - Every other error shape is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            ChainPayError::Network(_) => true,
            ChainPayError::Upstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChainPayError::Conversion("not a number".to_string());
        assert_eq!(err.to_string(), "conversion error: not a number");

        let err = ChainPayError::Upstream {
            status: 503,
            body: "service unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "upstream error (HTTP 503): service unavailable"
        );

        let err = ChainPayError::UnmappedNetwork(4);
        assert_eq!(err.to_string(), "unmapped network enum: 4");
    }

    #[test]
    fn test_transient_classification() {
        let too_many = ChainPayError::Upstream {
            status: 429,
            body: String::new(),
        };
        assert!(too_many.is_transient());

        let server_error = ChainPayError::Upstream {
            status: 503,
            body: String::new(),
        };
        assert!(server_error.is_transient());

        let not_found = ChainPayError::Upstream {
            status: 404,
            body: String::new(),
        };
        assert!(!not_found.is_transient());

        assert!(!ChainPayError::Config("missing".to_string()).is_transient());
        assert!(!ChainPayError::Conversion("abc".to_string()).is_transient());
        assert!(!ChainPayError::Other("boom".to_string()).is_transient());
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: ChainPayError = json_err.into();
        assert!(matches!(err, ChainPayError::Json(_)));
    }
}
