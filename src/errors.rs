/// Error types for the CDP SDK.
///
/// Maps the remote service's `errorType` strings to [`HttpErrorType`] and
/// separates transport failures ([`CdpError::Network`]) from service-side
/// rejections ([`CdpError::Api`]). The split drives analytics: see
/// [`crate::analytics::is_trackable`].
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified error kinds returned by the CDP API, plus the client-side
/// network kinds the transport assigns when no response arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpErrorType {
    AlreadyExists,
    BadGateway,
    FaucetLimitExceeded,
    Forbidden,
    IdempotencyError,
    InternalServerError,
    InvalidRequest,
    InvalidSqlQuery,
    MalformedTransaction,
    NotFound,
    PaymentMethodRequired,
    PolicyViolation,
    RateLimitExceeded,
    RequestCanceled,
    ServiceUnavailable,
    Timeout,
    Unauthorized,
    UnexpectedError,
    NetworkTimeout,
    NetworkConnectionFailed,
    NetworkIpBlocked,
    NetworkDnsFailure,
    #[serde(other)]
    Unknown,
}

impl HttpErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpErrorType::AlreadyExists => "already_exists",
            HttpErrorType::BadGateway => "bad_gateway",
            HttpErrorType::FaucetLimitExceeded => "faucet_limit_exceeded",
            HttpErrorType::Forbidden => "forbidden",
            HttpErrorType::IdempotencyError => "idempotency_error",
            HttpErrorType::InternalServerError => "internal_server_error",
            HttpErrorType::InvalidRequest => "invalid_request",
            HttpErrorType::InvalidSqlQuery => "invalid_sql_query",
            HttpErrorType::MalformedTransaction => "malformed_transaction",
            HttpErrorType::NotFound => "not_found",
            HttpErrorType::PaymentMethodRequired => "payment_method_required",
            HttpErrorType::PolicyViolation => "policy_violation",
            HttpErrorType::RateLimitExceeded => "rate_limit_exceeded",
            HttpErrorType::RequestCanceled => "request_canceled",
            HttpErrorType::ServiceUnavailable => "service_unavailable",
            HttpErrorType::Timeout => "timeout",
            HttpErrorType::Unauthorized => "unauthorized",
            HttpErrorType::UnexpectedError => "unexpected_error",
            HttpErrorType::NetworkTimeout => "network_timeout",
            HttpErrorType::NetworkConnectionFailed => "network_connection_failed",
            HttpErrorType::NetworkIpBlocked => "network_ip_blocked",
            HttpErrorType::NetworkDnsFailure => "network_dns_failure",
            HttpErrorType::Unknown => "unknown",
        }
    }

    /// Parse a wire `errorType`; unrecognized kinds map to [`HttpErrorType::Unknown`].
    pub fn parse(value: &str) -> Self {
        serde_json::from_value(serde_json::Value::String(value.to_string()))
            .unwrap_or(HttpErrorType::Unknown)
    }
}

impl fmt::Display for HttpErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-level detail attached to a [`CdpError::Network`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkDetails {
    pub code: Option<String>,
    pub retryable: bool,
}

/// The primary error type for the CDP SDK.
#[derive(Error, Debug)]
pub enum CdpError {
    /// Caller-supplied data failed validation before any request was made.
    #[error("Invalid input: {0}")]
    UserInputValidation(String),

    /// The service answered with a classified error.
    #[error("API error ({http_code} {error_type}): {message}")]
    Api {
        http_code: u16,
        error_type: HttpErrorType,
        message: String,
        correlation_id: Option<String>,
        error_link: Option<String>,
    },

    /// No usable response: timeout, refused connection, blocked IP.
    #[error("Network error ({error_type}): {message}")]
    Network {
        error_type: HttpErrorType,
        message: String,
        details: NetworkDetails,
    },

    #[error("Insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("JSON error: {0}")]
    JsonError(String),

    #[error("Crypto error: {0}")]
    CryptoError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A method re-entered itself through its type-level handle and has no
    /// pass-through value to return.
    #[error("Re-entrant call to {0}")]
    ReentrantCall(&'static str),

    #[error("{0}")]
    Other(String),
}

impl CdpError {
    /// Build an API error from a status code and the decoded error body.
    pub fn api(http_code: u16, error_type: HttpErrorType, message: impl Into<String>) -> Self {
        CdpError::Api {
            http_code,
            error_type,
            message: message.into(),
            correlation_id: None,
            error_link: None,
        }
    }

    /// Build a network error.
    pub fn network(error_type: HttpErrorType, message: impl Into<String>, retryable: bool) -> Self {
        let code = match error_type {
            HttpErrorType::NetworkTimeout => Some("TIMEOUT".to_string()),
            HttpErrorType::NetworkConnectionFailed => Some("CONNECTION_FAILED".to_string()),
            HttpErrorType::NetworkIpBlocked => Some("IP_BLOCKED".to_string()),
            HttpErrorType::NetworkDnsFailure => Some("DNS_FAILURE".to_string()),
            _ => None,
        };
        CdpError::Network {
            error_type,
            message: message.into(),
            details: NetworkDetails { code, retryable },
        }
    }

    /// Returns the classified error kind for API and network errors.
    pub fn error_type(&self) -> Option<HttpErrorType> {
        match self {
            CdpError::Api { error_type, .. } | CdpError::Network { error_type, .. } => {
                Some(*error_type)
            }
            _ => None,
        }
    }

    /// Returns the HTTP status for API errors.
    pub fn http_code(&self) -> Option<u16> {
        match self {
            CdpError::Api { http_code, .. } => Some(*http_code),
            _ => None,
        }
    }

    /// Returns true if this error suggests retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            CdpError::Network { details, .. } => details.retryable,
            CdpError::Api {
                http_code,
                error_type,
                ..
            } => {
                matches!(http_code, 429 | 500 | 502 | 503 | 504)
                    || matches!(
                        error_type,
                        HttpErrorType::RateLimitExceeded
                            | HttpErrorType::BadGateway
                            | HttpErrorType::ServiceUnavailable
                    )
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for CdpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CdpError::network(HttpErrorType::NetworkTimeout, err.to_string(), true)
        } else if err.is_connect() {
            CdpError::network(HttpErrorType::NetworkConnectionFailed, err.to_string(), true)
        } else if err.is_decode() {
            CdpError::JsonError(err.to_string())
        } else if err.is_request() {
            CdpError::network(HttpErrorType::NetworkConnectionFailed, err.to_string(), false)
        } else {
            CdpError::HttpError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CdpError {
    fn from(err: serde_json::Error) -> Self {
        CdpError::JsonError(err.to_string())
    }
}

impl From<url::ParseError> for CdpError {
    fn from(err: url::ParseError) -> Self {
        CdpError::Config(format!("URL parse error: {err}"))
    }
}
