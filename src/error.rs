//! Error types.
//!
//! - `AppError` is what the binary reports: a message plus a process exit code.
//! - `GatewayError` is a transport-level failure of a single HTTP call.
//! - `FetchError` is a single source strategy failing; the resolver logs these and
//!   moves on to the next source.
//! - `ResolutionFailure` is the only resolver error a caller ever sees.

use serde::Serialize;
use thiserror::Error;

use crate::domain::SourceKind;

/// Exit code for configuration and usage errors.
pub const EXIT_CONFIG: u8 = 2;
/// Exit code when an explicitly requested instrument could not be resolved.
pub const EXIT_UNRESOLVED: u8 = 3;
/// Exit code for data and IO errors.
pub const EXIT_DATA: u8 = 4;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(EXIT_CONFIG, message)
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::new(EXIT_DATA, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Failure of one HTTP round trip.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("request timed out: {url}")]
    Timeout { url: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },
}

/// Failure of a single source strategy.
///
/// The field is called `provider` rather than `source` because thiserror treats a
/// field named `source` as the error's cause.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    /// Network call failed, timed out or returned a non-success status.
    #[error("{provider} unavailable: {message}")]
    SourceUnavailable { provider: SourceKind, message: String },

    /// Response arrived but lacked expected fields or had too few observations.
    #[error("{provider} returned a malformed response: {message}")]
    MalformedResponse { provider: SourceKind, message: String },

    /// The strategy was skipped before any network call (missing credential or lookup key).
    #[error("{provider} not configured: {message}")]
    NotConfigured { provider: SourceKind, message: String },
}

impl FetchError {
    pub fn unavailable(provider: SourceKind, message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            provider,
            message: message.into(),
        }
    }

    pub fn malformed(provider: SourceKind, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            provider,
            message: message.into(),
        }
    }

    pub fn not_configured(provider: SourceKind, message: impl Into<String>) -> Self {
        Self::NotConfigured {
            provider,
            message: message.into(),
        }
    }

    pub fn provider(&self) -> SourceKind {
        match self {
            Self::SourceUnavailable { provider, .. }
            | Self::MalformedResponse { provider, .. }
            | Self::NotConfigured { provider, .. } => *provider,
        }
    }

    /// Map a gateway failure onto the strategy taxonomy.
    pub fn from_gateway(provider: SourceKind, err: GatewayError) -> Self {
        Self::unavailable(provider, err.to_string())
    }
}

/// Every source in the chain failed for one instrument.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("could not resolve {instrument}: all {attempted} sources failed")]
pub struct ResolutionFailure {
    pub instrument: String,
    pub attempted: usize,
}
