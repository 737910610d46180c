//! Error types for the reconciliation engine

use std::time::Duration;

use thiserror::Error;

/// Error variants are named with the `Error` suffix where they wrap another error
/// (e.g., `KubeError`, `SerializationError`).
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Missing object key: {0}")]
    MissingObjectKey(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Unknown strategy '{0}'")]
    UnknownStrategy(String),

    #[error("Unsupported upgrade type '{0}'")]
    UnsupportedUpgradeType(String),

    #[error("Scale down from {from} to {to} replicas is not supported")]
    ScaleDownUnsupported { from: i64, to: i64 },

    #[error("Invalid replica count '{value}': {source}")]
    InvalidReplicaCount {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("Replica count '{value}' is outside 0..={max}")]
    ReplicaCountOutOfRange { value: String, max: u32 },

    #[error("Credential resolution failed for secret source '{0}'")]
    CredentialResolution(String),

    #[error("Invalid patch path '{0}'")]
    InvalidPatchPath(String),

    #[error("Policy '{0}' does not exist")]
    MissingPolicy(String),

    #[error("Timed out after {timeout:?} during {operation}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Failed to establish watch for {kind}: {source}")]
    WatchEstablish {
        kind: String,
        #[source]
        source: kube::Error,
    },
}

impl Error {
    /// Check if this error indicates a resource was not found
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::KubeError(e) => matches!(e, kube::Error::Api(api_err) if api_err.code == 404),
            _ => false,
        }
    }

    /// Check if this error indicates the resource already exists
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::KubeError(kube::Error::Api(api_err)) if api_err.code == 409)
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::KubeError(e) | Error::WatchEstablish { source: e, .. } => match e {
                kube::Error::Api(api_err) => {
                    // 4xx errors (except 409 Conflict, 429 TooManyRequests) are usually not retryable
                    let code = api_err.code;
                    if (400..500).contains(&code) {
                        return code == 409 || code == 429;
                    }
                    true
                }
                // Network and other errors are retryable
                _ => true,
            },
            Error::Timeout { .. } => true,
            Error::NotFound(_) => true, // Resource might appear later
            // User input and configuration problems need a new declaration
            Error::InvalidConfig(_)
            | Error::UnknownStrategy(_)
            | Error::UnsupportedUpgradeType(_)
            | Error::ScaleDownUnsupported { .. }
            | Error::InvalidReplicaCount { .. }
            | Error::ReplicaCountOutOfRange { .. }
            | Error::MissingPolicy(_)
            | Error::InvalidPatchPath(_) => false,
            Error::CredentialResolution(_) => true,
            Error::SerializationError(_) => false,
            Error::MissingObjectKey(_) => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Exponential backoff configuration
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Initial delay for first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Calculate the backoff delay for a given retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);

        let jitter_range = base_delay_secs * self.jitter;
        let jitter = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
        let delay_with_jitter = (base_delay_secs + jitter).max(0.0);

        let capped_delay = delay_with_jitter.min(self.max_delay.as_secs_f64());

        Duration::from_secs_f64(capped_delay)
    }
}
