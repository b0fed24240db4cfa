use thiserror::Error;

/// Failure talking to one of the upstream providers (voice, telephony, scheduling, email,
/// workflow webhook).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} returned status {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("{service} response could not be decoded: {reason}")]
    Decode {
        service: &'static str,
        reason: String,
    },
    #[error("{service} request could not be built: {reason}")]
    InvalidRequest {
        service: &'static str,
        reason: String,
    },
    #[error("{service} authorization failed: {reason}")]
    Auth {
        service: &'static str,
        reason: String,
    },
    #[error("{service} did not answer within {after:?}")]
    TimedOut {
        service: &'static str,
        after: std::time::Duration,
    },
}

/// Startup configuration problems.  Always fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<String>),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}
