//! Crate-wide error taxonomy.
//!
//! The core distinguishes a handful of error kinds that call sites need to
//! act on differently (log-and-continue vs. abort). Everything else is
//! carried as an opaque `anyhow::Error` up to the scheduler/CLI boundary.

use thiserror::Error;

/// Errors raised by a source's `fetch` call.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("request timed out")]
    Timeout,

    #[error("rate limited (HTTP 429)")]
    RateLimited,

    #[error("source currently in backoff")]
    Backoff,
}

/// Errors raised by the cache client.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unreachable: {0}")]
    Unreachable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while loading or querying the aircraft registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("malformed registry row: {0}")]
    MalformedRow(String),
}

/// Errors raised by the push ingress, mapped to the wire-level status codes
/// in §6.
#[derive(Debug, Error)]
pub enum IngressError {
    #[error("missing shared-secret header")]
    Unauthenticated,

    #[error("shared secret does not match region {0}")]
    PermissionDenied(String),

    #[error("malformed request: {0}")]
    InvalidArgument(String),

    #[error("payload exceeds the per-station record limit of {0}")]
    PayloadTooLarge(usize),
}

/// Errors that abort the process at startup, per §7 "Config" and
/// "Cache-unreachable at startup".
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cache unreachable at startup: {0}")]
    CacheUnreachable(String),
}
