use thiserror::Error;

/// Errors that can occur while fetching the validator directory.
#[derive(Error, Debug)]
pub enum ResolverError {
    /// Transport-level error (e.g. connection failure, timeout).
    #[error("validator directory request failed: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("validator directory returned HTTP status {0}")]
    Status(u16),

    /// The response body was not the expected JSON.
    #[error("malformed validator directory response: {0}")]
    Protocol(String),
}
