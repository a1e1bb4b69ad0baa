use thiserror::Error;

/// Why a line produced no observations.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("line is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("unexpected record shape: {0}")]
    UnexpectedShape(&'static str),
}
