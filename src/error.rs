use thiserror::Error;

/// The payload cannot be written in canonical form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("payload cannot be serialized: {0}")]
    Serialize(String),
}

/// Search parameters rejected before any worker is started.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("difficulty {bits} exceeds the {max}-bit digest")]
    DifficultyTooLarge { bits: u64, max: u32 },
    #[error("difficulty must be non-negative, got {0}")]
    NegativeDifficulty(i64),
    #[error("worker count must be between 1 and {max}, got {got}")]
    InvalidWorkers { got: usize, max: usize },
    #[error("chunk size must be greater than 0")]
    InvalidChunkSize,
}

/// Failure to evaluate a single candidate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CandidateError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error("transient candidate failure: {0}")]
    Transient(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error("nonces {start}..={end} still failing after {attempts} attempts: {reason}")]
    RetriesExhausted {
        start: u64,
        end: u64,
        attempts: u32,
        reason: String,
    },
    #[error("search task aborted: {0}")]
    Aborted(String),
}

/// Errors from the challenge service glue.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed problem: {0}")]
    Problem(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_error_converts_into_search_error() {
        let err: SearchError = EncodingError::NotAnObject("array").into();
        assert!(matches!(err, SearchError::Encoding(_)));
        assert!(err.to_string().contains("JSON object"));
    }

    #[test]
    fn difficulty_error_message() {
        let err = ConfigurationError::DifficultyTooLarge { bits: 300, max: 256 };
        assert_eq!(err.to_string(), "difficulty 300 exceeds the 256-bit digest");
    }
}
