use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelebotError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid token length, should be 46 and it's {0}")]
    InvalidToken(usize),

    #[error("Perform bootstrap before other operations")]
    NotBootstrapped,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unrecognized update {0}: no known payload")]
    UnrecognizedUpdate(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Wait error: {0}")]
    Wait(#[from] WaitError),
}

pub type Result<T> = std::result::Result<T, TelebotError>;

/// Error reported by the remote API in an `ok: false` envelope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{method}: code {code:?}: {description}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub code: Option<i64>,
    pub description: String,
    pub method: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiErrorKind {
    MessageNotFound,
    MessageNotModified,
    /// Rate limited; `retry_after` is in seconds when the API states it.
    TooManyRequests { retry_after: Option<u64> },
    Other,
}

impl ApiErrorKind {
    /// Classifies an API error from its description text.
    pub fn classify(description: &str) -> Self {
        if description == "Bad Request: message to edit not found"
            || description == "Bad Request: message to delete not found"
        {
            ApiErrorKind::MessageNotFound
        } else if description.contains("Bad Request: message is not modified:") {
            ApiErrorKind::MessageNotModified
        } else if description.contains("Too Many Requests") {
            let retry_after = description
                .rsplit("retry after ")
                .next()
                .and_then(|s| s.trim().parse().ok());
            ApiErrorKind::TooManyRequests { retry_after }
        } else {
            ApiErrorKind::Other
        }
    }
}

impl ApiError {
    pub fn new(method: &str, code: Option<i64>, description: impl Into<String>) -> Self {
        let description = description.into();
        Self {
            kind: ApiErrorKind::classify(&description),
            code,
            description,
            method: method.to_string(),
        }
    }
}

/// Failure of a single predicate.
///
/// `MissingField` means the event does not carry what the predicate looks at; filters treat it as
/// "no match". `Failed` is any other failure and is propagated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredicateError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("{0}")]
    Failed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    #[error("Filter {filter} failed: {message}")]
    Predicate { filter: String, message: String },

    #[error("Branch condition {index} has a stop value; only the completion condition may have one")]
    BranchHasStopValue { index: usize },

    #[error("Completion condition must have a stop value")]
    CompletionWithoutStopValue,

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Fork expired at {deadline}")]
    Expired { deadline: DateTime<Utc> },

    #[error("Unknown fork: {0}")]
    UnknownFork(String),
}

pub type WaitResult<T> = std::result::Result<T, WaitError>;
