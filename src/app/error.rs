use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("client setup failed: {0}")]
    Client(String),
    #[error("unexpected response body: {0}")]
    InvalidBody(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::HttpStatus(status.as_u16())
        } else {
            FetchError::Transport(err)
        }
    }
}

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("page body looks binary (nul byte at {0})")]
    Binary(usize),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("delay range is inverted: min {min_ms}ms > max {max_ms}ms")]
    InvertedDelay { min_ms: u64, max_ms: u64 },
    #[error("invalid keyword pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid proxy url '{0}'")]
    Proxy(String),
    #[error("could not read keywords file '{path}': {source}")]
    KeywordsFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("control port io: {0}")]
    Io(#[from] std::io::Error),
    #[error("control port rejected '{command}': {reply}")]
    Rejected { command: String, reply: String },
    #[error("control port closed the connection")]
    Closed,
}
