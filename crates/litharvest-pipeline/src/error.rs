use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid DOI: {0}")]
    InvalidDoi(String),

    #[error("invalid arXiv ID: {0}")]
    InvalidArxivId(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error from {host}: HTTP {status}")]
    Api { host: String, status: u16 },

    #[error("rate limit from {0}, retry after {1}s")]
    RateLimit(String, u64),

    #[error("no mirror available for {0}")]
    NoMirror(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
