use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Anonymizing transport unavailable: {0}")]
    Transport(#[from] TransportError),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("{0}")]
    Capability(#[from] CapabilityError),

    #[error("Crawl already started")]
    AlreadyStarted,
}

/// Failures bringing up or checking the relay. Every variant is fatal to a run.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Tor executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("failed to launch Tor: {0}")]
    Launch(String),

    #[error("Tor connectivity check failed: {0}")]
    Verification(String),

    #[error("failed to build proxied HTTP client: {0}")]
    Client(String),
}

/// Errors reported by optional capabilities (captioning, text simplification).
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("capability not available")]
    Unavailable,

    #[error("capability failed: {0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
