use crate::services::BrowserError;

#[derive(thiserror::Error, Debug)]
pub enum ScoutError {
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("pdf error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("no working proxy available: {0}")]
    NoProxyAvailable(String),
    #[error("worker task failed: {0}")]
    Worker(String),
}

impl ScoutError {
    /// True when the browser session backing this error can no longer be driven.
    pub fn is_fatal_session(&self) -> bool {
        matches!(self, ScoutError::Browser(e) if e.is_fatal())
    }
}
