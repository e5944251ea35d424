use std::path::PathBuf;
use thiserror::Error;

/// Why a job page could not be turned into description text.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("page returned HTTP {status}")]
    Http { status: u16 },

    #[error("request failed: {0}")]
    Request(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("no readable text on page")]
    EmptyPage,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => FetchError::Http {
                status: status.as_u16(),
            },
            None => FetchError::Request(err.to_string()),
        }
    }
}

impl From<thirtyfour::error::WebDriverError> for FetchError {
    fn from(err: thirtyfour::error::WebDriverError) -> Self {
        FetchError::Browser(err.to_string())
    }
}

/// Failure to read the candidate profile. Always fatal to the run.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("CV file not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read PDF: {0}")]
    Pdf(String),

    #[error("failed to read text file: {0}")]
    Io(#[from] std::io::Error),

    #[error("CV file at {} contains no text", .0.display())]
    Empty(PathBuf),
}
