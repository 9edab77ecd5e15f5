use std::path::PathBuf;
use thiserror::Error;

/// Failures while obtaining or renewing API credentials.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(
        "{} not found. Download an OAuth client secret for an installed application from the Google API Console.",
        .0.display()
    )]
    MissingClientSecret(PathBuf),

    #[error("Invalid client secret file {}: {reason}", .path.display())]
    InvalidClientSecret { path: PathBuf, reason: String },

    #[error("The token endpoint rejected the request ({status}): {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("The stored credentials were rejected and cannot be renewed")]
    Revoked,

    #[error("Authorization flow failed: {0}")]
    Flow(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of a single search-analytics API call.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("The API rejected the access token")]
    Unauthorized,

    #[error("Insufficient permission for {site}")]
    PermissionDenied { site: String },

    #[error("No data available ({status}): {message}")]
    NoData {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Unexpected API response ({status}): {message}")]
    Status {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("HTTP request error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed API response: {0}")]
    Malformed(String),

    #[error("Authorization error: {0}")]
    Auth(#[from] AuthError),
}

impl ApiError {
    /// Errors after which no further API call can succeed in this run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApiError::Unauthorized | ApiError::Auth(_))
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, ApiError::PermissionDenied { .. })
    }
}

/// Failures while reading or writing report artifacts.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
