//! Sharing API Error Types
//!
//! Structured error handling for the file sharing API.
//! Maps HTTP status codes to the outcomes the download flow and the CLI act on.

/// Sharing API error types
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized: password required or incorrect")]
    Unauthorized,

    #[error("Download limit exceeded")]
    LimitExceeded,

    #[error("File has expired")]
    Expired,

    #[error("Rate limited")]
    RateLimited,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request error: {0}")]
    Request(String),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Create an ApiError from an HTTP status code and response body
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 => ApiError::Unauthorized,
            403 => ApiError::LimitExceeded,
            404 => ApiError::NotFound(body.to_string()),
            410 => ApiError::Expired,
            429 => ApiError::RateLimited,
            500..=599 => ApiError::Server(status, body.to_string()),
            _ => ApiError::Request(format!("HTTP {}: {}", status, body)),
        }
    }

    /// Message shown to the user. None of these are fatal; retrying is up to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "Password required to download file",
            ApiError::LimitExceeded => "Download limit exceeded",
            ApiError::Expired => "File has expired",
            ApiError::RateLimited => "Too many requests. Please wait",
            ApiError::NotFound(_) => {
                "File not found. It may have been deleted, expired, or reached its download limit"
            }
            ApiError::Network(_) => "Network error. Check your connection and try again",
            ApiError::Server(_, _) | ApiError::Request(_) | ApiError::Decode(_) => {
                "The server could not complete the request. Try again"
            }
        }
    }

    /// Whether re-submitting the same request could ever succeed
    pub fn is_final(&self) -> bool {
        matches!(self, ApiError::LimitExceeded | ApiError::Expired)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ApiError::Network("Request timeout".to_string())
        } else if error.is_connect() {
            ApiError::Network(format!("Connection failed: {}", error))
        } else if let Some(status) = error.status() {
            ApiError::from_status(status.as_u16(), &error.to_string())
        } else if error.is_decode() {
            ApiError::Decode(error.to_string())
        } else {
            ApiError::Request(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(ApiError::from_status(401, ""), ApiError::Unauthorized));
        assert!(matches!(ApiError::from_status(403, ""), ApiError::LimitExceeded));
        assert!(matches!(ApiError::from_status(410, ""), ApiError::Expired));
        assert!(matches!(ApiError::from_status(429, ""), ApiError::RateLimited));
        assert!(matches!(
            ApiError::from_status(404, "gone"),
            ApiError::NotFound(ref body) if body == "gone"
        ));
        assert!(matches!(ApiError::from_status(503, "busy"), ApiError::Server(503, _)));
        assert!(matches!(ApiError::from_status(400, "bad"), ApiError::Request(_)));
    }

    #[test]
    fn test_final_errors() {
        assert!(ApiError::LimitExceeded.is_final());
        assert!(ApiError::Expired.is_final());
        assert!(!ApiError::Unauthorized.is_final());
        assert!(!ApiError::RateLimited.is_final());
        assert!(!ApiError::Network("reset".to_string()).is_final());
    }
}
