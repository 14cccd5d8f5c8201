//! Provider-specific error types
//!
//! ProviderError는 텍스트 생성 서비스 관련 세부 에러를 관리합니다.
//! conductor_foundation::Error로 변환하면 `SummaryUpstream`이 됩니다.

use conductor_foundation::Error as FoundationError;
use thiserror::Error;

/// Errors that can occur while talking to a text generation service
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Server error (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// Network error (connection failed, DNS, etc.)
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid request (bad parameters)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Model not found or not available
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// Stream broke off or reported an error mid-way
    #[error("Stream error: {0}")]
    StreamError(String),

    /// Opening the stream took too long
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Provider not configured
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    /// Unknown error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ProviderError {
    /// Create from HTTP status code and body
    pub fn from_http_status(status: u16, body: &str) -> Self {
        match status {
            400 => ProviderError::InvalidRequest(body.to_string()),
            404 => ProviderError::ModelNotAvailable(body.to_string()),
            500..=599 => ProviderError::ServerError(body.to_string()),
            _ => ProviderError::Unknown(format!("HTTP {}: {}", status, body)),
        }
    }
}

// ============================================================================
// conductor_foundation::Error 변환
// ============================================================================

impl From<ProviderError> for FoundationError {
    fn from(err: ProviderError) -> Self {
        FoundationError::SummaryUpstream(err.to_string())
    }
}
