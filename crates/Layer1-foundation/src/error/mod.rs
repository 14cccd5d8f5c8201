//! Error types for Conductor
//!
//! 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Conductor 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 입력 검증
    // ========================================================================
    /// 잘못된 plan/report - 즉시 거부, 재시도 없음
    #[error("Validation error: {0}")]
    Validation(String),

    // ========================================================================
    // Tool provider 관련
    // ========================================================================
    #[error("Provider connection failed: {provider} - {message}")]
    ProviderConnection { provider: String, message: String },

    #[error("Provider fetch failed: {provider} - {message}")]
    ProviderFetch { provider: String, message: String },

    // ========================================================================
    // Summary 관련
    // ========================================================================
    #[error("Summary upstream error: {0}")]
    SummaryUpstream(String),

    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 실행 관련
    // ========================================================================
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled")]
    Cancelled,

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 검증 에러 생성 헬퍼
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Provider 연결 에러 생성 헬퍼
    pub fn provider_connection(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ProviderConnection {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Provider operation 목록 조회 에러 생성 헬퍼
    pub fn provider_fetch(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ProviderFetch {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// 특정 provider에 격리되는 에러인지 확인
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            Error::ProviderConnection { .. } | Error::ProviderFetch { .. }
        )
    }

    /// 호출자에게 그대로 보여줄 수 있는 에러인지 확인
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::NotFound(_) | Error::Config(_) | Error::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_errors_are_isolated_kind() {
        let err = Error::provider_connection("github", "spawn failed");
        assert!(err.is_provider_failure());
        assert!(!err.is_validation());
        assert_eq!(
            err.to_string(),
            "Provider connection failed: github - spawn failed"
        );

        let err = Error::provider_fetch("github", "bad tools/list");
        assert!(err.is_provider_failure());
    }

    #[test]
    fn test_validation_kind() {
        let err = Error::validation("project root is empty");
        assert!(err.is_validation());
        assert!(!err.is_provider_failure());
        assert!(err.is_user_facing());
        assert!(!Error::Internal("x".into()).is_user_facing());
        assert_eq!(err.to_string(), "Validation error: project root is empty");
    }
}
