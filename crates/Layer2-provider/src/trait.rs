//! TextGenerator trait and common types

use crate::error::ProviderError;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// 토큰 스트림. `Err` 항목이 나오면 스트림은 실패로 끝난 것으로 본다.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// 텍스트 생성 요청
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationRequest {
    /// 시스템 프롬프트
    pub system: Option<String>,

    /// 사용자 프롬프트
    pub prompt: String,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// 텍스트 생성 collaborator
///
/// `generate`가 `Err`를 반환하면 스트림이 시작조차 못 한 것이고,
/// 스트림 도중의 `Err` 항목은 업스트림 실패다.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// 구현체 이름 (로그용)
    fn name(&self) -> &str;

    /// 스트림 열기
    async fn generate(&self, request: GenerationRequest) -> Result<TokenStream, ProviderError>;
}
