//! Provider seams - aggregator가 provider와 대화하는 인터페이스
//!
//! 기본 구현은 MCP (`crate::mcp::McpConnector`)이고,
//! 테스트에서는 가짜 구현을 주입한다.

use async_trait::async_trait;
use conductor_foundation::{Result, ToolProviderConfig, TransportKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// provider가 노출하는 단일 operation 정보
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescriptor {
    /// provider 안에서의 이름 (namespace 전)
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// 입력 스키마 (JSON Schema)
    #[serde(default)]
    pub input_schema: Value,
}

impl OperationDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: Value::Null,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// 연결된 provider 핸들
#[async_trait]
pub trait ProviderHandle: Send + Sync {
    /// 전송 종류
    fn transport_kind(&self) -> TransportKind;

    /// operation 목록 조회 (실패 시 `Error::ProviderFetch`)
    async fn list_operations(&self) -> Result<Vec<OperationDescriptor>>;

    /// operation 호출 (provider 내부 이름 사용)
    async fn call(&self, operation: &str, arguments: Value) -> Result<Value>;

    /// 연결 종료 (여러 번 호출해도 안전해야 함)
    async fn close(&self) -> Result<()>;
}

/// provider 연결 생성기
#[async_trait]
pub trait ProviderConnector: Send + Sync {
    /// 연결 및 핸드셰이크 (실패 시 `Error::ProviderConnection`)
    async fn connect(
        &self,
        name: &str,
        config: &ToolProviderConfig,
    ) -> Result<Arc<dyn ProviderHandle>>;
}
