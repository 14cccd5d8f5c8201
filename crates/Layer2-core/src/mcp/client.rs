//! MCP Client - MCP 서버 클라이언트
//!
//! 핸드셰이크(`initialize` + `notifications/initialized`)를 마친 연결을
//! `ProviderHandle`로 노출한다.

use super::transport::{McpTransport, SseTransport, StdioTransport};
use super::types::{McpInitializeResult, McpServerInfo, McpToolResult, McpToolsPage};
use crate::capability::{OperationDescriptor, ProviderHandle};
use async_trait::async_trait;
use conductor_foundation::{Error, Result, ToolProviderConfig, TransportKind};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// MCP 프로토콜 버전
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// `tools/list` 페이지 상한
const MAX_TOOL_PAGES: usize = 64;

/// MCP 클라이언트
pub struct McpClient {
    /// 서버 이름 (설정 키)
    name: String,

    /// 전송 종류
    kind: TransportKind,

    /// 전송 계층
    transport: Arc<dyn McpTransport>,

    /// initialize 응답의 서버 정보
    server_info: McpServerInfo,
}

impl McpClient {
    /// 설정에 맞는 전송 계층을 열고 핸드셰이크까지 수행
    pub async fn connect(
        name: &str,
        config: &ToolProviderConfig,
        request_timeout: Duration,
    ) -> Result<Self> {
        info!(provider = %name, "Connecting to MCP server");

        let transport: Arc<dyn McpTransport> = match config {
            ToolProviderConfig::Command(command) => Arc::new(
                StdioTransport::spawn(command, request_timeout)
                    .await
                    .map_err(|e| Error::provider_connection(name, e.to_string()))?,
            ),
            ToolProviderConfig::Network(network) => Arc::new(
                SseTransport::connect(network, request_timeout)
                    .await
                    .map_err(|e| Error::provider_connection(name, e.to_string()))?,
            ),
        };

        Self::with_transport(name, config.kind(), transport).await
    }

    /// 이미 열린 전송 계층으로 핸드셰이크 수행
    pub async fn with_transport(
        name: &str,
        kind: TransportKind,
        transport: Arc<dyn McpTransport>,
    ) -> Result<Self> {
        match initialize(transport.as_ref()).await {
            Ok(server_info) => {
                debug!(
                    provider = %name,
                    "MCP server '{}' v{} initialized",
                    server_info.name,
                    server_info.version
                );
                Ok(Self {
                    name: name.to_string(),
                    kind,
                    transport,
                    server_info,
                })
            }
            Err(e) => {
                if let Err(close_err) = transport.close().await {
                    debug!(provider = %name, "Close after failed handshake: {}", close_err);
                }
                Err(Error::provider_connection(
                    name,
                    format!("initialize failed: {}", e),
                ))
            }
        }
    }

    /// 서버 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 서버가 알려준 정보
    pub fn server_info(&self) -> &McpServerInfo {
        &self.server_info
    }

    /// 연결 상태
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }
}

/// MCP initialize 핸드셰이크
async fn initialize(transport: &dyn McpTransport) -> Result<McpServerInfo> {
    let params = json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "clientInfo": {
            "name": "conductor",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "capabilities": {}
    });

    let result = transport.request("initialize", Some(params)).await?;
    let init: McpInitializeResult = serde_json::from_value(result)
        .map_err(|e| Error::Internal(format!("Invalid initialize response: {}", e)))?;

    if !init.protocol_version.is_empty() && init.protocol_version != MCP_PROTOCOL_VERSION {
        debug!(
            "MCP server negotiated protocol {} (requested {})",
            init.protocol_version, MCP_PROTOCOL_VERSION
        );
    }

    debug!(
        server = %init.server_info.name,
        capabilities = %init.capabilities,
        "MCP server initialized"
    );
    if !init.advertises_tools() {
        warn!(
            server = %init.server_info.name,
            "MCP server does not advertise tools; tools/list may fail"
        );
    }

    // initialized 알림 전송
    transport.notify("notifications/initialized", None).await?;

    Ok(init.server_info)
}

#[async_trait]
impl ProviderHandle for McpClient {
    fn transport_kind(&self) -> TransportKind {
        self.kind
    }

    async fn list_operations(&self) -> Result<Vec<OperationDescriptor>> {
        let mut operations = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let result = self
                .transport
                .request("tools/list", params)
                .await
                .map_err(|e| Error::provider_fetch(&self.name, e.to_string()))?;

            let page: McpToolsPage = serde_json::from_value(result).map_err(|e| {
                Error::provider_fetch(&self.name, format!("Invalid tools/list response: {}", e))
            })?;

            operations.extend(page.tools.into_iter().map(|tool| OperationDescriptor {
                name: tool.name,
                description: tool.description,
                input_schema: tool.input_schema,
            }));

            match page.next_cursor {
                Some(next) if !next.is_empty() && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next);
                }
                _ => return Ok(operations),
            }
        }

        warn!(
            provider = %self.name,
            "tools/list exceeded {} pages, truncating",
            MAX_TOOL_PAGES
        );
        Ok(operations)
    }

    async fn call(&self, operation: &str, arguments: Value) -> Result<Value> {
        debug!(provider = %self.name, operation = %operation, "Calling MCP tool");

        let params = json!({
            "name": operation,
            "arguments": arguments
        });
        let result = self.transport.request("tools/call", Some(params)).await?;

        let parsed: McpToolResult = serde_json::from_value(result.clone())
            .map_err(|e| Error::Internal(format!("Invalid tools/call response: {}", e)))?;

        if parsed.is_error {
            let reason = parsed.text().unwrap_or_else(|| "unknown error".to_string());
            warn!(provider = %self.name, operation = %operation, "MCP tool returned error: {}", reason);
            return Err(Error::Internal(format!(
                "Operation '{}' on '{}' failed: {}",
                operation, self.name, reason
            )));
        }

        Ok(result)
    }

    async fn close(&self) -> Result<()> {
        self.transport.close().await?;
        info!(provider = %self.name, "Disconnected from MCP server");
        Ok(())
    }
}
