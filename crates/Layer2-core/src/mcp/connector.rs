//! MCP Connector - 기본 `ProviderConnector` 구현

use super::client::McpClient;
use super::transport::DEFAULT_REQUEST_TIMEOUT;
use crate::capability::{ProviderConnector, ProviderHandle};
use async_trait::async_trait;
use conductor_foundation::{Result, ToolProviderConfig};
use std::sync::Arc;
use std::time::Duration;

/// MCP JSON-RPC로 provider에 연결
#[derive(Debug, Clone)]
pub struct McpConnector {
    /// 개별 JSON-RPC 요청 타임아웃
    request_timeout: Duration,
}

impl McpConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl Default for McpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

#[async_trait]
impl ProviderConnector for McpConnector {
    async fn connect(
        &self,
        name: &str,
        config: &ToolProviderConfig,
    ) -> Result<Arc<dyn ProviderHandle>> {
        let client = McpClient::connect(name, config, self.request_timeout).await?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_command_is_connection_error() {
        let connector = McpConnector::default();
        let config = ToolProviderConfig::command("conductor-definitely-missing-binary", vec![]);

        let err = connector.connect("ghost", &config).await.err().unwrap();
        assert!(err.is_provider_failure());
        assert!(err.to_string().contains("ghost"));
    }
}
