//! MCP - Model Context Protocol 연동
//!
//! 외부 MCP 서버를 tool provider로 연결합니다.
//!
//! ## 기능
//! - initialize 핸드셰이크
//! - `tools/list` (cursor 페이지네이션)
//! - `tools/call` 프록시
//!
//! ## 지원 전송
//! - stdio (로컬 프로세스)
//! - SSE (HTTP Server-Sent Events, 커스텀 헤더)
//!
//! ## 참고
//! - https://modelcontextprotocol.io/

mod client;
mod connector;
mod transport;
mod types;

pub use client::{McpClient, MCP_PROTOCOL_VERSION};
pub use connector::McpConnector;
pub use transport::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpTransport,
    SseTransport, StdioTransport, DEFAULT_REQUEST_TIMEOUT,
};
pub use types::{McpContent, McpServerInfo, McpTool, McpToolResult};
