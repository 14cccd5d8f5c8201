//! conductor-core: Capability aggregation for Conductor
//!
//! Layer2 - tool provider 연결 레이어
//!
//! # 주요 모듈
//!
//! - `capability`: Capability Aggregator, namespace registry, provider seam
//! - `mcp`: MCP (Model Context Protocol) 클라이언트와 전송 계층
//!
//! # 사용 예시
//!
//! ```ignore
//! use conductor_core::CapabilityAggregator;
//! use conductor_foundation::ProviderConfigs;
//!
//! let aggregator = CapabilityAggregator::mcp();
//! let status = aggregator.aggregate(ProviderConfigs::load(&project_dir)?).await;
//!
//! for name in aggregator.registry().names() {
//!     println!("{}", name);
//! }
//!
//! aggregator.close().await;
//! ```

pub mod capability;
pub mod mcp;

// Re-exports: Capability
pub use capability::{
    namespaced, AggregatorState, AggregatorStatus, CapabilityAggregator, CapabilityRegistry,
    ConnectionState, OperationDescriptor, ProviderConnector, ProviderHandle, RegisteredOperation,
    ToolProviderConnection, DEFAULT_CONNECT_TIMEOUT,
};

// Re-exports: MCP
pub use mcp::{McpClient, McpConnector, McpTransport, SseTransport, StdioTransport};
