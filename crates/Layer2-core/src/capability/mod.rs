//! Capability - tool provider 연결과 operation 집계
//!
//! ## 구조
//!
//! ```text
//! ProviderConfigs ──▶ CapabilityAggregator ──connect──▶ ProviderConnector
//!                          │                                  │
//!                          │                            ProviderHandle
//!                          ▼                                  │
//!                  Arc<CapabilityRegistry> ◀── list_operations┘
//!                  (<provider>_<operation>)
//! ```

mod aggregator;
mod handle;
mod registry;

pub use aggregator::{
    AggregatorState, AggregatorStatus, CapabilityAggregator, ConnectionState,
    ToolProviderConnection, DEFAULT_CONNECT_TIMEOUT,
};
pub use handle::{OperationDescriptor, ProviderConnector, ProviderHandle};
pub use registry::{namespaced, CapabilityRegistry, RegisteredOperation};
