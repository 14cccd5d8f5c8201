//! # conductor-foundation
//!
//! Foundation layer for Conductor:
//! - Core: 파이프라인 공용 타입 (ActionPlan, ExecutionReport, Statistics...)
//! - Event: 토픽 기반 Event Bus
//! - Config: tool provider 설정, conductor.toml
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Plan Dispatcher ──plan.dispatched──▶ external runner   │
//! │                                           │             │
//! │                            report.submitted             │
//! │                                           ▼             │
//! │                                  Result Collector       │
//! │                                    │            │       │
//! │                      report.aggregated   summary.stream.*│
//! │                                                         │
//! │  Capability Aggregator (MCP providers → registry)       │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod event;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Core (공용 타입)
// ============================================================================
pub use core::{
    Action, ActionKind, ActionPlan, ActionResult, ActionStatus, AggregatedReport,
    ExecutionReport, Statistics, SummaryChunk, SummaryChunkKind,
};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    global_config_dir,
    AggregatorSettings,
    BusSettings,
    CommandConfig,
    ConductorConfig,
    NetworkConfig,
    ProviderConfigs,
    SummarySettings,
    ToolProviderConfig,
    TransportKind,
    CONDUCTOR_CONFIG_FILE,
    MCP_FILE,
    PROJECT_MCP_FILE,
};

// ============================================================================
// Event (이벤트 시스템)
// ============================================================================
pub use event::{
    topics, BusEvent, EventBus, EventBusConfig, EventId, EventListener, EventPayload, ListenerId,
};
