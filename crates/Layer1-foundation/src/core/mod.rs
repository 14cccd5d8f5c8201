//! Core Module - 파이프라인 공용 타입
//!
//! ## 흐름
//!
//! ```text
//! ActionPlan ──dispatch──▶ [external runner] ──▶ ExecutionReport
//!                                                   │
//!                                                   ▼
//!                                   Statistics + AggregatedReport
//!                                                   │
//!                                                   ▼
//!                                            SummaryChunk stream
//! ```

pub mod types;

pub use types::{
    Action, ActionKind, ActionPlan, ActionResult, ActionStatus, AggregatedReport,
    ExecutionReport, Statistics, SummaryChunk, SummaryChunkKind,
};
