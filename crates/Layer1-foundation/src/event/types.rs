//! Event Types - 버스에 흐르는 토픽/페이로드 정의

use crate::core::{ActionPlan, AggregatedReport, ExecutionReport, SummaryChunk};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Topics
// ============================================================================

/// 토픽 이름
pub mod topics {
    /// Plan Dispatcher → external runner
    pub const PLAN_DISPATCHED: &str = "plan.dispatched";

    /// external runner → Result Collector
    pub const REPORT_SUBMITTED: &str = "report.submitted";

    /// Result Collector → status UI, logs
    pub const REPORT_AGGREGATED: &str = "report.aggregated";

    /// Summary Generator 토픽 prefix (`summary.stream.<correlationId>`)
    pub const SUMMARY_STREAM_PREFIX: &str = "summary.stream";

    /// correlation id에 대한 요약 토픽
    pub fn summary_stream(correlation_id: &str) -> String {
        format!("{}.{}", SUMMARY_STREAM_PREFIX, correlation_id)
    }
}

// ============================================================================
// Event ID
// ============================================================================

/// 이벤트 고유 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Payload
// ============================================================================

/// 타입이 있는 이벤트 페이로드
///
/// 큰 엔티티는 `Arc`로 공유한다. 발행 이후에는 아무도 수정하지 않는다.
#[derive(Debug, Clone)]
pub enum EventPayload {
    PlanDispatched(Arc<ActionPlan>),
    ReportSubmitted(Arc<ExecutionReport>),
    ReportAggregated(Arc<AggregatedReport>),
    Summary(SummaryChunk),
}

impl EventPayload {
    /// 페이로드 종류 이름 (로그용)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlanDispatched(_) => "plan_dispatched",
            Self::ReportSubmitted(_) => "report_submitted",
            Self::ReportAggregated(_) => "report_aggregated",
            Self::Summary(_) => "summary",
        }
    }
}

/// 버스 이벤트
#[derive(Debug, Clone)]
pub struct BusEvent {
    pub id: EventId,
    pub topic: String,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl BusEvent {
    pub fn new(topic: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            topic: topic.into(),
            timestamp: Utc::now(),
            payload,
        }
    }
}
