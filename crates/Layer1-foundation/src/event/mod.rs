//! Event System - 토픽 기반 발행/구독 시스템
//!
//! 파이프라인의 각 단계는 직접 호출 대신 버스를 통해 메시지를 주고받는다.
//!
//! ## 토픽
//!
//! ```text
//! ┌──────────────────┬───────────────────────────┬──────────────────────┐
//! │ plan.dispatched  │ PlanDispatched(plan)      │ → external runner    │
//! │ report.submitted │ ReportSubmitted(report)   │ → Result Collector   │
//! │ report.aggregated│ ReportAggregated(agg)     │ → status UI, logs    │
//! │ summary.stream.* │ Summary(chunk)            │ → status UI          │
//! └──────────────────┴───────────────────────────┴──────────────────────┘
//! ```
//!
//! ## 전달 보장
//!
//! at-most-once, 버퍼링 없음. 발행 시점에 구독자가 없으면 메시지는 사라진다.
//! 전달을 보장받으려면 발행 전에 구독해야 한다.

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventBusConfig, EventListener, ListenerId};
pub use types::{topics, BusEvent, EventId, EventPayload};
