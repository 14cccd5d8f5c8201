//! conductor-pipeline: Action orchestration pipeline
//!
//! Layer3 - plan 발행, 결과 수집, 요약 스트리밍
//!
//! ```text
//! dispatch(plan) ──plan.dispatched──▶ runner
//! runner ──report.submitted / submit_report──▶ ResultCollector
//!     ├──report.aggregated──▶ status UI
//!     └──▶ SummaryGenerator ──summary.stream.<id>──▶ subscribers
//! ```

pub mod collector;
pub mod dispatcher;
pub mod orchestrator;
pub mod summary;

pub use collector::{compute_statistics, ResultCollector, SubmitOutcome, SUMMARY_UNAVAILABLE};
pub use dispatcher::{Delivery, PlanDispatcher};
pub use orchestrator::{Orchestrator, StatusResponse};
pub use summary::{
    build_prompt, SummaryGenerator, SummaryHub, SummaryOptions, SummaryState, SummaryStream,
    SummarySubscriber, DEFAULT_MAX_RETAINED, SYSTEM_INSTRUCTION,
};
