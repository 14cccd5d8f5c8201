//! Result Collector & Aggregator
//!
//! runner가 제출한 execution report를 받아 통계를 계산하고
//! `report.aggregated`로 다시 발행한 뒤 요약을 시작한다.
//!
//! 요약 시작 실패는 report 수신 자체를 무효로 만들지 않는다.

use crate::summary::SummaryGenerator;
use async_trait::async_trait;
use conductor_foundation::{
    topics, ActionStatus, AggregatedReport, BusEvent, EventBus, EventListener, EventPayload,
    ExecutionReport, ListenerId, Result, Statistics,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// 요약을 시작하지 못했을 때 돌려주는 에러 문자열
pub const SUMMARY_UNAVAILABLE: &str = "summary unavailable";

/// report에서 통계 계산 (순수 함수)
pub fn compute_statistics(report: &ExecutionReport) -> Statistics {
    let mut statistics = Statistics {
        total: report.actions.len(),
        ..Default::default()
    };

    for result in &report.actions {
        match result.status {
            ActionStatus::Success => statistics.successful += 1,
            ActionStatus::Failure => statistics.failed += 1,
            ActionStatus::Skipped => statistics.skipped += 1,
        }
        *statistics.by_type.entry(result.kind).or_insert(0) += 1;
    }

    statistics
}

/// `submit_report` 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub report_id: String,

    /// 요약 correlation id (시작 실패 시 null)
    pub summary_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubmitOutcome {
    pub fn has_summary(&self) -> bool {
        self.summary_id.is_some()
    }
}

/// Result Collector
pub struct ResultCollector {
    bus: Arc<EventBus>,
    summaries: Arc<SummaryGenerator>,
}

impl ResultCollector {
    pub fn new(bus: Arc<EventBus>, summaries: Arc<SummaryGenerator>) -> Self {
        Self { bus, summaries }
    }

    /// report 제출
    ///
    /// 검증 실패만 `Err`로 돌려준다. 요약 실패는 `SubmitOutcome.error`로 표시된다.
    pub async fn submit_report(&self, report: ExecutionReport) -> Result<SubmitOutcome> {
        report.validate()?;

        let report_id = uuid::Uuid::new_v4().to_string();
        let statistics = compute_statistics(&report);

        let flag_consistent = !statistics.contradicts(report.success);
        if !flag_consistent {
            warn!(
                report_id = %report_id,
                success = report.success,
                failed = statistics.failed,
                "Reported success flag disagrees with action results"
            );
        }

        let report = Arc::new(report);
        let aggregated = AggregatedReport {
            report_id: report_id.clone(),
            report: (*report).clone(),
            statistics: statistics.clone(),
            flag_consistent,
        };

        let delivered = self
            .bus
            .publish(
                topics::REPORT_AGGREGATED,
                EventPayload::ReportAggregated(Arc::new(aggregated)),
            )
            .await;
        debug!(report_id = %report_id, delivered, "Published aggregated report");

        let outcome = match self.summaries.summarize(Arc::clone(&report)).await {
            Ok(stream) => SubmitOutcome {
                report_id: report_id.clone(),
                summary_id: Some(stream.correlation_id().to_string()),
                error: None,
            },
            Err(e) => {
                warn!(report_id = %report_id, "Summary unavailable: {}", e);
                SubmitOutcome {
                    report_id: report_id.clone(),
                    summary_id: None,
                    error: Some(SUMMARY_UNAVAILABLE.to_string()),
                }
            }
        };

        info!(
            report_id = %report_id,
            total = statistics.total,
            successful = statistics.successful,
            failed = statistics.failed,
            skipped = statistics.skipped,
            summary_id = ?outcome.summary_id,
            "Report accepted"
        );

        Ok(outcome)
    }

    /// `report.submitted` 구독
    ///
    /// 리스너는 collector를 약하게 참조하므로 collector가 사라지면 아무 일도 하지 않는다.
    pub async fn listen(self: &Arc<Self>) -> ListenerId {
        let listener = CollectorListener {
            collector: Arc::downgrade(self),
        };
        self.bus
            .subscribe(topics::REPORT_SUBMITTED, Arc::new(listener))
            .await
    }
}

struct CollectorListener {
    collector: Weak<ResultCollector>,
}

#[async_trait]
impl EventListener for CollectorListener {
    fn name(&self) -> &str {
        "result-collector"
    }

    async fn on_event(&self, event: &BusEvent) -> Result<()> {
        let EventPayload::ReportSubmitted(report) = &event.payload else {
            debug!(event_id = %event.id, kind = event.payload.kind(), "Ignoring event");
            return Ok(());
        };

        let Some(collector) = self.collector.upgrade() else {
            return Ok(());
        };

        let outcome = collector.submit_report((**report).clone()).await?;
        debug!(
            event_id = %event.id,
            report_id = %outcome.report_id,
            "Report submitted over bus"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::{SummaryHub, SummaryOptions};
    use conductor_foundation::{ActionKind, ActionResult};
    use conductor_provider::{GenerationRequest, ProviderError, TextGenerator, TokenStream};
    use std::time::Duration;

    struct Unreachable;

    #[async_trait]
    impl TextGenerator for Unreachable {
        fn name(&self) -> &str {
            "unreachable"
        }

        async fn generate(&self, _request: GenerationRequest) -> std::result::Result<TokenStream, ProviderError> {
            Err(ProviderError::Network("connection refused".into()))
        }
    }

    struct Echo;

    #[async_trait]
    impl TextGenerator for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, _request: GenerationRequest) -> std::result::Result<TokenStream, ProviderError> {
            let tokens = vec![Ok("ok".to_string())];
            Ok(Box::pin(futures::stream::iter(tokens)))
        }
    }

    fn collector(generator: Arc<dyn TextGenerator>) -> (Arc<EventBus>, Arc<ResultCollector>) {
        let bus = Arc::new(EventBus::new());
        let summaries = Arc::new(SummaryGenerator::new(
            Arc::clone(&bus),
            generator,
            Arc::new(SummaryHub::default()),
            SummaryOptions {
                start_timeout: Duration::from_secs(1),
                max_message_chars: 100,
            },
        ));
        let collector = Arc::new(ResultCollector::new(Arc::clone(&bus), summaries));
        (bus, collector)
    }

    fn sample_report() -> ExecutionReport {
        ExecutionReport::new(
            "/p",
            vec![
                ActionResult::new(ActionKind::Create, ActionStatus::Success).target("a.txt"),
                ActionResult::new(ActionKind::Shell, ActionStatus::Failure)
                    .command("npm test")
                    .error("exit 1"),
            ],
            false,
        )
    }

    #[test]
    fn test_compute_statistics() {
        let mut report = sample_report();
        report
            .actions
            .push(ActionResult::new(ActionKind::Delete, ActionStatus::Skipped));

        let stats = compute_statistics(&report);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.count_of(ActionKind::Create), 1);
        assert_eq!(stats.count_of(ActionKind::Shell), 1);
        assert_eq!(stats.count_of(ActionKind::Delete), 1);
        assert_eq!(stats.count_of(ActionKind::Rename), 0);
    }

    #[test]
    fn test_compute_statistics_empty() {
        let report = ExecutionReport::new("/p", vec![], true);
        assert_eq!(compute_statistics(&report), Statistics::default());
    }

    #[tokio::test]
    async fn test_summary_failure_keeps_report() {
        let (bus, collector) = collector(Arc::new(Unreachable));
        let (_, mut rx) = bus.subscribe_channel(topics::REPORT_AGGREGATED).await;

        let outcome = collector.submit_report(sample_report()).await.unwrap();
        assert!(!outcome.has_summary());
        assert_eq!(outcome.error.as_deref(), Some(SUMMARY_UNAVAILABLE));

        let event = rx.try_recv().unwrap();
        let EventPayload::ReportAggregated(aggregated) = event.payload else {
            panic!("unexpected payload");
        };
        assert_eq!(aggregated.report_id, outcome.report_id);
        assert!(aggregated.flag_consistent);
    }

    #[tokio::test]
    async fn test_outcome_serialization() {
        let (_, collector) = collector(Arc::new(Unreachable));
        let outcome = collector.submit_report(sample_report()).await.unwrap();

        let json = serde_json::to_value(&outcome).unwrap();
        assert!(json["summaryId"].is_null());
        assert_eq!(json["error"], "summary unavailable");
        assert!(json["reportId"].is_string());
    }

    #[tokio::test]
    async fn test_inconsistent_flag_is_not_rewritten() {
        let (bus, collector) = collector(Arc::new(Echo));
        let (_, mut rx) = bus.subscribe_channel(topics::REPORT_AGGREGATED).await;

        let mut report = sample_report();
        report.success = true;
        let outcome = collector.submit_report(report).await.unwrap();
        assert!(outcome.has_summary());
        assert!(outcome.error.is_none());

        let EventPayload::ReportAggregated(aggregated) = rx.try_recv().unwrap().payload else {
            panic!("unexpected payload");
        };
        assert!(aggregated.report.success);
        assert!(!aggregated.flag_consistent);
    }

    #[tokio::test]
    async fn test_empty_root_rejected() {
        let (bus, collector) = collector(Arc::new(Echo));
        let (_, mut rx) = bus.subscribe_channel(topics::REPORT_AGGREGATED).await;

        let report = ExecutionReport::new("  ", vec![], true);
        let err = collector.submit_report(report).await.unwrap_err();
        assert!(err.is_validation());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_listen_on_bus() {
        let (bus, collector) = collector(Arc::new(Echo));
        collector.listen().await;
        let (_, mut rx) = bus.subscribe_channel(topics::REPORT_AGGREGATED).await;

        let delivered = bus
            .publish(
                topics::REPORT_SUBMITTED,
                EventPayload::ReportSubmitted(Arc::new(sample_report())),
            )
            .await;
        assert_eq!(delivered, 1);

        let EventPayload::ReportAggregated(aggregated) = rx.try_recv().unwrap().payload else {
            panic!("unexpected payload");
        };
        assert_eq!(aggregated.statistics.total, 2);
    }
}
