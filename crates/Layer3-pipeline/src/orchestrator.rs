//! Orchestrator - 호스트 애플리케이션이 쓰는 경계 연산 모음
//!
//! bus 하나를 만들어 모든 컴포넌트에 주입한다. 전역 상태는 없다.

use crate::collector::{ResultCollector, SubmitOutcome};
use crate::dispatcher::{Delivery, PlanDispatcher};
use crate::summary::{SummaryGenerator, SummaryHub, SummaryOptions, SummarySubscriber};
use conductor_core::{AggregatorState, AggregatorStatus, CapabilityAggregator};
use conductor_foundation::{
    ActionPlan, ConductorConfig, EventBus, EventBusConfig, ExecutionReport, ListenerId, Result,
    ToolProviderConfig,
};
use conductor_provider::TextGenerator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// `GET status` 응답
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub aggregator_state: AggregatorState,
    pub connected_provider_count: usize,
}

impl From<AggregatorStatus> for StatusResponse {
    fn from(status: AggregatorStatus) -> Self {
        Self {
            aggregator_state: status.state,
            connected_provider_count: status.connected_providers,
        }
    }
}

pub struct Orchestrator {
    bus: Arc<EventBus>,
    aggregator: CapabilityAggregator,
    dispatcher: PlanDispatcher,
    collector: Arc<ResultCollector>,
    hub: Arc<SummaryHub>,
}

impl Orchestrator {
    pub fn new(
        bus: Arc<EventBus>,
        aggregator: CapabilityAggregator,
        generator: Arc<dyn TextGenerator>,
        hub: Arc<SummaryHub>,
        options: SummaryOptions,
    ) -> Self {
        let summaries = Arc::new(SummaryGenerator::new(
            Arc::clone(&bus),
            generator,
            Arc::clone(&hub),
            options,
        ));

        Self {
            dispatcher: PlanDispatcher::new(Arc::clone(&bus)),
            collector: Arc::new(ResultCollector::new(Arc::clone(&bus), summaries)),
            bus,
            aggregator,
            hub,
        }
    }

    /// 설정 파일 값으로 구성 (MCP aggregator 사용)
    pub fn from_config(config: &ConductorConfig, generator: Arc<dyn TextGenerator>) -> Self {
        let bus = Arc::new(EventBus::with_config(EventBusConfig {
            debug_mode: config.bus.debug,
        }));
        let aggregator =
            CapabilityAggregator::mcp().with_default_timeout(config.aggregator.connect_timeout());
        let hub = Arc::new(SummaryHub::new(config.summary.max_retained));

        Self::new(
            bus,
            aggregator,
            generator,
            hub,
            SummaryOptions::from(&config.summary),
        )
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn aggregator(&self) -> &CapabilityAggregator {
        &self.aggregator
    }

    pub fn hub(&self) -> &Arc<SummaryHub> {
        &self.hub
    }

    /// 현재 상태 (읽기 전용, 실패하지 않음)
    pub fn status(&self) -> StatusResponse {
        self.aggregator.status().into()
    }

    pub async fn aggregate<I>(&self, providers: I) -> StatusResponse
    where
        I: IntoIterator<Item = (String, ToolProviderConfig)>,
    {
        self.aggregator.aggregate(providers).await.into()
    }

    pub async fn dispatch(&self, plan: ActionPlan) -> Result<()> {
        self.dispatcher.dispatch(plan).await
    }

    /// dispatch + 전달 결과
    pub async fn dispatch_tracked(&self, plan: ActionPlan) -> Result<Delivery> {
        self.dispatcher.dispatch_tracked(plan).await
    }

    pub async fn submit_report(&self, report: ExecutionReport) -> Result<SubmitOutcome> {
        self.collector.submit_report(report).await
    }

    /// 요약 스트림에 붙기 (버퍼된 토큰부터)
    pub fn attach_summary(&self, correlation_id: &str) -> Option<SummarySubscriber> {
        self.hub.subscribe(correlation_id)
    }

    /// `report.submitted`로 들어오는 report 처리 시작
    pub async fn listen_for_reports(&self) -> ListenerId {
        self.collector.listen().await
    }

    /// provider 연결 정리
    pub async fn shutdown(&self) {
        let closed = self.aggregator.close().await;
        info!(closed = closed.len(), "Orchestrator shut down");
    }
}
