//! Summary Generator - report를 텍스트 생성기로 요약하고 토큰을 스트리밍

use super::hub::SummaryHub;
use super::prompt::{build_prompt, SYSTEM_INSTRUCTION};
use super::stream::SummaryStream;
use crate::collector::compute_statistics;
use conductor_foundation::{
    topics, Error, EventBus, EventPayload, ExecutionReport, Result, SummaryChunk, SummarySettings,
};
use conductor_provider::{GenerationRequest, TextGenerator, TokenStream};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 요약 옵션
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOptions {
    /// 업스트림 스트림 오픈 대기 시간
    pub start_timeout: Duration,

    /// 프롬프트의 message/error 최대 길이
    pub max_message_chars: usize,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self::from(&SummarySettings::default())
    }
}

impl From<&SummarySettings> for SummaryOptions {
    fn from(settings: &SummarySettings) -> Self {
        Self {
            start_timeout: settings.start_timeout(),
            max_message_chars: settings.max_message_chars,
        }
    }
}

/// Summary Generator
pub struct SummaryGenerator {
    bus: Arc<EventBus>,
    generator: Arc<dyn TextGenerator>,
    hub: Arc<SummaryHub>,
    options: SummaryOptions,
}

impl SummaryGenerator {
    pub fn new(
        bus: Arc<EventBus>,
        generator: Arc<dyn TextGenerator>,
        hub: Arc<SummaryHub>,
        options: SummaryOptions,
    ) -> Self {
        Self {
            bus,
            generator,
            hub,
            options,
        }
    }

    pub fn hub(&self) -> &Arc<SummaryHub> {
        &self.hub
    }

    /// 요약 시작
    ///
    /// 업스트림 스트림이 열릴 때까지만 기다린다 (`start_timeout`).
    /// 토큰 전달은 별도 태스크에서 진행되고, 호출마다 새 correlation id를 쓴다.
    pub async fn summarize(&self, report: Arc<ExecutionReport>) -> Result<Arc<SummaryStream>> {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let statistics = compute_statistics(&report);

        let prompt = build_prompt(&report, &statistics, self.options.max_message_chars)?;
        let request = GenerationRequest::new(prompt).with_system(SYSTEM_INSTRUCTION);

        debug!(
            correlation_id = %correlation_id,
            generator = self.generator.name(),
            "Opening summary stream"
        );

        let tokens = match tokio::time::timeout(
            self.options.start_timeout,
            self.generator.generate(request),
        )
        .await
        {
            Ok(Ok(tokens)) => tokens,
            Ok(Err(e)) => {
                warn!(correlation_id = %correlation_id, "Summary failed to start: {}", e);
                return Err(e.into());
            }
            Err(_) => {
                warn!(
                    correlation_id = %correlation_id,
                    "Summary failed to start: no stream after {:?}",
                    self.options.start_timeout
                );
                return Err(Error::Timeout(format!(
                    "summary stream did not open within {:?}",
                    self.options.start_timeout
                )));
            }
        };

        let stream = Arc::new(SummaryStream::new(
            correlation_id.clone(),
            Arc::clone(&report),
            statistics,
        ));
        self.hub.insert(Arc::clone(&stream));

        tokio::spawn(pump(Arc::clone(&self.bus), Arc::clone(&stream), tokens));

        info!(correlation_id = %correlation_id, "Summary streaming started");
        Ok(stream)
    }
}

/// 업스트림 토큰을 버퍼에 쌓고 `summary.stream.<id>`로 발행
///
/// 버퍼에 먼저 넣은 뒤 발행하므로, 이벤트를 받은 쪽이 hub에서 읽어도 그 토큰이 보인다.
async fn pump(bus: Arc<EventBus>, stream: Arc<SummaryStream>, mut tokens: TokenStream) {
    let correlation_id = stream.correlation_id().to_string();
    let topic = topics::summary_stream(&correlation_id);

    while let Some(item) = tokens.next().await {
        match item {
            Ok(token) => {
                if token.is_empty() {
                    continue;
                }
                stream.push_token(token.clone());
                bus.publish(
                    &topic,
                    EventPayload::Summary(SummaryChunk::token(&correlation_id, token)),
                )
                .await;
            }
            Err(e) => {
                warn!(correlation_id = %correlation_id, "Summary upstream failed: {}", e);
                let reason = Error::from(e).to_string();
                stream.fail(reason.clone());
                bus.publish(
                    &topic,
                    EventPayload::Summary(SummaryChunk::failed(&correlation_id, reason)),
                )
                .await;
                return;
            }
        }
    }

    stream.complete();
    bus.publish(
        &topic,
        EventPayload::Summary(SummaryChunk::completed(&correlation_id)),
    )
    .await;
    debug!(
        correlation_id = %correlation_id,
        "Summary completed ({} token(s))",
        stream.tokens().len()
    );
}
