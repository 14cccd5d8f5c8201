//! Summary Stream - correlation id 하나에 대응하는 요약 버퍼
//!
//! 토큰은 뒤에만 붙고 한 번 종료되면 다시 바뀌지 않는다.
//! 늦게 붙은 구독자도 버퍼된 앞부분부터 읽는다.
//!
//! ```text
//! pending ──token──▶ streaming ──▶ completed
//!    │                   │
//!    └───────────────────┴──────▶ failed
//! ```

use chrono::{DateTime, Utc};
use conductor_foundation::{ExecutionReport, Statistics, SummaryChunkKind};
use futures::Stream;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// 요약 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryState {
    Pending,
    Streaming,
    Completed,
    Failed,
}

impl SummaryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug)]
struct Buffer {
    tokens: Vec<String>,
    state: SummaryState,
    error: Option<String>,
}

/// 단일 요약 스트림
#[derive(Debug)]
pub struct SummaryStream {
    correlation_id: String,
    report: Arc<ExecutionReport>,
    statistics: Statistics,
    created_at: DateTime<Utc>,
    buffer: Mutex<Buffer>,
    /// 변경 알림 (버전 번호)
    changed: watch::Sender<u64>,
}

impl SummaryStream {
    pub fn new(
        correlation_id: impl Into<String>,
        report: Arc<ExecutionReport>,
        statistics: Statistics,
    ) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            correlation_id: correlation_id.into(),
            report,
            statistics,
            created_at: Utc::now(),
            buffer: Mutex::new(Buffer {
                tokens: Vec::new(),
                state: SummaryState::Pending,
                error: None,
            }),
            changed,
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn report(&self) -> &Arc<ExecutionReport> {
        &self.report
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SummaryState {
        self.buffer.lock().state
    }

    /// 실패 사유 (failed 상태일 때)
    pub fn error(&self) -> Option<String> {
        self.buffer.lock().error.clone()
    }

    /// 지금까지 버퍼된 토큰
    pub fn tokens(&self) -> Vec<String> {
        self.buffer.lock().tokens.clone()
    }

    /// 지금까지 버퍼된 텍스트
    pub fn text(&self) -> String {
        self.buffer.lock().tokens.concat()
    }

    /// 토큰 추가. 이미 종료됐으면 false.
    pub(crate) fn push_token(&self, token: impl Into<String>) -> bool {
        {
            let mut buffer = self.buffer.lock();
            if buffer.state.is_terminal() {
                return false;
            }
            buffer.tokens.push(token.into());
            buffer.state = SummaryState::Streaming;
        }
        self.bump();
        true
    }

    /// 정상 종료. 이미 종료됐으면 false.
    pub(crate) fn complete(&self) -> bool {
        self.finish(SummaryState::Completed, None)
    }

    /// 실패 종료. 이미 종료됐으면 false.
    pub(crate) fn fail(&self, error: impl Into<String>) -> bool {
        self.finish(SummaryState::Failed, Some(error.into()))
    }

    fn finish(&self, state: SummaryState, error: Option<String>) -> bool {
        {
            let mut buffer = self.buffer.lock();
            if buffer.state.is_terminal() {
                return false;
            }
            buffer.state = state;
            buffer.error = error;
        }
        self.bump();
        true
    }

    fn bump(&self) {
        self.changed.send_modify(|version| *version += 1);
    }

    /// 구독자 생성 (버퍼 처음부터 읽음)
    pub fn subscribe(self: &Arc<Self>) -> SummarySubscriber {
        SummarySubscriber {
            stream: Arc::clone(self),
            changed: self.changed.subscribe(),
            position: 0,
            finished: false,
        }
    }

    /// 읽기 시도: 다음 토큰, 종료 마커, 또는 대기 필요(None)
    fn poll_at(&self, position: usize) -> Option<SummaryChunkKind> {
        let buffer = self.buffer.lock();
        if let Some(token) = buffer.tokens.get(position) {
            return Some(SummaryChunkKind::Token(token.clone()));
        }
        match buffer.state {
            SummaryState::Completed => Some(SummaryChunkKind::Completed),
            SummaryState::Failed => Some(SummaryChunkKind::Failed(
                buffer.error.clone().unwrap_or_default(),
            )),
            SummaryState::Pending | SummaryState::Streaming => None,
        }
    }
}

/// 요약 구독자
///
/// 버퍼된 토큰 → 실시간 토큰 → 종료 마커 1개 → `None` 순서로 돌려준다.
pub struct SummarySubscriber {
    stream: Arc<SummaryStream>,
    changed: watch::Receiver<u64>,
    position: usize,
    finished: bool,
}

impl SummarySubscriber {
    pub fn correlation_id(&self) -> &str {
        self.stream.correlation_id()
    }

    /// 다음 항목
    pub async fn next(&mut self) -> Option<SummaryChunkKind> {
        if self.finished {
            return None;
        }

        loop {
            // 확인 전에 현재 버전을 본 것으로 표시 - 이후 변경은 changed()가 깨운다
            self.changed.borrow_and_update();

            match self.stream.poll_at(self.position) {
                Some(SummaryChunkKind::Token(token)) => {
                    self.position += 1;
                    return Some(SummaryChunkKind::Token(token));
                }
                Some(terminal) => {
                    self.finished = true;
                    return Some(terminal);
                }
                None => {
                    if self.changed.changed().await.is_err() {
                        // sender는 stream이 들고 있으므로 도달하지 않음
                        self.finished = true;
                        return None;
                    }
                }
            }
        }
    }

    /// `futures::Stream`으로 변환
    pub fn into_stream(mut self) -> impl Stream<Item = SummaryChunkKind> + Send {
        async_stream::stream! {
            while let Some(item) = self.next().await {
                yield item;
            }
        }
    }
}
