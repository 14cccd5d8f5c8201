//! Summary Hub - correlation id로 요약 스트림을 찾아 붙는 곳

use super::stream::{SummaryStream, SummarySubscriber};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// 기본 보관 개수
pub const DEFAULT_MAX_RETAINED: usize = 64;

/// 요약 스트림 보관소
///
/// 최대 `max_retained`개까지 보관한다. 넘치면 종료된 스트림 중 가장 오래된
/// 것부터 버린다. 진행 중인 스트림은 버리지 않으므로 전부 진행 중이면
/// 한도를 넘어 보관하고, 이후 insert에서 종료된 것부터 정리한다.
pub struct SummaryHub {
    max_retained: usize,
    streams: Mutex<VecDeque<Arc<SummaryStream>>>,
}

impl SummaryHub {
    pub fn new(max_retained: usize) -> Self {
        Self {
            max_retained: max_retained.max(1),
            streams: Mutex::new(VecDeque::new()),
        }
    }

    /// 스트림 등록
    pub fn insert(&self, stream: Arc<SummaryStream>) {
        let mut streams = self.streams.lock();
        streams.push_back(stream);

        while streams.len() > self.max_retained {
            let Some(victim) = streams.iter().position(|s| s.state().is_terminal()) else {
                debug!(
                    retained = streams.len(),
                    max_retained = self.max_retained,
                    "All summary streams in flight; retaining over limit"
                );
                break;
            };
            if let Some(evicted) = streams.remove(victim) {
                debug!(
                    correlation_id = %evicted.correlation_id(),
                    state = ?evicted.state(),
                    "Evicted summary stream"
                );
            }
        }
    }

    pub fn get(&self, correlation_id: &str) -> Option<Arc<SummaryStream>> {
        self.streams
            .lock()
            .iter()
            .find(|s| s.correlation_id() == correlation_id)
            .cloned()
    }

    /// 구독 (버퍼 처음부터)
    pub fn subscribe(&self, correlation_id: &str) -> Option<SummarySubscriber> {
        self.get(correlation_id).map(|stream| stream.subscribe())
    }

    pub fn len(&self) -> usize {
        self.streams.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.lock().is_empty()
    }

    /// 보관 중인 correlation id (오래된 순)
    pub fn correlation_ids(&self) -> Vec<String> {
        self.streams
            .lock()
            .iter()
            .map(|s| s.correlation_id().to_string())
            .collect()
    }
}

impl Default for SummaryHub {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETAINED)
    }
}
