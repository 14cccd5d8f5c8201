//! Event Bus - 토픽 기반 발행/구독
//!
//! - 토픽별로 구독 순서대로 전달 (FIFO per topic per publisher)
//! - 발행 시점 이후에 등록된 리스너는 그 메시지를 받지 않음 (버퍼링 없음)
//! - 리스너 하나의 실패(에러/패닉)는 다른 리스너나 발행자에게 전파되지 않음

use super::types::{BusEvent, EventPayload};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, trace, warn};

// ============================================================================
// EventListener Trait
// ============================================================================

/// 이벤트 리스너 ID (구독 취소 핸들)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// 이벤트 리스너 trait
#[async_trait]
pub trait EventListener: Send + Sync {
    /// 리스너 이름 (디버깅용)
    fn name(&self) -> &str;

    /// 이벤트 처리. `Err`는 로그만 남기고 삼킨다.
    async fn on_event(&self, event: &BusEvent) -> Result<()>;

    /// 더 이상 이벤트를 받을 수 없는 상태. `true`면 다음 publish에서 제거된다.
    fn is_closed(&self) -> bool {
        false
    }
}

/// mpsc 채널로 이벤트를 넘겨주는 리스너
struct ChannelListener {
    name: String,
    sender: mpsc::UnboundedSender<BusEvent>,
}

#[async_trait]
impl EventListener for ChannelListener {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_event(&self, event: &BusEvent) -> Result<()> {
        self.sender
            .send(event.clone())
            .map_err(|_| Error::Internal(format!("{}: receiver dropped", self.name)))
    }

    fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// 이벤트 버스 설정
#[derive(Debug, Clone, Default)]
pub struct EventBusConfig {
    /// 디버그 모드 (모든 이벤트 로깅)
    pub debug_mode: bool,
}

/// 등록된 리스너 정보
#[derive(Clone)]
struct RegisteredListener {
    id: ListenerId,
    listener: Arc<dyn EventListener>,
}

/// 이벤트 버스
///
/// 전역 인스턴스는 없다. 호스트 애플리케이션이 하나를 만들어
/// `Arc<EventBus>`로 각 컴포넌트에 주입한다.
///
/// ```ignore
/// let bus = Arc::new(EventBus::new());
/// let id = bus.subscribe(topics::PLAN_DISPATCHED, runner).await;
/// bus.publish(topics::PLAN_DISPATCHED, EventPayload::PlanDispatched(plan)).await;
/// bus.unsubscribe(id).await;
/// ```
pub struct EventBus {
    /// 설정
    config: EventBusConfig,

    /// 토픽별 리스너 (구독 순서 유지)
    topics: RwLock<HashMap<String, Vec<RegisteredListener>>>,

    /// 리스너 ID 카운터
    listener_counter: AtomicU64,

    /// 발행된 이벤트 수
    event_count: AtomicU64,
}

impl EventBus {
    /// 기본 설정으로 이벤트 버스 생성
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// 커스텀 설정으로 이벤트 버스 생성
    pub fn with_config(config: EventBusConfig) -> Self {
        Self {
            config,
            topics: RwLock::new(HashMap::new()),
            listener_counter: AtomicU64::new(0),
            event_count: AtomicU64::new(0),
        }
    }

    /// 리스너 등록
    pub async fn subscribe(
        &self,
        topic: impl Into<String>,
        listener: Arc<dyn EventListener>,
    ) -> ListenerId {
        let topic = topic.into();
        let id = ListenerId::new(self.listener_counter.fetch_add(1, Ordering::SeqCst));

        debug!(
            listener_name = listener.name(),
            listener_id = %id,
            topic = %topic,
            "Registering event listener"
        );

        let mut topics = self.topics.write().await;
        topics
            .entry(topic)
            .or_default()
            .push(RegisteredListener { id, listener });

        id
    }

    /// 채널 방식 구독 (스트림 소비자용)
    pub async fn subscribe_channel(
        &self,
        topic: impl Into<String>,
    ) -> (ListenerId, mpsc::UnboundedReceiver<BusEvent>) {
        let topic = topic.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        let listener = Arc::new(ChannelListener {
            name: format!("channel:{}", topic),
            sender,
        });
        let id = self.subscribe(topic, listener).await;
        (id, receiver)
    }

    /// 리스너 해제 (멱등: 이미 해제된 경우 false)
    pub async fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut topics = self.topics.write().await;

        let mut removed = false;
        topics.retain(|_, listeners| {
            let before = listeners.len();
            listeners.retain(|l| l.id != id);
            removed |= listeners.len() != before;
            !listeners.is_empty()
        });

        if removed {
            debug!(listener_id = %id, "Unregistered event listener");
        }

        removed
    }

    /// 이벤트 발행
    ///
    /// 발행 시점에 등록된 리스너들에게 구독 순서대로 전달하고,
    /// 정상 처리한 리스너 수를 반환한다.
    pub async fn publish(&self, topic: &str, payload: EventPayload) -> usize {
        let event_count = self.event_count.fetch_add(1, Ordering::SeqCst);
        let event = BusEvent::new(topic, payload);

        if self.config.debug_mode {
            trace!(
                event_id = %event.id,
                topic = %event.topic,
                kind = event.payload.kind(),
                "Publishing event #{}", event_count + 1
            );
        }

        // 스냅샷 후 락 해제 - 핸들러 안에서 subscribe/publish 해도 데드락 없음
        let listeners: Vec<RegisteredListener> = {
            let topics = self.topics.read().await;
            topics.get(topic).cloned().unwrap_or_default()
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for registered in listeners {
            if registered.listener.is_closed() {
                closed.push(registered.id);
                continue;
            }

            trace!(
                listener_id = %registered.id,
                listener_name = registered.listener.name(),
                topic = %topic,
                "Delivering event to listener"
            );

            let outcome = AssertUnwindSafe(registered.listener.on_event(&event))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(_)) if registered.listener.is_closed() => {
                    closed.push(registered.id);
                }
                Ok(Err(e)) => {
                    warn!(
                        listener_name = registered.listener.name(),
                        topic = %topic,
                        "Event listener failed: {}", e
                    );
                }
                Err(_) => {
                    error!(
                        listener_name = registered.listener.name(),
                        topic = %topic,
                        "Event listener panicked"
                    );
                }
            }
        }

        if !closed.is_empty() {
            self.remove_closed(topic, &closed).await;
        }

        delivered
    }

    /// 닫힌 리스너 제거 (토픽이 비면 토픽도 제거)
    async fn remove_closed(&self, topic: &str, closed: &[ListenerId]) {
        let mut topics = self.topics.write().await;
        if let Some(listeners) = topics.get_mut(topic) {
            listeners.retain(|l| !closed.contains(&l.id));
            if listeners.is_empty() {
                topics.remove(topic);
            }
        }
        trace!(topic = %topic, removed = closed.len(), "Removed closed listeners");
    }

    /// 토픽에 등록된 리스너 수
    pub async fn listener_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map(|l| l.len())
            .unwrap_or(0)
    }

    /// 총 발행된 이벤트 수
    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// 테스트
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ActionPlan, SummaryChunk};
    use crate::event::types::topics;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    struct TestListener {
        name: String,
        count: AtomicUsize,
    }

    impl TestListener {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                count: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventListener for TestListener {
        fn name(&self) -> &str {
            &self.name
        }

        async fn on_event(&self, _event: &BusEvent) -> Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// 호출 순서를 기록하는 리스너
    struct OrderListener {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventListener for OrderListener {
        fn name(&self) -> &str {
            &self.name
        }

        async fn on_event(&self, _event: &BusEvent) -> Result<()> {
            self.log.lock().unwrap().push(self.name.clone());
            Ok(())
        }
    }

    struct FailingListener;

    #[async_trait]
    impl EventListener for FailingListener {
        fn name(&self) -> &str {
            "failing"
        }

        async fn on_event(&self, _event: &BusEvent) -> Result<()> {
            Err(Error::Internal("handler exploded".to_string()))
        }
    }

    struct PanickingListener;

    #[async_trait]
    impl EventListener for PanickingListener {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn on_event(&self, _event: &BusEvent) -> Result<()> {
            panic!("listener bug");
        }
    }

    fn plan_payload() -> EventPayload {
        EventPayload::PlanDispatched(Arc::new(ActionPlan::new("/p", vec![])))
    }

    #[tokio::test]
    async fn test_event_bus_basic() {
        let bus = EventBus::new();

        let listener = Arc::new(TestListener::new("test"));
        let id = bus.subscribe(topics::PLAN_DISPATCHED, listener.clone()).await;

        assert_eq!(bus.listener_count(topics::PLAN_DISPATCHED).await, 1);

        let delivered = bus.publish(topics::PLAN_DISPATCHED, plan_payload()).await;
        assert_eq!(delivered, 1);
        assert_eq!(listener.call_count(), 1);

        // 리스너 해제 (멱등)
        assert!(bus.unsubscribe(id).await);
        assert!(!bus.unsubscribe(id).await);
        assert_eq!(bus.listener_count(topics::PLAN_DISPATCHED).await, 0);
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = EventBus::new();
        let plan_listener = Arc::new(TestListener::new("plan"));
        let report_listener = Arc::new(TestListener::new("report"));

        bus.subscribe(topics::PLAN_DISPATCHED, plan_listener.clone())
            .await;
        bus.subscribe(topics::REPORT_AGGREGATED, report_listener.clone())
            .await;

        bus.publish(topics::PLAN_DISPATCHED, plan_payload()).await;

        assert_eq!(plan_listener.call_count(), 1);
        assert_eq!(report_listener.call_count(), 0);
    }

    #[tokio::test]
    async fn test_delivery_in_subscription_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let listener = Arc::new(OrderListener {
                name: name.to_string(),
                log: Arc::clone(&log),
            });
            bus.subscribe(topics::PLAN_DISPATCHED, listener).await;
        }

        bus.publish(topics::PLAN_DISPATCHED, plan_payload()).await;

        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_failing_listeners_do_not_block_others() {
        let bus = EventBus::new();
        let healthy = Arc::new(TestListener::new("healthy"));

        bus.subscribe(topics::PLAN_DISPATCHED, Arc::new(FailingListener))
            .await;
        bus.subscribe(topics::PLAN_DISPATCHED, Arc::new(PanickingListener))
            .await;
        bus.subscribe(topics::PLAN_DISPATCHED, healthy.clone()).await;

        let delivered = bus.publish(topics::PLAN_DISPATCHED, plan_payload()).await;

        assert_eq!(delivered, 1);
        assert_eq!(healthy.call_count(), 1);
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_message() {
        let bus = EventBus::new();

        assert_eq!(bus.publish(topics::PLAN_DISPATCHED, plan_payload()).await, 0);

        let (_, mut rx) = bus.subscribe_channel(topics::PLAN_DISPATCHED).await;
        assert!(rx.try_recv().is_err());

        bus.publish(topics::PLAN_DISPATCHED, plan_payload()).await;
        assert!(rx.try_recv().is_ok());
        assert_eq!(bus.event_count(), 2);
    }

    #[tokio::test]
    async fn test_channel_preserves_fifo() {
        let bus = EventBus::new();
        let topic = topics::summary_stream("s1");
        let (_, mut rx) = bus.subscribe_channel(topic.clone()).await;

        for text in ["a", "b", "c"] {
            bus.publish(&topic, EventPayload::Summary(SummaryChunk::token("s1", text)))
                .await;
        }

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let EventPayload::Summary(chunk) = event.payload {
                seen.push(chunk);
            }
        }
        assert_eq!(
            seen,
            vec![
                SummaryChunk::token("s1", "a"),
                SummaryChunk::token("s1", "b"),
                SummaryChunk::token("s1", "c"),
            ]
        );
    }

    #[tokio::test]
    async fn test_dropped_channel_is_removed_on_publish() {
        let bus = EventBus::new();
        let (_, rx) = bus.subscribe_channel(topics::PLAN_DISPATCHED).await;
        let steady = Arc::new(TestListener::new("steady"));
        bus.subscribe(topics::PLAN_DISPATCHED, steady.clone()).await;
        assert_eq!(bus.listener_count(topics::PLAN_DISPATCHED).await, 2);

        drop(rx);

        assert_eq!(bus.publish(topics::PLAN_DISPATCHED, plan_payload()).await, 1);
        assert_eq!(bus.listener_count(topics::PLAN_DISPATCHED).await, 1);
        assert_eq!(steady.call_count(), 1);
    }

    #[tokio::test]
    async fn test_last_dropped_channel_removes_topic() {
        let bus = EventBus::new();
        let topic = topics::summary_stream("s1");
        let (id, rx) = bus.subscribe_channel(topic.clone()).await;
        drop(rx);

        assert_eq!(
            bus.publish(&topic, EventPayload::Summary(SummaryChunk::token("s1", "a")))
                .await,
            0
        );
        assert_eq!(bus.listener_count(&topic).await, 0);
        assert!(!bus.unsubscribe(id).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publish_and_subscription_churn() {
        const PUBLISHERS: usize = 8;
        const EVENTS_PER_PUBLISHER: usize = 50;
        const CHURNERS: usize = 4;

        let bus = Arc::new(EventBus::new());
        let steady = Arc::new(TestListener::new("steady"));
        let steady_id = bus.subscribe(topics::PLAN_DISPATCHED, steady.clone()).await;

        let mut handles = Vec::new();

        for _ in 0..CHURNERS {
            let bus = bus.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..EVENTS_PER_PUBLISHER {
                    let id = bus
                        .subscribe(topics::PLAN_DISPATCHED, Arc::new(TestListener::new("churn")))
                        .await;
                    let (channel_id, rx) = bus.subscribe_channel(topics::PLAN_DISPATCHED).await;
                    tokio::task::yield_now().await;
                    assert!(bus.unsubscribe(id).await);
                    if i % 2 == 0 {
                        bus.unsubscribe(channel_id).await;
                    } else {
                        // 수신자만 버리면 publish 시 정리된다
                        drop(rx);
                    }
                }
            }));
        }

        for _ in 0..PUBLISHERS {
            let bus = bus.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..EVENTS_PER_PUBLISHER {
                    let delivered = bus.publish(topics::PLAN_DISPATCHED, plan_payload()).await;
                    assert!(delivered >= 1);
                    tokio::task::yield_now().await;
                }
            }));
        }

        for result in futures::future::join_all(handles).await {
            result.unwrap();
        }

        assert_eq!(steady.call_count(), PUBLISHERS * EVENTS_PER_PUBLISHER);
        assert_eq!(bus.event_count(), (PUBLISHERS * EVENTS_PER_PUBLISHER) as u64);

        // 남은 닫힌 채널은 다음 publish에서 제거된다
        bus.publish(topics::PLAN_DISPATCHED, plan_payload()).await;
        assert_eq!(bus.listener_count(topics::PLAN_DISPATCHED).await, 1);
        assert!(bus.unsubscribe(steady_id).await);
        assert_eq!(bus.listener_count(topics::PLAN_DISPATCHED).await, 0);
    }
}
