//! Capability Aggregator - 여러 tool provider를 연결하고 operation을 모은다
//!
//! ## 동작
//!
//! 1. 활성화된 provider 전부에 동시에 연결 (provider별 타임아웃, 취소 토큰과 경합)
//! 2. 성공한 provider의 operation을 provider 이름 순서로 새 registry에 등록
//! 3. 모든 시도가 끝난 뒤 registry를 `Arc` 교체로 공개
//! 4. 이전 세대 연결 종료
//!
//! 한 provider의 실패는 그 provider에서 끝난다. 나머지는 계속 진행되고
//! 최종 상태만 `Error`가 된다.

use super::handle::{OperationDescriptor, ProviderConnector, ProviderHandle};
use super::registry::CapabilityRegistry;
use conductor_foundation::{Error, Result, ToolProviderConfig, TransportKind};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// provider별 연결+조회 기본 타임아웃
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Status
// ============================================================================

/// Aggregator 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregatorState {
    /// 아직 aggregate 전이거나 close 이후
    Idle,
    /// 연결 진행 중
    Initializing,
    /// 모든 provider 연결 성공
    Done,
    /// 하나 이상의 provider 실패 (나머지는 사용 가능)
    Error,
}

impl std::fmt::Display for AggregatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Initializing => write!(f, "initializing"),
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Aggregator 상태 스냅샷
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatorStatus {
    pub state: AggregatorState,
    pub connected_providers: usize,
}

impl AggregatorStatus {
    fn idle() -> Self {
        Self {
            state: AggregatorState::Idle,
            connected_providers: 0,
        }
    }
}

/// 개별 provider 연결 상태
///
/// `Pending → Connected → Closed` 또는 `Pending → Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum ConnectionState {
    Pending,
    Connected,
    Failed(String),
    Closed,
}

/// provider 연결 스냅샷 (UI/로그용)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolProviderConnection {
    pub name: String,
    pub transport: TransportKind,
    pub state: ConnectionState,
    /// 등록된 namespace 키 목록
    pub operations: Vec<String>,
}

impl ToolProviderConnection {
    fn pending(name: &str, transport: TransportKind) -> Self {
        Self {
            name: name.to_string(),
            transport,
            state: ConnectionState::Pending,
            operations: Vec::new(),
        }
    }

    fn mark_connected(&mut self, operations: Vec<String>) {
        self.state = ConnectionState::Connected;
        self.operations = operations;
    }

    fn mark_failed(&mut self, reason: String) {
        self.state = ConnectionState::Failed(reason);
    }

    fn mark_closed(&mut self) {
        if self.state == ConnectionState::Connected {
            self.state = ConnectionState::Closed;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

// ============================================================================
// Aggregator
// ============================================================================

/// 현재 세대의 살아있는 연결
struct LiveProvider {
    name: String,
    handle: Arc<dyn ProviderHandle>,
}

type AttemptOutcome = Result<(Arc<dyn ProviderHandle>, Vec<OperationDescriptor>)>;

/// Capability Aggregator
///
/// ```ignore
/// let aggregator = CapabilityAggregator::new(Arc::new(McpConnector::default()));
/// let status = aggregator.aggregate(ProviderConfigs::load(&project_dir)?).await;
/// let result = aggregator.registry().call("github_create_issue", args).await?;
/// aggregator.close().await;
/// ```
pub struct CapabilityAggregator {
    connector: Arc<dyn ProviderConnector>,

    /// provider 설정에 타임아웃이 없을 때 사용
    default_timeout: Duration,

    /// 상태 (동기 읽기)
    status: RwLock<AggregatorStatus>,

    /// 현재 공개된 registry
    registry: RwLock<Arc<CapabilityRegistry>>,

    /// 연결 스냅샷
    connections: RwLock<Vec<ToolProviderConnection>>,

    /// 닫아야 할 연결들
    live: Mutex<Vec<LiveProvider>>,

    /// 진행 중인 시도 취소 토큰 (close마다 새 세대)
    cancel: Mutex<CancellationToken>,

    /// aggregate/close 직렬화
    run_lock: tokio::sync::Mutex<()>,
}

impl CapabilityAggregator {
    pub fn new(connector: Arc<dyn ProviderConnector>) -> Self {
        Self {
            connector,
            default_timeout: DEFAULT_CONNECT_TIMEOUT,
            status: RwLock::new(AggregatorStatus::idle()),
            registry: RwLock::new(Arc::new(CapabilityRegistry::new())),
            connections: RwLock::new(Vec::new()),
            live: Mutex::new(Vec::new()),
            cancel: Mutex::new(CancellationToken::new()),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// MCP 기본 connector 사용
    pub fn mcp() -> Self {
        Self::new(Arc::new(crate::mcp::McpConnector::default()))
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// 현재 상태 (대기 없음, 부작용 없음)
    pub fn status(&self) -> AggregatorStatus {
        *self.status.read()
    }

    /// 현재 registry
    pub fn registry(&self) -> Arc<CapabilityRegistry> {
        Arc::clone(&self.registry.read())
    }

    /// 연결 스냅샷
    pub fn connections(&self) -> Vec<ToolProviderConnection> {
        self.connections.read().clone()
    }

    /// provider 연결 및 operation 집계
    ///
    /// 같은 이름이 여러 번 나오면 마지막 것을 사용한다.
    pub async fn aggregate<I>(&self, providers: I) -> AggregatorStatus
    where
        I: IntoIterator<Item = (String, ToolProviderConfig)>,
    {
        let _run = self.run_lock.lock().await;

        let mut configs = BTreeMap::new();
        for (name, config) in providers {
            if configs.insert(name.clone(), config).is_some() {
                warn!(provider = %name, "Duplicate tool provider name, later definition wins");
            }
        }

        let mut enabled = Vec::with_capacity(configs.len());
        for (name, config) in configs {
            if config.enabled() {
                enabled.push((name, config));
            } else {
                debug!(provider = %name, "Tool provider disabled, skipping");
            }
        }

        let token = self.cancel.lock().clone();
        *self.status.write() = AggregatorStatus {
            state: AggregatorState::Initializing,
            connected_providers: 0,
        };
        *self.connections.write() = enabled
            .iter()
            .map(|(name, config)| ToolProviderConnection::pending(name, config.kind()))
            .collect();

        info!("Aggregating {} tool provider(s)", enabled.len());

        let attempts = enabled.iter().map(|(name, config)| {
            let timeout = config.timeout().unwrap_or(self.default_timeout);
            self.attempt(name, config, timeout, &token)
        });
        let outcomes = join_all(attempts).await;

        if token.is_cancelled() {
            let abandoned: Vec<LiveProvider> = enabled
                .iter()
                .zip(outcomes)
                .filter_map(|((name, _), outcome)| {
                    outcome.ok().map(|(handle, _)| LiveProvider {
                        name: name.clone(),
                        handle,
                    })
                })
                .collect();
            close_providers(abandoned).await;
            self.connections.write().clear();
            *self.status.write() = AggregatorStatus::idle();
            info!("Aggregation cancelled");
            return AggregatorStatus::idle();
        }

        let mut registry = CapabilityRegistry::new();
        let mut connections = Vec::with_capacity(enabled.len());
        let mut live = Vec::new();
        let mut failures = 0usize;

        for ((name, config), outcome) in enabled.iter().zip(outcomes) {
            let mut connection = ToolProviderConnection::pending(name, config.kind());
            match outcome {
                Ok((handle, operations)) => {
                    let keys = registry.register_provider(name, &handle, operations);
                    info!(
                        provider = %name,
                        transport = %handle.transport_kind(),
                        "Tool provider connected with {} operation(s)",
                        keys.len()
                    );
                    connection.mark_connected(keys);
                    live.push(LiveProvider {
                        name: name.clone(),
                        handle,
                    });
                }
                Err(e) => {
                    warn!(provider = %name, "Tool provider failed: {}", e);
                    connection.mark_failed(e.to_string());
                    failures += 1;
                }
            }
            connections.push(connection);
        }

        let status = AggregatorStatus {
            state: if failures == 0 {
                AggregatorState::Done
            } else {
                AggregatorState::Error
            },
            connected_providers: live.len(),
        };

        // 새 세대 공개 후 이전 세대 정리
        *self.registry.write() = Arc::new(registry);
        *self.connections.write() = connections;
        let previous = std::mem::replace(&mut *self.live.lock(), live);
        *self.status.write() = status;

        close_providers(previous).await;

        info!(
            state = %status.state,
            "Aggregation finished: {} connected, {} failed",
            status.connected_providers,
            failures
        );
        status
    }

    /// 단일 provider 연결 시도
    ///
    /// 타임아웃/취소로 버려진 핸들은 drop 시 정리된다 (stdio는 kill_on_drop).
    async fn attempt(
        &self,
        name: &str,
        config: &ToolProviderConfig,
        timeout: Duration,
        token: &CancellationToken,
    ) -> AttemptOutcome {
        info!(provider = %name, transport = %config.kind(), "Connecting to tool provider");

        let work = async {
            let handle = self.connector.connect(name, config).await?;
            match handle.list_operations().await {
                Ok(operations) => Ok((handle, operations)),
                Err(e) => {
                    if let Err(close_err) = handle.close().await {
                        debug!(provider = %name, "Close after failed fetch: {}", close_err);
                    }
                    Err(e)
                }
            }
        };

        tokio::select! {
            _ = token.cancelled() => Err(Error::Cancelled),
            outcome = tokio::time::timeout(timeout, work) => match outcome {
                Ok(result) => result,
                Err(_) => Err(Error::provider_connection(
                    name,
                    format!("timed out after {:?}", timeout),
                )),
            },
        }
    }

    /// 진행 중인 시도 취소 + 모든 연결 종료 + 상태 초기화
    ///
    /// 닫힌 연결들의 최종 스냅샷을 반환한다. 이미 닫혀 있으면 빈 목록.
    pub async fn close(&self) -> Vec<ToolProviderConnection> {
        {
            let mut token = self.cancel.lock();
            token.cancel();
            *token = CancellationToken::new();
        }

        let _run = self.run_lock.lock().await;

        let live = std::mem::take(&mut *self.live.lock());
        let mut connections = std::mem::take(&mut *self.connections.write());
        *self.registry.write() = Arc::new(CapabilityRegistry::new());
        *self.status.write() = AggregatorStatus::idle();

        if live.is_empty() && connections.is_empty() {
            return Vec::new();
        }

        let count = live.len();
        close_providers(live).await;
        for connection in &mut connections {
            connection.mark_closed();
        }

        info!("Capability aggregator closed ({} provider(s))", count);
        connections
    }
}

/// 연결들을 동시에 종료 (실패는 로그만)
async fn close_providers(providers: Vec<LiveProvider>) {
    let closes = providers.iter().map(|provider| async move {
        if let Err(e) = provider.handle.close().await {
            warn!(provider = %provider.name, "Failed to close tool provider: {}", e);
        }
    });
    join_all(closes).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 가짜 provider 동작 (config의 command 값으로 선택)
    #[derive(Clone)]
    enum Behavior {
        Ok(Vec<&'static str>),
        FailConnect,
        FailList,
        Hang,
    }

    struct FakeHandle {
        operations: Vec<&'static str>,
        fail_list: bool,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProviderHandle for FakeHandle {
        fn transport_kind(&self) -> TransportKind {
            TransportKind::Subprocess
        }

        async fn list_operations(&self) -> Result<Vec<OperationDescriptor>> {
            if self.fail_list {
                return Err(Error::provider_fetch("fake", "tools/list exploded"));
            }
            Ok(self
                .operations
                .iter()
                .map(|n| OperationDescriptor::new(*n))
                .collect())
        }

        async fn call(&self, operation: &str, arguments: Value) -> Result<Value> {
            Ok(json!({ "op": operation, "args": arguments }))
        }

        async fn close(&self) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeConnector {
        behaviors: HashMap<&'static str, Behavior>,
        closed: Arc<AtomicUsize>,
    }

    impl FakeConnector {
        fn new(behaviors: Vec<(&'static str, Behavior)>) -> Arc<Self> {
            Arc::new(Self {
                behaviors: behaviors.into_iter().collect(),
                closed: Arc::new(AtomicUsize::new(0)),
            })
        }

        fn closed(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }

        fn handle(&self, operations: Vec<&'static str>, fail_list: bool) -> Arc<dyn ProviderHandle> {
            Arc::new(FakeHandle {
                operations,
                fail_list,
                closed: Arc::clone(&self.closed),
            })
        }
    }

    #[async_trait]
    impl ProviderConnector for FakeConnector {
        async fn connect(
            &self,
            name: &str,
            config: &ToolProviderConfig,
        ) -> Result<Arc<dyn ProviderHandle>> {
            let key = match config {
                ToolProviderConfig::Command(c) => c.command.as_str(),
                ToolProviderConfig::Network(n) => n.url.as_str(),
            };
            match self.behaviors.get(key).cloned() {
                Some(Behavior::Ok(ops)) => Ok(self.handle(ops, false)),
                Some(Behavior::FailList) => Ok(self.handle(vec![], true)),
                Some(Behavior::FailConnect) | None => {
                    Err(Error::provider_connection(name, "spawn failed"))
                }
                Some(Behavior::Hang) => futures::future::pending().await,
            }
        }
    }

    fn cmd(key: &str) -> ToolProviderConfig {
        ToolProviderConfig::command(key, vec![])
    }

    fn providers(list: &[(&str, &str)]) -> Vec<(String, ToolProviderConfig)> {
        list.iter()
            .map(|(name, key)| (name.to_string(), cmd(key)))
            .collect()
    }

    #[tokio::test]
    async fn test_failing_provider_is_isolated() {
        let connector = FakeConnector::new(vec![
            ("good", Behavior::Ok(vec!["read", "write"])),
            ("bad", Behavior::FailConnect),
        ]);
        let aggregator = CapabilityAggregator::new(connector.clone());

        let status = aggregator
            .aggregate(providers(&[("a", "good"), ("b", "bad")]))
            .await;

        assert_eq!(status.state, AggregatorState::Error);
        assert_eq!(status.connected_providers, 1);
        assert_eq!(aggregator.registry().names(), vec!["a_read", "a_write"]);

        let connections = aggregator.connections();
        assert!(connections[0].is_connected());
        assert!(matches!(connections[1].state, ConnectionState::Failed(_)));
    }

    #[tokio::test]
    async fn test_empty_config_is_done() {
        let aggregator = CapabilityAggregator::new(FakeConnector::new(vec![]));
        assert_eq!(aggregator.status().state, AggregatorState::Idle);

        let status = aggregator.aggregate(Vec::new()).await;
        assert_eq!(status.state, AggregatorState::Done);
        assert_eq!(status.connected_providers, 0);
        assert!(aggregator.registry().is_empty());
    }

    #[tokio::test]
    async fn test_status_is_side_effect_free() {
        let connector = FakeConnector::new(vec![("good", Behavior::Ok(vec!["x"]))]);
        let aggregator = CapabilityAggregator::new(connector);
        aggregator.aggregate(providers(&[("a", "good")])).await;

        let first = aggregator.status();
        let second = aggregator.status();
        assert_eq!(first, second);
        assert_eq!(first.state, AggregatorState::Done);
    }

    #[tokio::test]
    async fn test_failed_fetch_closes_connection() {
        let connector = FakeConnector::new(vec![("flaky", Behavior::FailList)]);
        let aggregator = CapabilityAggregator::new(connector.clone());

        let status = aggregator.aggregate(providers(&[("a", "flaky")])).await;

        assert_eq!(status.state, AggregatorState::Error);
        assert_eq!(status.connected_providers, 0);
        assert_eq!(connector.closed(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_name_last_wins() {
        let connector = FakeConnector::new(vec![
            ("good", Behavior::Ok(vec!["op"])),
            ("bad", Behavior::FailConnect),
        ]);
        let aggregator = CapabilityAggregator::new(connector);

        let status = aggregator
            .aggregate(providers(&[("a", "bad"), ("a", "good")]))
            .await;

        assert_eq!(status.state, AggregatorState::Done);
        assert_eq!(aggregator.connections().len(), 1);
        assert!(aggregator.registry().contains("a_op"));
    }

    #[tokio::test]
    async fn test_namespace_collision_keeps_first_provider() {
        let connector = FakeConnector::new(vec![
            ("first", Behavior::Ok(vec!["b_c"])),
            ("second", Behavior::Ok(vec!["c"])),
        ]);
        let aggregator = CapabilityAggregator::new(connector);

        let status = aggregator
            .aggregate(providers(&[("a_b", "second"), ("a", "first")]))
            .await;

        assert_eq!(status.state, AggregatorState::Done);
        let registry = aggregator.registry();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a_b_c").unwrap().provider, "a");
    }

    #[tokio::test]
    async fn test_disabled_provider_is_skipped() {
        let connector = FakeConnector::new(vec![("good", Behavior::Ok(vec!["x"]))]);
        let aggregator = CapabilityAggregator::new(connector);

        let status = aggregator
            .aggregate(vec![
                ("a".to_string(), cmd("good")),
                ("b".to_string(), cmd("bad").disabled()),
            ])
            .await;

        assert_eq!(status.state, AggregatorState::Done);
        assert_eq!(aggregator.connections().len(), 1);
    }

    #[tokio::test]
    async fn test_provider_timeout_is_isolated() {
        let connector = FakeConnector::new(vec![
            ("slow", Behavior::Hang),
            ("good", Behavior::Ok(vec!["x"])),
        ]);
        let aggregator = CapabilityAggregator::new(connector);

        let status = aggregator
            .aggregate(vec![
                ("a".to_string(), cmd("good")),
                (
                    "b".to_string(),
                    cmd("slow").with_timeout(Duration::from_millis(20)),
                ),
            ])
            .await;

        assert_eq!(status.state, AggregatorState::Error);
        assert_eq!(status.connected_providers, 1);
        match &aggregator.connections()[1].state {
            ConnectionState::Failed(reason) => assert!(reason.contains("timed out")),
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reaggregate_closes_previous_generation() {
        let connector = FakeConnector::new(vec![
            ("one", Behavior::Ok(vec!["x"])),
            ("two", Behavior::Ok(vec!["y"])),
        ]);
        let aggregator = CapabilityAggregator::new(connector.clone());

        aggregator.aggregate(providers(&[("a", "one")])).await;
        assert_eq!(connector.closed(), 0);

        aggregator.aggregate(providers(&[("b", "two")])).await;
        assert_eq!(connector.closed(), 1);
        assert_eq!(aggregator.registry().names(), vec!["b_y"]);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let connector = FakeConnector::new(vec![("good", Behavior::Ok(vec!["x"]))]);
        let aggregator = CapabilityAggregator::new(connector.clone());

        // aggregate 전 close는 no-op
        assert!(aggregator.close().await.is_empty());

        aggregator.aggregate(providers(&[("a", "good")])).await;
        let closed = aggregator.close().await;
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].state, ConnectionState::Closed);
        assert_eq!(connector.closed(), 1);
        assert_eq!(aggregator.status().state, AggregatorState::Idle);
        assert!(aggregator.registry().is_empty());

        assert!(aggregator.close().await.is_empty());
        assert_eq!(connector.closed(), 1);
    }

    #[tokio::test]
    async fn test_close_cancels_inflight_aggregation() {
        let connector = FakeConnector::new(vec![
            ("slow", Behavior::Hang),
            ("good", Behavior::Ok(vec!["x"])),
        ]);
        let aggregator = Arc::new(CapabilityAggregator::new(connector.clone()));

        let task = {
            let aggregator = Arc::clone(&aggregator);
            tokio::spawn(async move {
                aggregator
                    .aggregate(providers(&[("a", "good"), ("b", "slow")]))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(aggregator.status().state, AggregatorState::Initializing);

        aggregator.close().await;
        let status = task.await.unwrap();

        assert_eq!(status.state, AggregatorState::Idle);
        assert_eq!(aggregator.status().state, AggregatorState::Idle);
        assert!(aggregator.registry().is_empty());
        // 먼저 성공한 "a"도 닫힌다
        assert_eq!(connector.closed(), 1);
    }

    #[tokio::test]
    async fn test_registry_call_routes_to_provider() {
        let connector = FakeConnector::new(vec![("good", Behavior::Ok(vec!["search"]))]);
        let aggregator = CapabilityAggregator::new(connector);
        aggregator.aggregate(providers(&[("web", "good")])).await;

        let result = aggregator
            .registry()
            .call("web_search", json!({"q": "rust"}))
            .await
            .unwrap();
        assert_eq!(result["op"], "search");
    }
}
