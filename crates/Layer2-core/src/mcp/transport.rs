//! MCP Transport - 전송 계층 구현
//!
//! MCP 서버와의 통신을 위한 전송 계층
//! - Stdio: 로컬 프로세스와 stdin/stdout 통신 (JSON-RPC, 줄 단위)
//! - SSE: HTTP Server-Sent Events 수신 + POST 송신

use async_trait::async_trait;
use conductor_foundation::config::mask_secret;
use conductor_foundation::{CommandConfig, Error, NetworkConfig, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 기본 요청 타임아웃
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// SSE `endpoint` 이벤트 대기 시간
const ENDPOINT_WAIT: Duration = Duration::from_secs(5);

/// JSON-RPC 2.0 요청
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 응답
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// 응답을 결과 값으로 변환
    fn into_result(self) -> Result<Value> {
        if let Some(error) = self.error {
            return Err(Error::Internal(format!(
                "MCP error {}: {}",
                error.code, error.message
            )));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// JSON-RPC 에러
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC 알림 (응답 없음)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

/// 응답 대기 중인 요청들 (id -> response sender)
type PendingRequests = Arc<RwLock<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// 수신한 응답을 대기 중인 요청에 전달
async fn route_response(pending: &PendingRequests, raw: &str) {
    match serde_json::from_str::<JsonRpcResponse>(raw) {
        Ok(response) => {
            if let Some(id) = response.id {
                if let Some(sender) = pending.write().await.remove(&id) {
                    let _ = sender.send(response);
                }
            }
        }
        Err(e) => {
            debug!("Non-JSON-RPC line or parse error: {}", e);
        }
    }
}

/// 응답 대기 (타임아웃 시 대기 목록에서 제거)
async fn await_response(
    pending: &PendingRequests,
    id: u64,
    rx: oneshot::Receiver<JsonRpcResponse>,
    timeout: Duration,
) -> Result<Value> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(response)) => response.into_result(),
        Ok(Err(_)) => Err(Error::Internal("MCP response channel closed".to_string())),
        Err(_) => {
            pending.write().await.remove(&id);
            Err(Error::Timeout(format!(
                "MCP request {} timed out after {}s",
                id,
                timeout.as_secs()
            )))
        }
    }
}

/// MCP Transport trait
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// 요청 전송 및 응답 수신
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value>;

    /// 알림 전송 (응답 없음)
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()>;

    /// 연결 종료
    async fn close(&self) -> Result<()>;

    /// 연결 상태 확인
    fn is_connected(&self) -> bool;
}

// ============================================================================
// Stdio
// ============================================================================

/// Stdio Transport - 프로세스 기반 통신
///
/// 자식 프로세스는 `kill_on_drop`으로 생성되므로 transport가 drop되면 함께 종료된다.
pub struct StdioTransport {
    /// 요청 ID 카운터
    request_id: AtomicU64,

    /// 자식 프로세스
    child: Mutex<Option<Child>>,

    /// stdin writer
    stdin_tx: mpsc::Sender<String>,

    /// 대기 중인 요청들
    pending_requests: PendingRequests,

    /// 연결 상태
    connected: Arc<AtomicBool>,

    /// 요청 타임아웃
    request_timeout: Duration,
}

impl StdioTransport {
    /// 프로세스 시작 및 transport 생성
    pub async fn spawn(config: &CommandConfig, request_timeout: Duration) -> Result<Self> {
        info!("Spawning MCP process: {} {:?}", config.command, config.args);
        for (key, value) in &config.env {
            debug!(env_key = %key, env_value = %mask_secret(key, value), "MCP process env");
        }

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| {
            Error::Internal(format!(
                "Failed to spawn MCP process '{}': {}",
                config.command, e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Internal("Failed to capture stdin".to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("Failed to capture stdout".to_string()))?;

        // 요청 전송용 채널
        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(32);

        let pending_requests: PendingRequests = Arc::new(RwLock::new(HashMap::new()));
        let pending_for_reader = Arc::clone(&pending_requests);

        let connected = Arc::new(AtomicBool::new(true));
        let connected_for_writer = Arc::clone(&connected);
        let connected_for_reader = Arc::clone(&connected);

        // stdin writer task
        let mut stdin_writer = stdin;
        tokio::spawn(async move {
            while let Some(msg) = stdin_rx.recv().await {
                if let Err(e) = stdin_writer.write_all(msg.as_bytes()).await {
                    error!("Failed to write to stdin: {}", e);
                    connected_for_writer.store(false, Ordering::SeqCst);
                    break;
                }
                if let Err(e) = stdin_writer.flush().await {
                    error!("Failed to flush stdin: {}", e);
                    connected_for_writer.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });

        // stdout reader task
        let mut reader = BufReader::new(stdout).lines();
        tokio::spawn(async move {
            while let Ok(Some(line)) = reader.next_line().await {
                debug!("MCP stdout: {}", line);
                route_response(&pending_for_reader, &line).await;
            }
            connected_for_reader.store(false, Ordering::SeqCst);
            // 남은 대기 요청은 채널 종료로 실패 처리
            pending_for_reader.write().await.clear();
            info!("MCP stdout reader finished");
        });

        // stderr drain task (파이프가 가득 차서 프로세스가 멈추지 않도록)
        if let Some(stderr) = child.stderr.take() {
            let mut lines = BufReader::new(stderr).lines();
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("MCP stderr: {}", line);
                }
            });
        }

        Ok(Self {
            request_id: AtomicU64::new(1),
            child: Mutex::new(Some(child)),
            stdin_tx,
            pending_requests,
            connected,
            request_timeout,
        })
    }

    /// 다음 요청 ID 생성
    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn send_line(&self, msg: String) -> Result<()> {
        self.stdin_tx
            .send(format!("{}\n", msg))
            .await
            .map_err(|e| Error::Internal(format!("Failed to send message: {}", e)))
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if !self.is_connected() {
            return Err(Error::Internal("MCP transport not connected".to_string()));
        }

        let id = self.next_id();
        let request = JsonRpcRequest::new(id, method, params);

        // 응답 수신 채널 생성
        let (tx, rx) = oneshot::channel();
        self.pending_requests.write().await.insert(id, tx);

        let msg = serde_json::to_string(&request)?;
        debug!("Sending MCP request: {}", msg);

        if let Err(e) = self.send_line(msg).await {
            self.pending_requests.write().await.remove(&id);
            return Err(e);
        }

        await_response(&self.pending_requests, id, rx, self.request_timeout).await
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Internal("MCP transport not connected".to_string()));
        }

        let msg = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        self.send_line(msg).await
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);

        // 프로세스 종료
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill MCP process: {}", e);
            }
        }

        self.pending_requests.write().await.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SSE
// ============================================================================

/// SSE Transport - HTTP Server-Sent Events 기반 통신
///
/// 서버가 보낸 `endpoint` 이벤트로 POST 주소를 받는다.
/// 받지 못하면 `<url without /sse>/messages`를 사용한다.
pub struct SseTransport {
    /// 요청 ID 카운터
    request_id: AtomicU64,

    /// HTTP 클라이언트 (커스텀 헤더 포함)
    client: reqwest::Client,

    /// 대기 중인 요청들
    pending_requests: PendingRequests,

    /// 연결 상태
    connected: Arc<AtomicBool>,

    /// 메시지 엔드포인트 URL
    message_url: Arc<parking_lot::RwLock<String>>,

    /// 요청 타임아웃
    request_timeout: Duration,

    /// 수신 태스크 종료 토큰
    shutdown: CancellationToken,
}

impl SseTransport {
    /// SSE 연결 생성
    pub async fn connect(config: &NetworkConfig, request_timeout: Duration) -> Result<Self> {
        use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
        use reqwest_eventsource::EventSource;

        info!("Connecting to MCP SSE server: {}", config.url);

        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            debug!(header = %key, value = %mask_secret(key, value), "MCP SSE header");
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| Error::Config(format!("Invalid header name '{}': {}", key, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Config(format!("Invalid header value for '{}': {}", key, e)))?;
            headers.insert(name, value);
        }

        // SSE 스트림은 오래 유지되므로 전체 타임아웃 대신 연결 타임아웃만 건다
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| Error::Http(format!("Failed to create HTTP client: {}", e)))?;

        let event_source = EventSource::new(client.get(&config.url))
            .map_err(|e| Error::Http(format!("Failed to create EventSource: {}", e)))?;

        let pending_requests: PendingRequests = Arc::new(RwLock::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let message_url = Arc::new(parking_lot::RwLock::new(fallback_message_url(&config.url)));
        let shutdown = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();

        tokio::spawn(Self::sse_listener(
            event_source,
            config.url.clone(),
            Arc::clone(&pending_requests),
            Arc::clone(&connected),
            Arc::clone(&message_url),
            shutdown.clone(),
            ready_tx,
        ));

        match tokio::time::timeout(ENDPOINT_WAIT, ready_rx).await {
            Ok(Ok(Ok(endpoint))) => debug!("MCP SSE endpoint: {}", endpoint),
            Ok(Ok(Err(e))) => {
                shutdown.cancel();
                return Err(e);
            }
            Ok(Err(_)) => {
                shutdown.cancel();
                return Err(Error::Http("SSE stream closed before ready".to_string()));
            }
            Err(_) => {
                debug!(
                    "No endpoint event from {}, using {}",
                    config.url,
                    message_url.read()
                );
            }
        }

        Ok(Self {
            request_id: AtomicU64::new(1),
            client,
            pending_requests,
            connected,
            message_url,
            request_timeout,
            shutdown,
        })
    }

    /// SSE 이벤트 수신 루프
    async fn sse_listener(
        mut event_source: reqwest_eventsource::EventSource,
        base_url: String,
        pending: PendingRequests,
        connected: Arc<AtomicBool>,
        message_url: Arc<parking_lot::RwLock<String>>,
        shutdown: CancellationToken,
        ready: oneshot::Sender<Result<String>>,
    ) {
        use reqwest_eventsource::Event;

        let mut ready = Some(ready);

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = event_source.next() => event,
            };
            let Some(event) = event else { break };

            match event {
                Ok(Event::Open) => {
                    info!("SSE connection opened");
                }
                Ok(Event::Message(message)) if message.event == "endpoint" => {
                    let endpoint = resolve_endpoint(&base_url, message.data.trim());
                    *message_url.write() = endpoint.clone();
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(Ok(endpoint));
                    }
                }
                Ok(Event::Message(message)) => {
                    debug!("SSE message: {}", message.data);
                    route_response(&pending, &message.data).await;
                }
                Err(e) => {
                    error!("SSE error: {}", e);
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(Err(Error::Http(e.to_string())));
                    }
                    break;
                }
            }
        }

        event_source.close();
        connected.store(false, Ordering::SeqCst);
        pending.write().await.clear();
        info!("SSE connection closed");
    }

    /// 다음 요청 ID 생성
    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn post<T: Serialize + ?Sized>(&self, body: &T) -> Result<()> {
        let url = self.message_url.read().clone();
        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Http(format!("Failed to send message: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Http(format!("HTTP error: {}", response.status())));
        }
        Ok(())
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if !self.is_connected() {
            return Err(Error::Internal(
                "MCP SSE transport not connected".to_string(),
            ));
        }

        let id = self.next_id();
        let request = JsonRpcRequest::new(id, method, params);

        let (tx, rx) = oneshot::channel();
        self.pending_requests.write().await.insert(id, tx);

        // POST로 보내고 응답은 SSE로 받는다
        if let Err(e) = self.post(&request).await {
            self.pending_requests.write().await.remove(&id);
            return Err(e);
        }

        await_response(&self.pending_requests, id, rx, self.request_timeout).await
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Internal(
                "MCP SSE transport not connected".to_string(),
            ));
        }

        self.post(&JsonRpcNotification::new(method, params)).await
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// `/sse`를 떼고 `/messages`를 붙인 기본 POST 주소
fn fallback_message_url(url: &str) -> String {
    format!(
        "{}/messages",
        url.trim_end_matches('/').trim_end_matches("/sse")
    )
}

/// `endpoint` 이벤트 값(상대/절대 경로)을 절대 URL로 변환
fn resolve_endpoint(base_url: &str, endpoint: &str) -> String {
    reqwest::Url::parse(base_url)
        .and_then(|base| base.join(endpoint))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| endpoint.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rpc_request() {
        let request =
            JsonRpcRequest::new(1, "tools/list", Some(serde_json::json!({"cursor": "x"})));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 1);
        assert_eq!(value["method"], "tools/list");

        let notification = JsonRpcNotification::new("notifications/initialized", None);
        let value = serde_json::to_value(&notification).unwrap();
        assert!(value.get("params").is_none());
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_response_into_result() {
        let ok: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#).unwrap();
        assert!(ok.into_result().unwrap().get("tools").is_some());

        let err: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        let message = err.into_result().unwrap_err().to_string();
        assert!(message.contains("-32601"));
    }

    #[test]
    fn test_message_urls() {
        assert_eq!(
            fallback_message_url("http://localhost:9000/sse"),
            "http://localhost:9000/messages"
        );
        assert_eq!(
            resolve_endpoint("http://localhost:9000/sse", "/messages?session_id=42"),
            "http://localhost:9000/messages?session_id=42"
        );
        assert_eq!(
            resolve_endpoint("http://localhost:9000/sse", "http://other:1/m"),
            "http://other:1/m"
        );
    }

    #[tokio::test]
    async fn test_pending_request_routing() {
        let pending: PendingRequests = Arc::new(RwLock::new(HashMap::new()));
        let (tx, rx) = oneshot::channel();
        pending.write().await.insert(7, tx);

        route_response(&pending, r#"{"jsonrpc":"2.0","id":7,"result":"pong"}"#).await;
        let value = await_response(&pending, 7, rx, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(value, Value::String("pong".into()));
        assert!(pending.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_request_timeout_clears_pending() {
        let pending: PendingRequests = Arc::new(RwLock::new(HashMap::new()));
        let (tx, rx) = oneshot::channel();
        pending.write().await.insert(3, tx);

        let err = await_response(&pending, 3, rx, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(pending.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_missing_command_fails() {
        let config = CommandConfig {
            command: "conductor-definitely-missing-binary".to_string(),
            args: vec![],
            env: HashMap::new(),
            cwd: None,
            enabled: true,
            timeout: None,
        };
        assert!(StdioTransport::spawn(&config, DEFAULT_REQUEST_TIMEOUT)
            .await
            .is_err());
    }
}
