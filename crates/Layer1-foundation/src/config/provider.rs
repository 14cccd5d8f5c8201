//! Tool provider 설정
//!
//! 설정 파일의 raw 항목은 로드 시점에 한 번만 `ToolProviderConfig`
//! (Command | Network)로 해석된다. 이후 코드는 필드 존재 여부를 다시
//! 검사하지 않는다.
//!
//! Claude Code 호환 형식:
//! ```json
//! {
//!   "mcpServers": {
//!     "filesystem": {
//!       "command": "npx",
//!       "args": ["-y", "@modelcontextprotocol/server-filesystem", "/path"],
//!       "env": { "KEY": "value" }
//!     },
//!     "search": {
//!       "type": "sse",
//!       "url": "https://tools.example.com/sse",
//!       "headers": { "Authorization": "Bearer ${SEARCH_TOKEN}" }
//!     }
//!   }
//! }
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 글로벌 설정 파일명 (`~/.conductor/mcp.json`)
pub const MCP_FILE: &str = "mcp.json";

/// 프로젝트 설정 파일명
pub const PROJECT_MCP_FILE: &str = ".mcp.json";

// ============================================================================
// Raw (파일 형식)
// ============================================================================

/// 명시적 전송 타입 힌트
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportHint {
    #[serde(alias = "command")]
    Stdio,
    #[serde(alias = "http", alias = "network", alias = "url")]
    Sse,
}

/// 파일에 적힌 그대로의 provider 항목
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProviderEntry {
    /// 전송 타입 (없으면 필드 모양으로 판단)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportHint>,

    /// 활성화 여부
    #[serde(default = "default_true")]
    pub enabled: bool,

    // === command 전용 ===
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    /// 환경 변수 (${VAR} 형식 지원)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    // === network 전용 ===
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    // === 공통 ===
    /// 연결 타임아웃 (초)
    #[serde(default, alias = "timeout_secs", skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl RawProviderEntry {
    /// 전송 타입 해석. 어느 쪽에도 맞지 않으면 None.
    pub fn resolve(&self) -> Option<ToolProviderConfig> {
        let timeout = self.timeout_secs.map(Duration::from_secs);

        let as_command = |command: &String| {
            ToolProviderConfig::Command(CommandConfig {
                command: expand_env_var(command),
                args: self.args.iter().map(|a| expand_env_var(a)).collect(),
                env: expand_map(&self.env),
                cwd: self.cwd.clone(),
                enabled: self.enabled,
                timeout,
            })
        };
        let as_network = |url: &String| {
            ToolProviderConfig::Network(NetworkConfig {
                url: expand_env_var(url),
                headers: expand_map(&self.headers),
                enabled: self.enabled,
                timeout,
            })
        };

        match self.transport {
            Some(TransportHint::Stdio) => self.command.as_ref().map(as_command),
            Some(TransportHint::Sse) => self.url.as_ref().map(as_network),
            None => match (&self.command, &self.url) {
                (Some(command), _) => Some(as_command(command)),
                (None, Some(url)) => Some(as_network(url)),
                (None, None) => None,
            },
        }
    }
}

// ============================================================================
// Resolved (tagged)
// ============================================================================

/// 런타임 전송 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Subprocess,
    Network,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subprocess => write!(f, "subprocess"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// 서브프로세스 기반 provider
#[derive(Debug, Clone, PartialEq)]
pub struct CommandConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub enabled: bool,
    pub timeout: Option<Duration>,
}

/// 네트워크 기반 provider
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub enabled: bool,
    pub timeout: Option<Duration>,
}

/// 해석된 provider 설정 (로드 후 불변)
#[derive(Debug, Clone, PartialEq)]
pub enum ToolProviderConfig {
    Command(CommandConfig),
    Network(NetworkConfig),
}

impl ToolProviderConfig {
    /// command provider 생성
    pub fn command(command: impl Into<String>, args: Vec<String>) -> Self {
        Self::Command(CommandConfig {
            command: command.into(),
            args,
            env: HashMap::new(),
            cwd: None,
            enabled: true,
            timeout: None,
        })
    }

    /// network provider 생성
    pub fn network(url: impl Into<String>) -> Self {
        Self::Network(NetworkConfig {
            url: url.into(),
            headers: HashMap::new(),
            enabled: true,
            timeout: None,
        })
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Command(_) => TransportKind::Subprocess,
            Self::Network(_) => TransportKind::Network,
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            Self::Command(c) => c.enabled,
            Self::Network(n) => n.enabled,
        }
    }

    /// provider별 타임아웃 (없으면 aggregator 기본값 사용)
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            Self::Command(c) => c.timeout,
            Self::Network(n) => n.timeout,
        }
    }

    // === Builder methods ===

    pub fn disabled(mut self) -> Self {
        match &mut self {
            Self::Command(c) => c.enabled = false,
            Self::Network(n) => n.enabled = false,
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        match &mut self {
            Self::Command(c) => c.timeout = Some(timeout),
            Self::Network(n) => n.timeout = Some(timeout),
        }
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Self::Command(c) = &mut self {
            c.env.insert(key.into(), value.into());
        }
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Self::Network(n) = &mut self {
            n.headers.insert(key.into(), value.into());
        }
        self
    }
}

// ============================================================================
// Config file
// ============================================================================

/// provider 설정 파일 구조 (`mcpServers` 또는 `servers`)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProviderConfigFile {
    #[serde(default, rename = "mcpServers", alias = "servers")]
    pub servers: BTreeMap<String, RawProviderEntry>,
}

/// 해석된 provider 설정 모음 (이름 -> 설정)
#[derive(Debug, Clone, Default)]
pub struct ProviderConfigs {
    servers: BTreeMap<String, ToolProviderConfig>,
}

impl ProviderConfigs {
    pub fn new() -> Self {
        Self::default()
    }

    /// 설정 추가. 같은 이름이 있으면 덮어쓰고 경고 (last one wins)
    pub fn insert(&mut self, name: impl Into<String>, config: ToolProviderConfig) {
        let name = name.into();
        if self.servers.insert(name.clone(), config).is_some() {
            warn!(provider = %name, "Duplicate tool provider name, later definition wins");
        }
    }

    /// raw 파일 내용을 해석해서 추가
    pub fn extend_from_file(&mut self, file: ProviderConfigFile) {
        for (name, raw) in file.servers {
            match raw.resolve() {
                Some(config) => self.insert(name, config),
                None => {
                    warn!(
                        provider = %name,
                        "Tool provider config has neither a command nor a url, skipping"
                    );
                }
            }
        }
    }

    /// JSON 문자열 파싱
    pub fn parse_json(content: &str) -> Result<Self> {
        let file: ProviderConfigFile = serde_json::from_str(content)?;
        let mut configs = Self::new();
        configs.extend_from_file(file);
        Ok(configs)
    }

    /// TOML 문자열 파싱 (`[servers.<name>]`)
    pub fn parse_toml(content: &str) -> Result<Self> {
        let file: ProviderConfigFile = toml::from_str(content)?;
        let mut configs = Self::new();
        configs.extend_from_file(file);
        Ok(configs)
    }

    /// 파일 로드 (확장자가 .toml이면 TOML, 그 외는 JSON)
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let configs = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::parse_toml(&content)?,
            _ => Self::parse_json(&content)?,
        };

        info!(
            "Loaded {} tool provider(s) from {}",
            configs.len(),
            path.display()
        );
        Ok(configs)
    }

    /// 다른 설정과 병합 (other가 우선)
    pub fn merge(&mut self, other: ProviderConfigs) {
        for (name, config) in other.servers {
            self.insert(name, config);
        }
    }

    /// 글로벌 + 프로젝트 설정 로드 (없는 파일은 건너뜀)
    pub fn load(project_dir: &Path) -> Result<Self> {
        let mut configs = Self::new();

        // 1. 글로벌 설정 (~/.conductor/mcp.json)
        if let Some(global_dir) = super::global_config_dir() {
            let path = global_dir.join(MCP_FILE);
            if path.exists() {
                configs.merge(Self::from_file(&path)?);
            }
        }

        // 2. 프로젝트 설정 (.mcp.json)
        let path = project_dir.join(PROJECT_MCP_FILE);
        if path.exists() {
            configs.merge(Self::from_file(&path)?);
        } else {
            debug!("No {} found in {}", PROJECT_MCP_FILE, project_dir.display());
        }

        Ok(configs)
    }

    pub fn get(&self, name: &str) -> Option<&ToolProviderConfig> {
        self.servers.get(name)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ToolProviderConfig)> {
        self.servers.iter()
    }
}

impl IntoIterator for ProviderConfigs {
    type Item = (String, ToolProviderConfig);
    type IntoIter = std::collections::btree_map::IntoIter<String, ToolProviderConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.servers.into_iter()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// 로그 출력용 값 마스킹 (KEY/TOKEN/SECRET 포함 키)
pub fn mask_secret(key: &str, value: &str) -> String {
    let upper = key.to_uppercase();
    let sensitive = ["KEY", "TOKEN", "SECRET", "AUTHORIZATION"]
        .iter()
        .any(|s| upper.contains(s));
    if !sensitive {
        return value.to_string();
    }

    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// 환경변수 확장
/// - ${VAR}: 환경변수 값 (없으면 빈 문자열)
/// - ${VAR:-default}: 환경변수가 없으면 기본값
pub fn expand_env_var(value: &str) -> String {
    if !value.contains("${") {
        return value.to_string();
    }

    let re = match regex::Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}") {
        Ok(re) => re,
        Err(_) => return value.to_string(),
    };

    re.replace_all(value, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default_val = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default_val.to_string())
    })
    .to_string()
}

fn expand_map(map: &HashMap<String, String>) -> HashMap<String, String> {
    map.iter()
        .map(|(k, v)| (k.clone(), expand_env_var(v)))
        .collect()
}

fn default_true() -> bool {
    true
}
