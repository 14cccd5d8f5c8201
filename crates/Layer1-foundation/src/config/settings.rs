//! Conductor Config - 오케스트레이터 설정
//!
//! `conductor.toml` (글로벌 `~/.conductor/` 또는 명시 경로)
//!
//! ```toml
//! [aggregator]
//! connect_timeout_secs = 30
//!
//! [summary]
//! base_url = "http://localhost:11434"
//! model = "llama3.1"
//!
//! [bus]
//! debug = false
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// 설정 파일명
pub const CONDUCTOR_CONFIG_FILE: &str = "conductor.toml";

/// Conductor 통합 설정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConductorConfig {
    #[serde(default)]
    pub aggregator: AggregatorSettings,

    #[serde(default)]
    pub summary: SummarySettings,

    #[serde(default)]
    pub bus: BusSettings,
}

impl ConductorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// TOML 문자열 파싱
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 파일 로드
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// 명시 경로 또는 글로벌 설정 로드 (없으면 기본값)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        match super::global_config_dir().map(|d| d.join(CONDUCTOR_CONFIG_FILE)) {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                debug!("No {} found, using defaults", CONDUCTOR_CONFIG_FILE);
                Ok(Self::default())
            }
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Capability Aggregator 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorSettings {
    /// provider별 연결+조회 타임아웃 기본값 (초)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl AggregatorSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Summary Generator 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarySettings {
    /// 텍스트 생성 서비스 주소 (Ollama 호환)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// 업스트림 스트림 오픈 대기 시간 (초)
    #[serde(default = "default_start_timeout")]
    pub start_timeout_secs: u64,

    /// 보관할 최대 스트림 수 (종료된 것부터 제거)
    #[serde(default = "default_max_retained")]
    pub max_retained: usize,

    /// 프롬프트에 넣을 message/error 최대 길이
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

impl SummarySettings {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            start_timeout_secs: default_start_timeout(),
            max_retained: default_max_retained(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

/// Event Bus 설정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusSettings {
    /// 모든 이벤트를 debug 로그로 출력
    #[serde(default)]
    pub debug: bool,
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.1".to_string()
}

fn default_start_timeout() -> u64 {
    30
}

fn default_max_retained() -> usize {
    64
}

fn default_max_message_chars() -> usize {
    2000
}
