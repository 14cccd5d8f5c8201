//! Core Types - 파이프라인 공용 타입 정의
//!
//! AI가 생성한 action plan, 외부 runner가 보고하는 execution report,
//! 그리고 그로부터 파생되는 통계/요약 이벤트 타입들

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

// ============================================================================
// Action - 단일 파일/쉘 작업
// ============================================================================

/// Action 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Shell,
    Create,
    Update,
    Rename,
    Delete,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::Create => "create",
            Self::Update => "update",
            Self::Rename => "rename",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AI collaborator가 제안한 단일 작업 (생성 후 불변)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// 작업 종류
    #[serde(rename = "type")]
    pub kind: ActionKind,

    /// 대상 경로
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// 쉘 명령어 (shell 전용)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// 파일 내용 (create/update 전용)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// 부가 정보
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl Action {
    fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            path: None,
            command: None,
            content: None,
            metadata: HashMap::new(),
        }
    }

    pub fn shell(command: impl Into<String>) -> Self {
        let mut action = Self::new(ActionKind::Shell);
        action.command = Some(command.into());
        action
    }

    pub fn create(path: impl Into<String>, content: impl Into<String>) -> Self {
        let mut action = Self::new(ActionKind::Create);
        action.path = Some(path.into());
        action.content = Some(content.into());
        action
    }

    pub fn update(path: impl Into<String>, content: impl Into<String>) -> Self {
        let mut action = Self::new(ActionKind::Update);
        action.path = Some(path.into());
        action.content = Some(content.into());
        action
    }

    pub fn delete(path: impl Into<String>) -> Self {
        let mut action = Self::new(ActionKind::Delete);
        action.path = Some(path.into());
        action
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Action plan - 실행 순서대로 정렬된 작업 목록
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPlan {
    /// 프로젝트 루트 경로 (비어 있으면 안 됨)
    pub project_root: String,

    /// 작업 목록 (위치 = 우선순위)
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl ActionPlan {
    pub fn new(project_root: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            project_root: project_root.into(),
            actions,
        }
    }

    /// 유효성 검증
    pub fn validate(&self) -> Result<()> {
        validate_project_root(&self.project_root, "action plan")
    }
}

// ============================================================================
// Execution Report - 외부 runner의 실행 결과
// ============================================================================

/// 개별 action 실행 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Failure,
    Skipped,
}

/// 단일 action의 실행 결과 (runner가 생성)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    #[serde(rename = "type")]
    pub kind: ActionKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    pub status: ActionStatus,

    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// 원본 action의 파일 내용 (runner가 그대로 실어 보내는 경우)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ActionResult {
    pub fn new(kind: ActionKind, status: ActionStatus) -> Self {
        Self {
            kind,
            target: None,
            status,
            message: String::new(),
            error: None,
            command: None,
            content: None,
        }
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }
}

/// Execution report - 한 번 생성되면 불변
///
/// `success`는 보고자가 제공한 값이며 파생 통계로 덮어쓰지 않는다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    #[serde(default)]
    pub actions: Vec<ActionResult>,

    pub project_root: String,

    pub success: bool,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ExecutionReport {
    pub fn new(project_root: impl Into<String>, actions: Vec<ActionResult>, success: bool) -> Self {
        Self {
            actions,
            project_root: project_root.into(),
            success,
            timestamp: Utc::now(),
        }
    }

    /// 유효성 검증
    pub fn validate(&self) -> Result<()> {
        validate_project_root(&self.project_root, "execution report")
    }
}

fn validate_project_root(root: &str, what: &str) -> Result<()> {
    if root.trim().is_empty() {
        return Err(Error::validation(format!(
            "{} has an empty project root",
            what
        )));
    }
    Ok(())
}

// ============================================================================
// Statistics - report에서 파생 (저장하지 않음)
// ============================================================================

/// 실행 통계
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub by_type: BTreeMap<ActionKind, usize>,
}

impl Statistics {
    /// 보고자의 `success` 플래그가 파생 통계와 모순되는지 확인
    ///
    /// 실패가 있는데 `true`, 또는 action이 전부 성공했는데 `false`인 경우.
    /// skip이 섞인 실행을 실패로 보고하는 것은 모순이 아니다.
    pub fn contradicts(&self, success: bool) -> bool {
        if success {
            self.failed > 0
        } else {
            self.total > 0 && self.successful == self.total
        }
    }

    /// 종류별 개수 (없으면 0)
    pub fn count_of(&self, kind: ActionKind) -> usize {
        self.by_type.get(&kind).copied().unwrap_or(0)
    }
}

/// 집계된 report (`report.aggregated` 페이로드)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedReport {
    pub report_id: String,
    pub report: ExecutionReport,
    pub statistics: Statistics,
    /// 보고자 플래그와 파생 통계의 일치 여부 (참고용)
    pub flag_consistent: bool,
}

// ============================================================================
// Summary - 요약 토큰 스트림 이벤트
// ============================================================================

/// 요약 스트림의 단일 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SummaryChunkKind {
    /// 텍스트 토큰
    Token(String),
    /// 정상 종료 마커
    Completed,
    /// 업스트림 실패 마커
    Failed(String),
}

impl SummaryChunkKind {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Token(_))
    }
}

/// correlation id가 붙은 요약 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryChunk {
    pub correlation_id: String,
    pub kind: SummaryChunkKind,
}

impl SummaryChunk {
    pub fn token(correlation_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            kind: SummaryChunkKind::Token(text.into()),
        }
    }

    pub fn completed(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            kind: SummaryChunkKind::Completed,
        }
    }

    pub fn failed(correlation_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            kind: SummaryChunkKind::Failed(error.into()),
        }
    }
}
