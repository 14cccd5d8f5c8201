//! MCP Types - MCP 관련 타입 정의

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MCP 서버에서 제공하는 도구 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    /// 도구 이름
    pub name: String,

    /// 도구 설명
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// 입력 스키마 (JSON Schema)
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// `tools/list` 응답 (페이지 단위)
#[derive(Debug, Clone, Deserialize)]
pub struct McpToolsPage {
    #[serde(default)]
    pub tools: Vec<McpTool>,

    #[serde(rename = "nextCursor", default)]
    pub next_cursor: Option<String>,
}

/// MCP 도구 실행 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolResult {
    /// 실패 여부
    #[serde(rename = "isError", default)]
    pub is_error: bool,

    /// 결과 콘텐츠
    #[serde(default)]
    pub content: Vec<McpContent>,
}

/// MCP 콘텐츠
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpContent {
    /// 텍스트 콘텐츠
    Text { text: String },

    /// 이미지 콘텐츠
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },

    /// 리소스 참조
    Resource {
        #[serde(default)]
        resource: Value,
    },
}

impl McpToolResult {
    /// 텍스트 결과 추출 (여러 개면 줄바꿈으로 연결)
    pub fn text(&self) -> Option<String> {
        let texts: Vec<&str> = self
            .content
            .iter()
            .filter_map(|c| match c {
                McpContent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();

        if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n"))
        }
    }
}

/// Initialize 응답의 서버 정보
#[derive(Debug, Clone, Default, Deserialize)]
pub struct McpServerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Initialize 응답
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpInitializeResult {
    #[serde(default)]
    pub protocol_version: String,
    #[serde(default)]
    pub server_info: McpServerInfo,
    #[serde(default)]
    pub capabilities: Value,
}

impl McpInitializeResult {
    /// `tools` capability 선언 여부 (capabilities를 아예 안 보낸 서버는 있다고 본다)
    pub fn advertises_tools(&self) -> bool {
        match &self.capabilities {
            Value::Null => true,
            capabilities => capabilities.get("tools").is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tools_page() {
        let page: McpToolsPage = serde_json::from_value(json!({
            "tools": [
                {"name": "read_file", "description": "Read a file", "inputSchema": {"type": "object"}},
                {"name": "ping"}
            ],
            "nextCursor": "abc"
        }))
        .unwrap();

        assert_eq!(page.tools.len(), 2);
        assert_eq!(page.tools[1].input_schema, Value::Null);
        assert_eq!(page.next_cursor.as_deref(), Some("abc"));
    }

    #[test]
    fn test_tool_result_text() {
        let result: McpToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "line 1"},
                {"type": "image", "data": "...", "mimeType": "image/png"},
                {"type": "text", "text": "line 2"}
            ],
            "isError": true
        }))
        .unwrap();

        assert!(result.is_error);
        assert_eq!(result.text().as_deref(), Some("line 1\nline 2"));
    }

    #[test]
    fn test_initialize_capabilities() {
        let with_tools: McpInitializeResult = serde_json::from_value(json!({
            "protocolVersion": "2024-11-05",
            "serverInfo": {"name": "fs"},
            "capabilities": {"tools": {"listChanged": true}}
        }))
        .unwrap();
        assert!(with_tools.advertises_tools());
        assert_eq!(with_tools.capabilities["tools"]["listChanged"], json!(true));

        let prompts_only: McpInitializeResult = serde_json::from_value(json!({
            "capabilities": {"prompts": {}}
        }))
        .unwrap();
        assert!(!prompts_only.advertises_tools());

        let silent: McpInitializeResult = serde_json::from_value(json!({})).unwrap();
        assert!(silent.advertises_tools());
    }
}
