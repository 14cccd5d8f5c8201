//! 요약 프롬프트 생성

use conductor_foundation::{ExecutionReport, Result, Statistics};
use serde_json::{json, Value};

/// 고정 시스템 지시문
pub const SYSTEM_INSTRUCTION: &str = "Summarize the following execution results as markdown, \
covering created/modified/deleted files, commands run, and errors.";

const TRUNCATION_MARKER: &str = "… [truncated]";

/// report + 통계로 프롬프트 생성
///
/// action의 `content`는 빼고, 긴 `message`/`error`는 잘라낸다.
pub fn build_prompt(
    report: &ExecutionReport,
    statistics: &Statistics,
    max_message_chars: usize,
) -> Result<String> {
    let mut report_value = serde_json::to_value(report)?;

    if let Some(actions) = report_value
        .get_mut("actions")
        .and_then(Value::as_array_mut)
    {
        for action in actions.iter_mut().filter_map(Value::as_object_mut) {
            action.remove("content");
            for field in ["message", "error"] {
                if let Some(Value::String(text)) = action.get_mut(field) {
                    truncate_in_place(text, max_message_chars);
                }
            }
        }
    }

    let payload = json!({
        "report": report_value,
        "statistics": statistics,
    });

    Ok(format!(
        "Execution results:\n```json\n{}\n```",
        serde_json::to_string_pretty(&payload)?
    ))
}

fn truncate_in_place(text: &mut String, max_chars: usize) {
    let cut = text.char_indices().nth(max_chars).map(|(index, _)| index);
    if let Some(byte_index) = cut {
        text.truncate(byte_index);
        text.push_str(TRUNCATION_MARKER);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_foundation::{ActionKind, ActionResult, ActionStatus};

    #[test]
    fn test_content_is_dropped() {
        let mut result = ActionResult::new(ActionKind::Create, ActionStatus::Success).target("a.txt");
        result.content = Some("SECRET FILE BODY".to_string());
        let report = ExecutionReport::new("/p", vec![result], true);

        let prompt = build_prompt(&report, &Statistics::default(), 100).unwrap();
        assert!(!prompt.contains("SECRET FILE BODY"));
        assert!(prompt.contains("a.txt"));
        assert!(prompt.contains("\"statistics\""));
    }

    #[test]
    fn test_long_error_is_truncated() {
        let result = ActionResult::new(ActionKind::Shell, ActionStatus::Failure)
            .command("npm test")
            .error("é".repeat(50));
        let report = ExecutionReport::new("/p", vec![result], false);

        let prompt = build_prompt(&report, &Statistics::default(), 10).unwrap();
        assert!(prompt.contains(&format!("{}{}", "é".repeat(10), TRUNCATION_MARKER)));
        assert!(!prompt.contains(&"é".repeat(11)));
    }

    #[test]
    fn test_short_strings_untouched() {
        let mut text = "exit 1".to_string();
        truncate_in_place(&mut text, 6);
        assert_eq!(text, "exit 1");
    }
}
