//! Summary - execution report 요약 스트리밍
//!
//! - `generator.rs` - 텍스트 생성기 호출 및 토큰 pump
//! - `stream.rs` - correlation id별 버퍼 + 구독자
//! - `hub.rs` - 늦게 붙는 구독자를 위한 보관소
//! - `prompt.rs` - 프롬프트 생성

mod generator;
mod hub;
mod prompt;
mod stream;

pub use generator::{SummaryGenerator, SummaryOptions};
pub use hub::{SummaryHub, DEFAULT_MAX_RETAINED};
pub use prompt::{build_prompt, SYSTEM_INSTRUCTION};
pub use stream::{SummaryState, SummaryStream, SummarySubscriber};
