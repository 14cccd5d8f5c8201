//! Config - 설정 로드
//!
//! - `provider.rs` - tool provider 설정 (mcp.json / .mcp.json)
//! - `settings.rs` - ConductorConfig (conductor.toml)

mod provider;
mod settings;

use std::path::PathBuf;

pub use provider::{
    expand_env_var, mask_secret, CommandConfig, NetworkConfig, ProviderConfigFile,
    ProviderConfigs, RawProviderEntry, ToolProviderConfig, TransportHint, TransportKind,
    MCP_FILE, PROJECT_MCP_FILE,
};
pub use settings::{
    AggregatorSettings, BusSettings, ConductorConfig, SummarySettings, CONDUCTOR_CONFIG_FILE,
};

/// 글로벌 설정 디렉토리 (`~/.conductor`)
pub fn global_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".conductor"))
}
