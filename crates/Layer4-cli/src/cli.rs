//! Subcommand implementations

use anyhow::Context;
use async_trait::async_trait;
use conductor_core::ConnectionState;
use conductor_foundation::{
    topics, ActionPlan, BusEvent, ConductorConfig, EventListener, EventPayload, ExecutionReport,
    ProviderConfigs, SummaryChunkKind,
};
use conductor_pipeline::{compute_statistics, Orchestrator};
use conductor_provider::OllamaGenerator;
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// conductor.toml 로드 (`--debug`는 bus 디버그 모드도 켠다)
pub fn load_config(path: Option<&Path>, debug: bool) -> anyhow::Result<ConductorConfig> {
    let mut config = ConductorConfig::load(path).context("Failed to load conductor config")?;
    config.bus.debug |= debug;
    Ok(config)
}

fn build_orchestrator(config: &ConductorConfig) -> anyhow::Result<Orchestrator> {
    let generator = OllamaGenerator::new(&config.summary.base_url, &config.summary.model)
        .context("Failed to create summary generator")?;
    Ok(Orchestrator::from_config(config, Arc::new(generator)))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} {}", what, path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid {} {}", what, path.display()))
}

// ============================================================================
// status
// ============================================================================

/// provider 연결 → 상태와 operation 목록 출력 → 정리
pub async fn status(config: &ConductorConfig, mcp_config: &[PathBuf]) -> anyhow::Result<()> {
    let providers = if mcp_config.is_empty() {
        let project_dir = std::env::current_dir()?;
        ProviderConfigs::load(&project_dir)?
    } else {
        let mut providers = ProviderConfigs::new();
        for path in mcp_config {
            providers.merge(ProviderConfigs::from_file(path)?);
        }
        providers
    };

    let orchestrator = build_orchestrator(config)?;
    let status = orchestrator.aggregate(providers).await;

    println!("{}", serde_json::to_string_pretty(&status)?);

    for connection in orchestrator.aggregator().connections() {
        if let ConnectionState::Failed(reason) = &connection.state {
            warn!(provider = %connection.name, "Provider unavailable: {}", reason);
        }
        println!(
            "  {} [{}] {} ({} operations)",
            connection.name,
            connection.transport,
            state_label(&connection.state),
            connection.operations.len()
        );
    }

    let registry = orchestrator.aggregator().registry();
    info!(operations = registry.len(), "Capability aggregation finished");
    if !registry.is_empty() {
        println!();
        for operation in registry.iter() {
            match &operation.descriptor.description {
                Some(description) => println!("{:<40} {}", operation.key, description),
                None => println!("{}", operation.key),
            }
        }
    }

    orchestrator.shutdown().await;
    Ok(())
}

fn state_label(state: &ConnectionState) -> String {
    match state {
        ConnectionState::Pending => "pending".to_string(),
        ConnectionState::Connected => "connected".to_string(),
        ConnectionState::Failed(reason) => format!("failed: {}", reason),
        ConnectionState::Closed => "closed".to_string(),
    }
}

// ============================================================================
// dispatch
// ============================================================================

/// 실제 runner 대신 받은 plan을 stdout으로 출력
struct PlanPrinter;

#[async_trait]
impl EventListener for PlanPrinter {
    fn name(&self) -> &str {
        "plan-printer"
    }

    async fn on_event(&self, event: &BusEvent) -> conductor_foundation::Result<()> {
        if let EventPayload::PlanDispatched(plan) = &event.payload {
            println!("{}", serde_json::to_string_pretty(plan.as_ref())?);
        }
        Ok(())
    }
}

pub async fn dispatch(config: &ConductorConfig, path: &Path) -> anyhow::Result<()> {
    let plan: ActionPlan = read_json(path, "plan")?;

    let orchestrator = build_orchestrator(config)?;
    orchestrator
        .bus()
        .subscribe(topics::PLAN_DISPATCHED, Arc::new(PlanPrinter))
        .await;

    let delivery = orchestrator.dispatch_tracked(plan).await.map_err(reject)?;
    info!(?delivery, "Dispatch finished");
    Ok(())
}

/// 사용자 입력 문제는 짧은 메시지로, 나머지는 context와 함께
fn reject(err: conductor_foundation::Error) -> anyhow::Error {
    if err.is_user_facing() {
        anyhow::anyhow!("Rejected: {}", err)
    } else {
        anyhow::Error::new(err).context("Pipeline error")
    }
}

// ============================================================================
// report
// ============================================================================

/// report 제출 → 통계 출력 → 요약을 stdout으로 스트리밍
pub async fn report(config: &ConductorConfig, path: &Path) -> anyhow::Result<()> {
    let report: ExecutionReport = read_json(path, "report")?;
    let statistics = compute_statistics(&report);

    let orchestrator = build_orchestrator(config)?;
    let outcome = orchestrator.submit_report(report).await.map_err(reject)?;

    info!(
        report_id = %outcome.report_id,
        summary_id = outcome.summary_id.as_deref().unwrap_or("-"),
        "Report submitted"
    );
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    println!("{}", serde_json::to_string_pretty(&statistics)?);

    let Some(summary_id) = outcome.summary_id.as_deref() else {
        return Ok(());
    };
    let Some(subscriber) = orchestrator.attach_summary(summary_id) else {
        return Ok(());
    };

    println!();
    let mut chunks = Box::pin(subscriber.into_stream());
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            chunk = chunks.next() => match chunk {
                Some(SummaryChunkKind::Token(token)) => {
                    print!("{}", token);
                    stdout.flush()?;
                }
                Some(SummaryChunkKind::Completed) | None => {
                    println!();
                    break;
                }
                Some(SummaryChunkKind::Failed(reason)) => {
                    println!();
                    warn!(summary_id = %summary_id, "Summary incomplete: {}", reason);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                info!(summary_id = %summary_id, "Summary stream detached");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_label() {
        assert_eq!(state_label(&ConnectionState::Connected), "connected");
        assert_eq!(
            state_label(&ConnectionState::Failed("timed out after 5s".into())),
            "failed: timed out after 5s"
        );
        assert_eq!(state_label(&ConnectionState::Closed), "closed");
    }
}
