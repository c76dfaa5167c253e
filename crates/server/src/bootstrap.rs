use std::sync::Arc;

use leadgate_agent::llm::{LlmClient, OpenAiCompatClient, UnconfiguredClient};
use leadgate_agent::prompts::PromptError;
use leadgate_agent::Orchestrator;
use leadgate_core::audit::TracingAuditSink;
use leadgate_core::config::{AppConfig, ConfigError, LoadOptions};
use leadgate_db::connection::connect_lead_log;
use leadgate_db::{migrations, LeadLog, NoopLeadLog, SqlLeadLog};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("lead log connection failed: {0}")]
    LeadLogConnect(#[source] sqlx::Error),
    #[error("lead log migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("prompt templates failed to load: {0}")]
    Prompts(#[from] PromptError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let client = inference_client(&config);
    let lead_log = lead_log(&config).await?;
    let orchestrator =
        Orchestrator::from_config(&config, client, lead_log, Arc::new(TracingAuditSink))?;

    info!(
        event_name = "system.bootstrap.completed",
        correlation_id = "bootstrap",
        inference = if orchestrator.inference_live() { "live" } else { "stub" },
        lead_log = orchestrator.recorder().backend(),
        "application bootstrap completed"
    );

    Ok(Application { config, orchestrator: Arc::new(orchestrator) })
}

fn inference_client(config: &AppConfig) -> Arc<dyn LlmClient> {
    if config.llm.is_configured() {
        info!(
            event_name = "system.bootstrap.inference_configured",
            correlation_id = "bootstrap",
            provider = config.llm.provider.as_str(),
            model = %config.llm.model,
            "inference gateway configured"
        );
        Arc::new(OpenAiCompatClient::new(&config.llm))
    } else {
        warn!(
            event_name = "system.bootstrap.inference_stub",
            correlation_id = "bootstrap",
            provider = config.llm.provider.as_str(),
            "no inference credentials; replies degrade to the high-load message"
        );
        Arc::new(UnconfiguredClient)
    }
}

async fn lead_log(config: &AppConfig) -> Result<Arc<dyn LeadLog>, BootstrapError> {
    let Some(pool) =
        connect_lead_log(&config.lead_log).await.map_err(BootstrapError::LeadLogConnect)?
    else {
        warn!(
            event_name = "system.bootstrap.lead_log_disabled",
            correlation_id = "bootstrap",
            "no lead log configured; lead records are not persisted"
        );
        return Ok(Arc::new(NoopLeadLog));
    };

    migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "lead log migrations applied"
    );

    Ok(Arc::new(SqlLeadLog::new(pool)))
}
