pub mod config;
pub mod doctor;
pub mod leads;
pub mod migrate;

use leadgate_core::config::{AppConfig, LoadOptions};
use leadgate_db::{connection::connect_lead_log, DbPool};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

/// Loads config, opens the lead log and builds a runtime for `command`.
/// Every failure is already rendered as a `CommandResult`.
pub(crate) fn open_lead_log(
    command: &str,
) -> Result<(AppConfig, tokio::runtime::Runtime, DbPool), CommandResult> {
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        let message = format!("configuration issue: {error}");
        CommandResult::failure(command, "config_validation", message, 2)
    })?;

    if !config.lead_log.is_enabled() {
        return Err(CommandResult::failure(
            command,
            "lead_log_disabled",
            "no lead log configured; set LEADGATE_LEAD_LOG_URL or lead_log.url",
            2,
        ));
    }

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(
        |error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        },
    )?;

    let pool = match runtime.block_on(connect_lead_log(&config.lead_log)) {
        Ok(Some(pool)) => pool,
        Ok(None) => {
            return Err(CommandResult::failure(
                command,
                "lead_log_disabled",
                "no lead log configured",
                2,
            ))
        }
        Err(error) => {
            return Err(CommandResult::failure(command, "db_connectivity", error.to_string(), 4))
        }
    };

    Ok((config, runtime, pool))
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
