use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use leadgate_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let llm_api_key = match config.llm.api_key.as_ref() {
        Some(key) => redact_token(key.expose_secret()),
        None => "<unset>".to_string(),
    };
    let allowed_origins = if config.server.allowed_origins.is_empty() {
        "<any>".to_string()
    } else {
        config.server.allowed_origins.join(",")
    };

    let entries: Vec<(&str, String, &[&str])> = vec![
        ("llm.provider", config.llm.provider.as_str().to_string(), &["LEADGATE_LLM_PROVIDER"][..]),
        ("llm.api_key", llm_api_key, &["LEADGATE_LLM_API_KEY", "GROQ_API_KEY"][..]),
        ("llm.base_url", config.llm.resolved_base_url(), &["LEADGATE_LLM_BASE_URL"][..]),
        ("llm.model", config.llm.model.clone(), &["LEADGATE_LLM_MODEL"][..]),
        ("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["LEADGATE_LLM_TIMEOUT_SECS"][..]),
        ("llm.temperature", config.llm.temperature.to_string(), &["LEADGATE_LLM_TEMPERATURE"][..]),
        ("llm.max_tokens", config.llm.max_tokens.to_string(), &["LEADGATE_LLM_MAX_TOKENS"][..]),
        (
            "lead_log.url",
            config.lead_log.url.clone().unwrap_or_else(|| "<disabled>".to_string()),
            &["LEADGATE_LEAD_LOG_URL"][..],
        ),
        (
            "lead_log.max_connections",
            config.lead_log.max_connections.to_string(),
            &["LEADGATE_LEAD_LOG_MAX_CONNECTIONS"][..],
        ),
        (
            "lead_log.timeout_secs",
            config.lead_log.timeout_secs.to_string(),
            &["LEADGATE_LEAD_LOG_TIMEOUT_SECS"][..],
        ),
        (
            "pipeline.history_window",
            config.pipeline.history_window.to_string(),
            &["LEADGATE_PIPELINE_HISTORY_WINDOW"][..],
        ),
        (
            "pipeline.strategist_mode",
            format!("{:?}", config.pipeline.strategist_mode).to_lowercase(),
            &["LEADGATE_PIPELINE_STRATEGIST_MODE"][..],
        ),
        (
            "pipeline.price_floor",
            config.pipeline.price_floor.normalize().to_string(),
            &["LEADGATE_PIPELINE_PRICE_FLOOR"][..],
        ),
        ("pipeline.currency", config.pipeline.currency.clone(), &["LEADGATE_PIPELINE_CURRENCY"][..]),
        (
            "pipeline.contact_channel",
            config.pipeline.contact_channel.clone(),
            &["LEADGATE_PIPELINE_CONTACT_CHANNEL"][..],
        ),
        (
            "server.bind_address",
            config.server.bind_address.clone(),
            &["LEADGATE_SERVER_BIND_ADDRESS"][..],
        ),
        ("server.port", config.server.port.to_string(), &["LEADGATE_SERVER_PORT", "PORT"][..]),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["LEADGATE_SERVER_GRACEFUL_SHUTDOWN_SECS"][..],
        ),
        ("server.allowed_origins", allowed_origins, &["LEADGATE_SERVER_ALLOWED_ORIGINS"][..]),
        (
            "logging.level",
            config.logging.level.clone(),
            &["LEADGATE_LOGGING_LEVEL", "LEADGATE_LOG_LEVEL"][..],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["LEADGATE_LOGGING_FORMAT", "LEADGATE_LOG_FORMAT"][..],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, value, env_keys) in entries {
        lines.push(render_line(key_path, &value, source(key_path, env_keys)));
    }
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("leadgate.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/leadgate.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env_is_set(key)) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn env_is_set(key: &str) -> bool {
    env::var(key).is_ok_and(|value| !value.trim().is_empty())
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some(split) = trimmed.find(|ch| ch == '-' || ch == '_') {
        return format!("{}***", &trimmed[..=split]);
    }

    "<redacted>".to_string()
}
