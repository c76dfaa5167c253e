use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub lead_log: LeadLogConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Append-only lead log. No URL means the log runs in silent no-op mode.
#[derive(Clone, Debug)]
pub struct LeadLogConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub history_window: usize,
    pub strategist_mode: StrategistMode,
    pub price_floor: Decimal,
    pub currency: String,
    pub contact_channel: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    pub allowed_origins: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Groq,
    OpenAi,
    Ollama,
}

/// How far the strategist trusts the model's tactic proposal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategistMode {
    /// The decision table is authoritative; the model only supplies signals.
    Rules,
    /// The model's tactic is used as proposed; only the safety gate applies.
    Model,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub lead_log_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub strategist_mode: Option<StrategistMode>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::Groq,
                api_key: None,
                base_url: None,
                model: "llama-3.3-70b-versatile".to_string(),
                timeout_secs: 20,
                temperature: 0.4,
                max_tokens: 600,
            },
            lead_log: LeadLogConfig { url: None, max_connections: 2, timeout_secs: 5 },
            pipeline: PipelineConfig {
                history_window: 4,
                strategist_mode: StrategistMode::Rules,
                price_floor: Decimal::new(1500, 0),
                currency: "USD".to_string(),
                contact_channel: "board@evangelista.co".to_string(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8002,
                graceful_shutdown_secs: 10,
                allowed_origins: Vec::new(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

impl LlmConfig {
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }

    /// `false` means inference runs in stub mode: every call short-circuits
    /// and the pipeline degrades to its fixed replies.
    pub fn is_configured(&self) -> bool {
        if !self.provider.requires_api_key() {
            return true;
        }
        self.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty())
    }
}

impl LeadLogConfig {
    pub fn is_enabled(&self) -> bool {
        self.url.as_deref().is_some_and(|url| !url.trim().is_empty())
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected groq|openai|ollama)"
            ))),
        }
    }
}

impl FromStr for StrategistMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rules" => Ok(Self::Rules),
            "model" => Ok(Self::Model),
            other => Err(ConfigError::Validation(format!(
                "unsupported strategist mode `{other}` (expected rules|model)"
            ))),
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("leadgate.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
        }

        if let Some(lead_log) = patch.lead_log {
            if let Some(url) = lead_log.url {
                self.lead_log.url = Some(url);
            }
            if let Some(max_connections) = lead_log.max_connections {
                self.lead_log.max_connections = max_connections;
            }
            if let Some(timeout_secs) = lead_log.timeout_secs {
                self.lead_log.timeout_secs = timeout_secs;
            }
        }

        if let Some(pipeline) = patch.pipeline {
            if let Some(history_window) = pipeline.history_window {
                self.pipeline.history_window = history_window;
            }
            if let Some(strategist_mode) = pipeline.strategist_mode {
                self.pipeline.strategist_mode = strategist_mode;
            }
            if let Some(price_floor) = pipeline.price_floor {
                self.pipeline.price_floor = price_floor;
            }
            if let Some(currency) = pipeline.currency {
                self.pipeline.currency = currency;
            }
            if let Some(contact_channel) = pipeline.contact_channel {
                self.pipeline.contact_channel = contact_channel;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(allowed_origins) = server.allowed_origins {
                self.server.allowed_origins = allowed_origins;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("LEADGATE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        let api_key = read_env("LEADGATE_LLM_API_KEY").or_else(|| read_env("GROQ_API_KEY"));
        if let Some(value) = api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("LEADGATE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("LEADGATE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("LEADGATE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("LEADGATE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("LEADGATE_LLM_TEMPERATURE") {
            self.llm.temperature = parse_env("LEADGATE_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("LEADGATE_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_env("LEADGATE_LLM_MAX_TOKENS", &value)?;
        }

        if let Some(value) = read_env("LEADGATE_LEAD_LOG_URL") {
            self.lead_log.url = Some(value);
        }
        if let Some(value) = read_env("LEADGATE_LEAD_LOG_MAX_CONNECTIONS") {
            self.lead_log.max_connections =
                parse_env("LEADGATE_LEAD_LOG_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("LEADGATE_LEAD_LOG_TIMEOUT_SECS") {
            self.lead_log.timeout_secs = parse_env("LEADGATE_LEAD_LOG_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADGATE_PIPELINE_HISTORY_WINDOW") {
            self.pipeline.history_window = parse_env("LEADGATE_PIPELINE_HISTORY_WINDOW", &value)?;
        }
        if let Some(value) = read_env("LEADGATE_PIPELINE_STRATEGIST_MODE") {
            self.pipeline.strategist_mode = value.parse()?;
        }
        if let Some(value) = read_env("LEADGATE_PIPELINE_PRICE_FLOOR") {
            self.pipeline.price_floor = parse_env("LEADGATE_PIPELINE_PRICE_FLOOR", &value)?;
        }
        if let Some(value) = read_env("LEADGATE_PIPELINE_CURRENCY") {
            self.pipeline.currency = value;
        }
        if let Some(value) = read_env("LEADGATE_PIPELINE_CONTACT_CHANNEL") {
            self.pipeline.contact_channel = value;
        }

        if let Some(value) = read_env("LEADGATE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        // PORT is the platform-assigned port on container hosts.
        if let Some(value) = read_env("LEADGATE_SERVER_PORT").or_else(|| read_env("PORT")) {
            self.server.port = parse_env("LEADGATE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("LEADGATE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("LEADGATE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("LEADGATE_SERVER_ALLOWED_ORIGINS") {
            self.server.allowed_origins = value
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect();
        }

        let log_level =
            read_env("LEADGATE_LOGGING_LEVEL").or_else(|| read_env("LEADGATE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LEADGATE_LOGGING_FORMAT").or_else(|| read_env("LEADGATE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(lead_log_url) = overrides.lead_log_url {
            self.lead_log.url = Some(lead_log_url);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(strategist_mode) = overrides.strategist_mode {
            self.pipeline.strategist_mode = strategist_mode;
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
    }

    /// Missing credentials are valid (stub mode); malformed values are not.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_lead_log(&self.lead_log)?;
        validate_pipeline(&self.pipeline)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("leadgate.toml"), PathBuf::from("config/leadgate.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_lead_log(lead_log: &LeadLogConfig) -> Result<(), ConfigError> {
    if let Some(url) = lead_log.url.as_deref().map(str::trim).filter(|url| !url.is_empty()) {
        let sqlite_url =
            url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
        if !sqlite_url {
            return Err(ConfigError::Validation(
                "lead_log.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                    .to_string(),
            ));
        }
    }

    if lead_log.max_connections == 0 {
        return Err(ConfigError::Validation(
            "lead_log.max_connections must be greater than zero".to_string(),
        ));
    }

    if lead_log.timeout_secs == 0 || lead_log.timeout_secs > 60 {
        return Err(ConfigError::Validation(
            "lead_log.timeout_secs must be in range 1..=60".to_string(),
        ));
    }

    Ok(())
}

fn validate_pipeline(pipeline: &PipelineConfig) -> Result<(), ConfigError> {
    if pipeline.history_window == 0 || pipeline.history_window > 20 {
        return Err(ConfigError::Validation(
            "pipeline.history_window must be in range 1..=20".to_string(),
        ));
    }

    if pipeline.price_floor <= Decimal::ZERO {
        return Err(ConfigError::Validation(
            "pipeline.price_floor must be greater than zero".to_string(),
        ));
    }

    if pipeline.currency.trim().is_empty() {
        return Err(ConfigError::Validation("pipeline.currency must not be empty".to_string()));
    }

    if pipeline.contact_channel.trim().is_empty() {
        return Err(ConfigError::Validation(
            "pipeline.contact_channel must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    lead_log: Option<LeadLogPatch>,
    pipeline: Option<PipelinePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LeadLogPatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelinePatch {
    history_window: Option<usize>,
    strategist_mode: Option<StrategistMode>,
    price_floor: Option<Decimal>,
    currency: Option<String>,
    contact_channel: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    allowed_origins: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
