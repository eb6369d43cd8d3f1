use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;

use crate::command::CommandProvider;
use crate::error::ServiceError;
use crate::openai::OpenAiChatProvider;

/// A text-generation backend. Exactly one is active at a time.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate_content(&self, prompt: &str) -> Result<String, ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Engine {
    /// OpenAI-compatible `/chat/completions` endpoint.
    Openai,
    /// Local program: prompt on stdin, response on stdout.
    Command,
}

impl Engine {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "openai" => Ok(Self::Openai),
            "command" => Ok(Self::Command),
            other => anyhow::bail!("unsupported engine: {other}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub engine: Engine,
    pub openai_base_url: String,
    pub openai_model: String,
    pub api_key: Option<String>,
    pub command: Option<String>,
    pub command_args: Vec<String>,
    pub timeout: Duration,
    pub min_request_interval: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            engine: Engine::Openai,
            openai_base_url: "https://api.openai.com/v1".to_owned(),
            openai_model: "gpt-4o-mini".to_owned(),
            api_key: None,
            command: None,
            command_args: Vec::new(),
            timeout: Duration::from_secs(45),
            min_request_interval: Duration::from_millis(2000),
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("STUDYQUIZ_ENGINE") {
            config.engine = Engine::parse(&raw).with_context(|| {
                format!("invalid STUDYQUIZ_ENGINE={raw:?}. expected one of: openai, command")
            })?;
        }
        if let Some(url) = non_empty_env("STUDYQUIZ_OPENAI_BASE_URL") {
            config.openai_base_url = url;
        }
        if let Some(model) = non_empty_env("STUDYQUIZ_OPENAI_MODEL") {
            config.openai_model = model;
        }
        config.api_key = non_empty_env("OPENAI_API_KEY");
        config.command = non_empty_env("STUDYQUIZ_COMMAND");
        if let Some(args) = non_empty_env("STUDYQUIZ_COMMAND_ARGS") {
            config.command_args = args.split_whitespace().map(str::to_owned).collect();
        }
        if let Some(secs) = parse_env::<u64>("STUDYQUIZ_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_env::<u64>("STUDYQUIZ_MIN_REQUEST_INTERVAL_MS")? {
            config.min_request_interval = Duration::from_millis(ms);
        }
        if let Some(temperature) = parse_env::<f32>("STUDYQUIZ_TEMPERATURE")? {
            config.temperature = temperature;
        }
        if let Some(max_tokens) = parse_env::<u32>("STUDYQUIZ_MAX_TOKENS")? {
            config.max_tokens = max_tokens;
        }

        Ok(config)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = non_empty_env(name) else {
        return Ok(None);
    };
    raw.parse::<T>()
        .map(Some)
        .map_err(|err| anyhow::anyhow!("invalid {name}={raw:?}: {err}"))
}

pub fn from_config(config: &ProviderConfig) -> anyhow::Result<Arc<dyn GenerationProvider>> {
    if config.timeout.is_zero() {
        anyhow::bail!("provider timeout must be > 0");
    }

    match config.engine {
        Engine::Openai => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY is not set"))?;
            tracing::info!(
                engine = "openai",
                base_url = %config.openai_base_url,
                model = %config.openai_model,
                timeout_secs = config.timeout.as_secs(),
                "generation provider"
            );
            let provider = OpenAiChatProvider::new(config, api_key).context("build openai provider")?;
            Ok(Arc::new(provider))
        }
        Engine::Command => {
            let Some(program) = config.command.clone() else {
                anyhow::bail!("missing command (required when engine=command)");
            };
            tracing::info!(engine = "command", command = %program, "generation provider");
            Ok(Arc::new(CommandProvider::new(
                program,
                config.command_args.clone(),
                config.timeout,
            )))
        }
    }
}
