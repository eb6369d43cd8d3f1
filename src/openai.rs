use std::time::{Duration, Instant};

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{ServiceError, ServiceErrorKind};
use crate::provider::{GenerationProvider, ProviderConfig};

const SYSTEM_PROMPT: &str = "You are an educational assistant specializing in creating quizzes and learning materials. Always return valid JSON format when requested. Be accurate and educational.";

pub fn chat_completions_endpoint(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/chat/completions")
}

pub struct OpenAiChatProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    min_request_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl OpenAiChatProvider {
    pub fn new(config: &ProviderConfig, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            endpoint: chat_completions_endpoint(&config.openai_base_url),
            api_key,
            model: config.openai_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            min_request_interval: config.min_request_interval,
            last_request: Mutex::new(None),
        })
    }

    /// Spaces consecutive requests at least `min_request_interval` apart.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_request_interval {
                let wait = self.min_request_interval - elapsed;
                tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limiting provider request");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl GenerationProvider for OpenAiChatProvider {
    async fn generate_content(&self, prompt: &str) -> Result<String, ServiceError> {
        self.throttle().await;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        tracing::debug!(endpoint = %self.endpoint, model = %self.model, "POST chat completion");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let raw = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            let message = parse_error_message(&raw).unwrap_or(raw);
            tracing::warn!(%status, message = %message, "provider returned error status");
            return Err(status_error(status, message));
        }

        let value: Value = serde_json::from_str(&raw).map_err(|err| {
            ServiceError::new(
                ServiceErrorKind::MalformedResponse,
                format!("parse provider response: {err}"),
            )
        })?;
        extract_message_content(&value)
    }
}

fn transport_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::new(ServiceErrorKind::Timeout, err.to_string())
    } else {
        ServiceError::new(ServiceErrorKind::Unavailable, err.to_string())
    }
}

pub fn status_error(status: StatusCode, message: String) -> ServiceError {
    let kind = match status {
        StatusCode::BAD_REQUEST => ServiceErrorKind::BadRequest,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceErrorKind::AuthInvalid,
        StatusCode::TOO_MANY_REQUESTS => ServiceErrorKind::RateLimited,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ServiceErrorKind::Timeout,
        s if s.is_server_error() => ServiceErrorKind::ServerOverload,
        _ => ServiceErrorKind::Unavailable,
    };
    ServiceError::new(kind, format!("({status}) {message}"))
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

fn extract_message_content(value: &Value) -> Result<String, ServiceError> {
    let content = value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ServiceError::new(
                ServiceErrorKind::MalformedResponse,
                "missing `choices[0].message.content` in response",
            )
        })?;

    if content.trim().is_empty() {
        return Err(ServiceError::new(
            ServiceErrorKind::EmptyResponse,
            "provider output text is empty",
        ));
    }
    Ok(content.to_owned())
}
