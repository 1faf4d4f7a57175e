use anyhow::{Result, anyhow};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

mod openai;

pub use openai::OpenAI;

use crate::settings::ApiSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAI,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAI),
            other => Err(anyhow!("unsupported API provider: {}", other)),
        }
    }
}

/// JSON schema the response payload must conform to.
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderResponse {
    pub payload: serde_json::Value,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
}

#[derive(Debug, Clone, Copy)]
pub enum MessageRole {
    System,
    User,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: String) -> Self {
        Self {
            role: MessageRole::System,
            content,
        }
    }

    pub fn user(content: String) -> Self {
        Self {
            role: MessageRole::User,
            content,
        }
    }
}

pub type ProviderFuture = Pin<Box<dyn Future<Output = Result<ProviderResponse>> + Send>>;

pub trait Provider: Clone + Send + Sync {
    fn append_system_input(self, input: String) -> Self;
    fn append_user_input(self, input: String) -> Self;
    fn with_response_schema(self, schema: ResponseSchema) -> Self;
    fn generate(self) -> ProviderFuture;
}

pub fn build_provider(kind: ProviderKind, key: String, api: &ApiSettings) -> OpenAI {
    match kind {
        ProviderKind::OpenAI => OpenAI::new(key)
            .with_model(api.model.clone())
            .with_sampling(api.temperature, api.max_tokens)
            .with_timeout_secs(api.timeout_secs)
            .with_base_url(api.base_url.clone().unwrap_or_default()),
    }
}

pub fn resolve_key(kind: ProviderKind, override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key.filter(|key| !key.trim().is_empty()) {
        return Ok(key.to_string());
    }

    match kind {
        ProviderKind::OpenAI => get_env("OPENAI_API_KEY"),
    }
    .ok_or_else(|| anyhow!("OPENAI_API_KEY environment variable is not set"))
}

pub(crate) fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
