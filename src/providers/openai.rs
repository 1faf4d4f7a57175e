use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{
    Message, MessageRole, Provider, ProviderFuture, ProviderResponse, ProviderUsage,
    ResponseSchema, get_env,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_MODEL: &str = "gpt-4.1";

#[derive(Debug, Clone)]
pub struct OpenAI {
    key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    messages: Vec<Message>,
    schema: Option<ResponseSchema>,
}

impl OpenAI {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            base_url: base_url(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            timeout: Duration::from_secs(120),
            messages: Vec::new(),
            schema: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        if !base_url.trim().is_empty() {
            self.base_url = base_url.trim_end_matches('/').to_string();
        }
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs.max(1));
        self
    }
}

impl Provider for OpenAI {
    fn append_system_input(mut self, input: String) -> Self {
        self.messages.push(Message::system(input));
        self
    }

    fn append_user_input(mut self, input: String) -> Self {
        self.messages.push(Message::user(input));
        self
    }

    fn with_response_schema(mut self, schema: ResponseSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    fn generate(self) -> ProviderFuture {
        Box::pin(async move { call_with_chat_completions(self).await })
    }
}

fn base_url() -> String {
    get_env("OPENAI_API_BASE")
        .or_else(|| get_env("OPENAI_BASE_URL"))
        .map(|url| url.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

fn request_body(provider: &OpenAI) -> Result<serde_json::Value> {
    let schema = provider
        .schema
        .as_ref()
        .ok_or_else(|| anyhow!("no response schema registered"))?;
    let messages = provider
        .messages
        .iter()
        .map(|message| match message.role {
            MessageRole::System => json!({"role": "system", "content": message.content}),
            MessageRole::User => json!({"role": "user", "content": message.content}),
        })
        .collect::<Vec<_>>();

    Ok(json!({
        "model": provider.model,
        "messages": messages,
        "temperature": provider.temperature,
        "max_tokens": provider.max_tokens,
        "response_format": {
            "type": "json_schema",
            "json_schema": {
                "name": schema.name,
                "strict": true,
                "schema": schema.schema
            }
        }
    }))
}

async fn call_with_chat_completions(provider: OpenAI) -> Result<ProviderResponse> {
    let client = reqwest::Client::builder()
        .timeout(provider.timeout)
        .build()
        .with_context(|| "failed to build HTTP client")?;
    let url = format!("{}/chat/completions", provider.base_url);
    let body = request_body(&provider)?;

    debug!(model = %provider.model, url = %url, "requesting structured completion");
    let response = client
        .post(&url)
        .bearer_auth(&provider.key)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("failed to reach {}", url))?;

    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if status.is_success() {
        return extract_structured_response(&text, &provider.model);
    }
    Err(anyhow!(
        "OpenAI API error ({}): {}",
        status,
        extract_openai_error(&text).unwrap_or(text)
    ))
}

fn extract_structured_response(text: &str, fallback_model: &str) -> Result<ProviderResponse> {
    let payload: OpenAIResponse =
        serde_json::from_str(text).with_context(|| "failed to parse OpenAI response JSON")?;
    let message = payload
        .choices
        .first()
        .map(|choice| &choice.message)
        .ok_or_else(|| anyhow!("no choices returned from OpenAI"))?;

    if let Some(refusal) = message.refusal.as_deref() {
        if !refusal.trim().is_empty() {
            return Err(anyhow!("OpenAI refused the request: {}", refusal));
        }
    }
    let content = message
        .content
        .as_deref()
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| anyhow!("empty message content from OpenAI"))?;

    let structured: serde_json::Value = serde_json::from_str(content)
        .with_context(|| "failed to parse OpenAI structured content")?;
    let model = payload
        .model
        .filter(|value| !value.trim().is_empty())
        .or_else(|| Some(fallback_model.to_string()));
    let usage = payload.usage.map(|usage| ProviderUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    });
    Ok(ProviderResponse {
        payload: structured,
        model,
        usage,
    })
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<OpenAIError>,
    }

    #[derive(Deserialize)]
    struct OpenAIError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        code: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    Some(format_error_parts(error.message, error.kind, error.code))
}

fn format_error_parts(
    message: Option<String>,
    kind: Option<String>,
    code: Option<String>,
) -> String {
    let mut parts = Vec::new();
    if let Some(message) = message.filter(|value| !value.trim().is_empty()) {
        parts.push(message);
    }
    if let Some(kind) = kind.filter(|value| !value.trim().is_empty()) {
        parts.push(format!("type: {}", kind));
    }
    if let Some(code) = code.filter(|value| !value.trim().is_empty()) {
        parts.push(format!("code: {}", code));
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(" | ")
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    model: Option<String>,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRUCTURED_RESPONSE: &str = r#"{
  "id": "chatcmpl-1",
  "object": "chat.completion",
  "model": "gpt-4.1-2025-04-14",
  "choices": [
    {
      "index": 0,
      "message": {
        "role": "assistant",
        "content": "{\"slides\":[{\"title\":\"Flowcharts\",\"content\":\"Boxes and arrows\",\"code_examples\":\"\",\"key_points\":\"Start with a goal\",\"presenter_notes\":\"Keep it short\",\"mermaid_text\":\"graph TD; A-->B\"}]}",
        "refusal": null
      },
      "finish_reason": "stop"
    }
  ],
  "usage": {"prompt_tokens": 120, "completion_tokens": 80, "total_tokens": 200}
}"#;

    #[test]
    fn parses_structured_content_as_json() {
        let response = extract_structured_response(STRUCTURED_RESPONSE, "gpt-4.1").unwrap();
        assert_eq!(response.model.as_deref(), Some("gpt-4.1-2025-04-14"));
        assert_eq!(response.payload["slides"][0]["title"], "Flowcharts");
        assert_eq!(response.payload["slides"][0]["mermaid_text"], "graph TD; A-->B");
        let usage = response.usage.unwrap();
        assert_eq!(usage.total_tokens, Some(200));
    }

    #[test]
    fn content_that_is_not_json_is_an_error() {
        let body = r#"{"choices":[{"message":{"content":"{'slides': []}"}}]}"#;
        let err = extract_structured_response(body, "gpt-4.1").unwrap_err();
        assert!(err.to_string().contains("structured content"));
    }

    #[test]
    fn refusal_is_an_error() {
        let body = r#"{"choices":[{"message":{"content":null,"refusal":"cannot help"}}]}"#;
        let err = extract_structured_response(body, "gpt-4.1").unwrap_err();
        assert!(err.to_string().contains("cannot help"));
    }

    #[test]
    fn error_body_is_summarised() {
        let body = r#"{"error":{"message":"Invalid schema","type":"invalid_request_error","code":null}}"#;
        assert_eq!(
            extract_openai_error(body).as_deref(),
            Some("Invalid schema | type: invalid_request_error")
        );
        assert!(extract_openai_error("<html>").is_none());
    }

    #[test]
    fn request_body_carries_strict_schema_and_sampling() {
        let provider = OpenAI::new("sk-test")
            .with_model("gpt-4o")
            .with_sampling(0.3, 512)
            .append_system_input("system".to_string())
            .append_user_input("user".to_string())
            .with_response_schema(ResponseSchema {
                name: "slides_output".to_string(),
                schema: json!({"type": "object"}),
            });
        let body = request_body(&provider).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "user");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert_eq!(body["response_format"]["json_schema"]["name"], "slides_output");
    }

    #[test]
    fn configured_base_url_drops_trailing_slash() {
        let provider = OpenAI::new("sk-test").with_base_url("http://localhost:11434/v1/");
        assert_eq!(provider.base_url, "http://localhost:11434/v1");
        let unchanged = provider.clone().with_base_url("  ");
        assert_eq!(unchanged.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn request_without_schema_is_rejected() {
        let provider = OpenAI::new("sk-test").append_user_input("user".to_string());
        assert!(request_body(&provider).is_err());
    }
}
