use anyhow::Result;
use tracing::{debug, error, info};

use crate::providers::Provider;

use super::{PromptOptions, SlideDeck, parse_deck, render_system_prompt, render_user_prompt, response_schema};

/// Asks the text-generation service for one deck per chapter/topic pair.
#[derive(Debug, Clone)]
pub struct ContentRequester<P: Provider> {
    provider: P,
    language: String,
    max_lines: u32,
}

impl<P: Provider> ContentRequester<P> {
    pub fn new(provider: P, language: impl Into<String>, max_lines: u32) -> Self {
        Self {
            provider,
            language: language.into(),
            max_lines,
        }
    }

    /// Never fails: any error is logged and replaced by [`SlideDeck::error_placeholder`].
    pub async fn request(&self, chapter: &str, topic: &str) -> SlideDeck {
        match self.try_request(chapter, topic).await {
            Ok(deck) => {
                info!(chapter, topic, slides = deck.slides.len(), "generated slide deck");
                deck
            }
            Err(err) => {
                error!(chapter, topic, "failed to generate slides: {:#}", err);
                SlideDeck::error_placeholder()
            }
        }
    }

    pub async fn try_request(&self, chapter: &str, topic: &str) -> Result<SlideDeck> {
        let system_prompt = render_system_prompt()?;
        let user_prompt = render_user_prompt(&PromptOptions {
            chapter,
            topic,
            language: &self.language,
            max_lines: self.max_lines,
        })?;

        let response = self
            .provider
            .clone()
            .with_response_schema(response_schema())
            .append_system_input(system_prompt)
            .append_user_input(user_prompt)
            .generate()
            .await?;

        if let Some(usage) = response.usage.as_ref() {
            debug!(
                chapter,
                topic,
                model = response.model.as_deref().unwrap_or("unknown"),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "token usage"
            );
        }

        parse_deck(response.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ProviderFuture, ProviderResponse, ResponseSchema};
    use anyhow::anyhow;
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct ScriptedProvider {
        payload: Option<Value>,
        seen: Arc<Mutex<Vec<String>>>,
        schema: Option<String>,
    }

    impl Provider for ScriptedProvider {
        fn append_system_input(self, input: String) -> Self {
            self.seen.lock().unwrap().push(input);
            self
        }

        fn append_user_input(self, input: String) -> Self {
            self.seen.lock().unwrap().push(input);
            self
        }

        fn with_response_schema(mut self, schema: ResponseSchema) -> Self {
            self.schema = Some(schema.name);
            self
        }

        fn generate(self) -> ProviderFuture {
            Box::pin(async move {
                if self.schema.is_none() {
                    return Err(anyhow!("schema missing"));
                }
                match self.payload {
                    Some(payload) => Ok(ProviderResponse {
                        payload,
                        model: None,
                        usage: None,
                    }),
                    None => Err(anyhow!("connection refused")),
                }
            })
        }
    }

    #[tokio::test]
    async fn remote_failure_yields_placeholder_deck() {
        let requester = ContentRequester::new(ScriptedProvider::default(), "English", 7);
        let deck = requester.request("Diagrams", "Flowcharts").await;
        assert_eq!(deck, SlideDeck::error_placeholder());
    }

    #[tokio::test]
    async fn malformed_payload_yields_placeholder_deck() {
        let provider = ScriptedProvider {
            payload: Some(json!({"slides": [{"title": "only a title"}]})),
            ..ScriptedProvider::default()
        };
        let requester = ContentRequester::new(provider, "English", 7);
        let deck = requester.request("Diagrams", "Flowcharts").await;
        assert!(deck.is_error_placeholder());
    }

    #[tokio::test]
    async fn successful_payload_is_parsed_and_prompts_are_sent() {
        let provider = ScriptedProvider {
            payload: Some(json!({"slides": [{
                "title": "Flowcharts",
                "content": "Boxes\nArrows",
                "code_examples": "",
                "key_points": "Keep it simple",
                "presenter_notes": "Pause here",
                "mermaid_text": "graph TD; A-->B"
            }]})),
            ..ScriptedProvider::default()
        };
        let seen = provider.seen.clone();
        let requester = ContentRequester::new(provider, "German", 7);
        let deck = requester.request("Diagrams", "Flowcharts").await;
        assert_eq!(deck.slides.len(), 1);
        assert_eq!(deck.slides[0].diagram_description, "graph TD; A-->B");

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], "You are a professional slide content generator.");
        assert!(seen[1].contains("about Flowcharts for the chapter Diagrams"));
        assert!(seen[1].ends_with("Language Contents must be German ."));
    }
}
