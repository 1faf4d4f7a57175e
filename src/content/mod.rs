use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tera::{Context as TeraContext, Tera};

use crate::providers::ResponseSchema;

mod requester;

pub use requester::ContentRequester;

pub const SCHEMA_NAME: &str = "slides_output";
pub const ERROR_TITLE: &str = "Error";
pub const ERROR_CONTENT: &str = "Failed to generate slides";

const SYSTEM_PROMPT_TEMPLATE: &str = include_str!("prompts/system_prompt.tera");
const USER_PROMPT_TEMPLATE: &str = include_str!("prompts/user_prompt.tera");

/// One generated slide. `diagram_description` is Mermaid source, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlideContent {
    pub title: String,
    pub content: String,
    pub code_examples: String,
    pub key_points: String,
    pub presenter_notes: String,
    #[serde(rename = "mermaid_text")]
    pub diagram_description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlideDeck {
    pub slides: Vec<SlideContent>,
}

impl SlideDeck {
    /// The degraded deck substituted for any failed generation.
    pub fn error_placeholder() -> Self {
        Self {
            slides: vec![SlideContent {
                title: ERROR_TITLE.to_string(),
                content: ERROR_CONTENT.to_string(),
                ..SlideContent::default()
            }],
        }
    }

    pub fn is_error_placeholder(&self) -> bool {
        *self == Self::error_placeholder()
    }

    /// Text written into the topic's completion marker.
    pub fn dump(&self) -> Result<String> {
        serde_json::to_string_pretty(self).with_context(|| "failed to serialize slide deck")
    }
}

#[derive(Debug, Clone)]
pub struct PromptOptions<'a> {
    pub chapter: &'a str,
    pub topic: &'a str,
    pub language: &'a str,
    pub max_lines: u32,
}

pub fn response_schema() -> ResponseSchema {
    let slide = json!({
        "type": "object",
        "properties": {
            "title": {
                "type": "string",
                "description": "The title of the slide"
            },
            "content": {
                "type": "string",
                "description": "The main content of the slide with detailed explanation"
            },
            "code_examples": {
                "type": "string",
                "description": "Example code to illustrate the concept"
            },
            "key_points": {
                "type": "string",
                "description": "Key points to remember from the slide"
            },
            "presenter_notes": {
                "type": "string",
                "description": "Notes for the presenter to guide the presentation"
            },
            "mermaid_text": {
                "type": "string",
                "description": "Mermaid diagram code to be rendered as an image"
            }
        },
        "required": ["title", "content", "code_examples", "key_points", "presenter_notes", "mermaid_text"],
        "additionalProperties": false
    });

    ResponseSchema {
        name: SCHEMA_NAME.to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "slides": {
                    "type": "array",
                    "description": "An array of slides to be generated",
                    "items": slide
                }
            },
            "required": ["slides"],
            "additionalProperties": false
        }),
    }
}

pub fn render_system_prompt() -> Result<String> {
    Tera::one_off(SYSTEM_PROMPT_TEMPLATE, &TeraContext::new(), false)
        .map(|prompt| prompt.trim().to_string())
        .with_context(|| "failed to render system prompt")
}

pub fn render_user_prompt(options: &PromptOptions<'_>) -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("chapter", options.chapter.trim());
    context.insert("topic", options.topic.trim());
    context.insert("language", options.language.trim());
    context.insert("max_lines", &options.max_lines);
    context.insert("schema_name", SCHEMA_NAME);

    Tera::one_off(USER_PROMPT_TEMPLATE, &context, false)
        .map(|prompt| prompt.trim().to_string())
        .with_context(|| "failed to render user prompt")
}

/// Strictly deserializes a structured payload; unknown or missing fields are errors.
pub fn parse_deck(payload: Value) -> Result<SlideDeck> {
    let deck: SlideDeck =
        serde_json::from_value(payload).with_context(|| "response does not match slide schema")?;
    if deck.slides.is_empty() {
        return Err(anyhow!("response contains no slides"));
    }
    Ok(deck)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slide_json(title: &str) -> Value {
        json!({
            "title": title,
            "content": "Body",
            "code_examples": "",
            "key_points": "One",
            "presenter_notes": "",
            "mermaid_text": ""
        })
    }

    #[test]
    fn parses_complete_deck() {
        let deck = parse_deck(json!({"slides": [slide_json("A"), slide_json("B")]})).unwrap();
        assert_eq!(deck.slides.len(), 2);
        assert_eq!(deck.slides[1].title, "B");
        assert!(deck.slides[0].diagram_description.is_empty());
    }

    #[test]
    fn rejects_missing_field() {
        let mut slide = slide_json("A");
        slide.as_object_mut().unwrap().remove("mermaid_text");
        assert!(parse_deck(json!({"slides": [slide]})).is_err());
    }

    #[test]
    fn rejects_extra_field() {
        let mut slide = slide_json("A");
        slide["image_url"] = json!("http://example.com");
        assert!(parse_deck(json!({"slides": [slide]})).is_err());
        assert!(parse_deck(json!({"slides": [slide_json("A")], "extra": 1})).is_err());
    }

    #[test]
    fn rejects_empty_deck() {
        let err = parse_deck(json!({"slides": []})).unwrap_err();
        assert!(err.to_string().contains("no slides"));
    }

    #[test]
    fn placeholder_deck_shape() {
        let deck = SlideDeck::error_placeholder();
        assert_eq!(deck.slides.len(), 1);
        assert_eq!(deck.slides[0].title, "Error");
        assert_eq!(deck.slides[0].content, "Failed to generate slides");
        assert!(deck.is_error_placeholder());
        let dump = deck.dump().unwrap();
        assert!(dump.contains("\"mermaid_text\": \"\""));
    }

    #[test]
    fn schema_requires_exactly_six_fields() {
        let schema = response_schema();
        assert_eq!(schema.name, "slides_output");
        let items = &schema.schema["properties"]["slides"]["items"];
        assert_eq!(items["required"].as_array().unwrap().len(), 6);
        assert_eq!(items["properties"].as_object().unwrap().len(), 6);
        assert_eq!(items["additionalProperties"], false);
        assert_eq!(schema.schema["additionalProperties"], false);
    }
}
