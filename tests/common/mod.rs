#![allow(dead_code)]

use anyhow::anyhow;
use serde_json::{Value, json};
use slide_genie::orchestrator::CollectedProgress;
use slide_genie::providers::{Provider, ProviderFuture, ProviderResponse, ResponseSchema};
use slide_genie::settings::{DiagramSettings, SlideSettings};
use slide_genie::{ContentRequester, DiagramRenderer, Orchestrator, TopicTracker};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Answers every request with the same payload, or fails when it has none.
#[derive(Clone, Default)]
pub struct MockProvider {
    payload: Option<Value>,
    calls: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn answering(payload: Value) -> Self {
        Self {
            payload: Some(payload),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Provider for MockProvider {
    fn append_system_input(self, _input: String) -> Self {
        self
    }

    fn append_user_input(self, _input: String) -> Self {
        self
    }

    fn with_response_schema(self, _schema: ResponseSchema) -> Self {
        self
    }

    fn generate(self) -> ProviderFuture {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.payload {
                Some(payload) => Ok(ProviderResponse {
                    payload,
                    model: Some("mock".to_string()),
                    usage: None,
                }),
                None => Err(anyhow!("connection reset by peer")),
            }
        })
    }
}

pub fn one_slide(diagram: &str) -> Value {
    json!({"slides": [{
        "title": "What is a flowchart",
        "content": "Boxes are steps\nArrows are transitions",
        "code_examples": "",
        "key_points": "Start and end nodes",
        "presenter_notes": "Ask who has drawn one",
        "mermaid_text": diagram
    }]})
}

pub struct Workspace {
    pub dir: tempfile::TempDir,
    pub template: PathBuf,
    pub topics: PathBuf,
    pub output: PathBuf,
}

impl Workspace {
    pub fn new(topics: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("data").join("Base.pptx");
        slide_genie::pptx::write_default_template(&template).unwrap();
        let topics_path = dir.path().join("data").join("Topics.txt");
        std::fs::write(&topics_path, topics).unwrap();
        let output = dir.path().join("output");
        Self {
            dir,
            template,
            topics: topics_path,
            output,
        }
    }

    pub fn chapter_dir(&self, chapter: &str) -> PathBuf {
        self.output.join(chapter)
    }

    pub fn orchestrator(
        &self,
        provider: MockProvider,
        renderer: Option<&Path>,
        progress: CollectedProgress,
    ) -> Orchestrator<MockProvider> {
        let diagram = DiagramSettings::default();
        Orchestrator::new(
            ContentRequester::new(provider, "English", 7),
            DiagramRenderer::with_executable(renderer.map(Path::to_path_buf), &diagram),
            TopicTracker::new(&self.topics, &self.output),
            &self.template,
            SlideSettings::default(),
            diagram,
        )
        .with_progress(progress)
    }
}
