use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

pub mod assembler;
pub mod content;
pub mod diagram;
pub mod fit;
pub mod logging;
pub mod orchestrator;
mod paths;
pub mod pptx;
pub mod providers;
pub mod settings;
#[cfg(test)]
mod test_util;
pub mod topics;

pub use content::{ContentRequester, SlideContent, SlideDeck};
pub use diagram::{DiagramRenderer, RenderError};
pub use orchestrator::{ChapterRun, Orchestrator, ProgressSink, StdoutProgress};
pub use providers::{OpenAI, Provider, ProviderKind, ProviderUsage};
pub use topics::TopicTracker;

pub const DEFAULT_CHAPTER: &str = "Flowchart and Sequence Diagrams";

/// Command-line overrides applied on top of the loaded settings.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub chapter: String,
    pub topics_file: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub template: Option<PathBuf>,
    pub model: Option<String>,
    pub key: Option<String>,
    pub language: Option<String>,
    pub settings_path: Option<PathBuf>,
}

pub async fn run(config: Config) -> Result<ChapterRun> {
    let mut settings = settings::load_settings(config.settings_path.as_deref())?;
    if let Some(model) = config.model.filter(|value| !value.trim().is_empty()) {
        settings.api.model = model;
    }
    if let Some(language) = config.language.filter(|value| !value.trim().is_empty()) {
        settings.slides.language = language;
    }

    let kind = ProviderKind::from_name(&settings.api.provider)?;
    let key = providers::resolve_key(kind, config.key.as_deref())
        .with_context(|| "no API key found for the configured provider")?;

    let topics_file = config
        .topics_file
        .unwrap_or_else(|| settings.paths.topics_path());
    let output_dir = config
        .output_dir
        .unwrap_or_else(|| settings.paths.output_dir.clone());
    let template = config
        .template
        .unwrap_or_else(|| settings.paths.template.clone());
    if !template.is_file() {
        return Err(anyhow::anyhow!(
            "template not found: {} (create one with --init-template)",
            template.display()
        ));
    }

    info!(
        provider = kind.as_str(),
        model = %settings.api.model,
        language = %settings.slides.language,
        "starting chapter run"
    );

    let provider = providers::build_provider(kind, key, &settings.api);
    let requester = ContentRequester::new(
        provider,
        settings.slides.language.clone(),
        settings.slides.max_lines_per_slide,
    );
    let renderer = DiagramRenderer::locate(&settings.diagram);
    info!(
        renderer = %renderer
            .executable()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "none".to_string()),
        "diagram renderer resolved"
    );
    let tracker = TopicTracker::new(topics_file, output_dir);
    let orchestrator = Orchestrator::new(
        requester,
        renderer,
        tracker,
        template,
        settings.slides,
        settings.diagram,
    );

    let chapter = if config.chapter.trim().is_empty() {
        DEFAULT_CHAPTER
    } else {
        config.chapter.trim()
    };
    orchestrator.generate_chapter(chapter).await
}
