use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::assembler::{DeckAssembler, assemble_deck};
use crate::content::{ContentRequester, SlideDeck};
use crate::diagram::DiagramRenderer;
use crate::providers::Provider;
use crate::settings::{DiagramSettings, SlideSettings};
use crate::topics::TopicTracker;

/// Receives the human-readable progress lines of a run.
pub trait ProgressSink: Send + Sync {
    fn report(&self, line: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutProgress;

impl ProgressSink for StdoutProgress {
    fn report(&self, line: &str) {
        println!("{}", line);
    }
}

/// Keeps every progress line in memory.
#[derive(Debug, Clone, Default)]
pub struct CollectedProgress {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CollectedProgress {
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

impl ProgressSink for CollectedProgress {
    fn report(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterRun {
    pub document: PathBuf,
    pub generated: Vec<String>,
    pub skipped: Vec<String>,
    /// Topics whose generation fell back to the error deck.
    pub failed: Vec<String>,
}

pub struct Orchestrator<P: Provider> {
    requester: ContentRequester<P>,
    renderer: DiagramRenderer,
    tracker: TopicTracker,
    template: PathBuf,
    slides: SlideSettings,
    diagram: DiagramSettings,
    progress: Box<dyn ProgressSink>,
}

impl<P: Provider> Orchestrator<P> {
    pub fn new(
        requester: ContentRequester<P>,
        renderer: DiagramRenderer,
        tracker: TopicTracker,
        template: impl Into<PathBuf>,
        slides: SlideSettings,
        diagram: DiagramSettings,
    ) -> Self {
        Self {
            requester,
            renderer,
            tracker,
            template: template.into(),
            slides,
            diagram,
            progress: Box::new(StdoutProgress),
        }
    }

    pub fn with_progress(mut self, progress: impl ProgressSink + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    /// Generates every topic of `chapter` that has no completion file yet, one at a time.
    pub async fn generate_chapter(&self, chapter: &str) -> Result<ChapterRun> {
        let folder = self.tracker.ensure_chapter_folder(chapter)?;
        let topics = self.tracker.list_pending_topics(chapter)?;
        info!(
            chapter,
            topics_file = %self.tracker.topics_file().display(),
            count = topics.len(),
            "loaded topics"
        );
        let document = self.tracker.document_path(chapter)?;
        let mut run = ChapterRun {
            document: document.clone(),
            ..ChapterRun::default()
        };

        for topic in topics {
            let sentinel = self.tracker.topic_completion_path(chapter, &topic)?;
            if self.tracker.is_topic_done(chapter, &topic)? {
                info!(chapter, topic = %topic, "topic already generated");
                self.progress.report(&format!(
                    "File {} already exists. Skipping regeneration.",
                    sentinel.display()
                ));
                run.skipped.push(topic);
                continue;
            }

            self.progress
                .report(&format!("Generating slides for topic: {}", topic));
            let deck = self.requester.request(chapter, &topic).await;

            self.assemble(&document, chapter, &topic, &deck).await?;
            self.tracker.mark_topic_done(chapter, &topic, &deck.dump()?)?;
            info!(chapter, topic = %topic, path = %document.display(), "topic completed");

            if deck.is_error_placeholder() {
                run.failed.push(topic.clone());
            }
            run.generated.push(topic);
        }

        self.progress.report(&format!(
            "All slides have been successfully generated in folder {}",
            folder.display()
        ));
        Ok(run)
    }

    async fn assemble(
        &self,
        document: &Path,
        chapter: &str,
        topic: &str,
        deck: &SlideDeck,
    ) -> Result<()> {
        let mut assembler = DeckAssembler::open(
            &self.template,
            document,
            &self.renderer,
            &self.slides,
            &self.diagram,
        )?;
        assemble_deck(&mut assembler, chapter, topic, deck).await
    }
}
