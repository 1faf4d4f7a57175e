use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::content::{SlideContent, SlideDeck};
use crate::diagram::DiagramRenderer;
use crate::fit::{self, DisplaySize};
use crate::pptx::{Frame, Presentation, SlideHandle, TextStyle};
use crate::settings::{DiagramSettings, SlideSettings};

const CODE_BLOCK_FRAME: Frame = Frame {
    left: 0.5,
    top: 4.5,
    width: 12.0,
    height: 2.0,
};
const CODE_BLOCK_HEADING: &str = "Code Examples:";

/// How a rendered diagram is sized before it is centered on the slide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiagramPlacement {
    /// Scale down to the configured bounds, keeping the aspect ratio.
    Fit,
    Fixed(DisplaySize),
}

pub struct DeckAssembler<'a> {
    document: Presentation,
    renderer: &'a DiagramRenderer,
    slides: SlideSettings,
    bounds: DisplaySize,
    dpi: f64,
}

impl<'a> DeckAssembler<'a> {
    pub fn open(
        template: &Path,
        output: &Path,
        renderer: &'a DiagramRenderer,
        slides: &SlideSettings,
        diagram: &DiagramSettings,
    ) -> Result<Self> {
        let document = Presentation::open(template, output)?;
        Ok(Self {
            document,
            renderer,
            slides: slides.clone(),
            bounds: DisplaySize {
                width: diagram.max_width,
                height: diagram.max_height,
            },
            dpi: diagram.dpi,
        })
    }

    pub fn document(&self) -> &Presentation {
        &self.document
    }

    pub fn add_title_slide(&mut self, title: &str, subtitle: &str) -> SlideHandle {
        let style = TextStyle::sized(self.slides.title_font_size);
        self.document.add_title_slide(title, subtitle, &style)
    }

    pub fn add_content_slide(&mut self, content: &SlideContent) -> SlideHandle {
        let title_style = TextStyle::sized(self.slides.title_font_size);
        let body_style = TextStyle::sized(self.slides.content_font_size);
        self.document
            .add_content_slide(&content.title, &content.content, &title_style, &body_style)
    }

    /// Renders `description` and places it centered on the slide. Returns false when the
    /// slide keeps no diagram; failures are logged, never returned.
    pub async fn embed_diagram(
        &mut self,
        slide: SlideHandle,
        description: &str,
        placement: DiagramPlacement,
    ) -> bool {
        if description.trim().is_empty() {
            return false;
        }
        let image = match self.renderer.render(description).await {
            Ok(image) => image,
            Err(err) => {
                warn!("diagram skipped: {}", err);
                return false;
            }
        };

        let size = match placement {
            DiagramPlacement::Fit => fit::display_size_for_image(image.path(), self.bounds, self.dpi),
            DiagramPlacement::Fixed(size) => size,
        };
        let offset = fit::center_in(fit::SLIDE_CANVAS, size);
        let frame = Frame {
            left: offset.left,
            top: offset.top,
            width: size.width,
            height: size.height,
        };
        match self.document.add_picture(slide, image.path(), frame) {
            Ok(()) => {
                debug!(width = size.width, height = size.height, "embedded diagram");
                true
            }
            Err(err) => {
                warn!("failed to embed diagram: {:#}", err);
                false
            }
        }
    }

    /// Returns false when there is no code to show.
    pub fn add_code_block(&mut self, slide: SlideHandle, code: &str) -> Result<bool> {
        if code.trim().is_empty() {
            return Ok(false);
        }
        let style = TextStyle {
            size_pt: Some(self.slides.code_font_size),
            typeface: Some(self.slides.code_font.clone()),
            align_left: true,
        };
        let text = format!("{}\n{}", CODE_BLOCK_HEADING, code);
        self.document
            .add_text_box(slide, CODE_BLOCK_FRAME, &text, &style)?;
        Ok(true)
    }

    pub fn add_presenter_notes(&mut self, slide: SlideHandle, notes: &str) -> Result<bool> {
        if notes.trim().is_empty() {
            return Ok(false);
        }
        self.document.set_notes(slide, notes)?;
        Ok(true)
    }

    pub fn save(&mut self) -> Result<()> {
        self.document.save().with_context(|| {
            format!(
                "failed to save presentation {}",
                self.document.path().display()
            )
        })
    }
}

/// Appends the title slide and one slide per entry of `deck`, then saves once.
pub async fn assemble_deck(
    assembler: &mut DeckAssembler<'_>,
    chapter: &str,
    topic: &str,
    deck: &SlideDeck,
) -> Result<()> {
    assembler.add_title_slide(topic, chapter);

    for (index, content) in deck.slides.iter().enumerate() {
        let slide = assembler.add_content_slide(content);
        let diagram = assembler
            .embed_diagram(slide, &content.diagram_description, DiagramPlacement::Fit)
            .await;
        let code = assembler
            .add_code_block(slide, &content.code_examples)
            .unwrap_or_else(|err| {
                warn!(chapter, topic, slide = index + 1, "code block skipped: {:#}", err);
                false
            });
        let notes = assembler
            .add_presenter_notes(slide, &content.presenter_notes)
            .unwrap_or_else(|err| {
                warn!(chapter, topic, slide = index + 1, "presenter notes skipped: {:#}", err);
                false
            });
        info!(
            chapter,
            topic,
            slide = index + 1,
            title = %content.title,
            diagram,
            code,
            notes,
            "added slide"
        );
    }

    assembler.save()
}
