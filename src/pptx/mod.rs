//! Minimal PresentationML editor: appends slides, pictures, text boxes and notes to an
//! existing `.pptx` built from a template.

use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};

mod package;
pub mod template;
mod xml;

use package::{
    CONTENT_TYPES_PART, CT_NOTES_MASTER, CT_NOTES_SLIDE, CT_SLIDE, CT_THEME, ContentTypes, Package,
    RT_IMAGE, RT_NOTES_MASTER, RT_NOTES_SLIDE, RT_OFFICE_DOCUMENT, RT_SLIDE, RT_SLIDE_LAYOUT,
    RT_THEME, ROOT_RELS_PART, Relationships, relative_target, resolve_target,
};
use xml::{EmuFrame, RunStyle};

pub use template::write_default_template;

const TITLE_LAYOUT: usize = 0;
const CONTENT_LAYOUT: usize = 1;
const FIRST_SLIDE_ID: u32 = 256;

/// Shape position and size in inches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Frame {
    fn to_emu(self) -> EmuFrame {
        EmuFrame {
            x: xml::emu(self.left),
            y: xml::emu(self.top),
            cx: xml::emu(self.width),
            cy: xml::emu(self.height),
        }
    }

    fn from_emu(frame: EmuFrame) -> Self {
        Self {
            left: xml::inches(frame.x),
            top: xml::inches(frame.y),
            width: xml::inches(frame.cx),
            height: xml::inches(frame.cy),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextStyle {
    pub size_pt: Option<u32>,
    pub typeface: Option<String>,
    pub align_left: bool,
}

impl TextStyle {
    pub fn sized(size_pt: u32) -> Self {
        Self {
            size_pt: Some(size_pt),
            ..Self::default()
        }
    }

    fn run_style(&self) -> RunStyle<'_> {
        RunStyle {
            size_pt: self.size_pt,
            typeface: self.typeface.as_deref(),
            align_left: self.align_left,
        }
    }
}

/// A slide added since the last save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlideHandle(usize);

#[derive(Debug)]
enum Shape {
    Xml(String),
    Picture {
        id: u32,
        data: Vec<u8>,
        extension: String,
        mime: String,
        frame: EmuFrame,
    },
}

#[derive(Debug)]
struct PendingSlide {
    layout: usize,
    shapes: Vec<Shape>,
    notes: Option<String>,
    next_shape_id: u32,
}

impl PendingSlide {
    fn new(layout: usize) -> Self {
        Self {
            layout,
            shapes: Vec::new(),
            notes: None,
            next_shape_id: 2,
        }
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_shape_id;
        self.next_shape_id += 1;
        id
    }
}

#[derive(Debug)]
pub struct Presentation {
    path: PathBuf,
    package: Package,
    main_part: String,
    layouts: Vec<String>,
    pending: Vec<PendingSlide>,
    saved_handles: usize,
}

impl Presentation {
    /// Copies `template` to `output` unless `output` already exists, then loads `output`.
    pub fn open(template: &Path, output: &Path) -> Result<Self> {
        if !template.is_file() {
            return Err(anyhow!("template not found: {}", template.display()));
        }
        if !output.exists() {
            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create directory {}", parent.display()))?;
            }
            fs::copy(template, output).with_context(|| {
                format!(
                    "failed to copy template {} to {}",
                    template.display(),
                    output.display()
                )
            })?;
        }
        Self::load(output)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let package = Package::read(path)?;
        let main_part = main_part(&package)?;
        let layouts = resolve_layouts(&package, &main_part)
            .with_context(|| format!("invalid presentation: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            package,
            main_part,
            layouts,
            pending: Vec::new(),
            saved_handles: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add_title_slide(&mut self, title: &str, subtitle: &str, style: &TextStyle) -> SlideHandle {
        let mut slide = PendingSlide::new(TITLE_LAYOUT);
        let title_id = slide.allocate_id();
        slide.shapes.push(Shape::Xml(xml::placeholder_xml(
            title_id,
            "Title 1",
            "<p:ph type=\"ctrTitle\"/>",
            title,
            &style.run_style(),
        )));
        let subtitle_id = slide.allocate_id();
        slide.shapes.push(Shape::Xml(xml::placeholder_xml(
            subtitle_id,
            "Subtitle 2",
            "<p:ph type=\"subTitle\" idx=\"1\"/>",
            subtitle,
            &RunStyle::default(),
        )));
        self.push(slide)
    }

    pub fn add_content_slide(
        &mut self,
        title: &str,
        body: &str,
        title_style: &TextStyle,
        body_style: &TextStyle,
    ) -> SlideHandle {
        let mut slide = PendingSlide::new(CONTENT_LAYOUT);
        let title_id = slide.allocate_id();
        slide.shapes.push(Shape::Xml(xml::placeholder_xml(
            title_id,
            "Title 1",
            "<p:ph type=\"title\"/>",
            title,
            &title_style.run_style(),
        )));
        let body_id = slide.allocate_id();
        slide.shapes.push(Shape::Xml(xml::placeholder_xml(
            body_id,
            "Content Placeholder 2",
            "<p:ph idx=\"1\"/>",
            body,
            &body_style.run_style(),
        )));
        self.push(slide)
    }

    /// Reads the image immediately, so the source file may be removed afterwards.
    pub fn add_picture(&mut self, slide: SlideHandle, source: &Path, frame: Frame) -> Result<()> {
        let data = fs::read(source)
            .with_context(|| format!("failed to read image {}", source.display()))?;
        let (extension, mime) = match image::guess_format(&data) {
            Ok(format) => (
                format
                    .extensions_str()
                    .first()
                    .copied()
                    .unwrap_or("png")
                    .to_string(),
                format.to_mime_type().to_string(),
            ),
            Err(_) => ("png".to_string(), "image/png".to_string()),
        };
        let pending = self.pending_mut(slide)?;
        let id = pending.allocate_id();
        pending.shapes.push(Shape::Picture {
            id,
            data,
            extension,
            mime,
            frame: frame.to_emu(),
        });
        Ok(())
    }

    pub fn add_text_box(
        &mut self,
        slide: SlideHandle,
        frame: Frame,
        text: &str,
        style: &TextStyle,
    ) -> Result<()> {
        let pending = self.pending_mut(slide)?;
        let id = pending.allocate_id();
        let name = format!("TextBox {}", id - 1);
        pending.shapes.push(Shape::Xml(xml::text_box_xml(
            id,
            &name,
            frame.to_emu(),
            text,
            &style.run_style(),
        )));
        Ok(())
    }

    pub fn set_notes(&mut self, slide: SlideHandle, notes: &str) -> Result<()> {
        self.pending_mut(slide)?.notes = Some(notes.to_string());
        Ok(())
    }

    /// Writes every slide added since the last save into the package and the package to disk.
    pub fn save(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        self.saved_handles += pending.len();
        let mut types = ContentTypes::parse(self.package.require(CONTENT_TYPES_PART)?)?;
        let mut main_rels = self.package.relationships(&self.main_part)?;
        let mut main_xml = self.package.require(&self.main_part)?.to_vec();

        let mut next_id = xml::read_slide_list(&main_xml)?
            .iter()
            .map(|slide| slide.id + 1)
            .max()
            .unwrap_or(FIRST_SLIDE_ID)
            .max(FIRST_SLIDE_ID);
        let mut slide_ids = String::new();

        for slide in pending {
            let part = self.package.next_numbered("ppt/slides/slide", "xml");
            let layout = self
                .layouts
                .get(slide.layout)
                .ok_or_else(|| anyhow!("layout {} is not available", slide.layout))?;
            let mut rels = Relationships::default();
            rels.add(RT_SLIDE_LAYOUT, relative_target(&part, layout));

            let mut shapes = String::new();
            for shape in slide.shapes {
                match shape {
                    Shape::Xml(fragment) => shapes.push_str(&fragment),
                    Shape::Picture {
                        id,
                        data,
                        extension,
                        mime,
                        frame,
                    } => {
                        let media = self.package.next_numbered("ppt/media/image", &extension);
                        self.package.insert(media.clone(), data);
                        types.ensure_default(&extension, &mime);
                        let rel_id = rels.add(RT_IMAGE, relative_target(&part, &media));
                        let name = format!("Picture {}", id - 1);
                        shapes.push_str(&xml::picture_xml(id, &name, &rel_id, frame));
                    }
                }
            }

            if let Some(notes) = slide.notes {
                let master = self.ensure_notes_master(&mut types, &mut main_rels, &mut main_xml)?;
                let notes_part = self.package.next_numbered("ppt/notesSlides/notesSlide", "xml");
                let mut notes_rels = Relationships::default();
                notes_rels.add(RT_NOTES_MASTER, relative_target(&notes_part, &master));
                notes_rels.add(RT_SLIDE, relative_target(&notes_part, &part));
                self.package.set_relationships(&notes_part, &notes_rels);
                self.package.insert(notes_part.clone(), xml::notes_slide_xml(&notes));
                types.set_override(&notes_part, CT_NOTES_SLIDE);
                rels.add(RT_NOTES_SLIDE, relative_target(&part, &notes_part));
            }

            self.package.set_relationships(&part, &rels);
            self.package.insert(part.clone(), xml::slide_xml(&shapes));
            types.set_override(&part, CT_SLIDE);

            let rel_id = main_rels.add(RT_SLIDE, relative_target(&self.main_part, &part));
            slide_ids.push_str(&format!("<p:sldId id=\"{}\" r:id=\"{}\"/>", next_id, rel_id));
            next_id += 1;
        }

        if !slide_ids.is_empty() {
            main_xml = xml::append_to_list(
                &main_xml,
                "p:sldIdLst",
                &slide_ids,
                &["p:sldSz", "p:notesSz", "p:defaultTextStyle"],
            )?;
        }

        self.package.insert(CONTENT_TYPES_PART, types.to_xml());
        self.package.set_relationships(&self.main_part, &main_rels);
        self.package.insert(self.main_part.clone(), main_xml);
        self.package.write(&self.path)
    }

    /// Slides in the document, including unsaved ones.
    pub fn slide_count(&self) -> Result<usize> {
        Ok(self.saved_slide_parts()?.len() + self.pending.len())
    }

    /// Pictures in the document, including unsaved ones.
    pub fn picture_count(&self) -> Result<usize> {
        let mut count = 0;
        for part in self.saved_slide_parts()? {
            count += xml::count_elements(self.package.require(&part)?, b"pic")?;
        }
        let pending = self
            .pending
            .iter()
            .flat_map(|slide| slide.shapes.iter())
            .filter(|shape| matches!(shape, Shape::Picture { .. }))
            .count();
        Ok(count + pending)
    }

    /// Position and size of every picture on a saved slide.
    pub fn picture_frames(&self, index: usize) -> Result<Vec<Frame>> {
        let part = self.saved_slide_part(index)?;
        let frames = xml::read_picture_frames(self.package.require(&part)?)?;
        Ok(frames.into_iter().map(Frame::from_emu).collect())
    }

    /// Text of a saved slide, one paragraph per line.
    pub fn slide_text(&self, index: usize) -> Result<String> {
        let part = self.saved_slide_part(index)?;
        xml::extract_text(self.package.require(&part)?)
    }

    /// Presenter notes of a saved slide, if it has any.
    pub fn notes_text(&self, index: usize) -> Result<Option<String>> {
        let part = self.saved_slide_part(index)?;
        let rels = self.package.relationships(&part)?;
        match rels.first_of_type(RT_NOTES_SLIDE) {
            Some(rel) => {
                let notes_part = resolve_target(&part, &rel.target);
                xml::extract_text(self.package.require(&notes_part)?).map(Some)
            }
            None => Ok(None),
        }
    }

    fn push(&mut self, slide: PendingSlide) -> SlideHandle {
        self.pending.push(slide);
        SlideHandle(self.saved_handles + self.pending.len() - 1)
    }

    fn pending_mut(&mut self, slide: SlideHandle) -> Result<&mut PendingSlide> {
        slide
            .0
            .checked_sub(self.saved_handles)
            .and_then(|index| self.pending.get_mut(index))
            .ok_or_else(|| anyhow!("slide was already saved"))
    }

    fn saved_slide_parts(&self) -> Result<Vec<String>> {
        let rels = self.package.relationships(&self.main_part)?;
        let list = xml::read_slide_list(self.package.require(&self.main_part)?)?;
        list.iter()
            .map(|slide| {
                rels.get(&slide.rel_id)
                    .map(|rel| resolve_target(&self.main_part, &rel.target))
                    .ok_or_else(|| anyhow!("slide relationship {} is missing", slide.rel_id))
            })
            .collect()
    }

    fn saved_slide_part(&self, index: usize) -> Result<String> {
        self.saved_slide_parts()?
            .into_iter()
            .nth(index)
            .ok_or_else(|| anyhow!("slide {} does not exist", index))
    }

    fn ensure_notes_master(
        &mut self,
        types: &mut ContentTypes,
        main_rels: &mut Relationships,
        main_xml: &mut Vec<u8>,
    ) -> Result<String> {
        if let Some(rel) = main_rels.first_of_type(RT_NOTES_MASTER) {
            return Ok(resolve_target(&self.main_part, &rel.target));
        }

        let master = self.package.next_numbered("ppt/notesMasters/notesMaster", "xml");
        let theme = self.package.next_numbered("ppt/theme/theme", "xml");
        self.package.insert(theme.clone(), template::theme_xml());
        types.set_override(&theme, CT_THEME);

        let mut rels = Relationships::default();
        rels.add(RT_THEME, relative_target(&master, &theme));
        self.package.set_relationships(&master, &rels);
        self.package.insert(master.clone(), template::notes_master_xml());
        types.set_override(&master, CT_NOTES_MASTER);

        let rel_id = main_rels.add(RT_NOTES_MASTER, relative_target(&self.main_part, &master));
        *main_xml = xml::append_to_list(
            main_xml,
            "p:notesMasterIdLst",
            &format!("<p:notesMasterId r:id=\"{}\"/>", rel_id),
            &["p:handoutMasterIdLst", "p:sldIdLst", "p:sldSz", "p:notesSz"],
        )?;
        Ok(master)
    }
}

fn main_part(package: &Package) -> Result<String> {
    let rels = Relationships::parse(package.require(ROOT_RELS_PART)?)?;
    let rel = rels
        .first_of_type(RT_OFFICE_DOCUMENT)
        .ok_or_else(|| anyhow!("package has no main document"))?;
    Ok(resolve_target("", &rel.target))
}

/// Layout parts in the order the first slide master lists them.
fn resolve_layouts(package: &Package, main_part: &str) -> Result<Vec<String>> {
    let main_rels = package.relationships(main_part)?;
    let master_rel = xml::read_rel_ids(package.require(main_part)?, b"sldMasterId")?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("presentation has no slide master"))?;
    let master = main_rels
        .get(&master_rel)
        .map(|rel| resolve_target(main_part, &rel.target))
        .ok_or_else(|| anyhow!("slide master relationship {} is missing", master_rel))?;

    let master_rels = package.relationships(&master)?;
    let mut layouts = Vec::new();
    for id in xml::read_rel_ids(package.require(&master)?, b"sldLayoutId")? {
        let rel = master_rels
            .get(&id)
            .ok_or_else(|| anyhow!("slide layout relationship {} is missing", id))?;
        layouts.push(resolve_target(&master, &rel.target));
    }
    if layouts.len() <= CONTENT_LAYOUT {
        return Err(anyhow!(
            "template needs a title layout and a content layout, found {}",
            layouts.len()
        ));
    }
    Ok(layouts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(dir: &Path) -> (PathBuf, PathBuf) {
        let template = dir.join("Base.pptx");
        write_default_template(&template).unwrap();
        (template, dir.join("out").join("Deck.pptx"))
    }

    #[test]
    fn missing_template_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = Presentation::open(&dir.path().join("nope.pptx"), &dir.path().join("o.pptx"))
            .unwrap_err();
        assert!(err.to_string().contains("template not found"));
        assert!(!dir.path().join("o.pptx").exists());
    }

    #[test]
    fn slides_and_notes_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let (template, output) = fixture(dir.path());
        let mut deck = Presentation::open(&template, &output).unwrap();
        assert_eq!(deck.slide_count().unwrap(), 0);

        deck.add_title_slide("Intro", "Diagrams", &TextStyle::sized(44));
        let slide = deck.add_content_slide(
            "Flowcharts",
            "Boxes\nArrows",
            &TextStyle::sized(44),
            &TextStyle::sized(32),
        );
        deck.set_notes(slide, "Pause here").unwrap();
        deck.save().unwrap();

        let reloaded = Presentation::load(&output).unwrap();
        assert_eq!(reloaded.slide_count().unwrap(), 2);
        assert_eq!(reloaded.slide_text(0).unwrap(), "Intro\nDiagrams");
        assert_eq!(reloaded.slide_text(1).unwrap(), "Flowcharts\nBoxes\nArrows");
        assert_eq!(reloaded.notes_text(0).unwrap(), None);
        assert_eq!(reloaded.notes_text(1).unwrap().as_deref(), Some("Pause here"));
    }

    #[test]
    fn reopening_appends_to_existing_document() {
        let dir = tempfile::tempdir().unwrap();
        let (template, output) = fixture(dir.path());
        for topic in ["One", "Two"] {
            let mut deck = Presentation::open(&template, &output).unwrap();
            let slide = deck.add_title_slide(topic, "Chapter", &TextStyle::default());
            deck.set_notes(slide, topic).unwrap();
            deck.save().unwrap();
        }
        let deck = Presentation::load(&output).unwrap();
        assert_eq!(deck.slide_count().unwrap(), 2);
        assert_eq!(deck.slide_text(1).unwrap(), "Two\nChapter");
        let master_count = deck
            .package
            .names()
            .filter(|name| name.starts_with("ppt/notesMasters/") && name.ends_with(".xml"))
            .count();
        assert_eq!(master_count, 1);
    }

    #[test]
    fn pictures_and_text_boxes_are_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let (template, output) = fixture(dir.path());
        let image_path = dir.path().join("diagram.png");
        image::RgbaImage::new(40, 20).save(&image_path).unwrap();

        let mut deck = Presentation::open(&template, &output).unwrap();
        let slide = deck.add_content_slide("T", "B", &TextStyle::default(), &TextStyle::default());
        let frame = Frame {
            left: 0.5,
            top: 4.5,
            width: 12.0,
            height: 2.0,
        };
        deck.add_picture(slide, &image_path, frame).unwrap();
        std::fs::remove_file(&image_path).unwrap();
        deck.add_text_box(slide, frame, "Code Examples:\nfn main() {}", &TextStyle::default())
            .unwrap();
        assert_eq!(deck.picture_count().unwrap(), 1);
        deck.save().unwrap();

        let reloaded = Presentation::load(&output).unwrap();
        assert_eq!(reloaded.picture_count().unwrap(), 1);
        assert!(reloaded.package.contains("ppt/media/image1.png"));
        assert!(reloaded.slide_text(0).unwrap().ends_with("Code Examples:\nfn main() {}"));
        assert!(deck.add_text_box(slide, frame, "late", &TextStyle::default()).is_err());
    }

    #[test]
    fn template_without_content_layout_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut package = template::default_package();
        let master = "ppt/slideMasters/slideMaster1.xml";
        let xml = String::from_utf8(package.require(master).unwrap().to_vec()).unwrap();
        let trimmed = xml.replace("<p:sldLayoutId id=\"2147483650\" r:id=\"rId2\"/>", "");
        assert_ne!(xml, trimmed);
        package.insert(master, trimmed);
        let path = dir.path().join("bad.pptx");
        package.write(&path).unwrap();
        let err = Presentation::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("title layout and a content layout"));
    }
}
