use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};

const DOCUMENT_EXTENSION: &str = "pptx";
const SENTINEL_EXTENSION: &str = "txt";

/// Directory-per-chapter bookkeeping: `<output_dir>/<chapter>/` holds the chapter document and
/// one sentinel file per finished topic.
#[derive(Debug, Clone)]
pub struct TopicTracker {
    topics_file: PathBuf,
    output_dir: PathBuf,
}

impl TopicTracker {
    pub fn new(topics_file: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            topics_file: topics_file.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn topics_file(&self) -> &Path {
        &self.topics_file
    }

    /// Topics in file order with surrounding whitespace and blank lines removed.
    pub fn list_pending_topics(&self, chapter: &str) -> Result<Vec<String>> {
        validate_name("chapter", chapter)?;
        let text = fs::read_to_string(&self.topics_file).with_context(|| {
            format!("failed to read topics file: {}", self.topics_file.display())
        })?;
        Ok(parse_topics(&text))
    }

    pub fn chapter_folder(&self, chapter: &str) -> Result<PathBuf> {
        validate_name("chapter", chapter)?;
        Ok(self.output_dir.join(chapter.trim()))
    }

    pub fn ensure_chapter_folder(&self, chapter: &str) -> Result<PathBuf> {
        let folder = self.chapter_folder(chapter)?;
        fs::create_dir_all(&folder)
            .with_context(|| format!("failed to create chapter folder: {}", folder.display()))?;
        Ok(folder)
    }

    /// The single document every topic of `chapter` is appended to.
    pub fn document_path(&self, chapter: &str) -> Result<PathBuf> {
        let folder = self.chapter_folder(chapter)?;
        Ok(folder.join(format!("{}.{}", chapter.trim(), DOCUMENT_EXTENSION)))
    }

    /// `<chapter folder>/<topic>.txt`, with characters that cannot appear in a file name
    /// replaced by `_`.
    pub fn topic_completion_path(&self, chapter: &str, topic: &str) -> Result<PathBuf> {
        let folder = self.chapter_folder(chapter)?;
        Ok(folder.join(format!("{}.{}", file_stem(topic)?, SENTINEL_EXTENSION)))
    }

    pub fn is_topic_done(&self, chapter: &str, topic: &str) -> Result<bool> {
        Ok(self.topic_completion_path(chapter, topic)?.is_file())
    }

    pub fn mark_topic_done(&self, chapter: &str, topic: &str, dump: &str) -> Result<PathBuf> {
        let path = self.topic_completion_path(chapter, topic)?;
        fs::write(&path, dump)
            .with_context(|| format!("failed to write completion file: {}", path.display()))?;
        Ok(path)
    }
}

fn parse_topics(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn file_stem(topic: &str) -> Result<String> {
    let topic = topic.trim();
    if topic.is_empty() {
        return Err(anyhow!("topic name is empty"));
    }
    if topic == "." || topic == ".." {
        return Ok("_".repeat(topic.len()));
    }
    Ok(topic
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect())
}

/// Chapter names become folder names, so they must be a single non-empty path component.
fn validate_name(kind: &str, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("{} name is empty", kind));
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) || name.contains('\0') {
        return Err(anyhow!("{} name is not a valid file name: {}", kind, name));
    }
    Ok(())
}
