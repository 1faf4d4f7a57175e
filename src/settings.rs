use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub api: ApiSettings,
    pub slides: SlideSettings,
    pub diagram: DiagramSettings,
    pub paths: PathSettings,
}

/// Text-generation service parameters.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Overrides `OPENAI_API_BASE` when set.
    pub base_url: Option<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4.1".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            timeout_secs: 120,
            base_url: None,
        }
    }
}

/// Output language and font sizes (points) used for generated slides.
#[derive(Debug, Clone)]
pub struct SlideSettings {
    pub language: String,
    pub title_font_size: u32,
    pub content_font_size: u32,
    pub code_font_size: u32,
    pub code_font: String,
    pub max_lines_per_slide: u32,
}

impl Default for SlideSettings {
    fn default() -> Self {
        Self {
            language: "English".to_string(),
            title_font_size: 44,
            content_font_size: 32,
            code_font_size: 14,
            code_font: "Consolas".to_string(),
            max_lines_per_slide: 7,
        }
    }
}

/// Diagram renderer lookup and display bounds. Bounds are in inches.
#[derive(Debug, Clone)]
pub struct DiagramSettings {
    pub renderer: Option<String>,
    pub max_width: f64,
    pub max_height: f64,
    pub dpi: f64,
    pub background: String,
    pub timeout_secs: u64,
}

impl Default for DiagramSettings {
    fn default() -> Self {
        Self {
            renderer: None,
            max_width: 12.0,
            max_height: 6.0,
            dpi: 96.0,
            background: "transparent".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathSettings {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub template: PathBuf,
    pub topics_file: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            template: PathBuf::from("Base.pptx"),
            topics_file: "Topics.txt".to_string(),
        }
    }
}

impl PathSettings {
    pub fn topics_path(&self) -> PathBuf {
        self.data_dir.join(&self.topics_file)
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    api: Option<ApiFile>,
    slides: Option<SlidesFile>,
    diagram: Option<DiagramFile>,
    paths: Option<PathsFile>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiFile {
    provider: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SlidesFile {
    language: Option<String>,
    title_font_size: Option<u32>,
    content_font_size: Option<u32>,
    code_font_size: Option<u32>,
    code_font: Option<String>,
    max_lines_per_slide: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct DiagramFile {
    renderer: Option<String>,
    max_width: Option<f64>,
    max_height: Option<f64>,
    dpi: Option<f64>,
    background: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PathsFile {
    data_dir: Option<String>,
    output_dir: Option<String>,
    template: Option<String>,
    topics_file: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    settings
        .merge_str(DEFAULT_SETTINGS_TOML)
        .with_context(|| "failed to parse built-in settings")?;
    ensure_home_settings_file()?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];

    if let Some(home) = paths::settings_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings.merge_str(&content).with_context(|| {
                format!("failed to parse settings: {}", path.display())
            })?;
        }
    }

    Ok(settings)
}

impl Settings {
    pub fn merge_str(&mut self, content: &str) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)?;
        self.merge(parsed);
        Ok(())
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(api) = incoming.api {
            merge_string(&mut self.api.provider, api.provider);
            merge_string(&mut self.api.model, api.model);
            if let Some(temperature) = api.temperature {
                if temperature >= 0.0 {
                    self.api.temperature = temperature;
                }
            }
            merge_positive(&mut self.api.max_tokens, api.max_tokens);
            merge_positive(&mut self.api.timeout_secs, api.timeout_secs);
            if let Some(base_url) = api.base_url {
                if !base_url.trim().is_empty() {
                    self.api.base_url = Some(base_url);
                }
            }
        }
        if let Some(slides) = incoming.slides {
            merge_string(&mut self.slides.language, slides.language);
            merge_positive(&mut self.slides.title_font_size, slides.title_font_size);
            merge_positive(&mut self.slides.content_font_size, slides.content_font_size);
            merge_positive(&mut self.slides.code_font_size, slides.code_font_size);
            merge_string(&mut self.slides.code_font, slides.code_font);
            merge_positive(
                &mut self.slides.max_lines_per_slide,
                slides.max_lines_per_slide,
            );
        }
        if let Some(diagram) = incoming.diagram {
            if let Some(renderer) = diagram.renderer {
                if !renderer.trim().is_empty() {
                    self.diagram.renderer = Some(renderer);
                }
            }
            merge_positive_f64(&mut self.diagram.max_width, diagram.max_width);
            merge_positive_f64(&mut self.diagram.max_height, diagram.max_height);
            merge_positive_f64(&mut self.diagram.dpi, diagram.dpi);
            merge_string(&mut self.diagram.background, diagram.background);
            merge_positive(&mut self.diagram.timeout_secs, diagram.timeout_secs);
        }
        if let Some(paths_file) = incoming.paths {
            merge_path(&mut self.paths.data_dir, paths_file.data_dir);
            merge_path(&mut self.paths.output_dir, paths_file.output_dir);
            merge_path(&mut self.paths.template, paths_file.template);
            merge_string(&mut self.paths.topics_file, paths_file.topics_file);
        }
    }
}

fn merge_string(target: &mut String, value: Option<String>) {
    if let Some(value) = value {
        if !value.trim().is_empty() {
            *target = value;
        }
    }
}

fn merge_path(target: &mut PathBuf, value: Option<String>) {
    if let Some(path) = value.as_deref().and_then(paths::normalize_dir) {
        *target = path;
    }
}

fn merge_positive<T>(target: &mut T, value: Option<T>)
where
    T: PartialOrd + Default,
{
    if let Some(value) = value {
        if value > T::default() {
            *target = value;
        }
    }
}

fn merge_positive_f64(target: &mut f64, value: Option<f64>) {
    if let Some(value) = value {
        if value.is_finite() && value > 0.0 {
            *target = value;
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = paths::settings_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}
