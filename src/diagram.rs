use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tempfile::TempPath;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::paths;
use crate::settings::DiagramSettings;

const RENDERER_NAME: &str = "mmdc";
const TEMP_PREFIX: &str = "slide-genie-";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer not found (install with 'npm install -g @mermaid-js/mermaid-cli')")]
    NotFound,
    #[error("renderer i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("renderer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("renderer timed out after {0:?}")]
    TimedOut(Duration),
    #[error("renderer produced no image")]
    MissingOutput,
}

/// A rendered diagram on disk. The file is removed when this value is dropped.
#[derive(Debug)]
pub struct RenderedImage {
    path: TempPath,
}

impl RenderedImage {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Clone)]
pub struct DiagramRenderer {
    executable: Option<PathBuf>,
    background: String,
    timeout: Duration,
}

impl DiagramRenderer {
    /// Searches the configured path, `PATH`, then the usual npm install locations.
    pub fn locate(settings: &DiagramSettings) -> Self {
        let executable = find_renderer(settings.renderer.as_deref());
        match executable.as_ref() {
            Some(path) => debug!(path = %path.display(), "found diagram renderer"),
            None => warn!("diagram renderer '{}' not found; diagrams will be skipped", RENDERER_NAME),
        }
        Self::with_executable(executable, settings)
    }

    pub fn with_executable(executable: Option<PathBuf>, settings: &DiagramSettings) -> Self {
        Self {
            executable,
            background: settings.background.clone(),
            timeout: Duration::from_secs(settings.timeout_secs.max(1)),
        }
    }

    pub fn executable(&self) -> Option<&Path> {
        self.executable.as_deref()
    }

    pub async fn render(&self, description: &str) -> Result<RenderedImage, RenderError> {
        let Some(executable) = self.executable.as_ref() else {
            return Err(RenderError::NotFound);
        };

        // Both files are removed on drop, whichever way this returns.
        let mut input = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(".mmd")
            .tempfile()?;
        input.write_all(description.as_bytes())?;
        input.flush()?;

        let output = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(".png")
            .tempfile()?
            .into_temp_path();

        let mut command = Command::new(executable);
        command
            .arg("-i")
            .arg(input.path())
            .arg("-o")
            .arg(&*output)
            .arg("-b")
            .arg(&self.background)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let result = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| RenderError::TimedOut(self.timeout))??;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            return Err(RenderError::Failed {
                status: result.status.to_string(),
                stderr,
            });
        }

        let written = std::fs::metadata(&*output)
            .map(|meta| meta.len())
            .unwrap_or(0);
        if written == 0 {
            return Err(RenderError::MissingOutput);
        }
        Ok(RenderedImage { path: output })
    }
}

fn find_renderer(configured: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = configured.and_then(paths::normalize_dir) {
        if path.is_file() {
            return Some(path);
        }
        warn!(path = %path.display(), "configured diagram renderer does not exist");
    }
    if let Ok(path) = which::which(RENDERER_NAME) {
        return Some(path);
    }
    candidate_paths().into_iter().find(|path| path.is_file())
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    for suffix in [
        ".npm-global/bin/mmdc",
        ".nvm/versions/node/current/bin/mmdc",
    ] {
        if let Some(path) = paths::home_join(suffix) {
            candidates.push(path);
        }
    }
    candidates.extend(platform_paths());
    candidates
}

#[cfg(target_os = "windows")]
fn platform_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(appdata) = std::env::var("APPDATA") {
        paths.push(Path::new(&appdata).join("npm").join("mmdc.cmd"));
    }
    paths.push(PathBuf::from(r"C:\Program Files\nodejs\mmdc.cmd"));
    paths
}

#[cfg(not(target_os = "windows"))]
fn platform_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/usr/local/bin/mmdc"),
        PathBuf::from("/usr/bin/mmdc"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_renderer_is_reported_without_creating_files() {
        let renderer = DiagramRenderer::with_executable(None, &DiagramSettings::default());
        let err = renderer.render("graph TD; A-->B").await.unwrap_err();
        assert!(matches!(err, RenderError::NotFound));
        assert!(err.to_string().contains("renderer not found"));
    }

    #[tokio::test]
    async fn unspawnable_renderer_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = DiagramRenderer::with_executable(
            Some(dir.path().join("no-such-mmdc")),
            &DiagramSettings::default(),
        );
        let err = renderer.render("graph TD; A-->B").await.unwrap_err();
        assert!(matches!(err, RenderError::Io(_)));
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-mmdc");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_renderer_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "echo 'Parse error on line 1' >&2\nexit 3");
        let renderer = DiagramRenderer::with_executable(Some(script), &DiagramSettings::default());
        let err = renderer.render("not a diagram").await.unwrap_err();
        match err {
            RenderError::Failed { stderr, .. } => assert!(stderr.contains("Parse error")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_render_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        // Copies the input to the output path: "$2" is -i's value, "$4" is -o's.
        let script = write_script(dir.path(), "cp \"$2\" \"$4\"");
        let renderer = DiagramRenderer::with_executable(Some(script), &DiagramSettings::default());
        let image = renderer.render("graph TD; A-->B").await.unwrap();
        let path = image.path().to_path_buf();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "graph TD; A-->B");
        drop(image);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn silent_renderer_without_output_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "exit 0");
        let renderer = DiagramRenderer::with_executable(Some(script), &DiagramSettings::default());
        let err = renderer.render("graph TD; A-->B").await.unwrap_err();
        assert!(matches!(err, RenderError::MissingOutput));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_renderer_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "sleep 5");
        let settings = DiagramSettings {
            timeout_secs: 1,
            ..DiagramSettings::default()
        };
        let renderer = DiagramRenderer::with_executable(Some(script), &settings);
        let err = renderer.render("graph TD; A-->B").await.unwrap_err();
        assert!(matches!(err, RenderError::TimedOut(_)));
    }
}
