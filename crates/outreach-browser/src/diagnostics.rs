//! Diagnostic snapshots of the rendered surface
//!
//! Snapshots are advisory: nothing in the engine reads them, and callers
//! wrap [`DiagnosticSink::capture`] in `fail_open` so a write failure never
//! interrupts a run.

use async_trait::async_trait;
use chrono::Utc;
use outreach_core::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::surface::Surface;

/// Point in the per-target protocol where a snapshot is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    PostNavigation,
    PostCompose,
    PostSend,
    OnFailure,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PostNavigation => write!(f, "post-navigation"),
            Self::PostCompose => write!(f, "post-compose"),
            Self::PostSend => write!(f, "post-send"),
            Self::OnFailure => write!(f, "failure"),
        }
    }
}

/// Receiver of surface snapshots
#[async_trait]
pub trait DiagnosticSink: Send + Sync {
    async fn capture(&self, surface: &dyn Surface, stage: Stage, target_url: &str) -> Result<()>;
}

/// Sink that discards every snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDiagnostics;

#[async_trait]
impl DiagnosticSink for NoDiagnostics {
    async fn capture(&self, _surface: &dyn Surface, _stage: Stage, _target_url: &str) -> Result<()> {
        Ok(())
    }
}

/// Sink writing a PNG screenshot and an HTML dump per snapshot
#[derive(Debug, Clone)]
pub struct FileDiagnostics {
    dir: PathBuf,
}

impl FileDiagnostics {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Base file name (without extension) for a snapshot
    fn base_name(stage: Stage, target_url: &str) -> String {
        format!(
            "{}_{}_{}",
            Utc::now().format("%Y%m%dT%H%M%S%.3f"),
            slug(target_url),
            stage
        )
    }
}

#[async_trait]
impl DiagnosticSink for FileDiagnostics {
    async fn capture(&self, surface: &dyn Surface, stage: Stage, target_url: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let base = Self::base_name(stage, target_url);

        let png = surface.screenshot().await?;
        let png_path = self.dir.join(format!("{}.png", base));
        tokio::fs::write(&png_path, &png).await?;

        let html = surface.html().await?;
        let html_path = self.dir.join(format!("{}.html", base));
        tokio::fs::write(&html_path, html).await?;

        debug!("Snapshot {} written ({} bytes png)", base, png.len());
        info!("Diagnostic snapshot stored: {}", png_path.display());
        Ok(())
    }
}

/// File-name-safe tail of a profile url
fn slug(url: &str) -> String {
    let tail = url
        .trim_end_matches('/')
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("target");

    let cleaned: String = tail
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .take(48)
        .collect();

    if cleaned.is_empty() {
        "target".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeSurface;
    use tempfile::TempDir;

    #[test]
    fn test_slug() {
        assert_eq!(slug("https://www.example.com/in/ada-lovelace/"), "ada-lovelace");
        assert_eq!(slug("https://www.example.com/in/ada?x=1"), "ada_x_1");
        assert_eq!(slug(""), "target");
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::PostNavigation.to_string(), "post-navigation");
        assert_eq!(Stage::OnFailure.to_string(), "failure");
    }

    #[tokio::test]
    async fn test_file_diagnostics_writes_png_and_html() {
        let temp = TempDir::new().unwrap();
        let sink = FileDiagnostics::new(temp.path().join("snaps"));
        let surface = FakeSurface::new();

        sink.capture(&surface, Stage::PostSend, "https://example.com/in/ada")
            .await
            .unwrap();

        let mut names: Vec<String> = std::fs::read_dir(sink.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();

        assert_eq!(names.len(), 2);
        assert!(names[0].ends_with("_ada_post-send.html"));
        assert!(names[1].ends_with("_ada_post-send.png"));
    }

    #[tokio::test]
    async fn test_unwritable_dir_is_an_error() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, "not a dir").unwrap();

        let sink = FileDiagnostics::new(blocker.join("snaps"));
        let result = sink
            .capture(&FakeSurface::new(), Stage::OnFailure, "https://example.com/in/ada")
            .await;
        assert!(result.is_err());
    }
}
