//! Media fetching via yt-dlp.
//!
//! The fetcher resolves a URL to a title and downloads the best matching
//! audio stream into a caller-chosen path. Download progress is surfaced
//! through an injected observer that receives a percentage per progress line;
//! the observer is purely for display and may be omitted entirely.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::convert::AudioFormat;

/// Called zero or more times during a download with the completed percentage.
pub type ProgressObserver = Box<dyn Fn(f64) + Send + Sync>;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("yt-dlp not found at {0:?}; install it or set tools.yt_dlp in the config")]
    ToolNotFound(String),

    #[error("could not fetch metadata for {url}: {stderr}")]
    TitleUnavailable { url: String, stderr: String },

    #[error("unexpected yt-dlp metadata: {0}")]
    Metadata(String),

    #[error("download failed ({status}): {stderr}")]
    DownloadFailed {
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("failed to run yt-dlp: {0}")]
    Io(#[from] std::io::Error),
}

/// The external video/audio fetcher.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Resolve the media title without downloading anything.
    async fn title(&self, url: &str) -> Result<String, FetchError>;

    /// Download the audio stream for `url` into `dest`. Returns the path the
    /// file actually landed at (normally `dest` itself).
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        format: AudioFormat,
    ) -> Result<PathBuf, FetchError>;
}

/// Fetcher backed by the `yt-dlp` binary. The progress observer is injected
/// at construction and invoked from within the blocking download.
pub struct YtDlpFetcher {
    yt_dlp_path: String,
    proxy: Option<String>,
    config_file: Option<PathBuf>,
    observer: Option<ProgressObserver>,
}

impl YtDlpFetcher {
    pub fn new(
        yt_dlp_path: impl Into<String>,
        proxy: Option<String>,
        config_file: Option<PathBuf>,
    ) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.into(),
            proxy,
            config_file,
            observer: None,
        }
    }

    /// Attach a display callback fed with download percentages.
    pub fn with_observer(mut self, observer: ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.yt_dlp_path);
        cmd.arg("--no-playlist");
        if let Some(proxy) = &self.proxy {
            cmd.args(["--proxy", proxy]);
        }
        if let Some(config) = &self.config_file {
            cmd.arg("--config-locations");
            cmd.arg(config);
        }
        cmd
    }

    fn map_spawn_error(&self, e: std::io::Error) -> FetchError {
        if e.kind() == std::io::ErrorKind::NotFound {
            FetchError::ToolNotFound(self.yt_dlp_path.clone())
        } else {
            e.into()
        }
    }

    /// Stream format selector passed to yt-dlp. m4a requires a matching
    /// container with no fallback: PassThrough and Remux never re-encode,
    /// so a source without an m4a stream must fail the download cleanly
    /// rather than deliver a foreign codec under an `.m4a` name.
    fn stream_selector(format: AudioFormat) -> &'static str {
        match format {
            AudioFormat::M4a => "bestaudio[ext=m4a]",
            AudioFormat::Mp3 | AudioFormat::Opus => "bestaudio/best",
        }
    }
}

/// Extract the percentage from a yt-dlp `--newline` progress line, e.g.
/// `[download]  42.3% of 3.45MiB at 1.23MiB/s ETA 00:05`.
fn parse_progress_line(line: &str) -> Option<f64> {
    let rest = line.strip_prefix("[download]")?;
    let token = rest.split_whitespace().find(|t| t.ends_with('%'))?;
    token.trim_end_matches('%').parse::<f64>().ok()
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn title(&self, url: &str) -> Result<String, FetchError> {
        tracing::debug!("fetching metadata for {url}");

        let out = self
            .base_command()
            .args(["--dump-json", url])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.map_spawn_error(e))?;

        if !out.status.success() {
            return Err(FetchError::TitleUnavailable {
                url: url.to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }

        let info: serde_json::Value = serde_json::from_slice(&out.stdout)
            .map_err(|e| FetchError::Metadata(e.to_string()))?;

        info["title"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| FetchError::Metadata("no title field in metadata".into()))
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        format: AudioFormat,
    ) -> Result<PathBuf, FetchError> {
        tracing::debug!("downloading {url} to {}", dest.display());

        let mut cmd = self.base_command();
        cmd.args(["--format", Self::stream_selector(format)])
            .arg("--output")
            .arg(dest)
            .arg("--newline")
            .arg(url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| self.map_spawn_error(e))?;

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let (Some(observer), Some(percent)) =
                    (self.observer.as_ref(), parse_progress_line(&line))
                {
                    observer(percent);
                }
            }
        }

        let out = child.wait_with_output().await?;
        if !out.status.success() {
            return Err(FetchError::DownloadFailed {
                status: out.status,
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }

        Ok(dest.to_path_buf())
    }
}
