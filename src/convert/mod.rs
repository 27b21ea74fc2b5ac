//! Output formats, the format-to-operation table, and the ffmpeg transcoder.

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

use crate::timespec::ClipWindow;

/// Supported output formats. Closed set: adding one means adding a `select`
/// arm, which the exhaustive matches enforce at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    M4a,
    Opus,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Opus => "opus",
        }
    }

    /// ffmpeg muxer name for `-f`. m4a files use the `ipod` muxer.
    fn muxer(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "ipod",
            AudioFormat::Opus => "opus",
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// What the transcoder is asked to do with the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Full re-encode to the target codec/bitrate.
    Transcode,
    /// Container-level cut with `-c:a copy`, original codec preserved.
    Remux,
    /// No conversion at all; the source file already is the output.
    PassThrough,
}

/// A single transcoder invocation, fully described.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionSpec {
    pub operation: Operation,
    pub container: AudioFormat,
    pub sample_rate_hz: Option<u32>,
    pub channels: Option<u32>,
    pub bitrate_kbps: Option<u32>,
    pub window: Option<ClipWindow>,
}

/// Map a requested format and quality to the conversion to perform.
///
/// The mapping is a closed table: every (format, has-window) pair has exactly
/// one outcome. PassThrough cannot trim, so it never carries a window.
pub fn select(format: AudioFormat, quality_kbps: u32, window: Option<ClipWindow>) -> ConversionSpec {
    match (format, window) {
        (AudioFormat::Mp3, window) => ConversionSpec {
            operation: Operation::Transcode,
            container: AudioFormat::Mp3,
            sample_rate_hz: Some(44_100),
            channels: Some(2),
            bitrate_kbps: Some(quality_kbps),
            window,
        },
        (AudioFormat::Opus, window) => ConversionSpec {
            operation: Operation::Transcode,
            container: AudioFormat::Opus,
            sample_rate_hz: None,
            channels: None,
            bitrate_kbps: None,
            window,
        },
        (AudioFormat::M4a, None) => ConversionSpec {
            operation: Operation::PassThrough,
            container: AudioFormat::M4a,
            sample_rate_hz: None,
            channels: None,
            bitrate_kbps: None,
            window: None,
        },
        (AudioFormat::M4a, Some(window)) => ConversionSpec {
            operation: Operation::Remux,
            container: AudioFormat::M4a,
            sample_rate_hz: None,
            channels: None,
            bitrate_kbps: None,
            window: Some(window),
        },
    }
}

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("ffmpeg not found at {0:?}; install it or set tools.ffmpeg in the config")]
    ToolNotFound(String),

    #[error("ffmpeg exited with {status}: {stderr}")]
    CommandFailed {
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("failed to run ffmpeg: {0}")]
    Io(#[from] std::io::Error),
}

/// The external media transcoder.
///
/// [`Operation::PassThrough`] specs never reach the transcoder; the pipeline
/// keeps the source file as-is for those.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn run(&self, input: &Path, output: &Path, spec: &ConversionSpec)
        -> Result<(), TranscodeError>;
}

/// Transcoder backed by the `ffmpeg` binary.
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

fn build_args(input: &Path, output: &Path, spec: &ConversionSpec) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
    ];

    if let Some(window) = &spec.window {
        args.push("-ss".into());
        args.push(window.start.to_string());
        if let Some(end) = window.end {
            args.push("-to".into());
            args.push(end.to_string());
        }
    }

    match spec.operation {
        Operation::Transcode => {
            args.push("-vn".into());
            if let Some(rate) = spec.sample_rate_hz {
                args.push("-ar".into());
                args.push(rate.to_string());
            }
            if let Some(channels) = spec.channels {
                args.push("-ac".into());
                args.push(channels.to_string());
            }
            if let Some(bitrate) = spec.bitrate_kbps {
                args.push("-b:a".into());
                args.push(format!("{bitrate}k"));
            }
        }
        Operation::Remux => {
            args.push("-c:a".into());
            args.push("copy".into());
        }
        Operation::PassThrough => {}
    }

    args.push("-f".into());
    args.push(spec.container.muxer().into());
    args.push(output.to_string_lossy().into_owned());
    args
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        spec: &ConversionSpec,
    ) -> Result<(), TranscodeError> {
        let args = build_args(input, output, spec);
        tracing::debug!("ffmpeg {}", args.join(" "));

        let result = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        let out = match result {
            Ok(out) => out,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TranscodeError::ToolNotFound(self.ffmpeg_path.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        if !out.status.success() {
            return Err(TranscodeError::CommandFailed {
                status: out.status,
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}
