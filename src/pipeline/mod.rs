//! The extraction pipeline: fetch, convert, relocate.
//!
//! One job runs the three stages strictly in sequence; each stage's output
//! file is the next stage's input. All intermediate files live in a per-job
//! scratch directory under the platform cache location, removed when the job
//! finishes. Abrupt termination may leave scratch entries behind.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

use crate::config::TranscodeErrorPolicy;
use crate::convert::{self, AudioFormat, ConversionSpec, Operation, Transcoder};
use crate::fetch::MediaFetcher;
use crate::timespec::ClipWindow;
use crate::utils::{format_offset, sanitize_title};

/// One extraction request, built from validated CLI input. Executed exactly
/// once; no retry state is kept.
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    pub url: String,
    pub format: AudioFormat,
    pub quality_kbps: u32,
    pub window: Option<ClipWindow>,
    pub output_dir: PathBuf,
    pub filename: Option<String>,
}

/// Per-process scratch root, namespaced by application.
pub fn default_scratch_root() -> Result<PathBuf> {
    let cache = dirs::cache_dir().context("could not determine cache directory")?;
    Ok(cache.join("ytclip"))
}

pub struct ExtractionPipeline<F, T> {
    fetcher: F,
    transcoder: T,
    scratch_root: PathBuf,
    policy: TranscodeErrorPolicy,
}

impl<F: MediaFetcher, T: Transcoder> ExtractionPipeline<F, T> {
    pub fn new(
        fetcher: F,
        transcoder: T,
        scratch_root: PathBuf,
        policy: TranscodeErrorPolicy,
    ) -> Self {
        Self {
            fetcher,
            transcoder,
            scratch_root,
            policy,
        }
    }

    /// Run the job to completion and return the absolute final path.
    pub async fn run(&self, job: &ExtractionJob) -> Result<PathBuf> {
        // The title names the output file, so a metadata failure is fatal
        // before any download begins.
        let title = self
            .fetcher
            .title(&job.url)
            .await
            .context("fetching media info failed")?;
        tracing::info!("Title: {title}");

        if let Some(window) = &job.window {
            match window.end {
                Some(end) => tracing::info!(
                    "Extracting {} - {}",
                    format_offset(window.start),
                    format_offset(end)
                ),
                None => tracing::info!(
                    "Extracting from {} to the end of the media",
                    format_offset(window.start)
                ),
            }
        }

        let scratch = self.create_scratch()?;

        let source_name = format!(
            "source_{}.{}",
            &Uuid::new_v4().to_string()[..8],
            job.format.extension()
        );
        tracing::info!("Downloading audio...");
        let source = self
            .fetcher
            .download(&job.url, &scratch.path().join(source_name), job.format)
            .await
            .context("downloading media failed")?;

        let spec = convert::select(job.format, job.quality_kbps, job.window);
        let converted = self
            .convert(&scratch, &source, &spec)
            .await
            .context("converting audio failed")?;

        let final_path = self
            .relocate(&converted, job, &title)
            .context("relocating output failed")?;

        tracing::info!("Saved to: {}", final_path.display());
        Ok(final_path)
    }

    fn create_scratch(&self) -> Result<TempDir> {
        fs_err::create_dir_all(&self.scratch_root)?;
        tempfile::Builder::new()
            .prefix("job-")
            .tempdir_in(&self.scratch_root)
            .context("could not create scratch directory")
    }

    /// Converting stage. PassThrough keeps the source as the tracked file;
    /// everything else produces a new file and deletes the consumed source.
    async fn convert(
        &self,
        scratch: &TempDir,
        source: &Path,
        spec: &ConversionSpec,
    ) -> Result<PathBuf> {
        if spec.operation == Operation::PassThrough {
            tracing::debug!("container already matches, no conversion needed");
            return Ok(source.to_path_buf());
        }

        let output = scratch.path().join(format!(
            "clip_{}.{}",
            &Uuid::new_v4().to_string()[..8],
            spec.container.extension()
        ));
        tracing::info!("Converting to {}...", spec.container);

        match self.transcoder.run(source, &output, spec).await {
            Ok(()) => {
                if let Err(e) = fs_err::remove_file(source) {
                    tracing::warn!("could not remove consumed source file: {e}");
                }
            }
            Err(e) => match self.policy {
                TranscodeErrorPolicy::Continue => {
                    tracing::warn!("transcoder reported an error, keeping expected output: {e}");
                }
                TranscodeErrorPolicy::Abort => return Err(e.into()),
            },
        }

        Ok(output)
    }

    /// Relocating stage: name the file, create the destination directory,
    /// move the result into place. Existing destinations are overwritten.
    fn relocate(&self, converted: &Path, job: &ExtractionJob, title: &str) -> Result<PathBuf> {
        let stem = job
            .filename
            .clone()
            .unwrap_or_else(|| sanitize_title(title));
        let final_name = format!("{stem}.{}", job.format.extension());

        fs_err::create_dir_all(&job.output_dir).with_context(|| {
            format!("could not create output directory {}", job.output_dir.display())
        })?;

        let dest = job.output_dir.join(final_name);
        move_file(converted, &dest)?;

        fs_err::canonicalize(&dest).map_err(Into::into)
    }
}

/// Move a file, falling back to copy + remove when rename crosses
/// filesystems.
fn move_file(src: &Path, dest: &Path) -> Result<()> {
    if fs_err::rename(src, dest).is_ok() {
        return Ok(());
    }
    fs_err::copy(src, dest)?;
    fs_err::remove_file(src)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{MockTranscoder, TranscodeError};
    use crate::fetch::{FetchError, MockMediaFetcher};

    fn job(format: AudioFormat, out_dir: &Path) -> ExtractionJob {
        ExtractionJob {
            url: "https://example.com/watch?v=abc".to_string(),
            format,
            quality_kbps: 128,
            window: Some(ClipWindow {
                start: 30.0,
                end: Some(40.0),
            }),
            output_dir: out_dir.to_path_buf(),
            filename: None,
        }
    }

    fn fetcher_returning(title: &str) -> MockMediaFetcher {
        let title = title.to_string();
        let mut fetcher = MockMediaFetcher::new();
        fetcher.expect_title().returning(move |_| Ok(title.clone()));
        fetcher.expect_download().returning(|_, dest, _| {
            std::fs::write(dest, b"downloaded").unwrap();
            Ok(dest.to_path_buf())
        });
        fetcher
    }

    #[tokio::test]
    async fn mp3_clip_end_to_end() {
        let out_dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let fetcher = fetcher_returning("Song: Title/2024?");

        let mut transcoder = MockTranscoder::new();
        transcoder
            .expect_run()
            .withf(|input, output, spec| {
                input.exists()
                    && output.extension().is_some_and(|e| e == "mp3")
                    && spec.operation == Operation::Transcode
                    && spec.window
                        == Some(ClipWindow {
                            start: 30.0,
                            end: Some(40.0),
                        })
                    && spec.bitrate_kbps == Some(128)
                    && spec.sample_rate_hz == Some(44_100)
                    && spec.channels == Some(2)
            })
            .returning(|_, output, _| {
                std::fs::write(output, b"converted").unwrap();
                Ok(())
            });

        let pipeline = ExtractionPipeline::new(
            fetcher,
            transcoder,
            scratch.path().to_path_buf(),
            TranscodeErrorPolicy::Continue,
        );

        let final_path = pipeline.run(&job(AudioFormat::Mp3, out_dir.path())).await.unwrap();

        assert!(final_path.is_absolute());
        assert_eq!(
            final_path.file_name().unwrap().to_str().unwrap(),
            "Song Title2024.mp3"
        );
        assert!(final_path.exists());
    }

    #[tokio::test]
    async fn title_failure_is_fatal_before_download() {
        let mut fetcher = MockMediaFetcher::new();
        fetcher.expect_title().returning(|url| {
            Err(FetchError::TitleUnavailable {
                url: url.to_string(),
                stderr: "403".to_string(),
            })
        });
        fetcher.expect_download().times(0);

        let transcoder = MockTranscoder::new();
        let scratch = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();

        let pipeline = ExtractionPipeline::new(
            fetcher,
            transcoder,
            scratch.path().to_path_buf(),
            TranscodeErrorPolicy::Continue,
        );

        let err = pipeline
            .run(&job(AudioFormat::Mp3, out_dir.path()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("fetching media info failed"));
    }

    #[tokio::test]
    async fn m4a_without_window_skips_the_transcoder() {
        let out_dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let fetcher = fetcher_returning("Some Album Track");

        let mut transcoder = MockTranscoder::new();
        transcoder.expect_run().times(0);

        let pipeline = ExtractionPipeline::new(
            fetcher,
            transcoder,
            scratch.path().to_path_buf(),
            TranscodeErrorPolicy::Continue,
        );

        let mut job = job(AudioFormat::M4a, out_dir.path());
        job.window = None;

        let final_path = pipeline.run(&job).await.unwrap();
        assert_eq!(
            final_path.file_name().unwrap().to_str().unwrap(),
            "Some Album Track.m4a"
        );
        assert!(final_path.exists());
    }

    #[tokio::test]
    async fn lenient_policy_keeps_partial_output() {
        let out_dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let fetcher = fetcher_returning("Broken But Usable");

        let mut transcoder = MockTranscoder::new();
        transcoder.expect_run().returning(|_, output, _| {
            // Partially written output, then an error report.
            std::fs::write(output, b"partial").unwrap();
            Err(TranscodeError::Io(std::io::Error::other("truncated input")))
        });

        let pipeline = ExtractionPipeline::new(
            fetcher,
            transcoder,
            scratch.path().to_path_buf(),
            TranscodeErrorPolicy::Continue,
        );

        let final_path = pipeline.run(&job(AudioFormat::Mp3, out_dir.path())).await.unwrap();
        assert!(final_path.exists());
    }

    #[tokio::test]
    async fn strict_policy_aborts_on_transcoder_error() {
        let out_dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let fetcher = fetcher_returning("Broken");

        let mut transcoder = MockTranscoder::new();
        transcoder.expect_run().returning(|_, _, _| {
            Err(TranscodeError::Io(std::io::Error::other("truncated input")))
        });

        let pipeline = ExtractionPipeline::new(
            fetcher,
            transcoder,
            scratch.path().to_path_buf(),
            TranscodeErrorPolicy::Abort,
        );

        let err = pipeline
            .run(&job(AudioFormat::Mp3, out_dir.path()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("converting audio failed"));
    }

    #[tokio::test]
    async fn explicit_filename_overwrites_on_rerun() {
        let out_dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let mut fetcher = MockMediaFetcher::new();
        fetcher
            .expect_title()
            .times(2)
            .returning(|_| Ok("Whatever".to_string()));
        fetcher.expect_download().times(2).returning(|_, dest, _| {
            std::fs::write(dest, b"downloaded").unwrap();
            Ok(dest.to_path_buf())
        });

        let mut transcoder = MockTranscoder::new();
        transcoder.expect_run().times(2).returning(|_, output, _| {
            std::fs::write(output, b"converted").unwrap();
            Ok(())
        });

        let pipeline = ExtractionPipeline::new(
            fetcher,
            transcoder,
            scratch.path().to_path_buf(),
            TranscodeErrorPolicy::Continue,
        );

        let mut job = job(AudioFormat::Mp3, out_dir.path());
        job.filename = Some("my-clip".to_string());

        let first = pipeline.run(&job).await.unwrap();
        let second = pipeline.run(&job).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.file_name().unwrap().to_str().unwrap(), "my-clip.mp3");
    }
}
