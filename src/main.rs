use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ytclip::cli::Cli;
use ytclip::config::{Config, TranscodeErrorPolicy};
use ytclip::convert::FfmpegTranscoder;
use ytclip::fetch::YtDlpFetcher;
use ytclip::pipeline::{self, ExtractionJob, ExtractionPipeline};
use ytclip::{timespec, utils};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.quiet { "ytclip=warn" } else { "ytclip=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let code = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Cancelled by user");
            1
        }
        result = execute(&cli) => match result {
            Ok(path) => {
                tracing::info!("Done: {}", path.display());
                0
            }
            Err(e) => {
                tracing::error!("{e:#}");
                1
            }
        }
    };

    std::process::exit(code);
}

async fn execute(cli: &Cli) -> ytclip::Result<PathBuf> {
    // All argument validation happens before any network or tool work.
    let url = utils::validate_url(&cli.url)?;
    let window = timespec::resolve_window(
        cli.start_time.as_deref(),
        cli.end_time.as_deref(),
        cli.duration.as_deref(),
    )?;

    if let Some(window) = &window {
        if window.end.is_none() {
            tracing::warn!(
                "--start-time given without --end-time or --duration; \
                 extracting from the start time to the end of the media"
            );
        }
    }

    let config = Config::load()?;

    let missing = utils::check_dependencies(&config.tools.yt_dlp, &config.tools.ffmpeg).await;
    for dep in &missing {
        tracing::warn!("missing dependency: {dep}");
    }

    let policy = if cli.strict_transcode {
        TranscodeErrorPolicy::Abort
    } else {
        config.on_transcode_error
    };

    let job = ExtractionJob {
        url,
        format: cli.format.unwrap_or(config.defaults.format),
        quality_kbps: cli.quality.unwrap_or(config.defaults.quality_kbps),
        window,
        output_dir: cli.output_dir.clone(),
        filename: cli.filename.clone(),
    };

    let mut fetcher = YtDlpFetcher::new(
        &config.tools.yt_dlp,
        cli.proxy.clone(),
        cli.ytdl_config.clone(),
    );

    let progress = if cli.quiet {
        None
    } else {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}%")
                .unwrap(),
        );
        let observer_bar = bar.clone();
        fetcher = fetcher.with_observer(Box::new(move |percent| {
            observer_bar.set_position(percent.round() as u64);
        }));
        Some(bar)
    };

    let pipeline = ExtractionPipeline::new(
        fetcher,
        FfmpegTranscoder::new(&config.tools.ffmpeg),
        pipeline::default_scratch_root()?,
        policy,
    );

    let result = pipeline.run(&job).await;
    if let Some(bar) = progress {
        bar.finish_and_clear();
    }
    result
}
