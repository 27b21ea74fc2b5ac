use clap::Parser;
use std::path::PathBuf;

use crate::convert::AudioFormat;

#[derive(Parser, Debug)]
#[command(
    name = "ytclip",
    about = "Extract time-bounded audio clips from streaming video URLs",
    version,
    long_about = "Downloads the audio stream of a video URL, optionally trims it to a \
time window, converts it to mp3, m4a, or opus, and drops the result in the \
output directory. Requires yt-dlp and ffmpeg on the PATH."
)]
pub struct Cli {
    /// Video URL to extract audio from
    #[arg(value_name = "URL")]
    pub url: String,

    /// Output directory
    #[arg(short = 'o', long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Start time (HH:MM:SS, MM:SS, or seconds)
    #[arg(long, value_name = "TIME")]
    pub start_time: Option<String>,

    /// End time; mutually exclusive with --duration
    #[arg(long, value_name = "TIME")]
    pub end_time: Option<String>,

    /// Duration from the start time; mutually exclusive with --end-time
    #[arg(long, value_name = "TIME")]
    pub duration: Option<String>,

    /// Output format (defaults to the configured format, normally mp3)
    #[arg(short = 'f', long, value_enum)]
    pub format: Option<AudioFormat>,

    /// Audio quality in kbps (defaults to the configured quality, normally 320)
    #[arg(long, value_name = "KBPS")]
    pub quality: Option<u32>,

    /// Output filename without extension (defaults to the sanitized title)
    #[arg(long, value_name = "NAME")]
    pub filename: Option<String>,

    /// Path to a yt-dlp config file, forwarded as --config-locations
    #[arg(long, value_name = "FILE")]
    pub ytdl_config: Option<PathBuf>,

    /// Proxy URL forwarded to yt-dlp
    #[arg(long, value_name = "URL")]
    pub proxy: Option<String>,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,

    /// Treat transcoder errors as fatal instead of keeping partial output
    #[arg(long)]
    pub strict_transcode: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_invocation_parses() {
        let cli = Cli::parse_from(["ytclip", "https://example.com/v"]);
        assert_eq!(cli.url, "https://example.com/v");
        assert_eq!(cli.output_dir, PathBuf::from("."));
        assert_eq!(cli.format, None);
        assert!(!cli.quiet);
    }

    #[test]
    fn full_invocation_parses() {
        let cli = Cli::parse_from([
            "ytclip",
            "https://example.com/v",
            "-o",
            "/tmp/out",
            "--start-time",
            "30",
            "--duration",
            "10",
            "-f",
            "opus",
            "--quality",
            "128",
            "--filename",
            "clip",
            "-q",
        ]);
        assert_eq!(cli.format, Some(AudioFormat::Opus));
        assert_eq!(cli.quality, Some(128));
        assert_eq!(cli.start_time.as_deref(), Some("30"));
        assert_eq!(cli.duration.as_deref(), Some("10"));
        assert!(cli.quiet);
    }
}
