//! ytclip - extract time-bounded audio clips from streaming video URLs.
//!
//! The library wires four pieces together: a time parser and range resolver
//! ([`timespec`]), a closed format-to-operation table ([`convert`]), a yt-dlp
//! fetcher ([`fetch`]), and the pipeline that sequences fetch, convert, and
//! relocate ([`pipeline`]).

pub mod cli;
pub mod config;
pub mod convert;
pub mod fetch;
pub mod pipeline;
pub mod timespec;
pub mod utils;

pub use cli::Cli;
pub use config::{Config, TranscodeErrorPolicy};
pub use convert::{AudioFormat, ConversionSpec, FfmpegTranscoder, Operation, Transcoder};
pub use fetch::{FetchError, MediaFetcher, YtDlpFetcher};
pub use pipeline::{ExtractionJob, ExtractionPipeline};
pub use timespec::{ClipWindow, RangeError, TimeParseError};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;
