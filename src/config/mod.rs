use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::convert::AudioFormat;

/// What to do when ffmpeg reports an error but may still have written a
/// usable output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscodeErrorPolicy {
    /// Log a warning and keep the expected output path.
    #[default]
    Continue,
    /// Fail the job.
    Abort,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External tool binaries.
    pub tools: ToolsConfig,

    /// Defaults applied when the CLI leaves a choice open.
    pub defaults: DefaultsConfig,

    /// Soft-failure policy for transcoder errors.
    pub on_transcode_error: TranscodeErrorPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub yt_dlp: String,
    pub ffmpeg: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub format: AudioFormat,
    pub quality_kbps: u32,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp: "yt-dlp".to_string(),
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            format: AudioFormat::Mp3,
            quality_kbps: 320,
        }
    }
}

impl Config {
    /// Load configuration from file or create the default one.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content =
                fs_err::read_to_string(&config_path).context("Failed to read config file")?;

            let config: Config =
                serde_yaml::from_str(&content).context("Failed to parse config file")?;

            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path.
    fn config_path() -> Result<PathBuf> {
        // Local config.yaml takes precedence for easy testing.
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("ytclip").join("config.yaml"))
    }

    fn validate(&self) -> Result<()> {
        if self.tools.yt_dlp.is_empty() || self.tools.ffmpeg.is_empty() {
            anyhow::bail!("tool paths in the config must not be empty");
        }
        if self.defaults.quality_kbps == 0 {
            anyhow::bail!("defaults.quality_kbps must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_yaml() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.defaults.quality_kbps, 320);
        assert_eq!(parsed.defaults.format, AudioFormat::Mp3);
        assert_eq!(parsed.on_transcode_error, TranscodeErrorPolicy::Continue);
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let parsed: Config = serde_yaml::from_str("on_transcode_error: abort\n").unwrap();
        assert_eq!(parsed.on_transcode_error, TranscodeErrorPolicy::Abort);
        assert_eq!(parsed.tools.ffmpeg, "ffmpeg");
    }

    #[test]
    fn empty_tool_path_fails_validation() {
        let config: Config = serde_yaml::from_str("tools:\n  yt_dlp: \"\"\n").unwrap();
        assert!(config.validate().is_err());
    }
}
