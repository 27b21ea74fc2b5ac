use anyhow::Result;
use url::Url;

/// Validate a URL and return the normalized version.
pub fn validate_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|_| anyhow::anyhow!("Invalid URL format: {}", url))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("URL must use HTTP or HTTPS protocol");
    }

    Ok(parsed.to_string())
}

/// Turn a media title into a safe filename stem: keep alphanumerics, spaces,
/// hyphens, and underscores, drop everything else, trim surrounding
/// whitespace.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();

    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "audio".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Format an offset in seconds as `H:MM:SS` (or `M:SS`) for log messages.
pub fn format_offset(seconds: f64) -> String {
    let total = seconds as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Check that the external tools are runnable; returns a description per
/// missing tool.
pub async fn check_dependencies(yt_dlp: &str, ffmpeg: &str) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(yt_dlp).await {
        missing.push(format!("{} - required to fetch media", yt_dlp));
    }

    if !check_command_available(ffmpeg).await {
        missing.push(format!("{} - required to trim and convert audio", ffmpeg));
    }

    missing
}

/// Check if a command is available in PATH.
async fn check_command_available(command: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
