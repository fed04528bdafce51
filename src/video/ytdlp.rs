//! Video download through yt-dlp.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::ffmpeg::run_tool;

/// Output file stem; yt-dlp fills in the extension.
const OUTPUT_STEM: &str = "video";

/// Best video and audio at or below 720p.
const FORMAT: &str = "bv*[height<=720]+ba/b[height<=720]/bv*+ba/b";

/// Download a video (including HLS playlists) into `work_dir`.
///
/// # Errors
///
/// Returns an error if yt-dlp fails, times out, or leaves no output file.
pub async fn download(
    yt_dlp: &str,
    url: &str,
    work_dir: &Path,
    timeout: Duration,
) -> Result<PathBuf> {
    let output_template = work_dir.join(format!("{OUTPUT_STEM}.%(ext)s"));

    let args = vec![
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--quiet".to_string(),
        "--no-progress".to_string(),
        "--format".to_string(),
        FORMAT.to_string(),
        "--merge-output-format".to_string(),
        "mp4".to_string(),
        "--output".to_string(),
        output_template.to_string_lossy().to_string(),
        // URL goes last
        url.to_string(),
    ];

    debug!(url = %url, "Running yt-dlp");
    run_tool(yt_dlp, &args, timeout).await?;

    let path = find_output(work_dir)
        .await?
        .with_context(|| format!("yt-dlp finished but wrote no file for {url}"))?;

    info!(url = %url, path = %path.display(), "Video downloaded");
    Ok(path)
}

/// Locate the finished download, ignoring yt-dlp's partial and fragment files.
async fn find_output(work_dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(work_dir)
        .await
        .context("Failed to read download directory")?;

    let mut candidates = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if is_finished_download(&name) {
            candidates.push(entry.path());
        }
    }
    candidates.sort();
    Ok(candidates.into_iter().next())
}

fn is_finished_download(name: &str) -> bool {
    let Some(ext) = name
        .strip_prefix(OUTPUT_STEM)
        .and_then(|rest| rest.strip_prefix('.'))
    else {
        return false;
    };
    !ext.is_empty() && !ext.contains('.') && !matches!(ext, "part" | "ytdl" | "temp")
}
