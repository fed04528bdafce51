//! ffmpeg / ffprobe drivers for frame sampling and audio extraction.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine;
use tokio::process::Command;
use tracing::debug;

/// Run an external tool to completion, failing on timeout or non-zero exit.
pub(crate) async fn run_tool(program: &str, args: &[String], timeout: Duration) -> Result<Output> {
    debug!(program, ?args, "Running external tool");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn {program}"))?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .with_context(|| format!("{program} timed out after {}s", timeout.as_secs()))?
        .with_context(|| format!("Failed to wait for {program}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{program} exited with {}: {}", output.status, stderr.trim());
    }

    Ok(output)
}

/// Container duration in seconds, if ffprobe reports one.
pub async fn probe_duration(ffprobe: &str, video: &Path, timeout: Duration) -> Result<Option<f64>> {
    let args = vec![
        "-v".to_string(),
        "error".to_string(),
        "-show_entries".to_string(),
        "format=duration".to_string(),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        video.to_string_lossy().to_string(),
    ];
    let output = run_tool(ffprobe, &args, timeout).await?;
    Ok(parse_duration(&String::from_utf8_lossy(&output.stdout)))
}

/// Whether the file carries at least one audio stream.
pub async fn has_audio(ffprobe: &str, video: &Path, timeout: Duration) -> Result<bool> {
    let args = vec![
        "-v".to_string(),
        "error".to_string(),
        "-select_streams".to_string(),
        "a".to_string(),
        "-show_entries".to_string(),
        "stream=index".to_string(),
        "-of".to_string(),
        "csv=p=0".to_string(),
        video.to_string_lossy().to_string(),
    ];
    let output = run_tool(ffprobe, &args, timeout).await?;
    Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
}

fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .find_map(|line| line.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}

/// Evenly spaced sample points, `duration / max_frames` apart, starting at 0.
///
/// An unknown duration yields a single sample at the start.
#[must_use]
pub fn frame_timestamps(duration: Option<f64>, max_frames: usize) -> Vec<f64> {
    match duration {
        Some(duration) if max_frames > 0 => {
            let step = duration / max_frames as f64;
            (0..max_frames).map(|i| i as f64 * step).collect()
        }
        _ => vec![0.0],
    }
}

/// Grab one JPEG frame at `at` seconds. Returns `None` if ffmpeg produced no image.
pub async fn extract_frame(
    ffmpeg: &str,
    video: &Path,
    at: f64,
    out: &Path,
    timeout: Duration,
) -> Result<Option<PathBuf>> {
    let args = vec![
        "-y".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-ss".to_string(),
        format!("{at:.3}"),
        "-i".to_string(),
        video.to_string_lossy().to_string(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-q:v".to_string(),
        "3".to_string(),
        out.to_string_lossy().to_string(),
    ];
    run_tool(ffmpeg, &args, timeout).await?;

    if tokio::fs::try_exists(out).await.unwrap_or(false) {
        Ok(Some(out.to_path_buf()))
    } else {
        debug!(at, "ffmpeg produced no frame at timestamp");
        Ok(None)
    }
}

/// Extract the audio track as mono 16 kHz MP3.
pub async fn extract_audio(ffmpeg: &str, video: &Path, out: &Path, timeout: Duration) -> Result<()> {
    let args = vec![
        "-y".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        video.to_string_lossy().to_string(),
        "-vn".to_string(),
        "-ac".to_string(),
        "1".to_string(),
        "-ar".to_string(),
        "16000".to_string(),
        "-b:a".to_string(),
        "64k".to_string(),
        out.to_string_lossy().to_string(),
    ];
    run_tool(ffmpeg, &args, timeout).await?;
    Ok(())
}

/// Read an image file into a `data:` URL usable as an `image_url` part.
pub async fn image_data_url(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read frame {}", path.display()))?;
    let mime = match path.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    };
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{mime};base64,{encoded}"))
}
