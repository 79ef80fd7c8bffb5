use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;

use crate::logi;

async fn run_cmd(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }
    cmd.kill_on_drop(true);

    let output = cmd.output().await.context("Command execution failed")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let snippet = stderr.trim().chars().take(800).collect::<String>();
        return Err(anyhow::anyhow!("Command failed: {:?}: {}", args, snippet));
    }

    Ok(())
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .kill_on_drop(true)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed on {}", path.display()));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    parse_duration(&text)
}

fn parse_duration(text: &str) -> Result<f64> {
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= 0.1 || !duration.is_finite() {
        return Err(anyhow::anyhow!("Invalid duration: {:?}", text));
    }
    Ok(duration)
}

/// Still image held for `duration` seconds over the narration track.
pub async fn ffmpeg_still_clip(
    image: &Path,
    audio: &Path,
    duration: f64,
    fps: u32,
    out_mp4: &Path,
) -> Result<bool> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-loop".to_string(),
        "1".to_string(),
        "-framerate".to_string(),
        fps.to_string(),
        "-i".to_string(),
        image.display().to_string(),
        "-i".to_string(),
        audio.display().to_string(),
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "1:a".to_string(),
        "-vf".to_string(),
        "scale=trunc(iw/2)*2:trunc(ih/2)*2".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-tune".to_string(),
        "stillimage".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-r".to_string(),
        fps.to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-t".to_string(),
        format!("{:.3}", duration),
        out_mp4.display().to_string(),
    ];

    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

/// One concat-demuxer line; single quotes are closed, escaped, reopened.
pub fn concat_list_line(clip: &Path) -> String {
    let escaped = clip.display().to_string().replace('\'', r"'\''");
    format!("file '{}'\n", escaped)
}

pub async fn write_concat_list(clips: &[PathBuf], list_txt: &Path) -> Result<()> {
    let mut body = String::new();
    for clip in clips {
        let abs = fs::canonicalize(clip)
            .await
            .with_context(|| format!("Missing clip {}", clip.display()))?;
        body.push_str(&concat_list_line(&abs));
    }
    fs::write(list_txt, body)
        .await
        .with_context(|| format!("Failed to write concat list {}", list_txt.display()))?;
    Ok(())
}

pub async fn ffmpeg_concat_videos(list_txt: &Path, fps: u32, out_mp4: &Path) -> Result<bool> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list_txt.display().to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-r".to_string(),
        fps.to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "22".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out_mp4.display().to_string(),
    ];
    logi(format!("Muxing {} -> {}", list_txt.display(), out_mp4.display()));
    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}
