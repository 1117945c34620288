//! `ingest`: turn a local directory of videos into an input file, one record per video.
use std::{
    fs,
    path::{Component, Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result, bail};
use clap::Args;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use vqa_core::fsio;

const VIDEO_EXTENSIONS: [&str; 9] = ["mp4", "avi", "mov", "mkv", "wmv", "flv", "webm", "m4v", "3gp"];
pub const DEFAULT_LABEL: &str = "cam_motion.steadiness_and_movement.moving_camera";

#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Directory containing video files
    pub video_dir: PathBuf,

    /// Output JSON file
    #[arg(short, long, default_value = "input.json")]
    pub output: PathBuf,

    /// Label assigned to every video
    #[arg(short, long, default_value = DEFAULT_LABEL)]
    pub label: String,

    /// Write paths relative to the current directory instead of absolute ones
    #[arg(long)]
    pub relative_paths: bool,
}

pub fn execute(cmd: IngestCommand) -> Result<ExitCode> {
    let base = if cmd.relative_paths {
        Some(
            std::env::current_dir()
                .and_then(fs::canonicalize)
                .context("resolving the current directory")?,
        )
    } else {
        None
    };

    let videos = find_videos(&cmd.video_dir)?;
    if videos.is_empty() {
        warn!(target: "vqa.shard.ingest", dir = %cmd.video_dir.display(), "no video files found");
        return Ok(ExitCode::SUCCESS);
    }

    let records: Vec<Value> = videos
        .iter()
        .map(|path| {
            let path = match &base {
                Some(base) => relative_to(path, base),
                None => path.clone(),
            };
            debug!(target: "vqa.shard.ingest", video = %path.display(), "found");
            json!({ "video": path.to_string_lossy(), "label": cmd.label })
        })
        .collect();

    fsio::write_json_atomic(&cmd.output, &records)?;
    info!(
        target: "vqa.shard.ingest",
        output = %cmd.output.display(),
        videos = records.len(),
        label = %cmd.label,
        "input file written"
    );
    Ok(ExitCode::SUCCESS)
}

/// Absolute paths of the video files directly inside `dir`, sorted.
pub fn find_videos(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        bail!("directory not found: {}", dir.display());
    }
    if !dir.is_dir() {
        bail!("not a directory: {}", dir.display());
    }
    let dir = fs::canonicalize(dir).with_context(|| format!("resolving {}", dir.display()))?;

    let mut videos = Vec::new();
    for entry in fs::read_dir(&dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && is_video(&path) {
            videos.push(path);
        }
    }
    videos.sort();
    Ok(videos)
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// `path` relative to `base`; both absolute. Climbs with `..` where needed.
fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let path: Vec<Component> = path.components().collect();
    let base: Vec<Component> = base.components().collect();
    let common = path
        .iter()
        .zip(&base)
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base.len() {
        out.push("..");
    }
    for c in &path[common..] {
        out.push(c.as_os_str());
    }
    out
}
