use anyhow::Result as AnyResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::error::{PipelineError, Result};
use crate::ffmpeg;
use crate::script::{AssetMap, Script, SceneId};
use crate::{logi, logok, logw};

/// Media operations the assembler needs.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    async fn probe_duration(&self, media: &Path) -> AnyResult<f64>;

    async fn render_still_clip(
        &self,
        image: &Path,
        audio: &Path,
        duration: f64,
        out: &Path,
    ) -> AnyResult<()>;

    async fn concat_clips(&self, clips: &[PathBuf], work_dir: &Path, out: &Path) -> AnyResult<()>;
}

pub struct FfmpegToolkit {
    fps: u32,
}

impl FfmpegToolkit {
    pub fn new(fps: u32) -> Self {
        Self { fps }
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn probe_duration(&self, media: &Path) -> AnyResult<f64> {
        ffmpeg::ffprobe_duration_seconds(media).await
    }

    async fn render_still_clip(
        &self,
        image: &Path,
        audio: &Path,
        duration: f64,
        out: &Path,
    ) -> AnyResult<()> {
        if !ffmpeg::ffmpeg_still_clip(image, audio, duration, self.fps, out).await? {
            anyhow::bail!("ffmpeg produced no clip at {}", out.display());
        }
        Ok(())
    }

    async fn concat_clips(&self, clips: &[PathBuf], work_dir: &Path, out: &Path) -> AnyResult<()> {
        let list = work_dir.join("concat_list.txt");
        ffmpeg::write_concat_list(clips, &list).await?;
        if !ffmpeg::ffmpeg_concat_videos(&list, self.fps, out).await? {
            anyhow::bail!("ffmpeg produced no video at {}", out.display());
        }
        Ok(())
    }
}

/// A scene that has both of its assets.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenePair<'a> {
    pub scene: &'a SceneId,
    pub image: &'a Path,
    pub audio: &'a Path,
}

/// Scenes in narrative order that have an image and an audio file.
pub fn pair_scene_assets<'a>(
    script: &'a Script,
    images: &'a AssetMap,
    audio: &'a AssetMap,
) -> Vec<ScenePair<'a>> {
    let mut pairs = Vec::new();
    for scene in script.scene_ids() {
        match (images.get(scene), audio.get(scene)) {
            (Some(image), Some(audio)) => pairs.push(ScenePair {
                scene,
                image: image.as_path(),
                audio: audio.as_path(),
            }),
            (image, audio) => logw(format!(
                "Missing {} for scene {}; skipping",
                match (image.is_none(), audio.is_none()) {
                    (true, true) => "image and audio",
                    (true, false) => "image",
                    _ => "audio",
                },
                scene
            )),
        }
    }
    pairs
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltClip {
    pub scene: SceneId,
    pub path: PathBuf,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledVideo {
    pub path: PathBuf,
    pub clips: Vec<BuiltClip>,
}

/// Builds one clip per usable scene, then muxes them in order into `out`.
/// `work_dir` holds intermediate clips and is cleared on success.
#[allow(clippy::too_many_arguments)]
pub async fn assemble_video(
    toolkit: &dyn MediaToolkit,
    script: &Script,
    images: &AssetMap,
    audio: &AssetMap,
    work_dir: &Path,
    out: &Path,
    min_scenes: usize,
    cancel: &CancelToken,
) -> Result<AssembledVideo> {
    let required = min_scenes.max(1);
    let pairs = pair_scene_assets(script, images, audio);
    if pairs.len() < required {
        return Err(PipelineError::NotEnoughScenes {
            built: pairs.len(),
            required,
        });
    }

    fs::create_dir_all(work_dir).await?;
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut clips = Vec::with_capacity(pairs.len());
    for pair in &pairs {
        cancel.check()?;

        let duration = match toolkit.probe_duration(pair.audio).await {
            Ok(v) => v,
            Err(err) => {
                logw(format!("Bad narration duration for scene {}: {}", pair.scene, err));
                continue;
            }
        };

        let clip_path = work_dir.join(format!("{}.mp4", pair.scene.file_stem()));
        logi(format!(
            "Building clip for scene {} (narr={:.2}s) => {}",
            pair.scene,
            duration,
            clip_path.display()
        ));
        if let Err(err) = toolkit
            .render_still_clip(pair.image, pair.audio, duration, &clip_path)
            .await
        {
            logw(format!("Failed to build clip for scene {}: {}", pair.scene, err));
            continue;
        }

        clips.push(BuiltClip {
            scene: pair.scene.clone(),
            path: clip_path,
            duration,
        });
    }

    if clips.len() < required {
        return Err(PipelineError::NotEnoughScenes {
            built: clips.len(),
            required,
        });
    }
    logok(format!("Clips produced: {} of {} scenes", clips.len(), script.len()));

    cancel.check()?;
    let paths: Vec<PathBuf> = clips.iter().map(|c| c.path.clone()).collect();
    toolkit
        .concat_clips(&paths, work_dir, out)
        .await
        .map_err(|err| PipelineError::Ffmpeg(format!("{:#}", err)))?;
    logok(format!("Wrote video: {}", out.display()));

    clear_directory(work_dir).await;

    Ok(AssembledVideo {
        path: out.to_path_buf(),
        clips,
    })
}

async fn clear_directory(dir_path: &Path) {
    for entry in WalkDir::new(dir_path).contents_first(true) {
        let Ok(entry) = entry else {
            continue;
        };
        let path = entry.path();
        if entry.file_type().is_dir() {
            fs::remove_dir(path).await.ok();
        } else {
            fs::remove_file(path).await.ok();
        }
    }
}
