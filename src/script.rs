use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Scene key as returned by the script writer ("1", "2", ...).
///
/// Integer ids sort numerically and come before any non-numeric id, which
/// sort lexicographically among themselves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(String);

impl SceneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u64> {
        self.0.trim().parse().ok()
    }

    /// `scene_<id>` where every byte outside `[A-Za-z0-9-]` is written as
    /// `_xx` (hex). Distinct ids give distinct stems, and a remote-provided
    /// id can never escape the job directory.
    pub fn file_stem(&self) -> String {
        let mut stem = String::from("scene_");
        for byte in self.0.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                stem.push(byte as char);
            } else {
                stem.push_str(&format!("_{:02x}", byte));
            }
        }
        stem
    }
}

impl Ord for SceneId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for SceneId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SceneId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(rename = "image", alias = "image_prompt")]
    pub image_prompt: String,
    #[serde(rename = "text", alias = "narration_text")]
    pub narration_text: String,
}

impl Scene {
    pub fn new(image_prompt: impl Into<String>, narration_text: impl Into<String>) -> Self {
        Self {
            image_prompt: image_prompt.into(),
            narration_text: narration_text.into(),
        }
    }
}

/// Generated asset per scene (audio or image file).
pub type AssetMap = BTreeMap<SceneId, PathBuf>;

/// Scene list of one job, iterated in narrative order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Script {
    scenes: BTreeMap<SceneId, Scene>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptShape {
    Keyed(BTreeMap<SceneId, Scene>),
    Listed(Vec<Scene>),
}

fn code_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").expect("static regex")
    })
}

impl Script {
    /// Parses the writer's JSON. Accepts the object-keyed-by-scene-number
    /// shape, a bare array of scenes (numbered from 1), and either wrapped
    /// in a markdown code fence.
    pub fn from_json(text: &str) -> Result<Self> {
        let body = match code_fence().captures(text) {
            Some(cap) => cap.get(1).map(|m| m.as_str()).unwrap_or(text),
            None => text,
        };

        let shape: ScriptShape =
            serde_json::from_str(body.trim()).with_context(|| "Failed to parse script JSON")?;
        let scenes = match shape {
            ScriptShape::Keyed(map) => map,
            ScriptShape::Listed(list) => list
                .into_iter()
                .enumerate()
                .map(|(idx, scene)| (SceneId::new((idx + 1).to_string()), scene))
                .collect(),
        };

        if scenes.is_empty() {
            anyhow::bail!("Script contains no scenes");
        }
        Ok(Self { scenes })
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn get(&self, id: &SceneId) -> Option<&Scene> {
        self.scenes.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SceneId, &Scene)> {
        self.scenes.iter()
    }

    pub fn scene_ids(&self) -> impl Iterator<Item = &SceneId> {
        self.scenes.keys()
    }
}

impl FromIterator<(SceneId, Scene)> for Script {
    fn from_iter<I: IntoIterator<Item = (SceneId, Scene)>>(iter: I) -> Self {
        Self {
            scenes: iter.into_iter().collect(),
        }
    }
}
