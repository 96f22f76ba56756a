//! The project bundle handed to the serializer and packager.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geometry::{Color, Size};
use crate::layer::Layer;
use crate::state::{CaState, OverrideMap};
use crate::transition::{build_transitions, StateTransition};
use crate::CamlResult;

/// Characters never allowed in exported file or folder names.
const FORBIDDEN_FILENAME_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Which consuming layout a project targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    /// Separate background and floating documents.
    #[default]
    Plain,
    /// A single gyro-parallax wallpaper document.
    Gyro,
}

/// One document folder inside a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    /// Content behind the clock.
    Background,
    /// Content in front of the clock.
    Floating,
    /// Gyro wallpaper content.
    Wallpaper,
}

impl DocumentType {
    /// Folder name of this document inside the project folder.
    #[must_use]
    pub const fn folder_name(self) -> &'static str {
        match self {
            Self::Background => "Background.ca",
            Self::Floating => "Floating.ca",
            Self::Wallpaper => "Wallpaper.ca",
        }
    }
}

/// Project metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMeta {
    /// Asset store key of the project.
    pub id: String,
    /// Human-readable name; sanitized before use on disk.
    pub name: String,
    /// Canvas width in points.
    #[serde(default)]
    pub width: f64,
    /// Canvas height in points.
    #[serde(default)]
    pub height: f64,
    /// Canvas background fill.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<Color>,
    /// Flip the y axis of the root layer.
    #[serde(default)]
    pub geometry_flipped: bool,
    /// Target layout.
    #[serde(default)]
    pub kind: ProjectKind,
    /// Declares light/dark state variants.
    #[serde(default)]
    pub appearance_aware: bool,
}

impl ProjectMeta {
    /// Metadata for a plain project with the given canvas size.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, canvas: Size) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            width: canvas.width,
            height: canvas.height,
            background: None,
            geometry_flipped: false,
            kind: ProjectKind::Plain,
            appearance_aware: false,
        }
    }

    /// Canvas size.
    #[must_use]
    pub const fn canvas(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Project folder name: the sanitized name with a `.ca` extension.
    #[must_use]
    pub fn folder_name(&self) -> String {
        format!("{}.ca", sanitize_filename(&self.name))
    }
}

/// Device-motion axis of a parallax group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParallaxAxis {
    /// Horizontal tilt.
    X,
    /// Vertical tilt.
    Y,
}

impl ParallaxAxis {
    /// The CAML spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
        }
    }
}

/// Maps device tilt on one axis onto a layer attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallaxGroup {
    /// Tilt axis.
    pub axis: ParallaxAxis,
    /// Image name shown by the wallpaper picker.
    pub image: String,
    /// Driven attribute.
    pub key_path: String,
    /// Name of the driven layer.
    pub layer_name: String,
    /// Attribute value at maximum tilt.
    pub map_max_to: f64,
    /// Attribute value at minimum tilt.
    pub map_min_to: f64,
    /// Display title.
    pub title: String,
    /// Owning view name.
    pub view: String,
}

mod base64_assets {
    use std::collections::BTreeMap;

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub(super) fn serialize<S: Serializer>(
        assets: &BTreeMap<String, Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let encoded: BTreeMap<&str, String> = assets
            .iter()
            .map(|(k, v)| (k.as_str(), STANDARD.encode(v)))
            .collect();
        encoded.serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Vec<u8>>, D::Error> {
        let encoded = BTreeMap::<String, String>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(k, v)| {
                STANDARD
                    .decode(v.as_bytes())
                    .map(|bytes| (k, bytes))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

/// Everything needed to serialize one CAML document.
///
/// Built by the editor and passed in read-only; nothing here mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaProjectBundle {
    /// Project metadata.
    pub meta: ProjectMeta,
    /// Root of the layer tree.
    pub root: Layer,
    /// Binary assets keyed by document-relative path (base64 in JSON).
    #[serde(default, with = "base64_assets", skip_serializing_if = "BTreeMap::is_empty")]
    pub assets: BTreeMap<String, Vec<u8>>,
    /// Declared state names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub state_names: Vec<String>,
    /// Overrides per state.
    #[serde(default, skip_serializing_if = "OverrideMap::is_empty")]
    pub overrides: OverrideMap,
    /// Transitions; synthesized from the overrides when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<StateTransition>,
    /// Parallax groups (gyro projects only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parallax_groups: Vec<ParallaxGroup>,
}

impl CaProjectBundle {
    /// A bundle with no assets, states or parallax.
    #[must_use]
    pub fn new(meta: ProjectMeta, root: Layer) -> Self {
        Self {
            meta,
            root,
            assets: BTreeMap::new(),
            state_names: Vec::new(),
            overrides: OverrideMap::new(),
            transitions: Vec::new(),
            parallax_groups: Vec::new(),
        }
    }

    /// Decode a bundle from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or any union value matches
    /// none of its permitted shapes.
    pub fn from_json(json: &str) -> CamlResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encode the bundle as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> CamlResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Declared state names, or the project's default state list.
    #[must_use]
    pub fn effective_state_names(&self) -> Vec<String> {
        if self.state_names.is_empty() {
            CaState::all(self.meta.appearance_aware)
                .into_iter()
                .map(|s| s.as_str().to_string())
                .collect()
        } else {
            self.state_names.clone()
        }
    }

    /// Declared transitions, or ones synthesized from the overrides.
    #[must_use]
    pub fn effective_transitions(&self) -> Vec<StateTransition> {
        if self.transitions.is_empty() {
            build_transitions(&self.effective_state_names(), &self.overrides)
        } else {
            self.transitions.clone()
        }
    }
}

/// Make a project name safe for use as a file or folder name.
///
/// Replaces `/ \ : * ? " < > |` with `_`, collapses runs of `_`, trims
/// surrounding whitespace and falls back to `untitled`.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if FORBIDDEN_FILENAME_CHARS.contains(&c) {
            '_'
        } else {
            c
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    let trimmed = out.trim();
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}
