//! Layers - the nodes of a scene tree.
//!
//! A [`Layer`] carries the attributes every Core Animation layer shares and a
//! closed [`LayerKind`] holding the kind-specific payload. Parents own their
//! children outright; there are no back-references.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{Color, Size, Vec2};
use crate::value::{AnimationValue, KeyPath};

/// Stable identifier of a layer, referenced by overrides and transitions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(String);

impl LayerId {
    /// Wrap an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LayerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for LayerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Compositing blend mode of a layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlendMode {
    /// Source-over; emitted as no filter at all.
    #[default]
    Normal,
    /// Multiply.
    Multiply,
    /// Screen.
    Screen,
    /// Overlay.
    Overlay,
    /// Darken.
    Darken,
    /// Lighten.
    Lighten,
    /// Color dodge.
    ColorDodge,
    /// Color burn.
    ColorBurn,
    /// Soft light.
    SoftLight,
    /// Hard light.
    HardLight,
    /// Difference.
    Difference,
    /// Exclusion.
    Exclusion,
}

impl BlendMode {
    /// The `compositingFilter` name, or `None` for [`BlendMode::Normal`].
    #[must_use]
    pub const fn compositing_filter(self) -> Option<&'static str> {
        match self {
            Self::Normal => None,
            Self::Multiply => Some("multiplyBlendMode"),
            Self::Screen => Some("screenBlendMode"),
            Self::Overlay => Some("overlayBlendMode"),
            Self::Darken => Some("darkenBlendMode"),
            Self::Lighten => Some("lightenBlendMode"),
            Self::ColorDodge => Some("colorDodgeBlendMode"),
            Self::ColorBurn => Some("colorBurnBlendMode"),
            Self::SoftLight => Some("softLightBlendMode"),
            Self::HardLight => Some("hardLightBlendMode"),
            Self::Difference => Some("differenceBlendMode"),
            Self::Exclusion => Some("exclusionBlendMode"),
        }
    }
}

/// Keyframe interpolation mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CalculationMode {
    /// Linear interpolation between keyframes.
    #[default]
    Linear,
    /// Jump between keyframes.
    Discrete,
    /// Even pacing.
    Paced,
    /// Catmull-Rom spline.
    Cubic,
    /// Spline with even pacing.
    CubicPaced,
}

impl CalculationMode {
    /// The CAML spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Discrete => "discrete",
            Self::Paced => "paced",
            Self::Cubic => "cubic",
            Self::CubicPaced => "cubicPaced",
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_one() -> f64 {
    1.0
}

/// A keyframe animation attached to a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerAnimation {
    /// Disabled animations are not serialized.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Animated attribute.
    pub key_path: KeyPath,
    /// Keyframe values.
    pub values: Vec<AnimationValue>,
    /// Duration of one cycle in seconds.
    #[serde(default = "default_one")]
    pub duration: f64,
    /// Play backwards after each forward cycle.
    #[serde(default)]
    pub auto_reverses: bool,
    /// Repeat forever (overrides `repeat_count`).
    #[serde(default)]
    pub infinite: bool,
    /// Finite repeat count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_count: Option<f64>,
    /// Playback speed multiplier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Interpolation mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculation_mode: Option<CalculationMode>,
}

impl LayerAnimation {
    /// An enabled, non-repeating animation of `key_path` through `values`.
    #[must_use]
    pub fn new(key_path: KeyPath, values: Vec<AnimationValue>, duration: f64) -> Self {
        Self {
            enabled: true,
            key_path,
            values,
            duration,
            auto_reverses: false,
            infinite: false,
            repeat_count: None,
            speed: None,
            calculation_mode: None,
        }
    }
}

/// Horizontal text alignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlignment {
    /// Natural/left.
    #[default]
    Left,
    /// Centered.
    Center,
    /// Right.
    Right,
    /// Justified.
    Justified,
}

impl TextAlignment {
    /// The CAML `alignmentMode` value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
            Self::Justified => "justified",
        }
    }
}

/// Gradient geometry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradientType {
    /// Linear between start and end point.
    #[default]
    Axial,
    /// Radial from the start point.
    Radial,
    /// Sweep around the start point.
    Conic,
}

impl GradientType {
    /// The CAML `type` value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Axial => "axial",
            Self::Radial => "radial",
            Self::Conic => "conic",
        }
    }
}

/// One color stop of a gradient.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    /// Stop color.
    pub color: Color,
    /// Location in `0.0..=1.0`; evenly spaced when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<f64>,
}

/// A particle template of an emitter layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitterCell {
    /// Cell identifier.
    pub id: String,
    /// Asset path of the particle image, relative to the document.
    pub src: String,
    /// Particles per second.
    #[serde(default = "default_one")]
    pub birth_rate: f64,
    /// Seconds each particle lives.
    #[serde(default = "default_one")]
    pub lifetime: f64,
    /// Initial speed.
    #[serde(default)]
    pub velocity: f64,
    /// Random speed variation.
    #[serde(default)]
    pub velocity_range: f64,
    /// Emission cone in degrees.
    #[serde(default)]
    pub emission_range: f64,
    /// Initial scale.
    #[serde(default = "default_one")]
    pub scale: f64,
    /// Random scale variation.
    #[serde(default)]
    pub scale_range: f64,
    /// Scale change per second.
    #[serde(default)]
    pub scale_speed: f64,
    /// Alpha change per second.
    #[serde(default)]
    pub alpha_speed: f64,
    /// Spin in degrees per second.
    #[serde(default)]
    pub spin: f64,
    /// Random spin variation.
    #[serde(default)]
    pub spin_range: f64,
    /// Horizontal acceleration.
    #[serde(default)]
    pub x_acceleration: f64,
    /// Vertical acceleration.
    #[serde(default)]
    pub y_acceleration: f64,
}

/// Kind-specific layer payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum LayerKind {
    /// A plain container layer.
    Basic,

    /// A text layer.
    #[serde(rename_all = "camelCase")]
    Text {
        /// Text content.
        text: String,
        /// Font name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        font_family: Option<String>,
        /// Font size in points.
        font_size: f64,
        /// Text color.
        color: Color,
        /// Alignment.
        #[serde(default)]
        align: TextAlignment,
        /// Wrap long lines.
        #[serde(default)]
        wrapped: bool,
    },

    /// A bitmap image.
    #[serde(rename_all = "camelCase")]
    Image {
        /// Asset path, relative to the document folder.
        src: String,
        /// Contents gravity (e.g. `resizeAspectFill`).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gravity: Option<String>,
    },

    /// A vector shape.
    #[serde(rename_all = "camelCase")]
    Shape {
        /// SVG-style path data.
        path: String,
        /// Fill color.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fill: Option<Color>,
        /// Stroke color.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stroke: Option<Color>,
        /// Stroke width.
        #[serde(default)]
        line_width: f64,
    },

    /// A color gradient.
    #[serde(rename_all = "camelCase")]
    Gradient {
        /// Gradient geometry.
        #[serde(default)]
        gradient_type: GradientType,
        /// Start point in unit coordinates.
        start_point: Vec2,
        /// End point in unit coordinates.
        end_point: Vec2,
        /// Color stops.
        stops: Vec<GradientStop>,
    },

    /// A video expanded into an image sequence.
    #[serde(rename_all = "camelCase")]
    Video {
        /// Number of frames.
        frame_count: u32,
        /// Frames per second.
        fps: f64,
        /// Asset path prefix of every frame (e.g. `assets/clip_frame_`).
        frame_prefix: String,
        /// Frame file extension including the dot.
        frame_extension: String,
        /// Play the sequence back and forth.
        #[serde(default)]
        auto_reverses: bool,
    },

    /// A particle emitter.
    #[serde(rename_all = "camelCase")]
    Emitter {
        /// Emitter origin.
        emitter_position: Vec2,
        /// Emitter extent.
        emitter_size: Size,
        /// Emitter shape (`point`, `line`, `rectangle`, ...).
        emitter_shape: String,
        /// Emission mode (`points`, `outline`, `surface`, `volume`).
        emitter_mode: String,
        /// Render order (`unordered`, `additive`, ...).
        render_mode: String,
        /// Particle templates.
        cells: Vec<EmitterCell>,
    },

    /// A 3-D transform container.
    Transform,

    /// A replicator.
    #[serde(rename_all = "camelCase")]
    Replicator {
        /// Copies rendered.
        instance_count: u32,
        /// Delay between copies in seconds.
        #[serde(default)]
        instance_delay: f64,
        /// Offset between successive copies.
        #[serde(default)]
        instance_translation: Vec2,
        /// Rotation between successive copies, degrees.
        #[serde(default)]
        instance_rotation: f64,
    },

    /// A backdrop effect layer that filters what lies behind it.
    #[serde(rename_all = "camelCase")]
    Backdrop {
        /// Gaussian blur radius.
        #[serde(default)]
        blur_radius: f64,
        /// Saturation multiplier.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        saturation: Option<f64>,
    },
}

impl LayerKind {
    /// The CAML element name used for this kind.
    #[must_use]
    pub const fn element_name(&self) -> &'static str {
        match self {
            Self::Basic | Self::Image { .. } | Self::Video { .. } => "CALayer",
            Self::Text { .. } => "CATextLayer",
            Self::Shape { .. } => "CAShapeLayer",
            Self::Gradient { .. } => "CAGradientLayer",
            Self::Emitter { .. } => "CAEmitterLayer",
            Self::Transform => "CATransformLayer",
            Self::Replicator { .. } => "CAReplicatorLayer",
            Self::Backdrop { .. } => "CABackdropLayer",
        }
    }
}

fn default_anchor() -> Vec2 {
    Vec2::new(0.5, 0.5)
}

fn is_default_anchor(v: &Vec2) -> bool {
    *v == default_anchor()
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

fn is_one(v: &f64) -> bool {
    *v == 1.0
}

/// A node in the scene tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    /// Stable identifier.
    pub id: LayerId,
    /// Display name.
    pub name: String,
    /// Kind-specific payload.
    pub kind: LayerKind,
    /// Position of the anchor point in the parent.
    #[serde(default)]
    pub position: Vec2,
    /// Bounds size.
    #[serde(default)]
    pub size: Size,
    /// Anchor point in unit coordinates.
    #[serde(default = "default_anchor", skip_serializing_if = "is_default_anchor")]
    pub anchor_point: Vec2,
    /// Rotation about z, degrees.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rotation: f64,
    /// Rotation about x, degrees.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rotation_x: f64,
    /// Rotation about y, degrees.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rotation_y: f64,
    /// Opacity in `0.0..=1.0`.
    #[serde(default = "default_one", skip_serializing_if = "is_one")]
    pub opacity: f64,
    /// Hidden layers are serialized with `hidden="1"`.
    #[serde(default = "default_true")]
    pub visible: bool,
    /// Corner radius.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub corner_radius: f64,
    /// Depth ordering among siblings.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub z_position: f64,
    /// Background fill.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<Color>,
    /// Compositing blend mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blend_mode: Option<BlendMode>,
    /// Child layers, back to front.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Layer>,
    /// Optional keyframe animation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<LayerAnimation>,
}

impl Layer {
    /// Create a zero-sized layer at the origin, matching a decoded layer
    /// with no geometry fields.
    #[must_use]
    pub fn new(id: impl Into<LayerId>, name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            position: Vec2::ZERO,
            size: Size::default(),
            anchor_point: default_anchor(),
            rotation: 0.0,
            rotation_x: 0.0,
            rotation_y: 0.0,
            opacity: 1.0,
            visible: true,
            corner_radius: 0.0,
            z_position: 0.0,
            background_color: None,
            blend_mode: None,
            children: Vec::new(),
            animation: None,
        }
    }

    /// Set position and size.
    #[must_use]
    pub fn with_frame(mut self, position: Vec2, size: Size) -> Self {
        self.position = position;
        self.size = size;
        self
    }

    /// Set the opacity.
    #[must_use]
    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    /// Set the background color.
    #[must_use]
    pub fn with_background(mut self, color: Color) -> Self {
        self.background_color = Some(color);
        self
    }

    /// Append a child layer.
    #[must_use]
    pub fn with_child(mut self, child: Layer) -> Self {
        self.children.push(child);
        self
    }

    /// Attach an animation.
    #[must_use]
    pub fn with_animation(mut self, animation: LayerAnimation) -> Self {
        self.animation = Some(animation);
        self
    }

    /// Find a layer by ID in this subtree (depth-first, self first).
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&Layer> {
        if self.id.as_str() == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    /// Find a layer by display name in this subtree.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&Layer> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_by_name(name))
    }

    /// Every layer of this subtree in pre-order.
    #[must_use]
    pub fn descendants(&self) -> Vec<&Layer> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(layer) = stack.pop() {
            out.push(layer);
            stack.extend(layer.children.iter().rev());
        }
        out
    }

    /// Asset paths referenced by this subtree.
    #[must_use]
    pub fn asset_references(&self) -> Vec<String> {
        let mut refs = Vec::new();
        for layer in self.descendants() {
            match &layer.kind {
                LayerKind::Image { src, .. } => refs.push(src.clone()),
                LayerKind::Video {
                    frame_count,
                    frame_prefix,
                    frame_extension,
                    ..
                } => refs.extend(
                    (0..*frame_count).map(|i| format!("{frame_prefix}{i}{frame_extension}")),
                ),
                LayerKind::Emitter { cells, .. } => {
                    refs.extend(cells.iter().map(|c| c.src.clone()));
                }
                _ => {}
            }
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Layer {
        Layer::new("root", "Root", LayerKind::Basic)
            .with_child(
                Layer::new("a", "A", LayerKind::Basic)
                    .with_child(Layer::new(
                        "a1",
                        "Photo",
                        LayerKind::Image {
                            src: "assets/photo.png".into(),
                            gravity: None,
                        },
                    )),
            )
            .with_child(Layer::new("b", "B", LayerKind::Transform))
    }

    #[test]
    fn test_find_and_descendants() {
        let root = tree();
        assert_eq!(root.find("a1").map(|l| l.name.as_str()), Some("Photo"));
        assert!(root.find("missing").is_none());
        assert_eq!(root.find_by_name("B").map(|l| l.id.as_str()), Some("b"));

        let order: Vec<&str> = root.descendants().iter().map(|l| l.id.as_str()).collect();
        assert_eq!(order, vec!["root", "a", "a1", "b"]);
    }

    #[test]
    fn test_asset_references_include_video_frames() {
        let video = Layer::new(
            "v",
            "Clip",
            LayerKind::Video {
                frame_count: 2,
                fps: 30.0,
                frame_prefix: "assets/clip_".into(),
                frame_extension: ".jpg".into(),
                auto_reverses: false,
            },
        );
        let root = tree().with_child(video);
        assert_eq!(
            root.asset_references(),
            vec![
                "assets/photo.png".to_string(),
                "assets/clip_0.jpg".to_string(),
                "assets/clip_1.jpg".to_string(),
            ]
        );
    }

    #[test]
    fn test_layer_json_defaults() {
        let json = r##"{"id":"t","name":"Title","kind":{"type":"text","data":{"text":"Hi","fontSize":20,"color":"#ffffff"}}}"##;
        let layer: Layer = serde_json::from_str(json).expect("decode");
        assert!((layer.opacity - 1.0).abs() < f64::EPSILON);
        assert!(layer.visible);
        assert_eq!(layer.anchor_point, Vec2::new(0.5, 0.5));
        assert_eq!(layer.kind.element_name(), "CATextLayer");
    }

    #[test]
    fn test_new_layer_matches_decoded_defaults() {
        let json = r#"{"id":"b","name":"Box","kind":{"type":"basic"}}"#;
        let decoded: Layer = serde_json::from_str(json).expect("decode");
        assert_eq!(decoded, Layer::new("b", "Box", LayerKind::Basic));
        assert_eq!(decoded.size, Size::default());
    }

    #[test]
    fn test_layer_rejects_bad_animation_value() {
        let json = r#"{"id":"t","name":"T","kind":{"type":"basic"},
            "animation":{"keyPath":"position","values":[{"a":1}]}}"#;
        let result: Result<Layer, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_generated_ids_unique() {
        assert_ne!(LayerId::generate(), LayerId::generate());
    }
}
