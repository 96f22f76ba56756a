//! CAML serialization.
//!
//! The output is consumed by Core Animation's own CAML loader, so element
//! names, attribute names, nesting and number formatting are fixed by that
//! parser. Optional attributes are left out entirely rather than written
//! empty.
//!
//! ```text
//! <?xml version="1.0" encoding="UTF-8"?>
//! <caml xmlns="http://www.apple.com/CoreAnimation/1.0">
//!   <CALayer ... geometryFlipped="0">      canvas root
//!     <sublayers>...</sublayers>          layer tree
//!     <animations>...</animations>
//!     <states>...</states>                LKState + LKStateSetValue
//!     <stateTransitions>...</stateTransitions>
//!     <wallpaperParallaxGroups>...</wallpaperParallaxGroups>
//!   </CALayer>
//! </caml>
//! ```

use std::fmt::Write;

use crate::geometry::{Color, Size, Vec2};
use crate::layer::{EmitterCell, Layer, LayerAnimation, LayerKind};
use crate::project::{CaProjectBundle, ParallaxGroup, ProjectKind, ProjectMeta};
use crate::state::{OverrideMap, StateOverride, BASE_STATE};
use crate::transition::StateTransition;
use crate::value::{AnimationValue, KeyPath, OverrideValue};
use crate::{CamlError, CamlResult};

/// XML declaration at the top of every document.
pub const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Namespace of the `caml` root element.
pub const CAML_NAMESPACE: &str = "http://www.apple.com/CoreAnimation/1.0";

type Attrs = Vec<(&'static str, String)>;

/// Indenting XML writer over a `String`.
struct MarkupWriter {
    out: String,
    depth: usize,
}

impl MarkupWriter {
    fn new() -> Self {
        let mut out = String::with_capacity(4096);
        out.push_str(XML_HEADER);
        out.push('\n');
        Self { out, depth: 0 }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
    }

    fn tag(&mut self, name: &str, attrs: &Attrs, self_closing: bool) {
        self.indent();
        let _ = write!(self.out, "<{name}");
        for (key, value) in attrs {
            let _ = write!(self.out, " {key}=\"{}\"", escape_xml(value));
        }
        self.out.push_str(if self_closing { "/>\n" } else { ">\n" });
    }

    fn open(&mut self, name: &str, attrs: &Attrs) {
        self.tag(name, attrs, false);
        self.depth += 1;
    }

    fn close(&mut self, name: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        let _ = writeln!(self.out, "</{name}>");
    }

    fn empty(&mut self, name: &str, attrs: &Attrs) {
        self.tag(name, attrs, true);
    }

    fn typed(&mut self, name: &str, kind: &str, value: String) {
        self.empty(name, &vec![("type", kind.to_string()), ("value", value)]);
    }

    fn finish(self) -> String {
        self.out
    }
}

/// Serialize a layer tree plus its state data into a CAML document.
///
/// `root`'s children become the canvas root's sublayers; the canvas root
/// itself takes its geometry from `meta` and keeps its own kind, so a text
/// or image root still carries its content. Parallax groups are written only
/// for gyro projects.
#[must_use]
pub fn serialize_caml<S: AsRef<str>>(
    root: &Layer,
    meta: &ProjectMeta,
    state_names: &[S],
    overrides: &OverrideMap,
    transitions: &[StateTransition],
    parallax_groups: &[ParallaxGroup],
) -> String {
    let mut w = MarkupWriter::new();
    w.open("caml", &vec![("xmlns", CAML_NAMESPACE.to_string())]);

    let canvas = meta.canvas();
    let mut attrs: Attrs = vec![
        ("id", root.id.to_string()),
        ("name", root.name.clone()),
        ("bounds", rect(canvas)),
        ("position", point(canvas.center())),
    ];
    push_appearance(&mut attrs, root);
    if let Some(bg) = meta.background.or(root.background_color) {
        attrs.push(("backgroundColor", color(bg)));
    }
    push_kind_attrs(&mut attrs, &root.kind);
    attrs.push(("geometryFlipped", flag(meta.geometry_flipped)));
    let element = root.kind.element_name();
    w.open(element, &attrs);

    write_kind_body(&mut w, &root.kind);
    write_sublayers(&mut w, &root.children);
    let animation = root.animation.as_ref().filter(|a| is_emittable(a));
    let video = has_video_frames(&root.kind);
    if animation.is_some() || video {
        w.open("animations", &Vec::new());
        if let Some(anim) = animation {
            write_animation(&mut w, anim);
        }
        if video {
            write_video_animation(&mut w, &root.kind);
        }
        w.close("animations");
    }
    write_states(&mut w, state_names, overrides);
    write_transitions(&mut w, transitions);
    if meta.kind == ProjectKind::Gyro {
        write_parallax(&mut w, parallax_groups);
    }

    w.close(element);
    w.close("caml");
    w.finish()
}

impl CaProjectBundle {
    /// Serialize this bundle, synthesizing defaults for missing state data.
    #[must_use]
    pub fn to_caml(&self) -> String {
        serialize_caml(
            &self.root,
            &self.meta,
            &self.effective_state_names(),
            &self.overrides,
            &self.effective_transitions(),
            &self.parallax_groups,
        )
    }
}

fn write_sublayers(w: &mut MarkupWriter, children: &[Layer]) {
    if children.is_empty() {
        return;
    }
    w.open("sublayers", &Vec::new());
    for child in children {
        write_layer(w, child);
    }
    w.close("sublayers");
}

fn write_layer(w: &mut MarkupWriter, layer: &Layer) {
    let name = layer.kind.element_name();
    let mut attrs: Attrs = vec![
        ("id", layer.id.to_string()),
        ("name", layer.name.clone()),
        ("bounds", rect(layer.size)),
        ("position", point(layer.position)),
    ];
    if layer.anchor_point != Vec2::new(0.5, 0.5) {
        attrs.push(("anchorPoint", point(layer.anchor_point)));
    }
    push_appearance(&mut attrs, layer);
    if let Some(bg) = layer.background_color {
        attrs.push(("backgroundColor", color(bg)));
    }
    if let Some(filter) = layer.blend_mode.and_then(|b| b.compositing_filter()) {
        attrs.push(("compositingFilter", filter.to_string()));
    }
    if let Some(transform) = rotation_transform(layer) {
        attrs.push(("transform", transform));
    }
    push_kind_attrs(&mut attrs, &layer.kind);

    let animation = layer.animation.as_ref().filter(|a| is_emittable(a));
    let video = has_video_frames(&layer.kind);
    let has_body = !layer.children.is_empty()
        || animation.is_some()
        || video
        || matches!(
            layer.kind,
            LayerKind::Image { .. }
                | LayerKind::Shape { .. }
                | LayerKind::Gradient { .. }
                | LayerKind::Emitter { .. }
                | LayerKind::Backdrop { .. }
        );
    if !has_body {
        w.empty(name, &attrs);
        return;
    }

    w.open(name, &attrs);
    write_kind_body(w, &layer.kind);
    write_sublayers(w, &layer.children);
    if animation.is_some() || video {
        w.open("animations", &Vec::new());
        if let Some(anim) = animation {
            write_animation(w, anim);
        }
        if video {
            write_video_animation(w, &layer.kind);
        }
        w.close("animations");
    }
    w.close(name);
}

fn push_appearance(attrs: &mut Attrs, layer: &Layer) {
    if layer.z_position != 0.0 {
        attrs.push(("zPosition", format_number(layer.z_position)));
    }
    if layer.corner_radius != 0.0 {
        attrs.push(("cornerRadius", format_number(layer.corner_radius)));
    }
    if layer.opacity != 1.0 {
        attrs.push(("opacity", format_number(layer.opacity)));
    }
    if !layer.visible {
        attrs.push(("hidden", flag(true)));
    }
}

fn rotation_transform(layer: &Layer) -> Option<String> {
    let parts: Vec<String> = [
        ("rotate", layer.rotation),
        ("rotateX", layer.rotation_x),
        ("rotateY", layer.rotation_y),
    ]
    .into_iter()
    .filter(|(_, deg)| *deg != 0.0)
    .map(|(f, deg)| format!("{f}({}deg)", format_number(deg)))
    .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}

fn push_kind_attrs(attrs: &mut Attrs, kind: &LayerKind) {
    match kind {
        LayerKind::Text {
            text,
            font_family,
            font_size,
            color: fg,
            align,
            wrapped,
        } => {
            attrs.push(("string", text.clone()));
            if let Some(font) = font_family {
                attrs.push(("fontFamily", font.clone()));
            }
            attrs.push(("fontSize", format_number(*font_size)));
            attrs.push(("foregroundColor", color(*fg)));
            attrs.push(("alignmentMode", align.as_str().to_string()));
            attrs.push(("wrapped", flag(*wrapped)));
        }
        LayerKind::Image { gravity, .. } => {
            if let Some(gravity) = gravity {
                attrs.push(("contentsGravity", gravity.clone()));
            }
        }
        LayerKind::Shape {
            fill,
            stroke,
            line_width,
            ..
        } => {
            if let Some(fill) = fill {
                attrs.push(("fillColor", color(*fill)));
            }
            if let Some(stroke) = stroke {
                attrs.push(("strokeColor", color(*stroke)));
            }
            if *line_width != 0.0 {
                attrs.push(("lineWidth", format_number(*line_width)));
            }
        }
        LayerKind::Gradient {
            gradient_type,
            start_point,
            end_point,
            ..
        } => {
            attrs.push(("type", gradient_type.as_str().to_string()));
            attrs.push(("startPoint", point(*start_point)));
            attrs.push(("endPoint", point(*end_point)));
        }
        LayerKind::Emitter {
            emitter_position,
            emitter_size,
            emitter_shape,
            emitter_mode,
            render_mode,
            ..
        } => {
            attrs.push(("emitterPosition", point(*emitter_position)));
            attrs.push(("emitterSize", pair(emitter_size.width, emitter_size.height)));
            attrs.push(("emitterShape", emitter_shape.clone()));
            attrs.push(("emitterMode", emitter_mode.clone()));
            attrs.push(("renderMode", render_mode.clone()));
        }
        LayerKind::Replicator {
            instance_count,
            instance_delay,
            instance_translation,
            instance_rotation,
        } => {
            attrs.push(("instanceCount", instance_count.to_string()));
            if *instance_delay != 0.0 {
                attrs.push(("instanceDelay", format_number(*instance_delay)));
            }
            let mut transform = Vec::new();
            if *instance_translation != Vec2::ZERO {
                transform.push(format!(
                    "translate({}, {})",
                    format_number(instance_translation.x),
                    format_number(instance_translation.y)
                ));
            }
            if *instance_rotation != 0.0 {
                transform.push(format!("rotate({}deg)", format_number(*instance_rotation)));
            }
            if !transform.is_empty() {
                attrs.push(("instanceTransform", transform.join(" ")));
            }
        }
        LayerKind::Basic
        | LayerKind::Video { .. }
        | LayerKind::Transform
        | LayerKind::Backdrop { .. } => {}
    }
}

fn write_kind_body(w: &mut MarkupWriter, kind: &LayerKind) {
    match kind {
        LayerKind::Image { src, .. } => {
            w.empty(
                "contents",
                &vec![("type", "CGImage".to_string()), ("src", src.clone())],
            );
        }
        LayerKind::Shape { path, .. } => {
            w.typed("path", "CGPath", path.clone());
        }
        LayerKind::Gradient { stops, .. } => {
            w.open("colors", &Vec::new());
            for stop in stops {
                w.empty("CGColor", &vec![("value", color(stop.color))]);
            }
            w.close("colors");
            if stops.iter().any(|s| s.location.is_some()) {
                w.open("locations", &Vec::new());
                for location in gradient_locations(stops) {
                    w.empty("real", &vec![("value", format_number(location))]);
                }
                w.close("locations");
            }
        }
        LayerKind::Emitter { cells, .. } => {
            w.open("emitterCells", &Vec::new());
            for cell in cells {
                write_emitter_cell(w, cell);
            }
            w.close("emitterCells");
        }
        LayerKind::Backdrop {
            blur_radius,
            saturation,
        } => {
            w.open("filters", &Vec::new());
            write_filter(w, "gaussianBlur", "inputRadius", *blur_radius);
            if let Some(amount) = saturation {
                write_filter(w, "colorSaturate", "inputAmount", *amount);
            }
            w.close("filters");
        }
        LayerKind::Basic
        | LayerKind::Text { .. }
        | LayerKind::Video { .. }
        | LayerKind::Transform
        | LayerKind::Replicator { .. } => {}
    }
}

#[allow(clippy::cast_precision_loss)]
fn gradient_locations(stops: &[crate::layer::GradientStop]) -> Vec<f64> {
    let last = stops.len().saturating_sub(1).max(1) as f64;
    stops
        .iter()
        .enumerate()
        .map(|(i, s)| s.location.unwrap_or(i as f64 / last))
        .collect()
}

fn write_filter(w: &mut MarkupWriter, filter: &str, input: &str, amount: f64) {
    w.open(
        "filter",
        &vec![("type", filter.to_string()), ("name", filter.to_string())],
    );
    w.typed(input, "real", format_number(amount));
    w.close("filter");
}

fn write_emitter_cell(w: &mut MarkupWriter, cell: &EmitterCell) {
    let attrs: Attrs = vec![
        ("id", cell.id.clone()),
        ("birthRate", format_number(cell.birth_rate)),
        ("lifetime", format_number(cell.lifetime)),
        ("velocity", format_number(cell.velocity)),
        ("velocityRange", format_number(cell.velocity_range)),
        ("emissionRange", format_number(cell.emission_range.to_radians())),
        ("scale", format_number(cell.scale)),
        ("scaleRange", format_number(cell.scale_range)),
        ("scaleSpeed", format_number(cell.scale_speed)),
        ("alphaSpeed", format_number(cell.alpha_speed)),
        ("spin", format_number(cell.spin.to_radians())),
        ("spinRange", format_number(cell.spin_range.to_radians())),
        ("xAcceleration", format_number(cell.x_acceleration)),
        ("yAcceleration", format_number(cell.y_acceleration)),
    ];
    w.open("CAEmitterCell", &attrs);
    w.empty(
        "contents",
        &vec![("type", "CGImage".to_string()), ("src", cell.src.clone())],
    );
    w.close("CAEmitterCell");
}

fn is_emittable(anim: &LayerAnimation) -> bool {
    anim.enabled && !anim.values.is_empty()
}

fn write_animation(w: &mut MarkupWriter, anim: &LayerAnimation) {
    let mut attrs: Attrs = vec![
        ("type", "CAKeyframeAnimation".to_string()),
        ("keyPath", anim.key_path.as_str().to_string()),
        ("duration", format_number(anim.duration)),
        ("autoreverses", flag(anim.auto_reverses)),
    ];
    if anim.infinite {
        attrs.push(("repeatCount", "inf".to_string()));
    } else if let Some(count) = anim.repeat_count {
        attrs.push(("repeatCount", format_number(count)));
    }
    if let Some(speed) = anim.speed {
        attrs.push(("speed", format_number(speed)));
    }
    if let Some(mode) = anim.calculation_mode {
        attrs.push(("calculationMode", mode.as_str().to_string()));
    }
    w.open("animation", &attrs);
    w.open("values", &Vec::new());
    for value in &anim.values {
        let (name, text) = animation_value_parts(*value, anim.key_path);
        w.empty(name, &vec![("value", text)]);
    }
    w.close("values");
    w.close("animation");
}

/// Whether a layer kind plays an image sequence.
fn has_video_frames(kind: &LayerKind) -> bool {
    matches!(kind, LayerKind::Video { frame_count, .. } if *frame_count > 0)
}

/// The discrete `contents` animation that plays a video layer's frames.
fn write_video_animation(w: &mut MarkupWriter, kind: &LayerKind) {
    let LayerKind::Video {
        frame_count,
        fps,
        frame_prefix,
        frame_extension,
        auto_reverses,
    } = kind
    else {
        return;
    };
    let duration = if *fps > 0.0 {
        f64::from(*frame_count) / fps
    } else {
        0.0
    };
    let attrs: Attrs = vec![
        ("type", "CAKeyframeAnimation".to_string()),
        ("keyPath", "contents".to_string()),
        ("duration", format_number(duration)),
        ("autoreverses", flag(*auto_reverses)),
        ("repeatCount", "inf".to_string()),
        ("calculationMode", "discrete".to_string()),
    ];
    w.open("animation", &attrs);
    w.open("values", &Vec::new());
    for i in 0..*frame_count {
        w.empty(
            "CGImage",
            &vec![("src", format!("{frame_prefix}{i}{frame_extension}"))],
        );
    }
    w.close("values");
    w.close("animation");
}

fn write_states<S: AsRef<str>>(w: &mut MarkupWriter, state_names: &[S], overrides: &OverrideMap) {
    let names: Vec<&str> = state_names
        .iter()
        .map(AsRef::as_ref)
        .filter(|s| !s.is_empty() && *s != BASE_STATE)
        .collect();
    if names.is_empty() {
        return;
    }
    w.open("states", &Vec::new());
    for name in names {
        w.open("LKState", &vec![("name", name.to_string())]);
        let grouped = group_by_target(overrides.get(name));
        if grouped.is_empty() {
            w.empty("elements", &Vec::new());
        } else {
            w.open("elements", &Vec::new());
            for entry in grouped {
                w.open(
                    "LKStateSetValue",
                    &vec![
                        ("targetId", entry.target_id.clone()),
                        ("keyPath", entry.key_path.clone()),
                    ],
                );
                let text = match &entry.value {
                    OverrideValue::Integer(i) => i.to_string(),
                    OverrideValue::Float(f) => format_number(*f),
                    OverrideValue::String(s) => s.clone(),
                };
                w.typed("value", entry.value.caml_type(), text);
                w.close("LKStateSetValue");
            }
            w.close("elements");
        }
        w.close("LKState");
    }
    w.close("states");
}

/// Stable grouping: targets in order of first appearance, entries in order.
fn group_by_target(entries: &[StateOverride]) -> Vec<&StateOverride> {
    let mut targets: Vec<&str> = Vec::new();
    for entry in entries {
        if !targets.contains(&entry.target_id.as_str()) {
            targets.push(&entry.target_id);
        }
    }
    targets
        .into_iter()
        .flat_map(|t| entries.iter().filter(move |e| e.target_id == t))
        .collect()
}

fn write_transitions(w: &mut MarkupWriter, transitions: &[StateTransition]) {
    if transitions.is_empty() {
        return;
    }
    w.open("stateTransitions", &Vec::new());
    for transition in transitions {
        w.open(
            "LKStateTransition",
            &vec![
                ("fromState", transition.from_state.clone()),
                ("toState", transition.to_state.clone()),
            ],
        );
        if transition.elements.is_empty() {
            w.empty("elements", &Vec::new());
        } else {
            w.open("elements", &Vec::new());
            for element in &transition.elements {
                let key = element.key_path.as_str().to_string();
                w.open(
                    "LKStateTransitionElement",
                    &vec![("key", key.clone()), ("targetId", element.target_id.clone())],
                );
                let spring = &element.animation;
                w.empty(
                    "animation",
                    &vec![
                        ("type", "CASpringAnimation".to_string()),
                        ("damping", format_number(spring.damping)),
                        ("mass", format_number(spring.mass)),
                        ("stiffness", format_number(spring.stiffness)),
                        ("velocity", format_number(spring.velocity)),
                        ("duration", format_number(spring.duration)),
                        ("fillMode", spring.fill_mode.as_str().to_string()),
                        ("keyPath", key),
                    ],
                );
                w.close("LKStateTransitionElement");
            }
            w.close("elements");
        }
        w.close("LKStateTransition");
    }
    w.close("stateTransitions");
}

fn write_parallax(w: &mut MarkupWriter, groups: &[ParallaxGroup]) {
    if groups.is_empty() {
        return;
    }
    w.open("wallpaperParallaxGroups", &Vec::new());
    for group in groups {
        w.open("NSDictionary", &Vec::new());
        w.typed("axis", "string", group.axis.as_str().to_string());
        w.typed("image", "string", group.image.clone());
        w.typed("keyPath", "string", group.key_path.clone());
        w.typed("layerName", "string", group.layer_name.clone());
        w.typed("mapMaxTo", "real", format_number(group.map_max_to));
        w.typed("mapMinTo", "real", format_number(group.map_min_to));
        w.typed("title", "string", group.title.clone());
        w.typed("view", "string", group.view.clone());
        w.close("NSDictionary");
    }
    w.close("wallpaperParallaxGroups");
}

/// Element name and `value` text of one keyframe value.
fn animation_value_parts(value: AnimationValue, key_path: KeyPath) -> (&'static str, String) {
    match value {
        AnimationValue::Number(n) => ("real", format_number(n)),
        AnimationValue::Point(p) => ("CGPoint", point(p)),
        AnimationValue::Size(s) if key_path == KeyPath::Bounds => ("CGRect", rect(s)),
        AnimationValue::Size(s) => ("CGSize", pair(s.width, s.height)),
    }
}

/// Render one keyframe value as its CAML element.
#[must_use]
pub fn animation_value_markup(value: AnimationValue, key_path: KeyPath) -> String {
    let (name, text) = animation_value_parts(value, key_path);
    format!("<{name} value=\"{text}\"/>")
}

/// Parse a keyframe value element produced by [`animation_value_markup`].
///
/// # Errors
///
/// Returns [`CamlError::Markup`] for anything that is not a `real`,
/// `CGPoint`, `CGSize` or `CGRect` element with a numeric `value`.
pub fn parse_animation_value(fragment: &str) -> CamlResult<AnimationValue> {
    let malformed = || CamlError::Markup(fragment.to_string());
    let body = fragment
        .trim()
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix("/>"))
        .ok_or_else(malformed)?;
    let name = body.split_whitespace().next().ok_or_else(malformed)?;
    let start = body.find("value=\"").ok_or_else(malformed)? + "value=\"".len();
    let len = body[start..].find('"').ok_or_else(malformed)?;
    let numbers = body[start..start + len]
        .split_whitespace()
        .map(str::parse::<f64>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| malformed())?;

    match (name, numbers.as_slice()) {
        ("real", [n]) => Ok(AnimationValue::Number(*n)),
        ("CGPoint", [x, y]) => Ok(AnimationValue::Point(Vec2::new(*x, *y))),
        ("CGSize", [w, h]) | ("CGRect", [_, _, w, h]) => {
            Ok(AnimationValue::Size(Size::new(*w, *h)))
        }
        _ => Err(malformed()),
    }
}

/// Format a number the way CAML expects: shortest round-trip decimal, no
/// trailing `.0`, `inf` for infinity.
#[must_use]
pub fn format_number(value: f64) -> String {
    if value.is_nan() || value == 0.0 {
        "0".to_string()
    } else if value == f64::INFINITY {
        "inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        format!("{value}")
    }
}

fn pair(a: f64, b: f64) -> String {
    format!("{} {}", format_number(a), format_number(b))
}

fn point(p: Vec2) -> String {
    pair(p.x, p.y)
}

fn rect(size: Size) -> String {
    format!("0 0 {}", pair(size.width, size.height))
}

fn color(c: Color) -> String {
    let rgb = format!(
        "{} {} {}",
        format_number(c.r),
        format_number(c.g),
        format_number(c.b)
    );
    if c.a < 1.0 {
        format!("{rgb} {}", format_number(c.a))
    } else {
        rgb
    }
}

fn flag(b: bool) -> String {
    let text = if b { "1" } else { "0" };
    text.to_string()
}

/// Escape special XML characters.
#[must_use]
pub fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
