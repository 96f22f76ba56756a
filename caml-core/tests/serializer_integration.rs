//! Integration tests for the CAML serializer, state engine and transitions.

use caml_core::{
    animation_value_markup, build_transitions, parse_animation_value, resolve_tree,
    sanitize_filename, serialize_caml, AnimationValue, CaProjectBundle, KeyPath, Layer,
    LayerAnimation, LayerKind, OverrideMap, ParallaxAxis, ParallaxGroup, ProjectKind,
    ProjectMeta, Size, StateOverride, Vec2,
};
use proptest::prelude::*;

fn project() -> CaProjectBundle {
    let clock = Layer::new("clock", "Clock", LayerKind::Basic)
        .with_frame(Vec2::new(195.0, 200.0), Size::new(300.0, 120.0));
    let title = Layer::new(
        "title",
        "Title",
        LayerKind::Text {
            text: "Hello".into(),
            font_family: Some("SF Pro".into()),
            font_size: 32.0,
            color: "#ffffff".parse().expect("color"),
            align: caml_core::TextAlignment::Center,
            wrapped: false,
        },
    );
    let root = Layer::new("root", "Root", LayerKind::Basic)
        .with_child(clock)
        .with_child(title);

    let mut bundle = CaProjectBundle::new(
        ProjectMeta::new("proj-1", "Evening", Size::new(390.0, 844.0)),
        root,
    );
    bundle
        .overrides
        .set("Locked", StateOverride::new("clock", "opacity", 0.5));
    bundle
        .overrides
        .set("Locked", StateOverride::new("title", "position.y", 300_i64));
    bundle
        .overrides
        .set("Locked", StateOverride::new("clock", "zPosition", 4_i64));
    bundle
        .overrides
        .set("Sleep", StateOverride::new("title", "cornerRadius", 6.5));
    bundle
}

// ==========================================================================
// Animation value round trips
// ==========================================================================

#[test]
fn test_animation_values_roundtrip_through_markup() {
    let cases = [
        (KeyPath::Opacity, AnimationValue::Number(0.35)),
        (KeyPath::Position, AnimationValue::Point(Vec2::new(-12.5, 400.0))),
        (KeyPath::Bounds, AnimationValue::Size(Size::new(64.0, 32.0))),
        (KeyPath::PositionX, AnimationValue::Size(Size::new(1.0, 2.0))),
    ];
    for (key_path, value) in cases {
        let markup = animation_value_markup(value, key_path);
        let decoded = parse_animation_value(&markup).expect("decode");
        assert_eq!(decoded, value, "round trip of {markup}");
    }
}

#[test]
fn test_serialized_document_values_roundtrip() {
    let values = vec![
        AnimationValue::Point(Vec2::new(0.0, 0.0)),
        AnimationValue::Point(Vec2::new(20.25, -3.0)),
    ];
    let layer = Layer::new("mover", "Mover", LayerKind::Basic).with_animation(
        LayerAnimation::new(KeyPath::Position, values.clone(), 1.0),
    );
    let mut bundle = project();
    bundle.root.children.push(layer);

    let caml = bundle.to_caml();
    let decoded: Vec<AnimationValue> = caml
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("<CGPoint"))
        .map(|l| parse_animation_value(l).expect("value element"))
        .collect();
    assert_eq!(decoded, values);
}

// ==========================================================================
// Transitions
// ==========================================================================

#[test]
fn test_two_transitions_per_eligible_state() {
    let bundle = project();
    let names = ["Locked", "Sleep"];
    let transitions = build_transitions(&names, &bundle.overrides);
    assert_eq!(transitions.len(), 2 * names.len());
    for pair in transitions.chunks(2) {
        assert_eq!(pair[0].elements, pair[1].elements);
        assert_eq!(pair[0].from_state, pair[1].to_state);
        assert_eq!(pair[0].to_state, pair[1].from_state);
        assert_eq!(pair[0].from_state, "*");
    }
    // position.y stays a state override but never animates.
    assert_eq!(transitions[0].elements.len(), 2);
    assert!(transitions[0]
        .elements
        .iter()
        .all(|e| e.key_path.is_state_transitionable()));
}

#[test]
fn test_position_override_contributes_no_elements() {
    let mut overrides = OverrideMap::new();
    overrides.set("Locked", StateOverride::new("t1", "position.x", 10_i64));
    let transitions = build_transitions(&["Locked"], &overrides);
    assert!(transitions.iter().all(|t| t.elements.is_empty()));
}

// ==========================================================================
// Full document
// ==========================================================================

#[test]
fn test_states_block_groups_by_target() {
    let caml = project().to_caml();
    let locked = caml
        .split("<LKState name=\"Locked\">")
        .nth(1)
        .and_then(|rest| rest.split("</LKState>").next())
        .expect("locked state");

    let clock_opacity = locked.find(r#"targetId="clock" keyPath="opacity""#).expect("opacity");
    let clock_z = locked.find(r#"targetId="clock" keyPath="zPosition""#).expect("z");
    let title_y = locked.find(r#"targetId="title" keyPath="position.y""#).expect("y");
    assert!(clock_opacity < clock_z && clock_z < title_y);

    assert!(locked.contains(r#"<value type="real" value="0.5"/>"#));
    assert!(locked.contains(r#"<value type="integer" value="300"/>"#));
    assert!(caml.contains("<LKState name=\"Unlock\">"));
    assert!(!caml.contains("name=\"Base State\""));
}

#[test]
fn test_transition_block_spring_parameters() {
    let caml = project().to_caml();
    assert!(caml.contains(r#"<LKStateTransition fromState="*" toState="Locked">"#));
    assert!(caml.contains(r#"<LKStateTransition fromState="Locked" toState="*">"#));
    assert!(caml.contains(
        r#"<animation type="CASpringAnimation" damping="50" mass="2" stiffness="300" velocity="0" duration="0.8" fillMode="backwards" keyPath="opacity"/>"#
    ));
    assert!(caml.contains(r#"<LKStateTransitionElement key="cornerRadius" targetId="title">"#));
    assert!(!caml.contains(r#"key="position.y""#));
}

#[test]
fn test_parallax_only_for_gyro_projects() {
    let group = ParallaxGroup {
        axis: ParallaxAxis::X,
        image: "Floating".into(),
        key_path: "position.x".into(),
        layer_name: "Clock".into(),
        map_max_to: 20.0,
        map_min_to: -20.0,
        title: "Clock".into(),
        view: "Floating".into(),
    };
    let mut bundle = project();
    bundle.parallax_groups.push(group);
    assert!(!bundle.to_caml().contains("wallpaperParallaxGroups"));

    bundle.meta.kind = ProjectKind::Gyro;
    let caml = bundle.to_caml();
    assert!(caml.contains("<wallpaperParallaxGroups>"));
    assert!(caml.contains(r#"<axis type="string" value="x"/>"#));
    assert!(caml.contains(r#"<mapMinTo type="real" value="-20"/>"#));
}

#[test]
fn test_serializer_with_resolved_tree() {
    let bundle = project();
    let locked = resolve_tree(&bundle.root, "Locked", &bundle.overrides);
    let caml = serialize_caml::<&str>(&locked, &bundle.meta, &[], &OverrideMap::new(), &[], &[]);
    assert!(caml.contains(r#"id="clock" name="Clock" bounds="0 0 300 120" position="195 200" zPosition="4" opacity="0.5""#));
    assert!(caml.contains(r#"id="title""#));
    assert!(caml.contains(r#"position="0 300""#));
}

#[test]
fn test_bundle_json_to_caml() {
    let json = r##"{
        "meta": {"id": "p", "name": "Json", "width": 100, "height": 200, "background": "#000000", "geometryFlipped": true},
        "root": {"id": "root", "name": "Root", "kind": {"type": "basic"}, "children": [
            {"id": "dot", "name": "Dot", "kind": {"type": "shape", "data": {"path": "M0 0 L10 10", "fill": "#ff0000"}},
             "animation": {"keyPath": "bounds", "values": [{"width": 10, "height": 10}, {"width": 20, "height": 20}], "infinite": true}}
        ]},
        "stateNames": ["Base State", "Locked"],
        "overrides": {"Locked": [{"targetId": "dot", "keyPath": "opacity", "value": 0}], "Custom Thing": []}
    }"##;
    let bundle = CaProjectBundle::from_json(json).expect("decode");
    let caml = bundle.to_caml();
    assert!(caml.contains(r#"bounds="0 0 100 200" position="50 100" backgroundColor="0 0 0" geometryFlipped="1""#));
    assert!(caml.contains(r#"<CAShapeLayer id="dot""#));
    assert!(caml.contains(r#"fillColor="1 0 0""#));
    assert!(caml.contains(r#"<path type="CGPath" value="M0 0 L10 10"/>"#));
    assert!(caml.contains(r#"<CGRect value="0 0 20 20"/>"#));
    assert!(caml.contains(r#"<value type="integer" value="0"/>"#));
    assert!(!caml.contains("Custom Thing"));
}

#[test]
fn test_decoded_duplicate_override_emits_once() {
    let json = r#"{
        "meta": {"id": "p", "name": "Dup"},
        "root": {"id": "r", "name": "R", "kind": {"type": "basic"}},
        "stateNames": ["Locked"],
        "overrides": {"Locked": [
            {"targetId": "r", "keyPath": "opacity", "value": 0.5},
            {"targetId": "r", "keyPath": "opacity", "value": 0.75}
        ]}
    }"#;
    let bundle = CaProjectBundle::from_json(json).expect("decode");
    assert_eq!(bundle.overrides.get("Locked").len(), 1);

    let transitions = build_transitions(&bundle.effective_state_names(), &bundle.overrides);
    assert!(transitions.iter().all(|t| t.elements.len() == 1));

    let caml = bundle.to_caml();
    assert_eq!(caml.matches("<LKStateSetValue").count(), 1);
    assert!(caml.contains(r#"<value type="real" value="0.75"/>"#));
}

// ==========================================================================
// Filename sanitization
// ==========================================================================

proptest! {
    #[test]
    fn prop_sanitize_is_idempotent(name in ".{0,40}") {
        let once = sanitize_filename(&name);
        prop_assert_eq!(sanitize_filename(&once), once.clone());
        prop_assert!(!once.contains(['/', '\\', ':', '*', '?', '"', '<', '>', '|']));
        prop_assert!(!once.is_empty());
    }

    #[test]
    fn prop_blank_names_become_untitled(name in "[ \t]{0,8}") {
        prop_assert_eq!(sanitize_filename(&name), "untitled");
    }
}
