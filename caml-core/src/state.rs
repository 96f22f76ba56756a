//! Device states, per-state overrides and effective-layer resolution.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::layer::Layer;
use crate::value::{KeyPath, OverrideValue};
use crate::{CamlError, CamlResult};

/// Name of the implicit state every layer tree starts in.
pub const BASE_STATE: &str = "Base State";

/// Wildcard state used on one side of every synthesized transition.
pub const WILDCARD_STATE: &str = "*";

/// A named device state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CaState {
    /// The base layer tree with no overrides applied.
    Base,
    /// Lock screen.
    Locked,
    /// Unlocking.
    Unlock,
    /// Display asleep.
    Sleep,
    /// Lock screen, light appearance.
    LockedLight,
    /// Lock screen, dark appearance.
    LockedDark,
    /// Unlocking, light appearance.
    UnlockLight,
    /// Unlocking, dark appearance.
    UnlockDark,
    /// Asleep, light appearance.
    SleepLight,
    /// Asleep, dark appearance.
    SleepDark,
}

impl CaState {
    /// States every project declares.
    pub const DEVICE: [Self; 3] = [Self::Locked, Self::Unlock, Self::Sleep];

    /// The state name as it appears in documents and markup.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Base => BASE_STATE,
            Self::Locked => "Locked",
            Self::Unlock => "Unlock",
            Self::Sleep => "Sleep",
            Self::LockedLight => "Locked Light",
            Self::LockedDark => "Locked Dark",
            Self::UnlockLight => "Unlock Light",
            Self::UnlockDark => "Unlock Dark",
            Self::SleepLight => "Sleep Light",
            Self::SleepDark => "Sleep Dark",
        }
    }

    /// The declared state list of a project, base state first.
    #[must_use]
    pub fn all(appearance_aware: bool) -> Vec<Self> {
        let mut states = vec![Self::Base, Self::Locked, Self::Unlock, Self::Sleep];
        if appearance_aware {
            states.extend([
                Self::LockedLight,
                Self::LockedDark,
                Self::UnlockLight,
                Self::UnlockDark,
                Self::SleepLight,
                Self::SleepDark,
            ]);
        }
        states
    }

    /// The light or dark variant of a device state.
    ///
    /// Returns `None` for the base state and for states that are already
    /// variants.
    #[must_use]
    pub const fn variant(self, appearance: Appearance) -> Option<Self> {
        match (self, appearance) {
            (Self::Locked, Appearance::Light) => Some(Self::LockedLight),
            (Self::Locked, Appearance::Dark) => Some(Self::LockedDark),
            (Self::Unlock, Appearance::Light) => Some(Self::UnlockLight),
            (Self::Unlock, Appearance::Dark) => Some(Self::UnlockDark),
            (Self::Sleep, Appearance::Light) => Some(Self::SleepLight),
            (Self::Sleep, Appearance::Dark) => Some(Self::SleepDark),
            _ => None,
        }
    }
}

impl fmt::Display for CaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaState {
    type Err = CamlError;

    fn from_str(s: &str) -> CamlResult<Self> {
        Self::all(true)
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| CamlError::UnknownState(s.to_string()))
    }
}

/// Light or dark system appearance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Appearance {
    /// Light mode.
    Light,
    /// Dark mode.
    Dark,
}

impl Appearance {
    /// The state-name suffix, including its leading space.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Light => " Light",
            Self::Dark => " Dark",
        }
    }
}

/// Strip a trailing ` Light` or ` Dark` from a state name.
#[must_use]
pub fn base_state_name(name: &str) -> &str {
    name.strip_suffix(Appearance::Light.suffix())
        .or_else(|| name.strip_suffix(Appearance::Dark.suffix()))
        .unwrap_or(name)
}

/// The appearance encoded in a state name's suffix, if any.
#[must_use]
pub fn appearance_of(name: &str) -> Option<Appearance> {
    if name.ends_with(Appearance::Light.suffix()) {
        Some(Appearance::Light)
    } else if name.ends_with(Appearance::Dark.suffix()) {
        Some(Appearance::Dark)
    } else {
        None
    }
}

/// Whether a state name carries a light/dark suffix.
#[must_use]
pub fn is_appearance_variant(name: &str) -> bool {
    appearance_of(name).is_some()
}

/// Build the light/dark variant name of a base state name.
#[must_use]
pub fn appearance_variant_name(base: &str, appearance: Appearance) -> String {
    format!("{base}{}", appearance.suffix())
}

/// A single attribute replacement applied to one layer under one state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateOverride {
    /// Layer the override applies to.
    pub target_id: String,
    /// Attribute key path, as authored.
    pub key_path: String,
    /// Replacement value.
    pub value: OverrideValue,
}

impl StateOverride {
    /// Create an override.
    #[must_use]
    pub fn new(
        target_id: impl Into<String>,
        key_path: impl Into<String>,
        value: impl Into<OverrideValue>,
    ) -> Self {
        Self {
            target_id: target_id.into(),
            key_path: key_path.into(),
            value: value.into(),
        }
    }

    /// The parsed key path, if it is one of the known names.
    #[must_use]
    pub fn parsed_key_path(&self) -> Option<KeyPath> {
        KeyPath::parse(&self.key_path)
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.target_id == other.target_id && self.key_path.eq_ignore_ascii_case(&other.key_path)
    }
}

/// Overrides grouped by state name.
///
/// Keys are whatever state names the editor supplied; names outside
/// [`CaState`] are carried along and simply never match a requested state.
/// Decoding goes through [`OverrideMap::set`], so a repeated
/// `(targetId, keyPath)` within a state keeps only its last value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct OverrideMap(BTreeMap<String, Vec<StateOverride>>);

impl<'de> Deserialize<'de> for OverrideMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        BTreeMap::<String, Vec<StateOverride>>::deserialize(deserializer).map(Self::from_iter)
    }
}

impl OverrideMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides declared for `state`, empty if none.
    #[must_use]
    pub fn get(&self, state: &str) -> &[StateOverride] {
        self.0.get(state).map_or(&[], Vec::as_slice)
    }

    /// Insert or replace the override with the same `(target_id, key_path)`.
    pub fn set(&mut self, state: impl Into<String>, entry: StateOverride) {
        let list = self.0.entry(state.into()).or_default();
        if let Some(existing) = list.iter_mut().find(|o| o.same_identity(&entry)) {
            *existing = entry;
        } else {
            list.push(entry);
        }
    }

    /// Whether no state has any overrides.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }
}

impl FromIterator<(String, Vec<StateOverride>)> for OverrideMap {
    fn from_iter<I: IntoIterator<Item = (String, Vec<StateOverride>)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (state, list) in iter {
            for entry in list {
                map.set(state.clone(), entry);
            }
        }
        map
    }
}

/// The effective value of one layer (children untouched) under `state`.
///
/// Overrides whose key path is unknown, not state-overridable, or whose value
/// is not numeric are skipped. The layer kind never changes.
#[must_use]
pub fn resolve_layer(layer: &Layer, state: &str, overrides: &OverrideMap) -> Layer {
    let mut effective = layer.clone();
    if state == BASE_STATE {
        return effective;
    }
    for entry in overrides
        .get(state)
        .iter()
        .filter(|o| o.target_id == layer.id.as_str())
    {
        apply_override(&mut effective, entry);
    }
    effective
}

/// The effective layer tree under `state`.
#[must_use]
pub fn resolve_tree(root: &Layer, state: &str, overrides: &OverrideMap) -> Layer {
    let mut effective = resolve_layer(root, state, overrides);
    effective.children = root
        .children
        .iter()
        .map(|child| resolve_tree(child, state, overrides))
        .collect();
    effective
}

fn apply_override(layer: &mut Layer, entry: &StateOverride) {
    let Some(key_path) = entry.parsed_key_path() else {
        tracing::trace!(
            "Skipping override on unknown key path {} for {}",
            entry.key_path,
            entry.target_id
        );
        return;
    };
    if !key_path.is_state_overridable() {
        tracing::trace!("Key path {key_path} is not state-overridable");
        return;
    }
    let Some(value) = entry.value.as_f64() else {
        tracing::trace!(
            "Skipping non-numeric override on {key_path} for {}",
            entry.target_id
        );
        return;
    };
    if let Some(field) = scalar_field(layer, key_path) {
        *field = value;
    }
}

/// The layer field a scalar key path writes to.
fn scalar_field(layer: &mut Layer, key_path: KeyPath) -> Option<&mut f64> {
    Some(match key_path {
        KeyPath::PositionX => &mut layer.position.x,
        KeyPath::PositionY => &mut layer.position.y,
        KeyPath::BoundsWidth => &mut layer.size.width,
        KeyPath::BoundsHeight => &mut layer.size.height,
        KeyPath::RotationX => &mut layer.rotation_x,
        KeyPath::RotationY => &mut layer.rotation_y,
        KeyPath::RotationZ => &mut layer.rotation,
        KeyPath::Opacity => &mut layer.opacity,
        KeyPath::CornerRadius => &mut layer.corner_radius,
        KeyPath::ZPosition => &mut layer.z_position,
        KeyPath::Position
        | KeyPath::Bounds
        | KeyPath::TranslationX
        | KeyPath::TranslationY => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Size, Vec2};
    use crate::layer::LayerKind;

    fn base() -> Layer {
        Layer::new("root", "Root", LayerKind::Basic)
            .with_frame(Vec2::new(10.0, 20.0), Size::new(100.0, 50.0))
            .with_child(Layer::new("child", "Child", LayerKind::Basic))
    }

    #[test]
    fn test_state_names_roundtrip() {
        for state in CaState::all(true) {
            assert_eq!(state.as_str().parse::<CaState>().expect("parse"), state);
        }
        assert!("locked".parse::<CaState>().is_err());
        assert_eq!(CaState::all(false).len(), 4);
        assert_eq!(CaState::all(true).len(), 10);
    }

    #[test]
    fn test_naming_helpers() {
        assert_eq!(base_state_name("Locked Light"), "Locked");
        assert_eq!(base_state_name("Sleep Dark"), "Sleep");
        assert_eq!(base_state_name("Unlock"), "Unlock");
        assert_eq!(base_state_name("Locked light"), "Locked light");
        assert_eq!(base_state_name("LockedDark"), "LockedDark");

        assert!(is_appearance_variant("Unlock Dark"));
        assert!(!is_appearance_variant("Unlock  dark"));
        assert_eq!(appearance_of("Sleep Light"), Some(Appearance::Light));
        assert_eq!(appearance_of("Sleep"), None);

        assert_eq!(
            appearance_variant_name("Locked", Appearance::Dark),
            "Locked Dark"
        );
        assert_eq!(
            CaState::Locked.variant(Appearance::Light),
            Some(CaState::LockedLight)
        );
        assert_eq!(CaState::Base.variant(Appearance::Light), None);
    }

    #[test]
    fn test_override_map_identity() {
        let mut map = OverrideMap::new();
        map.set("Locked", StateOverride::new("a", "opacity", 0.5));
        map.set("Locked", StateOverride::new("a", "Opacity", 0.25));
        map.set("Locked", StateOverride::new("b", "opacity", 0.1));
        assert_eq!(map.get("Locked").len(), 2);
        assert_eq!(map.get("Locked")[0].value, OverrideValue::Float(0.25));
        assert!(map.get("Sleep").is_empty());
    }

    #[test]
    fn test_override_map_decode_keeps_last_duplicate() {
        let json = r#"{"Locked": [
            {"targetId": "r", "keyPath": "opacity", "value": 0.5},
            {"targetId": "s", "keyPath": "opacity", "value": 1},
            {"targetId": "r", "keyPath": "OPACITY", "value": 0.25}
        ]}"#;
        let map: OverrideMap = serde_json::from_str(json).expect("decode");
        let locked = map.get("Locked");
        assert_eq!(locked.len(), 2);
        assert_eq!(locked[0].target_id, "r");
        assert_eq!(locked[0].value, OverrideValue::Float(0.25));
        assert_eq!(locked[1].target_id, "s");
    }

    #[test]
    fn test_resolve_opacity_override() {
        let mut map = OverrideMap::new();
        map.set("Locked", StateOverride::new("root", "opacity", 0.5));

        let base = base();
        let effective = resolve_layer(&base, "Locked", &map);
        assert!((effective.opacity - 0.5).abs() < f64::EPSILON);

        let mut expected = base.clone();
        expected.opacity = 0.5;
        assert_eq!(effective, expected);
    }

    #[test]
    fn test_resolve_base_and_unknown_state() {
        let mut map = OverrideMap::new();
        map.set(BASE_STATE, StateOverride::new("root", "opacity", 0.0));
        map.set("Locked", StateOverride::new("root", "opacity", 0.0));
        let base = base();
        assert_eq!(resolve_layer(&base, BASE_STATE, &map), base);
        assert_eq!(resolve_layer(&base, "Party Mode", &map), base);
    }

    #[test]
    fn test_resolve_skips_mismatched_values() {
        let mut map = OverrideMap::new();
        map.set("Sleep", StateOverride::new("root", "opacity", "dim"));
        map.set("Sleep", StateOverride::new("root", "backgroundColor", 3_i64));
        map.set("Sleep", StateOverride::new("root", "position", 3_i64));
        map.set("Sleep", StateOverride::new("root", "transform.translation.x", 9_i64));
        map.set("Sleep", StateOverride::new("root", "POSITION.X", 42_i64));
        map.set("Sleep", StateOverride::new("root", "bounds.size.width", 7.5));

        let effective = resolve_layer(&base(), "Sleep", &map);
        assert!((effective.opacity - 1.0).abs() < f64::EPSILON);
        assert!((effective.position.x - 42.0).abs() < f64::EPSILON);
        assert!((effective.position.y - 20.0).abs() < f64::EPSILON);
        assert!((effective.size.width - 7.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_resolve_tree_reaches_children() {
        let mut map = OverrideMap::new();
        map.set("Unlock", StateOverride::new("child", "zPosition", 3_i64));
        map.set("Unlock", StateOverride::new("child", "transform.rotation.z", 45_i64));

        let effective = resolve_tree(&base(), "Unlock", &map);
        let child = effective.find("child").expect("child");
        assert!((child.z_position - 3.0).abs() < f64::EPSILON);
        assert!((child.rotation - 45.0).abs() < f64::EPSILON);
        assert_eq!(child.kind, LayerKind::Basic);
    }
}
