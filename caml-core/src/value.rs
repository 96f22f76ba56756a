//! Key paths and the union values that flow through animations and overrides.
//!
//! Both [`AnimationValue`] and [`OverrideValue`] are decoded by trying each
//! variant in a fixed priority order and keeping the first match. The order
//! resolves real ambiguity (integral floats vs integers, points vs sizes), so
//! it must not change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::geometry::{Size, Vec2};
use crate::error::{ANIMATION_VALUE, OVERRIDE_VALUE};
use crate::{CamlError, CamlResult};

/// An animatable or overridable layer attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyPath {
    /// `position`
    Position,
    /// `position.x`
    PositionX,
    /// `position.y`
    PositionY,
    /// `transform.translation.x`
    TranslationX,
    /// `transform.translation.y`
    TranslationY,
    /// `transform.rotation.x`
    RotationX,
    /// `transform.rotation.y`
    RotationY,
    /// `transform.rotation.z`
    RotationZ,
    /// `opacity`
    Opacity,
    /// `bounds`
    Bounds,
    /// `bounds.size.width`
    BoundsWidth,
    /// `bounds.size.height`
    BoundsHeight,
    /// `cornerRadius`
    CornerRadius,
    /// `zPosition`
    ZPosition,
}

impl KeyPath {
    /// Every key path, in declaration order.
    pub const ALL: [Self; 14] = [
        Self::Position,
        Self::PositionX,
        Self::PositionY,
        Self::TranslationX,
        Self::TranslationY,
        Self::RotationX,
        Self::RotationY,
        Self::RotationZ,
        Self::Opacity,
        Self::Bounds,
        Self::BoundsWidth,
        Self::BoundsHeight,
        Self::CornerRadius,
        Self::ZPosition,
    ];

    /// Key paths a state override may target.
    pub const STATE_OVERRIDABLE: [Self; 10] = [
        Self::Opacity,
        Self::CornerRadius,
        Self::ZPosition,
        Self::PositionX,
        Self::PositionY,
        Self::BoundsWidth,
        Self::BoundsHeight,
        Self::RotationX,
        Self::RotationY,
        Self::RotationZ,
    ];

    /// Key paths animated by synthesized state transitions.
    ///
    /// Deliberately narrower than [`Self::STATE_OVERRIDABLE`].
    pub const STATE_TRANSITIONABLE: [Self; 3] =
        [Self::Opacity, Self::CornerRadius, Self::ZPosition];

    /// The CAML spelling of this key path.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::PositionX => "position.x",
            Self::PositionY => "position.y",
            Self::TranslationX => "transform.translation.x",
            Self::TranslationY => "transform.translation.y",
            Self::RotationX => "transform.rotation.x",
            Self::RotationY => "transform.rotation.y",
            Self::RotationZ => "transform.rotation.z",
            Self::Opacity => "opacity",
            Self::Bounds => "bounds",
            Self::BoundsWidth => "bounds.size.width",
            Self::BoundsHeight => "bounds.size.height",
            Self::CornerRadius => "cornerRadius",
            Self::ZPosition => "zPosition",
        }
    }

    /// Case-insensitive lookup; `None` for names outside the closed set.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(name.trim()))
    }

    /// Whether a state override on this key path is honoured.
    #[must_use]
    pub fn is_state_overridable(self) -> bool {
        Self::STATE_OVERRIDABLE.contains(&self)
    }

    /// Whether a state override on this key path produces a transition.
    #[must_use]
    pub fn is_state_transitionable(self) -> bool {
        Self::STATE_TRANSITIONABLE.contains(&self)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyPath {
    type Err = CamlError;

    fn from_str(s: &str) -> CamlResult<Self> {
        Self::parse(s).ok_or_else(|| CamlError::UnknownKeyPath(s.to_string()))
    }
}

impl Serialize for KeyPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for KeyPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One keyframe value of a layer animation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnimationValue {
    /// A scalar (opacity, rotation, a single coordinate, ...).
    Number(f64),
    /// A point (`position`).
    Point(Vec2),
    /// A size (`bounds`).
    Size(Size),
}

impl AnimationValue {
    /// Decode from an untyped JSON value.
    ///
    /// Tries a bare number, then an `{x, y}` object, then a
    /// `{width, height}` object.
    ///
    /// # Errors
    ///
    /// Returns [`CamlError::TypeMismatch`] if no shape matches.
    pub fn from_json(value: &Value) -> CamlResult<Self> {
        if let Some(n) = value.as_f64() {
            return Ok(Self::Number(n));
        }
        if let Some(obj) = value.as_object() {
            let field = |name: &str| obj.get(name).and_then(Value::as_f64);
            if let (Some(x), Some(y)) = (field("x"), field("y")) {
                return Ok(Self::Point(Vec2::new(x, y)));
            }
            if let (Some(w), Some(h)) = (field("width"), field("height")) {
                return Ok(Self::Size(Size::new(w, h)));
            }
        }
        Err(CamlError::mismatch(ANIMATION_VALUE, value))
    }
}

impl Serialize for AnimationValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::Point(p) => p.serialize(serializer),
            Self::Size(s) => s.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for AnimationValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}

/// The payload of a state override.
#[derive(Debug, Clone, PartialEq)]
pub enum OverrideValue {
    /// An integral number.
    Integer(i64),
    /// A fractional number.
    Float(f64),
    /// A string (e.g. a text layer's content).
    String(String),
}

impl OverrideValue {
    /// Decode from an untyped JSON value.
    ///
    /// Integers win over floats, including floats with no fractional part,
    /// so an integral source survives an encoder that widened it.
    ///
    /// # Errors
    ///
    /// Returns [`CamlError::TypeMismatch`] for booleans, nulls, arrays and
    /// objects.
    pub fn from_json(value: &Value) -> CamlResult<Self> {
        if let Some(i) = value.as_i64() {
            return Ok(Self::Integer(i));
        }
        if let Some(f) = value.as_f64() {
            if let Some(i) = integral(f) {
                return Ok(Self::Integer(i));
            }
            return Ok(Self::Float(f));
        }
        if let Some(s) = value.as_str() {
            return Ok(Self::String(s.to_string()));
        }
        Err(CamlError::mismatch(OVERRIDE_VALUE, value))
    }

    /// Numeric view; `None` for strings.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::String(_) => None,
        }
    }

    /// The CAML `type` attribute for this value.
    #[must_use]
    pub const fn caml_type(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Float(_) => "real",
            Self::String(_) => "string",
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn integral(f: f64) -> Option<i64> {
    // 2^63 is exactly representable; anything at or above it overflows i64.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.is_finite() && f.fract() == 0.0 && f >= -LIMIT && f < LIMIT {
        Some(f as i64)
    } else {
        None
    }
}

impl From<i64> for OverrideValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for OverrideValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for OverrideValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl Serialize for OverrideValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Integer(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for OverrideValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_path_parse_case_insensitive() {
        assert_eq!(KeyPath::parse("OPACITY"), Some(KeyPath::Opacity));
        assert_eq!(KeyPath::parse("cornerradius"), Some(KeyPath::CornerRadius));
        assert_eq!(
            KeyPath::parse("transform.rotation.z"),
            Some(KeyPath::RotationZ)
        );
        assert_eq!(KeyPath::parse("backgroundColor"), None);
    }

    #[test]
    fn test_transitionable_subset_of_overridable() {
        for k in KeyPath::STATE_TRANSITIONABLE {
            assert!(k.is_state_overridable(), "{k} should be overridable");
        }
        assert!(KeyPath::PositionX.is_state_overridable());
        assert!(!KeyPath::PositionX.is_state_transitionable());
    }

    #[test]
    fn test_animation_value_priority() {
        assert_eq!(
            AnimationValue::from_json(&json!(3)).expect("number"),
            AnimationValue::Number(3.0)
        );
        assert_eq!(
            AnimationValue::from_json(&json!({"x": 1, "y": 2})).expect("point"),
            AnimationValue::Point(Vec2::new(1.0, 2.0))
        );
        assert_eq!(
            AnimationValue::from_json(&json!({"width": 4, "height": 5})).expect("size"),
            AnimationValue::Size(Size::new(4.0, 5.0))
        );
    }

    #[test]
    fn test_animation_value_mismatch() {
        let err = AnimationValue::from_json(&json!({"w": 1, "h": 2})).unwrap_err();
        assert!(matches!(err, CamlError::TypeMismatch { .. }));
        let err = AnimationValue::from_json(&json!("12")).unwrap_err();
        assert!(matches!(err, CamlError::TypeMismatch { .. }));
    }

    #[test]
    fn test_override_value_integer_wins() {
        assert_eq!(
            OverrideValue::from_json(&json!(2)).expect("int"),
            OverrideValue::Integer(2)
        );
        assert_eq!(
            OverrideValue::from_json(&json!(2.0)).expect("integral float"),
            OverrideValue::Integer(2)
        );
        assert_eq!(
            OverrideValue::from_json(&json!(0.5)).expect("float"),
            OverrideValue::Float(0.5)
        );
        assert_eq!(
            OverrideValue::from_json(&json!("hi")).expect("string"),
            OverrideValue::String("hi".into())
        );
        assert!(OverrideValue::from_json(&json!(true)).is_err());
        assert!(OverrideValue::from_json(&json!(null)).is_err());
    }

    #[test]
    fn test_override_value_serde() {
        let v: OverrideValue = serde_json::from_str("1.0").expect("decode");
        assert_eq!(v, OverrideValue::Integer(1));
        let v: Result<OverrideValue, _> = serde_json::from_str("[1]");
        assert!(v.is_err());
    }
}
