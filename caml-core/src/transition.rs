//! Bidirectional state transitions synthesized from state overrides.

use serde::{Deserialize, Serialize};

use crate::state::{OverrideMap, BASE_STATE, WILDCARD_STATE};
use crate::value::KeyPath;

/// Parameters of the spring animation driving a transition element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpringAnimation {
    /// Damping coefficient.
    pub damping: f64,
    /// Mass of the simulated object.
    pub mass: f64,
    /// Spring stiffness.
    pub stiffness: f64,
    /// Initial velocity.
    pub velocity: f64,
    /// Duration in seconds.
    pub duration: f64,
    /// Fill mode name.
    pub fill_mode: FillMode,
}

impl SpringAnimation {
    /// The spring every synthesized transition uses.
    pub const DEFAULT: Self = Self {
        damping: 50.0,
        mass: 2.0,
        stiffness: 300.0,
        velocity: 0.0,
        duration: 0.8,
        fill_mode: FillMode::Backwards,
    };
}

impl Default for SpringAnimation {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// How an animation applies outside its active interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillMode {
    /// Hold the first value before the animation starts.
    #[default]
    Backwards,
    /// Hold the final value after the animation ends.
    Forwards,
    /// Both.
    Both,
    /// Neither.
    Removed,
}

impl FillMode {
    /// The CAML spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Backwards => "backwards",
            Self::Forwards => "forwards",
            Self::Both => "both",
            Self::Removed => "removed",
        }
    }
}

/// One animated attribute of a transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionElement {
    /// Layer being animated.
    pub target_id: String,
    /// Animated attribute.
    pub key_path: KeyPath,
    /// Spring parameters.
    pub animation: SpringAnimation,
}

/// An animated change between two states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTransition {
    /// Source state name (`*` for any).
    pub from_state: String,
    /// Destination state name (`*` for any).
    pub to_state: String,
    /// Animated attributes.
    pub elements: Vec<TransitionElement>,
}

/// Synthesize the transitions for every non-base state in `state_names`.
///
/// Each remaining state yields `*` → state followed by state → `*`, both
/// carrying the same elements: one spring per override whose key path is in
/// [`KeyPath::STATE_TRANSITIONABLE`]. Order follows `state_names`.
#[must_use]
pub fn build_transitions<S: AsRef<str>>(
    state_names: &[S],
    overrides: &OverrideMap,
) -> Vec<StateTransition> {
    let mut transitions = Vec::new();
    for state in state_names.iter().map(AsRef::as_ref) {
        if state.is_empty() || state == BASE_STATE {
            continue;
        }
        let elements: Vec<TransitionElement> = overrides
            .get(state)
            .iter()
            .filter_map(|o| {
                let key_path = o.parsed_key_path()?;
                key_path
                    .is_state_transitionable()
                    .then(|| TransitionElement {
                        target_id: o.target_id.clone(),
                        key_path,
                        animation: SpringAnimation::DEFAULT,
                    })
            })
            .collect();

        transitions.push(StateTransition {
            from_state: WILDCARD_STATE.to_string(),
            to_state: state.to_string(),
            elements: elements.clone(),
        });
        transitions.push(StateTransition {
            from_state: state.to_string(),
            to_state: WILDCARD_STATE.to_string(),
            elements,
        });
    }
    tracing::debug!("Built {} state transitions", transitions.len());
    transitions
}
