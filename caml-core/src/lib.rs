//! # CAML Core
//!
//! Scene model and serializer for Core Animation markup (CAML) documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 caml-core                   │
//! ├─────────────────────────────────────────────┤
//! │  Value Primitives │  Layer Model            │
//! │  - Vec2 / Size    │  - Shared attributes    │
//! │  - Color          │  - Closed LayerKind     │
//! │  - KeyPath        │  - Keyframe animations  │
//! ├─────────────────────────────────────────────┤
//! │  State Engine     │  Markup Serializer      │
//! │  - Overrides      │  - Layer tree           │
//! │  - Resolution     │  - States/transitions   │
//! │  - Transitions    │  - Parallax groups      │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Everything here is synchronous and side-effect free; packaging lives in
//! `caml-export`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::float_cmp)]

pub mod error;
pub mod geometry;
pub mod layer;
pub mod markup;
pub mod project;
pub mod state;
pub mod transition;
pub mod value;

pub use error::{CamlError, CamlResult};
pub use geometry::{Color, Size, Vec2};
pub use layer::{
    BlendMode, CalculationMode, EmitterCell, GradientStop, GradientType, Layer, LayerAnimation,
    LayerId, LayerKind, TextAlignment,
};
pub use markup::{
    animation_value_markup, format_number, parse_animation_value, serialize_caml,
};
pub use project::{
    sanitize_filename, CaProjectBundle, DocumentType, ParallaxAxis, ParallaxGroup, ProjectKind,
    ProjectMeta,
};
pub use state::{
    appearance_of, appearance_variant_name, base_state_name, is_appearance_variant,
    resolve_layer, resolve_tree, Appearance, CaState, OverrideMap, StateOverride, BASE_STATE,
    WILDCARD_STATE,
};
pub use transition::{
    build_transitions, FillMode, SpringAnimation, StateTransition, TransitionElement,
};
pub use value::{AnimationValue, KeyPath, OverrideValue};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
