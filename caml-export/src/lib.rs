//! # CAML Export
//!
//! Packages CAML projects into distributable archives.
//!
//! Two artifact kinds are supported:
//!
//! - **Directory bundle**: a zip of the project's `.ca` folder contents,
//!   one sub-folder per document.
//! - **Container**: a wallpaper container built by unpacking a template
//!   archive (gyro or plain) and dropping the project's documents into fixed
//!   folders inside it.
//!
//! Project files are read through the [`AssetStore`] trait; the packager
//! never writes to the store.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod bundle;
pub mod error;
pub mod packager;
pub mod store;
pub mod template;

pub use bundle::{ProjectFiles, ASSET_MANIFEST, INDEX_XML, MAIN_DOCUMENT};
pub use error::{ExportError, ExportResult};
pub use packager::{
    ArtifactData, ArtifactSink, ExportArtifact, ExportHandle, ExportPhase, ExportRequest,
    ExportTarget, Packager, PhaseTracker,
};
pub use store::{AssetEntry, AssetStore, DirAssetStore, MemoryAssetStore};
pub use template::{ExportConfig, TemplateVariant};
