//! # CAML CLI
//!
//! Turns a project JSON document into CAML markup, a zipped `.ca` directory
//! bundle or a wallpaper container.
//!
//! ## Usage
//!
//! ```bash
//! caml markup project.json --document floating --state Locked
//! caml bundle project.json -o Evening.zip
//! caml tendies project.json -o Evening.tendies --templates-dir ./templates
//! ```
//!
//! ## Project JSON
//!
//! An object keyed by document type (`background`, `floating`,
//! `wallpaper`), each value a serialized [`CaProjectBundle`]. The first
//! document's metadata names the project.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use caml_core::{
    resolve_tree, serialize_caml, CaProjectBundle, CamlError, DocumentType, OverrideMap,
    ProjectKind, ProjectMeta,
};
use caml_export::{
    ExportArtifact, ExportConfig, ExportRequest, ExportTarget, MemoryAssetStore, Packager,
    ProjectFiles, TemplateVariant,
};
use clap::{Parser, Subcommand};

/// Command-line arguments for `caml`.
#[derive(Debug, Clone, Parser)]
#[command(name = "caml")]
#[command(about = "Core Animation markup serializer and wallpaper packager")]
#[command(version)]
pub struct CliArgs {
    /// Directory holding gyro.zip and plain.zip container templates
    #[arg(long, env = "CAML_TEMPLATES_DIR", default_value = "templates", global = true)]
    pub templates_dir: PathBuf,

    /// What to produce
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print or write the CAML markup of one document
    Markup {
        /// Project JSON file
        project: PathBuf,
        /// Document to serialize (defaults to the first)
        #[arg(long, value_parser = parse_document)]
        document: Option<DocumentType>,
        /// Emit a static snapshot of this state instead of the state machine
        #[arg(long)]
        state: Option<String>,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Zip the project's .ca directory bundle
    Bundle {
        /// Project JSON file
        project: PathBuf,
        /// Output archive
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Build a wallpaper container from a template
    Tendies {
        /// Project JSON file
        project: PathBuf,
        /// Output archive
        #[arg(short, long)]
        output: PathBuf,
        /// Template variant (defaults to the project kind)
        #[arg(long, value_parser = parse_variant)]
        variant: Option<TemplateVariant>,
    },
}

fn parse_document(s: &str) -> Result<DocumentType, String> {
    match s.to_ascii_lowercase().as_str() {
        "background" => Ok(DocumentType::Background),
        "floating" => Ok(DocumentType::Floating),
        "wallpaper" => Ok(DocumentType::Wallpaper),
        other => Err(format!("unknown document type: {other}")),
    }
}

fn parse_variant(s: &str) -> Result<TemplateVariant, String> {
    match s.to_ascii_lowercase().as_str() {
        "gyro" => Ok(TemplateVariant::Gyro),
        "plain" => Ok(TemplateVariant::Plain),
        other => Err(format!("unknown template variant: {other}")),
    }
}

/// A project as read from disk: one bundle per document type.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectDocument {
    /// Documents in type order.
    pub documents: BTreeMap<DocumentType, CaProjectBundle>,
}

impl ProjectDocument {
    /// Decode a project.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON, on values matching none of their permitted
    /// shapes, and on projects with no documents.
    pub fn from_json(json: &str) -> Result<Self> {
        let documents: BTreeMap<DocumentType, CaProjectBundle> =
            serde_json::from_str(json).map_err(CamlError::from)?;
        if documents.is_empty() {
            bail!("project contains no documents");
        }
        Ok(Self { documents })
    }

    /// Read and decode a project file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or decoded.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("failed to decode {}", path.display()))
    }

    /// Metadata of the first document.
    ///
    /// # Errors
    ///
    /// Fails for an empty project.
    pub fn meta(&self) -> Result<&ProjectMeta> {
        self.documents
            .values()
            .next()
            .map(|bundle| &bundle.meta)
            .ok_or_else(|| anyhow!("project contains no documents"))
    }

    /// One document, or the first when `document` is `None`.
    ///
    /// # Errors
    ///
    /// Fails if the requested document is absent.
    pub fn document(&self, document: Option<DocumentType>) -> Result<&CaProjectBundle> {
        match document {
            Some(doc) => self
                .documents
                .get(&doc)
                .ok_or_else(|| anyhow!("project has no {} document", doc.folder_name())),
            None => self
                .documents
                .values()
                .next()
                .ok_or_else(|| anyhow!("project contains no documents")),
        }
    }
}

/// Serialize one document, optionally as a static snapshot of `state`.
///
/// # Errors
///
/// Fails if the document is absent or `state` is not declared.
pub fn render_markup(
    project: &ProjectDocument,
    document: Option<DocumentType>,
    state: Option<&str>,
) -> Result<String> {
    let bundle = project.document(document)?;
    let Some(state) = state else {
        return Ok(bundle.to_caml());
    };
    if !bundle.effective_state_names().iter().any(|s| s == state) {
        return Err(CamlError::UnknownState(state.to_string()).into());
    }
    let resolved = resolve_tree(&bundle.root, state, &bundle.overrides);
    Ok(serialize_caml::<&str>(
        &resolved,
        &bundle.meta,
        &[],
        &OverrideMap::new(),
        &[],
        &bundle.parallax_groups,
    ))
}

/// Template variant matching the project kind.
#[must_use]
pub const fn default_variant(kind: ProjectKind) -> TemplateVariant {
    match kind {
        ProjectKind::Gyro => TemplateVariant::Gyro,
        ProjectKind::Plain => TemplateVariant::Plain,
    }
}

/// Render the project into an in-memory store and export it to `output`.
///
/// # Errors
///
/// Fails with the packager's error if any export step fails.
pub async fn export_project(
    project: &ProjectDocument,
    target: ExportTarget,
    output: &Path,
    config: ExportConfig,
) -> Result<ExportArtifact> {
    let meta = project.meta()?;
    let store = MemoryAssetStore::new();
    ProjectFiles::render(&meta.name, &project.documents).seed_memory(&store, &meta.id);

    let packager = Packager::new(Arc::new(store), config);
    let request = ExportRequest::new(meta.id.clone(), meta.name.clone(), target).to_file(output);
    packager
        .export(request)
        .await
        .with_context(|| format!("export of {} failed", meta.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = r#"{
        "floating": {
            "meta": {"id": "p", "name": "Evening", "width": 390, "height": 844},
            "root": {"id": "root", "name": "Root", "kind": {"type": "basic"},
                     "children": [{"id": "clock", "name": "Clock", "kind": {"type": "basic"}}]},
            "overrides": {"Locked": [{"targetId": "clock", "keyPath": "opacity", "value": 0.5}]}
        },
        "background": {
            "meta": {"id": "p", "name": "Evening", "width": 390, "height": 844},
            "root": {"id": "root", "name": "Root", "kind": {"type": "basic"}}
        }
    }"#;

    #[test]
    fn test_cli_parses_subcommands() {
        let args = CliArgs::parse_from([
            "caml",
            "markup",
            "p.json",
            "--document",
            "Floating",
            "--state",
            "Locked",
        ]);
        match args.command {
            Command::Markup {
                document, state, ..
            } => {
                assert_eq!(document, Some(DocumentType::Floating));
                assert_eq!(state.as_deref(), Some("Locked"));
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let args = CliArgs::parse_from([
            "caml",
            "tendies",
            "p.json",
            "-o",
            "out.tendies",
            "--variant",
            "gyro",
            "--templates-dir",
            "/tmp/t",
        ]);
        assert_eq!(args.templates_dir, PathBuf::from("/tmp/t"));
        assert!(matches!(
            args.command,
            Command::Tendies {
                variant: Some(TemplateVariant::Gyro),
                ..
            }
        ));
    }

    #[test]
    fn test_project_document_order_and_meta() {
        let project = ProjectDocument::from_json(PROJECT).expect("decode");
        let kinds: Vec<DocumentType> = project.documents.keys().copied().collect();
        assert_eq!(kinds, vec![DocumentType::Background, DocumentType::Floating]);
        assert_eq!(project.meta().expect("meta").name, "Evening");
        assert!(project.document(Some(DocumentType::Wallpaper)).is_err());
    }

    #[test]
    fn test_empty_project_rejected() {
        assert!(ProjectDocument::from_json("{}").is_err());
    }

    #[test]
    fn test_render_markup_state_snapshot() {
        let project = ProjectDocument::from_json(PROJECT).expect("decode");
        let full = render_markup(&project, Some(DocumentType::Floating), None).expect("full");
        assert!(full.contains("<LKState name=\"Locked\">"));

        let locked = render_markup(&project, Some(DocumentType::Floating), Some("Locked"))
            .expect("snapshot");
        assert!(locked.contains(r#"id="clock" name="Clock" bounds="0 0 0 0" position="0 0" opacity="0.5""#));
        assert!(!locked.contains("<states>"));

        let err = render_markup(&project, None, Some("Nap")).expect_err("unknown state");
        assert!(err.to_string().contains("Nap"));
    }

    #[test]
    fn test_default_variant() {
        assert_eq!(default_variant(ProjectKind::Gyro), TemplateVariant::Gyro);
        assert_eq!(default_variant(ProjectKind::Plain), TemplateVariant::Plain);
    }
}
