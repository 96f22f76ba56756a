//! # CAML CLI
//!
//! Serializes project JSON to CAML and packages it for distribution.

use caml_cli::{default_variant, export_project, render_markup, CliArgs, Command, ProjectDocument};
use caml_export::{ExportConfig, ExportTarget};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured tracing with optional JSON format.
///
/// Set `RUST_LOG` to control log levels (default: info,caml_export=debug).
/// Set `RUST_LOG_FORMAT=json` for JSON output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,caml_export=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = CliArgs::parse();
    let config = ExportConfig::with_templates_dir(&args.templates_dir);

    match args.command {
        Command::Markup {
            project,
            document,
            state,
            output,
        } => {
            let project = ProjectDocument::load(&project)?;
            let caml = render_markup(&project, document, state.as_deref())?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, caml).await?;
                    tracing::info!("Wrote {}", path.display());
                }
                None => print!("{caml}"),
            }
        }
        Command::Bundle { project, output } => {
            let project = ProjectDocument::load(&project)?;
            let artifact =
                export_project(&project, ExportTarget::DirectoryBundle, &output, config).await?;
            tracing::info!(
                "Bundle written to {} ({} entries)",
                output.display(),
                artifact.entries.len()
            );
        }
        Command::Tendies {
            project,
            output,
            variant,
        } => {
            let project = ProjectDocument::load(&project)?;
            let variant = variant.unwrap_or(default_variant(project.meta()?.kind));
            tracing::info!(
                "Using {} template from {}",
                variant.as_str(),
                config.templates_dir.display()
            );
            let artifact =
                export_project(&project, ExportTarget::Container(variant), &output, config).await?;
            tracing::info!(
                "Container written to {} ({} entries)",
                output.display(),
                artifact.entries.len()
            );
        }
    }

    Ok(())
}
