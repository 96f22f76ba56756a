//! The export packager.
//!
//! An export runs as one asynchronous task that walks a small state machine:
//!
//! ```text
//! Idle -> Preparing -> CollectingFiles   -> Archiving -> Done
//!                   \-> InjectingTemplate -/
//! (any non-terminal phase) -> Failed(reason)
//! ```
//!
//! All work happens in a scratch directory that is removed when the export
//! ends. The artifact is archived into a temporary sibling of the
//! destination and renamed into place only after archiving succeeds, so a
//! failed export never leaves a file at the destination.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use caml_core::sanitize_filename;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::archive::{extract_archive, write_archive};
use crate::error::{ExportError, ExportResult};
use crate::store::{safe_relative, AssetEntry, AssetStore};
use crate::template::{ExportConfig, TemplateVariant};

/// Phase of a running export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportPhase {
    /// Not started.
    Idle,
    /// Listing project files and creating the scratch directory.
    Preparing,
    /// Re-parenting project files for a directory bundle.
    CollectingFiles,
    /// Unpacking a container template and injecting project files.
    InjectingTemplate,
    /// Writing the final archive.
    Archiving,
    /// The artifact is in place.
    Done,
    /// The export aborted.
    Failed(String),
}

impl ExportPhase {
    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    /// Whether moving from `self` to `next` is legal.
    #[must_use]
    pub const fn can_transition_to(&self, next: &Self) -> bool {
        match (self, next) {
            (_, Self::Failed(_)) => !self.is_terminal(),
            (Self::Idle, Self::Preparing)
            | (Self::Preparing, Self::CollectingFiles | Self::InjectingTemplate)
            | (Self::CollectingFiles | Self::InjectingTemplate, Self::Archiving)
            | (Self::Archiving, Self::Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ExportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Preparing => f.write_str("preparing"),
            Self::CollectingFiles => f.write_str("collecting files"),
            Self::InjectingTemplate => f.write_str("injecting template"),
            Self::Archiving => f.write_str("archiving"),
            Self::Done => f.write_str("done"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Publishes phase changes of one export.
#[derive(Debug)]
pub struct PhaseTracker {
    tx: watch::Sender<ExportPhase>,
    history: StdMutex<Vec<ExportPhase>>,
}

impl PhaseTracker {
    /// A tracker in [`ExportPhase::Idle`] plus a receiver observing it.
    #[must_use]
    pub fn new() -> (Self, watch::Receiver<ExportPhase>) {
        let (tx, rx) = watch::channel(ExportPhase::Idle);
        let tracker = Self {
            tx,
            history: StdMutex::new(vec![ExportPhase::Idle]),
        };
        (tracker, rx)
    }

    /// The current phase.
    #[must_use]
    pub fn current(&self) -> ExportPhase {
        self.tx.borrow().clone()
    }

    /// Every phase entered so far, starting with `Idle`.
    #[must_use]
    pub fn history(&self) -> Vec<ExportPhase> {
        self.history
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::InvalidPhase`] if the transition is illegal.
    pub fn advance(&self, next: ExportPhase) -> ExportResult<()> {
        let from = self.current();
        if !from.can_transition_to(&next) {
            return Err(ExportError::InvalidPhase { from, to: next });
        }
        tracing::debug!("Export phase: {} -> {}", from, next);
        self.history
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(next.clone());
        self.tx.send_replace(next);
        Ok(())
    }

    /// Enter [`ExportPhase::Failed`] unless already terminal.
    pub fn fail(&self, reason: impl Into<String>) {
        if let Err(e) = self.advance(ExportPhase::Failed(reason.into())) {
            tracing::warn!("Ignoring failure report: {}", e);
        }
    }
}

/// What an export produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportTarget {
    /// Zip of the project's `.ca` folder contents.
    DirectoryBundle,
    /// Wallpaper container built from a template.
    Container(TemplateVariant),
}

/// Where the artifact goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSink {
    /// Write to this path, replacing any existing file.
    File(PathBuf),
    /// Return the bytes.
    Memory,
}

/// One export request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    /// Asset store key of the project.
    pub project_id: String,
    /// Project name; its sanitized form names the `.ca` root folder.
    pub project_name: String,
    /// Artifact kind.
    pub target: ExportTarget,
    /// Artifact destination.
    pub sink: ArtifactSink,
}

impl ExportRequest {
    /// An in-memory export of `target`.
    #[must_use]
    pub fn new(
        project_id: impl Into<String>,
        project_name: impl Into<String>,
        target: ExportTarget,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            project_name: project_name.into(),
            target,
            sink: ArtifactSink::Memory,
        }
    }

    /// Write the artifact to `path` instead of returning it.
    #[must_use]
    pub fn to_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sink = ArtifactSink::File(path.into());
        self
    }

    /// Store prefix holding the project's files, e.g. `Evening.ca/`.
    #[must_use]
    pub fn root_prefix(&self) -> String {
        format!("{}.ca/", sanitize_filename(&self.project_name))
    }
}

/// Artifact payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactData {
    /// Written to disk.
    File(PathBuf),
    /// Held in memory.
    Memory(Vec<u8>),
}

/// A finished export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    /// What was produced.
    pub target: ExportTarget,
    /// Archive entry names in archive order.
    pub entries: Vec<String>,
    /// The archive.
    pub data: ArtifactData,
}

/// A spawned export.
#[derive(Debug)]
pub struct ExportHandle {
    /// Observes phase changes.
    pub phase: watch::Receiver<ExportPhase>,
    /// Resolves to the export result.
    pub task: JoinHandle<ExportResult<ExportArtifact>>,
}

/// Packages projects from an [`AssetStore`].
///
/// Exports of different projects run concurrently; exports of the same
/// project wait for each other.
#[derive(Clone)]
pub struct Packager {
    store: Arc<dyn AssetStore>,
    config: ExportConfig,
    locks: Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl fmt::Debug for Packager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Packager {
    /// Create a packager.
    #[must_use]
    pub fn new(store: Arc<dyn AssetStore>, config: ExportConfig) -> Self {
        Self {
            store,
            config,
            locks: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// Template configuration.
    #[must_use]
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Run an export to completion.
    ///
    /// # Errors
    ///
    /// Returns the first failure; see [`ExportError`].
    pub async fn export(&self, request: ExportRequest) -> ExportResult<ExportArtifact> {
        let (tracker, _rx) = PhaseTracker::new();
        self.export_tracked(request, &tracker).await
    }

    /// Run an export, reporting phases through `tracker`.
    ///
    /// # Errors
    ///
    /// Returns the first failure; `tracker` ends in [`ExportPhase::Failed`].
    pub async fn export_tracked(
        &self,
        request: ExportRequest,
        tracker: &PhaseTracker,
    ) -> ExportResult<ExportArtifact> {
        let lock = self.project_lock(&request.project_id);
        let result = {
            let _guard = lock.lock().await;
            self.run(&request, tracker).await
        };
        drop(lock);
        self.release_lock(&request.project_id);

        match &result {
            Ok(artifact) => tracing::info!(
                "Exported {} ({} entries)",
                request.project_id,
                artifact.entries.len()
            ),
            Err(e) => {
                tracing::warn!("Export of {} failed: {}", request.project_id, e);
                tracker.fail(e.to_string());
            }
        }
        result
    }

    /// Start an export on the runtime and return immediately.
    #[must_use]
    pub fn spawn(&self, request: ExportRequest) -> ExportHandle {
        let (tracker, phase) = PhaseTracker::new();
        let packager = self.clone();
        let task = tokio::spawn(async move { packager.export_tracked(request, &tracker).await });
        ExportHandle { phase, task }
    }

    fn project_lock(&self, project_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(locks.entry(project_id.to_string()).or_default())
    }

    /// Forget the project's lock once no export holds or awaits it.
    fn release_lock(&self, project_id: &str) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if locks
            .get(project_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(project_id);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    async fn run(
        &self,
        request: &ExportRequest,
        tracker: &PhaseTracker,
    ) -> ExportResult<ExportArtifact> {
        tracker.advance(ExportPhase::Preparing)?;
        let root_prefix = request.root_prefix();
        let files = self
            .store
            .list_files(&request.project_id, &root_prefix)
            .await?;
        if files.is_empty() {
            return Err(ExportError::ProjectNotFound(request.project_id.clone()));
        }
        let scratch = tempfile::tempdir()?;
        tracing::debug!(
            "Exporting {} files of {} via {}",
            files.len(),
            request.project_id,
            scratch.path().display()
        );

        let work = match request.target {
            ExportTarget::DirectoryBundle => {
                tracker.advance(ExportPhase::CollectingFiles)?;
                let work = scratch.path().join(root_prefix.trim_end_matches('/'));
                tokio::fs::create_dir_all(&work).await?;
                for entry in &files {
                    let rel = strip(&entry.path, &root_prefix)?;
                    self.copy_entry(&request.project_id, entry, &work.join(rel))
                        .await?;
                }
                work
            }
            ExportTarget::Container(variant) => {
                tracker.advance(ExportPhase::InjectingTemplate)?;
                let work = scratch.path().join("container");
                let template = self.config.load_template(variant).await?;
                let dest = work.clone();
                blocking(move || extract_archive(&template, &dest)).await?;
                let injected = self
                    .inject(request, variant, &root_prefix, &files, &work)
                    .await?;
                if injected == 0 {
                    return Err(ExportError::ProjectNotFound(format!(
                        "{} has no {} documents",
                        request.project_id,
                        variant.as_str()
                    )));
                }
                work
            }
        };

        tracker.advance(ExportPhase::Archiving)?;
        let (entries, data) = finish_archive(work, request.sink.clone()).await?;
        tracker.advance(ExportPhase::Done)?;
        Ok(ExportArtifact {
            target: request.target,
            entries,
            data,
        })
    }

    async fn inject(
        &self,
        request: &ExportRequest,
        variant: TemplateVariant,
        root_prefix: &str,
        files: &[AssetEntry],
        work: &Path,
    ) -> ExportResult<usize> {
        let mut injected = 0;
        for &document in variant.documents() {
            let Some(destination) = variant.destination(document) else {
                continue;
            };
            let source_prefix = format!("{root_prefix}{}/", document.folder_name());
            let target_dir = work.join(destination);
            for entry in files.iter().filter(|f| f.path.starts_with(&source_prefix)) {
                let rel = strip(&entry.path, &source_prefix)?;
                self.copy_entry(&request.project_id, entry, &target_dir.join(rel))
                    .await?;
                injected += 1;
            }
            tracing::debug!(
                "Injected {} into {}",
                document.folder_name(),
                target_dir.display()
            );
        }
        Ok(injected)
    }

    async fn copy_entry(
        &self,
        project_id: &str,
        entry: &AssetEntry,
        target: &Path,
    ) -> ExportResult<()> {
        let bytes = self
            .store
            .read_file(project_id, &entry.path)
            .await?
            .ok_or_else(|| {
                ExportError::FileSystem(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("listed asset is missing: {}", entry.path),
                ))
            })?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(target, bytes).await?;
        Ok(())
    }
}

fn strip<'a>(path: &'a str, prefix: &str) -> ExportResult<&'a Path> {
    let rel = path.strip_prefix(prefix).unwrap_or(path);
    safe_relative(rel)
}

async fn blocking<T, F>(f: F) -> ExportResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ExportResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ExportError::ArchiveFailed(format!("archive task aborted: {e}")))?
}

/// Archive `work` into the sink; file sinks are replaced atomically.
async fn finish_archive(
    work: PathBuf,
    sink: ArtifactSink,
) -> ExportResult<(Vec<String>, ArtifactData)> {
    blocking(move || match sink {
        ArtifactSink::Memory => {
            let mut buffer = std::io::Cursor::new(Vec::new());
            let entries = write_archive(&work, &mut buffer)?;
            Ok((entries, ArtifactData::Memory(buffer.into_inner())))
        }
        ArtifactSink::File(path) => {
            let parent = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            std::fs::create_dir_all(&parent)?;
            let mut staged = tempfile::NamedTempFile::new_in(&parent)?;
            let entries = write_archive(&work, staged.as_file_mut())?;
            staged.as_file().sync_all()?;
            staged.persist(&path).map_err(|e| ExportError::FileSystem(e.error))?;
            Ok((entries, ArtifactData::File(path)))
        }
    })
    .await
}
