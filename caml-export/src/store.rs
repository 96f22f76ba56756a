//! Read-only asset storage consumed by the packager.
//!
//! Projects are addressed by id; files inside a project by a `/`-separated
//! relative path such as `Evening.ca/Background.ca/main.caml`. The packager
//! only ever reads through [`AssetStore`]; writing is the editor's job, so
//! the write helpers here live on the concrete stores.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::error::{ExportError, ExportResult};

/// One file listed by an [`AssetStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetEntry {
    /// Project-relative path with `/` separators.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
}

/// Source of project files for export.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// List every file of `project_id` whose path starts with `prefix`,
    /// sorted by path.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::ProjectNotFound`] if the store has no such
    /// project.
    async fn list_files(&self, project_id: &str, prefix: &str) -> ExportResult<Vec<AssetEntry>>;

    /// Read one file, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    async fn read_file(&self, project_id: &str, path: &str) -> ExportResult<Option<Vec<u8>>>;
}

type ProjectFiles = BTreeMap<String, Vec<u8>>;

/// In-process asset store.
///
/// Cloning shares the underlying storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssetStore {
    projects: Arc<RwLock<HashMap<String, ProjectFiles>>>,
}

impl MemoryAssetStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace one file, creating the project if needed.
    pub fn insert_file(&self, project_id: &str, path: impl Into<String>, bytes: Vec<u8>) {
        let mut projects = self
            .projects
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        projects
            .entry(project_id.to_string())
            .or_default()
            .insert(path.into(), bytes);
    }

    /// Ids of every stored project, sorted.
    #[must_use]
    pub fn project_ids(&self) -> Vec<String> {
        let projects = self
            .projects
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut ids: Vec<String> = projects.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn list_files(&self, project_id: &str, prefix: &str) -> ExportResult<Vec<AssetEntry>> {
        let projects = self
            .projects
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let files = projects
            .get(project_id)
            .ok_or_else(|| ExportError::ProjectNotFound(project_id.to_string()))?;
        Ok(files
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(path, bytes)| AssetEntry {
                path: path.clone(),
                size: bytes.len() as u64,
            })
            .collect())
    }

    async fn read_file(&self, project_id: &str, path: &str) -> ExportResult<Option<Vec<u8>>> {
        let projects = self
            .projects
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(projects
            .get(project_id)
            .and_then(|files| files.get(path))
            .cloned())
    }
}

/// Asset store backed by a data directory with one sub-directory per project.
#[derive(Debug, Clone)]
pub struct DirAssetStore {
    data_dir: PathBuf,
}

impl DirAssetStore {
    /// Open a store rooted at `data_dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::FileSystem`] if the directory cannot be created.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> ExportResult<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    /// The root data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding one project's files.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::ProjectNotFound`] if the id is not a single
    /// plain path component.
    pub fn project_dir(&self, project_id: &str) -> ExportResult<PathBuf> {
        let mut components = Path::new(project_id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.data_dir.join(project_id)),
            _ => Err(ExportError::ProjectNotFound(project_id.to_string())),
        }
    }

    /// Write one file into a project, creating directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error for unsafe paths or when the write fails.
    pub async fn write_file(&self, project_id: &str, path: &str, bytes: &[u8]) -> ExportResult<()> {
        let target = self.project_dir(project_id)?.join(safe_relative(path)?);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl AssetStore for DirAssetStore {
    async fn list_files(&self, project_id: &str, prefix: &str) -> ExportResult<Vec<AssetEntry>> {
        let root = self.project_dir(project_id)?;
        if !tokio::fs::metadata(&root).await.is_ok_and(|m| m.is_dir()) {
            return Err(ExportError::ProjectNotFound(project_id.to_string()));
        }
        let prefix = prefix.to_string();
        tokio::task::spawn_blocking(move || walk_project(&root, &prefix))
            .await
            .map_err(|e| ExportError::FileSystem(io::Error::other(e)))?
    }

    async fn read_file(&self, project_id: &str, path: &str) -> ExportResult<Option<Vec<u8>>> {
        let target = self.project_dir(project_id)?.join(safe_relative(path)?);
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn walk_project(root: &Path, prefix: &str) -> ExportResult<Vec<AssetEntry>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let path = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if path.starts_with(prefix) {
            entries.push(AssetEntry {
                path,
                size: entry.metadata()?.len(),
            });
        }
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Reject absolute paths and `..` so store paths stay inside their project.
pub(crate) fn safe_relative(path: &str) -> ExportResult<&Path> {
    let p = Path::new(path);
    let safe = !path.is_empty()
        && p
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if safe {
        Ok(p)
    } else {
        Err(ExportError::FileSystem(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsafe asset path: {path}"),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_lists_by_prefix() {
        let store = MemoryAssetStore::new();
        store.insert_file("p", "P.ca/Background.ca/main.caml", b"<caml/>".to_vec());
        store.insert_file("p", "P.ca/Floating.ca/main.caml", b"<caml/>".to_vec());
        store.insert_file("p", "other.txt", b"x".to_vec());

        let files = store.list_files("p", "P.ca/").await.expect("list");
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["P.ca/Background.ca/main.caml", "P.ca/Floating.ca/main.caml"]
        );
        assert_eq!(files[0].size, 7);
    }

    #[tokio::test]
    async fn test_memory_store_missing_project() {
        let store = MemoryAssetStore::new();
        let err = store.list_files("nope", "").await.expect_err("missing");
        assert!(matches!(err, ExportError::ProjectNotFound(id) if id == "nope"));
        assert!(store.read_file("nope", "a").await.expect("read").is_none());
    }

    #[tokio::test]
    async fn test_dir_store_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DirAssetStore::with_data_dir(dir.path()).expect("store");
        store
            .write_file("proj", "P.ca/Wallpaper.ca/assets/a.png", b"png")
            .await
            .expect("write");
        store
            .write_file("proj", "P.ca/Wallpaper.ca/main.caml", b"<caml/>")
            .await
            .expect("write");

        let files = store.list_files("proj", "P.ca/").await.expect("list");
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "P.ca/Wallpaper.ca/assets/a.png");
        assert_eq!(
            store
                .read_file("proj", "P.ca/Wallpaper.ca/main.caml")
                .await
                .expect("read"),
            Some(b"<caml/>".to_vec())
        );
        assert!(store
            .read_file("proj", "P.ca/missing")
            .await
            .expect("read")
            .is_none());
    }

    #[tokio::test]
    async fn test_dir_store_rejects_escape() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DirAssetStore::with_data_dir(dir.path()).expect("store");
        assert!(store.read_file("proj", "../secret").await.is_err());
        assert!(matches!(
            store.list_files("../x", "").await,
            Err(ExportError::ProjectNotFound(_))
        ));
        assert!(matches!(
            store.list_files("absent", "").await,
            Err(ExportError::ProjectNotFound(_))
        ));
    }
}
