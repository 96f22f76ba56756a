//! Zip helpers.
//!
//! Archives hold the *contents* of a directory: entry names are relative to
//! the directory and always use `/`. Entries are written in sorted order with
//! a fixed timestamp so the same tree always produces the same bytes.

use std::fs::{self, File};
use std::io::{self, Cursor, Seek, Write};
use std::path::{Component, Path};

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::error::{ExportError, ExportResult};

const EXCLUDED_NAMES: [&str; 2] = [".DS_Store", "__MACOSX"];

fn file_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644)
}

/// Zip the contents of `root` into `writer`, returning the entry names.
///
/// # Errors
///
/// Returns an error if walking `root`, reading a file or writing the archive
/// fails.
pub fn write_archive<W: Write + Seek>(root: &Path, writer: W) -> ExportResult<Vec<String>> {
    let mut zip = ZipWriter::new(writer);
    let mut names = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = path.strip_prefix(root).map_err(|_| {
            ExportError::ArchiveFailed(format!("failed to relativize {}", path.display()))
        })?;
        if should_skip(rel) {
            continue;
        }
        let name = entry_name(rel);
        zip.start_file(name.as_str(), file_options())?;
        let mut source = File::open(path)?;
        io::copy(&mut source, &mut zip)?;
        names.push(name);
    }
    zip.finish()?;
    tracing::debug!("Archived {} files from {}", names.len(), root.display());
    Ok(names)
}

/// Zip the contents of `root` into memory.
///
/// # Errors
///
/// See [`write_archive`].
pub fn create_archive(root: &Path) -> ExportResult<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    write_archive(root, &mut buffer)?;
    Ok(buffer.into_inner())
}

/// Unpack a zip into `dest`, refusing entries that would escape it.
///
/// # Errors
///
/// Returns [`ExportError::ArchiveFailed`] for unreadable archives or unsafe
/// entry names, and [`ExportError::FileSystem`] for write failures.
pub fn extract_archive(data: &[u8], dest: &Path) -> ExportResult<()> {
    fs::create_dir_all(dest)?;
    let mut archive = ZipArchive::new(Cursor::new(data))
        .map_err(|e| ExportError::ArchiveFailed(format!("invalid archive: {e}")))?;
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let Some(rel) = file.enclosed_name().filter(|p| is_safe_entry_path(p)) else {
            return Err(ExportError::ArchiveFailed(format!(
                "archive entry has unsafe path: {}",
                file.name()
            )));
        };
        if should_skip(&rel) {
            continue;
        }
        let full_path = dest.join(&rel);
        if file.is_dir() {
            fs::create_dir_all(&full_path)?;
            continue;
        }
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&full_path)?;
        io::copy(&mut file, &mut out)?;
    }
    Ok(())
}

/// Names of the file entries in a zip, in archive order.
///
/// # Errors
///
/// Returns [`ExportError::ArchiveFailed`] if `data` is not a zip.
pub fn list_entries(data: &[u8]) -> ExportResult<Vec<String>> {
    let mut archive = ZipArchive::new(Cursor::new(data))
        .map_err(|e| ExportError::ArchiveFailed(format!("invalid archive: {e}")))?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let file = archive.by_index(i)?;
        if !file.is_dir() {
            names.push(file.name().to_string());
        }
    }
    Ok(names)
}

fn entry_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn should_skip(path: &Path) -> bool {
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|name| EXCLUDED_NAMES.contains(&name))
    })
}

fn is_safe_entry_path(path: &Path) -> bool {
    !path.is_absolute()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, contents).expect("write");
    }

    #[test]
    fn test_archive_holds_directory_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "b/two.txt", "2");
        write(dir.path(), "a.txt", "1");
        write(dir.path(), "b/.DS_Store", "junk");

        let bytes = create_archive(dir.path()).expect("archive");
        assert_eq!(
            list_entries(&bytes).expect("entries"),
            vec!["a.txt", "b/two.txt"]
        );
    }

    #[test]
    fn test_archive_is_deterministic() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "x/y.caml", "<caml/>");
        let first = create_archive(dir.path()).expect("first");
        let second = create_archive(dir.path()).expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn test_extract_restores_tree() {
        let src = tempfile::tempdir().expect("src");
        write(src.path(), "deep/er/file.bin", "payload");
        let bytes = create_archive(src.path()).expect("archive");

        let dest = tempfile::tempdir().expect("dest");
        extract_archive(&bytes, dest.path()).expect("extract");
        let restored = fs::read_to_string(dest.path().join("deep/er/file.bin")).expect("read");
        assert_eq!(restored, "payload");
    }

    #[test]
    fn test_extract_rejects_traversal() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buffer);
            zip.start_file("../evil.txt", file_options()).expect("start");
            zip.write_all(b"x").expect("write");
            zip.finish().expect("finish");
        }
        let dest = tempfile::tempdir().expect("dest");
        let err = extract_archive(buffer.get_ref(), dest.path()).expect_err("unsafe");
        assert!(matches!(err, ExportError::ArchiveFailed(_)));
    }

    #[test]
    fn test_extract_rejects_garbage() {
        let dest = tempfile::tempdir().expect("dest");
        assert!(matches!(
            extract_archive(b"not a zip", dest.path()),
            Err(ExportError::ArchiveFailed(_))
        ));
    }
}
