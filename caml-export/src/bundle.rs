//! Renders a project into its `.ca` file tree.
//!
//! ```text
//! Evening.ca/
//!   Background.ca/
//!     main.caml
//!     index.xml
//!     assetManifest.caml
//!     assets/...
//!   Floating.ca/
//!     ...
//! ```

use std::collections::BTreeMap;

use caml_core::{sanitize_filename, CaProjectBundle, DocumentType};

use crate::error::ExportResult;
use crate::store::{safe_relative, DirAssetStore, MemoryAssetStore};

/// File name of the serialized document.
pub const MAIN_DOCUMENT: &str = "main.caml";

/// Plist naming the root document of a `.ca` folder.
pub const INDEX_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
	<key>rootDocument</key>
	<string>main.caml</string>
</dict>
</plist>
"#;

/// Empty asset manifest every `.ca` folder carries.
pub const ASSET_MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<caml xmlns="http://www.apple.com/CoreAnimation/1.0">
  <MicaAssetManifest>
    <modules type="NSArray"/>
  </MicaAssetManifest>
</caml>
"#;

/// The complete file set of one project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFiles {
    /// Project folder name, e.g. `Evening.ca`.
    pub folder: String,
    /// Files keyed by `/`-separated path, each starting with `folder`.
    pub files: BTreeMap<String, Vec<u8>>,
}

impl ProjectFiles {
    /// Render every document of a project.
    ///
    /// Asset keys that would escape their document folder are skipped.
    #[must_use]
    pub fn render(
        project_name: &str,
        documents: &BTreeMap<DocumentType, CaProjectBundle>,
    ) -> Self {
        let folder = format!("{}.ca", sanitize_filename(project_name));
        let mut files = BTreeMap::new();
        for (document, bundle) in documents {
            let base = format!("{folder}/{}", document.folder_name());
            files.insert(
                format!("{base}/{MAIN_DOCUMENT}"),
                bundle.to_caml().into_bytes(),
            );
            files.insert(format!("{base}/index.xml"), INDEX_XML.as_bytes().to_vec());
            files.insert(
                format!("{base}/assetManifest.caml"),
                ASSET_MANIFEST.as_bytes().to_vec(),
            );
            for (path, bytes) in &bundle.assets {
                if safe_relative(path).is_err() {
                    tracing::warn!("Skipping asset with unsafe path: {}", path);
                    continue;
                }
                files.insert(format!("{base}/{path}"), bytes.clone());
            }
        }
        tracing::debug!(
            "Rendered {} files for {} documents of {}",
            files.len(),
            documents.len(),
            folder
        );
        Self { folder, files }
    }

    /// Copy every file into an in-memory store.
    pub fn seed_memory(&self, store: &MemoryAssetStore, project_id: &str) {
        for (path, bytes) in &self.files {
            store.insert_file(project_id, path.clone(), bytes.clone());
        }
    }

    /// Copy every file into a directory store.
    ///
    /// # Errors
    ///
    /// Returns the first write failure.
    pub async fn seed_dir(&self, store: &DirAssetStore, project_id: &str) -> ExportResult<()> {
        for (path, bytes) in &self.files {
            store.write_file(project_id, path, bytes).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caml_core::{Layer, LayerKind, ProjectMeta, Size};

    fn documents() -> BTreeMap<DocumentType, CaProjectBundle> {
        let mut bg = CaProjectBundle::new(
            ProjectMeta::new("p", "Night/Sky", Size::new(390.0, 844.0)),
            Layer::new("root", "Root", LayerKind::Basic),
        );
        bg.assets.insert("assets/sky.png".into(), vec![1, 2, 3]);
        bg.assets.insert("../escape.png".into(), vec![0]);
        let fg = bg.clone();
        BTreeMap::from([(DocumentType::Background, bg), (DocumentType::Floating, fg)])
    }

    #[test]
    fn test_render_file_set() {
        let files = ProjectFiles::render("Night/Sky", &documents());
        assert_eq!(files.folder, "Night_Sky.ca");
        let paths: Vec<&str> = files.files.keys().map(String::as_str).collect();
        assert_eq!(
            paths,
            vec![
                "Night_Sky.ca/Background.ca/assetManifest.caml",
                "Night_Sky.ca/Background.ca/assets/sky.png",
                "Night_Sky.ca/Background.ca/index.xml",
                "Night_Sky.ca/Background.ca/main.caml",
                "Night_Sky.ca/Floating.ca/assetManifest.caml",
                "Night_Sky.ca/Floating.ca/assets/sky.png",
                "Night_Sky.ca/Floating.ca/index.xml",
                "Night_Sky.ca/Floating.ca/main.caml",
            ]
        );
        let main = String::from_utf8(files.files["Night_Sky.ca/Background.ca/main.caml"].clone())
            .expect("utf8");
        assert!(main.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
    }

    #[test]
    fn test_seed_memory_store() {
        let files = ProjectFiles::render("Night", &documents());
        let store = MemoryAssetStore::new();
        files.seed_memory(&store, "p");
        assert_eq!(store.project_ids(), vec!["p"]);
    }
}
