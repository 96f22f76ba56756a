//! Container templates and the fixed injection layout inside them.
//!
//! The wallpaper container is a zipped descriptor tree. Project documents
//! are dropped into hard-coded folders of that tree; the consuming OS
//! component looks nowhere else.

use std::path::PathBuf;

use caml_core::DocumentType;
use serde::{Deserialize, Serialize};

use crate::error::{ExportError, ExportResult};

/// Destination of the wallpaper document in the gyro template.
pub const GYRO_WALLPAPER_DEST: &str = "descriptors/09E9B685-7456-4856-9C10-47DF26B76C33/versions/0/contents/7400.WWDC_2022-390w-844h@3x~iphone.wallpaper/wallpaper.ca/";

/// Content root of the plain template.
pub const PLAIN_CONTENT_ROOT: &str = "descriptors/09E9B685-7456-4856-9C10-47DF26B76C33/versions/1/contents/7400.WWDC_2022-390w-844h@3x~iphone.wallpaper/";

/// Background document folder under [`PLAIN_CONTENT_ROOT`].
pub const PLAIN_BACKGROUND_FOLDER: &str = "7400.WWDC_2022_Background-390w-844h@3x~iphone.ca/";

/// Floating document folder under [`PLAIN_CONTENT_ROOT`].
pub const PLAIN_FLOATING_FOLDER: &str = "7400.WWDC_2022_Floating-390w-844h@3x~iphone.ca/";

/// Default template directory, relative to the working directory.
pub const DEFAULT_TEMPLATES_DIR: &str = "templates";

/// The two container template variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateVariant {
    /// Single gyro-parallax wallpaper document.
    Gyro,
    /// Separate background and floating documents.
    Plain,
}

impl TemplateVariant {
    /// Document types this variant injects.
    #[must_use]
    pub const fn documents(self) -> &'static [DocumentType] {
        match self {
            Self::Gyro => &[DocumentType::Wallpaper],
            Self::Plain => &[DocumentType::Background, DocumentType::Floating],
        }
    }

    /// Destination folder inside the unpacked template for one document.
    ///
    /// Returns `None` when the variant has no slot for `document`.
    #[must_use]
    pub fn destination(self, document: DocumentType) -> Option<String> {
        match (self, document) {
            (Self::Gyro, DocumentType::Wallpaper) => Some(GYRO_WALLPAPER_DEST.to_string()),
            (Self::Plain, DocumentType::Background) => {
                Some(format!("{PLAIN_CONTENT_ROOT}{PLAIN_BACKGROUND_FOLDER}"))
            }
            (Self::Plain, DocumentType::Floating) => {
                Some(format!("{PLAIN_CONTENT_ROOT}{PLAIN_FLOATING_FOLDER}"))
            }
            _ => None,
        }
    }

    /// Lower-case name used in logs and on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gyro => "gyro",
            Self::Plain => "plain",
        }
    }
}

/// Where the packager finds its container templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportConfig {
    /// Directory holding the template archives.
    pub templates_dir: PathBuf,
    /// Gyro template file name inside `templates_dir`.
    pub gyro_template: String,
    /// Plain template file name inside `templates_dir`.
    pub plain_template: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from(DEFAULT_TEMPLATES_DIR),
            gyro_template: "gyro.zip".to_string(),
            plain_template: "plain.zip".to_string(),
        }
    }
}

impl ExportConfig {
    /// Config reading templates from `templates_dir` with default file names.
    #[must_use]
    pub fn with_templates_dir(templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            templates_dir: templates_dir.into(),
            ..Self::default()
        }
    }

    /// Full path of the template archive for `variant`.
    #[must_use]
    pub fn template_path(&self, variant: TemplateVariant) -> PathBuf {
        let name = match variant {
            TemplateVariant::Gyro => &self.gyro_template,
            TemplateVariant::Plain => &self.plain_template,
        };
        self.templates_dir.join(name)
    }

    /// Load the template archive bytes for `variant`.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::TemplateNotFound`] if the file is absent, or
    /// [`ExportError::FileSystem`] if it cannot be read.
    pub async fn load_template(&self, variant: TemplateVariant) -> ExportResult<Vec<u8>> {
        let path = self.template_path(variant);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ExportError::TemplateNotFound(path))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destinations() {
        assert_eq!(
            TemplateVariant::Gyro.destination(DocumentType::Wallpaper).as_deref(),
            Some(GYRO_WALLPAPER_DEST)
        );
        let floating = TemplateVariant::Plain
            .destination(DocumentType::Floating)
            .expect("floating slot");
        assert!(floating.starts_with(PLAIN_CONTENT_ROOT));
        assert!(floating.ends_with("7400.WWDC_2022_Floating-390w-844h@3x~iphone.ca/"));
        assert!(TemplateVariant::Gyro
            .destination(DocumentType::Background)
            .is_none());
        assert!(TemplateVariant::Plain
            .destination(DocumentType::Wallpaper)
            .is_none());
    }

    #[test]
    fn test_config_paths() {
        let config = ExportConfig::with_templates_dir("/opt/caml");
        assert_eq!(
            config.template_path(TemplateVariant::Plain),
            PathBuf::from("/opt/caml/plain.zip")
        );
        let parsed: ExportConfig =
            serde_json::from_str(r#"{"gyroTemplate":"g.zip"}"#).expect("config");
        assert_eq!(parsed.templates_dir, PathBuf::from("templates"));
        assert_eq!(parsed.gyro_template, "g.zip");
    }

    #[tokio::test]
    async fn test_missing_template() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ExportConfig::with_templates_dir(dir.path());
        let err = config
            .load_template(TemplateVariant::Gyro)
            .await
            .expect_err("missing");
        assert!(matches!(err, ExportError::TemplateNotFound(p) if p.ends_with("gyro.zip")));
    }
}
