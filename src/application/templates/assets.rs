//! Card markup sources.

use std::path::PathBuf;

use include_dir::{Dir, include_dir};
use thiserror::Error;

static EMBEDDED_TEMPLATES: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/templates");

#[derive(Debug, Error)]
pub enum TemplateAssetError {
    #[error("template `{0}` not found")]
    NotFound(String),
    #[error("failed to read template `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Card markup source: compiled in by default, or a directory on disk when
/// operators want to iterate on templates without rebuilding.
pub struct TemplateAssets {
    override_dir: Option<PathBuf>,
}

impl TemplateAssets {
    pub fn embedded() -> Self {
        Self { override_dir: None }
    }

    pub fn from_directory(directory: PathBuf) -> Self {
        Self {
            override_dir: Some(directory),
        }
    }

    pub async fn read(&self, relative: &str) -> Result<String, TemplateAssetError> {
        match &self.override_dir {
            Some(root) => {
                let path = root.join(relative);
                match tokio::fs::read_to_string(&path).await {
                    Ok(contents) => Ok(contents),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        Err(TemplateAssetError::NotFound(relative.to_string()))
                    }
                    Err(err) => Err(TemplateAssetError::Io {
                        path: path.display().to_string(),
                        source: err,
                    }),
                }
            }
            None => EMBEDDED_TEMPLATES
                .get_file(relative)
                .and_then(|file| file.contents_utf8())
                .map(str::to_string)
                .ok_or_else(|| TemplateAssetError::NotFound(relative.to_string())),
        }
    }
}
