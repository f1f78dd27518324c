//! SOP sources
//!
//! The registry loads definitions through this trait so the filesystem and
//! database loaders are interchangeable; tests use the filesystem loader
//! against a fixture directory, production uses the database loader.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::path::{Path, PathBuf};

use super::types::SopDefinition;

#[derive(Debug, thiserror::Error)]
pub enum SopSourceError {
    #[error("failed to read SOP source directory {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("malformed SOP definition in {0}: {1}")]
    Parse(PathBuf, serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("malformed SOP definition stored under id {0}: {1}")]
    StoredParse(String, serde_json::Error),
}

#[async_trait]
pub trait SopSource: Send + Sync {
    async fn load_all(&self) -> Result<Vec<SopDefinition>, SopSourceError>;
}

/// Loads one SOP definition per `*.json` file in a directory. Grounded on
/// the config layer's env-driven loading style, adapted to a directory scan.
pub struct FilesystemSopSource {
    directory: PathBuf,
}

impl FilesystemSopSource {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

#[async_trait]
impl SopSource for FilesystemSopSource {
    async fn load_all(&self) -> Result<Vec<SopDefinition>, SopSourceError> {
        let directory = self.directory.clone();
        tokio::task::spawn_blocking(move || read_directory(&directory))
            .await
            .expect("filesystem SOP source task panicked")
    }
}

fn read_directory(directory: &Path) -> Result<Vec<SopDefinition>, SopSourceError> {
    let mut definitions = Vec::new();

    let entries = std::fs::read_dir(directory)
        .map_err(|e| SopSourceError::Io(directory.to_path_buf(), e))?;

    for entry in entries {
        let entry = entry.map_err(|e| SopSourceError::Io(directory.to_path_buf(), e))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let contents =
            std::fs::read_to_string(&path).map_err(|e| SopSourceError::Io(path.clone(), e))?;
        let definition: SopDefinition = serde_json::from_str(&contents)
            .map_err(|e| SopSourceError::Parse(path.clone(), e))?;
        definitions.push(definition);
    }

    Ok(definitions)
}

/// Loads definitions from the `sops` table, where each row holds one
/// versioned SOP as a JSON document alongside its id/version/active flag
/// for cheap filtering without a full JSON parse.
pub struct DatabaseSopSource {
    pool: PgPool,
}

impl DatabaseSopSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SopSource for DatabaseSopSource {
    async fn load_all(&self) -> Result<Vec<SopDefinition>, SopSourceError> {
        let rows = sqlx::query("SELECT id, definition FROM sops WHERE active = true")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                let definition_json: serde_json::Value = row.try_get("definition")?;
                serde_json::from_value(definition_json)
                    .map_err(|e| SopSourceError::StoredParse(id, e))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn filesystem_source_rejects_missing_directory() {
        let source = FilesystemSopSource::new("/nonexistent/path/for/sop/fixtures");
        assert!(source.load_all().await.is_err());
    }
}
