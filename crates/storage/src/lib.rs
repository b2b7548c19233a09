//! Local filesystem backend: documents live under `<data_dir>/<category>/*.json`, generated media
//! under an outputs tree that is served by path.

use std::{
    io,
    path::{Path, PathBuf},
    time::SystemTime,
};

use shared::domain::{Asset, Category, MediaType, DOCUMENT_EXTENSION};
use thiserror::Error;
use tracing::{debug, info, warn};

/// URL prefix under which files of the outputs tree are addressed.
pub const OUTPUTS_ROUTE: &str = "/outputs";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("category '{0}' has no document collection")]
    NoCollection(Category),
    #[error("invalid document identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("document {category}/{identifier} not found")]
    NotFound {
        category: Category,
        identifier: String,
    },
    #[error("document {identifier} is not valid JSON: {source}")]
    MalformedDocument {
        identifier: String,
        source: serde_json::Error,
    },
    #[error("{context}: {source}")]
    Io {
        context: String,
        source: io::Error,
    },
}

fn io_error(context: impl Into<String>) -> impl FnOnce(io::Error) -> StorageError {
    let context = context.into();
    move |source| StorageError::Io { context, source }
}

#[derive(Debug, Clone)]
pub struct LocalStore {
    data_dir: PathBuf,
    outputs_dir: PathBuf,
}

impl LocalStore {
    pub fn new(data_dir: impl Into<PathBuf>, outputs_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            outputs_dir: outputs_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn outputs_dir(&self) -> &Path {
        &self.outputs_dir
    }

    fn category_dir(&self, category: Category) -> Result<PathBuf, StorageError> {
        if !category.has_documents() {
            return Err(StorageError::NoCollection(category));
        }
        Ok(self.data_dir.join(category.as_str()))
    }

    fn document_path(&self, category: Category, identifier: &str) -> Result<PathBuf, StorageError> {
        validate_identifier(identifier)?;
        Ok(self.category_dir(category)?.join(identifier))
    }

    /// Lists document identifiers of a category, ordered by name. A category directory that does
    /// not exist yet is an empty collection.
    pub async fn list_documents(&self, category: Category) -> Result<Vec<String>, StorageError> {
        let dir = self.category_dir(category)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error(format!("failed to list {}", dir.display()))(err)),
        };

        let mut identifiers = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(io_error(format!("failed to list {}", dir.display())))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(io_error("failed to stat directory entry"))?;
            if !file_type.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(DOCUMENT_EXTENSION) {
                identifiers.push(name);
            }
        }
        identifiers.sort();
        debug!(%category, count = identifiers.len(), "listed local documents");
        Ok(identifiers)
    }

    pub async fn read_document(
        &self,
        category: Category,
        identifier: &str,
    ) -> Result<String, StorageError> {
        let path = self.document_path(category, identifier)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(StorageError::NotFound {
                category,
                identifier: identifier.to_string(),
            }),
            Err(err) => Err(io_error(format!("failed to read {}", path.display()))(err)),
        }
    }

    /// Persists `content` verbatim. Content that does not parse as JSON is rejected before
    /// anything touches the disk; the write goes through a temporary file and a rename.
    pub async fn write_document(
        &self,
        category: Category,
        identifier: &str,
        content: &str,
    ) -> Result<(), StorageError> {
        let path = self.document_path(category, identifier)?;
        serde_json::from_str::<serde_json::Value>(content).map_err(|source| {
            StorageError::MalformedDocument {
                identifier: identifier.to_string(),
                source,
            }
        })?;

        let dir = self.category_dir(category)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(io_error(format!("failed to create {}", dir.display())))?;

        let staging = dir.join(format!(".{identifier}.tmp"));
        tokio::fs::write(&staging, content.as_bytes())
            .await
            .map_err(io_error(format!("failed to write {}", staging.display())))?;
        if let Err(source) = tokio::fs::rename(&staging, &path).await {
            if let Err(err) = tokio::fs::remove_file(&staging).await {
                warn!(path = %staging.display(), error = %err, "failed to remove staging file");
            }
            return Err(io_error(format!("failed to replace {}", path.display()))(source));
        }

        info!(%category, identifier, bytes = content.len(), "saved local document");
        Ok(())
    }

    /// Walks the outputs tree and returns every media file, newest first. Names are paths relative
    /// to the outputs root so reference folders such as `hero_refs/head.jpg` keep their owner in
    /// the name.
    pub async fn list_assets(&self) -> Result<Vec<Asset>, StorageError> {
        let mut found: Vec<(SystemTime, Asset)> = Vec::new();
        let mut pending = vec![self.outputs_dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(io_error(format!("failed to list {}", dir.display()))(err))
                }
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(io_error(format!("failed to list {}", dir.display())))?
            {
                let path = entry.path();
                let metadata = entry
                    .metadata()
                    .await
                    .map_err(io_error(format!("failed to stat {}", path.display())))?;
                if metadata.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Some(media_type) = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .and_then(MediaType::from_extension)
                else {
                    continue;
                };
                let Some(name) = relative_name(&self.outputs_dir, &path) else {
                    continue;
                };

                let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                found.push((
                    modified,
                    Asset {
                        path: format!("{OUTPUTS_ROUTE}/{name}"),
                        name,
                        media_type,
                    },
                ));
            }
        }

        found.sort_by(|(a_time, a), (b_time, b)| {
            b_time.cmp(a_time).then_with(|| a.name.cmp(&b.name))
        });
        Ok(found.into_iter().map(|(_, asset)| asset).collect())
    }
}

fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

pub fn validate_identifier(identifier: &str) -> Result<(), StorageError> {
    let stem = identifier.strip_suffix(DOCUMENT_EXTENSION).unwrap_or_default();
    if stem.is_empty()
        || stem.starts_with('.')
        || identifier.contains(['/', '\\'])
        || identifier.contains("..")
    {
        return Err(StorageError::InvalidIdentifier(identifier.to_string()));
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
