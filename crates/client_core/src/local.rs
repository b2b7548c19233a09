//! Offline collaborators backed by [`storage::LocalStore`].

use async_trait::async_trait;
use shared::domain::{Asset, Category};
use storage::{LocalStore, StorageError};

use crate::{AssetStore, DocumentStore, WorkflowError};

impl From<StorageError> for WorkflowError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NoCollection(_) => WorkflowError::InvalidInput(err.to_string()),
            StorageError::InvalidIdentifier(identifier) => {
                WorkflowError::InvalidIdentifier(identifier)
            }
            StorageError::NotFound {
                category,
                identifier,
            } => WorkflowError::NotFound {
                category,
                identifier,
            },
            StorageError::MalformedDocument { .. } => {
                WorkflowError::ValidationError(err.to_string())
            }
            StorageError::Io { .. } => WorkflowError::BackendUnavailable(err.to_string()),
        }
    }
}

#[async_trait]
impl DocumentStore for LocalStore {
    async fn list_documents(&self, category: Category) -> Result<Vec<String>, WorkflowError> {
        Ok(LocalStore::list_documents(self, category).await?)
    }

    async fn read_document(
        &self,
        category: Category,
        identifier: &str,
    ) -> Result<String, WorkflowError> {
        Ok(LocalStore::read_document(self, category, identifier).await?)
    }

    async fn write_document(
        &self,
        category: Category,
        identifier: &str,
        content: &str,
    ) -> Result<(), WorkflowError> {
        Ok(LocalStore::write_document(self, category, identifier, content).await?)
    }
}

#[async_trait]
impl AssetStore for LocalStore {
    async fn list_assets(&self) -> Result<Vec<Asset>, WorkflowError> {
        Ok(LocalStore::list_assets(self).await?)
    }
}
