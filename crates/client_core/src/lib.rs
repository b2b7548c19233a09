use async_trait::async_trait;
use shared::{
    domain::{Asset, Category},
    protocol::AssetJobRequest,
};

pub mod category;
pub mod error;
pub mod gallery;
pub mod generation;
mod local;
pub mod orchestrator;
pub mod registry;
pub mod session;
pub mod templates;
pub mod transport;

pub use error::{ErrorCategory, WorkflowError};
pub use orchestrator::{
    BusyFlags, JobOutcome, Orchestrator, SaveOutcome, WorkflowEvent, WorkflowSnapshot,
};

/// Storage collaborator: lists, reads and writes JSON documents per category.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_documents(&self, category: Category) -> Result<Vec<String>, WorkflowError>;
    async fn read_document(
        &self,
        category: Category,
        identifier: &str,
    ) -> Result<String, WorkflowError>;
    async fn write_document(
        &self,
        category: Category,
        identifier: &str,
        content: &str,
    ) -> Result<(), WorkflowError>;
}

/// Generation collaborator: prompt to document, and document to media assets.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn synthesize_document(&self, prompt: &str) -> Result<serde_json::Value, WorkflowError>;
    /// Fire-and-forget from the caller's point of view; success only acknowledges the job.
    async fn synthesize_asset(&self, request: &AssetJobRequest) -> Result<(), WorkflowError>;
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn list_assets(&self) -> Result<Vec<Asset>, WorkflowError>;
}

pub struct MissingGenerationBackend;

#[async_trait]
impl GenerationBackend for MissingGenerationBackend {
    async fn synthesize_document(&self, _prompt: &str) -> Result<serde_json::Value, WorkflowError> {
        Err(WorkflowError::GenerationError(
            "no generation backend is configured".to_string(),
        ))
    }

    async fn synthesize_asset(&self, request: &AssetJobRequest) -> Result<(), WorkflowError> {
        Err(WorkflowError::GenerationError(format!(
            "no generation backend is configured to render {}/{}",
            request.category, request.identifier
        )))
    }
}

/// Monotonic tag attached to an in-flight request; a completion carrying anything but the latest
/// token of its slot is disregarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

#[derive(Debug, Default, Clone)]
pub(crate) struct RequestSequence {
    latest: u64,
}

impl RequestSequence {
    pub(crate) fn issue(&mut self) -> RequestToken {
        self.latest += 1;
        RequestToken(self.latest)
    }

    pub(crate) fn is_current(&self, token: RequestToken) -> bool {
        token.0 == self.latest
    }
}

/// Result of handing a response back to the component that requested it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    Stale,
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
