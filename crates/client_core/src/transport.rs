//! HTTP collaborators talking to the authoring backend.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Asset, Category},
    error::{ApiError, ErrorCode},
    protocol::{
        AssetJobRequest, FileContentResponse, GenerateDocumentRequest, SaveFileRequest,
        SaveFileResponse,
    },
};
use tracing::debug;
use url::Url;

use crate::{AssetStore, DocumentStore, GenerationBackend, WorkflowError};

/// Which failure family an endpoint reports into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Surface {
    Documents,
    Generation,
}

impl Surface {
    fn error(self, message: String) -> WorkflowError {
        match self {
            Surface::Documents => WorkflowError::BackendUnavailable(message),
            Surface::Generation => WorkflowError::GenerationError(message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self, WorkflowError> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Result<Self, WorkflowError> {
        let base_url = Url::parse(base_url.trim()).map_err(|err| {
            WorkflowError::InvalidInput(format!("invalid backend url '{base_url}': {err}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(WorkflowError::InvalidInput(format!(
                "backend url '{base_url}' cannot carry a path"
            )));
        }
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, WorkflowError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                WorkflowError::InvalidInput(format!(
                    "backend url '{}' cannot carry a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Absolute address of an asset for display, resolved against the backend url.
    pub fn asset_url(&self, asset: &Asset) -> Option<Url> {
        self.base_url.join(&asset.path).ok()
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        surface: Surface,
    ) -> Result<Response, WorkflowError> {
        request
            .send()
            .await
            .map_err(|err| surface.error(format!("request failed: {err}")))
    }
}

async fn decode<T: DeserializeOwned>(response: Response, surface: Surface) -> Result<T, WorkflowError> {
    response
        .json()
        .await
        .map_err(|err| surface.error(format!("malformed response: {err}")))
}

/// Reads an error response body. Prefers the backend's `{code, message}` body and falls back to
/// the raw text.
async fn failure(response: Response) -> (StatusCode, Option<ErrorCode>, String) {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiError>(&body) {
        Ok(api) => (status, Some(api.code), api.message),
        Err(_) if body.trim().is_empty() => (status, None, format!("backend answered {status}")),
        Err(_) => (status, None, format!("backend answered {status}: {}", body.trim())),
    }
}

fn is_validation(status: StatusCode, code: Option<ErrorCode>) -> bool {
    code == Some(ErrorCode::Validation)
        || status == StatusCode::BAD_REQUEST
        || status == StatusCode::UNPROCESSABLE_ENTITY
}

#[async_trait]
impl DocumentStore for HttpBackend {
    async fn list_documents(&self, category: Category) -> Result<Vec<String>, WorkflowError> {
        let url = self.endpoint(&["files", category.as_str()])?;
        debug!(%url, "listing documents");
        let response = self.send(self.http.get(url), Surface::Documents).await?;
        if !response.status().is_success() {
            let (_, _, message) = failure(response).await;
            return Err(WorkflowError::BackendUnavailable(message));
        }
        decode(response, Surface::Documents).await
    }

    async fn read_document(
        &self,
        category: Category,
        identifier: &str,
    ) -> Result<String, WorkflowError> {
        let url = self.endpoint(&["files", category.as_str(), identifier])?;
        debug!(%url, "reading document");
        let response = self.send(self.http.get(url), Surface::Documents).await?;
        if !response.status().is_success() {
            let (status, code, message) = failure(response).await;
            if status == StatusCode::NOT_FOUND || code == Some(ErrorCode::NotFound) {
                return Err(WorkflowError::NotFound {
                    category,
                    identifier: identifier.to_string(),
                });
            }
            return Err(WorkflowError::BackendUnavailable(message));
        }
        let body: FileContentResponse = decode(response, Surface::Documents).await?;
        Ok(body.content)
    }

    async fn write_document(
        &self,
        category: Category,
        identifier: &str,
        content: &str,
    ) -> Result<(), WorkflowError> {
        let url = self.endpoint(&["files", category.as_str(), identifier])?;
        debug!(%url, bytes = content.len(), "writing document");
        let request = self.http.post(url).json(&SaveFileRequest {
            content: content.to_string(),
        });
        let response = self.send(request, Surface::Documents).await?;
        if !response.status().is_success() {
            let (status, code, message) = failure(response).await;
            if is_validation(status, code) {
                return Err(WorkflowError::ValidationError(message));
            }
            return Err(WorkflowError::BackendUnavailable(message));
        }
        let body: SaveFileResponse = decode(response, Surface::Documents).await?;
        debug!(status = %body.status, "document written");
        Ok(())
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn synthesize_document(&self, prompt: &str) -> Result<serde_json::Value, WorkflowError> {
        let url = self.endpoint(&["generate", "character-json"])?;
        let request = self.http.post(url).json(&GenerateDocumentRequest {
            prompt: prompt.to_string(),
        });
        let response = self.send(request, Surface::Generation).await?;
        if !response.status().is_success() {
            let (_, _, message) = failure(response).await;
            return Err(WorkflowError::GenerationError(message));
        }
        decode(response, Surface::Generation).await
    }

    async fn synthesize_asset(&self, request: &AssetJobRequest) -> Result<(), WorkflowError> {
        let kind = match request.category {
            Category::Characters => "character",
            Category::Environments => "environment",
            other => {
                return Err(WorkflowError::InvalidInput(format!(
                    "documents in '{other}' cannot be rendered"
                )))
            }
        };
        let url = self.endpoint(&["generate", kind, &request.identifier])?;
        debug!(%url, style = ?request.style_id, "requesting render");
        let response = self
            .send(
                self.http.post(url).json(&request.render_body()),
                Surface::Generation,
            )
            .await?;
        if !response.status().is_success() {
            let (_, _, message) = failure(response).await;
            return Err(WorkflowError::GenerationError(message));
        }
        Ok(())
    }
}

#[async_trait]
impl AssetStore for HttpBackend {
    async fn list_assets(&self) -> Result<Vec<Asset>, WorkflowError> {
        let url = self.endpoint(&["assets"])?;
        let response = self.send(self.http.get(url), Surface::Documents).await?;
        if !response.status().is_success() {
            let (_, _, message) = failure(response).await;
            return Err(WorkflowError::BackendUnavailable(message));
        }
        decode(response, Surface::Documents).await
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
