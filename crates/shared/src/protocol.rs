//! Request and response bodies exchanged with the authoring backend over HTTP.

use serde::{Deserialize, Serialize};

use crate::domain::Category;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContentResponse {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveFileRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveFileResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateDocumentRequest {
    pub prompt: String,
}

/// Body of a render job. `style_id` is only sent for characters, and only when the user picked
/// something other than the document's own style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_id: Option<String>,
    pub render: bool,
}

/// Backend-side view of an asset job, independent of transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetJobRequest {
    pub category: Category,
    pub identifier: String,
    pub style_id: Option<String>,
}

impl AssetJobRequest {
    pub fn render_body(&self) -> RenderRequest {
        RenderRequest {
            style_id: self.style_id.clone(),
            render: true,
        }
    }
}
