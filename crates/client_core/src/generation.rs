use shared::domain::{bare_identifier, Category, StyleOverride};

use crate::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    PromptToDocument,
    DocumentToAsset,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::PromptToDocument => "prompt_to_document",
            JobKind::DocumentToAsset => "document_to_asset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Idle,
    Running,
    Succeeded,
    Failed(WorkflowError),
}

/// A started job. `session_epoch` records which document session was open at trigger time so a
/// late result is never applied to a different document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTicket {
    pub kind: JobKind,
    pub style: StyleOverride,
    pub session_epoch: u64,
}

#[derive(Debug)]
pub struct GenerationController {
    prompt_job: JobStatus,
    asset_job: JobStatus,
    style_override: StyleOverride,
    styles: Vec<String>,
}

impl Default for GenerationController {
    fn default() -> Self {
        Self {
            prompt_job: JobStatus::Idle,
            asset_job: JobStatus::Idle,
            style_override: StyleOverride::DocumentDefault,
            styles: Vec::new(),
        }
    }
}

impl GenerationController {
    fn slot_mut(&mut self, kind: JobKind) -> &mut JobStatus {
        match kind {
            JobKind::PromptToDocument => &mut self.prompt_job,
            JobKind::DocumentToAsset => &mut self.asset_job,
        }
    }

    pub fn status(&self, kind: JobKind) -> &JobStatus {
        match kind {
            JobKind::PromptToDocument => &self.prompt_job,
            JobKind::DocumentToAsset => &self.asset_job,
        }
    }

    pub fn is_running(&self, kind: JobKind) -> bool {
        *self.status(kind) == JobStatus::Running
    }

    /// Claims the slot for `kind`. Returns `None` while a job of that kind is running, so a
    /// duplicate trigger never reaches the backend.
    pub fn try_start(&mut self, kind: JobKind, session_epoch: u64) -> Option<JobTicket> {
        if self.is_running(kind) {
            return None;
        }
        *self.slot_mut(kind) = JobStatus::Running;
        Some(JobTicket {
            kind,
            style: self.style_override.clone(),
            session_epoch,
        })
    }

    pub fn finish(&mut self, ticket: &JobTicket, outcome: Result<(), WorkflowError>) {
        *self.slot_mut(ticket.kind) = match outcome {
            Ok(()) => JobStatus::Succeeded,
            Err(err) => JobStatus::Failed(err),
        };
    }

    pub fn style_override(&self) -> &StyleOverride {
        &self.style_override
    }

    /// Selects a style for the next character render. Named styles must come from the catalogue
    /// once it has been loaded.
    pub fn set_style_override(&mut self, style: StyleOverride) -> Result<(), WorkflowError> {
        if let StyleOverride::Named(name) = &style {
            if !self.styles.is_empty() && !self.styles.iter().any(|known| known == name) {
                return Err(WorkflowError::InvalidInput(format!("unknown style '{name}'")));
            }
        }
        self.style_override = style;
        Ok(())
    }

    pub fn reset_style_override(&mut self) {
        self.style_override = StyleOverride::DocumentDefault;
    }

    pub fn styles(&self) -> &[String] {
        &self.styles
    }

    /// Replaces the style catalogue from a `styles` listing.
    pub fn set_styles(&mut self, identifiers: &[String]) {
        self.styles = identifiers
            .iter()
            .map(|identifier| bare_identifier(identifier).to_string())
            .collect();
    }

    /// Style id to send with a render of `category`; only characters honour an override.
    pub fn style_for(style: &StyleOverride, category: Category) -> Option<String> {
        if !category.supports_style_override() {
            return None;
        }
        style.as_style_id().map(str::to_string)
    }
}

#[cfg(test)]
#[path = "tests/generation_tests.rs"]
mod tests;
