//! User-facing wording for workflow events and errors.

use client_core::{ErrorCategory, WorkflowError, WorkflowEvent};

/// One line describing a failure, with a hint when the user can do something about it.
pub fn describe_error(err: &WorkflowError) -> String {
    let hint = match err.category() {
        ErrorCategory::Transport => "check that the backend is running and reachable",
        ErrorCategory::Missing => "refresh the list; the document may have been removed",
        ErrorCategory::Generation => "the generation service failed; try again later",
        ErrorCategory::Validation => match err {
            WorkflowError::NotSavable(_) => "reopen the document before saving",
            WorkflowError::InvalidIdentifier(_) => "pick a different document name",
            _ => "fix the input and retry",
        },
    };
    format!("error: {err} ({hint})")
}

/// Short notice for events worth surfacing outside the command that caused them.
pub fn describe_event(event: &WorkflowEvent) -> Option<String> {
    match event {
        WorkflowEvent::CategoryChanged(category) => Some(format!("category: {category}")),
        WorkflowEvent::DocumentsListed {
            category,
            identifiers,
        } => Some(format!("{category}: {} document(s)", identifiers.len())),
        WorkflowEvent::GalleryRefreshed { count } => Some(format!("gallery: {count} asset(s)")),
        WorkflowEvent::StylesUpdated(styles) => Some(format!("styles: {}", styles.join(", "))),
        WorkflowEvent::SessionChanged(_)
        | WorkflowEvent::JobStatusChanged { .. }
        | WorkflowEvent::StyleOverrideChanged(_)
        | WorkflowEvent::Error(_) => None,
    }
}
