//! The single open document: identifier, editable buffer, and load/save status.
//!
//! ```text
//! empty -> loading -> { ready, load-failed }
//! ready -> saving  -> { ready, save-failed }
//! begin_new: any state -> ready (template content, is_new)
//! ```
//!
//! Every replacement of the session identity (category reset, open, new, cancel) bumps an epoch.
//! Responses that were requested under an older epoch or load token are disregarded.

use shared::domain::{resolve_identifier, Category, DocumentRef};

use crate::{Completion, RequestSequence, RequestToken, WorkflowError};

/// Shown in place of the buffer when a document could not be read.
pub const LOAD_ERROR_PLACEHOLDER: &str = "// Error loading file";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Empty,
    Loading,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    Idle,
    Running,
    Succeeded,
    Failed(WorkflowError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub category: Category,
    pub document: Option<DocumentRef>,
    /// `None` while a load is in flight so stale content is never shown as editable.
    pub content: Option<String>,
    pub is_new: bool,
    pub load_status: LoadStatus,
    pub save_status: SaveStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub document: DocumentRef,
    token: RequestToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveTicket {
    pub document: DocumentRef,
    pub content: String,
    pub was_new: bool,
    epoch: u64,
}

#[derive(Debug)]
pub struct DocumentSession {
    category: Category,
    document: Option<DocumentRef>,
    content: String,
    is_new: bool,
    load_status: LoadStatus,
    save_status: SaveStatus,
    load_error: Option<WorkflowError>,
    previous: Option<DocumentRef>,
    loads: RequestSequence,
    epoch: u64,
}

impl DocumentSession {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            document: None,
            content: String::new(),
            is_new: false,
            load_status: LoadStatus::Empty,
            save_status: SaveStatus::Idle,
            load_error: None,
            previous: None,
            loads: RequestSequence::default(),
            epoch: 0,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn document(&self) -> Option<&DocumentRef> {
        self.document.as_ref()
    }

    pub fn content(&self) -> Option<&str> {
        match self.load_status {
            LoadStatus::Loading => None,
            _ => Some(&self.content),
        }
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn load_status(&self) -> LoadStatus {
        self.load_status
    }

    pub fn save_status(&self) -> &SaveStatus {
        &self.save_status
    }

    pub fn load_error(&self) -> Option<&WorkflowError> {
        self.load_error.as_ref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            category: self.category,
            document: self.document.clone(),
            content: self.content().map(str::to_string),
            is_new: self.is_new,
            load_status: self.load_status,
            save_status: self.save_status.clone(),
        }
    }

    /// Discards everything, including interest in any in-flight load, and starts over empty.
    pub fn reset(&mut self, category: Category) {
        let loads = std::mem::take(&mut self.loads);
        let epoch = self.epoch;
        *self = Self::new(category);
        self.loads = loads;
        self.loads.issue();
        self.epoch = epoch + 1;
    }

    pub fn begin_open(&mut self, document: DocumentRef) -> LoadTicket {
        self.category = document.category;
        self.document = Some(document.clone());
        self.content.clear();
        self.is_new = false;
        self.load_status = LoadStatus::Loading;
        self.save_status = SaveStatus::Idle;
        self.load_error = None;
        self.previous = None;
        self.epoch += 1;
        LoadTicket {
            document,
            token: self.loads.issue(),
        }
    }

    pub fn complete_open(
        &mut self,
        ticket: &LoadTicket,
        result: Result<String, WorkflowError>,
    ) -> Completion {
        if !self.loads.is_current(ticket.token) || self.load_status != LoadStatus::Loading {
            return Completion::Stale;
        }

        match result {
            Ok(content) => {
                self.content = content;
                self.is_new = false;
                self.load_status = LoadStatus::Ready;
                self.load_error = None;
            }
            Err(err) => {
                self.content = LOAD_ERROR_PLACEHOLDER.to_string();
                self.load_status = LoadStatus::Failed;
                self.load_error = Some(err);
            }
        }
        Completion::Applied
    }

    /// Enters "new document" mode with `template` as the buffer. Cancels any in-flight load and
    /// remembers the document that was open so the mode can be cancelled.
    pub fn begin_new(&mut self, category: Category, template: String) {
        if !self.is_new {
            self.previous = self.document.take();
        }
        self.category = category;
        self.document = None;
        self.content = template;
        self.is_new = true;
        self.load_status = LoadStatus::Ready;
        self.save_status = SaveStatus::Idle;
        self.load_error = None;
        self.loads.issue();
        self.epoch += 1;
    }

    /// Leaves "new document" mode, dropping the unsaved buffer. Returns the document that was open
    /// before, if any, so the caller can reopen it.
    pub fn cancel_new(&mut self) -> Option<DocumentRef> {
        if !self.is_new {
            return None;
        }
        let previous = self.previous.take();
        self.reset(self.category);
        previous
    }

    pub fn edit(&mut self, text: String) -> Result<(), WorkflowError> {
        match self.load_status {
            LoadStatus::Loading => Err(WorkflowError::InvalidInput(
                "document is still loading".to_string(),
            )),
            LoadStatus::Empty => Err(WorkflowError::InvalidInput(
                "no document is open".to_string(),
            )),
            LoadStatus::Ready | LoadStatus::Failed => {
                self.content = text;
                Ok(())
            }
        }
    }

    /// Puts a freshly generated document into the buffer; nothing is saved. Over a ready document
    /// only the buffer is replaced. Without readable content (nothing open, a load in flight, or a
    /// failed load) it starts a new document, which also drops interest in the pending load.
    pub fn apply_generated(&mut self, content: String) {
        match self.load_status {
            LoadStatus::Ready => self.content = content,
            LoadStatus::Empty | LoadStatus::Loading | LoadStatus::Failed => {
                self.begin_new(self.category, content)
            }
        }
    }

    /// Starts a save. `Ok(None)` means a save is already running and the call is ignored.
    /// `exists` answers whether an identifier is already taken in the session's category, or fails
    /// when that cannot be known; new documents may not reuse one.
    pub fn begin_save(
        &mut self,
        new_name: Option<&str>,
        exists: impl Fn(&str) -> Result<bool, WorkflowError>,
    ) -> Result<Option<SaveTicket>, WorkflowError> {
        if self.save_status == SaveStatus::Running {
            return Ok(None);
        }

        match self.resolve_save_target(new_name, exists) {
            Ok(document) => {
                self.save_status = SaveStatus::Running;
                Ok(Some(SaveTicket {
                    document,
                    content: self.content.clone(),
                    was_new: self.is_new,
                    epoch: self.epoch,
                }))
            }
            Err(err) => {
                self.save_status = SaveStatus::Failed(err.clone());
                Err(err)
            }
        }
    }

    fn resolve_save_target(
        &self,
        new_name: Option<&str>,
        exists: impl Fn(&str) -> Result<bool, WorkflowError>,
    ) -> Result<DocumentRef, WorkflowError> {
        match self.load_status {
            LoadStatus::Loading => {
                return Err(WorkflowError::NotSavable(
                    "document is still loading".to_string(),
                ))
            }
            LoadStatus::Failed => {
                return Err(WorkflowError::NotSavable(
                    "the last load failed; reload the document before saving".to_string(),
                ))
            }
            LoadStatus::Empty => {
                return Err(WorkflowError::InvalidIdentifier(
                    "no document is open".to_string(),
                ))
            }
            LoadStatus::Ready => {}
        }

        if !self.is_new {
            return self.document.clone().ok_or_else(|| {
                WorkflowError::InvalidIdentifier("no document is open".to_string())
            });
        }

        let identifier = resolve_identifier(new_name.unwrap_or_default()).ok_or_else(|| {
            WorkflowError::InvalidIdentifier("document name is empty".to_string())
        })?;
        if exists(&identifier)? {
            return Err(WorkflowError::InvalidIdentifier(format!(
                "{identifier} already exists in {}",
                self.category
            )));
        }
        Ok(DocumentRef::new(self.category, identifier))
    }

    /// Applies a write result. On success a new document becomes the saved one; on failure the
    /// buffer is left exactly as it is.
    pub fn complete_save(
        &mut self,
        ticket: &SaveTicket,
        result: Result<(), WorkflowError>,
    ) -> Completion {
        if ticket.epoch != self.epoch {
            return Completion::Stale;
        }

        match result {
            Ok(()) => {
                if ticket.was_new {
                    self.document = Some(ticket.document.clone());
                    self.is_new = false;
                    self.previous = None;
                }
                self.save_status = SaveStatus::Succeeded;
            }
            Err(err) => self.save_status = SaveStatus::Failed(err),
        }
        Completion::Applied
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
