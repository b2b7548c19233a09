//! Workflow orchestrator: the only place where components are composed.
//!
//! All state lives behind one lock that is never held across a backend call. Each operation
//! takes the lock to claim a slot and issue a request token, releases it for the backend call,
//! then takes it again to apply the response if the token is still current.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::{
    domain::{Asset, Category, DocumentRef, StyleOverride},
    protocol::AssetJobRequest,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    category::CategorySelector,
    gallery::AssetGallery,
    generation::{GenerationController, JobKind, JobStatus},
    registry::DocumentRegistry,
    session::{DocumentSession, LoadStatus, SaveStatus, SessionSnapshot},
    templates::{template_text, to_pretty_json},
    AssetStore, Completion, DocumentStore, GenerationBackend, WorkflowError,
};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    CategoryChanged(Category),
    DocumentsListed {
        category: Category,
        identifiers: Vec<String>,
    },
    SessionChanged(SessionSnapshot),
    JobStatusChanged {
        kind: JobKind,
        status: JobStatus,
    },
    StyleOverrideChanged(StyleOverride),
    StylesUpdated(Vec<String>),
    GalleryRefreshed {
        count: usize,
    },
    Error(WorkflowError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusyFlags {
    pub loading: bool,
    pub saving: bool,
    pub synthesizing_document: bool,
    pub rendering: bool,
}

/// Read-only projection handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSnapshot {
    pub category: Category,
    pub documents: Vec<String>,
    pub session: SessionSnapshot,
    pub style_override: StyleOverride,
    pub styles: Vec<String>,
    pub busy: BusyFlags,
    pub asset_count: usize,
    /// When the gallery last refreshed successfully.
    pub gallery_refreshed_at: Option<DateTime<Utc>>,
    pub last_error: Option<WorkflowError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(DocumentRef),
    /// A save was already running; nothing was sent.
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// A job of the same kind was already running; nothing was sent.
    AlreadyRunning,
    /// The job succeeded but the document it was started for is no longer open.
    Discarded,
}

struct WorkflowState {
    selector: CategorySelector,
    registry: DocumentRegistry,
    session: DocumentSession,
    generation: GenerationController,
    gallery: AssetGallery,
    last_error: Option<WorkflowError>,
}

impl WorkflowState {
    fn new(category: Category) -> Self {
        Self {
            selector: CategorySelector::new(category),
            registry: DocumentRegistry::default(),
            session: DocumentSession::new(category),
            generation: GenerationController::default(),
            gallery: AssetGallery::default(),
            last_error: None,
        }
    }

    fn busy(&self) -> BusyFlags {
        BusyFlags {
            loading: self.session.load_status() == LoadStatus::Loading,
            saving: *self.session.save_status() == SaveStatus::Running,
            synthesizing_document: self.generation.is_running(JobKind::PromptToDocument),
            rendering: self.generation.is_running(JobKind::DocumentToAsset),
        }
    }
}

pub struct Orchestrator {
    documents: Arc<dyn DocumentStore>,
    generator: Arc<dyn GenerationBackend>,
    assets: Arc<dyn AssetStore>,
    inner: Mutex<WorkflowState>,
    events: broadcast::Sender<WorkflowEvent>,
}

impl Orchestrator {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        generator: Arc<dyn GenerationBackend>,
        assets: Arc<dyn AssetStore>,
    ) -> Arc<Self> {
        Self::with_initial_category(documents, generator, assets, Category::default())
    }

    pub fn with_initial_category(
        documents: Arc<dyn DocumentStore>,
        generator: Arc<dyn GenerationBackend>,
        assets: Arc<dyn AssetStore>,
        category: Category,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            documents,
            generator,
            assets,
            inner: Mutex::new(WorkflowState::new(category)),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: WorkflowEvent) {
        let _ = self.events.send(event);
    }

    /// Records a failure as visible state and logs it. The error is returned to the caller as
    /// well; nothing else about the orchestration state changes.
    fn report(&self, state: &mut WorkflowState, operation: &str, err: &WorkflowError) {
        warn!(operation, error = %err, "workflow operation failed");
        state.last_error = Some(err.clone());
        self.emit(WorkflowEvent::Error(err.clone()));
    }

    fn emit_session(&self, state: &WorkflowState) {
        self.emit(WorkflowEvent::SessionChanged(state.session.snapshot()));
    }

    /// Loads what the screen shows on startup: the active category's documents (opening the
    /// first), the style catalogue and the gallery. Every step runs even if an earlier one fails;
    /// the first failure is returned.
    pub async fn initialize(&self) -> Result<(), WorkflowError> {
        let category = self.inner.lock().await.selector.active();
        let listing = if category.has_documents() {
            self.load_registry(category, true).await
        } else {
            Ok(())
        };
        let styles = self.load_styles().await.map(|_| ());
        let gallery = self.refresh_gallery().await.map(|_| ());
        listing.and(styles).and(gallery)
    }

    pub async fn select_category(&self, category: Category) -> Result<(), WorkflowError> {
        {
            let mut guard = self.inner.lock().await;
            let state = &mut *guard;
            let Some(previous) = state.selector.select(category) else {
                return Ok(());
            };
            state.session.reset(category);
            state.generation.reset_style_override();
            state.last_error = None;
            info!(from = %previous, to = %category, "category changed");
            self.emit(WorkflowEvent::CategoryChanged(category));
            self.emit(WorkflowEvent::StyleOverrideChanged(
                StyleOverride::DocumentDefault,
            ));
            self.emit_session(state);
        }

        if category.has_documents() {
            self.load_registry(category, true).await
        } else {
            Ok(())
        }
    }

    /// Re-lists the active category without touching the open document.
    pub async fn refresh_documents(&self) -> Result<(), WorkflowError> {
        let category = self.active_document_category().await?;
        self.load_registry(category, false).await
    }

    /// Lists `category` and, when `auto_select` is set and the session was not replaced in the
    /// meantime, opens the first document. Responses for a category that is no longer active or
    /// for a superseded request are dropped.
    async fn load_registry(&self, category: Category, auto_select: bool) -> Result<(), WorkflowError> {
        let (ticket, epoch) = {
            let mut state = self.inner.lock().await;
            (
                state.registry.begin_refresh(category),
                state.session.epoch(),
            )
        };

        debug!(%category, "listing documents");
        let result = self.documents.list_documents(category).await;

        let first = {
            let mut guard = self.inner.lock().await;
            let state = &mut *guard;
            if state.selector.active() != category {
                debug!(%category, "dropping listing for inactive category");
                return Ok(());
            }
            if state.registry.complete_refresh(&ticket, result) == Completion::Stale {
                debug!(%category, "dropping superseded listing");
                return Ok(());
            }

            let identifiers = state.registry.list(category).to_vec();
            self.emit(WorkflowEvent::DocumentsListed {
                category,
                identifiers: identifiers.clone(),
            });
            if let Some(err) = state.registry.last_error(category).cloned() {
                self.report(state, "list documents", &err);
                return Err(err);
            }
            info!(%category, count = identifiers.len(), "documents listed");

            if auto_select && state.session.epoch() == epoch {
                identifiers.into_iter().next()
            } else {
                None
            }
        };

        match first {
            Some(identifier) => self.open_document(&identifier).await,
            None => Ok(()),
        }
    }

    async fn active_document_category(&self) -> Result<Category, WorkflowError> {
        let category = self.inner.lock().await.selector.active();
        if !category.has_documents() {
            return Err(WorkflowError::InvalidInput(format!(
                "category '{category}' has no documents"
            )));
        }
        Ok(category)
    }

    pub async fn open_document(&self, identifier: &str) -> Result<(), WorkflowError> {
        let ticket = {
            let mut guard = self.inner.lock().await;
            let state = &mut *guard;
            let category = state.selector.active();
            if !category.has_documents() || identifier.trim().is_empty() {
                let err = if identifier.trim().is_empty() {
                    WorkflowError::InvalidIdentifier("document identifier is empty".to_string())
                } else {
                    WorkflowError::InvalidInput(format!("category '{category}' has no documents"))
                };
                self.report(state, "open document", &err);
                return Err(err);
            }
            let ticket = state
                .session
                .begin_open(DocumentRef::new(category, identifier.trim()));
            self.emit_session(state);
            ticket
        };

        let document = &ticket.document;
        info!(%document, "loading document");
        let result = self
            .documents
            .read_document(document.category, &document.identifier)
            .await;

        let mut guard = self.inner.lock().await;
        let state = &mut *guard;
        if state.session.complete_open(&ticket, result) == Completion::Stale {
            debug!(%document, "dropping superseded load");
            return Ok(());
        }
        self.emit_session(state);
        match state.session.load_error().cloned() {
            Some(err) => {
                self.report(state, "open document", &err);
                Err(err)
            }
            None => Ok(()),
        }
    }

    pub async fn begin_new(&self) -> Result<(), WorkflowError> {
        let category = self.active_document_category().await?;
        let template = template_text(category)?;
        let mut guard = self.inner.lock().await;
        let state = &mut *guard;
        state.session.begin_new(category, template);
        info!(%category, "started new document");
        self.emit_session(state);
        Ok(())
    }

    /// Leaves "new document" mode and reopens the document that was open before it, if any.
    pub async fn cancel_new(&self) -> Result<(), WorkflowError> {
        let previous = {
            let mut guard = self.inner.lock().await;
            let state = &mut *guard;
            if !state.session.is_new() {
                return Ok(());
            }
            let previous = state.session.cancel_new();
            self.emit_session(state);
            previous
        };

        match previous {
            Some(document) => self.open_document(&document.identifier).await,
            None => Ok(()),
        }
    }

    pub async fn edit(&self, text: impl Into<String>) -> Result<(), WorkflowError> {
        let mut guard = self.inner.lock().await;
        let state = &mut *guard;
        match state.session.edit(text.into()) {
            Ok(()) => {
                self.emit_session(state);
                Ok(())
            }
            Err(err) => {
                self.report(state, "edit", &err);
                Err(err)
            }
        }
    }

    /// Saves the buffer. `new_name` names a document created with [`Orchestrator::begin_new`]
    /// and is ignored otherwise.
    pub async fn save(&self, new_name: Option<&str>) -> Result<SaveOutcome, WorkflowError> {
        let ticket = {
            let mut guard = self.inner.lock().await;
            let state = &mut *guard;
            let registry = &state.registry;
            let category = state.session.category();
            let begun = state.session.begin_save(new_name, |identifier| {
                match registry.last_error(category) {
                    Some(err) => Err(WorkflowError::NotSavable(format!(
                        "cannot check whether {identifier} is free until {category} lists again: {err}"
                    ))),
                    None => Ok(registry.contains(category, identifier)),
                }
            });
            match begun {
                Ok(Some(ticket)) => {
                    self.emit_session(state);
                    ticket
                }
                Ok(None) => {
                    debug!("save already running; ignoring trigger");
                    return Ok(SaveOutcome::AlreadyRunning);
                }
                Err(err) => {
                    self.report(state, "save", &err);
                    self.emit_session(state);
                    return Err(err);
                }
            }
        };

        let document = ticket.document.clone();
        info!(%document, bytes = ticket.content.len(), "saving document");
        let result = self
            .documents
            .write_document(document.category, &document.identifier, &ticket.content)
            .await;

        {
            let mut guard = self.inner.lock().await;
            let state = &mut *guard;
            if state.session.complete_save(&ticket, result.clone()) == Completion::Applied {
                self.emit_session(state);
            }
            if let Err(err) = result {
                self.report(state, "save", &err);
                return Err(err);
            }
        }

        if ticket.was_new {
            // The write already succeeded; a failed re-list is reported on its own.
            let _ = self.load_registry(document.category, false).await;
        }
        Ok(SaveOutcome::Saved(document))
    }

    pub async fn set_style_override(&self, raw: &str) -> Result<(), WorkflowError> {
        let style = StyleOverride::parse(raw);
        let mut guard = self.inner.lock().await;
        let state = &mut *guard;
        match state.generation.set_style_override(style.clone()) {
            Ok(()) => {
                self.emit(WorkflowEvent::StyleOverrideChanged(style));
                Ok(())
            }
            Err(err) => {
                self.report(state, "set style override", &err);
                Err(err)
            }
        }
    }

    /// Refreshes the style catalogue from the `styles` collection.
    pub async fn load_styles(&self) -> Result<Vec<String>, WorkflowError> {
        let result = self.documents.list_documents(Category::Styles).await;
        let mut guard = self.inner.lock().await;
        let state = &mut *guard;
        match result {
            Ok(identifiers) => {
                state.generation.set_styles(&identifiers);
                let styles = state.generation.styles().to_vec();
                self.emit(WorkflowEvent::StylesUpdated(styles.clone()));
                Ok(styles)
            }
            Err(err) => {
                self.report(state, "load styles", &err);
                Err(err)
            }
        }
    }

    /// Generates a document from `prompt` into the buffer of the open session. Nothing is saved.
    pub async fn synthesize_document(&self, prompt: &str) -> Result<JobOutcome, WorkflowError> {
        let prompt = prompt.trim();
        let ticket = {
            let mut guard = self.inner.lock().await;
            let state = &mut *guard;
            let category = state.selector.active();
            let invalid = if prompt.is_empty() {
                Some(WorkflowError::InvalidInput("prompt is empty".to_string()))
            } else if !category.has_documents() {
                Some(WorkflowError::InvalidInput(format!(
                    "category '{category}' has no documents"
                )))
            } else {
                None
            };
            if let Some(err) = invalid {
                self.report(state, "synthesize document", &err);
                return Err(err);
            }

            let Some(ticket) = state
                .generation
                .try_start(JobKind::PromptToDocument, state.session.epoch())
            else {
                debug!("document synthesis already running; ignoring trigger");
                return Ok(JobOutcome::AlreadyRunning);
            };
            self.emit_job(state, JobKind::PromptToDocument);
            ticket
        };

        info!(prompt_len = prompt.len(), "synthesizing document");
        let result = match self.generator.synthesize_document(prompt).await {
            Ok(value) if value.is_object() => to_pretty_json(&value),
            Ok(_) => Err(WorkflowError::GenerationError(
                "generated document is not a JSON object".to_string(),
            )),
            Err(err) => Err(err),
        };

        let mut guard = self.inner.lock().await;
        let state = &mut *guard;
        state
            .generation
            .finish(&ticket, result.as_ref().map(|_| ()).map_err(Clone::clone));
        self.emit_job(state, JobKind::PromptToDocument);

        match result {
            Ok(content) => {
                if state.session.epoch() != ticket.session_epoch {
                    info!("open document changed during synthesis; discarding generated content");
                    return Ok(JobOutcome::Discarded);
                }
                state.session.apply_generated(content);
                self.emit_session(state);
                Ok(JobOutcome::Completed)
            }
            Err(err) => {
                self.report(state, "synthesize document", &err);
                Err(err)
            }
        }
    }

    /// Renders the open document with the current style override.
    pub async fn render(&self) -> Result<JobOutcome, WorkflowError> {
        let (document, style) = {
            let mut guard = self.inner.lock().await;
            let state = &mut *guard;
            let document = match state.session.document() {
                Some(document) if !state.session.is_new() => document.clone(),
                _ => {
                    let err = WorkflowError::InvalidIdentifier(
                        "save the document before rendering it".to_string(),
                    );
                    self.report(state, "render", &err);
                    return Err(err);
                }
            };
            (document, state.generation.style_override().clone())
        };
        self.synthesize_asset(document, style).await
    }

    /// Starts an asset job for `target`. Success refreshes the gallery exactly once; failure does
    /// not refresh it.
    pub async fn synthesize_asset(
        &self,
        target: DocumentRef,
        style: StyleOverride,
    ) -> Result<JobOutcome, WorkflowError> {
        let request = AssetJobRequest {
            category: target.category,
            identifier: target.bare_identifier().trim().to_string(),
            style_id: GenerationController::style_for(&style, target.category),
        };

        let ticket = {
            let mut guard = self.inner.lock().await;
            let state = &mut *guard;
            let invalid = if !target.category.supports_rendering() {
                Some(WorkflowError::InvalidInput(format!(
                    "documents in '{}' cannot be rendered",
                    target.category
                )))
            } else if request.identifier.is_empty() {
                Some(WorkflowError::InvalidIdentifier(
                    "document identifier is empty".to_string(),
                ))
            } else {
                None
            };
            if let Some(err) = invalid {
                self.report(state, "synthesize asset", &err);
                return Err(err);
            }

            let Some(ticket) = state
                .generation
                .try_start(JobKind::DocumentToAsset, state.session.epoch())
            else {
                debug!(%target, "asset synthesis already running; ignoring trigger");
                return Ok(JobOutcome::AlreadyRunning);
            };
            self.emit_job(state, JobKind::DocumentToAsset);
            ticket
        };

        info!(
            %target,
            style = request.style_id.as_deref().unwrap_or("default"),
            "starting asset synthesis"
        );
        let result = self.generator.synthesize_asset(&request).await;

        {
            let mut guard = self.inner.lock().await;
            let state = &mut *guard;
            state.generation.finish(&ticket, result.clone());
            self.emit_job(state, JobKind::DocumentToAsset);
            if let Err(err) = result {
                self.report(state, "synthesize asset", &err);
                return Err(err);
            }
        }

        // The job itself succeeded; a failed refresh is reported on its own.
        let _ = self.refresh_gallery().await;
        Ok(JobOutcome::Completed)
    }

    fn emit_job(&self, state: &WorkflowState, kind: JobKind) {
        let status = state.generation.status(kind).clone();
        debug!(job = kind.as_str(), ?status, "job status changed");
        self.emit(WorkflowEvent::JobStatusChanged { kind, status });
    }

    /// Re-fetches the whole asset list. Returns the number of assets now cached.
    pub async fn refresh_gallery(&self) -> Result<usize, WorkflowError> {
        let ticket = self.inner.lock().await.gallery.begin_refresh();
        let result = self.assets.list_assets().await;

        let mut guard = self.inner.lock().await;
        let state = &mut *guard;
        if state.gallery.complete_refresh(ticket, result) == Completion::Stale {
            debug!("dropping superseded gallery refresh");
            return Ok(state.gallery.all().len());
        }
        if let Some(err) = state.gallery.last_error().cloned() {
            self.report(state, "refresh gallery", &err);
            return Err(err);
        }
        let count = state.gallery.all().len();
        info!(count, "gallery refreshed");
        self.emit(WorkflowEvent::GalleryRefreshed { count });
        Ok(count)
    }

    pub async fn snapshot(&self) -> WorkflowSnapshot {
        let state = self.inner.lock().await;
        let category = state.selector.active();
        WorkflowSnapshot {
            category,
            documents: state.registry.list(category).to_vec(),
            session: state.session.snapshot(),
            style_override: state.generation.style_override().clone(),
            styles: state.generation.styles().to_vec(),
            busy: state.busy(),
            asset_count: state.gallery.all().len(),
            gallery_refreshed_at: state.gallery.refreshed_at(),
            last_error: state.last_error.clone(),
        }
    }

    pub async fn active_category(&self) -> Category {
        self.inner.lock().await.selector.active()
    }

    pub async fn documents(&self) -> Vec<String> {
        let state = self.inner.lock().await;
        state.registry.list(state.selector.active()).to_vec()
    }

    /// Current buffer, or `None` while the open document is loading.
    pub async fn buffer(&self) -> Option<String> {
        self.inner
            .lock()
            .await
            .session
            .content()
            .map(str::to_string)
    }

    pub async fn busy(&self) -> BusyFlags {
        self.inner.lock().await.busy()
    }

    /// "Latest results" preview for the open document.
    pub async fn latest_results(&self) -> Vec<Asset> {
        let state = self.inner.lock().await;
        let identifier = state
            .session
            .document()
            .filter(|_| !state.session.is_new())
            .map(|document| document.identifier.as_str());
        state.gallery.filtered_for(identifier)
    }

    /// Full gallery, unfiltered.
    pub async fn gallery(&self) -> Vec<Asset> {
        self.inner.lock().await.gallery.all().to_vec()
    }
}
