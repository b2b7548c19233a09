use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex as StdMutex,
    },
};

use super::*;
use crate::{
    generation::{JobKind, JobStatus},
    session::{LoadStatus, SaveStatus, LOAD_ERROR_PLACEHOLDER},
};
use serde_json::json;
use shared::domain::{DocumentRef, MediaType, StyleOverride};
use tokio::sync::Notify;

/// Holds a fake call until the test releases it.
#[derive(Default)]
struct Gate {
    entered: Notify,
    release: Notify,
}

#[derive(Default)]
struct Gates {
    gates: StdMutex<HashMap<String, Arc<Gate>>>,
}

impl Gates {
    fn install(&self, key: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.gates
            .lock()
            .expect("gates")
            .insert(key.to_string(), gate.clone());
        gate
    }

    async fn pass(&self, key: &str) {
        let gate = self.gates.lock().expect("gates").remove(key);
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }
}

#[derive(Default)]
struct FakeStore {
    files: StdMutex<BTreeMap<(Category, String), String>>,
    assets: StdMutex<Vec<Asset>>,
    gates: Gates,
    reads: AtomicUsize,
    writes: AtomicUsize,
    asset_lists: AtomicUsize,
    fail_lists: StdMutex<Option<WorkflowError>>,
    fail_reads: StdMutex<Option<WorkflowError>>,
    fail_writes: StdMutex<Option<WorkflowError>>,
}

impl FakeStore {
    fn with_files(files: &[(Category, &str, &str)]) -> Arc<Self> {
        let store = Self::default();
        {
            let mut map = store.files.lock().expect("files");
            for (category, identifier, content) in files {
                map.insert((*category, identifier.to_string()), content.to_string());
            }
        }
        Arc::new(store)
    }

    fn content(&self, category: Category, identifier: &str) -> Option<String> {
        self.files
            .lock()
            .expect("files")
            .get(&(category, identifier.to_string()))
            .cloned()
    }
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn list_documents(&self, category: Category) -> Result<Vec<String>, WorkflowError> {
        let listing = match self.fail_lists.lock().expect("fail").clone() {
            Some(err) => Err(err),
            None => Ok(self
                .files
                .lock()
                .expect("files")
                .keys()
                .filter(|(cat, _)| *cat == category)
                .map(|(_, identifier)| identifier.clone())
                .collect()),
        };
        // Answered as of request time, delivered whenever the gate opens.
        self.gates.pass(&format!("list:{category}")).await;
        listing
    }

    async fn read_document(
        &self,
        category: Category,
        identifier: &str,
    ) -> Result<String, WorkflowError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.gates.pass(&format!("read:{category}/{identifier}")).await;
        if let Some(err) = self.fail_reads.lock().expect("fail").clone() {
            return Err(err);
        }
        self.content(category, identifier)
            .ok_or_else(|| WorkflowError::NotFound {
                category,
                identifier: identifier.to_string(),
            })
    }

    async fn write_document(
        &self,
        category: Category,
        identifier: &str,
        content: &str,
    ) -> Result<(), WorkflowError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.gates.pass(&format!("write:{category}/{identifier}")).await;
        if let Some(err) = self.fail_writes.lock().expect("fail").clone() {
            return Err(err);
        }
        self.files
            .lock()
            .expect("files")
            .insert((category, identifier.to_string()), content.to_string());
        Ok(())
    }
}

#[async_trait]
impl AssetStore for FakeStore {
    async fn list_assets(&self) -> Result<Vec<Asset>, WorkflowError> {
        self.asset_lists.fetch_add(1, Ordering::SeqCst);
        Ok(self.assets.lock().expect("assets").clone())
    }
}

struct FakeGenerator {
    document: serde_json::Value,
    fail: StdMutex<Option<WorkflowError>>,
    gates: Gates,
    prompts: StdMutex<Vec<String>>,
    renders: StdMutex<Vec<AssetJobRequest>>,
}

impl FakeGenerator {
    fn returning(document: serde_json::Value) -> Arc<Self> {
        Arc::new(Self {
            document,
            fail: StdMutex::new(None),
            gates: Gates::default(),
            prompts: StdMutex::new(Vec::new()),
            renders: StdMutex::new(Vec::new()),
        })
    }

    fn fail_with(&self, err: WorkflowError) {
        *self.fail.lock().expect("fail") = Some(err);
    }

    fn renders(&self) -> Vec<AssetJobRequest> {
        self.renders.lock().expect("renders").clone()
    }
}

#[async_trait]
impl GenerationBackend for FakeGenerator {
    async fn synthesize_document(&self, prompt: &str) -> Result<serde_json::Value, WorkflowError> {
        self.prompts.lock().expect("prompts").push(prompt.to_string());
        self.gates.pass("document").await;
        if let Some(err) = self.fail.lock().expect("fail").clone() {
            return Err(err);
        }
        Ok(self.document.clone())
    }

    async fn synthesize_asset(&self, request: &AssetJobRequest) -> Result<(), WorkflowError> {
        self.renders.lock().expect("renders").push(request.clone());
        self.gates.pass("asset").await;
        if let Some(err) = self.fail.lock().expect("fail").clone() {
            return Err(err);
        }
        Ok(())
    }
}

fn orchestrator(store: &Arc<FakeStore>, generator: &Arc<FakeGenerator>) -> Arc<Orchestrator> {
    Orchestrator::new(store.clone(), generator.clone(), store.clone())
}

fn character_store() -> Arc<FakeStore> {
    FakeStore::with_files(&[
        (Category::Characters, "a.json", "{\"name\": \"A\"}"),
        (Category::Characters, "b.json", "{\"name\": \"B\"}"),
        (Category::Environments, "harbor.json", "{\"mood\": \"calm\"}"),
        (Category::Styles, "noir.json", "{\"style_id\": \"noir\"}"),
    ])
}

fn image(name: &str) -> Asset {
    Asset {
        name: name.to_string(),
        path: format!("/outputs/{name}"),
        media_type: MediaType::Image,
    }
}

#[tokio::test]
async fn initialize_opens_first_document_and_loads_catalogues() {
    let store = character_store();
    store.assets.lock().expect("assets").push(image("a_01.png"));
    let generator = FakeGenerator::returning(json!({}));
    let orchestrator = orchestrator(&store, &generator);

    orchestrator.initialize().await.expect("initialize");

    let snapshot = orchestrator.snapshot().await;
    assert_eq!(snapshot.category, Category::Characters);
    assert_eq!(snapshot.documents, vec!["a.json", "b.json"]);
    assert_eq!(
        snapshot.session.document,
        Some(DocumentRef::new(Category::Characters, "a.json"))
    );
    assert_eq!(snapshot.session.content.as_deref(), Some("{\"name\": \"A\"}"));
    assert_eq!(snapshot.styles, vec!["noir"]);
    assert_eq!(snapshot.asset_count, 1);
    assert!(snapshot.gallery_refreshed_at.is_some());
    assert_eq!(snapshot.last_error, None);
}

#[tokio::test]
async fn switching_away_discards_unsaved_edits() {
    let store = character_store();
    let generator = FakeGenerator::returning(json!({}));
    let orchestrator = orchestrator(&store, &generator);
    orchestrator.initialize().await.expect("initialize");

    orchestrator.edit("{\"name\": \"edited\"}").await.expect("edit");
    orchestrator
        .select_category(Category::Environments)
        .await
        .expect("environments");
    orchestrator
        .select_category(Category::Characters)
        .await
        .expect("characters");

    assert_eq!(orchestrator.buffer().await.as_deref(), Some("{\"name\": \"A\"}"));
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    assert_eq!(
        store.content(Category::Characters, "a.json").as_deref(),
        Some("{\"name\": \"A\"}")
    );
}

#[tokio::test]
async fn selecting_the_active_category_is_a_no_op() {
    let store = character_store();
    let generator = FakeGenerator::returning(json!({}));
    let orchestrator = orchestrator(&store, &generator);
    orchestrator.initialize().await.expect("initialize");
    orchestrator.edit("{}").await.expect("edit");

    orchestrator
        .select_category(Category::Characters)
        .await
        .expect("same category");

    assert_eq!(orchestrator.buffer().await.as_deref(), Some("{}"));
}

#[tokio::test]
async fn listing_for_abandoned_category_is_dropped() {
    let store = character_store();
    let generator = FakeGenerator::returning(json!({}));
    let orchestrator = orchestrator(&store, &generator);

    let gate = store.gates.install("list:environments");
    let slow = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.select_category(Category::Environments).await })
    };
    gate.entered.notified().await;

    orchestrator
        .select_category(Category::Styles)
        .await
        .expect("styles");
    gate.release.notify_one();
    slow.await.expect("join").expect("environments");

    let snapshot = orchestrator.snapshot().await;
    assert_eq!(snapshot.category, Category::Styles);
    assert_eq!(snapshot.documents, vec!["noir.json"]);
    assert_eq!(
        snapshot.session.document,
        Some(DocumentRef::new(Category::Styles, "noir.json"))
    );
}

#[tokio::test]
async fn slow_load_never_overwrites_newer_document() {
    let store = character_store();
    let generator = FakeGenerator::returning(json!({}));
    let orchestrator = orchestrator(&store, &generator);

    let gate = store.gates.install("read:characters/a.json");
    let slow = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.open_document("a.json").await })
    };
    gate.entered.notified().await;
    assert_eq!(orchestrator.buffer().await, None);
    assert!(orchestrator.busy().await.loading);

    orchestrator.open_document("b.json").await.expect("open b");
    gate.release.notify_one();
    slow.await.expect("join").expect("stale load is not an error");

    let snapshot = orchestrator.snapshot().await;
    assert_eq!(
        snapshot.session.document,
        Some(DocumentRef::new(Category::Characters, "b.json"))
    );
    assert_eq!(snapshot.session.content.as_deref(), Some("{\"name\": \"B\"}"));
    assert_eq!(snapshot.session.load_status, LoadStatus::Ready);
}

#[tokio::test]
async fn new_document_is_saved_under_resolved_name_and_listed_once() {
    let store = character_store();
    let generator = FakeGenerator::returning(json!({}));
    let orchestrator = orchestrator(&store, &generator);
    orchestrator.initialize().await.expect("initialize");

    orchestrator.begin_new().await.expect("new");
    let template = orchestrator.buffer().await.expect("template");
    assert!(template.contains("\"New Character\""));

    let outcome = orchestrator.save(Some(" foo ")).await.expect("save");
    assert_eq!(
        outcome,
        SaveOutcome::Saved(DocumentRef::new(Category::Characters, "foo.json"))
    );

    let snapshot = orchestrator.snapshot().await;
    assert_eq!(
        snapshot
            .documents
            .iter()
            .filter(|identifier| *identifier == "foo.json")
            .count(),
        1
    );
    assert!(!snapshot.session.is_new);
    assert_eq!(
        snapshot.session.document,
        Some(DocumentRef::new(Category::Characters, "foo.json"))
    );
    assert_eq!(snapshot.session.save_status, SaveStatus::Succeeded);
    assert_eq!(store.content(Category::Characters, "foo.json"), Some(template));
}

#[tokio::test]
async fn new_document_may_not_reuse_an_existing_name() {
    let store = character_store();
    let generator = FakeGenerator::returning(json!({}));
    let orchestrator = orchestrator(&store, &generator);
    orchestrator.initialize().await.expect("initialize");
    orchestrator.begin_new().await.expect("new");

    let err = orchestrator.save(Some("a")).await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidIdentifier(_)));
    let err = orchestrator.save(Some("   ")).await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidIdentifier(_)));

    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    assert!(orchestrator.snapshot().await.session.is_new);
}

#[tokio::test]
async fn repeated_save_while_running_writes_once() {
    let store = character_store();
    let generator = FakeGenerator::returning(json!({}));
    let orchestrator = orchestrator(&store, &generator);
    orchestrator.initialize().await.expect("initialize");
    orchestrator.edit("{\"name\": \"A2\"}").await.expect("edit");

    let gate = store.gates.install("write:characters/a.json");
    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.save(None).await })
    };
    gate.entered.notified().await;
    assert!(orchestrator.busy().await.saving);

    assert_eq!(
        orchestrator.save(None).await.expect("second trigger"),
        SaveOutcome::AlreadyRunning
    );
    gate.release.notify_one();
    assert_eq!(
        first.await.expect("join").expect("save"),
        SaveOutcome::Saved(DocumentRef::new(Category::Characters, "a.json"))
    );

    assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    assert_eq!(
        store.content(Category::Characters, "a.json").as_deref(),
        Some("{\"name\": \"A2\"}")
    );
}

#[tokio::test]
async fn failed_save_keeps_buffer_and_reports() {
    let store = character_store();
    let generator = FakeGenerator::returning(json!({}));
    let orchestrator = orchestrator(&store, &generator);
    orchestrator.initialize().await.expect("initialize");
    orchestrator.edit("{\"name\": \"draft\"}").await.expect("edit");

    let rejected = WorkflowError::ValidationError("name too long".to_string());
    *store.fail_writes.lock().expect("fail") = Some(rejected.clone());
    let mut events = orchestrator.subscribe_events();

    assert_eq!(orchestrator.save(None).await.unwrap_err(), rejected);

    let snapshot = orchestrator.snapshot().await;
    assert_eq!(snapshot.session.content.as_deref(), Some("{\"name\": \"draft\"}"));
    assert_eq!(snapshot.session.save_status, SaveStatus::Failed(rejected.clone()));
    assert_eq!(snapshot.last_error, Some(rejected.clone()));

    let mut saw_error = false;
    while let Ok(event) = events.try_recv() {
        if event == WorkflowEvent::Error(rejected.clone()) {
            saw_error = true;
        }
    }
    assert!(saw_error);
}

#[tokio::test]
async fn failed_load_shows_placeholder_and_blocks_save() {
    let store = character_store();
    *store.fail_reads.lock().expect("fail") =
        Some(WorkflowError::BackendUnavailable("connection refused".to_string()));
    let generator = FakeGenerator::returning(json!({}));
    let orchestrator = orchestrator(&store, &generator);

    assert!(orchestrator.initialize().await.is_err());
    let snapshot = orchestrator.snapshot().await;
    assert_eq!(snapshot.session.load_status, LoadStatus::Failed);
    assert_eq!(
        snapshot.session.content.as_deref(),
        Some(LOAD_ERROR_PLACEHOLDER)
    );

    let err = orchestrator.save(None).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotSavable(_)));
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancel_new_reopens_previous_document() {
    let store = character_store();
    let generator = FakeGenerator::returning(json!({}));
    let orchestrator = orchestrator(&store, &generator);
    orchestrator.initialize().await.expect("initialize");
    orchestrator.open_document("b.json").await.expect("open b");

    orchestrator.begin_new().await.expect("new");
    orchestrator.cancel_new().await.expect("cancel");

    let snapshot = orchestrator.snapshot().await;
    assert!(!snapshot.session.is_new);
    assert_eq!(
        snapshot.session.document,
        Some(DocumentRef::new(Category::Characters, "b.json"))
    );
    assert_eq!(snapshot.session.content.as_deref(), Some("{\"name\": \"B\"}"));
}

#[tokio::test]
async fn generated_document_fills_buffer_with_sorted_pretty_json() {
    let store = character_store();
    let generator = FakeGenerator::returning(json!({ "name": "Mara", "age": 41 }));
    let orchestrator = orchestrator(&store, &generator);
    orchestrator.initialize().await.expect("initialize");

    assert_eq!(
        orchestrator
            .synthesize_document("a tired detective")
            .await
            .expect("synthesize"),
        JobOutcome::Completed
    );

    assert_eq!(
        orchestrator.buffer().await.as_deref(),
        Some("{\n    \"age\": 41,\n    \"name\": \"Mara\"\n}")
    );
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_prompt_never_reaches_backend() {
    let store = character_store();
    let generator = FakeGenerator::returning(json!({}));
    let orchestrator = orchestrator(&store, &generator);

    let err = orchestrator.synthesize_document("  ").await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidInput(_)));
    assert!(generator.prompts.lock().expect("prompts").is_empty());
}

#[tokio::test]
async fn generated_document_is_discarded_after_session_change() {
    let store = character_store();
    let generator = FakeGenerator::returning(json!({ "name": "Late" }));
    let orchestrator = orchestrator(&store, &generator);
    orchestrator.initialize().await.expect("initialize");

    let gate = generator.gates.install("document");
    let job = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.synthesize_document("someone").await })
    };
    gate.entered.notified().await;
    assert!(orchestrator.busy().await.synthesizing_document);

    orchestrator.open_document("b.json").await.expect("open b");
    gate.release.notify_one();

    assert_eq!(job.await.expect("join").expect("job"), JobOutcome::Discarded);
    assert_eq!(orchestrator.buffer().await.as_deref(), Some("{\"name\": \"B\"}"));
    assert!(!orchestrator.busy().await.synthesizing_document);
}

#[tokio::test]
async fn successful_render_refreshes_gallery_exactly_once() {
    let store = character_store();
    let generator = FakeGenerator::returning(json!({}));
    let orchestrator = orchestrator(&store, &generator);
    orchestrator.initialize().await.expect("initialize");
    let before = store.asset_lists.load(Ordering::SeqCst);

    store.assets.lock().expect("assets").push(image("a_01.png"));
    assert_eq!(orchestrator.render().await.expect("render"), JobOutcome::Completed);

    assert_eq!(store.asset_lists.load(Ordering::SeqCst), before + 1);
    assert_eq!(orchestrator.latest_results().await, vec![image("a_01.png")]);
    assert_eq!(
        generator.renders(),
        vec![AssetJobRequest {
            category: Category::Characters,
            identifier: "a".to_string(),
            style_id: None,
        }]
    );
}

#[tokio::test]
async fn failed_render_does_not_refresh_gallery() {
    let store = character_store();
    let generator = FakeGenerator::returning(json!({}));
    let orchestrator = orchestrator(&store, &generator);
    orchestrator.initialize().await.expect("initialize");
    let before = store.asset_lists.load(Ordering::SeqCst);

    generator.fail_with(WorkflowError::GenerationError("quota exceeded".to_string()));
    let err = orchestrator.render().await.unwrap_err();

    assert!(matches!(err, WorkflowError::GenerationError(_)));
    assert_eq!(store.asset_lists.load(Ordering::SeqCst), before);
    let snapshot = orchestrator.snapshot().await;
    assert!(!snapshot.busy.rendering);
    assert_eq!(snapshot.last_error, Some(err));
}

#[tokio::test]
async fn second_render_while_running_is_ignored() {
    let store = character_store();
    let generator = FakeGenerator::returning(json!({}));
    let orchestrator = orchestrator(&store, &generator);
    orchestrator.initialize().await.expect("initialize");

    let gate = generator.gates.install("asset");
    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.render().await })
    };
    gate.entered.notified().await;

    assert_eq!(
        orchestrator.render().await.expect("second"),
        JobOutcome::AlreadyRunning
    );
    gate.release.notify_one();
    assert_eq!(first.await.expect("join").expect("render"), JobOutcome::Completed);
    assert_eq!(generator.renders().len(), 1);
}

#[tokio::test]
async fn render_requires_a_saved_document() {
    let store = character_store();
    let generator = FakeGenerator::returning(json!({}));
    let orchestrator = orchestrator(&store, &generator);
    orchestrator.initialize().await.expect("initialize");
    orchestrator.begin_new().await.expect("new");

    assert!(matches!(
        orchestrator.render().await,
        Err(WorkflowError::InvalidIdentifier(_))
    ));
    assert!(generator.renders().is_empty());
}

#[tokio::test]
async fn style_override_applies_to_characters_and_resets_on_switch() {
    let store = character_store();
    let generator = FakeGenerator::returning(json!({}));
    let orchestrator = orchestrator(&store, &generator);
    orchestrator.initialize().await.expect("initialize");

    assert!(matches!(
        orchestrator.set_style_override("vaporwave").await,
        Err(WorkflowError::InvalidInput(_))
    ));
    orchestrator
        .set_style_override("noir.json")
        .await
        .expect("known style");
    orchestrator.render().await.expect("render");
    assert_eq!(generator.renders()[0].style_id.as_deref(), Some("noir"));

    orchestrator
        .select_category(Category::Environments)
        .await
        .expect("environments");
    let snapshot = orchestrator.snapshot().await;
    assert_eq!(snapshot.style_override, StyleOverride::DocumentDefault);

    orchestrator
        .synthesize_asset(
            DocumentRef::new(Category::Environments, "harbor.json"),
            StyleOverride::Named("noir".to_string()),
        )
        .await
        .expect("environment render");
    assert_eq!(generator.renders()[1].style_id, None);
    assert_eq!(generator.renders()[1].identifier, "harbor");
}

#[tokio::test]
async fn gallery_category_cannot_open_documents() {
    let store = character_store();
    let generator = FakeGenerator::returning(json!({}));
    let orchestrator = orchestrator(&store, &generator);

    orchestrator
        .select_category(Category::Gallery)
        .await
        .expect("gallery");
    assert!(orchestrator.documents().await.is_empty());
    assert!(matches!(
        orchestrator.begin_new().await,
        Err(WorkflowError::InvalidInput(_))
    ));
    assert!(matches!(
        orchestrator.synthesize_document("anything").await,
        Err(WorkflowError::InvalidInput(_))
    ));
    assert_eq!(store.reads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn category_change_is_announced_before_listing() {
    let store = character_store();
    let generator = FakeGenerator::returning(json!({}));
    let orchestrator = orchestrator(&store, &generator);
    let mut events = orchestrator.subscribe_events();

    orchestrator
        .select_category(Category::Environments)
        .await
        .expect("environments");

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    let changed = seen
        .iter()
        .position(|event| *event == WorkflowEvent::CategoryChanged(Category::Environments))
        .expect("category event");
    let listed = seen
        .iter()
        .position(|event| {
            *event
                == WorkflowEvent::DocumentsListed {
                    category: Category::Environments,
                    identifiers: vec!["harbor.json".to_string()],
                }
        })
        .expect("listing event");
    assert!(changed < listed);
}

#[tokio::test]
async fn job_status_events_follow_render_lifecycle() {
    let store = character_store();
    let generator = FakeGenerator::returning(json!({}));
    let orchestrator = orchestrator(&store, &generator);
    orchestrator.initialize().await.expect("initialize");
    let mut events = orchestrator.subscribe_events();

    orchestrator.render().await.expect("render");

    let statuses: Vec<JobStatus> = std::iter::from_fn(|| events.try_recv().ok())
        .filter_map(|event| match event {
            WorkflowEvent::JobStatusChanged {
                kind: JobKind::DocumentToAsset,
                status,
            } => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec![JobStatus::Running, JobStatus::Succeeded]);
}

#[test]
fn request_sequence_only_honours_latest_token() {
    let mut sequence = RequestSequence::default();
    let first = sequence.issue();
    let second = sequence.issue();
    assert!(!sequence.is_current(first));
    assert!(sequence.is_current(second));
}

#[tokio::test]
async fn missing_generation_backend_reports_generation_errors() {
    let backend = MissingGenerationBackend;
    assert!(matches!(
        backend.synthesize_document("x").await,
        Err(WorkflowError::GenerationError(_))
    ));
    assert!(matches!(
        backend
            .synthesize_asset(&AssetJobRequest {
                category: Category::Characters,
                identifier: "hero".to_string(),
                style_id: None,
            })
            .await,
        Err(WorkflowError::GenerationError(_))
    ));
}

#[tokio::test]
async fn generated_document_supersedes_pending_load() {
    let store = character_store();
    let generator = FakeGenerator::returning(json!({ "name": "Knight" }));
    let orchestrator = orchestrator(&store, &generator);

    let gate = store.gates.install("read:characters/a.json");
    let load = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.open_document("a.json").await })
    };
    gate.entered.notified().await;

    assert_eq!(
        orchestrator
            .synthesize_document("a knight")
            .await
            .expect("synthesize"),
        JobOutcome::Completed
    );
    gate.release.notify_one();
    load.await.expect("join").expect("superseded load is not an error");

    let generated = "{\n    \"name\": \"Knight\"\n}";
    let snapshot = orchestrator.snapshot().await;
    assert!(snapshot.session.is_new);
    assert_eq!(snapshot.session.content.as_deref(), Some(generated));

    assert_eq!(
        orchestrator.save(Some("knight")).await.expect("save"),
        SaveOutcome::Saved(DocumentRef::new(Category::Characters, "knight.json"))
    );
    assert_eq!(
        store.content(Category::Characters, "knight.json").as_deref(),
        Some(generated)
    );
    assert_eq!(
        store.content(Category::Characters, "a.json").as_deref(),
        Some("{\"name\": \"A\"}")
    );
}

#[tokio::test]
async fn generated_document_after_failed_load_can_be_saved() {
    let store = character_store();
    *store.fail_reads.lock().expect("fail") =
        Some(WorkflowError::BackendUnavailable("connection refused".to_string()));
    let generator = FakeGenerator::returning(json!({ "name": "Generated" }));
    let orchestrator = orchestrator(&store, &generator);

    assert!(orchestrator.open_document("a.json").await.is_err());
    assert_eq!(
        orchestrator
            .synthesize_document("someone new")
            .await
            .expect("synthesize"),
        JobOutcome::Completed
    );

    let snapshot = orchestrator.snapshot().await;
    assert_eq!(snapshot.session.load_status, LoadStatus::Ready);
    assert!(snapshot.session.is_new);

    orchestrator.save(Some("generated")).await.expect("save");
    assert_eq!(
        store.content(Category::Characters, "generated.json").as_deref(),
        Some("{\n    \"name\": \"Generated\"\n}")
    );
}

#[tokio::test]
async fn returning_to_a_category_ignores_its_earlier_listing() {
    let store = character_store();
    let generator = FakeGenerator::returning(json!({}));
    let orchestrator = Orchestrator::with_initial_category(
        store.clone(),
        generator.clone(),
        store.clone(),
        Category::Environments,
    );

    let gate = store.gates.install("list:characters");
    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.select_category(Category::Characters).await })
    };
    gate.entered.notified().await;

    orchestrator
        .select_category(Category::Environments)
        .await
        .expect("environments");
    store
        .files
        .lock()
        .expect("files")
        .remove(&(Category::Characters, "a.json".to_string()));
    orchestrator
        .select_category(Category::Characters)
        .await
        .expect("characters again");

    gate.release.notify_one();
    first.await.expect("join").expect("stale listing is not an error");

    let snapshot = orchestrator.snapshot().await;
    assert_eq!(snapshot.category, Category::Characters);
    assert_eq!(snapshot.documents, vec!["b.json"]);
    assert_eq!(
        snapshot.session.document,
        Some(DocumentRef::new(Category::Characters, "b.json"))
    );
    assert_eq!(snapshot.session.content.as_deref(), Some("{\"name\": \"B\"}"));
    assert_eq!(snapshot.last_error, None);
}

#[tokio::test]
async fn new_document_save_waits_for_a_trustworthy_listing() {
    let store = character_store();
    *store.fail_lists.lock().expect("fail") =
        Some(WorkflowError::BackendUnavailable("listing timed out".to_string()));
    let generator = FakeGenerator::returning(json!({}));
    let orchestrator = orchestrator(&store, &generator);

    assert!(orchestrator.initialize().await.is_err());
    orchestrator.begin_new().await.expect("new");

    let err = orchestrator.save(Some("a")).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotSavable(_)));
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    assert_eq!(
        store.content(Category::Characters, "a.json").as_deref(),
        Some("{\"name\": \"A\"}")
    );

    *store.fail_lists.lock().expect("fail") = None;
    orchestrator.refresh_documents().await.expect("refresh");
    assert!(matches!(
        orchestrator.save(Some("a")).await,
        Err(WorkflowError::InvalidIdentifier(_))
    ));
    assert_eq!(
        orchestrator.save(Some("fresh")).await.expect("save"),
        SaveOutcome::Saved(DocumentRef::new(Category::Characters, "fresh.json"))
    );
}
