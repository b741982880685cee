//! End-to-end tests for the stage controller against real SQLite stores
//! and a real scratch directory, with wrappers that count and fail calls.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use serde_json::json;
use stagerun_engine::config::parser;
use stagerun_engine::resolve::create_controller;
use stagerun_engine::{
    CleanupError, CleanupReport, FailureKind, FsCleaner, LedgerRegistry, PreconditionError,
    StageController, StageError, Transform, TransformRegistry, TransformRequest, Workspace,
    WorkspaceCleaner,
};
use stagerun_state::{
    error::Result as StateResult, ExecutionLedger, ManifestTable, SqliteLedger,
    SqliteManifestTable, StateError,
};
use stagerun_types::event::InvocationMeta;
use stagerun_types::ids::{EnvName, ManifestKey, RunId};
use stagerun_types::response::TransformResponse;
use stagerun_types::state::{ManifestRecord, RunEvent, RunRecord};
use stagerun_types::status::{ManifestStatus, RunStatus};

// ---------------------------------------------------------------------------
// Wrappers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CountingCleaner {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl WorkspaceCleaner for CountingCleaner {
    fn clean(&self, root: &Path) -> Result<CleanupReport, CleanupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(CleanupError::Remove {
                path: root.join("locked"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked"),
            });
        }
        FsCleaner.clean(root)
    }
}

/// Records every mutating call and optionally fails `update_status`.
struct RecordingLedger {
    inner: SqliteLedger,
    calls: Mutex<Vec<String>>,
    fail_update: AtomicBool,
}

impl RecordingLedger {
    fn new() -> Self {
        Self {
            inner: SqliteLedger::in_memory().unwrap(),
            calls: Mutex::new(Vec::new()),
            fail_update: AtomicBool::new(false),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ExecutionLedger for RecordingLedger {
    fn start_run(&self, pipeline: &str, env: &EnvName) -> StateResult<RunId> {
        self.inner.start_run(pipeline, env)
    }

    fn attach_to_run(&self, run_id: &RunId) -> StateResult<RunRecord> {
        self.inner.attach_to_run(run_id)
    }

    fn update_status(&self, run_id: &RunId, message: &str, component: &str) -> StateResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("update_status({message}, {component})"));
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(StateError::LockPoisoned);
        }
        self.inner.update_status(run_id, message, component)
    }

    fn mark_failed(&self, run_id: &RunId, component: &str, issue_comment: &str) -> StateResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("mark_failed({component}, {issue_comment})"));
        self.inner.mark_failed(run_id, component, issue_comment)
    }

    fn complete_run(&self, run_id: &RunId, component: &str) -> StateResult<()> {
        self.inner.complete_run(run_id, component)
    }

    fn get_run(&self, run_id: &RunId) -> StateResult<Option<RunRecord>> {
        self.inner.get_run(run_id)
    }

    fn history(&self, run_id: &RunId) -> StateResult<Vec<RunEvent>> {
        self.inner.history(run_id)
    }
}

/// Records every stage write and optionally fails all of them.
struct RecordingManifest {
    inner: SqliteManifestTable,
    writes: Mutex<Vec<(String, ManifestStatus, Option<String>)>>,
    fail: AtomicBool,
}

impl RecordingManifest {
    fn new() -> Self {
        Self {
            inner: SqliteManifestTable::in_memory().unwrap(),
            writes: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    fn writes(&self) -> Vec<(String, ManifestStatus, Option<String>)> {
        self.writes.lock().unwrap().clone()
    }
}

impl ManifestTable for RecordingManifest {
    fn register(&self, key: &ManifestKey, dataset: &str, datafile: &str) -> StateResult<()> {
        self.inner.register(key, dataset, datafile)
    }

    fn update_stage_status(
        &self,
        key: &ManifestKey,
        stage: &str,
        status: ManifestStatus,
        payload: Option<&str>,
    ) -> StateResult<()> {
        self.writes.lock().unwrap().push((
            key.as_str().to_string(),
            status,
            payload.map(str::to_string),
        ));
        if self.fail.load(Ordering::SeqCst) {
            return Err(StateError::LockPoisoned);
        }
        self.inner.update_stage_status(key, stage, status, payload)
    }

    fn get(&self, key: &ManifestKey) -> StateResult<Option<ManifestRecord>> {
        self.inner.get(key)
    }
}

// ---------------------------------------------------------------------------
// Transforms
// ---------------------------------------------------------------------------

/// Writes into the workspace, then returns a fixed response.
struct StagingTransform;

impl Transform for StagingTransform {
    fn transform_object(
        &mut self,
        req: &TransformRequest<'_>,
    ) -> anyhow::Result<TransformResponse> {
        std::fs::create_dir_all(req.workspace.join("parts"))?;
        std::fs::write(req.workspace.join("parts/0.json"), b"{}")?;
        Ok(TransformResponse::new(vec![
            json!(format!("pre-stage/{}/{}/{}", req.team, req.dataset, req.key)),
            json!({"rows": 12}),
        ])?)
    }
}

struct FailingTransform;

impl Transform for FailingTransform {
    fn transform_object(
        &mut self,
        req: &TransformRequest<'_>,
    ) -> anyhow::Result<TransformResponse> {
        std::fs::write(req.workspace.join("partial.json"), b"{")?;
        anyhow::bail!("schema mismatch in {}", req.key)
    }
}

/// Indexes past the end of an empty buffer after staging a file.
struct PanickingTransform;

impl Transform for PanickingTransform {
    fn transform_object(
        &mut self,
        req: &TransformRequest<'_>,
    ) -> anyhow::Result<TransformResponse> {
        std::fs::write(req.workspace.join("partial.json"), b"{")?;
        let offsets: Vec<usize> = Vec::new();
        Ok(TransformResponse::single(json!(offsets[3])))
    }
}

/// Stages a file, waits for every peer to stage theirs, then reads it back.
struct RendezvousTransform(Arc<Barrier>);

impl Transform for RendezvousTransform {
    fn transform_object(
        &mut self,
        req: &TransformRequest<'_>,
    ) -> anyhow::Result<TransformResponse> {
        let staged = req.workspace.join("persons.json");
        std::fs::write(&staged, req.key)?;
        self.0.wait();
        let content = std::fs::read_to_string(&staged)?;
        self.0.wait();
        Ok(TransformResponse::single(content))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    _dir: tempfile::TempDir,
    ledger: Arc<RecordingLedger>,
    manifest: Arc<RecordingManifest>,
    cleaner: Arc<CountingCleaner>,
    controller: StageController,
    run_id: RunId,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(RecordingLedger::new());
        let manifest = Arc::new(RecordingManifest::new());
        let cleaner = Arc::new(CountingCleaner::default());

        let run_id = ledger.start_run("legislators", &EnvName::new("dev")).unwrap();
        manifest
            .register(&ManifestKey::new("legislators#persons.json"), "legislators", "persons.json")
            .unwrap();

        let mut registry = TransformRegistry::new();
        registry
            .register("staging", || Ok(Box::new(StagingTransform) as Box<dyn Transform>))
            .register("failing", || Ok(Box::new(FailingTransform) as Box<dyn Transform>))
            .register("broken", || anyhow::bail!("missing credentials"))
            .register("panicking", || Ok(Box::new(PanickingTransform) as Box<dyn Transform>))
            .set_default("StageA", "staging")
            .bind("engineering", "legislators", "StageB", "failing")
            .bind("engineering", "legislators", "StageC", "broken")
            .bind("engineering", "legislators", "StageD", "panicking");

        let workspace = Workspace::acquire(dir.path().join("tmp"))
            .unwrap()
            .with_cleaner(cleaner.clone());
        let controller = StageController::builder()
            .ledgers(LedgerRegistry::single("dev", ledger.clone()))
            .manifest(manifest.clone())
            .resolver(Arc::new(registry))
            .workspace(workspace)
            .build()
            .unwrap();

        Self {
            _dir: dir,
            ledger,
            manifest,
            cleaner,
            controller,
            run_id,
        }
    }

    fn event(&self, stage: &str) -> serde_json::Value {
        json!({"body": {
            "bucket": "raw",
            "key": "persons.json",
            "team": "engineering",
            "pipeline_stage": stage,
            "dataset": "legislators",
            "manifest_ddb_key": "legislators#persons.json",
            "env": "dev",
            "peh_id": self.run_id.as_str()
        }})
    }

    fn run(&self, stage: &str) -> Result<TransformResponse, StageError> {
        self.controller
            .execute_value(&self.event(stage), &InvocationMeta::new("org-pipeline-stageA-process"))
    }

    fn cleanups(&self) -> usize {
        self.cleaner.calls.load(Ordering::SeqCst)
    }

    fn workspace_is_empty(&self) -> bool {
        std::fs::read_dir(self.controller.workspace().root())
            .unwrap()
            .next()
            .is_none()
    }

    fn run_record(&self) -> RunRecord {
        self.ledger.get_run(&self.run_id).unwrap().unwrap()
    }
}

// ---------------------------------------------------------------------------
// Success path
// ---------------------------------------------------------------------------

#[test]
fn test_success_records_processing_and_returns_response_unchanged() {
    let h = Harness::new();
    let response = h.run("StageA").unwrap();

    assert_eq!(
        response.elements(),
        &[
            json!("pre-stage/engineering/legislators/persons.json"),
            json!({"rows": 12})
        ]
    );
    assert_eq!(h.cleanups(), 1);
    assert!(h.workspace_is_empty());

    assert_eq!(
        h.ledger.calls(),
        vec!["update_status(StageA Stagea Processing, Stagea)".to_string()]
    );
    assert_eq!(
        h.manifest.writes(),
        vec![(
            "legislators#persons.json".to_string(),
            ManifestStatus::Processing,
            Some("pre-stage/engineering/legislators/persons.json".to_string())
        )]
    );
    assert_eq!(h.run_record().status, RunStatus::Processing);
}

#[test]
fn test_non_string_status_token_stored_as_json() {
    struct Numbered;
    impl Transform for Numbered {
        fn transform_object(
            &mut self,
            _: &TransformRequest<'_>,
        ) -> anyhow::Result<TransformResponse> {
            Ok(TransformResponse::single(json!({"objects": 3})))
        }
    }

    let h = Harness::new();
    let mut registry = TransformRegistry::new();
    registry
        .register("numbered", || Ok(Box::new(Numbered) as Box<dyn Transform>))
        .set_default("StageA", "numbered");
    let controller = StageController::builder()
        .ledgers(LedgerRegistry::single("dev", h.ledger.clone()))
        .manifest(h.manifest.clone())
        .resolver(Arc::new(registry))
        .workspace(h.controller.workspace().clone())
        .build()
        .unwrap();

    controller
        .execute_value(&h.event("StageA"), &InvocationMeta::new("org-pipeline-stageA-process"))
        .unwrap();
    let (_, status, payload) = h.manifest.writes().pop().unwrap();
    assert_eq!(status, ManifestStatus::Processing);
    assert_eq!(payload.as_deref(), Some(r#"{"objects":3}"#));
}

// ---------------------------------------------------------------------------
// Failure path
// ---------------------------------------------------------------------------

#[test]
fn test_transform_failure_marks_failed_and_returns_original_error() {
    let h = Harness::new();
    let err = h.run("StageB").unwrap_err();

    assert_eq!(err.kind(), Some(FailureKind::Transform));
    assert!(err.compensation_errors().is_empty());
    assert_eq!(
        err.stage_error().unwrap().to_string(),
        "schema mismatch in persons.json"
    );

    let calls = h.ledger.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0],
        "mark_failed(Stagea, StageB Stagea Error: schema mismatch in persons.json)"
    );
    assert_eq!(
        h.manifest.writes(),
        vec![(
            "legislators#persons.json".to_string(),
            ManifestStatus::Failed,
            None
        )]
    );

    assert_eq!(h.cleanups(), 1);
    assert!(h.workspace_is_empty());

    let run = h.run_record();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.ended_at.is_some());
}

#[test]
fn test_panicking_transform_is_compensated() {
    let h = Harness::new();
    let err = h.run("StageD").unwrap_err();

    assert_eq!(err.kind(), Some(FailureKind::Transform));
    assert!(err.compensation_errors().is_empty());
    let message = err.stage_error().unwrap().to_string();
    assert!(message.starts_with("transform panicked: index out of bounds"), "{message}");

    let calls = h.ledger.calls();
    assert_eq!(calls.len(), 1);
    assert!(
        calls[0].starts_with("mark_failed(Stagea, StageD Stagea Error: transform panicked"),
        "{}",
        calls[0]
    );
    assert_eq!(
        h.manifest.writes(),
        vec![(
            "legislators#persons.json".to_string(),
            ManifestStatus::Failed,
            None
        )]
    );
    assert_eq!(h.run_record().status, RunStatus::Failed);
    assert_eq!(h.cleanups(), 1);
    assert!(h.workspace_is_empty());
}

#[test]
fn test_factory_failure_is_a_resolution_failure() {
    let h = Harness::new();
    let err = h.run("StageC").unwrap_err();
    assert_eq!(err.kind(), Some(FailureKind::Resolution));
    let comment = h.run_record().issue_comment.unwrap();
    assert!(comment.contains("missing credentials"), "{comment}");
    assert_eq!(h.cleanups(), 1);
}

#[test]
fn test_unresolved_stage_marks_failed() {
    let h = Harness::new();
    let err = h.run("StageZ").unwrap_err();
    assert_eq!(err.kind(), Some(FailureKind::Resolution));
    assert_eq!(h.run_record().status, RunStatus::Failed);
    assert_eq!(h.manifest.writes()[0].1, ManifestStatus::Failed);
}

#[test]
fn test_ledger_update_failure_triggers_compensation() {
    let h = Harness::new();
    h.ledger.fail_update.store(true, Ordering::SeqCst);

    let err = h.run("StageA").unwrap_err();
    assert_eq!(err.kind(), Some(FailureKind::LedgerUpdate));

    let calls = h.ledger.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].starts_with("mark_failed(Stagea, StageA Stagea Error: "));
    // Success-path cleanup already ran before the ledger write.
    assert_eq!(h.cleanups(), 2);
    assert_eq!(
        h.manifest.writes(),
        vec![(
            "legislators#persons.json".to_string(),
            ManifestStatus::Failed,
            None
        )]
    );
}

#[test]
fn test_manifest_failure_is_reported_with_compensation_errors() {
    let h = Harness::new();
    h.manifest.fail.store(true, Ordering::SeqCst);

    let err = h.run("StageA").unwrap_err();
    assert_eq!(err.kind(), Some(FailureKind::ManifestUpdate));

    // The FAILED write also fails; the original error still comes first.
    let compensation = err.compensation_errors();
    assert_eq!(compensation.len(), 1);
    assert_eq!(compensation[0].step, "manifest");

    let statuses: Vec<ManifestStatus> = h.manifest.writes().into_iter().map(|w| w.1).collect();
    assert_eq!(statuses, vec![ManifestStatus::Processing, ManifestStatus::Failed]);
    assert_eq!(h.run_record().status, RunStatus::Failed);
}

#[test]
fn test_compensation_steps_all_run_when_cleanup_fails() {
    let h = Harness::new();
    h.cleaner.fail.store(true, Ordering::SeqCst);

    let err = h.run("StageB").unwrap_err();
    assert_eq!(err.kind(), Some(FailureKind::Transform));
    let steps: Vec<&str> = err.compensation_errors().iter().map(|c| c.step).collect();
    assert_eq!(steps, vec!["cleanup"]);

    assert_eq!(h.run_record().status, RunStatus::Failed);
    assert_eq!(h.manifest.writes()[0].1, ManifestStatus::Failed);
    assert_eq!(h.cleanups(), 1);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn test_concurrent_invocations_keep_their_own_workspace() {
    const INVOCATIONS: usize = 3;

    let h = Harness::new();
    let barrier = Arc::new(Barrier::new(INVOCATIONS));
    let mut registry = TransformRegistry::new();
    registry
        .register("rendezvous", move || {
            Ok(Box::new(RendezvousTransform(barrier.clone())) as Box<dyn Transform>)
        })
        .set_default("StageA", "rendezvous");
    let controller = StageController::builder()
        .ledgers(LedgerRegistry::single("dev", h.ledger.clone()))
        .manifest(h.manifest.clone())
        .resolver(Arc::new(registry))
        .workspace(h.controller.workspace().clone())
        .build()
        .unwrap();

    let responses: Vec<TransformResponse> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..INVOCATIONS)
            .map(|i| {
                let mut event = h.event("StageA");
                event["body"]["key"] = json!(format!("part-{i}.json"));
                let controller = &controller;
                s.spawn(move || {
                    controller
                        .execute_value(&event, &InvocationMeta::new("org-pipeline-stageA-process"))
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (i, response) in responses.iter().enumerate() {
        assert_eq!(response.status_payload(), format!("part-{i}.json"));
    }
    assert_eq!(h.cleanups(), INVOCATIONS);
    assert!(h.workspace_is_empty());
}

// ---------------------------------------------------------------------------
// Preconditions
// ---------------------------------------------------------------------------

#[test]
fn test_unknown_run_writes_nothing() {
    let h = Harness::new();
    let mut event = h.event("StageA");
    event["body"]["peh_id"] = json!("never-started");

    let err = h
        .controller
        .execute_value(&event, &InvocationMeta::new("org-pipeline-stageA-process"))
        .unwrap_err();
    assert!(matches!(
        err,
        StageError::Precondition(PreconditionError::Attach { .. })
    ));
    assert!(h.ledger.calls().is_empty());
    assert!(h.manifest.writes().is_empty());
    assert_eq!(h.run_record().status, RunStatus::Pending);
}

#[test]
fn test_bad_function_name_writes_nothing() {
    let h = Harness::new();
    let err = h
        .controller
        .execute_value(&h.event("StageA"), &InvocationMeta::new("process"))
        .unwrap_err();
    assert!(err.is_precondition());
    assert!(h.ledger.calls().is_empty());
    assert!(h.manifest.writes().is_empty());
    // The workspace is still released.
    assert_eq!(h.cleanups(), 1);
}

#[test]
fn test_terminal_run_rejects_attached_update() {
    let h = Harness::new();
    h.ledger.complete_run(&h.run_id, "Stagea").unwrap();

    let err = h.run("StageA").unwrap_err();
    assert_eq!(err.kind(), Some(FailureKind::LedgerUpdate));
    // mark_failed on a completed run is also rejected and reported.
    let steps: Vec<&str> = err.compensation_errors().iter().map(|c| c.step).collect();
    assert_eq!(steps, vec!["ledger"]);
    assert_eq!(h.run_record().status, RunStatus::Completed);
}

// ---------------------------------------------------------------------------
// Config-driven wiring
// ---------------------------------------------------------------------------

#[test]
fn test_config_driven_copy_stage() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let yaml = format!(
        r#"
version: "1.0"
workspace: {root}/tmp
storage_root: {root}/buckets
output_bucket: stage
manifest:
  path: {root}/manifest.db
environments:
  dev:
    ledger:
      path: {root}/dev/ledger.db
datasets:
  - team: engineering
    dataset: legislators
    transforms:
      StageA: copy
"#,
        root = root.display()
    );
    let config = parser::parse_config_str(&yaml).unwrap();
    let controller = create_controller(&config).unwrap();

    let raw = root.join("buckets/raw/engineering/legislators");
    std::fs::create_dir_all(&raw).unwrap();
    std::fs::write(raw.join("persons.json"), b"[]").unwrap();

    let ledger = controller.ledgers().get(&EnvName::new("dev")).unwrap();
    let run_id = ledger.start_run("legislators", &EnvName::new("dev")).unwrap();
    let key = ManifestKey::new("legislators#persons.json");
    controller
        .manifest()
        .register(&key, "legislators", "persons.json")
        .unwrap();

    let event = json!({"body": {
        "bucket": "raw",
        "key": "engineering/legislators/persons.json",
        "team": "engineering",
        "pipeline_stage": "StageA",
        "dataset": "legislators",
        "manifest_ddb_key": "legislators#persons.json",
        "env": "dev",
        "peh_id": run_id.as_str()
    }});
    let response = controller
        .execute_value(&event, &InvocationMeta::new("sdlf-engineering-stageA-process"))
        .unwrap();

    assert_eq!(
        response.status_payload(),
        "pre-stage/engineering/legislators/persons.json"
    );
    assert!(root
        .join("buckets/stage/pre-stage/engineering/legislators/persons.json")
        .exists());
    assert_eq!(std::fs::read_dir(root.join("tmp")).unwrap().count(), 0);

    let record = controller.manifest().get(&key).unwrap().unwrap();
    assert_eq!(record.stage("StageA").unwrap().status, ManifestStatus::Processing);
    let history = ledger.history(&run_id).unwrap();
    assert_eq!(history.last().unwrap().status, RunStatus::Processing);
    assert_eq!(
        history.last().unwrap().message.as_deref(),
        Some("StageA Stagea Processing")
    );
}
