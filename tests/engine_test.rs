use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use taskweave::action::transform::TransformHandler;
use taskweave::action::{ActionDispatcher, ActionError, ActionHandler, Params};
use taskweave::workflow::{
    RunStatus, StepErrorKind, StepStatus, ValidationError, Workflow, WorkflowEngine,
    WorkflowError, WorkflowStep, WorkflowStore,
};

// ---------------------------------------------------------------------------
// Fake handlers
// ---------------------------------------------------------------------------

/// Text generation stand-in: echoes the prompt back with a prefix.
struct FakeText {
    calls: AtomicUsize,
}

#[async_trait]
impl ActionHandler for FakeText {
    fn step_type(&self) -> &str {
        "text-generation"
    }

    fn actions(&self) -> &[&str] {
        &["generate_completion", "summarize"]
    }

    async fn perform(&self, action: &str, params: &Params) -> Result<Value, ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match action {
            "generate_completion" => {
                let prompt = params.get("prompt").and_then(|v| v.as_str()).unwrap_or_default();
                Ok(json!(format!("generated: {}", prompt)))
            }
            "summarize" => Err(ActionError::Other("rate limited".into())),
            other => Err(ActionError::Unsupported(other.into())),
        }
    }
}

/// Mail stand-in returning a fixed message.
struct FakeMail {
    calls: AtomicUsize,
}

#[async_trait]
impl ActionHandler for FakeMail {
    fn step_type(&self) -> &str {
        "mail"
    }

    fn actions(&self) -> &[&str] {
        &["get_message", "list_messages"]
    }

    async fn perform(&self, action: &str, params: &Params) -> Result<Value, ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match action {
            "list_messages" => Ok(json!(["m-1", "m-2"])),
            _ => Ok(json!({"id": params["message_id"], "snippet": "Quarterly numbers attached"})),
        }
    }
}

/// Document store stand-in recording what it was asked to save.
struct FakeDocs {
    calls: AtomicUsize,
    seen: std::sync::Mutex<Vec<Params>>,
}

#[async_trait]
impl ActionHandler for FakeDocs {
    fn step_type(&self) -> &str {
        "document-store"
    }

    fn actions(&self) -> &[&str] {
        &["create_page"]
    }

    async fn perform(&self, _action: &str, params: &Params) -> Result<Value, ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(params.clone());
        Ok(json!({"page_id": "p-1"}))
    }
}

struct Harness {
    engine: WorkflowEngine,
    text: Arc<FakeText>,
    mail: Arc<FakeMail>,
    docs: Arc<FakeDocs>,
}

impl Harness {
    fn new() -> Self {
        taskweave::logger::init_test();
        let text = Arc::new(FakeText { calls: AtomicUsize::new(0) });
        let mail = Arc::new(FakeMail { calls: AtomicUsize::new(0) });
        let docs = Arc::new(FakeDocs {
            calls: AtomicUsize::new(0),
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let dispatcher = ActionDispatcher::new()
            .with(text.clone())
            .with(mail.clone())
            .with(docs.clone())
            .with(Arc::new(TransformHandler));
        Self {
            engine: WorkflowEngine::new(Arc::new(dispatcher)),
            text,
            mail,
            docs,
        }
    }

    fn total_calls(&self) -> usize {
        self.text.calls.load(Ordering::SeqCst)
            + self.mail.calls.load(Ordering::SeqCst)
            + self.docs.calls.load(Ordering::SeqCst)
    }
}

fn workflow(id: &str, steps: Vec<WorkflowStep>) -> Workflow {
    Workflow {
        schema_version: 1,
        id: id.into(),
        name: id.into(),
        description: String::new(),
        steps,
        variables: HashMap::new(),
    }
}

fn vars(v: Value) -> HashMap<String, Value> {
    serde_json::from_value(v).unwrap()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_single_step_completion() {
    let h = Harness::new();
    let wf = workflow(
        "haiku",
        vec![WorkflowStep::new("generate", "text-generation", "generate_completion")
            .with_param("prompt", "{{prompt}}")],
    );

    let result = h
        .engine
        .execute(&wf, vars(json!({"prompt": "Write a haiku"})))
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.steps().len(), 1);
    assert_eq!(result.output("generate"), Some(&json!("generated: Write a haiku")));
    assert_eq!(
        result.context().get("generate_output"),
        Some(&json!("generated: Write a haiku"))
    );
    assert_eq!(result.context().get("prompt"), Some(&json!("Write a haiku")));
}

#[tokio::test]
async fn test_all_steps_succeed_and_outputs_flow_forward() {
    let h = Harness::new();
    let wf = workflow(
        "digest",
        vec![
            WorkflowStep::new("fetch", "mail", "get_message").with_param("message_id", "{{id}}"),
            WorkflowStep::new("draft", "text-generation", "generate_completion")
                .with_param("prompt", "Reply to {{ fetch_output }}"),
            WorkflowStep::new("save", "document-store", "create_page")
                .with_param("title", "Reply")
                .with_param("content", "{{draft_output}}"),
        ],
    );

    let result = h.engine.execute(&wf, vars(json!({"id": "m-9"}))).await.unwrap();

    assert_eq!(result.status(), RunStatus::Succeeded);
    let ids: Vec<&str> = result.steps().iter().map(|s| s.step_id.as_str()).collect();
    assert_eq!(ids, vec!["fetch", "draft", "save"]);

    let saved = h.docs.seen.lock().unwrap();
    let content = saved[0]["content"].as_str().unwrap();
    assert!(content.starts_with("generated: Reply to {"));
    assert!(content.contains("\"id\":\"m-9\""));
}

#[tokio::test]
async fn test_failure_halts_and_skips_the_rest() {
    let h = Harness::new();
    let wf = workflow(
        "email-digest",
        vec![
            WorkflowStep::new("fetch", "mail", "get_message")
                .with_param("message_id", "m-1")
                .then("summarize"),
            WorkflowStep::new("summarize", "text-generation", "summarize")
                .with_param("text", "{{fetch_output}}")
                .then("save"),
            WorkflowStep::new("save", "document-store", "create_page")
                .with_param("content", "{{summarize_output}}"),
        ],
    );

    let result = h.engine.execute(&wf, HashMap::new()).await.unwrap();

    assert_eq!(result.status(), RunStatus::Failed);
    assert_eq!(result.step("fetch").unwrap().status, StepStatus::Succeeded);

    let failed = result.failed_step().unwrap();
    assert_eq!(failed.step_id, "summarize");
    let err = failed.error.as_ref().unwrap();
    assert_eq!(err.kind, StepErrorKind::ActionExecution);
    assert!(err.message.contains("rate limited"));

    assert_eq!(result.step("save").unwrap().status, StepStatus::Skipped);
    assert_eq!(h.docs.calls.load(Ordering::SeqCst), 0);
    assert!(result.context().get("summarize_output").is_none());
    assert!(result.context().get("fetch_output").is_some());
}

#[tokio::test]
async fn test_missing_variable_never_dispatches() {
    let h = Harness::new();
    let wf = workflow(
        "needs-topic",
        vec![
            WorkflowStep::new("draft", "text-generation", "generate_completion")
                .with_param("prompt", "Write about {{topic}}"),
            WorkflowStep::new("save", "document-store", "create_page")
                .with_param("content", "{{draft_output}}"),
        ],
    );

    let result = h.engine.execute(&wf, HashMap::new()).await.unwrap();

    assert!(!result.is_success());
    let failed = result.failed_step().unwrap();
    assert_eq!(failed.step_id, "draft");
    let err = failed.error.as_ref().unwrap();
    assert_eq!(err.kind, StepErrorKind::UnresolvedVariable);
    assert!(err.message.contains("topic"));
    assert_eq!(result.step("save").unwrap().status, StepStatus::Skipped);
    assert_eq!(h.total_calls(), 0);
}

#[tokio::test]
async fn test_list_output_feeds_transform_steps() {
    let h = Harness::new();
    let wf = workflow(
        "inbox-ids",
        vec![
            WorkflowStep::new("fetch", "mail", "list_messages"),
            WorkflowStep::new("ids", "transform", "join")
                .with_param("items", "{{fetch_output}}")
                .with_param("separator", ", "),
            WorkflowStep::new("first", "transform", "extract")
                .with_param("source", "{{fetch_output}}")
                .with_param("key", "/0"),
        ],
    );

    let result = h.engine.execute(&wf, HashMap::new()).await.unwrap();

    assert!(result.is_success(), "{:?}", result.failed_step());
    assert_eq!(result.output("ids"), Some(&json!("m-1, m-2")));
    assert_eq!(result.output("first"), Some(&json!("m-1")));
}

#[tokio::test]
async fn test_unsupported_action_is_reported_per_step() {
    let h = Harness::new();
    let wf = workflow(
        "bad-action",
        vec![
            WorkflowStep::new("send", "mail", "send_message"),
            WorkflowStep::new("other", "spreadsheet", "append_row"),
        ],
    );

    let result = h.engine.execute(&wf, HashMap::new()).await.unwrap();
    let failed = result.failed_step().unwrap();
    assert_eq!(failed.step_id, "send");
    assert_eq!(failed.error.as_ref().unwrap().kind, StepErrorKind::UnsupportedAction);
    assert_eq!(result.step("other").unwrap().status, StepStatus::Skipped);
    assert_eq!(h.total_calls(), 0);
}

#[tokio::test]
async fn test_explicit_chain_runs_in_link_order() {
    let h = Harness::new();
    let wf = workflow(
        "chained",
        vec![
            WorkflowStep::new("draft", "text-generation", "generate_completion")
                .with_param("prompt", "hello")
                .then("save"),
            WorkflowStep::new("fetch", "mail", "get_message")
                .with_param("message_id", "{{save_output}}"),
            WorkflowStep::new("save", "document-store", "create_page")
                .with_param("content", "{{draft_output}}")
                .then("fetch"),
        ],
    );

    let result = h.engine.execute(&wf, HashMap::new()).await.unwrap();
    assert!(result.is_success());
    let ids: Vec<&str> = result.steps().iter().map(|s| s.step_id.as_str()).collect();
    assert_eq!(ids, vec!["draft", "save", "fetch"]);
}

#[tokio::test]
async fn test_structural_errors_are_rejected_before_any_step() {
    let h = Harness::new();
    let wf = workflow(
        "dup",
        vec![
            WorkflowStep::new("a", "text-generation", "generate_completion")
                .with_param("prompt", "x"),
            WorkflowStep::new("a", "text-generation", "generate_completion")
                .with_param("prompt", "y"),
        ],
    );

    let err = h.engine.execute(&wf, HashMap::new()).await.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::DuplicateStepId(_))
    ));
    assert_eq!(h.total_calls(), 0);
}

#[tokio::test]
async fn test_cycle_in_stored_document_fails_at_load() {
    let tmp = tempfile::TempDir::new().unwrap();
    let doc = json!({
        "id": "loop",
        "name": "Loop",
        "description": "",
        "steps": [
            {"id": "a", "type": "transform", "action": "format", "params": {}, "next_step": "b"},
            {"id": "b", "type": "transform", "action": "format", "params": {}, "next_step": "a"}
        ]
    });
    std::fs::write(tmp.path().join("loop.json"), doc.to_string()).unwrap();

    let store = WorkflowStore::new(tmp.path());
    let err = store.load("loop").await.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::Cycle { .. })
    ));
}

#[tokio::test]
async fn test_runs_are_deterministic() {
    let h = Harness::new();
    let wf = workflow(
        "repeat",
        vec![
            WorkflowStep::new("fetch", "mail", "get_message").with_param("message_id", "{{id}}"),
            WorkflowStep::new("draft", "text-generation", "generate_completion")
                .with_param("prompt", "{{fetch_output}}"),
        ],
    );

    let first = h.engine.execute(&wf, vars(json!({"id": "m-1"}))).await.unwrap();
    let second = h.engine.execute(&wf, vars(json!({"id": "m-1"}))).await.unwrap();

    assert_ne!(first.run_id(), second.run_id());
    assert_eq!(first.context(), second.context());
    let outputs = |r: &taskweave::workflow::ExecutionResult| {
        r.steps()
            .iter()
            .map(|s| (s.step_id.clone(), s.status, s.output.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(outputs(&first), outputs(&second));
}

#[tokio::test]
async fn test_concurrent_runs_do_not_share_context() {
    let h = Harness::new();
    let wf = Arc::new(workflow(
        "parallel",
        vec![WorkflowStep::new("draft", "text-generation", "generate_completion")
            .with_param("prompt", "{{topic}}")],
    ));

    let mut tasks = Vec::new();
    for i in 0..8 {
        let engine = h.engine.clone();
        let wf = wf.clone();
        tasks.push(tokio::spawn(async move {
            let topic = format!("topic-{}", i);
            let result = engine
                .execute(&wf, vars(json!({"topic": topic.clone()})))
                .await
                .unwrap();
            (topic, result)
        }));
    }

    for task in tasks {
        let (topic, result) = task.await.unwrap();
        assert_eq!(
            result.output("draft"),
            Some(&json!(format!("generated: {}", topic)))
        );
        assert_eq!(result.context().get("topic"), Some(&json!(topic)));
    }
    assert_eq!(h.text.calls.load(Ordering::SeqCst), 8);
}
