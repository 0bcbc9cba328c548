//! End-to-end runs of the pty backend against a shell script

use serde_json::{json, Value};
use tempfile::TempDir;

use tuimuppet_common::{BackendKind, RunStatus, Scenario, Sequence};
use tuimuppet_engine::runner::run_scenario;
use tuimuppet_engine::{build_backend, BackendOptions, RunPlan, ScenarioRunner};

const ECHO_APP: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/harness/echo-app.sh");
const CURSOR_QUERY: &str =
    concat!(env!("CARGO_MANIFEST_DIR"), "/tests/harness/cursor-query.sh");

fn scenario(args: &[&str], launch_extra: Value, order: &[&str]) -> Scenario {
    script_scenario(ECHO_APP, args, launch_extra, order)
}

fn script_scenario(script: &str, args: &[&str], launch_extra: Value, order: &[&str]) -> Scenario {
    let mut launch_args = vec![script];
    launch_args.extend_from_slice(args);
    let mut launch = json!({
        "command": "/bin/sh",
        "args": launch_args,
        "backend": "pty",
        "cols": 80,
        "rows": 24,
    });
    if let (Some(launch), Some(extra)) = (launch.as_object_mut(), launch_extra.as_object()) {
        launch.extend(extra.clone());
    }
    Scenario::from_value(json!({
        "schemaVersion": "v1",
        "name": "echo-pty",
        "launch": launch,
        "defaults": {"waitTimeoutMs": 10000, "pollMs": 50},
        "sequenceOrder": order,
    }))
    .unwrap()
}

fn sequence(name: &str, steps: Value) -> Sequence {
    Sequence::from_value(json!({"schemaVersion": "v1", "name": name, "steps": steps})).unwrap()
}

fn backend() -> Box<dyn tuimuppet_engine::Backend> {
    build_backend(BackendKind::Pty, &BackendOptions::default()).unwrap()
}

#[tokio::test]
async fn test_echo_round_trip() {
    let steps = json!([
        {"type": "waitFor", "contains": "Ready>"},
        {"type": "line", "text": "hello"},
        {"type": "waitFor", "contains": "Echo: hello"},
        {"type": "line", "text": "quit"},
        {"type": "waitForExit"}
    ]);
    let mut backend = backend();

    let report = run_scenario(
        scenario(&[], json!({}), &["main"]),
        vec![sequence("main", steps)],
        &[],
        backend.as_mut(),
    )
    .await
    .unwrap();

    assert_eq!(report.status, RunStatus::Passed, "{:?}", report);
    assert_eq!(report.sequences[0].steps.len(), 5);
}

#[tokio::test]
async fn test_ready_matcher_waits_for_prompt() {
    let launch = json!({"startupTimeoutMs": 10000, "readyMatcher": {"contains": "Ready>"}});
    let steps = json!([
        {"type": "expect", "contains": "Ready>"},
        {"type": "expect", "contains": "Starting..."}
    ]);
    let mut backend = backend();

    let report = run_scenario(
        scenario(&["--slow"], launch, &["main"]),
        vec![sequence("main", steps)],
        &[],
        backend.as_mut(),
    )
    .await
    .unwrap();

    assert_eq!(report.status, RunStatus::Passed, "{:?}", report);
}

#[tokio::test]
async fn test_transcript_and_capture() {
    let captures = TempDir::new().unwrap();
    let steps = json!([
        {"type": "waitFor", "contains": "Ready>"},
        {"type": "line", "text": "token secret-123"},
        {"type": "waitFor", "contains": "Echo: token", "scope": "transcript"},
        {"type": "waitForNot", "contains": "Echo: nothing", "timeoutMs": 100},
        {"type": "capture", "name": "after-echo"}
    ]);
    let mut scenario = scenario(&[], json!({}), &["main"]);
    scenario.artifacts.redact = true;
    scenario.artifacts.redact_patterns = vec!["secret-[0-9]+".to_string()];

    let plan = RunPlan::build(scenario, vec![sequence("main", steps)], &[]).unwrap();
    let runner = ScenarioRunner::new(plan)
        .unwrap()
        .with_captures_dir(Some(captures.path().to_path_buf()));
    let mut backend = backend();
    let report = runner.run(backend.as_mut()).await.unwrap();

    assert_eq!(report.status, RunStatus::Passed, "{:?}", report);
    let artifacts = &report.sequences[0].artifacts;
    assert_eq!(artifacts.len(), 1);

    let written = std::fs::read_to_string(&artifacts[0]).unwrap();
    assert!(written.contains("Echo: token [REDACTED]"), "{}", written);
    assert!(!written.contains("secret-123"));
}

#[tokio::test]
async fn test_wait_for_exit_times_out_while_running() {
    let steps = json!([
        {"type": "waitFor", "contains": "Ready>"},
        {"type": "waitForExit", "timeoutMs": 200}
    ]);
    let mut backend = backend();

    let report = run_scenario(
        scenario(&[], json!({}), &["main"]),
        vec![sequence("main", steps)],
        &[],
        backend.as_mut(),
    )
    .await
    .unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    let failed = &report.sequences[0].steps[1];
    assert_eq!(failed.step_type, "waitForExit");
    assert!(failed.error.as_deref().unwrap_or("").contains("200ms"));
}

#[tokio::test]
async fn test_wait_for_stable_after_prompt() {
    let steps = json!([
        {"type": "waitFor", "contains": "Ready>"},
        {"type": "line", "text": "settle"},
        {"type": "waitForStable", "stableMs": 300},
        {"type": "expect", "contains": "Echo: settle"}
    ]);
    let mut backend = backend();

    let report = run_scenario(
        scenario(&[], json!({}), &["main"]),
        vec![sequence("main", steps)],
        &[],
        backend.as_mut(),
    )
    .await
    .unwrap();

    assert_eq!(report.status, RunStatus::Passed, "{:?}", report);
}

#[tokio::test]
async fn test_answers_cursor_position_query() {
    let steps = json!([
        {"type": "waitFor", "regex": "Cursor reply [0-9]+;[0-9]+"},
        {"type": "expect", "contains": "Cursor reply 1;1"},
        {"type": "waitFor", "contains": "Ready>"}
    ]);
    let mut backend = backend();

    let report = run_scenario(
        script_scenario(CURSOR_QUERY, &[], json!({}), &["main"]),
        vec![sequence("main", steps)],
        &[],
        backend.as_mut(),
    )
    .await
    .unwrap();

    assert_eq!(report.status, RunStatus::Passed, "{:?}", report);
}
