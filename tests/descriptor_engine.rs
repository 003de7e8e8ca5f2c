mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;

use common::{FakeTree, Harness};
use uase::action_primitives::ExecCtx;
use uase::uase_core_types::{ErrorKind, Rect};
use uase::{Descriptor, Engine, Outcome, ScenarioState};

fn ctx() -> ExecCtx {
    ExecCtx::with_timeout(Duration::from_secs(60))
}

#[tokio::test]
async fn unmet_preconditions_refuse_before_opening_devices() {
    let h = Harness::new();
    let descriptor = Descriptor::from_yaml(
        r#"
name: guest_only
preconditions:
  guest: true
  min_displays: 2
resources:
  - kind: keyboard
steps:
  - name: type
    op: type
    text: hello
"#,
    )
    .unwrap();

    let err = h.engine.run(&ctx(), &descriptor).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert_eq!(err.scenario(), Some("guest_only"));
    assert!(err.message().contains("session is not a guest session"));
    assert!(err.message().contains("needs 2 displays, session has 1"));
    assert!(h.journal.entries().iter().all(|e| !e.ends_with("opened")));
}

#[tokio::test]
async fn invalid_descriptor_is_refused() {
    let h = Harness::new();
    let descriptor = Descriptor::from_yaml(
        r#"
name: typing
steps:
  - name: type
    op: type
    text: hello
  - name: type
    op: sleep
    duration: 1s
"#,
    )
    .unwrap();

    let err = h.engine.run(&ctx(), &descriptor).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(err.message().contains("no keyboard resource is declared"));
    assert!(err.message().contains("step name \"type\" is used twice"));
    assert!(h.journal.entries().is_empty());
}

#[tokio::test]
async fn failed_acquisition_releases_what_was_armed() {
    let h = Harness::new();
    let descriptor = Descriptor::from_yaml(
        r#"
name: scroll
resources:
  - kind: keyboard
  - kind: trackpad
steps:
  - name: scroll down
    op: trackpad_scroll
    dx: 0
    dy: 300
"#,
    )
    .unwrap();

    let report = h.engine.run(&ctx(), &descriptor).await.unwrap();

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(report.reached, ScenarioState::Arming);
    let err = report.error.unwrap();
    assert_eq!(err.kind(), ErrorKind::Driver);
    assert_eq!(err.label(), "acquire trackpad");
    assert!(report.artifacts.is_empty());
    assert_eq!(report.cleanup, vec!["close keyboard"]);
    assert!(h.journal.contains("keyboard closed"));
}

#[tokio::test]
async fn touchscreen_is_closed_when_it_cannot_be_attached() {
    let h = Harness::new();
    *h.shell.display_lost.lock() = true;
    let descriptor = Descriptor::from_yaml(
        r#"
name: tap
resources:
  - kind: touchscreen
steps:
  - name: settle
    op: sleep
    duration: 10ms
"#,
    )
    .unwrap();

    let report = h.engine.run(&ctx(), &descriptor).await.unwrap();

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(report.reached, ScenarioState::Arming);
    let err = report.error.unwrap();
    assert_eq!(err.kind(), ErrorKind::Driver);
    assert_eq!(err.label(), "acquire touchscreen");
    assert!(report.cleanup.is_empty());
    let journal = h.journal.entries();
    let opened = journal.iter().position(|e| e == "touchscreen opened").unwrap();
    let closed = journal.iter().position(|e| e == "touchscreen closed").unwrap();
    assert!(opened < closed);
}

#[tokio::test(start_paused = true)]
async fn teardown_runs_before_resources_are_released() {
    let h = Harness::new();
    h.tree.add("button", "CloseButton", Rect::new(0, 0, 20, 20));
    let descriptor = Descriptor::from_yaml(
        r#"
name: with_teardown
resources:
  - kind: mouse
steps:
  - name: close
    op: left_click
    finder: { class_name: CloseButton }
teardown:
  - name: settle
    op: sleep
    duration: 100ms
"#,
    )
    .unwrap();

    let report = h.engine.run(&ctx(), &descriptor).await.unwrap();

    assert_eq!(report.outcome, Outcome::Passed, "{:?}", report.error);
    assert_eq!(report.cleanup, vec!["teardown: settle", "close mouse"]);
    assert!(report.metrics.is_empty());
    assert!(report.results_file.is_none());
}

#[tokio::test]
async fn builder_requires_every_session_port() {
    let err = Engine::builder()
        .evaluator(FakeTree::new())
        .build()
        .err()
        .unwrap();

    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert_eq!(err.message(), "engine needs an input subsystem");
}

#[tokio::test]
async fn descriptor_files_load_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = dir.path().join("wait.yaml");
    let json = dir.path().join("wait.json");
    tokio::fs::write(
        &yaml,
        "name: wait\nsteps:\n  - name: list\n    op: wait_until_exists\n    finder: { class_name: AppList }\n",
    )
    .await
    .unwrap();
    tokio::fs::write(
        &json,
        r#"{"name": "wait", "steps": [{"name": "list", "op": "wait_until_exists", "finder": {"class_name": "AppList"}}]}"#,
    )
    .await
    .unwrap();

    let from_yaml = Descriptor::load(&yaml).await.unwrap();
    let from_json = Descriptor::load(&json).await.unwrap();

    assert_eq!(from_yaml, from_json);
    assert!(from_yaml.steps[0].op.finder().is_some());
}
