mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::Value;

use common::{FakeTree, Harness, PNG_BYTES};
use uase::action_flow::{combine, named, Action, UiContext};
use uase::action_locator::{Finder, Locator};
use uase::action_primitives::{
    DriverSet, ExecCtx, InputSubsystem, KeyCode, KeyState, Keyboard, KeyboardLayout, Mouse,
    PointerEvent,
};
use uase::perf_observe::{store_mean, MetricConfig, PerfValues, Recorder};
use uase::uase_core_types::{ErrorKind, Rect, Rotation};
use uase::{Descriptor, Outcome};

fn ctx() -> ExecCtx {
    ExecCtx::with_timeout(Duration::from_secs(60))
}

#[tokio::test]
async fn failing_step_unwinds_resources_in_reverse_and_keeps_artifacts() {
    let h = Harness::new();
    h.tree.add("dialog", "Blocker", Rect::new(10, 10, 100, 50));
    let descriptor = Descriptor::from_yaml(
        r#"
name: scenarioX
resources:
  - kind: keyboard
  - kind: touchscreen
  - kind: landscape_rotation
steps:
  - name: step1
    op: assert_gone
    finder: { class_name: Blocker }
"#,
    )
    .unwrap();

    let report = h.engine.run(&ctx(), &descriptor).await.unwrap();

    assert_eq!(report.outcome, Outcome::Failed);
    let err = report.error.as_ref().unwrap();
    assert_eq!(err.kind(), ErrorKind::Assertion);
    assert_eq!(err.label(), "step1");
    assert_eq!(err.scenario(), Some("scenarioX"));
    assert_eq!(
        report.cleanup,
        vec!["restore rotation", "close touchscreen", "close keyboard"]
    );
    assert!(report.cleanup_errors.is_empty());

    let folder = h.artifact_dir().join("scenarioX");
    let png = folder.join("step1.png");
    let dump = folder.join("step1.txt");
    assert_eq!(report.artifacts, vec![png.clone(), dump.clone()]);
    assert_eq!(std::fs::read(&png).unwrap(), PNG_BYTES);
    assert!(std::fs::read_to_string(&dump).unwrap().contains("AppList"));

    assert_eq!(h.shell.rotation(), Rotation::R0);
    let journal = h.journal.entries();
    let rotated = journal.iter().position(|e| e == "rotate internal to 90").unwrap();
    let restored = journal.iter().position(|e| e == "rotate internal to 0").unwrap();
    let touch_closed = journal.iter().position(|e| e == "touchscreen closed").unwrap();
    let keyboard_closed = journal.iter().position(|e| e == "keyboard closed").unwrap();
    assert!(rotated < restored);
    assert!(restored < touch_closed);
    assert!(touch_closed < keyboard_closed);
}

#[tokio::test(start_paused = true)]
async fn wait_gives_up_at_the_context_deadline_and_keeps_the_last_cause() {
    let tree = FakeTree::new();
    let locator = Locator::new(tree.clone());
    let ctx = ExecCtx::with_timeout(Duration::from_secs(2));
    let finder = Finder::new().class_name("Missing");

    let err = locator
        .wait_until_exists(&ctx, &finder, None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(tree.queries() >= 20, "only {} attempts", tree.queries());
    let cause = err.cause().unwrap();
    assert_eq!(cause.kind(), ErrorKind::NotFound);
    assert!(cause
        .message()
        .contains("failed to find node with properties"));
    assert!(err.finder().is_some());
}

#[tokio::test(start_paused = true)]
async fn combined_action_stops_at_the_first_failure() {
    let h = Harness::new();
    h.tree.add("button", "MenuA", Rect::new(0, 0, 100, 40));
    h.tree.add("button", "MenuC", Rect::new(200, 0, 100, 40));
    let device = h.input.open_mouse().await.unwrap();
    let drivers = DriverSet::new();
    drivers.set_mouse(Some(Arc::new(Mouse::new(device))));
    let ui = UiContext::new(Locator::new(h.tree.clone()), drivers);

    let action = combine(
        "open menu",
        [
            ui.left_click(Finder::new().class_name("MenuA")),
            named("waitB", ui.exists(Finder::new().class_name("MenuB"))),
            ui.left_click(Finder::new().class_name("MenuC")),
        ],
    );
    let err = action.run(&ctx()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.label(), "open menu: waitB");
    let moves: Vec<_> = h
        .input
        .pointer
        .lock()
        .iter()
        .filter_map(|e| match e {
            PointerEvent::Move(p) => Some(*p),
            _ => None,
        })
        .collect();
    let a = Rect::new(0, 0, 100, 40).center_point();
    let c = Rect::new(200, 0, 100, 40).center_point();
    assert_eq!(moves.last(), Some(&a));
    assert!(!moves.contains(&c));
}

#[tokio::test(start_paused = true)]
async fn recorded_histogram_mean_is_saved_as_a_chart() {
    let h = Harness::new();
    let recorder = Recorder::new(h.histograms.clone());
    let source = h.histograms.clone();
    let action = Action::new(move |_ctx| {
        let source = source.clone();
        async move {
            for sample in [50, 60, 70] {
                source.record("X.Smoothness", sample);
            }
            Ok(())
        }
    });

    let histograms = recorder
        .run_and_wait_all(
            &ctx(),
            &action,
            Duration::from_secs(1),
            &["X.Smoothness".to_string()],
        )
        .await
        .unwrap();
    let values = PerfValues::new();
    let mean = store_mean(&values, &histograms[0], &MetricConfig::smoothness("X.Smoothness")).unwrap();
    assert_eq!(mean, 60.0);

    let path = values.save(h.dir.path()).unwrap();
    let chart: Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
    let summary = &chart["X.Smoothness"]["summary"];
    assert_eq!(summary["units"], "percent");
    assert_eq!(summary["improvement_direction"], "up");
    assert_eq!(summary["value"], 60.0);
}

#[tokio::test(start_paused = true)]
async fn descriptor_metrics_end_up_in_the_report() {
    let h = Harness::new();
    h.histograms.script("Ash.Smoothness", &[80, 90]);
    let descriptor = Descriptor::from_yaml(
        r#"
name: overview
steps:
  - name: settle
    op: sleep
    duration: 10ms
metrics:
  histograms:
    - name: Ash.Smoothness
      preset: smoothness
  action:
    - name: pause
      op: sleep
      duration: 50ms
"#,
    )
    .unwrap();

    let report = h.engine.run(&ctx(), &descriptor).await.unwrap();

    assert_eq!(report.outcome, Outcome::Passed, "{:?}", report.error);
    assert_eq!(report.metrics.get("Ash.Smoothness", "summary"), Some(vec![85.0]));
    let file = report.results_file.unwrap();
    assert_eq!(file, h.results_dir().join("overview").join("results-chart.json"));
    assert!(file.exists());
}

const OPEN_LAUNCHER: &str = r#"
name: launcher
resources:
  - kind: keyboard
steps:
  - name: open
    op: open_launcher
  - name: shown
    op: assert_exists
    finder: { role: window, class_name: AppList }
"#;

#[tokio::test(start_paused = true)]
async fn launcher_opens_with_shift_search_in_clamshell() {
    let h = Harness::new();
    let descriptor = Descriptor::from_yaml(OPEN_LAUNCHER).unwrap();

    let report = h.engine.run(&ctx(), &descriptor).await.unwrap();

    assert_eq!(report.outcome, Outcome::Passed, "{:?}", report.error);
    assert_eq!(
        h.input.key_downs(),
        vec![KeyCode::LEFT_SHIFT, KeyCode::LEFT_META]
    );
    assert!(h.tree.has("AppList"));
    assert!(!h.journal.contains("tablet mode true"));
}

#[tokio::test(start_paused = true)]
async fn launcher_opens_with_search_in_tablet_and_mode_is_restored() {
    let h = Harness::new();
    let yaml = OPEN_LAUNCHER.replace(
        "  - kind: keyboard\n",
        "  - kind: keyboard\n  - kind: ui_mode\n    mode: tablet\n",
    );
    let descriptor = Descriptor::from_yaml(&yaml).unwrap();

    let report = h.engine.run(&ctx(), &descriptor).await.unwrap();

    assert_eq!(report.outcome, Outcome::Passed, "{:?}", report.error);
    assert_eq!(h.input.key_downs(), vec![KeyCode::LEFT_META]);
    assert!(h.tree.has("AppList"));
    assert!(!*h.shell.tablet.lock());
    let journal = h.journal.entries();
    let on = journal.iter().position(|e| e == "tablet mode true").unwrap();
    let off = journal.iter().position(|e| e == "tablet mode false").unwrap();
    assert!(on < off);
}

#[tokio::test(start_paused = true)]
async fn cancelled_press_and_hold_releases_the_key() {
    let h = Harness::new();
    let device = h.input.open_keyboard().await.unwrap();
    let drivers = DriverSet::new();
    drivers.set_keyboard(Some(Arc::new(Keyboard::new(
        device,
        KeyboardLayout::default(),
    ))));
    let ui = UiContext::new(Locator::new(h.tree.clone()), drivers.clone());
    let action = ui.accel_press_and_hold("Alt", Duration::from_secs(10));
    let ctx = ExecCtx::background();

    let (result, ()) = tokio::join!(action.run(&ctx), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        ctx.cancel();
    });

    assert_eq!(result.unwrap_err().kind(), ErrorKind::Cancelled);
    assert_eq!(
        *h.input.keys.lock(),
        vec![
            (KeyCode::LEFT_ALT, KeyState::Down),
            (KeyCode::LEFT_ALT, KeyState::Up)
        ]
    );
    assert!(drivers.keyboard().unwrap().held_keys().is_empty());
}
