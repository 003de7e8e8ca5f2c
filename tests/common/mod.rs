//! In-memory fakes of every session port.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as Base64, Engine as _};
use parking_lot::Mutex;
use serde_json::{json, Value};

use uase::action_locator::{EvalError, Evaluator};
use uase::action_primitives::{
    DriverError, ExecCtx, InputSubsystem, KeyCode, KeyState, KeyboardDevice, MultiTouchDevice,
    PointerDevice, PointerEvent, TouchEvent,
};
use uase::perf_observe::{Histogram, HistogramBucket, HistogramSource, SamplerError};
use uase::uase_core_types::{EngineError, Rect, Rotation, Size};
use uase::{DisplayInfo, EngineConfig, SessionInfo, ShellPort, TelemetryPort};

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake";

/// Shared, ordered record of everything the fakes observed.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.lock().iter().any(|e| e == entry)
    }
}

#[derive(Clone, Debug)]
pub struct FakeNode {
    pub role: String,
    pub class_name: String,
    pub bounds: Rect,
}

/// Accessibility tree answering compiled queries by the class name they ask for.
#[derive(Default)]
pub struct FakeTree {
    nodes: Mutex<Vec<FakeNode>>,
    queries: AtomicUsize,
}

impl FakeTree {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, role: &str, class_name: &str, bounds: Rect) {
        self.nodes.lock().push(FakeNode {
            role: role.to_string(),
            class_name: class_name.to_string(),
            bounds,
        });
    }

    pub fn remove(&self, class_name: &str) {
        self.nodes.lock().retain(|n| n.class_name != class_name);
    }

    pub fn has(&self, class_name: &str) -> bool {
        self.nodes.lock().iter().any(|n| n.class_name == class_name)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn matching(&self, expression: &str) -> Vec<FakeNode> {
        const KEY: &str = "n.className === \"";
        let wanted = expression.find(KEY).and_then(|start| {
            let rest = &expression[start + KEY.len()..];
            rest.find('"').map(|end| rest[..end].to_string())
        });
        self.nodes
            .lock()
            .iter()
            .filter(|n| wanted.as_deref().map_or(true, |w| n.class_name == w))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Evaluator for FakeTree {
    async fn eval(&self, _ctx: &ExecCtx, expression: &str) -> Result<Value, EvalError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let nodes = self.matching(expression);
        if expression.contains("return nodes.length;") {
            return Ok(json!(nodes.len()));
        }
        match nodes.as_slice() {
            [] => Err(EvalError::Exception(
                "failed to find node with properties: fake".to_string(),
            )),
            [node] => {
                if expression.contains("return true;") {
                    return Ok(json!(true));
                }
                let b = node.bounds;
                Ok(json!({
                    "role": node.role,
                    "className": node.class_name,
                    "location": {"left": b.left, "top": b.top, "width": b.width, "height": b.height},
                    "state": {},
                }))
            }
            _ => Err(EvalError::Exception("multiple nodes matched: fake".to_string())),
        }
    }

    async fn call(&self, ctx: &ExecCtx, function: &str, _args: &[Value]) -> Result<Value, EvalError> {
        self.eval(ctx, function).await
    }
}

/// Keyboard that opens the launcher whenever Search is released.
struct FakeKeyboard {
    journal: Journal,
    keys: Arc<Mutex<Vec<(KeyCode, KeyState)>>>,
    tree: Arc<FakeTree>,
}

#[async_trait]
impl KeyboardDevice for FakeKeyboard {
    async fn write_key(&self, code: KeyCode, state: KeyState) -> Result<(), DriverError> {
        self.keys.lock().push((code, state));
        if code == KeyCode::LEFT_META && state == KeyState::Up && !self.tree.has("AppList") {
            self.tree.add("window", "AppList", Rect::new(0, 0, 800, 600));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.journal.push("keyboard closed");
        Ok(())
    }
}

struct FakePointer {
    journal: Journal,
    events: Arc<Mutex<Vec<PointerEvent>>>,
}

#[async_trait]
impl PointerDevice for FakePointer {
    async fn write(&self, event: PointerEvent) -> Result<(), DriverError> {
        self.events.lock().push(event);
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.journal.push("mouse closed");
        Ok(())
    }
}

struct FakeMultiTouch {
    name: &'static str,
    journal: Journal,
    frames: Arc<Mutex<Vec<Vec<TouchEvent>>>>,
}

#[async_trait]
impl MultiTouchDevice for FakeMultiTouch {
    fn range(&self) -> Size {
        Size::new(4096, 4096)
    }

    async fn write_frame(&self, events: &[TouchEvent]) -> Result<(), DriverError> {
        self.frames.lock().push(events.to_vec());
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.journal.push(format!("{} closed", self.name));
        Ok(())
    }
}

pub struct FakeInput {
    pub journal: Journal,
    pub tree: Arc<FakeTree>,
    pub keys: Arc<Mutex<Vec<(KeyCode, KeyState)>>>,
    pub pointer: Arc<Mutex<Vec<PointerEvent>>>,
    pub touch: Arc<Mutex<Vec<Vec<TouchEvent>>>>,
    pub missing_trackpad: bool,
}

impl FakeInput {
    pub fn new(journal: Journal, tree: Arc<FakeTree>) -> Arc<Self> {
        Arc::new(Self {
            journal,
            tree,
            keys: Arc::default(),
            pointer: Arc::default(),
            touch: Arc::default(),
            missing_trackpad: true,
        })
    }

    /// Keys pressed, in order.
    pub fn key_downs(&self) -> Vec<KeyCode> {
        self.keys
            .lock()
            .iter()
            .filter(|(_, state)| *state == KeyState::Down)
            .map(|(code, _)| *code)
            .collect()
    }
}

#[async_trait]
impl InputSubsystem for FakeInput {
    async fn open_keyboard(&self) -> Result<Arc<dyn KeyboardDevice>, DriverError> {
        self.journal.push("keyboard opened");
        Ok(Arc::new(FakeKeyboard {
            journal: self.journal.clone(),
            keys: self.keys.clone(),
            tree: self.tree.clone(),
        }))
    }

    async fn open_mouse(&self) -> Result<Arc<dyn PointerDevice>, DriverError> {
        self.journal.push("mouse opened");
        Ok(Arc::new(FakePointer {
            journal: self.journal.clone(),
            events: self.pointer.clone(),
        }))
    }

    async fn open_touchscreen(&self) -> Result<Arc<dyn MultiTouchDevice>, DriverError> {
        self.journal.push("touchscreen opened");
        Ok(Arc::new(FakeMultiTouch {
            name: "touchscreen",
            journal: self.journal.clone(),
            frames: self.touch.clone(),
        }))
    }

    async fn open_trackpad(&self) -> Result<Arc<dyn MultiTouchDevice>, DriverError> {
        if self.missing_trackpad {
            return Err(DriverError::Open {
                device: "trackpad",
                reason: "no trackpad attached".to_string(),
            });
        }
        Ok(Arc::new(FakeMultiTouch {
            name: "trackpad",
            journal: self.journal.clone(),
            frames: self.touch.clone(),
        }))
    }
}

pub struct FakeShell {
    pub journal: Journal,
    pub info: Mutex<SessionInfo>,
    pub tablet: Mutex<bool>,
    pub display: Mutex<DisplayInfo>,
    pub display_lost: Mutex<bool>,
}

impl FakeShell {
    /// A logged-in clamshell session on one portrait display.
    pub fn new(journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            journal,
            info: Mutex::new(SessionInfo {
                logged_in: true,
                display_count: 1,
                ..SessionInfo::default()
            }),
            tablet: Mutex::new(false),
            display: Mutex::new(DisplayInfo {
                id: "internal".to_string(),
                bounds: Rect::new(0, 0, 1080, 1920),
                rotation: Rotation::R0,
                is_internal: true,
            }),
            display_lost: Mutex::new(false),
        })
    }

    pub fn rotation(&self) -> Rotation {
        self.display.lock().rotation
    }
}

#[async_trait]
impl ShellPort for FakeShell {
    async fn session_info(&self, _ctx: &ExecCtx) -> Result<SessionInfo, EngineError> {
        let mut info = self.info.lock().clone();
        info.tablet_mode = *self.tablet.lock();
        Ok(info)
    }

    async fn tablet_mode(&self, _ctx: &ExecCtx) -> Result<bool, EngineError> {
        Ok(*self.tablet.lock())
    }

    async fn set_tablet_mode(&self, _ctx: &ExecCtx, enabled: bool) -> Result<(), EngineError> {
        self.journal.push(format!("tablet mode {}", enabled));
        *self.tablet.lock() = enabled;
        Ok(())
    }

    async fn primary_display(&self, _ctx: &ExecCtx) -> Result<DisplayInfo, EngineError> {
        if *self.display_lost.lock() {
            return Err(EngineError::driver("display went away"));
        }
        Ok(self.display.lock().clone())
    }

    async fn set_display_rotation(
        &self,
        _ctx: &ExecCtx,
        display_id: &str,
        rotation: Rotation,
    ) -> Result<(), EngineError> {
        self.journal
            .push(format!("rotate {} to {}", display_id, rotation.degrees()));
        let mut display = self.display.lock();
        if display.rotation.is_transposed() != rotation.is_transposed() {
            let b = display.bounds;
            display.bounds = Rect::new(b.left, b.top, b.height, b.width);
        }
        display.rotation = rotation;
        Ok(())
    }

    async fn open_browser(&self, _ctx: &ExecCtx, url: &str) -> Result<String, EngineError> {
        self.journal.push(format!("browser opened {}", url));
        Ok("window-1".to_string())
    }

    async fn close_browser(&self, _ctx: &ExecCtx, window_id: &str) -> Result<(), EngineError> {
        self.journal.push(format!("browser closed {}", window_id));
        Ok(())
    }
}

/// Histogram source backed by plain sample lists.
#[derive(Default)]
pub struct FakeHistograms {
    samples: Mutex<BTreeMap<String, Vec<i64>>>,
    /// Samples that show up right after the next reset of their histogram.
    scripted: Mutex<BTreeMap<String, Vec<i64>>>,
}

impl FakeHistograms {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, name: &str, sample: i64) {
        self.samples
            .lock()
            .entry(name.to_string())
            .or_default()
            .push(sample);
    }

    pub fn script(&self, name: &str, samples: &[i64]) {
        self.scripted
            .lock()
            .insert(name.to_string(), samples.to_vec());
    }
}

fn histogram_of(name: &str, samples: &[i64]) -> Histogram {
    let mut buckets: Vec<HistogramBucket> = Vec::new();
    for &sample in samples {
        match buckets.iter_mut().find(|b| b.min == sample) {
            Some(bucket) => bucket.count += 1,
            None => buckets.push(HistogramBucket {
                min: sample,
                max: sample + 1,
                count: 1,
            }),
        }
    }
    Histogram {
        name: name.to_string(),
        sum: samples.iter().sum(),
        buckets,
    }
}

#[async_trait]
impl HistogramSource for FakeHistograms {
    async fn reset(&self, name: &str) -> Result<(), SamplerError> {
        let scripted = self.scripted.lock().remove(name).unwrap_or_default();
        self.samples.lock().insert(name.to_string(), scripted);
        Ok(())
    }

    async fn snapshot(&self, name: &str) -> Result<Option<Histogram>, SamplerError> {
        Ok(self
            .samples
            .lock()
            .get(name)
            .map(|samples| histogram_of(name, samples)))
    }
}

pub struct FakeTelemetry;

#[async_trait]
impl TelemetryPort for FakeTelemetry {
    async fn screenshot(&self, _ctx: &ExecCtx) -> Result<String, EngineError> {
        Ok(format!("data:image/png;base64,{}", Base64.encode(PNG_BYTES)))
    }

    async fn tree_dump(&self, _ctx: &ExecCtx) -> Result<String, EngineError> {
        Ok("window AppList\n  button Launcher\n".to_string())
    }
}

/// Config writing artifacts and results under `dir`, with short waits.
pub fn test_config(dir: &std::path::Path) -> EngineConfig {
    EngineConfig {
        artifact_dir: dir.join("artifacts"),
        results_dir: dir.join("results"),
        wait_timeout_ms: 2_000,
        ..EngineConfig::default()
    }
}

/// Engine wired to fresh fakes, writing into a temporary directory.
pub struct Harness {
    pub engine: uase::Engine,
    pub journal: Journal,
    pub tree: Arc<FakeTree>,
    pub input: Arc<FakeInput>,
    pub shell: Arc<FakeShell>,
    pub histograms: Arc<FakeHistograms>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = Journal::default();
        let tree = FakeTree::new();
        let input = FakeInput::new(journal.clone(), tree.clone());
        let shell = FakeShell::new(journal.clone());
        let histograms = FakeHistograms::new();
        let engine = uase::Engine::builder()
            .config(test_config(dir.path()))
            .evaluator(tree.clone())
            .input(input.clone())
            .shell(shell.clone())
            .histograms(histograms.clone())
            .telemetry(Arc::new(FakeTelemetry))
            .build()
            .expect("engine");
        Self {
            engine,
            journal,
            tree,
            input,
            shell,
            histograms,
            dir,
        }
    }

    pub fn artifact_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("artifacts")
    }

    pub fn results_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("results")
    }
}
