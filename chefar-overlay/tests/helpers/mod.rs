//! Test helper utilities
//!
//! Fake implementations of every external boundary the engine consumes:
//! inference client, object classifier, camera session and scene renderer.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chefar_common::geometry::{BoundingBox, DetectionSample};
use chefar_common::{Error, Result};
use glam::{Mat4, Vec2, Vec3};
use tokio::sync::{oneshot, Notify};
use uuid::Uuid;

use chefar_overlay::camera::{CameraFrame, CameraIntrinsics, CameraSession, SnapshotImage};
use chefar_overlay::scene::{AnchorId, EntityHandle, SceneRenderer, Tint};
use chefar_overlay::vision::ObjectClassifier;

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// A standard 640x480 frame without a depth channel.
pub fn test_frame(ordinal: u64) -> CameraFrame {
    CameraFrame {
        ordinal,
        width: 640,
        height: 480,
        intrinsics: CameraIntrinsics {
            fx: 500.0,
            fy: 500.0,
            cx: 320.0,
            cy: 240.0,
        },
        camera_to_world: Mat4::IDENTITY,
        depth: None,
    }
}

pub fn detection(label: &str, confidence: f32) -> DetectionSample {
    DetectionSample {
        bounding_box: BoundingBox::new(0.35, 0.35, 0.3, 0.3),
        label: label.to_string(),
        confidence,
    }
}

// ========================================
// Inference client
// ========================================

struct ScriptEntry {
    /// Substring of the prompt (the step text) selecting this entry.
    needle: String,
    /// When set, the call blocks until the gate is released.
    gate: Option<Arc<Notify>>,
    reply: std::result::Result<String, String>,
}

/// Inference fake keyed on the step text embedded in the prompt.
#[derive(Default)]
pub struct FakeInferenceClient {
    entries: Mutex<Vec<ScriptEntry>>,
    calls: AtomicUsize,
    started: Mutex<Vec<String>>,
}

impl FakeInferenceClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_for(&self, needle: &str, reply: &str) {
        self.entries.lock().unwrap().push(ScriptEntry {
            needle: needle.to_string(),
            gate: None,
            reply: Ok(reply.to_string()),
        });
    }

    pub fn gated_reply_for(&self, needle: &str, reply: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.entries.lock().unwrap().push(ScriptEntry {
            needle: needle.to_string(),
            gate: Some(Arc::clone(&gate)),
            reply: Ok(reply.to_string()),
        });
        gate
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Whether a call selecting `needle` has started (possibly gated).
    pub fn call_started(&self, needle: &str) -> bool {
        self.started.lock().unwrap().iter().any(|n| n == needle)
    }
}

#[async_trait]
impl chefar_overlay::resolver::InferenceClient for FakeInferenceClient {
    async fn infer(&self, prompt: &str, _image_png: &[u8]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (needle, gate, reply) = {
            let entries = self.entries.lock().unwrap();
            let entry = entries
                .iter()
                .find(|e| prompt.contains(&e.needle))
                .ok_or_else(|| Error::Inference(format!("no scripted reply matches: {prompt}")))?;
            (entry.needle.clone(), entry.gate.clone(), entry.reply.clone())
        };
        self.started.lock().unwrap().push(needle);
        if let Some(gate) = gate {
            gate.notified().await;
        }
        reply.map_err(Error::Inference)
    }
}

// ========================================
// Object classifier
// ========================================

/// Classifier fake returning whatever the test scripted last.
#[derive(Default)]
pub struct FakeClassifier {
    detections: Arc<Mutex<Vec<DetectionSample>>>,
}

impl FakeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle for re-scripting detections mid-test.
    pub fn control(&self) -> Arc<Mutex<Vec<DetectionSample>>> {
        Arc::clone(&self.detections)
    }
}

impl ObjectClassifier for FakeClassifier {
    fn classify(&self, _frame: &CameraFrame) -> Vec<DetectionSample> {
        self.detections.lock().unwrap().clone()
    }
}

/// Replace the scripted detections.
pub fn set_detections(control: &Arc<Mutex<Vec<DetectionSample>>>, samples: Vec<DetectionSample>) {
    *control.lock().unwrap() = samples;
}

// ========================================
// Camera session
// ========================================

/// Session fake with a scripted raycast result.
pub struct FakeSession {
    pub raycast_hit: Mutex<Option<Vec3>>,
}

impl FakeSession {
    pub fn hitting(position: Vec3) -> Self {
        Self {
            raycast_hit: Mutex::new(Some(position)),
        }
    }
}

impl CameraSession for FakeSession {
    fn capture_snapshot(&self) -> Result<SnapshotImage> {
        Ok(SnapshotImage {
            png: vec![0u8; 16],
        })
    }

    fn raycast(&self, _screen_point: Vec2) -> Option<Vec3> {
        *self.raycast_hit.lock().unwrap()
    }
}

// ========================================
// Scene renderer
// ========================================

#[derive(Default)]
struct RendererState {
    /// Entity handle → asset id (placeholders prefixed `placeholder:`).
    entity_labels: HashMap<EntityHandle, String>,
    /// Live anchors → (entity label, position, scale).
    anchors: HashMap<AnchorId, (String, Vec3, f32)>,
    load_count: usize,
    removed: usize,
    playback_senders: Vec<oneshot::Sender<()>>,
}

/// Renderer fake recording the full placement surface.
#[derive(Default)]
pub struct FakeRenderer {
    state: Mutex<RendererState>,
    pub missing_assets: HashSet<String>,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A renderer where loading any of `asset_ids` fails with AssetMissing.
    pub fn with_missing_assets(asset_ids: &[&str]) -> Self {
        Self {
            missing_assets: asset_ids.iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Labels of currently attached entities.
    pub fn placed_labels(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .anchors
            .values()
            .map(|(label, _, _)| label.clone())
            .collect()
    }

    pub fn anchor_count(&self) -> usize {
        self.state.lock().unwrap().anchors.len()
    }

    pub fn removed_count(&self) -> usize {
        self.state.lock().unwrap().removed
    }

    pub fn load_count(&self) -> usize {
        self.state.lock().unwrap().load_count
    }

    /// Position of the single live anchor.
    pub fn anchor_position(&self) -> Option<Vec3> {
        let state = self.state.lock().unwrap();
        state.anchors.values().next().map(|(_, pos, _)| *pos)
    }

    /// Complete the oldest outstanding playback pass. Returns false when
    /// none is pending.
    pub fn finish_playback(&self) -> bool {
        let sender = {
            let mut state = self.state.lock().unwrap();
            if state.playback_senders.is_empty() {
                None
            } else {
                Some(state.playback_senders.remove(0))
            }
        };
        match sender {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub fn pending_playbacks(&self) -> usize {
        self.state.lock().unwrap().playback_senders.len()
    }
}

impl SceneRenderer for FakeRenderer {
    fn load_entity(&self, asset_id: &str) -> Result<EntityHandle> {
        if self.missing_assets.contains(asset_id) {
            return Err(Error::AssetMissing(asset_id.to_string()));
        }
        let handle = EntityHandle(Uuid::new_v4());
        let mut state = self.state.lock().unwrap();
        state.load_count += 1;
        state.entity_labels.insert(handle, asset_id.to_string());
        Ok(handle)
    }

    fn text_placeholder(&self, label: &str) -> EntityHandle {
        let handle = EntityHandle(Uuid::new_v4());
        self.state
            .lock()
            .unwrap()
            .entity_labels
            .insert(handle, format!("placeholder:{label}"));
        handle
    }

    fn model_extents(&self, _entity: EntityHandle) -> Vec3 {
        Vec3::new(0.5, 0.3, 0.5)
    }

    fn instantiate(&self, template: EntityHandle) -> EntityHandle {
        let handle = EntityHandle(Uuid::new_v4());
        let mut state = self.state.lock().unwrap();
        let label = state
            .entity_labels
            .get(&template)
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        state.entity_labels.insert(handle, label);
        handle
    }

    fn set_tint(&self, _entity: EntityHandle, _tint: Tint) {}

    fn attach(&self, entity: EntityHandle, position: Vec3, scale: f32) -> AnchorId {
        let anchor = AnchorId(Uuid::new_v4());
        let mut state = self.state.lock().unwrap();
        let label = state
            .entity_labels
            .get(&entity)
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        state.anchors.insert(anchor, (label, position, scale));
        anchor
    }

    fn set_anchor_position(&self, anchor: AnchorId, position: Vec3) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.anchors.get_mut(&anchor) {
            entry.1 = position;
        }
    }

    fn animate_translation(
        &self,
        _anchor: AnchorId,
        _from: Vec3,
        _to: Vec3,
        _duration: Duration,
    ) -> oneshot::Receiver<()> {
        // Transitions complete instantly in tests
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(());
        rx
    }

    fn play_animation(&self, _anchor: AnchorId) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.state.lock().unwrap().playback_senders.push(tx);
        rx
    }

    fn remove_anchor(&self, anchor: AnchorId) {
        let mut state = self.state.lock().unwrap();
        if state.anchors.remove(&anchor).is_some() {
            state.removed += 1;
        }
    }
}
