//! Lifecycle coordinator
//!
//! The state machine orchestrating one overlay at a time: step submission
//! → cancellable parameter resolution → continuous localization (when the
//! descriptor needs it) → instance creation and placement → playback
//! looping → teardown on detection loss, step change or shutdown.
//!
//! # Runtime shape
//!
//! The engine runs as a single worker task owning all mutable state, fed
//! by a command channel plus a bounded frame channel. The frame-delivery
//! thread only ever calls [`OverlayHandle::push_frame`], which drops the
//! frame instead of blocking when the worker is behind. Inference runs on
//! a spawned task; its result re-enters the worker as a command carrying
//! the step generation it belongs to, and anything stale is discarded.
//! Each step gets a fresh `CancellationToken`, invalidated the moment the
//! next step arrives.

use std::sync::Arc;

use chefar_common::animation::{AnimationDescriptor, AnimationType, Container};
use chefar_common::config::EngineConfig;
use chefar_common::events::{EventBus, OverlayEvent, TeardownReason};
use chefar_common::geometry::BoundingBox;
use chefar_common::Result;
use chrono::Utc;
use glam::Vec3;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assets::AssetCache;
use crate::camera::{CameraFrame, CameraSession};
use crate::overlay::OverlayInstance;
use crate::resolver::{resolve_uncached, InferenceClient, ResolvedStep, StepResolver};
use crate::scene::SceneRenderer;
use crate::vision::{ContainerDetector, ContainerLocalizer, ObjectClassifier};

/// Frames buffered for the worker; overflow drops the frame.
const FRAME_CHANNEL_CAPACITY: usize = 2;

/// Consecutive detection misses before a non-drop overlay accepts the
/// view-center fallback anchor.
const FALLBACK_AFTER_MISSES: u32 = 45;

/// Event bus buffer size.
const EVENT_BUS_CAPACITY: usize = 64;

/// Sub-state of an active overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivePhase {
    Playing,
    /// Playback finished and the loop is being restarted.
    BetweenLoops,
}

/// Coordinator state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    ResolvingParameters,
    AwaitingDetection,
    Active(ActivePhase),
    TornDown,
}

enum Command {
    SubmitStep(String),
    Resolved {
        generation: u64,
        step_text: String,
        result: Result<ResolvedStep>,
    },
    DropFinished {
        generation: u64,
    },
    PlaybackFinished {
        generation: u64,
    },
    Shutdown,
}

/// Detection/placement state for the one live overlay.
struct ActiveOverlay {
    instance: OverlayInstance,
    target: Container,
    bounding_box: Option<BoundingBox>,
    /// Set by any confident detection, cleared at each playback start;
    /// playback finishing with this clear means detection was lost for a
    /// full cycle.
    saw_detection_this_cycle: bool,
    consecutive_misses: u32,
}

/// Cloneable front door to the engine worker.
#[derive(Clone)]
pub struct OverlayHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    frame_tx: mpsc::Sender<CameraFrame>,
    events: EventBus,
}

impl OverlayHandle {
    /// Submit a new cooking step, superseding any in-flight step.
    pub fn submit_step(&self, text: impl Into<String>) {
        let _ = self.cmd_tx.send(Command::SubmitStep(text.into()));
    }

    /// Hand a frame to the worker without blocking. Returns false when
    /// the worker was behind and the frame was dropped.
    pub fn push_frame(&self, frame: CameraFrame) -> bool {
        self.frame_tx.try_send(frame).is_ok()
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<OverlayEvent> {
        self.events.subscribe()
    }

    /// Tear down the active overlay and stop the worker.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
    }
}

/// The engine worker. Constructed and started via [`OverlayEngine::spawn`].
pub struct OverlayEngine<R, M, S>
where
    R: SceneRenderer + 'static,
    M: ObjectClassifier + 'static,
    S: CameraSession + 'static,
{
    renderer: Arc<R>,
    session: Arc<S>,
    inference: Arc<dyn InferenceClient>,
    detector: ContainerDetector<M>,
    localizer: ContainerLocalizer,
    resolver: StepResolver,
    cache: AssetCache,
    events: EventBus,
    state: LifecycleState,
    /// Monotonic step generation; results carrying an older generation
    /// are stale and discarded.
    generation: u64,
    cancel: CancellationToken,
    step_id: Uuid,
    active: Option<ActiveOverlay>,
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl<R, M, S> OverlayEngine<R, M, S>
where
    R: SceneRenderer + 'static,
    M: ObjectClassifier + 'static,
    S: CameraSession + 'static,
{
    /// Start the engine worker and return its handle.
    pub fn spawn(
        config: EngineConfig,
        renderer: Arc<R>,
        classifier: M,
        session: Arc<S>,
        inference: Arc<dyn InferenceClient>,
    ) -> (OverlayHandle, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let events = EventBus::new(EVENT_BUS_CAPACITY);

        let engine = Self {
            renderer,
            session,
            inference,
            detector: ContainerDetector::new(classifier, config.detection.confidence_threshold),
            localizer: ContainerLocalizer::new(&config.detection),
            resolver: StepResolver::new(),
            cache: AssetCache::new(config.assets.cache_capacity),
            events: events.clone(),
            state: LifecycleState::Idle,
            generation: 0,
            cancel: CancellationToken::new(),
            step_id: Uuid::nil(),
            active: None,
            cmd_tx: cmd_tx.clone(),
        };

        let handle = OverlayHandle {
            cmd_tx,
            frame_tx,
            events,
        };
        let join = tokio::spawn(engine.run(cmd_rx, frame_rx));
        (handle, join)
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut frame_rx: mpsc::Receiver<CameraFrame>,
    ) {
        info!("Overlay engine started");
        loop {
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if !self.handle_command(cmd) {
                                break;
                            }
                        }
                        // The engine holds its own sender, so this only
                        // happens on runtime teardown.
                        None => break,
                    }
                }
                frame = frame_rx.recv() => {
                    match frame {
                        Some(frame) => self.handle_frame(frame),
                        None => {
                            // Every handle is gone; shut the worker down.
                            self.teardown(TeardownReason::Shutdown);
                            self.state = LifecycleState::TornDown;
                            break;
                        }
                    }
                }
            }
        }
        info!("Overlay engine stopped");
    }

    /// Returns false when the worker should stop.
    fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::SubmitStep(text) => self.handle_submit(text),
            Command::Resolved {
                generation,
                step_text,
                result,
            } => self.handle_resolved(generation, step_text, result),
            Command::DropFinished { generation } => {
                if generation == self.generation {
                    self.handle_drop_finished();
                } else {
                    debug!("Discarding drop completion from a superseded step");
                }
            }
            Command::PlaybackFinished { generation } => {
                if generation == self.generation {
                    self.handle_playback_finished();
                } else {
                    debug!("Discarding playback completion from a superseded step");
                }
            }
            Command::Shutdown => {
                self.teardown(TeardownReason::Shutdown);
                self.state = LifecycleState::TornDown;
                return false;
            }
        }
        true
    }

    fn handle_submit(&mut self, text: String) {
        if text.trim().is_empty() {
            warn!("Ignoring empty step text");
            return;
        }

        // Supersede whatever is in flight before anything else.
        self.teardown(TeardownReason::StepReplaced);
        self.generation += 1;
        self.cancel = CancellationToken::new();
        self.step_id = Uuid::new_v4();
        self.state = LifecycleState::ResolvingParameters;

        info!(step_id = %self.step_id, step = %text, "Step submitted");
        self.events.emit(OverlayEvent::StepSubmitted {
            step_id: self.step_id,
            text: text.clone(),
            timestamp: Utc::now(),
        });

        if let Some(cached) = self.resolver.cached(&text) {
            debug!(step_id = %self.step_id, "Resolver memo hit, skipping inference");
            self.apply_resolved(cached, true);
            return;
        }

        let snapshot = match self.session.capture_snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Snapshot capture failed, dropping step");
                self.fail_step(e.to_string());
                return;
            }
        };

        let client = Arc::clone(&self.inference);
        let token = self.cancel.clone();
        let generation = self.generation;
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => {
                    debug!("Resolution cancelled mid-flight");
                    return;
                }
                result = resolve_uncached(client.as_ref(), &text, &snapshot) => result,
            };
            // Re-check before committing: the step may have been
            // superseded while the reply was in flight.
            if token.is_cancelled() {
                debug!("Discarding resolution result for a superseded step");
                return;
            }
            let _ = cmd_tx.send(Command::Resolved {
                generation,
                step_text: text,
                result,
            });
        });
    }

    fn handle_resolved(&mut self, generation: u64, step_text: String, result: Result<ResolvedStep>) {
        if generation != self.generation {
            debug!("Discarding stale resolution result");
            return;
        }
        match result {
            Ok(resolved) => {
                self.resolver.store(step_text, resolved.clone());
                self.apply_resolved(resolved, false);
            }
            Err(e) => {
                warn!(step_id = %self.step_id, error = %e, "Step resolution failed, dropping step");
                self.fail_step(e.to_string());
            }
        }
    }

    fn apply_resolved(&mut self, resolved: ResolvedStep, from_cache: bool) {
        let descriptor =
            match AnimationDescriptor::new(resolved.animation_type, resolved.parameters) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!(step_id = %self.step_id, error = %e, "Descriptor construction failed");
                    self.fail_step(e.to_string());
                    return;
                }
            };

        self.events.emit(OverlayEvent::StepResolved {
            step_id: self.step_id,
            animation_type: descriptor.animation_type,
            from_cache,
            timestamp: Utc::now(),
        });

        let target = descriptor.parameters.container_or_default();
        let coordinate = descriptor.parameters.coordinate;
        let instance = OverlayInstance::new(descriptor, self.step_id);
        let requires_localization = instance.requires_live_localization();
        self.active = Some(ActiveOverlay {
            instance,
            target,
            bounding_box: None,
            saw_detection_this_cycle: false,
            consecutive_misses: 0,
        });

        if requires_localization {
            self.state = LifecycleState::AwaitingDetection;
            debug!(step_id = %self.step_id, target = target.wire_tag(), "Awaiting container detection");
        } else {
            // Coordinate-driven overlays place immediately, using the
            // resolved triple as a world-space position.
            let position = coordinate.map(Vec3::from).unwrap_or(Vec3::ZERO);
            self.place_active(position, false);
        }
    }

    /// Drop the current step: nothing is shown, the coordinator goes Idle.
    fn fail_step(&mut self, reason: String) {
        self.events.emit(OverlayEvent::ResolutionFailed {
            step_id: self.step_id,
            reason,
            timestamp: Utc::now(),
        });
        self.active = None;
        self.state = LifecycleState::Idle;
    }

    fn handle_frame(&mut self, frame: CameraFrame) {
        match self.state {
            LifecycleState::AwaitingDetection => self.drive_detection(frame),
            LifecycleState::Active(_) => self.track_container(frame),
            _ => {}
        }
    }

    /// Per-frame work while waiting for the first confident position.
    fn drive_detection(&mut self, frame: CameraFrame) {
        let Some(target) = self.active.as_ref().map(|a| a.target) else {
            return;
        };

        match self.detector.detect(&frame, target) {
            Some(sample) => {
                if let Some(active) = self.active.as_mut() {
                    active.bounding_box = Some(sample.bounding_box);
                    active.consecutive_misses = 0;
                }
                let fix =
                    self.localizer
                        .localize(Some(&sample), &frame, self.session.as_ref());
                if let Some(fix) = fix {
                    self.events.emit(OverlayEvent::DetectionConfirmed {
                        step_id: self.step_id,
                        label: sample.label.clone(),
                        confidence: sample.confidence,
                        timestamp: Utc::now(),
                    });
                    self.place_active(fix.position, false);
                }
                // No fix this frame (depth hole / zero raycast hits):
                // retry on the next frame.
            }
            None => {
                let misses = match self.active.as_mut() {
                    Some(active) => {
                        active.consecutive_misses += 1;
                        active.consecutive_misses
                    }
                    None => return,
                };
                let refuses_fallback = self
                    .active
                    .as_ref()
                    .map(|a| a.instance.requires_confirmed_container())
                    .unwrap_or(true);
                if misses >= FALLBACK_AFTER_MISSES && !refuses_fallback {
                    if let Some(fix) =
                        self.localizer.localize(None, &frame, self.session.as_ref())
                    {
                        warn!(
                            step_id = %self.step_id,
                            misses,
                            "No container detected, anchoring to view center"
                        );
                        self.place_active(fix.position, true);
                    }
                }
            }
        }
    }

    /// Per-frame work while the overlay is placed: keep feeding smoothed
    /// positions into the anchor so the overlay tracks a moving container.
    fn track_container(&mut self, frame: CameraFrame) {
        let (target, tracks) = match self.active.as_ref() {
            Some(active) => (active.target, active.instance.requires_live_localization()),
            None => return,
        };
        if !tracks {
            return;
        }

        let Some(sample) = self.detector.detect(&frame, target) else {
            // Miss: the anchor keeps its last smoothed position.
            return;
        };
        if let Some(active) = self.active.as_mut() {
            active.saw_detection_this_cycle = true;
            active.bounding_box = Some(sample.bounding_box);
        }
        if let Some(fix) = self
            .localizer
            .localize(Some(&sample), &frame, self.session.as_ref())
        {
            if let Some(anchor) = self.active.as_ref().and_then(|a| a.instance.anchor()) {
                self.renderer.set_anchor_position(anchor, fix.position);
            }
        }
    }

    /// Materialize and attach the active instance at `position`.
    fn place_active(&mut self, position: Vec3, fallback_anchor: bool) {
        let renderer = Arc::clone(&self.renderer);

        let outcome = match self.active.as_mut() {
            Some(active) => {
                Self::materialize_and_place(active, &self.cache, renderer.as_ref(), position)
            }
            None => return,
        };

        match outcome {
            Ok((animation_type, drop_finished)) => {
                info!(
                    step_id = %self.step_id,
                    animation_type = animation_type.wire_tag(),
                    fallback_anchor,
                    "Overlay placed"
                );
                self.events.emit(OverlayEvent::OverlayPlaced {
                    step_id: self.step_id,
                    animation_type,
                    fallback_anchor,
                    timestamp: Utc::now(),
                });
                match drop_finished {
                    Some(rx) => {
                        let cmd_tx = self.cmd_tx.clone();
                        let generation = self.generation;
                        tokio::spawn(async move {
                            if rx.await.is_ok() {
                                let _ = cmd_tx.send(Command::DropFinished { generation });
                            }
                        });
                        // The drop transition counts as the first playing
                        // phase; looping starts once it lands.
                        self.state = LifecycleState::Active(ActivePhase::Playing);
                    }
                    None => self.start_playback(),
                }
            }
            Err(e) => {
                warn!(step_id = %self.step_id, error = %e, "Placement failed, dropping step");
                self.active = None;
                self.state = LifecycleState::Idle;
            }
        }
    }

    fn materialize_and_place(
        active: &mut ActiveOverlay,
        cache: &AssetCache,
        renderer: &R,
        position: Vec3,
    ) -> Result<(AnimationType, Option<oneshot::Receiver<()>>)> {
        let entity = active.instance.materialize(cache, renderer)?;
        let extents = renderer.model_extents(entity);
        let scale = active
            .instance
            .compute_scale(active.bounding_box.as_ref(), extents);
        let placement = active.instance.place(position, scale, renderer)?;
        Ok((
            active.instance.descriptor().animation_type,
            placement.drop_finished,
        ))
    }

    /// Run one playback pass; its completion re-enters as a command.
    fn start_playback(&mut self) {
        let anchor = match self.active.as_mut() {
            Some(active) => {
                active.saw_detection_this_cycle = false;
                match active.instance.anchor() {
                    Some(anchor) => anchor,
                    None => return,
                }
            }
            None => return,
        };

        let rx = self.renderer.play_animation(anchor);
        let cmd_tx = self.cmd_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            // A dropped sender means the renderer abandoned the pass;
            // treat it as finished and let the coordinator decide.
            let _ = rx.await;
            let _ = cmd_tx.send(Command::PlaybackFinished { generation });
        });
        self.state = LifecycleState::Active(ActivePhase::Playing);
    }

    fn handle_drop_finished(&mut self) {
        if matches!(self.state, LifecycleState::Active(_)) && self.active.is_some() {
            debug!(step_id = %self.step_id, "Drop transition landed");
            self.start_playback();
        }
    }

    fn handle_playback_finished(&mut self) {
        if !matches!(self.state, LifecycleState::Active(_)) {
            return;
        }
        let (tracks, detection_live) = match self.active.as_ref() {
            Some(active) => (
                active.instance.requires_live_localization(),
                active.saw_detection_this_cycle,
            ),
            None => return,
        };

        if !tracks || detection_live {
            self.state = LifecycleState::Active(ActivePhase::BetweenLoops);
            self.events.emit(OverlayEvent::PlaybackLooped {
                step_id: self.step_id,
                timestamp: Utc::now(),
            });
            self.start_playback();
        } else {
            info!(step_id = %self.step_id, "Detection lost for a full cycle, tearing down");
            self.teardown(TeardownReason::DetectionLost);
            self.state = LifecycleState::TornDown;
        }
    }

    /// Cancel in-flight work, clear detection state and remove any placed
    /// entity.
    fn teardown(&mut self, reason: TeardownReason) {
        self.cancel.cancel();
        if let Some(mut active) = self.active.take() {
            // Only an overlay that actually reached the scene reports a
            // teardown; dropping a step that was still resolving or
            // awaiting detection is silent.
            let was_placed = active.instance.anchor().is_some();
            active.instance.remove(self.renderer.as_ref());
            if was_placed {
                self.events.emit(OverlayEvent::OverlayTornDown {
                    step_id: self.step_id,
                    reason,
                    timestamp: Utc::now(),
                });
            }
        }
        self.localizer.reset();
    }
}
