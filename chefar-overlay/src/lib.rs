//! # ChefAR Overlay Engine
//!
//! Animation placement & lifecycle engine for camera-anchored cooking
//! overlays:
//! - `resolver`: step text + snapshot → typed animation descriptor via an
//!   injected multimodal inference client, with per-step memoization
//! - `vision`: per-frame container detection and 2D→3D localization with
//!   outlier gating and temporal smoothing
//! - `assets`: bounded LRU cache over loaded renderable entities
//! - `overlay`: runtime instance bound to one descriptor
//!   (materialize/scale/place)
//! - `lifecycle`: the coordinating state machine driving resolution,
//!   detection, placement, looping and teardown
//! - `camera` / `scene`: boundary traits for the camera runtime and the
//!   rendering engine

pub mod assets;
pub mod camera;
pub mod lifecycle;
pub mod overlay;
pub mod resolver;
pub mod scene;
pub mod vision;

pub use lifecycle::{LifecycleState, OverlayEngine, OverlayHandle};
