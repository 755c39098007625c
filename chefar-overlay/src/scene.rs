//! Rendering/scene-engine boundary
//!
//! The engine drives the host renderer through this trait: load an asset
//! by identifier, clone/tint/attach an entity, move its anchor, run the
//! drop translation, and play one animation pass. Completion signals are
//! direct oneshot channels scoped to the call, never a shared event bus.
//! Implementations are expected to tolerate `play_animation` being invoked
//! once per loop iteration.

use std::time::Duration;

use chefar_common::Result;
use glam::Vec3;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Opaque handle to a loaded or instantiated renderable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityHandle(pub Uuid);

/// Opaque handle to a world-space anchor holding one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnchorId(pub Uuid);

/// Per-instance color tint, linear RGBA.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tint {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Tint {
    pub const WHITE: Tint = Tint {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };

    pub const fn rgb(r: f32, g: f32, b: f32) -> Tint {
        Tint { r, g, b, a: 1.0 }
    }
}

/// Scene-engine surface the overlay engine calls into.
pub trait SceneRenderer: Send + Sync {
    /// Load the template entity backing `asset_id`. Errors with
    /// `AssetMissing` when the resource cannot be resolved.
    fn load_entity(&self, asset_id: &str) -> Result<EntityHandle>;

    /// Build a generic placeholder entity annotated with `label` as text.
    fn text_placeholder(&self, label: &str) -> EntityHandle;

    /// Axis-aligned extents of an entity's model, in meters at scale 1.0.
    fn model_extents(&self, entity: EntityHandle) -> Vec3;

    /// Clone a template into a per-instance entity. Cached templates are
    /// shared read-only; instances clone before mutating.
    fn instantiate(&self, template: EntityHandle) -> EntityHandle;

    /// Apply a per-instance material tint.
    fn set_tint(&self, entity: EntityHandle, tint: Tint);

    /// Attach an entity under a new world-space anchor.
    fn attach(&self, entity: EntityHandle, position: Vec3, scale: f32) -> AnchorId;

    /// Re-position an existing anchor (called per frame while tracking).
    fn set_anchor_position(&self, anchor: AnchorId, position: Vec3);

    /// Animate the anchor from `from` to `to` over `duration`. The
    /// returned channel fires once when the translation completes.
    fn animate_translation(
        &self,
        anchor: AnchorId,
        from: Vec3,
        to: Vec3,
        duration: Duration,
    ) -> oneshot::Receiver<()>;

    /// Run one pass of the entity's built-in animation. The returned
    /// channel fires when the pass finishes.
    fn play_animation(&self, anchor: AnchorId) -> oneshot::Receiver<()>;

    /// Remove the anchor and its entity from the scene.
    fn remove_anchor(&self, anchor: AnchorId);
}
