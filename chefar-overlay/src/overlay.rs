//! Animation instance
//!
//! One runtime instance per resolved descriptor. The instance knows how to
//! materialize its backing entity through the asset cache (degrading to a
//! text placeholder when the asset cannot load), how to bound its scale by
//! the detected container, and how to attach itself to the scene —
//! including the drop transition for put-into-container overlays.

use std::time::Duration;

use chefar_common::animation::{AnimationDescriptor, AnimationType};
use chefar_common::geometry::BoundingBox;
use chefar_common::{Error, Result};
use glam::Vec3;
use tokio::sync::oneshot;
use tracing::warn;
use uuid::Uuid;

use crate::assets::AssetCache;
use crate::scene::{AnchorId, EntityHandle, SceneRenderer, Tint};

/// Raised start offset for the drop transition, meters above the target.
const DROP_START_RAISE_M: f32 = 0.3;

/// Duration of the drop transition.
const DROP_DURATION: Duration = Duration::from_millis(800);

/// Approximate world width spanned by the full camera view, used to turn a
/// normalized box side into a target size in meters.
const VIEW_SPAN_M: f32 = 0.8;

/// Target max side when no container box is known.
const DEFAULT_TARGET_SIDE_M: f32 = 0.3;

/// The result of attaching an instance to the scene.
pub struct Placement {
    pub anchor: AnchorId,
    /// Fires when the drop transition completes; `None` for types without
    /// a drop semantic.
    pub drop_finished: Option<oneshot::Receiver<()>>,
}

/// Runtime object bound to one immutable [`AnimationDescriptor`].
pub struct OverlayInstance {
    descriptor: AnimationDescriptor,
    step_id: Uuid,
    entity: Option<EntityHandle>,
    anchor: Option<AnchorId>,
    placeholder: bool,
}

impl OverlayInstance {
    pub fn new(descriptor: AnimationDescriptor, step_id: Uuid) -> Self {
        Self {
            descriptor,
            step_id,
            entity: None,
            anchor: None,
            placeholder: false,
        }
    }

    pub fn descriptor(&self) -> &AnimationDescriptor {
        &self.descriptor
    }

    pub fn anchor(&self) -> Option<AnchorId> {
        self.anchor
    }

    /// Whether placement depends on a live container detection.
    pub fn requires_live_localization(&self) -> bool {
        self.descriptor.requires_live_localization()
    }

    /// Whether placement must refuse the view-center fallback anchor.
    ///
    /// Drop overlays land an ingredient inside the container; anchoring
    /// them anywhere but the detected container would be misleading.
    pub fn requires_confirmed_container(&self) -> bool {
        self.descriptor.animation_type == AnimationType::PutIntoContainer
    }

    /// Resource identifier backing this instance's visual, or `None` when
    /// the identifying parameter is absent (placeholder territory).
    pub fn asset_id(&self) -> Option<String> {
        let params = &self.descriptor.parameters;
        match self.descriptor.animation_type {
            AnimationType::PutIntoContainer => params
                .ingredient
                .as_deref()
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            AnimationType::Stir => Some("stir".to_string()),
            AnimationType::PourLiquid => Some("pourLiquid".to_string()),
            AnimationType::Flip => Some("flipPan".to_string()),
            AnimationType::Countdown => Some("countdown".to_string()),
            AnimationType::AdjustFlame => {
                let level = params
                    .flame_level
                    .unwrap_or(chefar_common::animation::FlameLevel::Medium);
                Some(format!("flame_{}", level.wire_tag()))
            }
            AnimationType::Sprinkle => Some("sprinkle".to_string()),
            AnimationType::Cut => Some("cut".to_string()),
            AnimationType::Peel => Some("peel".to_string()),
            AnimationType::Torch => Some("torch".to_string()),
            AnimationType::TemperatureDisplay => Some("temperature".to_string()),
            AnimationType::BeatEgg => Some("beatEgg".to_string()),
        }
    }

    /// Label shown on the placeholder entity when the real asset is
    /// unavailable.
    fn placeholder_label(&self) -> String {
        self.descriptor
            .parameters
            .ingredient
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.descriptor.animation_type.wire_tag().to_string())
    }

    /// Resolve the backing entity: cache hit, load-and-insert, or text
    /// placeholder when the asset is missing. The cached template is
    /// cloned before per-instance mutation (tint).
    pub fn materialize<R: SceneRenderer + ?Sized>(
        &mut self,
        cache: &AssetCache,
        renderer: &R,
    ) -> Result<EntityHandle> {
        let template = match self.asset_id() {
            Some(asset_id) => match cache.get_or_load(&asset_id, renderer) {
                Ok(template) => template,
                Err(Error::AssetMissing(_)) => {
                    warn!(
                        step_id = %self.step_id,
                        asset_id = %asset_id,
                        "Asset unavailable, degrading to placeholder"
                    );
                    self.placeholder = true;
                    renderer.text_placeholder(&self.placeholder_label())
                }
                Err(e) => return Err(e),
            },
            None => {
                warn!(
                    step_id = %self.step_id,
                    animation_type = self.descriptor.animation_type.wire_tag(),
                    "Missing visual parameter, degrading to placeholder"
                );
                self.placeholder = true;
                renderer.text_placeholder(&self.placeholder_label())
            }
        };

        let entity = renderer.instantiate(template);
        if self.descriptor.animation_type == AnimationType::PourLiquid {
            let tint = self
                .descriptor
                .parameters
                .color
                .as_deref()
                .map(tint_from_name)
                .unwrap_or(Tint::WHITE);
            renderer.set_tint(entity, tint);
        }
        self.entity = Some(entity);
        Ok(entity)
    }

    /// Final scale bounded by the detected container.
    ///
    /// `min(requested, target_max_side / model_max_side)`, where the
    /// target side derives from the detected 2D box or a fixed default.
    /// The scaled model can never outgrow the physical container.
    pub fn compute_scale(&self, bounding_box: Option<&BoundingBox>, model_extents: Vec3) -> f32 {
        let target_max_side = bounding_box
            .map(|b| b.max_side() * VIEW_SPAN_M)
            .unwrap_or(DEFAULT_TARGET_SIDE_M);
        let model_max_side = model_extents.max_element().max(f32::EPSILON);
        self.descriptor.scale.min(target_max_side / model_max_side)
    }

    /// Attach the materialized entity at `position`.
    ///
    /// Put-into-container additionally animates a translation from a
    /// raised start down to the final position; its completion is reported
    /// through the returned receiver.
    pub fn place<R: SceneRenderer + ?Sized>(
        &mut self,
        position: Vec3,
        scale: f32,
        renderer: &R,
    ) -> Result<Placement> {
        let entity = self
            .entity
            .ok_or_else(|| Error::Internal("place() before materialize()".to_string()))?;

        if self.descriptor.animation_type == AnimationType::PutIntoContainer {
            let start = position + Vec3::new(0.0, DROP_START_RAISE_M, 0.0);
            let anchor = renderer.attach(entity, start, scale);
            let drop_finished =
                renderer.animate_translation(anchor, start, position, DROP_DURATION);
            self.anchor = Some(anchor);
            return Ok(Placement {
                anchor,
                drop_finished: Some(drop_finished),
            });
        }

        let anchor = renderer.attach(entity, position, scale);
        self.anchor = Some(anchor);
        Ok(Placement {
            anchor,
            drop_finished: None,
        })
    }

    /// Remove the placed entity from the scene, if any.
    pub fn remove<R: SceneRenderer + ?Sized>(&mut self, renderer: &R) {
        if let Some(anchor) = self.anchor.take() {
            renderer.remove_anchor(anchor);
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }
}

/// Map a color name from the inference reply to a tint. Unknown names fall
/// back to white, matching the original's named-color lookup.
pub fn tint_from_name(name: &str) -> Tint {
    match name.trim().to_ascii_lowercase().as_str() {
        "black" => Tint::rgb(0.0, 0.0, 0.0),
        "red" => Tint::rgb(0.86, 0.18, 0.14),
        "green" => Tint::rgb(0.22, 0.66, 0.30),
        "blue" => Tint::rgb(0.18, 0.44, 0.86),
        "yellow" => Tint::rgb(0.95, 0.83, 0.20),
        "orange" => Tint::rgb(0.95, 0.56, 0.15),
        "brown" => Tint::rgb(0.48, 0.32, 0.18),
        "pink" => Tint::rgb(0.94, 0.55, 0.70),
        "purple" => Tint::rgb(0.56, 0.30, 0.72),
        "gray" | "grey" => Tint::rgb(0.5, 0.5, 0.5),
        _ => Tint::WHITE,
    }
}
