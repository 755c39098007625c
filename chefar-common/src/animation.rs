//! Animation data model
//!
//! The typed vocabulary shared between the parameter resolver, the overlay
//! instances and the lifecycle coordinator: animation types, container
//! labels, flame levels, the partially-populated parameter record, and the
//! immutable descriptor built from a resolved step.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Closed set of cooking-action overlays.
///
/// Wire tags (the strings the inference service is asked to return) follow
/// the original service vocabulary, e.g. `putIntoContainer`, `flame`,
/// `temperature`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnimationType {
    PutIntoContainer,
    Stir,
    PourLiquid,
    Flip,
    Countdown,
    #[serde(rename = "flame")]
    AdjustFlame,
    Sprinkle,
    Cut,
    Peel,
    Torch,
    #[serde(rename = "temperature")]
    TemperatureDisplay,
    BeatEgg,
}

impl AnimationType {
    /// All variants, in prompt-enumeration order.
    pub const ALL: [AnimationType; 12] = [
        AnimationType::PutIntoContainer,
        AnimationType::Stir,
        AnimationType::PourLiquid,
        AnimationType::Flip,
        AnimationType::Countdown,
        AnimationType::AdjustFlame,
        AnimationType::Sprinkle,
        AnimationType::Cut,
        AnimationType::Peel,
        AnimationType::Torch,
        AnimationType::TemperatureDisplay,
        AnimationType::BeatEgg,
    ];

    pub fn wire_tag(&self) -> &'static str {
        match self {
            AnimationType::PutIntoContainer => "putIntoContainer",
            AnimationType::Stir => "stir",
            AnimationType::PourLiquid => "pourLiquid",
            AnimationType::Flip => "flip",
            AnimationType::Countdown => "countdown",
            AnimationType::AdjustFlame => "flame",
            AnimationType::Sprinkle => "sprinkle",
            AnimationType::Cut => "cut",
            AnimationType::Peel => "peel",
            AnimationType::Torch => "torch",
            AnimationType::TemperatureDisplay => "temperature",
            AnimationType::BeatEgg => "beatEgg",
        }
    }

    /// Parse a wire tag. `None` for anything outside the closed set.
    pub fn from_wire(tag: &str) -> Option<AnimationType> {
        AnimationType::ALL.iter().copied().find(|t| t.wire_tag() == tag)
    }

    /// Per-type default overlay scale, applied at descriptor construction.
    pub fn default_scale(&self) -> f32 {
        match self {
            AnimationType::Stir => 0.2,
            AnimationType::Flip => 0.1,
            AnimationType::Cut | AnimationType::Peel => 0.02,
            _ => 0.05,
        }
    }
}

/// Closed set of physical containers the detector is trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Container {
    AirFryer,
    Bowl,
    Microwave,
    Oven,
    Pan,
    Plate,
    RiceCooker,
    SoupPot,
}

impl Container {
    pub const ALL: [Container; 8] = [
        Container::AirFryer,
        Container::Bowl,
        Container::Microwave,
        Container::Oven,
        Container::Pan,
        Container::Plate,
        Container::RiceCooker,
        Container::SoupPot,
    ];

    /// Wire tag; also the label the object-detection model reports.
    pub fn wire_tag(&self) -> &'static str {
        match self {
            Container::AirFryer => "airFryer",
            Container::Bowl => "bowl",
            Container::Microwave => "microwave",
            Container::Oven => "oven",
            Container::Pan => "pan",
            Container::Plate => "plate",
            Container::RiceCooker => "riceCooker",
            Container::SoupPot => "soupPot",
        }
    }

    pub fn from_wire(tag: &str) -> Option<Container> {
        Container::ALL.iter().copied().find(|c| c.wire_tag() == tag)
    }
}

/// Flame intensity for the adjust-flame overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlameLevel {
    Small,
    Medium,
    Large,
}

impl FlameLevel {
    pub fn wire_tag(&self) -> &'static str {
        match self {
            FlameLevel::Small => "small",
            FlameLevel::Medium => "medium",
            FlameLevel::Large => "large",
        }
    }

    pub fn from_wire(tag: &str) -> Option<FlameLevel> {
        match tag {
            "small" => Some(FlameLevel::Small),
            "medium" => Some(FlameLevel::Medium),
            "large" => Some(FlameLevel::Large),
            _ => None,
        }
    }
}

/// Open, partially-populated parameter record for one resolved step.
///
/// Which fields are mandatory depends on the [`AnimationType`]; see
/// [`AnimationParameters::validate_for`]. The coordinate triple, when
/// produced by inference, is constrained to [0,1] per component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationParameters {
    pub ingredient: Option<String>,
    pub color: Option<String>,
    pub coordinate: Option<[f32; 3]>,
    pub time: Option<f32>,
    pub temperature: Option<f32>,
    pub flame_level: Option<FlameLevel>,
    pub container: Option<Container>,
}

impl AnimationParameters {
    /// Reject a parameter set missing a type-required field.
    ///
    /// A missing container alone is allowed: the documented fallback
    /// (container defaults to pan) applies at the placement call site.
    /// Every other missing required field is an error, never defaulted.
    pub fn validate_for(&self, animation_type: AnimationType) -> Result<()> {
        let missing = |field: &str| {
            Err(Error::MalformedResponse(format!(
                "missing required field '{}' for {}",
                field,
                animation_type.wire_tag()
            )))
        };

        match animation_type {
            AnimationType::PutIntoContainer => {
                if self.ingredient.as_deref().map_or(true, str::is_empty) {
                    return missing("ingredient");
                }
            }
            AnimationType::PourLiquid => {
                if self.color.as_deref().map_or(true, str::is_empty) {
                    return missing("color");
                }
            }
            AnimationType::Countdown => {
                if self.time.is_none() {
                    return missing("time");
                }
            }
            AnimationType::TemperatureDisplay => {
                if self.temperature.is_none() {
                    return missing("temperature");
                }
            }
            AnimationType::AdjustFlame => {
                if self.flame_level.is_none() {
                    return missing("flameLevel");
                }
            }
            AnimationType::Torch | AnimationType::Cut | AnimationType::Peel => {
                if self.coordinate.is_none() {
                    return missing("coordinate");
                }
            }
            AnimationType::Stir
            | AnimationType::Flip
            | AnimationType::Sprinkle
            | AnimationType::BeatEgg => {}
        }
        Ok(())
    }

    /// Target container with the documented pan fallback applied.
    pub fn container_or_default(&self) -> Container {
        self.container.unwrap_or(Container::Pan)
    }
}

/// Immutable description of one overlay: what to show and with what data.
///
/// Created once per resolved step and owned by exactly one animation
/// instance thereafter.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationDescriptor {
    pub animation_type: AnimationType,
    pub parameters: AnimationParameters,
    pub scale: f32,
    pub looped: bool,
}

impl AnimationDescriptor {
    /// Build a descriptor from a validated resolver result.
    ///
    /// Fails when the parameter set is missing a type-required field.
    pub fn new(animation_type: AnimationType, parameters: AnimationParameters) -> Result<Self> {
        parameters.validate_for(animation_type)?;
        Ok(Self {
            animation_type,
            parameters,
            scale: animation_type.default_scale(),
            looped: true,
        })
    }

    /// Whether this overlay's placement depends on a live container
    /// detection.
    ///
    /// False for purely coordinate-driven types (cut, peel, torch) and for
    /// any descriptor that already carries an explicit coordinate.
    pub fn requires_live_localization(&self) -> bool {
        if self.parameters.coordinate.is_some() {
            return false;
        }
        !matches!(
            self.animation_type,
            AnimationType::Cut | AnimationType::Peel | AnimationType::Torch
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_tags_round_trip() {
        for t in AnimationType::ALL {
            assert_eq!(AnimationType::from_wire(t.wire_tag()), Some(t));
        }
        for c in Container::ALL {
            assert_eq!(Container::from_wire(c.wire_tag()), Some(c));
        }
        for l in [FlameLevel::Small, FlameLevel::Medium, FlameLevel::Large] {
            assert_eq!(FlameLevel::from_wire(l.wire_tag()), Some(l));
        }
    }

    #[test]
    fn test_unknown_wire_tag_rejected() {
        assert_eq!(AnimationType::from_wire("simmer"), None);
        assert_eq!(Container::from_wire("wok"), None);
        assert_eq!(FlameLevel::from_wire("inferno"), None);
    }

    #[test]
    fn test_serde_tags_match_wire_tags() {
        let json = serde_json::to_string(&AnimationType::AdjustFlame).unwrap();
        assert_eq!(json, "\"flame\"");
        let json = serde_json::to_string(&AnimationType::TemperatureDisplay).unwrap();
        assert_eq!(json, "\"temperature\"");
        let json = serde_json::to_string(&Container::RiceCooker).unwrap();
        assert_eq!(json, "\"riceCooker\"");
    }

    #[test]
    fn test_put_into_container_requires_ingredient() {
        let params = AnimationParameters {
            container: Some(Container::Pan),
            ..Default::default()
        };
        assert!(params.validate_for(AnimationType::PutIntoContainer).is_err());

        let params = AnimationParameters {
            ingredient: Some("egg".to_string()),
            container: Some(Container::Pan),
            ..Default::default()
        };
        assert!(params.validate_for(AnimationType::PutIntoContainer).is_ok());
    }

    #[test]
    fn test_empty_ingredient_is_rejected() {
        let params = AnimationParameters {
            ingredient: Some(String::new()),
            container: Some(Container::Bowl),
            ..Default::default()
        };
        assert!(params.validate_for(AnimationType::PutIntoContainer).is_err());
    }

    #[test]
    fn test_pour_liquid_requires_color() {
        let params = AnimationParameters {
            container: Some(Container::Pan),
            ..Default::default()
        };
        assert!(params.validate_for(AnimationType::PourLiquid).is_err());
    }

    #[test]
    fn test_coordinate_types_require_coordinate() {
        for t in [AnimationType::Cut, AnimationType::Peel, AnimationType::Torch] {
            assert!(AnimationParameters::default().validate_for(t).is_err());
            let params = AnimationParameters {
                coordinate: Some([0.5, 0.5, 0.5]),
                ..Default::default()
            };
            assert!(params.validate_for(t).is_ok());
        }
    }

    #[test]
    fn test_missing_container_falls_back_to_pan() {
        // Container is the one field with a documented call-site fallback.
        let params = AnimationParameters::default();
        assert!(params.validate_for(AnimationType::Stir).is_ok());
        assert_eq!(params.container_or_default(), Container::Pan);
    }

    #[test]
    fn test_descriptor_applies_default_scale() {
        let desc = AnimationDescriptor::new(
            AnimationType::Stir,
            AnimationParameters {
                container: Some(Container::Pan),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(desc.scale, 0.2);
        assert!(desc.looped);
    }

    #[test]
    fn test_requires_live_localization() {
        let container_bound = AnimationDescriptor::new(
            AnimationType::Stir,
            AnimationParameters {
                container: Some(Container::Pan),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(container_bound.requires_live_localization());

        let coordinate_driven = AnimationDescriptor::new(
            AnimationType::Cut,
            AnimationParameters {
                coordinate: Some([0.7, 0.2, 0.9]),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!coordinate_driven.requires_live_localization());

        // A container type that already carries an explicit coordinate
        // does not need live detection either.
        let pinned = AnimationDescriptor::new(
            AnimationType::Sprinkle,
            AnimationParameters {
                container: Some(Container::Plate),
                coordinate: Some([0.4, 0.5, 0.6]),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!pinned.requires_live_localization());
    }
}
