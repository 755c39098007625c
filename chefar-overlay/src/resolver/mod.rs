//! Parameter resolver
//!
//! Turns a free-text cooking-step description plus a camera snapshot into
//! a typed (animation type, parameters) pair via one multimodal inference
//! call. The reply is free text that usually, but not always, contains a
//! JSON object; sanitation strips code fences and leading prose before a
//! strict decode. Results are memoized per step text so re-submitting the
//! same step never re-hits the network. All failures propagate to the
//! caller; there is no retry here.

mod inference;

pub use inference::{GeminiClient, InferenceClient};

use chefar_common::animation::{AnimationParameters, AnimationType, Container, FlameLevel};
use chefar_common::{Error, Result};
use serde::Deserialize;

use crate::camera::SnapshotImage;

/// A successfully resolved step.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStep {
    pub animation_type: AnimationType,
    pub parameters: AnimationParameters,
}

/// Raw decode target for the inference reply.
#[derive(Debug, Deserialize)]
struct RawStepDecision {
    #[serde(rename = "type")]
    type_tag: String,
    container: Option<String>,
    coordinate: Option<Vec<f32>>,
    ingredient: Option<String>,
    color: Option<String>,
    time: Option<f32>,
    temperature: Option<f32>,
    #[serde(rename = "flameLevel")]
    flame_level: Option<String>,
}

/// Per-step memo of the last resolved result.
#[derive(Debug, Default)]
pub struct StepResolver {
    last_step: Option<String>,
    last_result: Option<ResolvedStep>,
}

impl StepResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memoized result for `step`, if it equals the previously resolved
    /// step text.
    pub fn cached(&self, step: &str) -> Option<ResolvedStep> {
        match (&self.last_step, &self.last_result) {
            (Some(last), Some(result)) if last == step => Some(result.clone()),
            _ => None,
        }
    }

    /// Replace the memo entry with a fresh result.
    pub fn store(&mut self, step: String, result: ResolvedStep) {
        self.last_step = Some(step);
        self.last_result = Some(result);
    }

    /// Resolve `step` against `client`, consulting the memo first.
    pub async fn resolve<C: InferenceClient + ?Sized>(
        &mut self,
        client: &C,
        step: &str,
        snapshot: &SnapshotImage,
    ) -> Result<ResolvedStep> {
        if let Some(cached) = self.cached(step) {
            tracing::debug!(step, "Resolver memo hit");
            return Ok(cached);
        }
        let result = resolve_uncached(client, step, snapshot).await?;
        self.store(step.to_string(), result.clone());
        Ok(result)
    }
}

/// One inference round trip plus reply validation, bypassing the memo.
///
/// Split out from [`StepResolver::resolve`] so the coordinator can run the
/// network call on a spawned task while the memo stays with the single
/// owning context.
pub async fn resolve_uncached<C: InferenceClient + ?Sized>(
    client: &C,
    step: &str,
    snapshot: &SnapshotImage,
) -> Result<ResolvedStep> {
    let prompt = build_prompt(step);
    let reply = client.infer(&prompt, &snapshot.png).await?;
    let resolved = parse_reply(&reply)?;
    tracing::info!(
        step,
        animation_type = resolved.animation_type.wire_tag(),
        "Resolved step"
    );
    Ok(resolved)
}

/// Build the structured prompt enumerating the closed animation and
/// container vocabularies and the per-type required fields.
pub fn build_prompt(step: &str) -> String {
    let choices = AnimationType::ALL
        .iter()
        .map(|t| t.wire_tag())
        .collect::<Vec<_>>()
        .join(", ");
    let container_choices = Container::ALL
        .iter()
        .map(|c| c.wire_tag())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"Given the cooking step "{step}", pick the best matching value from [{choices}] and reply with exactly one JSON object of this shape:
{{
  "type": "<chosen value>",
  "container": "<one of: {container_choices}>",
  "coordinate": [x, y, z] or null,
  "ingredient": "<ingredient name or null>",
  "color": "<color name or null>",
  "time": <minutes or null>,
  "temperature": <degrees or null>,
  "flameLevel": "small/medium/large or null"
}}
Per type, these fields are required:
- putIntoContainer: ingredient, container
- stir: container
- pourLiquid: container, color
- countdown: time, container
- temperature: temperature, container
- flame: container, flameLevel
- sprinkle: container
- torch: coordinate
- cut: coordinate
- peel: coordinate
- flip: container
- beatEgg: container
Coordinate components must be floats between 0 and 1. Analyze the attached camera snapshot when choosing coordinates and the container. Use lowercase English for ingredient names. Return strict JSON only, with all required fields present and no code block markers."#
    )
}

/// Strip Markdown fences and leading prose, leaving a JSON candidate.
///
/// Returns `None` when no `{` exists anywhere in the reply.
pub fn sanitize_reply(raw: &str) -> Option<String> {
    let cleaned = raw
        .trim()
        .replace("```json", "")
        .replace("```", "")
        .replace('`', "");
    let start = cleaned.find('{')?;
    Some(cleaned[start..].to_string())
}

/// Decode and validate an inference reply into a [`ResolvedStep`].
pub fn parse_reply(raw: &str) -> Result<ResolvedStep> {
    let candidate = sanitize_reply(raw)
        .ok_or_else(|| Error::MalformedResponse("no JSON object in reply".to_string()))?;

    let decision: RawStepDecision = serde_json::from_str(&candidate)
        .map_err(|e| Error::MalformedResponse(e.to_string()))?;

    let animation_type = AnimationType::from_wire(&decision.type_tag)
        .ok_or_else(|| Error::UnrecognizedType(decision.type_tag.clone()))?;

    let coordinate = match decision.coordinate {
        None => None,
        Some(values) => {
            if values.len() != 3 {
                return Err(Error::MalformedResponse(format!(
                    "coordinate has {} components, expected 3",
                    values.len()
                )));
            }
            if values.iter().any(|v| !(0.0..=1.0).contains(v)) {
                return Err(Error::MalformedResponse(format!(
                    "coordinate {:?} outside the normalized [0,1] range",
                    values
                )));
            }
            Some([values[0], values[1], values[2]])
        }
    };

    // Unknown container and flame tags degrade to None; the pan/medium
    // fallbacks apply downstream, matching the original's lenient
    // handling of these two fields.
    let container = decision.container.as_deref().and_then(Container::from_wire);
    let flame_level = decision
        .flame_level
        .as_deref()
        .and_then(FlameLevel::from_wire);

    let parameters = AnimationParameters {
        ingredient: decision.ingredient,
        color: decision.color,
        coordinate,
        time: decision.time,
        temperature: decision.temperature,
        flame_level,
        container,
    };

    parameters.validate_for(animation_type)?;

    Ok(ResolvedStep {
        animation_type,
        parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedClient {
        replies: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(replies: Vec<&str>) -> Self {
            let mut replies: Vec<String> = replies.into_iter().map(String::from).collect();
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InferenceClient for ScriptedClient {
        async fn infer(&self, _prompt: &str, _image_png: &[u8]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| Error::Inference("no scripted reply left".to_string()))
        }
    }

    fn snapshot() -> SnapshotImage {
        SnapshotImage { png: vec![0u8; 8] }
    }

    const STIR_REPLY: &str = r#"{"type":"stir","container":"pan","coordinate":null,"ingredient":null,"color":null,"time":null,"temperature":null,"flameLevel":null}"#;

    #[tokio::test]
    async fn test_memoization_skips_second_inference_call() {
        let client = ScriptedClient::new(vec![STIR_REPLY]);
        let mut resolver = StepResolver::new();

        let first = resolver
            .resolve(&client, "stir the pan for two minutes", &snapshot())
            .await
            .unwrap();
        let second = resolver
            .resolve(&client, "stir the pan for two minutes", &snapshot())
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_new_step_replaces_memo_entry() {
        let cut_reply = r#"{"type":"cut","coordinate":[0.7,0.2,0.9]}"#;
        let client = ScriptedClient::new(vec![STIR_REPLY, cut_reply]);
        let mut resolver = StepResolver::new();

        resolver.resolve(&client, "stir the pan", &snapshot()).await.unwrap();
        resolver.resolve(&client, "cut the onion", &snapshot()).await.unwrap();
        assert_eq!(client.call_count(), 2);

        // The memo holds only the most recent step
        assert!(resolver.cached("stir the pan").is_none());
        assert!(resolver.cached("cut the onion").is_some());
    }

    #[test]
    fn test_parse_strips_code_fences_and_prose() {
        let raw = format!("Sure! Here is the JSON you asked for:\n```json\n{STIR_REPLY}\n```\n");
        let resolved = parse_reply(&raw).unwrap();
        assert_eq!(resolved.animation_type, AnimationType::Stir);
        assert_eq!(resolved.parameters.container, Some(Container::Pan));
    }

    #[test]
    fn test_fenced_invalid_json_is_malformed() {
        let err = parse_reply("```json\n{not valid}\n```").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_reply_without_object_is_malformed() {
        let err = parse_reply("I could not decide on an animation.").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let raw = r#"{"type":"simmer","container":"pan"}"#;
        let err = parse_reply(raw).unwrap_err();
        assert!(matches!(err, Error::UnrecognizedType(tag) if tag == "simmer"));
    }

    #[test]
    fn test_unknown_container_degrades_to_none() {
        let raw = r#"{"type":"stir","container":"cauldron"}"#;
        let resolved = parse_reply(raw).unwrap();
        assert_eq!(resolved.parameters.container, None);
        assert_eq!(
            resolved.parameters.container_or_default(),
            Container::Pan
        );
    }

    #[test]
    fn test_coordinate_outside_unit_range_is_malformed() {
        let raw = r#"{"type":"cut","coordinate":[0.7,-0.8,0.95]}"#;
        let err = parse_reply(raw).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_coordinate_wrong_arity_is_malformed() {
        let raw = r#"{"type":"cut","coordinate":[0.7,0.8]}"#;
        let err = parse_reply(raw).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        // pourLiquid without a color must fail, not default
        let raw = r#"{"type":"pourLiquid","container":"pan"}"#;
        assert!(parse_reply(raw).is_err());
    }

    #[test]
    fn test_full_parameter_decode() {
        let raw = r#"{"type":"flame","container":"soupPot","flameLevel":"large","time":null,"temperature":null,"ingredient":null,"color":null,"coordinate":null}"#;
        let resolved = parse_reply(raw).unwrap();
        assert_eq!(resolved.animation_type, AnimationType::AdjustFlame);
        assert_eq!(resolved.parameters.container, Some(Container::SoupPot));
        assert_eq!(resolved.parameters.flame_level, Some(FlameLevel::Large));
    }

    #[test]
    fn test_prompt_enumerates_vocabularies() {
        let prompt = build_prompt("stir the pan");
        for t in AnimationType::ALL {
            assert!(prompt.contains(t.wire_tag()), "missing {}", t.wire_tag());
        }
        for c in Container::ALL {
            assert!(prompt.contains(c.wire_tag()), "missing {}", c.wire_tag());
        }
        assert!(prompt.contains("stir the pan"));
    }

    #[tokio::test]
    async fn test_inference_transport_error_propagates() {
        let client = ScriptedClient::new(vec![]);
        let mut resolver = StepResolver::new();
        let err = resolver
            .resolve(&client, "stir the pan", &snapshot())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
        // Failures are never memoized
        assert!(resolver.cached("stir the pan").is_none());
    }
}
