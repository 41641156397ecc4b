//! Typed payloads and upstream wire shapes for the generation pipeline.
//!
//! The queue itself is payload-agnostic; this module is where the opaque
//! job payload becomes a validated, strongly-typed structure. Field names
//! follow the upstream REST API (camelCase where it uses camelCase).

use serde::{Deserialize, Serialize};

fn default_dimension() -> u32 {
    1024
}

fn default_num_images() -> u32 {
    1
}

fn default_strength() -> f64 {
    0.7
}

/// How a reference image steers the generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceMode {
    /// Plain image-to-image with an init strength.
    Basic,
    #[default]
    Character,
    Style,
    Content,
}

impl ReferenceMode {
    /// Upstream preprocessor id for guided reference modes.
    pub fn preprocessor_id(&self) -> u32 {
        match self {
            // Basic mode bypasses preprocessors entirely; the id is only
            // meaningful for the guided modes.
            ReferenceMode::Basic | ReferenceMode::Character => 133,
            ReferenceMode::Style => 134,
            ReferenceMode::Content => 135,
        }
    }
}

/// One prompt's generation parameters, as sent by the caller inside a
/// batch submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(rename = "modelId")]
    pub model_id: String,
    /// Ordinal of the prompt within the caller's bulk sheet (e.g. 1–5000).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_number: Option<i64>,
    /// The prompt as uploaded, before any enhancement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_prompt: Option<String>,
    /// Enhanced wording actually submitted, when the caller enhanced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
    #[serde(default = "default_num_images")]
    pub num_images: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_inference_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<String>,
    #[serde(
        rename = "presetStyle",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub preset_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alchemy: Option<bool>,
    /// Reference image previously uploaded to the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_image_id: Option<String>,
    /// Reference strength in `0.0..=1.0`; only used with `init_image_id`.
    #[serde(default = "default_strength")]
    pub strength: f64,
    #[serde(default)]
    pub reference_mode: ReferenceMode,
}

/// What the batch endpoint enqueues for each prompt: the typed shape of
/// a `generation` job payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationPayload {
    #[serde(rename = "apiKey", default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub prompt_data: GenerationRequest,
    /// Correlation id shared by every job of one batch submission.
    pub batch_id: String,
    /// 1-based position of this prompt within its batch.
    #[serde(default)]
    pub prompt_index: u32,
}

// ── Upstream request bodies ─────────────────────────────────────────────

/// Body of `POST /generations`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateGenerationBody {
    pub prompt: String,
    #[serde(rename = "modelId")]
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    pub width: u32,
    pub height: u32,
    pub num_images: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_inference_steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<String>,
    #[serde(rename = "presetStyle", skip_serializing_if = "Option::is_none")]
    pub preset_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alchemy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_strength: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controlnets: Option<Vec<ControlNet>>,
}

/// One guided-reference entry of a generation request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlNet {
    pub init_image_id: String,
    pub init_image_type: String,
    pub preprocessor_id: u32,
    pub strength_type: String,
    pub weight: f64,
}

// ── Upstream responses ──────────────────────────────────────────────────

/// Upstream status string for a finished generation.
pub const UPSTREAM_COMPLETE: &str = "COMPLETE";
/// Upstream status string for a failed generation.
pub const UPSTREAM_FAILED: &str = "FAILED";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGenerationResponse {
    #[serde(rename = "sdGenerationJob")]
    pub generation_job: SdGenerationJob,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SdGenerationJob {
    #[serde(rename = "generationId")]
    pub generation_id: String,
    #[serde(rename = "apiCreditCost", default)]
    pub api_credit_cost: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationDetails {
    #[serde(rename = "generations_by_pk")]
    pub generation: Option<GenerationInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationInfo {
    pub status: String,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub generated_images: Vec<GeneratedImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedImage {
    #[serde(default)]
    pub id: Option<String>,
    pub url: String,
    #[serde(default)]
    pub seed: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformModelsResponse {
    #[serde(default)]
    pub custom_models: Vec<PlatformModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformModel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub generated_image: Option<ModelPreview>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPreview {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitImageUploadResponse {
    #[serde(rename = "uploadInitImage")]
    pub upload: Option<InitImageUpload>,
}

/// Presigned-post target for an init image: `fields` is a JSON object
/// encoded as a string, exactly as the upstream returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct InitImageUpload {
    pub id: String,
    pub url: String,
    pub fields: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_fills_defaults() {
        let request: GenerationRequest = serde_json::from_value(serde_json::json!({
            "prompt": "a fox in the snow",
            "modelId": "model-1"
        }))
        .unwrap();

        assert_eq!(request.width, 1024);
        assert_eq!(request.height, 1024);
        assert_eq!(request.num_images, 1);
        assert_eq!(request.reference_mode, ReferenceMode::Character);
        assert!((request.strength - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn payload_round_trips_wire_names() {
        let payload = GenerationPayload {
            api_key: Some("k".into()),
            prompt_data: serde_json::from_value(serde_json::json!({
                "prompt": "p",
                "modelId": "m"
            }))
            .unwrap(),
            batch_id: "abc12345".into(),
            prompt_index: 3,
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["apiKey"], "k");
        assert_eq!(value["prompt_data"]["modelId"], "m");
        assert_eq!(value["batch_id"], "abc12345");

        let back: GenerationPayload = serde_json::from_value(value).unwrap();
        assert_eq!(back.prompt_index, 3);
    }

    #[test]
    fn body_omits_unset_fields() {
        let body = CreateGenerationBody {
            prompt: "p".into(),
            model_id: "m".into(),
            negative_prompt: None,
            width: 512,
            height: 512,
            num_images: 1,
            seed: None,
            guidance_scale: None,
            num_inference_steps: None,
            scheduler: None,
            preset_style: None,
            alchemy: None,
            init_image_id: None,
            init_strength: None,
            controlnets: None,
        };

        let value = serde_json::to_value(&body).unwrap();
        let object = value.as_object().unwrap();
        assert!(object.contains_key("modelId"));
        assert!(!object.contains_key("seed"));
        assert!(!object.contains_key("controlnets"));
    }

    #[test]
    fn controlnet_uses_camel_case() {
        let net = ControlNet {
            init_image_id: "img".into(),
            init_image_type: "UPLOADED".into(),
            preprocessor_id: 133,
            strength_type: "High".into(),
            weight: 1.4,
        };
        let value = serde_json::to_value(&net).unwrap();
        assert_eq!(value["initImageId"], "img");
        assert_eq!(value["preprocessorId"], 133);
        assert_eq!(value["strengthType"], "High");
    }

    #[test]
    fn generation_details_tolerates_missing_images() {
        let details: GenerationDetails = serde_json::from_value(serde_json::json!({
            "generations_by_pk": { "status": "PENDING" }
        }))
        .unwrap();
        let info = details.generation.unwrap();
        assert_eq!(info.status, "PENDING");
        assert!(info.generated_images.is_empty());
    }
}
