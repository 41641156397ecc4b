//! The generation job handler: submit, poll, download, persist.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use serde_json::json;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::GenerationConfig;
use crate::error::{GenerationError, QueueError};
use crate::generation::client::GenerationClient;
use crate::generation::types::{
    ControlNet, CreateGenerationBody, GenerationInfo, GenerationPayload, GenerationRequest,
    ReferenceMode, UPSTREAM_COMPLETE, UPSTREAM_FAILED,
};
use crate::queue::{Job, JobHandler};
use crate::storage::ImageStore;
use crate::store::{GenerationRecord, GenerationStore};

/// Handles the full lifecycle of a single generation job:
/// submit to the upstream API, poll for completion, download the result
/// images, and record each one in the generation store.
pub struct GenerationProcessor {
    config: GenerationConfig,
    images: Arc<ImageStore>,
    store: Arc<dyn GenerationStore>,
}

impl GenerationProcessor {
    pub fn new(
        config: GenerationConfig,
        images: Arc<ImageStore>,
        store: Arc<dyn GenerationStore>,
    ) -> Self {
        Self {
            config,
            images,
            store,
        }
    }

    /// Build a client for this job. The payload's key wins over the
    /// configured default; jobs without either fail before any request.
    fn client_for(&self, payload: &GenerationPayload) -> Result<GenerationClient, GenerationError> {
        let api_key = payload
            .api_key
            .clone()
            .map(SecretString::from)
            .or_else(|| self.config.api_key.clone())
            .ok_or(GenerationError::MissingApiKey)?;
        GenerationClient::new(api_key, &self.config.base_url)
    }

    async fn poll_until_complete(
        &self,
        client: &GenerationClient,
        generation_id: &str,
    ) -> Result<GenerationInfo, GenerationError> {
        for attempt in 1..=self.config.poll_max_attempts {
            tokio::time::sleep(self.config.poll_interval).await;

            let info = client.get_generation(generation_id).await?;
            match info.status.as_str() {
                UPSTREAM_COMPLETE => return Ok(info),
                UPSTREAM_FAILED => {
                    return Err(GenerationError::UpstreamFailed {
                        id: generation_id.to_string(),
                    });
                }
                _ => debug!(%generation_id, attempt, "Generation still pending"),
            }
        }

        Err(GenerationError::PollTimeout {
            id: generation_id.to_string(),
            attempts: self.config.poll_max_attempts,
        })
    }
}

#[async_trait]
impl JobHandler for GenerationProcessor {
    async fn handle(&self, job: &Job) -> anyhow::Result<serde_json::Value> {
        let payload: GenerationPayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| QueueError::InvalidPayload(e.to_string()))?;
        let request = &payload.prompt_data;

        info!(
            job_id = %job.id,
            batch_id = %payload.batch_id,
            model = %request.model_id,
            "Processing generation job"
        );

        let client = self.client_for(&payload)?;

        let created = client.create_generation(&build_body(request)).await?;
        let generation_id = created.generation_job.generation_id;
        info!(job_id = %job.id, %generation_id, "Generation submitted");

        let info = self.poll_until_complete(&client, &generation_id).await?;

        let mut saved = Vec::new();
        for (index, image) in info.generated_images.iter().enumerate() {
            let path = self
                .images
                .save_image(&image.url, &payload.batch_id, payload.prompt_index, index + 1)
                .await?;
            let local_path = path.display().to_string();

            let record = GenerationRecord {
                id: Uuid::new_v4().to_string(),
                generation_id: generation_id.clone(),
                batch_id: payload.batch_id.clone(),
                prompt: request.prompt.clone(),
                prompt_number: request.prompt_number,
                original_prompt: request.original_prompt.clone(),
                enhanced_prompt: request.enhanced_prompt.clone(),
                model_id: request.model_id.clone(),
                width: request.width,
                height: request.height,
                // Generation-level seed wins, then image-level, then the
                // seed the caller asked for.
                seed: info.seed.or(image.seed).or(request.seed),
                image_url: image.url.clone(),
                local_path: local_path.clone(),
                status: UPSTREAM_COMPLETE.to_string(),
                guidance_scale: request.guidance_scale,
                num_steps: request.num_inference_steps,
                preset_style: request.preset_style.clone(),
                tag: None,
                created_at: Utc::now(),
            };
            // A gallery-record failure should not undo a finished
            // generation; the image is already on disk.
            if let Err(e) = self.store.insert_generation(&record).await {
                error!(job_id = %job.id, error = %e, "Failed to record generation");
            }

            saved.push(local_path);
        }

        Ok(json!({
            "generationId": generation_id,
            "images": saved,
            "seed": info.seed,
        }))
    }
}

/// Map reference strength to the upstream's coarse strength bands.
fn strength_band(strength: f64) -> &'static str {
    if strength >= 0.7 {
        "High"
    } else if strength >= 0.4 {
        "Mid"
    } else {
        "Low"
    }
}

/// Translate a caller request into the upstream request body, including
/// the reference-image mapping: basic mode rides the init-image fields,
/// guided modes become a controlnet entry.
fn build_body(request: &GenerationRequest) -> CreateGenerationBody {
    let mut body = CreateGenerationBody {
        prompt: request.prompt.clone(),
        model_id: request.model_id.clone(),
        negative_prompt: request.negative_prompt.clone(),
        width: request.width,
        height: request.height,
        num_images: request.num_images,
        seed: request.seed,
        guidance_scale: request.guidance_scale,
        num_inference_steps: request.num_inference_steps,
        scheduler: request.scheduler.clone(),
        preset_style: request.preset_style.clone(),
        alchemy: request.alchemy,
        init_image_id: None,
        init_strength: None,
        controlnets: None,
    };

    if let Some(init_image_id) = &request.init_image_id {
        match request.reference_mode {
            ReferenceMode::Basic => {
                body.init_image_id = Some(init_image_id.clone());
                body.init_strength = Some(request.strength);
            }
            mode => {
                body.controlnets = Some(vec![ControlNet {
                    init_image_id: init_image_id.clone(),
                    init_image_type: "UPLOADED".to_string(),
                    preprocessor_id: mode.preprocessor_id(),
                    strength_type: strength_band(request.strength).to_string(),
                    weight: (request.strength * 2.0).min(2.0),
                }]);
            }
        }
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DatabaseError;

    fn request_with(value: serde_json::Value) -> GenerationRequest {
        let mut base = serde_json::json!({
            "prompt": "a fox in the snow",
            "modelId": "model-1"
        });
        base.as_object_mut()
            .unwrap()
            .extend(value.as_object().unwrap().clone());
        serde_json::from_value(base).unwrap()
    }

    struct NullStore;

    #[async_trait]
    impl GenerationStore for NullStore {
        async fn insert_generation(&self, _record: &GenerationRecord) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn list_recent(
            &self,
            _tag: Option<&str>,
            _limit: u32,
            _offset: u32,
        ) -> Result<Vec<GenerationRecord>, DatabaseError> {
            Ok(Vec::new())
        }
        async fn list_by_batch(
            &self,
            _batch_id: &str,
        ) -> Result<Vec<GenerationRecord>, DatabaseError> {
            Ok(Vec::new())
        }
        async fn update_tag(&self, _id: &str, _tag: &str) -> Result<bool, DatabaseError> {
            Ok(false)
        }
    }

    fn processor() -> (GenerationProcessor, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let processor = GenerationProcessor::new(
            GenerationConfig::default(),
            Arc::new(ImageStore::new(dir.path())),
            Arc::new(NullStore),
        );
        (processor, dir)
    }

    #[test]
    fn basic_reference_uses_init_image_fields() {
        let request = request_with(serde_json::json!({
            "init_image_id": "img-1",
            "strength": 0.55,
            "reference_mode": "basic"
        }));
        let body = build_body(&request);
        assert_eq!(body.init_image_id.as_deref(), Some("img-1"));
        assert_eq!(body.init_strength, Some(0.55));
        assert!(body.controlnets.is_none());
    }

    #[test]
    fn guided_reference_becomes_a_controlnet() {
        let request = request_with(serde_json::json!({
            "init_image_id": "img-1",
            "reference_mode": "style"
        }));
        let body = build_body(&request);
        let nets = body.controlnets.expect("controlnet expected");
        assert_eq!(nets.len(), 1);
        assert_eq!(nets[0].preprocessor_id, 134);
        assert_eq!(nets[0].strength_type, "High");
        assert!((nets[0].weight - 1.4).abs() < 1e-9);
        assert!(body.init_image_id.is_none());
    }

    #[test]
    fn strength_bands_match_upstream_thresholds() {
        assert_eq!(strength_band(0.9), "High");
        assert_eq!(strength_band(0.7), "High");
        assert_eq!(strength_band(0.5), "Mid");
        assert_eq!(strength_band(0.2), "Low");
    }

    #[test]
    fn no_reference_leaves_both_paths_empty() {
        let request = request_with(serde_json::json!({}));
        let body = build_body(&request);
        assert!(body.init_image_id.is_none());
        assert!(body.controlnets.is_none());
    }

    #[tokio::test]
    async fn malformed_payload_fails_before_any_request() {
        let (processor, _dir) = processor();
        let job = Job::new("generation", serde_json::json!({ "not": "a payload" }));
        let err = processor.handle(&job).await.unwrap_err();
        assert!(err.to_string().contains("Invalid job payload"));
    }

    #[tokio::test]
    async fn missing_api_key_is_reported() {
        let (processor, _dir) = processor();
        let job = Job::new(
            "generation",
            serde_json::json!({
                "prompt_data": { "prompt": "p", "modelId": "m" },
                "batch_id": "b1"
            }),
        );
        let err = processor.handle(&job).await.unwrap_err();
        assert!(err.to_string().contains("No API key"));
    }
}
