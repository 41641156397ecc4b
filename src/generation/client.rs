//! REST client for the upstream generation API.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::GenerationError;
use crate::generation::types::{
    CreateGenerationBody, CreateGenerationResponse, GenerationDetails, GenerationInfo,
    InitImageUploadResponse, PlatformModel, PlatformModelsResponse,
};

/// Request timeout for JSON endpoints.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Request timeout for the image upload leg.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Thin client over the upstream REST API. Cheap to construct; jobs can
/// carry their own API key, so the processor builds one per job.
pub struct GenerationClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl GenerationClient {
    pub fn new(
        api_key: SecretString,
        base_url: impl Into<String>,
    ) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, GenerationError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, endpoint))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, GenerationError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, endpoint))
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Turn a non-2xx response into an `Api` error carrying the upstream
    /// body text, otherwise deserialize the JSON body.
    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GenerationError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    /// Submit a generation request. Returns the upstream generation id.
    pub async fn create_generation(
        &self,
        body: &CreateGenerationBody,
    ) -> Result<CreateGenerationResponse, GenerationError> {
        debug!(model = %body.model_id, "Submitting generation");
        self.post_json("/generations", body).await
    }

    /// Fetch the current state of a generation.
    pub async fn get_generation(&self, id: &str) -> Result<GenerationInfo, GenerationError> {
        let details: GenerationDetails = self.get_json(&format!("/generations/{id}")).await?;
        details
            .generation
            .ok_or_else(|| GenerationError::InvalidResponse(format!("generation {id} not found")))
    }

    /// List the platform's available models.
    pub async fn list_models(&self) -> Result<Vec<PlatformModel>, GenerationError> {
        let response: PlatformModelsResponse = self.get_json("/platformModels").await?;
        Ok(response.custom_models)
    }

    /// Upload a reference image through the provider's presigned-post
    /// flow: request an upload slot, then multipart-POST the bytes to the
    /// returned URL with the returned form fields. Returns the image id
    /// usable as `init_image_id`.
    pub async fn upload_init_image(
        &self,
        file_name: &str,
        extension: &str,
        bytes: Vec<u8>,
    ) -> Result<String, GenerationError> {
        let slot: InitImageUploadResponse = self
            .post_json("/init-image", &serde_json::json!({ "extension": extension }))
            .await?;
        let upload = slot.upload.ok_or_else(|| {
            GenerationError::InvalidResponse("missing upload fields for init image".into())
        })?;

        let fields: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&upload.fields).map_err(|e| {
                GenerationError::InvalidResponse(format!("unparseable upload fields: {e}"))
            })?;

        // S3 expects the form fields before the file part.
        let mut form = reqwest::multipart::Form::new();
        for (key, value) in fields {
            let text = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            form = form.text(key, text);
        }
        form = form.part(
            "file",
            reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string()),
        );

        // Presigned target: no bearer auth, bucket-provided credentials
        // are in the form fields.
        let response = self
            .http
            .post(&upload.url)
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        debug!(id = %upload.id, "Init image uploaded");
        Ok(upload.id)
    }
}
