//! Backend-agnostic trait for the generation gallery store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;

/// One persisted generation result; one row per downloaded image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    /// Row id (unique per image; a generation can yield several images).
    pub id: String,
    /// Upstream generation id.
    pub generation_id: String,
    /// Batch the originating job belonged to.
    pub batch_id: String,
    /// Prompt as submitted upstream.
    pub prompt: String,
    pub prompt_number: Option<i64>,
    pub original_prompt: Option<String>,
    pub enhanced_prompt: Option<String>,
    pub model_id: String,
    pub width: u32,
    pub height: u32,
    pub seed: Option<i64>,
    /// Upstream image URL.
    pub image_url: String,
    /// Where the image was saved locally.
    pub local_path: String,
    pub status: String,
    pub guidance_scale: Option<u32>,
    pub num_steps: Option<u32>,
    pub preset_style: Option<String>,
    /// Gallery curation tag (`accept`, `maybe`, `declined`).
    pub tag: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Persistence sink for generation results and the gallery views over
/// them.
#[async_trait]
pub trait GenerationStore: Send + Sync {
    /// Insert one generation row.
    async fn insert_generation(&self, record: &GenerationRecord) -> Result<(), DatabaseError>;

    /// Most recent rows, optionally restricted to a gallery tag.
    async fn list_recent(
        &self,
        tag: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<GenerationRecord>, DatabaseError>;

    /// Every row of one batch, oldest first.
    async fn list_by_batch(&self, batch_id: &str) -> Result<Vec<GenerationRecord>, DatabaseError>;

    /// Set the gallery tag on every row of a generation. Returns whether
    /// any row matched.
    async fn update_tag(&self, generation_id: &str, tag: &str) -> Result<bool, DatabaseError>;
}
