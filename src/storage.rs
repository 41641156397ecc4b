//! Local image storage for generation results.
//!
//! Results land under `<base>/<YYYY-MM-DD>/batch_<id>/p_<prompt>/`, one
//! numbered file per generated image, so a day's batches stay browsable
//! on disk without the database.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use crate::error::StorageError;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Downloads result images and writes them under a dated batch layout.
pub struct ImageStore {
    base_dir: PathBuf,
    http: reqwest::Client,
}

impl ImageStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Directory for one prompt's images within a batch.
    fn prompt_dir(&self, batch_id: &str, prompt_index: u32) -> PathBuf {
        self.base_dir
            .join(Utc::now().format("%Y-%m-%d").to_string())
            .join(format!("batch_{batch_id}"))
            .join(format!("p_{prompt_index}"))
    }

    /// Download one result image and save it. Returns the local path.
    pub async fn save_image(
        &self,
        url: &str,
        batch_id: &str,
        prompt_index: u32,
        image_index: usize,
    ) -> Result<PathBuf, StorageError> {
        let response = self
            .http
            .get(url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| StorageError::Download {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(StorageError::Download {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::Download {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        self.write_image(&bytes, batch_id, prompt_index, image_index)
            .await
    }

    /// Write image bytes to their slot in the batch layout.
    pub async fn write_image(
        &self,
        bytes: &[u8],
        batch_id: &str,
        prompt_index: u32,
        image_index: usize,
    ) -> Result<PathBuf, StorageError> {
        let dir = self.prompt_dir(batch_id, prompt_index);
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(format!("image_{image_index:02}.png"));
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), "Image saved");
        Ok(path)
    }

    /// Root directory images are written under.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_into_dated_batch_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());

        let path = store
            .write_image(b"not-really-a-png", "abc12345", 3, 1)
            .await
            .unwrap();

        assert!(path.ends_with("batch_abc12345/p_3/image_01.png"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"not-really-a-png");

        // The dated folder sits directly under the base dir.
        let relative = path.strip_prefix(dir.path()).unwrap();
        let date_part = relative.components().next().unwrap();
        assert_eq!(
            date_part.as_os_str().to_string_lossy().len(),
            "2026-01-01".len()
        );
    }

    #[tokio::test]
    async fn image_indexes_are_zero_padded() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());

        let first = store.write_image(b"a", "b1", 1, 1).await.unwrap();
        let tenth = store.write_image(b"b", "b1", 1, 10).await.unwrap();

        assert!(first.to_string_lossy().ends_with("image_01.png"));
        assert!(tenth.to_string_lossy().ends_with("image_10.png"));
    }
}
