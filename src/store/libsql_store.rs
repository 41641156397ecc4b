//! libSQL implementation of the generation store.
//!
//! A single connection is reused for all operations; `libsql::Connection`
//! is safe for concurrent async use.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{params, Connection, Database, Row};
use tracing::info;

use crate::error::DatabaseError;
use crate::store::traits::{GenerationRecord, GenerationStore};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS generations (
        id TEXT PRIMARY KEY,
        generation_id TEXT NOT NULL,
        batch_id TEXT NOT NULL,
        prompt TEXT NOT NULL,
        prompt_number INTEGER,
        original_prompt TEXT,
        enhanced_prompt TEXT,
        model_id TEXT NOT NULL,
        width INTEGER NOT NULL,
        height INTEGER NOT NULL,
        seed INTEGER,
        image_url TEXT NOT NULL,
        local_path TEXT NOT NULL,
        status TEXT NOT NULL,
        guidance_scale INTEGER,
        num_steps INTEGER,
        preset_style TEXT,
        tag TEXT,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_generations_batch ON generations(batch_id);
    CREATE INDEX IF NOT EXISTS idx_generations_gen ON generations(generation_id);
    CREATE INDEX IF NOT EXISTS idx_generations_tag ON generations(tag);
"#;

const SELECT_COLUMNS: &str = "id, generation_id, batch_id, prompt, prompt_number, \
     original_prompt, enhanced_prompt, model_id, width, height, seed, image_url, \
     local_path, status, guidance_scale, num_steps, preset_style, tag, created_at";

/// libSQL-backed generation store.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<Database>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to connect: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Generation database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to connect: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(SCHEMA)
            .await
            .map_err(|e| DatabaseError::Query(format!("Schema init failed: {e}")))?;
        Ok(())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC)
}

fn column_error(index: i32, e: libsql::Error) -> DatabaseError {
    DatabaseError::Query(format!("Column {index} decode failed: {e}"))
}

fn row_to_record(row: &Row) -> Result<GenerationRecord, DatabaseError> {
    Ok(GenerationRecord {
        id: row.get::<String>(0).map_err(|e| column_error(0, e))?,
        generation_id: row.get::<String>(1).map_err(|e| column_error(1, e))?,
        batch_id: row.get::<String>(2).map_err(|e| column_error(2, e))?,
        prompt: row.get::<String>(3).map_err(|e| column_error(3, e))?,
        prompt_number: row.get::<Option<i64>>(4).map_err(|e| column_error(4, e))?,
        original_prompt: row.get::<Option<String>>(5).map_err(|e| column_error(5, e))?,
        enhanced_prompt: row.get::<Option<String>>(6).map_err(|e| column_error(6, e))?,
        model_id: row.get::<String>(7).map_err(|e| column_error(7, e))?,
        width: row.get::<i64>(8).map_err(|e| column_error(8, e))? as u32,
        height: row.get::<i64>(9).map_err(|e| column_error(9, e))? as u32,
        seed: row.get::<Option<i64>>(10).map_err(|e| column_error(10, e))?,
        image_url: row.get::<String>(11).map_err(|e| column_error(11, e))?,
        local_path: row.get::<String>(12).map_err(|e| column_error(12, e))?,
        status: row.get::<String>(13).map_err(|e| column_error(13, e))?,
        guidance_scale: row
            .get::<Option<i64>>(14)
            .map_err(|e| column_error(14, e))?
            .map(|v| v as u32),
        num_steps: row
            .get::<Option<i64>>(15)
            .map_err(|e| column_error(15, e))?
            .map(|v| v as u32),
        preset_style: row.get::<Option<String>>(16).map_err(|e| column_error(16, e))?,
        tag: row.get::<Option<String>>(17).map_err(|e| column_error(17, e))?,
        created_at: parse_datetime(&row.get::<String>(18).map_err(|e| column_error(18, e))?),
    })
}

async fn collect_records(mut rows: libsql::Rows) -> Result<Vec<GenerationRecord>, DatabaseError> {
    let mut records = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Query(e.to_string()))?
    {
        records.push(row_to_record(&row)?);
    }
    Ok(records)
}

#[async_trait]
impl GenerationStore for LibSqlStore {
    async fn insert_generation(&self, record: &GenerationRecord) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO generations (id, generation_id, batch_id, prompt, prompt_number, \
                 original_prompt, enhanced_prompt, model_id, width, height, seed, image_url, \
                 local_path, status, guidance_scale, num_steps, preset_style, tag, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
                 ?17, ?18, ?19)",
                params![
                    record.id.clone(),
                    record.generation_id.clone(),
                    record.batch_id.clone(),
                    record.prompt.clone(),
                    record.prompt_number,
                    record.original_prompt.clone(),
                    record.enhanced_prompt.clone(),
                    record.model_id.clone(),
                    record.width as i64,
                    record.height as i64,
                    record.seed,
                    record.image_url.clone(),
                    record.local_path.clone(),
                    record.status.clone(),
                    record.guidance_scale.map(|v| v as i64),
                    record.num_steps.map(|v| v as i64),
                    record.preset_style.clone(),
                    record.tag.clone(),
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Insert failed: {e}")))?;
        Ok(())
    }

    async fn list_recent(
        &self,
        tag: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<GenerationRecord>, DatabaseError> {
        let rows = match tag {
            Some(tag) => self
                .conn
                .query(
                    &format!(
                        "SELECT {SELECT_COLUMNS} FROM generations WHERE tag = ?1 \
                         ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
                    ),
                    params![tag.to_string(), limit as i64, offset as i64],
                )
                .await,
            None => self
                .conn
                .query(
                    &format!(
                        "SELECT {SELECT_COLUMNS} FROM generations \
                         ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
                    ),
                    params![limit as i64, offset as i64],
                )
                .await,
        }
        .map_err(|e| DatabaseError::Query(e.to_string()))?;

        collect_records(rows).await
    }

    async fn list_by_batch(&self, batch_id: &str) -> Result<Vec<GenerationRecord>, DatabaseError> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM generations WHERE batch_id = ?1 \
                     ORDER BY created_at ASC"
                ),
                params![batch_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        collect_records(rows).await
    }

    async fn update_tag(&self, generation_id: &str, tag: &str) -> Result<bool, DatabaseError> {
        let affected = self
            .conn
            .execute(
                "UPDATE generations SET tag = ?1 WHERE generation_id = ?2",
                params![tag.to_string(), generation_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Tag update failed: {e}")))?;
        Ok(affected > 0)
    }
}
