//! Uploaded-file records and OpenAI vector stores owned by a user.
//!
//! File bytes live with the hosted upload service; only metadata is kept here.

use crate::error::{LlmError, Result};
use crate::llm::{LlmManager, ProviderKind};
use crate::llm::providers;

use anyhow::Context as _;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{Row as _, SqlitePool};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub size: i64,
    pub created_at: String,
}

/// Metadata the upload service reports for a finished upload.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub name: String,
    pub url: String,
    pub kind: String,
    pub size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VectorStoreRecord {
    pub id: String,
    pub name: String,
    pub openai_vector_store_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    pool: SqlitePool,
}

impl FileStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The user's files, newest first.
    pub async fn list(&self, user_id: &str) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query(
            "SELECT id, name, url, kind, size, created_at FROM files \
             WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list files")?;

        rows.iter().map(file_from_row).collect()
    }

    pub async fn record(&self, user_id: &str, file: NewFile) -> Result<FileRecord> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().naive_utc();

        sqlx::query(
            "INSERT INTO files (id, user_id, name, url, kind, size, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(&file.name)
        .bind(&file.url)
        .bind(&file.kind)
        .bind(file.size)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("failed to record file")?;

        Ok(FileRecord {
            id,
            name: file.name,
            url: file.url,
            kind: file.kind,
            size: file.size,
            created_at: now.and_utc().to_rfc3339(),
        })
    }

    /// Remove a file record. `false` when it does not exist for this user.
    pub async fn delete(&self, id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("failed to delete file")?;
        Ok(result.rows_affected() > 0)
    }
}

/// Vector stores: created remotely through OpenAI, then mirrored locally.
#[derive(Clone)]
pub struct VectorStores {
    pool: SqlitePool,
    llm_manager: Arc<LlmManager>,
}

impl VectorStores {
    pub fn new(pool: SqlitePool, llm_manager: Arc<LlmManager>) -> Self {
        Self { pool, llm_manager }
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<VectorStoreRecord>> {
        let rows = sqlx::query(
            "SELECT id, name, openai_vector_store_id, created_at FROM vector_stores \
             WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list vector stores")?;

        rows.iter().map(vector_store_from_row).collect()
    }

    pub async fn create(&self, user_id: &str, name: &str) -> Result<VectorStoreRecord> {
        let remote_id = self.create_remote(name).await?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().naive_utc();
        sqlx::query(
            "INSERT INTO vector_stores (id, user_id, name, openai_vector_store_id, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(name)
        .bind(&remote_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("failed to save vector store")?;

        tracing::info!(vector_store_id = %remote_id, %name, "vector store created");

        Ok(VectorStoreRecord {
            id,
            name: name.to_string(),
            openai_vector_store_id: remote_id,
            created_at: now.and_utc().to_rfc3339(),
        })
    }

    async fn create_remote(&self, name: &str) -> std::result::Result<String, LlmError> {
        let api_key = self.llm_manager.api_key(ProviderKind::OpenAi)?;
        let url = format!(
            "{}/v1/vector_stores",
            self.llm_manager.base_url(ProviderKind::OpenAi)
        );
        let request = self
            .llm_manager
            .http_client()
            .post(&url)
            .bearer_auth(api_key)
            .json(&serde_json::json!({ "name": name }));

        let body = providers::send_json(request, "OpenAI vector stores", &CancellationToken::new()).await?;
        body["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::EmptyResponse("OpenAI vector stores".into()))
    }
}

fn file_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<FileRecord> {
    Ok(FileRecord {
        id: row.try_get("id").context("failed to read file id")?,
        name: row.try_get("name").context("failed to read file name")?,
        url: row.try_get("url").context("failed to read file url")?,
        kind: row.try_get("kind").context("failed to read file kind")?,
        size: row.try_get("size").unwrap_or_default(),
        created_at: row
            .try_get::<NaiveDateTime, _>("created_at")
            .map(|v| v.and_utc().to_rfc3339())
            .context("failed to read file created_at")?,
    })
}

fn vector_store_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<VectorStoreRecord> {
    Ok(VectorStoreRecord {
        id: row.try_get("id").context("failed to read vector store id")?,
        name: row
            .try_get("name")
            .context("failed to read vector store name")?,
        openai_vector_store_id: row
            .try_get("openai_vector_store_id")
            .context("failed to read openai_vector_store_id")?,
        created_at: row
            .try_get::<NaiveDateTime, _>("created_at")
            .map(|v| v.and_utc().to_rfc3339())
            .context("failed to read vector store created_at")?,
    })
}
