//! Capture persistence.
//!
//! Each method is a single atomic call against the backing store. A missing
//! capture is `Ok(None)` from [`CaptureStore::find_capture`]; turning that
//! into a not-found failure is the caller's decision.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Result, ScribeError};
use crate::models::{Capture, GeneratedNote, Template};
use crate::status::CaptureStatus;

#[async_trait]
pub trait CaptureStore: Send + Sync {
    async fn find_capture(&self, id: Uuid) -> Result<Option<Capture>>;

    async fn find_template(&self, id: Uuid) -> Result<Option<Template>>;

    /// The vault root configured for a user, if any.
    async fn vault_root(&self, user_id: Uuid) -> Result<Option<String>>;

    async fn update_status(&self, id: Uuid, status: CaptureStatus) -> Result<()>;

    /// Persist generated fields and set `published`.
    async fn mark_published(&self, id: Uuid, note: &GeneratedNote) -> Result<()>;

    /// Set `failed` and record the failure description.
    async fn mark_failed(&self, id: Uuid, message: &str) -> Result<()>;

    /// Reset a capture to `pending` ahead of a scheduled retry. Returns
    /// `false`, leaving the record untouched, when the capture is already
    /// published.
    async fn requeue(&self, id: Uuid) -> Result<bool>;

    /// Oldest pending captures that are not flagged `skip_processing`.
    async fn pending_captures(&self, limit: usize) -> Result<Vec<Uuid>>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

const CAPTURE_COLUMNS: &str = "id, user_id, template_id, content, content_type, context, tags, \
     status, obsidian_folder, skip_processing, generated_title, generated_summary, \
     generated_key_points, generated_content, obsidian_file_path, error_message, \
     published_at, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgCaptureStore {
    pool: PgPool,
}

impl PgCaptureStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CaptureStore for PgCaptureStore {
    async fn find_capture(&self, id: Uuid) -> Result<Option<Capture>> {
        let query = format!("SELECT {} FROM captures WHERE id = $1", CAPTURE_COLUMNS);
        let capture = sqlx::query_as::<_, Capture>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(capture)
    }

    async fn find_template(&self, id: Uuid) -> Result<Option<Template>> {
        let template = sqlx::query_as::<_, Template>(
            "SELECT id, user_id, name, prompt_template, markdown_template, created_at
             FROM templates WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(template)
    }

    async fn vault_root(&self, user_id: Uuid) -> Result<Option<String>> {
        let root: Option<Option<String>> =
            sqlx::query_scalar("SELECT obsidian_vault_path FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(root.flatten().filter(|path| !path.trim().is_empty()))
    }

    async fn update_status(&self, id: Uuid, status: CaptureStatus) -> Result<()> {
        let result = sqlx::query("UPDATE captures SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await?;
        ensure_updated(result.rows_affected(), id)
    }

    async fn mark_published(&self, id: Uuid, note: &GeneratedNote) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE captures SET
                status = $1,
                generated_title = $2,
                generated_summary = $3,
                generated_key_points = $4,
                generated_content = $5,
                obsidian_file_path = $6,
                published_at = $7,
                error_message = NULL,
                updated_at = NOW()
            WHERE id = $8
            "#,
        )
        .bind(CaptureStatus::Published)
        .bind(&note.title)
        .bind(&note.summary)
        .bind(note.key_points_joined())
        .bind(&note.content)
        .bind(&note.file_path)
        .bind(note.published_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        ensure_updated(result.rows_affected(), id)
    }

    async fn mark_failed(&self, id: Uuid, message: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE captures SET status = $1, error_message = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(CaptureStatus::Failed)
        .bind(message)
        .bind(id)
        .execute(&self.pool)
        .await?;
        ensure_updated(result.rows_affected(), id)
    }

    async fn requeue(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE captures SET status = $1, error_message = NULL, updated_at = NOW()
             WHERE id = $2 AND status <> $3",
        )
        .bind(CaptureStatus::Pending)
        .bind(id)
        .bind(CaptureStatus::Published)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM captures WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(ScribeError::NotFound(id));
        }
        Ok(false)
    }

    async fn pending_captures(&self, limit: usize) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM captures
             WHERE status = $1 AND skip_processing = FALSE
             ORDER BY created_at ASC LIMIT $2",
        )
        .bind(CaptureStatus::Pending)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

fn ensure_updated(rows: u64, id: Uuid) -> Result<()> {
    if rows == 0 {
        return Err(ScribeError::NotFound(id));
    }
    Ok(())
}

// ============================================================================
// In-memory
// ============================================================================

/// Store backed by process memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCaptureStore {
    captures: RwLock<HashMap<Uuid, Capture>>,
    templates: RwLock<HashMap<Uuid, Template>>,
    vaults: RwLock<HashMap<Uuid, String>>,
}

impl MemoryCaptureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_capture(&self, capture: Capture) {
        if let Ok(mut captures) = self.captures.write() {
            captures.insert(capture.id, capture);
        }
    }

    pub fn insert_template(&self, template: Template) {
        if let Ok(mut templates) = self.templates.write() {
            templates.insert(template.id, template);
        }
    }

    pub fn set_vault_root(&self, user_id: Uuid, root: impl Into<String>) {
        if let Ok(mut vaults) = self.vaults.write() {
            vaults.insert(user_id, root.into());
        }
    }

    /// Snapshot of a stored capture.
    pub fn get(&self, id: Uuid) -> Option<Capture> {
        self.captures.read().ok()?.get(&id).cloned()
    }

    fn modify<F>(&self, id: Uuid, f: F) -> Result<()>
    where
        F: FnOnce(&mut Capture),
    {
        let mut captures = self
            .captures
            .write()
            .map_err(|_| ScribeError::Other("capture store lock poisoned".to_string()))?;
        let capture = captures.get_mut(&id).ok_or(ScribeError::NotFound(id))?;
        f(capture);
        capture.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl CaptureStore for MemoryCaptureStore {
    async fn find_capture(&self, id: Uuid) -> Result<Option<Capture>> {
        Ok(self.get(id))
    }

    async fn find_template(&self, id: Uuid) -> Result<Option<Template>> {
        Ok(self
            .templates
            .read()
            .ok()
            .and_then(|templates| templates.get(&id).cloned()))
    }

    async fn vault_root(&self, user_id: Uuid) -> Result<Option<String>> {
        Ok(self
            .vaults
            .read()
            .ok()
            .and_then(|vaults| vaults.get(&user_id).cloned()))
    }

    async fn update_status(&self, id: Uuid, status: CaptureStatus) -> Result<()> {
        self.modify(id, |capture| capture.status = status)
    }

    async fn mark_published(&self, id: Uuid, note: &GeneratedNote) -> Result<()> {
        self.modify(id, |capture| {
            capture.status = CaptureStatus::Published;
            capture.generated_title = Some(note.title.clone());
            capture.generated_summary = Some(note.summary.clone());
            capture.generated_key_points = Some(note.key_points_joined());
            capture.generated_content = Some(note.content.clone());
            capture.obsidian_file_path = Some(note.file_path.clone());
            capture.published_at = Some(note.published_at);
            capture.error_message = None;
        })
    }

    async fn mark_failed(&self, id: Uuid, message: &str) -> Result<()> {
        self.modify(id, |capture| {
            capture.status = CaptureStatus::Failed;
            capture.error_message = Some(message.to_string());
        })
    }

    async fn requeue(&self, id: Uuid) -> Result<bool> {
        let mut captures = self
            .captures
            .write()
            .map_err(|_| ScribeError::Other("capture store lock poisoned".to_string()))?;
        let capture = captures.get_mut(&id).ok_or(ScribeError::NotFound(id))?;

        if !capture.status.is_requeueable() {
            return Ok(false);
        }
        capture.status = CaptureStatus::Pending;
        capture.error_message = None;
        capture.updated_at = Utc::now();
        Ok(true)
    }

    async fn pending_captures(&self, limit: usize) -> Result<Vec<Uuid>> {
        let captures = self
            .captures
            .read()
            .map_err(|_| ScribeError::Other("capture store lock poisoned".to_string()))?;

        let mut pending: Vec<&Capture> = captures
            .values()
            .filter(|c| c.status == CaptureStatus::Pending && !c.skip_processing)
            .collect();
        pending.sort_by_key(|c| c.created_at);

        Ok(pending.into_iter().take(limit).map(|c| c.id).collect())
    }
}
