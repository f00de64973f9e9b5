use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::CaptureStatus;

/// Folder used when a capture does not name one.
pub const DEFAULT_FOLDER: &str = "Captures";

/// A unit of raw content submitted for processing.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Capture {
    pub id: Uuid,
    pub user_id: Uuid,
    pub template_id: Option<Uuid>,
    pub content: String,
    pub content_type: String,
    pub context: Option<String>,
    pub tags: Vec<String>,
    pub status: CaptureStatus,
    pub obsidian_folder: Option<String>,
    pub skip_processing: bool,
    pub generated_title: Option<String>,
    pub generated_summary: Option<String>,
    pub generated_key_points: Option<String>,
    pub generated_content: Option<String>,
    pub obsidian_file_path: Option<String>,
    pub error_message: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Capture {
    /// A fresh `pending` capture, as the API layer would create it.
    pub fn new(user_id: Uuid, content: impl Into<String>, content_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            template_id: None,
            content: content.into(),
            content_type: content_type.into(),
            context: None,
            tags: Vec::new(),
            status: CaptureStatus::Pending,
            obsidian_folder: Some(DEFAULT_FOLDER.to_string()),
            skip_processing: false,
            generated_title: None,
            generated_summary: None,
            generated_key_points: None,
            generated_content: None,
            obsidian_file_path: None,
            error_message: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn folder(&self) -> &str {
        self.obsidian_folder.as_deref().unwrap_or(DEFAULT_FOLDER)
    }

    pub fn is_successful(&self) -> bool {
        self.status.is_successful()
    }

    pub fn is_processing(&self) -> bool {
        self.status.is_actively_processing()
    }
}

/// Everything the pipeline produces for a published capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedNote {
    pub title: String,
    pub summary: String,
    pub key_points: Vec<String>,
    pub content: String,
    pub file_path: String,
    pub published_at: DateTime<Utc>,
}

impl GeneratedNote {
    /// Key points as stored: newline-joined.
    pub fn key_points_joined(&self) -> String {
        self.key_points.join("\n")
    }
}
