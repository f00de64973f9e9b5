use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A prompt/markdown template pair. `name` is unique per user.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Template {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub prompt_template: String,
    pub markdown_template: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Template {
    /// In-memory template with no owner, built from fixed constants.
    pub fn builtin(name: &str, prompt_template: &str, markdown_template: &str) -> Self {
        Self {
            id: Uuid::nil(),
            user_id: None,
            name: name.to_string(),
            prompt_template: prompt_template.to_string(),
            markdown_template: Some(markdown_template.to_string()),
            created_at: DateTime::<Utc>::default(),
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.user_id.is_none()
    }
}
