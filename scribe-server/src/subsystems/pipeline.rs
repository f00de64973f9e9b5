//! Capture processing pipeline.
//!
//! One call to [`Pipeline::process`] is one attempt:
//! load -> processing -> prompt -> generate -> parse -> markdown -> vault -> published.
//! Any failure after the capture is loaded records `failed` plus the error
//! description before the error is returned, so the outcome stays observable
//! even when no retry follows. A retry re-runs the whole sequence.

use std::sync::Arc;

use chrono::Utc;
use scribe_core::{
    config::ScribeConfig,
    error::{Result, ScribeError},
    parser::parse_response,
    store::CaptureStore,
    template::{self, default_template},
    Capture, CaptureStatus, GeneratedNote, Template, TextGenerator, VaultError, VaultWriter,
};
use uuid::Uuid;

/// Fixed parameters for every invocation.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_tokens: u32,
    pub system_prompt: String,
    pub default_folder: String,
}

impl From<&ScribeConfig> for PipelineSettings {
    fn from(config: &ScribeConfig) -> Self {
        Self {
            max_tokens: config.generation.max_tokens,
            system_prompt: config.generation.system_prompt().to_string(),
            default_folder: config.vault.default_folder.clone(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_tokens: scribe_core::generation::DEFAULT_MAX_TOKENS,
            system_prompt: scribe_core::generation::DEFAULT_SYSTEM_PROMPT.to_string(),
            default_folder: scribe_core::models::capture::DEFAULT_FOLDER.to_string(),
        }
    }
}

pub struct Pipeline {
    store: Arc<dyn CaptureStore>,
    generator: Arc<dyn TextGenerator>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn CaptureStore>,
        generator: Arc<dyn TextGenerator>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            generator,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn CaptureStore> {
        &self.store
    }

    /// Run one attempt for `capture_id`.
    ///
    /// A missing capture is `ScribeError::NotFound` and nothing is recorded.
    pub async fn process(&self, capture_id: Uuid) -> Result<GeneratedNote> {
        let capture = self
            .store
            .find_capture(capture_id)
            .await?
            .ok_or(ScribeError::NotFound(capture_id))?;

        match self.run(&capture).await {
            Ok(note) => {
                tracing::info!(
                    capture_id = %capture_id,
                    path = %note.file_path,
                    "Capture published"
                );
                Ok(note)
            }
            Err(e) => {
                self.record_failure(capture_id, &e).await;
                Err(e)
            }
        }
    }

    async fn run(&self, capture: &Capture) -> Result<GeneratedNote> {
        let processing = capture.status.transition(CaptureStatus::Processing)?;
        self.store.update_status(capture.id, processing).await?;

        let template = self.resolve_template(capture).await?;

        let prompt = template::render_prompt(&template.prompt_template, capture);
        let raw = self
            .generator
            .generate(&prompt, self.settings.max_tokens, &self.settings.system_prompt)
            .await?;

        let parsed = parse_response(&raw, &capture.tags);
        tracing::info!(
            capture_id = %capture.id,
            key_points = parsed.key_points.len(),
            tags = parsed.tags.len(),
            "Parsed generator response"
        );

        let markdown_template = template
            .markdown_template
            .as_deref()
            .unwrap_or(template::STANDARD_MARKDOWN_TEMPLATE);
        let markdown = template::render_markdown(markdown_template, capture, &parsed);
        tracing::debug!(capture_id = %capture.id, markdown_len = markdown.len(), "Rendered markdown");

        let vault_root = self
            .store
            .vault_root(capture.user_id)
            .await?
            .ok_or(VaultError::MissingRoot)?;
        let writer = VaultWriter::from_config_path(&vault_root);
        let folder = capture
            .obsidian_folder
            .as_deref()
            .unwrap_or(&self.settings.default_folder);
        let file_path = writer.write(&markdown, &parsed.title, Some(folder))?;

        processing.transition(CaptureStatus::Published)?;
        let note = GeneratedNote {
            title: parsed.title,
            summary: parsed.summary,
            key_points: parsed.key_points,
            content: markdown,
            file_path,
            published_at: Utc::now(),
        };
        self.store.mark_published(capture.id, &note).await?;

        Ok(note)
    }

    /// The capture's own template, or the built-in default.
    async fn resolve_template(&self, capture: &Capture) -> Result<Template> {
        let Some(template_id) = capture.template_id else {
            return Ok(default_template());
        };

        match self.store.find_template(template_id).await? {
            Some(template) => Ok(template),
            None => {
                tracing::warn!(
                    capture_id = %capture.id,
                    template_id = %template_id,
                    "Assigned template missing, using default"
                );
                Ok(default_template())
            }
        }
    }

    async fn record_failure(&self, capture_id: Uuid, error: &ScribeError) {
        tracing::error!(capture_id = %capture_id, error = %error, "Capture processing failed");

        // Re-read: the failure may have happened before or after `processing`
        // was persisted.
        let current = match self.store.find_capture(capture_id).await {
            Ok(Some(capture)) => capture.status,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(capture_id = %capture_id, error = %e, "Could not reload capture to record failure");
                return;
            }
        };

        if !current.can_transition_to(CaptureStatus::Failed) {
            tracing::warn!(capture_id = %capture_id, status = %current, "Capture is terminal, failure not recorded");
            return;
        }

        if let Err(e) = self.store.mark_failed(capture_id, &error.to_string()).await {
            tracing::error!(capture_id = %capture_id, error = %e, "Failed to record capture failure");
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
