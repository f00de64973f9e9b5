//! Capture status state machine.
//!
//! `pending` is the only initial state, `published` and `failed` are terminal.
//! The pipeline drives `pending -> processing -> published`; the intermediate
//! phases (`summarizing`, `enriching`, `formatting`) are progress markers for a
//! multi-phase generator. `failed` is reachable from every non-terminal state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle state of a capture. Persisted as a small integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum CaptureStatus {
    #[default]
    Pending = 0,
    Processing = 1,
    Summarizing = 2,
    Enriching = 3,
    Formatting = 4,
    Published = 5,
    Failed = 6,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("illegal status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: CaptureStatus,
    pub to: CaptureStatus,
}

impl CaptureStatus {
    pub const ALL: [CaptureStatus; 7] = [
        Self::Pending,
        Self::Processing,
        Self::Summarizing,
        Self::Enriching,
        Self::Formatting,
        Self::Published,
        Self::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Summarizing => "summarizing",
            Self::Enriching => "enriching",
            Self::Formatting => "formatting",
            Self::Published => "published",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Published | Self::Failed)
    }

    /// `true` only for `published`.
    pub fn is_successful(self) -> bool {
        self == Self::Published
    }

    /// Whether a retry may reset the capture to `pending`. A published note is
    /// never reprocessed.
    pub fn is_requeueable(self) -> bool {
        !self.is_successful()
    }

    /// `true` while a generation phase owns the capture.
    pub fn is_actively_processing(self) -> bool {
        matches!(
            self,
            Self::Processing | Self::Summarizing | Self::Enriching | Self::Formatting
        )
    }

    /// The transition predicate. Every edge of the graph is listed here.
    pub fn can_transition_to(self, next: CaptureStatus) -> bool {
        use CaptureStatus::*;

        if self.is_terminal() {
            return false;
        }
        if next == Failed {
            return true;
        }

        match (self, next) {
            (Pending, Processing) => true,
            (Processing, Summarizing | Enriching | Formatting | Published) => true,
            (Summarizing, Enriching | Formatting | Published) => true,
            (Enriching, Formatting | Published) => true,
            (Formatting, Published) => true,
            _ => false,
        }
    }

    pub fn transition(self, next: CaptureStatus) -> Result<CaptureStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptureStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown capture status: {}", s))
    }
}
