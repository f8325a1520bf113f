//! Session-scoped entities: the session record itself, the per-shot photo
//! records, and the composed collage result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Lifecycle status of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Canceled,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Canceled => "canceled",
            SessionStatus::Failed => "failed",
        }
    }
}

/// One live run of the capture flow, bound to exactly one template.
///
/// Mutated only by the session state machine; the store's retention policy
/// owns deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub template_id: String,
    pub event_id: i64,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(session_id: String, template_id: String, event_id: i64) -> Self {
        Self {
            session_id,
            template_id,
            event_id,
            status: SessionStatus::Active,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Store-assigned handle for a persisted photo
#[derive(Debug, Clone, Default)]
pub struct PhotoHandle {
    /// Filesystem location when the store is file-backed
    pub path: Option<PathBuf>,
}

/// One successfully captured shot, pinned to its frame ordinal.
///
/// Created exactly once per capture and never mutated; the core never deletes
/// a persisted record, even when the session later fails.
#[derive(Debug, Clone)]
pub struct PhotoRecord {
    pub session_id: String,
    pub frame_index: u32,
    /// Encoded image bytes (shared with the store and the compositor)
    pub data: Arc<Vec<u8>>,
    pub handle: PhotoHandle,
    pub taken_at: DateTime<Utc>,
}

/// The composed output of a completed session.
///
/// `print_count` and `share_count` start at zero here; incrementing them is
/// the surrounding application's job.
#[derive(Debug, Clone)]
pub struct CollageResult {
    pub collage_id: String,
    pub session_id: String,
    pub data: Arc<Vec<u8>>,
    pub path: Option<PathBuf>,
    pub print_count: u32,
    pub share_count: u32,
    pub created_at: DateTime<Utc>,
}
