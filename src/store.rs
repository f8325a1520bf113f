//! Durable persistence consumed by the engine: session rows, per-shot photo
//! records, and composed collage results.
//!
//! The engine only sees the `SessionStore` trait. The file-backed store keeps
//! photos under `photos/<session_id>/`, collages under `collages/`, and one
//! JSON metadata record per session; the in-memory store backs tests and
//! embedding.

use crate::error::StoreError;
use crate::session::{CollageResult, PhotoHandle, Session, SessionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session row and return its id
    async fn create_session(&self, template_id: &str, event_id: i64)
        -> Result<String, StoreError>;

    /// Record one captured photo; exactly one record may exist per
    /// (session, frame_index) pair
    async fn append_photo(
        &self,
        session_id: &str,
        frame_index: u32,
        data: Arc<Vec<u8>>,
    ) -> Result<PhotoHandle, StoreError>;

    /// Update the session's lifecycle status
    async fn mark_session(&self, session_id: &str, status: SessionStatus)
        -> Result<(), StoreError>;

    /// Persist the composed collage for a session
    async fn save_collage_result(
        &self,
        session_id: &str,
        data: Arc<Vec<u8>>,
    ) -> Result<CollageResult, StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PhotoMeta {
    frame_index: u32,
    path: PathBuf,
    taken_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollageMeta {
    collage_id: String,
    path: PathBuf,
    created_at: DateTime<Utc>,
}

/// On-disk metadata record for one session
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionMeta {
    session: Session,
    photos: Vec<PhotoMeta>,
    collage: Option<CollageMeta>,
}

/// File-backed session store rooted at a single directory
pub struct FileSessionStore {
    root: PathBuf,
    registry: RwLock<HashMap<String, SessionMeta>>,
}

impl FileSessionStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            registry: RwLock::new(HashMap::new()),
        }
    }

    fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    fn photos_dir(&self, session_id: &str) -> PathBuf {
        self.root.join("photos").join(session_id)
    }

    fn collages_dir(&self) -> PathBuf {
        self.root.join("collages")
    }

    async fn write_meta(&self, meta: &SessionMeta) -> Result<(), StoreError> {
        let path = self
            .sessions_dir()
            .join(format!("{}.json", meta.session.session_id));
        let payload = serde_json::to_vec_pretty(meta)?;
        fs::write(&path, payload).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn create_session(
        &self,
        template_id: &str,
        event_id: i64,
    ) -> Result<String, StoreError> {
        let session_id = Uuid::new_v4().to_string();

        fs::create_dir_all(self.sessions_dir()).await?;
        fs::create_dir_all(self.photos_dir(&session_id)).await?;
        fs::create_dir_all(self.collages_dir()).await?;

        let meta = SessionMeta {
            session: Session::new(session_id.clone(), template_id.to_string(), event_id),
            photos: Vec::new(),
            collage: None,
        };
        self.write_meta(&meta).await?;
        self.registry.write().await.insert(session_id.clone(), meta);

        info!("Session {} created for event {}", session_id, event_id);
        Ok(session_id)
    }

    async fn append_photo(
        &self,
        session_id: &str,
        frame_index: u32,
        data: Arc<Vec<u8>>,
    ) -> Result<PhotoHandle, StoreError> {
        let mut registry = self.registry.write().await;
        let meta = registry
            .get_mut(session_id)
            .ok_or_else(|| StoreError::UnknownSession {
                session_id: session_id.to_string(),
            })?;

        if meta.photos.iter().any(|p| p.frame_index == frame_index) {
            return Err(StoreError::DuplicatePhoto {
                session_id: session_id.to_string(),
                frame_index,
            });
        }

        let path = self
            .photos_dir(session_id)
            .join(format!("photo_{}.jpg", frame_index + 1));
        fs::write(&path, data.as_slice()).await?;

        meta.photos.push(PhotoMeta {
            frame_index,
            path: path.clone(),
            taken_at: Utc::now(),
        });
        let meta_snapshot = meta.clone();
        drop(registry);
        self.write_meta(&meta_snapshot).await?;

        debug!(
            "Photo {} for session {} written to {}",
            frame_index,
            session_id,
            path.display()
        );
        Ok(PhotoHandle { path: Some(path) })
    }

    async fn mark_session(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<(), StoreError> {
        let mut registry = self.registry.write().await;
        let meta = registry
            .get_mut(session_id)
            .ok_or_else(|| StoreError::UnknownSession {
                session_id: session_id.to_string(),
            })?;

        meta.session.status = status;
        if status == SessionStatus::Completed {
            meta.session.completed_at = Some(Utc::now());
        }
        let meta_snapshot = meta.clone();
        drop(registry);
        self.write_meta(&meta_snapshot).await?;

        info!("Session {} marked {}", session_id, status.as_str());
        Ok(())
    }

    async fn save_collage_result(
        &self,
        session_id: &str,
        data: Arc<Vec<u8>>,
    ) -> Result<CollageResult, StoreError> {
        let mut registry = self.registry.write().await;
        let meta = registry
            .get_mut(session_id)
            .ok_or_else(|| StoreError::UnknownSession {
                session_id: session_id.to_string(),
            })?;

        let collage_id = Uuid::new_v4().to_string();
        let path = self
            .collages_dir()
            .join(format!("collage_{}.jpg", collage_id));
        fs::write(&path, data.as_slice()).await?;

        let created_at = Utc::now();
        meta.collage = Some(CollageMeta {
            collage_id: collage_id.clone(),
            path: path.clone(),
            created_at,
        });
        let meta_snapshot = meta.clone();
        drop(registry);
        self.write_meta(&meta_snapshot).await?;

        info!(
            "Collage {} for session {} written to {}",
            collage_id,
            session_id,
            path.display()
        );
        Ok(CollageResult {
            collage_id,
            session_id: session_id.to_string(),
            data,
            path: Some(path),
            print_count: 0,
            share_count: 0,
            created_at,
        })
    }
}

#[derive(Debug)]
struct StoredSession {
    session: Session,
    photos: HashMap<u32, Arc<Vec<u8>>>,
    collage: Option<CollageResult>,
}

impl StoredSession {
    fn new(session: Session) -> Self {
        Self {
            session,
            photos: HashMap::new(),
            collage: None,
        }
    }
}

/// In-memory session store for tests and embedding
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, StoredSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a stored session row
    pub async fn session(&self, session_id: &str) -> Option<Session> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|s| s.session.clone())
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn photo_count(&self, session_id: &str) -> usize {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|s| s.photos.len())
            .unwrap_or(0)
    }

    pub async fn collage(&self, session_id: &str) -> Option<CollageResult> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .and_then(|s| s.collage.clone())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(
        &self,
        template_id: &str,
        event_id: i64,
    ) -> Result<String, StoreError> {
        let session_id = Uuid::new_v4().to_string();
        let session = Session::new(session_id.clone(), template_id.to_string(), event_id);
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), StoredSession::new(session));
        Ok(session_id)
    }

    async fn append_photo(
        &self,
        session_id: &str,
        frame_index: u32,
        data: Arc<Vec<u8>>,
    ) -> Result<PhotoHandle, StoreError> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::UnknownSession {
                session_id: session_id.to_string(),
            })?;

        if stored.photos.contains_key(&frame_index) {
            return Err(StoreError::DuplicatePhoto {
                session_id: session_id.to_string(),
                frame_index,
            });
        }

        stored.photos.insert(frame_index, data);
        Ok(PhotoHandle::default())
    }

    async fn mark_session(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::UnknownSession {
                session_id: session_id.to_string(),
            })?;

        stored.session.status = status;
        if status == SessionStatus::Completed {
            stored.session.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn save_collage_result(
        &self,
        session_id: &str,
        data: Arc<Vec<u8>>,
    ) -> Result<CollageResult, StoreError> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::UnknownSession {
                session_id: session_id.to_string(),
            })?;

        let result = CollageResult {
            collage_id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            data,
            path: None,
            print_count: 0,
            share_count: 0,
            created_at: Utc::now(),
        };
        stored.collage = Some(result.clone());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_session_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());

        let session_id = store.create_session("tpl-1", 42).await.unwrap();
        assert!(dir
            .path()
            .join("sessions")
            .join(format!("{}.json", session_id))
            .exists());

        let handle = store
            .append_photo(&session_id, 0, Arc::new(vec![1, 2, 3]))
            .await
            .unwrap();
        let photo_path = handle.path.unwrap();
        assert!(photo_path.ends_with("photo_1.jpg"));
        assert_eq!(std::fs::read(&photo_path).unwrap(), vec![1, 2, 3]);

        store
            .mark_session(&session_id, SessionStatus::Completed)
            .await
            .unwrap();

        let collage = store
            .save_collage_result(&session_id, Arc::new(vec![9, 9]))
            .await
            .unwrap();
        let collage_path = collage.path.unwrap();
        assert!(collage_path.exists());
        assert_eq!(collage.print_count, 0);
        assert_eq!(collage.share_count, 0);
    }

    #[tokio::test]
    async fn test_file_store_rejects_duplicate_frame_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());

        let session_id = store.create_session("tpl-1", 1).await.unwrap();
        store
            .append_photo(&session_id, 0, Arc::new(vec![1]))
            .await
            .unwrap();

        let err = store
            .append_photo(&session_id, 0, Arc::new(vec![2]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicatePhoto { .. }));
    }

    #[tokio::test]
    async fn test_file_store_unknown_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());

        let err = store
            .append_photo("missing", 0, Arc::new(vec![1]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownSession { .. }));
    }

    #[tokio::test]
    async fn test_memory_store_tracks_status_and_photos() {
        let store = MemorySessionStore::new();
        let session_id = store.create_session("tpl-2", 7).await.unwrap();

        store
            .append_photo(&session_id, 0, Arc::new(vec![0]))
            .await
            .unwrap();
        store
            .append_photo(&session_id, 1, Arc::new(vec![1]))
            .await
            .unwrap();
        assert_eq!(store.photo_count(&session_id).await, 2);

        store
            .mark_session(&session_id, SessionStatus::Canceled)
            .await
            .unwrap();
        let session = store.session(&session_id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Canceled);
        assert!(session.completed_at.is_none());
    }
}
