use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct StoredMedia {
    pub mime_type: String,
    pub bytes: Bytes,
    pub stored_at: DateTime<Utc>,
}

/// In-memory blob store backing `/api/media/:id`.
#[derive(Clone, Default)]
pub struct MediaStore {
    inner: Arc<RwLock<HashMap<Uuid, StoredMedia>>>,
}

impl MediaStore {
    pub fn put(&self, bytes: Bytes, mime_type: impl Into<String>) -> Uuid {
        let id = Uuid::new_v4();
        let media = StoredMedia { mime_type: mime_type.into(), bytes, stored_at: Utc::now() };
        self.inner.write().insert(id, media);
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<StoredMedia> {
        self.inner.read().get(id).cloned()
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        self.inner.write().remove(id).is_some()
    }

    /// Drops every entry `expired` selects and returns how many went.
    pub fn prune(&self, mut expired: impl FnMut(&Uuid, &StoredMedia) -> bool) -> usize {
        let mut inner = self.inner.write();
        let before = inner.len();
        inner.retain(|id, media| !expired(id, media));
        before - inner.len()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn url_for(id: &Uuid) -> String {
        format!("/api/media/{id}")
    }
}
