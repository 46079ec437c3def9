use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use uuid::Uuid;

use crate::errors::Result;
use crate::itinerary::PhotoRef;
use crate::photo::PhotoStore;

/// Photo bytes keyed by the photo's storage key.
///
/// Keys are generated once per upload and never reused, so an entry can
/// only go stale if the photo is deleted; callers invalidate it then.
#[derive(Default)]
pub struct PhotoCache {
    entries: RwLock<HashMap<Uuid, Bytes>>,
}

impl PhotoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, photo: &PhotoRef) -> Option<Bytes> {
        self.read().get(&photo.key).cloned()
    }

    pub fn insert(&self, photo: &PhotoRef, raw: Bytes) {
        self.write().insert(photo.key, raw);
    }

    /// Returns the cached bytes, fetching and caching them on a miss.
    /// Failures are not cached.
    pub async fn get_or_fetch(&self, photos: &PhotoStore, photo: &PhotoRef) -> Result<Bytes> {
        if let Some(raw) = self.get(photo) {
            return Ok(raw);
        }

        let raw = photos.fetch(photo).await?;
        self.insert(photo, raw.clone());

        Ok(raw)
    }

    pub fn invalidate(&self, photo: &PhotoRef) -> bool {
        self.write().remove(&photo.key).is_some()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // entries are whole values, so a poisoned map is still consistent
    fn read(&self) -> RwLockReadGuard<HashMap<Uuid, Bytes>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<HashMap<Uuid, Bytes>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::errors::TourisError;
    use crate::photo::{tests::png, DEFAULT_MAX_PHOTO_BYTES};
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn hits_skip_storage() {
        let store = Arc::new(MemoryStore::default());
        let photos = PhotoStore::new(Arc::new(log::discard()), store.clone(), DEFAULT_MAX_PHOTO_BYTES);
        let cache = PhotoCache::new();

        let photo = photos.upload(png()).await.unwrap();
        let first = cache.get_or_fetch(&photos, &photo).await.unwrap();

        photos.delete(&photo).await.unwrap();
        let second = cache.get_or_fetch(&photos, &photo).await.unwrap();
        assert_eq!(first, second);

        assert!(cache.invalidate(&photo));
        assert!(matches!(
            cache.get_or_fetch(&photos, &photo).await,
            Err(TourisError::PhotoNotFound(_))
        ));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn poisoned_cache_keeps_serving() {
        let store = Arc::new(MemoryStore::default());
        let photos = PhotoStore::new(Arc::new(log::discard()), store, DEFAULT_MAX_PHOTO_BYTES);
        let cache = Arc::new(PhotoCache::new());

        let photo = photos.upload(png()).await.unwrap();
        cache.get_or_fetch(&photos, &photo).await.unwrap();

        let poisoner = cache.clone();
        let result = std::thread::spawn(move || {
            let _guard = poisoner.entries.write().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(result.is_err());
        assert!(cache.get(&photo).is_some());
        cache.clear();
        assert!(cache.is_empty());
    }
}
