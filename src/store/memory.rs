use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use bytes::Bytes;
use futures::future::{self, BoxFuture, FutureExt};
use url::{ParseError, Url};
use uuid::Uuid;

use crate::errors::TourisError;
use crate::store::Store;

/// A store that keeps objects in process memory.
pub struct MemoryStore {
    map: RwLock<HashMap<Uuid, (String, Bytes)>>,
    base_url: Url,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new(base_url: Url) -> Self {
        MemoryStore {
            map: RwLock::new(HashMap::new()),
            base_url,
            saves: AtomicUsize::new(0),
        }
    }

    /// How many times `save` has been called, successful or not.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.map.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn content_type(&self, key: &Uuid) -> Option<String> {
        self.map.read().unwrap().get(key).map(|(t, _)| t.clone())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new(Url::parse("memory://photos/").expect("parse memory store URL"))
    }
}

impl Store for MemoryStore {
    fn delete(&self, key: &Uuid) -> BoxFuture<Result<(), TourisError>> {
        let removed = self.map.write().unwrap().remove(key);

        future::ready(removed.map(|_| ()).ok_or(TourisError::PhotoNotFound(*key))).boxed()
    }

    fn get_url(&self, key: &Uuid) -> Result<Url, ParseError> {
        self.base_url.join(&key.to_string())
    }

    fn load(&self, key: &Uuid, max_bytes: u64) -> BoxFuture<Result<Bytes, TourisError>> {
        let result = match self.map.read().unwrap().get(key) {
            Some((_, raw)) if raw.len() as u64 > max_bytes => {
                Err(TourisError::PhotoTooLarge { limit: max_bytes })
            }
            Some((_, raw)) => Ok(raw.clone()),
            None => Err(TourisError::PhotoNotFound(*key)),
        };

        future::ready(result).boxed()
    }

    fn save(&self, key: &Uuid, content_type: String, raw: Vec<u8>) -> BoxFuture<Result<(), TourisError>> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.map
            .write()
            .unwrap()
            .insert(*key, (content_type, Bytes::from(raw)));

        future::ready(Ok(())).boxed()
    }
}
