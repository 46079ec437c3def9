use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, o, Logger};
use uuid::Uuid;

use crate::db::Db;
use crate::errors::Result;
use crate::itinerary::Itinerary;
use crate::session::{Session, UserId};

/// Reads and writes the signed-in identity's itineraries.
pub struct ItineraryStore {
    logger: Arc<Logger>,
    db: Arc<dyn Db>,
}

impl ItineraryStore {
    pub fn new(logger: Arc<Logger>, db: Arc<dyn Db>) -> Self {
        ItineraryStore {
            logger: Arc::new(logger.new(o!("component" => "itineraries"))),
            db,
        }
    }

    /// Saves the itinerary under the signed-in identity. Last write wins.
    pub async fn save(&self, session: &Session, mut itinerary: Itinerary) -> Result<Itinerary> {
        let owner = session.require_user()?;
        itinerary.set_owner(owner.clone());

        debug!(self.logger, "Saving itinerary..."; "id" => %itinerary.id(), "owner" => %owner);
        self.db.upsert(&owner, itinerary.clone()).await?;

        Ok(itinerary)
    }

    /// Lists the signed-in identity's itineraries in storage order.
    pub async fn list(&self, session: &Session) -> Result<Vec<Itinerary>> {
        let owner = session.require_user()?;

        debug!(self.logger, "Listing itineraries..."; "owner" => %owner);
        self.db.list(&owner).await
    }

    pub async fn delete(&self, session: &Session, id: &Uuid) -> Result<()> {
        let owner = session.require_user()?;

        debug!(self.logger, "Deleting itinerary..."; "id" => %id, "owner" => %owner);
        self.db.delete(&owner, id).await
    }
}

/// Itineraries created on this device that have not been saved yet.
///
/// Each draft belongs to the identity that was signed in when it was
/// made and is only visible to that identity.
#[derive(Default)]
pub struct Drafts {
    itineraries: RwLock<Vec<Itinerary>>,
}

impl Drafts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps a draft for `owner` and returns it with the owner stamped.
    pub fn add(&self, owner: &UserId, mut itinerary: Itinerary) -> Itinerary {
        itinerary.set_owner(owner.clone());
        self.write().push(itinerary.clone());

        itinerary
    }

    /// Drops one of `owner`'s drafts, once it has been saved or deleted.
    pub fn remove(&self, owner: &UserId, id: &Uuid) -> Option<Itinerary> {
        let mut itineraries = self.write();
        let index = itineraries
            .iter()
            .position(|i| i.id() == id && i.owner() == Some(owner))?;

        Some(itineraries.remove(index))
    }

    pub fn owned_by(&self, owner: &UserId) -> Vec<Itinerary> {
        self.read()
            .iter()
            .filter(|i| i.owner() == Some(owner))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // a panic elsewhere can't leave the list half-updated
    fn read(&self) -> RwLockReadGuard<Vec<Itinerary>> {
        self.itineraries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<Vec<Itinerary>> {
        self.itineraries.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryDb;
    use crate::errors::TourisError;
    use crate::identity::memory::MemoryIdentity;

    async fn signed_in(identity: Arc<MemoryIdentity>, email: &str) -> Session {
        identity.add_account(email, "password1");
        let session = Session::new(Arc::new(log::discard()), identity);
        session.sign_in(email, "password1").await.unwrap();

        session
    }

    #[tokio::test]
    async fn requires_sign_in() {
        let identity = Arc::new(MemoryIdentity::new());
        let store = ItineraryStore::new(Arc::new(log::discard()), Arc::new(MemoryDb::new()));
        let session = Session::new(Arc::new(log::discard()), identity);

        assert!(matches!(
            store.save(&session, Itinerary::new("Weekend", "")).await,
            Err(TourisError::NotSignedIn)
        ));
        assert!(matches!(store.list(&session).await, Err(TourisError::NotSignedIn)));
    }

    #[tokio::test]
    async fn list_is_scoped_to_owner() {
        let identity = Arc::new(MemoryIdentity::new());
        let store = ItineraryStore::new(Arc::new(log::discard()), Arc::new(MemoryDb::new()));
        let alice = signed_in(identity.clone(), "alice@example.com").await;
        let bob = signed_in(identity, "bob@example.com").await;

        let saved = store.save(&alice, Itinerary::new("Portland", "")).await.unwrap();
        store.save(&bob, Itinerary::new("Los Angeles", "")).await.unwrap();

        let listed = store.list(&alice).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title(), "Portland");
        assert_eq!(listed[0].owner(), alice.user_id().as_ref());

        assert!(matches!(
            store.delete(&bob, saved.id()).await,
            Err(TourisError::NonExistentId(_))
        ));
        store.delete(&alice, saved.id()).await.unwrap();
        assert!(store.list(&alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn last_write_wins() {
        let identity = Arc::new(MemoryIdentity::new());
        let store = ItineraryStore::new(Arc::new(log::discard()), Arc::new(MemoryDb::new()));
        let alice = signed_in(identity, "alice@example.com").await;

        let mut itinerary = store.save(&alice, Itinerary::new("Draft", "")).await.unwrap();
        itinerary.title = "Final".to_owned();
        store.save(&alice, itinerary).await.unwrap();

        let listed = store.list(&alice).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title(), "Final");
    }

    #[test]
    fn drafts_belong_to_their_owner() {
        let drafts = Drafts::new();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        let draft = drafts.add(&alice, Itinerary::new("Unsynced", ""));
        let id = *draft.id();

        assert_eq!(draft.owner(), Some(&alice));
        assert_eq!(drafts.owned_by(&alice).len(), 1);
        assert!(drafts.owned_by(&bob).is_empty());
        assert!(drafts.remove(&bob, &id).is_none());

        assert!(drafts.remove(&alice, &id).is_some());
        assert!(drafts.is_empty());
    }

    #[test]
    fn drafts_survive_a_poisoned_lock() {
        let drafts = Arc::new(Drafts::new());
        let alice = UserId::new("alice");
        drafts.add(&alice, Itinerary::new("Kept", ""));

        let poisoner = drafts.clone();
        let result = std::thread::spawn(move || {
            let _guard = poisoner.itineraries.write().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(result.is_err());
        assert_eq!(drafts.owned_by(&alice).len(), 1);
        drafts.add(&alice, Itinerary::new("Added after", ""));
        assert_eq!(drafts.len(), 2);
    }
}
