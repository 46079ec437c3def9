use std::sync::RwLock;

use futures::future::{self, BoxFuture, FutureExt};
use uuid::Uuid;

use crate::db::Db;
use crate::errors::TourisError;
use crate::itinerary::Itinerary;
use crate::session::UserId;

/// Itineraries held in process memory, in insertion order.
#[derive(Default)]
pub struct MemoryDb {
    rows: RwLock<Vec<(UserId, Itinerary)>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn upsert_now(&self, owner: &UserId, itinerary: Itinerary) -> Result<(), TourisError> {
        let mut rows = self.rows.write().unwrap();

        let position = rows.iter().position(|(_, i)| i.id() == itinerary.id());

        match position {
            Some(index) if rows[index].0 != *owner => {
                Err(TourisError::IdAlreadyExists(*itinerary.id()))
            }
            Some(index) => {
                rows[index].1 = itinerary;
                Ok(())
            }
            None => {
                rows.push((owner.clone(), itinerary));
                Ok(())
            }
        }
    }

    fn delete_now(&self, owner: &UserId, id: &Uuid) -> Result<(), TourisError> {
        let mut rows = self.rows.write().unwrap();
        let before = rows.len();

        rows.retain(|(o, i)| !(o == owner && i.id() == id));

        if rows.len() == before {
            Err(TourisError::NonExistentId(*id))
        } else {
            Ok(())
        }
    }
}

impl Db for MemoryDb {
    fn upsert(&self, owner: &UserId, itinerary: Itinerary) -> BoxFuture<Result<(), TourisError>> {
        future::ready(self.upsert_now(owner, itinerary)).boxed()
    }

    fn list(&self, owner: &UserId) -> BoxFuture<Result<Vec<Itinerary>, TourisError>> {
        let itineraries = self
            .rows
            .read()
            .unwrap()
            .iter()
            .filter(|(o, _)| o == owner)
            .map(|(_, i)| i.clone())
            .collect();

        future::ready(Ok(itineraries)).boxed()
    }

    fn delete(&self, owner: &UserId, id: &Uuid) -> BoxFuture<Result<(), TourisError>> {
        future::ready(self.delete_now(owner, id)).boxed()
    }
}
