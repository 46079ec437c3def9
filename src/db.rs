use futures::future::BoxFuture;
use uuid::Uuid;

use crate::errors::TourisError;
use crate::itinerary::Itinerary;
use crate::session::UserId;

pub mod memory;

/// The document store holding itineraries, partitioned by owner.
pub trait Db: Send + Sync {
    /// Inserts the itinerary or replaces the one with the same ID.
    fn upsert(&self, owner: &UserId, itinerary: Itinerary) -> BoxFuture<Result<(), TourisError>>;

    /// Returns every itinerary belonging to `owner`.
    fn list(&self, owner: &UserId) -> BoxFuture<Result<Vec<Itinerary>, TourisError>>;

    fn delete(&self, owner: &UserId, id: &Uuid) -> BoxFuture<Result<(), TourisError>>;
}

pub use self::postgres::*;

mod postgres {
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use sqlx::postgres::PgPool;
    use sqlx::types::Json;
    use uuid::Uuid;

    use crate::errors::TourisError;
    use crate::itinerary::Itinerary;
    use crate::session::UserId;

    pub struct PgDb {
        pool: PgPool,
    }

    impl PgDb {
        pub fn new(pool: PgPool) -> Self {
            PgDb { pool }
        }
    }

    // these can be simplified once async functions in traits are stabilized
    impl super::Db for PgDb {
        fn upsert(&self, owner: &UserId, itinerary: Itinerary) -> BoxFuture<Result<(), TourisError>> {
            let owner = owner.as_str().to_owned();

            async move {
                let id = *itinerary.id();
                let query = sqlx::query(include_str!("queries/upsert_itinerary.sql"));

                let count = query
                    .bind(id)
                    .bind(owner)
                    .bind(Json(itinerary))
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                // the conflict clause skips rows owned by someone else
                if count == 0 {
                    Err(TourisError::IdAlreadyExists(id))
                } else {
                    Ok(())
                }
            }
            .boxed()
        }

        fn list(&self, owner: &UserId) -> BoxFuture<Result<Vec<Itinerary>, TourisError>> {
            let owner = owner.as_str().to_owned();

            async move {
                let query = sqlx::query_as::<_, (Json<Itinerary>,)>(include_str!(
                    "queries/list_itineraries.sql"
                ));

                let rows = query
                    .bind(owner)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(rows.into_iter().map(|(Json(itinerary),)| itinerary).collect())
            }
            .boxed()
        }

        fn delete(&self, owner: &UserId, id: &Uuid) -> BoxFuture<Result<(), TourisError>> {
            let owner = owner.as_str().to_owned();
            let id = *id;

            async move {
                let query = sqlx::query(include_str!("queries/delete_itinerary.sql"));

                let count = query
                    .bind(id)
                    .bind(owner)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                if count == 0 {
                    Err(TourisError::NonExistentId(id))
                } else {
                    Ok(())
                }
            }
            .boxed()
        }
    }

    fn map_sqlx_error(error: sqlx::Error) -> TourisError {
        TourisError::Sqlx { source: error }
    }
}
