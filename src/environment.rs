use std::sync::Arc;

use log::Logger;

use crate::cache::PhotoCache;
use crate::config::Config;
use crate::db::Db;
use crate::feed::Feed;
use crate::identity::IdentityService;
use crate::itineraries::{Drafts, ItineraryStore};
use crate::photo::PhotoStore;
use crate::session::Session;
use crate::store::Store;
use crate::trip::{Geocoder, RoutingService, TripPlanner};

/// Everything the routes share: one session and the services acting on
/// its behalf.
#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub session: Arc<Session>,
    pub photos: Arc<PhotoStore>,
    pub cache: Arc<PhotoCache>,
    pub itineraries: Arc<ItineraryStore>,
    pub drafts: Arc<Drafts>,
    pub feed: Arc<Feed>,
    pub planner: Arc<TripPlanner>,
    pub config: Config,
}

/// The backends an [`Environment`] is built on.
pub struct Backends {
    pub identity: Arc<dyn IdentityService>,
    pub store: Arc<dyn Store>,
    pub db: Arc<dyn Db>,
    pub router: Arc<dyn RoutingService>,
    pub geocoder: Arc<dyn Geocoder>,
}

impl Environment {
    pub fn new(logger: Arc<Logger>, backends: Backends, config: Config) -> Self {
        Self::with_planner(logger.clone(), backends, config.clone(), |router, geocoder| {
            TripPlanner::new(logger, router, geocoder).with_language(config.directions_language)
        })
    }

    /// Like [`Environment::new`], with the trip planner built by `planner`.
    pub fn with_planner(
        logger: Arc<Logger>,
        backends: Backends,
        config: Config,
        planner: impl FnOnce(Arc<dyn RoutingService>, Arc<dyn Geocoder>) -> TripPlanner,
    ) -> Self {
        let Backends {
            identity,
            store,
            db,
            router,
            geocoder,
        } = backends;

        let session = Arc::new(Session::new(logger.clone(), identity));
        let photos = Arc::new(PhotoStore::new(logger.clone(), store, config.max_photo_bytes));
        let cache = Arc::new(PhotoCache::new());
        let itineraries = Arc::new(ItineraryStore::new(logger.clone(), db));
        let drafts = Arc::new(Drafts::new());
        let feed = Arc::new(Feed::new(
            logger.clone(),
            itineraries.clone(),
            drafts.clone(),
            photos.clone(),
            cache.clone(),
        ));
        let planner = Arc::new(planner(router, geocoder));

        Self {
            logger,
            session,
            photos,
            cache,
            itineraries,
            drafts,
            feed,
            planner,
            config,
        }
    }
}
