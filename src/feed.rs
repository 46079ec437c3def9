use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, o, warn, Logger};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cache::PhotoCache;
use crate::errors::Result;
use crate::itineraries::{Drafts, ItineraryStore};
use crate::itinerary::{Itinerary, PhotoRef};
use crate::photo::PhotoStore;
use crate::session::Session;

/// How many events a running [`FeedTask`] buffers before it waits for
/// the reader.
const EVENT_BUFFER: usize = 16;

/// A photo that was fetched for display.
#[derive(Clone, Debug, Serialize)]
pub struct ResolvedPhoto {
    #[serde(flatten)]
    pub photo: PhotoRef,

    /// The size of the fetched image in bytes.
    pub size: usize,

    #[serde(skip)]
    pub raw: Bytes,
}

/// One itinerary, ready to render.
#[derive(Clone, Debug, Serialize)]
pub struct FeedCard {
    pub itinerary: Itinerary,

    /// The photos that could be fetched, in location order.
    pub photos: Vec<ResolvedPhoto>,

    /// How many photos failed to load and were left out.
    pub missing: usize,
}

#[derive(Debug)]
pub enum FeedEvent {
    /// A card whose photos have all been resolved.
    Card(FeedCard),
    /// The itinerary listing itself failed; no cards will follow.
    Failed(String),
    /// Every card has been sent.
    Done,
}

/// Builds the feed: stored itineraries plus local drafts, each decorated
/// with its photos.
pub struct Feed {
    logger: Arc<Logger>,
    itineraries: Arc<ItineraryStore>,
    drafts: Arc<Drafts>,
    photos: Arc<PhotoStore>,
    cache: Arc<PhotoCache>,
}

impl Feed {
    pub fn new(
        logger: Arc<Logger>,
        itineraries: Arc<ItineraryStore>,
        drafts: Arc<Drafts>,
        photos: Arc<PhotoStore>,
        cache: Arc<PhotoCache>,
    ) -> Self {
        Feed {
            logger: Arc::new(logger.new(o!("component" => "feed"))),
            itineraries,
            drafts,
            photos,
            cache,
        }
    }

    /// Composes the whole feed and returns the cards in listing order.
    pub async fn compose(&self, session: &Session) -> Result<Vec<FeedCard>> {
        let sources = self.sources(session).await?;

        Ok(join_all(sources.into_iter().map(|i| self.resolve(i))).await)
    }

    /// Composes the feed on a background task, sending each card as soon
    /// as its photos are in. Cards arrive in completion order.
    pub fn spawn(self: &Arc<Self>, session: Arc<Session>) -> FeedTask {
        let (sender, events) = mpsc::channel(EVENT_BUFFER);
        let feed = self.clone();

        let handle = tokio::spawn(async move {
            let sources = match feed.sources(&session).await {
                Ok(sources) => sources,
                Err(e) => {
                    let _ = sender.send(FeedEvent::Failed(e.to_string())).await;
                    return;
                }
            };

            let mut pending = sources
                .into_iter()
                .map(|i| feed.resolve(i))
                .collect::<FuturesUnordered<_>>();

            while let Some(card) = pending.next().await {
                if sender.send(FeedEvent::Card(card)).await.is_err() {
                    // nobody is listening any more
                    return;
                }
            }

            let _ = sender.send(FeedEvent::Done).await;
        });

        FeedTask { handle, events }
    }

    /// Stored itineraries first, then the identity's drafts that have not
    /// been stored.
    async fn sources(&self, session: &Session) -> Result<Vec<Itinerary>> {
        let owner = session.require_user()?;
        let mut itineraries = self.itineraries.list(session).await?;
        let stored = itineraries.iter().map(|i| *i.id()).collect::<HashSet<_>>();

        itineraries.extend(
            self.drafts
                .owned_by(&owner)
                .into_iter()
                .filter(|d| !stored.contains(d.id())),
        );

        debug!(self.logger, "Composing feed..."; "itineraries" => itineraries.len());

        Ok(itineraries)
    }

    /// Fetches every photo of one itinerary concurrently and waits for all
    /// of them. Failed fetches are logged and left out.
    async fn resolve(&self, itinerary: Itinerary) -> FeedCard {
        let refs = itinerary.photos().cloned().collect::<Vec<_>>();

        let results = join_all(refs.into_iter().map(|photo| async move {
            let result = self.cache.get_or_fetch(&self.photos, &photo).await;
            (photo, result)
        }))
        .await;

        let mut photos = vec![];
        let mut missing = 0;

        for (photo, result) in results {
            match result {
                Ok(raw) => photos.push(ResolvedPhoto {
                    photo,
                    size: raw.len(),
                    raw,
                }),
                Err(e) => {
                    warn!(self.logger, "Leaving out photo"; "itinerary" => %itinerary.id(), "key" => %photo.key, "error" => %e);
                    missing += 1;
                }
            }
        }

        FeedCard {
            itinerary,
            photos,
            missing,
        }
    }
}

/// A feed being composed in the background. Dropping it cancels whatever
/// is still in flight.
pub struct FeedTask {
    handle: JoinHandle<()>,
    events: mpsc::Receiver<FeedEvent>,
}

impl FeedTask {
    pub async fn next(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for FeedTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
