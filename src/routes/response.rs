use serde::Serialize;
use uuid::Uuid;

use crate::feed::FeedCard;
use crate::itinerary::{Itinerary, PhotoRef};
use crate::trip::Place;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SuccessResponse<'a> {
    Feed {
        cards: Vec<FeedCard>,
    },
    Healthz {
        revision: Option<&'a str>,
        timestamp: Option<&'a str>,
        version: &'a str,
    },
    Itineraries {
        itineraries: Vec<Itinerary>,
    },
    Photo(PhotoRef),
    Places {
        places: Vec<Place>,
    },
    Post {
        id: Uuid,
        itinerary: Itinerary,
    },
    Report {
        path: String,
    },
    Route {
        route_details: String,
    },
}
