use serde::Serialize;
use warp::reject;

use crate::errors::TourisError;

#[derive(Debug)]
pub struct Rejection {
    pub(crate) context: Context,
    pub(crate) error: TourisError,
}

impl Rejection {
    pub fn new(context: Context, error: TourisError) -> Self {
        Rejection { context, error }
    }

    pub fn flatten(&self) -> FlattenedRejection {
        FlattenedRejection {
            context: self.context.clone(),
            message: format!("{}", self.error),
        }
    }
}

impl reject::Reject for Rejection {}

#[derive(Debug, Serialize)]
pub struct FlattenedRejection {
    #[serde(flatten)]
    pub(crate) context: Context,
    pub(crate) message: String,
}

/// What the request was doing when it failed.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "context", rename_all = "snake_case")]
pub enum Context {
    SignIn,
    CreateAccount,
    UploadPhoto,
    FetchPhoto { key: String },
    CreatePost { id: Option<String> },
    SaveDraft,
    ListItineraries,
    DeleteItinerary { id: String },
    Feed,
    AddStop,
    SearchPlaces { text: String },
    AddPlace,
    RemoveStop { index: usize },
    SolveRoute,
    SaveReport,
}

impl Context {
    pub fn sign_in() -> Context {
        Context::SignIn
    }

    pub fn create_account() -> Context {
        Context::CreateAccount
    }

    pub fn upload_photo() -> Context {
        Context::UploadPhoto
    }

    pub fn fetch_photo(key: String) -> Context {
        Context::FetchPhoto { key }
    }

    pub fn create_post(id: Option<String>) -> Context {
        Context::CreatePost { id }
    }

    pub fn save_draft() -> Context {
        Context::SaveDraft
    }

    pub fn list_itineraries() -> Context {
        Context::ListItineraries
    }

    pub fn delete_itinerary(id: String) -> Context {
        Context::DeleteItinerary { id }
    }

    pub fn feed() -> Context {
        Context::Feed
    }

    pub fn add_stop() -> Context {
        Context::AddStop
    }

    pub fn search_places(text: String) -> Context {
        Context::SearchPlaces { text }
    }

    pub fn add_place() -> Context {
        Context::AddPlace
    }

    pub fn remove_stop(index: usize) -> Context {
        Context::RemoveStop { index }
    }

    pub fn solve_route() -> Context {
        Context::SolveRoute
    }

    pub fn save_report() -> Context {
        Context::SaveReport
    }
}
