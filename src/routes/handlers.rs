use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use log::{debug, error, o, Logger};
use serde::Deserialize;
use uuid::Uuid;
use warp::{
    filters::multipart::FormData,
    http::StatusCode,
    reject,
    reply::{json, with_header, with_status, Reply},
};

use crate::environment::Environment;
use crate::errors::TourisError;
use crate::io::{parse_post, PostSubmission};
use crate::itinerary::{Coordinate, Itinerary, PhotoRef};
use crate::photo::{sniff, PhotoStore};
use crate::trip::Place;
use crate::routes::{
    rejection::{Context, Rejection},
    response::SuccessResponse,
};

const SERVER_TIMING_HEADER: &str = "server-timing";
type RouteResult = Result<Box<dyn Reply>, reject::Rejection>;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct PlaceQuery {
    text: String,
}

macro_rules! timed {
    ($($expression:stmt);+) => {
        let start = Instant::now();

        // TODO when `try` blocks are stabilized, we can wrap the body
        // and return the headers even on errors
        let result = { $($expression);+ };

        Ok(Box::new(with_header(
            result,
            SERVER_TIMING_HEADER,
            format_server_timing(start.elapsed()),
        )) as Box<dyn Reply>)
    };
}

pub async fn session_state(environment: Environment) -> RouteResult {
    timed! {
        json(&environment.session.state())
    }
}

pub async fn sign_in(environment: Environment, credentials: Credentials) -> RouteResult {
    timed! {
        let _user = environment
            .session
            .sign_in(&credentials.email, &credentials.password)
            .await
            .map_err(|e| Rejection::new(Context::sign_in(), e))?;

        json(&environment.session.state())
    }
}

pub async fn create_account(environment: Environment, credentials: Credentials) -> RouteResult {
    timed! {
        let _user = environment
            .session
            .create_account(&credentials.email, &credentials.password)
            .await
            .map_err(|e| Rejection::new(Context::create_account(), e))?;

        with_status(json(&environment.session.state()), StatusCode::CREATED)
    }
}

pub async fn sign_out(environment: Environment) -> RouteResult {
    timed! {
        environment.session.sign_out();
        environment.cache.clear();

        json(&environment.session.state())
    }
}

pub async fn upload_photo(environment: Environment, body: Bytes) -> RouteResult {
    timed! {
        let photo = environment
            .photos
            .upload(body.to_vec())
            .await
            .map_err(|e| Rejection::new(Context::upload_photo(), e))?;

        with_status(json(&SuccessResponse::Photo(photo)), StatusCode::CREATED)
    }
}

pub async fn fetch_photo(environment: Environment, key: String) -> RouteResult {
    timed! {
        let error_handler = |e: TourisError| Rejection::new(Context::fetch_photo(key.clone()), e);

        let id = Uuid::parse_str(&key)
            .map_err(|_| TourisError::InvalidId(key.clone()))
            .map_err(error_handler)?;
        let photo = environment.photos.reference(id).map_err(error_handler)?;

        let raw = environment
            .cache
            .get_or_fetch(&environment.photos, &photo)
            .await
            .map_err(error_handler)?;

        with_header(raw.to_vec(), "content-type", sniff(&raw).to_string())
    }
}

pub async fn create_post(environment: Environment, content: FormData) -> RouteResult {
    timed! {
        let Environment {
            logger,
            session,
            photos,
            itineraries,
            ..
        } = environment.clone();

        let error_handler = |e: TourisError| Rejection::new(Context::create_post(None), e);

        let _user = session.require_user().map_err(error_handler)?;

        let itinerary = build_post(logger.clone(), photos.clone(), content)
            .await
            .map_err(error_handler)?;

        let id = *itinerary.id();
        let logger = Arc::new(logger.new(o!("itinerary" => id.to_string())));
        let uploaded = itinerary.photos().cloned().collect::<Vec<_>>();

        debug!(logger, "Saving itinerary...");
        let itinerary = match itineraries.save(&session, itinerary).await {
            Ok(itinerary) => itinerary,
            Err(e) => {
                roll_back(logger.clone(), photos.clone(), uploaded).await;
                return Err(Rejection::new(Context::create_post(Some(id.to_string())), e).into());
            }
        };

        with_status(
            json(&SuccessResponse::Post { id, itinerary }),
            StatusCode::CREATED,
        )
    }
}

pub async fn save_draft(environment: Environment, content: FormData) -> RouteResult {
    timed! {
        let error_handler = |e: TourisError| Rejection::new(Context::save_draft(), e);

        let owner = environment.session.require_user().map_err(error_handler)?;

        let itinerary = build_post(environment.logger.clone(), environment.photos.clone(), content)
            .await
            .map_err(error_handler)?;

        let id = *itinerary.id();
        debug!(environment.logger, "Keeping draft..."; "itinerary" => %id, "owner" => %owner);
        let itinerary = environment.drafts.add(&owner, itinerary);

        with_status(
            json(&SuccessResponse::Post { id, itinerary }),
            StatusCode::CREATED,
        )
    }
}

pub async fn list_itineraries(environment: Environment) -> RouteResult {
    timed! {
        let itineraries = environment
            .itineraries
            .list(&environment.session)
            .await
            .map_err(|e| Rejection::new(Context::list_itineraries(), e))?;

        json(&SuccessResponse::Itineraries { itineraries })
    }
}

pub async fn delete_itinerary(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: TourisError| Rejection::new(Context::delete_itinerary(id.clone()), e);

        let id = Uuid::parse_str(&id)
            .map_err(|_| TourisError::InvalidId(id.clone()))
            .map_err(error_handler)?;
        let owner = environment.session.require_user().map_err(error_handler)?;
        debug!(environment.logger, "Deleting itinerary..."; "id" => %id);

        // a draft that was never stored still counts as deleted
        let deleted = match environment.itineraries.delete(&environment.session, &id).await {
            Ok(()) => {
                environment.drafts.remove(&owner, &id);
                Ok(())
            }
            Err(TourisError::NonExistentId(_)) if environment.drafts.remove(&owner, &id).is_some() => {
                Ok(())
            }
            Err(e) => Err(e),
        };
        deleted.map_err(error_handler)?;

        StatusCode::NO_CONTENT
    }
}

pub async fn feed(environment: Environment) -> RouteResult {
    timed! {
        let cards = environment
            .feed
            .compose(&environment.session)
            .await
            .map_err(|e| Rejection::new(Context::feed(), e))?;

        json(&SuccessResponse::Feed { cards })
    }
}

pub async fn trip(environment: Environment) -> RouteResult {
    timed! {
        json(&environment.planner.snapshot())
    }
}

pub async fn add_stop(environment: Environment, point: Coordinate) -> RouteResult {
    timed! {
        environment
            .planner
            .add_stop(point)
            .map_err(|e| Rejection::new(Context::add_stop(), e))?;

        with_status(json(&environment.planner.snapshot()), StatusCode::CREATED)
    }
}

pub async fn search_places(environment: Environment, query: PlaceQuery) -> RouteResult {
    timed! {
        let places = environment
            .planner
            .search_places(&query.text)
            .await
            .map_err(|e| Rejection::new(Context::search_places(query.text.clone()), e))?;

        json(&SuccessResponse::Places { places })
    }
}

pub async fn add_place(environment: Environment, place: Place) -> RouteResult {
    timed! {
        environment
            .planner
            .add_place(&place)
            .map_err(|e| Rejection::new(Context::add_place(), e))?;

        with_status(json(&environment.planner.snapshot()), StatusCode::CREATED)
    }
}

pub async fn remove_stop(environment: Environment, index: usize) -> RouteResult {
    timed! {
        let _removed = environment
            .planner
            .remove_stop(index)
            .map_err(|e| Rejection::new(Context::remove_stop(index), e))?;

        json(&environment.planner.snapshot())
    }
}

pub async fn solve_route(environment: Environment) -> RouteResult {
    timed! {
        let route_details = environment
            .planner
            .solve_route()
            .await
            .map_err(|e| Rejection::new(Context::solve_route(), e))?;

        json(&SuccessResponse::Route { route_details })
    }
}

pub async fn save_report(environment: Environment) -> RouteResult {
    timed! {
        let path = environment
            .planner
            .save_report(&environment.config.report_directory)
            .await
            .map_err(|e| Rejection::new(Context::save_report(), e))?;

        with_status(
            json(&SuccessResponse::Report {
                path: path.display().to_string(),
            }),
            StatusCode::CREATED,
        )
    }
}

/// Checks the form, uploads its photos and builds the itinerary. Photos
/// already uploaded are deleted again if a later step fails.
async fn build_post(
    logger: Arc<Logger>,
    photos: Arc<PhotoStore>,
    content: FormData,
) -> Result<Itinerary, TourisError> {
    debug!(logger, "Parsing submission...");
    let PostSubmission {
        metadata,
        photos: raw_photos,
    } = parse_post(content).await?;

    metadata.validate(raw_photos.len())?;

    debug!(logger, "Uploading photos..."; "count" => raw_photos.len());
    let mut uploaded = vec![];

    for raw in raw_photos {
        match photos.upload(raw).await {
            Ok(photo) => uploaded.push(photo),
            Err(e) => {
                roll_back(logger.clone(), photos.clone(), uploaded).await;
                return Err(e);
            }
        }
    }

    match metadata.into_itinerary(uploaded.clone()) {
        Ok(itinerary) => Ok(itinerary),
        Err(e) => {
            roll_back(logger, photos, uploaded).await;
            Err(e)
        }
    }
}

async fn roll_back(logger: Arc<Logger>, photos: Arc<PhotoStore>, uploaded: Vec<PhotoRef>) {
    for photo in uploaded {
        if let Err(e) = photos.delete(&photo).await {
            error!(logger, "Failed to delete photo"; "key" => %photo.key, "error" => %e);
        }
    }
}

fn format_server_timing(seconds: Duration) -> String {
    format!("handler;dur={}", seconds.as_secs_f64() * 1000.0)
}
