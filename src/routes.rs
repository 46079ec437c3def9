use std::sync::Arc;

use log::{error, warn, Logger};
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, with_status, Json, WithStatus};

use crate::errors::{ErrorKind, TourisError};

pub mod admin;
mod handlers;
mod rejection;
mod response;

pub use internal::*;

/// The largest "create post" form to accept. Individual photos are also
/// bounded by the photo store when they are read back.
const MAX_FORM_LENGTH: u64 = 64 * 1024 * 1024;

/// The largest JSON body to accept.
const MAX_JSON_LENGTH: u64 = 16 * 1024;

pub async fn format_rejection(
    logger: Arc<Logger>,
    rej: reject::Rejection,
) -> Result<WithStatus<Json>, reject::Rejection> {
    if let Some(r) = rej.find::<rejection::Rejection>() {
        let e = &r.error;
        let status = status_code_for(e);

        if status.is_server_error() {
            error!(logger, "Request failed"; "context" => ?r.context, "error" => ?r.error, "status" => %status, "message" => %r.error);
        } else {
            warn!(logger, "Request rejected"; "context" => ?r.context, "status" => %status, "message" => %r.error);
        }

        let flattened = r.flatten();

        return Ok(with_status(json(&flattened), status));
    }

    Err(rej)
}

fn status_code_for(e: &TourisError) -> StatusCode {
    use TourisError::*;

    match e {
        IdAlreadyExists(_) => StatusCode::FORBIDDEN,
        StopsChanged => StatusCode::CONFLICT,
        PhotoTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        UndecodableImage(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        Io(_) | FailedToGenerateUrl { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        _ => match e.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
            ErrorKind::Missing => StatusCode::NOT_FOUND,
            ErrorKind::External => StatusCode::BAD_GATEWAY,
        },
    }
}

mod internal {
    use warp::body::{bytes, content_length_limit, json};
    use warp::filters::multipart::form;
    use warp::filters::BoxedFilter;
    use warp::filters::query::query;
    use warp::path::end;
    use warp::Filter;
    use warp::Reply;
    use warp::{delete, get as g, path as p, path::param as par, post};

    use super::{handlers, MAX_FORM_LENGTH, MAX_JSON_LENGTH};
    use crate::environment::Environment;

    type Route = BoxedFilter<(Box<dyn Reply>,)>;

    macro_rules! route_filter {
        ($route_variable:ident; $first:expr) => (let $route_variable = $route_variable.and($first););
        ($route_variable:ident; $first:expr, $($rest:expr),+) => (
            let $route_variable = $route_variable.and($first);
            route_filter!($route_variable; $($rest),+);
        )
    }

    macro_rules! route {
        ($name:ident => $handler:ident, $route_variable:ident; $($filters:expr),+) => (
            pub fn $name(environment: Environment) -> Route {
                let $route_variable = warp::any().map(move || environment.clone());

                route_filter!($route_variable; $($filters),+);

                $route_variable.and_then(handlers::$handler)
                    .boxed()
            }
        );
    }

    route!(make_session_route => session_state, rt; p("session"), end(), g());
    route!(make_sign_in_route => sign_in, rt; p("session"), end(), post(), content_length_limit(MAX_JSON_LENGTH), json());
    route!(make_create_account_route => create_account, rt; p("session"), p("account"), end(), post(), content_length_limit(MAX_JSON_LENGTH), json());
    route!(make_sign_out_route => sign_out, rt; p("session"), end(), delete());
    route!(make_upload_photo_route => upload_photo, rt; p("photos"), end(), post(), content_length_limit(MAX_FORM_LENGTH), bytes());
    route!(make_fetch_photo_route => fetch_photo, rt; p("photos"), par::<String>(), end(), g());
    route!(make_create_post_route => create_post, rt; p("itineraries"), end(), post(), form().max_length(MAX_FORM_LENGTH));
    route!(make_save_draft_route => save_draft, rt; p("drafts"), end(), post(), form().max_length(MAX_FORM_LENGTH));
    route!(make_list_itineraries_route => list_itineraries, rt; p("itineraries"), end(), g());
    route!(make_delete_itinerary_route => delete_itinerary, rt; p("itineraries"), par::<String>(), end(), delete());
    route!(make_feed_route => feed, rt; p("feed"), end(), g());
    route!(make_trip_route => trip, rt; p("trip"), end(), g());
    route!(make_add_stop_route => add_stop, rt; p("trip"), p("stops"), end(), post(), content_length_limit(MAX_JSON_LENGTH), json());
    route!(make_search_places_route => search_places, rt; p("places"), end(), g(), query::<handlers::PlaceQuery>());
    route!(make_add_place_route => add_place, rt; p("trip"), p("places"), end(), post(), content_length_limit(MAX_JSON_LENGTH), json());
    route!(make_remove_stop_route => remove_stop, rt; p("trip"), p("stops"), par::<usize>(), end(), delete());
    route!(make_solve_route => solve_route, rt; p("trip"), p("solve"), end(), post());
    route!(make_save_report_route => save_report, rt; p("trip"), p("report"), end(), post());

    /// Every route of the main listener, in matching order.
    pub fn make_routes(environment: Environment) -> Route {
        make_session_route(environment.clone())
            .or(make_sign_in_route(environment.clone()))
            .unify()
            .or(make_create_account_route(environment.clone()))
            .unify()
            .or(make_sign_out_route(environment.clone()))
            .unify()
            .or(make_upload_photo_route(environment.clone()))
            .unify()
            .or(make_fetch_photo_route(environment.clone()))
            .unify()
            .or(make_create_post_route(environment.clone()))
            .unify()
            .or(make_save_draft_route(environment.clone()))
            .unify()
            .or(make_list_itineraries_route(environment.clone()))
            .unify()
            .or(make_delete_itinerary_route(environment.clone()))
            .unify()
            .or(make_feed_route(environment.clone()))
            .unify()
            .or(make_trip_route(environment.clone()))
            .unify()
            .or(make_add_stop_route(environment.clone()))
            .unify()
            .or(make_search_places_route(environment.clone()))
            .unify()
            .or(make_add_place_route(environment.clone()))
            .unify()
            .or(make_remove_stop_route(environment.clone()))
            .unify()
            .or(make_solve_route(environment.clone()))
            .unify()
            .or(make_save_report_route(environment))
            .unify()
            .boxed()
    }
}
