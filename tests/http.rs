use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::future::{self, BoxFuture, FutureExt};
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use serde::Deserialize;
use serde_json::json;
use time::{Date, OffsetDateTime, Time};
use warp::http::StatusCode;
use warp::Filter;

use touris::config::Config;
use touris::db::memory::MemoryDb;
use touris::environment::{Backends, Environment};
use touris::errors::{Result, TourisError};
use touris::identity::memory::MemoryIdentity;
use touris::itinerary::Coordinate;
use touris::routes;
use touris::store::memory::MemoryStore;
use touris::trip::{Geocoder, Place, Route, RouteParameters, RoutingService, TripPlanner};

const BOUNDARY: &str = "thisisaboundary1234";
const EMAIL: &str = "traveller@example.com";
const PASSWORD: &str = "hunter22";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionResponse {
    user_id: Option<String>,
    is_signed_in: bool,
    error_message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    context: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct PostResponse {
    id: String,
    itinerary: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    cards: Vec<Card>,
}

#[derive(Debug, Deserialize)]
struct Card {
    itinerary: serde_json::Value,
    photos: Vec<serde_json::Value>,
    missing: usize,
}

#[derive(Debug, Deserialize)]
struct TripResponse {
    state: String,
    stops: Vec<Coordinate>,
    error_message: Option<String>,
    route_details: String,
}

struct FixedRouter {
    calls: AtomicUsize,
}

impl RoutingService for FixedRouter {
    fn default_parameters(&self) -> BoxFuture<Result<RouteParameters>> {
        future::ready(Ok(RouteParameters::default())).boxed()
    }

    fn solve(&self, _parameters: RouteParameters) -> BoxFuture<Result<Vec<Route>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        future::ready(Ok(vec![Route {
            geometry: vec![],
            total_time: 30.0,
            total_length: 1200.0,
            directions: vec![],
        }]))
        .boxed()
    }
}

/// Knows addresses east of the prime meridian only.
struct HalfGeocoder;

impl Geocoder for HalfGeocoder {
    fn reverse_geocode(&self, point: Coordinate) -> BoxFuture<Result<Option<String>>> {
        let result = if point.x >= 0.0 {
            Ok(Some(format!("{} East Street", point.x)))
        } else {
            Err(TourisError::Geocoding("Unable to find address.".into()))
        };

        future::ready(result).boxed()
    }

    fn search(&self, text: &str, max_results: usize) -> BoxFuture<Result<Vec<Place>>> {
        let places = vec![Place {
            name: format!("{} Lookout", text),
            address: "1 Hill Road".to_owned(),
            coordinate: Coordinate::new(-3.5, 40.5),
        }];

        future::ready(Ok(places.into_iter().take(max_results).collect())).boxed()
    }
}

struct Fixture {
    environment: Environment,
    router: Arc<FixedRouter>,
    store: Arc<MemoryStore>,
    report_directory: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let logger = Arc::new(log::discard());

    let identity = Arc::new(MemoryIdentity::new());
    identity.add_account(EMAIL, PASSWORD);

    let store = Arc::new(MemoryStore::default());
    let router = Arc::new(FixedRouter {
        calls: AtomicUsize::new(0),
    });
    let report_directory = tempfile::tempdir().expect("create report directory");

    let backends = Backends {
        identity,
        store: store.clone(),
        db: Arc::new(MemoryDb::new()),
        router: router.clone(),
        geocoder: Arc::new(HalfGeocoder),
    };

    let mut config = Config::default();
    config.report_directory = report_directory.path().to_path_buf();

    let environment = Environment::with_planner(logger.clone(), backends, config, |router, geocoder| {
        TripPlanner::new(logger, router, geocoder).with_clock(Arc::new(start_time))
    });

    Fixture {
        environment,
        router,
        store,
        report_directory,
    }
}

fn start_time() -> OffsetDateTime {
    Date::try_from_ymd(2024, 7, 27)
        .expect("valid date")
        .with_time(Time::try_from_hms(10, 0, 0).expect("valid time"))
        .assume_utc()
}

fn api(
    environment: &Environment,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let logger = environment.logger.clone();

    routes::make_routes(environment.clone())
        .recover(move |r| routes::format_rejection(logger.clone(), r))
}

async fn send(
    environment: &Environment,
    method: &str,
    path: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, Bytes) {
    let mut request = warp::test::request().method(method).path(path);

    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.reply(&api(environment)).await;

    (response.status(), response.body().clone())
}

async fn sign_in(environment: &Environment) {
    let (status, _) = send(
        environment,
        "POST",
        "/session",
        Some(json!({ "email": EMAIL, "password": PASSWORD })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
}

async fn post_form(environment: &Environment, path: &str, metadata: serde_json::Value, photos: &[Vec<u8>]) -> (StatusCode, Bytes) {
    let metadata = serde_json::to_vec(&metadata).expect("serialize metadata");
    let body = make_multipart_body(BOUNDARY.as_bytes(), &metadata, photos);

    let response = warp::test::request()
        .method("POST")
        .path(path)
        .header("content-type", multipart_content_type(BOUNDARY))
        .header("content-length", body.len())
        .body(body)
        .reply(&api(environment))
        .await;

    (response.status(), response.body().clone())
}

fn png() -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
    let mut raw = Cursor::new(vec![]);
    image
        .write_to(&mut raw, ImageOutputFormat::Png)
        .expect("encode test image");

    raw.into_inner()
}

fn post_metadata(name: &str, rating: &str) -> serde_json::Value {
    json!({
        "title": "Weekend in Lisbon",
        "name": name,
        "description": "Custard tarts",
        "rating": rating,
        "coordinate": { "x": -9.2033, "y": 38.6975 }
    })
}

#[tokio::test]
async fn session_flow() {
    let f = fixture();
    let env = &f.environment;

    let (status, body) = send(env, "GET", "/session", None).await;
    assert_eq!(status, StatusCode::OK);
    let state: SessionResponse = serde_json::from_slice(&body).unwrap();
    assert!(!state.is_signed_in);
    assert_eq!(state.user_id, None);

    let (status, body) = send(
        env,
        "POST",
        "/session",
        Some(json!({ "email": EMAIL, "password": "wrong password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.context, "sign_in");
    assert_eq!(
        error.message,
        "The password is invalid or the user does not have a password."
    );
    assert_eq!(
        env.session.state().error_message,
        "The password is invalid or the user does not have a password."
    );

    sign_in(env).await;
    let (_, body) = send(env, "GET", "/session", None).await;
    let state: SessionResponse = serde_json::from_slice(&body).unwrap();
    assert!(state.is_signed_in);
    assert!(state.user_id.is_some());
    assert_eq!(state.error_message, "");

    let (status, body) = send(env, "DELETE", "/session", None).await;
    assert_eq!(status, StatusCode::OK);
    let state: SessionResponse = serde_json::from_slice(&body).unwrap();
    assert!(!state.is_signed_in);
}

#[tokio::test]
async fn create_account_signs_in() {
    let f = fixture();

    let (status, body) = send(
        &f.environment,
        "POST",
        "/session/account",
        Some(json!({ "email": "new@example.com", "password": "longenough" })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let state: SessionResponse = serde_json::from_slice(&body).unwrap();
    assert!(state.is_signed_in);
}

#[tokio::test]
async fn undecodable_photo_is_rejected() {
    let f = fixture();

    let response = warp::test::request()
        .method("POST")
        .path("/photos")
        .body("definitely not a picture")
        .reply(&api(&f.environment))
        .await;

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(f.store.save_count(), 0);
}

#[tokio::test]
async fn uploaded_photo_can_be_fetched() {
    let f = fixture();
    let raw = png();

    let response = warp::test::request()
        .method("POST")
        .path("/photos")
        .body(raw.clone())
        .reply(&api(&f.environment))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let photo: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    let key = photo["key"].as_str().expect("photo key");

    let response = warp::test::request()
        .method("GET")
        .path(&format!("/photos/{}", key))
        .reply(&api(&f.environment))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(response.body().as_ref(), raw.as_slice());
}

#[tokio::test]
async fn posting_requires_sign_in() {
    let f = fixture();

    let (status, body) = post_form(
        &f.environment,
        "/itineraries",
        post_metadata("Belém Tower", "4.5"),
        &[png()],
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.context, "create_post");
    assert_eq!(f.store.save_count(), 0);
}

#[tokio::test]
async fn invalid_posts_upload_nothing() {
    let f = fixture();
    sign_in(&f.environment).await;

    let (status, body) = post_form(
        &f.environment,
        "/itineraries",
        post_metadata("Belém Tower", "six"),
        &[png()],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.message, "Please enter a valid rating.");

    let (status, body) = post_form(
        &f.environment,
        "/itineraries",
        post_metadata("Belém Tower", "4"),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.message, "Please select at least one image.");

    // the second photo fails, so the first is rolled back
    let (status, _) = post_form(
        &f.environment,
        "/itineraries",
        post_metadata("Belém Tower", "4"),
        &[png(), b"garbage".to_vec()],
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(f.store.is_empty());
}

#[tokio::test]
async fn posts_show_up_in_list_and_feed() {
    let f = fixture();
    let env = &f.environment;
    sign_in(env).await;

    let (status, body) = post_form(
        env,
        "/itineraries",
        post_metadata("Belém Tower", "4.5"),
        &[png(), png()],
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let post: PostResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(post.itinerary["title"], "Weekend in Lisbon");

    let (status, _) = post_form(
        env,
        "/drafts",
        post_metadata("Time Out Market", "3"),
        &[png()],
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(env, "GET", "/itineraries", None).await;
    assert_eq!(status, StatusCode::OK);
    let listed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(listed["itineraries"].as_array().map(Vec::len), Some(1));

    let (status, body) = send(env, "GET", "/feed", None).await;
    assert_eq!(status, StatusCode::OK);
    let feed: FeedResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(feed.cards.len(), 2);
    assert_eq!(feed.cards[0].itinerary["id"], post.id.as_str());
    assert_eq!(feed.cards[0].photos.len(), 2);
    assert_eq!(feed.cards[0].missing, 0);
    assert_eq!(feed.cards[1].photos.len(), 1);

    let path = format!("/itineraries/{}", post.id);
    let (status, _) = send(env, "DELETE", &path, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(env, "DELETE", &path, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.context, "delete_itinerary");
}

#[tokio::test]
async fn drafts_stay_with_their_author() {
    let f = fixture();
    let env = &f.environment;

    let (status, _) = post_form(env, "/drafts", post_metadata("Alfama", "4"), &[png()]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    sign_in(env).await;
    let (status, body) = post_form(env, "/drafts", post_metadata("Alfama", "4"), &[png()]).await;
    assert_eq!(status, StatusCode::CREATED);
    let draft: PostResponse = serde_json::from_slice(&body).unwrap();
    assert!(draft.itinerary["owner"].is_string());

    let (status, _) = send(env, "DELETE", "/session", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        env,
        "POST",
        "/session/account",
        Some(json!({ "email": "other@example.com", "password": "another password" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send(env, "GET", "/feed", None).await;
    let feed: FeedResponse = serde_json::from_slice(&body).unwrap();
    assert!(feed.cards.is_empty());

    let path = format!("/itineraries/{}", draft.id);
    let (status, _) = send(env, "DELETE", &path, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(env, "DELETE", "/session", None).await;
    sign_in(env).await;
    let (_, body) = send(env, "GET", "/feed", None).await;
    let feed: FeedResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(feed.cards.len(), 1);
    assert_eq!(feed.cards[0].itinerary["id"], draft.id.as_str());
}

#[tokio::test]
async fn feed_requires_sign_in() {
    let f = fixture();

    let (status, _) = send(&f.environment, "GET", "/feed", None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn trip_planning() {
    let f = fixture();
    let env = &f.environment;

    let (status, body) = send(env, "POST", "/trip/solve", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.message, "Please select at least 2 points.");
    assert_eq!(f.router.calls.load(Ordering::SeqCst), 0);

    for (x, y) in &[(1.0, 40.0), (-2.0, 41.0)] {
        let (status, _) = send(env, "POST", "/trip/stops", Some(json!({ "x": x, "y": y }))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, body) = send(env, "GET", "/trip", None).await;
    let trip: TripResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(trip.state, "ready");
    assert_eq!(trip.stops.len(), 2);

    let (status, body) = send(env, "POST", "/trip/solve", None).await;
    assert_eq!(status, StatusCode::OK);
    let solved: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        solved["route_details"],
        "Start Time: 2024-07-27 10:00:00\n\
         Travel Time: 30 minutes\n\
         Travel Distance: 1200 meters\n\
         Destination Time: 2024-07-27 10:30:00\n\
         \n\
         Pinned Points in Order:\n\
         Point 1: 1 East Street\n\
         Point 2: Unknown Location"
    );

    let (status, _) = send(env, "POST", "/trip/report", None).await;
    assert_eq!(status, StatusCode::CREATED);
    let saved = std::fs::read_to_string(f.report_directory.path().join("routeDetails.txt"))
        .expect("read saved report");
    assert_eq!(saved, solved["route_details"].as_str().unwrap());

    let (_, body) = send(env, "GET", "/trip", None).await;
    let trip: TripResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(trip.state, "solved");
    assert_eq!(trip.error_message, None);
    assert_eq!(trip.route_details, saved);
}

#[tokio::test]
async fn searched_places_join_the_trip_by_name() {
    let f = fixture();
    let env = &f.environment;

    let (status, body) = send(env, "GET", "/places?text=", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.context, "search_places");

    let (status, body) = send(env, "GET", "/places?text=Sunset", None).await;
    assert_eq!(status, StatusCode::OK);
    let found: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let place = found["places"][0].clone();
    assert_eq!(place["name"], "Sunset Lookout");

    let (status, _) = send(env, "POST", "/trip/places", Some(place)).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(env, "POST", "/trip/stops", Some(json!({ "x": 1.0, "y": 40.0 }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(env, "POST", "/trip/solve", None).await;
    assert_eq!(status, StatusCode::OK);
    let solved: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let details = solved["route_details"].as_str().unwrap();

    // the named stop lies west of the meridian, where lookups fail
    assert!(details.contains("Point 1: Sunset Lookout"), "{}", details);
    assert!(details.contains("Point 2: 1 East Street"), "{}", details);
}

#[tokio::test]
async fn sixth_stop_is_refused() {
    let f = fixture();
    let env = &f.environment;

    for i in 0..5 {
        let (status, _) = send(env, "POST", "/trip/stops", Some(json!({ "x": i, "y": 0 }))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(env, "POST", "/trip/stops", Some(json!({ "x": 9, "y": 9 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.message, "You can only add up to 5 stops.");

    let (status, _) = send(env, "DELETE", "/trip/stops/4", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(env, "DELETE", "/trip/stops/4", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn healthz() {
    let f = fixture();

    let response = warp::test::request()
        .method("GET")
        .path("/healthz")
        .reply(&routes::admin::make_healthz_route(f.environment.clone()))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["version"], info::VERSION);
}

fn make_multipart_body(boundary: &[u8], metadata: &[u8], photos: &[Vec<u8>]) -> Vec<u8> {
    const NEWLINE: &[u8] = b"\r\n";
    const METADATA_HEADER: &[u8] = b"Content-Disposition: form-data; name=\"metadata\"\r\n\r\n";
    const PHOTO_HEADER: &[u8] =
        b"Content-Disposition: form-data; name=\"photo\"; filename=\"photo.png\"\r\nContent-Type: image/png\r\n\r\n";

    let boundary = boundary_with_leader(boundary);
    let boundary = boundary.as_slice();

    let mut parts = vec![boundary, NEWLINE, METADATA_HEADER, metadata, NEWLINE];

    for photo in photos {
        parts.extend_from_slice(&[boundary, NEWLINE, PHOTO_HEADER, photo.as_slice(), NEWLINE]);
    }

    parts.push(boundary);
    parts.push(b"--");
    parts.push(NEWLINE);

    parts.concat()
}

fn boundary_with_leader(boundary: &[u8]) -> Vec<u8> {
    const BOUNDARY_LEADER: &[u8] = &[b'-', b'-'];

    let parts = &[BOUNDARY_LEADER, boundary];
    parts.concat()
}

fn multipart_content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={}", boundary)
}
