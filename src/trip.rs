//! Assembles a multi-stop trip and turns a solved route into a readable
//! report.
//!
//! The planner moves through these states:
//!
//! ```text
//! Empty -> Accumulating (1..=4 stops) -> Ready (>= 2 stops) -> Solving -> Solved | Failed
//! ```
//!
//! Adding or removing stops after a solve returns to `Accumulating` or
//! `Ready`; the last report is kept until the next solve replaces it. A
//! solve that finishes after its stops were changed is discarded.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{join_all, BoxFuture};
use log::{debug, o, warn, Logger};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::errors::{Result, TourisError};
use crate::itinerary::{Coordinate, Location};

pub mod arcgis;

/// The most stops a trip can hold.
pub const MAX_STOPS: usize = 5;

/// The fewest stops a route can be solved for.
pub const MIN_STOPS: usize = 2;

/// What an address lookup that failed is shown as.
pub const UNKNOWN_LOCATION: &str = "Unknown Location";

/// The file the report is saved to.
pub const REPORT_FILE_NAME: &str = "routeDetails.txt";

pub const DEFAULT_DIRECTIONS_LANGUAGE: &str = "es";

/// The most places a search returns.
pub const MAX_SEARCH_RESULTS: usize = 10;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What the routing service needs to solve a route.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteParameters {
    /// The stops, visited in this order.
    pub stops: Vec<Coordinate>,
    pub return_directions: bool,
    pub directions_language: Option<String>,
}

/// A route as solved by the routing service.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Route {
    /// The path to draw on the map.
    pub geometry: Vec<Vec<Coordinate>>,

    /// Total travel time in minutes.
    pub total_time: f64,

    /// Total length in meters.
    pub total_length: f64,

    /// Turn-by-turn directions, if they were asked for.
    pub directions: Vec<String>,
}

/// Solves routes through an ordered list of stops.
pub trait RoutingService: Send + Sync {
    /// Returns the service's default parameters, to be filled in with stops.
    fn default_parameters(&self) -> BoxFuture<Result<RouteParameters>>;

    /// Solves the route. An empty list means the service found none.
    fn solve(&self, parameters: RouteParameters) -> BoxFuture<Result<Vec<Route>>>;
}

/// A point of interest found by a text search.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Place {
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub coordinate: Coordinate,
}

/// Looks up addresses and places.
pub trait Geocoder: Send + Sync {
    /// Returns the address nearest to a point.
    fn reverse_geocode(&self, point: Coordinate) -> BoxFuture<Result<Option<String>>>;

    /// Finds places matching free text, best match first.
    fn search(&self, text: &str, max_results: usize) -> BoxFuture<Result<Vec<Place>>>;
}

/// The source of "now", replaceable in tests.
pub type Clock = dyn Fn() -> OffsetDateTime + Send + Sync;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TripState {
    Empty,
    Accumulating,
    Ready,
    Solving,
    Solved,
    Failed,
}

/// The planner as a screen sees it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TripSnapshot {
    pub state: TripState,
    pub stops: Vec<Coordinate>,
    /// The name each stop was added with, if any.
    pub stop_names: Vec<Option<String>>,
    pub error_message: Option<String>,
    pub route_details: String,
    pub route: Option<Route>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Outcome {
    None,
    Solved,
    Failed,
}

struct Inner {
    stops: Vec<Coordinate>,
    names: Vec<Option<String>>,
    /// Bumped on every change to `stops`.
    generation: u64,
    /// Solves started and not yet finished.
    solving: usize,
    outcome: Outcome,
    error_message: Option<String>,
    route_details: String,
    route: Option<Route>,
}

impl Inner {
    fn state(&self) -> TripState {
        if self.solving > 0 {
            return TripState::Solving;
        }

        match self.outcome {
            Outcome::Solved => TripState::Solved,
            Outcome::Failed => TripState::Failed,
            Outcome::None => match self.stops.len() {
                0 => TripState::Empty,
                n if n < MIN_STOPS => TripState::Accumulating,
                _ => TripState::Ready,
            },
        }
    }

    fn stops_changed(&mut self) {
        self.generation += 1;
        self.outcome = Outcome::None;
    }
}

/// Collects up to [`MAX_STOPS`] stops and solves a route through them.
pub struct TripPlanner {
    logger: Arc<Logger>,
    router: Arc<dyn RoutingService>,
    geocoder: Arc<dyn Geocoder>,
    clock: Arc<Clock>,
    language: String,
    inner: Mutex<Inner>,
}

impl TripPlanner {
    pub fn new(
        logger: Arc<Logger>,
        router: Arc<dyn RoutingService>,
        geocoder: Arc<dyn Geocoder>,
    ) -> Self {
        TripPlanner {
            logger: Arc::new(logger.new(o!("component" => "trip"))),
            router,
            geocoder,
            clock: Arc::new(OffsetDateTime::now_utc),
            language: DEFAULT_DIRECTIONS_LANGUAGE.to_owned(),
            inner: Mutex::new(Inner {
                stops: vec![],
                names: vec![],
                generation: 0,
                solving: 0,
                outcome: Outcome::None,
                error_message: None,
                route_details: String::new(),
                route: None,
            }),
        }
    }

    pub fn with_clock(mut self, clock: Arc<Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn snapshot(&self) -> TripSnapshot {
        let inner = self.lock();

        TripSnapshot {
            state: inner.state(),
            stops: inner.stops.clone(),
            stop_names: inner.names.clone(),
            error_message: inner.error_message.clone(),
            route_details: inner.route_details.clone(),
            route: inner.route.clone(),
        }
    }

    pub fn state(&self) -> TripState {
        self.lock().state()
    }

    pub fn stops(&self) -> Vec<Coordinate> {
        self.lock().stops.clone()
    }

    pub fn error_message(&self) -> Option<String> {
        self.lock().error_message.clone()
    }

    pub fn route_details(&self) -> String {
        self.lock().route_details.clone()
    }

    /// Appends a stop. With [`MAX_STOPS`] already held the list is left
    /// alone and the error message says why.
    pub fn add_stop(&self, point: Coordinate) -> Result<()> {
        self.push_stop(point, None)
    }

    /// Adds a saved location as a stop, keeping its name for the report.
    pub fn add_location(&self, location: &Location) -> Result<()> {
        self.push_stop(location.coordinate(), Some(location.name().to_owned()))
    }

    /// Adds a search result as a stop, keeping its name for the report.
    pub fn add_place(&self, place: &Place) -> Result<()> {
        self.push_stop(place.coordinate, Some(place.name.clone()))
    }

    /// Searches for places to add, at most [`MAX_SEARCH_RESULTS`] of them.
    pub async fn search_places(&self, text: &str) -> Result<Vec<Place>> {
        let text = text.trim();

        if text.is_empty() {
            return Err(TourisError::MissingField("search"));
        }

        debug!(self.logger, "Searching places..."; "text" => text);

        let mut places = self.geocoder.search(text, MAX_SEARCH_RESULTS).await?;
        places.truncate(MAX_SEARCH_RESULTS);

        Ok(places)
    }

    fn push_stop(&self, point: Coordinate, name: Option<String>) -> Result<()> {
        let mut inner = self.lock();

        if inner.stops.len() >= MAX_STOPS {
            let error = TourisError::TooManyStops(MAX_STOPS);
            inner.error_message = Some(error.to_string());
            return Err(error);
        }

        inner.stops.push(point);
        inner.names.push(name.filter(|n| !n.trim().is_empty()));
        inner.error_message = None;
        inner.stops_changed();

        debug!(self.logger, "Added stop"; "x" => point.x, "y" => point.y, "count" => inner.stops.len());

        Ok(())
    }

    pub fn remove_stop(&self, index: usize) -> Result<Coordinate> {
        let mut inner = self.lock();

        if index >= inner.stops.len() {
            return Err(TourisError::NoSuchStop(index));
        }

        let removed = inner.stops.remove(index);
        inner.names.remove(index);
        inner.error_message = None;
        inner.stops_changed();

        Ok(removed)
    }

    pub fn clear(&self) {
        let mut inner = self.lock();

        inner.stops.clear();
        inner.names.clear();
        inner.error_message = None;
        inner.stops_changed();
    }

    /// Solves a route through the current stops and returns the report.
    ///
    /// With fewer than [`MIN_STOPS`] stops the routing service is never
    /// called. Service failures are kept as the error message, prefixed
    /// the way the trip screen shows them.
    pub async fn solve_route(&self) -> Result<String> {
        let (stops, names, generation) = {
            let mut inner = self.lock();

            if inner.stops.len() < MIN_STOPS {
                let error = TourisError::NotEnoughStops(MIN_STOPS);
                inner.error_message = Some(error.to_string());
                return Err(error);
            }

            inner.solving += 1;
            inner.error_message = None;
            (inner.stops.clone(), inner.names.clone(), inner.generation)
        };

        debug!(self.logger, "Solving route..."; "stops" => stops.len());

        let result = {
            let _solving = InFlight(self);
            self.solve(&stops, &names).await
        };

        let mut inner = self.lock();

        // a result for stops that are no longer there is thrown away
        if inner.generation != generation {
            debug!(self.logger, "Discarding route for outdated stops"; "stops" => stops.len());
            return Err(TourisError::StopsChanged);
        }

        match result {
            Ok((route, details)) => {
                inner.outcome = Outcome::Solved;
                inner.route_details = details.clone();
                inner.route = Some(route);

                Ok(details)
            }
            Err(e) => {
                warn!(self.logger, "Failed to solve route"; "error" => %e);

                inner.outcome = Outcome::Failed;
                inner.error_message = Some(format!("Failed to calculate the route: {}", e));

                Err(e)
            }
        }
    }

    /// Writes the last report to [`REPORT_FILE_NAME`] in `directory`,
    /// replacing any earlier one.
    pub async fn save_report(&self, directory: &Path) -> Result<PathBuf> {
        let details = self.route_details();

        if details.is_empty() {
            return Err(TourisError::NoReport);
        }

        tokio::fs::create_dir_all(directory).await?;

        let path = directory.join(REPORT_FILE_NAME);
        tokio::fs::write(&path, details).await?;

        debug!(self.logger, "Saved route details"; "path" => %path.display());

        Ok(path)
    }

    async fn solve(&self, stops: &[Coordinate], names: &[Option<String>]) -> Result<(Route, String)> {
        let mut parameters = self.router.default_parameters().await?;
        parameters.stops = stops.to_vec();
        parameters.return_directions = true;
        parameters.directions_language = Some(self.language.clone());

        let route = self
            .router
            .solve(parameters)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TourisError::Routing("No route found.".to_owned()))?;

        let start = (self.clock)();
        let addresses = self.addresses(stops, names).await;

        let details = format_report(start, &route, &addresses);

        Ok((route, details))
    }

    /// Names every stop, looking up the unnamed ones all at once. Failed
    /// lookups become [`UNKNOWN_LOCATION`] for that stop only.
    async fn addresses(&self, stops: &[Coordinate], names: &[Option<String>]) -> Vec<String> {
        let lookups = stops.iter().zip(names).map(|(&stop, name)| async move {
            if let Some(name) = name {
                return name.clone();
            }

            match self.geocoder.reverse_geocode(stop).await {
                Ok(Some(address)) => address,
                Ok(None) => UNKNOWN_LOCATION.to_owned(),
                Err(e) => {
                    warn!(self.logger, "Reverse geocoding failed"; "x" => stop.x, "y" => stop.y, "error" => %e);
                    UNKNOWN_LOCATION.to_owned()
                }
            }
        });

        join_all(lookups).await
    }

    fn lock(&self) -> MutexGuard<Inner> {
        // a panic while holding the lock can't leave `Inner` half-updated
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Counts a solve as running until dropped, even if its future is
/// abandoned part way.
struct InFlight<'a>(&'a TripPlanner);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.lock().solving -= 1;
    }
}

/// The time the trip ends if it starts at `start` and takes
/// `travel_minutes`. Fractions of a minute are dropped.
pub fn destination_time(start: OffsetDateTime, travel_minutes: f64) -> OffsetDateTime {
    start + Duration::minutes(travel_minutes.trunc() as i64)
}

pub fn format_report(start: OffsetDateTime, route: &Route, addresses: &[String]) -> String {
    let destination = destination_time(start, route.total_time);

    let pinned = addresses
        .iter()
        .enumerate()
        .map(|(i, address)| format!("Point {}: {}", i + 1, address))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Start Time: {}\nTravel Time: {} minutes\nTravel Distance: {} meters\nDestination Time: {}\n\nPinned Points in Order:\n{}",
        start.format(TIMESTAMP_FORMAT),
        route.total_time,
        route.total_length.round(),
        destination.format(TIMESTAMP_FORMAT),
        pinned,
    )
}

/// Where reports go when no directory is configured.
pub fn default_report_directory() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "Touris").map(|dirs| dirs.data_dir().to_path_buf())
}
