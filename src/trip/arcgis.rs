//! Routing and reverse geocoding through the ArcGIS REST services.

use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::{Geocoder, Place, Route, RouteParameters, RoutingService};
use crate::errors::{Result, TourisError};
use crate::itinerary::Coordinate;

pub const DEFAULT_ROUTE_URL: &str =
    "https://route-api.arcgis.com/arcgis/rest/services/World/Route/NAServer/Route_World/";

pub const DEFAULT_GEOCODE_URL: &str =
    "https://geocode-api.arcgis.com/arcgis/rest/services/World/GeocodeServer/";

const ROUTING: &str = "routing";
const GEOCODING: &str = "geocoding";

/// ArcGIS answers most failures with a 200 and an `error` member.
#[derive(Deserialize)]
#[serde(untagged)]
enum Reply<T> {
    Failure { error: ServiceError },
    Success(T),
}

#[derive(Deserialize)]
struct ServiceError {
    #[serde(default)]
    code: i64,
    message: String,
    #[serde(default)]
    details: Vec<String>,
}

impl ServiceError {
    fn describe(self) -> String {
        match self.details.into_iter().find(|d| !d.is_empty()) {
            Some(detail) => detail,
            None if self.message.is_empty() => format!("Error code {}", self.code),
            None => self.message,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceDescription {
    #[serde(default)]
    directions_language: Option<String>,
}

#[derive(Deserialize)]
struct SolveResponse {
    #[serde(default)]
    routes: Option<FeatureSet<RouteAttributes, PathGeometry>>,
    #[serde(default)]
    directions: Vec<Directions>,
}

#[derive(Deserialize)]
struct FeatureSet<A, G> {
    #[serde(default = "Vec::new")]
    features: Vec<Feature<A, G>>,
}

#[derive(Deserialize)]
struct Feature<A, G> {
    attributes: A,
    geometry: Option<G>,
}

#[derive(Deserialize)]
struct RouteAttributes {
    #[serde(rename = "Total_TravelTime", default)]
    total_travel_time: Option<f64>,
    #[serde(rename = "Total_Minutes", default)]
    total_minutes: Option<f64>,
    #[serde(rename = "Total_Kilometers", default)]
    total_kilometers: Option<f64>,
}

#[derive(Deserialize)]
struct PathGeometry {
    #[serde(default)]
    paths: Vec<Vec<[f64; 2]>>,
}

#[derive(Deserialize)]
struct Directions {
    #[serde(default)]
    features: Vec<Feature<DirectionAttributes, serde_json::Value>>,
}

#[derive(Deserialize)]
struct DirectionAttributes {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ReverseGeocodeResponse {
    address: Address,
}

#[derive(Deserialize)]
struct Address {
    #[serde(rename = "Match_addr", default)]
    match_addr: Option<String>,
    #[serde(rename = "LongLabel", default)]
    long_label: Option<String>,
}

#[derive(Deserialize)]
struct CandidatesResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    address: String,
    location: Coordinate,
    #[serde(default)]
    attributes: CandidateAttributes,
}

#[derive(Default, Deserialize)]
struct CandidateAttributes {
    #[serde(rename = "PlaceName", default)]
    place_name: Option<String>,
    #[serde(rename = "Place_addr", default)]
    place_addr: Option<String>,
}

/// Solves routes with an ArcGIS network analysis service.
pub struct ArcGisRouter {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl ArcGisRouter {
    pub fn new(client: reqwest::Client, base_url: Url, api_key: impl Into<String>) -> Self {
        ArcGisRouter {
            client,
            base_url,
            api_key: api_key.into(),
        }
    }

    async fn describe(&self) -> Result<RouteParameters> {
        let description: ServiceDescription = get(
            &self.client,
            ROUTING,
            self.base_url.clone(),
            &[("f", "json"), ("token", self.api_key.as_str())],
            TourisError::Routing,
        )
        .await?;

        Ok(RouteParameters {
            stops: vec![],
            return_directions: false,
            directions_language: description.directions_language,
        })
    }

    async fn solve_now(&self, parameters: RouteParameters) -> Result<Vec<Route>> {
        let url = self
            .base_url
            .join("solve")
            .map_err(|source| TourisError::FailedToGenerateUrl { source })?;

        let mut form = vec![
            ("f", "json".to_owned()),
            ("token", self.api_key.clone()),
            ("stops", format_stops(&parameters.stops)),
            ("returnDirections", parameters.return_directions.to_string()),
            ("returnRoutes", "true".to_owned()),
        ];

        if let Some(language) = parameters.directions_language {
            form.push(("directionsLanguage", language));
        }

        let response = self
            .client
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(|source| TourisError::Http {
                service: ROUTING,
                source,
            })?;

        let reply = read(response, ROUTING).await?;

        routes_from(reply).map_err(TourisError::Routing)
    }
}

impl RoutingService for ArcGisRouter {
    fn default_parameters(&self) -> BoxFuture<Result<RouteParameters>> {
        self.describe().boxed()
    }

    fn solve(&self, parameters: RouteParameters) -> BoxFuture<Result<Vec<Route>>> {
        self.solve_now(parameters).boxed()
    }
}

/// Looks up addresses with an ArcGIS geocoding service.
pub struct ArcGisGeocoder {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl ArcGisGeocoder {
    pub fn new(client: reqwest::Client, base_url: Url, api_key: impl Into<String>) -> Self {
        ArcGisGeocoder {
            client,
            base_url,
            api_key: api_key.into(),
        }
    }

    async fn lookup(&self, point: Coordinate) -> Result<Option<String>> {
        let url = self
            .base_url
            .join("reverseGeocode")
            .map_err(|source| TourisError::FailedToGenerateUrl { source })?;
        let location = format!("{},{}", point.x, point.y);

        let response: ReverseGeocodeResponse = get(
            &self.client,
            GEOCODING,
            url,
            &[
                ("f", "json"),
                ("token", self.api_key.as_str()),
                ("location", location.as_str()),
            ],
            TourisError::Geocoding,
        )
        .await?;

        let address = response.address;

        Ok(address
            .match_addr
            .or(address.long_label)
            .filter(|a| !a.trim().is_empty()))
    }

    async fn find(&self, text: String, max_results: usize) -> Result<Vec<Place>> {
        let url = self
            .base_url
            .join("findAddressCandidates")
            .map_err(|source| TourisError::FailedToGenerateUrl { source })?;
        let max_locations = max_results.to_string();

        let response: CandidatesResponse = get(
            &self.client,
            GEOCODING,
            url,
            &[
                ("f", "json"),
                ("token", self.api_key.as_str()),
                ("SingleLine", text.as_str()),
                ("outFields", "PlaceName,Place_addr"),
                ("maxLocations", max_locations.as_str()),
            ],
            TourisError::Geocoding,
        )
        .await?;

        Ok(places_from(response))
    }
}

impl Geocoder for ArcGisGeocoder {
    fn reverse_geocode(&self, point: Coordinate) -> BoxFuture<Result<Option<String>>> {
        self.lookup(point).boxed()
    }

    fn search(&self, text: &str, max_results: usize) -> BoxFuture<Result<Vec<Place>>> {
        self.find(text.to_owned(), max_results).boxed()
    }
}

/// Sends a GET and decodes the reply, turning the service's own error
/// message into `failure`.
async fn get<T: DeserializeOwned>(
    client: &reqwest::Client,
    service: &'static str,
    url: Url,
    query: &[(&str, &str)],
    failure: fn(String) -> TourisError,
) -> Result<T> {
    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|source| TourisError::Http { service, source })?;

    match read::<T>(response, service).await? {
        Reply::Success(value) => Ok(value),
        Reply::Failure { error } => Err(failure(error.describe())),
    }
}

async fn read<T: DeserializeOwned>(response: reqwest::Response, service: &'static str) -> Result<Reply<T>> {
    response
        .error_for_status()
        .map_err(|source| TourisError::Http { service, source })?
        .json::<Reply<T>>()
        .await
        .map_err(|source| TourisError::Http { service, source })
}

/// Names each candidate after the place, falling back to its address.
fn places_from(response: CandidatesResponse) -> Vec<Place> {
    response
        .candidates
        .into_iter()
        .map(|candidate| {
            let attributes = candidate.attributes;
            let candidate_address = &candidate.address;
            let address = attributes
                .place_addr
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| candidate_address.clone());

            Place {
                name: attributes
                    .place_name
                    .filter(|n| !n.is_empty())
                    .unwrap_or(candidate.address),
                address,
                coordinate: candidate.location,
            }
        })
        .collect()
}

fn format_stops(stops: &[Coordinate]) -> String {
    stops
        .iter()
        .map(|c| format!("{},{}", c.x, c.y))
        .collect::<Vec<_>>()
        .join(";")
}

fn routes_from(reply: Reply<SolveResponse>) -> std::result::Result<Vec<Route>, String> {
    let response = match reply {
        Reply::Success(response) => response,
        Reply::Failure { error } => return Err(error.describe()),
    };

    let directions = response
        .directions
        .into_iter()
        .next()
        .map(|d| {
            d.features
                .into_iter()
                .map(|f| f.attributes.text)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let features = response.routes.map(|r| r.features).unwrap_or_default();

    Ok(features
        .into_iter()
        .map(|feature| {
            let attributes = feature.attributes;

            Route {
                geometry: feature
                    .geometry
                    .map(|g| {
                        g.paths
                            .into_iter()
                            .map(|path| path.into_iter().map(|[x, y]| Coordinate::new(x, y)).collect())
                            .collect()
                    })
                    .unwrap_or_default(),
                total_time: attributes
                    .total_travel_time
                    .or(attributes.total_minutes)
                    .unwrap_or_default(),
                total_length: attributes.total_kilometers.unwrap_or_default() * 1000.0,
                directions: directions.clone(),
            }
        })
        .collect())
}
