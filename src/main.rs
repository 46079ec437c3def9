use std::error::Error;
use std::sync::Arc;

use futures::future::FutureExt;
use tokio::sync::mpsc;
use url::Url;
use warp::Filter;

use log::{info, initialize_logger};
use touris::config::{get_optional_variable, get_variable, parse_variable, Config};
use touris::db::PgDb;
use touris::environment::{Backends, Environment};
use touris::identity::FirebaseIdentity;
use touris::routes;
use touris::store::S3Store;
use touris::trip::arcgis::{ArcGisGeocoder, ArcGisRouter, DEFAULT_GEOCODE_URL, DEFAULT_ROUTE_URL};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    let logger = initialize_logger();

    let store = Arc::new(S3Store::from_env().expect("initialize S3 store from environment"));

    let main_port: u16 = parse_variable("TOURIS_PORT");
    let admin_port: u16 = parse_variable("TOURIS_ADMIN_PORT");

    info!(logger, "Starting..."; "main_port" => main_port, "admin_port" => admin_port);
    let logger = Arc::new(logger);

    info!(logger, "Creating database pool...");
    let connection_string = get_variable("TOURIS_DB_CONNECTION_STRING");
    let pool = sqlx::Pool::connect(&connection_string)
        .await
        .expect("create database pool from TOURIS_DB_CONNECTION_STRING");
    let db = Arc::new(PgDb::new(pool));

    let client = reqwest::Client::builder()
        .user_agent(format!("{}/{}", info::NAME, info::VERSION))
        .build()
        .expect("build HTTP client");

    let identity = Arc::new(FirebaseIdentity::new(
        client.clone(),
        get_variable("FIREBASE_API_KEY"),
    ));

    let arcgis_key = get_variable("ARCGIS_API_KEY");
    let route_url = service_url("ARCGIS_ROUTE_URL", DEFAULT_ROUTE_URL);
    let geocode_url = service_url("ARCGIS_GEOCODE_URL", DEFAULT_GEOCODE_URL);
    let router = Arc::new(ArcGisRouter::new(client.clone(), route_url, arcgis_key.clone()));
    let geocoder = Arc::new(ArcGisGeocoder::new(client, geocode_url, arcgis_key));

    let config = Config::from_env();
    info!(logger, "Configured"; "max_photo_bytes" => config.max_photo_bytes, "directions_language" => &config.directions_language, "report_directory" => %config.report_directory.display());

    let backends = Backends {
        identity,
        store,
        db,
        router,
        geocoder,
    };
    let environment = Environment::new(logger.clone(), backends, config);

    let (termination_sender, mut termination_receiver) = mpsc::channel::<()>(1);

    let terminate: routes::admin::TerminationFunctionWrapper = Arc::new(move || {
        let termination_sender = termination_sender.clone();

        async move {
            // a full channel means termination is already under way
            let _ = termination_sender.try_send(());
        }
        .boxed()
    });

    let should_terminate = async move {
        termination_receiver.recv().await;
    }
    .shared();

    let ctrlc = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let signal = tokio::signal::ctrl_c();

        async move {
            tokio::select! {
                _ = should_terminate => {},
                _ = signal => {
                    terminate().await;
                }
            }
        }
    };

    let main_server = {
        let should_terminate = should_terminate.clone();

        let logger2 = logger.clone();

        let routes = routes::make_routes(environment.clone())
            .recover(move |r| routes::format_rejection(logger2.clone(), r));

        let (_, main_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([127, 0, 0, 1], main_port), async {
                should_terminate.await;
            });

        main_server
    };

    let admin_server = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let routes = routes::admin::make_healthz_route(environment.clone()).or(
            routes::admin::make_termination_route(environment.clone(), terminate),
        );

        let (_, admin_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([127, 0, 0, 1], admin_port), async {
                should_terminate.await;
            });

        admin_server
    };

    tokio::join!(ctrlc, main_server, admin_server);

    info!(logger, "Exiting gracefully...");

    Ok(())
}

fn service_url(name: &str, default: &str) -> Url {
    let raw = get_optional_variable(name).unwrap_or_else(|| default.to_owned());

    // relative joins need the trailing slash
    let raw = if raw.ends_with('/') { raw } else { raw + "/" };

    Url::parse(&raw).unwrap_or_else(|e| panic!("parse {} ({}): {}", name, raw, e))
}
