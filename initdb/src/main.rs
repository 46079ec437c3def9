//! Creates or upgrades the `itineraries` table.
//!
//! Reads `TOURIS_DB_CONNECTION_STRING` and, optionally,
//! `TOURIS_MIGRATIONS_DIR` (default `./migrations`).

use std::env;

use movine::Movine;
use postgres::{Client, NoTls};

use log::{debug, info, initialize_logger, o};

const DEFAULT_MIGRATIONS_DIR: &str = "./migrations";

fn main() {
    dotenv::dotenv().ok();

    let connection_string = env::var("TOURIS_DB_CONNECTION_STRING")
        .expect("must define TOURIS_DB_CONNECTION_STRING environment variable");
    let migrations_dir =
        env::var("TOURIS_MIGRATIONS_DIR").unwrap_or_else(|_| DEFAULT_MIGRATIONS_DIR.to_owned());

    let logger = initialize_logger().new(o!("migrations_dir" => migrations_dir.clone()));

    debug!(logger, "Connecting to database...");
    let client = Client::connect(&connection_string, NoTls).expect("connect to itinerary database");

    let mut movine = Movine::new(client);
    movine.set_migration_dir(&migrations_dir);
    movine.set_strict(true);

    if movine.status().is_err() {
        info!(logger, "Creating migration table...");
        movine.initialize().expect("initialize migration table");
    }

    info!(logger, "Applying migrations...");
    movine.up().expect("apply itinerary migrations");

    info!(logger, "Itinerary table is up to date.");
}
