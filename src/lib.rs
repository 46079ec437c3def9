pub mod cache;
pub mod config;
pub mod db;
pub mod environment;
pub mod errors;
pub mod feed;
pub mod identity;
pub mod io;
pub mod itineraries;
pub mod itinerary;
pub mod normalization;
pub mod photo;
pub mod routes;
pub mod session;
pub mod store;
pub mod trip;
