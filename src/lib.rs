pub mod batch;
pub mod coerce;
pub mod db;
pub mod details;
pub mod error;
pub mod orchestrate;
pub mod provider;
pub mod reconcile;
