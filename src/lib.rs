pub mod configuration;
pub mod connectors;
pub mod errors;
pub mod forms;
mod helpers;
pub mod models;
pub mod routes;
pub mod services;
pub mod startup;
pub mod store;
pub mod telemetry;
