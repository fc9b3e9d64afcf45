// Library interface for the binary and the integration tests

pub mod api;
pub mod client;
pub mod config;
pub mod constants;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod fields;
pub mod form;
pub mod models;
pub mod popout;
pub mod queries;
pub mod registry;
pub mod schema;
pub mod session;
pub mod timer;

// Re-export the expected database version for convenience
pub use constants::EXPECTED_DB_VERSION;
