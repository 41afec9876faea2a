// Library exports for iHighlight
// Integration tests build the router in-process from these modules

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod graph;
pub mod mailer;
pub mod posts;
pub mod routes;
pub mod state;
pub mod users;
pub mod validation;
