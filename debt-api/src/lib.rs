// Library crate exposing the application modules so integration tests and the binary can share code.
pub mod auth;
pub mod config;
pub mod directory;
pub mod extract;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod posts;
pub mod repository;
