//! Library crate for quest-battle-back, exposing modules for binaries and tests.

/// Battle rules and their JSON configuration file.
pub mod config;
/// Persistence layer: stored documents and session stores.
pub mod dao;
/// Request and response payloads.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// HTTP routes.
pub mod routes;
/// Engine operations exposed to the routes.
pub mod services;
/// Battle state, rules engine and shared application state.
pub mod state;
