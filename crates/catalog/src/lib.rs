//! Souk catalog library.
//!
//! The product catalog engine (slugs, photo ingestion, indexed storage,
//! search, tags, favorites) and the JSON API that exposes it. Kept as a
//! library so the CLI and integration tests can build the same state and
//! router as the server binary.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod favorites;
pub mod images;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod search;
pub mod state;
pub mod store;
pub mod tags;
