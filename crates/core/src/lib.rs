//! Souk Core - Shared domain types for the marketplace catalog.
//!
//! This crate provides the I/O-free building blocks used by the catalog
//! engine and its tooling:
//! - `catalog` - Product catalog engine and HTTP API
//! - `cli` - Migrations and maintenance commands
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP. Storage concerns live in `souk-catalog`.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, prices, geolocation, and slugs

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
