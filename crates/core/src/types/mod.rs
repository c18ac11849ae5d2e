//! Core types for the Souk catalog.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod location;
pub mod price;
pub mod slug;

pub use id::*;
pub use location::{GeoPoint, Location, LocationError};
pub use price::{Price, PriceError};
pub use slug::{Slug, slug_family_pattern, slugify};
