//! Domain models for the catalog.
//!
//! These types represent validated domain objects separate from database row types.

pub mod product;

pub use product::{
    LocationFields, NearbyProduct, NewProduct, Product, ProductFields, ProductPatch, TagCount,
    parse_point,
};
