//! HTTP middleware and extractors for the catalog API.
//!
//! Authentication itself happens upstream; this module only reads the
//! identity the gateway forwards.

pub mod auth;

pub use auth::{AuthRejection, RequireUser, USER_ID_HEADER};
