//! # REST Catalog Provider
//!
//! Implements `AssetCatalog` for the photo catalog's REST API.
//!
//! ## Overview
//!
//! This module provides:
//! - API-key authenticated requests (`x-api-key`)
//! - Paged smart and metadata search
//! - Album listing, creation and description updates
//! - Best-effort bulk membership changes with per-id results

pub mod connector;
pub mod error;
pub mod types;

pub use connector::RestCatalogConnector;
pub use error::{CatalogError, Result};
