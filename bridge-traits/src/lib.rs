//! # Host Bridge Traits
//!
//! Collaborator contracts consumed by the live-album core.
//!
//! ## Overview
//!
//! This crate defines the boundary between the core and everything it does
//! not own: the remote asset catalog, the HTTP transport, the file system and
//! the passage of time. Each trait has a desktop implementation in
//! `bridge-desktop` (or a connector crate) and is replaced by fakes in tests.
//!
//! ## Traits
//!
//! ### Remote catalog
//! - [`AssetCatalog`](catalog::AssetCatalog) - Search, album contents, bulk add/remove, album descriptions
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations with retry, used by catalog connectors
//!
//! ### Storage
//! - [`FileSystemAccess`](storage::FileSystemAccess) - File I/O with atomic replace
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`TickSource`](time::TickSource) - Periodic timer for schedulers
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform-specific errors and keep messages actionable
//! (include the collection id, the path, the HTTP status).
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across async tasks behind an `Arc`.

pub mod catalog;
pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use catalog::{
    AssetCatalog, AssetId, AssetKind, BulkOutcome, CollectionId, CollectionSummary, SearchFilter,
    SearchKind, SearchSpec,
};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::FileSystemAccess;
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock, TickSource, Ticker};
