//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop and server hosts
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`, with retry and exponential backoff
//! - `FileSystemAccess` using `tokio::fs`, with temp-file-then-rename atomic writes
//! - `TickSource` using `tokio::time::interval`
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{IntervalTickSource, ReqwestHttpClient, TokioFileSystem};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let http_client = Arc::new(ReqwestHttpClient::new());
//!     let fs = Arc::new(TokioFileSystem::new());
//!     let ticks = Arc::new(IntervalTickSource::new());
//!
//!     // Hand these to the live-album service
//! }
//! ```

mod background;
mod filesystem;
mod http;

pub use background::IntervalTickSource;
pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
