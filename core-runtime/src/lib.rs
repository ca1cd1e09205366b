//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the live-album engine:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the domain crates depend
//! on. It establishes the logging conventions, the validated configuration
//! surface and the event broadcasting mechanism used throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CatalogConfig, LiveAlbumConfig, LiveAlbumConfigBuilder};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream};
