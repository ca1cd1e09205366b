//! # Live Album Engine
//!
//! Turns saved search definitions into self-maintaining collections.
//!
//! ## Overview
//!
//! A definition links a catalog search to a destination collection. On a
//! schedule or on demand the engine recomputes the search, diffs it against
//! the collection's current contents and applies the minimal set of
//! additions (and, for full-sync, removals) through the catalog's bulk API.
//! Every run is recorded so repeated runs are safe after partial failures or
//! restarts.
//!
//! ## Components
//!
//! - **Definitions** (`definition`): the search + sync configuration model
//! - **Metadata Codec** (`codec`): definitions embedded in a collection description
//! - **Definition Store** (`store`): durable JSON store with atomic rewrite
//! - **Embedded Carrier** (`carrier`): discovery and write-back of embedded definitions
//! - **Reconciler** (`reconciler`): one diff-and-apply pass for one definition
//! - **Scheduler** (`scheduler`): periodic and manual sweeps, one at a time
//! - **Service** (`service`): caller-facing operations

pub mod carrier;
pub mod codec;
pub mod definition;
pub mod error;
pub mod reconciler;
pub mod scheduler;
pub mod service;
pub mod store;

pub use carrier::EmbeddedCarrier;
pub use codec::LiveAlbumMetadata;
pub use definition::{
    DefinitionId, DefinitionSource, RunStats, SearchDefinition, SyncStrategy,
};
pub use error::{ErrorKind, LiveAlbumError, Result};
pub use reconciler::{
    OutcomeStatus, ReconcileOutcome, ReconcilePlan, Reconciler, ReconcilerSettings,
    RefreshOptions,
};
pub use scheduler::{
    DefinitionRunResult, RunFailure, RunResult, Scheduler, SchedulerSettings, SchedulerStatus,
    SweepReport, SweepTrigger,
};
pub use service::{DefineRequest, DefinitionSelector, LiveAlbumDependencies, LiveAlbumService};
pub use store::DefinitionStore;
