//! shelf-core - Core library for Shelf
//!
//! This crate contains the catalog models, the libSQL local store, the remote
//! storage providers, and the sync engine that reconciles replicas of one
//! catalog across devices.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod sync;
pub mod util;

pub use config::{ProviderConfig, SyncSettings, TransferStrategy};
pub use error::{Error, Result};
pub use models::{EntityId, LibraryPayload};
pub use services::CatalogService;
pub use state::SyncPhase;
pub use storage::{ProviderError, StorageProvider};
pub use sync::{SyncError, SyncOrchestrator, SyncOutcome, SyncReport, TieBreak};
