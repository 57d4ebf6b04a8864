//! konoha-core - Core library for Konoha event check-in
//!
//! This crate contains the check-in token codec, the scan pipeline, the
//! roster cache and pending-write queue, and the sync coordinator that
//! reconciles offline check-ins with the remote document store.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod remote;
pub mod repository;
pub mod scan;
pub mod session;
pub mod sync;
pub mod token;
pub mod validator;

mod util;

pub use config::{EngineConfig, FirestoreConfig};
pub use engine::CheckInEngine;
pub use error::{Error, Result};
pub use models::{AttendeeId, AttendeeStatus, CheckInRecord, EventId, SyncState};
pub use remote::{FirestoreStore, MemoryRemoteStore, RemoteStore};
pub use session::{ScanResult, ScanSessionHandle};
pub use sync::{Connectivity, SyncCoordinator, SyncReport};
pub use validator::RejectReason;
