//! Local database layer: pending-write queue, roster cache, and device settings

mod connection;
mod migrations;
mod queue_repository;
mod roster_repository;
mod settings_repository;

pub use connection::Database;
pub use queue_repository::{LibSqlQueueRepository, PendingQueueRepository, QueuedCheckIn};
pub use roster_repository::{LibSqlRosterRepository, RosterRepository};
pub use settings_repository::{LibSqlSettingsRepository, SettingsRepository, DEVICE_ID_KEY};
