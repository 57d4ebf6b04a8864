use std::env;
use std::path::{Path, PathBuf};

use konoha_core::db::Database;
use konoha_core::models::{
    AttendanceSummary, Attendee, AttendeeId, CheckInConflict, CheckInKey, CheckInRecord, Event,
    EventId, RegistrationStatus, RosterEntry,
};
use konoha_core::remote::{CheckInCallback, CommitOutcome, RemoteResult, Subscription};
use konoha_core::{
    CheckInEngine, EngineConfig, FirestoreConfig, FirestoreStore, MemoryRemoteStore, RemoteStore,
    ScanResult,
};
use serde::Serialize;

use crate::error::CliError;

pub const SIGNING_KEY_ENV: &str = "KONOHA_SIGNING_KEY";
pub const FIRESTORE_PROJECT_ENV: &str = "KONOHA_FIRESTORE_PROJECT";
pub const FIRESTORE_API_KEY_ENV: &str = "KONOHA_FIRESTORE_API_KEY";
pub const FIRESTORE_BASE_URL_ENV: &str = "KONOHA_FIRESTORE_BASE_URL";
pub const DB_PATH_ENV: &str = "KONOHA_DB_PATH";

/// Global options shared by every command
#[derive(Debug, Clone)]
pub struct CliContext {
    pub db_path: PathBuf,
    pub config_path: Option<PathBuf>,
    pub snapshot: Option<PathBuf>,
    pub offline: bool,
}

#[derive(Debug, Serialize)]
pub struct ConflictItem {
    pub id: i64,
    pub event_id: String,
    pub attendee_id: String,
    pub local_recorded_by: String,
    pub local_timestamp: i64,
    pub remote_recorded_by: String,
    pub remote_timestamp: i64,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
    pub strategy: String,
}

#[derive(Debug, Serialize)]
pub struct AttendanceItem {
    pub event_id: String,
    pub attendance: usize,
    pub synced: usize,
    pub pending: usize,
    pub conflicts: usize,
}

/// Remote store selected from the global options
#[derive(Clone)]
pub enum CliRemote {
    Snapshot {
        store: MemoryRemoteStore,
        path: PathBuf,
    },
    Firestore(FirestoreStore),
}

impl CliRemote {
    /// Write the snapshot back after a command, in snapshot mode
    pub fn persist(&self) -> Result<(), CliError> {
        if let Self::Snapshot { store, path } = self {
            store.save(path)?;
        }
        Ok(())
    }
}

impl RemoteStore for CliRemote {
    async fn fetch_event(&self, event_id: &EventId) -> RemoteResult<Option<Event>> {
        match self {
            Self::Snapshot { store, .. } => store.fetch_event(event_id).await,
            Self::Firestore(store) => store.fetch_event(event_id).await,
        }
    }

    async fn fetch_attendee(&self, attendee_id: &AttendeeId) -> RemoteResult<Option<Attendee>> {
        match self {
            Self::Snapshot { store, .. } => store.fetch_attendee(attendee_id).await,
            Self::Firestore(store) => store.fetch_attendee(attendee_id).await,
        }
    }

    async fn fetch_registration(
        &self,
        event_id: &EventId,
        attendee_id: &AttendeeId,
    ) -> RemoteResult<Option<RegistrationStatus>> {
        match self {
            Self::Snapshot { store, .. } => store.fetch_registration(event_id, attendee_id).await,
            Self::Firestore(store) => store.fetch_registration(event_id, attendee_id).await,
        }
    }

    async fn fetch_roster(&self, event_id: &EventId) -> RemoteResult<Vec<RosterEntry>> {
        match self {
            Self::Snapshot { store, .. } => store.fetch_roster(event_id).await,
            Self::Firestore(store) => store.fetch_roster(event_id).await,
        }
    }

    async fn fetch_check_in(&self, key: &CheckInKey) -> RemoteResult<Option<CheckInRecord>> {
        match self {
            Self::Snapshot { store, .. } => store.fetch_check_in(key).await,
            Self::Firestore(store) => store.fetch_check_in(key).await,
        }
    }

    async fn list_check_ins(&self, event_id: &EventId) -> RemoteResult<Vec<CheckInRecord>> {
        match self {
            Self::Snapshot { store, .. } => store.list_check_ins(event_id).await,
            Self::Firestore(store) => store.list_check_ins(event_id).await,
        }
    }

    async fn create_check_in(&self, record: &CheckInRecord) -> RemoteResult<CommitOutcome> {
        match self {
            Self::Snapshot { store, .. } => store.create_check_in(record).await,
            Self::Firestore(store) => store.create_check_in(record).await,
        }
    }

    async fn delete_check_ins(&self, event_id: &EventId) -> RemoteResult<u64> {
        match self {
            Self::Snapshot { store, .. } => store.delete_check_ins(event_id).await,
            Self::Firestore(store) => store.delete_check_ins(event_id).await,
        }
    }

    fn subscribe(&self, event_id: &EventId, callback: CheckInCallback) -> Option<Subscription> {
        match self {
            Self::Snapshot { store, .. } => store.subscribe(event_id, callback),
            Self::Firestore(store) => store.subscribe(event_id, callback),
        }
    }

    fn unsubscribe(&self, subscription: &Subscription) {
        match self {
            Self::Snapshot { store, .. } => store.unsubscribe(subscription),
            Self::Firestore(store) => store.unsubscribe(subscription),
        }
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    data_dir().join("konoha.db")
}

pub fn default_config_path() -> PathBuf {
    data_dir().join("config.json")
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("konoha")
}

/// Config file (explicit, else the default location when present) with
/// environment overrides applied
pub fn load_config(config_path: Option<&Path>) -> Result<EngineConfig, CliError> {
    let config = match config_path {
        Some(path) => EngineConfig::load(path)?,
        None => {
            let default_path = default_config_path();
            if default_path.exists() {
                EngineConfig::load(&default_path)?
            } else {
                EngineConfig::default()
            }
        }
    };
    Ok(apply_env_overrides(config, |name| env::var(name).ok()))
}

pub fn apply_env_overrides(
    mut config: EngineConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> EngineConfig {
    let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    if let Some(signing_key) = lookup(SIGNING_KEY_ENV) {
        config.signing_key = signing_key;
    }
    if let Some(project_id) = lookup(FIRESTORE_PROJECT_ENV) {
        let firestore = config
            .firestore
            .get_or_insert_with(|| FirestoreConfig::new(project_id.clone()));
        firestore.project_id = project_id;
    }
    if let Some(firestore) = config.firestore.as_mut() {
        if let Some(api_key) = lookup(FIRESTORE_API_KEY_ENV) {
            firestore.api_key = Some(api_key);
        }
        if let Some(base_url) = lookup(FIRESTORE_BASE_URL_ENV) {
            firestore.base_url = Some(base_url);
        }
    }
    config
}

pub fn open_remote(context: &CliContext, config: &EngineConfig) -> Result<CliRemote, CliError> {
    if let Some(path) = &context.snapshot {
        let store = MemoryRemoteStore::load(path)?;
        store.set_online(!context.offline);
        return Ok(CliRemote::Snapshot {
            store,
            path: path.clone(),
        });
    }

    if context.offline {
        return Err(CliError::Config("--offline requires --snapshot".to_string()));
    }

    let firestore = config
        .firestore
        .as_ref()
        .ok_or(CliError::RemoteNotConfigured)?;
    Ok(CliRemote::Firestore(FirestoreStore::new(firestore)?))
}

/// Open the local database and assemble an engine for `context`
pub async fn open_engine(
    context: &CliContext,
) -> Result<(CheckInEngine<CliRemote>, CliRemote), CliError> {
    let config = load_config(context.config_path.as_deref())?;
    config.validate()?;
    let remote = open_remote(context, &config)?;

    if let Some(parent) = context.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::open(&context.db_path).await?;
    let engine = CheckInEngine::open(remote.clone(), db, &config).await?;
    Ok((engine, remote))
}

pub fn parse_event_id(raw: &str) -> Result<EventId, CliError> {
    Ok(raw.trim().parse()?)
}

pub fn parse_attendee_id(raw: &str) -> Result<AttendeeId, CliError> {
    Ok(raw.trim().parse()?)
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn conflict_to_item(conflict: &CheckInConflict) -> ConflictItem {
    ConflictItem {
        id: conflict.id,
        event_id: conflict.event_id.clone(),
        attendee_id: conflict.attendee_id.clone(),
        local_recorded_by: conflict.local_recorded_by.clone(),
        local_timestamp: conflict.local_timestamp,
        remote_recorded_by: conflict.remote_recorded_by.clone(),
        remote_timestamp: conflict.remote_timestamp,
        resolved_at: conflict.resolved_at,
        resolved_at_iso: format_timestamp(conflict.resolved_at),
        strategy: conflict.strategy.clone(),
    }
}

pub fn format_conflict_lines(conflicts: &[CheckInConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {}/{}  kept={} dropped={}",
                format_timestamp(conflict.resolved_at),
                conflict.event_id,
                conflict.attendee_id,
                conflict.remote_recorded_by,
                conflict.local_recorded_by
            )
        })
        .collect()
}

pub fn attendance_to_item(summary: &AttendanceSummary) -> AttendanceItem {
    AttendanceItem {
        event_id: summary.event_id.to_string(),
        attendance: summary.attendance(),
        synced: summary.synced,
        pending: summary.pending,
        conflicts: summary.conflicts,
    }
}

pub fn format_attendance_lines(summary: &AttendanceSummary) -> Vec<String> {
    vec![
        format!("Event:      {}", summary.event_id),
        format!("Attendance: {}", summary.attendance()),
        format!("  synced:   {}", summary.synced),
        format!("  pending:  {}", summary.pending),
        format!("Conflicts:  {}", summary.conflicts),
    ]
}

pub fn format_scan_result(result: &ScanResult) -> String {
    match result {
        ScanResult::Recorded(record) => format!(
            "OK        {}  at {}",
            record.attendee_id,
            format_timestamp(record.timestamp)
        ),
        ScanResult::Rejected(reason) => format!("REJECTED  {reason}"),
        ScanResult::DecodeUnavailable(message) => format!("UNAVAILABLE  {message}"),
    }
}
