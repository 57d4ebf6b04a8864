//! Settings repository implementation

use crate::error::Result;
use libsql::Connection;
use uuid::Uuid;

/// Settings key holding this device's stable identifier
pub const DEVICE_ID_KEY: &str = "device_id";

/// Trait for device-local key/value settings (async)
#[allow(async_fn_in_trait)]
pub trait SettingsRepository {
    /// Read a setting
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a setting
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Load the device id, generating and storing one on first use
    async fn device_id(&self) -> Result<String> {
        if let Some(existing) = self.get(DEVICE_ID_KEY).await? {
            return Ok(existing);
        }

        let device_id = Uuid::now_v7().to_string();
        self.set(DEVICE_ID_KEY, &device_id).await?;
        tracing::info!("Generated device id {}", device_id);
        Ok(device_id)
    }
}

/// libSQL implementation of `SettingsRepository`
pub struct LibSqlSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SettingsRepository for LibSqlSettingsRepository<'_> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM settings WHERE key = ?", [key])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO settings (key, value) VALUES (?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                [key, value],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_set_and_get() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlSettingsRepository::new(db.connection());

        assert_eq!(repo.get("missing").await.unwrap(), None);
        repo.set("theme", "dark").await.unwrap();
        repo.set("theme", "light").await.unwrap();
        assert_eq!(repo.get("theme").await.unwrap().as_deref(), Some("light"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_device_id_is_stable() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlSettingsRepository::new(db.connection());

        let first = repo.device_id().await.unwrap();
        let second = repo.device_id().await.unwrap();
        assert_eq!(first, second);
        assert!(first.parse::<Uuid>().is_ok());
    }
}
