//! Cloud Firestore REST client.
//!
//! Check-ins are created with an explicit `documentId`; Firestore answers an
//! existing id with HTTP 409 `ALREADY_EXISTS`, which is the conflict signal.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::document::{
    decode_attendee, decode_check_in, decode_event, decode_registration, encode_check_in,
    event_query, query_documents,
};
use super::{
    CommitOutcome, RemoteError, RemoteResult, RemoteStore, ATTENDEES_COLLECTION,
    CHECKINS_COLLECTION, EVENTS_COLLECTION, REGISTRATIONS_COLLECTION,
};
use crate::config::FirestoreConfig;
use crate::error::{Error, Result};
use crate::models::{
    Attendee, AttendeeId, CheckInKey, CheckInRecord, Event, EventId, RegistrationStatus,
    RosterEntry,
};
use crate::util::error_excerpt;

const CONNECT_TIMEOUT_SECS: u64 = 4;

#[derive(Clone)]
pub struct FirestoreStore {
    base_url: String,
    /// `projects/{project}/databases/{database}/documents`
    database_path: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for FirestoreStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("FirestoreStore")
            .field("base_url", &self.base_url)
            .field("database_path", &self.database_path)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl FirestoreStore {
    pub fn new(config: &FirestoreConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|error| Error::Config(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            base_url: config.resolved_base_url(),
            database_path: format!(
                "projects/{}/databases/{}/documents",
                config.project_id.trim(),
                config.database.trim()
            ),
            api_key: config
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(ToString::to_string),
            client,
        })
    }

    fn documents_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database_path)
    }

    fn document_name(&self, collection: &str, id: &str) -> String {
        format!("{}/{collection}/{id}", self.database_path)
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!(
            "{}/{collection}/{}",
            self.documents_url(),
            urlencoding::encode(id)
        )
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let request = match &self.api_key {
            Some(key) => request.query(&[("key", key)]),
            None => request,
        };
        request
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport_error)
    }

    /// GET a document; `None` when it does not exist
    async fn get_document(&self, collection: &str, id: &str) -> RemoteResult<Option<Value>> {
        let response = self
            .send(self.client.get(self.document_url(collection, id)))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        read_json(response).await.map(Some)
    }

    async fn run_query(&self, collection: &str, event_id: &EventId) -> RemoteResult<Value> {
        let url = format!("{}:runQuery", self.documents_url());
        let response = self
            .send(self.client.post(url).json(&event_query(collection, event_id)))
            .await?;
        read_json(response).await
    }

    async fn batch_get_attendees(&self, ids: &[AttendeeId]) -> RemoteResult<Vec<Attendee>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let names = ids
            .iter()
            .map(|id| self.document_name(ATTENDEES_COLLECTION, id.as_str()))
            .collect::<Vec<_>>();
        let url = format!("{}:batchGet", self.documents_url());
        let response = self
            .send(self.client.post(url).json(&json!({ "documents": names })))
            .await?;
        let body = read_json(response).await?;

        body.as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("found"))
                    .map(decode_attendee)
                    .collect()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

impl RemoteStore for FirestoreStore {
    async fn fetch_event(&self, event_id: &EventId) -> RemoteResult<Option<Event>> {
        self.get_document(EVENTS_COLLECTION, event_id.as_str())
            .await?
            .map(|document| decode_event(&document))
            .transpose()
    }

    async fn fetch_attendee(&self, attendee_id: &AttendeeId) -> RemoteResult<Option<Attendee>> {
        self.get_document(ATTENDEES_COLLECTION, attendee_id.as_str())
            .await?
            .map(|document| decode_attendee(&document))
            .transpose()
    }

    async fn fetch_registration(
        &self,
        event_id: &EventId,
        attendee_id: &AttendeeId,
    ) -> RemoteResult<Option<RegistrationStatus>> {
        let key = CheckInKey::new(event_id.clone(), attendee_id.clone());
        let document = self
            .get_document(REGISTRATIONS_COLLECTION, &key.document_id())
            .await?;
        Ok(document
            .map(|document| decode_registration(&document))
            .transpose()?
            .map(|registration| registration.status))
    }

    async fn fetch_roster(&self, event_id: &EventId) -> RemoteResult<Vec<RosterEntry>> {
        let registrations = self.run_query(REGISTRATIONS_COLLECTION, event_id).await?;
        let registrations = query_documents(&registrations)
            .into_iter()
            .map(decode_registration)
            .collect::<RemoteResult<Vec<_>>>()?;
        let check_ins = self.list_check_ins(event_id).await?;

        let attendee_ids = registrations
            .iter()
            .map(|registration| registration.attendee_id.clone())
            .collect::<Vec<_>>();
        let attendees = self.batch_get_attendees(&attendee_ids).await?;

        let mut roster = registrations
            .into_iter()
            .map(|registration| RosterEntry {
                display_name: attendees
                    .iter()
                    .find(|attendee| attendee.id == registration.attendee_id)
                    .map(|attendee| attendee.display_name.clone()),
                checked_in: check_ins
                    .iter()
                    .any(|record| record.attendee_id == registration.attendee_id),
                attendee_id: registration.attendee_id,
                registration: registration.status,
            })
            .collect::<Vec<_>>();

        for record in check_ins {
            if !roster
                .iter()
                .any(|entry| entry.attendee_id == record.attendee_id)
            {
                roster.push(RosterEntry {
                    attendee_id: record.attendee_id,
                    display_name: None,
                    registration: RegistrationStatus::Waiting,
                    checked_in: true,
                });
            }
        }

        debug!(event_id = %event_id, entries = roster.len(), "Fetched Firestore roster");
        Ok(roster)
    }

    async fn fetch_check_in(&self, key: &CheckInKey) -> RemoteResult<Option<CheckInRecord>> {
        self.get_document(CHECKINS_COLLECTION, &key.document_id())
            .await?
            .map(|document| decode_check_in(&document))
            .transpose()
    }

    async fn list_check_ins(&self, event_id: &EventId) -> RemoteResult<Vec<CheckInRecord>> {
        let response = self.run_query(CHECKINS_COLLECTION, event_id).await?;
        query_documents(&response)
            .into_iter()
            .map(decode_check_in)
            .collect()
    }

    async fn create_check_in(&self, record: &CheckInRecord) -> RemoteResult<CommitOutcome> {
        let key = record.key();
        let url = format!("{}/{CHECKINS_COLLECTION}", self.documents_url());
        let response = self
            .send(
                self.client
                    .post(url)
                    .query(&[("documentId", key.document_id())])
                    .json(&encode_check_in(record)),
            )
            .await?;

        if response.status() == StatusCode::CONFLICT {
            debug!(check_in = %key, "Firestore reported an existing check-in");
            let existing = self.fetch_check_in(&key).await?.ok_or_else(|| {
                RemoteError::Unavailable(format!("conflicting check-in {key} vanished"))
            })?;
            return Ok(CommitOutcome::Conflict(existing));
        }

        read_json(response).await?;
        Ok(CommitOutcome::Committed)
    }

    async fn delete_check_ins(&self, event_id: &EventId) -> RemoteResult<u64> {
        let mut deleted = 0;
        for record in self.list_check_ins(event_id).await? {
            let url = self.document_url(CHECKINS_COLLECTION, &record.key().document_id());
            let response = self.send(self.client.delete(url)).await?;
            if response.status() == StatusCode::NOT_FOUND {
                continue;
            }
            read_json(response).await?;
            deleted += 1;
        }
        Ok(deleted)
    }
}

async fn read_json(response: Response) -> RemoteResult<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status, &body));
    }
    let body = response.text().await.map_err(transport_error)?;
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body)
        .map_err(|error| RemoteError::InvalidDocument(format!("invalid JSON response: {error}")))
}

fn transport_error(error: reqwest::Error) -> RemoteError {
    RemoteError::Unavailable(error_excerpt(&error.to_string()))
}

/// Server-side and throttling failures are transient; other statuses reject
fn status_error(status: StatusCode, body: &str) -> RemoteError {
    let message = parse_api_error(status, body);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RemoteError::Unavailable(message)
    } else {
        RemoteError::Rejected(message)
    }
}

#[derive(Debug, Deserialize)]
struct FirestoreErrorBody {
    error: Option<FirestoreErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct FirestoreErrorDetail {
    message: Option<String>,
    status: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(FirestoreErrorBody {
        error: Some(detail),
    }) = serde_json::from_str::<FirestoreErrorBody>(body)
    {
        if let Some(message) = detail.message.or(detail.status) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = error_excerpt(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{trimmed} ({})", status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> FirestoreStore {
        let mut config = FirestoreConfig::new("konoha-events");
        config.api_key = Some("secret-key".to_string());
        config.base_url = Some("http://localhost:8080/v1/".to_string());
        FirestoreStore::new(&config).unwrap()
    }

    #[test]
    fn urls_are_built_from_config() {
        let store = store();
        assert_eq!(
            store.documents_url(),
            "http://localhost:8080/v1/projects/konoha-events/databases/(default)/documents"
        );
        assert_eq!(
            store.document_url(CHECKINS_COLLECTION, "evt1:usr1"),
            "http://localhost:8080/v1/projects/konoha-events/databases/(default)/documents/checkins/evt1%3Ausr1"
        );
        assert_eq!(
            store.document_name(ATTENDEES_COLLECTION, "usr1"),
            "projects/konoha-events/databases/(default)/documents/attendees/usr1"
        );
    }

    #[test]
    fn new_rejects_invalid_config() {
        assert!(FirestoreStore::new(&FirestoreConfig::new("")).is_err());
    }

    #[test]
    fn debug_redacts_api_key() {
        let debug = format!("{:?}", store());
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn parse_api_error_prefers_firestore_message() {
        let body = r#"{"error":{"code":403,"message":"Missing permissions","status":"PERMISSION_DENIED"}}"#;
        assert_eq!(
            parse_api_error(StatusCode::FORBIDDEN, body),
            "Missing permissions (403)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, ""), "HTTP 502");
        assert_eq!(parse_api_error(StatusCode::BAD_REQUEST, " nope "), "nope (400)");
    }

    #[test]
    fn status_errors_split_transient_and_rejected() {
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE, "").is_transient());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(!status_error(StatusCode::FORBIDDEN, "").is_transient());
    }
}
