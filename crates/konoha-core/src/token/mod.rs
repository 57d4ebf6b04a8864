//! QR check-in tokens.
//!
//! A check-in QR code carries
//! `konoha://checkin/<event_id>/<attendee_id>/<issued_at_ms>/<signature>`.
//! The signature is an HMAC-SHA256 over the event, attendee and issue time,
//! so a token issued for one event never verifies for another.

mod link;
mod signer;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::{AttendeeId, EventId};

pub use link::{event_link, extract_event_id, EVENT_LINK_PREFIX};
pub use signer::TokenSigner;

/// Scheme and path prefix of check-in payloads
pub const CHECKIN_PREFIX: &str = "konoha://checkin/";

/// Reasons a scanned payload is not a usable token
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Malformed token: {0}")]
    Malformed(String),
    #[error("Token signature does not verify")]
    InvalidSignature,
}

/// Decoded check-in token. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckInToken {
    pub event_id: EventId,
    pub attendee_id: AttendeeId,
    /// Issue time (Unix ms)
    pub issued_at: i64,
    /// URL-safe base64 HMAC
    pub signature: String,
}

impl CheckInToken {
    /// Render the token as a QR payload
    #[must_use]
    pub fn to_payload(&self) -> String {
        format!(
            "{CHECKIN_PREFIX}{}/{}/{}/{}",
            self.event_id, self.attendee_id, self.issued_at, self.signature
        )
    }

    #[must_use]
    pub fn issued_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.issued_at)
    }
}

/// Parse a raw scanned payload and verify its signature.
pub fn parse_payload(raw: &str, signer: &TokenSigner) -> Result<CheckInToken, TokenError> {
    let token = decode_fields(raw)?;
    if signer.verify(&token)? {
        Ok(token)
    } else {
        Err(TokenError::InvalidSignature)
    }
}

/// Split and validate the delimited fields without checking the signature.
pub fn decode_fields(raw: &str) -> Result<CheckInToken, TokenError> {
    let body = raw
        .trim()
        .strip_prefix(CHECKIN_PREFIX)
        .ok_or_else(|| TokenError::Malformed(format!("expected {CHECKIN_PREFIX} prefix")))?;

    let fields = body.split('/').collect::<Vec<_>>();
    let [event_id, attendee_id, issued_at, signature] = fields.as_slice() else {
        return Err(TokenError::Malformed(format!(
            "expected 4 fields, found {}",
            fields.len()
        )));
    };

    let event_id = event_id
        .parse::<EventId>()
        .map_err(|_| TokenError::Malformed("invalid event id".to_string()))?;
    let attendee_id = attendee_id
        .parse::<AttendeeId>()
        .map_err(|_| TokenError::Malformed("invalid attendee id".to_string()))?;
    let issued_at = parse_issued_at(issued_at)?;

    if signature.is_empty() {
        return Err(TokenError::Malformed("missing signature".to_string()));
    }

    Ok(CheckInToken {
        event_id,
        attendee_id,
        issued_at,
        signature: (*signature).to_string(),
    })
}

fn parse_issued_at(raw: &str) -> Result<i64, TokenError> {
    // Only the canonical decimal form is signed, so signs and padding are refused
    if raw.is_empty() || raw.starts_with('0') || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TokenError::Malformed(format!("invalid issued_at: {raw:?}")));
    }
    let issued_at = raw
        .parse::<i64>()
        .map_err(|_| TokenError::Malformed(format!("invalid issued_at: {raw:?}")))?;
    if issued_at <= 0 || DateTime::from_timestamp_millis(issued_at).is_none() {
        return Err(TokenError::Malformed(format!(
            "issued_at out of range: {issued_at}"
        )));
    }
    Ok(issued_at)
}
