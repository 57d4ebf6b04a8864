//! Firestore typed-value document encoding

use serde_json::{json, Map, Value};

use super::{RemoteError, RemoteResult};
use crate::models::{
    Attendee, AttendeeId, CheckInRecord, Event, EventId, Registration, RegistrationStatus,
    SyncState,
};

/// Encode a string field
pub fn string_value(value: &str) -> Value {
    json!({ "stringValue": value })
}

/// Encode an integer field. Firestore transports 64-bit integers as strings.
pub fn integer_value(value: i64) -> Value {
    json!({ "integerValue": value.to_string() })
}

pub fn boolean_value(value: bool) -> Value {
    json!({ "booleanValue": value })
}

pub fn optional_string_value(value: Option<&str>) -> Value {
    value.map_or_else(|| json!({ "nullValue": null }), string_value)
}

/// Last path segment of a document name
pub fn document_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Borrowed view over the `fields` map of a document
struct Fields<'a> {
    name: &'a str,
    fields: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn of(document: &'a Value) -> RemoteResult<Self> {
        let name = document
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let fields = document
            .get("fields")
            .and_then(Value::as_object)
            .ok_or_else(|| RemoteError::InvalidDocument(format!("{name}: missing fields")))?;
        Ok(Self { name, fields })
    }

    fn id(&self) -> &'a str {
        document_id(self.name)
    }

    fn missing(&self, field: &str) -> RemoteError {
        RemoteError::InvalidDocument(format!("{}: missing or invalid `{field}`", self.name))
    }

    fn opt_string(&self, field: &str) -> Option<String> {
        self.fields
            .get(field)?
            .get("stringValue")?
            .as_str()
            .map(ToString::to_string)
    }

    fn string(&self, field: &str) -> RemoteResult<String> {
        self.opt_string(field).ok_or_else(|| self.missing(field))
    }

    fn integer(&self, field: &str) -> RemoteResult<i64> {
        let value = self
            .fields
            .get(field)
            .and_then(|value| value.get("integerValue"))
            .ok_or_else(|| self.missing(field))?;
        match value {
            Value::String(text) => text.parse().map_err(|_| self.missing(field)),
            Value::Number(number) => number.as_i64().ok_or_else(|| self.missing(field)),
            _ => Err(self.missing(field)),
        }
    }

    fn boolean(&self, field: &str) -> bool {
        self.fields
            .get(field)
            .and_then(|value| value.get("booleanValue"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

fn parse_event_id(value: &str) -> RemoteResult<EventId> {
    value
        .parse()
        .map_err(|_| RemoteError::InvalidDocument(format!("invalid event id `{value}`")))
}

fn parse_attendee_id(value: &str) -> RemoteResult<AttendeeId> {
    value
        .parse()
        .map_err(|_| RemoteError::InvalidDocument(format!("invalid attendee id `{value}`")))
}

pub fn decode_event(document: &Value) -> RemoteResult<Event> {
    let fields = Fields::of(document)?;
    Ok(Event {
        id: parse_event_id(fields.id())?,
        name: fields.string("name")?,
        start_time: fields.integer("startTime")?,
        end_time: fields.integer("endTime")?,
        venue: fields.opt_string("venue"),
        banner_image_ref: fields.opt_string("bannerImageRef"),
        organizer_id: fields.opt_string("organizerId").unwrap_or_default(),
        archived: fields.boolean("archived"),
    })
}

pub fn encode_event(event: &Event) -> Value {
    json!({
        "fields": {
            "name": string_value(&event.name),
            "startTime": integer_value(event.start_time),
            "endTime": integer_value(event.end_time),
            "venue": optional_string_value(event.venue.as_deref()),
            "bannerImageRef": optional_string_value(event.banner_image_ref.as_deref()),
            "organizerId": string_value(&event.organizer_id),
            "archived": boolean_value(event.archived),
        }
    })
}

pub fn decode_attendee(document: &Value) -> RemoteResult<Attendee> {
    let fields = Fields::of(document)?;
    Ok(Attendee {
        id: parse_attendee_id(fields.id())?,
        display_name: fields.opt_string("displayName").unwrap_or_default(),
        account_ref: fields.opt_string("accountRef"),
    })
}

/// Registration documents tolerate the legacy one-letter status codes
pub fn decode_registration(document: &Value) -> RemoteResult<Registration> {
    let fields = Fields::of(document)?;
    Ok(Registration {
        event_id: parse_event_id(&fields.string("eventId")?)?,
        attendee_id: parse_attendee_id(&fields.string("attendeeId")?)?,
        status: RegistrationStatus::parse_lenient(
            &fields.opt_string("status").unwrap_or_default(),
        ),
    })
}

pub fn decode_check_in(document: &Value) -> RemoteResult<CheckInRecord> {
    let fields = Fields::of(document)?;
    Ok(CheckInRecord {
        event_id: parse_event_id(&fields.string("eventId")?)?,
        attendee_id: parse_attendee_id(&fields.string("attendeeId")?)?,
        timestamp: fields.integer("timestamp")?,
        recorded_by: fields.string("recordedBy")?,
        sync_state: SyncState::Synced,
    })
}

pub fn encode_check_in(record: &CheckInRecord) -> Value {
    json!({
        "fields": {
            "eventId": string_value(record.event_id.as_str()),
            "attendeeId": string_value(record.attendee_id.as_str()),
            "timestamp": integer_value(record.timestamp),
            "recordedBy": string_value(&record.recorded_by),
        }
    })
}

/// Structured query selecting documents of `collection` whose `eventId`
/// equals `event_id`
pub fn event_query(collection: &str, event_id: &EventId) -> Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": "eventId" },
                    "op": "EQUAL",
                    "value": string_value(event_id.as_str()),
                }
            }
        }
    })
}

/// Documents contained in a `runQuery` response
pub fn query_documents(response: &Value) -> Vec<&Value> {
    response
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("document"))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BASE: &str = "projects/konoha/databases/(default)/documents";

    #[test]
    fn event_round_trip_through_fields() {
        let event = Event::new("evt1".parse().unwrap(), "Festival", "org1", 10, 20)
            .with_venue("Hokage Rock");
        let mut document = encode_event(&event);
        document["name"] = json!(format!("{BASE}/events/evt1"));

        assert_eq!(decode_event(&document).unwrap(), event);
    }

    #[test]
    fn integer_values_accept_numbers_and_strings() {
        let document = json!({
            "name": format!("{BASE}/checkins/evt1:usr1"),
            "fields": {
                "eventId": { "stringValue": "evt1" },
                "attendeeId": { "stringValue": "usr1" },
                "timestamp": { "integerValue": 42 },
                "recordedBy": { "stringValue": "dev-a" },
            }
        });
        let record = decode_check_in(&document).unwrap();
        assert_eq!(record.timestamp, 42);
        assert_eq!(record.sync_state, SyncState::Synced);
    }

    #[test]
    fn missing_fields_are_invalid_documents() {
        let document = json!({
            "name": format!("{BASE}/checkins/evt1:usr1"),
            "fields": { "eventId": { "stringValue": "evt1" } }
        });
        let error = decode_check_in(&document).unwrap_err();
        assert!(matches!(error, RemoteError::InvalidDocument(_)));
        assert!(decode_event(&json!({ "name": "x" })).is_err());
    }

    #[test]
    fn registration_accepts_legacy_status() {
        let document = json!({
            "name": format!("{BASE}/registrations/evt1:usr1"),
            "fields": {
                "eventId": { "stringValue": "evt1" },
                "attendeeId": { "stringValue": "usr1" },
                "status": { "stringValue": "a" },
            }
        });
        let registration = decode_registration(&document).unwrap();
        assert_eq!(registration.status, RegistrationStatus::Accepted);
    }

    #[test]
    fn query_documents_skips_read_time_only_rows() {
        let response = json!([
            { "readTime": "2025-01-01T00:00:00Z" },
            { "document": { "name": "a" } },
        ]);
        assert_eq!(query_documents(&response).len(), 1);
        assert!(query_documents(&json!({})).is_empty());
    }

    #[test]
    fn document_id_is_last_segment() {
        assert_eq!(document_id(&format!("{BASE}/events/evt1")), "evt1");
        assert_eq!(document_id("plain"), "plain");
    }
}
