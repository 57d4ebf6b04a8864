//! Promotional event links shown on posters and share sheets

use crate::models::EventId;

pub const EVENT_LINK_PREFIX: &str = "konoha://event/";

/// Deep link that opens an event's details page
#[must_use]
pub fn event_link(event_id: &EventId) -> String {
    format!("{EVENT_LINK_PREFIX}{event_id}")
}

/// Extract the event id from scanned link text.
///
/// Text without the link prefix is treated as a bare id.
#[must_use]
pub fn extract_event_id(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let id = text.strip_prefix(EVENT_LINK_PREFIX).unwrap_or(text);
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_event_link() {
        let id: EventId = "testEvent".parse().unwrap();
        assert_eq!(event_link(&id), "konoha://event/testEvent");
    }

    #[test]
    fn extracts_event_id_from_link() {
        assert_eq!(
            extract_event_id("konoha://event/testEvent").as_deref(),
            Some("testEvent")
        );
    }

    #[test]
    fn bare_text_is_returned_as_id() {
        assert_eq!(extract_event_id(" testEvent ").as_deref(), Some("testEvent"));
    }

    #[test]
    fn empty_input_yields_none() {
        assert_eq!(extract_event_id(""), None);
        assert_eq!(extract_event_id("konoha://event/"), None);
    }
}
