//! Optimistic roster cache of the active event

use std::collections::HashMap;

use crate::models::{AttendeeId, AttendeeStatus, EventId, RegistrationStatus, RosterEntry};

/// In-memory roster of one event.
///
/// Always used behind a single mutex so that [`RosterCache::try_mark_checked_in`]
/// is an atomic check-and-set.
#[derive(Debug, Default)]
pub struct RosterCache {
    event_id: Option<EventId>,
    entries: HashMap<AttendeeId, RosterEntry>,
}

impl RosterCache {
    /// Replace the cache contents with the roster of `event_id`
    pub fn load(&mut self, event_id: &EventId, entries: impl IntoIterator<Item = RosterEntry>) {
        self.event_id = Some(event_id.clone());
        self.entries = entries
            .into_iter()
            .map(|entry| (entry.attendee_id.clone(), entry))
            .collect();
    }

    #[must_use]
    pub fn is_loaded_for(&self, event_id: &EventId) -> bool {
        self.event_id.as_ref() == Some(event_id)
    }

    /// `None` when the cache holds nothing about the pair
    #[must_use]
    pub fn status(&self, event_id: &EventId, attendee_id: &AttendeeId) -> Option<AttendeeStatus> {
        if !self.is_loaded_for(event_id) {
            return None;
        }
        self.entries.get(attendee_id).map(RosterEntry::status)
    }

    #[must_use]
    pub fn entry(&self, event_id: &EventId, attendee_id: &AttendeeId) -> Option<&RosterEntry> {
        if !self.is_loaded_for(event_id) {
            return None;
        }
        self.entries.get(attendee_id)
    }

    /// Insert or replace one entry; ignored for events not in the cache
    pub fn upsert(&mut self, event_id: &EventId, entry: RosterEntry) {
        if self.is_loaded_for(event_id) {
            self.entries.insert(entry.attendee_id.clone(), entry);
        }
    }

    /// Flip a registered attendee to checked-in.
    ///
    /// Returns `false` without changing anything unless the attendee is
    /// currently registered and not checked in.
    pub fn try_mark_checked_in(&mut self, event_id: &EventId, attendee_id: &AttendeeId) -> bool {
        if !self.is_loaded_for(event_id) {
            return false;
        }
        match self.entries.get_mut(attendee_id) {
            Some(entry) if entry.status() == AttendeeStatus::RegisteredNotCheckedIn => {
                entry.checked_in = true;
                true
            }
            _ => false,
        }
    }

    /// Force the checked-in flag, adding an entry when the attendee is unknown
    pub fn set_checked_in(&mut self, event_id: &EventId, attendee_id: &AttendeeId, checked_in: bool) {
        if !self.is_loaded_for(event_id) {
            return;
        }
        self.entries
            .entry(attendee_id.clone())
            .or_insert_with(|| RosterEntry {
                attendee_id: attendee_id.clone(),
                display_name: None,
                registration: RegistrationStatus::Waiting,
                checked_in,
            })
            .checked_in = checked_in;
    }

    /// Clear every checked-in flag of `event_id`
    pub fn clear_checked_in(&mut self, event_id: &EventId) {
        if self.is_loaded_for(event_id) {
            for entry in self.entries.values_mut() {
                entry.checked_in = false;
            }
        }
    }

    #[must_use]
    pub fn checked_in_count(&self, event_id: &EventId) -> usize {
        if !self.is_loaded_for(event_id) {
            return 0;
        }
        self.entries.values().filter(|entry| entry.checked_in).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> EventId {
        "evt1".parse().unwrap()
    }

    fn attendee(id: &str) -> AttendeeId {
        id.parse().unwrap()
    }

    fn loaded() -> RosterCache {
        let mut cache = RosterCache::default();
        cache.load(
            &event(),
            [
                RosterEntry {
                    attendee_id: attendee("usr1"),
                    display_name: None,
                    registration: RegistrationStatus::Accepted,
                    checked_in: false,
                },
                RosterEntry {
                    attendee_id: attendee("usr2"),
                    display_name: None,
                    registration: RegistrationStatus::Waiting,
                    checked_in: false,
                },
            ],
        );
        cache
    }

    #[test]
    fn check_and_set_succeeds_once() {
        let mut cache = loaded();
        assert!(cache.try_mark_checked_in(&event(), &attendee("usr1")));
        assert!(!cache.try_mark_checked_in(&event(), &attendee("usr1")));
        assert_eq!(
            cache.status(&event(), &attendee("usr1")),
            Some(AttendeeStatus::CheckedIn)
        );
    }

    #[test]
    fn unregistered_and_unknown_attendees_are_not_marked() {
        let mut cache = loaded();
        assert!(!cache.try_mark_checked_in(&event(), &attendee("usr2")));
        assert!(!cache.try_mark_checked_in(&event(), &attendee("ghost")));
        assert_eq!(cache.status(&event(), &attendee("ghost")), None);
        assert_eq!(cache.checked_in_count(&event()), 0);
    }

    #[test]
    fn other_events_are_ignored() {
        let mut cache = loaded();
        let other: EventId = "evt2".parse().unwrap();
        assert!(!cache.try_mark_checked_in(&other, &attendee("usr1")));
        cache.set_checked_in(&other, &attendee("usr1"), true);
        assert_eq!(cache.status(&other, &attendee("usr1")), None);
        assert_eq!(cache.checked_in_count(&event()), 0);
    }

    #[test]
    fn set_and_clear_checked_in() {
        let mut cache = loaded();
        cache.set_checked_in(&event(), &attendee("walkin"), true);
        cache.set_checked_in(&event(), &attendee("usr1"), true);
        assert_eq!(cache.checked_in_count(&event()), 2);
        assert_eq!(cache.len(), 3);

        cache.clear_checked_in(&event());
        assert_eq!(cache.checked_in_count(&event()), 0);
        assert_eq!(
            cache.status(&event(), &attendee("usr1")),
            Some(AttendeeStatus::RegisteredNotCheckedIn)
        );
    }
}
