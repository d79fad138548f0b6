//! Classification of native watch events.
//!
//! The native layer describes an event as a pair of raw integers (event type,
//! session state) plus a path. [`classify`] turns that into a closed, typed
//! event value before anything else in the crate looks at it.

use crate::native;
use serde::{Deserialize, Serialize};

/// Connection-level session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Connected,
    Disconnected,
    /// The server expired the session; ephemerals are gone and the handle is
    /// unusable until a reconnect.
    Expired,
}

/// What a native watch event means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    /// The watched path came into existence.
    Created,
    /// The watched node was deleted. Terminal for the watch.
    Deleted,
    /// The watched node's payload changed.
    DataChanged,
    /// The watched node's child set changed.
    ChildrenChanged,
    /// A session-level event; global, not path-scoped.
    Session(SessionState),
    /// The native layer reports the subscription is not (or no longer)
    /// established; that side of the watch will never fire.
    NotWatching,
    /// An event type outside the documented enumeration.
    Unknown(i32),
}

/// A classified watch event as delivered to user callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchedEvent {
    pub kind: EventKind,
    /// The path the event concerns; empty for session events.
    pub path: String,
}

/// Which side of the default watcher fired, for the per-event-type change
/// callback registered at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Data,
    Children,
}

/// Classify a raw native `(event_type, state, path)` triple.
///
/// Total over all integer inputs: unexpected event types become
/// [`EventKind::Unknown`], unexpected session states are treated as
/// disconnection.
pub fn classify(event_type: i32, state: i32, path: &str) -> WatchedEvent {
    let kind = match event_type {
        native::SESSION_EVENT => EventKind::Session(match state {
            native::CONNECTED_STATE => SessionState::Connected,
            native::EXPIRED_SESSION_STATE => SessionState::Expired,
            _ => SessionState::Disconnected,
        }),
        native::CREATED_EVENT => EventKind::Created,
        native::DELETED_EVENT => EventKind::Deleted,
        native::CHANGED_EVENT => EventKind::DataChanged,
        native::CHILD_EVENT => EventKind::ChildrenChanged,
        native::NOT_WATCHING_EVENT => EventKind::NotWatching,
        other => EventKind::Unknown(other),
    };
    WatchedEvent {
        kind,
        path: path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::*;

    #[test]
    fn node_events_classify() {
        assert_eq!(
            classify(CREATED_EVENT, CONNECTED_STATE, "/a").kind,
            EventKind::Created
        );
        assert_eq!(
            classify(DELETED_EVENT, CONNECTED_STATE, "/a").kind,
            EventKind::Deleted
        );
        assert_eq!(
            classify(CHANGED_EVENT, CONNECTED_STATE, "/a").kind,
            EventKind::DataChanged
        );
        assert_eq!(
            classify(CHILD_EVENT, CONNECTED_STATE, "/a").kind,
            EventKind::ChildrenChanged
        );
        assert_eq!(classify(CHANGED_EVENT, CONNECTED_STATE, "/a").path, "/a");
    }

    #[test]
    fn session_events_classify_by_state() {
        assert_eq!(
            classify(SESSION_EVENT, CONNECTED_STATE, "").kind,
            EventKind::Session(SessionState::Connected)
        );
        assert_eq!(
            classify(SESSION_EVENT, EXPIRED_SESSION_STATE, "").kind,
            EventKind::Session(SessionState::Expired)
        );
        // Connecting, associating, auth-failed: all surface as disconnection.
        for state in [CONNECTING_STATE, ASSOCIATING_STATE, AUTH_FAILED_STATE, 0] {
            assert_eq!(
                classify(SESSION_EVENT, state, "").kind,
                EventKind::Session(SessionState::Disconnected)
            );
        }
    }

    #[test]
    fn not_watching_classifies() {
        assert_eq!(
            classify(NOT_WATCHING_EVENT, CONNECTED_STATE, "/a").kind,
            EventKind::NotWatching
        );
    }

    #[test]
    fn unexpected_event_types_are_unknown() {
        assert_eq!(
            classify(99, CONNECTED_STATE, "/a").kind,
            EventKind::Unknown(99)
        );
        assert_eq!(
            classify(-57, CONNECTED_STATE, "/a").kind,
            EventKind::Unknown(-57)
        );
    }
}
