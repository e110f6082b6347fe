//! Row-change subscriptions.

use serde_json::Value as JsonValue;
use tokio::sync::mpsc;

/// Kind of row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// Filter wildcard: every kind.
    All,
}

impl ChangeKind {
    /// Event name used by the change feed.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::All => "*",
        }
    }

    /// Parse an event name from the change feed.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            "*" => Some(Self::All),
            _ => None,
        }
    }
}

/// Which changes a channel listens for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub schema: String,
    pub table: String,
    pub kind: ChangeKind,
}

impl ChangeFilter {
    /// Changes of `kind` on `public.<table>`.
    pub fn table(table: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            schema: "public".to_owned(),
            table: table.into(),
            kind,
        }
    }

    #[must_use]
    pub fn accepts(&self, event: &ChangeEvent) -> bool {
        self.table == event.table && (self.kind == ChangeKind::All || self.kind == event.kind)
    }
}

/// One row change pushed by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    /// New row values (empty object for deletes).
    pub record: JsonValue,
    /// Previous row values when the backend sends them.
    pub old_record: JsonValue,
}

/// Identifies a subscribed channel for removal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelHandle {
    pub id: u64,
    pub name: String,
}

/// A subscribed channel and the stream of its change events.
#[derive(Debug)]
pub struct RealtimeChannel {
    handle: ChannelHandle,
    events: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl RealtimeChannel {
    #[must_use]
    pub const fn new(handle: ChannelHandle, events: mpsc::UnboundedReceiver<ChangeEvent>) -> Self {
        Self { handle, events }
    }

    /// Split into the handle (for removal) and the event receiver.
    #[must_use]
    pub fn into_parts(self) -> (ChannelHandle, mpsc::UnboundedReceiver<ChangeEvent>) {
        (self.handle, self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(table: &str, kind: ChangeKind) -> ChangeEvent {
        ChangeEvent {
            table: table.to_owned(),
            kind,
            record: serde_json::json!({}),
            old_record: JsonValue::Null,
        }
    }

    #[test]
    fn test_filter_accepts_matching_kind_and_table() {
        let filter = ChangeFilter::table("company_settings", ChangeKind::Update);
        assert!(filter.accepts(&event("company_settings", ChangeKind::Update)));
        assert!(!filter.accepts(&event("company_settings", ChangeKind::Insert)));
        assert!(!filter.accepts(&event("products", ChangeKind::Update)));
    }

    #[test]
    fn test_wildcard_filter() {
        let filter = ChangeFilter::table("products", ChangeKind::All);
        assert!(filter.accepts(&event("products", ChangeKind::Delete)));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ChangeKind::parse("UPDATE"), Some(ChangeKind::Update));
        assert_eq!(ChangeKind::Delete.as_str(), "DELETE");
        assert_eq!(ChangeKind::parse("TRUNCATE"), None);
    }
}
