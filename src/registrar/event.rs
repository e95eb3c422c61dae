//! Registrar event protocol.
//!
//! Producers (discovery and harvesting) never touch the file state store
//! directly: they describe what happened as a [`RegistrarEvent`] and hand it
//! to the registrar, which applies events sequentially. The variant set is
//! closed and exhaustively matched in the store's apply routine, so adding
//! a variant forces every handler to be updated.
//!
//! All variants except `NewFile` carry an already-resolved [`FileIdentity`];
//! `NewFile` carries the identity discovery resolved from the raw sighting.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::identity::FileIdentity;

/// A state mutation destined for the file state store.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrarEvent {
    /// First sighting of a file by discovery.
    ///
    /// If the identity is already tracked (a checkpoint match, or a rename
    /// observed as a fresh discovery), the existing entry resumes from its
    /// stored offset; `offset` seeds only a genuinely new entry.
    NewFile {
        source: String,
        identity: FileIdentity,
        offset: u64,
    },

    /// Bytes up to `offset` have been confirmed forwarded.
    ///
    /// The offset is cumulative and is *set*, not added, so redelivery of
    /// the same event is idempotent.
    BytesRead { identity: FileIdentity, offset: u64 },

    /// The file moved to a new path; identity and offset are unchanged.
    Renamed { identity: FileIdentity, source: String },

    /// The file vanished from disk. State is retained until dead time
    /// elapses, so a resurrected file resumes mid-stream.
    Deleted { identity: FileIdentity },

    /// An ordered group of line events whose delivery the collector has
    /// confirmed. Applying the batch advances each member file's offset;
    /// coupling offset advancement to confirmed delivery (never to local
    /// reads) is what makes resumption at-least-once instead of lossy.
    Batch(EventBatch),
}

/// An ordered group of line events forwarded to the collector as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventBatch {
    events: Vec<LineEvent>,
}

impl EventBatch {
    pub fn new() -> Self {
        EventBatch { events: Vec::new() }
    }

    pub fn push(&mut self, event: LineEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The events in delivery order.
    pub fn events(&self) -> &[LineEvent] {
        &self.events
    }
}

impl FromIterator<LineEvent> for EventBatch {
    fn from_iter<I: IntoIterator<Item = LineEvent>>(iter: I) -> Self {
        EventBatch {
            events: iter.into_iter().collect(),
        }
    }
}

/// One harvested line, ready for the collector.
///
/// `offset` is the byte position just past the end of the line in the
/// source file; confirming delivery of this event means everything up to
/// `offset` may be skipped on restart.
#[derive(Debug, Clone, PartialEq)]
pub struct LineEvent {
    pub identity: FileIdentity,
    pub source: String,
    pub offset: u64,
    payload: Map<String, Value>,
}

impl LineEvent {
    /// Builds the collector payload for one line.
    ///
    /// The payload is the group's static fields plus the required `file`,
    /// `offset`, and `line` keys. The required keys are written last so a
    /// group field can never mask them. The collector wire expects `line`,
    /// not `message`.
    pub fn new(
        identity: FileIdentity,
        source: impl Into<String>,
        offset: u64,
        line: &str,
        fields: &BTreeMap<String, String>,
    ) -> Self {
        let source = source.into();
        let mut payload = Map::with_capacity(fields.len() + 3);
        for (k, v) in fields {
            payload.insert(k.clone(), Value::String(v.clone()));
        }
        payload.insert("file".to_string(), Value::String(source.clone()));
        payload.insert("offset".to_string(), Value::from(offset));
        payload.insert("line".to_string(), Value::String(line.to_string()));

        LineEvent {
            identity,
            source,
            offset,
            payload,
        }
    }

    /// The fully-formed collector payload.
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_identity() -> FileIdentity {
        FileIdentity::Inode {
            device: 1,
            inode: 42,
        }
    }

    #[test]
    fn payload_carries_required_keys() {
        let mut fields = BTreeMap::new();
        fields.insert("type".to_string(), "syslog".to_string());

        let event = LineEvent::new(test_identity(), "/var/log/syslog", 128, "boot ok", &fields);
        let payload = event.payload();

        assert_eq!(payload["file"], "/var/log/syslog");
        assert_eq!(payload["offset"], 128);
        assert_eq!(payload["line"], "boot ok");
        assert_eq!(payload["type"], "syslog");
    }

    #[test]
    fn group_fields_cannot_mask_required_keys() {
        let mut fields = BTreeMap::new();
        fields.insert("line".to_string(), "spoofed".to_string());
        fields.insert("offset".to_string(), "spoofed".to_string());

        let event = LineEvent::new(test_identity(), "/var/log/app.log", 10, "real line", &fields);
        let payload = event.payload();

        assert_eq!(payload["line"], "real line");
        assert_eq!(payload["offset"], 10);
    }

    #[test]
    fn batch_preserves_order() {
        let fields = BTreeMap::new();
        let batch: EventBatch = (1..=3)
            .map(|n| {
                LineEvent::new(
                    test_identity(),
                    "/var/log/app.log",
                    n * 10,
                    &format!("line {}", n),
                    &fields,
                )
            })
            .collect();

        let offsets: Vec<u64> = batch.events().iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![10, 20, 30]);
    }
}
