//! Bounded store of packet snapshots for status queries.

use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::RwLock;
use tripwire_core::{
    Action, ErrorRecord, Packet, PacketId, PacketStatus, Priority, ProcessingLogEntry, Timestamp,
    ValidationResult,
};

/// Point-in-time view of a packet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacketSnapshot {
    /// Packet id
    pub packet_id: PacketId,
    /// Lifecycle state
    pub status: PacketStatus,
    /// Target service, absent for malformed input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<String>,
    /// Requested action, absent for malformed input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    /// Item type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    /// Advisory priority
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Packet creation time
    pub created_at: Timestamp,
    /// When this snapshot was taken
    pub updated_at: Timestamp,
    /// Validation results so far
    pub validation_results: Option<ValidationResult>,
    /// Processing log so far
    pub processing_log: Vec<ProcessingLogEntry>,
    /// Terminal error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

impl PacketSnapshot {
    /// Snapshot a packet
    #[must_use]
    pub fn from_packet(packet: &Packet) -> Self {
        Self {
            packet_id: packet.id(),
            status: packet.status(),
            tool_type: Some(packet.tool_type().to_string()),
            action: Some(packet.action()),
            item_type: packet.item_type().map(str::to_string),
            priority: Some(packet.request().priority),
            created_at: packet.timestamp(),
            updated_at: Timestamp::now(),
            validation_results: packet.validation_results().cloned(),
            processing_log: packet.processing_log().to_vec(),
            error: packet.error().cloned(),
        }
    }

    /// Snapshot input that never became a packet
    #[must_use]
    pub fn from_malformed(
        packet_id: PacketId,
        validation: ValidationResult,
        log: Vec<ProcessingLogEntry>,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            packet_id,
            status: PacketStatus::Error,
            tool_type: None,
            action: None,
            item_type: None,
            priority: None,
            created_at: now,
            updated_at: now,
            error: validation.first_error().cloned(),
            validation_results: Some(validation),
            processing_log: log,
        }
    }
}

/// Insertion-ordered snapshots, oldest dropped first once full
#[derive(Debug)]
pub struct StatusStore {
    entries: RwLock<IndexMap<PacketId, PacketSnapshot>>,
    capacity: usize,
}

impl StatusStore {
    /// Create a store holding at most `capacity` packets
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Insert or replace a snapshot. Replacing keeps the original position.
    pub async fn record(&self, snapshot: PacketSnapshot) {
        let mut entries = self.entries.write().await;
        entries.insert(snapshot.packet_id, snapshot);
        while entries.len() > self.capacity {
            if let Some((dropped, _)) = entries.shift_remove_index(0) {
                tracing::trace!(packet_id = %dropped, "Dropped packet status");
            }
        }
    }

    /// Latest snapshot for a packet
    pub async fn get(&self, packet_id: &PacketId) -> Option<PacketSnapshot> {
        self.entries.read().await.get(packet_id).cloned()
    }

    /// Number of retained packets
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether nothing is retained
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Retention limit
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use tripwire_core::PacketRequest;

    fn packet() -> Packet {
        let payload: Map<_, _> = json!({"content": "x"}).as_object().cloned().unwrap();
        Packet::from_request(PacketRequest::new("todoist", Action::Create, payload).with_item_type("task"))
    }

    #[tokio::test]
    async fn test_record_and_update_in_place() {
        let store = StatusStore::new(4);
        let mut p = packet();
        store.record(PacketSnapshot::from_packet(&p)).await;
        let other = packet();
        store.record(PacketSnapshot::from_packet(&other)).await;

        p.transition(PacketStatus::Processing).unwrap();
        store.record(PacketSnapshot::from_packet(&p)).await;

        let snapshot = store.get(&p.id()).await.unwrap();
        assert_eq!(snapshot.status, PacketStatus::Processing);
        assert_eq!(snapshot.tool_type.as_deref(), Some("todoist"));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_fifo_retention() {
        let store = StatusStore::new(2);
        let packets: Vec<Packet> = (0..3).map(|_| packet()).collect();
        for p in &packets {
            store.record(PacketSnapshot::from_packet(p)).await;
        }
        assert_eq!(store.len().await, 2);
        assert!(store.get(&packets[0].id()).await.is_none());
        assert!(store.get(&packets[2].id()).await.is_some());
    }

    #[tokio::test]
    async fn test_malformed_snapshot() {
        let store = StatusStore::new(2);
        let id = PacketId::new();
        let mut validation = ValidationResult::new();
        validation.fail(ErrorRecord::new(
            tripwire_core::ErrorKind::FormatError,
            "MISSING_REQUIRED_FIELDS",
            "missing action",
            "action",
        ));
        store.record(PacketSnapshot::from_malformed(id, validation, Vec::new())).await;

        let snapshot = store.get(&id).await.unwrap();
        assert_eq!(snapshot.status, PacketStatus::Error);
        assert_eq!(snapshot.error.unwrap().error_code, "MISSING_REQUIRED_FIELDS");
        assert!(snapshot.action.is_none());
    }

    #[tokio::test]
    async fn test_unknown_packet() {
        assert!(StatusStore::new(1).get(&PacketId::new()).await.is_none());
    }
}
