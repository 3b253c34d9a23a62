//! Control messages replicated through the cluster state ledger.
//!
//! Every cluster-state mutation originates on the leader as an
//! *advisory*: a self-contained record journaled to the ledger, tagged
//! with a [`LeaderMessageSequence`] (LSN), and applied by every follower
//! in strict LSN order. The advisory kinds mirror the mutations the
//! state supports: queue assignment and unassignment, app-id updates,
//! partition-primary mapping changes, and full leader snapshots.
//!
//! Messages are serde-derived and framed with `bincode` when they travel
//! inside a CLUSTER_STATE event.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{ClusterError, ClusterResult};
use super::keys::{AppKey, QueueKey};
use crate::blob::Blob;
use crate::protocol::MessageGuid;
use crate::types::{CorrelationId, LeaseId, NodeId, PartitionId, QueueId, SyncPoint};

/// Leader message sequence number: `(leader term, sequence)`.
///
/// Strictly increasing per leader; a new leader starts at
/// `(new_term, 1)` and never reuses an older `(term, *)` pair.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
)]
pub struct LeaderMessageSequence {
    /// Election term of the leader that emitted the record.
    pub leader_term: u64,
    /// Sequence number within the term, 1-based.
    pub sequence_number: u64,
}

impl LeaderMessageSequence {
    /// Create an LSN.
    pub const fn new(leader_term: u64, sequence_number: u64) -> Self {
        Self {
            leader_term,
            sequence_number,
        }
    }

    /// The first LSN a leader of `term` may emit.
    pub const fn first_of_term(leader_term: u64) -> Self {
        Self::new(leader_term, 1)
    }

    /// The LSN following this one within the same term.
    pub const fn next(self) -> Self {
        Self::new(self.leader_term, self.sequence_number + 1)
    }
}

impl fmt::Display for LeaderMessageSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[term: {}, sequence: {}]",
            self.leader_term, self.sequence_number
        )
    }
}

/// Status of a partition's primary on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PrimaryStatus {
    /// No primary, or the primary has not reported in yet.
    #[default]
    Undefined,
    /// The primary is recovering or syncing; not yet serving.
    Passive,
    /// The primary is fully serving the partition.
    Active,
}

impl fmt::Display for PrimaryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimaryStatus::Undefined => "UNDEFINED",
            PrimaryStatus::Passive => "PASSIVE",
            PrimaryStatus::Active => "ACTIVE",
        };
        f.write_str(name)
    }
}

/// One partition-to-primary mapping entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionPrimaryInfo {
    /// The partition being mapped.
    pub partition_id: PartitionId,
    /// The node taking primaryship.
    pub primary_node_id: NodeId,
    /// The new primary's lease id.
    pub primary_lease_id: LeaseId,
}

/// An app registered on a queue: id plus derived key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdInfo {
    /// Application identifier from the domain configuration.
    pub app_id: String,
    /// Key derived from the app id, unique within the queue.
    pub app_key: AppKey,
}

/// Wire form of a queue registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueInfo {
    /// Full queue URI.
    pub uri: String,
    /// Storage key, unique within the partition.
    pub key: QueueKey,
    /// Partition the queue is mapped to.
    pub partition_id: PartitionId,
    /// Apps registered on the queue.
    pub app_ids: Vec<AppIdInfo>,
}

/// Advisory assigning one or more queues to partitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueAssignmentAdvisory {
    /// LSN assigned by the leader.
    pub sequence_number: LeaderMessageSequence,
    /// Queues being assigned.
    pub queues: Vec<QueueInfo>,
}

/// Advisory removing queue assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueUnAssignmentAdvisory {
    /// LSN assigned by the leader.
    pub sequence_number: LeaderMessageSequence,
    /// Queues being unassigned.
    pub queues: Vec<QueueInfo>,
}

/// Advisory updating the app set of one queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueUpdateAdvisory {
    /// LSN assigned by the leader.
    pub sequence_number: LeaderMessageSequence,
    /// Queue whose apps change.
    pub uri: String,
    /// Domain owning the queue.
    pub domain: String,
    /// Apps being added.
    pub added_apps: Vec<AppIdInfo>,
    /// Apps being removed.
    pub removed_apps: Vec<AppIdInfo>,
}

/// Advisory changing partition-to-primary mappings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionPrimaryAdvisory {
    /// LSN assigned by the leader.
    pub sequence_number: LeaderMessageSequence,
    /// New mappings; healthy partitions are never listed.
    pub partitions: Vec<PartitionPrimaryInfo>,
}

/// Full cluster snapshot emitted by a (possibly new) leader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderAdvisory {
    /// LSN assigned by the leader.
    pub sequence_number: LeaderMessageSequence,
    /// Partition-primary section; empty when not included.
    pub partitions: Vec<PartitionPrimaryInfo>,
    /// Queue section; empty when not included.
    pub queues: Vec<QueueInfo>,
}

/// Cluster-state snapshot pushed to front-end (proxy) nodes.
///
/// Front ends track state to route clients but never participate in
/// replication, so this message carries no LSN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStateFeUpdate {
    /// Partition-primary section.
    pub partitions: Vec<PartitionPrimaryInfo>,
    /// Queue section.
    pub queues: Vec<QueueInfo>,
}

/// Advisory recording a storage sync point for a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSyncPointAdvisory {
    /// LSN assigned by the leader.
    pub sequence_number: LeaderMessageSequence,
    /// Partition the sync point belongs to.
    pub partition_id: PartitionId,
    /// The sync point.
    pub sync_point: SyncPoint,
}

/// The closed set of control messages understood by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterMessage {
    /// Queue assignment.
    QueueAssignment(QueueAssignmentAdvisory),
    /// Queue unassignment.
    QueueUnassignment(QueueUnAssignmentAdvisory),
    /// App-id update on a queue.
    QueueUpdate(QueueUpdateAdvisory),
    /// Partition-primary mapping change.
    PartitionPrimary(PartitionPrimaryAdvisory),
    /// Leader snapshot.
    Leader(LeaderAdvisory),
    /// Front-end snapshot (not replicated, no LSN).
    FeUpdate(ClusterStateFeUpdate),
    /// Storage sync point.
    SyncPoint(PartitionSyncPointAdvisory),
}

impl ClusterMessage {
    /// LSN carried by the message, when it was originated by the leader.
    pub fn lsn(&self) -> Option<LeaderMessageSequence> {
        match self {
            ClusterMessage::QueueAssignment(a) => Some(a.sequence_number),
            ClusterMessage::QueueUnassignment(a) => Some(a.sequence_number),
            ClusterMessage::QueueUpdate(a) => Some(a.sequence_number),
            ClusterMessage::PartitionPrimary(a) => Some(a.sequence_number),
            ClusterMessage::Leader(a) => Some(a.sequence_number),
            ClusterMessage::FeUpdate(_) => None,
            ClusterMessage::SyncPoint(a) => Some(a.sequence_number),
        }
    }

    /// Short kind name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClusterMessage::QueueAssignment(_) => "queueAssignmentAdvisory",
            ClusterMessage::QueueUnassignment(_) => "queueUnAssignmentAdvisory",
            ClusterMessage::QueueUpdate(_) => "queueUpdateAdvisory",
            ClusterMessage::PartitionPrimary(_) => "partitionPrimaryAdvisory",
            ClusterMessage::Leader(_) => "leaderAdvisory",
            ClusterMessage::FeUpdate(_) => "clusterStateFEUpdate",
            ClusterMessage::SyncPoint(_) => "partitionSyncPointAdvisory",
        }
    }

    /// Serialize for a CLUSTER_STATE event body or a ledger record.
    pub fn encode(&self) -> ClusterResult<Bytes> {
        bincode::serialize(self)
            .map(Bytes::from)
            .map_err(|e| ClusterError::MalformedMessage(e.to_string()))
    }

    /// Decode from a contiguous byte string.
    ///
    /// A failed decode counts toward
    /// [`metrics::MESSAGE_DECODE_FAILURES`](super::metrics::MESSAGE_DECODE_FAILURES);
    /// the caller drops the event.
    pub fn decode(bytes: &[u8]) -> ClusterResult<Self> {
        bincode::deserialize(bytes).map_err(|e| {
            super::metrics::MESSAGE_DECODE_FAILURES.inc();
            ClusterError::MalformedMessage(e.to_string())
        })
    }

    /// Decode the message carried in an event blob.
    pub fn extract(event_blob: &Blob) -> ClusterResult<Self> {
        Self::decode(&event_blob.flatten())
    }
}

/// Acknowledgement of a PUT, positive or negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckMessage {
    /// Wire status code (see [`crate::protocol::AckResult`]).
    pub status: i32,
    /// Correlation id from the PUT being answered.
    pub correlation_id: CorrelationId,
    /// GUID of the message, when one was assigned.
    pub guid: MessageGuid,
    /// Queue the PUT addressed.
    pub queue_id: QueueId,
}

/// Header fields of a PUT message relevant to acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PutHeader {
    /// Flag bits.
    pub flags: u32,
    /// Queue the message is published to.
    pub queue_id: QueueId,
    /// Client-assigned correlation id.
    pub correlation_id: CorrelationId,
    /// Broker-assigned message GUID.
    pub message_guid: MessageGuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lsn_ordering() {
        let a = LeaderMessageSequence::new(1, 9);
        let b = LeaderMessageSequence::new(2, 1);
        let c = LeaderMessageSequence::new(2, 2);

        // Term dominates sequence.
        assert!(a < b);
        assert!(b < c);
        assert_eq!(b.next(), c);
        assert_eq!(LeaderMessageSequence::first_of_term(2), b);
    }

    #[test]
    fn test_lsn_display() {
        let lsn = LeaderMessageSequence::new(3, 7);
        assert_eq!(lsn.to_string(), "[term: 3, sequence: 7]");
    }

    #[test]
    fn test_message_lsn_accessor() {
        let lsn = LeaderMessageSequence::new(1, 1);
        let msg = ClusterMessage::PartitionPrimary(PartitionPrimaryAdvisory {
            sequence_number: lsn,
            partitions: vec![],
        });
        assert_eq!(msg.lsn(), Some(lsn));

        let fe = ClusterMessage::FeUpdate(ClusterStateFeUpdate {
            partitions: vec![],
            queues: vec![],
        });
        assert_eq!(fe.lsn(), None);
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let msg = ClusterMessage::QueueAssignment(QueueAssignmentAdvisory {
            sequence_number: LeaderMessageSequence::new(4, 2),
            queues: vec![QueueInfo {
                uri: "bmq://domain/queue".into(),
                key: QueueKey([1, 2, 3, 4]),
                partition_id: PartitionId::new(1),
                app_ids: vec![AppIdInfo {
                    app_id: "billing".into(),
                    app_key: AppKey([9, 9, 9, 9]),
                }],
            }],
        });

        let bytes = msg.encode().unwrap();
        let decoded = ClusterMessage::decode(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_extract_from_blob() {
        let msg = ClusterMessage::SyncPoint(PartitionSyncPointAdvisory {
            sequence_number: LeaderMessageSequence::new(1, 5),
            partition_id: PartitionId::new(2),
            sync_point: SyncPoint::new(LeaseId::new(1), 10, 64, 8),
        });
        let blob = Blob::from_bytes(msg.encode().unwrap());
        let decoded = ClusterMessage::extract(&blob).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_extract_malformed() {
        let blob = Blob::from_bytes(Bytes::from_static(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF]));
        assert!(matches!(
            ClusterMessage::extract(&blob),
            Err(ClusterError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_kind_names() {
        let fe = ClusterMessage::FeUpdate(ClusterStateFeUpdate {
            partitions: vec![],
            queues: vec![],
        });
        assert_eq!(fe.kind(), "clusterStateFEUpdate");
    }
}
