//! Type-safe wrappers for broker protocol primitives.
//!
//! These newtypes provide type safety to prevent mixing up different
//! integer types that have the same underlying representation but
//! different semantic meanings, plus the small ordered value types the
//! control plane sorts and compares (partition sequence numbers and sync
//! points).

use bytes::BufMut;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::encode::ToByte;
use crate::error::Result;

/// A cluster node identifier.
///
/// Node ids are 32-bit signed integers that uniquely identify broker
/// nodes within a cluster. Cross-references between cluster structures
/// are always by node id, never by direct reference.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct NodeId(pub i32);

impl NodeId {
    /// Invalid node id, typically used to indicate no primary.
    pub const INVALID: Self = NodeId(-1);

    /// Create a new node id from a raw value.
    #[inline]
    pub const fn new(value: i32) -> Self {
        NodeId(value)
    }

    /// Get the raw i32 value.
    #[inline]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Check if this is a valid (non-negative) node id.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl From<i32> for NodeId {
    fn from(value: i32) -> Self {
        NodeId(value)
    }
}

impl From<NodeId> for i32 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToByte for NodeId {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.0.encode(buffer)
    }
}

/// A partition identifier.
///
/// Partitions are the unit of sharding over queues; ids index into the
/// cluster's partition table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct PartitionId(pub u32);

impl PartitionId {
    /// Create a new partition id from a raw value.
    #[inline]
    pub const fn new(value: u32) -> Self {
        PartitionId(value)
    }

    /// Get the raw u32 value.
    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Get the partition id as a table index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for PartitionId {
    fn from(value: u32) -> Self {
        PartitionId(value)
    }
}

impl From<PartitionId> for u32 {
    fn from(id: PartitionId) -> Self {
        id.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToByte for PartitionId {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.0.encode(buffer)
    }
}

/// A per-connection queue identifier.
///
/// Queue ids are negotiated per client session when a queue is opened and
/// appear in PUT, CONFIRM and ACK messages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct QueueId(pub u32);

impl QueueId {
    /// Queue id reserved for "not yet assigned".
    pub const UNASSIGNED: Self = QueueId(u32::MAX);

    /// Create a new queue id from a raw value.
    #[inline]
    pub const fn new(value: u32) -> Self {
        QueueId(value)
    }

    /// Get the raw u32 value.
    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl From<u32> for QueueId {
    fn from(value: u32) -> Self {
        QueueId(value)
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToByte for QueueId {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.0.encode(buffer)
    }
}

/// A request correlation identifier.
///
/// Correlation ids are 32-bit signed integers that clients use to match
/// acknowledgements to their corresponding PUT messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CorrelationId(pub i32);

impl CorrelationId {
    /// Create a new correlation id from a raw value.
    #[inline]
    pub const fn new(value: i32) -> Self {
        CorrelationId(value)
    }

    /// Get the raw i32 value.
    #[inline]
    pub const fn value(self) -> i32 {
        self.0
    }
}

impl From<i32> for CorrelationId {
    fn from(value: i32) -> Self {
        CorrelationId(value)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToByte for CorrelationId {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.0.encode(buffer)
    }
}

/// A primary's tenure over a partition.
///
/// Lease ids are 1-based and monotonically increasing: a new primary for
/// a partition always carries a strictly greater lease id than the old
/// one. 0 means the partition never had a primary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct LeaseId(pub u64);

impl LeaseId {
    /// Lease id of a partition that never had a primary.
    pub const NONE: Self = LeaseId(0);

    /// Create a new lease id from a raw value.
    #[inline]
    pub const fn new(value: u64) -> Self {
        LeaseId(value)
    }

    /// Get the raw u64 value.
    #[inline]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Check if this is a valid (1-based) lease id.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 >= 1
    }

    /// The lease id a successor primary must use.
    #[inline]
    pub const fn next(self) -> Self {
        LeaseId(self.0 + 1)
    }
}

impl From<u64> for LeaseId {
    fn from(value: u64) -> Self {
        LeaseId(value)
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A monotonic cursor over a partition's message stream.
///
/// Ordered lexicographically by `(primary_lease_id, sequence_number)`:
/// everything written under a later lease sorts after everything written
/// under an earlier one, regardless of raw sequence values.
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
pub struct PartitionSequenceNumber {
    /// Lease id of the primary that produced this sequence number.
    pub primary_lease_id: LeaseId,
    /// Sequence number within the lease.
    pub sequence_number: u64,
}

impl PartitionSequenceNumber {
    /// Create a new partition sequence number.
    pub const fn new(primary_lease_id: LeaseId, sequence_number: u64) -> Self {
        Self {
            primary_lease_id,
            sequence_number,
        }
    }
}

impl fmt::Display for PartitionSequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[leaseId: {}, sequenceNumber: {}]",
            self.primary_lease_id, self.sequence_number
        )
    }
}

/// A reference into journal files used to align replicas.
///
/// Ordered lexicographically over the four fields in declaration order.
/// Lease id is compared first, then sequence number; the file offsets
/// only break ties between otherwise identical points.
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
pub struct SyncPoint {
    /// Lease id of the primary that emitted the sync point.
    pub primary_lease_id: LeaseId,
    /// Sequence number of the sync point within the lease.
    pub sequence_num: u64,
    /// Offset into the data file, in double-words.
    pub data_file_offset_dwords: u64,
    /// Offset into the qlist file, in words.
    pub qlist_file_offset_words: u64,
}

impl SyncPoint {
    /// Create a new sync point.
    pub const fn new(
        primary_lease_id: LeaseId,
        sequence_num: u64,
        data_file_offset_dwords: u64,
        qlist_file_offset_words: u64,
    ) -> Self {
        Self {
            primary_lease_id,
            sequence_num,
            data_file_offset_dwords,
            qlist_file_offset_words,
        }
    }

    /// Check whether this sync point carries a real lease and sequence.
    pub const fn is_valid(&self) -> bool {
        self.primary_lease_id.value() >= 1 && self.sequence_num >= 1
    }
}

impl fmt::Display for SyncPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[leaseId: {}, sequenceNum: {}, dataOffsetDwords: {}, qlistOffsetWords: {}]",
            self.primary_lease_id,
            self.sequence_num,
            self.data_file_offset_dwords,
            self.qlist_file_offset_words
        )
    }
}

/// A sync point paired with its journal offset.
///
/// Ordered lexicographically: sync point first, offset second.
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
pub struct SyncPointOffsetPair {
    /// The sync point.
    pub sync_point: SyncPoint,
    /// Offset of the sync point record in the journal file.
    pub offset: u64,
}

impl SyncPointOffsetPair {
    /// Create a new pair.
    pub const fn new(sync_point: SyncPoint, offset: u64) -> Self {
        Self { sync_point, offset }
    }

    /// Check whether the pair points at a real journal record.
    pub const fn is_valid(&self) -> bool {
        self.sync_point.is_valid() && self.offset != 0
    }
}

impl fmt::Display for SyncPointOffsetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[syncPoint: {}, offset: {}]", self.sync_point, self.offset)
    }
}
