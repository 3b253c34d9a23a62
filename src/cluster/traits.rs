//! Interfaces the control plane consumes from the surrounding system.
//!
//! The core never talks to disks or sockets directly. It sees:
//!
//! - [`StorageManager`]: the persistent storage layer, notified when a
//!   partition's primary changes so it can open, sync or close journals.
//! - [`ClusterNetwork`]: the transport, handed fire-and-forget control
//!   messages. Delivery retries are the transport's business; the
//!   coordinator never blocks on a send.
//!
//! Both are called exclusively from the cluster dispatcher thread, so
//! implementations may assume single-threaded access to their methods
//! (the `Send` bound exists so the owning dispatcher task can migrate
//! across runtime workers).

use super::messages::{ClusterMessage, PrimaryStatus};
use crate::types::{LeaseId, NodeId, PartitionId};

/// Persistent storage layer notifications.
pub trait StorageManager: Send {
    /// A partition's primary mapping changed: `primary` (with
    /// `lease_id` and `status`) replaces whatever was mapped before.
    /// `None` means the partition is orphaned.
    fn set_primary_for_partition(
        &mut self,
        partition_id: PartitionId,
        primary: Option<NodeId>,
        lease_id: LeaseId,
        status: PrimaryStatus,
    );
}

/// Outbound control-plane messaging.
pub trait ClusterNetwork: Send {
    /// Enqueue `message` for `target` and return immediately. A `None`
    /// target broadcasts to all follower nodes.
    fn post(&mut self, target: Option<NodeId>, message: ClusterMessage);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingStorage {
        notifications: Vec<(PartitionId, Option<NodeId>, LeaseId, PrimaryStatus)>,
    }

    impl StorageManager for RecordingStorage {
        fn set_primary_for_partition(
            &mut self,
            partition_id: PartitionId,
            primary: Option<NodeId>,
            lease_id: LeaseId,
            status: PrimaryStatus,
        ) {
            self.notifications
                .push((partition_id, primary, lease_id, status));
        }
    }

    #[test]
    fn test_storage_manager_object_safety() {
        let mut storage = RecordingStorage {
            notifications: vec![],
        };
        let dyn_storage: &mut dyn StorageManager = &mut storage;
        dyn_storage.set_primary_for_partition(
            PartitionId::new(1),
            Some(NodeId::new(2)),
            LeaseId::new(3),
            PrimaryStatus::Active,
        );
        assert_eq!(storage.notifications.len(), 1);
    }
}
