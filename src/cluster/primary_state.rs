//! Primary lifecycle state machine, tracked per partition.
//!
//! Each partition is in exactly one of three states from the cluster's
//! perspective:
//! - NoPrimary: no node owns the partition
//! - ActivePrimary: a primary owns the partition and serves traffic
//! - PassivePrimary: a primary is mapped but still recovering/syncing
//!
//! # State Transitions
//!
//! ```text
//! NoPrimary -> ActivePrimary -> PassivePrimary -> NoPrimary
//!     |              ^                |
//!     v              |                |
//! PassivePrimary ----+----------------+
//! ```
//!
//! The canonical cycle is `NoPrimary -> ActivePrimary -> PassivePrimary
//! -> NoPrimary` (a primary is demoted to passive on its way out, never
//! dropped while active). A freshly mapped primary may also enter
//! through `PassivePrimary` and report in as active once its storage is
//! caught up. Transitions are driven by the coordinator's
//! `on_partition_primary_assignment`, which is also invoked on
//! status-only changes (same primary, new status).

use std::fmt;
use std::time::Instant;

use crate::types::{LeaseId, NodeId};

use super::messages::PrimaryStatus;

/// Primary state of one partition.
#[derive(Default)]
pub enum PartitionPrimaryState {
    /// No node owns the partition.
    #[default]
    NoPrimary,

    /// A primary owns the partition and serves traffic.
    ActivePrimary {
        /// The owning node.
        node: NodeId,
        /// Lease id of the tenure.
        lease_id: LeaseId,
        /// When the primary went active.
        since: Instant,
    },

    /// A primary is mapped but not yet (or no longer) serving.
    PassivePrimary {
        /// The owning node.
        node: NodeId,
        /// Lease id of the tenure.
        lease_id: LeaseId,
        /// When the primary went passive.
        since: Instant,
    },
}

impl fmt::Debug for PartitionPrimaryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionPrimaryState::NoPrimary => write!(f, "NoPrimary"),
            PartitionPrimaryState::ActivePrimary {
                node,
                lease_id,
                since,
            } => f
                .debug_struct("ActivePrimary")
                .field("node", node)
                .field("lease_id", lease_id)
                .field("duration", &since.elapsed())
                .finish(),
            PartitionPrimaryState::PassivePrimary {
                node,
                lease_id,
                since,
            } => f
                .debug_struct("PassivePrimary")
                .field("node", node)
                .field("lease_id", lease_id)
                .field("duration", &since.elapsed())
                .finish(),
        }
    }
}

impl PartitionPrimaryState {
    /// Create the no-primary state.
    pub fn no_primary() -> Self {
        PartitionPrimaryState::NoPrimary
    }

    /// Enter the active state for `node`.
    pub fn active(node: NodeId, lease_id: LeaseId) -> Self {
        PartitionPrimaryState::ActivePrimary {
            node,
            lease_id,
            since: Instant::now(),
        }
    }

    /// Enter the passive state for `node`.
    pub fn passive(node: NodeId, lease_id: LeaseId) -> Self {
        PartitionPrimaryState::PassivePrimary {
            node,
            lease_id,
            since: Instant::now(),
        }
    }

    /// Build the state matching a primary/status pair from an advisory.
    pub fn from_assignment(
        primary: Option<NodeId>,
        lease_id: LeaseId,
        status: PrimaryStatus,
    ) -> Self {
        match (primary, status) {
            (None, _) | (_, PrimaryStatus::Undefined) => Self::no_primary(),
            (Some(node), PrimaryStatus::Active) => Self::active(node, lease_id),
            (Some(node), PrimaryStatus::Passive) => Self::passive(node, lease_id),
        }
    }

    /// True when a primary is mapped, active or passive.
    pub fn has_primary(&self) -> bool {
        !matches!(self, PartitionPrimaryState::NoPrimary)
    }

    /// True when the primary is serving.
    pub fn is_active(&self) -> bool {
        matches!(self, PartitionPrimaryState::ActivePrimary { .. })
    }

    /// True when a primary is mapped but not serving.
    pub fn is_passive(&self) -> bool {
        matches!(self, PartitionPrimaryState::PassivePrimary { .. })
    }

    /// The mapped primary node, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            PartitionPrimaryState::NoPrimary => None,
            PartitionPrimaryState::ActivePrimary { node, .. }
            | PartitionPrimaryState::PassivePrimary { node, .. } => Some(*node),
        }
    }

    /// Lease id of the current tenure, if any.
    pub fn lease_id(&self) -> Option<LeaseId> {
        match self {
            PartitionPrimaryState::NoPrimary => None,
            PartitionPrimaryState::ActivePrimary { lease_id, .. }
            | PartitionPrimaryState::PassivePrimary { lease_id, .. } => Some(*lease_id),
        }
    }

    /// How long the partition has been in the current state.
    pub fn duration_in_state(&self) -> Option<std::time::Duration> {
        match self {
            PartitionPrimaryState::NoPrimary => None,
            PartitionPrimaryState::ActivePrimary { since, .. }
            | PartitionPrimaryState::PassivePrimary { since, .. } => Some(since.elapsed()),
        }
    }

    /// The wire status corresponding to this state.
    pub fn status(&self) -> PrimaryStatus {
        match self {
            PartitionPrimaryState::NoPrimary => PrimaryStatus::Undefined,
            PartitionPrimaryState::ActivePrimary { .. } => PrimaryStatus::Active,
            PartitionPrimaryState::PassivePrimary { .. } => PrimaryStatus::Passive,
        }
    }

    /// Human-readable state name.
    pub fn state_name(&self) -> &'static str {
        match self {
            PartitionPrimaryState::NoPrimary => "no_primary",
            PartitionPrimaryState::ActivePrimary { .. } => "active_primary",
            PartitionPrimaryState::PassivePrimary { .. } => "passive_primary",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_primary_state() {
        let state = PartitionPrimaryState::no_primary();
        assert!(!state.has_primary());
        assert!(!state.is_active());
        assert!(!state.is_passive());
        assert!(state.node().is_none());
        assert!(state.lease_id().is_none());
        assert!(state.duration_in_state().is_none());
        assert_eq!(state.state_name(), "no_primary");
        assert_eq!(state.status(), PrimaryStatus::Undefined);
    }

    #[test]
    fn test_active_state() {
        let state = PartitionPrimaryState::active(NodeId::new(2), LeaseId::new(3));
        assert!(state.has_primary());
        assert!(state.is_active());
        assert!(!state.is_passive());
        assert_eq!(state.node(), Some(NodeId::new(2)));
        assert_eq!(state.lease_id(), Some(LeaseId::new(3)));
        assert!(state.duration_in_state().is_some());
        assert_eq!(state.state_name(), "active_primary");
        assert_eq!(state.status(), PrimaryStatus::Active);
    }

    #[test]
    fn test_passive_state() {
        let state = PartitionPrimaryState::passive(NodeId::new(1), LeaseId::new(1));
        assert!(state.has_primary());
        assert!(!state.is_active());
        assert!(state.is_passive());
        assert_eq!(state.state_name(), "passive_primary");
        assert_eq!(state.status(), PrimaryStatus::Passive);
    }

    #[test]
    fn test_default_is_no_primary() {
        let state = PartitionPrimaryState::default();
        assert_eq!(state.state_name(), "no_primary");
    }

    #[test]
    fn test_canonical_cycle() {
        // NoPrimary -> ActivePrimary -> PassivePrimary -> NoPrimary
        let node = NodeId::new(4);
        let mut state = PartitionPrimaryState::no_primary();

        state = PartitionPrimaryState::from_assignment(
            Some(node),
            LeaseId::new(1),
            PrimaryStatus::Active,
        );
        assert!(state.is_active());

        state = PartitionPrimaryState::from_assignment(
            Some(node),
            LeaseId::new(1),
            PrimaryStatus::Passive,
        );
        assert!(state.is_passive());

        state = PartitionPrimaryState::from_assignment(None, LeaseId::new(1), PrimaryStatus::Undefined);
        assert!(!state.has_primary());
    }

    #[test]
    fn test_from_assignment_undefined_status_clears() {
        let state = PartitionPrimaryState::from_assignment(
            Some(NodeId::new(1)),
            LeaseId::new(1),
            PrimaryStatus::Undefined,
        );
        assert!(!state.has_primary());
    }

    #[test]
    fn test_debug_includes_duration() {
        let state = PartitionPrimaryState::active(NodeId::new(1), LeaseId::new(1));
        let debug = format!("{:?}", state);
        assert!(debug.contains("ActivePrimary"));
        assert!(debug.contains("duration"));

        assert_eq!(format!("{:?}", PartitionPrimaryState::NoPrimary), "NoPrimary");
    }
}
