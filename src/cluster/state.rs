//! Authoritative in-memory cluster state.
//!
//! [`ClusterState`] is pure data plus indexed lookups: the partition
//! table (partition → primary node, lease, status) and the per-domain
//! queue registrations (URI → key, partition, apps, lifecycle state).
//! It is mutated exclusively on the cluster dispatcher thread, either
//! directly by the leader-side coordinator or through
//! [`ClusterState::apply`] when an advisory commits, so it needs no
//! locking.
//!
//! Queue registrations own their app infos by value and the state owns
//! registrations by value keyed by URI; every reference to a node is a
//! [`NodeId`], never a direct handle, which keeps the structure free of
//! reference cycles.
//!
//! # Queue Lifecycle
//!
//! ```text
//! Unassigned -> Assigning -> Assigned -> Unassigning -> Unassigned
//! ```
//!
//! Transitions never skip a stage. `Assigning` exists only on the
//! leader (between advisory append and commit); followers see a queue
//! appear directly in `Assigned` when they apply the advisory.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::{debug, warn};

use super::error::{ClusterError, ClusterResult};
use super::keys::{AppKey, QueueKey};
use super::messages::{
    AppIdInfo, ClusterMessage, PartitionPrimaryInfo, PrimaryStatus, QueueInfo,
};
use crate::types::{LeaseId, NodeId, PartitionId};

/// Lifecycle state of a queue registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueAssignmentState {
    /// Not registered (the implicit state of an absent entry).
    #[default]
    Unassigned,
    /// Assignment advisory appended, commit pending (leader only).
    Assigning,
    /// Assignment committed cluster-wide.
    Assigned,
    /// Unassignment requested, removal pending.
    Unassigning,
}

impl QueueAssignmentState {
    /// Human-readable state name.
    pub fn name(&self) -> &'static str {
        match self {
            QueueAssignmentState::Unassigned => "unassigned",
            QueueAssignmentState::Assigning => "assigning",
            QueueAssignmentState::Assigned => "assigned",
            QueueAssignmentState::Unassigning => "unassigning",
        }
    }

    /// True when `next` is one legal step from this state.
    pub fn can_transition_to(&self, next: QueueAssignmentState) -> bool {
        use QueueAssignmentState::*;
        matches!(
            (self, next),
            (Unassigned, Assigning)
                | (Assigning, Assigned)
                | (Assigned, Unassigning)
                | (Unassigning, Unassigned)
        )
    }
}

/// A queue registration held by the cluster state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterStateQueueInfo {
    uri: String,
    key: QueueKey,
    partition_id: PartitionId,
    app_infos: BTreeMap<String, AppKey>,
    state: QueueAssignmentState,
}

impl ClusterStateQueueInfo {
    /// Create a registration in the given lifecycle state.
    pub fn new(
        uri: impl Into<String>,
        key: QueueKey,
        partition_id: PartitionId,
        app_infos: BTreeMap<String, AppKey>,
        state: QueueAssignmentState,
    ) -> Self {
        Self {
            uri: uri.into(),
            key,
            partition_id,
            app_infos,
            state,
        }
    }

    /// Build from the wire form, entering the given state.
    pub fn from_wire(info: &QueueInfo, state: QueueAssignmentState) -> Self {
        Self {
            uri: info.uri.clone(),
            key: info.key,
            partition_id: info.partition_id,
            app_infos: info
                .app_ids
                .iter()
                .map(|a| (a.app_id.clone(), a.app_key))
                .collect(),
            state,
        }
    }

    /// Render to the wire form.
    pub fn to_wire(&self) -> QueueInfo {
        QueueInfo {
            uri: self.uri.clone(),
            key: self.key,
            partition_id: self.partition_id,
            app_ids: self
                .app_infos
                .iter()
                .map(|(id, key)| AppIdInfo {
                    app_id: id.clone(),
                    app_key: *key,
                })
                .collect(),
        }
    }

    /// Queue URI.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Storage key; stable for the registration's lifetime.
    pub fn key(&self) -> QueueKey {
        self.key
    }

    /// Partition mapping; stable for the registration's lifetime.
    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    /// Registered apps keyed by app id.
    pub fn app_infos(&self) -> &BTreeMap<String, AppKey> {
        &self.app_infos
    }

    /// Current lifecycle state.
    pub fn state(&self) -> QueueAssignmentState {
        self.state
    }

    /// True when the wire form describes the same assignment (key,
    /// partition and app set).
    pub fn matches(&self, info: &QueueInfo) -> bool {
        self.key == info.key
            && self.partition_id == info.partition_id
            && self.app_infos.len() == info.app_ids.len()
            && info
                .app_ids
                .iter()
                .all(|a| self.app_infos.get(&a.app_id) == Some(&a.app_key))
    }

    /// Step to `next`, rejecting skipped lifecycle stages.
    pub fn set_state(&mut self, next: QueueAssignmentState) -> ClusterResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(ClusterError::InvalidTransition {
                uri: self.uri.clone(),
                from: self.state.name(),
                to: next.name(),
            });
        }
        debug!(
            uri = %self.uri,
            from = self.state.name(),
            to = next.name(),
            "queue state transition"
        );
        self.state = next;
        Ok(())
    }
}

/// One entry of the partition table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterStatePartitionInfo {
    /// The partition this entry describes.
    pub partition_id: PartitionId,
    /// Current primary, if any.
    pub primary_node_id: Option<NodeId>,
    /// Lease id of the current (or last) primary.
    pub primary_lease_id: LeaseId,
    /// Reported status of the primary.
    pub primary_status: PrimaryStatus,
    /// Number of queues mapped to this partition.
    pub num_queues_mapped: usize,
}

impl ClusterStatePartitionInfo {
    fn new(partition_id: PartitionId) -> Self {
        Self {
            partition_id,
            primary_node_id: None,
            primary_lease_id: LeaseId::NONE,
            primary_status: PrimaryStatus::Undefined,
            num_queues_mapped: 0,
        }
    }

    /// True when the partition has a primary node assigned.
    pub fn has_primary(&self) -> bool {
        self.primary_node_id.is_some()
    }
}

/// Per-domain queue registrations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainState {
    queues: BTreeMap<String, ClusterStateQueueInfo>,
}

impl DomainState {
    /// Queue registrations keyed by URI.
    pub fn queues(&self) -> &BTreeMap<String, ClusterStateQueueInfo> {
        &self.queues
    }
}

/// The authoritative in-memory cluster state.
///
/// Lives for the whole process; rebuilt at startup by replaying the
/// cluster state ledger.
#[derive(Debug, Clone, Default)]
pub struct ClusterState {
    partitions: Vec<ClusterStatePartitionInfo>,
    domain_states: BTreeMap<String, DomainState>,
}

impl ClusterState {
    /// Create a state with `partition_count` empty partitions.
    pub fn new(partition_count: usize) -> Self {
        Self {
            partitions: (0..partition_count)
                .map(|i| ClusterStatePartitionInfo::new(PartitionId::new(i as u32)))
                .collect(),
            domain_states: BTreeMap::new(),
        }
    }

    /// The partition table.
    pub fn partitions(&self) -> &[ClusterStatePartitionInfo] {
        &self.partitions
    }

    /// One partition table entry.
    pub fn partition(&self, id: PartitionId) -> Option<&ClusterStatePartitionInfo> {
        self.partitions.get(id.index())
    }

    /// Per-domain registrations.
    pub fn domain_states(&self) -> &BTreeMap<String, DomainState> {
        &self.domain_states
    }

    /// Find a queue registration by URI.
    pub fn queue(&self, uri: &str) -> Option<&ClusterStateQueueInfo> {
        self.domain_states
            .values()
            .find_map(|domain| domain.queues.get(uri))
    }

    fn queue_mut(&mut self, uri: &str) -> Option<&mut ClusterStateQueueInfo> {
        self.domain_states
            .values_mut()
            .find_map(|domain| domain.queues.get_mut(uri))
    }

    /// True when `key` is already used by a queue on `partition_id`.
    pub fn queue_key_in_use(&self, partition_id: PartitionId, key: &QueueKey) -> bool {
        self.domain_states.values().any(|domain| {
            domain
                .queues
                .values()
                .any(|q| q.partition_id == partition_id && q.key == *key)
        })
    }

    /// Update the primary of a partition. `None` clears the primary.
    ///
    /// Lease monotonicity is enforced: a lease lower than the recorded
    /// one is rejected, equal leases may only refresh the same primary.
    pub fn set_partition_primary(
        &mut self,
        partition_id: PartitionId,
        primary: Option<NodeId>,
        lease_id: LeaseId,
        status: PrimaryStatus,
    ) -> ClusterResult<()> {
        let info = self
            .partitions
            .get_mut(partition_id.index())
            .ok_or_else(|| {
                ClusterError::MalformedMessage(format!("unknown partition {}", partition_id))
            })?;

        if lease_id < info.primary_lease_id {
            return Err(ClusterError::MalformedMessage(format!(
                "non-monotonic lease for partition {}: {} < {}",
                partition_id, lease_id, info.primary_lease_id
            )));
        }
        if lease_id == info.primary_lease_id
            && info.primary_node_id.is_some()
            && primary != info.primary_node_id
        {
            return Err(ClusterError::MalformedMessage(format!(
                "primary change for partition {} without lease bump (lease {})",
                partition_id, lease_id
            )));
        }

        info.primary_node_id = primary;
        info.primary_lease_id = lease_id;
        info.primary_status = status;
        Ok(())
    }

    /// Update only the reported status of a partition's primary.
    pub fn set_partition_primary_status(
        &mut self,
        partition_id: PartitionId,
        status: PrimaryStatus,
    ) {
        if let Some(info) = self.partitions.get_mut(partition_id.index()) {
            info.primary_status = status;
        }
    }

    /// Register (or commit) the queue described by `advisory`.
    ///
    /// - Absent: the queue is inserted as `Assigned`.
    /// - Present, matching, `Assigning`: committed to `Assigned`.
    /// - Present but different: refused unless `force_update` is set.
    ///
    /// Returns true when the state holds the advisory's view afterwards.
    pub fn register_queue_info(&mut self, advisory: &QueueInfo, force_update: bool) -> bool {
        let domain = domain_of(&advisory.uri);
        let domain_state = self.domain_states.entry(domain).or_default();

        match domain_state.queues.get_mut(&advisory.uri) {
            None => {
                domain_state.queues.insert(
                    advisory.uri.clone(),
                    ClusterStateQueueInfo::from_wire(advisory, QueueAssignmentState::Assigned),
                );
                if let Some(p) = self.partitions.get_mut(advisory.partition_id.index()) {
                    p.num_queues_mapped += 1;
                }
                true
            }
            Some(existing) if existing.matches(advisory) => {
                if existing.state == QueueAssignmentState::Assigning {
                    // Commit of our own pending assignment.
                    let _ = existing.set_state(QueueAssignmentState::Assigned);
                }
                true
            }
            Some(existing) => {
                if !force_update {
                    warn!(
                        uri = %advisory.uri,
                        "queue info differs from registered assignment, ignoring advisory"
                    );
                    return false;
                }
                let old_partition = existing.partition_id;
                *existing =
                    ClusterStateQueueInfo::from_wire(advisory, QueueAssignmentState::Assigned);
                if old_partition != advisory.partition_id {
                    if let Some(p) = self.partitions.get_mut(old_partition.index()) {
                        p.num_queues_mapped = p.num_queues_mapped.saturating_sub(1);
                    }
                    if let Some(p) = self.partitions.get_mut(advisory.partition_id.index()) {
                        p.num_queues_mapped += 1;
                    }
                }
                true
            }
        }
    }

    /// Insert a leader-side `Assigning` placeholder for a pending queue
    /// assignment.
    pub(crate) fn insert_pending_assignment(&mut self, info: &QueueInfo) {
        let domain = domain_of(&info.uri);
        let domain_state = self.domain_states.entry(domain).or_default();
        if domain_state
            .queues
            .insert(
                info.uri.clone(),
                ClusterStateQueueInfo::from_wire(info, QueueAssignmentState::Assigning),
            )
            .is_none()
        {
            if let Some(p) = self.partitions.get_mut(info.partition_id.index()) {
                p.num_queues_mapped += 1;
            }
        }
    }

    /// Mark a queue as pending unassignment (`Assigned -> Unassigning`).
    pub fn set_pending_unassignment(&mut self, uri: &str) -> ClusterResult<()> {
        match self.queue_mut(uri) {
            Some(queue) => queue.set_state(QueueAssignmentState::Unassigning),
            None => Err(ClusterError::UnknownQueue(uri.to_string())),
        }
    }

    /// Remove a queue registration.
    pub fn unregister_queue(&mut self, uri: &str) -> ClusterResult<()> {
        let domain = domain_of(uri);
        let removed = self
            .domain_states
            .get_mut(&domain)
            .and_then(|d| d.queues.remove(uri));
        match removed {
            Some(queue) => {
                if let Some(p) = self.partitions.get_mut(queue.partition_id.index()) {
                    p.num_queues_mapped = p.num_queues_mapped.saturating_sub(1);
                }
                Ok(())
            }
            None => Err(ClusterError::UnknownQueue(uri.to_string())),
        }
    }

    /// Apply an app-id update to one queue. Conflicting additions and
    /// missing removals are logged and skipped; the coordinator
    /// validates before emitting the advisory.
    pub fn update_queue_apps(
        &mut self,
        uri: &str,
        added: &[AppIdInfo],
        removed: &[AppIdInfo],
    ) -> ClusterResult<()> {
        let queue = self
            .queue_mut(uri)
            .ok_or_else(|| ClusterError::UnknownQueue(uri.to_string()))?;

        for app in added {
            if queue.app_infos.contains_key(&app.app_id) {
                warn!(uri = %uri, app_id = %app.app_id, "added app already registered, skipping");
                continue;
            }
            queue.app_infos.insert(app.app_id.clone(), app.app_key);
        }
        for app in removed {
            if queue.app_infos.remove(&app.app_id).is_none() {
                warn!(uri = %uri, app_id = %app.app_id, "removed app not registered, skipping");
            }
        }
        Ok(())
    }

    /// Apply a committed advisory, dispatching by kind.
    pub fn apply(&mut self, message: &ClusterMessage) -> ClusterResult<()> {
        debug!(kind = message.kind(), "applying cluster message");
        match message {
            ClusterMessage::QueueAssignment(advisory) => {
                for queue in &advisory.queues {
                    self.register_queue_info(queue, false);
                }
                Ok(())
            }
            ClusterMessage::QueueUnassignment(advisory) => {
                for queue in &advisory.queues {
                    if let Err(e) = self.unregister_queue(&queue.uri) {
                        warn!(uri = %queue.uri, error = %e, "unassignment for unknown queue");
                    }
                }
                Ok(())
            }
            ClusterMessage::QueueUpdate(advisory) => self.update_queue_apps(
                &advisory.uri,
                &advisory.added_apps,
                &advisory.removed_apps,
            ),
            ClusterMessage::PartitionPrimary(advisory) => {
                for info in &advisory.partitions {
                    self.set_partition_primary(
                        info.partition_id,
                        Some(info.primary_node_id),
                        info.primary_lease_id,
                        PrimaryStatus::Passive,
                    )?;
                }
                Ok(())
            }
            ClusterMessage::Leader(advisory) => {
                for info in &advisory.partitions {
                    self.set_partition_primary(
                        info.partition_id,
                        Some(info.primary_node_id),
                        info.primary_lease_id,
                        PrimaryStatus::Passive,
                    )?;
                }
                for queue in &advisory.queues {
                    self.register_queue_info(queue, true);
                }
                Ok(())
            }
            ClusterMessage::FeUpdate(update) => {
                for info in &update.partitions {
                    self.set_partition_primary(
                        info.partition_id,
                        Some(info.primary_node_id),
                        info.primary_lease_id,
                        PrimaryStatus::Passive,
                    )?;
                }
                for queue in &update.queues {
                    self.register_queue_info(queue, true);
                }
                Ok(())
            }
            ClusterMessage::SyncPoint(advisory) => {
                // Storage-level record; nothing to mutate here, but an
                // invalid sync point indicates a corrupt advisory.
                if !advisory.sync_point.is_valid() {
                    return Err(ClusterError::MalformedMessage(format!(
                        "invalid sync point {} for partition {}",
                        advisory.sync_point, advisory.partition_id
                    )));
                }
                Ok(())
            }
        }
    }

    /// Compare against `reference`, treating container orderings as
    /// stable. Returns a description of every inconsistency found.
    pub fn validate_against(&self, reference: &ClusterState) -> Result<(), String> {
        let mut errors = String::new();

        if self.partitions.len() != reference.partitions.len() {
            let _ = writeln!(
                errors,
                "partition count mismatch: {} vs {}",
                self.partitions.len(),
                reference.partitions.len()
            );
        } else {
            for (mine, theirs) in self.partitions.iter().zip(&reference.partitions) {
                if mine.primary_node_id != theirs.primary_node_id
                    || mine.primary_lease_id != theirs.primary_lease_id
                {
                    let _ = writeln!(
                        errors,
                        "partition {}: primary {:?} lease {} vs primary {:?} lease {}",
                        mine.partition_id,
                        mine.primary_node_id,
                        mine.primary_lease_id,
                        theirs.primary_node_id,
                        theirs.primary_lease_id
                    );
                }
            }
        }

        let mine: BTreeMap<&str, &ClusterStateQueueInfo> = self
            .domain_states
            .values()
            .flat_map(|d| d.queues.iter())
            .map(|(uri, q)| (uri.as_str(), q))
            .collect();
        let theirs: BTreeMap<&str, &ClusterStateQueueInfo> = reference
            .domain_states
            .values()
            .flat_map(|d| d.queues.iter())
            .map(|(uri, q)| (uri.as_str(), q))
            .collect();

        for (uri, queue) in &mine {
            match theirs.get(uri) {
                None => {
                    let _ = writeln!(errors, "queue {} missing from reference", uri);
                }
                Some(other) => {
                    if queue.key != other.key
                        || queue.partition_id != other.partition_id
                        || queue.app_infos != other.app_infos
                    {
                        let _ = writeln!(
                            errors,
                            "queue {}: [key {}, partition {}, {} apps] vs [key {}, partition {}, {} apps]",
                            uri,
                            queue.key,
                            queue.partition_id,
                            queue.app_infos.len(),
                            other.key,
                            other.partition_id,
                            other.app_infos.len()
                        );
                    }
                }
            }
        }
        for uri in theirs.keys() {
            if !mine.contains_key(uri) {
                let _ = writeln!(errors, "queue {} missing from state", uri);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Snapshot the partition-primary mappings that have a primary.
    pub fn load_partitions_info(&self) -> Vec<PartitionPrimaryInfo> {
        self.partitions
            .iter()
            .filter_map(|p| {
                p.primary_node_id.map(|node| PartitionPrimaryInfo {
                    partition_id: p.partition_id,
                    primary_node_id: node,
                    primary_lease_id: p.primary_lease_id,
                })
            })
            .collect()
    }

    /// Snapshot every queue registration in wire form.
    pub fn load_queues_info(&self) -> Vec<QueueInfo> {
        self.domain_states
            .values()
            .flat_map(|d| d.queues.values())
            .map(ClusterStateQueueInfo::to_wire)
            .collect()
    }
}

/// Extract the domain component of a queue URI, for grouping.
///
/// Falls back to the whole URI when it does not look like
/// `scheme://domain/queue`; grouping still works, it is just flat.
pub(crate) fn domain_of(uri: &str) -> String {
    uri.split_once("://")
        .and_then(|(_, rest)| rest.split_once('/'))
        .map(|(domain, _)| domain.to_string())
        .unwrap_or_else(|| uri.to_string())
}
