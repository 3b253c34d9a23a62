//! Leader-side cluster coordination.
//!
//! Stateless operations driving partition assignment, queue assignment
//! and cluster-state dissemination. Everything here executes on the
//! cluster dispatcher thread: callers hand in mutable borrows of the
//! [`ClusterState`], [`ClusterData`] and ledger they own, the operation
//! runs to completion, and no locking is involved anywhere.
//!
//! The write path follows one rule: *ledger first, state second*. An
//! advisory is appended (and thereby replicated) before the leader's own
//! in-memory state changes, so the leader and its followers always
//! converge on the same ledger prefix. An append failure is fatal for
//! the leader's tenure and mutates nothing.

use tracing::{debug, error, info, warn};

use super::config::{AssignmentAlgorithm, ClusterData, QueueMode};
use super::error::{ClusterError, ClusterErrorCode, ClusterResult, Status};
use super::keys::{unique_app_key, unique_queue_key, QueueKey};
use super::ledger::{ClusterStateLedger, LedgerIterator};
use super::messages::{
    AckMessage, AppIdInfo, ClusterMessage, LeaderAdvisory, LeaderMessageSequence,
    PartitionPrimaryInfo, PrimaryStatus, PutHeader, QueueAssignmentAdvisory, QueueInfo,
    QueueUnAssignmentAdvisory, QueueUpdateAdvisory,
};
use super::metrics;
use super::primary_state::PartitionPrimaryState;
use super::state::{ClusterState, QueueAssignmentState};
use super::traits::{ClusterNetwork, StorageManager};
use super::validation::{validate_app_id, QueueUri};
use crate::blob::Blob;
use crate::dispatcher::{ClientId, Dispatcher, DispatcherEventType};
use crate::protocol::AckResult;
use crate::types::{LeaseId, NodeId, PartitionId};

/// Assign an available node to every partition that is orphan or whose
/// primary is no longer available. Healthy partition-node mappings are
/// never modified.
///
/// Returns the *new* assignments only; each one's lease id is the
/// partition's prior lease plus one. Under
/// [`AssignmentAlgorithm::LeastAssigned`] the available node with the
/// fewest primaried partitions wins, ties broken by ascending node id;
/// under [`AssignmentAlgorithm::LeaderIsSenior`] the leader takes every
/// orphan itself while eligible.
///
/// In CSL mode the state is only mutated when the resulting advisory
/// commits; in legacy mode the mapping is applied to `state` eagerly.
pub fn assign_partitions(
    state: &mut ClusterState,
    data: &ClusterData,
    algorithm: AssignmentAlgorithm,
    is_csl_mode: bool,
) -> Vec<PartitionPrimaryInfo> {
    let available: Vec<NodeId> = data.available_nodes().collect();
    if available.is_empty() {
        warn!("no available node, leaving orphan partitions unassigned");
        return Vec::new();
    }

    // Primaries currently held by each available node.
    let mut load: std::collections::BTreeMap<NodeId, usize> =
        available.iter().map(|n| (*n, 0)).collect();
    for info in state.partitions() {
        if let Some(primary) = info.primary_node_id {
            if let Some(count) = load.get_mut(&primary) {
                *count += 1;
            }
        }
    }

    let mut assignments = Vec::new();
    for partition in 0..state.partitions().len() {
        let partition_id = PartitionId::new(partition as u32);
        let info = match state.partition(partition_id) {
            Some(info) => info,
            None => continue,
        };

        let healthy = info
            .primary_node_id
            .map(|p| data.is_node_available(p))
            .unwrap_or(false);
        if healthy {
            continue;
        }

        let chosen = match algorithm {
            AssignmentAlgorithm::LeaderIsSenior => data
                .leader()
                .filter(|leader| data.is_node_available(*leader))
                .unwrap_or_else(|| least_loaded(&load)),
            AssignmentAlgorithm::LeastAssigned => least_loaded(&load),
        };

        let lease_id = info.primary_lease_id.next();
        debug!(
            partition_id = %partition_id,
            node = %chosen,
            lease_id = %lease_id,
            old_primary = ?info.primary_node_id,
            "assigning partition primary"
        );
        assignments.push(PartitionPrimaryInfo {
            partition_id,
            primary_node_id: chosen,
            primary_lease_id: lease_id,
        });
        if let Some(count) = load.get_mut(&chosen) {
            *count += 1;
        }
        metrics::PARTITION_REASSIGNMENTS.inc();
    }

    if !is_csl_mode {
        // Legacy mode has no commit callback; the mapping takes effect
        // immediately on the leader.
        for assignment in &assignments {
            if let Err(e) = state.set_partition_primary(
                assignment.partition_id,
                Some(assignment.primary_node_id),
                assignment.primary_lease_id,
                PrimaryStatus::Passive,
            ) {
                error!(partition_id = %assignment.partition_id, error = %e, "eager primary update failed");
            }
        }
    }

    assignments
}

fn least_loaded(load: &std::collections::BTreeMap<NodeId, usize>) -> NodeId {
    // BTreeMap iterates in ascending node id order, so the first
    // minimum wins ties by node id.
    let mut best = None;
    for (node, count) in load {
        match best {
            None => best = Some((*node, *count)),
            Some((_, best_count)) if *count < best_count => best = Some((*node, *count)),
            _ => {}
        }
    }
    best.map(|(node, _)| node).unwrap_or(NodeId::INVALID)
}

/// The partition a new queue should map to: the one with the fewest
/// assigned queues, ties broken by ascending partition id.
pub fn get_next_partition_id(state: &ClusterState, uri: &QueueUri) -> PartitionId {
    let mut best = PartitionId::new(0);
    let mut best_count = usize::MAX;
    for info in state.partitions() {
        if info.num_queues_mapped < best_count {
            best = info.partition_id;
            best_count = info.num_queues_mapped;
        }
    }
    debug!(uri = %uri, partition_id = %best, queues_mapped = best_count, "next partition chosen");
    best
}

/// Derive app keys for every app id in the domain's queue mode.
///
/// Keys are collision-free within the returned set; entries keep the
/// configuration order.
pub fn populate_app_infos(mode: &QueueMode) -> ClusterResult<Vec<AppIdInfo>> {
    let mut infos: Vec<AppIdInfo> = Vec::with_capacity(mode.app_ids.len());
    for app_id in &mode.app_ids {
        validate_app_id(app_id)?;
        let key = unique_app_key(app_id, |candidate| {
            infos.iter().any(|info| info.app_key == *candidate)
        })
        .ok_or_else(|| ClusterError::AppIdConflict(format!("no free app key for {}", app_id)))?;
        infos.push(AppIdInfo {
            app_id: app_id.clone(),
            app_key: key,
        });
    }
    Ok(infos)
}

/// Build the advisory describing the assignment of `uri`: queue key,
/// partition id and app infos, stamped with the leader's next LSN.
pub fn populate_queue_assignment_advisory(
    state: &ClusterState,
    data: &mut ClusterData,
    uri: &QueueUri,
    mode: &QueueMode,
) -> ClusterResult<(QueueAssignmentAdvisory, QueueKey)> {
    let partition_id = get_next_partition_id(state, uri);
    let key = unique_queue_key(uri.as_str(), |candidate| {
        state.queue_key_in_use(partition_id, candidate)
    })
    .ok_or_else(|| ClusterError::DuplicateQueueKey {
        partition_id: partition_id.value(),
        uri: uri.as_str().to_string(),
    })?;

    let advisory = QueueAssignmentAdvisory {
        sequence_number: data.next_lsn(),
        queues: vec![QueueInfo {
            uri: uri.as_str().to_string(),
            key,
            partition_id,
            app_ids: populate_app_infos(mode)?,
        }],
    };
    Ok((advisory, key))
}

/// Build the advisory removing the assignment of `uri`.
pub fn populate_queue_unassignment_advisory(
    state: &ClusterState,
    data: &mut ClusterData,
    uri: &str,
) -> ClusterResult<QueueUnAssignmentAdvisory> {
    let queue = state
        .queue(uri)
        .ok_or_else(|| ClusterError::UnknownQueue(uri.to_string()))?;
    Ok(QueueUnAssignmentAdvisory {
        sequence_number: data.next_lsn(),
        queues: vec![queue.to_wire()],
    })
}

/// Apply a committed advisory to the local state, with bookkeeping.
fn apply_advisory(state: &mut ClusterState, message: &ClusterMessage) -> ClusterResult<()> {
    metrics::ADVISORIES_APPLIED
        .with_label_values(&[message.kind()])
        .inc();
    state.apply(message)
}

/// Assign `uri` a queue key, a partition id and app ids, journal the
/// advisory and register the queue. Leader only.
///
/// Returns `false` only on *permanent* rejection (malformed URI,
/// unknown or disabled domain); `true` means success or a failure the
/// caller may retry. The status carries the detail either way.
///
/// The operation is idempotent: re-assigning an already-assigned queue
/// succeeds without touching the ledger.
pub async fn assign_queue(
    state: &mut ClusterState,
    data: &mut ClusterData,
    ledger: &mut dyn ClusterStateLedger,
    uri: &str,
) -> (bool, Status) {
    let uri = match QueueUri::parse(uri) {
        Ok(uri) => uri,
        Err(e) => {
            warn!(error = %e, "rejecting queue assignment for malformed uri");
            return (false, Status::error(ClusterErrorCode::Unknown, e.to_string()));
        }
    };

    let mode = match data.config().domain(uri.domain()) {
        Some(domain) if domain.enabled => domain.mode.clone(),
        Some(domain) => {
            warn!(domain = %domain.name, "rejecting queue assignment for disabled domain");
            return (
                false,
                Status::error(
                    ClusterErrorCode::Unknown,
                    format!("domain disabled: {}", domain.name),
                ),
            );
        }
        None => {
            warn!(domain = uri.domain(), "rejecting queue assignment for unknown domain");
            return (
                false,
                Status::error(
                    ClusterErrorCode::Unknown,
                    format!("unknown domain: {}", uri.domain()),
                ),
            );
        }
    };

    if let Some(existing) = state.queue(uri.as_str()) {
        match existing.state() {
            QueueAssignmentState::Assigned => {
                debug!(uri = %uri, key = %existing.key(), "queue already assigned");
                return (true, Status::success());
            }
            QueueAssignmentState::Assigning => {
                debug!(uri = %uri, "queue assignment already in flight");
                return (true, Status::success());
            }
            other => {
                // Unassignment is racing this request; let the caller retry
                // once it completes.
                debug!(uri = %uri, state = other.name(), "queue busy, assignment retryable");
                return (
                    true,
                    Status::error(
                        ClusterErrorCode::Unknown,
                        format!("queue is {}", other.name()),
                    ),
                );
            }
        }
    }

    let (advisory, key) = match populate_queue_assignment_advisory(state, data, &uri, &mode) {
        Ok(result) => result,
        Err(e) => {
            warn!(uri = %uri, error = %e, "could not build queue assignment advisory");
            return (true, Status::error(e.code(), e.to_string()));
        }
    };

    let lsn = advisory.sequence_number;
    let queue_info = advisory.queues[0].clone();
    let message = ClusterMessage::QueueAssignment(advisory);

    if let Err(e) = ledger.append(message.clone(), lsn).await {
        error!(uri = %uri, lsn = %lsn, error = %e, "ledger append failed; leader must step down");
        return (true, Status::error(e.code(), e.to_string()));
    }
    metrics::LEDGER_APPENDS.inc();

    // Ledger first, state second: walk the queue through Assigning into
    // Assigned only now that the advisory is journaled.
    state.insert_pending_assignment(&queue_info);
    if let Err(e) = apply_advisory(state, &message) {
        error!(uri = %uri, error = %e, "self-apply of queue assignment failed");
        return (true, Status::error(e.code(), e.to_string()));
    }

    info!(
        uri = %uri,
        key = %key,
        partition_id = %queue_info.partition_id,
        lsn = %lsn,
        "queue assigned"
    );
    (true, Status::success())
}

/// Handle a queue-assignment request from `requester`. Leader only:
/// followers answer `NotALeader` and mutate nothing.
pub async fn process_queue_assignment_request(
    state: &mut ClusterState,
    data: &mut ClusterData,
    ledger: &mut dyn ClusterStateLedger,
    uri: &str,
    requester: NodeId,
) -> Status {
    if !data.is_self_leader() {
        warn!(uri = %uri, requester = %requester, "queue assignment request on non-leader");
        return Status::error(ClusterErrorCode::NotALeader, "not the leader");
    }

    debug!(uri = %uri, requester = %requester, "processing queue assignment request");
    let (_, status) = assign_queue(state, data, ledger, uri).await;
    status
}

/// Unassign `uri`: journal the unassignment advisory and drop the
/// registration. Leader only.
pub async fn unassign_queue(
    state: &mut ClusterState,
    data: &mut ClusterData,
    ledger: &mut dyn ClusterStateLedger,
    uri: &str,
) -> (bool, Status) {
    let advisory = match populate_queue_unassignment_advisory(state, data, uri) {
        Ok(advisory) => advisory,
        Err(e) => {
            // Unassigning an unknown queue is permanently pointless.
            warn!(uri = %uri, error = %e, "rejecting queue unassignment");
            return (false, Status::error(e.code(), e.to_string()));
        }
    };

    if let Err(e) = state.set_pending_unassignment(uri) {
        debug!(uri = %uri, error = %e, "queue not unassignable yet, retryable");
        return (true, Status::error(e.code(), e.to_string()));
    }

    let lsn = advisory.sequence_number;
    let message = ClusterMessage::QueueUnassignment(advisory);
    if let Err(e) = ledger.append(message.clone(), lsn).await {
        error!(uri = %uri, lsn = %lsn, error = %e, "ledger append failed; leader must step down");
        return (true, Status::error(e.code(), e.to_string()));
    }
    metrics::LEDGER_APPENDS.inc();

    if let Err(e) = apply_advisory(state, &message) {
        error!(uri = %uri, error = %e, "self-apply of queue unassignment failed");
        return (true, Status::error(e.code(), e.to_string()));
    }

    info!(uri = %uri, lsn = %lsn, "queue unassigned");
    (true, Status::success())
}

/// Register `added` and unregister `removed` app ids for `domain`,
/// optionally narrowed to a single queue `uri`. One advisory is emitted
/// per affected queue; nothing is emitted when any added id conflicts
/// with a live app.
pub async fn update_app_ids(
    state: &mut ClusterState,
    data: &mut ClusterData,
    ledger: &mut dyn ClusterStateLedger,
    added: &[String],
    removed: &[String],
    domain: &str,
    uri: Option<&str>,
) -> ClusterErrorCode {
    for app_id in added {
        if let Err(e) = validate_app_id(app_id) {
            warn!(domain = %domain, error = %e, "rejecting app id update");
            return e.code();
        }
    }

    // Resolve the affected queues up front.
    let affected: Vec<String> = match uri {
        Some(uri) => match state.queue(uri) {
            Some(queue) => vec![queue.uri().to_string()],
            None => {
                warn!(uri = %uri, "app id update for unknown queue");
                return ClusterErrorCode::UnknownQueue;
            }
        },
        None => match state.domain_states().get(domain) {
            Some(domain_state) => domain_state.queues().keys().cloned().collect(),
            None => {
                warn!(domain = %domain, "app id update for unknown domain");
                return ClusterErrorCode::UnknownQueue;
            }
        },
    };

    // Conflict check before any advisory is emitted.
    for queue_uri in &affected {
        let queue = match state.queue(queue_uri) {
            Some(queue) => queue,
            None => continue,
        };
        for app_id in added {
            if queue.app_infos().contains_key(app_id) {
                warn!(uri = %queue_uri, app_id = %app_id, "added app id already live");
                return ClusterErrorCode::AppIdConflict;
            }
        }
    }

    for queue_uri in &affected {
        let Some(queue) = state.queue(queue_uri) else {
            continue;
        };

        let mut added_infos = Vec::with_capacity(added.len());
        for app_id in added {
            let taken: Vec<_> = queue.app_infos().values().copied().collect();
            let key = match unique_app_key(app_id, |candidate| {
                taken.contains(candidate)
                    || added_infos.iter().any(|i: &AppIdInfo| i.app_key == *candidate)
            }) {
                Some(key) => key,
                None => {
                    error!(uri = %queue_uri, app_id = %app_id, "no free app key");
                    return ClusterErrorCode::AppIdConflict;
                }
            };
            added_infos.push(AppIdInfo {
                app_id: app_id.clone(),
                app_key: key,
            });
        }
        let removed_infos: Vec<AppIdInfo> = removed
            .iter()
            .filter_map(|app_id| {
                queue.app_infos().get(app_id).map(|key| AppIdInfo {
                    app_id: app_id.clone(),
                    app_key: *key,
                })
            })
            .collect();

        let advisory = QueueUpdateAdvisory {
            sequence_number: data.next_lsn(),
            uri: queue_uri.clone(),
            domain: domain.to_string(),
            added_apps: added_infos,
            removed_apps: removed_infos,
        };
        let lsn = advisory.sequence_number;
        let message = ClusterMessage::QueueUpdate(advisory);

        if let Err(e) = ledger.append(message.clone(), lsn).await {
            error!(uri = %queue_uri, lsn = %lsn, error = %e, "ledger append failed; leader must step down");
            return e.code();
        }
        metrics::LEDGER_APPENDS.inc();

        if let Err(e) = apply_advisory(state, &message) {
            error!(uri = %queue_uri, error = %e, "self-apply of app id update failed");
            return e.code();
        }
    }

    ClusterErrorCode::None
}

/// Broadcast the current cluster state, or send it to one lagging node.
/// Leader only; at least one of the two sections must be included.
pub async fn send_cluster_state(
    state: &ClusterState,
    data: &mut ClusterData,
    ledger: &mut dyn ClusterStateLedger,
    network: &mut dyn ClusterNetwork,
    send_partition_primary_info: bool,
    send_queues_info: bool,
    node: Option<NodeId>,
) -> ClusterResult<()> {
    debug_assert!(send_partition_primary_info || send_queues_info);
    if !data.is_self_leader() {
        return Err(ClusterError::NotALeader);
    }
    if !send_partition_primary_info && !send_queues_info {
        return Err(ClusterError::MalformedMessage(
            "cluster state send needs at least one section".into(),
        ));
    }

    let advisory = LeaderAdvisory {
        sequence_number: data.next_lsn(),
        partitions: if send_partition_primary_info {
            state.load_partitions_info()
        } else {
            Vec::new()
        },
        queues: if send_queues_info {
            state.load_queues_info()
        } else {
            Vec::new()
        },
    };
    let lsn = advisory.sequence_number;
    let message = ClusterMessage::Leader(advisory);

    ledger.append(message.clone(), lsn).await?;
    metrics::LEDGER_APPENDS.inc();

    match node {
        Some(node) => {
            debug!(node = %node, lsn = %lsn, "sending cluster state to node");
        }
        None => {
            debug!(lsn = %lsn, "broadcasting cluster state to followers");
        }
    }
    network.post(node, message);
    Ok(())
}

/// Build and dispatch a NACK for a PUT that could not be accepted.
///
/// `status` must not be [`AckResult::Success`]. The original payload
/// and options travel back with the NACK, or both are absent.
pub fn generate_nack(
    status: AckResult,
    put_header: &PutHeader,
    source: ClientId,
    dispatcher: &mut dyn Dispatcher,
    app_data: Option<Blob>,
    options: Option<Blob>,
) {
    debug_assert!(status != AckResult::Success);

    let ack = AckMessage {
        status: status.to_code(),
        correlation_id: put_header.correlation_id,
        guid: put_header.message_guid,
        queue_id: put_header.queue_id,
    };

    let mut event = dispatcher.get_event(source);
    event
        .set_type(DispatcherEventType::Ack)
        .set_ack_message(ack);

    match app_data {
        Some(blob) => {
            event.set_blob(blob);
            if let Some(options) = options {
                event.set_options(options);
            }
        }
        None => debug_assert!(options.is_none()),
    }

    debug!(
        status = %status,
        queue_id = %put_header.queue_id,
        correlation_id = %put_header.correlation_id,
        "dispatching nack"
    );
    dispatcher.dispatch_event(event, source);
}

/// React to a partition primary mapping change: validate lease
/// monotonicity, advance the partition's primary state machine and
/// notify the storage manager.
///
/// Also invoked on status-only changes (same primary, new status).
#[allow(clippy::too_many_arguments)]
pub fn on_partition_primary_assignment(
    primary_states: &mut [PartitionPrimaryState],
    storage: &mut dyn StorageManager,
    partition_id: PartitionId,
    primary: Option<NodeId>,
    lease_id: LeaseId,
    status: PrimaryStatus,
    old_primary: Option<NodeId>,
    old_lease_id: LeaseId,
) -> ClusterResult<()> {
    if lease_id < old_lease_id {
        return Err(ClusterError::MalformedMessage(format!(
            "lease id went backwards for partition {}: {} < {}",
            partition_id, lease_id, old_lease_id
        )));
    }
    if primary != old_primary && old_primary.is_some() && lease_id <= old_lease_id {
        return Err(ClusterError::MalformedMessage(format!(
            "primary of partition {} changed without a lease bump ({})",
            partition_id, lease_id
        )));
    }

    let machine = primary_states
        .get_mut(partition_id.index())
        .ok_or_else(|| {
            ClusterError::MalformedMessage(format!("unknown partition {}", partition_id))
        })?;

    let next = PartitionPrimaryState::from_assignment(primary, lease_id, status);
    info!(
        partition_id = %partition_id,
        from = machine.state_name(),
        to = next.state_name(),
        primary = ?primary,
        lease_id = %lease_id,
        "partition primary transition"
    );
    *machine = next;

    storage.set_primary_for_partition(partition_id, primary, lease_id, status);
    Ok(())
}

/// Decode the control message carried in an event blob.
pub fn extract_message(event_blob: &Blob) -> ClusterResult<ClusterMessage> {
    ClusterMessage::extract(event_blob)
}

/// Replay a ledger cursor into `state`, enforcing strict LSN order.
///
/// Used at startup to rebuild the in-memory state, and by
/// [`validate_cluster_state_ledger`] to rebuild a scratch copy.
pub fn load(state: &mut ClusterState, iter: &mut dyn LedgerIterator) -> ClusterResult<()> {
    let mut last: Option<LeaderMessageSequence> = None;
    while iter.next() {
        let lsn = iter.lsn().ok_or_else(|| {
            ClusterError::MalformedMessage("ledger record without LSN".into())
        })?;
        if let Some(last) = last {
            if lsn <= last {
                return Err(ClusterError::StaleLsn {
                    attempted: lsn.to_string(),
                    latest: last.to_string(),
                });
            }
        }
        let record = iter.record().ok_or_else(|| {
            ClusterError::MalformedMessage("ledger cursor valid without record".into())
        })?;
        apply_advisory(state, record)?;
        last = Some(lsn);
    }
    Ok(())
}

/// The highest LSN stored in `ledger`.
///
/// Walks the entire ledger, which can be expensive on large logs; use
/// sparingly (election bookkeeping, startup diagnostics).
pub fn latest_ledger_lsn(ledger: &dyn ClusterStateLedger) -> Option<LeaderMessageSequence> {
    let mut iter = ledger.iter();
    let mut latest = None;
    while iter.next() {
        latest = iter.lsn().or(latest);
    }
    latest
}

/// Validate the on-ledger state against the live `state` by replaying
/// the ledger into a scratch copy and comparing. Divergence is fatal
/// for the leader's tenure.
pub fn validate_cluster_state_ledger(
    ledger: &dyn ClusterStateLedger,
    state: &ClusterState,
    data: &ClusterData,
) -> ClusterResult<()> {
    let mut replayed = ClusterState::new(data.config().partition_count);
    load(&mut replayed, &mut *ledger.iter())?;

    if let Err(description) = replayed.validate_against(state) {
        error!(
            cluster = %data.config().name,
            "ledger replay diverges from live state:\n{}",
            description
        );
        return Err(ClusterError::StateValidation(description));
    }
    Ok(())
}
