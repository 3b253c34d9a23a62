//! End-to-end control-plane tests: leader operations, ledger
//! replication, follower convergence and failure semantics.

use async_trait::async_trait;
use stratomq::cluster::{
    coordinator, AssignmentAlgorithm, ClusterConfig, ClusterData, ClusterError, ClusterErrorCode,
    ClusterMessage, ClusterNetwork, ClusterState, ClusterStateLedger, DomainConfig, InMemoryLedger,
    LeaderMessageSequence, LedgerIterator, QueueMode,
};
use stratomq::cluster::messages::PartitionPrimaryAdvisory;
use stratomq::cluster::ClusterResult;
use stratomq::types::NodeId;

fn cluster_config(nodes: i32, partitions: usize) -> ClusterConfig {
    ClusterConfig {
        partition_count: partitions,
        self_node_id: NodeId::new(1),
        nodes: (1..=nodes)
            .map(|i| stratomq::cluster::ClusterNodeConfig {
                id: NodeId::new(i),
                name: format!("node-{}", i),
                host: "127.0.0.1".into(),
                port: 30114 + i as u16,
            })
            .collect(),
        domains: vec![
            DomainConfig {
                name: "acme".into(),
                enabled: true,
                mode: QueueMode {
                    app_ids: vec!["billing".into(), "audit".into()],
                },
            },
            DomainConfig {
                name: "other".into(),
                enabled: true,
                mode: QueueMode::default(),
            },
        ],
        ..ClusterConfig::default()
    }
}

fn elected_leader(nodes: i32, partitions: usize) -> ClusterData {
    let mut data = ClusterData::new(cluster_config(nodes, partitions));
    data.set_leader(NodeId::new(1), 1);
    data
}

/// Journal the orphan-partition mapping the way the leader does.
async fn assign_and_journal_partitions(
    state: &mut ClusterState,
    data: &mut ClusterData,
    ledger: &mut InMemoryLedger,
) {
    let partitions =
        coordinator::assign_partitions(state, data, AssignmentAlgorithm::LeastAssigned, true);
    let advisory = ClusterMessage::PartitionPrimary(PartitionPrimaryAdvisory {
        sequence_number: data.next_lsn(),
        partitions,
    });
    let lsn = advisory.lsn().unwrap();
    ledger.append(advisory.clone(), lsn).await.unwrap();
    state.apply(&advisory).unwrap();
}

#[tokio::test]
async fn follower_replay_converges_with_leader() {
    let mut state = ClusterState::new(4);
    let mut data = elected_leader(3, 4);
    let mut ledger = InMemoryLedger::new();

    assign_and_journal_partitions(&mut state, &mut data, &mut ledger).await;
    for uri in ["bmq://acme/orders", "bmq://acme/shipping", "bmq://other/logs"] {
        let (ok, status) = coordinator::assign_queue(&mut state, &mut data, &mut ledger, uri).await;
        assert!(ok && status.is_success(), "{}: {:?}", uri, status);
    }
    let code = coordinator::update_app_ids(
        &mut state,
        &mut data,
        &mut ledger,
        &["fraud".into()],
        &["audit".into()],
        "acme",
        Some("bmq://acme/orders"),
    )
    .await;
    assert_eq!(code, ClusterErrorCode::None);
    coordinator::unassign_queue(&mut state, &mut data, &mut ledger, "bmq://other/logs").await;

    // A follower starts empty and replays the ledger from LSN zero.
    let mut follower = ClusterState::new(4);
    coordinator::load(&mut follower, &mut *ledger.iter()).unwrap();

    assert!(follower.validate_against(&state).is_ok());
    let orders = follower.queue("bmq://acme/orders").unwrap();
    assert!(orders.app_infos().contains_key("fraud"));
    assert!(!orders.app_infos().contains_key("audit"));
    assert!(follower.queue("bmq://other/logs").is_none());

    // Spot-check the partition table came across.
    assert!(follower
        .partitions()
        .iter()
        .all(|p| p.primary_node_id.is_some()));
}

#[tokio::test]
async fn replay_rejects_out_of_order_records() {
    // Hand-build a ledger-shaped record stream with a stale LSN in the
    // middle and check the replay refuses it.
    struct VecIterator {
        records: Vec<(LeaderMessageSequence, ClusterMessage)>,
        cursor: usize,
    }
    impl LedgerIterator for VecIterator {
        fn is_valid(&self) -> bool {
            self.cursor > 0 && self.cursor <= self.records.len()
        }
        fn next(&mut self) -> bool {
            self.cursor += 1;
            self.is_valid()
        }
        fn record(&self) -> Option<&ClusterMessage> {
            self.records.get(self.cursor.wrapping_sub(1)).map(|(_, r)| r)
        }
        fn lsn(&self) -> Option<LeaderMessageSequence> {
            self.records.get(self.cursor.wrapping_sub(1)).map(|(l, _)| *l)
        }
    }

    let advisory = |lsn| {
        ClusterMessage::PartitionPrimary(PartitionPrimaryAdvisory {
            sequence_number: lsn,
            partitions: vec![],
        })
    };
    let good = LeaderMessageSequence::new(2, 5);
    let stale = LeaderMessageSequence::new(2, 4);
    let mut iter = VecIterator {
        records: vec![(good, advisory(good)), (stale, advisory(stale))],
        cursor: 0,
    };

    let mut state = ClusterState::new(1);
    let err = coordinator::load(&mut state, &mut iter).unwrap_err();
    assert!(matches!(err, ClusterError::StaleLsn { .. }));
}

#[tokio::test]
async fn new_leader_restarts_sequence_and_never_reuses_terms() {
    let mut state = ClusterState::new(2);
    let mut data = elected_leader(2, 2);
    let mut ledger = InMemoryLedger::new();

    coordinator::assign_queue(&mut state, &mut data, &mut ledger, "bmq://acme/a").await;
    coordinator::assign_queue(&mut state, &mut data, &mut ledger, "bmq://acme/b").await;
    assert_eq!(
        coordinator::latest_ledger_lsn(&ledger),
        Some(LeaderMessageSequence::new(1, 2))
    );

    // Leadership moves to node 2 with a fresh term; its first advisory
    // is (2, 1) and the ledger accepts the term bump.
    data.set_leader(NodeId::new(2), 2);
    data.set_leader(NodeId::new(1), 3); // and back to us with term 3
    coordinator::assign_queue(&mut state, &mut data, &mut ledger, "bmq://acme/c").await;

    assert_eq!(
        coordinator::latest_ledger_lsn(&ledger),
        Some(LeaderMessageSequence::new(3, 1))
    );

    // An advisory from the stale term is refused.
    let stale = ClusterMessage::PartitionPrimary(PartitionPrimaryAdvisory {
        sequence_number: LeaderMessageSequence::new(2, 9),
        partitions: vec![],
    });
    let err = ledger
        .append(stale, LeaderMessageSequence::new(2, 9))
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterError::StaleLsn { .. }));
}

/// Ledger wrapper that fails every append, to exercise the fatal path.
struct FailingLedger(InMemoryLedger);

#[async_trait]
impl ClusterStateLedger for FailingLedger {
    async fn append(
        &mut self,
        _record: ClusterMessage,
        _lsn: LeaderMessageSequence,
    ) -> ClusterResult<()> {
        Err(ClusterError::LedgerPersistence("disk gone".into()))
    }

    fn iter(&self) -> Box<dyn LedgerIterator + '_> {
        self.0.iter()
    }

    async fn sync(&mut self) -> ClusterResult<()> {
        Err(ClusterError::LedgerPersistence("disk gone".into()))
    }
}

#[tokio::test]
async fn failed_append_mutates_nothing() {
    let mut state = ClusterState::new(1);
    let mut data = elected_leader(1, 1);
    let mut ledger = FailingLedger(InMemoryLedger::new());

    let (ok, status) =
        coordinator::assign_queue(&mut state, &mut data, &mut ledger, "bmq://acme/q").await;

    // Retryable (a new leader may succeed), but nothing changed here.
    assert!(ok);
    assert!(!status.is_success());
    assert!(state.queue("bmq://acme/q").is_none());

    // The underlying error classifies as fatal for the tenure.
    assert!(ClusterError::LedgerPersistence("disk gone".into()).is_fatal());
}

#[tokio::test]
async fn broadcast_snapshot_bootstraps_lagging_follower() {
    struct CapturingNetwork(Vec<(Option<NodeId>, ClusterMessage)>);
    impl ClusterNetwork for CapturingNetwork {
        fn post(&mut self, target: Option<NodeId>, message: ClusterMessage) {
            self.0.push((target, message));
        }
    }

    let mut state = ClusterState::new(2);
    let mut data = elected_leader(2, 2);
    let mut ledger = InMemoryLedger::new();
    let mut network = CapturingNetwork(Vec::new());

    assign_and_journal_partitions(&mut state, &mut data, &mut ledger).await;
    coordinator::assign_queue(&mut state, &mut data, &mut ledger, "bmq://acme/orders").await;

    coordinator::send_cluster_state(
        &state,
        &mut data,
        &mut ledger,
        &mut network,
        true,
        true,
        Some(NodeId::new(2)),
    )
    .await
    .unwrap();

    // The lagging node applies the one snapshot it was sent and lands on
    // the leader's state.
    let (target, snapshot) = network.0.pop().unwrap();
    assert_eq!(target, Some(NodeId::new(2)));

    let mut lagging = ClusterState::new(2);
    lagging.apply(&snapshot).unwrap();
    assert!(lagging.validate_against(&state).is_ok());
}

#[tokio::test]
async fn queue_assignment_is_idempotent_across_replication() {
    let mut state = ClusterState::new(2);
    let mut data = elected_leader(1, 2);
    let mut ledger = InMemoryLedger::new();

    coordinator::assign_queue(&mut state, &mut data, &mut ledger, "bmq://acme/q").await;
    let key = state.queue("bmq://acme/q").unwrap().key();
    let entries = ledger.len();

    // The duplicate request appends nothing and reports the same view.
    let (ok, status) =
        coordinator::assign_queue(&mut state, &mut data, &mut ledger, "bmq://acme/q").await;
    assert!(ok && status.is_success());
    assert_eq!(ledger.len(), entries);
    assert_eq!(state.queue("bmq://acme/q").unwrap().key(), key);

    // Followers replaying see exactly one assignment.
    let mut follower = ClusterState::new(2);
    coordinator::load(&mut follower, &mut *ledger.iter()).unwrap();
    assert_eq!(follower.load_queues_info().len(), 1);
}
