//! Cluster configuration and runtime membership data.
//!
//! [`ClusterConfig`] is the static description of a cluster: its name,
//! nodes, partition count, assignment algorithm and domain definitions.
//! It can be built programmatically or read from the environment.
//!
//! [`ClusterData`] is the runtime companion the coordinator consults on
//! every operation: who we are, who leads, which nodes are currently
//! available, and the leader's LSN counter. It lives on the dispatcher
//! thread next to the cluster state.
//!
//! # Environment Variables
//!
//! - `STRATOMQ_CLUSTER_NAME`: cluster name (default: `local`)
//! - `STRATOMQ_NODE_ID`: this node's id (default: `0`)
//! - `STRATOMQ_PARTITION_COUNT`: number of partitions (default: 4)
//! - `STRATOMQ_NODES`: comma-separated `id@host:port` peer list

use std::collections::BTreeSet;
use tracing::info;

use super::error::{ClusterError, ClusterResult};
use super::messages::LeaderMessageSequence;
use crate::constants::DEFAULT_PARTITION_COUNT;
use crate::types::NodeId;

/// How orphan partitions are assigned to primaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssignmentAlgorithm {
    /// The leader takes every orphan partition itself when eligible.
    LeaderIsSenior,
    /// Orphans go to the available node with the fewest primaried
    /// partitions; ties break by ascending node id.
    #[default]
    LeastAssigned,
}

impl AssignmentAlgorithm {
    fn from_env_value(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "leader_is_senior" => AssignmentAlgorithm::LeaderIsSenior,
            _ => AssignmentAlgorithm::LeastAssigned,
        }
    }
}

/// Static description of one cluster node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNodeConfig {
    /// Node id, unique within the cluster.
    pub id: NodeId,
    /// Node name for logs and dumps.
    pub name: String,
    /// Host the node listens on.
    pub host: String,
    /// Port the node listens on.
    pub port: u16,
}

/// Queue-mode section of a domain definition: the apps consuming from
/// each queue of the domain.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueMode {
    /// App ids consuming in fan-out mode; empty means single-consumer.
    pub app_ids: Vec<String>,
}

/// One domain definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainConfig {
    /// Domain name, matched against queue URIs.
    pub name: String,
    /// Disabled domains reject queue assignment permanently.
    pub enabled: bool,
    /// Consumption mode.
    pub mode: QueueMode,
}

/// Static cluster configuration.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Cluster name.
    pub name: String,
    /// This node's id.
    pub self_node_id: NodeId,
    /// Number of partitions.
    pub partition_count: usize,
    /// Orphan assignment algorithm.
    pub assignment_algorithm: AssignmentAlgorithm,
    /// All cluster nodes, including this one.
    pub nodes: Vec<ClusterNodeConfig>,
    /// Domains served by the cluster.
    pub domains: Vec<DomainConfig>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: "local".to_string(),
            self_node_id: NodeId::new(0),
            partition_count: DEFAULT_PARTITION_COUNT,
            assignment_algorithm: AssignmentAlgorithm::default(),
            nodes: vec![ClusterNodeConfig {
                id: NodeId::new(0),
                name: "node-0".to_string(),
                host: "127.0.0.1".to_string(),
                port: 30114,
            }],
            domains: Vec::new(),
        }
    }
}

impl ClusterConfig {
    /// Read configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> ClusterResult<Self> {
        let defaults = Self::default();

        let name = std::env::var("STRATOMQ_CLUSTER_NAME").unwrap_or(defaults.name);
        let self_node_id = std::env::var("STRATOMQ_NODE_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(NodeId::new)
            .unwrap_or(defaults.self_node_id);
        let partition_count = std::env::var("STRATOMQ_PARTITION_COUNT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.partition_count);
        let assignment_algorithm = std::env::var("STRATOMQ_ASSIGNMENT_ALGORITHM")
            .map(|v| AssignmentAlgorithm::from_env_value(&v))
            .unwrap_or(defaults.assignment_algorithm);

        let nodes = match std::env::var("STRATOMQ_NODES") {
            Ok(spec) => parse_node_list(&spec)?,
            Err(_) => defaults.nodes,
        };

        let config = Self {
            name,
            self_node_id,
            partition_count,
            assignment_algorithm,
            nodes,
            domains: Vec::new(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> ClusterResult<()> {
        if self.partition_count == 0 {
            return Err(ClusterError::MalformedMessage(
                "partition count must be at least 1".into(),
            ));
        }
        if self.nodes.is_empty() {
            return Err(ClusterError::MalformedMessage("empty node list".into()));
        }
        let mut seen = BTreeSet::new();
        for node in &self.nodes {
            if !node.id.is_valid() {
                return Err(ClusterError::MalformedMessage(format!(
                    "invalid node id {}",
                    node.id
                )));
            }
            if !seen.insert(node.id) {
                return Err(ClusterError::MalformedMessage(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
        }
        if !seen.contains(&self.self_node_id) {
            return Err(ClusterError::MalformedMessage(format!(
                "self node id {} not in node list",
                self.self_node_id
            )));
        }
        Ok(())
    }

    /// Find a domain definition by name.
    pub fn domain(&self, name: &str) -> Option<&DomainConfig> {
        self.domains.iter().find(|d| d.name == name)
    }
}

fn parse_node_list(spec: &str) -> ClusterResult<Vec<ClusterNodeConfig>> {
    spec.split(',')
        .map(|entry| {
            let (id, addr) = entry.split_once('@').ok_or_else(|| {
                ClusterError::MalformedMessage(format!("node entry missing '@': {}", entry))
            })?;
            let (host, port) = addr.split_once(':').ok_or_else(|| {
                ClusterError::MalformedMessage(format!("node address missing ':': {}", entry))
            })?;
            let id: i32 = id.trim().parse().map_err(|_| {
                ClusterError::MalformedMessage(format!("bad node id in: {}", entry))
            })?;
            let port: u16 = port.trim().parse().map_err(|_| {
                ClusterError::MalformedMessage(format!("bad port in: {}", entry))
            })?;
            Ok(ClusterNodeConfig {
                id: NodeId::new(id),
                name: format!("node-{}", id),
                host: host.trim().to_string(),
                port,
            })
        })
        .collect()
}

/// Runtime cluster membership and leadership data.
///
/// Owned by the dispatcher thread alongside the cluster state; the
/// coordinator consults it on every operation.
#[derive(Debug, Clone)]
pub struct ClusterData {
    config: ClusterConfig,
    leader: Option<NodeId>,
    leader_term: u64,
    next_sequence: u64,
    available: BTreeSet<NodeId>,
}

impl ClusterData {
    /// Create runtime data for `config`. Every configured node starts
    /// available; leadership starts vacant.
    pub fn new(config: ClusterConfig) -> Self {
        let available = config.nodes.iter().map(|n| n.id).collect();
        Self {
            config,
            leader: None,
            leader_term: 0,
            next_sequence: 1,
            available,
        }
    }

    /// The static configuration.
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Mutable configuration access, for runtime domain registration.
    pub fn config_mut(&mut self) -> &mut ClusterConfig {
        &mut self.config
    }

    /// This node's id.
    pub fn self_node_id(&self) -> NodeId {
        self.config.self_node_id
    }

    /// The current leader, if one is elected.
    pub fn leader(&self) -> Option<NodeId> {
        self.leader
    }

    /// The current leader's term.
    pub fn leader_term(&self) -> u64 {
        self.leader_term
    }

    /// True when this node is the leader.
    pub fn is_self_leader(&self) -> bool {
        self.leader == Some(self.config.self_node_id)
    }

    /// Record an election outcome. The sequence counter restarts so the
    /// new leader's first advisory is `(term, 1)`.
    pub fn set_leader(&mut self, leader: NodeId, term: u64) {
        info!(leader = %leader, term, "leader elected");
        self.leader = Some(leader);
        self.leader_term = term;
        self.next_sequence = 1;
    }

    /// Take the next LSN for an advisory originated by this leader.
    pub fn next_lsn(&mut self) -> LeaderMessageSequence {
        let lsn = LeaderMessageSequence::new(self.leader_term, self.next_sequence);
        self.next_sequence += 1;
        lsn
    }

    /// Mark a node available or unavailable.
    pub fn set_node_available(&mut self, node: NodeId, available: bool) {
        if available {
            self.available.insert(node);
        } else {
            self.available.remove(&node);
        }
    }

    /// True when `node` is currently available.
    pub fn is_node_available(&self, node: NodeId) -> bool {
        self.available.contains(&node)
    }

    /// Available nodes in ascending id order.
    pub fn available_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.available.iter().copied()
    }

    /// Peer nodes (everyone but this node), ascending id order.
    pub fn peer_nodes(&self) -> Vec<NodeId> {
        self.config
            .nodes
            .iter()
            .map(|n| n.id)
            .filter(|id| *id != self.config.self_node_id)
            .collect()
    }
}
