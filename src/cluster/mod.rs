//! Cluster control plane: state, ledger and coordination.
//!
//! This module is the brain of the broker cluster. It owns three pieces
//! and the rules binding them:
//!
//! - [`ClusterState`]: the authoritative in-memory model — partition →
//!   primary mappings and queue → partition registrations.
//! - [`ClusterStateLedger`]: the append-only, LSN-ordered advisory log
//!   followers replay to reconstruct the exact same state.
//! - [`coordinator`]: the leader-side operations that decide
//!   assignments, journal advisories and disseminate state.
//!
//! # Architecture
//!
//! ```text
//!                      ┌────────────┐
//!        requests ───> │   leader   │
//!                      │ coordinator│
//!                      └─────┬──────┘
//!                 1. append  │
//!                            ▼
//!                      ┌────────────┐     replicate      ┌───────────┐
//!                      │   ledger   │ ─────────────────> │ followers │
//!                      └─────┬──────┘                    └─────┬─────┘
//!                 2. apply   │                                 │ apply
//!                            ▼                                 ▼
//!                      ┌────────────┐      validate      ┌───────────┐
//!                      │ClusterState│ <────────────────> │ replicas  │
//!                      └────────────┘                    └───────────┘
//! ```
//!
//! The leader journals an advisory *before* touching its own state
//! (step 1, then step 2), so every replica that replays the ledger
//! prefix lands on the same state the leader had at that prefix.
//!
//! # Thread Safety
//!
//! Everything in this module executes on the cluster *dispatcher*
//! thread. There are no locks because there is no concurrent access;
//! other threads participate by posting events to the dispatcher.

pub mod config;
pub mod coordinator;
mod error;
pub mod keys;
pub mod ledger;
pub mod messages;
pub mod metrics;
mod primary_state;
mod state;
pub mod traits;
mod validation;

pub use config::{
    AssignmentAlgorithm, ClusterConfig, ClusterData, ClusterNodeConfig, DomainConfig, QueueMode,
};
pub use error::{ClusterError, ClusterErrorCode, ClusterResult, Status};
pub use keys::{AppKey, QueueKey};
pub use ledger::{ClusterStateLedger, InMemoryLedger, LedgerIterator};
pub use messages::{ClusterMessage, LeaderMessageSequence, PrimaryStatus};
pub use primary_state::PartitionPrimaryState;
pub use state::{
    ClusterState, ClusterStatePartitionInfo, ClusterStateQueueInfo, DomainState,
    QueueAssignmentState,
};
pub use traits::{ClusterNetwork, StorageManager};
pub use validation::{validate_app_id, QueueUri};
