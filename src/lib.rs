//! # stratomq
//! Rust-native partitioned message broker core.
//!
//! This crate provides the two hard centers of a distributed message
//! broker: the wire-level parsing of binary framed events (CONFIRM
//! first among them) and the cluster control plane that assigns
//! partitions to primaries, maps queues onto partitions and replicates
//! every decision through a durable ledger.
//!
//! # Goals
//! - Zero-copy parsing over scatter-gather buffers, forward-compatible
//!   by construction (records are read by declared length, never by
//!   struct cast)
//! - A control plane whose invariants hold under leader changes: one
//!   primary per partition, monotonic lease ids, identical queue
//!   mappings on every replica
//! - Leverage best in class libraries such as [Tokio](https://tokio.rs/),
//!   [Nom](https://docs.rs/nom/latest/nom/) and
//!   [Tracing](https://docs.rs/tracing)
//!
//! # Parsing a CONFIRM event
//!
//! ```rust
//! use stratomq::confirm::{ConfirmEventBuilder, ConfirmMessage, ConfirmMessageIterator, NextStatus};
//! use stratomq::protocol::MessageGuid;
//! use stratomq::types::QueueId;
//!
//! let mut builder = ConfirmEventBuilder::new();
//! builder.append(ConfirmMessage::new(QueueId::new(4), 0, MessageGuid::default()));
//! let (blob, event_header) = builder.build();
//!
//! let mut iter = ConfirmMessageIterator::new();
//! assert!(iter.reset(&blob, &event_header).is_ok());
//! while iter.next() == NextStatus::HasNext {
//!     let record = iter.message().unwrap();
//!     println!("confirmed on queue {:?}", record.queue_id());
//! }
//! ```
//!
//! # Driving the control plane
//!
//! ```rust
//! use stratomq::cluster::{
//!     coordinator, AssignmentAlgorithm, ClusterConfig, ClusterData, ClusterState,
//!     DomainConfig, InMemoryLedger, QueueMode,
//! };
//! use stratomq::types::NodeId;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut config = ClusterConfig::default();
//! config.domains.push(DomainConfig {
//!     name: "acme".into(),
//!     enabled: true,
//!     mode: QueueMode::default(),
//! });
//! let mut data = ClusterData::new(config);
//! data.set_leader(NodeId::new(0), 1);
//!
//! let mut state = ClusterState::new(data.config().partition_count);
//! let mut ledger = InMemoryLedger::new();
//!
//! let mappings = coordinator::assign_partitions(
//!     &mut state,
//!     &data,
//!     AssignmentAlgorithm::LeastAssigned,
//!     true,
//! );
//! assert_eq!(mappings.len(), data.config().partition_count);
//!
//! let (ok, status) =
//!     coordinator::assign_queue(&mut state, &mut data, &mut ledger, "bmq://acme/orders").await;
//! assert!(ok && status.is_success());
//! # }
//! ```
//!
//! The out-of-scope collaborators (network transport, storage journals,
//! the concrete replicated ledger backend) are consumed through the
//! narrow traits in [`cluster::traits`], [`cluster::ledger`] and
//! [`dispatcher`].

#![forbid(unsafe_code)]

pub mod blob;
pub mod confirm;
pub mod constants;
pub mod encode;
pub mod error;
pub mod protocol;
pub mod types;

pub mod cluster;
pub mod dispatcher;
pub mod telemetry;

pub use encode::ToByte;

pub mod prelude {
    //! Main exports of the broker core.
    //!
    //! Pulls in the event parsing surface and the control-plane types a
    //! broker node wires together.
    pub use crate::blob::{Blob, BlobCursor, BlobPosition, BlobWindow};
    pub use crate::cluster::{
        coordinator, AssignmentAlgorithm, ClusterConfig, ClusterData, ClusterError,
        ClusterErrorCode, ClusterState, ClusterStateLedger, InMemoryLedger,
        LeaderMessageSequence, PrimaryStatus, QueueUri, Status,
    };
    pub use crate::confirm::{ConfirmEventBuilder, ConfirmMessage, ConfirmMessageIterator};
    pub use crate::dispatcher::{ChannelDispatcher, ClientId, Dispatcher, DispatcherEvent};
    pub use crate::error::{Error, Result};
    pub use crate::protocol::{AckResult, EventHeader, EventType, MessageGuid};
    pub use crate::types::{
        CorrelationId, LeaseId, NodeId, PartitionId, PartitionSequenceNumber, QueueId, SyncPoint,
        SyncPointOffsetPair,
    };

    pub use bytes;
}
