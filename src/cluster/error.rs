//! Error types for the cluster control plane.
//!
//! # Error Handling Patterns
//!
//! The control plane uses two patterns based on operation criticality:
//!
//! ## Fail-Fast (Propagate Errors)
//!
//! Used for operations where failure indicates a serious problem:
//! - Ledger appends (a failed append ends the leader's tenure)
//! - Queue assignment on the leader
//! - State validation against a reference
//!
//! ## Best-Effort (Log and Continue)
//!
//! Used for operations where partial failure is acceptable:
//! - State snapshots broadcast to followers (transport retries)
//! - Diagnostics and metric collection
//!
//! # Wire Codes
//!
//! Requesters see [`ClusterErrorCode`] values, not the rich error type;
//! the surrounding service layer translates codes into RPC statuses.
//! Nothing in this module aborts the process. The two *fatal* variants
//! ([`ClusterError::LedgerPersistence`] and
//! [`ClusterError::StateValidation`]) end the current leader's tenure:
//! a new leader must be elected before further advisories.

use num_derive::FromPrimitive;
use std::io;
use thiserror::Error;

/// Result type for control-plane operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors that can occur in the cluster control plane.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// I/O error from the ledger or network layer.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The operation is only valid on the leader node.
    #[error("this node is not the leader")]
    NotALeader,

    /// An advisory carried an LSN at or below the latest accepted one.
    #[error("stale LSN: attempted {attempted}, latest {latest}")]
    StaleLsn {
        /// LSN of the rejected record.
        attempted: String,
        /// Highest LSN already in the ledger.
        latest: String,
    },

    /// The queue URI is not registered in the cluster state.
    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    /// A unique queue key could not be generated for the partition.
    #[error("duplicate queue key in partition {partition_id}: {uri}")]
    DuplicateQueueKey {
        /// Partition in which the collision occurred.
        partition_id: u32,
        /// URI of the queue being assigned.
        uri: String,
    },

    /// An added app id is already registered on the queue.
    #[error("app id conflict: {0}")]
    AppIdConflict(String),

    /// No available node can take the partition.
    #[error("no eligible node for assignment")]
    NoEligibleNode,

    /// The queue URI is malformed. Permanent rejection.
    #[error("invalid queue uri: {0}")]
    InvalidUri(String),

    /// The queue's domain is not configured or is disabled. Permanent
    /// rejection.
    #[error("unknown or disabled domain: {0}")]
    UnknownDomain(String),

    /// A queue state transition skipped a lifecycle stage.
    #[error("invalid queue state transition for {uri}: {from} -> {to}")]
    InvalidTransition {
        /// Queue whose transition was rejected.
        uri: String,
        /// Current state name.
        from: &'static str,
        /// Requested state name.
        to: &'static str,
    },

    /// The ledger could not persist a record. Fatal for the current
    /// leader's tenure.
    #[error("ledger persistence failure: {0}")]
    LedgerPersistence(String),

    /// Cluster state diverged from its reference during validation.
    /// Fatal for the current leader's tenure.
    #[error("cluster state validation failure: {0}")]
    StateValidation(String),

    /// Control message could not be decoded.
    #[error("malformed control message: {0}")]
    MalformedMessage(String),
}

impl ClusterError {
    /// Wire code surfaced to the requester.
    pub fn code(&self) -> ClusterErrorCode {
        match self {
            ClusterError::NotALeader => ClusterErrorCode::NotALeader,
            ClusterError::StaleLsn { .. } => ClusterErrorCode::StaleLsn,
            ClusterError::UnknownQueue(_) => ClusterErrorCode::UnknownQueue,
            ClusterError::DuplicateQueueKey { .. } => ClusterErrorCode::DuplicateQueueKey,
            ClusterError::AppIdConflict(_) => ClusterErrorCode::AppIdConflict,
            ClusterError::NoEligibleNode => ClusterErrorCode::NoEligibleNode,
            _ => ClusterErrorCode::Unknown,
        }
    }

    /// True when this error ends the current leader's tenure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClusterError::LedgerPersistence(_) | ClusterError::StateValidation(_)
        )
    }
}

/// Wire codes for control-plane errors.
///
/// These are the values requesters see; the service layer maps them to
/// RPC statuses.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, Default)]
pub enum ClusterErrorCode {
    /// An unexpected error.
    Unknown = -1,
    /// Success.
    #[default]
    None = 0,
    /// The receiving node is not the leader.
    NotALeader = 1,
    /// The advisory's LSN is not past the latest accepted one.
    StaleLsn = 2,
    /// The queue URI is not registered.
    UnknownQueue = 3,
    /// No unique queue key could be generated within the partition.
    DuplicateQueueKey = 4,
    /// An added app id is already live on the queue.
    AppIdConflict = 5,
    /// No available node can take the partition.
    NoEligibleNode = 6,
}

/// Reply status for a control-plane request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Status {
    /// Outcome code.
    pub code: ClusterErrorCode,
    /// Human-readable detail, empty on success.
    pub message: String,
}

impl Status {
    /// Successful status.
    pub fn success() -> Self {
        Status::default()
    }

    /// Failed status with a detail message.
    pub fn error(code: ClusterErrorCode, message: impl Into<String>) -> Self {
        Status {
            code,
            message: message.into(),
        }
    }

    /// True on success.
    pub fn is_success(&self) -> bool {
        self.code == ClusterErrorCode::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn test_error_codes() {
        assert_eq!(ClusterError::NotALeader.code(), ClusterErrorCode::NotALeader);
        assert_eq!(
            ClusterError::UnknownQueue("bmq://d/q".into()).code(),
            ClusterErrorCode::UnknownQueue
        );
        assert_eq!(
            ClusterError::DuplicateQueueKey {
                partition_id: 1,
                uri: "bmq://d/q".into()
            }
            .code(),
            ClusterErrorCode::DuplicateQueueKey
        );
        assert_eq!(
            ClusterError::NoEligibleNode.code(),
            ClusterErrorCode::NoEligibleNode
        );
        assert_eq!(
            ClusterError::InvalidUri("x".into()).code(),
            ClusterErrorCode::Unknown
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ClusterError::LedgerPersistence("disk full".into()).is_fatal());
        assert!(ClusterError::StateValidation("diverged".into()).is_fatal());
        assert!(!ClusterError::NotALeader.is_fatal());
        assert!(!ClusterError::NoEligibleNode.is_fatal());
    }

    #[test]
    fn test_code_from_primitive() {
        assert_eq!(ClusterErrorCode::from_i32(0), Some(ClusterErrorCode::None));
        assert_eq!(
            ClusterErrorCode::from_i32(1),
            Some(ClusterErrorCode::NotALeader)
        );
        assert_eq!(
            ClusterErrorCode::from_i32(6),
            Some(ClusterErrorCode::NoEligibleNode)
        );
        assert_eq!(ClusterErrorCode::from_i32(99), None);
    }

    #[test]
    fn test_status() {
        assert!(Status::success().is_success());
        let status = Status::error(ClusterErrorCode::AppIdConflict, "app exists");
        assert!(!status.is_success());
        assert_eq!(status.code, ClusterErrorCode::AppIdConflict);
        assert!(status.message.contains("app exists"));
    }

    #[test]
    fn test_display_messages() {
        let err = ClusterError::StaleLsn {
            attempted: "(2, 1)".into(),
            latest: "(3, 4)".into(),
        };
        let text = err.to_string();
        assert!(text.contains("(2, 1)"));
        assert!(text.contains("(3, 4)"));
    }
}
