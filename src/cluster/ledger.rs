//! Cluster state ledger: the append-only, totally-ordered advisory log.
//!
//! The ledger is the replication backbone of the control plane. Every
//! state mutation is journaled here by the leader before the leader's
//! own in-memory state changes, and followers reconstruct the exact
//! same state by replaying the log in LSN order. An append that cannot
//! be persisted is fatal for the current leader's tenure.
//!
//! Concrete durable backends (file, replicated) live outside the core;
//! this module defines the trait they implement plus the in-memory
//! reference backend used by a single node and by tests.
//!
//! Iteration is modeled as a capability set rather than an inheritance
//! hierarchy: anything with `{is_valid, next, record, lsn}` can feed
//! [`ClusterState`](super::state::ClusterState) reconstruction.

use async_trait::async_trait;
use tracing::debug;

use super::error::{ClusterError, ClusterResult};
use super::messages::{ClusterMessage, LeaderMessageSequence};

/// Forward-only cursor over ledger records.
///
/// A fresh iterator is positioned *before* the first record; the first
/// [`next`](Self::next) call loads record zero. `record` and `lsn`
/// return `None` until then and again after the cursor passes the end.
pub trait LedgerIterator {
    /// True while the cursor is positioned on a record.
    fn is_valid(&self) -> bool;

    /// Advance to the next record. Returns true while a record is
    /// loaded.
    fn next(&mut self) -> bool;

    /// The record under the cursor.
    fn record(&self) -> Option<&ClusterMessage>;

    /// The LSN of the record under the cursor.
    fn lsn(&self) -> Option<LeaderMessageSequence>;
}

/// The durable, totally-ordered advisory log.
#[async_trait]
pub trait ClusterStateLedger: Send {
    /// Append `record` tagged with `lsn`.
    ///
    /// Appends must arrive in strictly increasing LSN order; anything at
    /// or below the latest accepted LSN is rejected with
    /// [`ClusterError::StaleLsn`]. May block on disk.
    async fn append(
        &mut self,
        record: ClusterMessage,
        lsn: LeaderMessageSequence,
    ) -> ClusterResult<()>;

    /// Open a forward-only cursor over the whole log.
    fn iter(&self) -> Box<dyn LedgerIterator + '_>;

    /// Flush buffered records to durable storage. May block on disk.
    async fn sync(&mut self) -> ClusterResult<()>;
}

/// In-memory ledger backend.
///
/// Reference implementation of [`ClusterStateLedger`]: an ordered record
/// list with LSN admission checking and no durability. Used by
/// single-node deployments and tests.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    records: Vec<(LeaderMessageSequence, ClusterMessage)>,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in the log.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the log holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn last_lsn(&self) -> Option<LeaderMessageSequence> {
        self.records.last().map(|(lsn, _)| *lsn)
    }
}

#[async_trait]
impl ClusterStateLedger for InMemoryLedger {
    async fn append(
        &mut self,
        record: ClusterMessage,
        lsn: LeaderMessageSequence,
    ) -> ClusterResult<()> {
        if let Some(latest) = self.last_lsn() {
            if lsn <= latest {
                return Err(ClusterError::StaleLsn {
                    attempted: lsn.to_string(),
                    latest: latest.to_string(),
                });
            }
        }
        if let Some(carried) = record.lsn() {
            if carried != lsn {
                return Err(ClusterError::MalformedMessage(format!(
                    "advisory carries LSN {} but is appended at {}",
                    carried, lsn
                )));
            }
        }

        debug!(lsn = %lsn, kind = record.kind(), "ledger append");
        self.records.push((lsn, record));
        Ok(())
    }

    fn iter(&self) -> Box<dyn LedgerIterator + '_> {
        Box::new(InMemoryLedgerIterator {
            records: &self.records,
            // Before-first; the first next() lands on record zero.
            cursor: usize::MAX,
        })
    }

    async fn sync(&mut self) -> ClusterResult<()> {
        // Nothing buffered; in-memory records are as durable as they get.
        Ok(())
    }
}

/// Cursor over an [`InMemoryLedger`].
pub struct InMemoryLedgerIterator<'a> {
    records: &'a [(LeaderMessageSequence, ClusterMessage)],
    cursor: usize,
}

impl LedgerIterator for InMemoryLedgerIterator<'_> {
    fn is_valid(&self) -> bool {
        self.cursor < self.records.len()
    }

    fn next(&mut self) -> bool {
        self.cursor = self.cursor.wrapping_add(1);
        self.is_valid()
    }

    fn record(&self) -> Option<&ClusterMessage> {
        self.records.get(self.cursor).map(|(_, record)| record)
    }

    fn lsn(&self) -> Option<LeaderMessageSequence> {
        self.records.get(self.cursor).map(|(lsn, _)| *lsn)
    }
}
