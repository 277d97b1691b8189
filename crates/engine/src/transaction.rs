//! Thread-affine transactions
//!
//! A [`Transaction`] is a handle; the transaction itself lives in the
//! database's active table until it is finished. Graph operations act on
//! whichever transaction is bound to the calling thread, so the handle is
//! only needed to move the transaction between threads and to end it:
//!
//! ```text
//! let tx = db.begin_tx()?;          // bound to this thread
//! db.create_node(props)?;           // uses the bound transaction
//! tx.suspend();                     // thread is free again
//! // ... later, possibly on another thread ...
//! tx.resume()?;
//! tx.success()?;
//! tx.finish()?;                     // commit, unbind, retire
//! ```
//!
//! Outcome rule: commit happens only when `success()` was marked and neither
//! `failure()` nor `mark_rollback_only()` was. Everything else rolls back.

use crate::database::GraphDatabase;
use crate::store::{GraphState, Mutation};
use graphd_core::{GraphError, GraphResult, TxId};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// How a finished transaction ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// Writes were applied and persisted
    Committed,
    /// Writes were discarded
    RolledBack,
}

/// Mutable part of a live transaction
pub(crate) struct TxState {
    pub(crate) finished: bool,
    pub(crate) success: bool,
    /// Private copy of the graph, materialized by the first write
    pub(crate) working: Option<GraphState>,
    pub(crate) mutations: Vec<Mutation>,
}

/// Shared transaction record, owned by the database's active table
pub(crate) struct TxInner {
    pub(crate) id: TxId,
    pub(crate) state: Mutex<TxState>,
    pub(crate) rollback_only: AtomicBool,
}

impl TxInner {
    pub(crate) fn new(id: TxId) -> Self {
        Self {
            id,
            state: Mutex::new(TxState {
                finished: false,
                success: false,
                working: None,
                mutations: Vec::new(),
            }),
            rollback_only: AtomicBool::new(false),
        }
    }
}

/// Handle to an engine transaction
///
/// Cloning the handle does not clone the transaction. The handle keeps its
/// database alive.
#[derive(Clone)]
pub struct Transaction {
    db: Arc<GraphDatabase>,
    inner: Arc<TxInner>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl Transaction {
    pub(crate) fn new(db: Arc<GraphDatabase>, inner: Arc<TxInner>) -> Self {
        Self { db, inner }
    }

    /// Transaction id
    pub fn id(&self) -> TxId {
        self.inner.id
    }

    /// Database this transaction belongs to
    pub fn database(&self) -> &Arc<GraphDatabase> {
        &self.db
    }

    /// Whether `finish` has completed
    pub fn is_finished(&self) -> bool {
        self.inner.state.lock().finished
    }

    /// Whether the calling thread currently holds this transaction
    pub fn is_bound_to_current_thread(&self) -> bool {
        self.db.bindings().is_held_by_current(self.inner.id)
    }

    /// Bind this transaction to the calling thread.
    ///
    /// # Errors
    ///
    /// - `TransactionFinished` if the transaction already ended
    /// - `ThreadAlreadyBound` if this thread carries another transaction
    /// - `TransactionBoundElsewhere` if another thread holds this one
    pub fn resume(&self) -> GraphResult<()> {
        if self.is_finished() {
            return Err(GraphError::TransactionFinished(self.inner.id));
        }
        self.db.bindings().bind(self.inner.id)
    }

    /// Unbind this transaction if the calling thread holds it.
    ///
    /// Returns whether a binding was removed.
    pub fn suspend(&self) -> bool {
        self.db.bindings().unbind(self.inner.id)
    }

    /// Mark the transaction for commit
    pub fn success(&self) -> GraphResult<()> {
        self.require_bound()?;
        self.inner.state.lock().success = true;
        Ok(())
    }

    /// Mark the transaction for rollback
    pub fn failure(&self) -> GraphResult<()> {
        self.require_bound()?;
        self.mark_rollback_only();
        Ok(())
    }

    /// Force rollback on finish. Callable from any thread.
    pub fn mark_rollback_only(&self) {
        self.inner.rollback_only.store(true, Ordering::Release);
    }

    /// Whether finish would roll back
    pub fn is_rollback_only(&self) -> bool {
        self.inner.rollback_only.load(Ordering::Acquire)
    }

    /// End the transaction: commit or roll back per the marked intent.
    ///
    /// The transaction is unbound and retired whatever the outcome, including
    /// when the commit itself fails.
    ///
    /// # Errors
    ///
    /// - `TransactionNotBound` if the calling thread does not hold it
    ///   (the transaction stays live)
    /// - `DatabaseShutdown` / `CommitFailed` / I/O errors if the commit
    ///   could not be applied (the transaction is rolled back)
    pub fn finish(&self) -> GraphResult<TxOutcome> {
        self.require_bound()?;

        let (commit, mutations) = {
            let mut state = self.inner.state.lock();
            if state.finished {
                return Err(GraphError::TransactionFinished(self.inner.id));
            }
            state.finished = true;
            state.working = None;
            let commit = state.success && !self.is_rollback_only();
            (commit, std::mem::take(&mut state.mutations))
        };

        let result = if commit {
            self.db
                .apply_commit(self.inner.id, &mutations)
                .map(|_| TxOutcome::Committed)
        } else {
            Ok(TxOutcome::RolledBack)
        };

        self.db.retire(self.inner.id);
        debug!(
            target: "graphd::db",
            tx = %self.inner.id,
            mutations = mutations.len(),
            outcome = ?result.as_ref().ok(),
            "Transaction finished"
        );
        result
    }

    fn require_bound(&self) -> GraphResult<()> {
        if self.is_bound_to_current_thread() {
            Ok(())
        } else {
            Err(GraphError::TransactionNotBound(self.inner.id))
        }
    }
}
