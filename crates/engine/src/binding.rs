//! Thread-to-transaction bindings
//!
//! A transaction belongs to whichever thread currently holds it. This table
//! is the single source of truth for that association within one database:
//! - a thread carries at most one transaction
//! - a transaction is held by at most one thread
//!
//! Both directions are kept in one table behind one lock so a bind can never
//! observe a half-updated association.

use graphd_core::{GraphError, GraphResult, TxId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::thread::{self, ThreadId};

#[derive(Default)]
struct BindingTable {
    by_thread: HashMap<ThreadId, TxId>,
    by_tx: HashMap<TxId, ThreadId>,
}

/// Per-database thread binding table
#[derive(Default)]
pub(crate) struct ThreadBindings {
    table: Mutex<BindingTable>,
}

impl ThreadBindings {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Bind `tx` to the calling thread.
    ///
    /// Rebinding a transaction the thread already holds is a no-op.
    pub(crate) fn bind(&self, tx: TxId) -> GraphResult<()> {
        let me = thread::current().id();
        let mut table = self.table.lock();

        if let Some(&current) = table.by_thread.get(&me) {
            if current == tx {
                return Ok(());
            }
            return Err(GraphError::ThreadAlreadyBound {
                current,
                requested: tx,
            });
        }
        if table.by_tx.contains_key(&tx) {
            return Err(GraphError::TransactionBoundElsewhere(tx));
        }

        table.by_thread.insert(me, tx);
        table.by_tx.insert(tx, me);
        Ok(())
    }

    /// Unbind `tx` if the calling thread holds it. Returns whether it did.
    pub(crate) fn unbind(&self, tx: TxId) -> bool {
        let me = thread::current().id();
        let mut table = self.table.lock();
        match table.by_tx.get(&tx) {
            Some(&holder) if holder == me => {
                table.by_tx.remove(&tx);
                table.by_thread.remove(&me);
                true
            }
            _ => false,
        }
    }

    /// Drop any binding of `tx`, whichever thread holds it
    pub(crate) fn release(&self, tx: TxId) {
        let mut table = self.table.lock();
        if let Some(holder) = table.by_tx.remove(&tx) {
            table.by_thread.remove(&holder);
        }
    }

    /// Transaction bound to the calling thread
    pub(crate) fn current(&self) -> Option<TxId> {
        let me = thread::current().id();
        self.table.lock().by_thread.get(&me).copied()
    }

    /// Whether the calling thread holds `tx`
    pub(crate) fn is_held_by_current(&self, tx: TxId) -> bool {
        self.current() == Some(tx)
    }

    /// Number of live bindings
    pub(crate) fn len(&self) -> usize {
        self.table.lock().by_tx.len()
    }
}
