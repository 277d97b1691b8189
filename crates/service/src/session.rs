//! Transactional session registry
//!
//! Maps a [`CallerId`] to at most one in-flight engine transaction and moves
//! that transaction onto and off whichever thread is servicing the caller.
//!
//! ## Lifecycle
//!
//! ```text
//!   begin ──► [parked] ──resume──► [bound to thread] ──suspend──► [parked]
//!                │                        │
//!                └────── finish / force_terminate (session removed) ──────┘
//! ```
//!
//! A session exists iff `begin` succeeded for the caller and no terminal
//! operation (`finish`, `force_terminate`) has run since.
//!
//! ## Locking
//!
//! One mutex guards the map. It is held for map access and for the engine's
//! bind/unbind call, never for a graph operation or a commit, so distinct
//! callers run their operations concurrently.

use crate::access::CallerId;
use crate::error::{SessionError, SessionResult};
use graphd_core::TxId;
use graphd_engine::{GraphDatabase, Transaction, TxOutcome};
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Maximum number of `(label, elapsed)` entries kept per session
pub const MAX_OPERATION_LOG: usize = 256;

/// Registry record of one caller's in-flight transaction
struct Session {
    tx: Transaction,
    created_at: Instant,
    last_activity: Instant,
    resumed_at: Option<Instant>,
    cumulative: Duration,
    operation_count: u64,
    operation_log: VecDeque<(String, Duration)>,
}

impl Session {
    fn new(tx: Transaction) -> Self {
        let now = Instant::now();
        Self {
            tx,
            created_at: now,
            last_activity: now,
            resumed_at: None,
            cumulative: Duration::ZERO,
            operation_count: 0,
            operation_log: VecDeque::new(),
        }
    }

    fn record(&mut self, label: &str, elapsed: Duration) {
        self.cumulative += elapsed;
        self.operation_count += 1;
        if self.operation_log.len() == MAX_OPERATION_LOG {
            self.operation_log.pop_front();
        }
        self.operation_log.push_back((label.to_string(), elapsed));
    }

    /// Parked and untouched for longer than `max_idle`
    fn is_idle(&self, now: Instant, max_idle: Duration) -> bool {
        self.resumed_at.is_none() && now.saturating_duration_since(self.last_activity) > max_idle
    }

    fn info(&self, now: Instant) -> SessionInfo {
        SessionInfo {
            tx: self.tx.id(),
            idle: now.saturating_duration_since(self.last_activity),
            age: now.saturating_duration_since(self.created_at),
            operations: self.operation_count,
            cumulative: self.cumulative,
            recent: self.operation_log.iter().cloned().collect(),
        }
    }
}

/// Diagnostic snapshot of a session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Engine transaction id
    pub tx: TxId,
    /// Time since the last resume or suspend
    pub idle: Duration,
    /// Time since `begin`
    pub age: Duration,
    /// Operations recorded by `suspend`
    pub operations: u64,
    /// Total time spent between resume and suspend
    pub cumulative: Duration,
    /// Most recent `(label, elapsed)` entries, oldest first
    pub recent: Vec<(String, Duration)>,
}

/// Caller identity → session map
pub struct SessionRegistry {
    sessions: Mutex<HashMap<CallerId, Session>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Open a new transaction on `db` for `caller`.
    ///
    /// The transaction is parked (not bound to any thread) when this returns.
    ///
    /// # Errors
    ///
    /// - `AlreadyAssociated` if `caller` already has a session
    /// - `AlreadyBoundElsewhere` if this thread carries another transaction of `db`
    /// - `Engine` if the database refuses new transactions
    pub fn begin(&self, caller: CallerId, db: &Arc<GraphDatabase>) -> SessionResult<Transaction> {
        let mut sessions = self.sessions.lock();
        match sessions.entry(caller) {
            Entry::Occupied(_) => Err(SessionError::AlreadyAssociated(caller)),
            Entry::Vacant(slot) => {
                let tx = db
                    .begin_tx()
                    .map_err(|e| SessionError::from_binding(caller, e))?;
                tx.suspend();
                slot.insert(Session::new(tx.clone()));
                debug!(target: "graphd::session", %caller, tx = %tx.id(), "Session begun");
                Ok(tx)
            }
        }
    }

    /// Bind `caller`'s transaction to the calling thread.
    ///
    /// # Errors
    ///
    /// - `NoAssociatedSession` if `caller` has no session
    /// - `AlreadyBoundElsewhere` if the engine refuses the binding
    pub fn resume(&self, caller: CallerId) -> SessionResult<Transaction> {
        self.resume_if_present(caller)?
            .ok_or(SessionError::NoAssociatedSession(caller))
    }

    /// Like [`resume`](Self::resume), but a missing session is `Ok(None)`.
    pub fn resume_if_present(&self, caller: CallerId) -> SessionResult<Option<Transaction>> {
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get_mut(&caller) else {
            return Ok(None);
        };
        session
            .tx
            .resume()
            .map_err(|e| SessionError::from_binding(caller, e))?;
        let now = Instant::now();
        session.last_activity = now;
        session.resumed_at = Some(now);
        Ok(Some(session.tx.clone()))
    }

    /// Unbind `caller`'s transaction from the calling thread and record the
    /// time spent since the matching resume under `label`.
    ///
    /// No-op when `caller` has no session.
    pub fn suspend(&self, caller: CallerId, label: &str) {
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get_mut(&caller) else {
            return;
        };
        session.tx.suspend();
        let now = Instant::now();
        if let Some(resumed_at) = session.resumed_at.take() {
            session.record(label, now.saturating_duration_since(resumed_at));
        }
        session.last_activity = now;
    }

    /// Mark `caller`'s transaction for commit. The transaction must be
    /// bound to the calling thread.
    pub fn mark_success(&self, caller: CallerId) -> SessionResult<()> {
        let sessions = self.sessions.lock();
        let session = sessions
            .get(&caller)
            .ok_or(SessionError::NoAssociatedSession(caller))?;
        session.tx.success()?;
        Ok(())
    }

    /// Mark `caller`'s transaction for rollback. The transaction must be
    /// bound to the calling thread.
    pub fn mark_failure(&self, caller: CallerId) -> SessionResult<()> {
        let sessions = self.sessions.lock();
        let session = sessions
            .get(&caller)
            .ok_or(SessionError::NoAssociatedSession(caller))?;
        session.tx.failure()?;
        Ok(())
    }

    /// Commit or roll back `caller`'s transaction and remove the session.
    ///
    /// The session is removed before the engine is asked to finish, so it is
    /// gone whatever the commit does.
    ///
    /// # Errors
    ///
    /// - `NoAssociatedSession` if `caller` has no session
    /// - `AlreadyBoundElsewhere` if another thread holds the transaction
    ///   (it is marked rollback-only and the holder's call rolls it back)
    /// - `Engine` if commit or rollback fails
    pub fn finish(&self, caller: CallerId) -> SessionResult<TxOutcome> {
        let session = self
            .sessions
            .lock()
            .remove(&caller)
            .ok_or(SessionError::NoAssociatedSession(caller))?;

        let result = Self::end(caller, &session.tx);
        debug!(
            target: "graphd::session",
            %caller,
            tx = %session.tx.id(),
            operations = session.operation_count,
            cumulative_ms = session.cumulative.as_millis() as u64,
            age_ms = session.created_at.elapsed().as_millis() as u64,
            outcome = ?result.as_ref().ok(),
            "Session finished"
        );
        result
    }

    /// Roll back `caller`'s transaction out-of-band and remove the session.
    ///
    /// Equivalent to a caller-issued failure + finish, run on the calling
    /// (reaper) thread. The transaction never commits.
    pub fn force_terminate(&self, caller: CallerId) -> SessionResult<()> {
        let session = self
            .sessions
            .lock()
            .remove(&caller)
            .ok_or(SessionError::NoAssociatedSession(caller))?;
        Self::terminate(caller, session)
    }

    fn terminate(caller: CallerId, session: Session) -> SessionResult<()> {
        session.tx.mark_rollback_only();
        let result = Self::end(caller, &session.tx).map(|_| ());
        info!(
            target: "graphd::session",
            %caller,
            tx = %session.tx.id(),
            idle_ms = session.last_activity.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Session force-terminated"
        );
        result
    }

    fn end(caller: CallerId, tx: &Transaction) -> SessionResult<TxOutcome> {
        if !tx.is_bound_to_current_thread() {
            if let Err(e) = tx.resume() {
                tx.mark_rollback_only();
                return Err(SessionError::from_binding(caller, e));
            }
        }
        Ok(tx.finish()?)
    }

    /// Force-terminate every session idle for longer than `max_idle`.
    ///
    /// A session counts as idle only while it is parked. Idleness is checked
    /// again under the same lock that removes the session, so a caller that
    /// resumes after the scan keeps its session. Failures are logged per
    /// session and do not stop the sweep. Returns the callers whose sessions
    /// were removed.
    pub fn reap_idle(&self, max_idle: Duration) -> Vec<CallerId> {
        let now = Instant::now();
        let candidates: Vec<CallerId> = self
            .sessions
            .lock()
            .iter()
            .filter(|(_, s)| s.is_idle(now, max_idle))
            .map(|(caller, _)| *caller)
            .collect();

        let mut reaped = Vec::with_capacity(candidates.len());
        for caller in candidates {
            // Finished or resumed by its caller since the scan
            let Some(session) = self.remove_if_idle(caller, max_idle) else {
                continue;
            };
            match Self::terminate(caller, session) {
                Ok(()) => reaped.push(caller),
                Err(e) => {
                    warn!(target: "graphd::session", %caller, error = %e, "Zombie rollback failed");
                    reaped.push(caller);
                }
            }
        }
        reaped
    }

    /// Remove `caller`'s session if it is still idle past `max_idle`
    fn remove_if_idle(&self, caller: CallerId, max_idle: Duration) -> Option<Session> {
        let mut sessions = self.sessions.lock();
        let now = Instant::now();
        if sessions.get(&caller)?.is_idle(now, max_idle) {
            sessions.remove(&caller)
        } else {
            None
        }
    }

    /// Diagnostic snapshot of `caller`'s session
    pub fn session_info(&self, caller: CallerId) -> Option<SessionInfo> {
        let now = Instant::now();
        self.sessions.lock().get(&caller).map(|s| s.info(now))
    }

    /// Whether `caller` has a session
    pub fn contains(&self, caller: CallerId) -> bool {
        self.sessions.lock().contains_key(&caller)
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether no sessions are live
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Callers with a live session
    pub fn callers(&self) -> Vec<CallerId> {
        self.sessions.lock().keys().copied().collect()
    }
}
