//! Zombie session reaper
//!
//! Callers can vanish without finishing their transaction; nothing tells
//! the service. The reaper thread wakes every interval and force-terminates
//! each session idle for longer than the configured lifetime. Sweeps run
//! under the cache lock, so no database is shut down while one of its
//! zombie transactions is being rolled back.

use crate::access::CallerId;
use crate::cache::DatabaseCache;
use crate::session::SessionRegistry;
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};

/// Name of the reaper thread
pub const REAPER_THREAD_NAME: &str = "graphd-reaper";

/// Run one sweep: terminate every session idle past `max_lifetime`.
pub fn sweep(
    registry: &SessionRegistry,
    cache: &DatabaseCache,
    max_lifetime: Duration,
) -> Vec<CallerId> {
    cache.with_lock(|| registry.reap_idle(max_lifetime))
}

struct ReaperShared {
    alive: AtomicBool,
    sweeps: AtomicU64,
    reaped: AtomicU64,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Handle to the background reaper thread
pub struct Reaper {
    shared: Arc<ReaperShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Reaper {
    /// Spawn the reaper thread.
    pub fn start(
        registry: Arc<SessionRegistry>,
        cache: Arc<DatabaseCache>,
        interval: Duration,
        max_lifetime: Duration,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(ReaperShared {
            alive: AtomicBool::new(true),
            sweeps: AtomicU64::new(0),
            reaped: AtomicU64::new(0),
            lock: Mutex::new(()),
            wake: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name(REAPER_THREAD_NAME.to_string())
            .spawn(move || reaper_loop(&thread_shared, &registry, &cache, interval, max_lifetime))?;

        info!(
            target: "graphd::reaper",
            interval_ms = interval.as_millis() as u64,
            max_lifetime_ms = max_lifetime.as_millis() as u64,
            "Reaper started"
        );
        Ok(Self {
            shared,
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Clear the liveness flag, wake the thread and join it. Idempotent.
    pub fn stop(&self) {
        {
            // Holding the lock means the thread is either waiting (and gets
            // the notify) or has not yet checked the flag.
            let _guard = self.shared.lock.lock();
            self.shared.alive.store(false, Ordering::Release);
            self.shared.wake.notify_all();
        }

        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                error!(target: "graphd::reaper", "Reaper thread panicked");
            }
            info!(
                target: "graphd::reaper",
                sweeps = self.sweep_count(),
                reaped = self.reaped_count(),
                "Reaper stopped"
            );
        }
    }

    /// Whether the thread is still running
    pub fn is_running(&self) -> bool {
        self.shared.alive.load(Ordering::Acquire)
    }

    /// Sweeps completed so far
    pub fn sweep_count(&self) -> u64 {
        self.shared.sweeps.load(Ordering::Acquire)
    }

    /// Sessions terminated so far
    pub fn reaped_count(&self) -> u64 {
        self.shared.reaped.load(Ordering::Acquire)
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.stop();
    }
}

fn reaper_loop(
    shared: &ReaperShared,
    registry: &SessionRegistry,
    cache: &DatabaseCache,
    interval: Duration,
    max_lifetime: Duration,
) {
    loop {
        {
            let mut guard = shared.lock.lock();
            if !shared.alive.load(Ordering::Acquire) {
                break;
            }
            shared.wake.wait_for(&mut guard, interval);
        }
        if !shared.alive.load(Ordering::Acquire) {
            break;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| sweep(registry, cache, max_lifetime))) {
            Ok(reaped) => {
                if !reaped.is_empty() {
                    info!(target: "graphd::reaper", count = reaped.len(), "Zombie sessions terminated");
                    shared.reaped.fetch_add(reaped.len() as u64, Ordering::AcqRel);
                } else {
                    debug!(target: "graphd::reaper", "Sweep found no zombies");
                }
            }
            Err(_) => error!(target: "graphd::reaper", "Sweep panicked; continuing"),
        }
        shared.sweeps.fetch_add(1, Ordering::AcqRel);
    }
}
