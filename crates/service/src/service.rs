//! Service entry point
//!
//! [`GraphService`] owns the session registry, the database cache and the
//! reaper thread for the life of the hosting process. Activation builds all
//! three; deactivation stops and joins the reaper, then shuts every cached
//! database down.

use crate::access::{CallerContext, CallerId};
use crate::cache::{validate_name, DatabaseCache};
use crate::config::ServiceConfig;
use crate::error::{CallError, CallResult};
use crate::export::ExportInfo;
use crate::handle::DbHandle;
use crate::reaper::{self, Reaper};
use crate::session::SessionRegistry;
use graphd_core::GraphResult;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Process-wide graph database service
pub struct GraphService {
    config: ServiceConfig,
    registry: Arc<SessionRegistry>,
    cache: Arc<DatabaseCache>,
    reaper: Reaper,
    active: AtomicBool,
}

impl GraphService {
    /// Validate `config`, create the data directory and start the reaper.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, the data directory cannot be
    /// created, or the reaper thread cannot be spawned. Preload failures are
    /// logged and do not fail activation.
    pub fn activate(config: ServiceConfig) -> GraphResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;

        let registry = Arc::new(SessionRegistry::new());
        let cache = Arc::new(DatabaseCache::new(
            config.data_dir.clone(),
            config.resolved_export_dir(),
            config.compression_level,
        ));
        let reaper = Reaper::start(
            Arc::clone(&registry),
            Arc::clone(&cache),
            config.reaper_interval_duration(),
            config.max_session_lifetime_duration(),
        )?;

        let service = Self {
            config,
            registry,
            cache,
            reaper,
            active: AtomicBool::new(true),
        };
        if service.config.preload_all {
            service.preload_all();
        }

        info!(
            target: "graphd::cache",
            version = Self::version(),
            data_dir = ?service.config.data_dir,
            "Service activated"
        );
        Ok(service)
    }

    fn preload_all(&self) {
        let names = match self.cache.list() {
            Ok(names) => names,
            Err(e) => {
                error!(target: "graphd::cache", error = %e, "Preload aborted: cannot list databases");
                return;
            }
        };
        for name in names {
            if let Err(e) = self.cache.preload(&name) {
                error!(target: "graphd::cache", name = %name, error = %e, "Preload aborted");
                return;
            }
        }
    }

    /// Stop the reaper and shut down every cached database. Idempotent.
    pub fn deactivate(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        self.reaper.stop();
        self.cache.shutdown_all();
        info!(target: "graphd::cache", sessions = self.registry.len(), "Service deactivated");
    }

    /// Whether the service has not been deactivated
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Crate version
    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Configuration in effect
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Session registry shared by every handle
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Database cache
    pub fn cache(&self) -> &Arc<DatabaseCache> {
        &self.cache
    }

    /// Reaper thread handle
    pub fn reaper(&self) -> &Reaper {
        &self.reaper
    }

    /// Run one reaper sweep on the calling thread
    pub fn sweep_now(&self) -> Vec<CallerId> {
        reaper::sweep(
            &self.registry,
            &self.cache,
            self.config.max_session_lifetime_duration(),
        )
    }

    fn ensure_active(&self) -> CallResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(CallError::transaction("service is not active"))
        }
    }

    /// Open (or create) `name` and return a handle carrying a fresh caller
    /// identity.
    pub fn open_or_create(&self, name: &str, context: CallerContext) -> CallResult<DbHandle> {
        self.ensure_active()?;
        let db = self.cache.open_or_create(name)?;
        Ok(DbHandle::new(
            name,
            CallerId::new(),
            context,
            db,
            Arc::clone(&self.registry),
        ))
    }

    /// Whether storage exists for `name`
    pub fn database_exists(&self, name: &str) -> CallResult<bool> {
        validate_name(name)?;
        Ok(self.cache.exists(name))
    }

    /// Whether a live instance is cached for `name`
    pub fn is_database_open(&self, name: &str) -> CallResult<bool> {
        validate_name(name)?;
        Ok(self.cache.is_open(name))
    }

    /// Shut down the instance cached for `name`
    pub fn shutdown_database(&self, name: &str) -> CallResult<()> {
        validate_name(name)?;
        self.cache.shutdown(name);
        Ok(())
    }

    /// Delete the storage of `name`; `false` if it is open or absent
    pub fn delete_database(&self, name: &str) -> CallResult<bool> {
        Ok(self.cache.delete(name)?)
    }

    /// Export `name` to a compressed archive; `None` if it is open
    pub fn export_database(&self, name: &str) -> CallResult<Option<ExportInfo>> {
        Ok(self.cache.export(name)?)
    }

    /// Names of all databases on disk
    pub fn list_databases(&self) -> CallResult<Vec<String>> {
        Ok(self.cache.list()?)
    }
}

impl Drop for GraphService {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl std::fmt::Debug for GraphService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphService")
            .field("data_dir", &self.config.data_dir)
            .field("active", &self.is_active())
            .field("sessions", &self.registry.len())
            .finish()
    }
}
