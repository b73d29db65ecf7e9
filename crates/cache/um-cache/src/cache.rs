//! Published macro cache shared by one writer and many readers

use crate::change::ChangeSet;
use crate::config::CacheConfig;
use crate::entity::UserMacro;
use crate::error::ResolveError;
use crate::manager::Manager;
use crate::resolve::resolve;
use crate::sync::{SyncEngine, SyncResult};
use crate::HostId;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use um_intern::StringPool;

/// Writer-side state, locked for the duration of a sync
struct Writer {
    engine: SyncEngine,
    syncs: u64,
}

/// Current macro snapshot plus the engine that replaces it
///
/// Readers never block: [`MacroCache::checkout`] pins the snapshot that is
/// current at that moment and keeps it alive until the returned `Arc` is
/// dropped. Syncs are serialized by an internal lock.
pub struct MacroCache {
    current: ArcSwap<Manager>,
    writer: Mutex<Writer>,
    pool: StringPool,
    config: CacheConfig,
}

impl MacroCache {
    /// Creates an empty cache
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self::with_pool(config, StringPool::new())
    }

    /// Creates an empty cache interning into an existing pool
    #[must_use]
    pub fn with_pool(config: CacheConfig, pool: StringPool) -> Self {
        let engine = SyncEngine::with_capacity(pool.clone(), config.initial_host_capacity);
        Self {
            current: ArcSwap::from_pointee(Manager::new()),
            writer: Mutex::new(Writer { engine, syncs: 0 }),
            pool,
            config,
        }
    }

    /// Pins the current snapshot; drop the `Arc` to release it
    #[must_use]
    pub fn checkout(&self) -> Arc<Manager> {
        self.current.load_full()
    }

    /// Applies `changes` and publishes the resulting snapshot
    ///
    /// Readers that checked out earlier keep seeing the previous snapshot.
    pub fn sync(&self, changes: &ChangeSet) -> SyncResult {
        let mut writer = self.writer.lock();

        let previous = self.current.load_full();
        let result = writer.engine.apply(Some(previous), changes);
        self.current.store(Arc::clone(&result.manager));
        debug!(
            hosts = result.manager.len(),
            macros = result.manager.macro_count(),
            "published macro snapshot"
        );

        writer.syncs += 1;
        let interval = u64::from(self.config.string_purge_interval);
        if interval != 0 && writer.syncs % interval == 0 {
            let evicted = self.pool.purge();
            debug!(evicted, remaining = self.pool.len(), "purged macro strings");
        }

        result
    }

    /// Resolves `raw_token` for `host_ids` against the current snapshot
    ///
    /// # Errors
    ///
    /// See [`resolve`].
    pub fn resolve(&self, host_ids: &[HostId], raw_token: &str) -> Result<Arc<UserMacro>, ResolveError> {
        let snapshot = self.current.load();
        resolve(&snapshot, host_ids, raw_token).map(Arc::clone)
    }

    /// String pool backing this cache
    #[must_use]
    pub fn pool(&self) -> &StringPool {
        &self.pool
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl fmt::Debug for MacroCache {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MacroCache")
            .field("hosts", &self.current.load().len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
