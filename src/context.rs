//! Shared handle to a running database instance (spec §9 REDESIGN FLAGS,
//! "Shared mutable globals").
//!
//! The teacher codebase reaches the buffer pool and catalog through
//! `Database::global()`, a process-wide `OnceCell` singleton. That pattern
//! makes it impossible to run two independent databases in one process
//! (every integration test in this crate needs exactly that, since each
//! test opens its own temp-dir-backed tables) and hides the dependency from
//! every function signature that uses it. `DatabaseContext` replaces the
//! singleton with an explicit, `Arc`-shared value: operators take one at
//! construction time instead of reaching for a static.

use std::path::Path;
use std::sync::Arc;

use crate::{buffer_pool::BufferPool, config::Config, error::DbResult, ids::TableId, TupleDesc};

/// Everything operator code needs to talk to the storage core: the buffer
/// pool (which itself owns the lock manager and catalog) plus the config it
/// was built with.
pub struct DatabaseContext {
    buffer_pool: BufferPool,
    config: Config,
}

impl DatabaseContext {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            buffer_pool: BufferPool::new(config),
            config,
        })
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }

    pub fn config(&self) -> Config {
        self.config
    }

    /// Open (creating if absent) a heap file at `path` and register it in
    /// the catalog, using this context's configured page size.
    pub fn open_table(&self, path: &Path, tuple_desc: TupleDesc) -> DbResult<TableId> {
        self.buffer_pool.open_table(path, tuple_desc, self.config.page_size())
    }
}

impl Default for DatabaseContext {
    fn default() -> Self {
        Self {
            buffer_pool: BufferPool::new(Config::default()),
            config: Config::default(),
        }
    }
}
