//! In-memory table registry (spec §4.6).
//!
//! Generalizes `btree/catalog.rs`'s `HashMap<table_id, Rc<RefCell<BTreeFile>>>`
//! to hold `Arc`-shared, thread-safe handles instead (this core is accessed
//! from multiple transaction threads at once, unlike the single-threaded
//! B-tree layer it's modeled on), and adds the tuple desc alongside the
//! file since callers need both to interpret a table's pages.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{heap_file::HeapFile, ids::TableId, TupleDesc};

#[derive(Default)]
pub struct Catalog {
    tables: HashMap<TableId, (Arc<HeapFile>, Arc<TupleDesc>)>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table. Panics if `table_id` is already registered to a
    /// different heap file -- two different paths hashing to the same
    /// table id is a programmer error, not a recoverable `DbError`.
    pub fn add_table(&mut self, heap_file: Arc<HeapFile>, tuple_desc: Arc<TupleDesc>) {
        let table_id = heap_file.table_id();
        if let Some((existing, _)) = self.tables.get(&table_id) {
            assert!(
                Arc::ptr_eq(existing, &heap_file),
                "table id {:x} already registered to a different heap file",
                table_id
            );
            return;
        }
        self.tables.insert(table_id, (heap_file, tuple_desc));
    }

    pub fn heap_file(&self, table_id: TableId) -> Option<Arc<HeapFile>> {
        self.tables.get(&table_id).map(|(f, _)| Arc::clone(f))
    }

    pub fn tuple_desc(&self, table_id: TableId) -> Option<Arc<TupleDesc>> {
        self.tables.get(&table_id).map(|(_, d)| Arc::clone(d))
    }
}
