//! Transactional storage core of a teaching relational database: a
//! page-granularity buffer cache, a multi-mode lock manager with deadlock
//! detection, a slotted-row heap-file page format, and transaction
//! commit/abort under NO STEAL / FORCE.
//!
//! The catalog, the query planner, a SQL front-end, and crash recovery
//! (write-ahead logging) are out of scope; see `SPEC_FULL.md` for the full
//! boundary. What's here is enough for a thin scan/insert/delete operator
//! layer to sit directly on top of the buffer pool, which is this crate's
//! only supported entry point for anything outside the core.

pub mod buffer_pool;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod field;
pub mod heap_file;
pub mod ids;
pub mod lock_manager;
pub mod lru;
pub mod operator;
pub mod page;
pub mod predicate;
pub mod sequential_scan;
pub mod transaction;
pub mod tuple;
pub mod wait_for_graph;

pub use config::Config;
pub use context::DatabaseContext;
pub use error::{DbError, DbErrorKind, DbResult};
pub use field::{Field, FieldItem, TupleDesc, Type};
pub use ids::{PageId, RecordId, TableId};
pub use lock_manager::LockMode;
pub use predicate::{Op, Predicate};
pub use sequential_scan::SequentialScan;
pub use transaction::{Transaction, TransactionId, TransactionManager};
pub use tuple::Tuple;
