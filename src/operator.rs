//! Thin insert/delete entry points for operator code (spec §4.7).
//!
//! These add no behavior beyond [`crate::buffer_pool::BufferPool`]'s own
//! `insert_tuple`/`delete_tuple` -- they exist only so call sites outside
//! the core (and this crate's integration tests) have a free function to
//! call instead of reaching through a `DatabaseContext` by hand every time.

use crate::{
    context::DatabaseContext, error::DbResult, ids::RecordId, ids::TableId, transaction::TransactionId,
    tuple::Tuple,
};

pub fn insert(ctx: &DatabaseContext, tid: TransactionId, table_id: TableId, tuple: Tuple) -> DbResult<RecordId> {
    ctx.buffer_pool().insert_tuple(tid, table_id, tuple)
}

pub fn delete(ctx: &DatabaseContext, tid: TransactionId, record_id: RecordId) -> DbResult<()> {
    ctx.buffer_pool().delete_tuple(tid, record_id)
}
