//! Error kinds for the storage core (spec §7).
//!
//! Kept hand-rolled rather than built on a derive-macro crate, matching the
//! rest of this codebase's `SimpleError`-style error handling; the only
//! addition is a `kind()` tag so callers can match on error category instead
//! of parsing the message, and an on-demand backtrace for the cases that
//! cross a transaction boundary.

use std::{error::Error, fmt};

use backtrace::Backtrace;

/// Classification of a [`DbError`], mirroring the "Kinds" list in spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// Disk read/write failure.
    IoError,
    /// Page number out of range of the backing file.
    InvalidPage,
    /// Insert of a tuple whose shape doesn't match the page's tuple desc.
    SchemaMismatch,
    /// No empty slot in the target page (internal; callers convert this
    /// into "allocate a new page").
    DbFull,
    /// Deleting a tuple whose slot bit is already unset.
    NotFound,
    /// Every cached page is dirty; NO STEAL forbids evicting any of them.
    NoCleanPageToEvict,
    /// A cycle was found in the wait-for graph; this transaction is the
    /// victim.
    DeadlockAbort,
    /// Caller-visible rollup raised when an operation is attempted on
    /// behalf of a transaction that has already aborted.
    TransactionAborted,
}

impl fmt::Display for DbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DbErrorKind::IoError => "io error",
            DbErrorKind::InvalidPage => "invalid page",
            DbErrorKind::SchemaMismatch => "schema mismatch",
            DbErrorKind::DbFull => "page full",
            DbErrorKind::NotFound => "not found",
            DbErrorKind::NoCleanPageToEvict => "no clean page to evict",
            DbErrorKind::DeadlockAbort => "deadlock detected, transaction aborted",
            DbErrorKind::TransactionAborted => "transaction aborted",
        };
        write!(f, "{}", s)
    }
}

/// The storage core's single error type.
pub struct DbError {
    kind: DbErrorKind,
    details: String,
    backtrace: Backtrace,
}

impl DbError {
    pub fn new(kind: DbErrorKind, details: impl Into<String>) -> Self {
        Self {
            kind,
            details: details.into(),
            backtrace: Backtrace::new_unresolved(),
        }
    }

    pub fn io(details: impl Into<String>) -> Self {
        Self::new(DbErrorKind::IoError, details)
    }

    pub fn invalid_page(details: impl Into<String>) -> Self {
        Self::new(DbErrorKind::InvalidPage, details)
    }

    pub fn schema_mismatch(details: impl Into<String>) -> Self {
        Self::new(DbErrorKind::SchemaMismatch, details)
    }

    pub fn db_full(details: impl Into<String>) -> Self {
        Self::new(DbErrorKind::DbFull, details)
    }

    pub fn not_found(details: impl Into<String>) -> Self {
        Self::new(DbErrorKind::NotFound, details)
    }

    pub fn no_clean_page_to_evict(details: impl Into<String>) -> Self {
        Self::new(DbErrorKind::NoCleanPageToEvict, details)
    }

    pub fn deadlock(details: impl Into<String>) -> Self {
        Self::new(DbErrorKind::DeadlockAbort, details)
    }

    pub fn transaction_aborted(details: impl Into<String>) -> Self {
        Self::new(DbErrorKind::TransactionAborted, details)
    }

    pub fn kind(&self) -> DbErrorKind {
        self.kind
    }

    /// Log the captured backtrace at error level. Called at the points
    /// where an error crosses a transaction boundary, matching this
    /// codebase's `err.show_backtrace()` convention.
    pub fn show_backtrace(&self) {
        let mut bt = self.backtrace.clone();
        bt.resolve();
        log::error!("{}\n{:?}", self.details, bt);
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.details)
    }
}

impl fmt::Debug for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DbError {{ kind: {:?}, details: {:?} }}",
            self.kind, self.details
        )
    }
}

impl Error for DbError {}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        DbError::io(e.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_details() {
        let e = DbError::not_found("record 3 not present");
        assert_eq!(e.kind(), DbErrorKind::NotFound);
        assert!(format!("{}", e).contains("not found"));
        assert!(format!("{}", e).contains("record 3 not present"));
    }
}
