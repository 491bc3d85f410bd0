//! Transactional resource seam.
//!
//! Messages declared transactional are handled inside a transaction opened on
//! a named resource (typically a database connection). Connection lifecycle
//! is owned by the application; Courier only drives begin/commit/rollback.

use crate::error::BoxError;
use crate::BoxFuture;

/// Begins, commits and rolls back transactions on one resource.
pub trait TransactionManager: Send + Sync {
    /// Opens a transaction.
    fn begin(&self) -> BoxFuture<'_, Result<(), BoxError>>;

    /// Commits the open transaction.
    fn commit(&self) -> BoxFuture<'_, Result<(), BoxError>>;

    /// Rolls back the open transaction.
    fn rollback(&self) -> BoxFuture<'_, Result<(), BoxError>>;
}
