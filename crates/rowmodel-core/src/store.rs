//! The row-storage abstraction the model layer is built on.
//!
//! - [`RowStore`] - per-table reads and writes plus schema introspection
//! - [`transaction`] - run a closure between `begin` and `commit`, rolling
//!   back on any error
//!
//! Implementations are synchronous. The model layer assumes one logical
//! caller per store at a time and performs no locking of its own.

use crate::error::Result;
use crate::filter::{Filter, FindOptions};
use crate::row::Row;
use crate::schema::ColumnSchema;
use crate::value::Value;

/// A table-oriented storage backend.
///
/// Every table is expected to carry an integer primary key column named
/// [`PRIMARY_KEY`](crate::PRIMARY_KEY) which the store assigns on first
/// save.
pub trait RowStore: Send + Sync {
    /// Describe the columns of `table`, excluding the primary key.
    ///
    /// When `fields` is given only those columns are reported. Fails with
    /// a `Schema` error of kind `TableNotFound` if the table does not exist.
    fn schema(&self, table: &str, fields: Option<&[String]>) -> Result<Vec<ColumnSchema>>;

    /// Return the rows of `table` matching `filter`, honoring the order,
    /// limit and offset in `options`.
    fn find(&self, table: &str, filter: &Filter, options: &FindOptions) -> Result<Vec<Row>>;

    /// Return the first matching row, if any.
    fn find_one(&self, table: &str, filter: &Filter, options: &FindOptions) -> Result<Option<Row>> {
        let options = FindOptions {
            limit: Some(1),
            ..options.clone()
        };
        Ok(self.find(table, filter, &options)?.into_iter().next())
    }

    /// Is there at least one matching row?
    fn exists(&self, table: &str, filter: &Filter) -> Result<bool> {
        Ok(self.find_one(table, filter, &FindOptions::default())?.is_some())
    }

    /// Number of matching rows.
    fn count(&self, table: &str, filter: &Filter) -> Result<u64> {
        Ok(self.find(table, filter, &FindOptions::default())?.len() as u64)
    }

    /// Insert the row if it has no primary key (assigning one into `row`),
    /// otherwise overwrite the stored row. Last write wins.
    fn save(&self, table: &str, row: &mut Row) -> Result<()>;

    /// Remove the row with the primary key of `row`.
    fn erase(&self, table: &str, row: &Row) -> Result<()>;

    /// Assign `values` to every row matching `filter`; returns the number
    /// of rows touched.
    fn update_where(&self, table: &str, filter: &Filter, values: &[(String, Value)]) -> Result<u64>;

    /// Begin a transaction. The default does nothing.
    fn begin(&self) -> Result<()> {
        Ok(())
    }

    /// Commit the present transaction. The default does nothing.
    fn commit(&self) -> Result<()> {
        Ok(())
    }

    /// Roll back the present transaction. The default does nothing.
    fn rollback(&self) -> Result<()> {
        Ok(())
    }
}

/// Wrap `action` in a transaction on `store` and ensure `ROLLBACK` on any
/// error, not only storage errors.
///
/// Returns what `action` returns. If the commit itself fails, a rollback is
/// attempted and the commit error is returned.
pub fn transaction<S, T, F>(store: &S, action: F) -> Result<T>
where
    S: RowStore + ?Sized,
    F: FnOnce() -> Result<T>,
{
    store.begin()?;
    match action() {
        Ok(value) => match store.commit() {
            Ok(()) => Ok(value),
            Err(commit_err) => {
                if let Err(rollback_err) = store.rollback() {
                    tracing::warn!(error = %rollback_err, "rollback after failed commit also failed");
                }
                Err(commit_err)
            }
        },
        Err(err) => {
            if let Err(rollback_err) = store.rollback() {
                tracing::warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
