//! In-memory `RowStore` implementation.

#![allow(clippy::result_large_err)] // Error type is defined in rowmodel-core

use crate::cache::{QueryCache, cache_key};
use rowmodel_core::{
    ColumnInfo, ColumnSchema, Error, Filter, FindOptions, PRIMARY_KEY, QueryError, QueryErrorKind,
    Result, Row, RowStore, SchemaError, SchemaErrorKind, Value,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// One stored table.
#[derive(Debug, Clone)]
struct Table {
    /// Declared columns, primary key excluded
    columns: Vec<ColumnSchema>,
    /// Column layout shared by every stored row, primary key first
    layout: Arc<ColumnInfo>,
    rows: BTreeMap<i64, Row>,
    next_id: i64,
    /// Views read the rows of another table and reject writes
    view_of: Option<String>,
}

impl Table {
    fn new(columns: Vec<ColumnSchema>, view_of: Option<String>) -> Self {
        let mut names = vec![PRIMARY_KEY.to_string()];
        names.extend(columns.iter().map(|c| c.name.clone()));
        Self {
            columns,
            layout: Arc::new(ColumnInfo::new(names)),
            rows: BTreeMap::new(),
            next_id: 1,
            view_of,
        }
    }

    /// Re-lay `row` onto the table's column layout; unknown columns are an
    /// error, missing ones become NULL.
    fn normalize(&self, table: &str, row: &Row) -> Result<Row> {
        for name in row.column_names() {
            if !self.layout.contains(name) {
                return Err(Error::Schema(SchemaError {
                    kind: SchemaErrorKind::ColumnNotFound,
                    table: table.to_string(),
                    message: format!("column '{}' does not exist in '{}'", name, table),
                }));
            }
        }
        let values = self
            .layout
            .names()
            .iter()
            .map(|name| row.get(name).cloned().unwrap_or(Value::Null))
            .collect();
        Ok(Row::with_columns(Arc::clone(&self.layout), values))
    }
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, Table>,
    /// Copy of `tables` taken at `begin`, restored on `rollback`
    snapshot: Option<HashMap<String, Table>>,
    cache: QueryCache,
    /// Tables whose next write fails
    failing: HashSet<String>,
}

/// A `RowStore` keeping every table in process memory.
///
/// Tables are created with [`create_table`](Self::create_table) from
/// `(column, declared SQL type)` pairs. Transactions snapshot all tables
/// on `begin`. Reads that carry a cache TTL are served from a result cache
/// until the TTL passes or the table is written.
///
/// `MemoryStore` is `Send + Sync`, using an internal mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Recover from a poisoned lock; table data stays consistent because
        // every mutation completes before the guard is released.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a table with an implicit integer `id` primary key.
    pub fn create_table(&self, name: &str, columns: &[(&str, &str)]) -> Result<()> {
        let columns = columns
            .iter()
            .filter(|(col, _)| *col != PRIMARY_KEY)
            .map(|(col, declared)| ColumnSchema::from_declared(*col, declared))
            .collect();
        self.add_table(name, Table::new(columns, None))
    }

    /// Create a read-only view exposing the rows of `source`.
    pub fn create_view(&self, name: &str, source: &str) -> Result<()> {
        let columns = {
            let inner = self.lock();
            let table = inner
                .tables
                .get(source)
                .ok_or_else(|| Error::table_not_found(source))?;
            table.columns.clone()
        };
        self.add_table(name, Table::new(columns, Some(source.to_string())))
    }

    fn add_table(&self, name: &str, table: Table) -> Result<()> {
        let mut inner = self.lock();
        if inner.tables.contains_key(name) {
            return Err(Error::Schema(SchemaError {
                kind: SchemaErrorKind::TableExists,
                table: name.to_string(),
                message: format!("table '{}' already exists", name),
            }));
        }
        tracing::debug!(table = name, "Creating table");
        inner.tables.insert(name.to_string(), table);
        Ok(())
    }

    /// Make the next `save`, `erase` or `update_where` on `table` fail with
    /// a storage error.
    pub fn fail_next_write(&self, table: &str) {
        self.lock().failing.insert(table.to_string());
    }

    /// Number of rows currently stored in `table`.
    pub fn row_count(&self, table: &str) -> usize {
        self.lock().tables.get(table).map_or(0, |t| t.rows.len())
    }

    /// Total number of reads served from the result cache.
    pub fn cache_hits(&self) -> u64 {
        self.lock().cache.hits()
    }

    /// Is a transaction open?
    pub fn in_transaction(&self) -> bool {
        self.lock().snapshot.is_some()
    }
}

fn query_error(kind: QueryErrorKind, table: &str, message: String) -> Error {
    Error::Query(QueryError {
        kind,
        table: Some(table.to_string()),
        message,
        source: None,
    })
}

impl Inner {
    fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::table_not_found(name))
    }

    /// Resolve `name` to the table holding its rows (views read their source).
    fn source_of<'a>(&'a self, name: &'a str) -> Result<&'a str> {
        match &self.table(name)?.view_of {
            Some(source) => Ok(source.as_str()),
            None => Ok(name),
        }
    }

    fn writable(&mut self, name: &str) -> Result<&mut Table> {
        if self.failing.remove(name) {
            return Err(query_error(
                QueryErrorKind::Database,
                name,
                "injected write failure".to_string(),
            ));
        }
        self.cache.invalidate_table(name);
        let table = self
            .tables
            .get_mut(name)
            .ok_or_else(|| Error::table_not_found(name))?;
        if table.view_of.is_some() {
            return Err(query_error(
                QueryErrorKind::Constraint,
                name,
                format!("'{}' is a view and cannot be written", name),
            ));
        }
        Ok(table)
    }
}

impl RowStore for MemoryStore {
    fn schema(&self, table: &str, fields: Option<&[String]>) -> Result<Vec<ColumnSchema>> {
        let inner = self.lock();
        let columns = &inner.table(table)?.columns;
        Ok(columns
            .iter()
            .filter(|c| fields.is_none_or(|f| f.iter().any(|name| *name == c.name)))
            .cloned()
            .collect())
    }

    fn find(&self, table: &str, filter: &Filter, options: &FindOptions) -> Result<Vec<Row>> {
        let mut inner = self.lock();
        let source = inner.source_of(table)?.to_string();
        let key = cache_key(&(
            &source,
            format!("{:?}", filter),
            format!("{:?}/{:?}/{:?}", options.order, options.limit, options.offset),
        ));
        let cached = options.cache_ttl.is_some_and(|ttl| !ttl.is_zero());
        if cached {
            if let Some(rows) = inner.cache.get(key) {
                tracing::trace!(table = table, rows = rows.len(), "Served from result cache");
                return Ok(rows);
            }
        }

        let mut rows: Vec<Row> = inner
            .table(&source)?
            .rows
            .values()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect();

        if !options.order.is_empty() {
            rows.sort_by(|a, b| {
                options.order.iter().fold(std::cmp::Ordering::Equal, |acc, key| {
                    acc.then_with(|| {
                        let av = a.get(&key.column).unwrap_or(&Value::Null);
                        let bv = b.get(&key.column).unwrap_or(&Value::Null);
                        key.orient(av.sort_cmp(bv))
                    })
                })
            });
        }
        let rows: Vec<Row> = rows
            .into_iter()
            .skip(options.offset.unwrap_or(0))
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();

        tracing::trace!(table = table, rows = rows.len(), "Find");
        if let Some(ttl) = options.cache_ttl.filter(|_| cached) {
            inner.cache.insert(key, &source, &rows, ttl);
        }
        Ok(rows)
    }

    fn count(&self, table: &str, filter: &Filter) -> Result<u64> {
        let inner = self.lock();
        let source = inner.source_of(table)?;
        Ok(inner
            .table(source)?
            .rows
            .values()
            .filter(|row| filter.matches(row))
            .count() as u64)
    }

    fn save(&self, table: &str, row: &mut Row) -> Result<()> {
        let mut inner = self.lock();
        let stored = inner.writable(table)?;
        let mut normalized = stored.normalize(table, row)?;
        let id = match row.id() {
            Some(id) => {
                if id >= stored.next_id {
                    stored.next_id = id + 1;
                }
                id
            }
            None => {
                let id = stored.next_id;
                stored.next_id += 1;
                normalized.set(PRIMARY_KEY, Value::BigInt(id));
                row.set(PRIMARY_KEY, Value::BigInt(id));
                id
            }
        };
        tracing::trace!(table = table, id = id, "Save");
        stored.rows.insert(id, normalized);
        Ok(())
    }

    fn erase(&self, table: &str, row: &Row) -> Result<()> {
        let mut inner = self.lock();
        let stored = inner.writable(table)?;
        let Some(id) = row.id() else {
            return Err(query_error(
                QueryErrorKind::NotFound,
                table,
                "cannot erase a row without primary key".to_string(),
            ));
        };
        if stored.rows.remove(&id).is_none() {
            return Err(query_error(
                QueryErrorKind::NotFound,
                table,
                format!("no row with id {}", id),
            ));
        }
        tracing::trace!(table = table, id = id, "Erase");
        Ok(())
    }

    fn update_where(&self, table: &str, filter: &Filter, values: &[(String, Value)]) -> Result<u64> {
        let mut inner = self.lock();
        let stored = inner.writable(table)?;
        if let Some((missing, _)) = values.iter().find(|(col, _)| !stored.layout.contains(col)) {
            return Err(Error::Schema(SchemaError {
                kind: SchemaErrorKind::ColumnNotFound,
                table: table.to_string(),
                message: format!("column '{}' does not exist in '{}'", missing, table),
            }));
        }
        let mut touched = 0;
        for row in stored.rows.values_mut().filter(|row| filter.matches(row)) {
            for (col, value) in values {
                row.set(col, value.clone());
            }
            touched += 1;
        }
        tracing::trace!(table = table, touched = touched, "Update where");
        Ok(touched)
    }

    fn begin(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.snapshot.is_some() {
            return Err(query_error(
                QueryErrorKind::Transaction,
                "",
                "transaction already open".to_string(),
            ));
        }
        let snapshot = inner.tables.clone();
        inner.snapshot = Some(snapshot);
        tracing::trace!("BEGIN");
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.snapshot.take().is_none() {
            return Err(query_error(
                QueryErrorKind::Transaction,
                "",
                "commit without open transaction".to_string(),
            ));
        }
        tracing::trace!("COMMIT");
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut inner = self.lock();
        match inner.snapshot.take() {
            Some(tables) => {
                inner.tables = tables;
                inner.cache.clear();
                tracing::trace!("ROLLBACK");
                Ok(())
            }
            None => Err(query_error(
                QueryErrorKind::Transaction,
                "",
                "rollback without open transaction".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowmodel_core::{OrderBy, transaction};
    use std::time::Duration;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .create_table("people", &[("name", "VARCHAR(20)"), ("age", "INTEGER")])
            .unwrap();
        store
    }

    fn insert(store: &MemoryStore, name: &str, age: i64) -> i64 {
        let mut row = Row::from_pairs([("name", Value::from(name)), ("age", Value::from(age))]);
        store.save("people", &mut row).unwrap();
        row.id().unwrap()
    }

    #[test]
    fn test_schema_excludes_primary_key() {
        let store = store();
        let cols = store.schema("people", None).unwrap();
        let names: Vec<_> = cols.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["name", "age"]);
        assert_eq!(cols[0].char_limit, Some(20));

        let only = store.schema("people", Some(&["age".to_string()])).unwrap();
        assert_eq!(only.len(), 1);

        assert!(matches!(
            store.schema("ghosts", None),
            Err(Error::Schema(SchemaError {
                kind: SchemaErrorKind::TableNotFound,
                ..
            }))
        ));
    }

    #[test]
    fn test_save_assigns_ids_and_updates() {
        let store = store();
        let a = insert(&store, "Ann", 30);
        let b = insert(&store, "Bob", 40);
        assert_eq!((a, b), (1, 2));

        let mut row = store
            .find_one("people", &Filter::eq("id", a), &FindOptions::default())
            .unwrap()
            .unwrap();
        row.set("age", Value::from(31_i64));
        store.save("people", &mut row).unwrap();

        assert_eq!(store.row_count("people"), 2);
        let again = store
            .find_one("people", &Filter::eq("id", a), &FindOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(again.get("age"), Some(&Value::BigInt(31)));
    }

    #[test]
    fn test_unknown_column_rejected() {
        let store = store();
        let mut row = Row::from_pairs([("shoe_size", Value::from(44_i64))]);
        assert!(store.save("people", &mut row).is_err());
    }

    #[test]
    fn test_find_order_limit_offset() {
        let store = store();
        insert(&store, "Cid", 20);
        insert(&store, "Ann", 20);
        insert(&store, "Bob", 10);

        let opts = FindOptions::new()
            .order(vec![OrderBy::asc("age"), OrderBy::desc("name")])
            .offset(1)
            .limit(1);
        let rows = store.find("people", &Filter::All, &opts).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&Value::from("Cid")));
    }

    #[test]
    fn test_update_where_and_erase() {
        let store = store();
        let a = insert(&store, "Ann", 20);
        insert(&store, "Bob", 20);

        let n = store
            .update_where(
                "people",
                &Filter::eq("age", 20_i64),
                &[("age".to_string(), Value::Null)],
            )
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(store.count("people", &Filter::is_null("age")).unwrap(), 2);

        let row = Row::from_pairs([("id", Value::BigInt(a))]);
        store.erase("people", &row).unwrap();
        assert!(store.erase("people", &row).is_err());
        assert_eq!(store.row_count("people"), 1);
    }

    #[test]
    fn test_rollback_restores_tables() {
        let store = store();
        insert(&store, "Ann", 20);

        let result: Result<()> = transaction(&store, || {
            insert(&store, "Bob", 30);
            Err(Error::Custom("abort".to_string()))
        });

        assert!(result.is_err());
        assert!(!store.in_transaction());
        assert_eq!(store.row_count("people"), 1);

        transaction(&store, || {
            insert(&store, "Cid", 30);
            Ok(())
        })
        .unwrap();
        assert_eq!(store.row_count("people"), 2);
    }

    #[test]
    fn test_cached_reads_invalidate_on_write() {
        let store = store();
        insert(&store, "Ann", 20);
        let opts = FindOptions::new().cache_ttl(Duration::from_secs(60));

        assert_eq!(store.find("people", &Filter::All, &opts).unwrap().len(), 1);
        assert_eq!(store.find("people", &Filter::All, &opts).unwrap().len(), 1);
        assert_eq!(store.cache_hits(), 1);

        insert(&store, "Bob", 30);
        assert_eq!(store.find("people", &Filter::All, &opts).unwrap().len(), 2);
    }

    #[test]
    fn test_view_reads_source_and_rejects_writes() {
        let store = store();
        insert(&store, "Ann", 20);
        store.create_view("adults", "people").unwrap();

        assert_eq!(
            store
                .find("adults", &Filter::All, &FindOptions::default())
                .unwrap()
                .len(),
            1
        );
        let mut row = Row::from_pairs([("name", Value::from("Bob"))]);
        assert!(store.save("adults", &mut row).is_err());
    }

    #[test]
    fn test_injected_failure_is_one_shot() {
        let store = store();
        store.fail_next_write("people");
        let mut row = Row::from_pairs([("name", Value::from("Ann"))]);
        assert!(matches!(
            store.save("people", &mut row),
            Err(Error::Query(QueryError {
                kind: QueryErrorKind::Database,
                ..
            }))
        ));
        store.save("people", &mut row).unwrap();
    }
}
