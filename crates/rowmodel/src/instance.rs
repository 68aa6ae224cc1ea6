//! Model instances: one row plus its attribute and association caches.

use crate::association::{AccessorOp, HasMany};
use crate::cascade;
use crate::codec::Slot;
use crate::factory::Factory;
use rowmodel_core::{
    Error, Filter, FindOptions, FromValue, PRIMARY_KEY, QueryError, QueryErrorKind,
    RestrictConflict, Result, Row, SchemaError, SchemaErrorKind, ValidationError, Value,
};
use serde_json::Value as Json;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

static NULL: Value = Value::Null;

/// Where an instance is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Not stored yet.
    New,
    Persisted,
    Deleted,
}

/// Result of a synthesized accessor call.
#[derive(Debug)]
pub enum Related<'a> {
    /// `find<Name>` / `sorted<Name>`
    Many(&'a [Instance]),
    /// `new<Name>`
    New(Instance),
}

/// The live representation of one row.
pub struct Instance {
    factory: Arc<Factory>,
    row: Row,
    state: InstanceState,
    /// Decoded JSON columns; absent means not decoded yet.
    attrs: HashMap<String, Slot>,
    /// Association results, keyed by accessor and filter.
    related: HashMap<String, Vec<Instance>>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("model", &self.factory.name())
            .field("state", &self.state)
            .field("row", &self.row)
            .field("attrs", &self.attrs)
            .finish_non_exhaustive()
    }
}

/// Reads that must see the store as it is now.
fn fresh() -> FindOptions {
    FindOptions::new().cache_ttl(Duration::ZERO)
}

impl Instance {
    pub(crate) fn new(factory: Arc<Factory>) -> Self {
        Self {
            factory,
            row: Row::default(),
            state: InstanceState::New,
            attrs: HashMap::new(),
            related: HashMap::new(),
        }
    }

    pub(crate) fn from_row(factory: Arc<Factory>, row: Row) -> Self {
        Self {
            factory,
            row,
            state: InstanceState::Persisted,
            attrs: HashMap::new(),
            related: HashMap::new(),
        }
    }

    pub fn factory(&self) -> &Arc<Factory> {
        &self.factory
    }

    /// Name of the model this instance belongs to.
    pub fn model(&self) -> &str {
        self.factory.name()
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn row(&self) -> &Row {
        &self.row
    }

    /// The primary key, once stored.
    pub fn id(&self) -> Option<i64> {
        self.row.id()
    }

    /// Raw column value; NULL for columns never set.
    pub fn value(&self, column: &str) -> &Value {
        self.row.get(column).unwrap_or(&NULL)
    }

    /// Typed column value.
    pub fn get<T: FromValue>(&self, column: &str) -> Result<T> {
        T::from_value(self.value(column))
    }

    /// Set a column. JSON and object attributes go through the codec;
    /// other names must be columns of the model.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if self.factory.codec().contains(column) {
            return self.set_attr(column, value.to_json());
        }
        if column == PRIMARY_KEY {
            return Err(Error::config(
                self.factory.name(),
                "the primary key is assigned by the store",
            ));
        }
        if !self.factory.has_column(column) {
            return Err(Error::Schema(SchemaError {
                kind: SchemaErrorKind::ColumnNotFound,
                table: self.factory.table().to_string(),
                message: format!("'{}' is not a column of {}", column, self.factory.name()),
            }));
        }
        self.row.set(column, value);
        Ok(())
    }

    /// Set several columns.
    pub fn fill<I, K>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (column, value) in values {
            self.set(&column.into(), value)?;
        }
        Ok(())
    }

    /// Decode `name` into the attribute cache if it is not there yet.
    pub(crate) fn load_attr(&mut self, name: &str) -> Result<&mut Slot> {
        if !self.attrs.contains_key(name) {
            let value = self.factory.codec().decode(name, self.row.get(name))?;
            self.attrs.insert(
                name.to_string(),
                Slot {
                    value,
                    modified: false,
                },
            );
        }
        self.attrs
            .get_mut(name)
            .ok_or_else(|| Error::Custom(format!("attribute '{}' vanished from cache", name)))
    }

    /// Logical value of a JSON or object attribute.
    pub fn attr(&mut self, name: &str) -> Result<Json> {
        Ok(self.load_attr(name)?.value.get())
    }

    /// Set a JSON or object attribute. The column itself is written on
    /// `store`.
    pub fn set_attr(&mut self, name: &str, value: Json) -> Result<()> {
        self.load_attr(name)?;
        let current = self.attrs.remove(name).map(|slot| slot.value);
        let value = self.factory.codec().set(name, current, value)?;
        self.attrs.insert(
            name.to_string(),
            Slot {
                value,
                modified: true,
            },
        );
        Ok(())
    }

    /// Has `name` been set since it was loaded or stored?
    pub fn is_attr_modified(&self, name: &str) -> bool {
        self.attrs.get(name).is_some_and(|slot| slot.modified)
    }

    /// Forget decoded attributes and association results.
    pub fn clear_attrs(&mut self) {
        self.attrs.clear();
        self.related.clear();
    }

    /// Re-read the row from the store and clear all caches.
    pub fn reload(&mut self) -> Result<()> {
        let Some(id) = self.id() else {
            return Err(Error::config(self.model(), "cannot reload an unsaved instance"));
        };
        let row = self
            .factory
            .store()
            .find_one(self.factory.table(), &Filter::eq(PRIMARY_KEY, id), &fresh())?
            .ok_or_else(|| {
                Error::Query(QueryError {
                    kind: QueryErrorKind::NotFound,
                    table: Some(self.factory.table().to_string()),
                    message: format!("no row with id {}", id),
                    source: None,
                })
            })?;
        self.row = row;
        self.state = InstanceState::Persisted;
        self.clear_attrs();
        Ok(())
    }

    /// Everything that currently prevents storing: the model hook's
    /// messages, those of every object attribute, and any belongs-to key
    /// naming a row that does not exist. Hook failures are recorded as
    /// faults.
    pub fn errors_preventing_store(&mut self) -> ValidationError {
        let mut errors = ValidationError::new();
        let factory = Arc::clone(&self.factory);
        if let Some(hooks) = factory.hooks() {
            match hooks.errors_preventing_store(self) {
                Ok(messages) => {
                    for message in messages {
                        errors.add_model_error(message);
                    }
                }
                Err(e) => errors.add_fault("__model__", &e),
            }
        }
        for name in factory.codec().object_names() {
            match self.load_attr(name) {
                Ok(slot) => slot.value.collect_errors(name, &mut errors),
                Err(e) => errors.add_fault(name, &e),
            }
        }
        for assoc in factory.belongs_to() {
            let key = self.value(&assoc.foreign_key);
            if key.is_null() {
                continue;
            }
            let Some(id) = key.as_i64() else {
                errors.add_custom(
                    &assoc.foreign_key,
                    format!("'{}' is not a valid {} id", assoc.foreign_key, assoc.remote_model),
                );
                continue;
            };
            match factory.remote(&assoc.remote_model).and_then(|r| r.row_exists(id)) {
                Ok(true) => {}
                Ok(false) => errors.add_custom(
                    &assoc.foreign_key,
                    format!("{} {} does not exist", assoc.remote_model, id),
                ),
                Err(e) => errors.add_fault(&assoc.foreign_key, &e),
            }
        }
        errors
    }

    /// Validate and persist the row.
    ///
    /// Validation problems come back as `Error::Validation` without
    /// touching the store; `dry_run` stops after validation. Otherwise the
    /// JSON attributes are encoded, sized text columns truncated and the
    /// row saved, all in one transaction.
    #[tracing::instrument(level = "debug", skip(self), fields(model = %self.factory.name(), id = ?self.id()))]
    pub fn store(&mut self, dry_run: bool) -> Result<()> {
        if self.factory.is_view() {
            return Err(Error::config(self.model(), "cannot store into a view"));
        }
        if self.state == InstanceState::Deleted {
            return Err(Error::config(self.model(), "cannot store a deleted instance"));
        }
        let errors = self.errors_preventing_store();
        if !errors.is_empty() {
            tracing::debug!(errors = errors.len(), "Store refused");
            return Err(Error::Validation(errors));
        }
        if dry_run {
            return Ok(());
        }
        let registry = self.factory.registry()?;
        registry.transaction(|| self.persist())
    }

    fn persist(&mut self) -> Result<()> {
        let factory = Arc::clone(&self.factory);
        for (name, slot) in &mut self.attrs {
            let encoded = factory.codec().to_store(&mut slot.value)?;
            self.row.set(name, encoded);
            slot.modified = false;
        }

        for column in factory.columns() {
            let Some(limit) = column.char_limit else {
                continue;
            };
            if factory.codec().contains(&column.name) {
                continue;
            }
            let truncated = match self.row.get(&column.name) {
                Some(Value::Text(text)) if text.chars().count() > limit => {
                    Some(text.chars().take(limit).collect::<String>())
                }
                _ => None,
            };
            if let Some(text) = truncated {
                tracing::trace!(column = %column.name, limit = limit, "Truncating");
                self.row.set(&column.name, Value::Text(text));
            }
        }

        factory.store().save(factory.table(), &mut self.row)?;
        self.state = InstanceState::Persisted;
        tracing::trace!(model = %factory.name(), id = ?self.id(), "Saved");
        Ok(())
    }

    /// Write `values` straight to the stored row, skipping validation and
    /// the attribute codec. JSON columns take their raw text and drop any
    /// decoded value. On error the instance is unchanged.
    pub fn update_columns(&mut self, values: &[(&str, Value)]) -> Result<()> {
        if self.factory.is_view() {
            return Err(Error::config(self.model(), "cannot update a view"));
        }
        if self.state != InstanceState::Persisted {
            return Err(Error::config(self.model(), "only stored rows can be updated"));
        }
        let id = self.require_id("updating columns")?;
        let mut changes = Vec::with_capacity(values.len());
        for (column, value) in values {
            if *column == PRIMARY_KEY || !self.factory.has_column(column) {
                return Err(Error::Schema(SchemaError {
                    kind: SchemaErrorKind::ColumnNotFound,
                    table: self.factory.table().to_string(),
                    message: format!("'{}' is not an updatable column of {}", column, self.model()),
                }));
            }
            changes.push((column.to_string(), value.clone()));
        }
        if changes.is_empty() {
            return Ok(());
        }
        let updated = self.factory.store().update_where(
            self.factory.table(),
            &Filter::eq(PRIMARY_KEY, id),
            &changes,
        )?;
        if updated == 0 {
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::NotFound,
                table: Some(self.factory.table().to_string()),
                message: format!("no row with id {}", id),
                source: None,
            }));
        }
        for (column, value) in changes {
            self.attrs.remove(&column);
            self.row.set(&column, value);
        }
        tracing::debug!(model = %self.model(), id = id, "Updated columns");
        Ok(())
    }

    /// Put back what a failed batch changed.
    pub(crate) fn restore(&mut self, row: Row, state: InstanceState) {
        self.row = row;
        self.state = state;
    }

    /// Delete the row, handling has-many children by their policy.
    ///
    /// Without `force`, any `Restrict` association with referencing rows
    /// anywhere along the cascade tree fails the call with
    /// `Error::Restricted` and nothing is deleted. With `force`, restricted
    /// children are deleted too. Never-stored instances are a no-op.
    #[tracing::instrument(level = "debug", skip(self), fields(model = %self.factory.name(), id = ?self.id()))]
    pub fn delete(&mut self, force: bool) -> Result<()> {
        if self.factory.is_view() {
            return Err(Error::config(self.model(), "cannot delete from a view"));
        }
        if self.state == InstanceState::Deleted {
            return Ok(());
        }
        let Some(id) = self.id() else {
            return Ok(());
        };
        let factory = Arc::clone(&self.factory);
        let registry = factory.registry()?;
        let deleted = registry.transaction(|| {
            if !force {
                if let Some(path) = cascade::restrict_probe(&factory, id)? {
                    tracing::debug!(path = ?path, "Delete restricted");
                    return Err(Error::Restricted(RestrictConflict {
                        model: factory.name().to_string(),
                        path,
                    }));
                }
            }
            let mut visited = HashSet::new();
            cascade::delete_tree(self, force, &mut visited)?;
            Ok(visited.len())
        })?;
        tracing::info!(
            model = %factory.name(),
            id = id,
            rows = deleted,
            force = force,
            "Deleted"
        );
        Ok(())
    }

    /// Release every object attribute, loading those not decoded yet.
    pub(crate) fn release_object_attrs(&mut self) -> Result<()> {
        let factory = Arc::clone(&self.factory);
        for name in factory.codec().object_names() {
            self.load_attr(name)?.value.delete()?;
        }
        Ok(())
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.state = InstanceState::Deleted;
        self.related.clear();
    }

    fn require_id(&self, action: &str) -> Result<i64> {
        self.id().ok_or_else(|| {
            Error::config(
                self.model(),
                format!("instance must be stored before {}", action),
            )
        })
    }

    /// Rows of association `assoc` for this instance.
    fn load_related(&self, assoc: &HasMany, filter: &Filter, sorted: bool) -> Result<Vec<Instance>> {
        let Some(id) = self.id() else {
            return Ok(Vec::new());
        };
        let remote = self.factory.remote(&assoc.remote_model)?;
        let options = FindOptions::default();

        let (Some(join_model), Some(remote_key)) = (&assoc.through, &assoc.remote_key) else {
            let filter = Filter::eq(assoc.foreign_key.as_str(), id).and(filter.clone());
            return if sorted {
                remote.sorted(&filter, &options, None)
            } else {
                remote.find(&filter, &options)
            };
        };

        let join = self.factory.remote(join_model)?;
        let join_filter = Filter::eq(assoc.foreign_key.as_str(), id);
        let join_rows = if sorted && assoc.join_sort {
            join.sorted(&join_filter, &options, None)?
        } else {
            join.find(&join_filter, &options)?
        };
        let ids: Vec<i64> = join_rows
            .iter()
            .filter_map(|j| j.value(remote_key).as_i64())
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let remote_filter = Filter::is_in(PRIMARY_KEY, ids.iter().copied()).and(filter.clone());
        if sorted && !assoc.join_sort {
            return remote.sorted(&remote_filter, &options, None);
        }
        let mut found = remote.find(&remote_filter, &options)?;
        if sorted {
            let mut position = HashMap::new();
            for (i, id) in ids.iter().enumerate() {
                position.entry(*id).or_insert(i);
            }
            found.sort_by_key(|r| r.id().and_then(|id| position.get(&id).copied()));
        }
        Ok(found)
    }

    fn related_cached(
        &mut self,
        op: AccessorOp,
        name: &str,
        filter: &Filter,
    ) -> Result<&[Instance]> {
        let key = format!("{}{}:{:?}", op.prefix(), name, filter);
        if !self.related.contains_key(&key) {
            let factory = Arc::clone(&self.factory);
            let assoc = factory.has_many_named(name)?;
            let found = self.load_related(assoc, filter, op == AccessorOp::Sorted)?;
            tracing::trace!(association = name, rows = found.len(), "Loaded association");
            self.related.insert(key.clone(), found);
        }
        Ok(self.related.get(&key).map(Vec::as_slice).unwrap_or_default())
    }

    /// `find<Name>`: the association's rows matching `filter`, cached
    /// per instance on first read.
    pub fn find_related(&mut self, name: &str, filter: &Filter) -> Result<&[Instance]> {
        self.related_cached(AccessorOp::Find, name, filter)
    }

    /// `sorted<Name>`: like `find_related`, ordered by the remote model
    /// (or the join model for `joinSort` associations).
    pub fn sorted_related(&mut self, name: &str, filter: &Filter) -> Result<&[Instance]> {
        self.related_cached(AccessorOp::Sorted, name, filter)
    }

    /// `new<Name>`: an unsaved child with the foreign key filled in.
    pub fn new_related<I, K>(&self, name: &str, values: I) -> Result<Instance>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let assoc = self.factory.has_many_named(name)?;
        if assoc.is_through() {
            return Err(Error::config(
                self.model(),
                format!("cannot create through association '{}'", name),
            ));
        }
        let id = self.require_id("creating associated rows")?;
        let remote = self.factory.remote(&assoc.remote_model)?;
        let mut child = remote.new_instance(values)?;
        child.set(&assoc.foreign_key, id)?;
        Ok(child)
    }

    /// Dispatch a synthesized accessor such as `findTracks`. `filter`
    /// applies to find/sorted, `values` to new.
    pub fn call(
        &mut self,
        accessor: &str,
        filter: &Filter,
        values: Vec<(String, Value)>,
    ) -> Result<Related<'_>> {
        let Some(entry) = self.factory.accessor(accessor) else {
            return Err(Error::config(
                self.model(),
                format!("no accessor '{}'", accessor),
            ));
        };
        let name = self.factory.has_many()[entry.association].name.clone();
        match entry.op {
            AccessorOp::New => Ok(Related::New(self.new_related(&name, values)?)),
            op => Ok(Related::Many(self.related_cached(op, &name, filter)?)),
        }
    }

    /// The remote instance a belongs-to association points at.
    pub fn belongs_to(&self, name: &str) -> Result<Option<Instance>> {
        let assoc = self.factory.belongs_to_named(name)?;
        let Some(id) = self.value(&assoc.foreign_key).as_i64() else {
            return Ok(None);
        };
        self.factory.remote(&assoc.remote_model)?.find_by_id(id)
    }

    /// Point a belongs-to association at `remote`, or clear it.
    pub fn set_belongs_to(&mut self, name: &str, remote: Option<&Instance>) -> Result<()> {
        let id = match remote {
            Some(remote) => {
                let assoc = self.factory.belongs_to_named(name)?;
                if remote.model() != assoc.remote_model {
                    return Err(Error::config(
                        self.model(),
                        format!(
                            "'{}' expects a {}, got a {}",
                            name,
                            assoc.remote_model,
                            remote.model()
                        ),
                    ));
                }
                Some(remote.require_id("being referenced")?)
            }
            None => None,
        };
        self.set_belongs_to_id(name, id)
    }

    /// Point a belongs-to association at a raw id.
    pub fn set_belongs_to_id(&mut self, name: &str, id: Option<i64>) -> Result<()> {
        let column = self.factory.belongs_to_named(name)?.foreign_key.clone();
        self.set(&column, id)
    }

    fn through_parts(&self, name: &str) -> Result<(Arc<Factory>, String, String)> {
        let assoc = self.factory.has_many_named(name)?;
        match (&assoc.through, &assoc.remote_key) {
            (Some(join), Some(remote_key)) => Ok((
                self.factory.remote(join)?,
                assoc.foreign_key.clone(),
                remote_key.clone(),
            )),
            _ => Err(Error::config(
                self.model(),
                format!("'{}' is not a through association", name),
            )),
        }
    }

    fn forget_related(&mut self, name: &str) {
        let find = format!("{}{}:", AccessorOp::Find.prefix(), name);
        let sorted = format!("{}{}:", AccessorOp::Sorted.prefix(), name);
        self.related
            .retain(|key, _| !key.starts_with(&find) && !key.starts_with(&sorted));
    }

    /// Link `remote` through a join row. Linking twice is a no-op.
    pub fn connect(&mut self, name: &str, remote: &Instance) -> Result<()> {
        let (join, foreign_key, remote_key) = self.through_parts(name)?;
        let id = self.require_id("connecting")?;
        let remote_id = remote.require_id("being connected")?;
        let link = Filter::eq(foreign_key.as_str(), id).and(Filter::eq(remote_key.as_str(), remote_id));
        if join.store().exists(join.table(), &link)? {
            return Ok(());
        }
        let mut row = join.new_instance([
            (foreign_key, Value::from(id)),
            (remote_key, Value::from(remote_id)),
        ])?;
        row.store(false)?;
        self.forget_related(name);
        tracing::debug!(association = name, id = id, remote = remote_id, "Connected");
        Ok(())
    }

    /// Remove the join rows linking `remote`.
    pub fn disconnect(&mut self, name: &str, remote: &Instance) -> Result<()> {
        let (join, foreign_key, remote_key) = self.through_parts(name)?;
        let id = self.require_id("disconnecting")?;
        let remote_id = remote.require_id("being disconnected")?;
        let link = Filter::eq(foreign_key.as_str(), id).and(Filter::eq(remote_key.as_str(), remote_id));
        let registry = self.factory.registry()?;
        registry.transaction(|| {
            for mut row in join.find(&link, &fresh())? {
                row.delete(true)?;
            }
            Ok(())
        })?;
        self.forget_related(name);
        tracing::debug!(association = name, id = id, remote = remote_id, "Disconnected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ModelOptions;
    use crate::registry::Registry;
    use rowmodel_memory::MemoryStore;
    use serde_json::json;

    fn setup() -> (Arc<Registry>, Arc<Factory>) {
        let store = MemoryStore::new();
        store
            .create_table(
                "notes",
                &[("title", "VARCHAR(5)"), ("meta", "TEXT"), ("n", "INTEGER")],
            )
            .unwrap();
        let registry = Registry::new(Arc::new(store));
        let factory = registry
            .register(ModelOptions::new("Note").table("notes").json("meta"))
            .unwrap();
        (registry, factory)
    }

    #[test]
    fn test_set_validates_columns() {
        let (_registry, factory) = setup();
        let mut note = factory.new_instance(Vec::<(String, Value)>::new()).unwrap();
        assert_eq!(note.state(), InstanceState::New);

        note.set("n", 3_i64).unwrap();
        assert_eq!(note.get::<i64>("n").unwrap(), 3);
        assert!(matches!(
            note.set("nope", 1_i64),
            Err(Error::Schema(SchemaError {
                kind: SchemaErrorKind::ColumnNotFound,
                ..
            }))
        ));
        assert!(note.set("id", 9_i64).is_err());
        assert_eq!(note.value("title"), &Value::Null);
    }

    #[test]
    fn test_store_truncates_and_encodes() {
        let (_registry, factory) = setup();
        let mut note = factory
            .new_instance([("title", Value::from("abcdefgh"))])
            .unwrap();
        note.set_attr("meta", json!({"k": [1, 2]})).unwrap();
        assert!(note.is_attr_modified("meta"));

        note.store(false).unwrap();

        assert_eq!(note.state(), InstanceState::Persisted);
        assert!(!note.is_attr_modified("meta"));
        assert_eq!(note.value("title"), &Value::from("abcde"));
        assert_eq!(note.value("meta"), &Value::from(r#"{"k":[1,2]}"#));

        let mut again = factory.find_by_id(note.id().unwrap()).unwrap().unwrap();
        assert_eq!(again.attr("meta").unwrap(), json!({"k": [1, 2]}));
    }

    #[test]
    fn test_dry_run_does_not_write() {
        let (_registry, factory) = setup();
        let mut note = factory.new_instance([("n", Value::from(1_i64))]).unwrap();
        note.store(true).unwrap();
        assert_eq!(note.id(), None);
        assert_eq!(factory.count(None).unwrap(), 0);
    }

    #[test]
    fn test_delete_unsaved_is_noop_and_deleted_refuses_store() {
        let (_registry, factory) = setup();
        let mut note = factory.new_instance([("n", Value::from(1_i64))]).unwrap();
        note.delete(false).unwrap();
        assert_eq!(note.state(), InstanceState::New);

        note.store(false).unwrap();
        note.delete(false).unwrap();
        assert_eq!(note.state(), InstanceState::Deleted);
        assert!(!factory.row_exists(note.id().unwrap()).unwrap());
        assert!(matches!(note.store(false), Err(Error::Config(_))));
    }

    #[test]
    fn test_reload_discards_unsaved_changes() {
        let (_registry, factory) = setup();
        let mut note = factory.new_instance([("n", Value::from(1_i64))]).unwrap();
        note.store(false).unwrap();

        note.set("n", 2_i64).unwrap();
        note.set_attr("meta", json!(true)).unwrap();
        note.reload().unwrap();

        assert_eq!(note.get::<i64>("n").unwrap(), 1);
        assert_eq!(note.attr("meta").unwrap(), Json::Null);
    }
}
