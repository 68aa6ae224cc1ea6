//! Per-model factories.
//!
//! A [`Factory`] is built once per model by [`Registry::register`]. It
//! holds the column metadata read from the store, the attribute codec,
//! the resolved associations and the ordering rule, and produces and
//! finds [`Instance`]s.

use crate::association::{Accessor, BelongsTo, HasMany, accessor_table};
use crate::codec::AttrCodec;
use crate::compare::CompareRule;
use crate::instance::{Instance, InstanceState};
use crate::options::{Comparator, ModelHooks, ModelOptions};
use crate::registry::Registry;
use crate::sanitize::Sanitizer;
use rowmodel_core::{
    AmbiguousError, ColumnSchema, Error, Filter, FindOptions, PRIMARY_KEY, QueryError,
    QueryErrorKind, Result, Row, RowStore, Value,
};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Schema-derived metadata and finders for one model.
pub struct Factory {
    name: String,
    table: String,
    view: bool,
    /// Columns in schema order, primary key excluded.
    columns: Vec<ColumnSchema>,
    markdown: BTreeSet<String>,
    codec: AttrCodec,
    has_many: Vec<HasMany>,
    belongs_to: Vec<BelongsTo>,
    accessors: HashMap<String, Accessor>,
    compare: CompareRule,
    cache_ttl: Duration,
    hooks: Option<Arc<dyn ModelHooks>>,
    sanitizer: Arc<Sanitizer>,
    store: Arc<dyn RowStore>,
    registry: Weak<Registry>,
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("view", &self.view)
            .field("columns", &self.columns)
            .field("codec", &self.codec)
            .field("has_many", &self.has_many)
            .field("belongs_to", &self.belongs_to)
            .field("compare", &self.compare)
            .field("cache_ttl", &self.cache_ttl)
            .finish_non_exhaustive()
    }
}

impl Factory {
    /// Build a factory from `options`, reading the table schema once.
    pub(crate) fn construct(registry: &Arc<Registry>, options: ModelOptions) -> Result<Self> {
        let model = options.name.as_str();
        if model.is_empty() {
            return Err(Error::config("", "model name is empty"));
        }
        let table = options.table_name().to_string();
        let store = Arc::clone(registry.store());

        let fields: Option<Vec<String>> = options.fields.as_ref().map(|fields| {
            fields
                .iter()
                .filter(|f| f.as_str() != PRIMARY_KEY)
                .cloned()
                .collect()
        });
        let columns = store.schema(&table, fields.as_deref())?;
        if let Some(fields) = &fields {
            if let Some(missing) = fields.iter().find(|f| !columns.iter().any(|c| &c.name == *f)) {
                return Err(Error::config(
                    model,
                    format!("field '{}' is not a column of '{}'", missing, table),
                ));
            }
        }
        let is_column = |name: &str| columns.iter().any(|c| c.name == name);
        let require_column = |what: &str, name: &str| -> Result<()> {
            if is_column(name) {
                Ok(())
            } else {
                Err(Error::config(
                    model,
                    format!("{} '{}' is not a column of '{}'", what, name, table),
                ))
            }
        };

        for column in &options.markdown_columns {
            require_column("markdown column", column)?;
        }
        let mut codec = AttrCodec::new(table.clone(), options.malformed_json);
        for column in &options.json_attrs {
            require_column("JSON attribute", column)?;
            codec.add_json(column.clone());
        }
        for (column, object) in &options.object_attrs {
            require_column("object attribute", column)?;
            if options.json_attrs.contains(column) {
                return Err(Error::config(
                    model,
                    format!("'{}' is declared both JSON and object attribute", column),
                ));
            }
            let ty = registry.object_type(&object.type_id).ok_or_else(|| {
                Error::config(
                    model,
                    format!("unknown object attribute type '{}'", object.type_id),
                )
            })?;
            codec.add_object(column.clone(), ty, object.array_size);
        }
        if let Some(column) = options.markdown_columns.iter().find(|c| codec.contains(c)) {
            return Err(Error::config(
                model,
                format!("'{}' cannot be both markdown and JSON", column),
            ));
        }

        let has_many = options
            .has_many
            .iter()
            .map(|assoc| HasMany::resolve(model, assoc))
            .collect::<Result<Vec<_>>>()?;
        let belongs_to = options
            .belongs_to
            .iter()
            .map(|assoc| BelongsTo::resolve(model, assoc))
            .collect::<Result<Vec<_>>>()?;
        for assoc in &belongs_to {
            require_column("belongs-to foreign key", &assoc.foreign_key)?;
        }
        let accessors = accessor_table(model, &has_many)?;
        let compare = CompareRule::build(model, &options.compare, options.hooks.as_ref(), is_column)?;

        Ok(Self {
            name: options.name.clone(),
            table,
            view: options.view,
            columns,
            markdown: options.markdown_columns,
            codec,
            has_many,
            belongs_to,
            accessors,
            compare,
            cache_ttl: options.cache_ttl,
            hooks: options.hooks,
            sanitizer: Arc::clone(registry.sanitizer()),
            store,
            registry: Arc::downgrade(registry),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn is_view(&self) -> bool {
        self.view
    }

    /// Column metadata, primary key excluded.
    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn is_markdown(&self, column: &str) -> bool {
        self.markdown.contains(column)
    }

    pub fn codec(&self) -> &AttrCodec {
        &self.codec
    }

    pub fn has_many(&self) -> &[HasMany] {
        &self.has_many
    }

    pub fn belongs_to(&self) -> &[BelongsTo] {
        &self.belongs_to
    }

    /// The has-many association called `name`.
    pub fn has_many_named(&self, name: &str) -> Result<&HasMany> {
        self.has_many
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| Error::config(&self.name, format!("no has-many association '{}'", name)))
    }

    /// The belongs-to association called `name`.
    pub fn belongs_to_named(&self, name: &str) -> Result<&BelongsTo> {
        self.belongs_to
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| {
                Error::config(&self.name, format!("no belongs-to association '{}'", name))
            })
    }

    /// Resolve a synthesized accessor name such as `findTracks`.
    pub fn accessor(&self, name: &str) -> Option<Accessor> {
        self.accessors.get(name).copied()
    }

    /// All synthesized accessor names, sorted.
    pub fn accessor_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.accessors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn compare_rule(&self) -> &CompareRule {
        &self.compare
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    pub fn hooks(&self) -> Option<&Arc<dyn ModelHooks>> {
        self.hooks.as_ref()
    }

    pub fn store(&self) -> &dyn RowStore {
        self.store.as_ref()
    }

    pub fn registry(&self) -> Result<Arc<Registry>> {
        self.registry
            .upgrade()
            .ok_or_else(|| Error::config(&self.name, "registry has been dropped"))
    }

    /// Look up another model through the registry.
    pub fn remote(&self, model: &str) -> Result<Arc<Factory>> {
        self.registry()?.factory(model)
    }

    fn wrap(self: &Arc<Self>, rows: Vec<Row>) -> Vec<Instance> {
        rows.into_iter()
            .map(|row| Instance::from_row(Arc::clone(self), row))
            .collect()
    }

    /// Rows matching `filter`, wrapped as instances. Reads are cached for
    /// the model's TTL unless `options` sets its own.
    pub fn find(self: &Arc<Self>, filter: &Filter, options: &FindOptions) -> Result<Vec<Instance>> {
        let options = options.clone().with_default_ttl(self.cache_ttl);
        let rows = self.store.find(&self.table, filter, &options)?;
        tracing::debug!(model = %self.name, rows = rows.len(), "Find");
        Ok(self.wrap(rows))
    }

    pub fn find_one(
        self: &Arc<Self>,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Option<Instance>> {
        let options = options.clone().with_default_ttl(self.cache_ttl);
        let row = self.store.find_one(&self.table, filter, &options)?;
        Ok(row.map(|row| Instance::from_row(Arc::clone(self), row)))
    }

    pub fn find_by_id(self: &Arc<Self>, id: i64) -> Result<Option<Instance>> {
        self.find_one(&Filter::eq(PRIMARY_KEY, id), &FindOptions::default())
    }

    /// Like `find`, ordered by `comparator` if given, else by the model's
    /// compare rule. Key rules are pushed down to the store as ORDER BY.
    pub fn sorted(
        self: &Arc<Self>,
        filter: &Filter,
        options: &FindOptions,
        comparator: Option<&Comparator>,
    ) -> Result<Vec<Instance>> {
        if let Some(comparator) = comparator {
            let mut found = self.find(filter, options)?;
            found.sort_by(|a, b| comparator(a, b));
            return Ok(found);
        }
        match &self.compare {
            CompareRule::None => Err(Error::config(
                &self.name,
                "sorted() needs a compare option or a comparator",
            )),
            CompareRule::Keys(keys) => {
                let mut order = keys.clone();
                order.extend(options.order.iter().cloned());
                self.find(filter, &options.clone().order(order))
            }
            rule => {
                let mut found = self.find(filter, options)?;
                found.sort_by(|a, b| rule.compare(a, b).unwrap_or(Ordering::Equal));
                Ok(found)
            }
        }
    }

    /// Find the single row with exactly `values`.
    ///
    /// With no match, returns `None` unless `ensure` is given, in which case
    /// a new instance seeded with `values` and the sanitized `ensure` extras
    /// is stored and returned. More than one match is an `Ambiguous` error.
    pub fn find_unique(
        self: &Arc<Self>,
        values: &[(String, Value)],
        ensure: Option<&[(String, Value)]>,
    ) -> Result<Option<Instance>> {
        let filter = Filter::all_eq(values.iter().cloned());
        let mut found = self.find(&filter, &FindOptions::new().limit(2))?;
        if found.len() > 1 {
            let count = self.store.count(&self.table, &filter)? as usize;
            return Err(Error::Ambiguous(AmbiguousError {
                table: self.table.clone(),
                count,
            }));
        }
        if let Some(instance) = found.pop() {
            return Ok(Some(instance));
        }
        let Some(extras) = ensure else {
            return Ok(None);
        };

        let mut seed = self.sanitize(extras.iter().cloned(), &[]);
        seed.retain(|(k, _)| !values.iter().any(|(v, _)| v == k));
        seed.extend(values.iter().cloned());
        let mut instance = self.new_instance(seed)?;
        instance.store(false)?;
        tracing::debug!(model = %self.name, id = ?instance.id(), "Created missing unique row");
        Ok(Some(instance))
    }

    /// Keep only known columns (plus `allowed_extra` keys) and strip markup
    /// from text values. Markdown columns keep the safelisted tags; JSON
    /// columns are passed through untouched.
    pub fn sanitize<I, K>(&self, params: I, allowed_extra: &[&str]) -> Vec<(String, Value)>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        params
            .into_iter()
            .map(|(k, v)| (k.into(), v))
            .filter(|(k, _)| self.has_column(k) || allowed_extra.contains(&k.as_str()))
            .map(|(k, v)| {
                let v = match v {
                    Value::Text(text) if self.codec.contains(&k) => Value::Text(text),
                    Value::Text(text) if self.is_markdown(&k) => {
                        Value::Text(self.sanitizer.markdown(&text))
                    }
                    Value::Text(text) => Value::Text(self.sanitizer.strip(&text)),
                    other => other,
                };
                (k, v)
            })
            .collect()
    }

    /// Number of rows, optionally restricted by `filter`.
    pub fn count(&self, filter: Option<&Filter>) -> Result<u64> {
        self.store.count(&self.table, filter.unwrap_or(&Filter::All))
    }

    /// Does a row with primary key `id` exist?
    pub fn row_exists(&self, id: i64) -> Result<bool> {
        self.store.exists(&self.table, &Filter::eq(PRIMARY_KEY, id))
    }

    /// Fail with `msg` unless a row with primary key `id` exists.
    pub fn validate_exists(&self, id: i64, msg: &str) -> Result<()> {
        if self.row_exists(id)? {
            return Ok(());
        }
        Err(Error::Query(QueryError {
            kind: QueryErrorKind::NotFound,
            table: Some(self.table.clone()),
            message: msg.to_string(),
            source: None,
        }))
    }

    /// Fail with `msg` if another row has the same values as `instance` in
    /// every one of `columns`.
    pub fn validate_unique(&self, instance: &Instance, columns: &[&str], msg: &str) -> Result<()> {
        if instance.model() != self.name {
            return Err(Error::config(
                &self.name,
                format!("cannot check uniqueness of a {}", instance.model()),
            ));
        }
        if let Some(missing) = columns.iter().find(|c| !self.has_column(c)) {
            return Err(Error::config(
                &self.name,
                format!("'{}' is not a column of '{}'", missing, self.table),
            ));
        }
        let mut filter = Filter::all_eq(
            columns
                .iter()
                .map(|c| (c.to_string(), instance.value(c).clone())),
        );
        if let Some(id) = instance.id() {
            filter = filter.and(Filter::ne(PRIMARY_KEY, id));
        }
        if !self.store.exists(&self.table, &filter)? {
            return Ok(());
        }
        Err(Error::Query(QueryError {
            kind: QueryErrorKind::Constraint,
            table: Some(self.table.clone()),
            message: msg.to_string(),
            source: None,
        }))
    }

    fn check_batch(&self, batch: &[Instance]) -> Result<()> {
        match batch.iter().find(|i| i.model() != self.name) {
            Some(stray) => Err(Error::config(
                &self.name,
                format!("batch contains a {}", stray.model()),
            )),
            None => Ok(()),
        }
    }

    /// Store every unsaved instance of `batch` in one transaction. If any
    /// of them fails, no row is written and the instances are left unsaved.
    pub fn insert_batch(&self, batch: &mut [Instance]) -> Result<()> {
        self.check_batch(batch)?;
        if let Some(stored) = batch.iter().find(|i| i.state() != InstanceState::New) {
            return Err(Error::config(
                &self.name,
                format!("insert_batch got an instance in state {:?}", stored.state()),
            ));
        }
        let before: Vec<Row> = batch.iter().map(|i| i.row().clone()).collect();
        let registry = self.registry()?;
        let result = registry.transaction(|| {
            for instance in batch.iter_mut() {
                instance.store(false)?;
            }
            Ok(())
        });
        if result.is_err() {
            for (instance, row) in batch.iter_mut().zip(before) {
                instance.restore(row, InstanceState::New);
            }
        }
        result?;
        tracing::info!(model = %self.name, rows = batch.len(), "Inserted batch");
        Ok(())
    }

    /// Delete every instance of `batch` in one transaction, as
    /// [`Instance::delete`] would. Returns how many stored rows were
    /// deleted. On error nothing is deleted.
    pub fn delete_batch(&self, batch: &mut [Instance], force: bool) -> Result<usize> {
        self.check_batch(batch)?;
        let before: Vec<(Row, InstanceState)> =
            batch.iter().map(|i| (i.row().clone(), i.state())).collect();
        let registry = self.registry()?;
        let result = registry.transaction(|| {
            let mut deleted = 0;
            for instance in batch.iter_mut() {
                let stored = instance.state() == InstanceState::Persisted;
                instance.delete(force)?;
                if stored {
                    deleted += 1;
                }
            }
            Ok(deleted)
        });
        if result.is_err() {
            for (instance, (row, state)) in batch.iter_mut().zip(before) {
                instance.restore(row, state);
            }
        }
        result
    }

    /// A new, unsaved instance with `values` applied through
    /// [`Instance::set`].
    pub fn new_instance<I, K>(self: &Arc<Self>, values: I) -> Result<Instance>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut instance = Instance::new(Arc::clone(self));
        instance.fill(values)?;
        Ok(instance)
    }

    /// Compare two instances with the model's rule; `None` if the model
    /// has no ordering.
    pub fn compare(&self, a: &Instance, b: &Instance) -> Option<Ordering> {
        self.compare.compare(a, b)
    }

    /// Stable in-memory sort by the model's rule.
    pub fn sort(&self, instances: &mut [Instance]) -> Result<()> {
        if self.compare.is_none() {
            return Err(Error::config(&self.name, "model has no compare rule"));
        }
        instances.sort_by(|a, b| self.compare.compare(a, b).unwrap_or(Ordering::Equal));
        Ok(())
    }
}
