//! Model definition options.
//!
//! [`ModelOptions`] is the whole configuration surface of a model. It can
//! be assembled with the builder methods or deserialized from JSON
//! (camelCase keys). Hooks and custom comparators are builder-only.
//!
//! ```
//! use rowmodel::options::ModelOptions;
//!
//! let options: ModelOptions = serde_json::from_str(r#"{
//!     "name": "Post",
//!     "markdownColumns": ["body"],
//!     "hasMany": [{ "remoteModel": "Comment", "onDelete": "cascade" }],
//!     "compare": ["published DESC", "title"],
//!     "cacheTtlSecs": 5
//! }"#).unwrap();
//! assert_eq!(options.table_name(), "Post");
//! assert_eq!(options.cache_ttl.as_secs(), 5);
//! ```

use crate::instance::Instance;
use rowmodel_core::Result;
use serde::{Deserialize, Deserializer};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default time-to-live of cached reads.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// What happens to has-many children when the parent row is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OnDelete {
    /// Refuse the delete while children exist.
    #[default]
    Restrict,
    /// Delete the children too.
    Cascade,
    /// Null the children's foreign key.
    SetNull,
}

impl OnDelete {
    /// Parse a delete policy (case-insensitive, `set_null` and `setnull`
    /// both accepted).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace(['_', ' '], "").as_str() {
            "restrict" => Some(OnDelete::Restrict),
            "cascade" => Some(OnDelete::Cascade),
            "setnull" => Some(OnDelete::SetNull),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for OnDelete {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        OnDelete::parse(&raw).ok_or_else(|| {
            serde::de::Error::unknown_variant(&raw, &["restrict", "cascade", "setNull"])
        })
    }
}

/// A has-many association as written in the model definition.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HasManyOptions {
    /// Association name; defaults to the remote model name.
    pub name: Option<String>,
    pub remote_model: String,
    /// Column on the remote (or join) table holding our id.
    pub foreign_key: Option<String>,
    pub on_delete: Option<OnDelete>,
    /// Join model for many-to-many associations.
    pub through: Option<String>,
    /// Column on the join table holding the remote id.
    pub remote_key: Option<String>,
    /// Order through-association results by the join model's comparator.
    pub join_sort: bool,
}

impl HasManyOptions {
    pub fn new(remote_model: impl Into<String>) -> Self {
        Self {
            remote_model: remote_model.into(),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }

    pub fn on_delete(mut self, policy: OnDelete) -> Self {
        self.on_delete = Some(policy);
        self
    }

    pub fn through(mut self, join_model: impl Into<String>) -> Self {
        self.through = Some(join_model.into());
        self
    }

    pub fn remote_key(mut self, column: impl Into<String>) -> Self {
        self.remote_key = Some(column.into());
        self
    }

    pub fn join_sort(mut self, value: bool) -> Self {
        self.join_sort = value;
        self
    }
}

/// A belongs-to association as written in the model definition.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BelongsToOptions {
    /// Property name; defaults to the remote model name in lowerCamelCase.
    pub name: Option<String>,
    pub remote_model: String,
    /// Local column holding the remote id; defaults to `fk<RemoteModel>`.
    pub foreign_key: Option<String>,
}

impl BelongsToOptions {
    pub fn new(remote_model: impl Into<String>) -> Self {
        Self {
            remote_model: remote_model.into(),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }
}

/// Declares a column as backed by an object attribute type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectAttrOptions {
    /// Id the type was registered under.
    pub type_id: String,
    /// `Some(_)` makes the column an array of objects; `Some(0)` is
    /// variable length.
    #[serde(default)]
    pub array_size: Option<usize>,
}

/// User-supplied instance comparator.
pub type Comparator = Arc<dyn Fn(&Instance, &Instance) -> Ordering + Send + Sync>;

/// How instances of a model are ordered.
#[derive(Clone, Default)]
pub enum CompareOption {
    /// No ordering; `sorted` needs an explicit comparator.
    #[default]
    None,
    /// Delegate to [`ModelHooks::compare`].
    Instance,
    /// Column keys, each optionally suffixed with ` DESC`.
    Keys(Vec<String>),
    /// A comparator used as given.
    Custom(Comparator),
}

impl fmt::Debug for CompareOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOption::None => write!(f, "None"),
            CompareOption::Instance => write!(f, "Instance"),
            CompareOption::Keys(keys) => f.debug_tuple("Keys").field(keys).finish(),
            CompareOption::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}

impl<'de> Deserialize<'de> for CompareOption {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Key(String),
            Keys(Vec<String>),
        }

        Ok(match Option::<Raw>::deserialize(deserializer)? {
            None | Some(Raw::Flag(false)) => CompareOption::None,
            Some(Raw::Flag(true)) => CompareOption::Instance,
            Some(Raw::Key(key)) => CompareOption::Keys(vec![key]),
            Some(Raw::Keys(keys)) => CompareOption::Keys(keys),
        })
    }
}

/// What to do with stored JSON that does not parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MalformedJson {
    /// Read the attribute as null and log a warning.
    #[default]
    Null,
    /// Fail the read with a `Decode` error.
    Error,
}

/// Per-model callbacks.
///
/// All methods have defaults, so implementors override only what they
/// need.
pub trait ModelHooks: Send + Sync {
    /// Model-level reasons the instance cannot be stored. An `Err` is
    /// recorded as a fault in the validation list.
    fn errors_preventing_store(&self, _instance: &Instance) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Ordering used when the model is configured with
    /// [`CompareOption::Instance`].
    fn compare(&self, _a: &Instance, _b: &Instance) -> Ordering {
        Ordering::Equal
    }

    /// Called before a row is deleted, including cascaded deletes. An
    /// `Err` aborts the whole delete.
    fn before_delete(&self, _instance: &Instance) -> Result<()> {
        Ok(())
    }
}

fn de_secs<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_secs)
}

/// Everything that defines a model.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelOptions {
    /// Model name, used to resolve associations and default keys.
    pub name: String,
    /// Table or view name; defaults to the model name.
    pub table_name: Option<String>,
    /// The table is a read-only view.
    pub view: bool,
    /// Text columns that keep the markdown tag safelist when sanitized.
    pub markdown_columns: BTreeSet<String>,
    /// Columns holding plain JSON.
    pub json_attrs: BTreeSet<String>,
    /// Columns holding object attributes.
    pub object_attrs: BTreeMap<String, ObjectAttrOptions>,
    pub has_many: Vec<HasManyOptions>,
    pub belongs_to: Vec<BelongsToOptions>,
    pub compare: CompareOption,
    /// Column allowlist; the primary key is always included.
    pub fields: Option<Vec<String>>,
    #[serde(rename = "cacheTtlSecs", deserialize_with = "de_secs")]
    pub cache_ttl: Duration,
    pub malformed_json: MalformedJson,
    #[serde(skip)]
    pub hooks: Option<Arc<dyn ModelHooks>>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            table_name: None,
            view: false,
            markdown_columns: BTreeSet::new(),
            json_attrs: BTreeSet::new(),
            object_attrs: BTreeMap::new(),
            has_many: Vec::new(),
            belongs_to: Vec::new(),
            compare: CompareOption::None,
            fields: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            malformed_json: MalformedJson::Null,
            hooks: None,
        }
    }
}

impl fmt::Debug for ModelOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelOptions")
            .field("name", &self.name)
            .field("table_name", &self.table_name)
            .field("view", &self.view)
            .field("markdown_columns", &self.markdown_columns)
            .field("json_attrs", &self.json_attrs)
            .field("object_attrs", &self.object_attrs)
            .field("has_many", &self.has_many)
            .field("belongs_to", &self.belongs_to)
            .field("compare", &self.compare)
            .field("fields", &self.fields)
            .field("cache_ttl", &self.cache_ttl)
            .field("malformed_json", &self.malformed_json)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

impl ModelOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// The table the model reads and writes.
    pub fn table_name(&self) -> &str {
        self.table_name.as_deref().unwrap_or(&self.name)
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table_name = Some(table.into());
        self
    }

    pub fn view(mut self, view: bool) -> Self {
        self.view = view;
        self
    }

    pub fn markdown(mut self, column: impl Into<String>) -> Self {
        self.markdown_columns.insert(column.into());
        self
    }

    pub fn json(mut self, column: impl Into<String>) -> Self {
        self.json_attrs.insert(column.into());
        self
    }

    /// Back `column` by a single object of type `type_id`.
    pub fn object(mut self, column: impl Into<String>, type_id: impl Into<String>) -> Self {
        self.object_attrs.insert(
            column.into(),
            ObjectAttrOptions {
                type_id: type_id.into(),
                array_size: None,
            },
        );
        self
    }

    /// Back `column` by an array of objects of type `type_id`.
    pub fn object_array(
        mut self,
        column: impl Into<String>,
        type_id: impl Into<String>,
        size: usize,
    ) -> Self {
        self.object_attrs.insert(
            column.into(),
            ObjectAttrOptions {
                type_id: type_id.into(),
                array_size: Some(size),
            },
        );
        self
    }

    pub fn has_many(mut self, association: HasManyOptions) -> Self {
        self.has_many.push(association);
        self
    }

    pub fn belongs_to(mut self, association: BelongsToOptions) -> Self {
        self.belongs_to.push(association);
        self
    }

    pub fn compare(mut self, compare: CompareOption) -> Self {
        self.compare = compare;
        self
    }

    /// Order by column keys such as `["a", "b DESC"]`.
    pub fn compare_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compare = CompareOption::Keys(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn compare_with<F>(mut self, comparator: F) -> Self
    where
        F: Fn(&Instance, &Instance) -> Ordering + Send + Sync + 'static,
    {
        self.compare = CompareOption::Custom(Arc::new(comparator));
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn malformed_json(mut self, policy: MalformedJson) -> Self {
        self.malformed_json = policy;
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn ModelHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }
}
