//! JSON and object attribute encoding.
//!
//! A JSON column is either plain JSON or backed by a user-defined
//! [`ObjectAttr`] type, singly or as an array. Decoded values are cached
//! per instance in a [`Slot`]; an absent slot means the column was never
//! decoded.
//!
//! Object attributes move through [`AttrState`]s. Setting an emptying
//! value may leave a `Zombie` that reads as null but is kept until
//! `to_store` or `delete` has released whatever resource it manages.

use crate::options::MalformedJson;
use rowmodel_core::{DecodeError, Error, Result, ValidationError, Value};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A column value backed by user code, possibly managing an external
/// resource (a file, a blob in another store...).
pub trait ObjectAttr: Send {
    /// The logical value.
    fn get(&self) -> Json;

    /// Apply a new logical value. Returns the state the attribute is in
    /// afterwards: `Live` (this or a replacement object), `Zombie` when
    /// emptied but still holding a resource, or `Gone`.
    fn set(self: Box<Self>, value: &Json) -> Result<AttrState>;

    /// Reasons the owning row cannot be stored.
    fn errors_preventing_store(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// The JSON to persist. A zombie releases its resource here and
    /// returns an empty value.
    fn to_store(&mut self) -> Result<Json>;

    /// Release the resource because the owning row is deleted.
    fn delete(&mut self) -> Result<()>;
}

/// Constructs [`ObjectAttr`]s; registered with the registry under `id`.
pub trait ObjectAttrType: Send + Sync {
    fn id(&self) -> &str;

    /// A fresh attribute to `set` a first value on.
    fn create(&self) -> Box<dyn ObjectAttr>;

    /// Rebuild an attribute from its stored JSON.
    fn from_store(&self, stored: Json) -> Result<Box<dyn ObjectAttr>>;
}

/// Lifecycle state of a loaded object attribute.
pub enum AttrState {
    Live(Box<dyn ObjectAttr>),
    /// Reads as null; kept until its resource is released.
    Zombie(Box<dyn ObjectAttr>),
    Gone,
}

impl AttrState {
    pub fn is_live(&self) -> bool {
        matches!(self, AttrState::Live(_))
    }

    pub fn is_zombie(&self) -> bool {
        matches!(self, AttrState::Zombie(_))
    }

    pub fn is_gone(&self) -> bool {
        matches!(self, AttrState::Gone)
    }

    fn get(&self) -> Json {
        match self {
            AttrState::Live(attr) => attr.get(),
            AttrState::Zombie(_) | AttrState::Gone => Json::Null,
        }
    }

    fn attr_mut(&mut self) -> Option<&mut Box<dyn ObjectAttr>> {
        match self {
            AttrState::Live(attr) | AttrState::Zombie(attr) => Some(attr),
            AttrState::Gone => None,
        }
    }

    fn collect_errors(&self, field: &str, errors: &mut ValidationError) {
        let attr = match self {
            AttrState::Live(attr) | AttrState::Zombie(attr) => attr,
            AttrState::Gone => return,
        };
        match attr.errors_preventing_store() {
            Ok(messages) => {
                for message in messages {
                    errors.add_custom(field, message);
                }
            }
            Err(e) => errors.add_fault(field, &e),
        }
    }
}

impl fmt::Debug for AttrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrState::Live(attr) => write!(f, "Live({})", attr.get()),
            AttrState::Zombie(_) => write!(f, "Zombie"),
            AttrState::Gone => write!(f, "Gone"),
        }
    }
}

/// Decoded value of one JSON column.
#[derive(Debug)]
pub enum Cached {
    /// Plain JSON; `Null` when the column is empty.
    Json(Json),
    Scalar(AttrState),
    /// Live elements first, zombies after.
    Array(Vec<AttrState>),
}

impl Cached {
    /// The logical value. Arrays report their live elements only; retained
    /// zombies are skipped.
    pub fn get(&self) -> Json {
        match self {
            Cached::Json(value) => value.clone(),
            Cached::Scalar(state) => state.get(),
            Cached::Array(states) => Json::Array(
                states
                    .iter()
                    .filter(|s| s.is_live())
                    .map(AttrState::get)
                    .collect(),
            ),
        }
    }

    /// Collect `errors_preventing_store` of every held object.
    pub fn collect_errors(&self, field: &str, errors: &mut ValidationError) {
        match self {
            Cached::Json(_) => {}
            Cached::Scalar(state) => state.collect_errors(field, errors),
            Cached::Array(states) => {
                for state in states {
                    state.collect_errors(field, errors);
                }
            }
        }
    }

    /// Release every held object because the row is being deleted.
    pub fn delete(&mut self) -> Result<()> {
        match self {
            Cached::Json(_) => {}
            Cached::Scalar(state) => {
                if let Some(attr) = state.attr_mut() {
                    attr.delete()?;
                }
                *state = AttrState::Gone;
            }
            Cached::Array(states) => {
                for state in states.iter_mut() {
                    if let Some(attr) = state.attr_mut() {
                        attr.delete()?;
                    }
                    *state = AttrState::Gone;
                }
                states.clear();
            }
        }
        Ok(())
    }
}

/// Per-instance cache entry for a decoded column.
#[derive(Debug)]
pub struct Slot {
    pub value: Cached,
    /// Set since the last store or load.
    pub modified: bool,
}

#[derive(Clone)]
enum AttrKind {
    Json,
    Object {
        ty: Arc<dyn ObjectAttrType>,
        array_size: Option<usize>,
    },
}

impl fmt::Debug for AttrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrKind::Json => write!(f, "Json"),
            AttrKind::Object { ty, array_size } => f
                .debug_struct("Object")
                .field("type", &ty.id())
                .field("array_size", array_size)
                .finish(),
        }
    }
}

/// JSON-valued empty test used for dropping and trimming elements.
pub fn is_empty_json(value: &Json) -> bool {
    match value {
        Json::Null | Json::Bool(false) => true,
        Json::String(s) => s.is_empty(),
        Json::Array(a) => a.is_empty(),
        Json::Object(o) => o.is_empty(),
        Json::Number(_) | Json::Bool(true) => false,
    }
}

/// Encoding rules for the JSON columns of one model.
#[derive(Debug, Clone)]
pub struct AttrCodec {
    table: String,
    attrs: BTreeMap<String, AttrKind>,
    malformed: MalformedJson,
}

impl AttrCodec {
    pub fn new(table: impl Into<String>, malformed: MalformedJson) -> Self {
        Self {
            table: table.into(),
            attrs: BTreeMap::new(),
            malformed,
        }
    }

    pub fn add_json(&mut self, name: impl Into<String>) {
        self.attrs.insert(name.into(), AttrKind::Json);
    }

    pub fn add_object(
        &mut self,
        name: impl Into<String>,
        ty: Arc<dyn ObjectAttrType>,
        array_size: Option<usize>,
    ) {
        self.attrs
            .insert(name.into(), AttrKind::Object { ty, array_size });
    }

    /// Is `name` a JSON or object attribute?
    pub fn contains(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(String::as_str)
    }

    /// Names of the object attributes.
    pub fn object_names(&self) -> impl Iterator<Item = &str> {
        self.attrs.iter().filter_map(|(name, kind)| match kind {
            AttrKind::Object { .. } => Some(name.as_str()),
            AttrKind::Json => None,
        })
    }

    fn kind(&self, name: &str) -> Result<&AttrKind> {
        self.attrs.get(name).ok_or_else(|| {
            Error::config(
                self.table.clone(),
                format!("'{}' is not a JSON attribute", name),
            )
        })
    }

    fn empty(kind: &AttrKind) -> Cached {
        match kind {
            AttrKind::Json => Cached::Json(Json::Null),
            AttrKind::Object {
                array_size: None, ..
            } => Cached::Scalar(AttrState::Gone),
            AttrKind::Object {
                array_size: Some(_),
                ..
            } => Cached::Array(Vec::new()),
        }
    }

    fn malformed(&self, kind: &AttrKind, name: &str, message: String) -> Result<Cached> {
        match self.malformed {
            MalformedJson::Null => {
                tracing::warn!(
                    table = %self.table,
                    attr = name,
                    error = %message,
                    "Malformed stored JSON read as null"
                );
                Ok(Self::empty(kind))
            }
            MalformedJson::Error => Err(Error::Decode(DecodeError {
                table: self.table.clone(),
                attr: name.to_string(),
                message,
            })),
        }
    }

    /// Decode the raw column value of `name`.
    pub fn decode(&self, name: &str, raw: Option<&Value>) -> Result<Cached> {
        let kind = self.kind(name)?;
        let json = match raw {
            None | Some(Value::Null) => return Ok(Self::empty(kind)),
            Some(Value::Text(text)) if text.trim().is_empty() => return Ok(Self::empty(kind)),
            Some(Value::Text(text)) => match serde_json::from_str::<Json>(text) {
                Ok(json) => json,
                Err(e) => return self.malformed(kind, name, e.to_string()),
            },
            Some(other) => other.to_json(),
        };

        match kind {
            AttrKind::Json => Ok(Cached::Json(json)),
            AttrKind::Object {
                array_size: None,
                ty,
            } => {
                if json.is_null() {
                    return Ok(Cached::Scalar(AttrState::Gone));
                }
                Ok(Cached::Scalar(AttrState::Live(ty.from_store(json)?)))
            }
            AttrKind::Object {
                array_size: Some(_),
                ty,
            } => match json {
                Json::Null => Ok(Cached::Array(Vec::new())),
                Json::Array(items) => {
                    let states = items
                        .into_iter()
                        .map(|item| ty.from_store(item).map(AttrState::Live))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(Cached::Array(states))
                }
                other => self.malformed(
                    kind,
                    name,
                    format!("expected an array, found {}", json_type(&other)),
                ),
            },
        }
    }

    /// Apply a new logical value to `current` (decoded already, if the
    /// column holds anything).
    pub fn set(&self, name: &str, current: Option<Cached>, value: Json) -> Result<Cached> {
        match self.kind(name)? {
            AttrKind::Json => Ok(Cached::Json(value)),
            AttrKind::Object {
                array_size: None,
                ty,
            } => {
                let attr = match current {
                    Some(Cached::Scalar(AttrState::Live(attr) | AttrState::Zombie(attr))) => attr,
                    _ => ty.create(),
                };
                Ok(Cached::Scalar(attr.set(&value)?))
            }
            AttrKind::Object {
                array_size: Some(_),
                ty,
            } => {
                let incoming: Vec<Json> = match value {
                    Json::Array(items) => items.into_iter().filter(|v| !is_empty_json(v)).collect(),
                    v if is_empty_json(&v) => Vec::new(),
                    v => vec![v],
                };

                let mut old_live = Vec::new();
                let mut old_zombies = Vec::new();
                if let Some(Cached::Array(states)) = current {
                    for state in states {
                        match state {
                            AttrState::Live(attr) => old_live.push(attr),
                            zombie @ AttrState::Zombie(_) => old_zombies.push(zombie),
                            AttrState::Gone => {}
                        }
                    }
                }

                let mut live = Vec::new();
                let mut zombies = old_zombies;
                let mut reused = old_live.into_iter();
                for value in &incoming {
                    let attr = reused.next().unwrap_or_else(|| ty.create());
                    match attr.set(value)? {
                        AttrState::Gone => {}
                        zombie @ AttrState::Zombie(_) => zombies.push(zombie),
                        live_state @ AttrState::Live(_) => live.push(live_state),
                    }
                }
                for surplus in reused {
                    match surplus.set(&Json::Null)? {
                        AttrState::Gone => {}
                        AttrState::Live(attr) | AttrState::Zombie(attr) => {
                            zombies.push(AttrState::Zombie(attr));
                        }
                    }
                }
                tracing::trace!(
                    attr = name,
                    live = live.len(),
                    zombies = zombies.len(),
                    "Set object array"
                );
                live.extend(zombies);
                Ok(Cached::Array(live))
            }
        }
    }

    /// Produce the column value to persist for `cached`, settling zombies.
    pub fn to_store(&self, cached: &mut Cached) -> Result<Value> {
        let json = match cached {
            Cached::Json(value) => value.clone(),
            Cached::Scalar(state) => match state {
                AttrState::Live(attr) => attr.to_store()?,
                AttrState::Zombie(attr) => {
                    let stored = attr.to_store()?;
                    if is_empty_json(&stored) {
                        *state = AttrState::Gone;
                    }
                    stored
                }
                AttrState::Gone => Json::Null,
            },
            Cached::Array(states) => {
                let mut stored = Vec::with_capacity(states.len());
                for state in states.iter_mut() {
                    match state {
                        AttrState::Live(attr) => stored.push(attr.to_store()?),
                        AttrState::Zombie(attr) => {
                            let value = attr.to_store()?;
                            if is_empty_json(&value) {
                                *state = AttrState::Gone;
                            }
                            stored.push(value);
                        }
                        AttrState::Gone => {}
                    }
                }
                states.retain(|s| !s.is_gone());
                while stored.last().is_some_and(is_empty_json) {
                    stored.pop();
                }
                if stored.is_empty() {
                    Json::Null
                } else {
                    Json::Array(stored)
                }
            }
        };

        if json.is_null() {
            Ok(Value::Null)
        } else {
            Ok(Value::Text(serde_json::to_string(&json)?))
        }
    }
}

fn json_type(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
