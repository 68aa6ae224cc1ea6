//! Association descriptors resolved from model options.
//!
//! Descriptors are built once when a factory is registered. Remote models
//! are referenced by name and looked up in the registry when an
//! association is used, so models can be registered in any order.

use crate::options::{BelongsToOptions, HasManyOptions, OnDelete};
use rowmodel_core::{Error, Result};
use std::collections::HashMap;

/// One-to-many association, direct or through a join model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HasMany {
    pub name: String,
    pub remote_model: String,
    /// Column on the remote (or join) table referencing the local id.
    pub foreign_key: String,
    /// Delete policy; always `None` for through-associations.
    pub on_delete: Option<OnDelete>,
    /// Join model name for many-to-many associations.
    pub through: Option<String>,
    /// Join table column referencing the remote id; set exactly when
    /// `through` is.
    pub remote_key: Option<String>,
    pub join_sort: bool,
}

impl HasMany {
    /// Resolve a has-many definition of `model`, applying defaults.
    pub fn resolve(model: &str, options: &HasManyOptions) -> Result<Self> {
        if options.remote_model.is_empty() {
            return Err(Error::config(model, "has-many association without remote model"));
        }
        let name = options
            .name
            .clone()
            .unwrap_or_else(|| options.remote_model.clone());
        let foreign_key = options
            .foreign_key
            .clone()
            .unwrap_or_else(|| foreign_key_for(model));

        match &options.through {
            Some(join_model) => Ok(Self {
                remote_key: Some(
                    options
                        .remote_key
                        .clone()
                        .unwrap_or_else(|| foreign_key_for(&options.remote_model)),
                ),
                name,
                remote_model: options.remote_model.clone(),
                foreign_key,
                on_delete: None,
                through: Some(join_model.clone()),
                join_sort: options.join_sort,
            }),
            None => {
                if options.remote_key.is_some() {
                    return Err(Error::config(
                        model,
                        format!("association '{}': remoteKey requires through", name),
                    ));
                }
                if options.join_sort {
                    return Err(Error::config(
                        model,
                        format!("association '{}': joinSort requires through", name),
                    ));
                }
                Ok(Self {
                    name,
                    remote_model: options.remote_model.clone(),
                    foreign_key,
                    on_delete: Some(options.on_delete.unwrap_or_default()),
                    through: None,
                    remote_key: None,
                    join_sort: false,
                })
            }
        }
    }

    pub fn is_through(&self) -> bool {
        self.through.is_some()
    }
}

/// Many-to-one association read through a local foreign key column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BelongsTo {
    /// Property name, lowerCamelCase.
    pub name: String,
    pub remote_model: String,
    /// Local column holding the remote id.
    pub foreign_key: String,
}

impl BelongsTo {
    pub fn resolve(model: &str, options: &BelongsToOptions) -> Result<Self> {
        if options.remote_model.is_empty() {
            return Err(Error::config(model, "belongs-to association without remote model"));
        }
        Ok(Self {
            name: options
                .name
                .clone()
                .unwrap_or_else(|| lower_camel(&options.remote_model)),
            remote_model: options.remote_model.clone(),
            foreign_key: options
                .foreign_key
                .clone()
                .unwrap_or_else(|| foreign_key_for(&options.remote_model)),
        })
    }
}

/// Default foreign key column referencing `model`: `fk<Model>`.
pub fn foreign_key_for(model: &str) -> String {
    format!("fk{}", model)
}

/// `AlbumTrack` -> `albumTrack`.
pub fn lower_camel(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The three accessors synthesized per has-many association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorOp {
    /// `new<Name>`: build a child with the foreign key filled in
    New,
    /// `find<Name>`
    Find,
    /// `sorted<Name>`
    Sorted,
}

impl AccessorOp {
    const ALL: [AccessorOp; 3] = [AccessorOp::New, AccessorOp::Find, AccessorOp::Sorted];

    pub const fn prefix(self) -> &'static str {
        match self {
            AccessorOp::New => "new",
            AccessorOp::Find => "find",
            AccessorOp::Sorted => "sorted",
        }
    }
}

/// Accessor table entry: which operation on which has-many association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accessor {
    pub op: AccessorOp,
    /// Index into the factory's has-many list.
    pub association: usize,
}

/// Build the accessor lookup table for `associations`.
///
/// `new<Name>` is not generated for through-associations. Two associations
/// producing the same accessor name are a configuration error.
pub fn accessor_table(model: &str, associations: &[HasMany]) -> Result<HashMap<String, Accessor>> {
    let mut table = HashMap::new();
    for (index, assoc) in associations.iter().enumerate() {
        for op in AccessorOp::ALL {
            if op == AccessorOp::New && assoc.is_through() {
                continue;
            }
            let accessor = format!("{}{}", op.prefix(), assoc.name);
            let entry = Accessor {
                op,
                association: index,
            };
            if table.insert(accessor.clone(), entry).is_some() {
                return Err(Error::config(
                    model,
                    format!("duplicate association accessor '{}'", accessor),
                ));
            }
        }
    }
    Ok(table)
}
