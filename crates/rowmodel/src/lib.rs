//! RowModel - schema-driven active-record models.
//!
//! RowModel builds models from the schema of an existing store, providing:
//!
//! - Factories that read column metadata once and find, sort and create
//!   instances
//! - Has-many (direct or through a join model) and belongs-to associations
//! - JSON columns and user-defined object attributes with resource release
//! - Delete propagation (restrict, cascade, set null) enforced in
//!   application code, inside one transaction per top-level call
//!
//! # Quick Start
//!
//! ```
//! use rowmodel::prelude::*;
//! use rowmodel_memory::MemoryStore;
//! use std::sync::Arc;
//!
//! let store = MemoryStore::new();
//! store.create_table("Album", &[("title", "VARCHAR(40)")]).unwrap();
//! store.create_table("Track", &[("title", "TEXT"), ("fkAlbum", "INTEGER")]).unwrap();
//!
//! let registry = Registry::new(Arc::new(store));
//! let albums = registry
//!     .register(
//!         ModelOptions::new("Album")
//!             .has_many(HasManyOptions::new("Track").name("Tracks").on_delete(OnDelete::Cascade)),
//!     )
//!     .unwrap();
//! registry.register(ModelOptions::new("Track").compare_keys(["title"])).unwrap();
//!
//! let mut album = albums.new_instance([("title", Value::from("Blue"))]).unwrap();
//! album.store(false).unwrap();
//! let mut track = album.new_related("Tracks", [("title", Value::from("River"))]).unwrap();
//! track.store(false).unwrap();
//!
//! assert_eq!(album.sorted_related("Tracks", &Filter::All).unwrap().len(), 1);
//! album.delete(false).unwrap();
//! assert_eq!(registry.factory("Track").unwrap().count(None).unwrap(), 0);
//! ```

pub mod association;
mod cascade;
pub mod codec;
pub mod compare;
pub mod factory;
pub mod instance;
pub mod options;
pub mod registry;
pub mod sanitize;

pub use association::{Accessor, AccessorOp, BelongsTo, HasMany};
pub use codec::{AttrState, ObjectAttr, ObjectAttrType};
pub use compare::CompareRule;
pub use factory::Factory;
pub use instance::{Instance, InstanceState, Related};
pub use options::{
    BelongsToOptions, Comparator, CompareOption, HasManyOptions, MalformedJson, ModelHooks,
    ModelOptions, ObjectAttrOptions, OnDelete,
};
pub use registry::Registry;
pub use sanitize::Sanitizer;

pub use rowmodel_core::{
    ColumnSchema, Error, Filter, FindOptions, OrderBy, OrderDirection, QueryError, QueryErrorKind,
    Result, Row, RowStore, ValidationError, ValidationErrorKind, Value,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        // Models
        BelongsToOptions,
        CompareOption,
        // Core types
        Error,
        Factory,
        Filter,
        FindOptions,
        HasManyOptions,
        Instance,
        InstanceState,
        ModelHooks,
        ModelOptions,
        // Object attributes
        ObjectAttr,
        ObjectAttrType,
        AttrState,
        OnDelete,
        OrderBy,
        Registry,
        Related,
        Result,
        Row,
        RowStore,
        Value,
    };
}
