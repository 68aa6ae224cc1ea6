//! Core types and traits for RowModel.
//!
//! This crate provides the foundations the model layer builds on:
//!
//! - `Value` and `Row` for dynamically typed table rows
//! - `Filter` and `FindOptions` for parameterized reads
//! - `ColumnSchema` for schema introspection results
//! - `RowStore`, the storage trait drivers implement
//! - `Error`, the error type shared by all RowModel crates

pub mod error;
pub mod filter;
pub mod row;
pub mod schema;
pub mod store;
pub mod value;

pub use error::{
    AmbiguousError, ConfigError, DecodeError, Error, FieldValidationError, QueryError,
    QueryErrorKind, RestrictConflict, Result, SchemaError, SchemaErrorKind, TypeError,
    ValidationError, ValidationErrorKind,
};
pub use filter::{CmpOp, Filter, FindOptions, OrderBy, OrderDirection};
pub use row::{ColumnInfo, FromValue, PRIMARY_KEY, Row};
pub use schema::{ColumnSchema, ParsedSqlType};
pub use store::{RowStore, transaction};
pub use value::Value;
