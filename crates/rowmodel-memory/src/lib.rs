//! In-memory storage driver for RowModel.
//!
//! `MemoryStore` implements [`RowStore`](rowmodel_core::RowStore) over
//! tables held in process memory. It supports declared column types
//! (sized text columns report their limit), read-only views, snapshot
//! transactions and a TTL result cache for repeated reads.
//!
//! # Example
//!
//! ```
//! use rowmodel_core::{Filter, FindOptions, Row, RowStore, Value};
//! use rowmodel_memory::MemoryStore;
//!
//! let store = MemoryStore::new();
//! store.create_table("people", &[("name", "VARCHAR(40)")]).unwrap();
//!
//! let mut row = Row::from_pairs([("name", Value::from("Ann"))]);
//! store.save("people", &mut row).unwrap();
//! assert_eq!(row.id(), Some(1));
//!
//! let found = store.find("people", &Filter::All, &FindOptions::default()).unwrap();
//! assert_eq!(found.len(), 1);
//! ```

pub mod cache;
pub mod store;

pub use cache::QueryCache;
pub use store::MemoryStore;
