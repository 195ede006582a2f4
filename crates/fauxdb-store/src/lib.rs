//! Collection store and engine store. A `CollectionStore` owns
//! one namespace's documents and indexes; an `EngineStore` lazily creates and
//! looks up collection stores by namespace, and hands out snapshots for the
//! transaction manager to isolate against.

mod collection;
mod engine;
mod error;
mod index;

pub use collection::{CollectionStore, DeleteOutcome, UpdateOutcome};
pub use engine::{CollectionSnapshot, EngineSnapshot, EngineStore, Namespace, NamespaceResolver};
pub use error::{Result, StoreError};
pub use index::IndexDefinition;
