use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use bson::Document;
use fauxdb_aggregate::CollectionResolver;
use fauxdb_bson::deep_copy_doc;

use crate::collection::CollectionStore;
use crate::index::IndexDefinition;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace {
    pub db: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(db: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.collection)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CollectionSnapshot {
    pub documents: Vec<Document>,
    pub indexes: Vec<IndexDefinition>,
}

/// A deep value-copy of every namespace's documents and indexes, used as the
/// basis for a transaction's isolated view and restored wholesale on
/// `replace_with`.
#[derive(Debug, Clone, Default)]
pub struct EngineSnapshot {
    pub collections: HashMap<Namespace, CollectionSnapshot>,
}

/// Thread-safe map of namespace to collection store, with lazy creation.
/// Lookups and creation are lock-free with respect to other namespaces —
/// each collection serializes its own operations behind its own mutex,
/// mirroring the per-column-family locking the teacher's in-memory store
/// uses (there: `RwLock<HashMap<String, Arc<ArcSwap<ColumnFamily>>>>`; here a
/// plain `Mutex` per collection, since collections are mutated document-at-a
/// -time rather than swapped wholesale).
#[derive(Default)]
pub struct EngineStore {
    collections: RwLock<HashMap<Namespace, Arc<Mutex<CollectionStore>>>>,
}

impl EngineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(&self, ns: &Namespace) -> Arc<Mutex<CollectionStore>> {
        if let Some(existing) = self.collections.read().unwrap().get(ns) {
            return existing.clone();
        }
        let mut collections = self.collections.write().unwrap();
        collections
            .entry(ns.clone())
            .or_insert_with(|| Arc::new(Mutex::new(CollectionStore::new())))
            .clone()
    }

    pub fn collection_exists(&self, ns: &Namespace) -> bool {
        self.collections.read().unwrap().contains_key(ns)
    }

    pub fn namespaces(&self) -> Vec<Namespace> {
        self.collections.read().unwrap().keys().cloned().collect()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let collections = self.collections.read().unwrap();
        let mut out = HashMap::new();
        for (ns, store) in collections.iter() {
            let guard = store.lock().unwrap();
            out.insert(
                ns.clone(),
                CollectionSnapshot {
                    documents: guard.documents().iter().map(deep_copy_doc).collect(),
                    indexes: guard.list_indexes(),
                },
            );
        }
        EngineSnapshot { collections: out }
    }

    /// Atomically replaces each namespace present in `snapshot` with its
    /// contents. Namespaces not present in the snapshot are left untouched.
    pub fn replace_with(&self, snapshot: EngineSnapshot) {
        for (ns, snap) in snapshot.collections {
            let arc = self.collection(&ns);
            let mut guard = arc.lock().unwrap();
            guard.replace_contents(snap.documents, snap.indexes);
        }
    }

    pub fn collection_resolver<'a>(&'a self, db: &str) -> NamespaceResolver<'a> {
        NamespaceResolver {
            engine: self,
            db: db.to_string(),
        }
    }
}

pub struct NamespaceResolver<'a> {
    engine: &'a EngineStore,
    db: String,
}

impl CollectionResolver for NamespaceResolver<'_> {
    fn resolve(&self, collection: &str) -> Option<Vec<Document>> {
        let ns = Namespace::new(self.db.clone(), collection.to_string());
        if !self.engine.collection_exists(&ns) {
            return None;
        }
        let arc = self.engine.collection(&ns);
        let guard = arc.lock().unwrap();
        Some(guard.documents().iter().map(deep_copy_doc).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn collection_creation_is_idempotent() {
        let engine = EngineStore::new();
        let ns = Namespace::new("test", "widgets");
        let a = engine.collection(&ns);
        let b = engine.collection(&ns);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn snapshot_is_a_value_copy() {
        let engine = EngineStore::new();
        let ns = Namespace::new("test", "widgets");
        engine.collection(&ns).lock().unwrap().insert_many(vec![doc! { "a": 1 }]).unwrap();
        let snap = engine.snapshot();
        engine.collection(&ns).lock().unwrap().insert_many(vec![doc! { "a": 2 }]).unwrap();
        assert_eq!(snap.collections.get(&ns).unwrap().documents.len(), 1);
        assert_eq!(engine.collection(&ns).lock().unwrap().documents().len(), 2);
    }

    #[test]
    fn resolver_returns_none_for_unknown_collection() {
        let engine = EngineStore::new();
        let resolver = engine.collection_resolver("test");
        assert!(resolver.resolve("missing").is_none());
    }
}
