use bson::{Bson, Document};
use fauxdb_aggregate::{CollectionResolver, Stage, run_pipeline};
use fauxdb_bson::{Collation, PathResolution, deep_copy_doc, resolve, value_equals};
use fauxdb_query::{ArrayFilterCond, FieldPredicate, Filter, Mutation, apply_update, matches};

use crate::error::{Result, StoreError};
use crate::index::IndexDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched_count: usize,
    pub modified_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub matched_count: usize,
    pub deleted_count: usize,
}

/// A single namespace's documents and indexes. Every public method is meant
/// to run under the namespace's own lock — see the engine store, which hands
/// out `Arc<Mutex<CollectionStore>>` per namespace.
#[derive(Debug, Clone, Default)]
pub struct CollectionStore {
    pub(crate) documents: Vec<Document>,
    pub(crate) indexes: Vec<IndexDefinition>,
}

impl CollectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from previously captured documents and indexes, the
    /// way a transaction snapshot is turned back into something the matcher
    /// and applier can run against.
    pub fn from_parts(documents: Vec<Document>, indexes: Vec<IndexDefinition>) -> Self {
        Self { documents, indexes }
    }

    pub fn insert_many(&mut self, docs: Vec<Document>) -> Result<Vec<Document>> {
        let prepared: Vec<Document> = docs.into_iter().map(ensure_id).collect();
        let mut candidate = self.documents.clone();
        candidate.extend(prepared.iter().cloned());
        validate_unique(&candidate, &self.indexes)?;
        self.documents = candidate;
        Ok(prepared)
    }

    /// Returns `(numIndexesBefore, numIndexesAfter)`.
    pub fn create_indexes(&mut self, defs: Vec<IndexDefinition>) -> Result<(usize, usize)> {
        let before = self.indexes.len();
        for def in defs {
            def.validate()?;
            if self.indexes.iter().any(|existing| existing.name == def.name) {
                continue;
            }
            if def.unique {
                let path = def.single_field_path()?.to_string();
                validate_unique_path(&self.documents, &path, &def.name)?;
            }
            self.indexes.push(def);
        }
        Ok((before, self.indexes.len()))
    }

    pub fn list_indexes(&self) -> Vec<IndexDefinition> {
        self.indexes.clone()
    }

    pub fn find(&self, filter: &Filter, collation: &Collation) -> Vec<Document> {
        self.documents
            .iter()
            .filter(|d| matches(d, filter, collation))
            .map(deep_copy_doc)
            .collect()
    }

    pub fn update(
        &mut self,
        filter: &Filter,
        mutation: &Mutation,
        array_filters: &[ArrayFilterCond],
        collation: &Collation,
        multi: bool,
        upsert: bool,
    ) -> Result<(UpdateOutcome, Option<Bson>)> {
        let mut matched: Vec<usize> = self
            .documents
            .iter()
            .enumerate()
            .filter(|(_, d)| matches(d, filter, collation))
            .map(|(i, _)| i)
            .collect();
        if !multi && matched.len() > 1 {
            matched.truncate(1);
        }

        if matched.is_empty() {
            if !upsert {
                return Ok((
                    UpdateOutcome {
                        matched_count: 0,
                        modified_count: 0,
                    },
                    None,
                ));
            }
            let base = match mutation {
                Mutation::Replacement(_) => Document::new(),
                Mutation::Operator(_) => extract_equality_seed(filter),
            };
            let (applied, _) = apply_update(&base, mutation, array_filters, collation, true)?;
            let new_doc = ensure_id(applied);
            let id = new_doc.get("_id").cloned();
            let mut candidate = self.documents.clone();
            candidate.push(new_doc);
            validate_unique(&candidate, &self.indexes)?;
            self.documents = candidate;
            return Ok((
                UpdateOutcome {
                    matched_count: 0,
                    modified_count: 1,
                },
                id,
            ));
        }

        let mut candidate = self.documents.clone();
        let mut modified_count = 0;
        for &i in &matched {
            let (new_doc, changed) = apply_update(&candidate[i], mutation, array_filters, collation, false)?;
            if changed {
                modified_count += 1;
            }
            candidate[i] = new_doc;
        }
        validate_unique(&candidate, &self.indexes)?;
        self.documents = candidate;
        Ok((
            UpdateOutcome {
                matched_count: matched.len(),
                modified_count,
            },
            None,
        ))
    }

    pub fn delete_many(&mut self, filter: &Filter, collation: &Collation, limit_one: bool) -> DeleteOutcome {
        if limit_one {
            let pos = self.documents.iter().position(|d| matches(d, filter, collation));
            if let Some(i) = pos {
                self.documents.remove(i);
                return DeleteOutcome { matched_count: 1, deleted_count: 1 };
            }
            return DeleteOutcome { matched_count: 0, deleted_count: 0 };
        }
        let before = self.documents.len();
        self.documents.retain(|d| !matches(d, filter, collation));
        let deleted = before - self.documents.len();
        DeleteOutcome {
            matched_count: deleted,
            deleted_count: deleted,
        }
    }

    pub fn aggregate(&self, stages: &[Stage], resolver: &dyn CollectionResolver) -> Result<Vec<Document>> {
        Ok(run_pipeline(self.documents.clone(), stages, resolver)?)
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Wholesale replaces the store's contents, bypassing unique-index
    /// validation. Used to restore a snapshot (`EngineStore::replace_with`)
    /// and to merge a committed transaction's writes (`fauxdb-txn`).
    pub fn replace_contents(&mut self, documents: Vec<Document>, indexes: Vec<IndexDefinition>) {
        self.documents = documents;
        self.indexes = indexes;
    }
}

fn ensure_id(mut doc: Document) -> Document {
    if !doc.contains_key("_id") {
        doc.insert("_id", Bson::ObjectId(bson::oid::ObjectId::new()));
    }
    doc
}

/// Top-level bare-equality fields seed an upserted document the way `mongod`
/// does: `{a: 1, b: {$gt: 2}}` seeds `{a: 1}` only.
fn extract_equality_seed(filter: &Filter) -> Document {
    let mut seed = Document::new();
    if let Filter::And(children) = filter {
        for child in children {
            if let Filter::Field(name, FieldPredicate::Eq(value)) = child {
                seed.insert(name.clone(), value.clone());
            }
        }
    }
    seed
}

fn field_value_or_null(doc: &Document, path: &str) -> Bson {
    match resolve(doc, path) {
        PathResolution::Missing => Bson::Null,
        PathResolution::Existing(values) => values.into_iter().next().unwrap_or(Bson::Null),
    }
}

fn validate_unique(documents: &[Document], indexes: &[IndexDefinition]) -> Result<()> {
    for index in indexes.iter().filter(|i| i.unique) {
        let path = index.single_field_path()?;
        validate_unique_path(documents, path, &index.name)?;
    }
    Ok(())
}

fn validate_unique_path(documents: &[Document], path: &str, index_name: &str) -> Result<()> {
    let mut seen: Vec<Bson> = Vec::with_capacity(documents.len());
    for doc in documents {
        let value = field_value_or_null(doc, path);
        if seen.iter().any(|existing| value_equals(existing, &value)) {
            return Err(StoreError::DuplicateKey(index_name.to_string()));
        }
        seen.push(value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use fauxdb_query::parse_filter;

    fn unique_index(name: &str, field: &str) -> IndexDefinition {
        IndexDefinition {
            name: name.to_string(),
            key: doc! { field: 1 },
            unique: true,
            sparse: false,
            partial_filter_expression: None,
            collation: None,
            expire_after_seconds: None,
        }
    }

    #[test]
    fn insert_many_is_all_or_nothing_on_uniqueness() {
        let mut store = CollectionStore::new();
        store.create_indexes(vec![unique_index("by_email", "email")]).unwrap();
        store.insert_many(vec![doc! { "email": "a@x.com" }]).unwrap();
        let err = store
            .insert_many(vec![doc! { "email": "b@x.com" }, doc! { "email": "a@x.com" }])
            .unwrap_err();
        assert_eq!(err, StoreError::DuplicateKey("by_email".into()));
        assert_eq!(store.documents().len(), 1);
    }

    #[test]
    fn create_indexes_is_idempotent_by_name() {
        let mut store = CollectionStore::new();
        let (_, after1) = store.create_indexes(vec![unique_index("idx", "a")]).unwrap();
        let (_, after2) = store.create_indexes(vec![unique_index("idx", "a")]).unwrap();
        assert_eq!(after1, after2);
    }

    #[test]
    fn update_rejects_violation_without_mutating() {
        let mut store = CollectionStore::new();
        store.create_indexes(vec![unique_index("by_email", "email")]).unwrap();
        store
            .insert_many(vec![doc! { "email": "a@x.com" }, doc! { "email": "b@x.com" }])
            .unwrap();
        let filter = parse_filter(&doc! { "email": "b@x.com" }).unwrap();
        let mutation = fauxdb_query::parse_update(&doc! { "$set": { "email": "a@x.com" } }).unwrap();
        let err = store
            .update(&filter, &mutation, &[], &Collation::simple(), false, false)
            .unwrap_err();
        assert_eq!(err, StoreError::DuplicateKey("by_email".into()));
        assert_eq!(store.documents()[1].get_str("email").unwrap(), "b@x.com");
    }

    #[test]
    fn upsert_seeds_equality_fields() {
        let mut store = CollectionStore::new();
        let filter = parse_filter(&doc! { "sku": "abc" }).unwrap();
        let mutation = fauxdb_query::parse_update(&doc! { "$set": { "qty": 1 } }).unwrap();
        let (outcome, id) = store
            .update(&filter, &mutation, &[], &Collation::simple(), false, true)
            .unwrap();
        assert_eq!(outcome.modified_count, 1);
        assert!(id.is_some());
        assert_eq!(store.documents()[0].get_str("sku").unwrap(), "abc");
        assert_eq!(store.documents()[0].get_i32("qty").unwrap(), 1);
    }
}
