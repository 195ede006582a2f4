use bson::Document;
use fauxdb_bson::Collation;

use crate::error::{Result, StoreError};

/// `sparse`, `partialFilterExpression`, `collation` and `expireAfterSeconds`
/// are accepted and stored but only `unique` is enforced at write time.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    pub name: String,
    pub key: Document,
    pub unique: bool,
    pub sparse: bool,
    pub partial_filter_expression: Option<Document>,
    pub collation: Option<Collation>,
    pub expire_after_seconds: Option<i64>,
}

impl IndexDefinition {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(StoreError::BadValue("index name must not be blank".into()));
        }
        if self.key.is_empty() {
            return Err(StoreError::BadValue("index key must not be blank".into()));
        }
        Ok(())
    }

    /// The single field path this index is keyed on. Only single-field
    /// unique indexes are enforced in this engine.
    pub fn single_field_path(&self) -> Result<&str> {
        self.key
            .keys()
            .next()
            .map(|s| s.as_str())
            .ok_or_else(|| StoreError::BadValue("index key must not be blank".into()))
    }
}
