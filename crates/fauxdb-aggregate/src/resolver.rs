use bson::Document;

/// Supplied by the engine store so pipeline stages that cross collection
/// boundaries (`$lookup`, `$unionWith`, `$graphLookup`) can read another
/// namespace's current documents without the aggregation crate knowing
/// anything about how collections are stored.
pub trait CollectionResolver {
    fn resolve(&self, collection: &str) -> Option<Vec<Document>>;
}
