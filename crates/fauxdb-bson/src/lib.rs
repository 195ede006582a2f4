//! Value model & path resolver underpinning the matcher, applier and
//! aggregation pipeline: canonical BSON comparison/equality plus dotted
//! path resolution, built directly on top of `bson::Bson`.

mod collation;
mod path;
mod value;

pub use collation::Collation;
pub use path::{PathError, PathResolution, remove_path, resolve, set_path};
pub use value::{
    compare_numeric, compare_values, deep_copy, deep_copy_doc, matches_type_code, type_alias_code,
    type_code, value_equals,
};
