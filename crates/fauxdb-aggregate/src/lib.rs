//! Aggregation pipeline executor. Stages are parsed once into a
//! `Stage` tree and then executed sequentially over an input document
//! sequence via [`run_pipeline`].

mod accumulate;
mod error;
mod exec;
mod resolver;
mod stage;

pub use accumulate::Accumulator;
pub use error::{AggregateError, Result};
pub use exec::run_pipeline;
pub use resolver::CollectionResolver;
pub use stage::{GraphLookupSpec, LookupSpec, Stage, UnionWithSpec, parse_pipeline, parse_stage};
