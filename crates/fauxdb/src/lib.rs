//! In-memory, embeddable MongoDB-compatible command execution engine used to
//! back integration tests: a real MongoDB driver can point at [`Dispatcher`]
//! and exercise CRUD, aggregation and single-node transaction flows without
//! an external `mongod`.
//!
//! Wire framing and network transport are out of scope — [`Dispatcher::dispatch`]
//! takes and returns BSON command documents directly.

mod commands;
mod cursor;
mod dispatcher;
mod error;
mod profile;
mod response;

pub use dispatcher::Dispatcher;
pub use error::{DispatchError, Result};
pub use profile::DeploymentProfile;
