pub(crate) mod admin;
pub(crate) mod aggregate;
pub(crate) mod crud;
pub(crate) mod indexes;
pub(crate) mod support;
pub(crate) mod transactions;
