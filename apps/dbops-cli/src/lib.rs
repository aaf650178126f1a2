//! Reconciles ClickHouse access-control objects (databases, users, roles,
//! grants, row policies and settings profiles) against a desired state over
//! the HTTP interface.

pub mod infrastructure;
pub mod utilities;

#[cfg(test)]
#[path = "../tests/test_utils/mod.rs"]
pub mod test_utils;
