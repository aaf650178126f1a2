//! # ClickHouse access-control management
//!
//! Declarative management of ClickHouse databases, users, roles, grants, row
//! policies and settings profiles.
//!
//! - [`queries`] renders every DDL/DCL statement from typed parameters
//! - [`client`] talks to the server over HTTP and defines the
//!   [`client::ClickHouseExecutor`] seam the operations are written against
//! - [`row`] gives named-column access to result rows
//! - [`dbops`] implements create/read/update/delete for each object type and
//!   hides replication lag behind bounded retries
//!
//! ## Usage Example
//! ```rust,ignore
//! let client = DbOpsClient::new(ClickHouseClient::new(&config));
//! let ctx = OpContext::background();
//! let db = client.create_database(&ctx, "analytics", None, config.cluster()).await?;
//! ```

pub mod client;
pub mod config;
pub mod dbops;
pub mod errors;
pub mod queries;
pub mod row;
