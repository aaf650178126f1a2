//! Create/read/update/delete operations for ClickHouse access-control objects.
//!
//! Every operation follows the same shape: build the statement, execute it
//! through a [`ClickHouseExecutor`], then read the object back from the
//! `system` catalog. Reads after a write go through [`retry::retry_create`]
//! because the catalog may lag behind the write; plain reads return `None`
//! when nothing matches.

use std::time::Duration;

use crate::infrastructure::olap::clickhouse::client::ClickHouseExecutor;
use crate::infrastructure::olap::clickhouse::errors::{ExecutorError, QueryBuildError, RowError};
use crate::infrastructure::olap::clickhouse::queries::{Field, SelectQuery, Where};
use crate::infrastructure::olap::clickhouse::row::Row;

pub mod capabilities;
pub mod database;
pub mod grant;
pub mod retry;
pub mod role;
pub mod row_policy;
pub mod setting;
pub mod settings_profile;
pub mod user;

pub use capabilities::{Capabilities, CapabilityError, CapabilityFlags, ServerCapabilities};
pub use database::Database;
pub use grant::{GrantMatcher, GrantPrivilege, Grantee};
pub use retry::{OpContext, RetryPolicy};
pub use role::Role;
pub use row_policy::RowPolicy;
pub use setting::Setting;
pub use settings_profile::SettingsProfile;
pub use user::User;

#[derive(Debug, thiserror::Error)]
pub enum DbOpsError {
    #[error("error building query to {operation}: {source}")]
    Build {
        operation: &'static str,
        source: QueryBuildError,
    },

    #[error("error running query to {operation}: {source}")]
    Execute {
        operation: &'static str,
        source: ExecutorError,
    },

    #[error("error scanning query result to {operation}: {source}")]
    Row {
        operation: &'static str,
        source: RowError,
    },

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// The write went through but the object never showed up in the catalog.
    #[error(
        "{resource_type} {identifier:?} was created or modified but could not be confirmed within timeout ({timeout:?})"
    )]
    NotConfirmed {
        resource_type: &'static str,
        identifier: String,
        timeout: Duration,
    },

    #[error("error retrieving created {resource_type}: {source}")]
    Retrieve {
        resource_type: &'static str,
        source: Box<DbOpsError>,
    },

    #[error("{resource_type} {identifier:?} was not found")]
    NotFound {
        resource_type: &'static str,
        identifier: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("operation was cancelled")]
    Cancelled,

    #[error("operation deadline exceeded")]
    DeadlineExceeded,
}

fn build_error(operation: &'static str) -> impl FnOnce(QueryBuildError) -> DbOpsError {
    move |source| DbOpsError::Build { operation, source }
}

/// Resource operations over a single executor.
///
/// Server capabilities are detected on first use and cached for the lifetime
/// of the client.
pub struct DbOpsClient<E: ClickHouseExecutor> {
    executor: E,
    capabilities: Capabilities,
    retry_policy: RetryPolicy,
}

impl<E: ClickHouseExecutor> DbOpsClient<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            capabilities: Capabilities::new(),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    /// Server version and the flags derived from it. The first call queries the
    /// server; a failure is cached like a success.
    pub async fn capabilities(&self, ctx: &OpContext) -> Result<ServerCapabilities, DbOpsError> {
        Ok(ctx.run(self.capabilities.get(&self.executor)).await??)
    }

    async fn exec(
        &self,
        ctx: &OpContext,
        operation: &'static str,
        sql: &str,
    ) -> Result<(), DbOpsError> {
        ctx.run(self.executor.execute(sql))
            .await?
            .map_err(|source| DbOpsError::Execute { operation, source })
    }

    async fn select<F>(
        &self,
        ctx: &OpContext,
        operation: &'static str,
        sql: &str,
        mut handler: F,
    ) -> Result<(), DbOpsError>
    where
        F: FnMut(&Row) -> Result<(), RowError> + Send,
    {
        ctx.run(self.executor.query(sql, &mut handler))
            .await?
            .map_err(|e| match e {
                ExecutorError::Row(source) => DbOpsError::Row { operation, source },
                source => DbOpsError::Execute { operation, source },
            })
    }

    /// Looks up the server-assigned identifier of a named catalog entry
    /// (`id` in `system.users`, `uuid` in `system.databases`, ...).
    async fn find_id_by_name(
        &self,
        ctx: &OpContext,
        operation: &'static str,
        catalog: &str,
        id_column: &str,
        name: &str,
    ) -> Result<Option<String>, DbOpsError> {
        let sql = SelectQuery::new(vec![Field::new(id_column).to_string_cast()], catalog)
            .with_where(Where::equals("name", name))
            .build()
            .map_err(build_error(operation))?;

        let mut id = None;
        self.select(ctx, operation, &sql, |r| {
            id = Some(r.get_string(id_column)?);
            Ok(())
        })
        .await?;

        Ok(id)
    }
}
