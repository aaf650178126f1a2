use tracing::{debug, info};

use super::retry::{retry_create, OpContext};
use super::{build_error, DbOpsClient, DbOpsError};
use crate::infrastructure::olap::clickhouse::client::ClickHouseExecutor;
use crate::infrastructure::olap::clickhouse::queries::{
    AlterRowPolicyQuery, CreateRowPolicyQuery, DropRowPolicyQuery, Field, RowPolicyGrantees,
    SelectQuery, Where,
};

const RESOURCE_TYPE: &str = "row policy";
const CATALOG: &str = "system.row_policies";

/// A row policy on one table.
///
/// The catalog does not expose grantees and operations in a form that maps back
/// onto this struct, so reads carry them over from the value they were given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowPolicy {
    pub name: String,
    pub database: String,
    pub table: String,
    /// Empty means `SELECT`.
    pub for_operations: Vec<String>,
    pub select_filter: Option<String>,
    pub is_restrictive: bool,
    pub grantees: RowPolicyGrantees,
}

impl RowPolicy {
    fn identifier(&self) -> String {
        format!("{} ON {}.{}", self.name, self.database, self.table)
    }

    fn same_key(&self, other: &RowPolicy) -> bool {
        self.name == other.name && self.database == other.database && self.table == other.table
    }

    fn effective_operations(&self) -> Vec<String> {
        if self.for_operations.is_empty() {
            vec!["SELECT".to_string()]
        } else {
            self.for_operations.clone()
        }
    }
}

impl<E: ClickHouseExecutor> DbOpsClient<E> {
    pub async fn create_row_policy(
        &self,
        ctx: &OpContext,
        policy: &RowPolicy,
        cluster: Option<&str>,
    ) -> Result<RowPolicy, DbOpsError> {
        const OPERATION: &str = "create row policy";

        let sql = CreateRowPolicyQuery::new(
            &policy.name,
            &policy.database,
            &policy.table,
            policy.grantees.clone(),
        )
        .with_cluster(cluster)
        .with_operations(&policy.for_operations)
        .with_select_filter(policy.select_filter.as_deref())
        .with_restrictive(policy.is_restrictive)
        .build()
        .map_err(build_error(OPERATION))?;
        self.exec(ctx, OPERATION, &sql).await?;

        let identifier = policy.identifier();
        info!("Created row policy {}", identifier);

        retry_create(
            ctx,
            self.retry_policy.create_timeout,
            RESOURCE_TYPE,
            &identifier,
            move |attempt| async move { self.get_row_policy(&attempt, policy).await },
        )
        .await
    }

    /// Looks the policy up by name, database and table. Grantees and
    /// operations in the result are copied from `policy`.
    pub async fn get_row_policy(
        &self,
        ctx: &OpContext,
        policy: &RowPolicy,
    ) -> Result<Option<RowPolicy>, DbOpsError> {
        const OPERATION: &str = "get row policy";

        let sql = SelectQuery::new(
            vec![
                Field::new("short_name"),
                Field::new("select_filter"),
                Field::new("is_restrictive"),
            ],
            CATALOG,
        )
        .with_where(Where::equals("short_name", policy.name.as_str()))
        .with_where(Where::equals("database", policy.database.as_str()))
        .with_where(Where::equals("table", policy.table.as_str()))
        .build()
        .map_err(build_error(OPERATION))?;

        let mut found = None;
        self.select(ctx, OPERATION, &sql, |r| {
            found = Some(RowPolicy {
                name: r.get_string("short_name")?,
                database: policy.database.clone(),
                table: policy.table.clone(),
                for_operations: policy.for_operations.clone(),
                select_filter: r.get_nullable_string("select_filter")?,
                is_restrictive: r.get_bool("is_restrictive")?,
                grantees: policy.grantees.clone(),
            });
            Ok(())
        })
        .await?;

        Ok(found)
    }

    /// Moves the policy from `previous` to `desired`, altering only the clauses
    /// that differ. The filter and kind are compared against the server; the
    /// write-once grantees and operations against `previous`.
    pub async fn update_row_policy(
        &self,
        ctx: &OpContext,
        previous: &RowPolicy,
        desired: &RowPolicy,
        cluster: Option<&str>,
    ) -> Result<RowPolicy, DbOpsError> {
        const OPERATION: &str = "update row policy";

        if !previous.same_key(desired) {
            return Err(DbOpsError::InvalidInput(format!(
                "row policy {} cannot be renamed or moved to {}",
                previous.identifier(),
                desired.identifier()
            )));
        }

        let current = self
            .get_row_policy(ctx, previous)
            .await?
            .ok_or_else(|| DbOpsError::NotFound {
                resource_type: RESOURCE_TYPE,
                identifier: previous.identifier(),
            })?;

        let mut query = AlterRowPolicyQuery::new(&desired.name, &desired.database, &desired.table)
            .with_cluster(cluster);
        let mut changed = false;

        if desired.select_filter != current.select_filter {
            query = query.with_select_filter(desired.select_filter.as_deref());
            changed = true;
        }
        if desired.is_restrictive != current.is_restrictive {
            query = query.with_restrictive(desired.is_restrictive);
            changed = true;
        }
        if desired.effective_operations() != current.effective_operations() {
            query = query.with_operations(&desired.effective_operations());
            changed = true;
        }
        if desired.grantees != current.grantees {
            query = query.with_grantees(desired.grantees.clone());
            changed = true;
        }

        if !changed {
            debug!(
                resource_identifier = %previous.identifier(),
                "Row policy already up to date"
            );
            return Ok(RowPolicy {
                for_operations: desired.for_operations.clone(),
                ..current
            });
        }

        let sql = query.build().map_err(build_error(OPERATION))?;
        self.exec(ctx, OPERATION, &sql).await?;

        let identifier = desired.identifier();
        info!("Updated row policy {}", identifier);

        retry_create(
            ctx,
            self.retry_policy.create_timeout,
            RESOURCE_TYPE,
            &identifier,
            move |attempt| async move { self.get_row_policy(&attempt, desired).await },
        )
        .await
    }

    /// `DROP ROW POLICY IF EXISTS`, so deleting twice is fine.
    pub async fn delete_row_policy(
        &self,
        ctx: &OpContext,
        name: &str,
        database: &str,
        table: &str,
        cluster: Option<&str>,
    ) -> Result<(), DbOpsError> {
        const OPERATION: &str = "delete row policy";

        let sql = DropRowPolicyQuery::new(name, database, table)
            .with_cluster(cluster)
            .build()
            .map_err(build_error(OPERATION))?;
        self.exec(ctx, OPERATION, &sql).await?;
        info!("Dropped row policy {} ON {}.{}", name, database, table);

        Ok(())
    }
}
