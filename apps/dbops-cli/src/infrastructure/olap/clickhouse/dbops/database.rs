use serde::Serialize;
use tracing::{debug, info};

use super::retry::{retry_create, retry_read, OpContext};
use super::{build_error, DbOpsClient, DbOpsError};
use crate::infrastructure::olap::clickhouse::client::ClickHouseExecutor;
use crate::infrastructure::olap::clickhouse::errors::RowError;
use crate::infrastructure::olap::clickhouse::queries::{
    CreateDatabaseQuery, DropDatabaseQuery, Field, SelectQuery, Where,
};
use crate::infrastructure::olap::clickhouse::row::Row;

const RESOURCE_TYPE: &str = "database";
const CATALOG: &str = "system.databases";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Database {
    pub uuid: String,
    pub name: String,
    pub comment: Option<String>,
}

impl Database {
    fn from_row(row: &Row) -> Result<Self, RowError> {
        Ok(Self {
            uuid: row.get_string("uuid")?,
            name: row.get_string("name")?,
            // The catalog reports a missing comment as an empty string
            comment: row.get_nullable_string("comment")?.filter(|c| !c.is_empty()),
        })
    }
}

fn select_databases(predicate: Where) -> SelectQuery {
    SelectQuery::new(
        vec![
            Field::new("uuid").to_string_cast(),
            Field::new("name"),
            Field::new("comment"),
        ],
        CATALOG,
    )
    .with_where(predicate)
}

impl<E: ClickHouseExecutor> DbOpsClient<E> {
    /// Creates the database and returns it once the catalog shows it.
    pub async fn create_database(
        &self,
        ctx: &OpContext,
        name: &str,
        comment: Option<&str>,
        cluster: Option<&str>,
    ) -> Result<Database, DbOpsError> {
        const OPERATION: &str = "create database";

        let sql = CreateDatabaseQuery::new(name)
            .with_cluster(cluster)
            .with_comment(comment)
            .build()
            .map_err(build_error(OPERATION))?;
        self.exec(ctx, OPERATION, &sql).await?;
        info!("Created database {}", name);

        let timeout = self.retry_policy.create_timeout;
        // One confirmation window covers both lookups.
        let ctx = &ctx.clone().with_timeout(timeout);
        let uuid = retry_create(ctx, timeout, RESOURCE_TYPE, name, move |attempt| async move {
            self.find_id_by_name(&attempt, OPERATION, CATALOG, "uuid", name)
                .await
        })
        .await?;

        let uuid = uuid.as_str();
        retry_create(ctx, timeout, RESOURCE_TYPE, name, move |attempt| async move {
            self.get_database(&attempt, uuid).await
        })
        .await
    }

    /// Returns `None` when no database has this UUID.
    pub async fn get_database(
        &self,
        ctx: &OpContext,
        uuid: &str,
    ) -> Result<Option<Database>, DbOpsError> {
        self.select_database(ctx, Where::equals("uuid", uuid)).await
    }

    pub async fn find_database_by_name(
        &self,
        ctx: &OpContext,
        name: &str,
    ) -> Result<Option<Database>, DbOpsError> {
        self.select_database(ctx, Where::equals("name", name)).await
    }

    /// Like [`Self::get_database`], but a miss is retried for the read window
    /// before the database is reported as absent.
    pub async fn read_database(
        &self,
        ctx: &OpContext,
        uuid: &str,
    ) -> Result<Option<Database>, DbOpsError> {
        retry_read(
            ctx,
            self.retry_policy.read_timeout,
            RESOURCE_TYPE,
            uuid,
            move |attempt| async move { self.get_database(&attempt, uuid).await },
        )
        .await
    }

    /// Drops the database. Deleting a database that no longer exists succeeds.
    pub async fn delete_database(
        &self,
        ctx: &OpContext,
        uuid: &str,
        cluster: Option<&str>,
    ) -> Result<(), DbOpsError> {
        const OPERATION: &str = "delete database";

        let Some(database) = self.get_database(ctx, uuid).await? else {
            debug!(
                resource_identifier = uuid,
                "Database not found, treating as deleted"
            );
            return Ok(());
        };

        let sql = DropDatabaseQuery::new(&database.name)
            .with_cluster(cluster)
            .build()
            .map_err(build_error(OPERATION))?;
        self.exec(ctx, OPERATION, &sql).await?;
        info!("Dropped database {}", database.name);

        Ok(())
    }

    async fn select_database(
        &self,
        ctx: &OpContext,
        predicate: Where,
    ) -> Result<Option<Database>, DbOpsError> {
        const OPERATION: &str = "get database";

        let sql = select_databases(predicate)
            .build()
            .map_err(build_error(OPERATION))?;

        let mut database = None;
        self.select(ctx, OPERATION, &sql, |r| {
            database = Some(Database::from_row(r)?);
            Ok(())
        })
        .await?;

        Ok(database)
    }
}
