use serde::Serialize;
use tracing::{debug, info};

use super::retry::{retry_create, retry_read, OpContext};
use super::{build_error, DbOpsClient, DbOpsError};
use crate::infrastructure::olap::clickhouse::client::ClickHouseExecutor;
use crate::infrastructure::olap::clickhouse::queries::{
    AlterRoleQuery, CreateRoleQuery, DropRoleQuery, Field, SelectQuery, Where,
};

const RESOURCE_TYPE: &str = "role";
const CATALOG: &str = "system.roles";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub settings_profile: Option<String>,
}

impl<E: ClickHouseExecutor> DbOpsClient<E> {
    pub async fn create_role(
        &self,
        ctx: &OpContext,
        name: &str,
        settings_profile: Option<&str>,
        cluster: Option<&str>,
    ) -> Result<Role, DbOpsError> {
        const OPERATION: &str = "create role";

        let sql = CreateRoleQuery::new(name)
            .with_cluster(cluster)
            .with_settings_profile(settings_profile)
            .build()
            .map_err(build_error(OPERATION))?;
        self.exec(ctx, OPERATION, &sql).await?;
        info!("Created role {}", name);

        let timeout = self.retry_policy.create_timeout;
        // One confirmation window covers both lookups.
        let ctx = &ctx.clone().with_timeout(timeout);
        let id = retry_create(ctx, timeout, RESOURCE_TYPE, name, move |attempt| async move {
            self.find_id_by_name(&attempt, OPERATION, CATALOG, "id", name)
                .await
        })
        .await?;

        let id = id.as_str();
        retry_create(ctx, timeout, RESOURCE_TYPE, name, move |attempt| async move {
            self.get_role(&attempt, id).await
        })
        .await
    }

    pub async fn get_role(&self, ctx: &OpContext, id: &str) -> Result<Option<Role>, DbOpsError> {
        const OPERATION: &str = "get role";

        let sql = SelectQuery::new(
            vec![Field::new("id").to_string_cast(), Field::new("name")],
            CATALOG,
        )
        .with_where(Where::equals("id", id))
        .build()
        .map_err(build_error(OPERATION))?;

        let mut name = None;
        self.select(ctx, OPERATION, &sql, |r| {
            name = Some(r.get_string("name")?);
            Ok(())
        })
        .await?;

        let Some(name) = name else {
            return Ok(None);
        };

        let settings_profile = self
            .inherited_profile(ctx, OPERATION, "role_name", &name)
            .await?;

        Ok(Some(Role {
            id: id.to_string(),
            name,
            settings_profile,
        }))
    }

    pub async fn find_role_by_name(
        &self,
        ctx: &OpContext,
        name: &str,
    ) -> Result<Option<Role>, DbOpsError> {
        match self
            .find_id_by_name(ctx, "find role", CATALOG, "id", name)
            .await?
        {
            Some(id) => self.get_role(ctx, &id).await,
            None => Ok(None),
        }
    }

    pub async fn read_role(&self, ctx: &OpContext, id: &str) -> Result<Option<Role>, DbOpsError> {
        retry_read(
            ctx,
            self.retry_policy.read_timeout,
            RESOURCE_TYPE,
            id,
            move |attempt| async move { self.get_role(&attempt, id).await },
        )
        .await
    }

    pub async fn update_role_settings_profile(
        &self,
        ctx: &OpContext,
        id: &str,
        old: Option<&str>,
        new: Option<&str>,
        cluster: Option<&str>,
    ) -> Result<Role, DbOpsError> {
        const OPERATION: &str = "update role";

        let role = self
            .get_role(ctx, id)
            .await?
            .ok_or_else(|| DbOpsError::NotFound {
                resource_type: RESOURCE_TYPE,
                identifier: id.to_string(),
            })?;

        if old == new {
            return Ok(role);
        }

        let sql = AlterRoleQuery::new(&role.name)
            .with_cluster(cluster)
            .with_old_settings_profile(old)
            .with_new_settings_profile(new)
            .build()
            .map_err(build_error(OPERATION))?;
        self.exec(ctx, OPERATION, &sql).await?;
        info!("Updated settings profile of role {}", role.name);

        retry_create(
            ctx,
            self.retry_policy.create_timeout,
            RESOURCE_TYPE,
            &role.name,
            move |attempt| async move {
                self.get_role(&attempt, id)
                    .await
                    .map(|role| role.filter(|r| r.settings_profile.as_deref() == new))
            },
        )
        .await
    }

    /// Drops the role. A role that no longer exists is not an error.
    pub async fn delete_role(
        &self,
        ctx: &OpContext,
        id: &str,
        cluster: Option<&str>,
    ) -> Result<(), DbOpsError> {
        const OPERATION: &str = "delete role";

        let Some(role) = self.get_role(ctx, id).await? else {
            debug!(
                resource_identifier = id,
                "Role not found, treating as deleted"
            );
            return Ok(());
        };

        let sql = DropRoleQuery::new(&role.name)
            .with_cluster(cluster)
            .build()
            .map_err(build_error(OPERATION))?;
        self.exec(ctx, OPERATION, &sql).await?;
        info!("Dropped role {}", role.name);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::infrastructure::olap::clickhouse::dbops::RetryPolicy;
    use crate::test_utils::{row, MockExecutor};

    fn analyst() -> MockExecutor {
        let executor = MockExecutor::new();
        executor.on_query(
            "FROM `system`.`roles`",
            vec![row(&[("id", Some("r-1")), ("name", Some("analyst"))])],
        );
        executor
    }

    #[tokio::test]
    async fn test_create_role() {
        let client = DbOpsClient::new(analyst());

        let role = client
            .create_role(&OpContext::background(), "analyst", None, Some("main"))
            .await
            .unwrap();

        assert_eq!(
            role,
            Role {
                id: "r-1".to_string(),
                name: "analyst".to_string(),
                settings_profile: None,
            }
        );
        assert_eq!(
            client.executor().executed(),
            vec!["CREATE ROLE `analyst` ON CLUSTER `main`;"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_role_not_confirmed_when_profile_never_shows() {
        let client = DbOpsClient::new(analyst()).with_retry_policy(RetryPolicy {
            create_timeout: Duration::from_secs(1),
            ..Default::default()
        });

        let err = client
            .update_role_settings_profile(
                &OpContext::background(),
                "r-1",
                None,
                Some("readonly"),
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DbOpsError::NotConfirmed {
                resource_type: "role",
                ..
            }
        ));
        assert_eq!(
            client.executor().executed(),
            vec!["ALTER ROLE `analyst` ADD PROFILES `readonly`;"]
        );
    }

    #[tokio::test]
    async fn test_find_role_by_name() {
        let client = DbOpsClient::new(analyst());

        let role = client
            .find_role_by_name(&OpContext::background(), "analyst")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(role.id, "r-1");

        let missing = DbOpsClient::new(MockExecutor::new())
            .find_role_by_name(&OpContext::background(), "ghost")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_delete_role_is_idempotent() {
        let client = DbOpsClient::new(MockExecutor::new());
        client
            .delete_role(&OpContext::background(), "r-1", None)
            .await
            .unwrap();
        assert!(client.executor().executed().is_empty());
    }

    #[tokio::test]
    async fn test_delete_role() {
        let client = DbOpsClient::new(analyst());
        client
            .delete_role(&OpContext::background(), "r-1", None)
            .await
            .unwrap();
        assert_eq!(client.executor().executed(), vec!["DROP ROLE `analyst`;"]);
    }
}
