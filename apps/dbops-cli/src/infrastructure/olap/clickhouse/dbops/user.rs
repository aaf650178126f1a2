use serde::Serialize;
use tracing::{debug, info};

use super::retry::{retry_create, retry_read, OpContext};
use super::{build_error, DbOpsClient, DbOpsError};
use crate::infrastructure::olap::clickhouse::client::ClickHouseExecutor;
use crate::infrastructure::olap::clickhouse::queries::{
    AlterUserQuery, CreateUserQuery, DropUserQuery, Field, Identification, SelectQuery, Where,
};

const RESOURCE_TYPE: &str = "user";
const CATALOG: &str = "system.users";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    /// Never read back from the server; only set on the value returned by
    /// [`DbOpsClient::create_user`].
    #[serde(skip)]
    pub password_sha256_hash: Option<String>,
    pub settings_profile: Option<String>,
}

impl<E: ClickHouseExecutor> DbOpsClient<E> {
    /// Creates a user authenticated by a SHA-256 password hash.
    pub async fn create_user(
        &self,
        ctx: &OpContext,
        name: &str,
        password_sha256_hash: &str,
        settings_profile: Option<&str>,
        cluster: Option<&str>,
    ) -> Result<User, DbOpsError> {
        const OPERATION: &str = "create user";

        let sql = CreateUserQuery::new(
            name,
            Identification::Sha256Hash(password_sha256_hash.to_string()),
        )
        .with_cluster(cluster)
        .with_settings_profile(settings_profile)
        .build()
        .map_err(build_error(OPERATION))?;
        self.exec(ctx, OPERATION, &sql).await?;
        info!("Created user {}", name);

        let timeout = self.retry_policy.create_timeout;
        // One confirmation window covers both lookups.
        let ctx = &ctx.clone().with_timeout(timeout);
        let id = retry_create(ctx, timeout, RESOURCE_TYPE, name, move |attempt| async move {
            self.find_id_by_name(&attempt, OPERATION, CATALOG, "id", name)
                .await
        })
        .await?;

        let id = id.as_str();
        let mut user = retry_create(ctx, timeout, RESOURCE_TYPE, name, move |attempt| async move {
            self.get_user(&attempt, id).await
        })
        .await?;

        user.password_sha256_hash = Some(password_sha256_hash.to_string());
        Ok(user)
    }

    /// Returns `None` when no user has this id.
    pub async fn get_user(&self, ctx: &OpContext, id: &str) -> Result<Option<User>, DbOpsError> {
        const OPERATION: &str = "get user";

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
            .inherited_profile(ctx, OPERATION, "user_name", &name)
            .await?;

        Ok(Some(User {
            id: id.to_string(),
            name,
            password_sha256_hash: None,
            settings_profile,
        }))
    }

    /// A single lookup by name; a miss is not retried.
    pub async fn find_user_by_name(
        &self,
        ctx: &OpContext,
        name: &str,
    ) -> Result<Option<User>, DbOpsError> {
        match self
            .find_id_by_name(ctx, "find user", CATALOG, "id", name)
            .await?
        {
            Some(id) => self.get_user(ctx, &id).await,
            None => Ok(None),
        }
    }

    /// Like [`Self::get_user`], but a miss is retried for the read window
    /// before the user is reported as absent.
    pub async fn read_user(&self, ctx: &OpContext, id: &str) -> Result<Option<User>, DbOpsError> {
        retry_read(
            ctx,
            self.retry_policy.read_timeout,
            RESOURCE_TYPE,
            id,
            move |attempt| async move { self.get_user(&attempt, id).await },
        )
        .await
    }

    /// Moves the user from `old` to `new` settings profile. When both are the
    /// same the current user is returned and nothing is altered.
    pub async fn update_user_settings_profile(
        &self,
        ctx: &OpContext,
        id: &str,
        old: Option<&str>,
        new: Option<&str>,
        cluster: Option<&str>,
    ) -> Result<User, DbOpsError> {
        const OPERATION: &str = "update user";

        let user = self
            .get_user(ctx, id)
            .await?
            .ok_or_else(|| DbOpsError::NotFound {
                resource_type: RESOURCE_TYPE,
                identifier: id.to_string(),
            })?;

        if old == new {
            return Ok(user);
        }

        let sql = AlterUserQuery::new(&user.name)
            .with_cluster(cluster)
            .with_old_settings_profile(old)
            .with_new_settings_profile(new)
            .build()
            .map_err(build_error(OPERATION))?;
        self.exec(ctx, OPERATION, &sql).await?;
        info!("Updated settings profile of user {}", user.name);

        retry_create(
            ctx,
            self.retry_policy.create_timeout,
            RESOURCE_TYPE,
            &user.name,
            move |attempt| async move {
                self.get_user(&attempt, id)
                    .await
                    .map(|user| user.filter(|u| u.settings_profile.as_deref() == new))
            },
        )
        .await
    }

    /// Drops the user. A user that no longer exists is not an error.
    pub async fn delete_user(
        &self,
        ctx: &OpContext,
        id: &str,
        cluster: Option<&str>,
    ) -> Result<(), DbOpsError> {
        const OPERATION: &str = "delete user";

        let Some(user) = self.get_user(ctx, id).await? else {
            debug!(
                resource_identifier = id,
                "User not found, treating as deleted"
            );
            return Ok(());
        };

        let sql = DropUserQuery::new(&user.name)
            .with_cluster(cluster)
            .build()
            .map_err(build_error(OPERATION))?;
        self.exec(ctx, OPERATION, &sql).await?;
        info!("Dropped user {}", user.name);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use std::time::Duration;

    use crate::infrastructure::olap::clickhouse::dbops::RetryPolicy;
    use crate::infrastructure::olap::clickhouse::errors::{ExecutorError, RowError};
    use crate::infrastructure::olap::clickhouse::row::Row;
    use crate::test_utils::{row, MockExecutor};

    const HASH: &str = "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8";

    fn alice() -> MockExecutor {
        let executor = MockExecutor::new();
        executor.on_query(
            "FROM `system`.`users`",
            vec![row(&[("id", Some("u-1")), ("name", Some("alice"))])],
        );
        executor
    }

    #[tokio::test]
    async fn test_create_user_carries_the_hash_over() {
        let executor = alice();
        executor.on_query(
            "`user_name` = 'alice'",
            vec![row(&[("inherit_profile", Some("readonly"))])],
        );
        let client = DbOpsClient::new(executor);

        let user = client
            .create_user(
                &OpContext::background(),
                "alice",
                HASH,
                Some("readonly"),
                None,
            )
            .await
            .unwrap();

        assert_eq!(
            user,
            User {
                id: "u-1".to_string(),
                name: "alice".to_string(),
                password_sha256_hash: Some(HASH.to_string()),
                settings_profile: Some("readonly".to_string()),
            }
        );
        assert_eq!(
            client.executor().executed(),
            vec![format!(
                "CREATE USER `alice` IDENTIFIED WITH sha256_hash BY '{HASH}' SETTINGS PROFILE `readonly`;"
            )]
        );
        assert_eq!(
            client.executor().queries()[1],
            "SELECT toString(`id`) AS `id`, `name` FROM `system`.`users` WHERE (`id` = 'u-1');"
        );
    }

    #[test]
    fn test_hash_is_not_serialized() {
        let user = User {
            id: "u-1".to_string(),
            name: "alice".to_string(),
            password_sha256_hash: Some(HASH.to_string()),
            settings_profile: None,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains(HASH));
    }

    #[tokio::test]
    async fn test_get_user_missing_is_none() {
        let client = DbOpsClient::new(MockExecutor::new());
        assert_eq!(
            client
                .get_user(&OpContext::background(), "u-1")
                .await
                .unwrap(),
            None
        );
        // The profile lookup is skipped for an absent user
        assert_eq!(client.executor().queries().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_user_is_idempotent() {
        let client = DbOpsClient::new(MockExecutor::new());
        client
            .delete_user(&OpContext::background(), "u-1", None)
            .await
            .unwrap();
        assert!(client.executor().executed().is_empty());
    }

    #[tokio::test]
    async fn test_delete_user_drops_by_name() {
        let client = DbOpsClient::new(alice());
        client
            .delete_user(&OpContext::background(), "u-1", Some("main"))
            .await
            .unwrap();
        assert_eq!(
            client.executor().executed(),
            vec!["DROP USER `alice` ON CLUSTER `main`;"]
        );
    }

    #[tokio::test]
    async fn test_update_without_change_alters_nothing() {
        let client = DbOpsClient::new(alice());
        let user = client
            .update_user_settings_profile(
                &OpContext::background(),
                "u-1",
                Some("readonly"),
                Some("readonly"),
                None,
            )
            .await
            .unwrap();
        assert_eq!(user.name, "alice");
        assert!(client.executor().executed().is_empty());
    }

    #[tokio::test]
    async fn test_update_swaps_profiles() {
        let executor = alice();
        executor.on_query(
            "`user_name` = 'alice'",
            vec![row(&[("inherit_profile", Some("analyst"))])],
        );
        let client = DbOpsClient::new(executor);

        let user = client
            .update_user_settings_profile(
                &OpContext::background(),
                "u-1",
                Some("readonly"),
                Some("analyst"),
                None,
            )
            .await
            .unwrap();

        assert_eq!(user.settings_profile.as_deref(), Some("analyst"));
        assert_eq!(
            client.executor().executed(),
            vec!["ALTER USER `alice` DROP PROFILES `readonly` ADD PROFILES `analyst`;"]
        );
    }

    #[tokio::test]
    async fn test_update_missing_user_is_not_found() {
        let client = DbOpsClient::new(MockExecutor::new());
        let err = client
            .update_user_settings_profile(&OpContext::background(), "u-1", None, Some("a"), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbOpsError::NotFound {
                resource_type: "user",
                ..
            }
        ));
    }

    /// Accepts statements but never answers a query.
    struct StalledExecutor;

    #[async_trait]
    impl ClickHouseExecutor for StalledExecutor {
        async fn execute(&self, _sql: &str) -> Result<(), ExecutorError> {
            Ok(())
        }

        async fn query(
            &self,
            _sql: &str,
            _handler: &mut (dyn for<'r> FnMut(&'r Row) -> Result<(), RowError> + Send),
        ) -> Result<(), ExecutorError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_user_on_stalled_server_is_an_error() {
        let client = DbOpsClient::new(StalledExecutor);

        let result = client.read_user(&OpContext::background(), "u-1").await;

        assert!(matches!(result, Err(DbOpsError::DeadlineExceeded)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_user_on_stalled_server_is_a_retrieve_failure() {
        let client = DbOpsClient::new(StalledExecutor);

        let err = client
            .create_user(&OpContext::background(), "alice", HASH, None, None)
            .await
            .unwrap_err();

        match err {
            DbOpsError::Retrieve {
                resource_type,
                source,
            } => {
                assert_eq!(resource_type, "user");
                assert!(matches!(*source, DbOpsError::DeadlineExceeded));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_user_confirmation_shares_one_window() {
        let executor = MockExecutor::new();
        executor.on_query_sequence(
            "`name` = 'alice'",
            vec![vec![], vec![], vec![row(&[("id", Some("u-1"))])]],
        );
        let client = DbOpsClient::new(executor).with_retry_policy(RetryPolicy {
            create_timeout: Duration::from_secs(2),
            ..Default::default()
        });
        let start = tokio::time::Instant::now();

        let err = client
            .create_user(&OpContext::background(), "alice", HASH, None, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DbOpsError::NotConfirmed {
                resource_type: "user",
                ..
            }
        ));
        // The id shows up after 150ms; the user row never does.
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_find_user_by_name_does_not_retry_a_miss() {
        let client = DbOpsClient::new(MockExecutor::new());

        let user = client
            .find_user_by_name(&OpContext::background(), "ghost")
            .await
            .unwrap();

        assert_eq!(user, None);
        assert_eq!(client.executor().queries().len(), 1);
    }
}
