use serde::Serialize;
use tracing::{debug, info};

use super::retry::{retry_create, OpContext};
use super::{build_error, DbOpsClient, DbOpsError};
use crate::infrastructure::olap::clickhouse::client::ClickHouseExecutor;
use crate::infrastructure::olap::clickhouse::queries::{
    CreateSettingsProfileQuery, DropSettingsProfileQuery, Field, SelectQuery, Where,
};

const RESOURCE_TYPE: &str = "settings profile";
const CATALOG: &str = "system.settings_profiles";
pub(super) const ELEMENTS_CATALOG: &str = "system.settings_profile_elements";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsProfile {
    pub id: String,
    pub name: String,
    pub inherit_profile: Option<String>,
}

impl<E: ClickHouseExecutor> DbOpsClient<E> {
    pub async fn create_settings_profile(
        &self,
        ctx: &OpContext,
        name: &str,
        inherit_profile: Option<&str>,
        cluster: Option<&str>,
    ) -> Result<SettingsProfile, DbOpsError> {
        const OPERATION: &str = "create settings profile";

        let sql = CreateSettingsProfileQuery::new(name)
            .with_cluster(cluster)
            .with_inherit_profile(inherit_profile)
            .build()
            .map_err(build_error(OPERATION))?;
        self.exec(ctx, OPERATION, &sql).await?;
        info!("Created settings profile {}", name);

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
            self.get_settings_profile(&attempt, id).await
        })
        .await
    }

    pub async fn get_settings_profile(
        &self,
        ctx: &OpContext,
        id: &str,
    ) -> Result<Option<SettingsProfile>, DbOpsError> {
        const OPERATION: &str = "get settings profile";

        let sql = SelectQuery::new(
            vec![Field::new("id").to_string_cast(), Field::new("name")],
            CATALOG,
        )
        .with_where(Where::equals("id", id))
        .build()
        .map_err(build_error(OPERATION))?;

        let mut found = None;
        self.select(ctx, OPERATION, &sql, |r| {
            found = Some((r.get_string("id")?, r.get_string("name")?));
            Ok(())
        })
        .await?;

        let Some((id, name)) = found else {
            return Ok(None);
        };

        let inherit_profile = self
            .inherited_profile(ctx, OPERATION, "profile_name", &name)
            .await?;

        Ok(Some(SettingsProfile {
            id,
            name,
            inherit_profile,
        }))
    }

    /// Drops the profile. A profile that no longer exists is not an error.
    pub async fn delete_settings_profile(
        &self,
        ctx: &OpContext,
        id: &str,
        cluster: Option<&str>,
    ) -> Result<(), DbOpsError> {
        const OPERATION: &str = "delete settings profile";

        let Some(profile) = self.get_settings_profile(ctx, id).await? else {
            debug!(
                resource_identifier = id,
                "Settings profile not found, treating as deleted"
            );
            return Ok(());
        };

        let sql = DropSettingsProfileQuery::new(&profile.name)
            .with_cluster(cluster)
            .build()
            .map_err(build_error(OPERATION))?;
        self.exec(ctx, OPERATION, &sql).await?;
        info!("Dropped settings profile {}", profile.name);

        Ok(())
    }

    /// The profile inherited by a user, role or profile, looked up by
    /// `owner_column` (`user_name`, `role_name` or `profile_name`).
    pub(super) async fn inherited_profile(
        &self,
        ctx: &OpContext,
        operation: &'static str,
        owner_column: &str,
        owner: &str,
    ) -> Result<Option<String>, DbOpsError> {
        let sql = SelectQuery::new(vec![Field::new("inherit_profile")], ELEMENTS_CATALOG)
            .with_where(Where::equals(owner_column, owner))
            .with_where(Where::differs("inherit_profile", ""))
            .build()
            .map_err(build_error(operation))?;

        let mut profile = None;
        self.select(ctx, operation, &sql, |r| {
            if profile.is_none() {
                profile = r.get_nullable_string("inherit_profile")?;
            }
            Ok(())
        })
        .await?;

        Ok(profile)
    }
}
