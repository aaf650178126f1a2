use tracing::info;

use super::retry::{retry_create, OpContext};
use super::settings_profile::{SettingsProfile, ELEMENTS_CATALOG};
use super::{build_error, DbOpsClient, DbOpsError};
use crate::infrastructure::olap::clickhouse::client::ClickHouseExecutor;
use crate::infrastructure::olap::clickhouse::errors::RowError;
use crate::infrastructure::olap::clickhouse::queries::{
    AlterSettingsProfileQuery, Field, SelectQuery, SettingChange, SettingClause, Where,
    Writability,
};
use crate::infrastructure::olap::clickhouse::row::Row;

const RESOURCE_TYPE: &str = "setting";

/// One setting constraint inside a settings profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Setting {
    pub name: String,
    pub value: Option<String>,
    pub min: Option<String>,
    pub max: Option<String>,
    pub writability: Option<Writability>,
}

impl Setting {
    fn clause(&self) -> SettingClause {
        SettingClause {
            name: self.name.clone(),
            value: self.value.clone(),
            min: self.min.clone(),
            max: self.max.clone(),
            writability: self.writability,
        }
    }

    fn from_row(name: &str, row: &Row) -> Result<Self, RowError> {
        let writability = row
            .get_nullable_string("writability")?
            .map(|w| {
                w.parse::<Writability>()
                    .map_err(|_| RowError::InvalidValue {
                        column: "writability".to_string(),
                        value: w,
                        expected: "setting writability",
                    })
            })
            .transpose()?;

        Ok(Self {
            name: name.to_string(),
            value: row.get_nullable_string("value")?,
            min: row.get_nullable_string("min")?,
            max: row.get_nullable_string("max")?,
            writability,
        })
    }
}

/// What an update has to send to move `current` to `desired`.
#[derive(Debug, PartialEq, Eq)]
enum SettingUpdate {
    Unchanged,
    /// Only the fields that differ.
    Modify(SettingClause),
    /// A field has to be cleared, which MODIFY cannot express.
    Recreate,
}

fn plan_update(current: &Setting, desired: &Setting) -> SettingUpdate {
    fn changed<T: Clone + PartialEq>(
        current: &Option<T>,
        desired: &Option<T>,
        clears: &mut bool,
    ) -> Option<T> {
        if current == desired {
            return None;
        }
        if desired.is_none() {
            *clears = true;
        }
        desired.clone()
    }

    let mut clears = false;
    let clause = SettingClause {
        name: desired.name.clone(),
        value: changed(&current.value, &desired.value, &mut clears),
        min: changed(&current.min, &desired.min, &mut clears),
        max: changed(&current.max, &desired.max, &mut clears),
        writability: changed(&current.writability, &desired.writability, &mut clears),
    };

    if clears {
        SettingUpdate::Recreate
    } else if clause == (SettingClause {
        name: desired.name.clone(),
        ..Default::default()
    }) {
        SettingUpdate::Unchanged
    } else {
        SettingUpdate::Modify(clause)
    }
}

impl<E: ClickHouseExecutor> DbOpsClient<E> {
    pub async fn create_setting(
        &self,
        ctx: &OpContext,
        profile_id: &str,
        setting: &Setting,
        cluster: Option<&str>,
    ) -> Result<Setting, DbOpsError> {
        const OPERATION: &str = "create setting";

        let profile = self.require_settings_profile(ctx, profile_id).await?;
        self.alter_profile(
            ctx,
            OPERATION,
            &profile,
            SettingChange::Add(setting.clause()),
            cluster,
        )
        .await?;
        info!("Added setting {} to profile {}", setting.name, profile.name);

        self.confirm_setting(ctx, profile_id, &setting.name).await
    }

    /// Returns `None` when either the profile or the setting is missing.
    pub async fn get_setting(
        &self,
        ctx: &OpContext,
        profile_id: &str,
        name: &str,
    ) -> Result<Option<Setting>, DbOpsError> {
        const OPERATION: &str = "get setting";

        let Some(profile) = self.get_settings_profile(ctx, profile_id).await? else {
            return Ok(None);
        };

        let sql = SelectQuery::new(
            vec![
                Field::new("value"),
                Field::new("min"),
                Field::new("max"),
                Field::new("writability").to_string_cast(),
            ],
            ELEMENTS_CATALOG,
        )
        .with_where(Where::equals("profile_name", profile.name.as_str()))
        .with_where(Where::equals("setting_name", name))
        .build()
        .map_err(build_error(OPERATION))?;

        let mut setting = None;
        self.select(ctx, OPERATION, &sql, |r| {
            if setting.is_none() {
                setting = Some(Setting::from_row(name, r)?);
            }
            Ok(())
        })
        .await?;

        Ok(setting)
    }

    /// Changes only the fields that differ from the server. Clearing a field
    /// drops the setting and adds it back.
    pub async fn update_setting(
        &self,
        ctx: &OpContext,
        profile_id: &str,
        desired: &Setting,
        cluster: Option<&str>,
    ) -> Result<Setting, DbOpsError> {
        const OPERATION: &str = "update setting";

        let profile = self.require_settings_profile(ctx, profile_id).await?;
        let current = self
            .get_setting(ctx, profile_id, &desired.name)
            .await?
            .ok_or_else(|| DbOpsError::NotFound {
                resource_type: RESOURCE_TYPE,
                identifier: format!("{} in profile {}", desired.name, profile.name),
            })?;

        match plan_update(&current, desired) {
            SettingUpdate::Unchanged => return Ok(current),
            SettingUpdate::Modify(clause) => {
                self.alter_profile(
                    ctx,
                    OPERATION,
                    &profile,
                    SettingChange::Modify(clause),
                    cluster,
                )
                .await?;
            }
            SettingUpdate::Recreate => {
                self.alter_profile(
                    ctx,
                    OPERATION,
                    &profile,
                    SettingChange::Drop(desired.name.clone()),
                    cluster,
                )
                .await?;
                self.alter_profile(
                    ctx,
                    OPERATION,
                    &profile,
                    SettingChange::Add(desired.clause()),
                    cluster,
                )
                .await?;
            }
        }
        info!("Updated setting {} in profile {}", desired.name, profile.name);

        self.confirm_setting(ctx, profile_id, &desired.name).await
    }

    /// Removes the setting. Nothing is sent when the profile or the setting is
    /// already gone.
    pub async fn delete_setting(
        &self,
        ctx: &OpContext,
        profile_id: &str,
        name: &str,
        cluster: Option<&str>,
    ) -> Result<(), DbOpsError> {
        const OPERATION: &str = "delete setting";

        let Some(profile) = self.get_settings_profile(ctx, profile_id).await? else {
            return Ok(());
        };
        if self.get_setting(ctx, profile_id, name).await?.is_none() {
            return Ok(());
        }

        self.alter_profile(
            ctx,
            OPERATION,
            &profile,
            SettingChange::Drop(name.to_string()),
            cluster,
        )
        .await?;
        info!("Removed setting {} from profile {}", name, profile.name);

        Ok(())
    }

    async fn require_settings_profile(
        &self,
        ctx: &OpContext,
        profile_id: &str,
    ) -> Result<SettingsProfile, DbOpsError> {
        self.get_settings_profile(ctx, profile_id)
            .await?
            .ok_or_else(|| DbOpsError::NotFound {
                resource_type: "settings profile",
                identifier: profile_id.to_string(),
            })
    }

    async fn alter_profile(
        &self,
        ctx: &OpContext,
        operation: &'static str,
        profile: &SettingsProfile,
        change: SettingChange,
        cluster: Option<&str>,
    ) -> Result<(), DbOpsError> {
        let sql = AlterSettingsProfileQuery::new(&profile.name)
            .with_cluster(cluster)
            .with_change(change)
            .build()
            .map_err(build_error(operation))?;
        self.exec(ctx, operation, &sql).await
    }

    async fn confirm_setting(
        &self,
        ctx: &OpContext,
        profile_id: &str,
        name: &str,
    ) -> Result<Setting, DbOpsError> {
        retry_create(
            ctx,
            self.retry_policy.create_timeout,
            RESOURCE_TYPE,
            name,
            move |attempt| async move { self.get_setting(&attempt, profile_id, name).await },
        )
        .await
    }
}
