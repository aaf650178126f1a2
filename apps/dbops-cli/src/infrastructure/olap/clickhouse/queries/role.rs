use super::user::alter_profiles;
use super::{backtick, non_empty, on_cluster, owned, QueryBuildError};

#[derive(Debug, Clone, Default)]
pub struct CreateRoleQuery {
    name: String,
    cluster: Option<String>,
    settings_profile: Option<String>,
}

impl CreateRoleQuery {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_cluster(mut self, cluster: Option<&str>) -> Self {
        self.cluster = owned(cluster);
        self
    }

    pub fn with_settings_profile(mut self, profile: Option<&str>) -> Self {
        self.settings_profile = owned(profile);
        self
    }

    pub fn build(&self) -> Result<String, QueryBuildError> {
        non_empty(&self.name, "CREATE ROLE", "name")?;

        let mut tokens = vec!["CREATE ROLE".to_string(), backtick(&self.name)];
        tokens.extend(on_cluster(&self.cluster));
        if let Some(profile) = &self.settings_profile {
            tokens.push(format!("SETTINGS PROFILE {}", backtick(profile)));
        }

        Ok(format!("{};", tokens.join(" ")))
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlterRoleQuery {
    name: String,
    cluster: Option<String>,
    old_profile: Option<String>,
    new_profile: Option<String>,
}

impl AlterRoleQuery {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_cluster(mut self, cluster: Option<&str>) -> Self {
        self.cluster = owned(cluster);
        self
    }

    pub fn with_old_settings_profile(mut self, profile: Option<&str>) -> Self {
        self.old_profile = owned(profile);
        self
    }

    pub fn with_new_settings_profile(mut self, profile: Option<&str>) -> Self {
        self.new_profile = owned(profile);
        self
    }

    pub fn build(&self) -> Result<String, QueryBuildError> {
        alter_profiles(
            "ALTER ROLE",
            &self.name,
            &self.cluster,
            &self.old_profile,
            &self.new_profile,
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct DropRoleQuery {
    name: String,
    cluster: Option<String>,
}

impl DropRoleQuery {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cluster: None,
        }
    }

    pub fn with_cluster(mut self, cluster: Option<&str>) -> Self {
        self.cluster = owned(cluster);
        self
    }

    pub fn build(&self) -> Result<String, QueryBuildError> {
        non_empty(&self.name, "DROP ROLE", "name")?;

        let mut tokens = vec!["DROP ROLE".to_string(), backtick(&self.name)];
        tokens.extend(on_cluster(&self.cluster));

        Ok(format!("{};", tokens.join(" ")))
    }
}
