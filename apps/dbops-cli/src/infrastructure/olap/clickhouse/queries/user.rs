use super::{backtick, non_empty, on_cluster, owned, quote, QueryBuildError};

/// How a user authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identification {
    Sha256Hash(String),
    NoPassword,
}

impl Identification {
    fn render(&self) -> String {
        match self {
            Identification::Sha256Hash(hash) => {
                format!("IDENTIFIED WITH sha256_hash BY {}", quote(hash))
            }
            Identification::NoPassword => "IDENTIFIED WITH no_password".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateUserQuery {
    name: String,
    cluster: Option<String>,
    identification: Identification,
    settings_profile: Option<String>,
}

impl CreateUserQuery {
    pub fn new(name: &str, identification: Identification) -> Self {
        Self {
            name: name.to_string(),
            cluster: None,
            identification,
            settings_profile: None,
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
        non_empty(&self.name, "CREATE USER", "name")?;
        if let Identification::Sha256Hash(hash) = &self.identification {
            non_empty(hash, "CREATE USER", "password hash")?;
        }

        let mut tokens = vec!["CREATE USER".to_string(), backtick(&self.name)];
        tokens.extend(on_cluster(&self.cluster));
        tokens.push(self.identification.render());
        if let Some(profile) = &self.settings_profile {
            tokens.push(format!("SETTINGS PROFILE {}", backtick(profile)));
        }

        Ok(format!("{};", tokens.join(" ")))
    }
}

/// Swaps the default settings profile of a user.
#[derive(Debug, Clone, Default)]
pub struct AlterUserQuery {
    name: String,
    cluster: Option<String>,
    old_profile: Option<String>,
    new_profile: Option<String>,
}

impl AlterUserQuery {
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
            "ALTER USER",
            &self.name,
            &self.cluster,
            &self.old_profile,
            &self.new_profile,
        )
    }
}

/// Shared by ALTER USER and ALTER ROLE, which only differ by keyword.
pub(super) fn alter_profiles(
    statement: &'static str,
    name: &str,
    cluster: &Option<String>,
    old_profile: &Option<String>,
    new_profile: &Option<String>,
) -> Result<String, QueryBuildError> {
    non_empty(name, statement, "name")?;
    if old_profile == new_profile {
        return Err(QueryBuildError::NoChanges { statement });
    }

    let mut tokens = vec![statement.to_string(), backtick(name)];
    tokens.extend(on_cluster(cluster));
    if let Some(old) = old_profile {
        tokens.push(format!("DROP PROFILES {}", backtick(old)));
    }
    if let Some(new) = new_profile {
        tokens.push(format!("ADD PROFILES {}", backtick(new)));
    }

    Ok(format!("{};", tokens.join(" ")))
}

#[derive(Debug, Clone, Default)]
pub struct DropUserQuery {
    name: String,
    cluster: Option<String>,
}

impl DropUserQuery {
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
        non_empty(&self.name, "DROP USER", "name")?;

        let mut tokens = vec!["DROP USER".to_string(), backtick(&self.name)];
        tokens.extend(on_cluster(&self.cluster));

        Ok(format!("{};", tokens.join(" ")))
    }
}
