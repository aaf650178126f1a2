use std::fmt;
use std::str::FromStr;

use super::{backtick, non_empty, on_cluster, owned, quote, QueryBuildError};

/// Whether a setting inside a profile may be changed by the users it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Writability {
    Writable,
    Const,
    ChangeableInReadonly,
}

impl fmt::Display for Writability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Writability::Writable => "WRITABLE",
            Writability::Const => "CONST",
            Writability::ChangeableInReadonly => "CHANGEABLE_IN_READONLY",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Writability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "WRITABLE" => Ok(Writability::Writable),
            "CONST" | "READONLY" => Ok(Writability::Const),
            "CHANGEABLE_IN_READONLY" => Ok(Writability::ChangeableInReadonly),
            other => Err(format!("unknown writability '{other}'")),
        }
    }
}

/// A setting constraint as it appears after `ADD SETTING` / `MODIFY SETTING`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingClause {
    pub name: String,
    pub value: Option<String>,
    pub min: Option<String>,
    pub max: Option<String>,
    pub writability: Option<Writability>,
}

impl SettingClause {
    fn render(&self) -> String {
        let mut tokens = vec![backtick(&self.name)];
        if let Some(value) = &self.value {
            tokens.push(format!("= {}", quote(value)));
        }
        if let Some(min) = &self.min {
            tokens.push(format!("MIN {}", quote(min)));
        }
        if let Some(max) = &self.max {
            tokens.push(format!("MAX {}", quote(max)));
        }
        if let Some(writability) = self.writability {
            tokens.push(writability.to_string());
        }
        tokens.join(" ")
    }

    /// A setting with nothing but a name would be a no-op for MODIFY.
    fn has_constraint(&self) -> bool {
        self.value.is_some() || self.min.is_some() || self.max.is_some() || self.writability.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingChange {
    Add(SettingClause),
    Modify(SettingClause),
    Drop(String),
}

#[derive(Debug, Clone, Default)]
pub struct CreateSettingsProfileQuery {
    name: String,
    cluster: Option<String>,
    inherit_profile: Option<String>,
}

impl CreateSettingsProfileQuery {
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

    pub fn with_inherit_profile(mut self, profile: Option<&str>) -> Self {
        self.inherit_profile = owned(profile);
        self
    }

    pub fn build(&self) -> Result<String, QueryBuildError> {
        non_empty(&self.name, "CREATE SETTINGS PROFILE", "name")?;

        let mut tokens = vec!["CREATE SETTINGS PROFILE".to_string(), backtick(&self.name)];
        tokens.extend(on_cluster(&self.cluster));
        if let Some(profile) = &self.inherit_profile {
            tokens.push(format!("SETTINGS INHERIT {}", backtick(profile)));
        }

        Ok(format!("{};", tokens.join(" ")))
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlterSettingsProfileQuery {
    name: String,
    cluster: Option<String>,
    change: Option<SettingChange>,
}

impl AlterSettingsProfileQuery {
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

    pub fn with_change(mut self, change: SettingChange) -> Self {
        self.change = Some(change);
        self
    }

    pub fn build(&self) -> Result<String, QueryBuildError> {
        const STATEMENT: &str = "ALTER SETTINGS PROFILE";
        non_empty(&self.name, STATEMENT, "name")?;

        let change = match &self.change {
            Some(SettingChange::Add(clause)) => {
                non_empty(&clause.name, STATEMENT, "setting name")?;
                format!("ADD SETTING {}", clause.render())
            }
            Some(SettingChange::Modify(clause)) => {
                non_empty(&clause.name, STATEMENT, "setting name")?;
                if !clause.has_constraint() {
                    return Err(QueryBuildError::NoChanges {
                        statement: STATEMENT,
                    });
                }
                format!("MODIFY SETTING {}", clause.render())
            }
            Some(SettingChange::Drop(name)) => {
                non_empty(name, STATEMENT, "setting name")?;
                format!("DROP SETTING {}", backtick(name))
            }
            None => {
                return Err(QueryBuildError::NoChanges {
                    statement: STATEMENT,
                })
            }
        };

        let mut tokens = vec![STATEMENT.to_string(), backtick(&self.name)];
        tokens.extend(on_cluster(&self.cluster));
        tokens.push(change);

        Ok(format!("{};", tokens.join(" ")))
    }
}

#[derive(Debug, Clone, Default)]
pub struct DropSettingsProfileQuery {
    name: String,
    cluster: Option<String>,
}

impl DropSettingsProfileQuery {
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
        non_empty(&self.name, "DROP SETTINGS PROFILE", "name")?;

        let mut tokens = vec!["DROP SETTINGS PROFILE".to_string(), backtick(&self.name)];
        tokens.extend(on_cluster(&self.cluster));

        Ok(format!("{};", tokens.join(" ")))
    }
}
