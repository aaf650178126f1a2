use super::{
    backtick, identifier_or_pattern, keyword, non_empty, on_cluster, owned, QueryBuildError,
};

/// Privilege, scope and grantee shared by GRANT and REVOKE.
#[derive(Debug, Clone, Default)]
struct PrivilegeTarget {
    access_type: String,
    grantee: String,
    database: Option<String>,
    table: Option<String>,
    column: Option<String>,
    cluster: Option<String>,
}

impl PrivilegeTarget {
    fn new(access_type: &str, grantee: &str) -> Self {
        Self {
            access_type: access_type.to_string(),
            grantee: grantee.to_string(),
            ..Default::default()
        }
    }

    /// Renders `PRIV[(col)] ON scope`, then `keyword grantee`, then `ON CLUSTER`.
    fn tokens(
        &self,
        statement: &'static str,
        direction: &str,
    ) -> Result<Vec<String>, QueryBuildError> {
        non_empty(&self.access_type, statement, "access type")?;
        non_empty(&self.grantee, statement, "grantee")?;
        let access_type = keyword(&self.access_type, statement, "access type")?;

        if self.column.is_some() && self.table.is_none() {
            return Err(QueryBuildError::Invalid {
                statement,
                reason: "a column can only be specified together with a table".to_string(),
            });
        }
        if self.table.is_some() && self.database.is_none() {
            return Err(QueryBuildError::Invalid {
                statement,
                reason: "a table can only be specified together with a database".to_string(),
            });
        }

        let privilege = match &self.column {
            Some(column) => format!("{access_type}({})", backtick(column)),
            None => access_type,
        };

        let scope = match (&self.database, &self.table) {
            (Some(database), Some(table)) => format!(
                "{}.{}",
                identifier_or_pattern(database),
                identifier_or_pattern(table)
            ),
            (Some(database), None) => format!("{}.*", identifier_or_pattern(database)),
            _ => "*.*".to_string(),
        };

        let mut tokens = vec![
            statement.to_string(),
            privilege,
            "ON".to_string(),
            scope,
            direction.to_string(),
            backtick(&self.grantee),
        ];
        tokens.extend(on_cluster(&self.cluster));

        Ok(tokens)
    }
}

/// `GRANT <priv> ON <scope> TO <grantee> [ON CLUSTER] [WITH GRANT OPTION];`
#[derive(Debug, Clone)]
pub struct GrantPrivilegeQuery {
    target: PrivilegeTarget,
    grant_option: bool,
}

impl GrantPrivilegeQuery {
    pub fn new(access_type: &str, grantee: &str) -> Self {
        Self {
            target: PrivilegeTarget::new(access_type, grantee),
            grant_option: false,
        }
    }

    pub fn with_database(mut self, database: Option<&str>) -> Self {
        self.target.database = owned(database);
        self
    }

    pub fn with_table(mut self, table: Option<&str>) -> Self {
        self.target.table = owned(table);
        self
    }

    pub fn with_column(mut self, column: Option<&str>) -> Self {
        self.target.column = owned(column);
        self
    }

    pub fn with_cluster(mut self, cluster: Option<&str>) -> Self {
        self.target.cluster = owned(cluster);
        self
    }

    pub fn with_grant_option(mut self, grant_option: bool) -> Self {
        self.grant_option = grant_option;
        self
    }

    pub fn build(&self) -> Result<String, QueryBuildError> {
        let mut tokens = self.target.tokens("GRANT", "TO")?;
        if self.grant_option {
            tokens.push("WITH GRANT OPTION".to_string());
        }

        Ok(format!("{};", tokens.join(" ")))
    }
}

/// `REVOKE <priv> ON <scope> FROM <grantee> [ON CLUSTER];`
#[derive(Debug, Clone)]
pub struct RevokePrivilegeQuery {
    target: PrivilegeTarget,
}

impl RevokePrivilegeQuery {
    pub fn new(access_type: &str, grantee: &str) -> Self {
        Self {
            target: PrivilegeTarget::new(access_type, grantee),
        }
    }

    pub fn with_database(mut self, database: Option<&str>) -> Self {
        self.target.database = owned(database);
        self
    }

    pub fn with_table(mut self, table: Option<&str>) -> Self {
        self.target.table = owned(table);
        self
    }

    pub fn with_column(mut self, column: Option<&str>) -> Self {
        self.target.column = owned(column);
        self
    }

    pub fn with_cluster(mut self, cluster: Option<&str>) -> Self {
        self.target.cluster = owned(cluster);
        self
    }

    pub fn build(&self) -> Result<String, QueryBuildError> {
        Ok(format!("{};", self.target.tokens("REVOKE", "FROM")?.join(" ")))
    }
}
