use super::{backtick, keyword, non_empty, on_cluster, owned, QueryBuildError};

/// Who a row policy applies to. Exactly one mode is active at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowPolicyGrantees {
    Users(Vec<String>),
    Roles(Vec<String>),
    All,
    AllExcept(Vec<String>),
}

impl RowPolicyGrantees {
    /// The `TO` clause body, or `None` when it would name nobody.
    fn render(&self) -> Option<String> {
        let join = |names: &[String]| {
            names
                .iter()
                .map(|n| backtick(n))
                .collect::<Vec<_>>()
                .join(", ")
        };

        match self {
            RowPolicyGrantees::Users(names) | RowPolicyGrantees::Roles(names) => {
                if names.is_empty() {
                    None
                } else {
                    Some(join(names))
                }
            }
            RowPolicyGrantees::All => Some("ALL".to_string()),
            RowPolicyGrantees::AllExcept(names) if names.is_empty() => Some("ALL".to_string()),
            RowPolicyGrantees::AllExcept(names) => Some(format!("ALL EXCEPT {}", join(names))),
        }
    }
}

/// Name, cluster and target table, rendered identically by every row policy
/// statement.
#[derive(Debug, Clone, Default)]
struct PolicyTarget {
    name: String,
    database: String,
    table: String,
    cluster: Option<String>,
}

impl PolicyTarget {
    fn new(name: &str, database: &str, table: &str) -> Self {
        Self {
            name: name.to_string(),
            database: database.to_string(),
            table: table.to_string(),
            cluster: None,
        }
    }

    fn tokens(&self, statement: &'static str) -> Result<Vec<String>, QueryBuildError> {
        non_empty(&self.name, statement, "name")?;
        non_empty(&self.database, statement, "database")?;
        non_empty(&self.table, statement, "table")?;

        let mut tokens = vec![statement.to_string(), backtick(&self.name)];
        tokens.extend(on_cluster(&self.cluster));
        tokens.push(format!(
            "ON {}.{}",
            backtick(&self.database),
            backtick(&self.table)
        ));

        Ok(tokens)
    }
}

fn for_operations(
    operations: &[String],
    statement: &'static str,
) -> Result<Vec<String>, QueryBuildError> {
    operations
        .iter()
        .map(|op| keyword(op, statement, "row policy operation").map(|op| format!("FOR {op}")))
        .collect()
}

fn kind(restrictive: bool) -> &'static str {
    if restrictive {
        "AS RESTRICTIVE"
    } else {
        "AS PERMISSIVE"
    }
}

/// `CREATE ROW POLICY`. The filter is a SQL expression and is embedded as is.
#[derive(Debug, Clone)]
pub struct CreateRowPolicyQuery {
    target: PolicyTarget,
    operations: Vec<String>,
    select_filter: Option<String>,
    restrictive: bool,
    grantees: RowPolicyGrantees,
}

impl CreateRowPolicyQuery {
    pub fn new(name: &str, database: &str, table: &str, grantees: RowPolicyGrantees) -> Self {
        Self {
            target: PolicyTarget::new(name, database, table),
            operations: Vec::new(),
            select_filter: None,
            restrictive: false,
            grantees,
        }
    }

    pub fn with_cluster(mut self, cluster: Option<&str>) -> Self {
        self.target.cluster = owned(cluster);
        self
    }

    pub fn with_operations(mut self, operations: &[String]) -> Self {
        self.operations = operations.to_vec();
        self
    }

    pub fn with_select_filter(mut self, filter: Option<&str>) -> Self {
        self.select_filter = owned(filter);
        self
    }

    pub fn with_restrictive(mut self, restrictive: bool) -> Self {
        self.restrictive = restrictive;
        self
    }

    pub fn build(&self) -> Result<String, QueryBuildError> {
        const STATEMENT: &str = "CREATE ROW POLICY";

        let mut tokens = self.target.tokens(STATEMENT)?;
        tokens.extend(for_operations(&self.operations, STATEMENT)?);
        if let Some(filter) = &self.select_filter {
            tokens.push(format!("USING {filter}"));
        }
        tokens.push(kind(self.restrictive).to_string());

        let grantees = self
            .grantees
            .render()
            .ok_or(QueryBuildError::EmptyField {
                statement: STATEMENT,
                field: "grantees",
            })?;
        tokens.push(format!("TO {grantees}"));

        Ok(tokens.join(" "))
    }
}

/// `ALTER ROW POLICY` carrying only the clauses that change.
#[derive(Debug, Clone)]
pub struct AlterRowPolicyQuery {
    target: PolicyTarget,
    operations: Vec<String>,
    // `Some(None)` clears the filter.
    select_filter: Option<Option<String>>,
    restrictive: Option<bool>,
    grantees: Option<RowPolicyGrantees>,
}

impl AlterRowPolicyQuery {
    pub fn new(name: &str, database: &str, table: &str) -> Self {
        Self {
            target: PolicyTarget::new(name, database, table),
            operations: Vec::new(),
            select_filter: None,
            restrictive: None,
            grantees: None,
        }
    }

    pub fn with_cluster(mut self, cluster: Option<&str>) -> Self {
        self.target.cluster = owned(cluster);
        self
    }

    pub fn with_operations(mut self, operations: &[String]) -> Self {
        self.operations = operations.to_vec();
        self
    }

    pub fn with_select_filter(mut self, filter: Option<&str>) -> Self {
        self.select_filter = Some(owned(filter));
        self
    }

    pub fn with_restrictive(mut self, restrictive: bool) -> Self {
        self.restrictive = Some(restrictive);
        self
    }

    pub fn with_grantees(mut self, grantees: RowPolicyGrantees) -> Self {
        self.grantees = Some(grantees);
        self
    }

    pub fn build(&self) -> Result<String, QueryBuildError> {
        const STATEMENT: &str = "ALTER ROW POLICY";

        let mut tokens = self.target.tokens(STATEMENT)?;
        let mut changes = for_operations(&self.operations, STATEMENT)?;

        if let Some(restrictive) = self.restrictive {
            changes.push(kind(restrictive).to_string());
        }
        match &self.select_filter {
            Some(Some(filter)) => changes.push(format!("USING {filter}")),
            Some(None) => changes.push("USING NONE".to_string()),
            None => {}
        }
        if let Some(grantees) = self.grantees.as_ref().and_then(RowPolicyGrantees::render) {
            changes.push(format!("TO {grantees}"));
        }

        if changes.is_empty() {
            return Err(QueryBuildError::NoChanges {
                statement: STATEMENT,
            });
        }

        tokens.extend(changes);
        Ok(tokens.join(" "))
    }
}

#[derive(Debug, Clone)]
pub struct DropRowPolicyQuery {
    target: PolicyTarget,
}

impl DropRowPolicyQuery {
    pub fn new(name: &str, database: &str, table: &str) -> Self {
        Self {
            target: PolicyTarget::new(name, database, table),
        }
    }

    pub fn with_cluster(mut self, cluster: Option<&str>) -> Self {
        self.target.cluster = owned(cluster);
        self
    }

    pub fn build(&self) -> Result<String, QueryBuildError> {
        let mut tokens = self.target.tokens("DROP ROW POLICY")?;
        tokens.insert(1, "IF EXISTS".to_string());
        Ok(tokens.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_create_row_policy() {
        let sql = CreateRowPolicyQuery::new(
            "tenant_filter",
            "default",
            "events",
            RowPolicyGrantees::Users(names(&["alice", "bob"])),
        )
        .with_operations(&names(&["SELECT"]))
        .with_select_filter(Some("tenant_id = 42"))
        .with_restrictive(true)
        .build()
        .unwrap();
        assert_eq!(
            sql,
            "CREATE ROW POLICY `tenant_filter` ON `default`.`events` FOR SELECT USING tenant_id = 42 AS RESTRICTIVE TO `alice`, `bob`"
        );
    }

    #[test]
    fn test_create_row_policy_all_except() {
        let sql = CreateRowPolicyQuery::new(
            "p",
            "db",
            "t",
            RowPolicyGrantees::AllExcept(names(&["readonly"])),
        )
        .with_cluster(Some("main"))
        .with_select_filter(Some("1"))
        .build()
        .unwrap();
        assert_eq!(
            sql,
            "CREATE ROW POLICY `p` ON CLUSTER `main` ON `db`.`t` USING 1 AS PERMISSIVE TO ALL EXCEPT `readonly`"
        );
    }

    #[test]
    fn test_create_row_policy_requires_grantees() {
        let err = CreateRowPolicyQuery::new("p", "db", "t", RowPolicyGrantees::Roles(vec![]))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            QueryBuildError::EmptyField {
                statement: "CREATE ROW POLICY",
                field: "grantees"
            }
        );
    }

    #[test]
    fn test_create_row_policy_requires_key() {
        let err = CreateRowPolicyQuery::new("p", "", "t", RowPolicyGrantees::All)
            .build()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "database cannot be empty for CREATE ROW POLICY queries"
        );
    }

    #[test]
    fn test_alter_row_policy_filter_only() {
        let sql = AlterRowPolicyQuery::new("p", "db", "t")
            .with_select_filter(Some("1"))
            .build()
            .unwrap();
        assert_eq!(sql, "ALTER ROW POLICY `p` ON `db`.`t` USING 1");
    }

    #[test]
    fn test_alter_row_policy_kind_before_filter() {
        let sql = AlterRowPolicyQuery::new("my_policy", "default", "users")
            .with_select_filter(Some("1"))
            .with_restrictive(false)
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "ALTER ROW POLICY `my_policy` ON `default`.`users` AS PERMISSIVE USING 1"
        );
    }

    #[test]
    fn test_alter_row_policy_filter_and_grantees() {
        let sql = AlterRowPolicyQuery::new("my_policy", "default", "users")
            .with_select_filter(Some("user_id = 'alice'"))
            .with_grantees(RowPolicyGrantees::Users(names(&["alice"])))
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "ALTER ROW POLICY `my_policy` ON `default`.`users` USING user_id = 'alice' TO `alice`"
        );
    }

    #[test]
    fn test_alter_row_policy_full_clause_order() {
        let sql = AlterRowPolicyQuery::new("p", "db", "t")
            .with_cluster(Some("c"))
            .with_grantees(RowPolicyGrantees::All)
            .with_select_filter(Some("x > 1"))
            .with_restrictive(true)
            .with_operations(&names(&["SELECT"]))
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "ALTER ROW POLICY `p` ON CLUSTER `c` ON `db`.`t` FOR SELECT AS RESTRICTIVE USING x > 1 TO ALL"
        );
    }

    #[test]
    fn test_alter_row_policy_clears_filter() {
        let sql = AlterRowPolicyQuery::new("p", "db", "t")
            .with_select_filter(None)
            .build()
            .unwrap();
        assert_eq!(sql, "ALTER ROW POLICY `p` ON `db`.`t` USING NONE");
    }

    #[test]
    fn test_alter_row_policy_without_changes_fails() {
        let err = AlterRowPolicyQuery::new("p", "db", "t").build().unwrap_err();
        assert_eq!(
            err.to_string(),
            "at least one change must be specified for ALTER ROW POLICY"
        );

        // An empty user list names nobody, so it is not a change either.
        let err = AlterRowPolicyQuery::new("p", "db", "t")
            .with_grantees(RowPolicyGrantees::Users(vec![]))
            .build()
            .unwrap_err();
        assert!(matches!(err, QueryBuildError::NoChanges { .. }));
    }

    #[test]
    fn test_alter_row_policy_rejects_bad_operation() {
        assert!(AlterRowPolicyQuery::new("p", "db", "t")
            .with_operations(&names(&["SELECT; DROP TABLE x"]))
            .build()
            .is_err());
    }

    #[test]
    fn test_drop_row_policy() {
        assert_eq!(
            DropRowPolicyQuery::new("p", "db", "t").build().unwrap(),
            "DROP ROW POLICY IF EXISTS `p` ON `db`.`t`"
        );
        assert_eq!(
            DropRowPolicyQuery::new("p", "db", "t")
                .with_cluster(Some("main"))
                .build()
                .unwrap(),
            "DROP ROW POLICY IF EXISTS `p` ON CLUSTER `main` ON `db`.`t`"
        );
    }

    #[test]
    fn test_grantee_rendering() {
        assert_eq!(RowPolicyGrantees::All.render().as_deref(), Some("ALL"));
        assert_eq!(
            RowPolicyGrantees::AllExcept(vec![]).render().as_deref(),
            Some("ALL")
        );
        assert_eq!(
            RowPolicyGrantees::AllExcept(names(&["a", "b"]))
                .render()
                .as_deref(),
            Some("ALL EXCEPT `a`, `b`")
        );
        assert_eq!(
            RowPolicyGrantees::Roles(names(&["r`1"])).render().as_deref(),
            Some("`r\\`1`")
        );
        assert_eq!(RowPolicyGrantees::Users(vec![]).render(), None);
    }
}
