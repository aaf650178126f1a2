//! Privilege grants.
//!
//! A grant has no identifier of its own, so it is looked up by what it grants
//! and to whom. Since 25.7 the source-family privileges (`S3`, `URL`, ...) are
//! stored as a `READ` and a `WRITE` row on an access object; [`GrantMatcher`]
//! picks the lookup that matches how the connected server stores them.

use serde::Serialize;
use tracing::info;

use super::capabilities::CapabilityFlags;
use super::retry::{retry_create, OpContext};
use super::{build_error, DbOpsClient, DbOpsError};
use crate::infrastructure::olap::clickhouse::client::ClickHouseExecutor;
use crate::infrastructure::olap::clickhouse::errors::RowError;
use crate::infrastructure::olap::clickhouse::queries::{
    Field, GrantPrivilegeQuery, RevokePrivilegeQuery, SelectQuery, Where,
};
use crate::infrastructure::olap::clickhouse::row::Row;

const RESOURCE_TYPE: &str = "grant privilege";
const CATALOG: &str = "system.grants";

/// Access types for external data sources.
pub const SOURCES_FAMILY: &[&str] = &[
    "AZURE", "FILE", "HDFS", "HIVE", "JDBC", "KAFKA", "MONGO", "MYSQL", "NATS", "ODBC",
    "POSTGRES", "RABBITMQ", "REDIS", "REMOTE", "S3", "SQLITE", "URL",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum Grantee {
    User(String),
    Role(String),
}

impl Grantee {
    pub fn name(&self) -> &str {
        match self {
            Grantee::User(name) | Grantee::Role(name) => name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Grantee::User(_) => "user",
            Grantee::Role(_) => "role",
        }
    }

    fn column(&self) -> &'static str {
        match self {
            Grantee::User(_) => "user_name",
            Grantee::Role(_) => "role_name",
        }
    }

    fn predicate(&self) -> Where {
        Where::equals(self.column(), self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantPrivilege {
    pub access_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_object: Option<String>,
    pub database: Option<String>,
    pub table: Option<String>,
    pub column: Option<String>,
    pub grantee: Grantee,
    pub grant_option: bool,
}

impl GrantPrivilege {
    /// A grant on every database and table (`*.*`).
    pub fn new(access_type: &str, grantee: Grantee) -> Self {
        Self {
            access_type: access_type.to_string(),
            access_object: None,
            database: None,
            table: None,
            column: None,
            grantee,
            grant_option: false,
        }
    }

    fn identifier(&self) -> String {
        format!(
            "{} to {} {}",
            self.access_type,
            self.grantee.kind(),
            self.grantee.name()
        )
    }

    fn scope_predicates(&self) -> [Where; 3] {
        [
            Where::equals("database", self.database.as_deref()),
            Where::equals("table", self.table.as_deref()),
            Where::equals("column", self.column.as_deref()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, RowError> {
        let grantee = match (
            row.get_nullable_string("user_name")?,
            row.get_nullable_string("role_name")?,
        ) {
            (Some(user), _) => Grantee::User(user),
            (None, Some(role)) => Grantee::Role(role),
            (None, None) => {
                return Err(RowError::UnexpectedNull {
                    column: "user_name".to_string(),
                })
            }
        };

        Ok(Self {
            access_type: row.get_string("access_type")?,
            access_object: None,
            database: row.get_nullable_string("database")?,
            table: row.get_nullable_string("table")?,
            column: row.get_nullable_string("column")?,
            grantee,
            grant_option: row.get_bool("grant_option")?,
        })
    }
}

/// How a grant is recognised in `system.grants`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantMatcher {
    /// One row with the same access type, scope and grantee.
    Classic,
    /// Both a `READ` and a `WRITE` row on `access_object` for the grantee.
    SourcesReadWrite { access_object: String },
}

impl GrantMatcher {
    pub fn select(flags: &CapabilityFlags, access_type: &str) -> Self {
        let normalized = access_type.trim().to_ascii_uppercase();
        if flags.sources_grant_read_write_separation && SOURCES_FAMILY.contains(&normalized.as_str())
        {
            GrantMatcher::SourcesReadWrite {
                access_object: normalized,
            }
        } else {
            GrantMatcher::Classic
        }
    }

    fn query(&self, grant: &GrantPrivilege) -> SelectQuery {
        let (fields, mut predicates) = match self {
            GrantMatcher::Classic => (
                vec![
                    Field::new("access_type").to_string_cast(),
                    Field::new("database"),
                    Field::new("table"),
                    Field::new("column"),
                    Field::new("user_name"),
                    Field::new("role_name"),
                    Field::new("grant_option"),
                ],
                vec![Where::equals("access_type", grant.access_type.as_str())],
            ),
            GrantMatcher::SourcesReadWrite { access_object } => (
                vec![
                    Field::new("access_type").to_string_cast(),
                    Field::new("access_object"),
                    Field::new("user_name"),
                    Field::new("role_name"),
                    Field::new("grant_option"),
                ],
                vec![
                    Where::equals("access_object", access_object.as_str()),
                    Where::is_in("access_type", ["READ", "WRITE"]),
                ],
            ),
        };
        predicates.extend(grant.scope_predicates());
        predicates.push(grant.grantee.predicate());

        predicates
            .into_iter()
            .fold(SelectQuery::new(fields, CATALOG), SelectQuery::with_where)
    }

    fn is_granted(&self, matched_rows: usize) -> bool {
        match self {
            GrantMatcher::Classic => matched_rows > 0,
            GrantMatcher::SourcesReadWrite { .. } => matched_rows == 2,
        }
    }
}

impl<E: ClickHouseExecutor> DbOpsClient<E> {
    pub async fn grant_privilege(
        &self,
        ctx: &OpContext,
        grant: &GrantPrivilege,
        cluster: Option<&str>,
    ) -> Result<GrantPrivilege, DbOpsError> {
        const OPERATION: &str = "grant privilege";

        let sql = GrantPrivilegeQuery::new(&grant.access_type, grant.grantee.name())
            .with_database(grant.database.as_deref())
            .with_table(grant.table.as_deref())
            .with_column(grant.column.as_deref())
            .with_grant_option(grant.grant_option)
            .with_cluster(cluster)
            .build()
            .map_err(build_error(OPERATION))?;
        self.exec(ctx, OPERATION, &sql).await?;

        let identifier = grant.identifier();
        info!("Granted {}", identifier);

        retry_create(
            ctx,
            self.retry_policy.create_timeout,
            RESOURCE_TYPE,
            &identifier,
            move |attempt| async move { self.get_grant_privilege(&attempt, grant).await },
        )
        .await
    }

    /// Returns the grant as the server has it, or `None` when it is not (fully)
    /// granted.
    pub async fn get_grant_privilege(
        &self,
        ctx: &OpContext,
        grant: &GrantPrivilege,
    ) -> Result<Option<GrantPrivilege>, DbOpsError> {
        const OPERATION: &str = "get grant privilege";

        let capabilities = self.capabilities(ctx).await?;
        let matcher = GrantMatcher::select(&capabilities.flags, &grant.access_type);
        let sql = matcher.query(grant).build().map_err(build_error(OPERATION))?;

        let mut matched_rows = 0;
        let mut grant_option = true;
        self.select(ctx, OPERATION, &sql, |r| {
            matched_rows += 1;
            grant_option &= r.get_bool("grant_option")?;
            Ok(())
        })
        .await?;

        if !matcher.is_granted(matched_rows) {
            return Ok(None);
        }

        let mut found = grant.clone();
        found.grant_option = grant_option;
        if let GrantMatcher::SourcesReadWrite { access_object } = matcher {
            found.access_object = Some(access_object);
        }

        Ok(Some(found))
    }

    pub async fn revoke_grant_privilege(
        &self,
        ctx: &OpContext,
        grant: &GrantPrivilege,
        cluster: Option<&str>,
    ) -> Result<(), DbOpsError> {
        const OPERATION: &str = "revoke grant privilege";

        let sql = RevokePrivilegeQuery::new(&grant.access_type, grant.grantee.name())
            .with_database(grant.database.as_deref())
            .with_table(grant.table.as_deref())
            .with_column(grant.column.as_deref())
            .with_cluster(cluster)
            .build()
            .map_err(build_error(OPERATION))?;
        self.exec(ctx, OPERATION, &sql).await?;
        info!("Revoked {}", grant.identifier());

        Ok(())
    }

    /// Every grant held directly by `grantee`, in catalog order.
    pub async fn get_all_grants_for_grantee(
        &self,
        ctx: &OpContext,
        grantee: &Grantee,
    ) -> Result<Vec<GrantPrivilege>, DbOpsError> {
        const OPERATION: &str = "list grants";

        let sql = SelectQuery::new(
            vec![
                Field::new("access_type").to_string_cast(),
                Field::new("database"),
                Field::new("table"),
                Field::new("column"),
                Field::new("user_name"),
                Field::new("role_name"),
                Field::new("grant_option"),
            ],
            CATALOG,
        )
        .with_where(grantee.predicate())
        .build()
        .map_err(build_error(OPERATION))?;

        let mut grants = Vec::new();
        self.select(ctx, OPERATION, &sql, |r| {
            grants.push(GrantPrivilege::from_row(r)?);
            Ok(())
        })
        .await?;

        Ok(grants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::infrastructure::olap::clickhouse::dbops::CapabilityError;
    use crate::test_utils::{row, MockExecutor};

    const SEPARATED: CapabilityFlags = CapabilityFlags {
        sources_grant_read_write_separation: true,
    };
    const COMBINED: CapabilityFlags = CapabilityFlags {
        sources_grant_read_write_separation: false,
    };

    fn server(version: &str) -> MockExecutor {
        let executor = MockExecutor::new();
        executor.on_query("build_options", vec![row(&[("value", Some(version))])]);
        executor
    }

    fn grant_row(access_type: &str, grant_option: &str) -> Row {
        row(&[
            ("access_type", Some(access_type)),
            ("access_object", Some("S3")),
            ("database", None),
            ("table", None),
            ("column", None),
            ("user_name", Some("alice")),
            ("role_name", None),
            ("grant_option", Some(grant_option)),
        ])
    }

    #[test]
    fn test_matcher_selection() {
        assert_eq!(
            GrantMatcher::select(&SEPARATED, "S3"),
            GrantMatcher::SourcesReadWrite {
                access_object: "S3".to_string()
            }
        );
        assert_eq!(
            GrantMatcher::select(&SEPARATED, "url"),
            GrantMatcher::SourcesReadWrite {
                access_object: "URL".to_string()
            }
        );
        assert_eq!(GrantMatcher::select(&COMBINED, "S3"), GrantMatcher::Classic);
        assert_eq!(GrantMatcher::select(&SEPARATED, "SELECT"), GrantMatcher::Classic);
    }

    #[test]
    fn test_sources_family_is_complete() {
        assert_eq!(SOURCES_FAMILY.len(), 17);
        for access_type in SOURCES_FAMILY {
            assert!(matches!(
                GrantMatcher::select(&SEPARATED, access_type),
                GrantMatcher::SourcesReadWrite { .. }
            ));
        }
    }

    #[tokio::test]
    async fn test_grant_privilege_classic() {
        let executor = server("24.9.2.1");
        executor.on_query("FROM `system`.`grants`", vec![grant_row("SELECT", "1")]);
        let client = DbOpsClient::new(executor);

        let mut grant = GrantPrivilege::new("SELECT", Grantee::User("alice".to_string()));
        grant.database = Some("analytics".to_string());
        grant.grant_option = true;

        let granted = client
            .grant_privilege(&OpContext::background(), &grant, Some("main"))
            .await
            .unwrap();

        assert_eq!(granted, grant);
        assert_eq!(
            client.executor().executed(),
            vec!["GRANT SELECT ON `analytics`.* TO `alice` ON CLUSTER `main` WITH GRANT OPTION;"]
        );
        let lookup = client
            .executor()
            .queries()
            .into_iter()
            .find(|q| q.contains("`system`.`grants`"))
            .unwrap();
        assert_eq!(
            lookup,
            "SELECT toString(`access_type`) AS `access_type`, `database`, `table`, `column`, `user_name`, `role_name`, `grant_option` FROM `system`.`grants` WHERE (`access_type` = 'SELECT' AND `database` = 'analytics' AND `table` IS NULL AND `column` IS NULL AND `user_name` = 'alice');"
        );
    }

    #[tokio::test]
    async fn test_sources_grant_requires_read_and_write() {
        let executor = server("ClickHouse 25.7.1.2345");
        executor.on_query("FROM `system`.`grants`", vec![grant_row("READ", "0")]);
        let client = DbOpsClient::new(executor);

        let grant = GrantPrivilege::new("S3", Grantee::Role("etl".to_string()));
        let found = client
            .get_grant_privilege(&OpContext::background(), &grant)
            .await
            .unwrap();

        assert_eq!(found, None);
        let lookup = client.executor().queries().pop().unwrap();
        assert!(lookup.contains("`access_object` = 'S3'"));
        assert!(lookup.contains("`access_type` IN ('READ', 'WRITE')"));
        assert!(lookup.contains("`role_name` = 'etl'"));
    }

    #[tokio::test]
    async fn test_sources_grant_found_with_both_rows() {
        let executor = server("25.8.1.1");
        executor.on_query(
            "FROM `system`.`grants`",
            vec![grant_row("READ", "0"), grant_row("WRITE", "0")],
        );
        let client = DbOpsClient::new(executor);

        let grant = GrantPrivilege::new("S3", Grantee::User("alice".to_string()));
        let found = client
            .get_grant_privilege(&OpContext::background(), &grant)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.access_object.as_deref(), Some("S3"));
        assert!(!found.grant_option);
    }

    #[tokio::test]
    async fn test_source_grant_on_older_server_uses_classic_lookup() {
        let executor = server("24.9.2.1");
        executor.on_query("FROM `system`.`grants`", vec![grant_row("S3", "0")]);
        let client = DbOpsClient::new(executor);

        let grant = GrantPrivilege::new("S3", Grantee::User("alice".to_string()));
        let found = client
            .get_grant_privilege(&OpContext::background(), &grant)
            .await
            .unwrap();

        assert_eq!(found, Some(grant));
        assert_eq!(client.executor().query_count("build_options"), 1);
    }

    #[tokio::test]
    async fn test_capability_failure_blocks_grant_lookup() {
        let executor = MockExecutor::new();
        executor.fail_query("build_options", "Code: 497. Not enough privileges");
        let client = DbOpsClient::new(executor);

        let grant = GrantPrivilege::new("SELECT", Grantee::User("alice".to_string()));
        for _ in 0..2 {
            let err = client
                .get_grant_privilege(&OpContext::background(), &grant)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                DbOpsError::Capability(CapabilityError::Query(_))
            ));
        }
        assert_eq!(client.executor().query_count("build_options"), 1);
        assert_eq!(client.executor().query_count("`system`.`grants`"), 0);
    }

    #[tokio::test]
    async fn test_revoke_column_grant() {
        let client = DbOpsClient::new(MockExecutor::new());

        let mut grant = GrantPrivilege::new("SELECT", Grantee::Role("reader".to_string()));
        grant.database = Some("analytics".to_string());
        grant.table = Some("events".to_string());
        grant.column = Some("user_id".to_string());

        client
            .revoke_grant_privilege(&OpContext::background(), &grant, None)
            .await
            .unwrap();

        assert_eq!(
            client.executor().executed(),
            vec!["REVOKE SELECT(`user_id`) ON `analytics`.`events` FROM `reader`;"]
        );
    }

    #[tokio::test]
    async fn test_invalid_scope_is_a_build_error() {
        let client = DbOpsClient::new(MockExecutor::new());

        let mut grant = GrantPrivilege::new("SELECT", Grantee::User("alice".to_string()));
        grant.table = Some("events".to_string());

        let err = client
            .grant_privilege(&OpContext::background(), &grant, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DbOpsError::Build {
                operation: "grant privilege",
                ..
            }
        ));
        assert!(client.executor().executed().is_empty());
    }

    #[tokio::test]
    async fn test_get_all_grants_for_grantee() {
        let executor = MockExecutor::new();
        executor.on_query(
            "`role_name` = 'reader'",
            vec![
                row(&[
                    ("access_type", Some("SELECT")),
                    ("database", Some("analytics")),
                    ("table", None),
                    ("column", None),
                    ("user_name", None),
                    ("role_name", Some("reader")),
                    ("grant_option", Some("0")),
                ]),
                row(&[
                    ("access_type", Some("SHOW TABLES")),
                    ("database", None),
                    ("table", None),
                    ("column", None),
                    ("user_name", None),
                    ("role_name", Some("reader")),
                    ("grant_option", Some("1")),
                ]),
            ],
        );
        let client = DbOpsClient::new(executor);

        let grants = client
            .get_all_grants_for_grantee(
                &OpContext::background(),
                &Grantee::Role("reader".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(grants.len(), 2);
        assert_eq!(grants[0].database.as_deref(), Some("analytics"));
        assert_eq!(grants[0].grantee, Grantee::Role("reader".to_string()));
        assert_eq!(grants[1].access_type, "SHOW TABLES");
        assert!(grants[1].grant_option);
    }

    #[test]
    fn test_grantee_serializes_with_kind() {
        let json = serde_json::to_string(&Grantee::User("alice".to_string())).unwrap();
        assert_eq!(json, r#"{"kind":"user","name":"alice"}"#);
    }
}
