pub mod commands;
pub mod logger;
pub mod settings;

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::{debug, info};

use clickhouse_dbops::infrastructure::olap::clickhouse::client::ClickHouseClient;
use clickhouse_dbops::infrastructure::olap::clickhouse::dbops::{
    DbOpsClient, DbOpsError, Grantee, OpContext,
};
use clickhouse_dbops::utilities::sanitizer::{
    create_secure_error_message, sanitize_message, ErrorCategory,
};
use commands::{Commands, DatabaseCommands, GranteeKind, UserCommands};
use settings::Settings;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, arg_required_else_help(true))]
pub struct Cli {
    /// Turn debugging information on
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Config file to read instead of ~/.chdbops/config.toml
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Runs `command` and returns what should be printed on success.
pub async fn top_command_handler(settings: Settings, command: &Commands) -> Result<String> {
    let cluster = settings.clickhouse.cluster();

    match command {
        Commands::Sanitize { message, database } => {
            let category = if *database {
                ErrorCategory::Database
            } else {
                ErrorCategory::General
            };
            Ok(sanitize_message(message, category))
        }
        Commands::Version => {
            let (client, ctx) = connect(&settings);
            let capabilities = client
                .capabilities(&ctx)
                .await
                .map_err(|e| failed("read", "server version", e))?;
            to_json(&serde_json::json!({
                "version": capabilities.version.to_string(),
                "flags": capabilities.flags,
            }))
        }
        Commands::Database { command } => {
            let (client, ctx) = connect(&settings);
            match command {
                DatabaseCommands::Get { uuid, name } => {
                    let database = match (uuid, name) {
                        (Some(uuid), _) => client.read_database(&ctx, uuid).await,
                        (None, Some(name)) => client.find_database_by_name(&ctx, name).await,
                        (None, None) => return Err(anyhow!("a database UUID or --name is required")),
                    }
                    .map_err(|e| failed("read", "database", e))?;
                    let identifier = uuid.as_deref().or(name.as_deref()).unwrap_or_default();
                    to_json(&found("database", identifier, database)?)
                }
                DatabaseCommands::Create { name, comment } => {
                    let database = client
                        .create_database(&ctx, name, comment.as_deref(), cluster)
                        .await
                        .map_err(|e| failed("create", "database", e))?;
                    to_json(&database)
                }
                DatabaseCommands::Delete { uuid } => {
                    client
                        .delete_database(&ctx, uuid, cluster)
                        .await
                        .map_err(|e| failed("delete", "database", e))?;
                    Ok(format!("Database {uuid} deleted"))
                }
            }
        }
        Commands::User { command } => {
            let (client, ctx) = connect(&settings);
            match command {
                UserCommands::Get { id, name } => {
                    let user = match (id, name) {
                        (Some(id), _) => client.read_user(&ctx, id).await,
                        (None, Some(name)) => client.find_user_by_name(&ctx, name).await,
                        (None, None) => return Err(anyhow!("a user id or --name is required")),
                    }
                    .map_err(|e| failed("read", "user", e))?;
                    let identifier = id.as_deref().or(name.as_deref()).unwrap_or_default();
                    to_json(&found("user", identifier, user)?)
                }
                UserCommands::Create {
                    name,
                    password_sha256,
                    password,
                    settings_profile,
                } => {
                    let hash = password_hash(password_sha256.as_deref(), password.as_deref())?;
                    let user = client
                        .create_user(&ctx, name, &hash, settings_profile.as_deref(), cluster)
                        .await
                        .map_err(|e| failed("create", "user", e))?;
                    to_json(&user)
                }
                UserCommands::Delete { id } => {
                    client
                        .delete_user(&ctx, id, cluster)
                        .await
                        .map_err(|e| failed("delete", "user", e))?;
                    Ok(format!("User {id} deleted"))
                }
            }
        }
        Commands::Grants { kind, name } => {
            let (client, ctx) = connect(&settings);
            let grantee = match kind {
                GranteeKind::User => Grantee::User(name.clone()),
                GranteeKind::Role => Grantee::Role(name.clone()),
            };
            let grants = client
                .get_all_grants_for_grantee(&ctx, &grantee)
                .await
                .map_err(|e| failed("list", "grants", e))?;
            to_json(&grants)
        }
    }
}

/// Builds the client from settings. Nothing is sent until the first operation;
/// Ctrl-C cancels whatever operation is in flight.
fn connect(settings: &Settings) -> (DbOpsClient<ClickHouseClient>, OpContext) {
    info!(
        "Connecting to ClickHouse at {}",
        settings.clickhouse.display_url()
    );
    let client = DbOpsClient::new(ClickHouseClient::new(&settings.clickhouse))
        .with_retry_policy(settings.retry.policy());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });
    (client, OpContext::background().with_shutdown(shutdown_rx))
}

/// The user sees a generic message with redacted details; the full details go
/// to the log.
fn failed(operation: &str, resource_type: &str, err: DbOpsError) -> anyhow::Error {
    let (user_message, technical_details) =
        create_secure_error_message(operation, resource_type, &err);
    debug!(error = %technical_details, "{} {} failed", operation, resource_type);
    anyhow!("{user_message}\n  details: {technical_details}")
}

fn found<T>(resource_type: &'static str, identifier: &str, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| {
        DbOpsError::NotFound {
            resource_type,
            identifier: identifier.to_string(),
        }
        .into()
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// The hex SHA-256 sent to the server: given directly, or computed from a
/// plain password.
pub fn password_hash(password_sha256: Option<&str>, password: Option<&str>) -> Result<String> {
    match (password_sha256, password) {
        (Some(hash), None) => Ok(hash.to_lowercase()),
        (None, Some(password)) => Ok(hex::encode(Sha256::digest(password.as_bytes()))),
        _ => Err(anyhow!(
            "exactly one of --password-sha256 or --password is required"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_password_is_hashed() {
        assert_eq!(
            password_hash(None, Some("password")).unwrap(),
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
    }

    #[test]
    fn test_hash_is_passed_through() {
        assert_eq!(
            password_hash(Some("ABCDEF"), None).unwrap(),
            "abcdef"
        );
        assert!(password_hash(None, None).is_err());
        assert!(password_hash(Some("abc"), Some("pw")).is_err());
    }

    #[test]
    fn test_cli_parses_user_create() {
        let cli = Cli::try_parse_from([
            "chdbops",
            "user",
            "create",
            "alice",
            "--password",
            "secret",
            "--settings-profile",
            "readonly",
        ])
        .unwrap();

        match cli.command {
            Commands::User {
                command:
                    UserCommands::Create {
                        name,
                        password,
                        settings_profile,
                        ..
                    },
            } => {
                assert_eq!(name, "alice");
                assert_eq!(password.as_deref(), Some("secret"));
                assert_eq!(settings_profile.as_deref(), Some("readonly"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_rejects_both_password_forms() {
        let result = Cli::try_parse_from([
            "chdbops",
            "user",
            "create",
            "alice",
            "--password",
            "secret",
            "--password-sha256",
            "abc",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_secure_error_hides_hash() {
        let err = DbOpsError::InvalidInput(
            "CREATE USER a IDENTIFIED WITH sha256_hash BY '5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8'"
                .to_string(),
        );
        let message = failed("create", "user", err).to_string();

        assert!(message.starts_with("Failed to create user."));
        assert!(!message.contains("5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"));
    }

    #[tokio::test]
    async fn test_sanitize_runs_offline() {
        let output = top_command_handler(
            Settings::default(),
            &Commands::Sanitize {
                message: "password='hunter2'".to_string(),
                database: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(output, "password='[REDACTED]'");
    }
}
