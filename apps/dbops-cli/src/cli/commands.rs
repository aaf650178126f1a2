//! # CLI Commands
//! All the commands that can be run from the CLI

use clap::{Subcommand, ValueEnum};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Shows the server version and the capabilities derived from it
    Version,
    /// Manage databases
    Database {
        #[command(subcommand)]
        command: DatabaseCommands,
    },
    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Lists the privileges granted directly to a user or a role
    Grants {
        /// Whether NAME is a user or a role
        #[arg(value_enum)]
        kind: GranteeKind,
        /// Name of the user or role
        name: String,
    },
    /// Redacts credentials from a message the way errors are redacted; works offline
    Sanitize {
        message: String,
        /// Also mask ClickHouse exception text
        #[arg(long)]
        database: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum DatabaseCommands {
    /// Shows a database by UUID, or by name with --name
    Get {
        #[arg(required_unless_present = "name", conflicts_with = "name")]
        uuid: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Creates a database and waits until it is visible
    Create {
        name: String,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Drops a database; succeeds when it is already gone
    Delete { uuid: String },
}

#[derive(Subcommand, Debug)]
pub enum UserCommands {
    /// Shows a user by id, or by name with --name
    Get {
        #[arg(required_unless_present = "name", conflicts_with = "name")]
        id: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Creates a user authenticated with a SHA-256 password hash
    Create {
        name: String,
        /// Hex-encoded SHA-256 of the password
        #[arg(
            long,
            value_name = "HASH",
            required_unless_present = "password",
            conflicts_with = "password"
        )]
        password_sha256: Option<String>,
        /// Plain password, hashed locally before it is sent
        #[arg(long)]
        password: Option<String>,
        /// Settings profile the user inherits
        #[arg(long)]
        settings_profile: Option<String>,
    },
    /// Drops a user; succeeds when it is already gone
    Delete { id: String },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum GranteeKind {
    User,
    Role,
}
