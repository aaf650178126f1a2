//! Server feature detection.
//!
//! The grant model for source-family privileges changed in 25.7: `S3`, `URL`
//! and friends are stored as separate `READ` / `WRITE` grants on an access
//! object. Which matcher is right depends on the server, so the version is
//! looked up once per client and the derived flags are cached, errors included.

use semver::Version;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::infrastructure::olap::clickhouse::client::ClickHouseExecutor;
use crate::infrastructure::olap::clickhouse::queries::{Field, SelectQuery, Where};

/// First version storing source grants as separate READ/WRITE access types.
pub const SOURCES_GRANT_READ_WRITE_SEPARATION_SINCE: Version = Version::new(25, 7, 0);

const PRODUCT_PREFIX: &str = "ClickHouse ";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CapabilityFlags {
    pub sources_grant_read_write_separation: bool,
}

impl CapabilityFlags {
    pub fn for_version(version: &Version) -> Self {
        Self {
            sources_grant_read_write_separation: *version
                >= SOURCES_GRANT_READ_WRITE_SEPARATION_SINCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCapabilities {
    pub version: Version,
    pub flags: CapabilityFlags,
}

/// Cached and handed out by clone, so it carries rendered messages only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    #[error("error retrieving ClickHouse version: {0}")]
    Query(String),
    #[error("ClickHouse did not report its version")]
    MissingVersion,
    #[error("invalid ClickHouse version format: {0}")]
    InvalidVersion(String),
}

/// Turns `ClickHouse 25.7.1.2345` (or any shorter `25.7`) into `25.7.1`.
pub fn normalize_version(raw: &str) -> Result<Version, CapabilityError> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix(PRODUCT_PREFIX).unwrap_or(trimmed).trim();

    let mut parts: Vec<&str> = trimmed.split('.').take(3).collect();
    while parts.len() < 3 {
        parts.push("0");
    }

    Version::parse(&parts.join("."))
        .map_err(|e| CapabilityError::InvalidVersion(format!("v{trimmed}: {e}")))
}

fn version_query() -> Result<String, CapabilityError> {
    SelectQuery::new(vec![Field::new("value")], "system.build_options")
        .with_where(Where::equals("name", "VERSION_FULL"))
        .build()
        .map_err(|e| CapabilityError::Query(e.to_string()))
}

async fn fetch_capabilities<E: ClickHouseExecutor + ?Sized>(
    executor: &E,
) -> Result<ServerCapabilities, CapabilityError> {
    let sql = version_query()?;

    let mut raw: Option<String> = None;
    executor
        .query(&sql, &mut |row| {
            raw = Some(row.get_string("value")?);
            Ok(())
        })
        .await
        .map_err(|e| CapabilityError::Query(e.to_string()))?;

    let version = normalize_version(&raw.ok_or(CapabilityError::MissingVersion)?)?;
    let flags = CapabilityFlags::for_version(&version);
    info!(
        "Connected to ClickHouse v{} (sources_grant_read_write_separation: {})",
        version, flags.sources_grant_read_write_separation
    );

    Ok(ServerCapabilities { version, flags })
}

/// Lazily initialized, per-client capability cache.
#[derive(Debug, Default)]
pub struct Capabilities {
    cell: OnceCell<Result<ServerCapabilities, CapabilityError>>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the version query on first use. Concurrent first callers wait for
    /// the same initialization; the outcome, success or failure, is final.
    pub async fn get<E: ClickHouseExecutor + ?Sized>(
        &self,
        executor: &E,
    ) -> Result<ServerCapabilities, CapabilityError> {
        self.cell
            .get_or_init(|| async {
                debug!("Detecting ClickHouse server capabilities");
                fetch_capabilities(executor).await
            })
            .await
            .clone()
    }
}
