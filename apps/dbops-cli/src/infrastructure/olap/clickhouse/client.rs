use base64::prelude::*;
use http_body_util::BodyExt;
use http_body_util::Full;

use async_recursion::async_recursion;
use async_trait::async_trait;
use hyper::body::Bytes;
use hyper::{Request, Response, Uri};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use tokio::time::{sleep, Duration};
use tracing::{debug, error};

use super::config::ClickHouseConfig;
use super::errors::{ExecutorError, RowError};
use super::row::{rows_from_json_compact_strings, Row};

/// The SQL-executing collaborator the resource operations are written against.
#[async_trait]
pub trait ClickHouseExecutor: Send + Sync {
    /// Runs a statement that returns no rows.
    async fn execute(&self, sql: &str) -> Result<(), ExecutorError>;

    /// Runs a SELECT and calls `handler` once per result row. An error from the
    /// handler stops the iteration and is returned as [`ExecutorError::Row`].
    async fn query(
        &self,
        sql: &str,
        handler: &mut (dyn for<'r> FnMut(&'r Row) -> Result<(), RowError> + Send),
    ) -> Result<(), ExecutorError>;
}

#[async_trait]
impl<T: ClickHouseExecutor + ?Sized> ClickHouseExecutor for std::sync::Arc<T> {
    async fn execute(&self, sql: &str) -> Result<(), ExecutorError> {
        (**self).execute(sql).await
    }

    async fn query(
        &self,
        sql: &str,
        handler: &mut (dyn for<'r> FnMut(&'r Row) -> Result<(), RowError> + Send),
    ) -> Result<(), ExecutorError> {
        (**self).query(sql, handler).await
    }
}

pub struct ClickHouseClient {
    client: Client<HttpConnector, Full<Bytes>>,
    ssl_client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    config: ClickHouseConfig,
}

// Considering Clickhouse could take 30s to wake up, we need to have a backoff strategy
const BACKOFF_START_MILLIS: u64 = 1000;
const MAX_RETRIES: u8 = 10;
// Retries will be 1s, 2s, 4s, 8s, 16s, 32s, 64s, 128s, 256s, 512s

impl ClickHouseClient {
    pub fn new(clickhouse_config: &ClickHouseConfig) -> Self {
        let client_builder = Client::builder(hyper_util::rt::TokioExecutor::new());

        let https = HttpsConnector::new();
        let http = HttpConnector::new();

        Self {
            client: client_builder.build(http),
            ssl_client: client_builder.build(https),
            config: clickhouse_config.clone(),
        }
    }

    pub fn config(&self) -> &ClickHouseConfig {
        &self.config
    }

    #[async_recursion]
    async fn request(
        &self,
        req: Request<Full<Bytes>>,
        retries: u8,
        backoff_millis: u64,
    ) -> Result<Response<hyper::body::Incoming>, hyper_util::client::legacy::Error> {
        let res = if self.config.use_ssl {
            self.ssl_client.request(req.clone()).await
        } else {
            self.client.request(req.clone()).await
        };

        match res {
            Ok(res) => Ok(res),
            Err(e) if e.is_connect() && retries > 0 => {
                debug!(
                    "ClickHouse not reachable at {}, retrying in {}ms",
                    self.host(),
                    backoff_millis
                );
                sleep(Duration::from_millis(backoff_millis)).await;
                self.request(req, retries - 1, backoff_millis * 2).await
            }
            Err(e) => Err(e),
        }
    }

    fn auth_header(&self) -> String {
        let username_and_password = format!("{}:{}", self.config.user, self.config.password);
        let encoded = BASE64_STANDARD.encode(username_and_password);
        format!("Basic {encoded}")
    }

    fn host(&self) -> String {
        format!("{}:{}", self.config.host, self.config.host_port)
    }

    fn uri(&self, path: String) -> Result<Uri, ExecutorError> {
        let scheme = if self.config.use_ssl { "https" } else { "http" };

        let uri = format!("{}://{}{}", scheme, self.host(), path);
        Ok(uri.parse()?)
    }

    /// Posts `sql` as the request body and returns the response body.
    async fn send(&self, sql: &str) -> Result<String, ExecutorError> {
        let query = query_param(sql)?;
        let uri = self.uri(format!("/?{query}"))?;
        let bytes = Bytes::from(sql.to_string());

        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Host", self.host())
            .header("Authorization", self.auth_header())
            .header("Content-Length", bytes.len())
            .body(Full::new(bytes))?;

        debug!("Sending {} statement to {}", statement_kind(sql), self.config.display_url());

        let res = self.request(req, MAX_RETRIES, BACKOFF_START_MILLIS).await?;
        let status = res.status();
        let body = String::from_utf8(res.collect().await?.to_bytes().to_vec())?;

        if status != 200 {
            error!(
                "ClickHouse rejected {} statement: Res {}",
                statement_kind(sql),
                status
            );
            return Err(ExecutorError::Server {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl ClickHouseExecutor for ClickHouseClient {
    async fn execute(&self, sql: &str) -> Result<(), ExecutorError> {
        self.send(sql).await?;
        Ok(())
    }

    async fn query(
        &self,
        sql: &str,
        handler: &mut (dyn for<'r> FnMut(&'r Row) -> Result<(), RowError> + Send),
    ) -> Result<(), ExecutorError> {
        let body = self.send(sql).await?;
        for row in rows_from_json_compact_strings(&body)? {
            handler(&row)?;
        }
        Ok(())
    }
}

const DDL_COMMANDS: &[&str] = &["CREATE", "ALTER", "DROP", "GRANT", "REVOKE"];

/// First keyword of a statement, for logs that must not carry its literals.
fn statement_kind(sql: &str) -> String {
    sql.split_whitespace()
        .next()
        .unwrap_or_default()
        .to_uppercase()
}

fn query_param(query: &str) -> Result<String, serde_urlencoded::ser::Error> {
    let mut params = vec![];

    let kind = statement_kind(query);
    if kind == "SELECT" {
        params.push(("default_format", "JSONCompactStrings"));
    }

    // Access-control DDL must be applied before the response is sent so the
    // follow-up catalog reads have a chance to observe it
    if DDL_COMMANDS.contains(&kind.as_str()) {
        params.push(("wait_end_of_query", "1"));
    }

    serde_urlencoded::to_string(&params)
}
