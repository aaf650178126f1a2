//! Bounded polling that hides replication lag after writes and during reads.
//!
//! Catalog tables are eventually consistent across replicas: an object created
//! a moment ago may not be visible yet, and a read may miss an object that
//! exists. Both retry flavours share one loop and differ only in what a miss at
//! the deadline means:
//!
//! - [`retry_create`] reports [`DbOpsError::NotConfirmed`]; the write happened,
//!   it just could not be observed in time.
//! - [`retry_read`] reports `Ok(None)` so the caller's normal not-found handling
//!   applies.

use std::future::Future;

use tokio::sync::watch;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::debug;

use super::DbOpsError;

pub const CREATE_INITIAL_BACKOFF: Duration = Duration::from_millis(50);
pub const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(30);
pub const READ_INITIAL_BACKOFF: Duration = Duration::from_millis(200);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Cancellation and deadline carried through every operation.
///
/// Cancellation is signalled through a `watch` channel flipping to `true`, the
/// same way long-running tasks are told to shut down elsewhere.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    deadline: Option<Instant>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl OpContext {
    /// No deadline, never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// Tightens the deadline; a later deadline than the current one is ignored.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once cancellation is signalled. Never resolves when there is
    /// no shutdown channel or its sender is gone.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.shutdown else {
            return std::future::pending().await;
        };

        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }

    /// Drives `fut` to completion unless the context is cancelled or its
    /// deadline passes first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, DbOpsError>
    where
        F: Future<Output = T>,
    {
        if self.is_cancelled() {
            return Err(DbOpsError::Cancelled);
        }

        let deadline = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(DbOpsError::Cancelled),
            _ = deadline => Err(DbOpsError::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

/// Timeouts applied by the resource operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub create_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            create_timeout: DEFAULT_CREATE_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

enum Outcome<T> {
    Found(T),
    /// Every attempt came back empty for the whole window.
    Missing { window: Duration },
}

/// Calls `fetch` until it finds something, fails, or the effective deadline
/// (the earlier of the caller's and `now + timeout`) passes. Each attempt gets
/// a context bounded by that deadline.
///
/// Only completed attempts that found nothing count as a miss. An attempt that
/// runs into the deadline or fails in transport is an error: the object was
/// never observed absent.
async fn poll_until_found<T, F, Fut>(
    ctx: &OpContext,
    timeout: Duration,
    initial_backoff: Duration,
    resource_type: &str,
    identifier: &str,
    mut fetch: F,
) -> Result<Outcome<T>, DbOpsError>
where
    F: FnMut(OpContext) -> Fut,
    Fut: Future<Output = Result<Option<T>, DbOpsError>>,
{
    let start = Instant::now();
    let attempt_ctx = ctx.clone().with_timeout(timeout);
    let deadline = attempt_ctx.deadline().unwrap_or(start + timeout);
    let mut backoff = initial_backoff;

    loop {
        if ctx.is_cancelled() {
            return Err(DbOpsError::Cancelled);
        }

        if let Some(found) = fetch(attempt_ctx.clone()).await? {
            return Ok(Outcome::Found(found));
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(Outcome::Missing {
                window: deadline.saturating_duration_since(start),
            });
        }

        debug!(
            resource_type,
            resource_identifier = identifier,
            backoff = ?backoff,
            "Resource not found, retrying with exponential backoff"
        );

        let wake = (now + backoff).min(deadline);
        tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(DbOpsError::Cancelled),
            _ = sleep_until(wake) => {}
        }

        // No time is left for another attempt.
        if wake >= deadline {
            return Ok(Outcome::Missing {
                window: deadline.saturating_duration_since(start),
            });
        }

        backoff *= 2;
    }
}

/// Confirms a write by polling until the object is observable.
pub async fn retry_create<T, F, Fut>(
    ctx: &OpContext,
    timeout: Duration,
    resource_type: &'static str,
    identifier: &str,
    fetch: F,
) -> Result<T, DbOpsError>
where
    F: FnMut(OpContext) -> Fut,
    Fut: Future<Output = Result<Option<T>, DbOpsError>>,
{
    match poll_until_found(
        ctx,
        timeout,
        CREATE_INITIAL_BACKOFF,
        resource_type,
        identifier,
        fetch,
    )
    .await
    {
        Ok(Outcome::Found(found)) => Ok(found),
        Ok(Outcome::Missing { window }) => Err(DbOpsError::NotConfirmed {
            resource_type,
            identifier: identifier.to_string(),
            timeout: window,
        }),
        Err(DbOpsError::Cancelled) => Err(DbOpsError::Cancelled),
        Err(e) => Err(DbOpsError::Retrieve {
            resource_type,
            source: Box::new(e),
        }),
    }
}

/// Reads through transient replication misses. A miss that persists for the
/// whole window is reported as absent.
pub async fn retry_read<T, F, Fut>(
    ctx: &OpContext,
    timeout: Duration,
    resource_type: &str,
    identifier: &str,
    fetch: F,
) -> Result<Option<T>, DbOpsError>
where
    F: FnMut(OpContext) -> Fut,
    Fut: Future<Output = Result<Option<T>, DbOpsError>>,
{
    match poll_until_found(
        ctx,
        timeout,
        READ_INITIAL_BACKOFF,
        resource_type,
        identifier,
        fetch,
    )
    .await?
    {
        Outcome::Found(found) => Ok(Some(found)),
        Outcome::Missing { .. } => {
            debug!(
                resource_type,
                resource_identifier = identifier,
                "Resource still not found after retries, treating as deleted"
            );
            Ok(None)
        }
    }
}
