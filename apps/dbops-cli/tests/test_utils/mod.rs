//! Shared test utilities for the clickhouse-dbops crate.
//!
//! [`MockExecutor`] stands in for a ClickHouse server: SELECTs are answered
//! with canned rows matched by substring, every statement is recorded, and
//! failures can be scripted per statement.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::infrastructure::olap::clickhouse::client::ClickHouseExecutor;
use crate::infrastructure::olap::clickhouse::errors::{ExecutorError, RowError};
use crate::infrastructure::olap::clickhouse::row::Row;

/// Builds a row from `(column, value)` pairs; `None` is SQL NULL.
pub fn row(columns: &[(&str, Option<&str>)]) -> Row {
    let mut row = Row::new();
    for (column, value) in columns {
        row.set(column, value.map(str::to_string));
    }
    row
}

struct CannedResponse {
    needle: String,
    // The last entry is repeated once the others are used up.
    responses: VecDeque<Vec<Row>>,
}

#[derive(Default)]
struct MockState {
    canned: Vec<CannedResponse>,
    failing_queries: Vec<(String, String)>,
    failing_executes: Vec<(String, String)>,
    executed: Vec<String>,
    queries: Vec<String>,
}

#[derive(Default)]
pub struct MockExecutor {
    state: Mutex<MockState>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every SELECT containing `needle` with `rows`. The first
    /// registered needle that matches wins; unmatched SELECTs return no rows.
    pub fn on_query(&self, needle: &str, rows: Vec<Row>) {
        self.on_query_sequence(needle, vec![rows]);
    }

    /// Answers successive SELECTs containing `needle` with successive entries,
    /// repeating the last one.
    pub fn on_query_sequence(&self, needle: &str, responses: Vec<Vec<Row>>) {
        self.state.lock().unwrap().canned.push(CannedResponse {
            needle: needle.to_string(),
            responses: responses.into(),
        });
    }

    pub fn fail_query(&self, needle: &str, body: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_queries
            .push((needle.to_string(), body.to_string()));
    }

    pub fn fail_execute(&self, needle: &str, body: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_executes
            .push((needle.to_string(), body.to_string()));
    }

    /// Statements passed to `execute`, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    /// Statements passed to `query`, in order.
    pub fn queries(&self) -> Vec<String> {
        self.state.lock().unwrap().queries.clone()
    }

    pub fn query_count(&self, needle: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .queries
            .iter()
            .filter(|q| q.contains(needle))
            .count()
    }

    fn rows_for(&self, sql: &str) -> Result<Vec<Row>, ExecutorError> {
        let mut state = self.state.lock().unwrap();
        state.queries.push(sql.to_string());

        if let Some((_, body)) = state
            .failing_queries
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
        {
            return Err(ExecutorError::Server {
                status: 500,
                body: body.clone(),
            });
        }

        let Some(canned) = state
            .canned
            .iter_mut()
            .find(|c| sql.contains(c.needle.as_str()))
        else {
            return Ok(Vec::new());
        };

        let rows = if canned.responses.len() > 1 {
            canned.responses.pop_front().unwrap_or_default()
        } else {
            canned.responses.front().cloned().unwrap_or_default()
        };
        Ok(rows)
    }
}

#[async_trait]
impl ClickHouseExecutor for MockExecutor {
    async fn execute(&self, sql: &str) -> Result<(), ExecutorError> {
        let mut state = self.state.lock().unwrap();
        state.executed.push(sql.to_string());

        match state
            .failing_executes
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
        {
            Some((_, body)) => Err(ExecutorError::Server {
                status: 500,
                body: body.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn query(
        &self,
        sql: &str,
        handler: &mut (dyn for<'r> FnMut(&'r Row) -> Result<(), RowError> + Send),
    ) -> Result<(), ExecutorError> {
        for row in self.rows_for(sql)? {
            handler(&row)?;
        }
        Ok(())
    }
}
