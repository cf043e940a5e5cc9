use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{FlakersError, Result};
use crate::traits::SessionDriver;
use crate::types::{RawQueryResult, SqlValue};

/// A recorded query execution for verification.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

enum Outcome {
    Response(RawQueryResult),
    Failure(String),
}

/// An in-memory warehouse driver for testing.
///
/// Allows configuring expected responses and verifying executed queries
/// and session release.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use flakers::drivers::{InMemoryTestDriver, InMemoryTestResponseBuilder};
/// use flakers::traits::SessionDriver;
///
/// let driver = Arc::new(
///     InMemoryTestDriver::new().with_response(
///         InMemoryTestResponseBuilder::new()
///             .columns(&["ID", "NAME"])
///             .row(&["1", "Ram"])
///             .build(),
///     ),
/// );
/// ```
pub struct InMemoryTestDriver {
    outcomes: Mutex<VecDeque<Outcome>>,
    recorded_queries: Mutex<Vec<RecordedQuery>>,
    default_response: RawQueryResult,
    close_failure: Option<String>,
    close_count: Mutex<usize>,
}

impl InMemoryTestDriver {
    /// Create a new in-memory test driver with no pre-configured responses.
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            recorded_queries: Mutex::new(Vec::new()),
            default_response: RawQueryResult::empty(),
            close_failure: None,
            close_count: Mutex::new(0),
        }
    }

    /// Add a response to be returned by the next query.
    /// Responses are returned in FIFO order.
    pub fn with_response(self, response: RawQueryResult) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Outcome::Response(response));
        self
    }

    /// Add multiple responses to be returned by subsequent queries.
    pub fn with_responses(self, responses: impl IntoIterator<Item = RawQueryResult>) -> Self {
        let mut queue = self.outcomes.lock().unwrap();
        for response in responses {
            queue.push_back(Outcome::Response(response));
        }
        drop(queue);
        self
    }

    /// Make the next query fail with `QueryFailed(message)`.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Outcome::Failure(message.into()));
        self
    }

    /// Set a default response to use when no queued responses remain.
    pub fn with_default_response(mut self, response: RawQueryResult) -> Self {
        self.default_response = response;
        self
    }

    /// Make `close` fail with `ConnectionFailed(message)`.
    /// The close is still counted.
    pub fn with_close_failure(mut self, message: impl Into<String>) -> Self {
        self.close_failure = Some(message.into());
        self
    }

    /// Get all recorded queries that have been executed.
    pub fn recorded_queries(&self) -> Vec<RecordedQuery> {
        self.recorded_queries.lock().unwrap().clone()
    }

    /// Get the last recorded query, if any.
    pub fn last_query(&self) -> Option<RecordedQuery> {
        self.recorded_queries.lock().unwrap().last().cloned()
    }

    /// Number of times `close` has been called.
    pub fn close_count(&self) -> usize {
        *self.close_count.lock().unwrap()
    }

    /// Assert that the last query matches the expected SQL and parameters.
    pub fn assert_last_query(&self, expected_sql: &str, expected_params: &[SqlValue]) {
        let last = self.last_query().expect("No queries were recorded");
        assert_eq!(
            last.sql, expected_sql,
            "SQL mismatch.\nExpected: {}\nActual: {}",
            expected_sql, last.sql
        );
        assert_eq!(
            last.params, expected_params,
            "Parameters mismatch.\nExpected: {:?}\nActual: {:?}",
            expected_params, last.params
        );
    }

    /// Assert that exactly n queries were executed.
    pub fn assert_query_count(&self, expected: usize) {
        let actual = self.recorded_queries.lock().unwrap().len();
        assert_eq!(
            actual, expected,
            "Query count mismatch. Expected: {}, Actual: {}",
            expected, actual
        );
    }

    /// Assert that the session was closed exactly once.
    pub fn assert_closed_once(&self) {
        let actual = self.close_count();
        assert_eq!(actual, 1, "Close count mismatch. Expected: 1, Actual: {}", actual);
    }
}

impl Default for InMemoryTestDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionDriver for InMemoryTestDriver {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult> {
        if self.close_count() > 0 {
            return Err(FlakersError::SessionClosed);
        }

        self.recorded_queries.lock().unwrap().push(RecordedQuery {
            sql: sql.to_string(),
            params: params.to_vec(),
        });

        let outcome = self.outcomes.lock().unwrap().pop_front();
        match outcome {
            Some(Outcome::Response(response)) => Ok(response),
            Some(Outcome::Failure(message)) => Err(FlakersError::QueryFailed(message)),
            None => Ok(self.default_response.clone()),
        }
    }

    async fn close(&self) -> Result<()> {
        *self.close_count.lock().unwrap() += 1;
        match &self.close_failure {
            Some(message) => Err(FlakersError::ConnectionFailed(message.clone())),
            None => Ok(()),
        }
    }
}

/// Builder for creating test responses easily.
pub struct InMemoryTestResponseBuilder {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl InMemoryTestResponseBuilder {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Set the column names for the response.
    pub fn columns(mut self, cols: &[&str]) -> Self {
        self.columns = cols.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Add a row of non-null string values.
    pub fn row(mut self, values: &[&str]) -> Self {
        self.rows
            .push(values.iter().map(|s| Some(s.to_string())).collect());
        self
    }

    /// Add a row where `None` is SQL NULL.
    pub fn row_with_nulls(mut self, values: &[Option<&str>]) -> Self {
        self.rows
            .push(values.iter().map(|v| v.map(str::to_string)).collect());
        self
    }

    /// Build the RawQueryResult.
    pub fn build(self) -> RawQueryResult {
        RawQueryResult::new(self.columns, self.rows)
    }
}

impl Default for InMemoryTestResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}
