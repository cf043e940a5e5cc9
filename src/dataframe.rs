use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{FlakersError, Result};
use crate::show;
use crate::traits::SessionDriver;
use crate::types::{QueryResult, RawQueryResult, SqlValue};

/// Rows printed by [`DataFrame::show`].
pub const DEFAULT_SHOW_ROWS: usize = 10;
/// Longest cell printed by [`DataFrame::show`] before it is cut with `...`.
pub const DEFAULT_MAX_WIDTH: usize = 50;

/// A query bound to the session that created it.
///
/// Actions (`collect`, `count`, `show`) send the query to the service.
pub struct DataFrame {
    driver: Arc<dyn SessionDriver>,
    closed: Arc<AtomicBool>,
    sql: String,
    params: Vec<SqlValue>,
}

impl fmt::Debug for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFrame")
            .field("sql", &self.sql)
            .field("params", &self.params)
            .finish()
    }
}

impl DataFrame {
    pub(crate) fn new(
        driver: Arc<dyn SessionDriver>,
        closed: Arc<AtomicBool>,
        sql: String,
        params: Vec<SqlValue>,
    ) -> Self {
        Self {
            driver,
            closed,
            sql,
            params,
        }
    }

    /// The SQL text this DataFrame evaluates.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The parameters bound to [`DataFrame::sql`].
    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    async fn run(&self, sql: &str) -> Result<RawQueryResult> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FlakersError::SessionClosed);
        }
        self.driver.execute(sql, &self.params).await
    }

    /// Execute the query and return every row.
    pub async fn collect(&self) -> Result<QueryResult> {
        let raw = self.run(&self.sql).await?;
        Ok(QueryResult::from_raw(raw))
    }

    /// Count the rows of this DataFrame on the server.
    pub async fn count(&self) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM ({}) AS Q", self.sql);
        let row = QueryResult::from_raw(self.run(&sql).await?).single_row()?;
        let value = row.get_index(0)?.unwrap_or("0");
        value
            .parse()
            .map_err(|_| FlakersError::QueryFailed(format!("invalid row count {:?}", value)))
    }

    /// Print the first [`DEFAULT_SHOW_ROWS`] rows to standard output.
    pub async fn show(&self) -> Result<()> {
        self.show_rows(DEFAULT_SHOW_ROWS).await
    }

    /// Print the first `n` rows to standard output.
    pub async fn show_rows(&self, n: usize) -> Result<()> {
        let table = self.show_string(n, DEFAULT_MAX_WIDTH).await?;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(table.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }

    /// Render the first `n` rows as a text table, cutting cells longer than `max_width`.
    pub async fn show_string(&self, n: usize, max_width: usize) -> Result<String> {
        let sql = format!("SELECT * FROM ({}) AS Q LIMIT {}", self.sql, n);
        let raw = self.run(&sql).await?;
        Ok(show::render(&raw.columns, &raw.rows, max_width))
    }
}
