use crate::error::{FlakersError, Result};
use crate::types::SqlValue;

/// A positional tuple of values used to build a dataframe.
///
/// Use the [`row!`](crate::row) macro to mix value types:
/// ```
/// use flakers::{row, SqlValue};
///
/// let r = row![1, "Ram"];
/// assert_eq!(r.values(), &[SqlValue::Int32(1), SqlValue::from("Ram")]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Builds a [`Row`] from a list of values convertible into [`SqlValue`].
#[macro_export]
macro_rules! row {
    ($($value:expr),* $(,)?) => {
        $crate::types::Row::new(vec![$($crate::types::SqlValue::from($value)),*])
    };
}

/// Driver-agnostic raw result from a query.
/// All values are converted to strings by the driver; `None` is SQL NULL.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQueryResult {
    /// Column names in order
    pub columns: Vec<String>,
    /// Rows, where each row is a vector of values in column order
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawQueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }
}

/// A single row of a query result.
/// Values are accessed by column name or position.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    columns: Vec<String>,
    values: Vec<Option<String>>,
}

impl ResultRow {
    pub(crate) fn new(columns: Vec<String>, values: Vec<Option<String>>) -> Self {
        Self { columns, values }
    }

    /// Gets a value by column name. Names are compared case-insensitively.
    pub fn get(&self, column: &str) -> Result<Option<&str>> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
            .map(|v| v.as_deref())
            .ok_or_else(|| FlakersError::ColumnNotFound(column.to_string()))
    }

    /// Gets a value by zero-based position.
    pub fn get_index(&self, index: usize) -> Result<Option<&str>> {
        self.values
            .get(index)
            .map(|v| v.as_deref())
            .ok_or_else(|| FlakersError::ColumnNotFound(format!("#{}", index)))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Result of a query execution, containing zero or more rows.
#[derive(Debug)]
pub struct QueryResult {
    columns: Vec<String>,
    rows: Vec<ResultRow>,
}

impl QueryResult {
    /// Creates a QueryResult from a RawQueryResult.
    pub fn from_raw(raw: RawQueryResult) -> Self {
        let columns = raw.columns;
        let rows = raw
            .rows
            .into_iter()
            .map(|values| ResultRow::new(columns.clone(), values))
            .collect();
        Self { columns, rows }
    }

    /// Extracts a single row from the result.
    /// Returns an error if the result contains zero or more than one row.
    pub fn single_row(self) -> Result<ResultRow> {
        let actual = self.rows.len();
        let mut rows = self.rows.into_iter();
        match (rows.next(), rows.next()) {
            (Some(row), None) => Ok(row),
            _ => Err(FlakersError::UnexpectedRowCount {
                expected: 1,
                actual,
            }),
        }
    }

    /// Returns all rows from the result.
    pub fn rows(self) -> Vec<ResultRow> {
        self.rows
    }

    /// Returns a reference to the rows without consuming the result.
    pub fn rows_ref(&self) -> &[ResultRow] {
        &self.rows
    }

    /// Returns the column names from this result.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the number of rows in this result.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if this result contains no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
