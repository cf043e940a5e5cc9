use crate::types::{SqlValue, StructType};

/// Builds the query that materializes local rows on the server.
///
/// Rows must already conform to the schema. Non-null values become bound
/// parameters wrapped in a cast to the column type; nulls are inlined as typed
/// `NULL` casts so no parameter type has to be inferred for them.
pub struct ValuesBuilder<'a> {
    schema: &'a StructType,
    rows: &'a [Vec<SqlValue>],
}

impl<'a> ValuesBuilder<'a> {
    pub fn new(schema: &'a StructType, rows: &'a [Vec<SqlValue>]) -> Self {
        Self { schema, rows }
    }

    /// Build the SQL query string and parameters.
    /// `placeholder` renders the marker for the n-th (1-based) parameter.
    pub fn build_sql(&self, placeholder: impl Fn(usize) -> String) -> (String, Vec<SqlValue>) {
        let mut sql = String::with_capacity(256);
        let mut params = Vec::new();

        let names: Vec<String> = self
            .schema
            .fields()
            .iter()
            .map(|f| f.quoted_name())
            .collect();

        if self.rows.is_empty() {
            sql.push_str("SELECT ");
            for (i, (field, name)) in self.schema.fields().iter().zip(&names).enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&format!(
                    "CAST(NULL AS {}) AS {}",
                    field.data_type().sql_name(),
                    name
                ));
            }
            sql.push_str(" WHERE 1 = 0");
            return (sql, params);
        }

        // SELECT clause
        sql.push_str("SELECT ");
        sql.push_str(&names.join(", "));

        // FROM (VALUES ...) clause
        sql.push_str(" FROM (VALUES ");
        for (r, row) in self.rows.iter().enumerate() {
            if r > 0 {
                sql.push_str(", ");
            }
            sql.push('(');
            for (i, (field, value)) in self.schema.fields().iter().zip(row).enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                let marker = if value.is_null() {
                    "NULL".to_string()
                } else {
                    params.push(value.clone());
                    placeholder(params.len())
                };
                sql.push_str(&format!(
                    "CAST({} AS {})",
                    marker,
                    field.data_type().sql_name()
                ));
            }
            sql.push(')');
        }
        sql.push_str(") AS T (");
        sql.push_str(&names.join(", "));
        sql.push(')');

        (sql, params)
    }
}
