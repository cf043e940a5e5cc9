mod row;
mod schema;
mod sql_value;

pub use row::{QueryResult, RawQueryResult, ResultRow, Row};
pub use schema::{DataType, StructField, StructType};
pub use sql_value::SqlValue;
