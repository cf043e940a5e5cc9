//! The demonstration routine: open a session, show a two-row table, close.

use std::collections::HashMap;
use std::io::Write;

use crate::config;
use crate::dataframe::{DEFAULT_MAX_WIDTH, DEFAULT_SHOW_ROWS};
use crate::error::Result;
use crate::row;
use crate::session::{Session, SessionBuilder};
use crate::types::{DataType, Row, StructField, StructType};

/// Connection parameters with placeholder values. Replace them before real use.
pub fn placeholder_config() -> HashMap<String, String> {
    [
        (config::URL, "https://<your_account>.snowflakecomputing.com"),
        (config::USER, "<your_username>"),
        (config::PASSWORD, "<your_password>"),
        (config::ROLE, "<your_role>"),
        (config::WAREHOUSE, "<your_warehouse>"),
        (config::DB, "<your_database>"),
        (config::SCHEMA, "<your_schema>"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub fn schema() -> StructType {
    StructType::new([
        StructField::new("id", DataType::Integer),
        StructField::new("name", DataType::String),
    ])
}

pub fn rows() -> Vec<Row> {
    vec![row![1, "Ram"], row![2, "Hari"]]
}

/// Open a session from `builder`, write the demo table to `out` and close the session.
///
/// The session is closed whether or not rendering succeeded. If both fail,
/// the rendering error is returned.
pub async fn run(builder: SessionBuilder, out: &mut dyn Write) -> Result<()> {
    let session = builder.create().await?;
    let outcome = show_people(&session, out).await;
    let closed = session.close().await;

    match (outcome, closed) {
        (Err(e), Err(close_err)) => {
            tracing::warn!(error = %close_err, "failed to close session after error");
            Err(e)
        }
        (outcome, closed) => outcome.and(closed),
    }
}

async fn show_people(session: &Session, out: &mut dyn Write) -> Result<()> {
    let df = session.create_dataframe(&rows(), schema())?;
    let table = df.show_string(DEFAULT_SHOW_ROWS, DEFAULT_MAX_WIDTH).await?;
    out.write_all(table.as_bytes())?;
    out.flush()?;
    Ok(())
}
