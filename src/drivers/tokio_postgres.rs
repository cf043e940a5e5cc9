use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls};

use crate::config::SessionConfig;
use crate::error::{FlakersError, Result};
use crate::traits::SessionDriver;
use crate::types::{RawQueryResult, SqlValue};

const DEFAULT_PORT: u16 = 5432;

/// Driver for Postgres-wire warehouses using tokio-postgres.
///
/// `ROLE` is applied with `SET ROLE` and `SCHEMA` with `SET search_path`.
/// `WAREHOUSE` has no equivalent and is ignored. Every round trip is bounded
/// by `NETWORK_TIMEOUT`.
pub struct TokioPostgresDriver {
    client: Mutex<Option<Client>>,
    connection: Mutex<Option<JoinHandle<()>>>,
    network_timeout: Duration,
}

impl TokioPostgresDriver {
    /// Connect and apply the session-level settings from `config`.
    pub async fn connect(config: &SessionConfig) -> Result<Self> {
        let host = config
            .url
            .host_str()
            .ok_or_else(|| FlakersError::InvalidConfig("URL has no host".to_string()))?;

        let mut pg = tokio_postgres::Config::new();
        pg.host(host)
            .port(config.url.port().unwrap_or(DEFAULT_PORT))
            .user(&config.user)
            .password(&config.password)
            .connect_timeout(config.network_timeout)
            .application_name(env!("CARGO_PKG_NAME"));

        let path_db = config.url.path().trim_start_matches('/');
        match config.database.as_deref() {
            Some(db) => {
                pg.dbname(db);
            }
            None if !path_db.is_empty() => {
                pg.dbname(path_db);
            }
            None => {}
        }

        let (client, connection) = pg
            .connect(NoTls)
            .await
            .map_err(|e| FlakersError::ConnectionFailed(e.to_string()))?;

        // Spawn the connection handler
        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "postgres connection error");
            }
        });

        if config.warehouse.is_some() {
            tracing::warn!("WAREHOUSE is not applicable to postgres sessions, ignoring");
        }
        if let Some(setup) = setup_sql(config) {
            within(
                config.network_timeout,
                client.batch_execute(&setup),
                FlakersError::ConnectionFailed,
            )
            .await?;
        }

        tracing::info!(host, user = %config.user, "postgres session opened");
        Ok(Self {
            client: Mutex::new(Some(client)),
            connection: Mutex::new(Some(connection)),
            network_timeout: config.network_timeout,
        })
    }
}

#[async_trait]
impl SessionDriver for TokioPostgresDriver {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(FlakersError::SessionClosed)?;

        // Convert SqlValue params to tokio-postgres compatible types
        let converted_params: Vec<Box<dyn ToSql + Sync + Send>> =
            params.iter().map(sql_value_to_tosql).collect();

        let param_refs: Vec<&(dyn ToSql + Sync)> = converted_params
            .iter()
            .map(|b| b.as_ref() as &(dyn ToSql + Sync))
            .collect();

        tracing::debug!(sql, "executing");
        let statement = within(
            self.network_timeout,
            client.prepare(sql),
            FlakersError::QueryFailed,
        )
        .await?;
        let rows = within(
            self.network_timeout,
            client.query(&statement, &param_refs),
            FlakersError::QueryFailed,
        )
        .await?;

        // Column names come from the statement so empty results keep their shape
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let result_rows = rows
            .iter()
            .map(|row| {
                row.columns()
                    .iter()
                    .enumerate()
                    .map(|(i, col)| row_value_to_string(row, i, col.type_()))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RawQueryResult::new(columns, result_rows))
    }

    async fn close(&self) -> Result<()> {
        let Some(client) = self.client.lock().await.take() else {
            return Ok(());
        };
        drop(client);
        if let Some(connection) = self.connection.lock().await.take() {
            connection
                .await
                .map_err(|e| FlakersError::ConnectionFailed(e.to_string()))?;
        }
        tracing::info!("postgres session closed");
        Ok(())
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }
}

/// Convert a SqlValue to a boxed ToSql trait object.
fn sql_value_to_tosql(value: &SqlValue) -> Box<dyn ToSql + Sync + Send> {
    match value {
        SqlValue::Null => Box::new(None::<String>),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::Int32(i) => Box::new(*i),
        SqlValue::Int64(i) => Box::new(*i),
        SqlValue::Float64(v) => Box::new(*v),
        SqlValue::Bool(b) => Box::new(*b),
    }
}

/// Await a postgres round trip, failing with `error` if it outlasts `limit`.
async fn within<T, F>(limit: Duration, future: F, error: fn(String) -> FlakersError) -> Result<T>
where
    F: Future<Output = std::result::Result<T, tokio_postgres::Error>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result.map_err(|e| error(e.to_string())),
        Err(_) => Err(error(format!("no response within {:?}", limit))),
    }
}

/// Statements applying `ROLE` and `SCHEMA`, run once after connecting.
fn setup_sql(config: &SessionConfig) -> Option<String> {
    let mut setup = Vec::new();
    if let Some(role) = &config.role {
        setup.push(format!("SET ROLE {}", quote_verbatim(role)));
    }
    if let Some(schema) = &config.schema {
        setup.push(format!("SET search_path TO {}", quote_verbatim(schema)));
    }
    if setup.is_empty() {
        None
    } else {
        Some(setup.join("; "))
    }
}

/// How a result column is read back as text.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Decoder {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Text,
}

impl Decoder {
    fn for_type(type_: &Type) -> Result<Self> {
        match type_.name() {
            "bool" => Ok(Self::Bool),
            "int2" => Ok(Self::Int2),
            "int4" => Ok(Self::Int4),
            "int8" => Ok(Self::Int8),
            "float4" => Ok(Self::Float4),
            "float8" => Ok(Self::Float8),
            "text" | "varchar" | "bpchar" | "name" | "unknown" => Ok(Self::Text),
            other => Err(FlakersError::QueryFailed(format!(
                "unsupported column type {}",
                other
            ))),
        }
    }
}

/// Convert a row value at a given index to its text form.
fn row_value_to_string(
    row: &tokio_postgres::Row,
    index: usize,
    type_: &Type,
) -> Result<Option<String>> {
    fn text<T: ToString>(value: Option<T>) -> Option<String> {
        value.map(|v| v.to_string())
    }

    let value = match Decoder::for_type(type_)? {
        Decoder::Bool => row.try_get::<_, Option<bool>>(index).map(text),
        Decoder::Int2 => row.try_get::<_, Option<i16>>(index).map(text),
        Decoder::Int4 => row.try_get::<_, Option<i32>>(index).map(text),
        Decoder::Int8 => row.try_get::<_, Option<i64>>(index).map(text),
        Decoder::Float4 => row.try_get::<_, Option<f32>>(index).map(text),
        Decoder::Float8 => row.try_get::<_, Option<f64>>(index).map(text),
        Decoder::Text => row.try_get::<_, Option<String>>(index),
    };
    value.map_err(|e| FlakersError::QueryFailed(e.to_string()))
}

fn quote_verbatim(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}
