use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::builders::ValuesBuilder;
use crate::config::SessionConfig;
use crate::dataframe::DataFrame;
use crate::drivers::{SnowflakeRestDriver, TokioPostgresDriver};
use crate::error::{FlakersError, Result};
use crate::traits::SessionDriver;
use crate::types::{Row, SqlValue, StructType};

/// Collects connection parameters and opens a [`Session`].
#[derive(Default)]
pub struct SessionBuilder {
    configs: HashMap<String, String>,
    driver: Option<Arc<dyn SessionDriver>>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge connection parameters. Later values replace earlier ones.
    pub fn configs<K, V>(mut self, configs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.configs
            .extend(configs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set a single connection parameter.
    pub fn config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.configs.insert(key.into(), value.into());
        self
    }

    /// Use `driver` instead of connecting based on the URL scheme.
    /// The configuration is still validated.
    pub fn with_driver(mut self, driver: Arc<dyn SessionDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Validate the configuration and open the session.
    ///
    /// # Example
    /// ```ignore
    /// let session = Session::builder()
    ///     .config("URL", "https://xy12345.snowflakecomputing.com")
    ///     .config("USER", "ram")
    ///     .config("PASSWORD", "secret")
    ///     .create()
    ///     .await?;
    /// ```
    pub async fn create(self) -> Result<Session> {
        let config = SessionConfig::from_map(&self.configs)?;
        tracing::debug!(?config, "creating session");
        let driver = match self.driver {
            Some(driver) => driver,
            None => connect(&config).await?,
        };
        Ok(Session::new(driver))
    }
}

async fn connect(config: &SessionConfig) -> Result<Arc<dyn SessionDriver>> {
    match config.url.scheme() {
        "https" | "http" => Ok(Arc::new(SnowflakeRestDriver::connect(config).await?)),
        "postgres" | "postgresql" => Ok(Arc::new(TokioPostgresDriver::connect(config).await?)),
        other => Err(FlakersError::InvalidConfig(format!(
            "unsupported URL scheme {:?}",
            other
        ))),
    }
}

/// A live session with the warehouse.
///
/// Call [`Session::close`] when done. A session dropped without being closed
/// is released in the background if a Tokio runtime is available. That
/// release is best-effort: a runtime that shuts down right after the drop,
/// as at the end of `#[tokio::main]`, may cancel it before it reaches the
/// service, leaving the remote session to expire on its own.
pub struct Session {
    driver: Arc<dyn SessionDriver>,
    closed: Arc<AtomicBool>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    fn new(driver: Arc<dyn SessionDriver>) -> Self {
        Self {
            driver,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a DataFrame holding `rows`, typed by `schema`.
    ///
    /// Rows are checked against the schema here; nothing is sent to the
    /// service until an action such as `collect` or `show` runs.
    pub fn create_dataframe(&self, rows: &[Row], schema: StructType) -> Result<DataFrame> {
        if schema.is_empty() {
            return Err(FlakersError::EmptySchema);
        }
        let values = rows
            .iter()
            .enumerate()
            .map(|(i, row)| schema.conform(i, row.values()))
            .collect::<Result<Vec<_>>>()?;

        let (sql, params) =
            ValuesBuilder::new(&schema, &values).build_sql(|i| self.driver.placeholder(i));
        Ok(self.dataframe(sql, params))
    }

    /// Create a DataFrame from a SQL query.
    pub fn sql(&self, query: impl Into<String>) -> DataFrame {
        self.dataframe(query.into(), Vec::new())
    }

    fn dataframe(&self, sql: String, params: Vec<SqlValue>) -> DataFrame {
        DataFrame::new(
            Arc::clone(&self.driver),
            Arc::clone(&self.closed),
            sql,
            params,
        )
    }

    /// Release the remote session.
    /// DataFrames created from this session fail with `SessionClosed` afterwards.
    pub async fn close(self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.driver.close().await?;
        tracing::info!("session closed");
        Ok(())
    }
}

/// Best-effort release of a session that was never closed explicitly.
impl Drop for Session {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!("session dropped without close, releasing it in the background");
                let driver = Arc::clone(&self.driver);
                handle.spawn(async move {
                    if let Err(e) = driver.close().await {
                        tracing::warn!(error = %e, "background session release failed");
                    }
                });
            }
            Err(_) => {
                tracing::warn!("session dropped outside a runtime, remote session left to expire");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::InMemoryTestDriver;
    use crate::row;
    use crate::types::{DataType, StructField};

    fn builder(driver: Arc<InMemoryTestDriver>) -> SessionBuilder {
        Session::builder()
            .config("URL", "https://acct.snowflakecomputing.com")
            .config("USER", "ram")
            .config("PASSWORD", "secret")
            .with_driver(driver)
    }

    fn people() -> StructType {
        StructType::new([
            StructField::new("id", DataType::Integer),
            StructField::new("name", DataType::String),
        ])
    }

    #[tokio::test]
    async fn test_create_validates_config_before_using_driver() {
        let driver = Arc::new(InMemoryTestDriver::new());
        let result = Session::builder()
            .config("URL", "https://acct.snowflakecomputing.com")
            .with_driver(driver.clone())
            .create()
            .await;
        assert!(matches!(result, Err(FlakersError::InvalidConfig(_))));
        driver.assert_query_count(0);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_scheme() {
        let result = Session::builder()
            .config("URL", "ftp://acct.example.com")
            .config("USER", "ram")
            .config("PASSWORD", "secret")
            .create()
            .await;
        assert!(matches!(result, Err(FlakersError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_create_dataframe_does_not_query() {
        let driver = Arc::new(InMemoryTestDriver::new());
        let session = builder(driver.clone()).create().await.unwrap();

        let df = session
            .create_dataframe(&[row![1, "Ram"]], people())
            .unwrap();
        assert_eq!(df.params(), &[SqlValue::Int32(1), SqlValue::from("Ram")]);
        driver.assert_query_count(0);

        session.close().await.unwrap();
        driver.assert_closed_once();
    }

    #[tokio::test]
    async fn test_create_dataframe_rejects_bad_rows() {
        let driver = Arc::new(InMemoryTestDriver::new());
        let session = builder(driver.clone()).create().await.unwrap();

        let err = session
            .create_dataframe(&[row![1, "Ram"], row![2]], people())
            .unwrap_err();
        assert!(matches!(
            err,
            FlakersError::SchemaMismatch {
                row: 1,
                expected: 2,
                actual: 1
            }
        ));

        let err = session
            .create_dataframe(&[row!["one", "Ram"]], people())
            .unwrap_err();
        assert!(matches!(err, FlakersError::TypeMismatch { row: 0, .. }));

        let err = session
            .create_dataframe(&[], StructType::default())
            .unwrap_err();
        assert!(matches!(err, FlakersError::EmptySchema));

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_dataframe_after_close_fails() {
        let driver = Arc::new(InMemoryTestDriver::new());
        let session = builder(driver.clone()).create().await.unwrap();
        let df = session.sql("SELECT 1");

        session.close().await.unwrap();

        assert!(matches!(
            df.collect().await,
            Err(FlakersError::SessionClosed)
        ));
        driver.assert_query_count(0);
        driver.assert_closed_once();
    }

    #[tokio::test]
    async fn test_drop_releases_session_in_background() {
        let driver = Arc::new(InMemoryTestDriver::new());
        let session = builder(driver.clone()).create().await.unwrap();

        drop(session);
        for _ in 0..10 {
            if driver.close_count() > 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        driver.assert_closed_once();
    }

    #[tokio::test]
    async fn test_close_then_drop_releases_once() {
        let driver = Arc::new(InMemoryTestDriver::new().with_close_failure("network down"));
        let session = builder(driver.clone()).create().await.unwrap();

        let result = session.close().await;
        assert!(matches!(result, Err(FlakersError::ConnectionFailed(_))));
        tokio::task::yield_now().await;
        driver.assert_closed_once();
    }

    #[test]
    fn test_drop_outside_runtime_leaves_session_open() {
        let driver = Arc::new(InMemoryTestDriver::new());
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let session = runtime
            .block_on(builder(driver.clone()).create())
            .unwrap();

        drop(session);
        drop(runtime);
        assert_eq!(driver.close_count(), 0);
    }
}
