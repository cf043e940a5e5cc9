use async_trait::async_trait;

use crate::error::Result;
use crate::types::{RawQueryResult, SqlValue};

/// Trait for warehouse driver implementations.
/// Drivers are responsible for:
/// - Opening and releasing the remote session
/// - Converting SqlValue parameters to native bindings
/// - Executing queries and converting results to RawQueryResult
#[async_trait]
pub trait SessionDriver: Send + Sync {
    /// Execute a SQL query with the given positional parameters.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult>;

    /// Release the remote session. Calling this more than once is a no-op.
    async fn close(&self) -> Result<()>;

    /// Placeholder text for the parameter at `index` (1-based).
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }
}
