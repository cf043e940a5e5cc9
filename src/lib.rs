//! flakers - a small, driver-agnostic warehouse session and dataframe client
//!
//! # Example
//! ```ignore
//! use flakers::{row, DataType, Session, StructField, StructType};
//!
//! // Open a session
//! let session = Session::builder()
//!     .config("URL", "https://xy12345.snowflakecomputing.com")
//!     .config("USER", "ram")
//!     .config("PASSWORD", "secret")
//!     .config("WAREHOUSE", "COMPUTE_WH")
//!     .create()
//!     .await?;
//!
//! // Materialize local rows on the server and print them
//! let schema = StructType::new([
//!     StructField::new("id", DataType::Integer),
//!     StructField::new("name", DataType::String),
//! ]);
//! let df = session.create_dataframe(&[row![1, "Ram"], row![2, "Hari"]], schema)?;
//! df.show().await?;
//!
//! session.close().await?;
//! ```

pub mod builders;
pub mod config;
pub mod dataframe;
pub mod demo;
pub mod drivers;
pub mod error;
pub mod session;
pub mod show;
pub mod traits;
pub mod types;

// Re-export main types for convenient access
pub use crate::config::SessionConfig;
pub use dataframe::DataFrame;
pub use error::{FlakersError, Result};
pub use session::{Session, SessionBuilder};
pub use traits::SessionDriver;
pub use types::{
    DataType, QueryResult, RawQueryResult, ResultRow, Row, SqlValue, StructField, StructType,
};
