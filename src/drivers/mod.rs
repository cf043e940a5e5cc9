mod in_memory_test;
mod snowflake_rest;
mod tokio_postgres;

pub use self::in_memory_test::{InMemoryTestDriver, InMemoryTestResponseBuilder, RecordedQuery};
pub use self::snowflake_rest::SnowflakeRestDriver;
pub use self::tokio_postgres::TokioPostgresDriver;
