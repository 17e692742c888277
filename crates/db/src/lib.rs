//! Database backends for `deploy-tool`.
//!
//! A backend is picked by the `db_type` option (see [`DbType`]) and offers
//! two capabilities: make sure the target database exists and is
//! connected ([`DbBackend::init_db`]), and run a SQL dump file against it
//! ([`DbBackend::query_from_file`]).

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use deploy_tool_core::{CoreError, Logger, Options};

pub mod connect;
pub mod error;
pub mod postgres;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use connect::{ConnectParams, Connector, PgConnector, Session};
pub use error::DbError;
pub use postgres::DbPostgres;

/// Result of running a dump file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Executed { path: String },
    /// The resolved path is not an existing file; nothing ran.
    Skipped { path: String },
}

#[async_trait]
pub trait DbBackend: Send {
    /// Connect to the target database, creating it if needed.
    async fn init_db(&mut self, log: &mut Logger) -> Result<(), DbError>;

    /// Run the SQL script at `path` (empty: the backend's default dump).
    async fn query_from_file(
        &mut self,
        path: &str,
        log: &mut Logger,
    ) -> Result<QueryOutcome, DbError>;
}

/// Supported `db_type` tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    /// `pgsql`
    Postgres,
}

impl DbType {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Postgres => "pgsql",
        }
    }
}

impl FromStr for DbType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pgsql" => Ok(Self::Postgres),
            other => Err(CoreError::UnknownDbType(other.to_string())),
        }
    }
}

/// Build the backend named by the `db_type` option.
pub fn create_backend(
    options: &Options,
    connector: Arc<dyn Connector>,
) -> Result<Box<dyn DbBackend>, DbError> {
    let db_type: DbType = options.require("db_type")?.parse()?;

    tracing::debug!(db_type = db_type.tag(), "Selected database backend");

    match db_type {
        DbType::Postgres => Ok(Box::new(DbPostgres::new(options.clone(), connector))),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::testing::RecordingConnector;

    #[test]
    fn pgsql_tag_selects_postgres() {
        assert_eq!("pgsql".parse::<DbType>().unwrap(), DbType::Postgres);
        assert_eq!(DbType::Postgres.tag(), "pgsql");
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = "mysql".parse::<DbType>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown DB type: mysql");
    }

    #[test]
    fn tags_are_case_sensitive() {
        assert_matches!("PGSQL".parse::<DbType>(), Err(CoreError::UnknownDbType(_)));
    }

    #[test]
    fn create_backend_for_unknown_type() {
        let options = Options::from_iter([("db_type", "mysql")]);
        let err = create_backend(&options, Arc::new(RecordingConnector::new()))
            .err()
            .unwrap();
        assert!(err.to_string().contains("Unknown DB type: mysql"));
    }

    #[test]
    fn create_backend_without_type() {
        let err = create_backend(&Options::default(), Arc::new(RecordingConnector::new()))
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "db_type undefined");
    }

    #[test]
    fn create_backend_for_pgsql() {
        let options = Options::from_iter([("db_type", "pgsql")]);
        assert!(create_backend(&options, Arc::new(RecordingConnector::new())).is_ok());
    }
}
