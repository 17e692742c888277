//! Connection parameters and the connector seam.
//!
//! [`Connector`] opens a [`Session`] for a set of [`ConnectParams`].
//! [`PgConnector`] does it with a single `sqlx::PgConnection`; sessions run
//! outside any transaction, so every statement autocommits.

use std::fmt;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;

use deploy_tool_core::{CoreError, Options};

use crate::error::DbError;

/// Replacement for the password whenever parameters are displayed.
const MASK: &str = "********";

/// Parameters for one connection.
///
/// `dbname` is `None` for a server-level connection (used to issue
/// `CREATE DATABASE`), `Some` once the target database is known to exist.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub dbname: Option<String>,
}

impl ConnectParams {
    /// Server-level parameters from the connection options.
    pub fn from_options(options: &Options) -> Result<Self, CoreError> {
        let port = options.require("db_port")?;
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|e| CoreError::InvalidOption {
                key: "db_port".into(),
                reason: format!("{port:?} is not a valid port ({e})"),
            })?;

        Ok(Self {
            user: options.require("db_user")?.to_string(),
            password: options.require("db_password")?.to_string(),
            host: options.require("db_host")?.to_string(),
            port,
            dbname: None,
        })
    }

    pub fn with_database(mut self, dbname: impl Into<String>) -> Self {
        self.dbname = Some(dbname.into());
        self
    }

    /// libpq-style `key=value` connection string, password included.
    pub fn dsn(&self) -> String {
        self.render(&self.password)
    }

    pub fn to_pg_options(&self) -> PgConnectOptions {
        let opts = PgConnectOptions::new()
            .username(&self.user)
            .password(&self.password)
            .host(&self.host)
            .port(self.port);

        match &self.dbname {
            Some(db) => opts.database(db),
            None => opts,
        }
    }

    fn render(&self, password: &str) -> String {
        let mut parts = vec![
            format!("user={}", self.user),
            format!("password={password}"),
            format!("host={}", self.host),
            format!("port={}", self.port),
        ];
        if let Some(db) = &self.dbname {
            parts.push(format!("dbname={db}"));
        }
        parts.join(" ")
    }
}

/// Masked form, safe for logs.
impl fmt::Display for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(MASK))
    }
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("user", &self.user)
            .field("password", &MASK)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .finish()
    }
}

/// An open connection able to run SQL scripts.
#[async_trait]
pub trait Session: Send {
    /// Run `sql` as one script. Multiple statements are allowed.
    async fn execute(&mut self, sql: &str) -> Result<(), DbError>;
}

/// Opens sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn Session>, DbError>;
}

/// Connector backed by `sqlx`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn Session>, DbError> {
        tracing::debug!(%params, "Opening PostgreSQL connection");

        let conn = PgConnection::connect_with(&params.to_pg_options())
            .await
            .map_err(DbError::Connect)?;

        Ok(Box::new(PgSession { conn }))
    }
}

/// A live `sqlx` connection.
pub struct PgSession {
    conn: PgConnection,
}

#[async_trait]
impl Session for PgSession {
    async fn execute(&mut self, sql: &str) -> Result<(), DbError> {
        // Simple-query protocol: the whole script goes in one round trip.
        sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql(sql))
            .await
            .map_err(DbError::Query)?;
        Ok(())
    }
}
