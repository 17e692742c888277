//! PostgreSQL backend.
//!
//! `init_db` connects to the target database, creating it first when the
//! connection is refused. `query_from_file` loads a SQL dump, substitutes
//! `{{key}}` macros and runs it as one script.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use deploy_tool_core::{macros, Logger, Options};

use crate::connect::{ConnectParams, Connector, Session};
use crate::error::DbError;
use crate::{DbBackend, QueryOutcome};

/// Statement used to create a missing database.
pub const DEFAULT_DB_CREATE: &str = "CREATE DATABASE {{db_name}} WITH ENCODING 'UTF8'";

/// Dump file loaded when `query_from_file` gets an empty path.
pub const DEFAULT_SQL_FILE: &str = "{{mount_dir}}/deploy/db/dump.sql";

/// Where the backend's current session points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    /// Connected without a database, only good for `CREATE DATABASE`.
    Server,
    Database,
}

pub struct DbPostgres {
    options: Options,
    connector: Arc<dyn Connector>,
    create_template: String,
    session: Option<Box<dyn Session>>,
    state: ConnectionState,
}

impl DbPostgres {
    pub fn new(options: Options, connector: Arc<dyn Connector>) -> Self {
        Self {
            options,
            connector,
            create_template: DEFAULT_DB_CREATE.to_string(),
            session: None,
            state: ConnectionState::Unconnected,
        }
    }

    /// Override the `CREATE DATABASE` template. Macros are substituted
    /// against the options before it runs.
    pub fn with_create_template(mut self, template: impl Into<String>) -> Self {
        self.create_template = template.into();
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn db_name(&self) -> Result<&str, DbError> {
        Ok(self.options.require("db_name")?)
    }

    /// Open a session, replacing the current one on success.
    async fn connect(&mut self, to_db: bool) -> Result<(), DbError> {
        let mut params = ConnectParams::from_options(&self.options)?;
        if to_db {
            params = params.with_database(self.db_name()?);
        }

        let session = self.connector.connect(&params).await?;
        tracing::info!(%params, "Connected to PostgreSQL");

        self.session = Some(session);
        self.state = if to_db {
            ConnectionState::Database
        } else {
            ConnectionState::Server
        };
        Ok(())
    }

    async fn create(&mut self, log: &mut Logger) -> Result<(), DbError> {
        let db_name = self.db_name()?.to_string();
        log.add(format!("Creating new Postgres DB: {db_name}"));

        self.connect(false).await?;

        let query = macros::replace(&self.create_template, &self.options);
        tracing::info!(db_name = %db_name, "Creating database");

        self.session
            .as_mut()
            .ok_or(DbError::NotConnected)?
            .execute(&query)
            .await
    }
}

#[async_trait]
impl DbBackend for DbPostgres {
    async fn init_db(&mut self, log: &mut Logger) -> Result<(), DbError> {
        self.options.check_required()?;

        match self.connect(true).await {
            Ok(()) => Ok(()),
            Err(DbError::Connect(e)) => {
                let db_name = self.db_name()?.to_string();
                tracing::warn!(db_name = %db_name, error = %e, "Database connection failed");
                log.add(format!("Can't connect to DB: {db_name}"));

                self.create(log).await?;
                self.connect(true).await
            }
            Err(e) => Err(e),
        }
    }

    async fn query_from_file(
        &mut self,
        path: &str,
        log: &mut Logger,
    ) -> Result<QueryOutcome, DbError> {
        let template = if path.is_empty() {
            DEFAULT_SQL_FILE
        } else {
            path
        };
        let path = macros::replace(template, &self.options);

        if !Path::new(&path).is_file() {
            log.add(format!("Dump file {path} isn't exists"));
            return Ok(QueryOutcome::Skipped { path });
        }

        let query = tokio::fs::read_to_string(&path).await?;
        let query = macros::replace(&query, &self.options);

        let session = match (self.state, self.session.as_mut()) {
            (ConnectionState::Database, Some(session)) => session,
            _ => return Err(DbError::NotConnected),
        };

        log.add(format!("Execute PostgreSQL query from {path}"));
        session.execute(&query).await?;

        tracing::info!(path = %path, bytes = query.len(), "Dump executed");
        Ok(QueryOutcome::Executed { path })
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use assert_matches::assert_matches;

    use super::*;
    use crate::testing::RecordingConnector;

    fn options() -> Options {
        Options::from_iter([
            ("db_name", "test_name"),
            ("db_host", "test_host"),
            ("db_port", "5432"),
            ("db_user", "test_user"),
            ("db_password", "test_db_password"),
        ])
    }

    fn backend(connector: &RecordingConnector, options: Options) -> DbPostgres {
        DbPostgres::new(options, Arc::new(connector.clone()))
    }

    async fn ready_backend(connector: &RecordingConnector, options: Options) -> DbPostgres {
        let mut db = backend(connector, options);
        db.init_db(&mut Logger::with_sink(io::sink())).await.unwrap();
        db
    }

    #[test]
    fn default_templates() {
        assert_eq!(
            DEFAULT_DB_CREATE,
            "CREATE DATABASE {{db_name}} WITH ENCODING 'UTF8'"
        );
        assert_eq!(DEFAULT_SQL_FILE, "{{mount_dir}}/deploy/db/dump.sql");
    }

    #[tokio::test]
    async fn init_connects_straight_to_existing_database() {
        let connector = RecordingConnector::new();
        let mut log = Logger::with_sink(io::sink());
        let mut db = backend(&connector, options());

        db.init_db(&mut log).await.unwrap();

        assert_eq!(db.state(), ConnectionState::Database);
        assert_eq!(
            connector.connects(),
            ["user=test_user password=test_db_password host=test_host port=5432 dbname=test_name"]
        );
        assert!(connector.executed().is_empty());
        assert_eq!(log.count(), 0);
    }

    #[tokio::test]
    async fn init_creates_missing_database_then_reconnects() {
        let connector = RecordingConnector::new().refuse_database_connects(1);
        let mut log = Logger::with_sink(io::sink());
        let mut db = backend(&connector, options());

        db.init_db(&mut log).await.unwrap();

        let messages: Vec<&str> = log.messages().collect();
        assert_eq!(
            messages,
            [
                "Can't connect to DB: test_name",
                "Creating new Postgres DB: test_name",
            ]
        );
        assert_eq!(
            connector.connects(),
            [
                "user=test_user password=test_db_password host=test_host port=5432 dbname=test_name",
                "user=test_user password=test_db_password host=test_host port=5432",
                "user=test_user password=test_db_password host=test_host port=5432 dbname=test_name",
            ]
        );
        assert_eq!(
            connector.executed(),
            [(
                None,
                "CREATE DATABASE test_name WITH ENCODING 'UTF8'".to_string()
            )]
        );
        assert_eq!(db.state(), ConnectionState::Database);
    }

    #[tokio::test]
    async fn init_fails_when_server_is_unreachable() {
        let connector = RecordingConnector::new().refuse_all();
        let mut log = Logger::with_sink(io::sink());
        let mut db = backend(&connector, options());

        let err = db.init_db(&mut log).await.unwrap_err();

        assert_matches!(err, DbError::Connect(_));
        assert_eq!(log.last().unwrap().message, "Creating new Postgres DB: test_name");
        assert_eq!(connector.connects().len(), 2);
        assert_eq!(db.state(), ConnectionState::Unconnected);
    }

    #[tokio::test]
    async fn init_fails_when_reconnect_after_create_fails() {
        let connector = RecordingConnector::new().refuse_database_connects(2);
        let mut db = backend(&connector, options());

        let err = db
            .init_db(&mut Logger::with_sink(io::sink()))
            .await
            .unwrap_err();

        assert_matches!(err, DbError::Connect(_));
        assert_eq!(connector.connects().len(), 3);
        assert_eq!(db.state(), ConnectionState::Server);
    }

    #[tokio::test]
    async fn init_propagates_create_failure() {
        let connector = RecordingConnector::new()
            .refuse_database_connects(1)
            .fail_queries("permission denied to create database");
        let mut db = backend(&connector, options());

        let err = db
            .init_db(&mut Logger::with_sink(io::sink()))
            .await
            .unwrap_err();

        assert_matches!(err, DbError::Query(_));
        assert!(err.to_string().contains("permission denied"));
    }

    #[tokio::test]
    async fn init_rejects_missing_password_before_connecting() {
        let connector = RecordingConnector::new();
        let base = options();
        let mut opts: Vec<(&str, &str)> = base.iter().collect();
        opts.retain(|(k, _)| *k != "db_password");
        let mut db = backend(&connector, Options::from_iter(opts));

        let err = db
            .init_db(&mut Logger::with_sink(io::sink()))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("db_password undefined"));
        assert!(connector.connects().is_empty());
    }

    #[tokio::test]
    async fn init_rejects_blank_host() {
        let connector = RecordingConnector::new();
        let mut db = backend(
            &connector,
            Options::from_iter(options().iter().map(|(k, v)| {
                if k == "db_host" {
                    (k, "  ")
                } else {
                    (k, v)
                }
            })),
        );

        let err = db
            .init_db(&mut Logger::with_sink(io::sink()))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "db_host undefined");
    }

    #[tokio::test]
    async fn custom_create_template_is_substituted() {
        let connector = RecordingConnector::new().refuse_database_connects(1);
        let mut db = backend(&connector, options())
            .with_create_template("CREATE DATABASE {{db_name}} OWNER {{db_user}}");

        db.init_db(&mut Logger::with_sink(io::sink())).await.unwrap();

        assert_eq!(
            connector.executed(),
            [(None, "CREATE DATABASE test_name OWNER test_user".to_string())]
        );
    }

    #[tokio::test]
    async fn missing_dump_is_skipped() {
        let connector = RecordingConnector::new();
        let mut db = ready_backend(&connector, options()).await;
        let mut log = Logger::with_sink(io::sink());

        let outcome = db.query_from_file("/nonexistent/dump.sql", &mut log).await.unwrap();

        assert_eq!(
            outcome,
            QueryOutcome::Skipped {
                path: "/nonexistent/dump.sql".into()
            }
        );
        assert_eq!(
            log.last().unwrap().message,
            "Dump file /nonexistent/dump.sql isn't exists"
        );
        assert!(connector.executed().is_empty());
    }

    #[tokio::test]
    async fn directory_is_not_a_dump_file() {
        let dir = tempfile::tempdir().unwrap();
        let connector = RecordingConnector::new();
        let mut db = ready_backend(&connector, options()).await;

        let path = dir.path().to_string_lossy().to_string();
        let outcome = db
            .query_from_file(&path, &mut Logger::with_sink(io::sink()))
            .await
            .unwrap();

        assert_matches!(outcome, QueryOutcome::Skipped { .. });
        assert!(connector.executed().is_empty());
    }

    #[tokio::test]
    async fn dump_is_substituted_and_executed() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump.sql");
        std::fs::write(
            &dump,
            "CREATE TABLE t (id int);\nGRANT ALL ON t TO {{db_user}};\n",
        )
        .unwrap();

        let connector = RecordingConnector::new();
        let mut db = ready_backend(&connector, options()).await;
        let mut log = Logger::with_sink(io::sink());

        let path = dump.to_string_lossy().to_string();
        let outcome = db.query_from_file(&path, &mut log).await.unwrap();

        assert_eq!(outcome, QueryOutcome::Executed { path: path.clone() });
        assert_eq!(
            log.last().unwrap().message,
            format!("Execute PostgreSQL query from {path}")
        );
        assert_eq!(
            connector.executed(),
            [(
                Some("test_name".to_string()),
                "CREATE TABLE t (id int);\nGRANT ALL ON t TO test_user;\n".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn empty_path_uses_default_dump_under_mount_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db_dir = dir.path().join("deploy").join("db");
        std::fs::create_dir_all(&db_dir).unwrap();
        std::fs::write(db_dir.join("dump.sql"), "SELECT 1;").unwrap();

        let mount_dir = dir.path().to_string_lossy().to_string();
        let base = options();
        let mut opts: Vec<(&str, &str)> = base.iter().collect();
        opts.push(("mount_dir", mount_dir.as_str()));
        let opts = Options::from_iter(opts);

        let connector = RecordingConnector::new();
        let mut db = ready_backend(&connector, opts).await;

        let outcome = db
            .query_from_file("", &mut Logger::with_sink(io::sink()))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            QueryOutcome::Executed {
                path: format!("{mount_dir}/deploy/db/dump.sql")
            }
        );
        assert_eq!(connector.executed().len(), 1);
    }

    #[tokio::test]
    async fn query_before_init_is_not_connected() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump.sql");
        std::fs::write(&dump, "SELECT 1;").unwrap();

        let connector = RecordingConnector::new();
        let mut db = backend(&connector, options());

        let err = db
            .query_from_file(&dump.to_string_lossy(), &mut Logger::with_sink(io::sink()))
            .await
            .unwrap_err();

        assert_matches!(err, DbError::NotConnected);
        assert!(connector.executed().is_empty());
    }
}
