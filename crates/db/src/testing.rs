//! In-memory connector for tests.
//!
//! [`RecordingConnector`] never touches the network. It records every
//! connection attempt (as its DSN) and every executed script, and can be
//! told to refuse connections or fail queries.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::connect::{ConnectParams, Connector, Session};
use crate::error::DbError;

#[derive(Debug, Default)]
struct Recorded {
    refuse_all: bool,
    refuse_database_connects: usize,
    query_error: Option<String>,
    connects: Vec<String>,
    executed: Vec<(Option<String>, String)>,
}

/// Connector recording what it is asked to do. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct RecordingConnector {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `n` connections that name a database.
    pub fn refuse_database_connects(self, n: usize) -> Self {
        self.lock().refuse_database_connects = n;
        self
    }

    /// Refuse every connection, server-level ones included.
    pub fn refuse_all(self) -> Self {
        self.lock().refuse_all = true;
        self
    }

    /// Make every `execute` fail with `message`.
    pub fn fail_queries(self, message: impl Into<String>) -> Self {
        self.lock().query_error = Some(message.into());
        self
    }

    /// DSNs of all connection attempts, refused ones included.
    pub fn connects(&self) -> Vec<String> {
        self.lock().connects.clone()
    }

    /// `(dbname, sql)` for every successful `execute`.
    pub fn executed(&self) -> Vec<(Option<String>, String)> {
        self.lock().executed.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn Session>, DbError> {
        let mut rec = self.lock();
        rec.connects.push(params.dsn());

        let refuse_db = params.dbname.is_some() && rec.refuse_database_connects > 0;
        if refuse_db {
            rec.refuse_database_connects -= 1;
        }
        if rec.refuse_all || refuse_db {
            return Err(DbError::Connect(sqlx::Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("connection to {} refused", params.host),
            ))));
        }

        Ok(Box::new(RecordingSession {
            dbname: params.dbname.clone(),
            inner: self.inner.clone(),
        }))
    }
}

struct RecordingSession {
    dbname: Option<String>,
    inner: Arc<Mutex<Recorded>>,
}

#[async_trait]
impl Session for RecordingSession {
    async fn execute(&mut self, sql: &str) -> Result<(), DbError> {
        let mut rec = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(message) = &rec.query_error {
            return Err(DbError::Query(sqlx::Error::Protocol(message.clone())));
        }
        rec.executed.push((self.dbname.clone(), sql.to_string()));
        Ok(())
    }
}
