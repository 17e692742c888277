use deploy_tool_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error(transparent)]
    Config(#[from] CoreError),

    /// Establishing a connection failed. The only error `init_db` recovers
    /// from (by creating the database).
    #[error("connection failed: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not connected to a database, call init_db first")]
    NotConnected,
}
