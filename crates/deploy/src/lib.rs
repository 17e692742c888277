//! `deploy-tool` library crate.
//!
//! [`DeployTool`] drives a deployment: make sure the database exists, load
//! a SQL dump into it, render config files from `{{key}}` templates.
//! Every step reports failures to the deploy log and keeps going; nothing
//! is returned to the caller as an error. The binary entrypoint lives in
//! `main.rs`.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::sync::Arc;

use deploy_tool_core::{macros, options, CoreError, Logger, Options};
use deploy_tool_db::{Connector, DbBackend, DbError, PgConnector, QueryOutcome};

/// Dump loaded by the `deploy-tool` binary.
pub const DEFAULT_DUMP_PATH: &str = "{{mount_dir}}/deploy/db/dump.sql";

/// Config template and target used by the `deploy-tool` binary.
pub const DEFAULT_CONFIG_SRC: &str = "{{config_src_path}}/src.conf";
pub const DEFAULT_CONFIG_DEST: &str = "{{config_dest_path}}/dest.conf";

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("{path}: {source}")]
    File {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// How a step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// Nothing to do (no dump file, or no database to run it on).
    Skipped,
    /// The step failed; the reason is in the log.
    Failed,
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Where options come from.
///
/// A supplied `options` map is used as is. Without one, a `--<name>` flag
/// is registered for every name in `options_available` (or
/// [`options::DEFAULT_CLI_OPTIONS`]) and the command line is parsed on
/// first use.
#[derive(Debug, Clone, Default)]
pub struct Params {
    pub options: Option<Options>,
    pub options_available: Option<BTreeSet<String>>,
}

impl Params {
    pub fn with_options(options: Options) -> Self {
        Self {
            options: Some(options),
            options_available: None,
        }
    }

    pub fn with_available<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            options: None,
            options_available: Some(names.into_iter().map(Into::into).collect()),
        }
    }
}

pub struct DeployTool {
    options: Option<Options>,
    options_available: BTreeSet<String>,
    args: Option<Vec<OsString>>,
    connector: Arc<dyn Connector>,
    db: Option<Box<dyn DbBackend>>,
    log: Logger,
}

impl DeployTool {
    pub fn new(params: Params) -> Self {
        Self {
            options: params.options,
            options_available: params
                .options_available
                .unwrap_or_else(options::default_available),
            args: None,
            connector: Arc::new(PgConnector),
            db: None,
            log: Logger::new(),
        }
    }

    /// Use `connector` instead of connecting through `sqlx`.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_logger(mut self, log: Logger) -> Self {
        self.log = log;
        self
    }

    /// Parse these arguments (program name first) instead of the process
    /// arguments when options come from the command line.
    pub fn with_args<I, T>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn log(&self) -> &Logger {
        &self.log
    }

    pub fn options_available(&self) -> &BTreeSet<String> {
        &self.options_available
    }

    pub fn is_db_ready(&self) -> bool {
        self.db.is_some()
    }

    /// Resolved options, parsing the command line on first call when no
    /// map was supplied. The result is cached.
    pub fn resolve_options(&mut self) -> Result<&Options, CoreError> {
        let options = match self.options.take() {
            Some(options) => options,
            None => {
                let args = self
                    .args
                    .clone()
                    .unwrap_or_else(|| std::env::args_os().collect());
                let options = Options::from_args(&self.options_available, args)?;
                tracing::debug!(count = options.len(), "Options resolved from command line");
                options
            }
        };
        Ok(&*self.options.insert(options))
    }

    /// Create the backend named by `db_type` and connect it, creating the
    /// database when missing.
    pub async fn init_db(&mut self) -> Outcome {
        match self.try_init_db().await {
            Ok(db) => {
                self.db = Some(db);
                Outcome::Completed
            }
            Err(e) => {
                tracing::error!(error = %e, "Database initialisation failed");
                self.log.add(format!("Can't initialise DB: {e}"));
                Outcome::Failed
            }
        }
    }

    /// Run a SQL dump. An empty `path` selects the backend's default.
    pub async fn query_from_file(&mut self, path: &str) -> Outcome {
        let Some(db) = self.db.as_mut() else {
            self.log.add("DB isn't initialised, use init_db() before");
            return Outcome::Skipped;
        };

        match db.query_from_file(path, &mut self.log).await {
            Ok(QueryOutcome::Executed { .. }) => Outcome::Completed,
            Ok(QueryOutcome::Skipped { .. }) => Outcome::Skipped,
            Err(e) => {
                tracing::error!(error = %e, "Query failed");
                self.log.add(format!("Can't execute query: {e}"));
                Outcome::Failed
            }
        }
    }

    /// Render the template at `src` into `dest`. Both paths and the file
    /// contents go through macro substitution.
    pub async fn build_config(&mut self, src: &str, dest: &str) -> Outcome {
        let options = match self.resolve_options() {
            Ok(options) => options.clone(),
            Err(e) => {
                self.log.add(format!("Can't build config {dest}: {e}"));
                return Outcome::Failed;
            }
        };

        let src = macros::replace(src, &options);
        let dest = macros::replace(dest, &options);

        self.log.add(format!("Build file: {dest}"));

        match make_config_file(&src, &dest, &options).await {
            Ok(()) => Outcome::Completed,
            Err(e) => {
                tracing::error!(src = %src, dest = %dest, error = %e, "Config build failed");
                self.log.add(format!("Can't build config {dest}: {e}"));
                Outcome::Failed
            }
        }
    }

    async fn try_init_db(&mut self) -> Result<Box<dyn DbBackend>, DeployError> {
        let options = self.resolve_options()?.clone();
        let mut db = deploy_tool_db::create_backend(&options, self.connector.clone())?;
        db.init_db(&mut self.log).await?;
        Ok(db)
    }
}

async fn make_config_file(src: &str, dest: &str, options: &Options) -> Result<(), DeployError> {
    let content = tokio::fs::read_to_string(src)
        .await
        .map_err(file_error(src))?;
    let content = macros::replace(&content, options);

    let unresolved = macros::placeholders(&content);
    if !unresolved.is_empty() {
        tracing::warn!(dest = %dest, ?unresolved, "Config keeps unresolved placeholders");
    }

    if let Some(parent) = Path::new(dest).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(file_error(parent.to_string_lossy()))?;
        }
    }

    tokio::fs::write(dest, content)
        .await
        .map_err(file_error(dest))?;

    tracing::info!(dest = %dest, "Config written");
    Ok(())
}

fn file_error(path: impl Into<String>) -> impl FnOnce(io::Error) -> DeployError {
    let path = path.into();
    move |source| DeployError::File { path, source }
}
