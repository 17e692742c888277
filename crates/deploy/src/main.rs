//! `deploy-tool` -- provision a PostgreSQL database, load a dump into it
//! and render a config file.
//!
//! Every option is a `--<name>` flag; options whose flag is not given are
//! left unset. A `.env` file is loaded for `RUST_LOG`.
//!
//! | Flag                 | Used for                                        |
//! |----------------------|-------------------------------------------------|
//! | `--db_type`          | Backend tag, `pgsql`                            |
//! | `--db_name`          | Database to connect to (created when missing)   |
//! | `--db_host`          | Server host                                     |
//! | `--db_port`          | Server port                                     |
//! | `--db_user`          | Login role                                      |
//! | `--db_password`      | Login password                                  |
//! | `--mount_dir`        | Root of `deploy/db/dump.sql`                    |
//! | `--config_src_path`  | Directory holding the `src.conf` template       |
//! | `--config_dest_path` | Directory `dest.conf` is written to             |
//!
//! All three steps always run. The exit status is non-zero when any of
//! them failed.

use std::process::ExitCode;

use deploy_tool::{
    DeployTool, Params, DEFAULT_CONFIG_DEST, DEFAULT_CONFIG_SRC, DEFAULT_DUMP_PATH,
};
use deploy_tool_core::{options, CoreError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Template-only options registered on top of the defaults.
const CONFIG_OPTIONS: [&str; 2] = ["config_src_path", "config_dest_path"];

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // The deploy log owns stdout, diagnostics go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "deploy_tool=info,deploy_tool_core=info,deploy_tool_db=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut available = options::default_available();
    available.extend(CONFIG_OPTIONS.map(String::from));

    let mut tool = DeployTool::new(Params {
        options: None,
        options_available: Some(available),
    });

    // Resolve up front so `--help` and bad flags exit before any step runs.
    if let Err(e) = tool.resolve_options() {
        match e {
            CoreError::Cli(err) => err.exit(),
            other => {
                tracing::error!(error = %other, "Invalid options");
                return ExitCode::FAILURE;
            }
        }
    }

    tracing::info!("Starting deploy");

    let outcomes = [
        tool.init_db().await,
        tool.query_from_file(DEFAULT_DUMP_PATH).await,
        tool.build_config(DEFAULT_CONFIG_SRC, DEFAULT_CONFIG_DEST).await,
    ];

    tracing::info!(?outcomes, log_entries = tool.log().count(), "Deploy finished");

    if outcomes.iter().any(|o| o.is_failed()) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
