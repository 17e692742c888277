//! Flat string options and their command-line resolution.
//!
//! Options come either from a map supplied by the caller or, when none is
//! given, from one `--<name>` flag per recognized option name.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;

use clap::{Arg, ArgAction, Command};

use crate::error::CoreError;

/// Option names registered as CLI flags when the caller names none.
pub const DEFAULT_CLI_OPTIONS: [&str; 7] = [
    "db_type",
    "db_name",
    "db_host",
    "db_port",
    "db_user",
    "db_password",
    "mount_dir",
];

/// Options that must be present and non-blank before connecting.
pub const REQUIRED_CONNECTION_OPTIONS: [&str; 5] =
    ["db_name", "db_host", "db_port", "db_user", "db_password"];

/// Read-only string-to-string option map.
///
/// Backed by a `BTreeMap`, so iteration is in ascending key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options(BTreeMap<String, String>);

impl Options {
    pub fn new(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Value of `key`, or [`CoreError::Undefined`] when absent or blank.
    pub fn require(&self, key: &str) -> Result<&str, CoreError> {
        match self.get(key) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(CoreError::Undefined(key.to_string())),
        }
    }

    /// Check the connection options in order, failing on the first one
    /// that is missing or blank.
    pub fn check_required(&self) -> Result<(), CoreError> {
        for key in REQUIRED_CONNECTION_OPTIONS {
            self.require(key)?;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse `args` (program name first) against one `--<name>` flag per
    /// entry in `available`.
    ///
    /// Each flag takes a string value. Flags that are not given are left
    /// out of the result, and no other source (environment included) fills
    /// them in.
    pub fn from_args<I, T>(available: &BTreeSet<String>, args: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = cli_command(available).try_get_matches_from(args)?;

        let map = available
            .iter()
            .filter_map(|name| {
                matches
                    .get_one::<String>(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect();

        Ok(Self(map))
    }
}

impl<K, V> FromIterator<(K, V)> for Options
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, String>> for Options {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

/// The default options-available set.
pub fn default_available() -> BTreeSet<String> {
    DEFAULT_CLI_OPTIONS.iter().map(|s| s.to_string()).collect()
}

fn cli_command(available: &BTreeSet<String>) -> Command {
    available.iter().fold(
        Command::new("deploy-tool").about("Provision a database, load a dump, render config files"),
        |cmd, name| {
            cmd.arg(
                Arg::new(name.clone())
                    .long(name.clone())
                    .value_name(name.to_uppercase())
                    .action(ArgAction::Set),
            )
        },
    )
}
