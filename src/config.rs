//! Command line and environment configuration of the `bonus-ledger` binary.

use jiff::Timestamp;
use jiff::tz::TimeZone;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

use crate::engine::DEFAULT_HISTORY_LIMIT;

/// IANA zone used to read civil periods and to print dates.
pub const TZ_VAR: &str = "BONUS_LEDGER_TZ";
/// Unix seconds replacing the wall clock for the final expiry sweep.
pub const NOW_VAR: &str = "BONUS_LEDGER_NOW";

pub const USAGE: &str =
    "usage: bonus-ledger <balance|history> <journal.json> [--limit N] [--user-id ID] [--csv]";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing command or journal path")]
    Usage,

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),

    #[error("{option} expects a value")]
    MissingValue { option: &'static str },

    #[error("invalid limit '{0}'")]
    InvalidLimit(String),

    #[error("--csv only applies to history")]
    CsvNeedsHistory,

    #[error("BONUS_LEDGER_NOW must be unix seconds, got '{0}'")]
    InvalidNow(String),

    #[error("BONUS_LEDGER_TZ: unknown time zone '{name}': {source}")]
    UnknownTimeZone { name: String, source: jiff::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Balance,
    History,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub command: Command,
    pub journal: PathBuf,
    pub limit: usize,
    pub user_id: Option<String>,
    pub format: OutputFormat,
    pub timezone: TimeZone,
    /// `None` means the wall clock.
    pub now: Option<Timestamp>,
}

impl Config {
    /// Build the configuration from the process arguments and environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::parse(env::args().skip(1), |key| env::var(key).ok())
    }

    /// Build the configuration from explicit arguments (without the program
    /// name) and a variable lookup.
    pub fn parse(
        args: impl IntoIterator<Item = String>,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut args = args.into_iter();

        let command = match args.next().as_deref() {
            Some("balance") => Command::Balance,
            Some("history") => Command::History,
            Some(other) => return Err(ConfigError::UnknownCommand(other.to_string())),
            None => return Err(ConfigError::Usage),
        };

        let mut journal = None;
        let mut limit = DEFAULT_HISTORY_LIMIT;
        let mut user_id = None;
        let mut format = OutputFormat::Json;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--limit" => {
                    let value = args.next().ok_or(ConfigError::MissingValue {
                        option: "--limit",
                    })?;
                    limit = value
                        .trim()
                        .parse()
                        .map_err(|_| ConfigError::InvalidLimit(value.clone()))?;
                }
                "--user-id" => {
                    let value = args.next().ok_or(ConfigError::MissingValue {
                        option: "--user-id",
                    })?;
                    user_id = Some(value);
                }
                "--csv" => format = OutputFormat::Csv,
                path if journal.is_none() && !path.starts_with("--") => {
                    journal = Some(PathBuf::from(path));
                }
                other => return Err(ConfigError::UnexpectedArgument(other.to_string())),
            }
        }

        let journal = journal.ok_or(ConfigError::Usage)?;
        if format == OutputFormat::Csv && command != Command::History {
            return Err(ConfigError::CsvNeedsHistory);
        }

        let timezone = match var(TZ_VAR) {
            Some(name) => TimeZone::get(&name)
                .map_err(|source| ConfigError::UnknownTimeZone { name, source })?,
            None => TimeZone::UTC,
        };

        let now = var(NOW_VAR)
            .map(|value| {
                value
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(|seconds| Timestamp::from_second(seconds).ok())
                    .ok_or(ConfigError::InvalidNow(value))
            })
            .transpose()?;

        Ok(Self {
            command,
            journal,
            limit,
            user_id,
            format,
            timezone,
            now,
        })
    }

    /// The instant the final expiry sweep runs against.
    pub fn now(&self) -> Timestamp {
        self.now.unwrap_or_else(Timestamp::now)
    }
}
