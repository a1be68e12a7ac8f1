//! Command-line interface for `aistackctl`.
use clap::{Parser, Subcommand};
use std::str::FromStr;
use tracing::level_filters::LevelFilter;

/// Wrapper around `LevelFilter` so clap can parse log levels from either
/// string names ("info", "debug", etc.) or numeric shorthands (0-5).
#[derive(Clone, Copy, Debug)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for `RUST_LOG`.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("log level cannot be empty".into());
        }

        if let Ok(number) = trimmed.parse::<u8>() {
            let level = match number {
                0 => LevelFilter::OFF,
                1 => LevelFilter::ERROR,
                2 => LevelFilter::WARN,
                3 => LevelFilter::INFO,
                4 => LevelFilter::DEBUG,
                5 => LevelFilter::TRACE,
                _ => {
                    return Err(format!(
                        "unsupported log level number '{number}' (expected 0-5)"
                    ));
                }
            };

            return Ok(LogLevelArg(level));
        }

        let lowercase = trimmed.to_ascii_lowercase();
        let level = match lowercase.as_str() {
            "off" => Some(LevelFilter::OFF),
            "error" | "err" => Some(LevelFilter::ERROR),
            "warn" | "warning" => Some(LevelFilter::WARN),
            "info" | "information" => Some(LevelFilter::INFO),
            "debug" => Some(LevelFilter::DEBUG),
            "trace" => Some(LevelFilter::TRACE),
            _ => None,
        }
        .ok_or_else(|| format!("invalid log level '{trimmed}'"))?;

        Ok(LogLevelArg(level))
    }
}

/// Command-line interface for `aistackctl`.
#[derive(Parser)]
#[command(name = "aistackctl", version, author)]
#[command(about = "Host-side control plane for a GPU-accelerated inference fleet", long_about = None)]
pub struct Cli {
    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for `aistackctl`.
#[derive(Subcommand)]
pub enum Commands {
    /// Installs a named profile: `standard-gpu` (every service) or `minimal`
    /// (LLM runtime only).
    InstallProfile {
        /// Profile name; defaults to `standard-gpu`.
        #[arg(default_value = crate::constants::install_profiles::STANDARD_GPU)]
        profile: String,
    },

    /// Starts one service, or every registered service if none is named.
    Start {
        /// Service name; starts the whole fleet if omitted.
        service: Option<String>,
    },

    /// Stops one service, or every registered service if none is named.
    Stop {
        /// Service name; stops the whole fleet if omitted.
        service: Option<String>,
    },

    /// Prints the current status of one service, or every service if none is named.
    Status {
        /// Service name; reports on the whole fleet if omitted.
        service: Option<String>,
        /// Emit machine-readable JSON output instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Updates one service, or the whole fleet (in fixed order) if `all` is given.
    Update {
        /// Service name to update.
        #[arg(group = "target")]
        service: Option<String>,
        /// Update every registered service instead of a single one.
        #[arg(long, group = "target")]
        all: bool,
    },

    /// Reverts one service to the image recorded in its last update plan.
    Rollback {
        /// Service to roll back.
        service: String,
    },

    /// Restarts one service, or every registered service if none is named.
    Repair {
        /// Service name; repairs the whole fleet if omitted.
        service: Option<String>,
    },

    /// Stops and removes one service's container without deleting its configuration.
    Remove {
        /// Name of the service to remove.
        service: String,
        /// Keep the service's volumes instead of dropping them.
        #[arg(long)]
        keep_data: bool,
    },

    /// Tears down every service and wipes GPU-lock/suspend state.
    Purge {
        /// Also delete the config directory, not just runtime state.
        #[arg(long)]
        remove_configs: bool,
    },

    /// Collects a redacted diagnostic manifest into the given directory.
    DiagPack {
        /// Directory to collect diagnostics from.
        #[arg(long, default_value = "/var/lib/aistack")]
        source: String,
        /// Directory the redacted manifest is written to.
        #[arg(long)]
        dest: String,
    },

    /// Enables the idle-triggered auto-suspend controller.
    SuspendEnable,

    /// Disables the idle-triggered auto-suspend controller.
    SuspendDisable,

    /// Sends a Wake-on-LAN magic packet to the given MAC address.
    WolSend {
        /// Target MAC address, e.g. `aa:bb:cc:dd:ee:ff`.
        mac: String,
    },
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
