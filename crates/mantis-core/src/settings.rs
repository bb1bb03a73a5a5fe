use clap::{Parser, Subcommand};
use std::path::PathBuf;

// ── Settings (CLI + env) ───────────────────────────────────────────────────────

/// Ingest MANTIS shot exports and heart-rate exports into training sessions
#[derive(Parser, Debug, Clone)]
#[command(
    name = "mantis-ingest",
    about = "Ingest MANTIS shot exports and heart-rate exports into training sessions",
    version
)]
pub struct Settings {
    /// Address the HTTP server listens on
    #[arg(long, env = "MANTIS_BIND", default_value = "0.0.0.0:3001")]
    pub bind: String,

    /// SQLite database file (defaults to ~/.mantis-ingest/mantis.db)
    #[arg(long, env = "MANTIS_DATABASE")]
    pub database: Option<PathBuf>,

    /// Directory for cleaned-upload scratch files (defaults to ~/.mantis-ingest/scratch)
    #[arg(long, env = "MANTIS_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// User id recorded on every session
    #[arg(long, env = "MANTIS_USER_ID", default_value = "1")]
    pub user_id: i64,

    /// Placeholder session length in minutes for uploads without device ids (1-240)
    #[arg(long, default_value = "5", value_parser = clap::value_parser!(u32).range(1..=240))]
    pub session_length_mins: u32,

    /// Maximum number of pooled database connections (1-64)
    #[arg(long, default_value = "8", value_parser = clap::value_parser!(u32).range(1..=64))]
    pub pool_size: u32,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// What the binary should do once configured.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP upload server (default)
    Serve,
    /// Ingest a MANTIS export from disk, replacing all stored sessions
    Import {
        /// Raw MANTIS CSV export (banner included)
        #[arg(long)]
        mantis: PathBuf,
        /// Heart-rate CSV to link to the new session
        #[arg(long)]
        heart: Option<PathBuf>,
        /// Use the device-assigned session ID and derive the session length
        #[arg(long)]
        device_ids: bool,
    },
    /// Append a heart-rate export to an existing session
    ImportHeart {
        /// Heart-rate CSV (per-sample or pre-aggregated)
        #[arg(long)]
        file: PathBuf,
        /// Link to this session instead of the most recent one
        #[arg(long)]
        session_id: Option<i64>,
    },
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse the process arguments and resolve derived values.
    pub fn load() -> Self {
        Self::load_from(std::env::args_os())
    }

    /// Same as [`Settings::load`] but with an explicit argument list.
    pub fn load_from<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut settings = Settings::parse_from(args);
        // --debug overrides log level.
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    /// `~/.mantis-ingest`, or `./.mantis-ingest` when no home dir is known.
    pub fn app_dir() -> PathBuf {
        Self::app_dir_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Application directory rooted at `base_dir` (used for testing).
    pub fn app_dir_in(base_dir: &std::path::Path) -> PathBuf {
        base_dir.join(".mantis-ingest")
    }

    /// Effective database path.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| Self::app_dir().join("mantis.db"))
    }

    /// Effective scratch directory.
    pub fn scratch_path(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| Self::app_dir().join("scratch"))
    }

    pub fn session_length_secs(&self) -> i64 {
        i64::from(self.session_length_mins) * 60
    }

    /// The requested subcommand, defaulting to [`Command::Serve`].
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
