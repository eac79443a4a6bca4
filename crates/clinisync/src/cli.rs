//! Clap derive structures for the `clinisync` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.
//! Also compiled by `build.rs` for man pages, so it depends on clap only.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// clinisync -- alert and notification console for clinic back ends
#[derive(Debug, Parser)]
#[command(
    name = "clinisync",
    version,
    about = "Watch and act on clinic alerts and notifications from the command line",
    long_about = "Keeps a local view of system alerts and notifications in sync with a\n\
        clinic back end over REST and a realtime WebSocket channel, and runs\n\
        lifecycle actions (acknowledge, resolve, suppress) against it.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Back-end profile to use
    #[arg(long, short = 'p', env = "CLINISYNC_PROFILE", global = true)]
    pub profile: Option<String>,

    /// REST base URL (overrides profile)
    #[arg(long, env = "CLINISYNC_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Realtime WebSocket base URL (overrides profile)
    #[arg(long, env = "CLINISYNC_WS_URL", global = true)]
    pub ws_url: Option<String>,

    /// Bearer token
    #[arg(long, env = "CLINISYNC_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "CLINISYNC_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "CLINISYNC_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "CLINISYNC_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Domain value enums ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SeverityArg {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Active,
    Acknowledged,
    Resolved,
    Suppressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CategoryArg {
    System,
    Security,
    Performance,
    Clinical,
    Billing,
    Inventory,
    Compliance,
    Telemedicine,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PriorityArg {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormatArg {
    Json,
    Csv,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List and act on system alerts
    #[command(alias = "a")]
    Alerts(AlertsArgs),

    /// List and manage notifications
    #[command(alias = "n")]
    Notifications(NotificationsArgs),

    /// Follow the alert list live
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Shared Filter Arguments ──────────────────────────────────────────

/// Alert filters shared by `alerts list`, `alerts export`, and `watch`.
#[derive(Debug, Clone, Default, Args)]
pub struct AlertFilterArgs {
    /// Only these categories (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub category: Vec<CategoryArg>,

    /// Only these severities (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub severity: Vec<SeverityArg>,

    /// Only these statuses (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub status: Vec<StatusArg>,

    /// Only alerts raised by these sources (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub source: Vec<String>,

    /// Raised at or after: RFC 3339 time or a duration ago ("2h", "1d")
    #[arg(long)]
    pub since: Option<String>,

    /// Raised at or before: RFC 3339 time or a duration ago
    #[arg(long)]
    pub until: Option<String>,

    /// Case-insensitive text search over title, message, and source
    #[arg(long)]
    pub search: Option<String>,
}

// ── Alerts ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AlertsArgs {
    #[command(subcommand)]
    pub command: AlertsCommand,
}

#[derive(Debug, Subcommand)]
pub enum AlertsCommand {
    /// List alerts matching the filters
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        filter: AlertFilterArgs,

        /// Show at most this many rows
        #[arg(long, short = 'l')]
        limit: Option<usize>,
    },

    /// Show one alert
    Get { id: String },

    /// Acknowledge an alert
    #[command(alias = "acknowledge")]
    Ack {
        id: String,
        /// Note recorded with the acknowledgement
        #[arg(long)]
        note: Option<String>,
    },

    /// Resolve an alert
    Resolve {
        id: String,
        /// Resolution summary
        #[arg(long)]
        resolution: Option<String>,
    },

    /// Suppress an alert, optionally for a limited time
    Suppress {
        id: String,
        /// How long to suppress ("30m", "2h"); omit for indefinitely
        #[arg(long)]
        duration: Option<String>,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Delete an alert
    #[command(alias = "rm")]
    Delete { id: String },

    /// Raise a new alert
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        message: String,
        #[arg(long)]
        severity: SeverityArg,
        #[arg(long)]
        category: CategoryArg,
        #[arg(long)]
        source: Option<String>,
    },

    /// Edit an alert's fields
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        message: Option<String>,
        #[arg(long)]
        severity: Option<SeverityArg>,
        #[arg(long)]
        category: Option<CategoryArg>,
    },

    /// Send a test alert through the delivery pipeline
    Test {
        #[arg(long, default_value = "info")]
        severity: SeverityArg,
        #[arg(long, default_value = "system")]
        category: CategoryArg,
        #[arg(long)]
        message: Option<String>,
    },

    /// Copy an alert into a new one
    Duplicate { id: String },

    /// Bulk-create alerts from a JSON array file
    Import { file: PathBuf },

    /// Export alerts matching the filters
    Export {
        #[command(flatten)]
        filter: AlertFilterArgs,

        #[arg(long, default_value = "json")]
        format: ExportFormatArg,

        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Aggregate counters by status, severity, and category
    Stats,
}

// ── Notifications ────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct NotificationsArgs {
    #[command(subcommand)]
    pub command: NotificationsCommand,
}

#[derive(Debug, Subcommand)]
pub enum NotificationsCommand {
    /// List notifications
    #[command(alias = "ls")]
    List {
        /// Only unread notifications
        #[arg(long)]
        unread: bool,

        #[arg(long, value_delimiter = ',')]
        priority: Vec<PriorityArg>,

        #[arg(long)]
        search: Option<String>,
    },

    /// Mark one notification as read
    Read { id: String },

    /// Mark every notification as read
    ReadAll,

    /// Delete a notification
    #[command(alias = "rm")]
    Delete { id: String },

    /// Print the unread count
    Count,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub filter: AlertFilterArgs,

    /// Poll over REST instead of using the realtime channel
    #[arg(long)]
    pub no_realtime: bool,

    /// Poll interval ("30s", "2m")
    #[arg(long)]
    pub interval: Option<String>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Interactive setup wizard
    Init,

    /// Show the effective configuration
    Show,

    /// Store a bearer token in the system keyring
    SetToken {
        /// Profile to store the token for (defaults to the active one)
        #[arg(long)]
        profile: Option<String>,
    },

    /// List profiles
    Profiles,

    /// Set the default profile
    Use { name: String },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
