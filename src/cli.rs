use clap::{Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;

/// Output format for commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

impl OutputFormat {
    /// Resolve the effective output format.
    /// If user specified a format, use it.
    /// Otherwise: TTY → Text, non-TTY (pipe) → Json
    pub fn resolve(user_choice: Option<OutputFormat>) -> OutputFormat {
        match user_choice {
            Some(fmt) => fmt,
            None => {
                if std::io::stdout().is_terminal() {
                    OutputFormat::Text
                } else {
                    OutputFormat::Json
                }
            }
        }
    }
}

#[derive(Parser)]
#[command(
    name = "pelagos",
    about = "Download watcher that routes new files to confirmed actions",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/pelagos/logs/pelagos.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to pelagos.yaml config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch the download directory and process new files
    Run {
        /// Override the configured watch directory
        #[arg(long)]
        watch_dir: Option<PathBuf>,
    },

    /// Validate the configuration and show the loaded rules
    Check {
        /// Output format (default: text for TTY, json for pipes)
        #[arg(long, short = 'o', value_enum)]
        format: Option<OutputFormat>,
    },

    /// Show what would happen to a file, without acting on it
    Resolve {
        /// File to resolve
        path: PathBuf,

        /// Origin URL to assume instead of reading file metadata
        #[arg(long)]
        url: Option<String>,

        /// Output format (default: text for TTY, json for pipes)
        #[arg(long, short = 'o', value_enum)]
        format: Option<OutputFormat>,
    },

    /// Inspect and try out hooks
    Hook {
        #[command(subcommand)]
        action: HookAction,
    },

    /// Send a decision to the running daemon
    Notify {
        /// What to report
        #[arg(value_enum)]
        command: NotifyCommand,

        /// Confirmation hash
        hash: String,

        /// Candidate to execute (with `action`)
        #[arg(long)]
        name: Option<String>,

        /// Daemon port (defaults to the configured port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Presenters driven by the daemon
    Present {
        #[command(subcommand)]
        action: PresentAction,
    },

    /// Diagnose setup issues
    Doctor,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NotifyCommand {
    Shown,
    Execute,
    Skip,
    Action,
}

#[derive(Subcommand)]
pub enum HookAction {
    /// List registered hooks
    List {
        /// Output format (default: text for TTY, json for pipes)
        #[arg(long, short = 'o', value_enum)]
        format: Option<OutputFormat>,
    },

    /// Run a hook against a file
    Test {
        /// Hook name
        name: String,

        /// File to test
        path: PathBuf,

        /// Hook context as a JSON object
        #[arg(long)]
        context: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum PresentAction {
    /// Blocking dialog; prints EXECUTE, SKIP or TIMEOUT
    Dialog {
        title: String,
        subtitle: String,
        message: String,
        execute_label: String,
        skip_label: String,
        timeout_secs: u64,
    },

    /// Candidate chooser; prints the chosen label or SKIP
    Select {
        title: String,
        message: String,
        /// Candidate labels
        #[arg(required = true)]
        candidates: Vec<String>,
    },

    /// Notification banner answering over the local protocol
    Banner {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        subtitle: String,
        #[arg(long)]
        message: String,
        #[arg(long)]
        hash: String,
        #[arg(long)]
        port: u16,
        /// Preview image path
        #[arg(long, default_value = "")]
        image: String,
        /// Candidate label, repeated once per candidate
        #[arg(long = "action")]
        actions: Vec<String>,
        #[arg(long, default_value_t = 120)]
        timeout: u64,
    },
}
