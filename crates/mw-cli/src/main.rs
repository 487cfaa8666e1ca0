//! MaxWin CLI
//!
//! CLI tool for inspecting and editing a MaxWin store file: the URL exclusion
//! list and the extension settings.

mod commands;

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use commands::PatternFields;

#[derive(Parser)]
#[command(name = "mw-cli")]
#[command(about = "MaxWin exclusion list and settings tool")]
struct Cli {
    /// Store file
    #[arg(long, env = "MAXWIN_STORE", default_value = "maxwin-store.json", global = true)]
    store: PathBuf,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List exclusion patterns with their indices
    List,

    /// Add an exclusion pattern
    Add {
        /// Domain name
        #[arg(short, long)]
        domain: String,

        /// Scheme, `*` for any
        #[arg(long)]
        scheme: Option<String>,

        /// Port, `*` for any, empty for the default port
        #[arg(long)]
        port: Option<String>,

        /// Path, `*` for any
        #[arg(long)]
        path: Option<String>,
    },

    /// Add a pattern matching exactly one URL
    AddUrl {
        url: String,
    },

    /// Remove the pattern at an index (negative counts from the end)
    Remove {
        #[arg(allow_negative_numbers = true)]
        index: isize,
    },

    /// Check whether URLs are excluded
    Check {
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Convert a legacy exclusion list to the current format
    Migrate,

    /// Show or change settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Print all settings
    Show,

    /// Set a checkbox setting
    Set {
        key: String,

        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },

    /// Write the default value of every setting
    Reset,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))
        .and_then(|runtime| runtime.block_on(run(cli.store, cli.command)));

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(store: PathBuf, command: Commands) -> Result<(), String> {
    log::debug!("using store '{}'", store.display());
    let out = &mut io::stdout().lock();
    match command {
        Commands::List => commands::cmd_list(&store, out).await,
        Commands::Add {
            domain,
            scheme,
            port,
            path,
        } => {
            let fields = PatternFields { scheme, port, path };
            commands::cmd_add(&store, &domain, fields, out).await
        }
        Commands::AddUrl { url } => commands::cmd_add_url(&store, &url, out).await,
        Commands::Remove { index } => commands::cmd_remove(&store, index, out).await,
        Commands::Check { urls } => commands::cmd_check(&store, &urls, out).await,
        Commands::Migrate => commands::cmd_migrate(&store, out).await,
        Commands::Settings { command } => match command {
            SettingsCommands::Show => commands::cmd_settings_show(&store, out).await,
            SettingsCommands::Set { key, value } => commands::cmd_settings_set(&store, &key, value, out).await,
            SettingsCommands::Reset => commands::cmd_settings_reset(&store, out).await,
        },
    }
}
