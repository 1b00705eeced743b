//! fnlink — appliance control client CLI.
//!
//! Resolves a NAS appliance through the vendor directory, authenticates
//! over its control protocol, and lists the hosted applications with their
//! LAN or externally routable URLs.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use tracing::error;

/// fnlink — appliance control client
#[derive(Parser)]
#[command(
    name = "fnlink",
    version = "0.1.0",
    about = "Appliance discovery and hosted-application directory lookup"
)]
struct Cli {
    /// Appliance identifier registered with the vendor directory
    #[arg(long = "fn-id", global = true)]
    fn_id: Option<String>,

    /// Login username
    #[arg(short, long, global = true)]
    username: Option<String>,

    /// Login password
    #[arg(short, long, global = true)]
    password: Option<String>,

    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Look up an appliance's addresses in the vendor directory
    Resolve {
        /// Appliance identifier (falls back to the configured one)
        fn_id: Option<String>,
    },

    /// List hosted applications with their URLs
    Services {
        /// Show LAN URLs instead of externally routable ones
        #[arg(long)]
        local: bool,
    },

    /// Resolve the external entry for the application on a port
    Entry {
        /// Local port the application is bound to
        #[arg(long)]
        port: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing.
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("fnlink=debug,fnlink_cli=debug,fnlink_client=debug,fnlink_core=debug")
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("fnlink=warn,fnlink_cli=warn")
            .with_target(false)
            .init();
    }

    // Load config file.
    let config_path = cli.config.clone().unwrap_or_else(|| {
        let home = dirs::home_dir().unwrap_or_default();
        home.join(".fnlink")
            .join("config.toml")
            .to_string_lossy()
            .to_string()
    });
    let cfg = match config::Config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("fnlink: {e:#}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Resolve { fn_id } => {
            // Positional id wins over the global flag, which wins over config.
            let fn_id = fn_id
                .or(cli.fn_id)
                .or_else(|| (!cfg.auth.fn_id.is_empty()).then(|| cfg.auth.fn_id.clone()));
            match fn_id {
                Some(fn_id) => commands::resolve::run(&fn_id).await,
                None => Err(anyhow::anyhow!(
                    "no appliance id — pass one or set auth.fn_id in the config"
                )),
            }
        }
        Command::Services { local } => {
            match config::Credentials::resolve(
                &cfg,
                cli.fn_id.as_deref(),
                cli.username.as_deref(),
                cli.password.as_deref(),
            ) {
                Ok(creds) => commands::services::run(&creds, local).await,
                Err(e) => Err(e),
            }
        }
        Command::Entry { port } => {
            match config::Credentials::resolve(
                &cfg,
                cli.fn_id.as_deref(),
                cli.username.as_deref(),
                cli.password.as_deref(),
            ) {
                Ok(creds) => commands::entry::run(&creds, port).await,
                Err(e) => Err(e),
            }
        }
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("fnlink: {e:#}");
        std::process::exit(1);
    }
}
