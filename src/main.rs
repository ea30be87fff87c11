//! WolfDrive - Storage Gateway
//!
//! Serves a cloud storage account over a small HTTP API: login, folder
//! listing, folder creation, upload and download.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfdrive::api::{AppState, HttpServer};
use wolfdrive::auth::{MemorySessionStore, TokenBroker};
use wolfdrive::backend::{self, SessionFactory};
use wolfdrive::config::WolfDriveConfig;
use wolfdrive::error::Result;

/// WolfDrive - Storage Gateway
#[derive(Parser)]
#[command(name = "wolfdrive")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wolfdrive.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway
    Start,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolfdrive.toml")]
        output: PathBuf,

        /// Storage backend (local, memory)
        #[arg(long, default_value = "local")]
        backend: String,
    },

    /// Validate configuration file
    Validate,

    /// Show gateway information
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => run_start(cli.config, cli.log_level).await,
        Commands::Init { output, backend } => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), "pretty");
            run_init(output, &backend)
        }
        Commands::Validate => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), "pretty");
            run_validate(cli.config)
        }
        Commands::Info => run_info(cli.config),
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Start the gateway
async fn run_start(config_path: PathBuf, log_level: Option<String>) -> Result<()> {
    // Load configuration
    let config = match WolfDriveConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            init_logging(log_level.as_deref().unwrap_or("info"), "pretty");
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            tracing::error!("Please check that the config file exists and is valid TOML");
            return Err(e);
        }
    };
    init_logging(
        log_level.as_deref().unwrap_or(&config.logging.level),
        &config.logging.format,
    );
    tracing::info!("Starting WolfDrive v{}...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = std::fs::create_dir_all(&config.staging.dir) {
        tracing::error!("Failed to create staging directory {:?}: {}", config.staging.dir, e);
        return Err(e.into());
    }

    let storage = match backend::from_config(&config.backend) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!("Failed to initialize {} backend: {}", config.backend.kind, e);
            return Err(e);
        }
    };
    tracing::info!(
        "Storage backend: {} ({} accounts)",
        storage.name(),
        config.backend.accounts.len()
    );

    let sessions = Arc::new(SessionFactory::new(storage, config.connect_timeout()));
    let broker = Arc::new(TokenBroker::new(
        Arc::new(MemorySessionStore::new()),
        Arc::clone(&sessions),
        config.token_ttl(),
    ));
    match config.token_ttl() {
        Some(ttl) => tracing::info!("Session tokens expire after {:?}", ttl),
        None => tracing::info!("Session tokens never expire"),
    }
    let sweeper = broker.spawn_sweeper(config.sweep_interval());

    let server = HttpServer::new(
        config.server.clone(),
        AppState::new(&config, Arc::clone(&broker), sessions),
    );

    let result = server
        .start(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Received shutdown signal");
        })
        .await;

    sweeper.abort();
    if let Err(e) = &result {
        tracing::error!("HTTP server error: {}", e);
    }
    tracing::info!("WolfDrive stopped");
    result
}

/// Initialize configuration file
fn run_init(output: PathBuf, backend: &str) -> Result<()> {
    if !matches!(backend, "local" | "memory") {
        return Err(wolfdrive::Error::Config(format!(
            "unknown backend \"{}\" (expected local or memory)",
            backend
        )));
    }

    let config_content = format!(
        r#"# WolfDrive Configuration
# Generated configuration file

[server]
bind_address = "0.0.0.0:3000"
cors_enabled = false
# static_dir = "/usr/share/wolfdrive/public"

[auth]
token_ttl_secs = 86400
sweep_interval_secs = 300

[backend]
kind = "{backend}"
root = "/var/lib/wolfdrive/accounts"
connect_timeout_secs = 30
transfer_timeout_secs = 3600
transfer_idle_timeout_secs = 300

[[backend.accounts]]
email = "user@example.com"
password = "changeme"

[staging]
dir = "/var/lib/wolfdrive/staging"
max_upload_bytes = 107374182400

[logging]
level = "info"
format = "pretty"
"#
    );

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to configure your accounts and storage root.");
    println!("Then start with: wolfdrive --config {} start", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match WolfDriveConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Bind Address: {}", config.server.bind_address);
            println!("  Backend: {}", config.backend.kind);
            println!("  Accounts: {}", config.backend.accounts.len());
            println!("  Staging: {}", config.staging.dir.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

fn describe_secs(secs: u64) -> String {
    if secs == 0 {
        "unlimited".to_string()
    } else {
        format!("{} s", secs)
    }
}

/// Show gateway information
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = WolfDriveConfig::from_file(&config_path)?;

    println!("WolfDrive Gateway Information");
    println!("=============================");
    println!();
    println!("Version:          {}", env!("CARGO_PKG_VERSION"));
    println!("Bind Address:     {}", config.server.bind_address);
    println!("CORS:             {}", config.server.cors_enabled);
    match &config.server.static_dir {
        Some(dir) => println!("Static Files:     {}", dir.display()),
        None => println!("Static Files:     (none)"),
    }
    println!();
    println!("Sessions:");
    println!("  Token TTL:      {}", describe_secs(config.auth.token_ttl_secs));
    println!("  Sweep:          {} s", config.auth.sweep_interval_secs);
    println!();
    println!("Backend:");
    println!("  Kind:           {}", config.backend.kind);
    println!("  Root:           {}", config.backend.root.display());
    println!("  Accounts:       {}", config.backend.accounts.len());
    for account in &config.backend.accounts {
        println!("    - {}", account.email);
    }
    println!("  Connect:        {}", describe_secs(config.backend.connect_timeout_secs));
    println!("  Upload:         {}", describe_secs(config.backend.transfer_timeout_secs));
    println!("  Download Idle:  {}", describe_secs(config.backend.transfer_idle_timeout_secs));
    println!();
    println!("Staging:");
    println!("  Directory:      {}", config.staging.dir.display());
    println!("  Max Upload:     {} bytes", config.staging.max_upload_bytes);

    Ok(())
}
