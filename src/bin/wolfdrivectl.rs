//! WolfDriveCtl - Command line client for a running WolfDrive gateway
//!
//! Usage:
//!   wolfdrivectl health                      - Show gateway health
//!   wolfdrivectl login <email> <password>    - Log in and print a token
//!   wolfdrivectl --token T ls [--folder ID]  - List a folder
//!   wolfdrivectl --token T upload <path>     - Upload a file

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

/// WolfDrive Gateway Client
#[derive(Parser)]
#[command(name = "wolfdrivectl")]
#[command(about = "Talk to a running WolfDrive gateway", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "/etc/wolfdrive/config.toml")]
    config: PathBuf,

    /// Gateway endpoint (overrides config)
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Session token from `login`
    #[arg(short, long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show gateway health
    Health,
    /// Log in and print a session token
    Login { email: String, password: String },
    /// Revoke the session token
    Logout,
    /// List a folder (root by default)
    Ls {
        #[arg(short, long)]
        folder: Option<String>,
    },
    /// Create a folder
    Mkdir {
        name: String,
        /// Parent folder id (root by default)
        #[arg(short, long)]
        parent: Option<String>,
    },
    /// Upload a file
    Upload {
        path: PathBuf,
        /// Destination folder id (root by default)
        #[arg(short, long)]
        folder: Option<String>,
    },
    /// Download a file by id
    Download {
        id: String,
        /// Output path (defaults to the file's name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// ============ API Response Types ============

#[derive(Debug, Deserialize)]
struct HealthResponse {
    healthy: bool,
    #[serde(default)]
    version: String,
    #[serde(default)]
    backend: String,
    #[serde(default)]
    active_sessions: usize,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    email: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileEntry {
    name: String,
    id: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    created: i64,
}

#[derive(Debug, Deserialize)]
struct FolderEntry {
    name: String,
    id: String,
    #[serde(default)]
    created: i64,
}

#[derive(Debug, Deserialize)]
struct Listing {
    files: Vec<FileEntry>,
    folders: Vec<FolderEntry>,
}

#[derive(Debug, Deserialize)]
struct CreateFolderResponse {
    message: String,
    folder: CreatedFolder,
}

#[derive(Debug, Deserialize)]
struct CreatedFolder {
    id: String,
}

// ============ Config ============

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(default)]
    server: ServerConfig,
}

#[derive(Debug, Deserialize)]
struct ServerConfig {
    #[serde(default = "default_bind")]
    bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

/// Endpoint from the config file, with a wildcard bind mapped to loopback
fn endpoint_from_config(path: &Path) -> String {
    let addr = std::fs::read_to_string(path)
        .ok()
        .and_then(|content| toml::from_str::<Config>(&content).ok())
        .map(|config| config.server.bind_address)
        .unwrap_or_else(default_bind);

    match addr.strip_prefix("0.0.0.0:") {
        Some(port) => format!("http://127.0.0.1:{}", port),
        None => format!("http://{}", addr),
    }
}

// ============ Main ============

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let endpoint = cli
        .endpoint
        .clone()
        .unwrap_or_else(|| endpoint_from_config(&cli.config));
    let endpoint = endpoint.trim_end_matches('/').to_string();
    let client = reqwest::Client::new();
    let token = cli.token.as_deref();

    let result = match &cli.command {
        Commands::Health => health(&client, &endpoint).await,
        Commands::Login { email, password } => login(&client, &endpoint, email, password).await,
        Commands::Logout => logout(&client, &endpoint, require_token(token)).await,
        Commands::Ls { folder } => list(&client, &endpoint, require_token(token), folder.as_deref()).await,
        Commands::Mkdir { name, parent } => {
            mkdir(&client, &endpoint, require_token(token), name, parent.as_deref()).await
        }
        Commands::Upload { path, folder } => {
            upload(&client, &endpoint, require_token(token), path, folder.as_deref()).await
        }
        Commands::Download { id, output } => {
            download(&client, &endpoint, require_token(token), id, output.as_deref()).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn require_token(token: Option<&str>) -> Result<&str> {
    token.context("this command needs --token (run `wolfdrivectl login` first)")
}

/// Turn a non-success response into an error carrying the server's message
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    bail!("{} ({})", message.trim(), status)
}

// ============ Commands ============

async fn health(client: &reqwest::Client, endpoint: &str) -> Result<()> {
    let response = client
        .get(format!("{}/health", endpoint))
        .send()
        .await
        .with_context(|| format!("failed to reach {}", endpoint))?;
    let health: HealthResponse = check(response).await?.json().await?;

    println!("WolfDrive Gateway ({})", endpoint);
    println!("  Healthy:         {}", health.healthy);
    println!("  Version:         {}", health.version);
    println!("  Backend:         {}", health.backend);
    println!("  Active Sessions: {}", health.active_sessions);
    Ok(())
}

async fn login(client: &reqwest::Client, endpoint: &str, email: &str, password: &str) -> Result<()> {
    let response = client
        .post(format!("{}/api/login", endpoint))
        .json(&serde_json::json!({ "email": email, "password": password }))
        .send()
        .await
        .with_context(|| format!("failed to reach {}", endpoint))?;
    let login: LoginResponse = check(response).await?.json().await?;

    eprintln!("Logged in as {}", login.email);
    println!("{}", login.token);
    Ok(())
}

async fn logout(client: &reqwest::Client, endpoint: &str, token: Result<&str>) -> Result<()> {
    let response = client
        .post(format!("{}/api/logout", endpoint))
        .bearer_auth(token?)
        .send()
        .await?;
    check(response).await?;
    println!("Logged out");
    Ok(())
}

async fn list(client: &reqwest::Client, endpoint: &str, token: Result<&str>, folder: Option<&str>) -> Result<()> {
    let mut request = client
        .get(format!("{}/api/files", endpoint))
        .bearer_auth(token?);
    if let Some(folder) = folder {
        request = request.query(&[("folderId", folder)]);
    }
    let listing: Listing = check(request.send().await?).await?.json().await?;

    println!("{:<6} {:<28} {:>14} {:<20} NAME", "TYPE", "ID", "SIZE", "CREATED");
    println!("{}", "-".repeat(80));
    for folder in &listing.folders {
        println!(
            "{:<6} {:<28} {:>14} {:<20} {}/",
            "dir",
            folder.id,
            "-",
            format_created(folder.created),
            folder.name
        );
    }
    for file in &listing.files {
        println!(
            "{:<6} {:<28} {:>14} {:<20} {}",
            "file",
            file.id,
            file.size,
            format_created(file.created),
            file.name
        );
    }
    println!();
    println!("{} folders, {} files", listing.folders.len(), listing.files.len());
    Ok(())
}

async fn mkdir(
    client: &reqwest::Client,
    endpoint: &str,
    token: Result<&str>,
    name: &str,
    parent: Option<&str>,
) -> Result<()> {
    let response = client
        .post(format!("{}/api/folder", endpoint))
        .bearer_auth(token?)
        .json(&serde_json::json!({ "name": name, "parentId": parent }))
        .send()
        .await?;
    let created: CreateFolderResponse = check(response).await?.json().await?;
    println!("{} (id {})", created.message, created.folder.id);
    Ok(())
}

async fn upload(
    client: &reqwest::Client,
    endpoint: &str,
    token: Result<&str>,
    path: &Path,
    folder: Option<&str>,
) -> Result<()> {
    let token = token?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("upload path has no file name")?
        .to_string();
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut form = reqwest::multipart::Form::new()
        .part("file", reqwest::multipart::Part::bytes(content).file_name(file_name));
    if let Some(folder) = folder {
        form = form.text("folderId", folder.to_string());
    }

    let response = client
        .post(format!("{}/upload", endpoint))
        .bearer_auth(token)
        .multipart(form)
        .send()
        .await?;
    println!("{}", check(response).await?.text().await?);
    Ok(())
}

async fn download(
    client: &reqwest::Client,
    endpoint: &str,
    token: Result<&str>,
    id: &str,
    output: Option<&Path>,
) -> Result<()> {
    let response = client
        .get(format!("{}/api/download/{}", endpoint, id))
        .bearer_auth(token?)
        .send()
        .await?;
    let mut response = check(response).await?;

    let output = match output {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(disposition_name(&response).unwrap_or_else(|| id.to_string())),
    };
    let expected = response.content_length();

    let mut file = tokio::fs::File::create(&output)
        .await
        .with_context(|| format!("failed to create {}", output.display()))?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    if let Some(expected) = expected {
        if written != expected {
            bail!(
                "download truncated: got {} of {} bytes into {}",
                written,
                expected,
                output.display()
            );
        }
    }
    println!("Saved {} ({} bytes)", output.display(), written);
    Ok(())
}

/// File name from the quoted `filename` of a Content-Disposition header
fn disposition_name(response: &reqwest::Response) -> Option<String> {
    let value = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)?
        .to_str()
        .ok()?;
    let start = value.find("filename=\"")? + "filename=\"".len();
    let end = value[start..].find('"')? + start;
    Path::new(&value[start..end])
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

fn format_created(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}
