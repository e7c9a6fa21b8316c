//! authkeep - a command-line host for a Basic-Auth session.
//!
//! Logs in against the configured authentication URL, keeps the session in
//! the cache directory (or the OS keychain), and issues authenticated
//! requests to registered endpoints.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use authkeep_core::store::keychain::DEFAULT_SERVICE_NAME;
use authkeep_core::{AuthService, FileStore, KeyValueStore, KeyringStore, SessionConfig};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Password taken from the environment instead of prompting
const ENV_PASSWORD: &str = "AUTHKEEP_PASSWORD";

#[derive(Parser)]
#[command(name = "authkeep", version, about = "Keep an HTTP Basic-Auth session")]
struct Cli {
    /// Config file (default: ~/.config/authkeep/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Where session data is kept
    #[arg(long, value_enum, default_value_t = StoreKind::File, global = true)]
    store: StoreKind,

    /// Additional host that should receive the Authorization header
    #[arg(long = "endpoint", global = true)]
    endpoints: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify credentials and start a session
    Login { username: String },
    /// End the session
    Logout,
    /// Show the current user and session liveness
    Status,
    /// GET a URL, with the session's header when it targets an endpoint
    Get { url: String },
    /// Print session events until interrupted
    Watch,
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreKind {
    File,
    Keyring,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    let config = match path {
        Some(path) => SessionConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => SessionConfig::load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            SessionConfig::default()
        }),
    };
    Ok(config.with_env_overrides())
}

fn open_store(kind: StoreKind) -> Result<Arc<dyn KeyValueStore>> {
    match kind {
        StoreKind::File => {
            let dir = SessionConfig::cache_dir().unwrap_or_else(|| PathBuf::from("./cache"));
            debug!(?dir, "Session directory configured");
            let store = FileStore::in_dir(&dir).context("Failed to open session file")?;
            Ok(Arc::new(store))
        }
        StoreKind::Keyring => Ok(Arc::new(KeyringStore::new(DEFAULT_SERVICE_NAME))),
    }
}

fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var(ENV_PASSWORD) {
        return Ok(password);
    }
    let password = rpassword::prompt_password("Password: ")?;
    Ok(password)
}

async fn login(service: &AuthService, username: &str) -> Result<()> {
    if username.is_empty() {
        bail!("Username required");
    }
    let password = read_password()?;

    match service.login(username, &password, None).await {
        Ok(()) => {
            println!("Logged in as {}", username);
            Ok(())
        }
        Err(e) => bail!("Login failed: {}", e),
    }
}

fn status(service: &AuthService) -> Result<()> {
    let session = service.session();
    match session.username()? {
        Some(username) => {
            let remaining = session.minutes_remaining()?.unwrap_or(0.0);
            println!("Logged in as {} ({:.0} min left)", username, remaining.ceil());
        }
        None => println!("Not logged in"),
    }
    println!("Endpoints: {}", service.endpoints().hosts().join(", "));
    Ok(())
}

async fn get(service: &AuthService, url: &str) -> Result<()> {
    let response = service
        .client()
        .get(url)
        .await
        .with_context(|| format!("GET {} failed", url))?;

    if service.is_endpoint(url) {
        service.session().record_activity()?;
    }
    let status = response.status();
    let body = response.text().await.context("Failed to read response body")?;
    eprintln!("{}", status);
    println!("{}", body);
    Ok(())
}

async fn watch(service: &AuthService) -> Result<()> {
    let mut events = service.events().subscribe();
    info!("Watching session events");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => match event.payload() {
                    Some(username) => println!("{} {}", event.name(), username),
                    None => println!("{}", event.name()),
                },
                Err(RecvError::Lagged(missed)) => warn!(missed, "Dropped session events"),
                Err(RecvError::Closed) => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let store = open_store(cli.store)?;
    let service = AuthService::start(&config, store).context("Failed to start session")?;

    service.add_endpoint(None)?;
    for endpoint in &cli.endpoints {
        service
            .add_endpoint(Some(endpoint))
            .with_context(|| format!("Invalid endpoint {}", endpoint))?;
    }

    let result = match cli.command {
        Command::Login { username } => login(&service, username.trim()).await,
        Command::Logout => {
            service.logout()?;
            println!("Logged out");
            Ok(())
        }
        Command::Status => status(&service),
        Command::Get { url } => get(&service, &url).await,
        Command::Watch => watch(&service).await,
    };

    service.shutdown();
    result
}
