//! # AgentDesk: task distribution server
//!
//! Admins register agents, upload contact sheets (CSV / XLSX / XLS) and the
//! rows are split evenly across the active agents.
//!
//! Usage:
//!   agentdesk                                  # Start API server (default port 3000)
//!   agentdesk --port 8080                      # Custom port
//!   agentdesk --config ./agentdesk.toml        # Explicit config file
//!   agentdesk --init-admin --admin-email me@x.io  # Create an admin, print a token

use agentdesk_core::PlatformConfig;
use agentdesk_platform::{AdminServer, AdminState, PlatformDb};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "agentdesk",
    version,
    about = "AgentDesk: upload contact sheets and distribute them across agents"
)]
struct Cli {
    /// Config file (default: ~/.agentdesk/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API port
    #[arg(short, long)]
    port: Option<u16>,

    /// Database path
    #[arg(long)]
    db_path: Option<String>,

    /// JWT secret (recommended: set JWT_SECRET env var)
    #[arg(long)]
    jwt_secret: Option<String>,

    /// Listen on all interfaces instead of loopback
    #[arg(long)]
    bind_all: bool,

    /// Create an admin, print a bearer token and exit
    #[arg(long)]
    init_admin: bool,

    /// Admin name (used with --init-admin)
    #[arg(long, default_value = "Admin")]
    admin_name: String,

    /// Admin email (used with --init-admin)
    #[arg(long, default_value = "admin@agentdesk.local")]
    admin_email: String,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// File config, then CLI flags, then `JWT_SECRET`.
fn resolve_config(cli: &Cli) -> Result<PlatformConfig> {
    let mut config = match &cli.config {
        Some(path) => PlatformConfig::load_from(path)?,
        None => PlatformConfig::load()?,
    };
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(db_path) = &cli.db_path {
        config.db_path = db_path.clone();
    }
    if let Some(secret) = &cli.jwt_secret {
        config.jwt_secret = secret.clone();
    }
    if cli.bind_all {
        config.bind_all = true;
    }
    // Prefer JWT_SECRET env var over file and CLI
    if let Ok(secret) = std::env::var("JWT_SECRET") {
        if !secret.is_empty() {
            config.jwt_secret = secret;
        }
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "agentdesk=debug,agentdesk_platform=debug,tower_http=debug"
    } else {
        "agentdesk=info,agentdesk_platform=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = resolve_config(&cli)?;
    let db_path = config.resolved_db_path();

    // Ensure directories exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let db = PlatformDb::open(&db_path)?;

    // --init-admin: create admin, print a token and exit
    if cli.init_admin {
        println!("AgentDesk: Admin Setup\n");
        let admin = match db.get_admin_by_email(&cli.admin_email)? {
            Some(existing) => {
                println!("Admin '{}' already exists, issuing a new token.", existing.email);
                existing
            }
            None => {
                let admin = db.create_admin(&cli.admin_name, &cli.admin_email)?;
                db.log_event("admin_created", "system", Some(&format!("email={}", admin.email)))
                    .ok();
                println!("Admin created:");
                admin
            }
        };
        let token = agentdesk_platform::auth::create_token(
            &admin.id,
            &admin.email,
            &config.jwt_secret,
            config.token_ttl_hours,
        )?;
        println!("   Id:     {}", admin.id);
        println!("   Email:  {}", admin.email);
        println!("   Token:  {token}");
        println!("   Valid:  {}h", config.token_ttl_hours);
        return Ok(());
    }

    if config.uses_default_secret() {
        tracing::warn!("Using DEFAULT JWT secret! Set JWT_SECRET env var for production.");
    }

    let state = Arc::new(AdminState::new(db, &config));

    println!("AgentDesk v{}", env!("CARGO_PKG_VERSION"));
    println!("   API:       http://localhost:{}/api", config.port);
    println!("   Database:  {}", db_path.display());
    println!("   Upload:    max {} bytes", config.max_upload_bytes);
    println!();

    AdminServer::start(state, config.port).await?;
    Ok(())
}
