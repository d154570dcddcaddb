use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sqlgate::auth::PasswordHasher;
use sqlgate::config::ServerConfig;
use sqlgate::engine::SqliteEngine;
use sqlgate::server::{AppState, create_router};
use sqlgate::service::identity;
use sqlgate::service::validation::{MIN_PASSWORD_LEN, normalize_email};
use sqlgate::state::write_secret;
use sqlgate::store::{SqliteStore, Store};
use sqlgate::types::Role;

#[derive(Parser)]
#[command(name = "sqlgate")]
#[command(about = "Per-tenant SQL login provisioning and database isolation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// TOML configuration file
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides the config file)
        #[arg(long, short)]
        port: Option<u16>,

        /// Data directory for the datastore, engine files and backups
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the data directory, secrets and the first admin user
    Init {
        /// Data directory for the datastore, engine files and backups
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Admin email address
        #[arg(long)]
        email: Option<String>,

        /// Admin password (prompted for when omitted)
        #[arg(long)]
        password: Option<String>,

        /// Skip interactive prompts
        #[arg(long)]
        non_interactive: bool,
    },
}

fn run_init(
    data_dir: PathBuf,
    email: Option<String>,
    password: Option<String>,
    non_interactive: bool,
) -> anyhow::Result<()> {
    let config = ServerConfig {
        data_dir,
        ..ServerConfig::default()
    };
    fs::create_dir_all(&config.data_dir)?;
    fs::create_dir_all(config.backup_dir())?;

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;

    if store.has_admin_user()? {
        bail!(
            "Server already initialized. An admin user exists in {}",
            config.db_path().display()
        );
    }

    SqliteEngine::open(config.engine_dir(), config.engine.command_timeout())?;

    // Existing keys are kept so stored credentials stay readable.
    for path in [config.session_key_path(), config.credential_key_path()] {
        if !path.exists() {
            write_secret(&path)?;
        }
    }

    let email = match email {
        Some(email) => email,
        None if non_interactive => bail!("--email is required with --non-interactive"),
        None => prompt_email()?,
    };
    let password = match password {
        Some(password) => password,
        None if non_interactive => bail!("--password is required with --non-interactive"),
        None => prompt_password()?,
    };

    let user = identity::create_user(
        &store,
        &PasswordHasher::new(),
        &email,
        &password,
        None,
        Role::Admin,
    )?;

    println!();
    println!("========================================");
    println!("Admin user created: {}", user.email);
    println!();
    println!("Data directory: {}", config.data_dir.display());
    println!("Secrets written to:");
    println!("  {}", config.session_key_path().display());
    println!("  {}", config.credential_key_path().display());
    println!("========================================");
    println!();

    Ok(())
}

fn prompt_email() -> anyhow::Result<String> {
    let email = inquire::Text::new("Admin email:")
        .with_validator(|input: &str| match normalize_email(input) {
            Ok(_) => Ok(inquire::validator::Validation::Valid),
            Err(_) => Ok(inquire::validator::Validation::Invalid(
                "Enter a valid email address".into(),
            )),
        })
        .prompt()?;
    Ok(email)
}

fn prompt_password() -> anyhow::Result<String> {
    let password = inquire::Password::new("Admin password:")
        .with_validator(move |input: &str| {
            if input.chars().count() < MIN_PASSWORD_LEN {
                Ok(inquire::validator::Validation::Invalid(
                    format!("Password must be at least {MIN_PASSWORD_LEN} characters").into(),
                ))
            } else {
                Ok(inquire::validator::Validation::Valid)
            }
        })
        .prompt()?;
    Ok(password)
}

async fn run_serve(
    config_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = match config_path {
        Some(path) => ServerConfig::load(&path)?,
        None => ServerConfig::default(),
    };
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }

    let addr = config.socket_addr()?;
    let state = Arc::new(AppState::open(config)?);
    if !state.store.has_admin_user()? {
        bail!("Server not initialized. Run 'sqlgate admin init' first.");
    }

    let app = create_router(Arc::clone(&state));

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.shutdown().await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, draining requests");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sqlgate=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init {
                data_dir,
                email,
                password,
                non_interactive,
            } => {
                run_init(data_dir, email, password, non_interactive)?;
            }
        },
        Commands::Serve {
            config,
            host,
            port,
            data_dir,
        } => {
            run_serve(config, host, port, data_dir).await?;
        }
    }

    Ok(())
}
