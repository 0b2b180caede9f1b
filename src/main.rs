mod app;
mod config;
mod models;
mod prompts;
mod providers;
mod services;
mod ui;

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use app::App;
use config::AppConfig;
use models::UserRole;
use services::{Database, KeyringService};

#[derive(Parser)]
#[command(name = "ewa")]
#[command(about = "Guided essay writing assistant for design-case and critique essays")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "EWA_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path (overrides the config file)
    #[arg(short, long, env = "EWA_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and chat in the terminal (default)
    Chat,
    /// Register a user who may sign in
    AddUser {
        email: String,
        /// Grant access to the /admin commands
        #[arg(long)]
        admin: bool,
    },
    /// Replace a registered user's password
    SetPassword { email: String },
    /// Read the provider API key from stdin and store it in the system keyring
    SetApiKey,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database_path = Some(database);
    }

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let db = Database::open(&config.database_path()?).await?;
            let app = App::build(&config, db).await?;
            let stdin = BufReader::new(tokio::io::stdin());
            ui::repl::run(&app, stdin, tokio::io::stdout()).await
        }
        Commands::AddUser { email, admin } => {
            let db = Database::open(&config.database_path()?).await?;
            let role = if admin { UserRole::Admin } else { UserRole::Student };
            let password = read_secret("Password: ").await?;
            let user = services::auth::register_user(&db, &email, role, &password).await?;
            println!("Registered {} ({})", user.email, user.role.as_str());
            Ok(())
        }
        Commands::SetPassword { email } => {
            let db = Database::open(&config.database_path()?).await?;
            let password = read_secret("New password: ").await?;
            services::auth::set_password(&db, &email, &password).await?;
            println!("Password updated for {}", email.trim());
            Ok(())
        }
        Commands::SetApiKey => {
            let key = read_secret("API key: ").await?;
            KeyringService::new().await?.store_api_key(key.trim()).await?;
            println!("API key stored in the system keyring");
            Ok(())
        }
    }
}

/// One line from stdin, without the trailing newline.
async fn read_secret(prompt: &str) -> Result<String> {
    eprint!("{}", prompt);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let line = lines.next_line().await?.unwrap_or_default();
    let line = line.trim_end_matches(['\r', '\n']).to_string();
    if line.trim().is_empty() {
        bail!("Nothing entered");
    }
    Ok(line)
}
