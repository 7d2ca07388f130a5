pub mod commands;
pub mod utils;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::config::{self, AppConfig};
use crate::database::DatabaseManager;

#[derive(Parser)]
#[command(name = "itad")]
#[command(about = "ITAD CLI - Administrative tasks for the ITAD backend")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Apply pending database migrations")]
    Migrate,

    #[command(about = "Client (tenant) management")]
    Client {
        #[command(subcommand)]
        cmd: commands::client::ClientCommands,
    },

    #[command(about = "User account management")]
    User {
        #[command(subcommand)]
        cmd: commands::user::UserCommands,
    },

    #[command(about = "Hash a password with the configured iteration count")]
    HashPassword {
        #[arg(help = "Plain-text password")]
        password: String,
    },

    #[command(about = "Scheduled report utilities")]
    Schedule {
        #[command(subcommand)]
        cmd: commands::schedule::ScheduleCommands,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Connect using the same environment configuration the server reads
pub(crate) async fn connect(config: &AppConfig) -> anyhow::Result<DatabaseManager> {
    DatabaseManager::connect(&config.database)
        .await
        .context("failed to connect to database")
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let config = config::config();

    match cli.command {
        Commands::Migrate => {
            let db = connect(config).await?;
            db.migrate().await.context("failed to apply migrations")?;
            utils::output_success(output_format, "Migrations applied", None)
        }
        Commands::Client { cmd } => commands::client::handle(cmd, config, output_format).await,
        Commands::User { cmd } => commands::user::handle(cmd, config, output_format).await,
        Commands::HashPassword { password } => commands::user::hash_password(&password, config, output_format),
        Commands::Schedule { cmd } => commands::schedule::handle(cmd, output_format),
    }
}
