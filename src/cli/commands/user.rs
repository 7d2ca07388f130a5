use anyhow::anyhow;
use clap::Subcommand;
use serde_json::json;

use crate::auth::password::PasswordHasher;
use crate::auth::Role;
use crate::cli::utils::*;
use crate::cli::{connect, OutputFormat};
use crate::config::AppConfig;
use crate::services::client_service::validate_client_id;
use crate::services::user_service::NewUser;
use crate::services::UserService;
use crate::tenant::TenantScope;

#[derive(Subcommand)]
pub enum UserCommands {
    #[command(about = "Create a user with a confirmed email")]
    Create {
        #[arg(help = "Client code the user belongs to")]
        client_id: String,

        #[arg(help = "Email address (login name)")]
        email: String,

        #[arg(help = "Full name")]
        full_name: String,

        #[arg(long, default_value = "Client", help = "Administrator, Manager, Technician or Client")]
        role: String,

        #[arg(long, help = "Initial password")]
        password: String,
    },

    #[command(about = "Clear failed-login counters and any lockout")]
    Unlock {
        #[arg(help = "Email address")]
        email: String,
    },

    #[command(about = "Mark a user's email as confirmed")]
    Confirm {
        #[arg(help = "Email address")]
        email: String,
    },
}

pub async fn handle(cmd: UserCommands, config: &AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    let db = connect(config).await?;
    let hasher = PasswordHasher::new(config.security.password_iterations);
    let users = UserService::new(db.pool(), &hasher, &config.security);

    match cmd {
        UserCommands::Create {
            client_id,
            email,
            full_name,
            role,
            password,
        } => {
            let role: Role = role.parse().map_err(|e: String| anyhow!(e))?;
            let user = users
                .create(
                    NewUser {
                        client_id: validate_client_id(&client_id)?,
                        email,
                        full_name,
                        role,
                        password,
                        email_confirmed: true,
                    },
                    None,
                )
                .await?;
            output_success(
                output_format,
                &format!("User '{}' created in {}", user.email, user.client_id),
                Some(json!({ "user": user })),
            )
        }
        UserCommands::Unlock { email } => {
            let user = users
                .find_by_email(&email)
                .await?
                .ok_or_else(|| anyhow!("User '{}' not found", email))?;
            let user = users.unlock(&TenantScope::all(), user.id).await?;
            output_success(output_format, &format!("User '{}' unlocked", user.email), None)
        }
        UserCommands::Confirm { email } => {
            let user = users
                .find_by_email(&email)
                .await?
                .ok_or_else(|| anyhow!("User '{}' not found", email))?;
            users.mark_confirmed(user.id).await?;
            output_success(output_format, &format!("Email confirmed for '{}'", user.email), None)
        }
    }
}

/// Print a stored-format hash, e.g. for seeding an administrator by hand
pub fn hash_password(password: &str, config: &AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    let hash = PasswordHasher::new(config.security.password_iterations).hash(password);
    match output_format {
        OutputFormat::Json => output_json(&json!({ "hash": hash })),
        OutputFormat::Text => {
            println!("{}", hash);
            Ok(())
        }
    }
}
