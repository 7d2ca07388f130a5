use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::*;
use crate::cli::{connect, OutputFormat};
use crate::config::AppConfig;
use crate::filter::Pagination;
use crate::services::client_service::NewClient;
use crate::services::ClientService;

#[derive(Subcommand)]
pub enum ClientCommands {
    #[command(about = "Create a client")]
    Create {
        #[arg(help = "Client code, e.g. ACME")]
        id: String,

        #[arg(help = "Display name")]
        name: String,

        #[arg(long)]
        contact_email: Option<String>,
    },

    #[command(about = "List clients")]
    List {
        #[arg(long, help = "Match against id or name")]
        search: Option<String>,
    },
}

pub async fn handle(cmd: ClientCommands, config: &AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    let db = connect(config).await?;
    let clients = ClientService::new(db.pool());

    match cmd {
        ClientCommands::Create { id, name, contact_email } => {
            let client = clients
                .create(NewClient {
                    id,
                    name,
                    contact_name: None,
                    contact_email,
                    contact_phone: None,
                    address: None,
                })
                .await?;
            output_success(
                output_format,
                &format!("Client '{}' created", client.id),
                Some(json!({ "client": client })),
            )
        }
        ClientCommands::List { search } => {
            let pagination = Pagination::new(Some(1), Some(config.api.max_page_size), config.api.default_page_size, config.api.max_page_size);
            let page = clients.list(search.as_deref(), pagination).await?;

            if page.items.is_empty() {
                return output_empty_collection(output_format, "clients", "No clients found");
            }

            match output_format {
                OutputFormat::Json => output_json(&page)?,
                OutputFormat::Text => {
                    println!("{:<20} {:<30} {:<8} {}", "ID", "NAME", "ACTIVE", "CONTACT");
                    println!("{}", "-".repeat(80));
                    for client in &page.items {
                        println!(
                            "{:<20} {:<30} {:<8} {}",
                            client.id,
                            truncate(&client.name, 30),
                            client.is_active,
                            client.contact_email.as_deref().unwrap_or("-")
                        );
                    }
                    if page.total > page.items.len() as i64 {
                        println!("({} of {} shown)", page.items.len(), page.total);
                    }
                }
            }
            Ok(())
        }
    }
}
