use clap::{Parser, Subcommand};

use crate::database::manager::DatabaseManager;
use crate::models::tenant::Tenant;

#[derive(Parser)]
#[command(name = "crewhq")]
#[command(about = "CrewHQ CLI - operational tooling for the CrewHQ backend")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Database maintenance")]
    Db {
        #[command(subcommand)]
        cmd: DbCommands,
    },

    #[command(about = "Tenant administration")]
    Tenant {
        #[command(subcommand)]
        cmd: TenantCommands,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    #[command(about = "Apply pending migrations")]
    Migrate,

    #[command(about = "Check database connectivity")]
    Health,
}

#[derive(Subcommand)]
pub enum TenantCommands {
    #[command(about = "List all tenants")]
    List,
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Db { cmd } => match cmd {
            DbCommands::Migrate => {
                DatabaseManager::run_migrations().await?;
                println!("Migrations applied");
                Ok(())
            }
            DbCommands::Health => {
                DatabaseManager::health_check().await?;
                println!("Database reachable");
                Ok(())
            }
        },
        Commands::Tenant { cmd } => match cmd {
            TenantCommands::List => {
                let pool = DatabaseManager::pool().await?;
                let tenants =
                    sqlx::query_as::<_, Tenant>("SELECT * FROM tenants ORDER BY slug")
                        .fetch_all(&pool)
                        .await?;

                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&tenants)?);
                } else {
                    for t in &tenants {
                        println!("{:<24} {:<32} {}", t.slug, t.name, t.id);
                    }
                    println!("{} tenant(s)", tenants.len());
                }
                Ok(())
            }
        },
    }
}
