use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pgquill::ast::Select;
use pgquill::catalog::{Oid, TypeCatalog};
use pgquill::db::{self, AppConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Inspect PostgreSQL types and tables the way the statement builder sees them
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Saved connection to use (defaults to the first one)
    #[arg(long, global = true)]
    connect: Option<String>,

    /// Schema to load types and tables from
    #[arg(long, global = true)]
    schema: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a starter config file if none exists
    Init,
    /// List relations in the schema
    Tables,
    /// Show a table's columns with their resolved types
    Table { name: String },
    /// Select every column of a table and print the decoded rows
    Select {
        table: String,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Show parameter and result types of a query using ? placeholders
    Describe { sql: String },
    /// Show the resolved descriptor tree of a type
    Type { oid: Oid },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pgquill=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);

    if let Command::Init = cli.command {
        if config_path.exists() {
            println!("{} already exists", config_path.display());
        } else {
            let mut config = AppConfig::default();
            config.connections.push(db::ConnectionConfig::default());
            config.save(&config_path)?;
            println!("wrote {}", config_path.display());
        }
        return Ok(());
    }

    let config = AppConfig::load(&config_path)?;
    let schema = cli.schema.clone().unwrap_or_else(|| config.schema.clone());
    let connection = config.connection(cli.connect.as_deref(), std::env::var("PGPASSWORD").ok())?;
    let client = db::create_client(&connection)
        .await
        .with_context(|| format!("connecting to {}", connection.display_string()))?;

    if let Command::Tables = cli.command {
        for relation in db::list_relations(&client, &schema).await? {
            println!(
                "{:<12} {:<40} ~{}",
                relation.kind.label(),
                relation.name,
                relation.row_estimate
            );
        }
        return Ok(());
    }

    let snapshot = db::load_snapshot(&client, &schema).await?;
    let mut catalog = TypeCatalog::new();

    match cli.command {
        Command::Table { name } => {
            let table = db::load_table(&client, &mut catalog, &snapshot, &schema, &name).await?;
            for column in table.columns() {
                println!("{:<32} {}", column.name(), column.ty());
            }
        }
        Command::Select { table, limit } => {
            let table = db::load_table(&client, &mut catalog, &snapshot, &schema, &table).await?;
            let statement = Select::from(&table).all_columns().limit(limit).render()?;
            println!("{}", statement.sql);
            for record in db::query(&client, &statement).await? {
                let line = record
                    .iter()
                    .map(|(field, value)| format!("{}={}", field, value.display()))
                    .collect::<Vec<_>>()
                    .join("  ");
                println!("{}", line);
            }
        }
        Command::Describe { sql } => {
            let metadata = db::describe_query(&client, &sql).await?;
            let resolved = metadata.resolve(&mut catalog, &snapshot)?;
            for (i, param) in resolved.params.iter().enumerate() {
                println!("param ${:<4} {}", i + 1, param);
            }
            for (name, ty) in &resolved.columns {
                println!("column {:<26} {}", name, ty);
            }
        }
        Command::Type { oid } => {
            let ty = catalog.resolve(&snapshot, oid, true)?;
            print!("{}", ty.tree());
        }
        Command::Init | Command::Tables => {}
    }

    Ok(())
}
