use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dbal::{Connection, Connections, Value, config};

#[derive(Parser, Debug)]
#[command(name = "dbal-cli")]
#[command(about = "Run portable operations against a configured database", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "DBAL_CONFIG")]
    config: Option<PathBuf>,

    /// Named connection to use instead of the default one
    #[arg(short = 'n', long)]
    connection: Option<String>,

    /// Connection URL, replaces the `main` connection
    #[arg(short, long)]
    url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable JSON logging output
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open every configured connection and run a round-trip on each
    Verify,
    /// Run raw SQL with positional parameters
    Query {
        sql: String,
        /// Parameter literals (`null`, `true`, `42`, `1.5`, text)
        params: Vec<String>,
    },
    /// Create a table from COLUMN:TYPE pairs
    CreateTable {
        name: String,
        #[arg(required = true)]
        columns: Vec<String>,
    },
    /// Drop a table
    DropTable { name: String },
    /// Insert one row from COLUMN=VALUE pairs
    Insert {
        table: String,
        #[arg(required = true)]
        values: Vec<String>,
    },
    /// Print the first row matching every COLUMN=VALUE pair
    Find {
        table: String,
        #[arg(required = true)]
        criteria: Vec<String>,
    },
}

fn init_logging(verbose: bool, json_logs: bool) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer};

    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Results go to stdout; logs stay on stderr.
    let fmt_layer = if json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn parse_column(raw: &str) -> anyhow::Result<(String, String)> {
    let (name, ty) = raw
        .split_once(':')
        .with_context(|| format!("Expected COLUMN:TYPE, got '{raw}'"))?;
    Ok((name.trim().to_string(), ty.trim().to_string()))
}

fn parse_assignment(raw: &str) -> anyhow::Result<(String, Value)> {
    let (name, value) = raw
        .split_once('=')
        .with_context(|| format!("Expected COLUMN=VALUE, got '{raw}'"))?;
    Ok((name.trim().to_string(), Value::parse_literal(value)))
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(
    command: Command,
    connections: &Connections,
    connection: &Connection,
) -> anyhow::Result<()> {
    match command {
        Command::Verify => {
            connections.connect_all().await?;
            let names: Vec<&str> = connections.names().collect();
            print_json(&serde_json::json!({ "verified": names }))
        }
        Command::Query { sql, params } => {
            let params: Vec<Value> = params
                .iter()
                .map(String::as_str)
                .map(Value::parse_literal)
                .collect();
            let result = connection.raw_query(&sql, &params).await?;
            print_json(&result)
        }
        Command::CreateTable { name, columns } => {
            let columns = columns
                .iter()
                .map(String::as_str)
                .map(parse_column)
                .collect::<anyhow::Result<Vec<_>>>()?;
            match connection.create_table(&name, columns).await {
                Ok(()) => print_json(&serde_json::json!({ "created": name })),
                Err(e) if e.is_table_already_exists() => {
                    tracing::warn!(table = %name, "Table already exists");
                    print_json(&serde_json::json!({ "created": null, "exists": name }))
                }
                Err(e) => Err(e.into()),
            }
        }
        Command::DropTable { name } => {
            connection.drop_table(&name).await?;
            print_json(&serde_json::json!({ "dropped": name }))
        }
        Command::Insert { table, values } => {
            let values = values
                .iter()
                .map(String::as_str)
                .map(parse_assignment)
                .collect::<anyhow::Result<Vec<_>>>()?;
            let rows_affected = connection.insert(&table, values).await?;
            print_json(&serde_json::json!({ "rows_affected": rows_affected }))
        }
        Command::Find { table, criteria } => {
            let criteria = criteria
                .iter()
                .map(String::as_str)
                .map(parse_assignment)
                .collect::<anyhow::Result<Vec<_>>>()?;
            let row = connection.find_one_by(&table, criteria).await?;
            print_json(&row)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.json_logs);
    dbal::observability::describe_metrics();

    // Load configuration with precedence: CLI > env > file
    let mut builder = if let Some(ref path) = args.config {
        config::load_config_from_path(path)?
    } else {
        config::load_config()?
    };

    if let Some(ref url) = args.url {
        let main = dbal::ConnectionConfig::from_url(url)?;
        builder = builder.connection(config::MAIN_CONNECTION, main);
    }

    let config = builder.build().context("Invalid configuration")?;
    let connections = Connections::from_config(&config)?;

    let connection = match args.connection.as_deref() {
        Some(name) => connections
            .get(name)
            .with_context(|| format!("Unknown connection '{name}'"))?,
        None => connections.default_connection(),
    };
    tracing::debug!(
        connection = args.connection.as_deref().unwrap_or(config.default_connection_name()),
        platform = %connection.platform(),
        "Using connection"
    );

    let result = tokio::select! {
        result = run(args.command, &connections, connection) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
    };

    connections.shutdown().await;
    result
}
