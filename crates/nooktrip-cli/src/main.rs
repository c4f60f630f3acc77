use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use nooktrip_cli::{build_request, local_dispatcher};
use nooktrip_lambda_shared::SqliteStore;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run NookTrip handlers locally")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the SQLite database and schema.
    InitDb {
        /// Database file to create.
        #[arg(long)]
        db: PathBuf,
    },
    /// Dispatch a single request and print the response.
    Invoke {
        /// Database file backing the handlers.
        #[arg(long)]
        db: PathBuf,
        /// HTTP method.
        #[arg(long, default_value = "GET")]
        method: String,
        /// Request path, e.g. `/itineraries`.
        #[arg(long)]
        path: String,
        /// JSON request body.
        #[arg(long, conflicts_with = "body_file")]
        body: Option<String>,
        /// Read the JSON request body from a file.
        #[arg(long)]
        body_file: Option<PathBuf>,
        /// Query parameter as `key=value`; repeatable.
        #[arg(long = "query", value_name = "KEY=VALUE")]
        query: Vec<String>,
        /// Handler timeout in milliseconds.
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
    },
    /// List the registered routes.
    Routes,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::InitDb { db } => handle_init_db(&db),
        Command::Invoke {
            db,
            method,
            path,
            body,
            body_file,
            query,
            timeout_ms,
        } => {
            let body = match body_file {
                Some(file) => Some(
                    fs::read_to_string(&file)
                        .with_context(|| format!("failed to read {}", file.display()))?,
                ),
                None => body,
            };
            handle_invoke(&db, &method, &path, body, &query, timeout_ms).await
        }
        Command::Routes => handle_routes(),
    }
}

fn handle_init_db(db: &Path) -> Result<ExitCode> {
    SqliteStore::initialize(db)
        .with_context(|| format!("failed to initialize database at {}", db.display()))?;
    println!("Database initialized at {}", db.display());
    Ok(ExitCode::SUCCESS)
}

async fn handle_invoke(
    db: &Path,
    method: &str,
    path: &str,
    body: Option<String>,
    query: &[String],
    timeout_ms: u64,
) -> Result<ExitCode> {
    let dispatcher = local_dispatcher(db, Duration::from_millis(timeout_ms))?;
    let request = build_request(method, path, body, query)?;

    let response = dispatcher.dispatch(request, "local-invoke").await;

    println!("HTTP {}", response.status_code);
    match response.body_json() {
        Ok(body) => println!("{}", serde_json::to_string_pretty(&body)?),
        Err(_) => println!("{}", response.body),
    }

    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn handle_routes() -> Result<ExitCode> {
    let dispatcher = local_dispatcher(Path::new("nooktrip.db"), Duration::from_secs(10))?;
    for route in dispatcher.routes() {
        println!("{}", route);
    }
    Ok(ExitCode::SUCCESS)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
