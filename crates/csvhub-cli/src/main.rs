//! csvhub CLI
//!
//! Command-line interface for browsing and managing a csvhub catalog without
//! running the API server.

use clap::{Parser, Subcommand};
use csvhub_api::CatalogService;
use csvhub_core::JoinRequest;
use csvhub_fetch::{Fetcher, FetcherConfig};
use csvhub_storage::backend_from_uri;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "csvhub")]
#[command(version, about = "csvhub catalog CLI", long_about = None)]
struct Cli {
    /// Catalog location: a SQLite path or file://<path>
    #[arg(
        short,
        long,
        env = "CSVHUB_CATALOG",
        default_value = "csvhub_catalog.db",
        global = true
    )]
    catalog: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List files in the catalog, newest first
    List {
        #[arg(long, default_value_t = 0)]
        skip: i64,

        #[arg(short, long, default_value_t = 100)]
        limit: i64,
    },

    /// Show metadata and the first rows of a file
    Show {
        /// File id
        id: i64,

        /// Number of rows to print
        #[arg(short, long, default_value_t = 10)]
        rows: usize,
    },

    /// Import a CSV file from disk
    Import {
        /// Path of the CSV file
        path: PathBuf,

        /// Catalog file name (defaults to the file's name on disk)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Write a stored file as CSV
    Export {
        /// File id
        id: i64,

        /// Output path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Join a stored file with records from a remote API
    Join {
        /// Id of the stored file
        id: i64,

        /// Remote API address (http or https)
        #[arg(long)]
        api: String,

        /// Name for the joined file
        #[arg(short, long)]
        name: String,

        /// Key column on the stored file
        #[arg(long)]
        left: String,

        /// Key column on the remote records
        #[arg(long)]
        right: String,

        /// Remote request timeout in seconds
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let timeout = match &cli.command {
        Commands::Join { timeout_secs, .. } => Duration::from_secs(*timeout_secs),
        _ => FetcherConfig::default().timeout,
    };
    let service = open_service(&cli.catalog, timeout).await?;

    match cli.command {
        Commands::List { skip, limit } => list_files(&service, skip, limit).await,
        Commands::Show { id, rows } => show_file(&service, id, rows).await,
        Commands::Import { path, name } => import_file(&service, &path, name).await,
        Commands::Export { id, output } => export_file(&service, id, output).await,
        Commands::Join {
            id,
            api,
            name,
            left,
            right,
            ..
        } => {
            let request = JoinRequest {
                source_file_id: id,
                remote_address: api,
                new_file_name: name,
                left_key: left,
                right_key: right,
            };
            join_file(&service, request).await
        }
    }
}

async fn open_service(
    catalog: &str,
    timeout: Duration,
) -> Result<CatalogService, Box<dyn std::error::Error>> {
    let backend = backend_from_uri(catalog)?;
    backend.initialize().await?;
    let fetcher = Fetcher::new(FetcherConfig::builder().timeout(timeout).build()?)?;
    Ok(CatalogService::new(Arc::from(backend), fetcher))
}

async fn list_files(
    service: &CatalogService,
    skip: i64,
    limit: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let files = service.list(Some(skip), Some(limit)).await?;
    if files.is_empty() {
        println!("No files found.");
        return Ok(());
    }

    println!("{:>6}  FILE NAME", "ID");
    for file in files {
        println!("{:>6}  {}", file.id, file.file_name);
    }
    Ok(())
}

async fn show_file(
    service: &CatalogService,
    id: i64,
    rows: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let entry = service.get_entry(id).await?;
    let dataset = service.get_dataset(id).await?;

    println!("File: {} (id {})", entry.file_name, entry.id);
    println!("Created: {}", entry.created_at);
    println!(
        "Shape: {} rows x {} columns",
        format_number(entry.row_count),
        entry.column_count
    );
    println!("Columns: {}", entry.columns.join(", "));
    if let Some(provenance) = &entry.provenance {
        println!(
            "Joined from file {} with {} at {}",
            provenance.source_file_id, provenance.remote_address, provenance.joined_at
        );
    }
    if !entry.warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &entry.warnings {
            println!("  {}", warning);
        }
    }

    if rows > 0 && !dataset.is_empty() {
        println!("\nRows:");
        for row in dataset.rows().take(rows) {
            println!("  {}", serde_json::to_string(&row)?);
        }
        if dataset.num_rows() > rows {
            println!("  ... {} more", format_number(dataset.num_rows() - rows));
        }
    }
    Ok(())
}

async fn import_file(
    service: &CatalogService,
    path: &Path,
    name: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = tokio::fs::read(path)
        .await
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    let file_name = match name {
        Some(name) => name,
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| format!("Cannot derive a file name from '{}'", path.display()))?,
    };

    let outcome = service.upload(&file_name, &content).await?;
    println!(
        "Imported '{}' as id {} ({} rows)",
        outcome.file_name,
        outcome.id,
        format_number(outcome.row_count)
    );
    for warning in &outcome.warnings {
        println!("  warning: {}", warning);
    }
    Ok(())
}

async fn export_file(
    service: &CatalogService,
    id: i64,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let exported = service.export_csv(id).await?;
    match output {
        Some(path) => {
            tokio::fs::write(&path, &exported.content)
                .await
                .map_err(|e| format!("Failed to write '{}': {}", path.display(), e))?;
            println!("Exported '{}' to {}", exported.file_name, path.display());
        }
        None => {
            use std::io::Write;
            std::io::stdout().write_all(&exported.content)?;
        }
    }
    Ok(())
}

async fn join_file(
    service: &CatalogService,
    request: JoinRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = service.join(request).await?;
    println!(
        "Joined into '{}' as id {} ({} rows, task {})",
        outcome.file_name,
        outcome.id,
        format_number(outcome.row_count),
        outcome.task_id
    );
    Ok(())
}

fn format_number(n: usize) -> String {
    let mut digits = n.to_string();
    let mut parts = Vec::new();

    while digits.len() > 3 {
        let chunk = digits.split_off(digits.len() - 3);
        parts.push(chunk);
    }
    parts.push(digits);
    parts.reverse();
    parts.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_parse_join_command() {
        let cli = Cli::try_parse_from([
            "csvhub",
            "--catalog",
            "memory://",
            "join",
            "3",
            "--api",
            "https://api.example.com/scores",
            "--name",
            "joined.csv",
            "--left",
            "id",
            "--right",
            "uid",
        ])
        .unwrap();
        assert_eq!(cli.catalog, "memory://");
        match cli.command {
            Commands::Join { id, left, right, timeout_secs, .. } => {
                assert_eq!(id, 3);
                assert_eq!((left.as_str(), right.as_str()), ("id", "uid"));
                assert_eq!(timeout_secs, 10);
            }
            _ => panic!("expected join command"),
        }
    }

    #[tokio::test]
    async fn test_import_and_show_against_sqlite_catalog() {
        let dir = tempfile::TempDir::new().unwrap();
        let csv_path = dir.path().join("people.csv");
        std::fs::write(&csv_path, "id,name\n1,a\n2,b\n").unwrap();
        let catalog = dir.path().join("catalog.db");

        let service = open_service(catalog.to_str().unwrap(), Duration::from_secs(1))
            .await
            .unwrap();
        import_file(&service, &csv_path, None).await.unwrap();

        let files = service.list(None, None).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name, "people.csv");
        show_file(&service, files[0].id, 1).await.unwrap();
    }
}
