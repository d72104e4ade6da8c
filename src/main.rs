use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use matterbridge::config::{ServerConfig, Settings, StoreConfig};
use matterbridge::server::{ServerState, start_server};
use matterbridge::{MatterStore, seed};

#[derive(Debug, Parser)]
#[command(
    name = "matterbridge",
    version,
    about = "Load a legal-matter CSV export and answer select queries with an object-query response envelope"
)]
struct Cli {
    /// TOML settings file.
    #[arg(long, global = true, env = "MATTERS_CONFIG")]
    config: Option<PathBuf>,

    /// CSV export to load (overrides MATTERS_SOURCE_PATH).
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// SQLite database file (overrides MATTERS_DB_PATH).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write the sample matters CSV to the source path.
    Seed {
        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Load the source into the database and print the summary.
    Load,
    /// Execute query text and print the response envelope.
    Query {
        text: String,
        /// Query the database as-is instead of reloading the source first.
        #[arg(long)]
        no_reload: bool,
        /// Print the envelope on a single line.
        #[arg(long)]
        compact: bool,
    },
    /// Print one stored matter by id.
    Show { id: String },
    /// Serve the HTTP query endpoint until interrupted.
    Serve {
        /// Listen address (overrides MATTERS_BIND).
        #[arg(long)]
        bind: Option<SocketAddr>,
        /// Serve the database as-is instead of loading the source on start.
        #[arg(long)]
        no_reload: bool,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("matterbridge=info,tower_http=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json<T: serde::Serialize>(value: &T, compact: bool) -> anyhow::Result<()> {
    let text = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{text}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    let config = StoreConfig::resolve(&settings)
        .and_then(|config| config.with_overrides(cli.source.clone(), cli.db.clone()))
        .context("resolving store configuration")?;

    match cli.command {
        Command::Seed { force } => {
            let written = seed::write_sample_csv(&config.source_path, force).await?;
            if written {
                println!("Wrote sample matters to {}", config.source_path.display());
            } else {
                println!(
                    "{} already exists; pass --force to replace it",
                    config.source_path.display()
                );
            }
        }
        Command::Load => {
            let mut store = MatterStore::from_config(&config).await?;
            let summary = store
                .load_configured(&config)
                .await
                .with_context(|| format!("loading {}", config.source_path.display()))?;
            print_json(&summary, false)?;
            store.close();
        }
        Command::Query {
            text,
            no_reload,
            compact,
        } => {
            let mut store = MatterStore::from_config(&config).await?;
            if !no_reload {
                store
                    .load_configured(&config)
                    .await
                    .with_context(|| format!("loading {}", config.source_path.display()))?;
            }
            let envelope = store.execute(&text).await?;
            print_json(&envelope, compact)?;
            store.close();
        }
        Command::Show { id } => {
            let mut store = MatterStore::from_config(&config).await?;
            match store.get(&id).await? {
                Some(record) => print_json(&record, false)?,
                None => anyhow::bail!("no matter with id '{id}'"),
            }
            store.close();
        }
        Command::Serve { bind, no_reload } => {
            let server = ServerConfig::resolve(&settings).context("resolving server configuration")?;
            let addr = bind.unwrap_or(server.bind);

            let mut store = MatterStore::from_config(&config).await?;
            if !no_reload {
                store
                    .load_configured(&config)
                    .await
                    .with_context(|| format!("loading {}", config.source_path.display()))?;
            }

            let state = ServerState::new(store, config);
            let handle = start_server(addr, std::sync::Arc::clone(&state))
                .await
                .with_context(|| format!("binding {addr}"))?;
            println!("Listening on http://{}", handle.addr);

            tokio::signal::ctrl_c()
                .await
                .context("waiting for shutdown signal")?;
            handle.shutdown().await;
            state.store.write().await.close();
        }
    }

    Ok(())
}
