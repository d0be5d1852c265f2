//! taskq CLI - Command-line access to queues on a Redis-compatible server

mod settings;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use colored::Colorize;
use settings::Settings;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};
use taskq_core::application::{shutdown_channel, ConsumerConfig, DrainPolicy};
use taskq_core::port::{HandlerError, ItemHandler};
use taskq_core::{Consumer, Item, Queue};
use taskq_infra_resp::{connect_queue, ConnectionConfig};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "taskq")]
#[command(about = "Distributed FIFO task queue CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server URL (redis://[user[:password]@]host[:port][/db])
    #[arg(long, env = "TASKQ_URL", global = true)]
    url: Option<String>,

    /// Settings file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Append items to the tail of a queue
    Put {
        key: String,

        #[arg(required = true)]
        items: Vec<String>,
    },

    /// Remove and print the head item
    Get {
        key: String,

        /// Wait for an item if the queue is empty
        #[arg(short, long)]
        block: bool,

        /// Give up waiting after this many seconds (with --block)
        #[arg(short, long)]
        timeout: Option<f64>,
    },

    /// Show the length of one or more queues
    Size {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Delete a queue and everything in it
    Clear { key: String },

    /// Print items as they arrive until Ctrl+C
    Consume {
        key: String,

        /// Seconds per blocking get
        #[arg(long, default_value = "1")]
        poll_timeout: f64,

        /// Stop once a poll comes back empty
        #[arg(long)]
        drain: bool,
    },
}

#[derive(Tabled)]
struct SizeRow {
    key: String,
    size: u64,
}

/// Writes each consumed item to stdout
struct PrintHandler;

#[async_trait]
impl ItemHandler for PrintHandler {
    async fn handle(&self, item: Item) -> Result<(), HandlerError> {
        println!("{}", render(&item));
        Ok(())
    }
}

fn render(item: &Item) -> String {
    match item.as_str() {
        Ok(text) => text.to_string(),
        Err(_) => format!("{:?}", item),
    }
}

fn seconds(value: f64, flag: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("--{} must be a non-negative number of seconds", flag))
}

fn init_logging(format: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("taskq=info"))
        .context("Failed to create env filter")?;

    // stdout carries queue items
    match format {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .init(),
    }
    Ok(())
}

async fn open(key: &str, config: &ConnectionConfig) -> Result<Queue> {
    connect_queue(key, config)
        .await
        .with_context(|| format!("Failed to open queue '{}' at {}", key, config.address()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(url) = cli.url {
        settings.url = url;
    }
    init_logging(&settings.log_format)?;
    let config = settings.connection_config()?;

    match cli.command {
        Commands::Put { key, items } => {
            let queue = open(&key, &config).await?;
            for item in &items {
                queue.put(item.as_str()).await?;
            }
            println!(
                "{}",
                format!("✓ {} item(s) enqueued on '{}'", items.len(), key)
                    .green()
                    .bold()
            );
        }

        Commands::Get {
            key,
            block,
            timeout,
        } => {
            let timeout = timeout.map(|t| seconds(t, "timeout")).transpose()?;
            let queue = open(&key, &config).await?;
            match queue.get(block, timeout).await? {
                Some(item) => println!("{}", render(&item)),
                None => eprintln!("{}", format!("Queue '{}' is empty", key).yellow()),
            }
        }

        Commands::Size { keys } => {
            let mut rows = Vec::with_capacity(keys.len());
            for key in keys {
                let size = open(&key, &config).await?.size().await?;
                rows.push(SizeRow { key, size });
            }
            println!("{}", Table::new(rows));
        }

        Commands::Clear { key } => {
            let queue = open(&key, &config).await?;
            if queue.clear().await? {
                println!("{}", format!("✓ Queue '{}' cleared", key).green().bold());
            } else {
                println!("{}", format!("Queue '{}' did not exist", key).yellow());
            }
        }

        Commands::Consume {
            key,
            poll_timeout,
            drain,
        } => {
            let consumer_config = ConsumerConfig {
                poll_timeout: Some(seconds(poll_timeout, "poll-timeout")?),
                drain_policy: if drain {
                    DrainPolicy::StopWhenIdle
                } else {
                    DrainPolicy::WaitForWork
                },
                ..Default::default()
            };
            let consumer = Consumer::with_config(
                open(&key, &config).await?,
                Arc::new(PrintHandler),
                consumer_config,
            );

            let (shutdown_tx, shutdown_rx) = shutdown_channel();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown signal received");
                }
                shutdown_tx.shutdown();
            });

            let stats = consumer.run(shutdown_rx).await;
            eprintln!(
                "{} {} processed, {} failed, {} store errors",
                "Consumer stopped:".bold(),
                stats.processed,
                stats.failed,
                stats.store_errors
            );
        }
    }

    Ok(())
}
