use anyhow::Context;
use clap::Parser;
use neurocanvas_core::{CanvasConfig, LoggingConfig};
use neurocanvas_memory::{
    FusionCoordinator, FusionRequest, InMemoryStore, MemoryStore, RetentionPolicy, RetentionSweeper,
    SqliteMemoryStore,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "neurocanvas", author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "NEUROCANVAS_CONFIG", default_value = "neurocanvas.toml")]
    config: String,

    /// Memory database path, overrides memory.db_path
    #[arg(long)]
    db: Option<String>,

    /// Run without the memory system
    #[arg(long)]
    no_memory: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

/// One line of input.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Command {
    Fuse(FusionRequest),
    History {
        session_id: String,
        #[serde(default = "default_history_limit")]
        limit: usize,
        #[serde(default)]
        offset: usize,
    },
    Patterns {
        session_id: String,
    },
    Recommendations {
        session_id: String,
    },
    Recent {
        session_id: String,
    },
    EndSession {
        session_id: String,
    },
}

fn default_history_limit() -> usize {
    50
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let mut config = CanvasConfig::load_or_default(&args.config);
    if let Some(db) = args.db {
        config.memory.db_path = Some(db);
    }
    if args.no_memory {
        config.memory.enabled = false;
    }

    init_logging(&config.logging);

    let report = config.validate();
    for warning in &report.warnings {
        warn!("Config: {}", warning);
    }

    if args.check {
        for e in &report.errors {
            println!("error: {}", e);
        }
        for w in &report.warnings {
            println!("warning: {}", w);
        }
        if !report.is_valid() {
            anyhow::bail!("Invalid configuration ({} errors)", report.errors.len());
        }
        println!("Configuration OK ({} warnings)", report.warnings.len());
        return Ok(());
    }

    if !report.is_valid() {
        for e in &report.errors {
            error!("Config: {}", e);
        }
        anyhow::bail!("Invalid configuration: {}", report.errors.join("; "));
    }

    info!("Initializing NeuroCanvas...");
    let store = open_store(&config).await;
    let coordinator = Arc::new(FusionCoordinator::new(&config, store));

    let sweeper = if coordinator.memory_enabled() {
        RetentionSweeper::spawn(coordinator.clone(), config.memory.cleanup_interval())
    } else {
        None
    };

    info!("Ready, reading JSON lines from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let reply = handle_line(&coordinator, line).await;
        stdout.write_all(reply.to_string().as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    info!("Input closed, shutting down");
    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Pick the memory backend. A database that cannot be opened degrades to the
/// in-process store rather than refusing to start.
async fn open_store(config: &CanvasConfig) -> Option<Arc<dyn MemoryStore>> {
    if !config.memory.enabled {
        info!("Memory system disabled");
        return None;
    }

    let policy = RetentionPolicy::from_config(&config.memory);
    if let Some(path) = &config.memory.db_path {
        info!("Connecting to memory at {}...", path);
        match SqliteMemoryStore::new(path, policy.clone()).await {
            Ok(store) => return Some(Arc::new(store)),
            Err(e) => warn!("Failed to open memory database {}: {:#}, keeping memories in process", path, e),
        }
    }
    Some(Arc::new(InMemoryStore::new(policy)))
}

async fn handle_line(coordinator: &FusionCoordinator, line: &str) -> Value {
    let command: Command = match serde_json::from_str(line) {
        Ok(c) => c,
        Err(e) => return json!({ "error": format!("invalid request: {}", e) }),
    };

    match command {
        Command::Fuse(request) => match coordinator.process(request).await {
            Ok(response) => json!({ "ok": response }),
            Err(e) => json!({ "error": e.to_string() }),
        },
        Command::History { session_id, limit, offset } => {
            match coordinator.history(&session_id, limit, offset).await {
                Ok(records) => json!({ "ok": records }),
                Err(e) => json!({ "error": e.to_string() }),
            }
        }
        Command::Patterns { session_id } => match coordinator.patterns(&session_id).await {
            Ok(patterns) => json!({ "ok": patterns }),
            Err(e) => json!({ "error": e.to_string() }),
        },
        Command::Recommendations { session_id } => match coordinator.recommendations(&session_id).await {
            Ok(recs) => json!({ "ok": recs }),
            Err(e) => json!({ "error": e.to_string() }),
        },
        Command::Recent { session_id } => json!({ "ok": coordinator.recent_states(&session_id).await }),
        Command::EndSession { session_id } => json!({ "ok": coordinator.end_session(&session_id).await }),
    }
}
