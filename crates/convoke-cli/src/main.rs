//! convoke — conversational gateway core.
//!
//! Subcommands: `serve` runs the HTTP surface, `validate` checks a
//! configuration document and prints the typed summary, `chat` runs a
//! single message through the core, `ingest` chunks a document into the
//! configured knowledge base.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use convoke_orchestrator::{ChatOrchestrator, ChatRequest, CoreContext};
use convoke_web::{WebConfig, WebServer};

#[derive(Parser)]
#[command(name = "convoke", about = "Chat orchestration core", version)]
struct Cli {
    /// Path to the configuration document (TOML or JSON).
    #[arg(short, long, default_value = "convoke.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server.
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        #[arg(long, default_value_t = 8900)]
        port: u16,
    },
    /// Load and validate the configuration, then exit.
    Validate,
    /// Run one message through the core and print the response envelope.
    Chat {
        /// The message to send.
        message: Vec<String>,
        #[arg(long)]
        session: Option<String>,
    },
    /// Chunk a document and upsert it into the knowledge base.
    Ingest {
        /// Path to the document to ingest.
        file: PathBuf,
        /// Id prefix for the stored chunks; defaults to the file stem.
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = convoke_config::load_path(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    // RUST_LOG wins; the document's logging section is the fallback.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(config.logging.min_level.clone())
            }),
        )
        .with_ansi(config.logging.colorize)
        .init();

    match cli.command {
        Command::Validate => {
            println!(
                "{} v{} — {} provider(s), {} tool(s), {} agent(s), {} sequence(s), {} knowledge base(s)",
                config.system.name,
                config.system.version,
                config.providers.len(),
                config.tools.len(),
                config.agents.len(),
                config.tool_sequences.len(),
                config.knowledge_bases.len(),
            );
            Ok(())
        }

        Command::Serve { bind, port } => {
            // Hot reload swaps validated snapshots atomically; a snapshot is
            // picked up when the core is next (re)built.
            let _watcher = if config.system.hot_reload {
                let handle = convoke_config::ConfigHandle::new(config.clone());
                let watcher = convoke_config::watch(handle.clone(), &cli.config)?;
                let mut reloads = handle.subscribe();
                tokio::spawn(async move {
                    while let Ok(snapshot) = reloads.recv().await {
                        tracing::info!(
                            version = %snapshot.system.version,
                            "configuration reloaded; components pick it up on next build"
                        );
                    }
                });
                Some(watcher)
            } else {
                None
            };

            let core = CoreContext::builder(config).build()?;
            let orchestrator = ChatOrchestrator::new(core)?;

            let server = WebServer::new(
                WebConfig {
                    bind_addr: bind,
                    port,
                },
                orchestrator,
            );
            server
                .start()
                .await
                .map_err(|e| anyhow::anyhow!("server error: {e}"))
        }

        Command::Chat { message, session } => {
            let message = message.join(" ");
            let core = CoreContext::builder(config).build()?;
            let orchestrator = ChatOrchestrator::new(core.clone())?;

            let mut request = ChatRequest::new(message);
            if let Some(session) = session {
                request = request.with_session(session);
            }

            let response = orchestrator.handle(request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);

            core.shutdown().await;
            if response.ok { Ok(()) } else { std::process::exit(1) }
        }

        Command::Ingest { file, prefix } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let prefix = prefix.unwrap_or_else(|| {
                file.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "doc".into())
            });

            let core = CoreContext::builder(config).build()?;
            let retriever = core
                .retriever
                .as_ref()
                .context("no enabled knowledge base in the configuration")?;

            let written = retriever
                .ingest(&prefix, &file.display().to_string(), &text)
                .await?;
            println!("ingested {written} chunk(s) as `{prefix}-*`");
            Ok(())
        }
    }
}
