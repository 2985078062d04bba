//! CLI entrypoint and subcommand orchestration.

mod chat;
mod config;
#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::sync::Arc;

use agent::{AskRequest, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, GatewayManager, prompts};
use channels::GatewayServer;
use clap::{Parser, Subcommand};
use proto::DEFAULT_SESSION_ID;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::chat::ChatConsole;
use crate::config::{Config, app_dir};

/// Top-level command-line arguments.
#[derive(Parser)]
#[command(name = "llm-gateway")]
#[command(about = "Provider-agnostic LLM gateway", version)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable debug logging to ~/.llm-gateway/logs/debug.log
    #[arg(long, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API until Ctrl-C
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ask one question and print the result as JSON
    Ask {
        topic: String,
        #[arg(short, long)]
        provider: Option<String>,
        /// Prompt template; `{topic}` is replaced by the topic
        #[arg(short, long, default_value = prompts::DEFAULT_TEMPLATE)]
        template: String,
        #[arg(short, long, default_value = DEFAULT_SESSION_ID)]
        session: String,
        #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
        max_tokens: u32,
        #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
        temperature: f32,
    },

    /// Ask every available provider the same question
    QueryAll {
        topic: String,
        #[arg(short, long, default_value = prompts::DEFAULT_TEMPLATE)]
        template: String,
        #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
        max_tokens: u32,
        #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
        temperature: f32,
    },

    /// List catalog providers and whether they are ready
    Providers,

    /// Print the stored turns of one session
    History {
        #[arg(short, long)]
        provider: String,
        #[arg(short, long, default_value = DEFAULT_SESSION_ID)]
        session: String,
    },

    /// Clear session memory; with no filters everything is removed
    Reset {
        #[arg(short, long)]
        provider: Option<String>,
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Interactive console (default when no subcommand is given)
    Chat {
        #[arg(short, long)]
        provider: Option<String>,
        #[arg(short, long, default_value = DEFAULT_SESSION_ID)]
        session: String,
    },
}

impl Commands {
    fn label(&self) -> &'static str {
        match self {
            Commands::Serve { .. } => "serve",
            Commands::Ask { .. } => "ask",
            Commands::QueryAll { .. } => "query-all",
            Commands::Providers => "providers",
            Commands::History { .. } => "history",
            Commands::Reset { .. } => "reset",
            Commands::Chat { .. } => "chat",
        }
    }
}

#[tokio::main]
/// Program entrypoint.
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Chat {
        provider: None,
        session: DEFAULT_SESSION_ID.to_string(),
    });

    // Console logs go to stderr so JSON on stdout stays machine-readable.
    // --debug adds a daily-rotated file under ~/.llm-gateway/logs.
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    // WorkerGuard must outlive main() so buffered file writes are flushed on exit.
    let _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>;

    let debug_writer = if cli.debug {
        let log_dir = app_dir().join("logs");
        std::fs::create_dir_all(&log_dir).ok();
        let appender = tracing_appender::rolling::daily(&log_dir, "debug.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        _file_guard = Some(guard);
        Some(writer)
    } else {
        _file_guard = None;
        None
    };

    match debug_writer {
        Some(writer) => {
            let console = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_filter);
            let file = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .with_filter(EnvFilter::new("debug,hyper_util=info,reqwest=info,h2=info"));
            tracing_subscriber::registry()
                .with(console)
                .with(file)
                .init();
        }
        None => {
            fmt()
                .with_env_filter(console_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
    }

    if cli.debug {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            command = command.label(),
            log_level = %cli.log_level,
            "========== llm-gateway session start =========="
        );
    }

    let config = Config::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Failed to load config ({e}), using defaults");
        Config::default()
    });
    let manager = config.build_manager();

    match command {
        Commands::Serve { host, port } => cmd_serve(&config, manager, host, port).await,
        Commands::Ask {
            topic,
            provider,
            template,
            session,
            max_tokens,
            temperature,
        } => {
            let mut req = AskRequest::new(topic)
                .template(template)
                .session(session)
                .max_tokens(max_tokens)
                .temperature(temperature);
            if let Some(provider) = provider {
                req = req.provider(provider);
            }
            cmd_ask(&manager, req).await
        }
        Commands::QueryAll {
            topic,
            template,
            max_tokens,
            temperature,
        } => {
            let all = manager
                .query_all(&topic, &template, max_tokens, temperature)
                .await;
            println!("{}", serde_json::to_string_pretty(&all)?);
            Ok(())
        }
        Commands::Providers => {
            cmd_providers(&manager);
            Ok(())
        }
        Commands::History { provider, session } => {
            let view = manager.history(&provider, &session).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        Commands::Reset { provider, session } => {
            let outcome = manager.reset_memory(provider, session).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Commands::Chat { provider, session } => {
            let mut console = ChatConsole::new(&manager, provider, session);
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let mut stdout = tokio::io::stdout();
            console.run(stdin, &mut stdout).await?;
            Ok(())
        }
    }
}

async fn cmd_serve(
    config: &Config,
    manager: GatewayManager,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    if manager.available_providers().is_empty() {
        warn!("No provider credentials found; every query will fail until one is configured");
    }
    let server = GatewayServer::new(
        host,
        port,
        config.server.cors_origins.clone(),
        Arc::new(manager),
    );
    server.run().await?;
    info!("Server stopped");
    Ok(())
}

async fn cmd_ask(manager: &GatewayManager, req: AskRequest) -> anyhow::Result<()> {
    let result = manager.ask(req).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_providers(manager: &GatewayManager) {
    println!("framework: {}", manager.framework());
    for status in manager.provider_statuses() {
        let marker = if status.available { "*" } else { " " };
        println!(
            "{marker} {:<10} {:<18} {:<20} {}",
            status.name, status.display_name, status.model, status.status
        );
    }
}
