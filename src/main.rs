//! mcp-assistant CLI

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Layer, Registry};

use mcp_assistant::agent::AgentLoop;
use mcp_assistant::config::Config;
use mcp_assistant::server;
use mcp_assistant::tools::{EndpointError, HttpToolEndpoint, ToolRegistry};

#[derive(Parser, Debug)]
#[command(name = "mcp-assistant", version)]
#[command(about = "Ask questions about your files, drive and email through an LLM")]
struct Cli {
    /// Config file (defaults to ~/.mcp-assistant/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API (POST /api/ask)
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Ask a single question and print the answer
    Ask {
        /// The question
        message: Vec<String>,
        /// Session to use
        #[arg(long, default_value = "cli")]
        session: String,
    },
    /// Interactive chat on one session
    Chat {
        #[arg(long, default_value = "cli")]
        session: String,
    },
    /// List the tools advertised to the model
    Tools {
        /// Print the chat-completions function definitions as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check that the tool server is reachable and serves every tool
    Check,
}

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Install the subscriber before anything else runs, at `info` unless
/// `RUST_LOG` says otherwise.
///
/// Returns a handle for applying the configured level once the config is
/// loaded, or `None` when `RUST_LOG` decides the filter.
fn init_logging(format: LogFormat) -> Option<FilterHandle> {
    let from_env = EnvFilter::try_from_default_env().ok();
    let pinned = from_env.is_some();
    let (filter, handle) = reload::Layer::new(from_env.unwrap_or_else(|| EnvFilter::new("info")));

    let output = match format {
        LogFormat::Text => fmt::layer().with_writer(std::io::stderr).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    };
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init();

    (!pinned).then_some(handle)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = init_logging(cli.log_format);

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    if let Some(filter) = filter {
        if let Err(e) = filter.reload(EnvFilter::new(&config.log.level)) {
            warn!("Failed to apply log level '{}': {}", config.log.level, e);
        }
    }

    match cli.command {
        Commands::Serve { bind } => cmd_serve(&config, bind).await,
        Commands::Ask { message, session } => cmd_ask(&config, &session, &message.join(" ")).await,
        Commands::Chat { session } => cmd_chat(&config, &session).await,
        Commands::Tools { json } => cmd_tools(json),
        Commands::Check => cmd_check(&config).await,
    }
}

fn build_agent(config: &Config) -> Result<Arc<AgentLoop>> {
    let agent = AgentLoop::from_config(config).context("Failed to initialize assistant")?;
    info!(
        model = %config.provider.model,
        tool_endpoint = %config.tools.endpoint,
        max_round_trips = agent.max_round_trips(),
        "Assistant ready"
    );
    Ok(Arc::new(agent))
}

/// Cancel `token` on the first Ctrl+C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}

async fn cmd_serve(config: &Config, bind: Option<String>) -> Result<()> {
    let agent = build_agent(config)?;
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());

    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    server::serve(agent, &bind, shutdown)
        .await
        .with_context(|| format!("API server on {} failed", bind))
}

async fn cmd_ask(config: &Config, session: &str, message: &str) -> Result<()> {
    let agent = build_agent(config)?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let answer = agent.ask_with_cancel(session, message, &cancel).await?;
    println!("{}", answer);
    Ok(())
}

fn save_history(rl: &mut Editor<(), DefaultHistory>, path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("Failed to create history directory: {}", e);
        }
    }
    if let Err(e) = rl.save_history(path) {
        warn!("Failed to save history: {}", e);
    }
}

async fn cmd_chat(config: &Config, session: &str) -> Result<()> {
    let agent = build_agent(config)?;

    let mut rl: Editor<(), DefaultHistory> = Editor::new().context("Failed to create editor")?;
    let history_path = Config::dir().join("history.txt");
    if let Err(e) = rl.load_history(&history_path) {
        let is_not_found =
            matches!(&e, ReadlineError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound);
        if !is_not_found {
            warn!("Failed to load history: {}", e);
        }
    }

    println!("mcp-assistant v{}", env!("CARGO_PKG_VERSION"));
    println!("Type /quit to exit. Ctrl+C cancels a running request.");

    loop {
        let line = tokio::task::block_in_place(|| rl.readline("you> "));
        match line {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "/quit" || line == "/exit" {
                    break;
                }
                if let Err(e) = rl.add_history_entry(line) {
                    warn!("Failed to add history entry: {}", e);
                }

                let cancel = CancellationToken::new();
                let answer = tokio::select! {
                    answer = agent.ask_with_cancel(session, line, &cancel) => answer,
                    _ = tokio::signal::ctrl_c() => {
                        cancel.cancel();
                        println!("^C");
                        continue;
                    }
                };
                match answer {
                    Ok(answer) => println!("assistant> {}\n", answer),
                    Err(e) => eprintln!("Error: {}\n", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {}", err);
                break;
            }
        }
    }

    save_history(&mut rl, &history_path);
    Ok(())
}

fn cmd_tools(json: bool) -> Result<()> {
    let registry = ToolRegistry::builtin()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&registry.definitions())?);
        return Ok(());
    }

    for tool in registry.list() {
        let params: Vec<String> = tool
            .parameters
            .params()
            .iter()
            .map(|p| {
                if p.required {
                    p.name.clone()
                } else {
                    format!("{}?", p.name)
                }
            })
            .collect();
        println!("{}({})", tool.name, params.join(", "));
        println!("    {}", tool.description);
    }
    Ok(())
}

async fn cmd_check(config: &Config) -> Result<()> {
    let registry = ToolRegistry::builtin()?;
    let endpoint = HttpToolEndpoint::new(&config.tools.endpoint);

    let served = match endpoint.fetch_schema(config.tool_timeout()).await {
        Ok(names) => names,
        Err(EndpointError::Unreachable(reason)) => bail!(
            "Tool server at {} is not reachable ({}). Is {} running?",
            config.tools.endpoint,
            reason,
            config.tools.dependency_hint
        ),
        Err(e) => bail!("Tool server at {} answered badly: {}", config.tools.endpoint, e),
    };

    let missing: Vec<&str> = registry
        .names()
        .into_iter()
        .filter(|name| !served.iter().any(|s| s == name))
        .collect();

    println!(
        "Tool server at {} serves {} tool(s)",
        config.tools.endpoint,
        served.len()
    );
    if missing.is_empty() {
        println!("All {} catalog tools are available", registry.len());
        Ok(())
    } else {
        bail!("Tool server is missing: {}", missing.join(", "))
    }
}
