mod config;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use config::{ToolDockConfig, TransportKind};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tooldock_client::{ClientProxy, LlmFormat, ToolDiscovery};
use tooldock_registry::Registry;
use tooldock_server::{serve_stdio, Dispatcher, HttpServer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tooldock", version, about = "Serve and call LLM tools over stdio or HTTP")]
struct Cli {
    /// Path to config file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the configured bundles
    Serve {
        /// Transport to serve on (overrides config)
        #[arg(long, value_enum)]
        transport: Option<TransportKind>,
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
        /// Bundle to register; repeat for several (overrides config)
        #[arg(long = "bundle")]
        bundles: Vec<String>,
    },
    /// List the tools of every configured server
    Tools {
        #[arg(long, value_enum, default_value_t = ToolFormat::Plain)]
        format: ToolFormat,
        /// Only show tools mentioning one of these keywords
        #[arg(long = "filter")]
        keywords: Vec<String>,
    },
    /// Call a tool
    Call {
        name: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Read a resource
    Read { uri: String },
    /// Render a prompt
    Prompt {
        name: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Run the tool calls in an LLM chat reply and print the tool results
    Respond {
        /// API the reply comes from
        #[arg(long, value_enum)]
        format: ApiFormat,
        /// File holding the reply JSON (stdin when omitted)
        reply: Option<PathBuf>,
    },
    /// Health-check every configured server and print their status
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum ToolFormat {
    Plain,
    Openai,
    Anthropic,
}

#[derive(Clone, Copy, ValueEnum)]
enum ApiFormat {
    Openai,
    Anthropic,
}

impl From<ApiFormat> for LlmFormat {
    fn from(format: ApiFormat) -> Self {
        match format {
            ApiFormat::Openai => LlmFormat::OpenAi,
            ApiFormat::Anthropic => LlmFormat::Anthropic,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Stdout carries protocol frames when serving over stdio.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve {
            transport,
            host,
            port,
            bundles,
        } => {
            if let Some(transport) = transport {
                config.server.transport = transport;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if !bundles.is_empty() {
                config.server.bundles = bundles;
            }
            serve(&config).await
        }
        Commands::Tools { format, keywords } => {
            let proxy = connect(&config).await?;
            let keywords: Vec<&str> = keywords.iter().map(String::as_str).collect();
            let tools = ToolDiscovery::filter_by_keywords(&proxy.tools().await, &keywords);
            match format {
                ToolFormat::Plain => {
                    if tools.is_empty() {
                        println!("No tools found.");
                    }
                    for tool in &tools {
                        println!("{}: {}", tool.name, tool.description);
                    }
                }
                ToolFormat::Openai => print_json(&Value::Array(LlmFormat::OpenAi.tools(&tools)))?,
                ToolFormat::Anthropic => {
                    print_json(&Value::Array(LlmFormat::Anthropic.tools(&tools)))?;
                }
            }
            proxy.close().await;
            Ok(())
        }
        Commands::Call { name, args } => {
            let arguments = parse_args(&args)?;
            let proxy = connect(&config).await?;
            let result = proxy.call_tool(&name, arguments).await;
            proxy.close().await;
            print_value(&result.map_err(|e| anyhow::anyhow!("{}", e.to_payload()))?)
        }
        Commands::Read { uri } => {
            let proxy = connect(&config).await?;
            let result = proxy.read_resource(&uri).await;
            proxy.close().await;
            print_value(&result.map_err(|e| anyhow::anyhow!("{}", e.to_payload()))?)
        }
        Commands::Prompt { name, args } => {
            let arguments = parse_args(&args)?;
            let proxy = connect(&config).await?;
            let result = proxy.get_prompt(&name, arguments).await;
            proxy.close().await;
            println!("{}", result.map_err(|e| anyhow::anyhow!("{}", e.to_payload()))?);
            Ok(())
        }
        Commands::Respond { format, reply } => {
            let reply = read_reply(reply.as_deref())?;
            let proxy = connect(&config).await?;
            let results = proxy.respond(format.into(), &reply).await;
            proxy.close().await;
            print_json(&Value::Array(results))
        }
        Commands::Status => {
            let proxy = connect(&config).await?;
            for server in proxy.server_names().await {
                if let Err(e) = proxy.health_check(&server).await {
                    warn!(server = %server, error = %e, "Health check failed");
                }
            }
            let snapshot = proxy.to_json().await;
            proxy.close().await;
            print_json(&snapshot)
        }
    }
}

async fn serve(config: &ToolDockConfig) -> anyhow::Result<()> {
    let server = &config.server;
    let mut registry = Registry::new();
    tooldock_builtins::register_bundles(&mut registry, &server.bundles, &server.bundle_options())?;
    info!(
        tools = registry.tool_count(),
        resources = registry.resource_count(),
        prompts = registry.prompt_count(),
        "Registry ready"
    );
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry), server.name.clone()));

    match server.transport {
        TransportKind::Stdio => {
            serve_stdio(
                dispatcher,
                tokio::io::stdin(),
                tokio::io::stdout(),
                server.mode,
                server.max_in_flight,
            )
            .await?;
        }
        TransportKind::Http => {
            HttpServer::serve(dispatcher, &server.addr(), &server.path, server.max_in_flight)
                .await?;
        }
    }
    Ok(())
}

async fn connect(config: &ToolDockConfig) -> anyhow::Result<ClientProxy> {
    if config.servers.is_empty() {
        anyhow::bail!("No servers configured; add [[servers]] entries to the config file");
    }
    let proxy = ClientProxy::new(config.client.clone());
    if let Err(e) = proxy.connect_all(&config.servers).await {
        proxy.close().await;
        return Err(e.into());
    }
    Ok(proxy)
}

fn parse_args(raw: &str) -> anyhow::Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(raw).context("--args is not valid JSON")?;
    match value {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("--args must be a JSON object, got {other}"),
    }
}

fn read_reply(path: Option<&Path>) -> anyhow::Result<Value> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read reply file '{}'", path.display()))?,
        None => std::io::read_to_string(std::io::stdin()).context("Failed to read reply from stdin")?,
    };
    serde_json::from_str(&raw).context("Reply is not valid JSON")
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Strings are printed raw, everything else as pretty JSON.
fn print_value(value: &Value) -> anyhow::Result<()> {
    match value {
        Value::String(text) => {
            println!("{text}");
            Ok(())
        }
        other => print_json(other),
    }
}
