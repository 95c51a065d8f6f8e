//! OneAgent entry point: wires the backbone, MCP transports, and the
//! agent/communication/NLACS layers into one process (spec §2 data flow).

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use oneagent::agent::AgentRegistry;
use oneagent::comms::CommunicationService;
use oneagent::config::Config;
use oneagent::events::EventBus;
use oneagent::monitoring::{install_prometheus_recorder, CombinedHealthProvider};
use oneagent::nlacs::NlacsLayer;

use oneagent_mcp::backbone::Backbone;
use oneagent_mcp::origin::{OriginValidator, OriginValidatorConfig};
use oneagent_mcp::protocol::{Engine, ProtocolError};
use oneagent_mcp::session::{CacheEventLog, CacheSessionStorage, SessionManager, SessionManagerConfig};
use oneagent_mcp::tools::{ToolDescriptor, ToolRegistry};
use oneagent_mcp::transport::{run_stdio, serve_http, HttpServerConfig, McpHealthProvider};

/// A minimal multi-agent orchestration server exposing MCP over HTTP+SSE
/// and stdio (spec §1).
#[derive(Parser, Debug)]
#[command(name = "oneagent", version, about)]
struct Cli {
    /// Emit debug-level logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the coordination substrate (transports, janitor, liveness sweep).
    Serve {
        /// Force the stdio transport regardless of `ONEAGENT_MCP_STDIO_ONLY`.
        #[arg(long)]
        stdio: bool,

        /// Force the HTTP+SSE transport regardless of `ONEAGENT_MCP_STDIO_ONLY`.
        #[arg(long, conflicts_with = "stdio")]
        http: bool,

        /// Override `ONEAGENT_MCP_PORT` for this run.
        #[arg(long)]
        port: Option<u16>,
    },
}

const SUBSCRIBER_QUEUE_BOUND: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false).compact();
    let filter_layer = tracing_subscriber::EnvFilter::from_default_env().add_directive(log_level.into());
    tracing_subscriber::registry().with(filter_layer).with(fmt_layer).init();

    let Commands::Serve { stdio, http, port } = cli.command;

    let mut config = Config::from_env();
    if stdio {
        config.mcp_stdio_only = true;
    } else if http {
        config.mcp_stdio_only = false;
    }
    if let Some(port) = port {
        config.mcp_port = port;
    }
    info!(?config, "loaded configuration");

    let backbone = Backbone::in_process();

    // C3/C4 — session store and manager.
    let storage = Arc::new(CacheSessionStorage::new(backbone.cache.clone()));
    let event_log = Arc::new(CacheEventLog::new(
        backbone.cache.clone(),
        backbone.clock.clone(),
        backbone.ids.clone(),
        config.max_events_per_session as usize,
    ));
    let sessions = Arc::new(SessionManager::new(
        backbone.clone(),
        storage,
        event_log,
        SessionManagerConfig {
            idle_timeout: config.session_idle_timeout(),
            event_log_ttl: config.event_log_ttl(),
            cleanup_interval: config.session_cleanup_interval(),
        },
    ));

    // C5 — tool registry, seeded with the one built-in diagnostic tool.
    let tools = Arc::new(ToolRegistry::new(backbone.clone()));
    register_builtin_tools(&tools, sessions.clone()).await?;

    // C6/C7 — protocol engine and transports.
    let engine = Arc::new(Engine::new(sessions.clone(), tools.clone()));
    let origin = Arc::new(OriginValidator::new(
        OriginValidatorConfig {
            allowed_patterns: config.allowed_origins.clone(),
            allow_localhost: config.allow_localhost,
            require_origin_header: config.require_origin_header,
            ..OriginValidatorConfig::default()
        },
        backbone.cache.clone(),
    ));

    // C8/C9/C10 — agent registry, communication bus, NLACS.
    let events = Arc::new(EventBus::new(SUBSCRIBER_QUEUE_BOUND));
    let agents = Arc::new(AgentRegistry::new(
        backbone.clone(),
        events.clone(),
        config.heartbeat_timeout(),
    ));
    let comms = Arc::new(CommunicationService::new(
        backbone.clone(),
        agents.clone(),
        events.clone(),
        SUBSCRIBER_QUEUE_BOUND,
    ));
    let _nlacs = Arc::new(NlacsLayer::new(backbone.clone(), comms.clone(), events.clone()));

    // C11 — monitoring, layered on top of the MCP-level health provider.
    let prometheus = install_prometheus_recorder()?;
    let mcp_health = Arc::new(McpHealthProvider {
        sessions: sessions.clone(),
        tools: tools.clone(),
        prometheus: prometheus.clone(),
    });
    let health = Arc::new(CombinedHealthProvider {
        mcp: mcp_health,
        agents: agents.clone(),
        prometheus,
    });

    // Background tasks: the janitor (spec §4.4) and agent liveness sweep
    // (spec §4.8) are the only components permitted to scan their stores.
    tokio::spawn(sessions.clone().run_janitor());
    tokio::spawn(agents.clone().run_liveness_task());

    if config.mcp_stdio_only {
        info!("starting stdio transport only (ONEAGENT_MCP_STDIO_ONLY=1)");
        run_stdio(engine, sessions).await?;
    } else {
        let http_config = HttpServerConfig {
            host: config.mcp_host.clone(),
            port: config.mcp_port,
        };
        let shutdown = async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        };
        serve_http(http_config, engine, origin, sessions, health, shutdown).await?;
    }

    Ok(())
}

/// Registers the one tool every OneAgent deployment carries out of the box:
/// a liveness/diagnostics probe callable over either transport (spec S1's
/// `tools/list` scenario expects it present).
async fn register_builtin_tools(
    tools: &ToolRegistry,
    sessions: Arc<SessionManager>,
) -> Result<(), ProtocolError> {
    let descriptor = ToolDescriptor {
        name: "system_health".to_string(),
        description: "Reports session manager counters and process liveness.".to_string(),
        input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        output_schema: None,
        category: "diagnostics".to_string(),
        priority: 0,
        registered_at: chrono::Utc::now(),
    };
    let handler = Arc::new(move |_args: serde_json::Value| {
        let sessions = sessions.clone();
        async move {
            let metrics = sessions.metrics().await.map_err(|e| ProtocolError::Internal(e.to_string()))?;
            Ok(serde_json::json!({
                "status": "ok",
                "active_sessions": metrics.active_sessions,
                "sessions_created_total": metrics.created_total,
            }))
        }
    });
    tools.register_all(vec![(descriptor, handler)]).await
}
