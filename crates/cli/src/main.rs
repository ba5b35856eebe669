mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use fleet::{CliFleetConnector, FleetSettings, NodePoolInfo};
use poolshift_core::MigrationRequest;
use serde_json::Value;
use server::config::ServiceConfig;
use server::{create_router, state::AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

#[derive(Parser)]
#[command(name = "poolshift")]
#[command(about = "Sequenced node pool migrations for AKS clusters", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sequencing API server
    Serve {
        /// Config file, defaults to ~/.poolshift/config.toml
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Start a migration described by a JSON request file
    Submit {
        file: PathBuf,

        #[arg(long, default_value = DEFAULT_SERVER_URL)]
        server: String,

        /// Follow progress until the run ends
        #[arg(short, long)]
        watch: bool,
    },
    /// Follow the progress of a running migration
    Watch {
        session_id: String,

        #[arg(long, default_value = DEFAULT_SERVER_URL)]
        server: String,
    },
    /// List the node pools of a cluster
    Pools {
        #[arg(long)]
        cluster: String,

        #[arg(long, default_value = DEFAULT_SERVER_URL)]
        server: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, host, port } => serve(config.as_deref(), host, port).await,
        Commands::Submit {
            file,
            server,
            watch,
        } => submit(&server, &file, watch).await,
        Commands::Watch { session_id, server } => {
            let client = reqwest::Client::new();
            watch::follow(&client, base_url(&server), &session_id).await
        }
        Commands::Pools { cluster, server } => pools(&server, &cluster).await,
    }
}

async fn serve(config_path: Option<&Path>, host: Option<String>, port: Option<u16>) -> Result<()> {
    init_tracing();

    let mut config = ServiceConfig::load_or_default(config_path)
        .await
        .context("Failed to load config")?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    check_prerequisites(&config.fleet);

    let connector = Arc::new(CliFleetConnector::new(config.fleet.clone()));
    let state = AppState::new(connector, config.orchestrator_config());
    let orchestrator = state.orchestrator.clone();
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    println!();
    println!("Poolshift");
    println!("════════════════════════════════════════");
    println!();
    println!("  API Server:  http://{}", addr);
    println!("  Swagger UI:  http://{}/swagger-ui", addr);
    println!(
        "  Ready wait:  {}s",
        config.orchestrator_config().ready_wait.as_secs()
    );
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    // Runs are cancelled before connections drain, so open progress streams
    // receive their final event and close.
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        tracing::info!("Shutdown requested");
        orchestrator.shutdown().await;
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn check_prerequisites(settings: &FleetSettings) {
    for binary in [&settings.az_binary, &settings.kubectl_binary] {
        match which::which(binary) {
            Ok(path) => tracing::debug!(binary = %binary, path = %path.display(), "Found CLI"),
            Err(_) => tracing::warn!(
                binary = %binary,
                "CLI not found on PATH, migrations against real clusters will fail"
            ),
        }
    }
}

async fn submit(server_url: &str, file: &Path, follow: bool) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let request: MigrationRequest = serde_json::from_str(&content)
        .with_context(|| format!("Invalid migration request in {}", file.display()))?;
    request
        .clone()
        .validate()
        .context("Migration request rejected")?;

    let base = base_url(server_url);
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/v1/nodepools/sequence/execute", base))
        .json(&request)
        .send()
        .await
        .with_context(|| format!("Failed to reach poolshift server at {}", base))?;

    let status = response.status();
    let body: Value = response
        .json()
        .await
        .context("Invalid response from server")?;
    if !status.is_success() {
        bail!(api_error(status, &body));
    }

    let data = &body["data"];
    let session_id = data["session_id"]
        .as_str()
        .context("Server response has no session_id")?;

    println!(
        "{} {} → {} on {}",
        style("Started").green().bold(),
        style(data["origin"].as_str().unwrap_or("?")).bold(),
        style(data["dest"].as_str().unwrap_or("?")).bold(),
        data["cluster"].as_str().unwrap_or("?"),
    );
    println!("  Session: {}", session_id);

    if follow {
        println!();
        watch::follow(&client, base, session_id).await
    } else {
        println!();
        println!("Follow with: poolshift watch {}", session_id);
        Ok(())
    }
}

async fn pools(server_url: &str, cluster: &str) -> Result<()> {
    let base = base_url(server_url);
    let response = reqwest::Client::new()
        .get(format!("{}/api/v1/nodepools", base))
        .query(&[("cluster", cluster)])
        .send()
        .await
        .with_context(|| format!("Failed to reach poolshift server at {}", base))?;

    let status = response.status();
    let body: Value = response
        .json()
        .await
        .context("Invalid response from server")?;
    if !status.is_success() {
        bail!(api_error(status, &body));
    }

    let pools: Vec<NodePoolInfo> =
        serde_json::from_value(body["data"].clone()).context("Unexpected node pool listing")?;

    if pools.is_empty() {
        println!("No node pools in {}.", cluster);
        return Ok(());
    }

    println!();
    println!("Node pools in {} ({}):", style(cluster).bold(), pools.len());
    for pool in &pools {
        let capacity = if pool.autoscaling_enabled {
            format!("{} nodes, autoscaling {}..{}", pool.node_count, pool.min_node_count, pool.max_node_count)
        } else {
            format!("{} nodes", pool.node_count)
        };
        let marker = if pool.is_system_pool { " [system]" } else { "" };
        println!(
            "  {:<20} {:<18} {:<32} {}{}",
            style(&pool.name).bold(),
            pool.vm_size,
            capacity,
            pool.status,
            style(marker).dim(),
        );
    }
    println!();

    Ok(())
}

fn base_url(server_url: &str) -> &str {
    server_url.trim_end_matches('/')
}

/// Format the `{success:false,error:{code,message}}` body of a failed call.
fn api_error(status: reqwest::StatusCode, body: &Value) -> String {
    match (
        body["error"]["code"].as_str(),
        body["error"]["message"].as_str(),
    ) {
        (Some(code), Some(message)) => format!("{} ({}): {}", code, status, message),
        _ => format!("Server returned {}", status),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "poolshift=info,server=info,orchestrator=info,fleet=info,events=info,tower_http=info"
                    .into()
            }),
        )
        .init();
}
