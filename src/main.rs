use anyhow::Result;
use clap::{Parser, Subcommand};
use metaraft::{create_join_router, create_raft_router, create_router, MetaDaemon, NodeConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "metaraft")]
#[command(about = "Raft-replicated metadata store node")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Run {
        #[arg(short, long, default_value = "metaraft.toml")]
        config: PathBuf,
    },
    Init {
        #[arg(short, long, default_value = "metaraft.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "metaraft=info,openraft=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config: config_path } => {
            run_daemon(config_path).await?;
        }
        Commands::Init { config: config_path } => {
            init_config(config_path)?;
        }
    }

    Ok(())
}

async fn run_daemon(config_path: PathBuf) -> Result<()> {
    let config = if config_path.exists() {
        info!("Loading config from {:?}", config_path);
        NodeConfig::load(&config_path)?
    } else {
        info!("Config file not found, using defaults");
        NodeConfig::default()
    };

    let daemon = Arc::new(MetaDaemon::new(config.clone()).await?);

    // Raft RPCs and joins must be served before bootstrapping starts:
    // peers may already be dialing us.
    let router = create_router(daemon.clone())
        .merge(create_raft_router(daemon.replicator().clone()))
        .merge(create_join_router(daemon.replicator().clone()));

    let listener = TcpListener::bind(&config.listen_addr()).await?;
    info!("Listening on {} (advertised as {})", config.listen_addr(), config.raft_addr());

    let api_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("API server error: {}", e);
        }
    });

    let daemon_clone = daemon.clone();
    let mut daemon_handle = tokio::spawn(async move { daemon_clone.run().await });

    let finished = tokio::select! {
        joined = &mut daemon_handle => Some(joined),
        _ = tokio::signal::ctrl_c() => None,
    };

    let result = match finished {
        Some(Ok(Ok(()))) => Ok(()),
        Some(Ok(Err(e))) => {
            error!("Daemon error: {:#}", e);
            Err(e)
        }
        Some(Err(e)) => Err(e.into()),
        None => {
            info!("Shutting down...");
            daemon.shutdown();
            let _ = tokio::time::timeout(std::time::Duration::from_secs(5), daemon_handle).await;
            Ok(())
        }
    };

    api_handle.abort();
    if let Err(e) = daemon.replicator().raft().shutdown().await {
        error!("Raft shutdown error: {}", e);
    }

    result
}

fn init_config(config_path: PathBuf) -> Result<()> {
    if config_path.exists() {
        anyhow::bail!("Config file already exists: {:?}", config_path);
    }

    let config = NodeConfig::default();
    config.save(&config_path)?;
    println!("Created config file: {:?}", config_path);
    println!("\nEdit the config file to:");
    println!("  - Set a unique, stable node_id");
    println!("  - Leave peers empty on the node that founds the cluster");
    println!("  - List peers to join through on every other node");

    Ok(())
}
