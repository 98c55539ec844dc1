use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use starling::api;
use starling::cli;
use starling::node::{TracingObserver, UdpNode};
use starling::settings::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args and env vars
    let args = cli::Cli::parse();
    let settings = args.into_settings();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "starling=debug,tower_http=debug".into());
    match settings.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }

    let node = UdpNode::bind(&settings, Arc::new(TracingObserver)).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Status API, unless disabled
    if let Some(api_address) = settings.api_socket_addr()? {
        let server = api::serve(api_address, node.views.clone(), shutdown_rx.clone())?;
        info!("Starting Starling status API on {}", api_address);
        tokio::spawn(async move {
            if let Err(e) = server.await {
                error!("{}", e);
            }
        });
    }

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received ctrl-c, leaving the group"),
            Err(e) => {
                error!("Unable to listen for ctrl-c: {}", e);
                // Keep the sender alive so the node runs until killed
                std::future::pending::<()>().await;
            }
        }
        let _ = shutdown_tx.send(true);
    });

    info!("Starting Starling node {}", node.identity);
    let last_view = node.driver.run(shutdown_rx).await?;
    info!(
        "Node {} stopped at tick {} with {} live members",
        last_view.node,
        last_view.tick,
        last_view.live_members()
    );
    Ok(())
}
