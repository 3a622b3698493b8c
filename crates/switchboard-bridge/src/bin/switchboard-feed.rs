//! Switchboard feed server
//!
//! Serves the configured scenario over WebSocket for dashboards to replay.

use switchboard_bridge::{BridgeConfig, FeedServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchboard=info,switchboard_bridge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BridgeConfig::from_env()?;
    let server = FeedServer::from_config(&config.dashboard, config.feed_speed)?;

    println!("Switchboard Feed");
    println!("================");
    println!();
    println!("Dashboards connect to ws://{}/ws", config.feed_addr);
    println!("Send {{\"action\":\"start_demo\"}} to start a replay.");
    println!();

    server.serve(config.feed_addr).await?;

    Ok(())
}
