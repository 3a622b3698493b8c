//! Switchboard headless dashboard
//!
//! Connects to a feed and logs what the dashboard shows. Type `play`,
//! `reset` or `quit` on stdin.

use switchboard_bridge::{link, log_activity, BridgeConfig, Runtime, UserCommand};
use switchboard_vis::Dashboard;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchboard=info,switchboard_bridge=info,switchboard_vis=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BridgeConfig::from_env()?;
    tracing::info!(feed = %config.feed_url, "Starting dashboard");

    let dashboard = Dashboard::new(config.dashboard.clone());
    let _activity = log_activity(&dashboard);

    let (handle, events, _link) = link::spawn(config.link());
    let runtime = Runtime::new(dashboard, handle, events);

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<UserCommand>() {
                Ok(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Try play, reset or quit"),
            }
        }
    });

    let dashboard = runtime.run(rx).await;
    let session = dashboard.session();
    let session = session.read();
    tracing::info!(
        phase = ?session.phase(),
        messages = session.message_count(),
        "Dashboard closed"
    );

    Ok(())
}
