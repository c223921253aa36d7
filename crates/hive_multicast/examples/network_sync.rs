//! Two-window ball sync over the LAN.
//!
//! Run one copy per terminal (or per machine) with the same partition key:
//!
//! ```text
//! cargo run -p hive_multicast --example network_sync -- 7
//! ```
//!
//! Each instance greets the group, then moves its own ball around a circle
//! and logs every remote ball it learns about.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use hive_multicast::{
    BallUpdate, EntityId, MulticastConfig, MulticastNode, NetworkEventHandler, Rgb,
};
use parking_lot::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Remote balls by id, ignoring our own echo.
struct BallBoard {
    own: EntityId,
    remote: Mutex<HashMap<EntityId, BallUpdate>>,
}

impl NetworkEventHandler for BallBoard {
    fn on_text(&self, text: &str) -> Result<()> {
        info!("Message: {text}");
        Ok(())
    }

    fn on_ball_update(&self, ball: &BallUpdate) -> Result<()> {
        if ball.id == self.own {
            return Ok(());
        }
        let mut remote = self.remote.lock();
        if remote.insert(ball.id, *ball).is_none() {
            info!("New remote ball {} ({} known)", ball.id, remote.len());
        }
        Ok(())
    }
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hive_multicast=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let mut config = MulticastConfig::load_or_default(Path::new("network_sync.json"));
    if let Some(key) = std::env::args().nth(1) {
        config.partition_key = key.parse()?;
    }

    let mut node = MulticastNode::new(config);
    let board = Arc::new(BallBoard {
        own: EntityId::generate(),
        remote: Mutex::new(HashMap::new()),
    });
    node.subscribe(board.clone());

    node.start().await?;
    node.send_text_message(&format!("Hello from {}", node.network_id()))
        .await?;

    let color = Rgb::new(0.9, 0.3, 0.1);
    let mut ticker = tokio::time::interval(Duration::from_millis(50));
    let mut angle: f64 = 0.0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                angle += 0.05;
                let (x, y) = (200.0 + 100.0 * angle.cos(), 200.0 + 100.0 * angle.sin());
                if let Err(e) = node.send_ball_update(board.own, x, y, 20.0, color).await {
                    warn!("Ball update not sent: {e}");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Stats: {}", serde_json::to_string(&node.stats())?);
    node.stop().await;
    Ok(())
}
