// MIT License

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rumqttc::{Event, Packet};
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use texecom2mqtt::cache;
use texecom2mqtt::config::Config;
use texecom2mqtt::homeassistant;
use texecom2mqtt::mqtt::MqttBridge;
use texecom2mqtt::panel::{BridgeEvent, Panel};

#[derive(Parser)]
#[command(name = "texecom2mqtt")]
#[command(about = "Bridge between a Texecom Premier alarm panel and MQTT")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config).context("Failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Panel
    let panel = Arc::new(Panel::new(config.texecom.clone()));
    if config.cache
        && let Some(data) = cache::load()
    {
        panel.seed_cache(data);
    }

    panel.connect().await.context("Failed to connect to panel")?;
    if let Err(e) = panel.login().await {
        panel.disconnect().await;
        return Err(e).context("Failed to log in to panel");
    }

    // MQTT
    let (bridge, mut event_loop) = MqttBridge::connect(&config);
    let bridge = Arc::new(bridge);

    // Subscribe before start() so the initial Online event is not missed.
    let mut panel_rx = panel.subscribe();

    if let Err(e) = panel.start().await {
        panel.disconnect().await;
        return Err(e).context("Failed to start panel operations");
    }

    if config.cache
        && let Err(e) = cache::save(&panel.cacheable_data())
    {
        warn!("Failed to save cache: {}", e);
    }

    // Task 1: panel events -> MQTT
    let panel_events = Arc::clone(&panel);
    let bridge_events = Arc::clone(&bridge);
    let cache_enabled = config.cache;
    let event_task = tokio::spawn(async move {
        loop {
            match panel_rx.recv().await {
                Ok(BridgeEvent::Online) => {
                    info!("Panel online, publishing snapshot");
                    bridge_events.publish_status(true).await;
                    bridge_events.publish_snapshot(&panel_events).await;
                    if let Err(e) = bridge_events.subscribe_commands(&panel_events).await {
                        error!("Command subscription failed: {}", e);
                    }
                    if cache_enabled
                        && let Err(e) = cache::save(&panel_events.cacheable_data())
                    {
                        warn!("Failed to save cache: {}", e);
                    }
                }
                Ok(BridgeEvent::Offline) => {
                    warn!("Panel offline");
                    bridge_events.publish_status(false).await;
                }
                Ok(BridgeEvent::AreaChanged(area)) => {
                    bridge_events.publish_area(&area).await;
                }
                Ok(BridgeEvent::ZoneChanged(zone)) => {
                    bridge_events.publish_zone(&zone).await;
                }
                Ok(BridgeEvent::Log(event)) => {
                    bridge_events.publish_log(&event).await;
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Bridge receiver lagged, missed {} events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    info!("Bridge event channel closed");
                    break;
                }
            }
        }
    });

    // Task 2: MQTT event loop (connection management + inbound commands)
    let panel_cmds = Arc::clone(&panel);
    let bridge_cmds = Arc::clone(&bridge);
    let ha_config = config.clone();
    let mqtt_task = tokio::spawn(async move {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to MQTT broker");
                    bridge_cmds.publish_status(true).await;
                    bridge_cmds.publish_snapshot(&panel_cmds).await;
                    if let Err(e) = bridge_cmds.subscribe_commands(&panel_cmds).await {
                        error!("Command subscription failed: {}", e);
                    }
                    if ha_config.homeassistant.discovery {
                        homeassistant::publish_discovery(&bridge_cmds, &ha_config, &panel_cmds)
                            .await;
                    }
                }
                Ok(Event::Incoming(Packet::Publish(msg))) => {
                    let payload = String::from_utf8_lossy(&msg.payload).to_string();
                    bridge_cmds
                        .handle_message(&msg.topic, &payload, &panel_cmds)
                        .await;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT connection error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    info!("texecom2mqtt running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    bridge.publish_status(false).await;
    // Give the event loop a moment to flush the offline status.
    tokio::time::sleep(Duration::from_millis(200)).await;
    event_task.abort();
    mqtt_task.abort();

    if config.cache
        && let Err(e) = cache::save(&panel.cacheable_data())
    {
        warn!("Failed to save cache: {}", e);
    }

    panel.disconnect().await;
    info!("Shutdown complete");
    Ok(())
}
