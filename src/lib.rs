// MIT License

//! # texecom2mqtt
//!
//! Direct TCP/IP communication with Texecom Premier-series alarm panels over
//! a Crestron/Connect serial tunnel, bridged to MQTT.
//!
//! The protocol engine keeps one framed binary session open to the panel,
//! correlates commands with responses, decodes asynchronous zone/area/log
//! events, and maintains a mirror of the panel state. The bridge layer
//! publishes every state change as a retained MQTT message and turns inbound
//! MQTT commands into panel operations.
//!
//! ## Quick Start
//!
//! ```no_run
//! use texecom2mqtt::config::TexecomConfig;
//! use texecom2mqtt::devices::ArmType;
//! use texecom2mqtt::panel::Panel;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let panel = Panel::new(TexecomConfig {
//!         host: "192.168.1.50".to_string(),
//!         port: 10001,
//!         udl_password: "1234".to_string(),
//!     });
//!
//!     panel.connect().await?;
//!     panel.login().await?;
//!     panel.start().await?;
//!
//!     let mut events = panel.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     panel.arm(1, ArmType::Full).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     panel.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod comm;
pub mod config;
pub mod constants;
pub mod devices;
pub mod error;
pub mod event;
pub mod frame;
pub mod homeassistant;
pub mod mqtt;
pub mod panel;
pub mod protocol;
pub mod transport;
pub mod util;

// Re-exports for convenience
pub use config::{Config, TexecomConfig};
pub use devices::{Area, AreaState, ArmType, Device, Zone, ZoneFlags, ZoneState};
pub use error::{Result, TexecomError};
pub use event::{AreaEvent, LogEvent, PanelEvent, ZoneEvent};
pub use panel::{BridgeEvent, Panel};
