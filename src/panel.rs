// MIT License

//! The panel model and its supervision loop.
//!
//! Lifecycle: [`Panel::new`] → [`Panel::connect`] → [`Panel::login`] →
//! [`Panel::start`] → [`Panel::disconnect`]. After `start`, a supervisor task
//! pumps decoded events into the model and owns reconnection; a keepalive
//! task polls the panel every 30 seconds.

use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, broadcast, watch};
use tokio::time::{Duration, Instant, interval, sleep};
use tracing::{debug, info, warn};

use chrono::{DateTime, Utc};

use crate::cache::CacheData;
use crate::comm::TexecomComm;
use crate::config::TexecomConfig;
use crate::devices::{Area, ArmType, Device, Zone};
use crate::error::{Result, TexecomError};
use crate::event::{EventReceiver, LogEvent, PanelEvent};

/// First reconnect delay; doubles up to [`RECONNECT_CAP`].
const RECONNECT_BASE: Duration = Duration::from_secs(1);
const RECONNECT_CAP: Duration = Duration::from_secs(60);
/// A connection that survived this long resets the backoff clock.
const UPTIME_RESET: Duration = Duration::from_secs(60);
/// Keepalive period.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
/// Consecutive keepalive failures before the connection is recycled.
const KEEPALIVE_FAILURE_LIMIT: u32 = 3;

/// State changes and log entries for the bridge layer. Each area or zone
/// state change is exactly one event carrying the updated snapshot.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// Connected and initial data loaded; the bridge should republish the
    /// full state (also sent after every reconnect).
    Online,
    /// Connection to the panel lost.
    Offline,
    AreaChanged(Area),
    ZoneChanged(Zone),
    Log(LogEvent),
}

#[derive(Default)]
struct PanelState {
    device: Device,
    areas: Vec<Area>,
    zones: Vec<Zone>,
}

struct Shared {
    config: TexecomConfig,
    comm: Mutex<TexecomComm>,
    state: StdMutex<PanelState>,
    bridge_tx: broadcast::Sender<BridgeEvent>,
}

/// The panel: model snapshots, commands, and the event stream.
pub struct Panel {
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: StdMutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl Panel {
    pub fn new(config: TexecomConfig) -> Self {
        let (bridge_tx, _) = broadcast::channel(256);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                config,
                comm: Mutex::new(TexecomComm::new()),
                state: StdMutex::new(PanelState::default()),
                bridge_tx,
            }),
            shutdown_tx,
            shutdown_rx,
            tasks: StdMutex::new(Vec::new()),
        }
    }

    /// Subscribe to bridge events.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.shared.bridge_tx.subscribe()
    }

    /// Pre-populate the model from a cached snapshot, so the bridge has
    /// names and shapes before the first live load. Live data overwrites
    /// this wholesale.
    pub fn seed_cache(&self, data: CacheData) {
        info!("Seeding panel model from cache (saved {})", data.last_update);
        let mut state = self.shared.state.lock().unwrap();
        state.device = data.device;
        state.areas = data.areas;
        state.zones = data.zones;
    }

    /// A cacheable snapshot of the current model.
    pub fn cacheable_data(&self) -> CacheData {
        let state = self.shared.state.lock().unwrap();
        CacheData {
            device: state.device.clone(),
            areas: state.areas.clone(),
            zones: state.zones.clone(),
            last_update: Utc::now(),
        }
    }

    /// Establish the TCP session (dial, quiescence, serial probe).
    pub async fn connect(&self) -> Result<()> {
        info!("Connecting to panel...");
        let mut comm = self.shared.comm.lock().await;
        comm.connect(&self.shared.config.host, self.shared.config.port)
            .await?;
        info!("Connected to panel");
        Ok(())
    }

    /// Authenticate with the configured UDL password.
    pub async fn login(&self) -> Result<()> {
        info!("Logging in to panel...");
        let mut comm = self.shared.comm.lock().await;
        comm.login(&self.shared.config.udl_password).await?;
        Ok(())
    }

    /// Load initial data and start the supervisor and keepalive tasks.
    pub async fn start(&self) -> Result<()> {
        let events = {
            let mut comm = self.shared.comm.lock().await;
            if !comm.is_logged_in() {
                return Err(TexecomError::NotConnected);
            }
            load_initial_data(&mut comm, &self.shared).await?;
            comm.take_events()?
        };

        let _ = self.shared.bridge_tx.send(BridgeEvent::Online);

        let mut tasks = self.tasks.lock().unwrap();
        tasks.push(tokio::spawn(supervise(
            self.shared.clone(),
            events,
            self.shutdown_rx.clone(),
        )));
        tasks.push(tokio::spawn(keepalive(
            self.shared.clone(),
            self.shutdown_rx.clone(),
        )));

        info!("Panel operations started");
        Ok(())
    }

    // --- Snapshots ---

    pub fn device(&self) -> Device {
        self.shared.state.lock().unwrap().device.clone()
    }

    pub fn areas(&self) -> Vec<Area> {
        self.shared.state.lock().unwrap().areas.clone()
    }

    pub fn zones(&self) -> Vec<Zone> {
        self.shared.state.lock().unwrap().zones.clone()
    }

    // --- Commands ---

    pub async fn arm(&self, area: u8, arm_type: ArmType) -> Result<()> {
        self.shared.comm.lock().await.arm(area, arm_type).await
    }

    pub async fn disarm(&self, area: u8) -> Result<()> {
        self.shared.comm.lock().await.disarm(area).await
    }

    pub async fn reset(&self, area: u8) -> Result<()> {
        self.shared.comm.lock().await.reset(area).await
    }

    pub async fn set_lcd(&self, text: &str) -> Result<()> {
        self.shared.comm.lock().await.set_lcd(text).await
    }

    pub async fn set_datetime(&self, t: &DateTime<Utc>) -> Result<()> {
        self.shared.comm.lock().await.set_datetime(t).await
    }

    /// Shut everything down. Idempotent.
    pub async fn disconnect(&self) {
        info!("Disconnecting from panel...");
        let _ = self.shutdown_tx.send(true);
        self.shared.comm.lock().await.disconnect().await;
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        info!("Disconnected from panel");
    }
}

impl Drop for Panel {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}

/// Run the full initial query sequence and install the result in the model.
async fn load_initial_data(comm: &mut TexecomComm, shared: &Shared) -> Result<()> {
    debug!("Loading initial data from panel");

    let device = comm.get_panel_identification().await?;
    let mut areas = comm.get_areas().await?;
    let mut zones = comm.get_zones().await?;

    for (zone, bitmap) in zones.iter_mut().zip(comm.get_zone_states().await?) {
        zone.state = bitmap.state;
        zone.flags = bitmap.flags;
    }
    for (area, status) in areas.iter_mut().zip(comm.get_area_flags().await?) {
        area.set_state(status.state, status.part_arm);
    }

    info!(
        "Initial data loaded: {} ({} zones configured), {} areas, {} zones",
        device.model,
        device.zone_count,
        areas.len(),
        zones.len()
    );

    let mut state = shared.state.lock().unwrap();
    state.device = device;
    state.areas = areas;
    state.zones = zones;
    Ok(())
}

/// Apply one decoded event to the model and emit the bridge event.
fn apply_event(shared: &Shared, event: PanelEvent) {
    match event {
        PanelEvent::Zone(ev) => {
            let updated = {
                let mut state = shared.state.lock().unwrap();
                state
                    .zones
                    .iter_mut()
                    .find(|z| z.number == ev.zone_number)
                    .map(|zone| {
                        zone.state = ev.state;
                        zone.flags = ev.flags;
                        zone.clone()
                    })
            };
            match updated {
                Some(zone) => {
                    info!(
                        "Zone {} ({}) status changed to {}",
                        zone.name, zone.number, zone.state
                    );
                    let _ = shared.bridge_tx.send(BridgeEvent::ZoneChanged(zone));
                }
                None => warn!("Event for unknown zone {}", ev.zone_number),
            }
        }
        PanelEvent::Area(ev) => {
            let updated = {
                let mut state = shared.state.lock().unwrap();
                state
                    .areas
                    .iter_mut()
                    .find(|a| a.number == ev.area_number)
                    .map(|area| {
                        area.set_state(ev.state, ev.part_arm);
                        area.clone()
                    })
            };
            match updated {
                Some(area) => {
                    info!(
                        "Area {} ({}) status changed to {}",
                        area.name,
                        area.number,
                        area.status_description()
                    );
                    let _ = shared.bridge_tx.send(BridgeEvent::AreaChanged(area));
                }
                None => warn!("Event for unknown area {}", ev.area_number),
            }
        }
        PanelEvent::Log(ev) => {
            info!("Log event: {}", ev.description);
            let _ = shared.bridge_tx.send(BridgeEvent::Log(ev));
        }
    }
}

/// Pump events into the model; on connection loss, reconnect with
/// exponential backoff and reload initial data.
async fn supervise(
    shared: Arc<Shared>,
    mut events: EventReceiver,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut backoff = RECONNECT_BASE;

    loop {
        let connected_at = Instant::now();

        // Pump until the reader closes the channel or shutdown is requested.
        let shutdown = loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => apply_event(&shared, event),
                    None => break false,
                },
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break true;
                    }
                }
            }
        };
        if shutdown {
            debug!("Supervisor shutting down");
            return;
        }

        warn!("Connection to panel lost");
        let _ = shared.bridge_tx.send(BridgeEvent::Offline);

        if connected_at.elapsed() >= UPTIME_RESET {
            backoff = RECONNECT_BASE;
        }

        events = loop {
            info!("Reconnecting in {:.0}s", backoff.as_secs_f64());
            tokio::select! {
                _ = sleep(backoff) => {}
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        debug!("Supervisor shutting down during backoff");
                        return;
                    }
                }
            }

            match reconnect(&shared).await {
                Ok(events) => break events,
                Err(e) => {
                    warn!("Reconnect failed: {}", e);
                    backoff = (backoff * 2).min(RECONNECT_CAP);
                }
            }
        };

        info!("Reconnected to panel");
        let _ = shared.bridge_tx.send(BridgeEvent::Online);
    }
}

/// One reconnect attempt: fresh session, login, full reload.
async fn reconnect(shared: &Shared) -> Result<EventReceiver> {
    let mut comm = shared.comm.lock().await;
    comm.connect(&shared.config.host, shared.config.port).await?;
    comm.login(&shared.config.udl_password).await?;
    load_initial_data(&mut comm, shared).await?;
    comm.take_events()
}

/// Poll the panel with GetSystemPower; recycle the connection after
/// repeated failures so the supervisor reconnects.
async fn keepalive(shared: Arc<Shared>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = interval(KEEPALIVE_INTERVAL);
    ticker.tick().await;
    let mut failures = 0u32;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut comm = shared.comm.lock().await;
                if !comm.is_connected() {
                    failures = 0;
                    continue;
                }
                match comm.get_system_power().await {
                    Ok(()) => failures = 0,
                    Err(e) => {
                        failures += 1;
                        warn!(
                            "Keepalive failed ({}/{}): {}",
                            failures, KEEPALIVE_FAILURE_LIMIT, e
                        );
                        if failures >= KEEPALIVE_FAILURE_LIMIT {
                            warn!("Keepalive failure limit reached, recycling connection");
                            comm.disconnect().await;
                            failures = 0;
                        }
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    debug!("Keepalive shutting down");
                    return;
                }
            }
        }
    }
}
