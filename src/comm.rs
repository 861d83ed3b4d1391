// MIT License

//! Typed command surface of the panel: one method per UDL operation, built
//! on the framed session and dispatcher.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::devices::{Area, AreaStatus, ArmType, Device, Zone};
use crate::constants::ZoneType;
use crate::error::{Result, TexecomError};
use crate::event::EventReceiver;
use crate::frame::ACK;
use crate::protocol::{
    self, CMD_ARM, CMD_DISARM, CMD_GET_AREA_FLAGS, CMD_GET_AREA_TEXT,
    CMD_GET_PANEL_IDENTIFICATION, CMD_GET_SYSTEM_POWER, CMD_GET_ZONE_DETAILS,
    CMD_GET_ZONE_STATE, CMD_LOGIN, CMD_RESET, CMD_SET_DATETIME, CMD_SET_LCD, ZoneBitmap,
};
use crate::transport::PanelSession;
use crate::util::normalize_bytes;

/// Longest UDL password the panel accepts.
const MAX_UDL_PASSWORD_LEN: usize = 32;
/// Area names are 16 bytes each in the area-text response.
const AREA_NAME_LEN: usize = 16;
/// Zone detail records are 32 bytes: name[16], type, reserved[15].
const ZONE_RECORD_LEN: usize = 32;
/// The identification response carries three 20-byte strings and a u16.
const IDENT_LEN: usize = 62;

/// Connection-scoped client for the panel command set.
pub struct TexecomComm {
    session: Option<PanelSession>,
    logged_in: bool,
    area_count: usize,
}

impl TexecomComm {
    pub fn new() -> Self {
        Self {
            session: None,
            logged_in: false,
            area_count: 0,
        }
    }

    /// Open a fresh session, replacing any previous one.
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        if let Some(old) = self.session.take() {
            old.disconnect().await;
        }
        self.logged_in = false;
        self.session = Some(PanelSession::connect(host, port).await?);
        Ok(())
    }

    /// The event stream of the current session; can only be taken once per
    /// connection.
    pub fn take_events(&mut self) -> Result<EventReceiver> {
        let session = self.session.as_mut().ok_or(TexecomError::NotConnected)?;
        session.take_events().ok_or(TexecomError::ChannelClosed)
    }

    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(PanelSession::is_connected)
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    /// The serial number discovered by the connect probe.
    pub fn probe_serial(&self) -> Option<&str> {
        self.session.as_ref().map(PanelSession::serial_number)
    }

    fn session(&self) -> Result<&PanelSession> {
        self.session.as_ref().ok_or(TexecomError::NotConnected)
    }

    async fn call(&self, cmd: u8, body: &[u8]) -> Result<Vec<u8>> {
        self.session()?.dispatcher().call(cmd, body).await
    }

    /// Authenticate with the UDL password.
    pub async fn login(&mut self, password: &str) -> Result<()> {
        if password.len() > MAX_UDL_PASSWORD_LEN {
            return Err(TexecomError::Config(format!(
                "UDL password longer than {} characters",
                MAX_UDL_PASSWORD_LEN
            )));
        }

        debug!("Sending login command");
        let response = self.call(CMD_LOGIN, password.as_bytes()).await?;
        if response.first() == Some(&ACK) {
            self.logged_in = true;
            info!("Login successful");
            Ok(())
        } else {
            Err(TexecomError::AuthFailed)
        }
    }

    /// Query model, serial, firmware, and zone count.
    pub async fn get_panel_identification(&mut self) -> Result<Device> {
        debug!("Requesting panel identification");
        let resp = self.call(CMD_GET_PANEL_IDENTIFICATION, &[]).await?;
        if resp.len() < IDENT_LEN {
            return Err(TexecomError::Protocol(format!(
                "identification response too short: {} bytes",
                resp.len()
            )));
        }

        // Trailing bytes beyond the documented fields are ignored.
        let mut serial_number = normalize_bytes(&resp[20..40]);
        if serial_number.is_empty() {
            // Older firmware leaves the printable field blank; the probe
            // serial is always available.
            serial_number = self.probe_serial().unwrap_or_default().to_string();
        }

        let device = Device {
            model: normalize_bytes(&resp[..20]),
            serial_number,
            firmware_version: normalize_bytes(&resp[40..60]),
            zone_count: u16::from_le_bytes([resp[60], resp[61]]),
        };
        // The reader needs the zone count to size zone numbers in events.
        if let Some(session) = &self.session {
            session.set_zone_count(device.zone_count);
        }
        debug!("Panel identification: {:?}", device);
        Ok(device)
    }

    /// Query area names. The response length defines how many areas the
    /// panel reports (16 bytes of text per area).
    pub async fn get_areas(&mut self) -> Result<Vec<Area>> {
        debug!("Requesting area text");
        let resp = self.call(CMD_GET_AREA_TEXT, &[]).await?;

        let areas: Vec<Area> = resp
            .chunks_exact(AREA_NAME_LEN)
            .enumerate()
            .map(|(i, chunk)| Area::new(i as u8 + 1, normalize_bytes(chunk)))
            .collect();

        self.area_count = areas.len();
        debug!("Retrieved {} areas", areas.len());
        Ok(areas)
    }

    /// Query zone names and types.
    pub async fn get_zones(&self) -> Result<Vec<Zone>> {
        debug!("Requesting zone details");
        let resp = self.call(CMD_GET_ZONE_DETAILS, &[]).await?;

        let zones: Vec<Zone> = resp
            .chunks_exact(ZONE_RECORD_LEN)
            .enumerate()
            .map(|(i, record)| {
                let zone_type =
                    ZoneType::from_u8(record[16]).unwrap_or(ZoneType::NotUsed);
                Zone::new(i as u16 + 1, normalize_bytes(&record[..16]), zone_type)
            })
            .collect();

        debug!("Retrieved {} zones", zones.len());
        Ok(zones)
    }

    /// Query the current state byte of every zone.
    pub async fn get_zone_states(&self) -> Result<Vec<ZoneBitmap>> {
        debug!("Requesting zone states");
        let resp = self.call(CMD_GET_ZONE_STATE, &[]).await?;
        Ok(resp.iter().map(|&b| protocol::parse_zone_bitmap(b)).collect())
    }

    /// Query the 8-byte flag word of every area.
    pub async fn get_area_flags(&self) -> Result<Vec<AreaStatus>> {
        debug!("Requesting area flags");
        let resp = self.call(CMD_GET_AREA_FLAGS, &[]).await?;
        Ok(resp
            .chunks_exact(8)
            .map(|chunk| {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                protocol::parse_area_flags(u64::from_le_bytes(word))
            })
            .collect())
    }

    fn check_area(&self, area: u8) -> Result<()> {
        if area == 0 || (area as usize) > self.area_count {
            return Err(TexecomError::Config(format!(
                "area {} out of range (panel has {})",
                area, self.area_count
            )));
        }
        Ok(())
    }

    /// Arm an area. The dispatcher enforces the ACK.
    pub async fn arm(&self, area: u8, arm_type: ArmType) -> Result<()> {
        self.check_area(area)?;
        debug!("Arming area {} ({})", area, arm_type.description());
        let body = protocol::arm_body(self.area_count, area, arm_type);
        self.call(CMD_ARM, &body).await?;
        Ok(())
    }

    /// Disarm an area.
    pub async fn disarm(&self, area: u8) -> Result<()> {
        self.check_area(area)?;
        debug!("Disarming area {}", area);
        let body = protocol::disarm_body(self.area_count, area);
        self.call(CMD_DISARM, &body).await?;
        Ok(())
    }

    /// Reset an area after an alarm.
    pub async fn reset(&self, area: u8) -> Result<()> {
        self.check_area(area)?;
        debug!("Resetting area {}", area);
        let body = protocol::disarm_body(self.area_count, area);
        self.call(CMD_RESET, &body).await?;
        Ok(())
    }

    /// Set the panel clock.
    pub async fn set_datetime(&self, t: &DateTime<Utc>) -> Result<()> {
        debug!("Setting panel date/time to {}", t);
        let body = protocol::set_datetime_body(t);
        self.call(CMD_SET_DATETIME, &body).await?;
        Ok(())
    }

    /// Write the keypad LCD banner. Text beyond 32 bytes is clipped.
    pub async fn set_lcd(&self, text: &str) -> Result<()> {
        debug!("Setting LCD text: {}", text);
        let body = protocol::set_lcd_body(text);
        self.call(CMD_SET_LCD, &body).await?;
        Ok(())
    }

    /// Keepalive query; the payload is ignored.
    pub async fn get_system_power(&self) -> Result<()> {
        self.call(CMD_GET_SYSTEM_POWER, &[]).await?;
        Ok(())
    }

    /// Tear down the current session. Idempotent.
    pub async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            session.disconnect().await;
        }
        self.logged_in = false;
    }
}

impl Default for TexecomComm {
    fn default() -> Self {
        Self::new()
    }
}
