// MIT License

use serde::{Deserialize, Serialize};

/// Panel identity, loaded once at startup and immutable afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Panel model string (up to 20 characters, e.g. "Premier Elite 48").
    pub model: String,
    /// Serial number: the printable field from the identification response,
    /// or the 14-hex-digit value from the serial-number probe.
    pub serial_number: String,
    /// Firmware version string (up to 20 characters).
    pub firmware_version: String,
    /// Number of zones the panel supports.
    pub zone_count: u16,
}
