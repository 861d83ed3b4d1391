// MIT License

//! Persisted last-known panel model, used to pre-populate the bridge before
//! the first live load. Never authoritative over live panel data.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::devices::{Area, Device, Zone};
use crate::error::{Result, TexecomError};

const CACHE_FILE_NAME: &str = "cache.json";

/// The on-disk record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheData {
    pub device: Device,
    pub areas: Vec<Area>,
    pub zones: Vec<Zone>,
    pub last_update: DateTime<Utc>,
}

fn cache_dir() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".cache").join("texecom2mqtt"))
}

/// Load the cached model, if a readable cache file exists.
pub fn load() -> Option<CacheData> {
    let path = cache_dir()?.join(CACHE_FILE_NAME);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Cannot read cache file {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(data) => {
            debug!("Loaded cache from {}", path.display());
            Some(data)
        }
        Err(e) => {
            warn!("Ignoring corrupt cache file {}: {}", path.display(), e);
            None
        }
    }
}

/// Persist the model snapshot.
pub fn save(data: &CacheData) -> Result<()> {
    let dir = cache_dir()
        .ok_or_else(|| TexecomError::Config("cannot determine home directory".into()))?;
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(CACHE_FILE_NAME);
    let text = serde_json::to_string(data)
        .map_err(|e| TexecomError::Config(format!("cannot serialize cache: {}", e)))?;
    std::fs::write(&path, text)?;
    debug!("Saved cache to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ZoneType;

    #[test]
    fn test_cache_round_trip() {
        let data = CacheData {
            device: Device {
                model: "Premier Elite 48".into(),
                serial_number: "0123456789abcd".into(),
                firmware_version: "V4.02.01".into(),
                zone_count: 48,
            },
            areas: vec![Area::new(1, "House".into())],
            zones: vec![Zone::new(1, "Front Door".into(), ZoneType::EntryExit1)],
            last_update: Utc::now(),
        };

        let json = serde_json::to_string(&data).unwrap();
        let restored: CacheData = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.device, data.device);
        assert_eq!(restored.areas, data.areas);
        assert_eq!(restored.zones, data.zones);
        assert_eq!(restored.zones[0].id, "Z1");
    }
}
