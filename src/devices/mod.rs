// MIT License

pub mod area;
pub mod device;
pub mod zone;

pub use area::{Area, AreaState, AreaStatus, ArmType};
pub use device::Device;
pub use zone::{Zone, ZoneFlags, ZoneState};
