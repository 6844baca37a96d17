//! Output device enumeration

mod enumerator;

pub use enumerator::{DeviceEnumerator, DeviceInfo};
