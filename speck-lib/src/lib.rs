//! Protocol driver for Speck particle sensors, over USB or the Wi-Fi model's HID interface.

pub mod capabilities;
pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod factory;
pub mod frame;
pub mod hid;
pub mod options;
pub mod queue;
pub mod sample;
pub mod transport;
pub mod usb;
pub mod wifi;

pub use device::{Speck, SpeckKind};
pub use error::{Result, SpeckError, TransportError};
pub use factory::SpeckFactory;
pub use hid::NusbHidTransport;
