//! Device identifiers and wire-level constants shared by both Speck variants.

use crate::transport::UsbId;

/// The USB-attached Speck.
pub const USB_SPECK_ID: UsbId = UsbId::new(0x2354, 0x3333);

/// Wi-Fi Specks ship under two vendor IDs.
pub const WIFI_SPECK_IDS: [UsbId; 2] = [UsbId::new(0x2354, 0x3335), UsbId::new(0x2B6E, 0x3335)];

pub const USB_REPORT_LEN: usize = 16;
pub const WIFI_REPORT_LEN: usize = 128;

/// Specks only use the default HID report.
pub const REPORT_ID: u8 = 0;

pub const DEFAULT_LOGGING_INTERVAL_SECS: u8 = 60;
pub const MIN_LOGGING_INTERVAL_SECS: u8 = 1;
pub const MAX_LOGGING_INTERVAL_SECS: u8 = 255;

/// Offset of the Unix timestamp stamped into every command.
pub const TIMESTAMP_OFFSET: usize = 1;
