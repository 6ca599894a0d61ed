//! The HID transport boundary. The driver only needs these five primitives;
//! [`NusbHidTransport`](crate::hid::NusbHidTransport) provides them over raw USB.

use crate::error::TransportError;
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::future::Future;

/// A vendor/product ID pair used to filter enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct UsbId {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl UsbId {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self { vendor_id, product_id }
    }

    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id && self.product_id == product_id
    }
}

impl fmt::Display for UsbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_id: String,
}

impl DeviceDescriptor {
    pub fn usb_id(&self) -> UsbId {
        UsbId::new(self.vendor_id, self.product_id)
    }
}

/// Opaque handle to an open transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    pub connection_id: u32,
}

/// Hot-plug notifications delivered by the host platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Added(DeviceDescriptor),
    Removed { device_id: String },
}

pub trait HidTransport: Send + Sync {
    /// Lists attached devices matching any of `filters`.
    fn enumerate(&self, filters: &[UsbId]) -> impl Future<Output = Result<Vec<DeviceDescriptor>, TransportError>> + Send;

    fn connect(&self, device_id: &str) -> impl Future<Output = Result<Connection, TransportError>> + Send;

    fn disconnect(&self, connection: Connection) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn send(
        &self,
        connection: Connection,
        report_id: u8,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Reads one input report of at most `max_len` bytes, returning its report ID and payload.
    fn receive(
        &self,
        connection: Connection,
        max_len: usize,
    ) -> impl Future<Output = Result<(u8, Bytes), TransportError>> + Send;
}
