//! [`HidTransport`] over raw USB interrupt endpoints using `nusb`.

use crate::error::TransportError;
use crate::transport::{Connection, DeviceDescriptor, HidTransport, UsbId};
use bytes::Bytes;
use nusb::transfer::RequestBuffer;
use nusb::{DeviceInfo, Interface};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

pub const ENDPOINT_OUT: u8 = 0x01;
pub const ENDPOINT_IN: u8 = 0x81;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct NusbHidTransport {
    timeout: Duration,
    next_connection_id: AtomicU32,
    interfaces: Mutex<HashMap<u32, Interface>>,
}

/// Device IDs are `<bus>:<address>`, stable while the device stays plugged in.
fn device_id(info: &DeviceInfo) -> String {
    format!("{:03}:{:03}", info.bus_number(), info.device_address())
}

impl NusbHidTransport {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Every transfer fails with [`TransportError::Timeout`] after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            next_connection_id: AtomicU32::new(1),
            interfaces: Mutex::new(HashMap::new()),
        }
    }

    fn interface(&self, connection: Connection) -> Result<Interface, TransportError> {
        self.interfaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&connection.connection_id)
            .cloned()
            .ok_or(TransportError::UnknownConnection(connection.connection_id))
    }
}

impl Default for NusbHidTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HidTransport for NusbHidTransport {
    async fn enumerate(&self, filters: &[UsbId]) -> Result<Vec<DeviceDescriptor>, TransportError> {
        let devices = nusb::list_devices()?
            .filter(|d| filters.iter().any(|f| f.matches(d.vendor_id(), d.product_id())))
            .map(|d| DeviceDescriptor {
                vendor_id: d.vendor_id(),
                product_id: d.product_id(),
                device_id: device_id(&d),
            })
            .collect();
        Ok(devices)
    }

    async fn connect(&self, id: &str) -> Result<Connection, TransportError> {
        let info = nusb::list_devices()?
            .find(|d| device_id(d) == id)
            .ok_or_else(|| TransportError::UnknownDevice(id.to_string()))?;
        info!(
            "Opening {:04x}:{:04x} on bus {} addr {}",
            info.vendor_id(),
            info.product_id(),
            info.bus_number(),
            info.device_address()
        );
        let device = info.open()?;
        let interface = device.detach_and_claim_interface(0)?;

        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        self.interfaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(connection_id, interface);
        Ok(Connection { connection_id })
    }

    async fn disconnect(&self, connection: Connection) -> Result<(), TransportError> {
        self.interfaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&connection.connection_id)
            .map(drop)
            .ok_or(TransportError::UnknownConnection(connection.connection_id))
    }

    async fn send(&self, connection: Connection, report_id: u8, data: &[u8]) -> Result<(), TransportError> {
        let interface = self.interface(connection)?;
        // Report 0 is implicit; numbered reports carry their ID as the first byte.
        let mut report = Vec::with_capacity(data.len() + 1);
        if report_id != 0 {
            report.push(report_id);
        }
        report.extend_from_slice(data);

        let completion = timeout(self.timeout, interface.interrupt_out(ENDPOINT_OUT, report)).await?;
        let sent = completion.into_result()?;
        debug!("Sent {} bytes", sent.actual_length());
        Ok(())
    }

    async fn receive(&self, connection: Connection, max_len: usize) -> Result<(u8, Bytes), TransportError> {
        let interface = self.interface(connection)?;
        let completion = timeout(self.timeout, interface.interrupt_in(ENDPOINT_IN, RequestBuffer::new(max_len))).await?;
        let data = completion.into_result()?;
        Ok((0, Bytes::from(data)))
    }
}
