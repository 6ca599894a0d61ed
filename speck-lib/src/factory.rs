use crate::constants::{USB_SPECK_ID, WIFI_SPECK_IDS};
use crate::device::{Speck, SpeckKind};
use crate::error::{Result, SpeckError};
use crate::options::SpeckOptions;
use crate::transport::{DeviceDescriptor, HidTransport, UsbId};
use std::sync::Arc;
use tracing::{info, warn};

/// Every vendor/product pair a Speck can enumerate as.
pub fn speck_filters() -> Vec<UsbId> {
    std::iter::once(USB_SPECK_ID).chain(WIFI_SPECK_IDS).collect()
}

/// Finds attached Specks and opens the first one that answers.
pub struct SpeckFactory<T: HidTransport + 'static> {
    transport: Arc<T>,
    options: SpeckOptions,
}

impl<T: HidTransport + 'static> SpeckFactory<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self::with_options(transport, SpeckOptions::default())
    }

    pub fn with_options(transport: Arc<T>, options: SpeckOptions) -> Self {
        Self { transport, options }
    }

    /// Attached devices with a known Speck vendor/product ID, in transport order.
    pub async fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        let devices = self.transport.enumerate(&speck_filters()).await?;
        info!(count = devices.len(), "Enumerated Specks");
        Ok(devices)
    }

    /// Wraps `descriptor` in an unconnected handle of the matching variant.
    pub fn speck_for(&self, descriptor: DeviceDescriptor) -> Option<Speck<T>> {
        let kind = SpeckKind::from_usb_id(descriptor.usb_id())?;
        Some(Speck::with_options(Arc::clone(&self.transport), descriptor, kind, self.options))
    }

    /// Connects to the first Speck that answers.
    ///
    /// Returns `Ok(None)` when nothing is attached. When devices are attached but
    /// none connect, the last connection error is returned.
    pub async fn create(&self) -> Result<Option<Speck<T>>> {
        let mut last_error: Option<SpeckError> = None;
        for descriptor in self.enumerate().await? {
            let device_id = descriptor.device_id.clone();
            let Some(speck) = self.speck_for(descriptor) else {
                continue;
            };
            match speck.connect().await {
                Ok(()) => return Ok(Some(speck)),
                Err(e) => {
                    warn!(%device_id, "Failed to connect: {}", e);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}
