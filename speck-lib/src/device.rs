use crate::capabilities::{Capabilities, capabilities};
use crate::config::SpeckConfig;
use crate::constants::{
    MAX_LOGGING_INTERVAL_SECS, MIN_LOGGING_INTERVAL_SECS, USB_REPORT_LEN, USB_SPECK_ID, WIFI_REPORT_LEN, WIFI_SPECK_IDS,
};
use crate::error::{Result, SpeckError};
use crate::frame::{Command, CommandFrame, CommandIdSequence, ResponseFrame};
use crate::options::SpeckOptions;
use crate::queue::CommandQueue;
use crate::sample::{DataSample, SampleKind};
use crate::transport::{Connection, DeviceDescriptor, DeviceEvent, HidTransport, UsbId};
use crate::usb;
use crate::wifi::{self, WifiSpeck};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use strum_macros::Display;
use tracing::{debug, info, warn};

/// The two Speck families. They share the command set but differ in report length
/// and field layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum SpeckKind {
    #[strum(to_string = "USB Speck")]
    Usb,
    #[strum(to_string = "Wi-Fi Speck")]
    Wifi,
}

impl SpeckKind {
    pub fn from_usb_id(id: UsbId) -> Option<Self> {
        if id == USB_SPECK_ID {
            Some(SpeckKind::Usb)
        } else if WIFI_SPECK_IDS.contains(&id) {
            Some(SpeckKind::Wifi)
        } else {
            None
        }
    }

    pub fn report_len(&self) -> usize {
        match self {
            SpeckKind::Usb => USB_REPORT_LEN,
            SpeckKind::Wifi => WIFI_REPORT_LEN,
        }
    }
}

struct Link {
    connection: Connection,
    queue: CommandQueue,
}

/// Handle to one Speck.
///
/// Owns the device's connection and command queue, and caches the config read at
/// connect time. Wi-Fi-only operations live on [`WifiSpeck`], obtained through
/// [`Speck::wifi`].
pub struct Speck<T: HidTransport + 'static> {
    transport: Arc<T>,
    descriptor: DeviceDescriptor,
    kind: SpeckKind,
    options: SpeckOptions,
    lifecycle: tokio::sync::Mutex<()>,
    link: Mutex<Option<Link>>,
    config: Mutex<Option<SpeckConfig>>,
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: HidTransport + 'static> Speck<T> {
    pub fn new(transport: Arc<T>, descriptor: DeviceDescriptor, kind: SpeckKind) -> Self {
        Self::with_options(transport, descriptor, kind, SpeckOptions::default())
    }

    pub fn with_options(transport: Arc<T>, descriptor: DeviceDescriptor, kind: SpeckKind, options: SpeckOptions) -> Self {
        Self {
            transport,
            descriptor,
            kind,
            options,
            lifecycle: tokio::sync::Mutex::new(()),
            link: Mutex::new(None),
            config: Mutex::new(None),
        }
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn kind(&self) -> SpeckKind {
        self.kind
    }

    pub fn options(&self) -> &SpeckOptions {
        &self.options
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.link).is_some()
    }

    /// Opens the transport connection and reads the config to confirm the device
    /// answers. Does nothing if already connected.
    pub async fn connect(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        info!(device_id = %self.descriptor.device_id, kind = %self.kind, "Connecting");
        let connection = self.transport.connect(&self.descriptor.device_id).await?;
        let queue = CommandQueue::spawn(
            Arc::clone(&self.transport),
            connection,
            self.kind.report_len(),
            CommandIdSequence::random(),
        );
        *lock(&self.link) = Some(Link { connection, queue });

        match self.get_config(true).await {
            Ok(config) => {
                info!(
                    id = %config.id,
                    protocol_version = config.protocol_version,
                    "Connected to {}",
                    self.kind
                );
                debug!(config = %serde_json::to_string(&config).unwrap_or_default(), "Speck config");
                Ok(())
            }
            Err(e) => {
                warn!("Speck did not answer the config read: {}", e);
                if let Some(link) = self.take_link() {
                    if let Err(close_err) = self.transport.disconnect(link.connection).await {
                        debug!("Ignoring disconnect failure after failed connect: {}", close_err);
                    }
                }
                Err(e)
            }
        }
    }

    /// Closes the connection, dropping the command queue and cached config.
    pub async fn disconnect(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        let connection = lock(&self.link).as_ref().map(|link| link.connection);
        let Some(connection) = connection else {
            return Ok(());
        };
        info!(device_id = %self.descriptor.device_id, "Disconnecting");
        // stay connected on failure so the close can be retried
        self.transport.disconnect(connection).await?;
        self.take_link();
        Ok(())
    }

    /// Forgets the connection if `device_id` is this device. Returns whether it matched.
    ///
    /// The transport connection is already gone when a device is unplugged, so the
    /// transport is not told to close it.
    pub fn handle_device_removed(&self, device_id: &str) -> bool {
        if device_id != self.descriptor.device_id {
            return false;
        }
        if self.take_link().is_some() {
            info!(device_id, "Connected Speck was removed");
        }
        true
    }

    pub fn handle_event(&self, event: &DeviceEvent) -> bool {
        match event {
            DeviceEvent::Removed { device_id } => self.handle_device_removed(device_id),
            DeviceEvent::Added(_) => false,
        }
    }

    fn take_link(&self) -> Option<Link> {
        let link = lock(&self.link).take();
        *lock(&self.config) = None;
        link
    }

    pub(crate) fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() { Ok(()) } else { Err(SpeckError::NotConnected) }
    }

    pub(crate) fn frame(&self, command: Command) -> CommandFrame {
        CommandFrame::new(command, self.kind.report_len())
    }

    /// Sends `frame` through the command queue and waits for its verified response.
    pub(crate) async fn transact(&self, frame: CommandFrame) -> Result<ResponseFrame> {
        let pending = {
            let link = lock(&self.link);
            let link = link.as_ref().ok_or(SpeckError::NotConnected)?;
            link.queue.enqueue(frame)
        };
        pending.await
    }

    pub(crate) fn cached_config(&self) -> Option<SpeckConfig> {
        lock(&self.config).clone()
    }

    pub(crate) fn invalidate_config(&self) {
        *lock(&self.config) = None;
    }

    /// Returns a copy of the cached config, reading it from the device when
    /// `force_reload` is set or nothing is cached.
    pub async fn get_config(&self, force_reload: bool) -> Result<SpeckConfig> {
        self.ensure_connected()?;
        if !force_reload {
            if let Some(config) = self.cached_config() {
                return Ok(config);
            }
        }

        let config = match self.kind {
            SpeckKind::Usb => usb::read_config(self).await?,
            SpeckKind::Wifi => wifi::read_config(self).await?,
        };
        *lock(&self.config) = Some(config.clone());
        Ok(config)
    }

    /// Capabilities derived from the cached config. Before the first config read
    /// only the version-independent flags are set.
    pub fn capabilities(&self) -> Capabilities {
        let config = lock(&self.config);
        let protocol_version = config.as_ref().map(|c| c.protocol_version);
        let hardware_version = config.as_ref().and_then(|c| c.hardware_version);
        capabilities(self.kind, protocol_version, hardware_version)
    }

    /// The most recent reading, or `None` if the device has none.
    pub async fn get_current_sample(&self) -> Result<Option<DataSample>> {
        self.get_sample(SampleKind::Current).await
    }

    /// The oldest stored reading, or `None` if the device's history is empty.
    pub async fn get_historical_sample(&self) -> Result<Option<DataSample>> {
        self.get_sample(SampleKind::Historical).await
    }

    async fn get_sample(&self, kind: SampleKind) -> Result<Option<DataSample>> {
        self.ensure_connected()?;
        match self.kind {
            SpeckKind::Usb => usb::read_sample(self, kind).await,
            SpeckKind::Wifi => wifi::read_sample(self, kind).await,
        }
    }

    pub async fn get_sample_count(&self) -> Result<u32> {
        self.ensure_connected()?;
        if !self.capabilities().can_get_number_of_data_samples {
            return Err(SpeckError::Unsupported("reading the number of stored samples"));
        }
        let response = self.transact(self.frame(Command::GetSampleCount)).await?;
        response.u32_at(1)
    }

    /// Sets the logging interval, clamped to 1..=255 seconds. Returns whether the
    /// device reported the requested value back.
    pub async fn set_logging_interval(&self, seconds: i64) -> Result<bool> {
        self.ensure_connected()?;
        if !self.capabilities().can_mutate_logging_interval {
            return Err(SpeckError::Unsupported("changing the logging interval"));
        }
        let clamped = seconds.clamp(i64::from(MIN_LOGGING_INTERVAL_SECS), i64::from(MAX_LOGGING_INTERVAL_SECS));
        let interval = u8::try_from(clamped).unwrap_or(MAX_LOGGING_INTERVAL_SECS);

        let confirmed = match self.kind {
            SpeckKind::Usb => usb::write_logging_interval(self, interval).await?,
            SpeckKind::Wifi => wifi::write_logging_interval(self, interval).await?,
        };
        if confirmed {
            if let Some(config) = lock(&self.config).as_mut() {
                config.logging_interval_secs = interval;
            }
        } else {
            warn!(requested = interval, "Speck did not confirm the logging interval");
        }
        Ok(confirmed)
    }

    /// Deletes the stored sample taken at `timestamp` (Unix seconds).
    pub async fn delete_sample(&self, timestamp: i64) -> Result<bool> {
        self.ensure_connected()?;
        let timestamp = u32::try_from(timestamp)
            .map_err(|_| SpeckError::Validation(format!("sample timestamp {} is out of range", timestamp)))?;
        match self.kind {
            SpeckKind::Usb => usb::delete_sample(self, timestamp).await,
            SpeckKind::Wifi => wifi::delete_samples(self, Some(timestamp)).await,
        }
    }

    /// The Wi-Fi view of this handle. Fails for USB Specks.
    pub fn wifi(&self) -> Result<WifiSpeck<'_, T>> {
        match self.kind {
            SpeckKind::Wifi => Ok(WifiSpeck::new(self)),
            SpeckKind::Usb => Err(SpeckError::Unsupported("Wi-Fi")),
        }
    }
}
