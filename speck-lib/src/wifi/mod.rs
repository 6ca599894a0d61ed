//! The Wi-Fi Speck: 128-byte reports, plus network, upload and display management.

pub mod network;
pub mod reset;
pub mod status;
pub mod upload;

use crate::config::{ColorPalette, Scale, SpeckConfig};
use crate::constants::DEFAULT_LOGGING_INTERVAL_SECS;
use crate::device::Speck;
use crate::error::{Result, SpeckError};
use crate::frame::Command;
use crate::sample::{DataSample, SampleKind};
use crate::transport::HidTransport;
use network::{AvailableNetworkRaw, Network, StoredNetworkRaw};
use regex::Regex;
use reset::{ResetProgress, ResetStep};
use status::{FEED_API_KEY_LEN, WifiStatus, WifiStatusRaw};
use std::sync::LazyLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use upload::{UploadUrl, UploadUrlRaw};
use zerocopy::byteorder::big_endian::{I16, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

const LOGGING_INTERVAL_WRITE_OFFSET: usize = 5;
const COLOR_PALETTE_WRITE_OFFSET: usize = 6;
const SCALE_WRITE_OFFSET: usize = 7;
const NO_CHANGE: u8 = 255;

const DELETE_TIMESTAMP_OFFSET: usize = 5;
const DELETE_MODE_OFFSET: usize = 9;
const DELETE_ONE: u8 = 1;
const DELETE_ALL: u8 = 255;
const DELETE_RESULT_OFFSET: usize = 5;

const FEED_KEY_ENABLED_WRITE_OFFSET: usize = 5;
const FEED_KEY_WRITE_OFFSET: usize = 6;
const FEED_KEY_ENABLED_READ_OFFSET: usize = 1;
const FEED_KEY_READ_OFFSET: usize = 2;

const JOIN_ENCRYPTION_OFFSET: usize = 5;
const JOIN_SSID_LEN_OFFSET: usize = 6;
const JOIN_KEY_LEN_OFFSET: usize = 7;
const JOIN_SSID_OFFSET: usize = 8;
const JOIN_KEY_OFFSET: usize = 40;

const STORED_NETWORK_INDEX_OFFSET: usize = 5;

/// Offset of the single status flag in scan, join, remove and calibrate replies.
const STATUS_FLAG_OFFSET: usize = 1;

static FEED_API_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i)[a-f0-9]{64}$").expect("static regex"));

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct InfoRaw {
    pub command: u8,
    pub serial: [u8; 16],
    pub hardware_version: u8,
    pub protocol_version: u8,
    pub logging_interval: u8,
    pub firmware_version: u8,
    pub color_palette: u8,
    pub scale: u8,
}

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct SampleRaw {
    pub command: u8,
    pub sample_time: U32,
    /// Tenths of a µg/m³.
    pub particle_concentration: U32,
    /// Tenths of a degree.
    pub temperature: I16,
    pub humidity: u8,
    pub raw_particle_count: U16,
    pub particle_count: U32,
}

impl From<&InfoRaw> for SpeckConfig {
    fn from(raw: &InfoRaw) -> Self {
        Self {
            id: hex::encode(raw.serial),
            protocol_version: raw.protocol_version,
            logging_interval_secs: raw.logging_interval,
            firmware_version: Some(raw.firmware_version),
            hardware_version: Some(raw.hardware_version),
            color_palette: ColorPalette::from_id(raw.color_palette),
            scale: Scale::from_id(raw.scale),
        }
    }
}

/// Decodes a sample report. A zero timestamp means the device had no sample.
pub fn decode_sample(raw: &SampleRaw, has_humidity: bool) -> Option<DataSample> {
    let sample_time_secs = raw.sample_time.get();
    if sample_time_secs == 0 {
        return None;
    }
    Some(DataSample {
        sample_time_secs,
        raw_particle_count: raw.raw_particle_count.get(),
        humidity: has_humidity.then_some(raw.humidity),
        temperature: Some(f64::from(raw.temperature.get()) / 10.0),
        particle_count: Some(raw.particle_count.get()),
        particle_concentration: Some(f64::from(raw.particle_concentration.get()) / 10.0),
    })
}

fn info_frame<T: HidTransport + 'static>(speck: &Speck<T>) -> crate::frame::CommandFrame {
    speck
        .frame(Command::GetInfo)
        .put_u8(COLOR_PALETTE_WRITE_OFFSET, NO_CHANGE)
        .put_u8(SCALE_WRITE_OFFSET, NO_CHANGE)
}

pub(crate) async fn read_config<T: HidTransport + 'static>(speck: &Speck<T>) -> Result<SpeckConfig> {
    let response = speck.transact(info_frame(speck)).await?;
    let raw: &InfoRaw = response.layout()?;
    Ok(SpeckConfig::from(raw))
}

pub(crate) async fn read_sample<T: HidTransport + 'static>(
    speck: &Speck<T>,
    kind: SampleKind,
) -> Result<Option<DataSample>> {
    let response = speck.transact(speck.frame(kind.command())).await?;
    let raw: &SampleRaw = response.layout()?;
    Ok(decode_sample(raw, speck.capabilities().has_humidity))
}

pub(crate) async fn write_logging_interval<T: HidTransport + 'static>(speck: &Speck<T>, seconds: u8) -> Result<bool> {
    let frame = info_frame(speck).put_u8(LOGGING_INTERVAL_WRITE_OFFSET, seconds);
    let response = speck.transact(frame).await?;
    let raw: &InfoRaw = response.layout()?;
    Ok(raw.logging_interval == seconds)
}

/// Deletes the sample at `timestamp`, or every sample when `None`.
pub(crate) async fn delete_samples<T: HidTransport + 'static>(speck: &Speck<T>, timestamp: Option<u32>) -> Result<bool> {
    let frame = speck.frame(Command::DeleteSample);
    let frame = match timestamp {
        Some(ts) => frame.put_u32(DELETE_TIMESTAMP_OFFSET, ts).put_u8(DELETE_MODE_OFFSET, DELETE_ONE),
        None => frame.put_u8(DELETE_MODE_OFFSET, DELETE_ALL),
    };
    let response = speck.transact(frame).await?;
    response.flag_at(DELETE_RESULT_OFFSET)
}

/// Result of writing the feed API key, as echoed by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedApiKeyUpdate {
    /// The echoed key matches the one sent.
    pub success: bool,
    pub is_enabled: bool,
    pub key: String,
}

/// Wi-Fi specific operations on a connected [`Speck`].
pub struct WifiSpeck<'a, T: HidTransport + 'static> {
    speck: &'a Speck<T>,
}

impl<'a, T: HidTransport + 'static> WifiSpeck<'a, T> {
    pub(crate) fn new(speck: &'a Speck<T>) -> Self {
        Self { speck }
    }

    pub fn speck(&self) -> &'a Speck<T> {
        self.speck
    }

    pub async fn get_wifi_status(&self) -> Result<WifiStatus> {
        let response = self.speck.transact(self.speck.frame(Command::GetWifiStatus)).await?;
        let raw: &WifiStatusRaw = response.layout()?;
        Ok(WifiStatus::from(raw))
    }

    /// Selects `palette` and reloads the config. Returns whether the reloaded config
    /// shows the new palette.
    pub async fn set_color_palette(&self, palette: ColorPalette) -> Result<bool> {
        self.speck.ensure_connected()?;
        let id = palette
            .id()
            .ok_or_else(|| SpeckError::Validation(format!("the {} palette cannot be selected", palette)))?;
        let frame = self
            .speck
            .frame(Command::GetInfo)
            .put_u8(COLOR_PALETTE_WRITE_OFFSET, id)
            .put_u8(SCALE_WRITE_OFFSET, NO_CHANGE);
        let response = self.speck.transact(frame).await?;
        let echoed = response.layout::<InfoRaw>()?.color_palette;
        if echoed != id {
            return Err(SpeckError::Unexpected(format!(
                "palette ID {} in the response, expected {}",
                echoed, id
            )));
        }
        let config = self.speck.get_config(true).await?;
        Ok(config.color_palette == Some(palette))
    }

    /// Switches to the other palette and returns the updated config.
    pub async fn toggle_color_palette(&self) -> Result<SpeckConfig> {
        let config = self.speck.get_config(false).await?;
        let next = config.color_palette.map_or(ColorPalette::Default, |p| p.toggled());
        if !self.set_color_palette(next).await? {
            warn!(palette = %next, "Palette change was not confirmed");
        }
        self.speck.get_config(false).await
    }

    pub async fn set_scale(&self, scale: Scale) -> Result<bool> {
        self.speck.ensure_connected()?;
        let id = scale
            .id()
            .ok_or_else(|| SpeckError::Validation(format!("the {} scale cannot be selected", scale)))?;
        let frame = self
            .speck
            .frame(Command::GetInfo)
            .put_u8(COLOR_PALETTE_WRITE_OFFSET, NO_CHANGE)
            .put_u8(SCALE_WRITE_OFFSET, id);
        let response = self.speck.transact(frame).await?;
        let echoed = response.layout::<InfoRaw>()?.scale;
        if echoed != id {
            return Err(SpeckError::Unexpected(format!(
                "scale ID {} in the response, expected {}",
                echoed, id
            )));
        }
        let config = self.speck.get_config(true).await?;
        Ok(config.scale == Some(scale))
    }

    pub async fn toggle_scale(&self) -> Result<SpeckConfig> {
        let config = self.speck.get_config(false).await?;
        let next = config.scale.map_or(Scale::Count, |s| s.toggled());
        if !self.set_scale(next).await? {
            warn!(scale = %next, "Scale change was not confirmed");
        }
        self.speck.get_config(false).await
    }

    pub async fn delete_all_samples(&self) -> Result<bool> {
        self.speck.ensure_connected()?;
        delete_samples(self.speck, None).await
    }

    /// Stores a 64 character hex feed API key and enables or disables uploads.
    pub async fn set_feed_api_key(&self, key: &str, enabled: bool) -> Result<FeedApiKeyUpdate> {
        self.speck.ensure_connected()?;
        if !FEED_API_KEY.is_match(key) {
            return Err(SpeckError::Validation(format!(
                "feed API key must be {} hex characters",
                FEED_API_KEY_LEN
            )));
        }
        let frame = self
            .speck
            .frame(Command::SetFeedApiKey)
            .put_u8(FEED_KEY_ENABLED_WRITE_OFFSET, u8::from(enabled))
            .put_bytes(FEED_KEY_WRITE_OFFSET, key.as_bytes());
        let response = self.speck.transact(frame).await?;
        let echoed = response.ascii_string(FEED_KEY_READ_OFFSET, FEED_API_KEY_LEN);
        Ok(FeedApiKeyUpdate {
            success: echoed == key,
            is_enabled: response.flag_at(FEED_KEY_ENABLED_READ_OFFSET)?,
            key: echoed,
        })
    }

    pub async fn clear_feed_api_key(&self) -> Result<FeedApiKeyUpdate> {
        self.set_feed_api_key(&"0".repeat(FEED_API_KEY_LEN), false).await
    }

    /// Asks the radio to start scanning. Returns whether it reports a scan in progress.
    pub async fn initiate_wifi_scan(&self) -> Result<bool> {
        let response = self.speck.transact(self.speck.frame(Command::InitiateWifiScan)).await?;
        response.flag_at(STATUS_FLAG_OFFSET)
    }

    /// Reads up to `expected` scan results, stopping at the first empty entry.
    /// Duplicate SSIDs are dropped and the rest sorted strongest first.
    pub async fn get_available_networks(&self, expected: u8) -> Result<Vec<Network>> {
        self.speck.ensure_connected()?;
        let mut networks = Vec::with_capacity(usize::from(expected));
        for _ in 0..expected {
            let response = self.speck.transact(self.speck.frame(Command::GetAvailableNetwork)).await?;
            match response.layout::<AvailableNetworkRaw>()?.to_network() {
                Some(network) => networks.push(network),
                None => break,
            }
        }
        let found = networks.len();
        let networks = network::dedupe_and_sort(networks);
        if networks.len() != usize::from(expected) {
            warn!(expected, found, unique = networks.len(), "Unexpected number of available networks");
        }
        Ok(networks)
    }

    /// Starts a scan, polls the status until it finishes, then reads the results.
    pub async fn scan_and_get_available_networks(&self) -> Result<Vec<Network>> {
        if !self.initiate_wifi_scan().await? {
            return Err(SpeckError::ScanNotStarted);
        }
        let options = self.speck.options();
        let deadline = Instant::now() + options.scan_timeout;
        loop {
            let status = self.get_wifi_status().await?;
            if !status.is_scanning {
                info!(available = status.num_available_networks, "Wi-Fi scan finished");
                return self.get_available_networks(status.num_available_networks).await;
            }
            if Instant::now() > deadline {
                info!("Timed out waiting for the Wi-Fi scan");
                return Err(SpeckError::ScanTimeout(options.scan_timeout));
            }
            debug!("Waiting for the Wi-Fi scan to finish");
            tokio::time::sleep(options.scan_poll_interval).await;
        }
    }

    /// Asks the device to join `network`. Returns whether it reports joining.
    pub async fn join_network(&self, network: &Network) -> Result<bool> {
        self.speck.ensure_connected()?;
        network::validate_ssid(&network.ssid)?;
        network::validate_encryption(&network.encryption)?;
        let key = network::key_bytes(&network.encryption)?;
        debug!(ssid = %network.ssid, encryption = %network.encryption.kind, key_len = key.len(), "Joining network");

        let ssid = network.ssid.as_bytes();
        let frame = self
            .speck
            .frame(Command::JoinNetwork)
            .put_u8(JOIN_ENCRYPTION_OFFSET, u8::from(network.encryption.kind))
            .put_u8(JOIN_SSID_LEN_OFFSET, ssid.len() as u8)
            .put_u8(JOIN_KEY_LEN_OFFSET, key.len() as u8)
            .put_bytes(JOIN_SSID_OFFSET, ssid)
            .put_bytes(JOIN_KEY_OFFSET, &key);
        let response = self.speck.transact(frame).await?;
        response.flag_at(STATUS_FLAG_OFFSET)
    }

    async fn read_stored_network(&self, index: u8) -> Result<Option<Network>> {
        let frame = self
            .speck
            .frame(Command::GetStoredNetwork)
            .put_u8(STORED_NETWORK_INDEX_OFFSET, index);
        let response = self.speck.transact(frame).await?;
        Ok(response.layout::<StoredNetworkRaw>()?.to_network())
    }

    /// The stored network at `index`, or `None` if the slot is empty.
    pub async fn get_stored_network(&self, index: u8) -> Result<Option<Network>> {
        let status = self.get_wifi_status().await?;
        if status.num_stored_networks == 0 {
            return Err(SpeckError::Validation("no stored networks".to_string()));
        }
        if index >= status.num_stored_networks {
            return Err(SpeckError::Validation(format!(
                "stored network index {} must be below {}",
                index, status.num_stored_networks
            )));
        }
        self.read_stored_network(index).await
    }

    /// Every non-empty stored network. Entries that fail to read are skipped.
    pub async fn get_stored_networks(&self) -> Result<Vec<Network>> {
        let status = self.get_wifi_status().await?;
        let mut networks = Vec::new();
        for index in 0..status.num_stored_networks {
            match self.read_stored_network(index).await {
                Ok(Some(network)) => networks.push(network),
                Ok(None) => {}
                Err(e) => warn!(index, "Failed to read stored network: {}", e),
            }
        }
        Ok(networks)
    }

    /// Erases every stored network. Returns whether the device reports removal in progress.
    pub async fn remove_all_networks(&self) -> Result<bool> {
        let response = self.speck.transact(self.speck.frame(Command::RemoveAllNetworks)).await?;
        response.flag_at(STATUS_FLAG_OFFSET)
    }

    pub async fn get_upload_url(&self) -> Result<UploadUrl> {
        let frame = self
            .speck
            .frame(Command::UploadUrl)
            .put_u8(upload::MODE_OFFSET, upload::READ_MODE);
        let response = self.speck.transact(frame).await?;
        Ok(UploadUrl::from(response.layout::<UploadUrlRaw>()?))
    }

    /// Writes the upload URL and returns the value the device stored.
    pub async fn set_upload_url(&self, url: &UploadUrl) -> Result<UploadUrl> {
        self.speck.ensure_connected()?;
        if !self.speck.capabilities().can_mutate_upload_url {
            return Err(SpeckError::Unsupported("changing the upload URL"));
        }
        let url = url.normalized()?;
        let frame = self
            .speck
            .frame(Command::UploadUrl)
            .put_u8(upload::MODE_OFFSET, upload::WRITE_MODE)
            .put_u8(upload::PORT_LEN_OFFSET, url.port.len() as u8)
            .put_u8(upload::HOST_LEN_OFFSET, url.host.len() as u8)
            .put_u8(upload::PATH_LEN_OFFSET, url.path.len() as u8)
            .put_bytes(upload::PORT_OFFSET, url.port.as_bytes())
            .put_bytes(upload::HOST_OFFSET, url.host.as_bytes())
            .put_bytes(upload::PATH_OFFSET, url.path.as_bytes());
        let response = self.speck.transact(frame).await?;
        Ok(UploadUrl::from(response.layout::<UploadUrlRaw>()?))
    }

    /// Returns whether the device reports being in calibration mode.
    pub async fn enter_calibration_mode(&self) -> Result<bool> {
        let response = self
            .speck
            .transact(self.speck.frame(Command::EnterCalibrationMode))
            .await?;
        response.flag_at(STATUS_FLAG_OFFSET)
    }

    /// Restores factory settings. Every step runs even if an earlier one fails;
    /// failures are returned together as [`SpeckError::FactoryReset`].
    pub async fn factory_reset(&self, on_progress: impl FnMut(u8)) -> Result<()> {
        self.speck.ensure_connected()?;
        info!("Performing factory reset");
        let mut progress = ResetProgress::start(on_progress);
        for step in ResetStep::ALL {
            let outcome = self.run_reset_step(step).await;
            progress.record(step, outcome);
        }
        progress.finish()
    }

    async fn run_reset_step(&self, step: ResetStep) -> Result<bool> {
        match step {
            ResetStep::LoggingInterval => {
                self.speck
                    .set_logging_interval(i64::from(DEFAULT_LOGGING_INTERVAL_SECS))
                    .await
            }
            ResetStep::ColorPalette => self.set_color_palette(ColorPalette::Default).await,
            ResetStep::Scale => self.set_scale(Scale::Count).await,
            ResetStep::FeedApiKey => {
                let update = self.clear_feed_api_key().await?;
                Ok(update.success && !update.is_enabled)
            }
            ResetStep::StoredNetworks => self.remove_all_networks().await,
            ResetStep::Samples => self.delete_all_samples().await,
            ResetStep::UploadUrl => {
                if !self.speck.capabilities().can_mutate_upload_url {
                    info!("Upload URL cannot be changed on this Speck, skipping");
                    return Ok(true);
                }
                let default = UploadUrl::default();
                Ok(self.set_upload_url(&default).await? == default)
            }
        }
    }
}
