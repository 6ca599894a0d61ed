//! Report layouts of the USB Speck (16-byte reports, protocol versions 1 to 3).

use crate::capabilities::Capabilities;
use crate::config::{ColorPalette, Scale, SpeckConfig};
use crate::device::Speck;
use crate::error::Result;
use crate::frame::Command;
use crate::sample::{DataSample, SampleKind};
use crate::transport::HidTransport;
use zerocopy::byteorder::big_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

const HARDWARE_VERSION_OFFSET: usize = 10;
const PROTOCOL_VERSION_OFFSET: usize = 11;
const LOGGING_INTERVAL_READ_OFFSET: usize = 12;
const FIRMWARE_VERSION_OFFSET: usize = 13;
const SERIAL_OFFSET: usize = 1;
const LEGACY_SERIAL_LEN: usize = 10;
const SERIAL_LEN: usize = 8;
const EXTENDED_ID_LEN: usize = 8;

const LOGGING_INTERVAL_WRITE_OFFSET: usize = 5;
const DELETE_TIMESTAMP_OFFSET: usize = 5;
const DELETE_RESULT_OFFSET: usize = 5;

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct SampleRaw {
    pub command: u8,
    pub sample_time: U32,
    /// Particle count up to protocol 2, concentration in tenths from protocol 3.
    pub count_or_concentration: U32,
    pub temperature: U16,
    pub humidity: u8,
    pub raw_particle_count: U16,
}

pub(crate) async fn read_config<T: HidTransport + 'static>(speck: &Speck<T>) -> Result<SpeckConfig> {
    let response = speck.transact(speck.frame(Command::GetInfo)).await?;
    let protocol_version = response.u8_at(PROTOCOL_VERSION_OFFSET)?;

    let mut config = SpeckConfig {
        id: String::new(),
        protocol_version,
        logging_interval_secs: 1,
        firmware_version: None,
        hardware_version: None,
        color_palette: Some(ColorPalette::Legacy),
        scale: Some(Scale::LegacyConcentration),
    };

    if protocol_version < 3 {
        config.id = response.hex_span(SERIAL_OFFSET, LEGACY_SERIAL_LEN)?;
        // protocol 1 devices always log once per second and don't report it
        if protocol_version >= 2 {
            config.logging_interval_secs = response.u8_at(LOGGING_INTERVAL_READ_OFFSET)?;
        }
        return Ok(config);
    }

    config.logging_interval_secs = response.u8_at(LOGGING_INTERVAL_READ_OFFSET)?;
    config.hardware_version = Some(response.u8_at(HARDWARE_VERSION_OFFSET)?);
    config.firmware_version = Some(response.u8_at(FIRMWARE_VERSION_OFFSET)?);

    let extended = speck.transact(speck.frame(Command::GetExtendedInfo)).await?;
    config.id = response.hex_span(SERIAL_OFFSET, SERIAL_LEN)? + &extended.hex_span(SERIAL_OFFSET, EXTENDED_ID_LEN)?;
    Ok(config)
}

pub(crate) async fn read_sample<T: HidTransport + 'static>(
    speck: &Speck<T>,
    kind: SampleKind,
) -> Result<Option<DataSample>> {
    let response = speck.transact(speck.frame(kind.command())).await?;
    let raw: &SampleRaw = response.layout()?;
    Ok(decode_sample(raw, &speck.capabilities()))
}

/// Decodes a sample report. A zero timestamp means the device had no sample.
pub fn decode_sample(raw: &SampleRaw, caps: &Capabilities) -> Option<DataSample> {
    let sample_time_secs = raw.sample_time.get();
    if sample_time_secs == 0 {
        return None;
    }
    let value = raw.count_or_concentration.get();
    Some(DataSample {
        sample_time_secs,
        raw_particle_count: raw.raw_particle_count.get(),
        humidity: caps.has_humidity.then_some(raw.humidity),
        temperature: caps.has_temperature.then(|| f64::from(raw.temperature.get())),
        particle_count: caps.has_particle_count.then_some(value),
        particle_concentration: caps.has_particle_concentration.then(|| f64::from(value) / 10.0),
    })
}

pub(crate) async fn write_logging_interval<T: HidTransport + 'static>(speck: &Speck<T>, seconds: u8) -> Result<bool> {
    let frame = speck.frame(Command::GetInfo).put_u8(LOGGING_INTERVAL_WRITE_OFFSET, seconds);
    let response = speck.transact(frame).await?;
    Ok(response.u8_at(LOGGING_INTERVAL_READ_OFFSET)? == seconds)
}

pub(crate) async fn delete_sample<T: HidTransport + 'static>(speck: &Speck<T>, timestamp: u32) -> Result<bool> {
    let frame = speck.frame(Command::DeleteSample).put_u32(DELETE_TIMESTAMP_OFFSET, timestamp);
    let response = speck.transact(frame).await?;
    response.flag_at(DELETE_RESULT_OFFSET)
}
