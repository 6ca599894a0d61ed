use crate::capabilities::Capabilities;
use crate::frame::Command;
use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::Display;

/// One particle reading. Which optional fields are present depends on the
/// device's [`Capabilities`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSample {
    pub sample_time_secs: u32,
    pub raw_particle_count: u16,
    pub humidity: Option<u8>,
    pub temperature: Option<f64>,
    pub particle_count: Option<u32>,
    pub particle_concentration: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SampleKind {
    Current,
    Historical,
}

impl SampleKind {
    pub fn command(&self) -> Command {
        match self {
            SampleKind::Current => Command::GetCurrentSample,
            SampleKind::Historical => Command::GetHistoricalSample,
        }
    }
}

/// CSV columns, in export order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SampleField {
    #[strum(to_string = "sample_timestamp_utc_secs")]
    SampleTime,
    #[strum(to_string = "temperature")]
    Temperature,
    #[strum(to_string = "humidity")]
    Humidity,
    #[strum(to_string = "raw_particles")]
    RawParticles,
    #[strum(to_string = "particle_count")]
    ParticleCount,
    #[strum(to_string = "particle_concentration")]
    ParticleConcentration,
}

impl SampleField {
    pub const ALL: [SampleField; 6] = [
        SampleField::SampleTime,
        SampleField::Temperature,
        SampleField::Humidity,
        SampleField::RawParticles,
        SampleField::ParticleCount,
        SampleField::ParticleConcentration,
    ];

    fn is_supported(&self, caps: &Capabilities) -> bool {
        match self {
            SampleField::SampleTime | SampleField::RawParticles => true,
            SampleField::Temperature => caps.has_temperature,
            SampleField::Humidity => caps.has_humidity,
            SampleField::ParticleCount => caps.has_particle_count,
            SampleField::ParticleConcentration => caps.has_particle_concentration,
        }
    }
}

/// The columns a device with `caps` produces.
pub fn csv_fields(caps: &Capabilities) -> Vec<SampleField> {
    SampleField::ALL.into_iter().filter(|f| f.is_supported(caps)).collect()
}

pub fn csv_header(caps: &Capabilities) -> Vec<String> {
    csv_fields(caps).iter().map(ToString::to_string).collect()
}

impl DataSample {
    pub fn sample_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::from(self.sample_time_secs), 0)
    }

    pub fn value(&self, field: SampleField) -> Option<String> {
        match field {
            SampleField::SampleTime => Some(self.sample_time_secs.to_string()),
            SampleField::Temperature => self.temperature.map(|v| v.to_string()),
            SampleField::Humidity => self.humidity.map(|v| v.to_string()),
            SampleField::RawParticles => Some(self.raw_particle_count.to_string()),
            SampleField::ParticleCount => self.particle_count.map(|v| v.to_string()),
            SampleField::ParticleConcentration => self.particle_concentration.map(|v| v.to_string()),
        }
    }

    /// Values in column order, skipping fields this sample lacks.
    pub fn csv_values(&self) -> Vec<String> {
        SampleField::ALL.into_iter().filter_map(|f| self.value(f)).collect()
    }
}
