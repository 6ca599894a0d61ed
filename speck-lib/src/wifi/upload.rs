use crate::error::{Result, SpeckError};
use crate::frame::read_ascii_string;
use serde::Serialize;
use std::fmt;
use std::ops::RangeInclusive;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

pub const DEFAULT_HOST: &str = "esdr.cmucreatelab.org";
pub const DEFAULT_PORT: u32 = 80;
pub const DEFAULT_PATH: &str = "/api/v1/feed";

const HOST_LEN: RangeInclusive<usize> = 2..=40;
const PORT_LEN: RangeInclusive<usize> = 1..=5;
const PATH_LEN: RangeInclusive<usize> = 0..=40;

// Byte offsets of the write request.
pub(crate) const MODE_OFFSET: usize = 5;
pub(crate) const PORT_LEN_OFFSET: usize = 6;
pub(crate) const HOST_LEN_OFFSET: usize = 7;
pub(crate) const PATH_LEN_OFFSET: usize = 8;
pub(crate) const PORT_OFFSET: usize = 9;
pub(crate) const HOST_OFFSET: usize = 14;
pub(crate) const PATH_OFFSET: usize = 54;

pub(crate) const READ_MODE: u8 = 0;
pub(crate) const WRITE_MODE: u8 = 1;

/// Response layout shared by reads and writes.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct UploadUrlRaw {
    pub command: u8,
    pub port_len: u8,
    pub host_len: u8,
    pub path_len: u8,
    pub port: [u8; 5],
    pub host: [u8; 40],
    pub path: [u8; 40],
}

/// Where a Wi-Fi Speck posts its samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadUrl {
    pub host: String,
    /// Kept as text since the device stores it that way and may hold non-numeric garbage.
    pub port: String,
    pub path: String,
}

impl UploadUrl {
    pub fn new(host: impl Into<String>, port: u32, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: port.to_string(),
            path: path.into(),
        }
    }

    pub fn port_number(&self) -> Option<u32> {
        self.port.parse().ok()
    }

    pub fn validate(&self) -> Result<()> {
        self.normalized().map(drop)
    }

    /// The validated URL as it is written to the device, with the port in canonical
    /// decimal form (`"080"` becomes `"80"`).
    pub fn normalized(&self) -> Result<UploadUrl> {
        check_len("host", &self.host, HOST_LEN)?;
        let port = self
            .port_number()
            .ok_or_else(|| SpeckError::Validation(format!("port {:?} is not a number", self.port)))?
            .to_string();
        check_len("port", &port, PORT_LEN)?;
        check_len("path", &self.path, PATH_LEN)?;
        Ok(UploadUrl {
            host: self.host.clone(),
            port,
            path: self.path.clone(),
        })
    }
}

impl Default for UploadUrl {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT, DEFAULT_PATH)
    }
}

impl fmt::Display for UploadUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}{}", self.host, self.port, self.path)
    }
}

impl From<&UploadUrlRaw> for UploadUrl {
    fn from(raw: &UploadUrlRaw) -> Self {
        Self {
            host: read_ascii_string(&raw.host, 0, usize::from(raw.host_len)),
            port: read_ascii_string(&raw.port, 0, usize::from(raw.port_len)),
            path: read_ascii_string(&raw.path, 0, usize::from(raw.path_len)),
        }
    }
}

fn check_len(field: &str, value: &str, allowed: RangeInclusive<usize>) -> Result<()> {
    if !value.is_ascii() || !allowed.contains(&value.len()) {
        return Err(SpeckError::Validation(format!(
            "{} must be {} to {} ASCII characters, got {:?}",
            field,
            allowed.start(),
            allowed.end(),
            value
        )));
    }
    Ok(())
}
