//! Fixed-length command/response reports.
//!
//! Every report is laid out as `[command][unix time u32][payload...][checksum][command id]`
//! with big-endian multi-byte fields. The checksum is the low byte of the sum of
//! everything before the two-byte trailer.

use crate::constants::TIMESTAMP_OFFSET;
use crate::error::{Result, SpeckError};
use bytes::{Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use rand::Rng;
use std::sync::atomic::{AtomicU8, Ordering};
use strum_macros::Display;
use tracing::warn;
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// Opcode placed at offset 0 of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Command {
    /// Reads the device info. Also carries logging interval, palette and scale writes.
    #[strum(to_string = "get info")]
    GetInfo = 0x49, // 'I'
    #[strum(to_string = "get extended info")]
    GetExtendedInfo = 0x69, // 'i'
    #[strum(to_string = "get current sample")]
    GetCurrentSample = 0x53, // 'S'
    #[strum(to_string = "get historical sample")]
    GetHistoricalSample = 0x47, // 'G'
    #[strum(to_string = "get sample count")]
    GetSampleCount = 0x50, // 'P'
    #[strum(to_string = "delete sample")]
    DeleteSample = 0x44, // 'D'
    #[strum(to_string = "get wifi status")]
    GetWifiStatus = 0x77, // 'w'
    #[strum(to_string = "set feed api key")]
    SetFeedApiKey = 0x6B, // 'k'
    #[strum(to_string = "initiate wifi scan")]
    InitiateWifiScan = 0x73, // 's'
    #[strum(to_string = "get available network")]
    GetAvailableNetwork = 0x6E, // 'n'
    #[strum(to_string = "join network")]
    JoinNetwork = 0x6A, // 'j'
    #[strum(to_string = "get stored network")]
    GetStoredNetwork = 0x74, // 't'
    #[strum(to_string = "remove all networks")]
    RemoveAllNetworks = 0x72, // 'r'
    #[strum(to_string = "upload url")]
    UploadUrl = 0x75, // 'u'
    #[strum(to_string = "enter calibration mode")]
    EnterCalibrationMode = 0x63, // 'c'
}

/// Low 8 bits of the byte sum.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Reads up to `len` bytes starting at `offset` as ASCII, stopping at the first
/// byte outside the printable range `0x20..=0x7E`.
pub fn read_ascii_string(bytes: &[u8], offset: usize, len: usize) -> String {
    let start = offset.min(bytes.len());
    let end = offset.saturating_add(len).min(bytes.len());
    let span = &bytes[start..end];
    let printable = span.iter().take_while(|b| (0x20..=0x7E).contains(*b)).count();
    if printable < span.len() {
        warn!(offset, len, kept = printable, "Truncated non-printable ASCII string");
    }
    span[..printable].iter().map(|b| char::from(*b)).collect()
}

/// Rotating correlation IDs in `1..=255`. Zero is never produced.
#[derive(Debug)]
pub struct CommandIdSequence {
    last: AtomicU8,
}

impl CommandIdSequence {
    /// Seeds the sequence with a random value in `1..=255`.
    pub fn random() -> Self {
        Self::starting_after(rand::thread_rng().gen_range(1..=255))
    }

    /// The first call to [`next`](Self::next) returns the successor of `seed`.
    pub fn starting_after(seed: u8) -> Self {
        Self { last: AtomicU8::new(seed) }
    }

    pub fn next(&self) -> u8 {
        let step = |id: u8| if id == u8::MAX { 1 } else { id + 1 };
        let previous = self
            .last
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| Some(step(id)))
            .unwrap_or_else(|id| id);
        step(previous)
    }
}

/// Builder for an outgoing report.
#[derive(Debug, Clone)]
pub struct CommandFrame {
    command: Command,
    buf: BytesMut,
}

impl CommandFrame {
    /// Creates a zeroed report of `report_len` bytes stamped with the current Unix time.
    pub fn new(command: Command, report_len: usize) -> Self {
        let now = u32::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
        Self::with_time(command, report_len, now)
    }

    pub fn with_time(command: Command, report_len: usize, unix_time: u32) -> Self {
        let mut buf = BytesMut::zeroed(report_len);
        buf[0] = command.into();
        buf[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 4].copy_from_slice(&unix_time.to_be_bytes());
        Self { command, buf }
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Payload bytes written so far, trailer included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn put_u8(mut self, offset: usize, value: u8) -> Self {
        self.buf[offset] = value;
        self
    }

    pub fn put_u32(self, offset: usize, value: u32) -> Self {
        self.put_bytes(offset, &value.to_be_bytes())
    }

    pub fn put_bytes(mut self, offset: usize, bytes: &[u8]) -> Self {
        self.buf[offset..offset + bytes.len()].copy_from_slice(bytes);
        self
    }

    /// Writes the command ID and checksum trailer and freezes the report.
    pub fn seal(mut self, command_id: u8) -> Bytes {
        let len = self.buf.len();
        self.buf[len - 1] = command_id;
        self.buf[len - 2] = checksum(&self.buf[..len - 2]);
        self.buf.freeze()
    }
}

/// A response report whose command ID and checksum have been verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    bytes: Bytes,
}

impl ResponseFrame {
    /// Verifies the trailer of `bytes` against the ID of the command it answers.
    pub fn parse(bytes: Bytes, expected_id: u8) -> Result<Self> {
        let len = bytes.len();
        if len < 3 {
            return Err(SpeckError::NoData);
        }
        let actual_id = bytes[len - 1];
        if actual_id != expected_id {
            return Err(SpeckError::CommandIdMismatch {
                expected: expected_id,
                actual: actual_id,
            });
        }
        let expected_checksum = checksum(&bytes[..len - 2]);
        let actual_checksum = bytes[len - 2];
        if actual_checksum != expected_checksum {
            return Err(SpeckError::ChecksumMismatch {
                expected: expected_checksum,
                actual: actual_checksum,
            });
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn command_id(&self) -> u8 {
        self.bytes[self.bytes.len() - 1]
    }

    pub fn span(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.bytes.get(offset..offset + len).ok_or(SpeckError::ShortResponse {
            expected: offset + len,
            actual: self.bytes.len(),
        })
    }

    pub fn u8_at(&self, offset: usize) -> Result<u8> {
        Ok(self.span(offset, 1)?[0])
    }

    /// `true` only when the byte at `offset` is exactly 1.
    pub fn flag_at(&self, offset: usize) -> Result<bool> {
        Ok(self.u8_at(offset)? == 1)
    }

    pub fn u16_at(&self, offset: usize) -> Result<u16> {
        let b = self.span(offset, 2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u32_at(&self, offset: usize) -> Result<u32> {
        let b = self.span(offset, 4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn hex_span(&self, offset: usize, len: usize) -> Result<String> {
        Ok(hex::encode(self.span(offset, len)?))
    }

    pub fn ascii_string(&self, offset: usize, len: usize) -> String {
        read_ascii_string(&self.bytes, offset, len)
    }

    /// Views the front of the report as a fixed layout.
    pub fn layout<R: FromBytes + KnownLayout + Immutable>(&self) -> Result<&R> {
        R::ref_from_prefix(&self.bytes)
            .map(|(layout, _)| layout)
            .map_err(|_| SpeckError::ShortResponse {
                expected: size_of::<R>(),
                actual: self.bytes.len(),
            })
    }
}
