use std::time::Duration;
use thiserror::Error;

/// Failures raised by a [`HidTransport`](crate::transport::HidTransport) implementation.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("USB error: {0}")]
    Usb(#[from] nusb::Error),

    #[error("USB transfer failed: {0}")]
    Transfer(#[from] nusb::transfer::TransferError),

    #[error("Timeout during USB operation: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("No device with ID {0:?} is attached")]
    UnknownDevice(String),

    #[error("Connection {0} is not open")]
    UnknownConnection(u32),

    #[error("{0}")]
    Other(String),
}

/// The primary error type for the `speck-lib` library.
#[derive(Error, Debug)]
pub enum SpeckError {
    #[error("Not connected to a Speck")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Command ID mismatch: expected {expected}, got {actual}")]
    CommandIdMismatch { expected: u8, actual: u8 },

    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("No data in the response")]
    NoData,

    #[error("Response too short: expected at least {expected} bytes, got {actual}")]
    ShortResponse { expected: usize, actual: usize },

    #[error("Invalid argument: {0}")]
    Validation(String),

    #[error("Operation not supported by this Speck: {0}")]
    Unsupported(&'static str),

    #[error("Timed out after {0:?} while scanning for Wi-Fi networks")]
    ScanTimeout(Duration),

    #[error("The Speck did not start scanning for Wi-Fi networks")]
    ScanNotStarted,

    #[error("Unexpected response: {0}")]
    Unexpected(String),

    #[error("Factory reset failed: {}", .0.join(" "))]
    FactoryReset(Vec<String>),

    #[error("Command queue closed before the response arrived")]
    QueueClosed,
}

pub type Result<T> = std::result::Result<T, SpeckError>;
