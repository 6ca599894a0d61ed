use crate::frame::read_ascii_string;
use num_enum::{FromPrimitive, IntoPrimitive};
use serde::Serialize;
use std::net::Ipv4Addr;
use strum_macros::Display;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

pub const FEED_API_KEY_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ConnectionStatus {
    #[strum(to_string = "Not Connected")]
    NotConnected = 0,
    Connected = 1,
    Error = 2,
    #[num_enum(catch_all)]
    Unknown(u8),
}

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct WifiStatusRaw {
    pub command: u8,
    pub mac_address: [u8; 6],
    pub is_feed_api_key_enabled: u8,
    pub feed_api_key: [u8; FEED_API_KEY_LEN],
    pub is_initialized: u8,
    pub is_scanning: u8,
    pub num_available_networks: u8,
    pub num_stored_networks: u8,
    pub is_removing_networks: u8,
    pub is_joining_network: u8,
    pub connection_status: u8,
    pub ip_address: [u8; 4],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WifiStatus {
    /// Only reported while connected.
    pub ip_address: Option<Ipv4Addr>,
    pub mac_address: String,
    pub feed_api_key: String,
    pub is_feed_api_key_enabled: bool,
    pub is_initialized: bool,
    pub is_scanning: bool,
    pub num_available_networks: u8,
    pub num_stored_networks: u8,
    pub is_removing_networks: bool,
    pub is_joining_network: bool,
    pub connection_status: ConnectionStatus,
}

impl From<&WifiStatusRaw> for WifiStatus {
    fn from(raw: &WifiStatusRaw) -> Self {
        let connection_status = ConnectionStatus::from(raw.connection_status);
        Self {
            ip_address: (connection_status == ConnectionStatus::Connected).then(|| Ipv4Addr::from(raw.ip_address)),
            mac_address: hex::encode(raw.mac_address),
            feed_api_key: read_ascii_string(&raw.feed_api_key, 0, FEED_API_KEY_LEN),
            is_feed_api_key_enabled: raw.is_feed_api_key_enabled == 1,
            is_initialized: raw.is_initialized == 1,
            is_scanning: raw.is_scanning == 1,
            num_available_networks: raw.num_available_networks,
            num_stored_networks: raw.num_stored_networks,
            is_removing_networks: raw.is_removing_networks == 1,
            is_joining_network: raw.is_joining_network == 1,
            connection_status,
        }
    }
}
