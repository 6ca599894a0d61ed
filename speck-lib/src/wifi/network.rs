//! Wi-Fi network descriptors, join validation and scan-result ordering.

use crate::error::{Result, SpeckError};
use num_enum::{FromPrimitive, IntoPrimitive};
use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::LazyLock;
use strum_macros::Display;
use tracing::warn;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

pub const MAX_SSID_LEN: usize = 32;
pub const MAX_KEY_LEN: usize = 32;

const HEX_WEP_KEY_LENS: [usize; 3] = [10, 26, 32];
const ASCII_WEP_KEY_LENS: [usize; 3] = [5, 13, 16];

static HEX_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i)[0-9a-f]+$").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum EncryptionType {
    Open = 0,
    #[strum(to_string = "WEP")]
    Wep = 1,
    #[strum(to_string = "WPA")]
    Wpa = 2,
    #[strum(to_string = "WPA2")]
    Wpa2 = 3,
    #[num_enum(catch_all)]
    Unknown(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Encryption {
    pub kind: EncryptionType,
    pub key: Option<String>,
}

impl Encryption {
    pub fn open() -> Self {
        Self { kind: EncryptionType::Open, key: None }
    }

    pub fn with_key(kind: EncryptionType, key: impl Into<String>) -> Self {
        Self { kind, key: Some(key.into()) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
pub enum SignalLevel {
    Excellent,
    Good,
    Fair,
    Weak,
    Negligible,
}

impl SignalLevel {
    pub fn id(&self) -> u8 {
        *self as u8
    }

    pub fn from_rssi(rssi: i16) -> Self {
        match rssi {
            r if r >= -50 => SignalLevel::Excellent,
            r if r >= -60 => SignalLevel::Good,
            r if r >= -70 => SignalLevel::Fair,
            r if r >= -80 => SignalLevel::Weak,
            _ => SignalLevel::Negligible,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SignalStrength {
    pub level: SignalLevel,
    pub rssi: i16,
}

impl SignalStrength {
    /// The device reports RSSI offset by 128.
    pub fn from_raw(raw: u8) -> Self {
        let rssi = i16::from(raw) - 128;
        Self { level: SignalLevel::from_rssi(rssi), rssi }
    }
}

/// A network seen in a scan, stored on the device, or to be joined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Network {
    pub ssid: String,
    pub encryption: Encryption,
    /// Only known for networks returned by a scan.
    pub signal_strength: Option<SignalStrength>,
}

impl Network {
    pub fn new(ssid: impl Into<String>, encryption: Encryption) -> Self {
        Self {
            ssid: ssid.into(),
            encryption,
            signal_strength: None,
        }
    }
}

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct AvailableNetworkRaw {
    pub command: u8,
    pub is_valid: u8,
    pub encryption: u8,
    pub ssid_len: u8,
    pub ssid: [u8; 32],
    pub signal_strength: u8,
}

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct StoredNetworkRaw {
    pub command: u8,
    pub encryption: u8,
    pub ssid_len: u8,
    pub ssid: [u8; 32],
}

fn clamped_ssid(bytes: &[u8; 32], reported_len: u8) -> String {
    let len = usize::from(reported_len);
    if len > MAX_SSID_LEN {
        warn!(reported_len, "SSID length exceeds {} bytes, clamping", MAX_SSID_LEN);
    }
    crate::frame::read_ascii_string(bytes, 0, len.min(MAX_SSID_LEN))
}

impl AvailableNetworkRaw {
    /// `None` for the invalid or unnamed entry that marks the end of the scan results.
    pub fn to_network(&self) -> Option<Network> {
        if self.is_valid != 1 || self.ssid_len == 0 {
            return None;
        }
        Some(Network {
            ssid: clamped_ssid(&self.ssid, self.ssid_len),
            encryption: Encryption {
                kind: EncryptionType::from(self.encryption),
                key: None,
            },
            signal_strength: Some(SignalStrength::from_raw(self.signal_strength)),
        })
    }
}

impl StoredNetworkRaw {
    /// `None` when the slot is empty.
    pub fn to_network(&self) -> Option<Network> {
        if self.ssid_len == 0 {
            return None;
        }
        Some(Network::new(
            clamped_ssid(&self.ssid, self.ssid_len),
            Encryption {
                kind: EncryptionType::from(self.encryption),
                key: None,
            },
        ))
    }
}

pub fn validate_ssid(ssid: &str) -> Result<()> {
    if ssid.is_empty() || ssid.len() > MAX_SSID_LEN {
        return Err(SpeckError::Validation(format!(
            "SSID must be 1 to {} bytes long, got {}",
            MAX_SSID_LEN,
            ssid.len()
        )));
    }
    Ok(())
}

pub fn is_valid_hex_wep_key(key: &str) -> bool {
    HEX_WEP_KEY_LENS.contains(&key.len()) && HEX_KEY.is_match(key)
}

pub fn is_valid_ascii_wep_key(key: &str) -> bool {
    key.is_ascii() && ASCII_WEP_KEY_LENS.contains(&key.len())
}

pub fn validate_encryption(encryption: &Encryption) -> Result<()> {
    let key = encryption.key.as_deref().unwrap_or_default();
    let valid = match encryption.kind {
        EncryptionType::Open => true,
        EncryptionType::Wep => is_valid_hex_wep_key(key) || is_valid_ascii_wep_key(key),
        EncryptionType::Wpa | EncryptionType::Wpa2 => !key.is_empty() && key.len() <= MAX_KEY_LEN,
        EncryptionType::Unknown(_) => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SpeckError::Validation(format!(
            "invalid key for {} encryption",
            encryption.kind
        )))
    }
}

/// The key bytes to transmit for a join. Hex WEP keys go over the wire as raw
/// bytes; every other key is sent as ASCII. Open networks send no key.
pub fn key_bytes(encryption: &Encryption) -> Result<Vec<u8>> {
    let key = encryption.key.as_deref().unwrap_or_default();
    match encryption.kind {
        EncryptionType::Open => Ok(Vec::new()),
        EncryptionType::Wep if is_valid_hex_wep_key(key) => {
            hex::decode(key).map_err(|e| SpeckError::Validation(format!("invalid hex WEP key: {}", e)))
        }
        _ => Ok(key.as_bytes().to_vec()),
    }
}

/// Strongest signal first, then case-insensitive SSID, then encryption ID.
pub fn compare_networks(a: &Network, b: &Network) -> Ordering {
    let rssi = |n: &Network| n.signal_strength.map_or(i16::MIN, |s| s.rssi);
    rssi(b)
        .cmp(&rssi(a))
        .then_with(|| a.ssid.to_lowercase().cmp(&b.ssid.to_lowercase()))
        .then_with(|| u8::from(a.encryption.kind).cmp(&u8::from(b.encryption.kind)))
}

/// Drops repeated SSIDs (the first one seen wins) and sorts the rest.
pub fn dedupe_and_sort(networks: Vec<Network>) -> Vec<Network> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Network> = networks.into_iter().filter(|n| seen.insert(n.ssid.clone())).collect();
    unique.sort_by(compare_networks);
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanned(ssid: &str, rssi: i16, kind: EncryptionType) -> Network {
        Network {
            ssid: ssid.to_string(),
            encryption: Encryption { kind, key: None },
            signal_strength: Some(SignalStrength {
                level: SignalLevel::from_rssi(rssi),
                rssi,
            }),
        }
    }

    #[test]
    fn test_sort_by_signal_then_ssid() {
        let networks = vec![
            scanned("b", -40, EncryptionType::Wpa2),
            scanned("a", -70, EncryptionType::Wpa2),
            scanned("A", -40, EncryptionType::Wpa2),
        ];
        let sorted = dedupe_and_sort(networks);
        let order: Vec<(&str, i16)> = sorted
            .iter()
            .map(|n| (n.ssid.as_str(), n.signal_strength.map(|s| s.rssi).unwrap_or_default()))
            .collect();
        assert_eq!(order, vec![("A", -40), ("b", -40), ("a", -70)]);
    }

    #[test]
    fn test_sort_groups_by_rssi_before_ssid() {
        let mut networks = vec![
            scanned("b", -40, EncryptionType::Wpa),
            scanned("a", -70, EncryptionType::Wpa),
            scanned("a", -40, EncryptionType::Wpa),
        ];
        networks.sort_by(compare_networks);
        let order: Vec<(&str, i16)> = networks
            .iter()
            .map(|n| (n.ssid.as_str(), n.signal_strength.map(|s| s.rssi).unwrap_or_default()))
            .collect();
        assert_eq!(order, vec![("a", -40), ("b", -40), ("a", -70)]);
    }

    #[test]
    fn test_sort_breaks_ties_by_encryption() {
        let mut networks = vec![
            scanned("net", -55, EncryptionType::Wpa2),
            scanned("NET", -55, EncryptionType::Open),
        ];
        networks.sort_by(compare_networks);
        assert_eq!(networks[0].encryption.kind, EncryptionType::Open);
    }

    #[test]
    fn test_duplicate_ssid_first_wins() {
        let sorted = dedupe_and_sort(vec![
            scanned("home", -75, EncryptionType::Wpa),
            scanned("home", -45, EncryptionType::Wpa2),
        ]);
        assert_eq!(sorted.len(), 1);
        assert_eq!(sorted[0].encryption.kind, EncryptionType::Wpa);
    }

    #[test]
    fn test_signal_levels() {
        assert_eq!(SignalStrength::from_raw(128 - 50).level, SignalLevel::Excellent);
        assert_eq!(SignalStrength::from_raw(128 - 51).level, SignalLevel::Good);
        assert_eq!(SignalStrength::from_raw(128 - 70).level, SignalLevel::Fair);
        assert_eq!(SignalStrength::from_raw(128 - 80).level, SignalLevel::Weak);
        assert_eq!(SignalStrength::from_raw(0).level, SignalLevel::Negligible);
        assert_eq!(SignalStrength::from_raw(0).rssi, -128);
        assert_eq!(SignalLevel::Negligible.id(), 4);
    }

    #[test]
    fn test_ssid_validation() {
        assert!(validate_ssid("").is_err());
        assert!(validate_ssid(&"x".repeat(33)).is_err());
        assert!(validate_ssid(&"x".repeat(32)).is_ok());
    }

    #[test]
    fn test_wep_keys() {
        assert!(validate_encryption(&Encryption::with_key(EncryptionType::Wep, "0123456789")).is_ok());
        assert!(validate_encryption(&Encryption::with_key(EncryptionType::Wep, "ABCDEF0123456789abcdef0123")).is_ok());
        assert!(validate_encryption(&Encryption::with_key(EncryptionType::Wep, "hello")).is_ok());
        assert!(validate_encryption(&Encryption::with_key(EncryptionType::Wep, "helloworld")).is_err());
        assert!(validate_encryption(&Encryption::with_key(EncryptionType::Wep, "0123")).is_err());
    }

    #[test]
    fn test_wpa_key_lengths() {
        assert!(validate_encryption(&Encryption::with_key(EncryptionType::Wpa2, "p")).is_ok());
        assert!(validate_encryption(&Encryption::with_key(EncryptionType::Wpa2, "p".repeat(32))).is_ok());
        assert!(validate_encryption(&Encryption::with_key(EncryptionType::Wpa2, "p".repeat(33))).is_err());
        assert!(validate_encryption(&Encryption { kind: EncryptionType::Wpa, key: None }).is_err());
        assert!(validate_encryption(&Encryption::open()).is_ok());
    }

    #[test]
    fn test_hex_wep_key_sent_as_bytes() {
        let bytes = key_bytes(&Encryption::with_key(EncryptionType::Wep, "0a0B0c0D0e")).unwrap();
        assert_eq!(bytes, vec![0x0A, 0x0B, 0x0C, 0x0D, 0x0E]);
        let bytes = key_bytes(&Encryption::with_key(EncryptionType::Wep, "abcde")).unwrap();
        assert_eq!(bytes, b"abcde".to_vec());
    }

    #[test]
    fn test_stored_entry_with_zero_length_is_empty() {
        let raw = StoredNetworkRaw {
            command: b't',
            encryption: 3,
            ssid_len: 0,
            ssid: [0; 32],
        };
        assert!(raw.to_network().is_none());
    }

    #[test]
    fn test_unknown_encryption_round_trips_id() {
        let kind = EncryptionType::from(9);
        assert_eq!(kind, EncryptionType::Unknown(9));
        assert_eq!(u8::from(kind), 9);
    }
}
