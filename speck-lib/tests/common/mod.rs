//! Common test utilities: an in-memory HID transport and simulated Specks.

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use speck_lib::config::{ColorPalette, Scale, SpeckConfig};
#[allow(unused_imports)]
pub use speck_lib::constants::{USB_SPECK_ID, WIFI_SPECK_IDS};
#[allow(unused_imports)]
pub use speck_lib::error::{SpeckError, TransportError};
#[allow(unused_imports)]
pub use speck_lib::frame::{Command, checksum};
#[allow(unused_imports)]
pub use speck_lib::options::SpeckOptions;
#[allow(unused_imports)]
pub use speck_lib::transport::{Connection, DeviceDescriptor, DeviceEvent, HidTransport, UsbId};
#[allow(unused_imports)]
pub use speck_lib::{Speck, SpeckFactory, SpeckKind};
#[allow(unused_imports)]
pub use std::sync::{Arc, Mutex};
#[allow(unused_imports)]
pub use std::time::Duration;

#[allow(unused_imports)]
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use hex;

use std::collections::{HashMap, HashSet, VecDeque};
use tracing_subscriber::EnvFilter;

/// Decode hex string to bytes for testing
#[allow(dead_code)]
pub fn hex_to_bytes(hex_data: &str) -> Bytes {
    Bytes::from(hex::decode(hex_data).expect("Failed to decode hex"))
}

/// Routes library logs to the test harness; `RUST_LOG=debug` shows every report.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// What the simulated device does with one request.
#[allow(dead_code)]
pub enum Reply {
    Report(Vec<u8>),
    Delayed(Duration, Vec<u8>),
    Fail(String),
}

pub type Responder = Box<dyn FnMut(&[u8]) -> Reply + Send>;

/// Builds a response to `request`: same length and command byte, the request's
/// command ID echoed back, and a valid checksum.
#[allow(dead_code)]
pub fn reply_to(request: &[u8], fill: impl FnOnce(&mut [u8])) -> Vec<u8> {
    let len = request.len();
    let mut response = vec![0u8; len];
    response[0] = request[0];
    fill(&mut response);
    response[len - 1] = request[len - 1];
    response[len - 2] = checksum(&response[..len - 2]);
    response
}

#[derive(Default)]
struct MockState {
    responders: HashMap<String, Responder>,
    refused: HashSet<String>,
    open: HashMap<u32, String>,
    next_connection: u32,
    pending: HashMap<u32, VecDeque<Reply>>,
    sent: Vec<Vec<u8>>,
    disconnect_failures: usize,
}

/// Scripted in-memory transport. Each device answers through its responder.
#[derive(Default)]
pub struct MockTransport {
    devices: Vec<DeviceDescriptor>,
    state: Mutex<MockState>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, descriptor: DeviceDescriptor, responder: Responder) -> Self {
        self.state
            .get_mut()
            .unwrap()
            .responders
            .insert(descriptor.device_id.clone(), responder);
        self.devices.push(descriptor);
        self
    }

    /// Connection attempts to `device_id` fail at the transport.
    pub fn refusing(mut self, device_id: &str) -> Self {
        self.state.get_mut().unwrap().refused.insert(device_id.to_string());
        self
    }

    /// The next `count` disconnects fail and leave the connection open.
    pub fn fail_next_disconnects(&self, count: usize) {
        self.state.lock().unwrap().disconnect_failures = count;
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().sent.clone()
    }

    /// The command byte of every report sent so far.
    pub fn sent_commands(&self) -> Vec<u8> {
        self.sent().iter().map(|r| r[0]).collect()
    }

    pub fn open_connections(&self) -> usize {
        self.state.lock().unwrap().open.len()
    }
}

impl HidTransport for MockTransport {
    async fn enumerate(&self, filters: &[UsbId]) -> Result<Vec<DeviceDescriptor>, TransportError> {
        Ok(self
            .devices
            .iter()
            .filter(|d| filters.contains(&d.usb_id()))
            .cloned()
            .collect())
    }

    async fn connect(&self, device_id: &str) -> Result<Connection, TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.refused.contains(device_id) {
            return Err(TransportError::Other(format!("{} refused the connection", device_id)));
        }
        if !state.responders.contains_key(device_id) {
            return Err(TransportError::UnknownDevice(device_id.to_string()));
        }
        state.next_connection += 1;
        let connection_id = state.next_connection;
        state.open.insert(connection_id, device_id.to_string());
        Ok(Connection { connection_id })
    }

    async fn disconnect(&self, connection: Connection) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.disconnect_failures > 0 {
            state.disconnect_failures -= 1;
            return Err(TransportError::Other("busy".to_string()));
        }
        state.pending.remove(&connection.connection_id);
        state
            .open
            .remove(&connection.connection_id)
            .map(drop)
            .ok_or(TransportError::UnknownConnection(connection.connection_id))
    }

    async fn send(&self, connection: Connection, report_id: u8, data: &[u8]) -> Result<(), TransportError> {
        assert_eq!(report_id, 0, "Specks only use report 0");
        let mut state = self.state.lock().unwrap();
        let device_id = state
            .open
            .get(&connection.connection_id)
            .cloned()
            .ok_or(TransportError::UnknownConnection(connection.connection_id))?;
        state.sent.push(data.to_vec());
        let responder = state
            .responders
            .get_mut(&device_id)
            .ok_or_else(|| TransportError::UnknownDevice(device_id.clone()))?;
        let reply = responder(data);
        state
            .pending
            .entry(connection.connection_id)
            .or_default()
            .push_back(reply);
        Ok(())
    }

    async fn receive(&self, connection: Connection, max_len: usize) -> Result<(u8, Bytes), TransportError> {
        let reply = {
            let mut state = self.state.lock().unwrap();
            state
                .pending
                .get_mut(&connection.connection_id)
                .and_then(|q| q.pop_front())
        };
        match reply {
            Some(Reply::Report(mut bytes)) => {
                bytes.truncate(max_len);
                Ok((0, Bytes::from(bytes)))
            }
            Some(Reply::Delayed(delay, bytes)) => {
                tokio::time::sleep(delay).await;
                Ok((0, Bytes::from(bytes)))
            }
            Some(Reply::Fail(message)) => Err(TransportError::Other(message)),
            None => Err(TransportError::Other("no report pending".to_string())),
        }
    }
}

#[allow(dead_code)]
pub fn usb_descriptor(device_id: &str) -> DeviceDescriptor {
    DeviceDescriptor {
        vendor_id: USB_SPECK_ID.vendor_id,
        product_id: USB_SPECK_ID.product_id,
        device_id: device_id.to_string(),
    }
}

#[allow(dead_code)]
pub fn wifi_descriptor(device_id: &str) -> DeviceDescriptor {
    DeviceDescriptor {
        vendor_id: WIFI_SPECK_IDS[1].vendor_id,
        product_id: WIFI_SPECK_IDS[1].product_id,
        device_id: device_id.to_string(),
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub struct SimSample {
    pub time: u32,
    /// Count or concentration in tenths, depending on the device.
    pub value: u32,
    pub temperature: i16,
    pub humidity: u8,
    pub raw: u16,
    pub particle_count: u32,
}

#[allow(dead_code)]
impl SimSample {
    pub fn at(time: u32) -> Self {
        Self {
            time,
            value: 125,
            temperature: 215,
            humidity: 40,
            raw: 900,
            particle_count: 3000,
        }
    }
}

/// A USB Speck speaking protocol 1, 2 or 3.
#[allow(dead_code)]
pub struct UsbSpeckSim {
    pub protocol_version: u8,
    pub hardware_version: u8,
    pub firmware_version: u8,
    pub serial: [u8; 10],
    pub extended_id: [u8; 8],
    pub logging_interval: u8,
    pub current: Option<SimSample>,
    pub history: Vec<SimSample>,
}

#[allow(dead_code)]
impl UsbSpeckSim {
    pub fn new(protocol_version: u8) -> Self {
        Self {
            protocol_version,
            hardware_version: 2,
            firmware_version: 7,
            serial: [0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19],
            extended_id: [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7],
            logging_interval: 20,
            current: Some(SimSample::at(1_600_000_000)),
            history: vec![SimSample::at(1_500_000_000), SimSample::at(1_500_000_060)],
        }
    }

    pub fn shared(self) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(self))
    }

    pub fn responder(sim: &Arc<Mutex<Self>>) -> Responder {
        let sim = Arc::clone(sim);
        Box::new(move |request| Reply::Report(sim.lock().unwrap().respond(request)))
    }

    fn write_sample(&self, r: &mut [u8], sample: Option<SimSample>) {
        let Some(s) = sample else { return };
        r[1..5].copy_from_slice(&s.time.to_be_bytes());
        r[5..9].copy_from_slice(&s.value.to_be_bytes());
        r[9..11].copy_from_slice(&(s.temperature as u16).to_be_bytes());
        r[11] = s.humidity;
        r[12..14].copy_from_slice(&s.raw.to_be_bytes());
    }

    pub fn respond(&mut self, request: &[u8]) -> Vec<u8> {
        match Command::try_from(request[0]).expect("known command") {
            Command::GetInfo => {
                if request[5] != 0 && self.protocol_version >= 2 {
                    self.logging_interval = request[5];
                }
                reply_to(request, |r| {
                    if self.protocol_version < 3 {
                        r[1..11].copy_from_slice(&self.serial);
                    } else {
                        r[1..9].copy_from_slice(&self.serial[..8]);
                        r[10] = self.hardware_version;
                    }
                    r[11] = self.protocol_version;
                    r[12] = self.logging_interval;
                    r[13] = self.firmware_version;
                })
            }
            Command::GetExtendedInfo => reply_to(request, |r| r[1..9].copy_from_slice(&self.extended_id)),
            Command::GetCurrentSample => reply_to(request, |r| self.write_sample(r, self.current)),
            Command::GetHistoricalSample => reply_to(request, |r| self.write_sample(r, self.history.first().copied())),
            Command::GetSampleCount => {
                let count = self.history.len() as u32;
                reply_to(request, |r| r[1..5].copy_from_slice(&count.to_be_bytes()))
            }
            Command::DeleteSample => {
                let time = u32::from_be_bytes([request[5], request[6], request[7], request[8]]);
                let before = self.history.len();
                self.history.retain(|s| s.time != time);
                let deleted = self.history.len() < before;
                reply_to(request, |r| r[5] = u8::from(deleted))
            }
            other => panic!("USB Speck does not understand {}", other),
        }
    }
}

/// A Wi-Fi Speck with scan, join, stored-network and upload state.
#[allow(dead_code)]
pub struct WifiSpeckSim {
    pub protocol_version: u8,
    pub hardware_version: u8,
    pub firmware_version: u8,
    pub serial: [u8; 16],
    pub logging_interval: u8,
    pub palette: u8,
    pub scale: u8,
    pub feed_key: String,
    pub feed_key_enabled: bool,
    /// Whether `s` starts a scan.
    pub scan_starts: bool,
    /// Status polls that still report scanning after a scan starts.
    pub scan_polls: u32,
    pub scanning: bool,
    pub available: Vec<(String, u8, i16)>,
    next_available: usize,
    pub stored: Vec<Option<(String, u8)>>,
    pub joined: Option<(u8, Vec<u8>, Vec<u8>)>,
    pub upload: (String, String, String),
    pub calibrating: bool,
    pub connected_ip: Option<[u8; 4]>,
    pub current: Option<SimSample>,
    pub history: Vec<SimSample>,
    /// Commands answered with a transport failure.
    pub failing: HashSet<u8>,
    /// When false, every `D` reports that nothing was deleted.
    pub delete_succeeds: bool,
}

#[allow(dead_code)]
impl WifiSpeckSim {
    pub fn new(protocol_version: u8, hardware_version: u8) -> Self {
        Self {
            protocol_version,
            hardware_version,
            firmware_version: 12,
            serial: [0x5A; 16],
            logging_interval: 30,
            palette: 1,
            scale: 1,
            feed_key: "1".repeat(64),
            feed_key_enabled: true,
            scan_starts: true,
            scan_polls: 2,
            scanning: false,
            available: Vec::new(),
            next_available: 0,
            stored: Vec::new(),
            joined: None,
            upload: ("example.org".into(), "8080".into(), "/feed".into()),
            calibrating: false,
            connected_ip: None,
            current: Some(SimSample::at(1_650_000_000)),
            history: vec![SimSample::at(1_640_000_000)],
            failing: HashSet::new(),
            delete_succeeds: true,
        }
    }

    pub fn shared(self) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(self))
    }

    pub fn responder(sim: &Arc<Mutex<Self>>) -> Responder {
        let sim = Arc::clone(sim);
        Box::new(move |request| {
            let mut sim = sim.lock().unwrap();
            if sim.failing.contains(&request[0]) {
                return Reply::Fail(format!("injected failure for {:?}", char::from(request[0])));
            }
            Reply::Report(sim.respond(request))
        })
    }

    fn write_sample(r: &mut [u8], sample: Option<SimSample>) {
        let Some(s) = sample else { return };
        r[1..5].copy_from_slice(&s.time.to_be_bytes());
        r[5..9].copy_from_slice(&s.value.to_be_bytes());
        r[9..11].copy_from_slice(&s.temperature.to_be_bytes());
        r[11] = s.humidity;
        r[12..14].copy_from_slice(&s.raw.to_be_bytes());
        r[14..18].copy_from_slice(&s.particle_count.to_be_bytes());
    }

    fn write_upload(&self, r: &mut [u8]) {
        let (host, port, path) = &self.upload;
        r[1] = port.len() as u8;
        r[2] = host.len() as u8;
        r[3] = path.len() as u8;
        r[4..4 + port.len()].copy_from_slice(port.as_bytes());
        r[9..9 + host.len()].copy_from_slice(host.as_bytes());
        r[49..49 + path.len()].copy_from_slice(path.as_bytes());
    }

    fn text(request: &[u8], offset: usize, len: usize) -> String {
        String::from_utf8(request[offset..offset + len].to_vec()).expect("ascii")
    }

    pub fn respond(&mut self, request: &[u8]) -> Vec<u8> {
        match Command::try_from(request[0]).expect("known command") {
            Command::GetInfo => {
                if request[5] != 0 {
                    self.logging_interval = request[5];
                }
                if request[6] != 255 {
                    self.palette = request[6];
                }
                if request[7] != 255 {
                    self.scale = request[7];
                }
                reply_to(request, |r| {
                    r[1..17].copy_from_slice(&self.serial);
                    r[17] = self.hardware_version;
                    r[18] = self.protocol_version;
                    r[19] = self.logging_interval;
                    r[20] = self.firmware_version;
                    r[21] = self.palette;
                    r[22] = self.scale;
                })
            }
            Command::GetCurrentSample => reply_to(request, |r| Self::write_sample(r, self.current)),
            Command::GetHistoricalSample => reply_to(request, |r| Self::write_sample(r, self.history.first().copied())),
            Command::GetSampleCount => {
                let count = self.history.len() as u32;
                reply_to(request, |r| r[1..5].copy_from_slice(&count.to_be_bytes()))
            }
            Command::DeleteSample => {
                let deleted = if !self.delete_succeeds {
                    false
                } else if request[9] == 255 {
                    self.history.clear();
                    true
                } else {
                    let time = u32::from_be_bytes([request[5], request[6], request[7], request[8]]);
                    let before = self.history.len();
                    self.history.retain(|s| s.time != time);
                    self.history.len() < before
                };
                reply_to(request, |r| r[5] = u8::from(deleted))
            }
            Command::GetWifiStatus => {
                if self.scanning {
                    if self.scan_polls == 0 {
                        self.scanning = false;
                    } else {
                        self.scan_polls -= 1;
                    }
                }
                reply_to(request, |r| {
                    r[1..7].copy_from_slice(&[0x00, 0x0C, 0x29, 0xAA, 0xBB, 0xCC]);
                    r[7] = u8::from(self.feed_key_enabled);
                    r[8..72].copy_from_slice(self.feed_key.as_bytes());
                    r[72] = 1;
                    r[73] = u8::from(self.scanning);
                    r[74] = self.available.len() as u8;
                    r[75] = self.stored.len() as u8;
                    r[78] = u8::from(self.connected_ip.is_some());
                    if let Some(ip) = self.connected_ip {
                        r[79..83].copy_from_slice(&ip);
                    }
                })
            }
            Command::SetFeedApiKey => {
                self.feed_key_enabled = request[5] == 1;
                self.feed_key = Self::text(request, 6, 64);
                reply_to(request, |r| {
                    r[1] = u8::from(self.feed_key_enabled);
                    r[2..66].copy_from_slice(self.feed_key.as_bytes());
                })
            }
            Command::InitiateWifiScan => {
                if self.scan_starts {
                    self.scanning = true;
                    self.next_available = 0;
                }
                reply_to(request, |r| r[1] = u8::from(self.scanning))
            }
            Command::GetAvailableNetwork => {
                let entry = self.available.get(self.next_available).cloned();
                self.next_available += 1;
                reply_to(request, |r| {
                    if let Some((ssid, encryption, rssi)) = entry {
                        r[1] = 1;
                        r[2] = encryption;
                        r[3] = ssid.len() as u8;
                        r[4..4 + ssid.len()].copy_from_slice(ssid.as_bytes());
                        r[36] = (rssi + 128) as u8;
                    }
                })
            }
            Command::JoinNetwork => {
                let ssid_len = usize::from(request[6]);
                let key_len = usize::from(request[7]);
                self.joined = Some((
                    request[5],
                    request[8..8 + ssid_len].to_vec(),
                    request[40..40 + key_len].to_vec(),
                ));
                reply_to(request, |r| r[1] = 1)
            }
            Command::GetStoredNetwork => {
                let entry = self.stored.get(usize::from(request[5])).cloned().flatten();
                reply_to(request, |r| {
                    if let Some((ssid, encryption)) = entry {
                        r[1] = encryption;
                        r[2] = ssid.len() as u8;
                        r[3..3 + ssid.len()].copy_from_slice(ssid.as_bytes());
                    }
                })
            }
            Command::RemoveAllNetworks => {
                self.stored.clear();
                reply_to(request, |r| r[1] = 1)
            }
            Command::UploadUrl => {
                if request[5] == 1 {
                    let port_len = usize::from(request[6]);
                    let host_len = usize::from(request[7]);
                    let path_len = usize::from(request[8]);
                    self.upload = (
                        Self::text(request, 14, host_len),
                        Self::text(request, 9, port_len),
                        Self::text(request, 54, path_len),
                    );
                }
                reply_to(request, |r| self.write_upload(r))
            }
            Command::EnterCalibrationMode => {
                self.calibrating = true;
                reply_to(request, |r| r[1] = 1)
            }
            Command::GetExtendedInfo => panic!("Wi-Fi Speck does not understand extended info"),
        }
    }
}

/// A connected Speck over a single simulated device.
#[allow(dead_code)]
pub async fn connected_usb(sim: UsbSpeckSim) -> (Arc<MockTransport>, Arc<Mutex<UsbSpeckSim>>, Speck<MockTransport>) {
    let sim = sim.shared();
    let transport = Arc::new(MockTransport::new().with_device(usb_descriptor("usb-1"), UsbSpeckSim::responder(&sim)));
    let speck = Speck::new(Arc::clone(&transport), usb_descriptor("usb-1"), SpeckKind::Usb);
    speck.connect().await.expect("connect");
    (transport, sim, speck)
}

#[allow(dead_code)]
pub async fn connected_wifi(
    sim: WifiSpeckSim,
) -> (Arc<MockTransport>, Arc<Mutex<WifiSpeckSim>>, Speck<MockTransport>) {
    let sim = sim.shared();
    let transport = Arc::new(MockTransport::new().with_device(wifi_descriptor("wifi-1"), WifiSpeckSim::responder(&sim)));
    let speck = Speck::new(Arc::clone(&transport), wifi_descriptor("wifi-1"), SpeckKind::Wifi);
    speck.connect().await.expect("connect");
    (transport, sim, speck)
}
