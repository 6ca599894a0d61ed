use std::time::Duration;

/// Tunables for a [`Speck`](crate::device::Speck) handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeckOptions {
    /// Delay between Wi-Fi status polls while a scan is running.
    pub scan_poll_interval: Duration,
    /// A scan still running after this long fails with a timeout.
    pub scan_timeout: Duration,
}

impl Default for SpeckOptions {
    fn default() -> Self {
        Self {
            scan_poll_interval: Duration::from_millis(200),
            scan_timeout: Duration::from_secs(15),
        }
    }
}
