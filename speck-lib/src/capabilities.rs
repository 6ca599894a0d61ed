//! Feature flags derived from the device variant and its reported versions.

use crate::device::SpeckKind;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub has_wifi: bool,
    pub can_enter_calibration_mode: bool,
    pub can_mutate_logging_interval: bool,
    pub can_get_number_of_data_samples: bool,
    pub has_temperature: bool,
    pub has_humidity: bool,
    pub has_particle_count: bool,
    pub has_particle_concentration: bool,
    pub has_device_version_info: bool,
    pub has_extended_id: bool,
    pub can_delete_all_samples: bool,
    pub can_select_color_palette: bool,
    pub can_select_scale: bool,
    pub can_mutate_upload_url: bool,
}

/// Computes the capability set. A version that has not been read yet makes every
/// flag gated on it `false`.
pub fn capabilities(kind: SpeckKind, protocol_version: Option<u8>, hardware_version: Option<u8>) -> Capabilities {
    let protocol_at_least = |v: u8| protocol_version.is_some_and(|pv| pv >= v);
    let protocol_at_most = |v: u8| protocol_version.is_some_and(|pv| pv <= v);

    match kind {
        SpeckKind::Usb => Capabilities {
            can_mutate_logging_interval: protocol_at_least(2),
            can_get_number_of_data_samples: protocol_at_least(2),
            has_temperature: protocol_at_most(2),
            has_humidity: true,
            has_particle_count: protocol_at_most(2),
            has_particle_concentration: protocol_at_least(3),
            has_device_version_info: protocol_at_least(3),
            has_extended_id: protocol_at_least(3),
            ..Capabilities::default()
        },
        SpeckKind::Wifi => Capabilities {
            has_wifi: true,
            can_enter_calibration_mode: true,
            can_mutate_logging_interval: true,
            can_get_number_of_data_samples: true,
            has_temperature: true,
            // early Wi-Fi boards shipped without a humidity sensor
            has_humidity: hardware_version.is_some_and(|hv| hv >= 6),
            has_particle_count: true,
            has_particle_concentration: true,
            has_device_version_info: true,
            has_extended_id: true,
            can_delete_all_samples: true,
            can_select_color_palette: true,
            can_select_scale: true,
            can_mutate_upload_url: protocol_at_least(2),
        },
    }
}
