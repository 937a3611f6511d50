// ABOUTME: Output device resolution
// ABOUTME: Picks a named cpal device if given, else falls back to the host default

use crate::error::Error;
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;

/// Resolve the output device to bind to.
///
/// `device_id`, when present, is matched against `Device::name()` on the
/// default host. When absent, or when no device matches, the host's default
/// output device is used and a warning is logged for the mismatch case.
pub fn resolve_output_device(device_id: Option<&str>) -> Result<Device, Error> {
    let host = cpal::default_host();

    if let Some(wanted) = device_id {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::Output(e.to_string()))?;

        if let Some(device) = devices.find(|d| d.name().map(|n| n == wanted).unwrap_or(false)) {
            return Ok(device);
        }

        log::warn!(
            "requested output device '{}' not found, falling back to default",
            wanted
        );
    }

    host.default_output_device()
        .ok_or_else(|| Error::Output("no output device available".to_string()))
}
