//! Looking up audio devices by the name a user typed.

use rodio::cpal;
use rodio::cpal::traits::DeviceTrait;

pub(crate) fn normalize_device_name(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

/// First device whose name matches `wanted`, ignoring case and surrounding
/// whitespace. On a miss, returns the names that were seen.
pub(crate) fn find_device<I>(devices: I, wanted: &str) -> Result<cpal::Device, Vec<String>>
where
    I: IntoIterator<Item = cpal::Device>,
{
    let wanted = normalize_device_name(wanted);
    let mut seen = Vec::new();
    for device in devices {
        let name = device.name().unwrap_or_else(|_| "<unnamed>".to_owned());
        if normalize_device_name(&name) == wanted {
            return Ok(device);
        }
        seen.push(name);
    }
    Err(seen)
}

pub(crate) fn describe_devices(names: &[String]) -> String {
    if names.is_empty() {
        "<none>".to_owned()
    } else {
        names.join(", ")
    }
}
