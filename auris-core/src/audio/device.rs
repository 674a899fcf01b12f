//! Audio device enumeration and preference matching.

use serde::{Deserialize, Serialize};

/// Metadata about an audio input device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    /// Whether this is the system default input device.
    pub is_default: bool,
}

/// Whether a reported device name satisfies an operator preference.
///
/// Exact matches win; otherwise the comparison is case-insensitive and
/// accepts a substring, so "yeti" selects "Blue Yeti USB Microphone".
pub fn matches_preference(name: &str, preferred: &str) -> bool {
    if name == preferred {
        return true;
    }
    let name = name.trim().to_ascii_lowercase();
    let preferred = preferred.trim().to_ascii_lowercase();
    !preferred.is_empty() && name.contains(&preferred)
}

/// List all available audio input devices on the system, default first.
///
/// Returns an empty `Vec` if cpal is not available or no devices exist.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    match host.input_devices() {
        Ok(devices) => {
            let mut list = devices
                .enumerate()
                .map(|(idx, device)| {
                    let name = device
                        .name()
                        .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
                    let is_default = default_name.as_deref() == Some(name.as_str());
                    DeviceInfo { name, is_default }
                })
                .collect::<Vec<_>>();

            list.sort_by_key(|device| (!device.is_default, device.name.to_ascii_lowercase()));
            list
        }
        Err(e) => {
            tracing::warn!("failed to enumerate input devices: {e}");
            if let Some(default) = host.default_input_device() {
                let name = default
                    .name()
                    .unwrap_or_else(|_| "Default Input Device".to_string());
                vec![DeviceInfo {
                    name,
                    is_default: true,
                }]
            } else {
                vec![]
            }
        }
    }
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    vec![]
}

#[cfg(test)]
mod tests {
    use super::matches_preference;

    #[test]
    fn exact_names_match() {
        assert!(matches_preference("Blue Yeti USB Microphone", "Blue Yeti USB Microphone"));
    }

    #[test]
    fn substring_matching_ignores_case() {
        assert!(matches_preference("Blue Yeti USB Microphone", "yeti"));
        assert!(matches_preference("Microphone Array (Intel)", " ARRAY "));
    }

    #[test]
    fn unrelated_or_empty_preferences_do_not_match() {
        assert!(!matches_preference("Blue Yeti USB Microphone", "webcam"));
        assert!(!matches_preference("Blue Yeti USB Microphone", ""));
    }
}
