//! Device Types and State
//!
//! Represents the Android UE devices attached to the lab host.

/// Device state as reported by `adb devices`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Device is online and ready
    Online,
    /// Device is offline
    Offline,
    /// Device is not authorized (need to accept on device)
    Unauthorized,
    /// Unknown state
    Unknown,
}

impl DeviceState {
    pub fn from_token(token: &str) -> Self {
        match token {
            "device" => DeviceState::Online,
            "offline" => DeviceState::Offline,
            "unauthorized" => DeviceState::Unauthorized,
            _ => DeviceState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Online => "device",
            DeviceState::Offline => "offline",
            DeviceState::Unauthorized => "unauthorized",
            DeviceState::Unknown => "unknown",
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, DeviceState::Online)
    }
}

/// An attached device, identified by its bridge-assigned serial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub serial: String,
    pub state: DeviceState,
}

impl Device {
    pub fn is_usable(&self) -> bool {
        self.state.is_usable()
    }
}

/// Parse `adb devices` output: the header line is discarded, each remaining
/// line carries `<serial>\t<state>`.
pub fn parse_device_list(raw: &str) -> Vec<Device> {
    let mut devices = Vec::new();

    for line in raw.lines().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut parts = line.split_whitespace();
        let Some(serial) = parts.next() else {
            continue;
        };
        let state = parts.next().map(DeviceState::from_token).unwrap_or(DeviceState::Unknown);

        devices.push(Device {
            serial: serial.to_string(),
            state,
        });
    }

    devices
}
