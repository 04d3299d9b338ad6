//! Audio session data models.
//!
//! Defines the structures describing audio sessions, their state, the events
//! the OS reports about them, and the error type shared by the audio module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Direction of the audio endpoint (maps to Windows EDataFlow).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum DataFlow {
    /// Playback endpoints (speakers, headphones)
    #[default]
    Render = 0,

    /// Recording endpoints (microphones)
    Capture = 1,
}

/// Audio device role (maps to Windows ERole).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum DeviceRole {
    /// Used by games, system sounds, most general applications
    Console = 0,

    /// Used by music players, video players
    #[default]
    Multimedia = 1,

    /// Used by Teams, Zoom, Discord, and other VoIP applications
    Communications = 2,
}

impl FromStr for DataFlow {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "render" => Ok(DataFlow::Render),
            "capture" => Ok(DataFlow::Capture),
            other => Err(AudioError::InvalidArgument(format!("unknown data flow: {other}"))),
        }
    }
}

impl FromStr for DeviceRole {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(DeviceRole::Console),
            "multimedia" => Ok(DeviceRole::Multimedia),
            "communications" => Ok(DeviceRole::Communications),
            other => Err(AudioError::InvalidArgument(format!("unknown device role: {other}"))),
        }
    }
}

/// Session state (maps to Windows AudioSessionState).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No streams in the session are running
    #[default]
    Inactive = 0,

    /// At least one stream in the session is running
    Active = 1,

    /// The session has no streams left
    Expired = 2,
}

impl SessionState {
    /// Convert from the raw AudioSessionState value. Unknown values are Inactive.
    pub fn from_raw(value: i32) -> Self {
        match value {
            1 => SessionState::Active,
            2 => SessionState::Expired,
            _ => SessionState::Inactive,
        }
    }
}

/// Why a session was disconnected (maps to Windows AudioSessionDisconnectReason).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    DeviceRemoval = 0,
    ServerShutdown = 1,
    FormatChanged = 2,
    SessionLogoff = 3,
    SessionDisconnected = 4,
    ExclusiveModeOverride = 5,
}

impl DisconnectReason {
    /// Convert from the raw AudioSessionDisconnectReason value.
    pub fn from_raw(value: i32) -> Self {
        match value {
            0 => DisconnectReason::DeviceRemoval,
            1 => DisconnectReason::ServerShutdown,
            2 => DisconnectReason::FormatChanged,
            3 => DisconnectReason::SessionLogoff,
            5 => DisconnectReason::ExclusiveModeOverride,
            _ => DisconnectReason::SessionDisconnected,
        }
    }
}

/// Snapshot of an audio session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Owning process, or 0 for sessions spanning several processes
    pub process_id: u32,

    /// Display name set by the application (often empty)
    pub display_name: String,

    /// Icon resource path set by the application (often empty)
    pub icon_path: String,

    /// Identifier shared by all instances of the same session
    pub session_identifier: String,

    /// Identifier unique to this session instance
    pub session_instance_identifier: String,

    pub state: SessionState,

    /// Whether this is the system sounds session
    pub is_system_sounds: bool,

    /// Master volume as scalar (0.0 to 1.0)
    pub volume_level: f32,

    pub is_muted: bool,
}

/// Events reported by the Windows audio session API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A new session was created on the watched endpoint
    SessionCreated { session: SessionInfo },

    DisplayNameChanged { display_name: String },

    IconPathChanged { icon_path: String },

    /// Session master volume or mute changed
    SimpleVolumeChanged { volume_level: f32, is_muted: bool },

    /// Per-channel volume changed; `changed_channel` is None when all changed
    ChannelVolumeChanged {
        channel_volumes: Vec<f32>,
        changed_channel: Option<u32>,
    },

    GroupingParamChanged { grouping_param: String },

    StateChanged { state: SessionState },

    Disconnected { reason: DisconnectReason },
}

/// A failed HRESULT together with its system message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HResult {
    pub code: i32,
    pub message: String,
}

impl HResult {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.message.trim_end();
        if message.is_empty() {
            write!(f, "HRESULT 0x{:08X}", self.code as u32)
        } else {
            write!(f, "{} (0x{:08X})", message, self.code as u32)
        }
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for HResult {
    fn from(err: windows::core::Error) -> Self {
        Self::new(err.code().0, err.message().to_string())
    }
}

/// Audio session error types.
#[derive(Debug, Clone, Error)]
pub enum AudioError {
    #[error("COM initialization failed: {0}")]
    ComInitFailed(HResult),

    #[error("Failed to create device enumerator: {0}")]
    EnumeratorFailed(HResult),

    #[error("No default {flow:?} endpoint for the {role:?} role: {hr}")]
    NoDefaultEndpoint {
        flow: DataFlow,
        role: DeviceRole,
        hr: HResult,
    },

    #[error("Failed to activate session manager: {0}")]
    ActivationFailed(HResult),

    #[error("Failed to register session notification: {0}")]
    RegistrationFailed(HResult),

    #[error("Failed to enumerate sessions: {0}")]
    SessionEnumerationFailed(HResult),

    #[error("Session does not implement {interface}")]
    InterfaceNotSupported { interface: &'static str },

    #[error("Volume control not available for session")]
    VolumeNotAvailable,

    #[error("Windows API error: {0}")]
    WindowsError(HResult),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("String conversion error: {0}")]
    StringConversion(String),
}

impl AudioError {
    /// The HRESULT behind this error, if it came from a COM call.
    pub fn hresult(&self) -> Option<i32> {
        match self {
            AudioError::ComInitFailed(hr)
            | AudioError::EnumeratorFailed(hr)
            | AudioError::ActivationFailed(hr)
            | AudioError::RegistrationFailed(hr)
            | AudioError::SessionEnumerationFailed(hr)
            | AudioError::WindowsError(hr)
            | AudioError::NoDefaultEndpoint { hr, .. } => Some(hr.code),
            _ => None,
        }
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for AudioError {
    fn from(err: windows::core::Error) -> Self {
        AudioError::WindowsError(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_defaults_are_multimedia_render() {
        assert_eq!(DataFlow::default(), DataFlow::Render);
        assert_eq!(DeviceRole::default(), DeviceRole::Multimedia);
    }

    #[test]
    fn test_parse_flow_and_role() {
        assert_eq!(" Capture ".parse::<DataFlow>().unwrap(), DataFlow::Capture);
        assert_eq!(
            "communications".parse::<DeviceRole>().unwrap(),
            DeviceRole::Communications
        );
        assert!(matches!(
            "speakers".parse::<DataFlow>(),
            Err(AudioError::InvalidArgument(_))
        ));
        assert!("loud".parse::<DeviceRole>().is_err());
    }

    #[test]
    fn test_raw_state_conversion() {
        assert_eq!(SessionState::from_raw(0), SessionState::Inactive);
        assert_eq!(SessionState::from_raw(1), SessionState::Active);
        assert_eq!(SessionState::from_raw(2), SessionState::Expired);
        assert_eq!(SessionState::from_raw(42), SessionState::Inactive);
    }

    #[test]
    fn test_raw_disconnect_reason_conversion() {
        assert_eq!(DisconnectReason::from_raw(0), DisconnectReason::DeviceRemoval);
        assert_eq!(
            DisconnectReason::from_raw(5),
            DisconnectReason::ExclusiveModeOverride
        );
        assert_eq!(
            DisconnectReason::from_raw(-1),
            DisconnectReason::SessionDisconnected
        );
    }

    #[test]
    fn test_hresult_display() {
        let hr = HResult::new(0x8889_0004_u32 as i32, "The audio endpoint device has been unplugged.\r\n");
        assert_eq!(
            hr.to_string(),
            "The audio endpoint device has been unplugged. (0x88890004)"
        );
        assert_eq!(HResult::new(-2147467259, "").to_string(), "HRESULT 0x80004005");
    }

    #[test]
    fn test_error_hresult() {
        let err = AudioError::NoDefaultEndpoint {
            flow: DataFlow::Render,
            role: DeviceRole::Multimedia,
            hr: HResult::new(0x8007_0490_u32 as i32, "Element not found."),
        };
        assert_eq!(err.hresult(), Some(0x8007_0490_u32 as i32));
        assert_eq!(AudioError::VolumeNotAvailable.hresult(), None);
    }

    #[test]
    fn test_event_json_shape() {
        let event = SessionEvent::StateChanged {
            state: SessionState::Expired,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "state_changed");
        assert_eq!(json["state"], "expired");
    }
}
