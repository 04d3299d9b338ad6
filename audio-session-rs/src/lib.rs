//! Windows Audio Session - Library
//!
//! Exposes the Windows Core Audio session API to Rust and, through the
//! companion FFI crate, to .NET.
//!
//! ## Features
//!
//! - Session manager for the default multimedia render endpoint (or any flow/role)
//! - Notification when a new audio session is created
//! - Session state, display name, icon, grouping, process id and ducking
//! - Per-session volume and mute
//! - Per-session change events
//! - Launching a process under the user of another running process

pub mod audio;
pub mod process;

pub use audio::{
    AudioError, DataFlow, DeviceRole, DisconnectReason, HResult, SessionEvent, SessionInfo,
    SessionState,
};
pub use process::{build_command_line, LaunchOptions, ProcessError};

#[cfg(windows)]
pub use audio::{
    with_mta, ChannelHandler, ComGuard, MtaUsage, SessionControl, SessionCreatedHandler,
    SessionManager, SessionNotificationHook, SimpleVolume,
};
#[cfg(windows)]
pub use process::start_as_same_user;
