//! Audio module for Windows Core Audio session API interactions.
//!
//! This module provides session manager acquisition, new-session
//! notifications, per-session accessors, volume control and change events.

pub mod session;

#[cfg(windows)]
pub mod com;
#[cfg(windows)]
pub mod control;
#[cfg(windows)]
pub mod events;
#[cfg(windows)]
pub mod manager;
#[cfg(windows)]
pub mod notifications;
#[cfg(windows)]
pub mod volume;

#[cfg(all(windows, test))]
pub(crate) mod testing;

pub use session::{
    AudioError, DataFlow, DeviceRole, DisconnectReason, HResult, SessionEvent, SessionInfo,
    SessionState,
};

#[cfg(windows)]
pub use com::{with_mta, ComGuard, MtaUsage};
#[cfg(windows)]
pub use control::SessionControl;
#[cfg(windows)]
pub use events::{SessionEventsClient, SessionEventsRegistration};
#[cfg(windows)]
pub use manager::SessionManager;
#[cfg(windows)]
pub use notifications::{
    ChannelHandler, SessionCreatedHandler, SessionNotificationClient, SessionNotificationHook,
};
#[cfg(windows)]
pub use volume::SimpleVolume;
