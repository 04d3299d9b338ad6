//! Session manager acquisition using the Windows MMDevice API.
//!
//! Note: COM must be initialized before calling into this module.

use super::com::take_co_string;
use super::control::SessionControl;
use super::notifications::{SessionCreatedHandler, SessionNotificationHook};
use super::session::{AudioError, DataFlow, DeviceRole, SessionInfo};
use tracing::{debug, info, warn};
use windows::Win32::Media::Audio::{
    eCapture, eCommunications, eConsole, eMultimedia, eRender, EDataFlow, ERole,
    IAudioSessionManager2, IMMDevice, IMMDeviceEnumerator, MMDeviceEnumerator,
};
use windows::Win32::System::Com::{CoCreateInstance, CLSCTX_ALL};

fn to_edataflow(flow: DataFlow) -> EDataFlow {
    match flow {
        DataFlow::Render => eRender,
        DataFlow::Capture => eCapture,
    }
}

fn to_erole(role: DeviceRole) -> ERole {
    match role {
        DeviceRole::Console => eConsole,
        DeviceRole::Multimedia => eMultimedia,
        DeviceRole::Communications => eCommunications,
    }
}

/// Session manager for one audio endpoint.
#[derive(Clone)]
pub struct SessionManager {
    manager: IAudioSessionManager2,
    device: IMMDevice,
}

impl SessionManager {
    /// Session manager for the default multimedia render endpoint.
    pub fn default_render() -> Result<Self, AudioError> {
        Self::for_endpoint(DataFlow::Render, DeviceRole::Multimedia)
    }

    /// Session manager for the default endpoint of the given flow and role.
    pub fn for_endpoint(flow: DataFlow, role: DeviceRole) -> Result<Self, AudioError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                    .map_err(|e| AudioError::EnumeratorFailed(e.into()))?;

            let device = enumerator
                .GetDefaultAudioEndpoint(to_edataflow(flow), to_erole(role))
                .map_err(|e| AudioError::NoDefaultEndpoint {
                    flow,
                    role,
                    hr: e.into(),
                })?;

            let manager: IAudioSessionManager2 = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| AudioError::ActivationFailed(e.into()))?;

            info!("Acquired session manager for default {:?}/{:?} endpoint", flow, role);
            Ok(Self { manager, device })
        }
    }

    /// ID of the endpoint this manager belongs to.
    pub fn endpoint_id(&self) -> Result<String, AudioError> {
        unsafe { take_co_string(self.device.GetId()?) }
    }

    /// All sessions currently known on the endpoint.
    pub fn sessions(&self) -> Result<Vec<SessionControl>, AudioError> {
        unsafe {
            let enumerator = self
                .manager
                .GetSessionEnumerator()
                .map_err(|e| AudioError::SessionEnumerationFailed(e.into()))?;

            let count = enumerator
                .GetCount()
                .map_err(|e| AudioError::SessionEnumerationFailed(e.into()))?;

            let mut sessions = Vec::with_capacity(count.max(0) as usize);
            for i in 0..count {
                let session = enumerator
                    .GetSession(i)
                    .map_err(|e| AudioError::SessionEnumerationFailed(e.into()))?;

                match SessionControl::new(&session) {
                    Ok(control) => sessions.push(control),
                    Err(e) => warn!("Skipping session {}: {}", i, e),
                }
            }

            debug!("Enumerated {} sessions", sessions.len());
            Ok(sessions)
        }
    }

    /// Snapshots of all current sessions. Sessions that fail to read are skipped.
    pub fn session_infos(&self) -> Result<Vec<SessionInfo>, AudioError> {
        Ok(self
            .sessions()?
            .iter()
            .filter_map(|session| match session.info() {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!("Failed to read session: {}", e);
                    None
                }
            })
            .collect())
    }

    /// Forward sessions created on this endpoint to `handler` until the
    /// returned hook is dropped.
    pub fn watch(
        &self,
        handler: impl SessionCreatedHandler,
    ) -> Result<SessionNotificationHook, AudioError> {
        SessionNotificationHook::register(&self.manager, handler)
    }
}
