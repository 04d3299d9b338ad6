//! Session accessors using IAudioSessionControl2.
//!
//! Thin wrappers over the OS calls: strings are converted and freed, GUID
//! event contexts default to GUID_NULL, and failures keep their HRESULT.

use super::com::take_co_string;
use super::events::SessionEventsRegistration;
use super::session::{AudioError, SessionEvent, SessionInfo, SessionState};
use super::volume::SimpleVolume;
use std::sync::mpsc::Sender;
use windows::core::{Interface, GUID, HSTRING};
use windows::Win32::Foundation::S_OK;
use windows::Win32::Media::Audio::{IAudioSessionControl, IAudioSessionControl2};

/// An audio session, as handed out by the session manager or a notification.
#[derive(Clone)]
pub struct SessionControl {
    control: IAudioSessionControl2,
}

impl SessionControl {
    /// Wrap a session control. Fails if the session lacks IAudioSessionControl2.
    pub fn new(session: &IAudioSessionControl) -> Result<Self, AudioError> {
        let control: IAudioSessionControl2 =
            session
                .cast()
                .map_err(|_| AudioError::InterfaceNotSupported {
                    interface: "IAudioSessionControl2",
                })?;

        Ok(Self { control })
    }

    pub fn state(&self) -> Result<SessionState, AudioError> {
        unsafe {
            let state = self.control.GetState()?;
            Ok(SessionState::from_raw(state.0))
        }
    }

    pub fn display_name(&self) -> Result<String, AudioError> {
        unsafe { take_co_string(self.control.GetDisplayName()?) }
    }

    pub fn set_display_name(
        &self,
        name: &str,
        event_context: Option<GUID>,
    ) -> Result<(), AudioError> {
        let context = event_context.unwrap_or_else(GUID::zeroed);
        unsafe {
            self.control
                .SetDisplayName(&HSTRING::from(name), &context)?;
        }
        Ok(())
    }

    pub fn icon_path(&self) -> Result<String, AudioError> {
        unsafe { take_co_string(self.control.GetIconPath()?) }
    }

    pub fn set_icon_path(&self, path: &str, event_context: Option<GUID>) -> Result<(), AudioError> {
        let context = event_context.unwrap_or_else(GUID::zeroed);
        unsafe {
            self.control.SetIconPath(&HSTRING::from(path), &context)?;
        }
        Ok(())
    }

    pub fn grouping_param(&self) -> Result<GUID, AudioError> {
        unsafe { Ok(self.control.GetGroupingParam()?) }
    }

    pub fn set_grouping_param(
        &self,
        grouping_param: GUID,
        event_context: Option<GUID>,
    ) -> Result<(), AudioError> {
        let context = event_context.unwrap_or_else(GUID::zeroed);
        unsafe {
            self.control.SetGroupingParam(&grouping_param, &context)?;
        }
        Ok(())
    }

    pub fn session_identifier(&self) -> Result<String, AudioError> {
        unsafe { take_co_string(self.control.GetSessionIdentifier()?) }
    }

    pub fn session_instance_identifier(&self) -> Result<String, AudioError> {
        unsafe { take_co_string(self.control.GetSessionInstanceIdentifier()?) }
    }

    /// Process owning the session.
    ///
    /// Multi-process sessions report AUDCLNT_S_NO_SINGLE_PROCESS, which is a
    /// success code; the id returned alongside it is passed through.
    pub fn process_id(&self) -> Result<u32, AudioError> {
        unsafe { Ok(self.control.GetProcessId()?) }
    }

    /// S_OK for the system sounds session, S_FALSE for any other.
    pub fn is_system_sounds_session(&self) -> bool {
        unsafe { self.control.IsSystemSoundsSession() == S_OK }
    }

    /// Opt the session in or out of automatic ducking.
    pub fn set_ducking_preference(&self, opt_out: bool) -> Result<(), AudioError> {
        unsafe {
            self.control.SetDuckingPreference(opt_out)?;
        }
        Ok(())
    }

    /// Volume control for this session.
    pub fn volume(&self) -> Result<SimpleVolume, AudioError> {
        SimpleVolume::new(&self.control.cast()?)
    }

    /// Take a snapshot of the session.
    pub fn info(&self) -> Result<SessionInfo, AudioError> {
        let (volume_level, is_muted) = match self.volume() {
            Ok(volume) => (volume.volume()?, volume.is_muted()?),
            Err(_) => (1.0, false),
        };

        Ok(SessionInfo {
            process_id: self.process_id()?,
            display_name: self.display_name()?,
            icon_path: self.icon_path()?,
            session_identifier: self.session_identifier()?,
            session_instance_identifier: self.session_instance_identifier()?,
            state: self.state()?,
            is_system_sounds: self.is_system_sounds_session(),
            volume_level,
            is_muted,
        })
    }

    /// Forward this session's change notifications to a channel until the
    /// returned registration is dropped.
    pub fn watch_events(
        &self,
        sender: Sender<SessionEvent>,
    ) -> Result<SessionEventsRegistration, AudioError> {
        SessionEventsRegistration::register(&self.control.cast()?, sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{BareSession, FakeSession};

    #[test]
    fn test_accessors_pass_through() {
        let session = FakeSession::new(77, "Player").into_session();
        let control = SessionControl::new(&session).unwrap();

        assert_eq!(control.process_id().unwrap(), 77);
        assert_eq!(control.state().unwrap(), SessionState::Active);
        assert!(!control.is_system_sounds_session());
        assert_eq!(
            control.session_instance_identifier().unwrap(),
            "player.exe|77|1"
        );

        control.set_display_name("Renamed", None).unwrap();
        assert_eq!(control.display_name().unwrap(), "Renamed");
        assert_eq!(control.info().unwrap().display_name, "Renamed");
    }

    #[test]
    fn test_session_without_control2_is_rejected() {
        let session: IAudioSessionControl = BareSession.into();
        assert!(matches!(
            SessionControl::new(&session),
            Err(AudioError::InterfaceNotSupported { .. })
        ));
    }
}
