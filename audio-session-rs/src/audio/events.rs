//! Per-session change notifications using IAudioSessionEvents.

use super::session::{AudioError, DisconnectReason, SessionEvent, SessionState};
use std::sync::mpsc::Sender;
use tracing::debug;
use windows::core::{implement, GUID, PCWSTR};
use windows::Win32::Foundation::BOOL;
use windows::Win32::Media::Audio::{
    AudioSessionDisconnectReason, AudioSessionState, IAudioSessionControl, IAudioSessionEvents,
    IAudioSessionEvents_Impl,
};
// Re-export windows_core so the implement macro can find it
#[allow(unused_imports)]
use windows_core;

/// Events client that sends every session callback to a channel.
#[implement(IAudioSessionEvents)]
pub struct SessionEventsClient {
    sender: Sender<SessionEvent>,
}

impl SessionEventsClient {
    pub fn new(sender: Sender<SessionEvent>) -> Self {
        Self { sender }
    }
}

impl SessionEventsClient_Impl {
    fn send(&self, event: SessionEvent) {
        // The receiver going away is not an error for the OS caller.
        if self.sender.send(event).is_err() {
            debug!("session event receiver dropped");
        }
    }
}

unsafe fn pcwstr_to_string(value: &PCWSTR) -> String {
    if value.is_null() {
        String::new()
    } else {
        value.to_string().unwrap_or_default()
    }
}

impl IAudioSessionEvents_Impl for SessionEventsClient_Impl {
    fn OnDisplayNameChanged(
        &self,
        newdisplayname: &PCWSTR,
        _eventcontext: *const GUID,
    ) -> windows::core::Result<()> {
        let display_name = unsafe { pcwstr_to_string(newdisplayname) };
        self.send(SessionEvent::DisplayNameChanged { display_name });
        Ok(())
    }

    fn OnIconPathChanged(
        &self,
        newiconpath: &PCWSTR,
        _eventcontext: *const GUID,
    ) -> windows::core::Result<()> {
        let icon_path = unsafe { pcwstr_to_string(newiconpath) };
        self.send(SessionEvent::IconPathChanged { icon_path });
        Ok(())
    }

    fn OnSimpleVolumeChanged(
        &self,
        newvolume: f32,
        newmute: BOOL,
        _eventcontext: *const GUID,
    ) -> windows::core::Result<()> {
        self.send(SessionEvent::SimpleVolumeChanged {
            volume_level: newvolume,
            is_muted: newmute.as_bool(),
        });
        Ok(())
    }

    fn OnChannelVolumeChanged(
        &self,
        channelcount: u32,
        newchannelvolumearray: *const f32,
        changedchannel: u32,
        _eventcontext: *const GUID,
    ) -> windows::core::Result<()> {
        let channel_volumes = if newchannelvolumearray.is_null() {
            Vec::new()
        } else {
            unsafe {
                std::slice::from_raw_parts(newchannelvolumearray, channelcount as usize).to_vec()
            }
        };

        // (DWORD)-1 means every channel changed
        let changed_channel = (changedchannel != u32::MAX).then_some(changedchannel);

        self.send(SessionEvent::ChannelVolumeChanged {
            channel_volumes,
            changed_channel,
        });
        Ok(())
    }

    fn OnGroupingParamChanged(
        &self,
        newgroupingparam: *const GUID,
        _eventcontext: *const GUID,
    ) -> windows::core::Result<()> {
        let grouping_param = unsafe { newgroupingparam.as_ref() }
            .copied()
            .unwrap_or_else(GUID::zeroed);
        self.send(SessionEvent::GroupingParamChanged {
            grouping_param: format!("{grouping_param:?}"),
        });
        Ok(())
    }

    fn OnStateChanged(&self, newstate: AudioSessionState) -> windows::core::Result<()> {
        self.send(SessionEvent::StateChanged {
            state: SessionState::from_raw(newstate.0),
        });
        Ok(())
    }

    fn OnSessionDisconnected(
        &self,
        disconnectreason: AudioSessionDisconnectReason,
    ) -> windows::core::Result<()> {
        self.send(SessionEvent::Disconnected {
            reason: DisconnectReason::from_raw(disconnectreason.0),
        });
        Ok(())
    }
}

/// Registration of a [`SessionEventsClient`] on one session.
///
/// Unregisters when dropped.
pub struct SessionEventsRegistration {
    session: IAudioSessionControl,
    events: IAudioSessionEvents,
}

impl SessionEventsRegistration {
    pub fn register(
        session: &IAudioSessionControl,
        sender: Sender<SessionEvent>,
    ) -> Result<Self, AudioError> {
        let events: IAudioSessionEvents = SessionEventsClient::new(sender).into();
        unsafe {
            session
                .RegisterAudioSessionNotification(&events)
                .map_err(|e| AudioError::RegistrationFailed(e.into()))?;
        }

        Ok(Self {
            session: session.clone(),
            events,
        })
    }
}

impl Drop for SessionEventsRegistration {
    fn drop(&mut self) {
        unsafe {
            let _ = self.session.UnregisterAudioSessionNotification(&self.events);
        }
    }
}
