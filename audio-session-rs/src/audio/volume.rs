//! Per-session volume control using ISimpleAudioVolume.

use super::session::AudioError;
use windows::core::{Interface, GUID};
use windows::Win32::Media::Audio::{IAudioSessionControl, ISimpleAudioVolume};

/// Volume controller for a specific audio session.
pub struct SimpleVolume {
    simple_volume: ISimpleAudioVolume,
}

impl SimpleVolume {
    /// Create a SimpleVolume for the given session.
    pub fn new(session: &IAudioSessionControl) -> Result<Self, AudioError> {
        let simple_volume: ISimpleAudioVolume =
            session.cast().map_err(|_| AudioError::VolumeNotAvailable)?;

        Ok(Self { simple_volume })
    }

    /// Get the current mute state.
    pub fn is_muted(&self) -> Result<bool, AudioError> {
        unsafe {
            let muted = self.simple_volume.GetMute()?;
            Ok(muted.as_bool())
        }
    }

    /// Set the mute state.
    pub fn set_mute(&self, muted: bool, event_context: Option<GUID>) -> Result<(), AudioError> {
        let context = event_context.unwrap_or_else(GUID::zeroed);
        unsafe {
            self.simple_volume.SetMute(muted, &context)?;
        }
        Ok(())
    }

    /// Toggle the mute state. Returns the new state.
    pub fn toggle_mute(&self) -> Result<bool, AudioError> {
        let new_state = !self.is_muted()?;
        self.set_mute(new_state, None)?;
        Ok(new_state)
    }

    /// Get the current master volume (0.0 to 1.0).
    pub fn volume(&self) -> Result<f32, AudioError> {
        unsafe { Ok(self.simple_volume.GetMasterVolume()?) }
    }

    /// Set the master volume (0.0 to 1.0).
    pub fn set_volume(&self, level: f32, event_context: Option<GUID>) -> Result<(), AudioError> {
        if level.is_nan() {
            return Err(AudioError::InvalidArgument("volume level is NaN".to_string()));
        }

        let level = level.clamp(0.0, 1.0);
        let context = event_context.unwrap_or_else(GUID::zeroed);
        unsafe {
            self.simple_volume.SetMasterVolume(level, &context)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{BareSession, FakeSession};

    #[test]
    fn test_set_volume_clamps_to_range() {
        let session = FakeSession::new(1, "Player").into_session();
        let volume = SimpleVolume::new(&session).unwrap();

        volume.set_volume(1.5, None).unwrap();
        assert_eq!(volume.volume().unwrap(), 1.0);

        volume.set_volume(-0.2, None).unwrap();
        assert_eq!(volume.volume().unwrap(), 0.0);

        volume.set_volume(0.25, None).unwrap();
        assert_eq!(volume.volume().unwrap(), 0.25);
    }

    #[test]
    fn test_set_volume_rejects_nan() {
        let session = FakeSession::new(1, "Player").into_session();
        let volume = SimpleVolume::new(&session).unwrap();
        volume.set_volume(0.4, None).unwrap();

        let result = volume.set_volume(f32::NAN, None);

        assert!(matches!(result, Err(AudioError::InvalidArgument(_))));
        assert_eq!(volume.volume().unwrap(), 0.4);
    }

    #[test]
    fn test_toggle_mute_returns_new_state() {
        let session = FakeSession::new(1, "Player").into_session();
        let volume = SimpleVolume::new(&session).unwrap();

        assert!(volume.toggle_mute().unwrap());
        assert!(volume.is_muted().unwrap());
        assert!(!volume.toggle_mute().unwrap());
        assert!(!volume.is_muted().unwrap());
    }

    #[test]
    fn test_session_without_volume_interface() {
        let session: IAudioSessionControl = BareSession.into();
        assert!(matches!(
            SimpleVolume::new(&session),
            Err(AudioError::VolumeNotAvailable)
        ));
    }
}
