//! In-process fakes of the Core Audio session interfaces for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use windows::core::{implement, Interface, GUID, HRESULT, PCWSTR, PWSTR};
use windows::Win32::Foundation::{BOOL, E_FAIL, E_INVALIDARG, E_NOTIMPL, S_FALSE};
use windows::Win32::Media::Audio::{
    AudioSessionState, IAudioSessionControl, IAudioSessionControl2, IAudioSessionControl2_Impl,
    IAudioSessionControl_Impl, IAudioSessionEnumerator, IAudioSessionEnumerator_Impl,
    IAudioSessionEvents, IAudioSessionManager2, IAudioSessionManager2_Impl,
    IAudioSessionManager_Impl, IAudioSessionNotification, IAudioVolumeDuckNotification,
    ISimpleAudioVolume, ISimpleAudioVolume_Impl,
};
use windows::Win32::System::Com::CoTaskMemAlloc;
// Re-export windows_core so the implement macro can find it
#[allow(unused_imports)]
use windows_core;

/// Copy `value` into a CoTaskMemAlloc buffer, the way the audio service
/// hands out strings.
fn co_string(value: &str) -> PWSTR {
    let wide: Vec<u16> = value.encode_utf16().chain(std::iter::once(0)).collect();
    unsafe {
        let buffer = CoTaskMemAlloc(wide.len() * std::mem::size_of::<u16>()) as *mut u16;
        if buffer.is_null() {
            return PWSTR::null();
        }
        buffer.copy_from_nonoverlapping(wide.as_ptr(), wide.len());
        PWSTR(buffer)
    }
}

/// A session that only implements IAudioSessionControl.
#[implement(IAudioSessionControl)]
pub(crate) struct BareSession;

impl IAudioSessionControl_Impl for BareSession_Impl {
    fn GetState(&self) -> windows::core::Result<AudioSessionState> {
        Ok(AudioSessionState(1))
    }
    fn GetDisplayName(&self) -> windows::core::Result<PWSTR> {
        Err(E_NOTIMPL.into())
    }
    fn SetDisplayName(&self, _value: &PCWSTR, _ctx: *const GUID) -> windows::core::Result<()> {
        Err(E_NOTIMPL.into())
    }
    fn GetIconPath(&self) -> windows::core::Result<PWSTR> {
        Err(E_NOTIMPL.into())
    }
    fn SetIconPath(&self, _value: &PCWSTR, _ctx: *const GUID) -> windows::core::Result<()> {
        Err(E_NOTIMPL.into())
    }
    fn GetGroupingParam(&self) -> windows::core::Result<GUID> {
        Err(E_NOTIMPL.into())
    }
    fn SetGroupingParam(&self, _override: *const GUID, _ctx: *const GUID) -> windows::core::Result<()> {
        Err(E_NOTIMPL.into())
    }
    fn RegisterAudioSessionNotification(
        &self,
        _events: Option<&IAudioSessionEvents>,
    ) -> windows::core::Result<()> {
        Err(E_NOTIMPL.into())
    }
    fn UnregisterAudioSessionNotification(
        &self,
        _events: Option<&IAudioSessionEvents>,
    ) -> windows::core::Result<()> {
        Err(E_NOTIMPL.into())
    }
}

/// A regular application session with a volume control.
#[implement(IAudioSessionControl2, ISimpleAudioVolume)]
pub(crate) struct FakeSession {
    process_id: u32,
    display_name: Mutex<String>,
    volume: Mutex<f32>,
    muted: AtomicBool,
}

impl FakeSession {
    pub(crate) fn new(process_id: u32, display_name: &str) -> Self {
        Self {
            process_id,
            display_name: Mutex::new(display_name.to_string()),
            volume: Mutex::new(0.8),
            muted: AtomicBool::new(false),
        }
    }

    /// The session as the OS would pass it to a notification.
    pub(crate) fn into_session(self) -> IAudioSessionControl {
        let control: IAudioSessionControl2 = self.into();
        control.cast().unwrap()
    }
}

impl IAudioSessionControl_Impl for FakeSession_Impl {
    fn GetState(&self) -> windows::core::Result<AudioSessionState> {
        Ok(AudioSessionState(1))
    }
    fn GetDisplayName(&self) -> windows::core::Result<PWSTR> {
        Ok(co_string(&self.display_name.lock().unwrap()))
    }
    fn SetDisplayName(&self, value: &PCWSTR, _ctx: *const GUID) -> windows::core::Result<()> {
        *self.display_name.lock().unwrap() = unsafe { value.to_string()? };
        Ok(())
    }
    fn GetIconPath(&self) -> windows::core::Result<PWSTR> {
        Ok(co_string("%windir%\\system32\\player.dll,-1"))
    }
    fn SetIconPath(&self, _value: &PCWSTR, _ctx: *const GUID) -> windows::core::Result<()> {
        Ok(())
    }
    fn GetGroupingParam(&self) -> windows::core::Result<GUID> {
        Ok(GUID::zeroed())
    }
    fn SetGroupingParam(&self, _override: *const GUID, _ctx: *const GUID) -> windows::core::Result<()> {
        Ok(())
    }
    fn RegisterAudioSessionNotification(
        &self,
        _events: Option<&IAudioSessionEvents>,
    ) -> windows::core::Result<()> {
        Ok(())
    }
    fn UnregisterAudioSessionNotification(
        &self,
        _events: Option<&IAudioSessionEvents>,
    ) -> windows::core::Result<()> {
        Ok(())
    }
}

impl IAudioSessionControl2_Impl for FakeSession_Impl {
    fn GetSessionIdentifier(&self) -> windows::core::Result<PWSTR> {
        Ok(co_string(&format!("player.exe|{}", self.process_id)))
    }
    fn GetSessionInstanceIdentifier(&self) -> windows::core::Result<PWSTR> {
        Ok(co_string(&format!("player.exe|{}|1", self.process_id)))
    }
    fn GetProcessId(&self) -> windows::core::Result<u32> {
        Ok(self.process_id)
    }
    fn IsSystemSoundsSession(&self) -> HRESULT {
        S_FALSE
    }
    fn SetDuckingPreference(&self, _optout: BOOL) -> windows::core::Result<()> {
        Ok(())
    }
}

impl ISimpleAudioVolume_Impl for FakeSession_Impl {
    fn SetMasterVolume(&self, level: f32, _ctx: *const GUID) -> windows::core::Result<()> {
        if !(0.0..=1.0).contains(&level) {
            return Err(E_INVALIDARG.into());
        }
        *self.volume.lock().unwrap() = level;
        Ok(())
    }
    fn GetMasterVolume(&self) -> windows::core::Result<f32> {
        Ok(*self.volume.lock().unwrap())
    }
    fn SetMute(&self, mute: BOOL, _ctx: *const GUID) -> windows::core::Result<()> {
        self.muted.store(mute.as_bool(), Ordering::SeqCst);
        Ok(())
    }
    fn GetMute(&self) -> windows::core::Result<BOOL> {
        Ok(self.muted.load(Ordering::SeqCst).into())
    }
}

#[implement(IAudioSessionEnumerator)]
struct FakeEnumerator {
    sessions: Vec<IAudioSessionControl>,
}

impl IAudioSessionEnumerator_Impl for FakeEnumerator_Impl {
    fn GetCount(&self) -> windows::core::Result<i32> {
        Ok(self.sessions.len() as i32)
    }
    fn GetSession(&self, index: i32) -> windows::core::Result<IAudioSessionControl> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.sessions.get(index).cloned())
            .ok_or_else(|| E_INVALIDARG.into())
    }
}

/// One call the session manager received, with the notification pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ManagerCall {
    Register(usize),
    Enumerate,
    Unregister(usize),
}

/// A session manager that records the calls made on it.
#[implement(IAudioSessionManager2)]
pub(crate) struct FakeManager {
    calls: Arc<Mutex<Vec<ManagerCall>>>,
    fail_enumeration: bool,
}

impl FakeManager {
    pub(crate) fn new(fail_enumeration: bool) -> (IAudioSessionManager2, Arc<Mutex<Vec<ManagerCall>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let manager = Self {
            calls: calls.clone(),
            fail_enumeration,
        };
        (manager.into(), calls)
    }

    fn record(&self, call: ManagerCall) {
        self.calls.lock().unwrap().push(call);
    }
}

fn raw_address(notification: Option<&IAudioSessionNotification>) -> usize {
    notification.map_or(0, |n| n.as_raw() as usize)
}

impl IAudioSessionManager_Impl for FakeManager_Impl {
    fn GetAudioSessionControl(
        &self,
        _session_guid: *const GUID,
        _stream_flags: u32,
    ) -> windows::core::Result<IAudioSessionControl> {
        Err(E_NOTIMPL.into())
    }
    fn GetSimpleAudioVolume(
        &self,
        _session_guid: *const GUID,
        _stream_flags: u32,
    ) -> windows::core::Result<ISimpleAudioVolume> {
        Err(E_NOTIMPL.into())
    }
}

impl IAudioSessionManager2_Impl for FakeManager_Impl {
    fn GetSessionEnumerator(&self) -> windows::core::Result<IAudioSessionEnumerator> {
        self.record(ManagerCall::Enumerate);
        if self.fail_enumeration {
            return Err(E_FAIL.into());
        }
        Ok(FakeEnumerator {
            sessions: Vec::new(),
        }
        .into())
    }
    fn RegisterSessionNotification(
        &self,
        notification: Option<&IAudioSessionNotification>,
    ) -> windows::core::Result<()> {
        self.record(ManagerCall::Register(raw_address(notification)));
        Ok(())
    }
    fn UnregisterSessionNotification(
        &self,
        notification: Option<&IAudioSessionNotification>,
    ) -> windows::core::Result<()> {
        self.record(ManagerCall::Unregister(raw_address(notification)));
        Ok(())
    }
    fn RegisterDuckNotification(
        &self,
        _session_id: &PCWSTR,
        _notification: Option<&IAudioVolumeDuckNotification>,
    ) -> windows::core::Result<()> {
        Err(E_NOTIMPL.into())
    }
    fn UnregisterDuckNotification(
        &self,
        _notification: Option<&IAudioVolumeDuckNotification>,
    ) -> windows::core::Result<()> {
        Err(E_NOTIMPL.into())
    }
}
