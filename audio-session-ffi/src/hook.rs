//! Session notification hook exported to .NET.
//!
//! The hook owns a session manager and a registered notification client.
//! New sessions are forwarded to a caller-supplied callback as raw
//! `IAudioSessionControl*` pointers.

use crate::{
    ffi_string, init_logging, parse_config, set_last_error, ErrorCode, FfiError,
    SessionListResponse,
};
use audio_session_rs::{
    with_mta, MtaUsage, SessionCreatedHandler, SessionManager, SessionNotificationHook,
};
use std::ffi::{c_char, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use tracing::info;
use windows::core::Interface;
use windows::Win32::Media::Audio::IAudioSessionControl;

/// Called on an OS worker thread for every session created on the watched
/// endpoint.
///
/// `session` is a borrowed `IAudioSessionControl*`, valid for the duration of
/// the call. Use audio_session_retain() to keep it longer.
pub type SessionCreatedCallback =
    unsafe extern "system" fn(session: *mut c_void, user_data: *mut c_void);

/// Opaque handle to a session hook. Actually points to a SessionHook struct.
pub type AudioSessionHookHandle = *mut c_void;

/// Forwards new sessions to a foreign callback.
struct ForeignHandler {
    callback: SessionCreatedCallback,
    user_data: *mut c_void,
}

// user_data belongs to the caller, who promises it may be used from the
// notification thread; it is only handed back, never dereferenced.
unsafe impl Send for ForeignHandler {}
unsafe impl Sync for ForeignHandler {}

impl SessionCreatedHandler for ForeignHandler {
    fn session_created(&self, session: &IAudioSessionControl) {
        unsafe {
            (self.callback)(session.as_raw(), self.user_data);
        }
    }
}

/// Internal hook state. Field order is drop order: unregister first, then
/// release the manager, then leave the apartment.
struct SessionHook {
    _notification: SessionNotificationHook,
    manager: SessionManager,
    _mta: MtaUsage,
}

unsafe fn hook_ref<'a>(handle: AudioSessionHookHandle) -> Result<&'a SessionHook, FfiError> {
    (handle as *const SessionHook)
        .as_ref()
        .ok_or_else(FfiError::invalid_handle)
}

// ============================================================================
// FFI Functions - Lifecycle
// ============================================================================

/// Create a session hook on the default multimedia render endpoint.
///
/// # Arguments
/// * `config_json` - JSON configuration string (can be null for defaults):
///   `{"log_level": "debug", "data_flow": "render", "role": "multimedia"}`
/// * `callback` - Invoked for every new session (must not be null)
/// * `user_data` - Passed back to `callback` unchanged
///
/// # Returns
/// Handle to the hook, or null on failure. Check audio_session_last_error_code() on failure.
///
/// # Safety
/// The returned handle must be freed with audio_session_hook_destroy().
/// `callback` and `user_data` must stay valid until then.
#[no_mangle]
pub unsafe extern "C" fn audio_session_hook_create(
    config_json: *const c_char,
    callback: Option<SessionCreatedCallback>,
    user_data: *mut c_void,
) -> AudioSessionHookHandle {
    crate::clear_last_error();

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let config = parse_config(config_json)?;
        init_logging(config.log_level.as_deref());

        let callback =
            callback.ok_or_else(|| FfiError::invalid_argument("Callback is null"))?;
        let (flow, role) = config.endpoint()?;

        let mta = MtaUsage::acquire()?;
        let manager = SessionManager::for_endpoint(flow, role)?;
        let notification = manager.watch(ForeignHandler {
            callback,
            user_data,
        })?;

        info!("Session hook created for {:?}/{:?}", flow, role);
        let hook = Box::new(SessionHook {
            _notification: notification,
            manager,
            _mta: mta,
        });
        Ok::<_, FfiError>(Box::into_raw(hook) as AudioSessionHookHandle)
    }));

    match result {
        Ok(Ok(handle)) => handle,
        Ok(Err(e)) => {
            e.record();
            ptr::null_mut()
        }
        Err(_) => {
            set_last_error(ErrorCode::Panic, "Panic during hook creation", None);
            ptr::null_mut()
        }
    }
}

/// Destroy a session hook. No callbacks are delivered after this returns.
///
/// May be called from any thread.
///
/// # Safety
/// The handle must have been created by audio_session_hook_create() and must not be used after this call.
#[no_mangle]
pub unsafe extern "C" fn audio_session_hook_destroy(handle: AudioSessionHookHandle) {
    if handle.is_null() {
        return;
    }

    let _ = panic::catch_unwind(|| {
        let _ = Box::from_raw(handle as *mut SessionHook);
    });
}

// ============================================================================
// FFI Functions - Session Enumeration
// ============================================================================

/// Get all sessions currently on the hooked endpoint.
///
/// # Returns
/// JSON string `{"sessions": [...]}`. Caller must free with audio_session_free_string().
/// Returns null on failure.
///
/// # Safety
/// `handle` must be a live handle from audio_session_hook_create().
#[no_mangle]
pub unsafe extern "C" fn audio_session_hook_list_sessions(
    handle: AudioSessionHookHandle,
) -> *mut c_char {
    ffi_string("session enumeration", || {
        let hook = hook_ref(handle)?;
        let sessions = with_mta(|| hook.manager.session_infos())?;
        Ok(serde_json::to_string(&SessionListResponse { sessions })?)
    })
}

/// Get the endpoint ID of the hooked device.
///
/// # Returns
/// Endpoint ID string. Caller must free with audio_session_free_string().
/// Returns null on failure.
///
/// # Safety
/// `handle` must be a live handle from audio_session_hook_create().
#[no_mangle]
pub unsafe extern "C" fn audio_session_hook_endpoint_id(
    handle: AudioSessionHookHandle,
) -> *mut c_char {
    ffi_string("endpoint lookup", || {
        let hook = hook_ref(handle)?;
        Ok(with_mta(|| hook.manager.endpoint_id())?)
    })
}
