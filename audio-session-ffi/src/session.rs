//! Operations on raw `IAudioSessionControl*` pointers handed to .NET.
//!
//! Pointers arrive either borrowed (inside the session-created callback) or
//! retained with audio_session_retain(). Every retain must be balanced by one
//! audio_session_release().

use crate::{ffi_status, ffi_string, parse_c_str, write_out, FfiError, OperationResult, SessionResponse};
use audio_session_rs::{with_mta, SessionControl};
use std::ffi::{c_char, c_void};
use windows::core::Interface;
use windows::Win32::Media::Audio::IAudioSessionControl;

/// Borrow a session pointer without touching its reference count.
unsafe fn borrow_session(session: &*mut c_void) -> Result<&IAudioSessionControl, FfiError> {
    IAudioSessionControl::from_raw_borrowed(session).ok_or_else(FfiError::invalid_handle)
}

unsafe fn session_control(session: *mut c_void) -> Result<SessionControl, FfiError> {
    let session = borrow_session(&session)?;
    Ok(SessionControl::new(session)?)
}

// ============================================================================
// FFI Functions - Reference Counting
// ============================================================================

/// Take a reference on a session (IUnknown::AddRef).
///
/// # Returns
/// 0 on success, negative error code on failure.
///
/// # Safety
/// `session` must be a valid `IAudioSessionControl*`.
#[no_mangle]
pub unsafe extern "C" fn audio_session_retain(session: *mut c_void) -> i32 {
    ffi_status("session retain", || {
        let session = borrow_session(&session)?;
        std::mem::forget(session.clone());
        Ok(())
    })
}

/// Drop a reference taken with audio_session_retain() (IUnknown::Release).
///
/// # Safety
/// `session` must be a pointer previously retained and not yet released.
#[no_mangle]
pub unsafe extern "C" fn audio_session_release(session: *mut c_void) {
    if session.is_null() {
        return;
    }

    let _ = std::panic::catch_unwind(|| {
        drop(IAudioSessionControl::from_raw(session));
    });
}

// ============================================================================
// FFI Functions - Session Properties
// ============================================================================

/// Get a snapshot of a session.
///
/// # Returns
/// JSON string `{"session": {...}}`. Caller must free with audio_session_free_string().
/// Returns null on failure.
///
/// # Safety
/// `session` must be a valid `IAudioSessionControl*`.
#[no_mangle]
pub unsafe extern "C" fn audio_session_get_info(session: *mut c_void) -> *mut c_char {
    ffi_string("session info", || {
        let control = session_control(session)?;
        let info = with_mta(|| control.info())?;
        Ok(serde_json::to_string(&SessionResponse { session: info })?)
    })
}

/// Get the process that owns a session.
///
/// # Arguments
/// * `session` - Session pointer
/// * `process_id` - Receives the process ID (0 for multi-process sessions)
///
/// # Returns
/// 0 on success, negative error code on failure.
///
/// # Safety
/// `session` must be a valid `IAudioSessionControl*`; `process_id` must be writable.
#[no_mangle]
pub unsafe extern "C" fn audio_session_get_process_id(
    session: *mut c_void,
    process_id: *mut u32,
) -> i32 {
    ffi_status("get process id", || {
        let control = session_control(session)?;
        let pid = with_mta(|| control.process_id())?;
        write_out(process_id, pid)
    })
}

/// Set the display name of a session.
///
/// # Arguments
/// * `session` - Session pointer
/// * `display_name` - New display name (UTF-8 string)
///
/// # Returns
/// 0 on success, negative error code on failure.
///
/// # Safety
/// `session` must be a valid `IAudioSessionControl*`.
#[no_mangle]
pub unsafe extern "C" fn audio_session_set_display_name(
    session: *mut c_void,
    display_name: *const c_char,
) -> i32 {
    ffi_status("set display name", || {
        let name = parse_c_str(display_name)
            .ok_or_else(|| FfiError::invalid_argument("Invalid display name"))?;
        let control = session_control(session)?;
        Ok(with_mta(|| control.set_display_name(name, None))?)
    })
}

// ============================================================================
// FFI Functions - Session Volume
// ============================================================================

/// Get the master volume of a session.
///
/// # Arguments
/// * `session` - Session pointer
/// * `volume` - Receives the volume level (0.0 to 1.0)
///
/// # Returns
/// 0 on success, negative error code on failure.
///
/// # Safety
/// `session` must be a valid `IAudioSessionControl*`; `volume` must be writable.
#[no_mangle]
pub unsafe extern "C" fn audio_session_get_volume(session: *mut c_void, volume: *mut f32) -> i32 {
    ffi_status("get volume", || {
        let control = session_control(session)?;
        let level = with_mta(|| control.volume()?.volume())?;
        write_out(volume, level)
    })
}

/// Set the master volume of a session.
///
/// # Arguments
/// * `session` - Session pointer
/// * `volume` - Volume level (0.0 to 1.0)
///
/// # Returns
/// 0 on success, negative error code on failure.
///
/// # Safety
/// `session` must be a valid `IAudioSessionControl*`.
#[no_mangle]
pub unsafe extern "C" fn audio_session_set_volume(session: *mut c_void, volume: f32) -> i32 {
    ffi_status("set volume", || {
        let control = session_control(session)?;
        Ok(with_mta(|| control.volume()?.set_volume(volume, None))?)
    })
}

/// Get the mute state of a session.
///
/// # Arguments
/// * `session` - Session pointer
/// * `muted` - Receives 1 = muted, 0 = unmuted
///
/// # Returns
/// 0 on success, negative error code on failure.
///
/// # Safety
/// `session` must be a valid `IAudioSessionControl*`; `muted` must be writable.
#[no_mangle]
pub unsafe extern "C" fn audio_session_get_mute(session: *mut c_void, muted: *mut i32) -> i32 {
    ffi_status("get mute", || {
        let control = session_control(session)?;
        let is_muted = with_mta(|| control.volume()?.is_muted())?;
        write_out(muted, i32::from(is_muted))
    })
}

/// Set the mute state of a session.
///
/// # Arguments
/// * `session` - Session pointer
/// * `muted` - 1 = muted, 0 = unmuted
///
/// # Returns
/// 0 on success, negative error code on failure.
///
/// # Safety
/// `session` must be a valid `IAudioSessionControl*`.
#[no_mangle]
pub unsafe extern "C" fn audio_session_set_mute(session: *mut c_void, muted: i32) -> i32 {
    ffi_status("set mute", || {
        let control = session_control(session)?;
        Ok(with_mta(|| control.volume()?.set_mute(muted != 0, None))?)
    })
}

/// Toggle the mute state of a session.
///
/// # Returns
/// JSON string with the result (includes new mute state). Caller must free with audio_session_free_string().
/// Returns null on failure.
///
/// # Safety
/// `session` must be a valid `IAudioSessionControl*`.
#[no_mangle]
pub unsafe extern "C" fn audio_session_toggle_mute(session: *mut c_void) -> *mut c_char {
    ffi_string("toggle mute", || {
        let control = session_control(session)?;
        let new_mute_state = with_mta(|| control.volume()?.toggle_mute())?;

        let response = OperationResult {
            success: true,
            error: None,
            is_muted: Some(new_mute_state),
        };
        Ok(serde_json::to_string(&response)?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio_session_last_error_code, ErrorCode};
    use std::ptr;

    #[test]
    fn test_null_session_is_invalid_handle() {
        unsafe {
            assert_eq!(
                audio_session_set_volume(ptr::null_mut(), 0.5),
                ErrorCode::InvalidHandle as i32
            );
            assert!(audio_session_get_info(ptr::null_mut()).is_null());
            assert_eq!(audio_session_last_error_code(), ErrorCode::InvalidHandle as i32);
            assert_eq!(
                audio_session_retain(ptr::null_mut()),
                ErrorCode::InvalidHandle as i32
            );
            audio_session_release(ptr::null_mut());
        }
    }
}
