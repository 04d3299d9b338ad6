//! FFI bindings for Windows audio session notifications.
//!
//! This crate provides C ABI functions for use from C# via P/Invoke.
//! All functions use panic::catch_unwind to prevent Rust panics from
//! unwinding across the FFI boundary. Failures are reported through a
//! thread-local last error (code, message and originating HRESULT).

use audio_session_rs::{AudioError, DataFlow, DeviceRole, ProcessError, SessionInfo};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::ffi::{c_char, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

#[cfg(windows)]
mod hook;
#[cfg(windows)]
mod process;
#[cfg(windows)]
mod session;

#[cfg(windows)]
pub use hook::{AudioSessionHookHandle, SessionCreatedCallback};

// ============================================================================
// Error Handling
// ============================================================================

/// Error codes returned by FFI functions.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    InvalidHandle = -1,
    InvalidArgument = -2,
    NoDefaultEndpoint = -3,
    ComError = -4,
    JsonError = -5,
    VolumeNotAvailable = -6,
    InterfaceNotSupported = -7,
    ProcessLaunchFailed = -8,
    Panic = -99,
}

impl From<&AudioError> for ErrorCode {
    fn from(err: &AudioError) -> Self {
        match err {
            AudioError::NoDefaultEndpoint { .. } => ErrorCode::NoDefaultEndpoint,
            AudioError::VolumeNotAvailable => ErrorCode::VolumeNotAvailable,
            AudioError::InterfaceNotSupported { .. } => ErrorCode::InterfaceNotSupported,
            AudioError::InvalidArgument(_) | AudioError::StringConversion(_) => {
                ErrorCode::InvalidArgument
            }
            _ => ErrorCode::ComError,
        }
    }
}

impl From<&ProcessError> for ErrorCode {
    fn from(err: &ProcessError) -> Self {
        match err {
            ProcessError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            _ => ErrorCode::ProcessLaunchFailed,
        }
    }
}

/// A failure on its way to the last error slot.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FfiError {
    code: ErrorCode,
    message: String,
    hresult: Option<i32>,
}

impl FfiError {
    pub(crate) fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            hresult: None,
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    #[cfg_attr(not(windows), allow(dead_code))]
    pub(crate) fn invalid_handle() -> Self {
        Self::new(ErrorCode::InvalidHandle, "Invalid handle")
    }

    fn record(self) -> ErrorCode {
        set_last_error(self.code, self.message, self.hresult);
        self.code
    }
}

impl From<AudioError> for FfiError {
    fn from(err: AudioError) -> Self {
        Self {
            code: ErrorCode::from(&err),
            message: err.to_string(),
            hresult: err.hresult(),
        }
    }
}

impl From<ProcessError> for FfiError {
    fn from(err: ProcessError) -> Self {
        Self {
            code: ErrorCode::from(&err),
            message: err.to_string(),
            hresult: err.hresult(),
        }
    }
}

impl From<serde_json::Error> for FfiError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorCode::JsonError, err.to_string())
    }
}

struct LastError {
    code: ErrorCode,
    message: String,
    hresult: Option<i32>,
}

/// Thread-local storage for the last error.
thread_local! {
    static LAST_ERROR: RefCell<Option<LastError>> = const { RefCell::new(None) };
}

fn set_last_error(code: ErrorCode, message: impl Into<String>, hresult: Option<i32>) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = Some(LastError {
            code,
            message: message.into(),
            hresult,
        });
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

// ============================================================================
// Data Types for JSON Serialization
// ============================================================================

/// Configuration for hook creation.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct HookConfig {
    /// tracing filter directive, e.g. "debug" or "audio_session_rs=trace"
    #[serde(default)]
    pub log_level: Option<String>,

    /// "render" (default) or "capture"
    #[serde(default)]
    pub data_flow: Option<String>,

    /// "console", "multimedia" (default) or "communications"
    #[serde(default)]
    pub role: Option<String>,
}

impl HookConfig {
    /// The endpoint whose sessions are watched.
    pub fn endpoint(&self) -> Result<(DataFlow, DeviceRole), AudioError> {
        let flow = match &self.data_flow {
            Some(flow) => flow.parse()?,
            None => DataFlow::default(),
        };
        let role = match &self.role {
            Some(role) => role.parse()?,
            None => DeviceRole::default(),
        };
        Ok((flow, role))
    }
}

/// Response containing a list of sessions.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionInfo>,
}

/// Response containing a single session.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session: SessionInfo,
}

/// Response containing operation result.
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_muted: Option<bool>,
}

// ============================================================================
// Helper Functions
// ============================================================================

static LOGGING: Once = Once::new();

/// Install the fmt subscriber once per process. RUST_LOG wins over `level`.
#[cfg_attr(not(windows), allow(dead_code))]
fn init_logging(level: Option<&str>) {
    if level.is_none() && std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
        return;
    }

    let level = level.unwrap_or("info").to_string();
    LOGGING.call_once(move || {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        // Another subscriber may already be installed by the host.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

/// Parse the optional JSON configuration. Null means defaults.
#[cfg_attr(not(windows), allow(dead_code))]
unsafe fn parse_config(config_json: *const c_char) -> Result<HookConfig, FfiError> {
    if config_json.is_null() {
        return Ok(HookConfig::default());
    }

    let json = parse_c_str(config_json)
        .ok_or_else(|| FfiError::invalid_argument("Configuration is not valid UTF-8"))?;
    if json.trim().is_empty() {
        return Ok(HookConfig::default());
    }

    Ok(serde_json::from_str(json)?)
}

/// Allocate a C string from a Rust string. Caller must free with audio_session_free_string.
fn alloc_c_string(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        // Interior NUL: keep everything before it
        Err(e) => {
            let nul = e.nul_position();
            let mut bytes = e.into_vec();
            bytes.truncate(nul);
            CString::new(bytes).map_or(ptr::null_mut(), CString::into_raw)
        }
    }
}

/// Parse a C string to a Rust string slice.
unsafe fn parse_c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

/// Run `f`, returning its JSON as an allocated string or null with the last
/// error set.
#[cfg_attr(not(windows), allow(dead_code))]
fn ffi_string<F>(context: &str, f: F) -> *mut c_char
where
    F: FnOnce() -> Result<String, FfiError>,
{
    clear_last_error();

    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(json)) => alloc_c_string(&json),
        Ok(Err(e)) => {
            e.record();
            ptr::null_mut()
        }
        Err(_) => {
            set_last_error(ErrorCode::Panic, format!("Panic during {context}"), None);
            ptr::null_mut()
        }
    }
}

/// Run `f`, returning its non-negative result or a negative error code with
/// the last error set.
#[cfg_attr(not(windows), allow(dead_code))]
fn ffi_value<F>(context: &str, f: F) -> i32
where
    F: FnOnce() -> Result<i32, FfiError>,
{
    clear_last_error();

    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => e.record() as i32,
        Err(_) => {
            set_last_error(ErrorCode::Panic, format!("Panic during {context}"), None);
            ErrorCode::Panic as i32
        }
    }
}

/// Run `f`, returning 0 on success or a negative error code with the last
/// error set.
#[cfg_attr(not(windows), allow(dead_code))]
fn ffi_status<F>(context: &str, f: F) -> i32
where
    F: FnOnce() -> Result<(), FfiError>,
{
    ffi_value(context, || f().map(|()| ErrorCode::Success as i32))
}

/// Write `value` through an out-pointer supplied by the caller.
#[cfg_attr(not(windows), allow(dead_code))]
unsafe fn write_out<T>(out: *mut T, value: T) -> Result<(), FfiError> {
    if out.is_null() {
        return Err(FfiError::invalid_argument("Output pointer is null"));
    }
    out.write(value);
    Ok(())
}

// ============================================================================
// FFI Functions - Memory Management
// ============================================================================

/// Free a string allocated by this library.
///
/// # Safety
/// The pointer must have been returned by one of the audio_session_* functions.
/// Do not call this on strings from other sources.
#[no_mangle]
pub unsafe extern "C" fn audio_session_free_string(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }

    let _ = panic::catch_unwind(|| {
        let _ = CString::from_raw(ptr);
    });
}

// ============================================================================
// FFI Functions - Error Handling
// ============================================================================

/// Get the last error code.
///
/// # Returns
/// The error code from the last failed operation, or 0 if no error.
#[no_mangle]
pub extern "C" fn audio_session_last_error_code() -> i32 {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|err| err.code as i32)
            .unwrap_or(0)
    })
}

/// Get the HRESULT behind the last error.
///
/// # Returns
/// The HRESULT, or 0 (S_OK) if the last error did not come from a COM call.
#[no_mangle]
pub extern "C" fn audio_session_last_error_hresult() -> i32 {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .and_then(|err| err.hresult)
            .unwrap_or(0)
    })
}

/// Get the last error message.
///
/// # Returns
/// Error message string. Caller must free with audio_session_free_string().
/// Returns null if no error.
#[no_mangle]
pub extern "C" fn audio_session_last_error_message() -> *mut c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|err| alloc_c_string(&err.message))
            .unwrap_or(ptr::null_mut())
    })
}

// ============================================================================
// FFI Functions - Utility
// ============================================================================

/// Get the library version.
///
/// # Returns
/// Version string. Caller must free with audio_session_free_string().
#[no_mangle]
pub extern "C" fn audio_session_version() -> *mut c_char {
    alloc_c_string(env!("CARGO_PKG_VERSION"))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use audio_session_rs::HResult;

    #[test]
    fn test_error_code_conversion() {
        let err = AudioError::NoDefaultEndpoint {
            flow: DataFlow::Render,
            role: DeviceRole::Multimedia,
            hr: HResult::new(0x8007_0490_u32 as i32, "Element not found."),
        };
        assert_eq!(ErrorCode::from(&err), ErrorCode::NoDefaultEndpoint);
        assert_eq!(
            ErrorCode::from(&AudioError::RegistrationFailed(HResult::new(-1, ""))),
            ErrorCode::ComError
        );
        assert_eq!(
            ErrorCode::from(&ProcessError::CreateProcessFailed(HResult::new(5, ""))),
            ErrorCode::ProcessLaunchFailed
        );
    }

    #[test]
    fn test_failure_sets_last_error_with_hresult() {
        let code = ffi_status("test", || {
            Err(AudioError::ActivationFailed(HResult::new(
                0x8889_0004_u32 as i32,
                "The audio endpoint device has been unplugged.",
            ))
            .into())
        });

        assert_eq!(code, ErrorCode::ComError as i32);
        assert_eq!(audio_session_last_error_code(), ErrorCode::ComError as i32);
        assert_eq!(audio_session_last_error_hresult(), 0x8889_0004_u32 as i32);

        let message = audio_session_last_error_message();
        assert!(!message.is_null());
        unsafe {
            let s = CStr::from_ptr(message).to_str().unwrap();
            assert!(s.starts_with("Failed to activate session manager"));
            audio_session_free_string(message);
        }
    }

    #[test]
    fn test_success_clears_last_error() {
        ffi_status("test", || Err(FfiError::invalid_handle()));
        assert_eq!(audio_session_last_error_code(), ErrorCode::InvalidHandle as i32);

        assert_eq!(ffi_status("test", || Ok(())), 0);
        assert_eq!(audio_session_last_error_code(), 0);
        assert_eq!(audio_session_last_error_hresult(), 0);
        assert!(audio_session_last_error_message().is_null());
    }

    #[test]
    fn test_panic_is_contained() {
        let result = ffi_string("panicking call", || panic!("boom"));
        assert!(result.is_null());
        assert_eq!(audio_session_last_error_code(), ErrorCode::Panic as i32);
    }

    #[test]
    fn test_value_runner_passes_value_or_error_code() {
        assert_eq!(ffi_value("pid lookup", || Ok(4242)), 4242);
        assert_eq!(audio_session_last_error_code(), 0);

        let code = ffi_value("pid lookup", || {
            Err(FfiError::new(ErrorCode::ProcessLaunchFailed, "access denied"))
        });
        assert_eq!(code, ErrorCode::ProcessLaunchFailed as i32);
        assert_eq!(audio_session_last_error_code(), code);

        assert_eq!(
            ffi_value("pid lookup", || panic!("boom")),
            ErrorCode::Panic as i32
        );
        assert_eq!(ffi_status("status", || Ok(())), ErrorCode::Success as i32);
    }

    #[test]
    fn test_config_defaults_and_parsing() {
        unsafe {
            let config = parse_config(ptr::null()).unwrap();
            assert_eq!(
                config.endpoint().unwrap(),
                (DataFlow::Render, DeviceRole::Multimedia)
            );

            let json = CString::new(r#"{"data_flow":"capture","role":"communications"}"#).unwrap();
            let config = parse_config(json.as_ptr()).unwrap();
            assert_eq!(
                config.endpoint().unwrap(),
                (DataFlow::Capture, DeviceRole::Communications)
            );

            let json = CString::new(r#"{"role":"loudest"}"#).unwrap();
            let err = FfiError::from(parse_config(json.as_ptr()).unwrap().endpoint().unwrap_err());
            assert_eq!(err.code, ErrorCode::InvalidArgument);

            let json = CString::new("{not json").unwrap();
            assert_eq!(parse_config(json.as_ptr()).unwrap_err().code, ErrorCode::JsonError);
        }
    }

    #[test]
    fn test_alloc_c_string_truncates_at_nul() {
        let s = alloc_c_string("abc\0def");
        unsafe {
            assert_eq!(CStr::from_ptr(s).to_str().unwrap(), "abc");
            audio_session_free_string(s);
        }
    }

    #[test]
    fn test_session_list_json_shape() {
        let response = SessionListResponse {
            sessions: vec![SessionInfo {
                process_id: 1234,
                display_name: "Player".to_string(),
                ..Default::default()
            }],
        };
        let json: serde_json::Value = serde_json::to_value(&response).unwrap();
        assert_eq!(json["sessions"][0]["process_id"], 1234);
        assert_eq!(json["sessions"][0]["state"], "inactive");
    }

    #[test]
    fn test_version() {
        let version = audio_session_version();
        assert!(!version.is_null());
        unsafe {
            let s = CStr::from_ptr(version).to_str().unwrap();
            assert!(!s.is_empty());
            audio_session_free_string(version);
        }
    }
}
