//! Process launch helper exported to .NET.

use crate::{ffi_value, parse_c_str, ErrorCode, FfiError};
use audio_session_rs::{start_as_same_user, LaunchOptions};
use std::ffi::c_char;

/// Start a process on the interactive desktop as the user owning another process.
///
/// # Arguments
/// * `pid` - Process whose access token is borrowed
/// * `file_name` - Executable path (UTF-8 string); quoted automatically
/// * `arguments` - Argument string (UTF-8, may be null)
/// * `create_no_window` - 1 = no console window, 0 = default
///
/// # Returns
/// The process ID of the started process (> 0), or a negative error code on
/// failure. audio_session_last_error_hresult() carries the Win32 failure.
///
/// # Safety
/// String arguments must be null or valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn audio_process_start_as_same_user(
    pid: u32,
    file_name: *const c_char,
    arguments: *const c_char,
    create_no_window: i32,
) -> i32 {
    ffi_value("process launch", || {
        let file_name =
            parse_c_str(file_name).ok_or_else(|| FfiError::invalid_argument("Invalid file name"))?;
        let arguments = if arguments.is_null() {
            ""
        } else {
            parse_c_str(arguments).ok_or_else(|| FfiError::invalid_argument("Invalid arguments"))?
        };

        let options = LaunchOptions::new(file_name)
            .arguments(arguments)
            .create_no_window(create_no_window != 0);

        let started = start_as_same_user(pid, &options)?;
        i32::try_from(started).map_err(|_| {
            FfiError::new(
                ErrorCode::ProcessLaunchFailed,
                format!("Process ID {started} does not fit the return value"),
            )
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_session_last_error_code;
    use std::ffi::CString;
    use std::ptr;

    #[test]
    fn test_missing_file_name_is_invalid_argument() {
        let code = unsafe {
            audio_process_start_as_same_user(std::process::id(), ptr::null(), ptr::null(), 0)
        };
        assert_eq!(code, ErrorCode::InvalidArgument as i32);
        assert_eq!(audio_session_last_error_code(), code);
    }

    #[test]
    fn test_blank_file_name_is_invalid_argument() {
        let file_name = CString::new("   ").unwrap();
        let code = unsafe {
            audio_process_start_as_same_user(
                std::process::id(),
                file_name.as_ptr(),
                ptr::null(),
                1,
            )
        };
        assert_eq!(code, ErrorCode::InvalidArgument as i32);
    }
}
