//! Launching a process under the user of another running process.
//!
//! A service running as SYSTEM can use this to start a helper in the
//! interactive user's session by borrowing the token of a process that user
//! owns (typically explorer.exe or the process behind an audio session).

use crate::audio::HResult;
use thiserror::Error;

/// What to launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Executable path, quoted automatically unless already quoted
    pub file_name: String,

    /// Raw argument string appended after the executable
    pub arguments: String,

    /// Do not create a console window for the new process
    pub create_no_window: bool,
}

impl LaunchOptions {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            ..Default::default()
        }
    }

    pub fn arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = arguments.into();
        self
    }

    pub fn create_no_window(mut self, create_no_window: bool) -> Self {
        self.create_no_window = create_no_window;
        self
    }

    /// The command line passed to CreateProcessAsUser.
    pub fn command_line(&self) -> String {
        build_command_line(&self.file_name, &self.arguments)
    }
}

/// Process launch error types.
#[derive(Debug, Clone, Error)]
pub enum ProcessError {
    #[error("Invalid launch options: {0}")]
    InvalidArgument(String),

    #[error("Failed to open process {pid}: {hr}")]
    OpenProcessFailed { pid: u32, hr: HResult },

    #[error("Failed to open process token: {0}")]
    OpenTokenFailed(HResult),

    #[error("Failed to duplicate process token: {0}")]
    DuplicateTokenFailed(HResult),

    #[error("Failed to create process: {0}")]
    CreateProcessFailed(HResult),
}

impl ProcessError {
    /// The HRESULT behind this error, if it came from a Win32 call.
    pub fn hresult(&self) -> Option<i32> {
        match self {
            ProcessError::InvalidArgument(_) => None,
            ProcessError::OpenProcessFailed { hr, .. }
            | ProcessError::OpenTokenFailed(hr)
            | ProcessError::DuplicateTokenFailed(hr)
            | ProcessError::CreateProcessFailed(hr) => Some(hr.code),
        }
    }
}

/// Build a CreateProcess command line.
///
/// The file name is trimmed and wrapped in double quotes unless it already is,
/// so that the executable part of the line is unambiguous. Arguments are
/// appended after a single space when present.
///
/// Only a name of at least two characters that starts and ends with `"` counts
/// as quoted; a lone `"` is wrapped like any other name.
pub fn build_command_line(file_name: &str, arguments: &str) -> String {
    let file_name = file_name.trim();
    let is_quoted = file_name.len() >= 2 && file_name.starts_with('"') && file_name.ends_with('"');

    let mut command_line = String::with_capacity(file_name.len() + arguments.len() + 3);
    if !is_quoted {
        command_line.push('"');
    }
    command_line.push_str(file_name);
    if !is_quoted {
        command_line.push('"');
    }

    if !arguments.is_empty() {
        command_line.push(' ');
        command_line.push_str(arguments);
    }

    command_line
}

#[cfg(windows)]
pub use self::windows_impl::start_as_same_user;

#[cfg(windows)]
mod windows_impl {
    use super::{LaunchOptions, ProcessError};
    use tracing::{debug, info};
    use windows::core::{PCWSTR, PWSTR};
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::Security::{
        DuplicateTokenEx, SecurityIdentification, TokenPrimary, TOKEN_ACCESS_MASK,
        TOKEN_DUPLICATE,
    };
    use windows::Win32::System::SystemServices::MAXIMUM_ALLOWED;
    use windows::Win32::System::Threading::{
        CreateProcessAsUserW, OpenProcess, OpenProcessToken, CREATE_NO_WINDOW,
        CREATE_UNICODE_ENVIRONMENT, PROCESS_ACCESS_RIGHTS, PROCESS_INFORMATION, STARTUPINFOW,
    };

    const INTERACTIVE_DESKTOP: &str = "winsta0\\default";

    /// Handle closed on drop.
    struct OwnedHandle(HANDLE);

    impl Drop for OwnedHandle {
        fn drop(&mut self) {
            if !self.0.is_invalid() {
                unsafe {
                    let _ = CloseHandle(self.0);
                }
            }
        }
    }

    fn to_wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    /// Start a process on the interactive desktop using the access token of
    /// process `pid`. Returns the id of the new process.
    pub fn start_as_same_user(pid: u32, options: &LaunchOptions) -> Result<u32, ProcessError> {
        if options.file_name.trim().is_empty() {
            return Err(ProcessError::InvalidArgument(
                "file name is empty".to_string(),
            ));
        }

        // CreateProcessAsUserW may write into both buffers.
        let mut command_line = to_wide(&options.command_line());
        let mut desktop = to_wide(INTERACTIVE_DESKTOP);

        unsafe {
            let process = OwnedHandle(
                OpenProcess(PROCESS_ACCESS_RIGHTS(MAXIMUM_ALLOWED), false, pid)
                    .map_err(|e| ProcessError::OpenProcessFailed { pid, hr: e.into() })?,
            );

            let mut token = OwnedHandle(HANDLE::default());
            OpenProcessToken(process.0, TOKEN_DUPLICATE, &mut token.0)
                .map_err(|e| ProcessError::OpenTokenFailed(e.into()))?;

            let mut primary_token = OwnedHandle(HANDLE::default());
            DuplicateTokenEx(
                token.0,
                TOKEN_ACCESS_MASK(MAXIMUM_ALLOWED),
                None,
                SecurityIdentification,
                TokenPrimary,
                &mut primary_token.0,
            )
            .map_err(|e| ProcessError::DuplicateTokenFailed(e.into()))?;

            let startup_info = STARTUPINFOW {
                cb: std::mem::size_of::<STARTUPINFOW>() as u32,
                lpDesktop: PWSTR(desktop.as_mut_ptr()),
                ..Default::default()
            };

            let mut flags = CREATE_UNICODE_ENVIRONMENT;
            if options.create_no_window {
                flags |= CREATE_NO_WINDOW;
            }

            let mut process_info = PROCESS_INFORMATION::default();
            debug!("Launching {:?} as the user of process {}", options.file_name, pid);
            CreateProcessAsUserW(
                primary_token.0,
                PCWSTR::null(),
                PWSTR(command_line.as_mut_ptr()),
                None,
                None,
                false,
                flags,
                None,
                PCWSTR::null(),
                &startup_info,
                &mut process_info,
            )
            .map_err(|e| ProcessError::CreateProcessFailed(e.into()))?;

            drop(OwnedHandle(process_info.hThread));
            drop(OwnedHandle(process_info.hProcess));

            info!(
                "Started process {} as the user of process {}",
                process_info.dwProcessId, pid
            );
            Ok(process_info.dwProcessId)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_quotes_file_name() {
        assert_eq!(
            build_command_line(r"C:\Program Files\App\app.exe", ""),
            r#""C:\Program Files\App\app.exe""#
        );
    }

    #[test]
    fn test_command_line_keeps_existing_quotes() {
        assert_eq!(
            build_command_line(r#"  "C:\Tools\tool.exe"  "#, "--flag"),
            r#""C:\Tools\tool.exe" --flag"#
        );
    }

    #[test]
    fn test_command_line_appends_arguments() {
        assert_eq!(
            build_command_line("notepad.exe", r#"/A "my file.txt""#),
            r#""notepad.exe" /A "my file.txt""#
        );
    }

    #[test]
    fn test_lone_quote_is_wrapped_unlike_dotnet() {
        // .NET's Process.BuildCommandLine would pass a lone `"` through as is.
        assert_eq!(build_command_line("\"", ""), "\"\"\"");
    }

    #[test]
    fn test_launch_options_builder() {
        let options = LaunchOptions::new("helper.exe")
            .arguments("--tray")
            .create_no_window(true);
        assert!(options.create_no_window);
        assert_eq!(options.command_line(), r#""helper.exe" --tray"#);
    }

    #[test]
    fn test_process_error_hresult() {
        let err = ProcessError::OpenProcessFailed {
            pid: 4,
            hr: HResult::new(0x8007_0005_u32 as i32, "Access is denied."),
        };
        assert_eq!(err.hresult(), Some(0x8007_0005_u32 as i32));
        assert_eq!(err.to_string(), "Failed to open process 4: Access is denied. (0x80070005)");
        assert_eq!(ProcessError::InvalidArgument("x".into()).hresult(), None);
    }
}
