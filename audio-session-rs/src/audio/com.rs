//! COM apartment management.

use super::session::AudioError;
use tracing::debug;
use windows::core::PWSTR;
use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
use windows::Win32::System::Com::{
    CoDecrementMTAUsage, CoIncrementMTAUsage, CoInitializeEx, CoTaskMemFree, CoUninitialize,
    CO_MTA_USAGE_COOKIE, COINIT, COINIT_APARTMENTTHREADED, COINIT_MULTITHREADED,
};

/// COM initialization guard that uninitializes COM on drop.
///
/// Must be dropped on the thread that created it.
pub struct ComGuard {
    initialized: bool,
}

impl ComGuard {
    /// Initialize COM for the current thread as a single-threaded apartment.
    pub fn new() -> Result<Self, AudioError> {
        Self::with_model(COINIT_APARTMENTTHREADED)
    }

    /// Initialize COM for the current thread in the multithreaded apartment.
    pub fn multithreaded() -> Result<Self, AudioError> {
        Self::with_model(COINIT_MULTITHREADED)
    }

    fn with_model(model: COINIT) -> Result<Self, AudioError> {
        let hr = unsafe { CoInitializeEx(None, model) };

        // Thread already joined another apartment; COM is usable, but the
        // initialization is not ours to undo.
        if hr == RPC_E_CHANGED_MODE {
            debug!("COM already initialized with a different threading model");
            return Ok(Self { initialized: false });
        }

        hr.ok().map_err(|e| AudioError::ComInitFailed(e.into()))?;
        Ok(Self { initialized: true })
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.initialized {
            unsafe {
                CoUninitialize();
            }
        }
    }
}

/// Keeps the process-wide multithreaded apartment alive.
///
/// Unlike [`ComGuard`] this is not tied to a thread, so an owner created on
/// one thread may be dropped on another.
pub struct MtaUsage {
    cookie: CO_MTA_USAGE_COOKIE,
}

// The cookie is an opaque token that CoDecrementMTAUsage accepts from any thread.
unsafe impl Send for MtaUsage {}
unsafe impl Sync for MtaUsage {}

impl MtaUsage {
    pub fn acquire() -> Result<Self, AudioError> {
        let cookie =
            unsafe { CoIncrementMTAUsage() }.map_err(|e| AudioError::ComInitFailed(e.into()))?;
        Ok(Self { cookie })
    }
}

impl Drop for MtaUsage {
    fn drop(&mut self) {
        unsafe {
            let _ = CoDecrementMTAUsage(self.cookie);
        }
    }
}

/// Execute a closure with the multithreaded apartment held open.
pub fn with_mta<T, F: FnOnce() -> Result<T, AudioError>>(f: F) -> Result<T, AudioError> {
    let _mta = MtaUsage::acquire()?;
    f()
}

/// Convert a COM-allocated string to a Rust string, freeing the original.
///
/// # Safety
/// `value` must be null or a string allocated with CoTaskMemAlloc that the
/// caller owns.
pub(crate) unsafe fn take_co_string(value: PWSTR) -> Result<String, AudioError> {
    if value.is_null() {
        return Ok(String::new());
    }

    let result = value
        .to_string()
        .map_err(|e| AudioError::StringConversion(e.to_string()));
    CoTaskMemFree(Some(value.0 as *const _));
    result
}
