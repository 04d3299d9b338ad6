//! New-session notifications using IAudioSessionNotification.
//!
//! [`SessionNotificationClient`] is the COM object the OS calls back into.
//! Its reference count, QueryInterface and lifetime come from `#[implement]`;
//! [`SessionNotificationHook`] owns one reference plus the registration.

use super::control::SessionControl;
use super::session::{AudioError, SessionEvent};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Sender;
use tracing::{debug, error, warn};
use windows::core::implement;
use windows::Win32::Media::Audio::{
    IAudioSessionControl, IAudioSessionManager2, IAudioSessionNotification,
    IAudioSessionNotification_Impl,
};
// Re-export windows_core so the implement macro can find it
#[allow(unused_imports)]
use windows_core;

/// Receives sessions created on a watched endpoint.
///
/// Called on an OS worker thread. The session is borrowed for the duration of
/// the call; clone it to keep it.
pub trait SessionCreatedHandler: Send + Sync + 'static {
    fn session_created(&self, session: &IAudioSessionControl);
}

/// Handler that snapshots each new session and sends it to a channel.
pub struct ChannelHandler {
    sender: Sender<SessionEvent>,
}

impl ChannelHandler {
    pub fn new(sender: Sender<SessionEvent>) -> Self {
        Self { sender }
    }
}

impl SessionCreatedHandler for ChannelHandler {
    fn session_created(&self, session: &IAudioSessionControl) {
        let info = match SessionControl::new(session).and_then(|control| control.info()) {
            Ok(info) => info,
            Err(e) => {
                warn!("Failed to read new session: {}", e);
                return;
            }
        };

        if self.sender.send(SessionEvent::SessionCreated { session: info }).is_err() {
            debug!("session event receiver dropped");
        }
    }
}

/// Notification client that forwards new sessions to a handler.
#[implement(IAudioSessionNotification)]
pub struct SessionNotificationClient {
    handler: Box<dyn SessionCreatedHandler>,
}

impl SessionNotificationClient {
    pub fn new(handler: impl SessionCreatedHandler) -> Self {
        Self {
            handler: Box::new(handler),
        }
    }
}

impl IAudioSessionNotification_Impl for SessionNotificationClient_Impl {
    fn OnSessionCreated(
        &self,
        newsession: Option<&IAudioSessionControl>,
    ) -> windows::core::Result<()> {
        let Some(session) = newsession else {
            return Ok(());
        };

        // Unwinding into the audio service is undefined behavior.
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.handler.session_created(session);
        }));
        if result.is_err() {
            error!("Session created handler panicked");
        }

        Ok(())
    }
}

/// A notification client registered with a session manager.
///
/// Unregisters on drop, then releases the client and the manager.
pub struct SessionNotificationHook {
    notification: IAudioSessionNotification,
    manager: IAudioSessionManager2,
}

impl SessionNotificationHook {
    /// Register `handler` for sessions created through `manager`.
    pub fn register(
        manager: &IAudioSessionManager2,
        handler: impl SessionCreatedHandler,
    ) -> Result<Self, AudioError> {
        let notification: IAudioSessionNotification =
            SessionNotificationClient::new(handler).into();

        unsafe {
            manager
                .RegisterSessionNotification(&notification)
                .map_err(|e| AudioError::RegistrationFailed(e.into()))?;
        }

        let hook = Self {
            notification,
            manager: manager.clone(),
        };

        // Notifications only start flowing once the session list has been
        // requested at least once.
        unsafe {
            hook.manager
                .GetSessionEnumerator()
                .map_err(|e| AudioError::SessionEnumerationFailed(e.into()))?;
        }

        debug!("Session notification registered");
        Ok(hook)
    }
}

impl Drop for SessionNotificationHook {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self
                .manager
                .UnregisterSessionNotification(&self.notification)
            {
                warn!("Failed to unregister session notification: {}", e);
            }
        }
        debug!("Session notification unregistered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{BareSession, FakeManager, FakeSession, ManagerCall};
    use crate::audio::SessionState;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use windows::core::{Interface, IUnknown};
    use windows::Win32::Foundation::S_OK;

    struct CountingHandler {
        calls: Arc<AtomicUsize>,
    }

    impl SessionCreatedHandler for CountingHandler {
        fn session_created(&self, _session: &IAudioSessionControl) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PanickingHandler;

    impl SessionCreatedHandler for PanickingHandler {
        fn session_created(&self, _session: &IAudioSessionControl) {
            panic!("handler failure");
        }
    }

    fn counting_client() -> (IAudioSessionNotification, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let notification = SessionNotificationClient::new(CountingHandler {
            calls: calls.clone(),
        })
        .into();
        (notification, calls)
    }

    #[test]
    fn test_new_session_reaches_handler() {
        let (notification, calls) = counting_client();
        let session: IAudioSessionControl = BareSession.into();

        unsafe {
            notification.OnSessionCreated(&session).unwrap();
            notification.OnSessionCreated(&session).unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_null_session_is_ignored() {
        let (notification, calls) = counting_client();

        let hr = unsafe {
            (Interface::vtable(&notification).OnSessionCreated)(
                Interface::as_raw(&notification),
                std::ptr::null_mut(),
            )
        };

        assert_eq!(hr, S_OK);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handler_panic_does_not_escape() {
        let notification: IAudioSessionNotification =
            SessionNotificationClient::new(PanickingHandler).into();
        let session: IAudioSessionControl = BareSession.into();

        let result = unsafe { notification.OnSessionCreated(&session) };
        assert!(result.is_ok());
    }

    #[test]
    fn test_query_interface_identity() {
        let (notification, _calls) = counting_client();

        let unknown: IUnknown = notification.cast().unwrap();
        let again: IAudioSessionNotification = unknown.cast().unwrap();
        assert_eq!(notification.as_raw(), again.as_raw());

        // Interfaces the client does not implement are refused.
        assert!(notification.cast::<IAudioSessionControl>().is_err());
    }

    #[test]
    fn test_client_freed_on_last_release() {
        let (notification, calls) = counting_client();
        assert_eq!(Arc::strong_count(&calls), 2);

        // AddRef
        let extra = notification.clone();
        drop(notification);
        assert_eq!(Arc::strong_count(&calls), 2);

        // Final Release destroys the object and its handler.
        drop(extra);
        assert_eq!(Arc::strong_count(&calls), 1);
    }

    #[test]
    fn test_hook_registers_enumerates_and_unregisters() {
        let (manager, calls) = FakeManager::new(false);
        let handled = Arc::new(AtomicUsize::new(0));

        let hook = SessionNotificationHook::register(
            &manager,
            CountingHandler {
                calls: handled.clone(),
            },
        )
        .unwrap();

        let registered = hook.notification.as_raw() as usize;
        assert_eq!(
            *calls.lock().unwrap(),
            vec![ManagerCall::Register(registered), ManagerCall::Enumerate]
        );

        drop(hook);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                ManagerCall::Register(registered),
                ManagerCall::Enumerate,
                ManagerCall::Unregister(registered),
            ]
        );

        // The hook held the last reference to the client.
        assert_eq!(Arc::strong_count(&handled), 1);
    }

    #[test]
    fn test_failed_enumeration_unregisters() {
        let (manager, calls) = FakeManager::new(true);
        let handled = Arc::new(AtomicUsize::new(0));

        let result = SessionNotificationHook::register(
            &manager,
            CountingHandler {
                calls: handled.clone(),
            },
        );
        assert!(matches!(
            result,
            Err(AudioError::SessionEnumerationFailed(_))
        ));

        let calls = calls.lock().unwrap();
        let ManagerCall::Register(registered) = calls[0] else {
            panic!("expected registration first, got {:?}", calls[0]);
        };
        assert_ne!(registered, 0);
        assert_eq!(
            calls[1..],
            [ManagerCall::Enumerate, ManagerCall::Unregister(registered)]
        );
        assert_eq!(Arc::strong_count(&handled), 1);
    }

    #[test]
    fn test_channel_handler_sends_snapshot() {
        let (tx, rx) = mpsc::channel();
        let notification: IAudioSessionNotification =
            SessionNotificationClient::new(ChannelHandler::new(tx)).into();
        let session = FakeSession::new(4242, "Player").into_session();

        unsafe {
            notification.OnSessionCreated(&session).unwrap();
        }

        let SessionEvent::SessionCreated { session: info } = rx.try_recv().unwrap() else {
            panic!("expected a session created event");
        };
        assert_eq!(info.process_id, 4242);
        assert_eq!(info.display_name, "Player");
        assert_eq!(info.session_identifier, "player.exe|4242");
        assert_eq!(info.state, SessionState::Active);
        assert!(!info.is_system_sounds);
        assert_eq!(info.volume_level, 0.8);
        assert!(!info.is_muted);
    }

    #[test]
    fn test_channel_handler_skips_unreadable_session() {
        let (tx, rx) = mpsc::channel();
        let notification: IAudioSessionNotification =
            SessionNotificationClient::new(ChannelHandler::new(tx)).into();
        let session: IAudioSessionControl = BareSession.into();

        let result = unsafe { notification.OnSessionCreated(&session) };

        assert!(result.is_ok());
        assert!(rx.try_recv().is_err());
    }
}
