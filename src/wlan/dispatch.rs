//! Delivery of notifications to the script-side publish function.
//!
//! Runs on the scripting thread only. The publish target is looked up by name
//! on every delivery, so scripts may install or remove it at any time; when it
//! is absent the notification is dropped quietly.

use super::event::Notification;
use super::join::JoinInfo;
use crate::script::{ScriptError, ScriptRuntime, ScriptValue, PUBLISH_FUNCTION};
use log::debug;

/// Topic published when a provisioning service finishes.
pub const PROVISIONING_TOPIC: &str = "WLAN_PW_RE";

/// Result of a provisioning run as carried over the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningOutcome {
    /// Credentials were received.
    Succeeded(JoinInfo),
    /// The service gave up; no credentials.
    Failed,
}

impl ProvisioningOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    /// `WLAN_PW_RE(1, ssid, password)` on success, `WLAN_PW_RE(0)` on failure.
    pub fn notification(&self) -> Notification {
        match self {
            Self::Succeeded(info) => Notification::new(
                PROVISIONING_TOPIC,
                vec![
                    ScriptValue::Int(1),
                    ScriptValue::from(info.ssid()),
                    ScriptValue::from(info.password()),
                ],
            ),
            Self::Failed => Notification::new(PROVISIONING_TOPIC, vec![ScriptValue::Int(0)]),
        }
    }
}

/// What happened to a published notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
    /// The publish function ran.
    Delivered,
    /// No publish function is installed; nothing ran.
    NoTarget,
}

/// Call the global publish function with `notification`.
///
/// An absent target is not an error. An error raised by the target is
/// returned so the drain loop can log it.
pub fn publish<R: ScriptRuntime + ?Sized>(
    runtime: &mut R,
    notification: &Notification,
) -> Result<Published, ScriptError> {
    match runtime.call_global(PUBLISH_FUNCTION, &notification.to_call_args()) {
        None => {
            debug!(
                "no {} installed, dropping {}",
                PUBLISH_FUNCTION, notification.topic
            );
            Ok(Published::NoTarget)
        }
        Some(Ok(())) => Ok(Published::Delivered),
        Some(Err(e)) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::GlobalTable;
    use crate::wlan::WlanEvent;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording_table() -> (GlobalTable, Rc<RefCell<Vec<Vec<ScriptValue>>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = calls.clone();
        let mut table = GlobalTable::new();
        table.register(PUBLISH_FUNCTION, move |args| {
            sink.borrow_mut().push(args.to_vec());
            Ok(())
        });
        (table, calls)
    }

    #[test]
    fn test_publish_delivers_topic_and_payload() {
        let (mut table, calls) = recording_table();
        let result = publish(&mut table, &WlanEvent::StaConnectFailed.notification());
        assert_eq!(result, Ok(Published::Delivered));
        assert_eq!(
            calls.borrow()[0],
            vec![ScriptValue::from("WLAN_STA_CONNECTED"), ScriptValue::Int(0)]
        );
    }

    #[test]
    fn test_publish_without_target_is_noop() {
        let mut table = GlobalTable::new();
        let result = publish(&mut table, &WlanEvent::Ready.notification());
        assert_eq!(result, Ok(Published::NoTarget));
    }

    #[test]
    fn test_publish_propagates_script_error() {
        let mut table = GlobalTable::new();
        table.register(PUBLISH_FUNCTION, |_| Err(ScriptError::new("bad subscriber")));
        let result = publish(&mut table, &WlanEvent::Ready.notification());
        assert_eq!(result, Err(ScriptError::new("bad subscriber")));
    }

    #[test]
    fn test_provisioning_success_notification() {
        let outcome = ProvisioningOutcome::Succeeded(JoinInfo::from_parts("home", "pw123456"));
        assert!(outcome.is_success());
        let n = outcome.notification();
        assert_eq!(n.topic, PROVISIONING_TOPIC);
        assert_eq!(
            n.args,
            vec![
                ScriptValue::Int(1),
                ScriptValue::from("home"),
                ScriptValue::from("pw123456")
            ]
        );
    }

    #[test]
    fn test_provisioning_failure_carries_no_credentials() {
        let n = ProvisioningOutcome::Failed.notification();
        assert_eq!(n.args, vec![ScriptValue::Int(0)]);
    }
}
