//! WLAN events, their script-level notifications, and link state tracking.
//!
//! Native drivers report events as small integer codes. Each code is mapped to
//! a [`WlanEvent`] exactly once, at the driver boundary; code `0` is the
//! ready event, not "no event".

use crate::script::ScriptValue;
use std::fmt;

/// Native code of the scan-report event, which is not bridged.
pub const SCAN_REPORT_CODE: u32 = 2;

/// A WLAN lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WlanEvent {
    Ready,
    ScanDone,
    StaConnected,
    StaConnectFailed,
    StaDisconnected,
    ApStart,
    ApStop,
    ApAssociated,
    ApDisassociated,
}

impl WlanEvent {
    /// Every bridged event, in native code order.
    pub const ALL: [WlanEvent; 9] = [
        Self::Ready,
        Self::ScanDone,
        Self::StaConnected,
        Self::StaConnectFailed,
        Self::StaDisconnected,
        Self::ApStart,
        Self::ApStop,
        Self::ApAssociated,
        Self::ApDisassociated,
    ];

    /// Map a native event code. Unknown codes and the scan-report event
    /// return `None`.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Ready),
            1 => Some(Self::ScanDone),
            3 => Some(Self::StaConnected),
            4 => Some(Self::StaConnectFailed),
            5 => Some(Self::StaDisconnected),
            6 => Some(Self::ApStart),
            7 => Some(Self::ApStop),
            8 => Some(Self::ApAssociated),
            9 => Some(Self::ApDisassociated),
            _ => None,
        }
    }

    /// Native event code.
    pub fn code(self) -> u32 {
        match self {
            Self::Ready => 0,
            Self::ScanDone => 1,
            Self::StaConnected => 3,
            Self::StaConnectFailed => 4,
            Self::StaDisconnected => 5,
            Self::ApStart => 6,
            Self::ApStop => 7,
            Self::ApAssociated => 8,
            Self::ApDisassociated => 9,
        }
    }

    /// Notification name published to scripts.
    pub fn topic(self) -> &'static str {
        match self {
            Self::Ready => "WLAN_READY",
            Self::ScanDone => "WLAN_SCAN_DONE",
            Self::StaConnected | Self::StaConnectFailed => "WLAN_STA_CONNECTED",
            Self::StaDisconnected => "WLAN_STA_DISCONNECTED",
            Self::ApStart => "WLAN_AP_START",
            Self::ApStop => "WLAN_AP_STOP",
            Self::ApAssociated => "WLAN_AP_ASSOCIATED",
            Self::ApDisassociated => "WLAN_AP_DISASSOCIATED",
        }
    }

    /// Script-level notification for this event.
    pub fn notification(self) -> Notification {
        let args = match self {
            Self::StaConnected => vec![ScriptValue::Int(1)],
            Self::StaConnectFailed => vec![ScriptValue::Int(0)],
            _ => Vec::new(),
        };
        Notification::new(self.topic(), args)
    }
}

impl fmt::Display for WlanEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// A named notification with its payload values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub topic: &'static str,
    pub args: Vec<ScriptValue>,
}

impl Notification {
    pub fn new(topic: &'static str, args: Vec<ScriptValue>) -> Self {
        Self { topic, args }
    }

    /// Argument list for the publish function: topic first, then payload.
    pub fn to_call_args(&self) -> Vec<ScriptValue> {
        let mut call = Vec::with_capacity(self.args.len() + 1);
        call.push(ScriptValue::from(self.topic));
        call.extend(self.args.iter().cloned());
        call
    }
}

/// Station side of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StationState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    Connected,
    Disconnected,
}

/// Access-point side of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApState {
    #[default]
    Stopped,
    Started { clients: u32 },
}

/// Connectivity lifecycle as seen from the scripting thread.
///
/// Only updated by requests issued on the scripting thread and by events as
/// they are drained, so it never needs a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkState {
    station: StationState,
    ap: ApState,
    ready: bool,
}

impl LinkState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn station(&self) -> StationState {
        self.station
    }

    pub fn ap(&self) -> ApState {
        self.ap
    }

    /// Whether a ready event has been seen since the last disconnect.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// A scan was requested.
    pub fn scan_requested(&mut self) {
        if matches!(self.station, StationState::Idle | StationState::Disconnected) {
            self.station = StationState::Scanning;
        }
    }

    /// A connect attempt was launched.
    pub fn connect_requested(&mut self) {
        self.station = StationState::Connecting;
    }

    /// A disconnect was performed locally.
    pub fn disconnect_requested(&mut self) {
        self.station = StationState::Disconnected;
        self.ready = false;
    }

    /// Apply a drained event.
    pub fn apply(&mut self, event: WlanEvent) {
        match event {
            WlanEvent::Ready => self.ready = true,
            WlanEvent::ScanDone => {
                if self.station == StationState::Scanning {
                    self.station = StationState::Idle;
                }
            }
            WlanEvent::StaConnected => self.station = StationState::Connected,
            WlanEvent::StaConnectFailed => self.station = StationState::Disconnected,
            WlanEvent::StaDisconnected => {
                self.station = StationState::Disconnected;
                self.ready = false;
            }
            WlanEvent::ApStart => self.ap = ApState::Started { clients: 0 },
            WlanEvent::ApStop => self.ap = ApState::Stopped,
            WlanEvent::ApAssociated => {
                if let ApState::Started { clients } = self.ap {
                    self.ap = ApState::Started {
                        clients: clients.saturating_add(1),
                    };
                }
            }
            WlanEvent::ApDisassociated => {
                if let ApState::Started { clients } = self.ap {
                    self.ap = ApState::Started {
                        clients: clients.saturating_sub(1),
                    };
                }
            }
        }
    }
}
