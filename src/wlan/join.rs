//! Join credentials.
//!
//! [`JoinInfo`] holds the most recent SSID/password pair, whether it came from
//! a script's connect request or from a provisioning callback. Both fields are
//! bounded so they always fit a 64-byte NUL-terminated native buffer.
//!
//! # Example
//!
//! ```
//! use wlan_uart_bridge::wlan::{JoinInfo, MAX_SSID_LEN};
//!
//! let info = JoinInfo::from_parts("MyNetwork", "MyPassword");
//! assert_eq!(info.ssid(), "MyNetwork");
//!
//! let long = "a".repeat(80);
//! let info = JoinInfo::from_parts(&long, "");
//! assert_eq!(info.ssid().len(), MAX_SSID_LEN);
//! ```

use log::warn;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use zeroize::Zeroize;

/// Maximum SSID length stored (native buffer is 64 bytes incl. NUL).
pub const MAX_SSID_LEN: usize = 63;

/// Maximum password length stored (native buffer is 64 bytes incl. NUL).
pub const MAX_PASSWORD_LEN: usize = 63;

/// Size of the native NUL-terminated buffers.
pub const NATIVE_BUFFER_LEN: usize = 64;

/// Cut `s` at the first NUL and then to at most `max` bytes on a character
/// boundary. Returns the bounded string and whether anything was dropped.
pub fn bound_str(s: &str, max: usize) -> (String, bool) {
    let (s, had_nul) = match s.find('\0') {
        Some(pos) => (&s[..pos], true),
        None => (s, false),
    };
    if s.len() <= max {
        return (s.to_string(), had_nul);
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    (s[..end].to_string(), true)
}

/// Same as [`bound_str`] for raw bytes received from native code.
///
/// Invalid UTF-8 is replaced rather than rejected.
pub fn bound_bytes(bytes: &[u8], max: usize) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let text = String::from_utf8_lossy(&bytes[..end]);
    bound_str(&text, max).0
}

/// SSID/password pair of the most recent join attempt.
#[derive(Clone, Default, PartialEq, Eq, Zeroize)]
pub struct JoinInfo {
    ssid: String,
    password: String,
}

impl JoinInfo {
    /// An empty record.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from script-supplied strings, truncating oversized input.
    pub fn from_parts(ssid: &str, password: &str) -> Self {
        let (ssid, ssid_cut) = bound_str(ssid, MAX_SSID_LEN);
        let (password, password_cut) = bound_str(password, MAX_PASSWORD_LEN);
        if ssid_cut || password_cut {
            warn!("join credentials truncated to native buffer size");
        }
        Self { ssid, password }
    }

    /// Build from raw bytes delivered by a provisioning service.
    pub fn from_raw(ssid: &[u8], password: Option<&[u8]>) -> Self {
        Self {
            ssid: bound_bytes(ssid, MAX_SSID_LEN),
            password: password
                .map(|p| bound_bytes(p, MAX_PASSWORD_LEN))
                .unwrap_or_default(),
        }
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// True when no SSID is stored.
    pub fn is_empty(&self) -> bool {
        self.ssid.is_empty()
    }

    /// Check if this is an open network (no password).
    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }

    /// Zero and clear both fields.
    pub fn clear(&mut self) {
        self.zeroize();
    }

    /// Copy both fields into NUL-terminated native buffers.
    pub fn to_c_buffers(&self) -> ([u8; NATIVE_BUFFER_LEN], [u8; NATIVE_BUFFER_LEN]) {
        let mut ssid = [0u8; NATIVE_BUFFER_LEN];
        let mut password = [0u8; NATIVE_BUFFER_LEN];
        ssid[..self.ssid.len()].copy_from_slice(self.ssid.as_bytes());
        password[..self.password.len()].copy_from_slice(self.password.as_bytes());
        (ssid, password)
    }
}

impl Drop for JoinInfo {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

impl fmt::Debug for JoinInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinInfo")
            .field("ssid", &self.ssid)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .finish()
    }
}

/// The single shared [`JoinInfo`] of a context.
///
/// Written by the scripting thread on connect and by provisioning callbacks
/// on whatever thread the service uses.
#[derive(Clone, Default)]
pub struct JoinState {
    inner: Arc<Mutex<JoinInfo>>,
}

impl JoinState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, JoinInfo> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("join state mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Overwrite the stored credentials.
    pub fn store(&self, info: JoinInfo) {
        *self.lock() = info;
    }

    /// Clear fully, then store `info` if given. Returns what is now stored.
    pub fn reset_to(&self, info: Option<JoinInfo>) -> JoinInfo {
        let mut guard = self.lock();
        guard.clear();
        if let Some(info) = info {
            *guard = info;
        }
        guard.clone()
    }

    pub fn snapshot(&self) -> JoinInfo {
        self.lock().clone()
    }
}

impl fmt::Debug for JoinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("JoinState").field(&*self.lock()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Bounding Tests ====================

    #[test]
    fn test_short_input_unchanged() {
        assert_eq!(bound_str("net", MAX_SSID_LEN), ("net".to_string(), false));
    }

    #[test]
    fn test_exactly_at_limit() {
        let s = "a".repeat(MAX_SSID_LEN);
        let (bounded, cut) = bound_str(&s, MAX_SSID_LEN);
        assert_eq!(bounded.len(), 63);
        assert!(!cut);

        let info = JoinInfo::from_parts(&s, &s);
        let (ssid, password) = info.to_c_buffers();
        assert_eq!(ssid[62], b'a');
        assert_eq!(ssid[63], 0);
        assert_eq!(password[63], 0);
    }

    #[test]
    fn test_over_limit_truncates() {
        let s = "b".repeat(MAX_SSID_LEN + 1);
        let (bounded, cut) = bound_str(&s, MAX_SSID_LEN);
        assert_eq!(bounded.len(), MAX_SSID_LEN);
        assert!(cut);
    }

    #[test]
    fn test_truncation_respects_char_boundary() {
        // 62 ASCII bytes followed by a 3-byte character
        let s = format!("{}€", "x".repeat(62));
        let (bounded, cut) = bound_str(&s, MAX_SSID_LEN);
        assert_eq!(bounded, "x".repeat(62));
        assert!(cut);
    }

    #[test]
    fn test_interior_nul_cuts() {
        let (bounded, cut) = bound_str("abc\0def", MAX_SSID_LEN);
        assert_eq!(bounded, "abc");
        assert!(cut);
    }

    #[test]
    fn test_bound_bytes_lossy() {
        assert_eq!(bound_bytes(b"home\0junk", MAX_SSID_LEN), "home");
        assert_eq!(bound_bytes(&[b'o', b'k', 0xff], MAX_SSID_LEN), "ok\u{fffd}");
    }

    // ==================== JoinInfo Tests ====================

    #[test]
    fn test_from_parts() {
        let info = JoinInfo::from_parts("TestNetwork", "password123");
        assert_eq!(info.ssid(), "TestNetwork");
        assert_eq!(info.password(), "password123");
        assert!(!info.is_empty());
        assert!(!info.is_open());
    }

    #[test]
    fn test_from_raw_without_password() {
        let info = JoinInfo::from_raw(b"OpenNet", None);
        assert_eq!(info.ssid(), "OpenNet");
        assert!(info.is_open());
    }

    #[test]
    fn test_clear() {
        let mut info = JoinInfo::from_parts("a", "b");
        info.clear();
        assert!(info.is_empty());
        assert!(info.is_open());
    }

    #[test]
    fn test_debug_redacts_password() {
        let info = JoinInfo::from_parts("net", "hunter22");
        let debug = format!("{:?}", info);
        assert!(debug.contains("net"));
        assert!(!debug.contains("hunter22"));
    }

    // ==================== JoinState Tests ====================

    #[test]
    fn test_store_is_last_write_wins() {
        let state = JoinState::new();
        state.store(JoinInfo::from_parts("first", "1"));
        state.store(JoinInfo::from_parts("second", ""));
        let snap = state.snapshot();
        assert_eq!(snap.ssid(), "second");
        assert_eq!(snap.password(), "");
    }

    #[test]
    fn test_reset_to_none_clears_everything() {
        let state = JoinState::new();
        state.store(JoinInfo::from_parts("old", "oldpass"));
        let now = state.reset_to(None);
        assert!(now.is_empty());
        assert!(now.is_open());
        assert!(state.snapshot().is_empty());
    }

    #[test]
    fn test_reset_to_does_not_leak_old_password() {
        let state = JoinState::new();
        state.store(JoinInfo::from_parts("old", "oldpass"));
        let now = state.reset_to(Some(JoinInfo::from_raw(b"new", None)));
        assert_eq!(now.ssid(), "new");
        assert_eq!(now.password(), "");
    }

    #[test]
    fn test_state_shared_between_clones() {
        let state = JoinState::new();
        let other = state.clone();
        other.store(JoinInfo::from_parts("shared", "x"));
        assert_eq!(state.snapshot().ssid(), "shared");
    }
}
