//! Scripting-engine seam.
//!
//! The bridge never talks to a concrete interpreter. It only needs to call a
//! global function by name with a list of values, which is what
//! [`ScriptRuntime`] describes. [`GlobalTable`] is a minimal in-process
//! implementation used by the host binary and the tests.
//!
//! # Example
//!
//! ```
//! use wlan_uart_bridge::script::{GlobalTable, ScriptRuntime, ScriptValue};
//!
//! let mut globals = GlobalTable::new();
//! globals.register("sys_pub", |args| {
//!     assert_eq!(args[0], ScriptValue::from("WLAN_READY"));
//!     Ok(())
//! });
//!
//! let result = globals.call_global("sys_pub", &[ScriptValue::from("WLAN_READY")]);
//! assert!(matches!(result, Some(Ok(()))));
//! assert!(globals.call_global("missing", &[]).is_none());
//! ```

use std::collections::HashMap;
use std::fmt;

/// Name of the global publish function notifications are delivered to.
pub const PUBLISH_FUNCTION: &str = "sys_pub";

/// A value passed across the scripting boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptValue {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl ScriptValue {
    /// Returns the string contents if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for ScriptValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "nil"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// Error raised by a script function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    message: String,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "script error: {}", self.message)
    }
}

impl std::error::Error for ScriptError {}

/// The part of a scripting engine the bridge depends on.
///
/// Implementations live on the scripting thread only; nothing here requires
/// `Send`.
pub trait ScriptRuntime {
    /// Call the global function `name` with `args`.
    ///
    /// Returns `None` if no such global exists.
    fn call_global(&mut self, name: &str, args: &[ScriptValue]) -> Option<Result<(), ScriptError>>;
}

/// Boxed script-side function stored in a [`GlobalTable`].
pub type GlobalFn = Box<dyn FnMut(&[ScriptValue]) -> Result<(), ScriptError>>;

/// A flat table of named global functions.
#[derive(Default)]
pub struct GlobalTable {
    functions: HashMap<String, GlobalFn>,
}

impl GlobalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a global function.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: FnMut(&[ScriptValue]) -> Result<(), ScriptError> + 'static,
    {
        self.functions.insert(name.into(), Box::new(f));
    }

    /// Remove a global function. Returns true if it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        self.functions.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

impl fmt::Debug for GlobalTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("GlobalTable")
            .field("functions", &names)
            .finish()
    }
}

impl ScriptRuntime for GlobalTable {
    fn call_global(&mut self, name: &str, args: &[ScriptValue]) -> Option<Result<(), ScriptError>> {
        self.functions.get_mut(name).map(|f| f(args))
    }
}

/// Numeric status code reported alongside an error message at the scripting
/// boundary.
pub trait StatusCode: fmt::Display {
    fn code(&self) -> i32;
}

/// Convert an error into the `(code, message)` pair scripts receive instead
/// of a raised exception.
pub fn error_values<E: StatusCode + ?Sized>(err: &E) -> Vec<ScriptValue> {
    vec![
        ScriptValue::Int(i64::from(err.code())),
        ScriptValue::Str(err.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Fake;

    impl fmt::Display for Fake {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "fake failure")
        }
    }

    impl StatusCode for Fake {
        fn code(&self) -> i32 {
            7
        }
    }

    #[test]
    fn test_call_registered_global() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut globals = GlobalTable::new();
        globals.register("sys_pub", move |args| {
            sink.borrow_mut().extend_from_slice(args);
            Ok(())
        });

        let args = [ScriptValue::from("WLAN_READY"), ScriptValue::Int(1)];
        assert!(matches!(globals.call_global("sys_pub", &args), Some(Ok(()))));
        assert_eq!(seen.borrow().as_slice(), &args);
    }

    #[test]
    fn test_missing_global_is_none() {
        let mut globals = GlobalTable::new();
        assert!(globals.call_global("sys_pub", &[]).is_none());
    }

    #[test]
    fn test_global_error_is_returned() {
        let mut globals = GlobalTable::new();
        globals.register("boom", |_| Err(ScriptError::new("bad")));
        let result = globals.call_global("boom", &[]);
        assert_eq!(result, Some(Err(ScriptError::new("bad"))));
    }

    #[test]
    fn test_remove_global() {
        let mut globals = GlobalTable::new();
        globals.register("f", |_| Ok(()));
        assert!(globals.contains("f"));
        assert!(globals.remove("f"));
        assert!(!globals.remove("f"));
    }

    #[test]
    fn test_error_values_pair() {
        let values = error_values(&Fake);
        assert_eq!(
            values,
            vec![ScriptValue::Int(7), ScriptValue::from("fake failure")]
        );
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(ScriptValue::from("x").as_str(), Some("x"));
        assert_eq!(ScriptValue::Int(3).as_int(), Some(3));
        assert_eq!(ScriptValue::Nil.as_int(), None);
        assert_eq!(format!("{}", ScriptValue::from("x")), "\"x\"");
    }
}
