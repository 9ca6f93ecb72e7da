//! Observability trait for inspecting component state.
//!
//! Every chip exposes its internal state for debugging and for the CLI's
//! state dump. Queries never affect emulation state.

use std::collections::BTreeMap;
use std::fmt;

/// A dynamically-typed value for state queries.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Value {
    /// Boolean value.
    Bool(bool),
    /// 8-bit unsigned integer.
    U8(u8),
    /// 16-bit unsigned integer.
    U16(u16),
    /// 32-bit unsigned integer.
    U32(u32),
    /// 64-bit unsigned integer.
    U64(u64),
    /// 8-bit signed integer.
    I8(i8),
    /// 16-bit signed integer (CPU adjust offsets, counters that can go negative).
    I16(i16),
    /// String value.
    String(String),
    /// Array of values.
    Array(Vec<Value>),
    /// Map of string keys to values.
    Map(BTreeMap<String, Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v:#04X}"),
            Value::U16(v) => write!(f, "{v:#06X}"),
            Value::U32(v) => write!(f, "{v:#010X}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::I8(v) => write!(f, "{v}"),
            Value::I16(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::Array(arr) => {
                write!(f, "[")?;
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::U8(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::U16(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::U64(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::I8(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::I16(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

/// A component whose state can be inspected.
///
/// Observability is a core design goal. At any tick, you can inspect any
/// component. Queries never affect emulation state.
pub trait Observable {
    /// Query a specific property by path.
    ///
    /// Paths are hierarchical, separated by dots:
    /// - `pc` - Program counter
    /// - `crtc.r52` - Gate array interrupt line counter
    /// - `fdc.st0` - Status register 0
    ///
    /// Returns `None` if the path is not recognised.
    fn query(&self, path: &str) -> Option<Value>;

    /// List all available query paths.
    ///
    /// Returns paths that can be passed to `query()`.
    fn query_paths(&self) -> &'static [&'static str];

    /// Collect every listed path into one map.
    ///
    /// Paths that answer `None` (for example optional sub-devices that are
    /// absent) are left out.
    fn snapshot(&self) -> BTreeMap<String, Value> {
        self.query_paths()
            .iter()
            .filter_map(|path| self.query(path).map(|v| ((*path).to_string(), v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Latch {
        value: u8,
    }

    impl Observable for Latch {
        fn query(&self, path: &str) -> Option<Value> {
            match path {
                "value" => Some(self.value.into()),
                "missing" => None,
                _ => None,
            }
        }

        fn query_paths(&self) -> &'static [&'static str] {
            &["value", "missing"]
        }
    }

    #[test]
    fn snapshot_skips_unanswered_paths() {
        let latch = Latch { value: 0x8D };
        let snap = latch.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.get("value"), Some(&Value::U8(0x8D)));
    }

    #[test]
    fn display_formats_by_width() {
        assert_eq!(Value::U8(0x0A).to_string(), "0x0A");
        assert_eq!(Value::U16(0xBE00).to_string(), "0xBE00");
        assert_eq!(Value::I16(-2).to_string(), "-2");
        let arr = Value::Array(vec![Value::Bool(true), Value::U8(1)]);
        assert_eq!(arr.to_string(), "[true, 0x01]");
    }
}
