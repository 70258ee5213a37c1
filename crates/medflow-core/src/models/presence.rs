//! Presence policy for optional record content.
//!
//! A value is *present* when it carries displayable content. The literal
//! sentinel [`MISSING`], blank strings, `null`, empty collections, `false`
//! and zero all count as absent. The document assembler decides every
//! conditional section through [`present`] and nothing else.

use serde_json::Value;

/// Marker meaning "data point intentionally not collected".
pub const MISSING: &str = "Missing";

/// Values that can be asked whether they carry content.
pub trait Presence {
    fn is_present(&self) -> bool;
}

/// Uniform presence check used by the document assembler.
pub fn present<T: Presence + ?Sized>(value: &T) -> bool {
    value.is_present()
}

/// Whether a string equals the sentinel, ignoring surrounding whitespace and ASCII case.
pub fn is_sentinel(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case(MISSING)
}

impl Presence for str {
    fn is_present(&self) -> bool {
        !self.trim().is_empty() && !is_sentinel(self)
    }
}

impl Presence for String {
    fn is_present(&self) -> bool {
        self.as_str().is_present()
    }
}

impl<T: Presence> Presence for Option<T> {
    fn is_present(&self) -> bool {
        self.as_ref().is_some_and(Presence::is_present)
    }
}

impl<T: Presence> Presence for [T] {
    fn is_present(&self) -> bool {
        self.iter().any(Presence::is_present)
    }
}

impl<T: Presence> Presence for Vec<T> {
    fn is_present(&self) -> bool {
        self.as_slice().is_present()
    }
}

impl<T: Presence + ?Sized> Presence for &T {
    fn is_present(&self) -> bool {
        (**self).is_present()
    }
}

impl Presence for Value {
    fn is_present(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Value::String(s) => s.is_present(),
            Value::Array(items) => items.iter().any(Presence::is_present),
            Value::Object(map) => map.values().any(Presence::is_present),
        }
    }
}
