//! Secret wrapper for sensitive values
//!
//! Wraps the provider client secret (and anything else that must never reach
//! a log line) so that Debug/Display render `[REDACTED]` and the inner value
//! is zeroized on drop.

use std::fmt;
use zeroize::Zeroize;

/// Sensitive value - redacted in Debug/Display/logs, zeroized on drop.
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    /// Create a new secret value
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (use sparingly)
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T: Zeroize> From<T> for Secret<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_is_redacted() {
        let secret = Secret::new(String::from("kAcSOqF21Fu85e7zjz7ZN2U4ZRh"));
        let debug = format!("{secret:?}");
        assert_eq!(debug, "[REDACTED]");
        assert!(!debug.contains("kAcSOqF21Fu85e7zjz7ZN2U4ZRh"));
    }

    #[test]
    fn display_is_redacted() {
        let secret = Secret::new(String::from("client-secret-value"));
        assert_eq!(format!("{secret}"), "[REDACTED]");
    }

    #[test]
    fn expose_returns_inner_value() {
        let secret = Secret::new(String::from("client-secret-value"));
        assert_eq!(secret.expose(), "client-secret-value");
    }

    #[test]
    fn from_string_wraps() {
        let secret: Secret<String> = String::from("s").into();
        assert_eq!(secret.expose(), "s");
    }

    #[test]
    fn clone_preserves_value_and_redaction() {
        let secret = Secret::new(String::from("original"));
        let cloned = secret.clone();
        assert_eq!(cloned.expose(), "original");
        assert_eq!(format!("{cloned:?}"), "[REDACTED]");
    }
}
