//! Key identifiers

use std::fmt;

/// Human readable identifier of a physical key, e.g. `A`, `ENTER`, `LEFTSHIFT`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(String);

impl KeyId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name a Linux input scancode the way the kernel headers do, minus the
    /// `KEY_` prefix.
    #[cfg(target_os = "linux")]
    pub fn from_scancode(code: u16) -> Self {
        let name = format!("{:?}", evdev::Key::new(code));
        match name.strip_prefix("KEY_") {
            Some(short) => Self::new(short),
            None if name.starts_with("BTN_") => Self::new(name),
            None => Self::new(format!("CODE_{}", code)),
        }
    }

    /// Name a key reported by the polling fallback listener
    pub fn from_keycode(keycode: device_query::Keycode) -> Self {
        Self::new(format!("{:?}", keycode).to_uppercase())
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for KeyId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_name() {
        assert_eq!(KeyId::from("ENTER").to_string(), "ENTER");
        assert_eq!(KeyId::new(String::from("A")).as_str(), "A");
    }

    #[test]
    fn keycode_names_are_uppercase() {
        assert_eq!(KeyId::from_keycode(device_query::Keycode::A).as_str(), "A");
        assert_eq!(
            KeyId::from_keycode(device_query::Keycode::Enter).as_str(),
            "ENTER"
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn scancode_names_drop_prefix() {
        assert_eq!(KeyId::from_scancode(30).as_str(), "A");
        assert_eq!(KeyId::from_scancode(28).as_str(), "ENTER");
        assert_eq!(KeyId::from_scancode(42).as_str(), "LEFTSHIFT");
    }
}
