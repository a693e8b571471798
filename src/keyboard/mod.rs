//! Raw keyboard events and the listeners that produce them

mod event;
mod keymap;

#[cfg(target_os = "linux")]
pub mod evdev_listener;

pub use event::{KeyboardListener, RawEvent, Transition};
pub use keymap::KeyId;

#[cfg(target_os = "linux")]
pub use evdev_listener::{evdev_status, list_keyboards, DeviceInfo, EvdevError, EvdevListener};
