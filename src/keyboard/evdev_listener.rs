//! Raw evdev-based keyboard listener for Linux
//!
//! Reads key events from `/dev/input/event*` and turns key transitions into
//! [`RawEvent`]s. Autorepeat and duplicate transitions never reach the
//! classifier.

use super::{KeyId, RawEvent, Transition};
use evdev::{Device, EventType};
use nix::libc;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Error type for evdev operations
#[derive(Debug, thiserror::Error)]
pub enum EvdevError {
    #[error("No keyboard devices found")]
    NoDevices,

    #[error("Permission denied accessing {0}")]
    PermissionDenied(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Device enumeration failed: {0}")]
    EnumerationFailed(String),
}

const KEY_RELEASE: i32 = 0;
const KEY_PRESS: i32 = 1;
const KEY_REPEAT: i32 = 2;

/// A keyboard device found on this machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub path: PathBuf,
    pub name: String,
}

/// List keyboard-like devices with their names
pub fn list_keyboards() -> Result<Vec<DeviceInfo>, EvdevError> {
    let keyboards: Vec<DeviceInfo> = evdev::enumerate()
        .filter(|(path, _)| is_keyboard_device(path))
        .map(|(path, device)| DeviceInfo {
            path,
            name: device.name().unwrap_or("Unknown").to_string(),
        })
        .collect();

    if keyboards.is_empty() {
        return Err(EvdevError::NoDevices);
    }
    Ok(keyboards)
}

/// Find the first device whose name contains `name`
pub fn find_device_by_name(name: &str) -> Option<DeviceInfo> {
    evdev::enumerate()
        .map(|(path, device)| DeviceInfo {
            path,
            name: device.name().unwrap_or("").to_string(),
        })
        .find(|info| info.name.contains(name))
}

/// Find all keyboard input devices
fn find_keyboard_devices() -> Result<Vec<PathBuf>, EvdevError> {
    let input_dir = Path::new("/dev/input");
    if !input_dir.exists() {
        return Err(EvdevError::EnumerationFailed(
            "/dev/input does not exist".to_string(),
        ));
    }

    let mut keyboards: Vec<PathBuf> = fs::read_dir(input_dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("event"))
        })
        .filter(|path| is_keyboard_device(path))
        .collect();

    if keyboards.is_empty() {
        return Err(EvdevError::NoDevices);
    }
    keyboards.sort();
    Ok(keyboards)
}

/// Check if a device is a keyboard by examining /sys/class/input
fn is_keyboard_device(device_path: &Path) -> bool {
    let Some(name) = device_path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };

    // Key capabilities are a hex bitmap; a real keyboard maps 80+ keys
    let caps_path = format!("/sys/class/input/{}/device/capabilities/key", name);
    if let Ok(caps) = fs::read_to_string(&caps_path) {
        let trimmed = caps.trim();
        if !trimmed.is_empty() && trimmed != "0" {
            return count_capability_bits(trimmed) > 50;
        }
    }

    let name_path = format!("/sys/class/input/{}/device/name", name);
    if let Ok(dev_name) = fs::read_to_string(&name_path) {
        let dev_name_lower = dev_name.to_lowercase();
        return dev_name_lower.contains("keyboard")
            || dev_name_lower.contains("kbd")
            || dev_name_lower.contains("hid");
    }
    false
}

fn count_capability_bits(bitmap: &str) -> u32 {
    bitmap
        .split_whitespace()
        .filter_map(|hex| u64::from_str_radix(hex, 16).ok())
        .map(|n| n.count_ones())
        .sum()
}

/// Decide what a kernel key event means given the keys already down.
///
/// Returns `None` for repeats, unknown values and transitions that do not
/// change the key's state.
fn translate(code: u16, value: i32, pressed: &mut HashSet<u16>) -> Option<Transition> {
    match value {
        KEY_PRESS if pressed.insert(code) => Some(Transition::Press),
        KEY_RELEASE if pressed.remove(&code) => Some(Transition::Release),
        KEY_REPEAT => None,
        _ => None,
    }
}

/// Evdev-based keyboard listener
pub struct EvdevListener {
    devices: Vec<Device>,
    device_paths: Vec<PathBuf>,
    pressed_keys: HashSet<u16>,
    event_tx: mpsc::Sender<RawEvent>,
}

impl EvdevListener {
    /// Open the device named `keyboard_name`, or every keyboard when the
    /// name is empty or matches nothing.
    pub fn new(keyboard_name: &str, event_tx: mpsc::Sender<RawEvent>) -> Result<Self, EvdevError> {
        if !keyboard_name.is_empty() {
            match find_device_by_name(keyboard_name) {
                Some(info) => {
                    log::info!("using keyboard '{}' at {}", info.name, info.path.display());
                    return Self::open(vec![info.path], event_tx);
                }
                None => log::warn!(
                    "could not find '{}', falling back to detected keyboards",
                    keyboard_name
                ),
            }
        }

        let paths = find_keyboard_devices()?;
        for path in &paths {
            log::info!("using keyboard device {}", path.display());
        }
        Self::open(paths, event_tx)
    }

    /// Open specific device files
    pub fn open(device_paths: Vec<PathBuf>, event_tx: mpsc::Sender<RawEvent>) -> Result<Self, EvdevError> {
        let mut devices = Vec::new();
        let mut opened = Vec::new();

        for path in device_paths {
            match Device::open(&path) {
                Ok(device) => {
                    devices.push(device);
                    opened.push(path);
                }
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                    log::warn!("permission denied opening {}", path.display());
                }
                Err(e) => return Err(EvdevError::Io(e)),
            }
        }

        if devices.is_empty() {
            return Err(EvdevError::PermissionDenied(
                "Cannot access any keyboard devices. Try running with sudo or add user to 'input' group.".to_string(),
            ));
        }

        Ok(Self {
            devices,
            device_paths: opened,
            pressed_keys: HashSet::new(),
            event_tx,
        })
    }

    /// Try to create an evdev listener, return None if not available
    pub fn try_new(keyboard_name: &str, event_tx: mpsc::Sender<RawEvent>) -> Option<Self> {
        match Self::new(keyboard_name, event_tx) {
            Ok(listener) => Some(listener),
            Err(e) => {
                log::warn!("evdev unavailable: {}", e);
                None
            }
        }
    }

    /// Paths of the opened devices
    pub fn device_paths(&self) -> &[PathBuf] {
        &self.device_paths
    }

    /// Wait up to `timeout` for input, then forward every key transition.
    /// Returns the number of events sent.
    pub fn wait(&mut self, timeout: Duration) -> Result<usize, EvdevError> {
        let mut poll_fds: Vec<libc::pollfd> = self
            .devices
            .iter()
            .map(|d| libc::pollfd {
                fd: d.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();

        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
        let ready = unsafe {
            libc::poll(
                poll_fds.as_mut_ptr(),
                poll_fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };

        if ready < 0 {
            let err = io::Error::last_os_error();
            // Interrupted by a signal (e.g. Ctrl+C); the caller checks its flag
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(EvdevError::Io(err));
        }
        if ready == 0 {
            return Ok(0);
        }

        let now = Instant::now();
        let mut event_count = 0;
        for (device, poll_fd) in self.devices.iter_mut().zip(&poll_fds) {
            // Only devices with data; fetching from an idle one would block
            if poll_fd.revents & libc::POLLIN == 0 {
                continue;
            }

            let events = match device.fetch_events() {
                Ok(events) => events,
                Err(e) => {
                    log::warn!("read error on keyboard device: {}", e);
                    continue;
                }
            };

            for event in events {
                if event.event_type() != EventType::KEY {
                    continue;
                }
                let Some(transition) = translate(event.code(), event.value(), &mut self.pressed_keys)
                else {
                    continue;
                };

                let raw = RawEvent::new(KeyId::from_scancode(event.code()), transition, now);
                let _ = self.event_tx.send(raw);
                event_count += 1;
            }
        }

        Ok(event_count)
    }
}

/// Get a status message about evdev availability
pub fn evdev_status() -> String {
    match find_keyboard_devices() {
        Ok(devices) => format!("{} keyboard device(s) found", devices.len()),
        Err(EvdevError::NoDevices) => "No keyboard devices found".to_string(),
        Err(EvdevError::PermissionDenied(_)) => {
            "Permission denied - run with sudo or add user to 'input' group".to_string()
        }
        Err(e) => format!("Error: {}", e),
    }
}
