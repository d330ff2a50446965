//! Input device management
//!
//! Devices arrive from the backend one at a time. All keyboards are folded
//! into a single logical keyboard group sharing one keymap, one repeat
//! configuration, and one pressed-key/modifier state; pointers only count
//! toward the advertised capability set. Capabilities grow additively and
//! are re-advertised on every device arrival.

use std::time::Duration;

use log::{debug, error, warn};
use thiserror::Error;
use xkbcommon::xkb;

use crate::client::ClientId;
use crate::config::InputConfig;
use crate::seat::{AxisEvent, Modifiers, Seat, SeatCapabilities};
use crate::shell::SurfaceId;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to compile xkb keymap for layout '{layout}'")]
    KeymapCompile { layout: String },
}

/// What kind of hardware a new device is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Keyboard,
    Pointer,
    Touch,
    Tablet,
}

/// A device announced by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub name: String,
    pub kind: DeviceKind,
}

/// Raw input notifications delivered by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    DeviceAdded(InputDevice),
    Key {
        time_ms: u32,
        keycode: u32,
        pressed: bool,
    },
    Modifiers(Modifiers),
    /// Relative motion; logged only, focus routing uses absolute events.
    PointerMotion { time_ms: u32, dx: f64, dy: f64 },
    /// Absolute motion with coordinates normalized to `0.0..=1.0` over the
    /// output layout.
    PointerMotionAbsolute { time_ms: u32, x: f64, y: f64 },
    PointerButton {
        time_ms: u32,
        button: u32,
        pressed: bool,
    },
    PointerAxis(AxisEvent),
    PointerFrame,
    /// A client asks to show its own cursor surface.
    RequestSetCursor {
        client: ClientId,
        surface: SurfaceId,
        hotspot_x: i32,
        hotspot_y: i32,
    },
}

/// The single logical keyboard shared by every physical keyboard.
pub struct KeyboardGroup {
    keymap: Option<xkb::Keymap>,
    repeat_rate: i32,
    repeat_delay: i32,
    pressed: Vec<u32>,
    modifiers: Modifiers,
    keyboards: usize,
}

impl KeyboardGroup {
    /// Compile the configured keymap. Compilation failure is recoverable:
    /// the group still tracks keys and modifiers, clients just receive no
    /// keymap.
    pub fn new(config: &InputConfig) -> Self {
        let keymap = match Self::compile_keymap(config) {
            Ok(keymap) => Some(keymap),
            Err(e) => {
                error!("{}, continuing without a keymap", e);
                None
            }
        };

        Self {
            keymap,
            repeat_rate: config.repeat_rate,
            repeat_delay: config.repeat_delay,
            pressed: Vec::new(),
            modifiers: Modifiers::default(),
            keyboards: 0,
        }
    }

    fn compile_keymap(config: &InputConfig) -> Result<xkb::Keymap, InputError> {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        xkb::Keymap::new_from_names(
            &context,
            &config.xkb_rules,
            &config.xkb_model,
            &config.xkb_layout,
            &config.xkb_variant,
            config.xkb_options.clone(),
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )
        .ok_or_else(|| InputError::KeymapCompile {
            layout: config.xkb_layout.clone(),
        })
    }

    /// Serialized keymap handed to the seat, if compilation succeeded.
    pub fn keymap_string(&self) -> Option<String> {
        self.keymap
            .as_ref()
            .map(|keymap| keymap.get_as_string(xkb::KEYMAP_FORMAT_TEXT_V1))
    }

    /// Keys currently held, replayed on keyboard focus entry.
    pub fn pressed_keys(&self) -> &[u32] {
        &self.pressed
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn repeat_rate(&self) -> i32 {
        self.repeat_rate
    }

    pub fn repeat_delay(&self) -> i32 {
        self.repeat_delay
    }

    /// Interval between repeats once repeating has started; `None` when
    /// repeat is disabled.
    pub fn repeat_timeout(&self) -> Option<Duration> {
        if self.repeat_rate > 0 {
            Some(Duration::from_millis(1000 / self.repeat_rate as u64))
        } else {
            None
        }
    }

    fn record_key(&mut self, keycode: u32, pressed: bool) {
        if pressed {
            if !self.pressed.contains(&keycode) {
                self.pressed.push(keycode);
            }
        } else {
            self.pressed.retain(|&key| key != keycode);
        }
    }
}

/// Tracks devices and forwards their events to the seat.
pub struct InputManager {
    keyboard_group: KeyboardGroup,
    capabilities: SeatCapabilities,
    pointers: usize,
}

impl InputManager {
    pub fn new(config: &InputConfig) -> Self {
        Self {
            keyboard_group: KeyboardGroup::new(config),
            capabilities: SeatCapabilities::default(),
            pointers: 0,
        }
    }

    pub fn keyboard_group(&self) -> &KeyboardGroup {
        &self.keyboard_group
    }

    pub fn capabilities(&self) -> SeatCapabilities {
        self.capabilities
    }

    /// Fold a new device into the seat. Keyboards join the keyboard group;
    /// pointers bump the pointer count; anything else is ignored. The
    /// capability set is re-advertised either way.
    pub fn on_device_added(&mut self, seat: &mut dyn Seat, device: InputDevice) {
        match device.kind {
            DeviceKind::Keyboard => {
                self.keyboard_group.keyboards += 1;
                self.capabilities.keyboard = true;
                debug!(
                    "keyboard '{}' joins group ({} total)",
                    device.name, self.keyboard_group.keyboards
                );
            }
            DeviceKind::Pointer => {
                self.pointers += 1;
                self.capabilities.pointer = true;
                debug!("pointer '{}' added ({} total)", device.name, self.pointers);
            }
            kind => {
                warn!("unsupported input device '{}' ({:?})", device.name, kind);
            }
        }
        seat.set_capabilities(self.capabilities);
    }

    /// Forward a key event. Returns the period the repeat timer should be
    /// re-armed with; the timer is re-armed after every key event, or
    /// disarmed when repeat is disabled.
    pub fn on_key(
        &mut self,
        seat: &mut dyn Seat,
        time_ms: u32,
        keycode: u32,
        pressed: bool,
    ) -> Option<Duration> {
        self.keyboard_group.record_key(keycode, pressed);
        seat.keyboard_key(time_ms, keycode, pressed);
        self.keyboard_group.repeat_timeout()
    }

    /// Forward the merged modifier state of the keyboard group.
    pub fn on_modifiers(&mut self, seat: &mut dyn Seat, modifiers: Modifiers) {
        self.keyboard_group.modifiers = modifiers;
        seat.keyboard_modifiers(modifiers);
    }
}
