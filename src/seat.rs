//! Seat collaborator interface
//!
//! The seat is the single logical input source presented to clients. The
//! compositor never speaks the wire protocol itself; it tells the seat which
//! surface holds focus and forwards device events through it.

use crate::shell::SurfaceId;

/// Advertised capability set, recomputed additively as devices appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeatCapabilities {
    pub pointer: bool,
    pub keyboard: bool,
}

/// Merged modifier state of the logical keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub depressed: u32,
    pub latched: u32,
    pub locked: u32,
    pub group: u32,
}

/// One pointer axis (scroll) event, forwarded verbatim.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisEvent {
    pub time_ms: u32,
    pub horizontal: bool,
    pub delta: f64,
    pub delta_discrete: i32,
}

/// The single-seat input sink.
///
/// Notify-style calls that target the focused surface are dropped by the
/// seat when no surface holds the corresponding focus, so callers may
/// forward events without first resolving focus themselves.
pub trait Seat {
    fn set_capabilities(&mut self, caps: SeatCapabilities);

    /// Attach the logical keyboard: its compiled keymap (if any) and repeat
    /// parameters, advertised to every client that gains keyboard focus.
    fn set_keyboard(&mut self, keymap: Option<&str>, repeat_rate: i32, repeat_delay_ms: i32);

    /// Give a surface keyboard focus, replaying held keys and modifiers.
    fn keyboard_enter(&mut self, surface: SurfaceId, pressed: &[u32], modifiers: Modifiers);
    fn keyboard_key(&mut self, time_ms: u32, keycode: u32, pressed: bool);
    fn keyboard_modifiers(&mut self, modifiers: Modifiers);

    /// Give a surface pointer focus at surface-local entry coordinates.
    fn pointer_enter(&mut self, surface: SurfaceId, sx: f64, sy: f64);
    fn pointer_motion(&mut self, time_ms: u32, sx: f64, sy: f64);
    fn pointer_button(&mut self, time_ms: u32, button: u32, pressed: bool);
    fn pointer_axis(&mut self, event: AxisEvent);
    fn pointer_frame(&mut self);

    /// Clear keyboard and pointer focus together.
    fn clear_focus(&mut self);

    fn set_cursor_shape(&mut self, shape: &str);
    fn set_cursor_surface(&mut self, surface: SurfaceId, hotspot_x: i32, hotspot_y: i32);

    /// Protocol-layer teardown notification: the surface is gone and any
    /// focus it held is implicitly dropped.
    fn surface_destroyed(&mut self, surface: SurfaceId) {
        let _ = surface;
    }
}
