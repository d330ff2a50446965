//! Focus-follows-pointer routing
//!
//! Every absolute pointer motion is hit-tested against the scene. The client
//! under the cursor holds keyboard and pointer focus together; both transfer
//! atomically when the cursor crosses onto a different client and both clear
//! when it rests on empty layout. There is no click-to-focus and no focus
//! history.

use std::time::Instant;

use log::trace;

use crate::client::{ClientId, ClientRegistry};
use crate::input::KeyboardGroup;
use crate::output::OutputRegistry;
use crate::scene::Scene;
use crate::seat::{AxisEvent, Seat};
use crate::shell::SurfaceId;

pub struct FocusRouter {
    focused: Option<ClientId>,
    default_cursor: String,
    /// Monotonic origin for the timestamps stamped onto synthesized motion.
    started: Instant,
}

impl FocusRouter {
    pub fn new(default_cursor: String) -> Self {
        Self {
            focused: None,
            default_cursor,
            started: Instant::now(),
        }
    }

    pub fn focused(&self) -> Option<ClientId> {
        self.focused
    }

    fn now_ms(&self) -> u32 {
        self.started.elapsed().as_millis() as u32
    }

    /// Route one absolute motion event. Coordinates arrive normalized to
    /// `0.0..=1.0` over the whole output layout.
    #[allow(clippy::too_many_arguments)]
    pub fn on_pointer_motion_absolute(
        &mut self,
        scene: &dyn Scene,
        clients: &ClientRegistry,
        outputs: &OutputRegistry,
        keyboard: &KeyboardGroup,
        seat: &mut dyn Seat,
        x_norm: f64,
        y_norm: f64,
    ) {
        let layout = outputs.layout_box();
        let x = layout.x as f64 + x_norm * layout.width as f64;
        let y = layout.y as f64 + y_norm * layout.height as f64;

        let Some(id) = clients.client_at(scene, x, y) else {
            // Empty layout under the cursor: the default shape is reasserted
            // on every motion, not only on the focus transition, because a
            // client that held focus may have set its own cursor surface.
            seat.set_cursor_shape(&self.default_cursor);
            if self.focused.take().is_some() {
                trace!("pointer left all clients, clearing focus");
                seat.clear_focus();
            }
            return;
        };

        let Some(client) = clients.get(id) else {
            return;
        };
        let (tree_x, tree_y) = scene.position(client.scene_tree);
        let sx = x - tree_x as f64;
        let sy = y - tree_y as f64;

        if self.focused != Some(id) {
            trace!("focus moves to client {}", id);
            // Keyboard and pointer transfer together, keyboard first so the
            // client sees itself focused before the first motion arrives.
            seat.keyboard_enter(client.surface, keyboard.pressed_keys(), keyboard.modifiers());
            seat.pointer_enter(client.surface, sx, sy);
            self.focused = Some(id);
        }

        seat.pointer_motion(self.now_ms(), sx, sy);
    }

    pub fn on_pointer_button(&mut self, seat: &mut dyn Seat, time_ms: u32, button: u32, pressed: bool) {
        seat.pointer_button(time_ms, button, pressed);
    }

    pub fn on_pointer_axis(&mut self, seat: &mut dyn Seat, event: AxisEvent) {
        seat.pointer_axis(event);
    }

    pub fn on_pointer_frame(&mut self, seat: &mut dyn Seat) {
        seat.pointer_frame();
    }

    /// Honor a client's cursor-surface request only while that client holds
    /// focus; anything else is a stale or hostile request and is dropped.
    pub fn on_request_set_cursor(
        &mut self,
        seat: &mut dyn Seat,
        client: ClientId,
        surface: SurfaceId,
        hotspot_x: i32,
        hotspot_y: i32,
    ) {
        if self.focused == Some(client) {
            seat.set_cursor_surface(surface, hotspot_x, hotspot_y);
        } else {
            trace!("cursor request from unfocused client {}, dropped", client);
        }
    }
}
