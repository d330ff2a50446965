//! Headless backend
//!
//! In-memory implementations of the scene, shell, and seat collaborators.
//! This is the only backend shipped: it lets the compositor run without a
//! display stack (`monocle --headless`) and gives the test suite a fully
//! inspectable substrate to drive end-to-end scenarios against.

use std::collections::HashMap;
use std::time::Instant;

use log::trace;

use crate::output::OutputId;
use crate::scene::{Hit, NodeId, NodeKind, Rectangle, Scene, SceneError};
use crate::seat::{AxisEvent, Modifiers, Seat, SeatCapabilities};
use crate::shell::{DecorationId, DecorationMode, Shell, SurfaceId, ToplevelId};

#[derive(Debug)]
struct Node {
    parent: Option<NodeId>,
    kind: NodeKind,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    enabled: bool,
    tag: Option<u64>,
    children: Vec<NodeId>,
}

/// In-memory scene graph with painter's-order hit testing: within a parent,
/// later children are on top.
pub struct HeadlessScene {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
    next_id: NodeId,
    bound_outputs: HashMap<OutputId, OutputTarget>,
    /// Fault-injection knob: make the next `bind_output` calls fail, as a
    /// real render stack does when an output cannot be initialized.
    pub fail_output_bind: bool,
}

#[derive(Debug, Default)]
struct OutputTarget {
    commits: u64,
    last_frame: Option<Instant>,
}

impl Default for HeadlessScene {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessScene {
    pub fn new() -> Self {
        let root = 1;
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            Node {
                parent: None,
                kind: NodeKind::Tree,
                x: 0,
                y: 0,
                width: 0,
                height: 0,
                enabled: true,
                tag: None,
                children: Vec::new(),
            },
        );
        Self {
            nodes,
            root,
            next_id: 2,
            bound_outputs: HashMap::new(),
            fail_output_bind: false,
        }
    }

    fn insert_node(&mut self, parent: NodeId, kind: NodeKind, tag: Option<u64>) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        // Children inherit the parent's tag unless given their own.
        let tag = tag.or_else(|| self.nodes.get(&parent).and_then(|p| p.tag));
        self.nodes.insert(
            id,
            Node {
                parent: Some(parent),
                kind,
                x: 0,
                y: 0,
                width: 0,
                height: 0,
                enabled: true,
                tag,
                children: Vec::new(),
            },
        );
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.push(id);
        }
        id
    }

    fn hit_node(&self, id: NodeId, ox: i32, oy: i32, x: f64, y: f64) -> Option<Hit> {
        let node = self.nodes.get(&id)?;
        if !node.enabled {
            return None;
        }
        let ax = ox + node.x;
        let ay = oy + node.y;
        for &child in node.children.iter().rev() {
            if let Some(hit) = self.hit_node(child, ax, ay, x, y) {
                return Some(hit);
            }
        }
        match node.kind {
            NodeKind::Tree => None,
            kind => {
                let rect = Rectangle::from_loc_and_size((ax, ay), (node.width, node.height));
                rect.contains(x, y).then_some(Hit {
                    node: id,
                    kind,
                    tag: node.tag,
                })
            }
        }
    }

    fn destroy_recursive(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.remove(&id) {
            for child in node.children {
                self.destroy_recursive(child);
            }
        }
    }

    /// Number of scene commits performed for an output.
    pub fn output_commits(&self, output: OutputId) -> u64 {
        self.bound_outputs
            .get(&output)
            .map(|t| t.commits)
            .unwrap_or(0)
    }

    pub fn rect_size(&self, node: NodeId) -> (u32, u32) {
        self.nodes
            .get(&node)
            .map(|n| (n.width, n.height))
            .unwrap_or((0, 0))
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn tag_of(&self, node: NodeId) -> Option<u64> {
        self.nodes.get(&node).and_then(|n| n.tag)
    }
}

impl Scene for HeadlessScene {
    fn root(&self) -> NodeId {
        self.root
    }

    fn create_tree(&mut self, parent: NodeId, tag: Option<u64>) -> NodeId {
        self.insert_node(parent, NodeKind::Tree, tag)
    }

    fn create_rect(&mut self, parent: NodeId, width: u32, height: u32, color: [f32; 4]) -> NodeId {
        let _ = color;
        let id = self.insert_node(parent, NodeKind::Rect, None);
        self.set_rect_size(id, width, height);
        id
    }

    fn create_buffer(&mut self, parent: NodeId, width: u32, height: u32) -> NodeId {
        let id = self.insert_node(parent, NodeKind::Buffer, None);
        self.set_buffer_size(id, width, height);
        id
    }

    fn set_position(&mut self, node: NodeId, x: i32, y: i32) {
        if let Some(node) = self.nodes.get_mut(&node) {
            node.x = x;
            node.y = y;
        }
    }

    fn position(&self, node: NodeId) -> (i32, i32) {
        self.nodes.get(&node).map(|n| (n.x, n.y)).unwrap_or((0, 0))
    }

    fn set_enabled(&mut self, node: NodeId, enabled: bool) {
        if let Some(node) = self.nodes.get_mut(&node) {
            node.enabled = enabled;
        }
    }

    fn is_enabled(&self, node: NodeId) -> bool {
        self.nodes.get(&node).map(|n| n.enabled).unwrap_or(false)
    }

    fn set_rect_size(&mut self, node: NodeId, width: u32, height: u32) {
        if let Some(node) = self.nodes.get_mut(&node) {
            node.width = width;
            node.height = height;
        }
    }

    fn set_buffer_size(&mut self, node: NodeId, width: u32, height: u32) {
        self.set_rect_size(node, width, height);
    }

    fn destroy(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes.get(&node).and_then(|n| n.parent) {
            if let Some(parent) = self.nodes.get_mut(&parent) {
                parent.children.retain(|&child| child != node);
            }
        }
        self.destroy_recursive(node);
    }

    fn node_at(&self, x: f64, y: f64) -> Option<Hit> {
        self.hit_node(self.root, 0, 0, x, y)
    }

    fn bind_output(&mut self, output: OutputId) -> Result<(), SceneError> {
        if self.fail_output_bind {
            return Err(SceneError::RenderInit(output));
        }
        self.bound_outputs.insert(output, OutputTarget::default());
        Ok(())
    }

    fn commit_output(&mut self, output: OutputId) {
        if let Some(target) = self.bound_outputs.get_mut(&output) {
            target.commits += 1;
        }
    }

    fn frame_done(&mut self, output: OutputId, time: Instant) {
        if let Some(target) = self.bound_outputs.get_mut(&output) {
            target.last_frame = Some(time);
        }
    }
}

#[derive(Debug, Clone)]
struct ToplevelState {
    surface: SurfaceId,
    geometry: Rectangle,
    title: Option<String>,
    commits: u32,
}

/// In-memory protocol layer. Tests create toplevels, stage geometry and
/// commits on it, and inspect the requests the compositor sent back.
#[derive(Debug, Default)]
pub struct HeadlessShell {
    toplevels: HashMap<ToplevelId, ToplevelState>,
    next_id: u64,
    /// Every `request_size` the compositor issued, in order.
    pub size_requests: Vec<(ToplevelId, u32, u32)>,
    /// Every `set_decoration_mode` the compositor issued, in order.
    pub decoration_modes: Vec<(DecorationId, DecorationMode)>,
}

impl HeadlessShell {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    pub fn create_toplevel(&mut self) -> ToplevelId {
        let id = self.next_id;
        self.next_id += 1;
        self.toplevels.insert(
            id,
            ToplevelState {
                // Surface ids live in their own space.
                surface: id + 1000,
                geometry: Rectangle::default(),
                title: None,
                commits: 0,
            },
        );
        id
    }

    pub fn set_geometry(&mut self, toplevel: ToplevelId, geometry: Rectangle) {
        if let Some(state) = self.toplevels.get_mut(&toplevel) {
            state.geometry = geometry;
        }
    }

    pub fn set_title(&mut self, toplevel: ToplevelId, title: &str) {
        if let Some(state) = self.toplevels.get_mut(&toplevel) {
            state.title = Some(title.to_string());
        }
    }

    /// Stage a commit: the first one is the initial commit and marks the
    /// toplevel initialized.
    pub fn commit(&mut self, toplevel: ToplevelId) {
        if let Some(state) = self.toplevels.get_mut(&toplevel) {
            state.commits += 1;
        }
    }

    pub fn destroy_toplevel(&mut self, toplevel: ToplevelId) {
        self.toplevels.remove(&toplevel);
    }
}

impl Shell for HeadlessShell {
    fn surface(&self, toplevel: ToplevelId) -> SurfaceId {
        self.toplevels
            .get(&toplevel)
            .map(|t| t.surface)
            .unwrap_or(0)
    }

    fn geometry(&self, toplevel: ToplevelId) -> Rectangle {
        self.toplevels
            .get(&toplevel)
            .map(|t| t.geometry)
            .unwrap_or_default()
    }

    fn title(&self, toplevel: ToplevelId) -> Option<String> {
        self.toplevels.get(&toplevel).and_then(|t| t.title.clone())
    }

    fn is_initialized(&self, toplevel: ToplevelId) -> bool {
        self.toplevels
            .get(&toplevel)
            .map(|t| t.commits > 0)
            .unwrap_or(false)
    }

    fn is_initial_commit(&self, toplevel: ToplevelId) -> bool {
        self.toplevels
            .get(&toplevel)
            .map(|t| t.commits == 1)
            .unwrap_or(false)
    }

    fn request_size(&mut self, toplevel: ToplevelId, width: u32, height: u32) {
        self.size_requests.push((toplevel, width, height));
    }

    fn set_decoration_mode(&mut self, decoration: DecorationId, mode: DecorationMode) {
        self.decoration_modes.push((decoration, mode));
    }
}

/// One observable seat interaction, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum SeatCall {
    Capabilities(SeatCapabilities),
    KeyboardEnter {
        surface: SurfaceId,
        pressed: Vec<u32>,
        modifiers: Modifiers,
    },
    Key {
        time_ms: u32,
        keycode: u32,
        pressed: bool,
    },
    Modifiers(Modifiers),
    PointerEnter {
        surface: SurfaceId,
        sx: f64,
        sy: f64,
    },
    PointerMotion {
        surface: SurfaceId,
        sx: f64,
        sy: f64,
    },
    PointerButton {
        surface: SurfaceId,
        button: u32,
        pressed: bool,
    },
    PointerAxis(AxisEvent),
    PointerFrame,
    ClearFocus,
    CursorShape(String),
    CursorSurface {
        surface: SurfaceId,
        hotspot_x: i32,
        hotspot_y: i32,
    },
}

/// In-memory seat. Mirrors the real one's semantics: notify calls that need
/// a focused surface are dropped when there is none, and a destroyed surface
/// implicitly loses whatever focus it held.
#[derive(Debug, Default)]
pub struct HeadlessSeat {
    pub calls: Vec<SeatCall>,
    keyboard_focus: Option<SurfaceId>,
    pointer_focus: Option<SurfaceId>,
    capabilities: SeatCapabilities,
    keymap: Option<String>,
    repeat: (i32, i32),
}

impl HeadlessSeat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keyboard_focus(&self) -> Option<SurfaceId> {
        self.keyboard_focus
    }

    pub fn pointer_focus(&self) -> Option<SurfaceId> {
        self.pointer_focus
    }

    pub fn capabilities(&self) -> SeatCapabilities {
        self.capabilities
    }

    pub fn keymap(&self) -> Option<&str> {
        self.keymap.as_deref()
    }

    pub fn repeat_info(&self) -> (i32, i32) {
        self.repeat
    }
}

impl Seat for HeadlessSeat {
    fn set_capabilities(&mut self, caps: SeatCapabilities) {
        self.capabilities = caps;
        self.calls.push(SeatCall::Capabilities(caps));
    }

    fn set_keyboard(&mut self, keymap: Option<&str>, repeat_rate: i32, repeat_delay_ms: i32) {
        self.keymap = keymap.map(str::to_string);
        self.repeat = (repeat_rate, repeat_delay_ms);
    }

    fn keyboard_enter(&mut self, surface: SurfaceId, pressed: &[u32], modifiers: Modifiers) {
        self.keyboard_focus = Some(surface);
        self.calls.push(SeatCall::KeyboardEnter {
            surface,
            pressed: pressed.to_vec(),
            modifiers,
        });
    }

    fn keyboard_key(&mut self, time_ms: u32, keycode: u32, pressed: bool) {
        if self.keyboard_focus.is_none() {
            trace!("seat: key {} with no keyboard focus, dropped", keycode);
            return;
        }
        self.calls.push(SeatCall::Key {
            time_ms,
            keycode,
            pressed,
        });
    }

    fn keyboard_modifiers(&mut self, modifiers: Modifiers) {
        if self.keyboard_focus.is_none() {
            return;
        }
        self.calls.push(SeatCall::Modifiers(modifiers));
    }

    fn pointer_enter(&mut self, surface: SurfaceId, sx: f64, sy: f64) {
        self.pointer_focus = Some(surface);
        self.calls.push(SeatCall::PointerEnter { surface, sx, sy });
    }

    fn pointer_motion(&mut self, time_ms: u32, sx: f64, sy: f64) {
        let _ = time_ms;
        let Some(surface) = self.pointer_focus else {
            return;
        };
        self.calls.push(SeatCall::PointerMotion { surface, sx, sy });
    }

    fn pointer_button(&mut self, time_ms: u32, button: u32, pressed: bool) {
        let _ = time_ms;
        let Some(surface) = self.pointer_focus else {
            trace!("seat: button {} with no pointer focus, dropped", button);
            return;
        };
        self.calls.push(SeatCall::PointerButton {
            surface,
            button,
            pressed,
        });
    }

    fn pointer_axis(&mut self, event: AxisEvent) {
        if self.pointer_focus.is_none() {
            return;
        }
        self.calls.push(SeatCall::PointerAxis(event));
    }

    fn pointer_frame(&mut self) {
        if self.pointer_focus.is_none() {
            return;
        }
        self.calls.push(SeatCall::PointerFrame);
    }

    fn clear_focus(&mut self) {
        self.keyboard_focus = None;
        self.pointer_focus = None;
        self.calls.push(SeatCall::ClearFocus);
    }

    fn set_cursor_shape(&mut self, shape: &str) {
        self.calls.push(SeatCall::CursorShape(shape.to_string()));
    }

    fn set_cursor_surface(&mut self, surface: SurfaceId, hotspot_x: i32, hotspot_y: i32) {
        self.calls.push(SeatCall::CursorSurface {
            surface,
            hotspot_x,
            hotspot_y,
        });
    }

    fn surface_destroyed(&mut self, surface: SurfaceId) {
        if self.keyboard_focus == Some(surface) {
            self.keyboard_focus = None;
        }
        if self.pointer_focus == Some(surface) {
            self.pointer_focus = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_test_returns_topmost_sibling() {
        let mut scene = HeadlessScene::new();
        let root = scene.root();
        let below = scene.create_rect(root, 100, 100, [0.0; 4]);
        let above = scene.create_rect(root, 100, 100, [0.0; 4]);

        let hit = scene.node_at(50.0, 50.0).unwrap();
        assert_eq!(hit.node, above);
        assert_ne!(hit.node, below);
    }

    #[test]
    fn disabled_subtree_is_invisible_to_hit_tests() {
        let mut scene = HeadlessScene::new();
        let root = scene.root();
        let tree = scene.create_tree(root, Some(42));
        let buffer = scene.create_buffer(tree, 200, 200);

        scene.set_enabled(tree, false);
        assert!(scene.node_at(10.0, 10.0).is_none());

        scene.set_enabled(tree, true);
        let hit = scene.node_at(10.0, 10.0).unwrap();
        assert_eq!(hit.node, buffer);
        assert_eq!(hit.kind, NodeKind::Buffer);
    }

    #[test]
    fn subtree_tag_is_inherited_by_future_nodes() {
        let mut scene = HeadlessScene::new();
        let root = scene.root();
        let tree = scene.create_tree(root, Some(7));
        let child_tree = scene.create_tree(tree, None);
        let buffer = scene.create_buffer(child_tree, 10, 10);

        assert_eq!(scene.tag_of(buffer), Some(7));
        assert_eq!(scene.node_at(5.0, 5.0).unwrap().tag, Some(7));
    }

    #[test]
    fn hit_test_uses_cumulative_positions() {
        let mut scene = HeadlessScene::new();
        let root = scene.root();
        let tree = scene.create_tree(root, Some(1));
        let buffer = scene.create_buffer(tree, 100, 100);
        scene.set_position(tree, 500, 300);

        assert!(scene.node_at(50.0, 50.0).is_none());
        assert_eq!(scene.node_at(550.0, 350.0).unwrap().node, buffer);
    }

    #[test]
    fn destroy_cascades_to_descendants() {
        let mut scene = HeadlessScene::new();
        let root = scene.root();
        let tree = scene.create_tree(root, Some(1));
        let inner = scene.create_tree(tree, None);
        let buffer = scene.create_buffer(inner, 50, 50);

        scene.destroy(tree);
        assert!(!scene.contains_node(tree));
        assert!(!scene.contains_node(inner));
        assert!(!scene.contains_node(buffer));
        assert!(scene.node_at(10.0, 10.0).is_none());
    }

    #[test]
    fn seat_drops_events_without_focus() {
        let mut seat = HeadlessSeat::new();
        seat.pointer_button(1, 0x110, true);
        seat.keyboard_key(1, 30, true);
        assert!(seat.calls.is_empty());

        seat.pointer_enter(5, 0.0, 0.0);
        seat.pointer_button(2, 0x110, true);
        assert_eq!(seat.calls.len(), 2);
    }

    #[test]
    fn destroyed_surface_loses_focus_implicitly() {
        let mut seat = HeadlessSeat::new();
        seat.keyboard_enter(5, &[], Modifiers::default());
        seat.pointer_enter(5, 0.0, 0.0);

        seat.surface_destroyed(5);
        assert!(seat.keyboard_focus().is_none());
        assert!(seat.pointer_focus().is_none());
        seat.pointer_button(3, 0x110, true);
        assert!(!seat
            .calls
            .iter()
            .any(|call| matches!(call, SeatCall::PointerButton { .. })));
    }

    #[test]
    fn shell_initial_commit_window() {
        let mut shell = HeadlessShell::new();
        let toplevel = shell.create_toplevel();
        assert!(!shell.is_initialized(toplevel));
        assert!(!shell.is_initial_commit(toplevel));

        shell.commit(toplevel);
        assert!(shell.is_initialized(toplevel));
        assert!(shell.is_initial_commit(toplevel));

        shell.commit(toplevel);
        assert!(!shell.is_initial_commit(toplevel));
    }
}
