//! Scene-graph collaborator interface
//!
//! The compositor consumes the scene graph as an opaque spatial index and
//! renderer: it creates subtrees for clients, moves and toggles them, and
//! asks "what is the topmost node at this layout coordinate". Everything
//! else (damage tracking, actual painting) belongs to the scene library
//! behind this trait.

use crate::output::OutputId;

/// Identifier for a node in the scene graph.
pub type NodeId = u64;

/// What a scene node paints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Grouping node; owns children, paints nothing itself.
    Tree,
    /// Solid color fill (used for the background).
    Rect,
    /// Client surface content.
    Buffer,
}

/// Result of a hit-test query: the topmost enabled node under the point,
/// together with the owner tag its subtree was constructed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub node: NodeId,
    pub kind: NodeKind,
    pub tag: Option<u64>,
}

/// A rectangle in layout coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rectangle {
    pub fn from_loc_and_size((x, y): (i32, i32), (width, height): (u32, u32)) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x as f64
            && y >= self.y as f64
            && x < (self.x + self.width as i32) as f64
            && y < (self.y + self.height as i32) as f64
    }
}

/// Error raised by the scene/render collaborator when binding an output.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("failed to initialize rendering for output {0}")]
    RenderInit(OutputId),
}

/// The spatial index and renderer the compositor drives.
///
/// Subtrees are created with an owner tag that the scene applies to every
/// present and future node of that subtree, so hit tests can resolve back to
/// the owning client without the registry re-walking the tree as it grows.
pub trait Scene {
    /// The root node every client subtree hangs under.
    fn root(&self) -> NodeId;

    /// Create a grouping subtree. `tag` is inherited by all descendants;
    /// `None` inherits the parent's tag.
    fn create_tree(&mut self, parent: NodeId, tag: Option<u64>) -> NodeId;

    /// Create a solid-color rect node.
    fn create_rect(&mut self, parent: NodeId, width: u32, height: u32, color: [f32; 4]) -> NodeId;

    /// Create a surface-content node.
    fn create_buffer(&mut self, parent: NodeId, width: u32, height: u32) -> NodeId;

    fn set_position(&mut self, node: NodeId, x: i32, y: i32);
    fn position(&self, node: NodeId) -> (i32, i32);

    fn set_enabled(&mut self, node: NodeId, enabled: bool);
    fn is_enabled(&self, node: NodeId) -> bool;

    fn set_rect_size(&mut self, node: NodeId, width: u32, height: u32);
    fn set_buffer_size(&mut self, node: NodeId, width: u32, height: u32);

    /// Destroy a node and its whole subtree. Destroyed nodes are never
    /// returned by later hit tests.
    fn destroy(&mut self, node: NodeId);

    /// Topmost enabled, content-bearing node at layout coordinates.
    fn node_at(&self, x: f64, y: f64) -> Option<Hit>;

    /// Bind a compositing target for an output.
    fn bind_output(&mut self, output: OutputId) -> Result<(), SceneError>;

    /// Commit the scene content for one output.
    fn commit_output(&mut self, output: OutputId);

    /// Signal frame completion for one output at the current monotonic time.
    fn frame_done(&mut self, output: OutputId, time: std::time::Instant);
}
