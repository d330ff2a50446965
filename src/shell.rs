//! Windowing-protocol collaborator interface
//!
//! The protocol library owns the toplevel and decoration object lifecycles;
//! the compositor sees them as opaque ids, receives lifecycle notifications
//! as [`ShellEvent`] values, and talks back through the [`Shell`] trait
//! (geometry queries, resize requests, decoration mode configuration).

use crate::scene::Rectangle;

/// Opaque handle to a protocol toplevel object.
pub type ToplevelId = u64;
/// Opaque handle to a toplevel decoration object.
pub type DecorationId = u64;
/// Opaque handle to the surface backing a toplevel.
pub type SurfaceId = u64;

/// Decoration mode negotiated over the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecorationMode {
    ClientSide,
    ServerSide,
}

/// Lifecycle notifications delivered by the protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellEvent {
    NewToplevel { toplevel: ToplevelId },
    Map { toplevel: ToplevelId },
    Unmap { toplevel: ToplevelId },
    Commit { toplevel: ToplevelId },
    SetTitle { toplevel: ToplevelId },
    Destroy { toplevel: ToplevelId },
    NewDecoration {
        toplevel: ToplevelId,
        decoration: DecorationId,
    },
    DecorationRequestMode {
        decoration: DecorationId,
        preferred: Option<DecorationMode>,
    },
    DecorationDestroy { decoration: DecorationId },
}

/// Queries and commands on protocol objects.
pub trait Shell {
    /// The surface backing a toplevel.
    fn surface(&self, toplevel: ToplevelId) -> SurfaceId;

    /// The toplevel's last-committed geometry: position plus size, including
    /// any client-drawn decoration insets.
    fn geometry(&self, toplevel: ToplevelId) -> Rectangle;

    fn title(&self, toplevel: ToplevelId) -> Option<String>;

    /// Whether the toplevel has completed protocol initialization. Commands
    /// sent before this point must be deferred by the caller.
    fn is_initialized(&self, toplevel: ToplevelId) -> bool;

    /// Whether the commit currently being dispatched is the toplevel's first.
    fn is_initial_commit(&self, toplevel: ToplevelId) -> bool;

    /// Ask the client to take on a size. (0, 0) means "you choose".
    fn request_size(&mut self, toplevel: ToplevelId, width: u32, height: u32);

    /// Configure the decoration object with the compositor's chosen mode.
    fn set_decoration_mode(&mut self, decoration: DecorationId, mode: DecorationMode);
}
