//! Client registry
//!
//! Owns every toplevel window the compositor knows about. Each client gets a
//! scene subtree at creation (tagged with the client id for hit-testing) that
//! lives exactly as long as the client; map/unmap only toggles its
//! visibility. Commits drive the two-phase geometry policy: the initial
//! commit lets the client pick a size, every later commit forces it to the
//! full resolution of the output under its position. Decoration objects are
//! negotiated through a per-client state machine that always ends up forcing
//! server-side mode.

use std::collections::HashMap;

use log::{debug, warn};

use crate::output::OutputRegistry;
use crate::scene::{NodeId, NodeKind, Rectangle, Scene};
use crate::shell::{DecorationId, DecorationMode, Shell, SurfaceId, ToplevelId};

/// Identifier the registry assigns to a client; doubles as the scene subtree
/// owner tag. Never reused within a run.
pub type ClientId = u64;

/// Per-client decoration negotiation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecorationState {
    /// The client has not created a decoration object.
    NoDecorationObject,
    /// A decoration object exists; no mode has been configured yet.
    DecorationRequested(DecorationId),
    /// The compositor has forced server-side mode on the object.
    ServerSideForced(DecorationId),
}

impl DecorationState {
    fn decoration(&self) -> Option<DecorationId> {
        match *self {
            DecorationState::NoDecorationObject => None,
            DecorationState::DecorationRequested(id) | DecorationState::ServerSideForced(id) => {
                Some(id)
            }
        }
    }
}

/// One toplevel window.
#[derive(Debug)]
pub struct Client {
    pub id: ClientId,
    pub toplevel: ToplevelId,
    pub surface: SurfaceId,
    /// Root of this client's scene subtree; destroyed exactly once, with the
    /// client.
    pub scene_tree: NodeId,
    /// Surface content node inside the subtree.
    content: NodeId,
    pub decoration: DecorationState,
    /// Last-committed geometry, mirrored into the subtree position.
    pub geometry: Rectangle,
    pub mapped: bool,
}

pub struct ClientRegistry {
    clients: HashMap<ClientId, Client>,
    by_toplevel: HashMap<ToplevelId, ClientId>,
    by_decoration: HashMap<DecorationId, ClientId>,
    next_id: ClientId,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            by_toplevel: HashMap::new(),
            by_decoration: HashMap::new(),
            next_id: 1,
        }
    }

    /// A new toplevel appeared: allocate the client and its scene subtree.
    /// The subtree starts disabled; `on_map` makes it visible.
    pub fn on_new_toplevel(
        &mut self,
        scene: &mut dyn Scene,
        shell: &dyn Shell,
        toplevel: ToplevelId,
    ) -> ClientId {
        let id = self.next_id;
        self.next_id += 1;

        // The owner tag set here is inherited by every node the subtree ever
        // grows, so hit tests resolve without re-walking.
        let scene_tree = scene.create_tree(scene.root(), Some(id));
        let content = scene.create_buffer(scene_tree, 0, 0);
        scene.set_enabled(scene_tree, false);

        let client = Client {
            id,
            toplevel,
            surface: shell.surface(toplevel),
            scene_tree,
            content,
            decoration: DecorationState::NoDecorationObject,
            geometry: Rectangle::default(),
            mapped: false,
        };

        self.by_toplevel.insert(toplevel, id);
        self.clients.insert(id, client);
        debug!("client {}: new toplevel {}", id, toplevel);
        id
    }

    /// The surface became mapped: enable the subtree. No-op when already
    /// mapped.
    pub fn on_map(&mut self, scene: &mut dyn Scene, toplevel: ToplevelId) {
        let Some(client) = self.client_by_toplevel_mut(toplevel) else {
            return;
        };
        if client.mapped {
            return;
        }
        client.mapped = true;
        scene.set_enabled(client.scene_tree, true);
        debug!("client {}: mapped", client.id);
    }

    /// The surface became unmapped: disable the subtree but keep all state;
    /// the client may remap later. No-op when already unmapped.
    pub fn on_unmap(&mut self, scene: &mut dyn Scene, toplevel: ToplevelId) {
        let Some(client) = self.client_by_toplevel_mut(toplevel) else {
            return;
        };
        if !client.mapped {
            return;
        }
        client.mapped = false;
        scene.set_enabled(client.scene_tree, false);
        debug!("client {}: unmapped", client.id);
    }

    /// Two-phase geometry policy.
    ///
    /// Initial commit: the client has not picked a size yet; put the subtree
    /// at the output origin and send the (0, 0) "you choose" hint, applying
    /// any pending server-side decoration force first. Subsequent commits:
    /// mirror the reported geometry offset into the subtree (client-drawn
    /// decoration insets end up outside the content area and are never
    /// rendered) and force the size to the resolution of the output under
    /// the client's position.
    pub fn on_commit(
        &mut self,
        scene: &mut dyn Scene,
        shell: &mut dyn Shell,
        outputs: &OutputRegistry,
        toplevel: ToplevelId,
    ) {
        let Some(&id) = self.by_toplevel.get(&toplevel) else {
            return;
        };
        let Some(client) = self.clients.get_mut(&id) else {
            return;
        };

        if shell.is_initial_commit(toplevel) {
            if client.decoration.decoration().is_some() {
                Self::force_server_side(client, shell);
            }
            scene.set_position(client.scene_tree, 0, 0);
            shell.request_size(toplevel, 0, 0);
            return;
        }

        let geometry = shell.geometry(toplevel);
        client.geometry = geometry;
        scene.set_position(client.scene_tree, geometry.x, geometry.y);
        scene.set_buffer_size(client.content, geometry.width, geometry.height);

        match outputs.output_at(geometry.x as f64, geometry.y as f64) {
            Some(output) => {
                let resolution = output.geometry();
                if geometry.width != resolution.width || geometry.height != resolution.height {
                    shell.request_size(toplevel, resolution.width, resolution.height);
                }
            }
            None => {
                warn!(
                    "client {}: no output under ({}, {}), leaving size {}x{}",
                    client.id, geometry.x, geometry.y, geometry.width, geometry.height
                );
            }
        }
    }

    /// The toplevel is gone: destroy the scene subtree (cascading to every
    /// descendant) and free the client. Safe against duplicate delivery; the
    /// second call finds nothing.
    pub fn on_destroy(&mut self, scene: &mut dyn Scene, toplevel: ToplevelId) {
        let Some(id) = self.by_toplevel.remove(&toplevel) else {
            return;
        };
        let Some(client) = self.clients.remove(&id) else {
            return;
        };
        if let Some(decoration) = client.decoration.decoration() {
            self.by_decoration.remove(&decoration);
        }
        scene.destroy(client.scene_tree);
        debug!("client {}: destroyed", id);
    }

    /// Observability only; no model mutation.
    pub fn on_title_change(&self, shell: &dyn Shell, toplevel: ToplevelId) {
        if let Some(&id) = self.by_toplevel.get(&toplevel) {
            debug!(
                "client {}: title {:?}",
                id,
                shell.title(toplevel).unwrap_or_default()
            );
        }
    }

    /// Decoration object created: NoDecorationObject -> DecorationRequested.
    pub fn on_new_decoration(&mut self, toplevel: ToplevelId, decoration: DecorationId) {
        let Some(&id) = self.by_toplevel.get(&toplevel) else {
            warn!("decoration {} for unknown toplevel {}", decoration, toplevel);
            return;
        };
        let Some(client) = self.clients.get_mut(&id) else {
            return;
        };
        client.decoration = DecorationState::DecorationRequested(decoration);
        self.by_decoration.insert(decoration, id);
        debug!("client {}: decoration object {}", id, decoration);
    }

    /// The client asked for a decoration mode. The request is informational
    /// only: the compositor overrides with server-side unconditionally.
    pub fn on_decoration_request_mode(
        &mut self,
        shell: &mut dyn Shell,
        decoration: DecorationId,
        preferred: Option<DecorationMode>,
    ) {
        let Some(&id) = self.by_decoration.get(&decoration) else {
            return;
        };
        let Some(client) = self.clients.get_mut(&id) else {
            return;
        };
        debug!(
            "client {}: requested decoration mode {:?}, forcing server-side",
            id, preferred
        );
        Self::force_server_side(client, shell);
    }

    /// Decoration object destroyed: back to NoDecorationObject.
    pub fn on_decoration_destroy(&mut self, decoration: DecorationId) {
        let Some(id) = self.by_decoration.remove(&decoration) else {
            return;
        };
        if let Some(client) = self.clients.get_mut(&id) {
            client.decoration = DecorationState::NoDecorationObject;
            debug!("client {}: decoration object {} destroyed", id, decoration);
        }
    }

    /// The single decoration transition: ServerSideForced, with the
    /// configure call deferred while the toplevel is uninitialized. The
    /// deferred call is re-issued at the next initial commit.
    fn force_server_side(client: &mut Client, shell: &mut dyn Shell) {
        let Some(decoration) = client.decoration.decoration() else {
            return;
        };
        client.decoration = DecorationState::ServerSideForced(decoration);
        if !shell.is_initialized(client.toplevel) {
            return;
        }
        shell.set_decoration_mode(decoration, DecorationMode::ServerSide);
    }

    /// Hit-test at global layout coordinates. Only enabled, content-bearing
    /// nodes resolve to a client; the background rect does not.
    pub fn client_at(&self, scene: &dyn Scene, x: f64, y: f64) -> Option<ClientId> {
        let hit = scene.node_at(x, y)?;
        if hit.kind != NodeKind::Buffer {
            return None;
        }
        let id = hit.tag?;
        self.clients.contains_key(&id).then_some(id)
    }

    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn surface_of(&self, toplevel: ToplevelId) -> Option<SurfaceId> {
        self.by_toplevel
            .get(&toplevel)
            .and_then(|id| self.clients.get(id))
            .map(|client| client.surface)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn client_by_toplevel_mut(&mut self, toplevel: ToplevelId) -> Option<&mut Client> {
        let id = *self.by_toplevel.get(&toplevel)?;
        self.clients.get_mut(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessScene, HeadlessShell};
    use crate::output::{OutputDevice, OutputRegistry};

    struct Fixture {
        scene: HeadlessScene,
        shell: HeadlessShell,
        outputs: OutputRegistry,
        clients: ClientRegistry,
    }

    fn fixture() -> Fixture {
        let mut scene = HeadlessScene::new();
        let root = scene.root();
        let background = scene.create_rect(root, 0, 0, [0.07, 0.07, 0.07, 1.0]);
        let mut outputs = OutputRegistry::new(background);
        outputs.on_new_output(
            &mut scene,
            OutputDevice {
                id: 1,
                name: "HEADLESS-1".into(),
                width: 1920,
                height: 1080,
            },
        );
        Fixture {
            scene,
            shell: HeadlessShell::new(),
            outputs,
            clients: ClientRegistry::new(),
        }
    }

    impl Fixture {
        fn new_client(&mut self) -> (ToplevelId, ClientId) {
            let toplevel = self.shell.create_toplevel();
            let id = self
                .clients
                .on_new_toplevel(&mut self.scene, &self.shell, toplevel);
            (toplevel, id)
        }

        fn commit(&mut self, toplevel: ToplevelId) {
            self.shell.commit(toplevel);
            self.clients
                .on_commit(&mut self.scene, &mut self.shell, &self.outputs, toplevel);
        }
    }

    #[test]
    fn subtree_exists_disabled_until_map() {
        let mut f = fixture();
        let (toplevel, id) = f.new_client();
        let tree = f.clients.get(id).unwrap().scene_tree;

        assert!(!f.scene.is_enabled(tree));

        f.clients.on_map(&mut f.scene, toplevel);
        assert!(f.scene.is_enabled(tree));

        // Idempotent both ways.
        f.clients.on_map(&mut f.scene, toplevel);
        assert!(f.scene.is_enabled(tree));
        f.clients.on_unmap(&mut f.scene, toplevel);
        f.clients.on_unmap(&mut f.scene, toplevel);
        assert!(!f.scene.is_enabled(tree));
        assert_eq!(f.clients.len(), 1);
    }

    #[test]
    fn initial_commit_sends_choose_your_own_size_once() {
        let mut f = fixture();
        let (toplevel, _) = f.new_client();
        f.shell.set_geometry(toplevel, Rectangle::from_loc_and_size((0, 0), (640, 480)));

        f.commit(toplevel);
        assert_eq!(f.shell.size_requests, vec![(toplevel, 0, 0)]);
    }

    #[test]
    fn subsequent_commit_forces_output_resolution() {
        let mut f = fixture();
        let (toplevel, id) = f.new_client();
        f.commit(toplevel);
        f.shell.size_requests.clear();

        f.shell
            .set_geometry(toplevel, Rectangle::from_loc_and_size((0, 0), (800, 600)));
        f.commit(toplevel);

        assert_eq!(f.shell.size_requests, vec![(toplevel, 1920, 1080)]);
        let tree = f.clients.get(id).unwrap().scene_tree;
        assert_eq!(f.scene.position(tree), (0, 0));
    }

    #[test]
    fn matching_geometry_issues_no_resize() {
        let mut f = fixture();
        let (toplevel, _) = f.new_client();
        f.commit(toplevel);
        f.shell.size_requests.clear();

        f.shell
            .set_geometry(toplevel, Rectangle::from_loc_and_size((0, 0), (1920, 1080)));
        f.commit(toplevel);
        f.commit(toplevel);

        assert!(f.shell.size_requests.is_empty());
    }

    #[test]
    fn geometry_offset_is_mirrored_into_subtree_position() {
        let mut f = fixture();
        let (toplevel, id) = f.new_client();
        f.commit(toplevel);

        f.shell
            .set_geometry(toplevel, Rectangle::from_loc_and_size((24, 18), (1920, 1080)));
        f.commit(toplevel);

        let tree = f.clients.get(id).unwrap().scene_tree;
        assert_eq!(f.scene.position(tree), (24, 18));
        assert_eq!(f.clients.get(id).unwrap().geometry.x, 24);
    }

    #[test]
    fn commit_outside_any_output_skips_resize() {
        let mut f = fixture();
        let (toplevel, _) = f.new_client();
        f.commit(toplevel);
        f.shell.size_requests.clear();

        f.shell
            .set_geometry(toplevel, Rectangle::from_loc_and_size((5000, 0), (800, 600)));
        f.commit(toplevel);

        assert!(f.shell.size_requests.is_empty());
    }

    #[test]
    fn decoration_forced_server_side_on_request() {
        let mut f = fixture();
        let (toplevel, id) = f.new_client();
        f.commit(toplevel); // toplevel now initialized

        f.clients.on_new_decoration(toplevel, 7);
        assert_eq!(
            f.clients.get(id).unwrap().decoration,
            DecorationState::DecorationRequested(7)
        );

        f.clients
            .on_decoration_request_mode(&mut f.shell, 7, Some(DecorationMode::ClientSide));
        assert_eq!(
            f.clients.get(id).unwrap().decoration,
            DecorationState::ServerSideForced(7)
        );
        assert_eq!(f.shell.decoration_modes, vec![(7, DecorationMode::ServerSide)]);

        // Repeated requests never pick anything but server-side.
        f.clients
            .on_decoration_request_mode(&mut f.shell, 7, Some(DecorationMode::ClientSide));
        assert!(f
            .shell
            .decoration_modes
            .iter()
            .all(|(_, mode)| *mode == DecorationMode::ServerSide));
    }

    #[test]
    fn decoration_force_is_deferred_until_initial_commit() {
        let mut f = fixture();
        let (toplevel, _) = f.new_client();

        // Decoration object and mode request arrive before any commit.
        f.clients.on_new_decoration(toplevel, 3);
        f.clients
            .on_decoration_request_mode(&mut f.shell, 3, Some(DecorationMode::ClientSide));
        assert!(f.shell.decoration_modes.is_empty());

        // Initial commit applies the pending force.
        f.commit(toplevel);
        assert_eq!(f.shell.decoration_modes, vec![(3, DecorationMode::ServerSide)]);
    }

    #[test]
    fn decoration_destroy_returns_to_no_object() {
        let mut f = fixture();
        let (toplevel, id) = f.new_client();
        f.commit(toplevel);
        f.clients.on_new_decoration(toplevel, 9);
        f.clients.on_decoration_request_mode(&mut f.shell, 9, None);

        f.clients.on_decoration_destroy(9);
        assert_eq!(
            f.clients.get(id).unwrap().decoration,
            DecorationState::NoDecorationObject
        );

        // Stale decoration events after destroy are ignored.
        f.clients.on_decoration_request_mode(&mut f.shell, 9, None);
        assert_eq!(f.shell.decoration_modes.len(), 1);
    }

    #[test]
    fn destroy_removes_subtree_from_hit_testing() {
        let mut f = fixture();
        let (toplevel, id) = f.new_client();
        f.commit(toplevel);
        f.shell
            .set_geometry(toplevel, Rectangle::from_loc_and_size((0, 0), (1920, 1080)));
        f.commit(toplevel);
        f.clients.on_map(&mut f.scene, toplevel);

        assert_eq!(f.clients.client_at(&f.scene, 100.0, 100.0), Some(id));

        f.clients.on_destroy(&mut f.scene, toplevel);
        assert!(f.clients.client_at(&f.scene, 100.0, 100.0).is_none());
        assert!(f.clients.is_empty());

        // Duplicate delivery is harmless.
        f.clients.on_destroy(&mut f.scene, toplevel);
    }

    #[test]
    fn background_hit_resolves_to_no_client() {
        let mut f = fixture();
        let (toplevel, _) = f.new_client();
        f.commit(toplevel);
        f.clients.on_map(&mut f.scene, toplevel);

        // Buffer still zero-sized; the background rect is the topmost hit.
        assert!(f.clients.client_at(&f.scene, 50.0, 50.0).is_none());
    }
}
