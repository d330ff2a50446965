//! Output registry
//!
//! Tracks physical displays, binds each one to a scene compositing target,
//! arranges them left to right in a shared layout, and drives repaint on
//! frame notifications. A display that fails render initialization is
//! discarded; the rest of the system keeps running.

use std::collections::HashMap;
use std::time::Instant;

use log::{debug, error, info};

use crate::scene::{NodeId, Rectangle, Scene};

/// Identifier for an output device.
pub type OutputId = u64;

/// A physical display as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDevice {
    pub id: OutputId,
    pub name: String,
    /// Preferred mode, requested at scale 1 when the output is adopted.
    pub width: u32,
    pub height: u32,
}

/// A registered display positioned in the shared layout.
#[derive(Debug, Clone)]
pub struct Output {
    pub device: OutputDevice,
    pub x: i32,
    pub y: i32,
}

impl Output {
    pub fn geometry(&self) -> Rectangle {
        Rectangle::from_loc_and_size((self.x, self.y), (self.device.width, self.device.height))
    }
}

/// Notifications delivered by the backend for output devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Added(OutputDevice),
    Frame { output: OutputId },
    /// The device asks to take on a new mode; committed as-is.
    RequestState {
        output: OutputId,
        width: u32,
        height: u32,
    },
    Destroyed { output: OutputId },
}

pub struct OutputRegistry {
    outputs: HashMap<OutputId, Output>,
    /// Discovery order; doubles as left-to-right layout order.
    order: Vec<OutputId>,
    /// Background fill node, resized to the layout bounding box.
    background: NodeId,
}

impl OutputRegistry {
    pub fn new(background: NodeId) -> Self {
        Self {
            outputs: HashMap::new(),
            order: Vec::new(),
            background,
        }
    }

    /// Adopt a newly discovered display: bind rendering, request its
    /// preferred mode at scale 1, and append it to the right edge of the
    /// layout. Render-init failure discards the device and nothing else.
    pub fn on_new_output(&mut self, scene: &mut dyn Scene, device: OutputDevice) {
        if self.outputs.contains_key(&device.id) {
            debug!("output {}: already registered, ignoring", device.id);
            return;
        }

        if let Err(e) = scene.bind_output(device.id) {
            error!("output {} ({}): {}, discarding", device.id, device.name, e);
            return;
        }

        info!(
            "output {} ({}): {}x{} at preferred mode",
            device.id, device.name, device.width, device.height
        );

        let id = device.id;
        self.outputs.insert(id, Output { device, x: 0, y: 0 });
        self.order.push(id);
        self.arrange(scene);
    }

    /// Repaint one output: commit the scene for it and acknowledge the frame
    /// with the current monotonic time.
    pub fn on_frame(&mut self, scene: &mut dyn Scene, output: OutputId) {
        if !self.outputs.contains_key(&output) {
            return;
        }
        scene.commit_output(output);
        scene.frame_done(output, Instant::now());
    }

    /// The device asked for a new mode; commit it and re-arrange.
    pub fn on_request_state(
        &mut self,
        scene: &mut dyn Scene,
        output: OutputId,
        width: u32,
        height: u32,
    ) {
        let Some(entry) = self.outputs.get_mut(&output) else {
            return;
        };
        entry.device.width = width;
        entry.device.height = height;
        debug!("output {}: size {}x{}", output, width, height);
        self.arrange(scene);
    }

    /// Drop a removed display from tracking. Clients that were forced to this
    /// output's resolution are left at their last-forced size; their region
    /// is not re-checked here.
    pub fn on_destroy(&mut self, scene: &mut dyn Scene, output: OutputId) {
        if self.outputs.remove(&output).is_none() {
            return;
        }
        info!("output {}: destroyed", output);
        self.order.retain(|&id| id != output);
        self.arrange(scene);
    }

    /// Re-pack the layout left to right in discovery order and mirror the
    /// new bounding box into the background fill node.
    fn arrange(&mut self, scene: &mut dyn Scene) {
        let mut x = 0;
        for id in &self.order {
            if let Some(output) = self.outputs.get_mut(id) {
                output.x = x;
                output.y = 0;
                x += output.device.width as i32;
            }
        }
        self.on_layout_change(scene);
    }

    /// Any layout change resizes the background to the union bounding box.
    fn on_layout_change(&mut self, scene: &mut dyn Scene) {
        let bbox = self.layout_box();
        scene.set_position(self.background, bbox.x, bbox.y);
        scene.set_rect_size(self.background, bbox.width, bbox.height);
    }

    /// Union bounding box of every registered output; empty when none.
    pub fn layout_box(&self) -> Rectangle {
        let mut width = 0u32;
        let mut height = 0u32;
        for id in &self.order {
            if let Some(output) = self.outputs.get(id) {
                width = width.max((output.x + output.device.width as i32) as u32);
                height = height.max(output.device.height);
            }
        }
        Rectangle::from_loc_and_size((0, 0), (width, height))
    }

    /// The output whose geometry contains the given layout coordinate.
    pub fn output_at(&self, x: f64, y: f64) -> Option<&Output> {
        self.order
            .iter()
            .filter_map(|id| self.outputs.get(id))
            .find(|output| output.geometry().contains(x, y))
    }

    pub fn get(&self, id: OutputId) -> Option<&Output> {
        self.outputs.get(&id)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessScene;
    use proptest::prelude::*;

    fn device(id: OutputId, width: u32, height: u32) -> OutputDevice {
        OutputDevice {
            id,
            name: format!("HEADLESS-{id}"),
            width,
            height,
        }
    }

    fn registry(scene: &mut HeadlessScene) -> OutputRegistry {
        let root = scene.root();
        let background = scene.create_rect(root, 0, 0, [0.07, 0.07, 0.07, 1.0]);
        OutputRegistry::new(background)
    }

    #[test]
    fn outputs_are_arranged_left_to_right_in_discovery_order() {
        let mut scene = HeadlessScene::new();
        let mut outputs = registry(&mut scene);

        outputs.on_new_output(&mut scene, device(1, 1920, 1080));
        outputs.on_new_output(&mut scene, device(2, 2560, 1440));
        outputs.on_new_output(&mut scene, device(3, 1280, 1024));

        assert_eq!(outputs.get(1).map(|o| o.x), Some(0));
        assert_eq!(outputs.get(2).map(|o| o.x), Some(1920));
        assert_eq!(outputs.get(3).map(|o| o.x), Some(1920 + 2560));
        assert!(outputs.order.iter().eq(&[1, 2, 3]));
    }

    #[test]
    fn background_tracks_layout_bounding_box() {
        let mut scene = HeadlessScene::new();
        let mut outputs = registry(&mut scene);
        let background = outputs.background;

        outputs.on_new_output(&mut scene, device(1, 1920, 1080));
        outputs.on_new_output(&mut scene, device(2, 1920, 1200));

        assert_eq!(scene.rect_size(background), (3840, 1200));

        outputs.on_destroy(&mut scene, 2);
        assert_eq!(scene.rect_size(background), (1920, 1080));
    }

    #[test]
    fn failed_render_init_discards_only_that_output() {
        let mut scene = HeadlessScene::new();
        let mut outputs = registry(&mut scene);

        scene.fail_output_bind = true;
        outputs.on_new_output(&mut scene, device(1, 1920, 1080));
        assert!(outputs.is_empty());

        scene.fail_output_bind = false;
        outputs.on_new_output(&mut scene, device(2, 1920, 1080));
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs.get(2).map(|o| o.x), Some(0));
    }

    #[test]
    fn output_at_resolves_by_layout_position() {
        let mut scene = HeadlessScene::new();
        let mut outputs = registry(&mut scene);
        outputs.on_new_output(&mut scene, device(1, 1920, 1080));
        outputs.on_new_output(&mut scene, device(2, 1920, 1080));

        assert_eq!(outputs.output_at(10.0, 10.0).map(|o| o.device.id), Some(1));
        assert_eq!(
            outputs.output_at(2000.0, 10.0).map(|o| o.device.id),
            Some(2)
        );
        assert!(outputs.output_at(4000.0, 10.0).is_none());
        assert!(outputs.output_at(10.0, 2000.0).is_none());
    }

    #[test]
    fn frame_commits_only_registered_outputs() {
        let mut scene = HeadlessScene::new();
        let mut outputs = registry(&mut scene);
        outputs.on_new_output(&mut scene, device(1, 800, 600));

        outputs.on_frame(&mut scene, 1);
        outputs.on_frame(&mut scene, 1);
        outputs.on_frame(&mut scene, 99);

        assert_eq!(scene.output_commits(1), 2);
        assert_eq!(scene.output_commits(99), 0);
    }

    #[test]
    fn request_state_commits_new_mode_and_rearranges() {
        let mut scene = HeadlessScene::new();
        let mut outputs = registry(&mut scene);
        outputs.on_new_output(&mut scene, device(1, 1920, 1080));
        outputs.on_new_output(&mut scene, device(2, 1920, 1080));

        outputs.on_request_state(&mut scene, 1, 1280, 720);

        assert_eq!(outputs.get(1).map(|o| o.geometry().width), Some(1280));
        assert_eq!(outputs.get(2).map(|o| o.x), Some(1280));
    }

    proptest! {
        #[test]
        fn layout_is_contiguous_and_non_overlapping(
            sizes in proptest::collection::vec((320u32..4096, 240u32..2400), 1..6)
        ) {
            let mut scene = HeadlessScene::new();
            let mut outputs = registry(&mut scene);
            for (i, (w, h)) in sizes.iter().enumerate() {
                outputs.on_new_output(&mut scene, device(i as OutputId + 1, *w, *h));
            }

            let mut expected_x = 0i64;
            for (i, (w, h)) in sizes.iter().enumerate() {
                let output = outputs.get(i as OutputId + 1).unwrap();
                prop_assert_eq!(output.x as i64, expected_x);
                prop_assert_eq!(output.device.width, *w);
                prop_assert_eq!(output.device.height, *h);
                expected_x += *w as i64;
            }

            let bbox = outputs.layout_box();
            prop_assert_eq!(bbox.width as i64, expected_x);
            prop_assert_eq!(u64::from(bbox.height), u64::from(*sizes.iter().map(|(_, h)| h).max().unwrap()));
        }
    }
}
