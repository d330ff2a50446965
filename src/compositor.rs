//! Compositor core
//!
//! Owns the registries and routes every backend notification to them. The
//! event loop is single threaded: shell, input, and output events arrive
//! over one channel and are dispatched in order, so no subsystem ever sees
//! a half-applied state from another.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use calloop::channel::{self, Channel};
use calloop::timer::{TimeoutAction, Timer};
use calloop::{EventLoop, RegistrationToken};
use log::{debug, info};

use crate::client::ClientRegistry;
use crate::config::MonocleConfig;
use crate::focus::FocusRouter;
use crate::input::{InputEvent, InputManager};
use crate::output::{OutputEvent, OutputRegistry};
use crate::scene::Scene;
use crate::seat::Seat;
use crate::shell::{Shell, ShellEvent};

/// Anything the backend can tell the compositor.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    Shell(ShellEvent),
    Input(InputEvent),
    Output(OutputEvent),
}

/// Instruction for the key repeat timer after a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatTimer {
    Arm(Duration),
    Disarm,
}

pub struct Compositor<S: Scene, H: Shell, T: Seat> {
    pub scene: S,
    pub shell: H,
    pub seat: T,
    pub clients: ClientRegistry,
    pub outputs: OutputRegistry,
    pub input: InputManager,
    pub focus: FocusRouter,
    config: MonocleConfig,
    started: Instant,
    repeat_key: Option<u32>,
    repeat_token: Option<RegistrationToken>,
}

impl<S: Scene, H: Shell, T: Seat> Compositor<S, H, T> {
    /// Assemble the compositor: background fill under the scene root, empty
    /// registries, and the logical keyboard attached to the seat.
    pub fn new(config: MonocleConfig, mut scene: S, shell: H, mut seat: T) -> Result<Self> {
        let color = config.background_color()?;
        let root = scene.root();
        let background = scene.create_rect(root, 0, 0, color);

        let input = InputManager::new(&config.input);
        let group = input.keyboard_group();
        seat.set_keyboard(
            group.keymap_string().as_deref(),
            group.repeat_rate(),
            group.repeat_delay(),
        );

        let focus = FocusRouter::new(config.cursor.default_shape.clone());

        info!("compositor ready (seat '{}')", config.general.seat_name);

        Ok(Self {
            scene,
            shell,
            seat,
            clients: ClientRegistry::new(),
            outputs: OutputRegistry::new(background),
            input,
            focus,
            config,
            started: Instant::now(),
            repeat_key: None,
            repeat_token: None,
        })
    }

    pub fn config(&self) -> &MonocleConfig {
        &self.config
    }

    fn now_ms(&self) -> u32 {
        self.started.elapsed().as_millis() as u32
    }

    /// Dispatch one backend event. Returns a repeat-timer instruction when
    /// the event was a key press or release.
    pub fn dispatch(&mut self, event: BackendEvent) -> Option<RepeatTimer> {
        match event {
            BackendEvent::Shell(event) => {
                self.handle_shell_event(event);
                None
            }
            BackendEvent::Input(event) => self.handle_input_event(event),
            BackendEvent::Output(event) => {
                self.handle_output_event(event);
                None
            }
        }
    }

    pub fn handle_shell_event(&mut self, event: ShellEvent) {
        match event {
            ShellEvent::NewToplevel { toplevel } => {
                self.clients
                    .on_new_toplevel(&mut self.scene, &self.shell, toplevel);
            }
            ShellEvent::Map { toplevel } => {
                self.clients.on_map(&mut self.scene, toplevel);
            }
            ShellEvent::Unmap { toplevel } => {
                self.clients.on_unmap(&mut self.scene, toplevel);
            }
            ShellEvent::Commit { toplevel } => {
                self.clients.on_commit(
                    &mut self.scene,
                    &mut self.shell,
                    &self.outputs,
                    toplevel,
                );
            }
            ShellEvent::SetTitle { toplevel } => {
                self.clients.on_title_change(&self.shell, toplevel);
            }
            ShellEvent::Destroy { toplevel } => {
                // Protocol teardown first: the seat drops any focus the
                // surface held before the client record disappears.
                if let Some(surface) = self.clients.surface_of(toplevel) {
                    self.seat.surface_destroyed(surface);
                }
                self.clients.on_destroy(&mut self.scene, toplevel);
            }
            ShellEvent::NewDecoration {
                toplevel,
                decoration,
            } => {
                self.clients.on_new_decoration(toplevel, decoration);
            }
            ShellEvent::DecorationRequestMode {
                decoration,
                preferred,
            } => {
                self.clients
                    .on_decoration_request_mode(&mut self.shell, decoration, preferred);
            }
            ShellEvent::DecorationDestroy { decoration } => {
                self.clients.on_decoration_destroy(decoration);
            }
        }
    }

    pub fn handle_input_event(&mut self, event: InputEvent) -> Option<RepeatTimer> {
        match event {
            InputEvent::DeviceAdded(device) => {
                self.input.on_device_added(&mut self.seat, device);
                None
            }
            InputEvent::Key {
                time_ms,
                keycode,
                pressed,
            } => {
                let period = self.input.on_key(&mut self.seat, time_ms, keycode, pressed);
                if pressed {
                    self.repeat_key = Some(keycode);
                } else if self.repeat_key == Some(keycode) {
                    self.repeat_key = None;
                }
                // Re-armed after every key event; a firing with no held key
                // drops itself in repeat_tick
                match period {
                    Some(period) => Some(RepeatTimer::Arm(period)),
                    None => Some(RepeatTimer::Disarm),
                }
            }
            InputEvent::Modifiers(modifiers) => {
                self.input.on_modifiers(&mut self.seat, modifiers);
                None
            }
            InputEvent::PointerMotion { time_ms, dx, dy } => {
                debug!("relative motion at {}: ({:+.2}, {:+.2})", time_ms, dx, dy);
                None
            }
            InputEvent::PointerMotionAbsolute { x, y, .. } => {
                self.focus.on_pointer_motion_absolute(
                    &self.scene,
                    &self.clients,
                    &self.outputs,
                    self.input.keyboard_group(),
                    &mut self.seat,
                    x,
                    y,
                );
                None
            }
            InputEvent::PointerButton {
                time_ms,
                button,
                pressed,
            } => {
                self.focus
                    .on_pointer_button(&mut self.seat, time_ms, button, pressed);
                None
            }
            InputEvent::PointerAxis(event) => {
                self.focus.on_pointer_axis(&mut self.seat, event);
                None
            }
            InputEvent::PointerFrame => {
                self.focus.on_pointer_frame(&mut self.seat);
                None
            }
            InputEvent::RequestSetCursor {
                client,
                surface,
                hotspot_x,
                hotspot_y,
            } => {
                self.focus.on_request_set_cursor(
                    &mut self.seat,
                    client,
                    surface,
                    hotspot_x,
                    hotspot_y,
                );
                None
            }
        }
    }

    pub fn handle_output_event(&mut self, event: OutputEvent) {
        match event {
            OutputEvent::Added(device) => {
                self.outputs.on_new_output(&mut self.scene, device);
            }
            OutputEvent::Frame { output } => {
                self.outputs.on_frame(&mut self.scene, output);
            }
            OutputEvent::RequestState {
                output,
                width,
                height,
            } => {
                self.outputs
                    .on_request_state(&mut self.scene, output, width, height);
            }
            OutputEvent::Destroyed { output } => {
                self.outputs.on_destroy(&mut self.scene, output);
            }
        }
    }

    /// One firing of the key repeat timer: synthesize a press of the held
    /// key, then keep firing at the configured interval.
    fn repeat_tick(&mut self) -> TimeoutAction {
        let Some(keycode) = self.repeat_key else {
            self.repeat_token = None;
            return TimeoutAction::Drop;
        };
        let time_ms = self.now_ms();
        self.seat.keyboard_key(time_ms, keycode, true);

        match self.input.keyboard_group().repeat_timeout() {
            Some(interval) => TimeoutAction::ToDuration(interval),
            None => {
                self.repeat_token = None;
                TimeoutAction::Drop
            }
        }
    }

    /// Run until interrupted. Backend events arrive over `events`; Ctrl-C
    /// stops the loop cleanly.
    pub fn run(mut self, events: Channel<BackendEvent>) -> Result<()> {
        let mut event_loop: EventLoop<Self> =
            EventLoop::try_new().context("Failed to create event loop")?;
        let handle = event_loop.handle();

        let signal = event_loop.get_signal();
        ctrlc::set_handler(move || {
            signal.stop();
            signal.wakeup();
        })
        .context("Failed to install interrupt handler")?;

        let timer_handle = handle.clone();
        handle
            .insert_source(events, move |event, _, compositor| {
                let channel::Event::Msg(event) = event else {
                    return;
                };
                match compositor.dispatch(event) {
                    Some(RepeatTimer::Arm(delay)) => {
                        if let Some(token) = compositor.repeat_token.take() {
                            timer_handle.remove(token);
                        }
                        let token = timer_handle.insert_source(
                            Timer::from_duration(delay),
                            |_, _, compositor| compositor.repeat_tick(),
                        );
                        match token {
                            Ok(token) => compositor.repeat_token = Some(token),
                            Err(e) => debug!("failed to arm repeat timer: {}", e),
                        }
                    }
                    Some(RepeatTimer::Disarm) => {
                        if let Some(token) = compositor.repeat_token.take() {
                            timer_handle.remove(token);
                        }
                    }
                    None => {}
                }
            })
            .map_err(|e| anyhow::anyhow!("Failed to register backend channel: {}", e))?;

        info!("entering event loop");
        event_loop
            .run(None, &mut self, |_| {})
            .context("Event loop failed")?;
        info!("event loop stopped");

        Ok(())
    }
}
