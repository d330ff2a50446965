//! # Monocle Wayland Compositor Library
//!
//! A deliberately small compositor: every client is offered the full
//! resolution of the output beneath it, decorations are always drawn by
//! the server, and focus follows the pointer with no history and no
//! click-to-focus.
//!
//! ## Architecture
//!
//! Monocle is built from small single-purpose modules:
//! - `compositor`: Core event dispatch and the calloop event loop
//! - `client`: Toplevel lifecycle, sizing policy, decoration negotiation
//! - `focus`: Focus-follows-pointer routing and cursor handling
//! - `input`: Device tracking and the shared logical keyboard
//! - `output`: Display arrangement and the background fill
//! - `scene` / `shell` / `seat`: Collaborator interfaces the backend
//!   implements
//! - `headless`: The in-memory backend used by `--headless` and the tests
//! - `config`: Configuration parsing and management
//!
//! ## Usage
//!
//! ```rust,no_run
//! use monocle::headless::{HeadlessScene, HeadlessSeat, HeadlessShell};
//! use monocle::{Compositor, MonocleConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = MonocleConfig::default();
//!     let compositor = Compositor::new(
//!         config,
//!         HeadlessScene::new(),
//!         HeadlessShell::new(),
//!         HeadlessSeat::new(),
//!     )?;
//!     let (_sender, channel) = calloop::channel::channel();
//!     compositor.run(channel)
//! }
//! ```

pub mod client;
pub mod compositor;
pub mod config;
pub mod focus;
pub mod headless;
pub mod input;
pub mod output;
pub mod scene;
pub mod seat;
pub mod shell;

// Re-export main types for easy access
pub use client::ClientRegistry;
pub use compositor::{BackendEvent, Compositor};
pub use config::MonocleConfig;
pub use focus::FocusRouter;
pub use input::InputManager;
pub use output::OutputRegistry;

// Re-export common error types
pub use anyhow::{Context, Error, Result};

/// Version information for Monocle
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
