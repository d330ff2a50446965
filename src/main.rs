//! # Monocle - Minimal Wayland Compositor
//!
//! One window fills one output. Decorations are always server side, focus
//! follows the pointer, and there is nothing to configure beyond the
//! keyboard, the cursor, and a background color.

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};

use monocle::compositor::BackendEvent;
use monocle::headless::{HeadlessScene, HeadlessSeat, HeadlessShell};
use monocle::input::{DeviceKind, InputDevice, InputEvent};
use monocle::output::{OutputDevice, OutputEvent};
use monocle::{Compositor, MonocleConfig};

#[derive(Parser)]
#[command(name = "monocle")]
#[command(about = "A minimal Wayland compositor where one window fills one output")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/monocle/monocle.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Run against the in-memory backend (no display hardware)
    #[arg(long)]
    headless: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("Starting Monocle v{}", monocle::VERSION);

    // A missing runtime dir means no client could ever connect
    std::env::var("XDG_RUNTIME_DIR")
        .context("XDG_RUNTIME_DIR is not set; refusing to start without a runtime directory")?;

    // Load configuration
    let config = match MonocleConfig::load(&cli.config) {
        Ok(config) => {
            info!("Configuration loaded from {}", cli.config);
            config
        }
        Err(e) => {
            warn!("{:#}; using default configuration", e);
            MonocleConfig::default()
        }
    };

    if !cli.headless {
        anyhow::bail!(
            "no display backend is available in this build; run with --headless"
        );
    }

    // Environment published to clients we spawn
    let socket = format!("monocle-{}", std::process::id());
    std::env::set_var("WAYLAND_DISPLAY", &socket);
    std::env::set_var("XCURSOR_SIZE", config.cursor.size.to_string());
    info!("advertising WAYLAND_DISPLAY={}", socket);

    let startup_command = config.general.startup_command.clone();

    let compositor = Compositor::new(
        config,
        HeadlessScene::new(),
        HeadlessShell::new(),
        HeadlessSeat::new(),
    )?;

    // Seed the backend: one output and the virtual input devices
    let (sender, channel) = calloop::channel::channel();
    let seed = [
        BackendEvent::Output(OutputEvent::Added(OutputDevice {
            id: 1,
            name: "HEADLESS-1".to_string(),
            width: 1920,
            height: 1080,
        })),
        BackendEvent::Input(InputEvent::DeviceAdded(InputDevice {
            name: "virtual keyboard".to_string(),
            kind: DeviceKind::Keyboard,
        })),
        BackendEvent::Input(InputEvent::DeviceAdded(InputDevice {
            name: "virtual pointer".to_string(),
            kind: DeviceKind::Pointer,
        })),
    ];
    for event in seed {
        sender
            .send(event)
            .context("Failed to seed the backend event channel")?;
    }

    if let Some(command) = startup_command {
        spawn_startup(&command);
    }

    // `sender` stays alive in this scope so the channel never reports closed
    let result = compositor.run(channel);
    drop(sender);
    result
}

/// Launch the configured startup command. Failure to spawn is logged and
/// otherwise ignored; the compositor keeps running without it.
fn spawn_startup(command: &str) {
    info!("spawning startup command: {}", command);
    match std::process::Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .spawn()
    {
        Ok(child) => info!("startup command running (pid {})", child.id()),
        Err(e) => error!("failed to spawn startup command '{}': {}", command, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["monocle"]);
        assert_eq!(cli.config, "~/.config/monocle/monocle.toml");
        assert!(!cli.debug);
        assert!(!cli.headless);
    }

    #[test]
    fn cli_flags() {
        let cli = Cli::parse_from(["monocle", "--debug", "--headless", "-c", "/tmp/m.toml"]);
        assert!(cli.debug);
        assert!(cli.headless);
        assert_eq!(cli.config, "/tmp/m.toml");
    }
}
