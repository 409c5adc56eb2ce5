//! Entry point: parses the CLI, sets up logging, and hands off to `run.rs`.
//!
//! Modules:
//!
//! - `cli` declares the command-line surface.
//! - `run` loads configuration and picks windowed or headless mode.
//! - `window` owns the winit event loop and the per-frame render.
//! - `context` and `overlay` hold the wgpu surface/device and the panel pipeline.
//! - `scene` wires the FPS and block picker panels to the panel manager.
//! - `input` turns left-button events into panel routing and dragging.

mod cli;
mod context;
mod fps_panel;
mod input;
mod overlay;
mod picker_panel;
mod run;
mod scene;
mod window;

use anyhow::Result;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();
    run::run(cli)
}
