//! Loads configuration and launches either the window or a headless run.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use panels::{MemoryDevice, SharedDevice};
use tracing_subscriber::EnvFilter;
use viewconfig::ViewerConfig;

use crate::cli::Cli;
use crate::scene::Scene;
use crate::window;

/// Simulated frame interval for headless runs.
const HEADLESS_FRAME: Duration = Duration::from_millis(16);
/// Row alignment wgpu imposes on buffer-to-texture copies.
const HEADLESS_ROW_ALIGNMENT: u32 = 256;

pub fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    match cli.headless {
        Some(frames) => run_headless(&config, frames, cli.dump.as_deref()),
        None => window::run(&config),
    }
}

pub fn initialise_tracing() {
    let default_filter = "warn,voxview=info,panels=info,naga=error,wgpu=error,wgpu_core=error,wgpu_hal=error,winit=error,smithay_client_toolkit=error";
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<ViewerConfig> {
    let mut config = match &cli.config {
        Some(path) => ViewerConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ViewerConfig::default(),
    };
    if let Some((width, height)) = cli.size {
        config.window.width = width;
        config.window.height = height;
    }
    config.validate().context("invalid viewer configuration")?;
    tracing::debug!(
        config = cli.config.as_ref().map(|p| p.display().to_string()),
        width = config.window.width,
        height = config.window.height,
        "configuration loaded"
    );
    Ok(config)
}

/// Drives `frames` frames against the in-memory device, then tears the scene
/// down and fails if the device saw any misuse or leak.
pub(crate) fn run_headless(
    config: &ViewerConfig,
    frames: u32,
    dump: Option<&Path>,
) -> Result<()> {
    let device =
        SharedDevice::new(MemoryDevice::new().with_row_alignment(HEADLESS_ROW_ALIGNMENT));
    let mut scene = Scene::new(&device, config).context("failed to build scene")?;

    let start = Instant::now();
    for frame in 1..=frames {
        scene.frame_presented(start + HEADLESS_FRAME * frame)?;
    }
    tracing::info!(
        frames,
        panels = scene.manager().len(),
        block = scene.selected_block(),
        "headless run complete"
    );

    if let Some(dir) = dump {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create dump directory {}", dir.display()))?;
        for handle in scene.panels() {
            let panel = handle.borrow();
            let Some(surface) = panel.surface() else {
                continue;
            };
            let path = dir.join(format!("panel-{}.png", panel.id().as_u64()));
            surface
                .save_png(&path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "panel surface written");
        }
    }

    scene.shutdown();

    let device = device.borrow();
    if !device.violations().is_empty() {
        bail!(
            "device reported {} usage violation(s): {}",
            device.violations().len(),
            device.violations().join("; ")
        );
    }
    if !device.is_idle() {
        bail!(
            "resources leaked: {} buffer(s), {} image(s), {} allocation(s)",
            device.live_buffers(),
            device.live_images(),
            device.live_memory()
        );
    }
    Ok(())
}
