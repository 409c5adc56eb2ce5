use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "voxview",
    author,
    version,
    about = "Voxel viewer with draggable overlay panels"
)]
pub struct Cli {
    /// Viewer configuration TOML; built-in defaults are used when omitted.
    #[arg(long, value_name = "PATH", env = "VOXVIEW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<(u32, u32)>,

    /// Run N frames against the in-memory device without opening a window.
    #[arg(long, value_name = "FRAMES")]
    pub headless: Option<u32>,

    /// With `--headless`, write each panel surface as PNG into this directory.
    #[arg(long, value_name = "DIR", requires = "headless")]
    pub dump: Option<PathBuf>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_surface_size(value: &str) -> Result<(u32, u32)> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| anyhow::anyhow!("expected WxH format, e.g. 1280x720"))?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid width in surface size"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid height in surface size"))?;

    if width == 0 || height == 0 {
        anyhow::bail!("window dimensions must be greater than zero");
    }

    Ok((width, height))
}
