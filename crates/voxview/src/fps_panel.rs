//! Frames-per-second readout drawn as seven-segment digits.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::Rgba;
use panels::{GpuDevice, Panel, PanelHandle, PanelManager, PixelSurface, SharedDevice};
use viewconfig::FpsConfig;

const DIGITS: usize = 4;
const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 160]);

// Segments a..g, clockwise from the top, g in the middle.
const SEGMENTS: [u8; 10] = [
    0b0111111, 0b0000110, 0b1011011, 0b1001111, 0b1100110, 0b1101101, 0b1111101, 0b0000111,
    0b1111111, 0b1101111,
];

#[derive(Debug, Clone, Copy)]
struct Glyph {
    width: u32,
    height: u32,
    stroke: u32,
}

impl Glyph {
    fn for_height(height: u32) -> Self {
        let stroke = (height / 7).max(1);
        Self {
            width: (height / 2).max(stroke * 3),
            height,
            stroke,
        }
    }

    fn advance(&self) -> u32 {
        self.width + self.stroke * 2
    }
}

fn draw_digit(
    surface: &mut PixelSurface,
    x: i64,
    y: i64,
    digit: usize,
    glyph: Glyph,
    color: Rgba<u8>,
) {
    let Some(mask) = SEGMENTS.get(digit) else {
        return;
    };
    let Glyph {
        width,
        height,
        stroke,
    } = glyph;
    let (w, h, s) = (i64::from(width), i64::from(height), i64::from(stroke));
    let half = (h - s) / 2;
    let bars: [(i64, i64, u32, u32); 7] = [
        (x, y, width, stroke),
        (x + w - s, y, stroke, (half + s) as u32),
        (x + w - s, y + half, stroke, (h - half) as u32),
        (x, y + h - s, width, stroke),
        (x, y + half, stroke, (h - half) as u32),
        (x, y, stroke, (half + s) as u32),
        (x, y + half, width, stroke),
    ];
    for (bit, (bx, by, bw, bh)) in bars.into_iter().enumerate() {
        if mask & (1 << bit) != 0 {
            surface.fill_rect(bx, by, bw, bh, color);
        }
    }
}

/// Paints `value` right-aligned, blanking leading zeros.
fn paint(surface: &mut PixelSurface, value: u32, glyph: Glyph, color: Rgba<u8>) {
    surface.clear(BACKGROUND);
    let text = value.min(9999).to_string();
    let pad = i64::from(glyph.stroke);
    let start = DIGITS - text.len();
    for (slot, ch) in text.chars().enumerate() {
        let Some(digit) = ch.to_digit(10) else {
            continue;
        };
        let x = pad + i64::from(glyph.advance()) * (start + slot) as i64;
        draw_digit(surface, x, pad, digit as usize, glyph, color);
    }
}

/// Counts frames and repaints its panel once per refresh interval.
pub struct FpsPanel<D: GpuDevice> {
    panel: PanelHandle<D>,
    shown: Rc<Cell<u32>>,
    refresh: Duration,
    window_start: Instant,
    frames: u32,
}

impl<D: GpuDevice + 'static> FpsPanel<D> {
    pub fn new(
        device: &SharedDevice<D>,
        manager: &PanelManager<D>,
        config: &FpsConfig,
        window_width: u32,
    ) -> Result<Self> {
        let glyph = Glyph::for_height(config.digit_height);
        let width = glyph.advance() * DIGITS as u32 + glyph.stroke * 2;
        let height = glyph.height + glyph.stroke * 2;
        let color = Rgba(config.color.rgba(255));

        let shown = Rc::new(Cell::new(0));
        let value = shown.clone();
        let panel = Panel::new(
            device,
            manager,
            width,
            height,
            Some(Box::new(move |surface: &mut PixelSurface| {
                paint(surface, value.get(), glyph, color)
            })),
        )
        .context("failed to create FPS panel")?;

        let [x, y] = config.position.unwrap_or([
            window_width.saturating_sub(width + 10) as i32,
            10,
        ]);
        {
            let mut guard = panel.borrow_mut();
            guard.set_position(x, y).context("failed to place FPS panel")?;
            guard.repaint();
            guard.sync_texture().context("failed to upload FPS panel")?;
        }

        Ok(Self {
            panel,
            shown,
            refresh: config.refresh,
            window_start: Instant::now(),
            frames: 0,
        })
    }
}

impl<D: GpuDevice> FpsPanel<D> {
    pub fn panel(&self) -> &PanelHandle<D> {
        &self.panel
    }

    pub fn shown(&self) -> u32 {
        self.shown.get()
    }

    /// Records one presented frame. Returns whether the readout changed.
    pub fn frame(&mut self, now: Instant) -> Result<bool> {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.refresh {
            return Ok(false);
        }
        let fps = (f64::from(self.frames) / elapsed.as_secs_f64()).round() as u32;
        self.frames = 0;
        self.window_start = now;
        if fps == self.shown.get() {
            return Ok(false);
        }
        self.shown.set(fps);
        tracing::trace!(fps, "fps readout updated");

        let mut panel = self.panel.borrow_mut();
        panel.repaint();
        panel.sync_texture().context("failed to upload FPS panel")?;
        Ok(true)
    }
}
