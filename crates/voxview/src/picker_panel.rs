//! Block picker: a grid of colour swatches, one action region each.

use std::cell::Cell;
use std::rc::Rc;

use anyhow::{Context, Result};
use image::Rgba;
use panels::{
    ActionRegion, GpuDevice, Panel, PanelHandle, PanelManager, PixelSurface, Rect, SharedDevice,
};
use viewconfig::{BlockEntry, PickerConfig};

const GAP: u32 = 4;
const BACKGROUND: Rgba<u8> = Rgba([24, 24, 28, 200]);
const HIGHLIGHT: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Debug, Clone, Copy)]
struct Grid {
    swatch: u32,
    columns: u32,
    rows: u32,
}

impl Grid {
    fn new(config: &PickerConfig) -> Self {
        let count = config.blocks.len().max(1) as u32;
        let columns = config.columns.min(count);
        Self {
            swatch: config.swatch_size,
            columns,
            rows: count.div_ceil(columns),
        }
    }

    fn size(&self) -> (u32, u32) {
        (
            GAP + self.columns * (self.swatch + GAP),
            GAP + self.rows * (self.swatch + GAP),
        )
    }

    fn cell(&self, index: usize) -> Rect {
        let index = index as u32;
        let (column, row) = (index % self.columns, index / self.columns);
        Rect::new(
            GAP + column * (self.swatch + GAP),
            GAP + row * (self.swatch + GAP),
            self.swatch,
            self.swatch,
        )
    }
}

fn paint(surface: &mut PixelSurface, blocks: &[BlockEntry], grid: Grid, selected: usize) {
    surface.clear(BACKGROUND);
    for (index, block) in blocks.iter().enumerate() {
        let cell = grid.cell(index);
        let (x, y) = (i64::from(cell.x), i64::from(cell.y));
        surface.fill_rect(x, y, cell.width, cell.height, Rgba(block.color.rgba(255)));
        if index == selected {
            surface.stroke_rect(x - 2, y - 2, cell.width + 4, cell.height + 4, 2, HIGHLIGHT);
        }
    }
}

/// Owns the picker panel and the currently selected block.
pub struct PickerPanel<D: GpuDevice> {
    panel: PanelHandle<D>,
    blocks: Rc<[BlockEntry]>,
    selected: Rc<Cell<usize>>,
}

impl<D: GpuDevice + 'static> PickerPanel<D> {
    pub fn new(
        device: &SharedDevice<D>,
        manager: &PanelManager<D>,
        config: &PickerConfig,
    ) -> Result<Self> {
        let grid = Grid::new(config);
        let (width, height) = grid.size();
        let blocks: Rc<[BlockEntry]> = config.blocks.clone().into();
        let selected = Rc::new(Cell::new(0));

        let draw_blocks = blocks.clone();
        let draw_selected = selected.clone();
        let panel = Panel::new(
            device,
            manager,
            width,
            height,
            Some(Box::new(move |surface: &mut PixelSurface| {
                paint(surface, &draw_blocks, grid, draw_selected.get())
            })),
        )
        .context("failed to create block picker panel")?;

        {
            let mut guard = panel.borrow_mut();
            if let Some([x, y]) = config.position {
                guard
                    .set_position(x, y)
                    .context("failed to place block picker panel")?;
            }
            for index in 0..blocks.len() {
                let chosen = selected.clone();
                let names = blocks.clone();
                guard.add_action_region(ActionRegion::new(grid.cell(index)).on_press(
                    move |args| {
                        chosen.set(index);
                        if let Some(block) = names.get(index) {
                            tracing::info!(block = %block.name, color = %block.color, "block selected");
                        }
                        args.panel.repaint();
                        if let Err(err) = args.panel.sync_texture() {
                            tracing::error!(error = %err, "failed to upload block picker");
                        }
                    },
                ));
            }
            guard.repaint();
            guard
                .sync_texture()
                .context("failed to upload block picker panel")?;
        }

        Ok(Self {
            panel,
            blocks,
            selected,
        })
    }
}

impl<D: GpuDevice> PickerPanel<D> {
    pub fn panel(&self) -> &PanelHandle<D> {
        &self.panel
    }

    pub fn selected(&self) -> Option<&BlockEntry> {
        self.blocks.get(self.selected.get())
    }
}

#[cfg(test)]
mod tests {
    use panels::{MemoryDevice, MouseAction, RouteOutcome};
    use viewconfig::HexColor;

    use super::*;

    fn config() -> PickerConfig {
        PickerConfig {
            position: Some([100, 100]),
            swatch_size: 10,
            columns: 2,
            blocks: vec![
                BlockEntry {
                    name: "red".into(),
                    color: HexColor([255, 0, 0]),
                },
                BlockEntry {
                    name: "green".into(),
                    color: HexColor([0, 255, 0]),
                },
                BlockEntry {
                    name: "blue".into(),
                    color: HexColor([0, 0, 255]),
                },
            ],
            ..PickerConfig::default()
        }
    }

    #[test]
    fn grid_wraps_rows() {
        let grid = Grid::new(&config());
        assert_eq!(grid.size(), (4 + 2 * 14, 4 + 2 * 14));
        assert_eq!(grid.cell(2), Rect::new(4, 18, 10, 10));
    }

    #[test]
    fn pressing_a_swatch_selects_and_resyncs() {
        let device = SharedDevice::new(MemoryDevice::new());
        let manager = PanelManager::new();
        let picker = PickerPanel::new(&device, &manager, &config()).unwrap();
        assert_eq!(picker.selected().map(|b| b.name.as_str()), Some("red"));

        // Third swatch sits at panel-local (4, 18).
        let outcome = manager.route(MouseAction::Press, 100 + 6, 100 + 20);
        assert!(matches!(outcome, RouteOutcome::Region { index: 2, .. }));
        assert_eq!(picker.selected().map(|b| b.name.as_str()), Some("blue"));

        let panel = picker.panel().borrow();
        let image = panel.texture_image().unwrap();
        let device = device.borrow();
        let texels = device.image_contents(image).unwrap();
        let stride = panel.width() as usize * 4;
        // Highlight ring two pixels outside the selected swatch.
        let at = 16 * stride + 4 * 4;
        assert_eq!(&texels[at..at + 4], &[255, 255, 255, 255]);
    }

    #[test]
    fn gap_between_swatches_starts_a_drag_candidate() {
        let device = SharedDevice::new(MemoryDevice::new());
        let manager = PanelManager::new();
        let _picker = PickerPanel::new(&device, &manager, &config()).unwrap();

        let outcome = manager.route(MouseAction::Press, 100 + 1, 100 + 1);
        assert!(matches!(outcome, RouteOutcome::Panel(_)));
    }
}
