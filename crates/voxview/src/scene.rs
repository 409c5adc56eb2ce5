//! Everything the viewer shows on top of the world, independent of backend.

use std::time::Instant;

use anyhow::Result;
use panels::{GpuDevice, PanelHandle, PanelManager, Position, SharedDevice};
use viewconfig::ViewerConfig;

use crate::fps_panel::FpsPanel;
use crate::input::MouseState;
use crate::picker_panel::PickerPanel;

pub(crate) struct Scene<D: GpuDevice> {
    manager: PanelManager<D>,
    fps: Option<FpsPanel<D>>,
    picker: Option<PickerPanel<D>>,
    mouse: MouseState,
}

impl<D: GpuDevice + 'static> Scene<D> {
    pub(crate) fn new(device: &SharedDevice<D>, config: &ViewerConfig) -> Result<Self> {
        let (x, y) = config.default_position();
        let manager = PanelManager::with_default_position(Position::new(x, y));

        let picker = if config.picker.enabled {
            Some(PickerPanel::new(device, &manager, &config.picker)?)
        } else {
            None
        };
        let fps = if config.fps.enabled {
            Some(FpsPanel::new(
                device,
                &manager,
                &config.fps,
                config.window.width,
            )?)
        } else {
            None
        };
        tracing::debug!(panels = manager.len(), "scene ready");

        Ok(Self {
            manager,
            fps,
            picker,
            mouse: MouseState::default(),
        })
    }
}

impl<D: GpuDevice> Scene<D> {
    pub(crate) fn manager(&self) -> &PanelManager<D> {
        &self.manager
    }

    pub(crate) fn panels(&self) -> Vec<PanelHandle<D>> {
        self.manager.panels()
    }

    pub(crate) fn selected_block(&self) -> Option<&str> {
        self.picker
            .as_ref()
            .and_then(PickerPanel::selected)
            .map(|block| block.name.as_str())
    }

    /// Per-frame bookkeeping after a frame was presented.
    pub(crate) fn frame_presented(&mut self, now: Instant) -> Result<()> {
        if let Some(fps) = self.fps.as_mut() {
            fps.frame(now)?;
        }
        Ok(())
    }

    pub(crate) fn cursor_moved(&mut self, x: f64, y: f64) {
        self.mouse.handle_cursor_moved(&self.manager, x, y);
    }

    pub(crate) fn left_pressed(&mut self) {
        self.mouse.handle_press(&self.manager);
    }

    pub(crate) fn left_released(&mut self) {
        self.mouse.handle_release(&self.manager);
    }

    /// Destroys every panel, then the manager.
    pub(crate) fn shutdown(self) {
        for panel in self.manager.panels() {
            panel.destroy();
        }
        self.manager.destroy();
    }
}
