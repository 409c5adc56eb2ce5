//! Left-button routing into the panel manager, including panel dragging.

use panels::{GpuDevice, MouseAction, PanelManager, RouteOutcome};

/// Cursor position plus whether the left button is down.
///
/// A press on a panel that misses every action region starts dragging that
/// panel; motion moves it by the cursor delta until the button is released.
#[derive(Debug, Default)]
pub struct MouseState {
    position: Option<(i32, i32)>,
    is_pressed: bool,
}

impl MouseState {
    pub fn position(&self) -> Option<(i32, i32)> {
        self.position
    }

    pub fn is_pressed(&self) -> bool {
        self.is_pressed
    }

    pub fn handle_cursor_moved<D: GpuDevice>(
        &mut self,
        manager: &PanelManager<D>,
        x: f64,
        y: f64,
    ) {
        let next = (x.floor() as i32, y.floor() as i32);
        let previous = self.position.replace(next);
        let Some((px, py)) = previous else {
            return;
        };
        if !manager.is_dragging() {
            return;
        }
        match manager.drag_active(next.0 - px, next.1 - py) {
            Ok(true) => {}
            Ok(false) => {
                tracing::trace!("dragged panel is gone; drag stopped");
                manager.set_dragging(false);
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to move dragged panel");
                manager.set_dragging(false);
            }
        }
    }

    pub fn handle_press<D: GpuDevice>(&mut self, manager: &PanelManager<D>) {
        self.is_pressed = true;
        let Some((x, y)) = self.position else {
            return;
        };
        match manager.route(MouseAction::Press, x, y) {
            RouteOutcome::Panel(panel) => {
                tracing::trace!(panel = %panel.borrow().id(), "panel drag started");
                manager.set_dragging(true);
            }
            RouteOutcome::Region { .. } => manager.set_dragging(false),
            RouteOutcome::Missed => {
                tracing::trace!(x, y, "press missed every panel");
            }
        }
    }

    pub fn handle_release<D: GpuDevice>(&mut self, manager: &PanelManager<D>) {
        self.is_pressed = false;
        manager.set_dragging(false);
        if let Some((x, y)) = self.position {
            manager.route(MouseAction::Release, x, y);
        }
    }
}
