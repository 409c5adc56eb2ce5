use std::fmt;
use std::rc::Rc;

use crate::gpu::GpuDevice;
use crate::panel::Panel;

/// Mouse button transition routed to panels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseAction {
    Press,
    Release,
}

/// Axis-aligned rectangle in panel-local pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Half-open containment: `[x, x + width) × [y, y + height)`.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        let (x, y) = (u64::from(x), u64::from(y));
        let (left, top) = (u64::from(self.x), u64::from(self.y));
        x >= left
            && x < left + u64::from(self.width)
            && y >= top
            && y < top + u64::from(self.height)
    }
}

/// What a region callback receives.
///
/// `x` and `y` are relative to the region's own top-left corner.
pub struct ActionArgs<'a, D: GpuDevice> {
    pub panel: &'a mut Panel<D>,
    pub region: Rect,
    /// Registration index of the region within its panel.
    pub index: usize,
    pub x: u32,
    pub y: u32,
}

pub type ActionCallback<D> = Rc<dyn Fn(ActionArgs<'_, D>)>;

/// Clickable sub-rectangle of a panel with optional press/release handlers.
pub struct ActionRegion<D: GpuDevice> {
    rect: Rect,
    on_press: Option<ActionCallback<D>>,
    on_release: Option<ActionCallback<D>>,
}

impl<D: GpuDevice> ActionRegion<D> {
    pub fn new(rect: Rect) -> Self {
        Self {
            rect,
            on_press: None,
            on_release: None,
        }
    }

    pub fn on_press(mut self, callback: impl Fn(ActionArgs<'_, D>) + 'static) -> Self {
        self.on_press = Some(Rc::new(callback));
        self
    }

    pub fn on_release(mut self, callback: impl Fn(ActionArgs<'_, D>) + 'static) -> Self {
        self.on_release = Some(Rc::new(callback));
        self
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        self.rect.contains(x, y)
    }

    pub(crate) fn callback(&self, action: MouseAction) -> Option<ActionCallback<D>> {
        match action {
            MouseAction::Press => self.on_press.clone(),
            MouseAction::Release => self.on_release.clone(),
        }
    }
}

impl<D: GpuDevice> fmt::Debug for ActionRegion<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegion")
            .field("rect", &self.rect)
            .field("on_press", &self.on_press.is_some())
            .field("on_release", &self.on_release.is_some())
            .finish()
    }
}
