//! Registry of live panels plus the interaction state shared between them.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::ResourceError;
use crate::gpu::GpuDevice;
use crate::panel::{Panel, PanelHandle, Position, DEFAULT_POSITION};
use crate::region::MouseAction;

type PanelCell<D> = RefCell<Panel<D>>;

/// State panels reach through their back-reference.
///
/// Entries are weak: the registry never keeps a panel alive.
pub struct Registry<D: GpuDevice> {
    panels: RefCell<Vec<Weak<PanelCell<D>>>>,
    active: RefCell<Weak<PanelCell<D>>>,
    dragging: Cell<bool>,
    default_position: Cell<Position>,
}

impl<D: GpuDevice> Registry<D> {
    pub(crate) fn set_active(&self, panel: Weak<PanelCell<D>>) {
        *self.active.borrow_mut() = panel;
    }

    /// Drops `panel` from the registry and clears it if active.
    pub(crate) fn forget(&self, panel: &Weak<PanelCell<D>>) {
        self.panels
            .borrow_mut()
            .retain(|entry| entry.strong_count() > 0 && !entry.ptr_eq(panel));
        let mut active = self.active.borrow_mut();
        if active.ptr_eq(panel) {
            *active = Weak::new();
        }
    }
}

/// Where a routed mouse event ended up.
pub enum RouteOutcome<D: GpuDevice> {
    /// No panel under the cursor.
    Missed,
    /// A panel was hit but none of its regions were.
    Panel(PanelHandle<D>),
    /// A region of `panel` handled the event.
    Region { panel: PanelHandle<D>, index: usize },
}

impl<D: GpuDevice> RouteOutcome<D> {
    pub fn panel(&self) -> Option<&PanelHandle<D>> {
        match self {
            RouteOutcome::Missed => None,
            RouteOutcome::Panel(panel) | RouteOutcome::Region { panel, .. } => Some(panel),
        }
    }

    pub fn is_missed(&self) -> bool {
        matches!(self, RouteOutcome::Missed)
    }
}

impl<D: GpuDevice> fmt::Debug for RouteOutcome<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteOutcome::Missed => f.write_str("Missed"),
            RouteOutcome::Panel(panel) => f.debug_tuple("Panel").field(panel).finish(),
            RouteOutcome::Region { panel, index } => f
                .debug_struct("Region")
                .field("panel", panel)
                .field("index", index)
                .finish(),
        }
    }
}

/// Tracks live panels, the active one, and whether it is being dragged.
///
/// Hit testing walks panels in registration order and the first match wins,
/// so an older panel underneath a newer one still receives the click.
pub struct PanelManager<D: GpuDevice> {
    registry: Rc<Registry<D>>,
}

impl<D: GpuDevice> Default for PanelManager<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: GpuDevice> PanelManager<D> {
    pub fn new() -> Self {
        Self::with_default_position(DEFAULT_POSITION)
    }

    /// Manager whose new panels start at `position`.
    pub fn with_default_position(position: Position) -> Self {
        Self {
            registry: Rc::new(Registry {
                panels: RefCell::new(Vec::new()),
                active: RefCell::new(Weak::new()),
                dragging: Cell::new(false),
                default_position: Cell::new(position),
            }),
        }
    }

    pub fn default_position(&self) -> Position {
        self.registry.default_position.get()
    }

    /// Adds `panel` for hit testing. Registering twice is a no-op.
    ///
    /// [`Panel::new`] already does this; it only needs calling for a panel
    /// moved over from another manager.
    pub fn register(&self, panel: &PanelHandle<D>) {
        let weak = panel.downgrade();
        {
            let mut panels = self.registry.panels.borrow_mut();
            panels.retain(|entry| entry.strong_count() > 0);
            if panels.iter().any(|entry| entry.ptr_eq(&weak)) {
                return;
            }
            panels.push(weak);
        }
        panel.borrow_mut().attach(Rc::downgrade(&self.registry));
    }

    /// Live panels in registration order.
    pub fn panels(&self) -> Vec<PanelHandle<D>> {
        self.registry
            .panels
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .map(PanelHandle::from_rc)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registry
            .panels
            .borrow()
            .iter()
            .filter(|entry| entry.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First registered panel whose rectangle contains the screen point.
    ///
    /// Panels currently borrowed elsewhere (for instance the one whose
    /// callback is running) are skipped. Does not change any state.
    pub fn find_at(&self, x: i32, y: i32) -> Option<PanelHandle<D>> {
        self.panels().into_iter().find(|handle| {
            handle
                .try_borrow()
                .is_some_and(|panel| !panel.is_destroyed() && panel.contains(x, y))
        })
    }

    /// Hit-tests the screen point and dispatches to the panel found there in
    /// panel-local coordinates.
    pub fn route(&self, action: MouseAction, x: i32, y: i32) -> RouteOutcome<D> {
        let Some(handle) = self.find_at(x, y) else {
            return RouteOutcome::Missed;
        };
        let hit = {
            let mut panel = handle.borrow_mut();
            let origin = panel.position();
            // `find_at` guarantees the point is inside, so both offsets are
            // in `0..size`.
            let local_x = (i64::from(x) - i64::from(origin.x)) as u32;
            let local_y = (i64::from(y) - i64::from(origin.y)) as u32;
            panel.dispatch(action, local_x, local_y)
        };
        match hit {
            Some(index) => RouteOutcome::Region {
                panel: handle,
                index,
            },
            None => RouteOutcome::Panel(handle),
        }
    }

    /// Panel most recently pressed, if it is still alive.
    pub fn active_panel(&self) -> Option<PanelHandle<D>> {
        self.registry
            .active
            .borrow()
            .upgrade()
            .map(PanelHandle::from_rc)
    }

    pub fn set_active(&self, panel: &PanelHandle<D>) {
        self.registry.set_active(panel.downgrade());
    }

    pub fn clear_active(&self) {
        self.registry.set_active(Weak::new());
    }

    /// Stores the drag flag for the input loop. The manager never changes it
    /// on its own.
    pub fn set_dragging(&self, dragging: bool) {
        self.registry.dragging.set(dragging);
    }

    pub fn is_dragging(&self) -> bool {
        self.registry.dragging.get()
    }

    /// Moves the active panel by `(dx, dy)` while a drag is in progress.
    ///
    /// Returns whether anything moved; `false` while dragging means the
    /// active panel is gone.
    pub fn drag_active(&self, dx: i32, dy: i32) -> Result<bool, ResourceError> {
        if !self.is_dragging() {
            return Ok(false);
        }
        let Some(handle) = self.active_panel() else {
            return Ok(false);
        };
        handle.borrow_mut().translate(dx, dy)?;
        Ok(true)
    }

    /// Forgets every panel without destroying any of them.
    pub fn clear(&self) {
        self.registry.panels.borrow_mut().clear();
        self.clear_active();
    }

    /// Tears down the registry. Panels stay alive and usable, they are just
    /// no longer hit-tested.
    pub fn destroy(self) {
        self.clear();
        tracing::debug!("panel manager destroyed");
    }
}

impl<D: GpuDevice> fmt::Debug for PanelManager<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PanelManager")
            .field("panels", &self.len())
            .field("dragging", &self.is_dragging())
            .finish()
    }
}
