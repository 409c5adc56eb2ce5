//! 2D overlay panels for the voxel viewer.
//!
//! A [`Panel`] is a fixed-size RGBA surface that is painted on the CPU,
//! uploaded to a GPU texture, and composited as a screen-space quad. Panels
//! carry clickable [`ActionRegion`]s and are hit-tested by a
//! [`PanelManager`], which also remembers the active (last pressed) panel
//! and whether it is being dragged.
//!
//! All GPU access goes through the [`GpuDevice`] trait. [`WgpuDevice`] backs
//! it with `wgpu`; [`MemoryDevice`] keeps everything in host memory for
//! headless runs and tests.
//!
//! ```
//! use panels::{
//!     ActionRegion, MemoryDevice, MouseAction, Panel, PanelManager, Rect, SharedDevice,
//! };
//!
//! let device = SharedDevice::new(MemoryDevice::new());
//! let manager = PanelManager::new();
//! let panel = Panel::new(&device, &manager, 100, 50, None)?;
//! panel
//!     .borrow_mut()
//!     .add_action_region(ActionRegion::new(Rect::new(0, 0, 100, 50)).on_press(|args| {
//!         assert_eq!((args.x, args.y), (40, 20));
//!     }));
//!
//! let outcome = manager.route(MouseAction::Press, 50, 30);
//! assert!(outcome.panel().is_some_and(|hit| hit.ptr_eq(&panel)));
//! # Ok::<(), panels::ResourceError>(())
//! ```

pub mod error;
pub mod gpu;
pub mod manager;
pub mod panel;
pub mod region;
pub mod surface;

pub use error::{ResourceError, ResourceKind};
pub use gpu::memory::MemoryDevice;
pub use gpu::wgpu_backend::WgpuDevice;
pub use gpu::{GpuDevice, ImageLayout, SharedDevice};
pub use manager::{PanelManager, RouteOutcome};
pub use panel::{
    quad_vertices, DrawCallback, Panel, PanelHandle, PanelId, Position, QuadVertex,
    DEFAULT_POSITION,
};
pub use region::{ActionArgs, ActionRegion, MouseAction, Rect};
pub use surface::PixelSurface;
