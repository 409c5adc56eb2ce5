//! A single on-screen 2D surface and the GPU objects mirroring it.
//!
//! ```text
//!   PixelSurface ──sync_texture()──▶ staging ──▶ Texture (image + memory)
//!                                                   │
//!                                                   ├─▶ ImageView ─▶ DescriptorSet
//!   Position ─────set_position()───▶ staging ──▶ vertex buffer (4 × QuadVertex)
//! ```
//!
//! Nothing is synchronised implicitly: whoever paints the surface or moves
//! the panel calls [`Panel::sync_texture`] or [`Panel::set_position`] before
//! the next frame samples it.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::{Pod, Zeroable};

use crate::error::{ResourceError, ResourceKind};
use crate::gpu::staging::upload_buffer;
use crate::gpu::texture::Texture;
use crate::gpu::{
    BufferDesc, BufferId, BufferUsage, DescriptorSetId, GpuDevice, ImageDesc, ImageFormat,
    ImageId, ImageLayout, ImageViewId, MemoryId, MemoryLocation, SharedDevice, Teardown,
};
use crate::manager::{PanelManager, Registry};
use crate::region::{ActionArgs, ActionRegion, MouseAction};
use crate::surface::PixelSurface;

/// Repaints a panel's surface; captures whatever owner state it needs.
pub type DrawCallback = Box<dyn FnMut(&mut PixelSurface)>;

/// Depth every panel quad is placed at.
pub const PANEL_DEPTH: f32 = -0.5;

static NEXT_PANEL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PanelId(u64);

impl PanelId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panel#{}", self.0)
    }
}

/// Top-left corner in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Where panels are placed until moved.
pub const DEFAULT_POSITION: Position = Position::new(10, 10);

/// One corner of a panel quad: screen-space position plus texture coordinate.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

/// Triangle-strip corners of a `width × height` quad at `position`:
/// top-left, bottom-left, top-right, bottom-right.
pub fn quad_vertices(position: Position, width: u32, height: u32) -> [QuadVertex; 4] {
    let left = position.x as f32;
    let top = position.y as f32;
    let right = left + width as f32;
    let bottom = top + height as f32;
    [
        QuadVertex {
            position: [left, top, PANEL_DEPTH],
            uv: [0.0, 0.0],
        },
        QuadVertex {
            position: [left, bottom, PANEL_DEPTH],
            uv: [0.0, 1.0],
        },
        QuadVertex {
            position: [right, top, PANEL_DEPTH],
            uv: [1.0, 0.0],
        },
        QuadVertex {
            position: [right, bottom, PANEL_DEPTH],
            uv: [1.0, 1.0],
        },
    ]
}

/// Every GPU object a panel owns, released through one path.
///
/// Acquisition order is vertex buffer (+ memory), image (+ memory), view,
/// descriptor set. [`release`](Self::release) walks it backwards and skips
/// whatever was never acquired, so a half-built bundle and a complete one
/// tear down the same way. Dropping the bundle releases it.
struct PanelResources<D: GpuDevice> {
    device: SharedDevice<D>,
    vertex: Option<(BufferId, MemoryId)>,
    texture: Option<Texture>,
    view: Option<ImageViewId>,
    descriptor_set: Option<DescriptorSetId>,
}

impl<D: GpuDevice> PanelResources<D> {
    fn acquire(
        device: &SharedDevice<D>,
        vertices: &[QuadVertex; 4],
        image: ImageDesc,
    ) -> Result<Self, ResourceError> {
        let mut resources = Self {
            device: device.clone(),
            vertex: None,
            texture: None,
            view: None,
            descriptor_set: None,
        };
        let populated = {
            let mut gpu = device.borrow_mut();
            resources.populate(&mut *gpu, vertices, image)
        };
        // On error `resources` drops here, after the device borrow ended.
        populated.map(|()| resources)
    }

    fn populate(
        &mut self,
        gpu: &mut D,
        vertices: &[QuadVertex; 4],
        image: ImageDesc,
    ) -> Result<(), ResourceError> {
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let (buffer, memory) = gpu.create_buffer(&BufferDesc {
            size: bytes.len() as u64,
            usage: BufferUsage::Vertex,
            location: MemoryLocation::DeviceLocal,
        })?;
        self.vertex = Some((buffer, memory));
        upload_buffer(gpu, buffer, bytes)?;

        let texture = self.texture.insert(Texture::allocate(gpu, image)?);
        let view = *self.view.insert(gpu.create_image_view(texture.image())?);
        self.descriptor_set = Some(gpu.create_descriptor_set(view)?);
        Ok(())
    }

    fn upload_vertices(&self, vertices: &[QuadVertex; 4]) -> Result<(), ResourceError> {
        let (buffer, _) = self.vertex.ok_or(ResourceError::Released)?;
        let mut gpu = self.device.borrow_mut();
        upload_buffer(&mut *gpu, buffer, bytemuck::cast_slice(vertices))
    }

    fn upload_texture(&mut self, pixels: &[u8], stride: usize) -> Result<(), ResourceError> {
        let texture = self.texture.as_mut().ok_or(ResourceError::Released)?;
        let mut gpu = self.device.borrow_mut();
        texture.upload(&mut *gpu, pixels, stride)
    }

    /// Hands everything still held to the device for release in reverse
    /// acquisition order. If the device is borrowed elsewhere the release is
    /// deferred until it is next borrowed.
    fn release(&mut self) {
        self.device.release(Teardown {
            descriptor_set: self.descriptor_set.take(),
            view: self.view.take(),
            texture: self.texture.take(),
            vertex: self.vertex.take(),
        });
    }
}

impl<D: GpuDevice> Drop for PanelResources<D> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Rectangular UI surface composited as a textured quad.
///
/// Width and height are fixed for the lifetime of the panel; a different size
/// needs a new panel.
pub struct Panel<D: GpuDevice> {
    id: PanelId,
    this: Weak<RefCell<Panel<D>>>,
    manager: Weak<Registry<D>>,
    position: Position,
    width: u32,
    height: u32,
    surface: Option<PixelSurface>,
    resources: Option<PanelResources<D>>,
    regions: Vec<ActionRegion<D>>,
    draw_callback: Option<DrawCallback>,
}

impl<D: GpuDevice> Panel<D> {
    /// Allocates the surface and GPU resources and registers with `manager`.
    ///
    /// The vertex buffer is filled for the manager's default position. The
    /// texture is left `Undefined` until the first [`sync_texture`](Self::sync_texture).
    /// When any allocation fails, everything acquired so far is released
    /// before the error is returned.
    pub fn new(
        device: &SharedDevice<D>,
        manager: &PanelManager<D>,
        width: u32,
        height: u32,
        draw_callback: Option<DrawCallback>,
    ) -> Result<PanelHandle<D>, ResourceError> {
        if width == 0 || height == 0 {
            return Err(ResourceError::allocation(
                ResourceKind::Image,
                format!("panel size {width}x{height} must be non-zero"),
            ));
        }

        let surface = PixelSurface::new(width, height);
        let position = manager.default_position();
        let resources = PanelResources::acquire(
            device,
            &quad_vertices(position, width, height),
            ImageDesc {
                width,
                height,
                format: ImageFormat::Rgba8Srgb,
            },
        )?;

        let id = PanelId(NEXT_PANEL_ID.fetch_add(1, Ordering::Relaxed));
        let inner = Rc::new_cyclic(|this| {
            RefCell::new(Panel {
                id,
                this: this.clone(),
                manager: Weak::new(),
                position,
                width,
                height,
                surface: Some(surface),
                resources: Some(resources),
                regions: Vec::new(),
                draw_callback,
            })
        });
        let handle = PanelHandle(inner);
        manager.register(&handle);
        tracing::debug!(
            %id,
            width,
            height,
            x = position.x,
            y = position.y,
            "panel created"
        );
        Ok(handle)
    }

    pub fn id(&self) -> PanelId {
        self.id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_destroyed(&self) -> bool {
        self.resources.is_none()
    }

    /// Whether the screen point falls inside `[position, position + size)`.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        let (x, y) = (i64::from(x), i64::from(y));
        let left = i64::from(self.position.x);
        let top = i64::from(self.position.y);
        x >= left
            && x < left + i64::from(self.width)
            && y >= top
            && y < top + i64::from(self.height)
    }

    pub fn surface(&self) -> Option<&PixelSurface> {
        self.surface.as_ref()
    }

    /// Paint target; changes reach the GPU on the next `sync_texture`.
    pub fn surface_mut(&mut self) -> Option<&mut PixelSurface> {
        self.surface.as_mut()
    }

    pub fn regions(&self) -> &[ActionRegion<D>] {
        &self.regions
    }

    pub fn vertex_buffer(&self) -> Option<BufferId> {
        self.resources
            .as_ref()
            .and_then(|res| res.vertex.map(|(buffer, _)| buffer))
    }

    pub fn descriptor_set(&self) -> Option<DescriptorSetId> {
        self.resources.as_ref().and_then(|res| res.descriptor_set)
    }

    pub fn texture_image(&self) -> Option<ImageId> {
        self.resources
            .as_ref()
            .and_then(|res| res.texture.as_ref().map(Texture::image))
    }

    pub fn texture_layout(&self) -> Option<ImageLayout> {
        self.resources
            .as_ref()
            .and_then(|res| res.texture.as_ref().map(Texture::layout))
    }

    /// True once the texture holds uploaded pixels and may be sampled.
    pub fn is_drawable(&self) -> bool {
        self.texture_layout()
            .is_some_and(ImageLayout::is_shader_readable)
    }

    /// Moves the panel and re-uploads its quad.
    ///
    /// The position only changes once the new quad is on the GPU, so a failed
    /// upload leaves the panel where the vertex buffer still says it is.
    pub fn set_position(&mut self, x: i32, y: i32) -> Result<(), ResourceError> {
        let resources = self.resources.as_ref().ok_or(ResourceError::Released)?;
        let position = Position::new(x, y);
        resources.upload_vertices(&quad_vertices(position, self.width, self.height))?;
        self.position = position;
        tracing::trace!(id = %self.id, x, y, "panel moved");
        Ok(())
    }

    pub fn translate(&mut self, dx: i32, dy: i32) -> Result<(), ResourceError> {
        self.set_position(
            self.position.x.saturating_add(dx),
            self.position.y.saturating_add(dy),
        )
    }

    /// Pushes the current surface bytes to the texture.
    ///
    /// Leaves the texture shader-readable on success. A failure is returned
    /// rather than leaving stale pixels on screen silently.
    pub fn sync_texture(&mut self) -> Result<(), ResourceError> {
        let surface = self.surface.as_ref().ok_or(ResourceError::Released)?;
        let resources = self.resources.as_mut().ok_or(ResourceError::Released)?;
        resources.upload_texture(surface.as_bytes(), surface.stride())?;
        tracing::trace!(id = %self.id, "panel texture synced");
        Ok(())
    }

    /// Runs the draw callback against the surface, if there is one.
    ///
    /// Never called by the panel itself; follow with `sync_texture`.
    pub fn repaint(&mut self) {
        if let (Some(callback), Some(surface)) = (self.draw_callback.as_mut(), self.surface.as_mut())
        {
            callback(surface);
        }
    }

    /// Appends a region; overlapping regions are allowed and the earliest
    /// registered one wins.
    pub fn add_action_region(&mut self, region: ActionRegion<D>) {
        if self.is_destroyed() {
            tracing::warn!(id = %self.id, "action region added to destroyed panel ignored");
            return;
        }
        self.regions.push(region);
    }

    /// Handles a press or release at panel-local `(x, y)`.
    ///
    /// A press makes this the manager's active panel whether or not a region
    /// is hit. The first region containing the point gets its matching
    /// callback with region-local coordinates. Returns the index of that
    /// region, or `None` on a miss.
    pub fn dispatch(&mut self, action: MouseAction, x: u32, y: u32) -> Option<usize> {
        if self.is_destroyed() {
            return None;
        }
        if action == MouseAction::Press {
            if let Some(registry) = self.manager.upgrade() {
                registry.set_active(self.this.clone());
            }
        }

        let (index, region) = self
            .regions
            .iter()
            .enumerate()
            .find(|(_, region)| region.contains(x, y))?;
        let rect = region.rect();
        let callback = region.callback(action);
        tracing::trace!(id = %self.id, index, ?action, "action region hit");

        if let Some(callback) = callback {
            callback(ActionArgs {
                panel: self,
                region: rect,
                index,
                x: x - rect.x,
                y: y - rect.y,
            });
        }
        Some(index)
    }

    /// Releases GPU resources, then the surface, then the regions.
    ///
    /// Region callbacks are dropped without being invoked. Calling this twice
    /// is a no-op.
    pub fn destroy(&mut self) {
        let Some(mut resources) = self.resources.take() else {
            tracing::warn!(id = %self.id, "panel destroyed twice; ignoring");
            return;
        };
        resources.release();
        self.surface = None;
        self.regions.clear();
        self.draw_callback = None;

        if let Some(registry) = self.manager.upgrade() {
            registry.forget(&self.this);
        }
        tracing::debug!(id = %self.id, "panel destroyed");
    }

    pub(crate) fn attach(&mut self, registry: Weak<Registry<D>>) {
        self.manager = registry;
    }
}

impl<D: GpuDevice> fmt::Debug for Panel<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Panel")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("regions", &self.regions.len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Shared handle to a panel. The panel lives as long as any handle does.
pub struct PanelHandle<D: GpuDevice>(Rc<RefCell<Panel<D>>>);

impl<D: GpuDevice> Clone for PanelHandle<D> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<D: GpuDevice> PanelHandle<D> {
    pub fn borrow(&self) -> Ref<'_, Panel<D>> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Panel<D>> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &PanelHandle<D>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Shorthand for `borrow_mut().destroy()`.
    pub fn destroy(&self) {
        self.0.borrow_mut().destroy();
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<Panel<D>>> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn from_rc(inner: Rc<RefCell<Panel<D>>>) -> Self {
        Self(inner)
    }

    pub(crate) fn try_borrow(&self) -> Option<Ref<'_, Panel<D>>> {
        self.0.try_borrow().ok()
    }
}

impl<D: GpuDevice> fmt::Debug for PanelHandle<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(panel) => panel.fmt(f),
            Err(_) => f.write_str("Panel { <borrowed> }"),
        }
    }
}
