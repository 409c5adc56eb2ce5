//! Capability surface the panel layer drives to reach the GPU.
//!
//! The panel code never talks to a graphics API directly. Everything it needs
//! is funnelled through [`GpuDevice`], which mirrors the explicit object model
//! of a low-level API:
//!
//! ```text
//!   create_buffer ──▶ (BufferId, MemoryId) ──▶ write_memory / copy_buffer
//!   create_image  ──▶ (ImageId,  MemoryId) ──▶ create_image_view ──▶ create_descriptor_set
//!                                  │
//!                                  └─▶ transition_image_layout / copy_buffer_to_image
//! ```
//!
//! - `layout` holds the image layout state machine.
//! - `staging` implements the staged upload protocol once for every call site.
//! - `texture` bundles image, memory and view with its tracked layout.
//! - `shared` hands one device to every panel and parks teardowns that
//!   arrive while it is borrowed.
//! - `memory` is a CPU-resident device used headless and in tests.
//! - `wgpu_backend` is the production device on top of `wgpu`.
//!
//! Every copy and transition completes before the call returns; callers may
//! release or reuse their source data immediately afterwards.

mod layout;
pub mod memory;
mod shared;
pub mod staging;
pub mod texture;
pub mod wgpu_backend;

pub use layout::ImageLayout;
pub use shared::SharedDevice;
pub(crate) use shared::Teardown;

use crate::error::ResourceError;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

handle!(
    /// Buffer object, without its backing memory.
    BufferId
);
handle!(
    /// Memory allocation bound to exactly one buffer or image.
    MemoryId
);
handle!(
    /// Two-dimensional image object.
    ImageId
);
handle!(
    /// View over an image used for sampling.
    ImageViewId
);
handle!(
    /// Binding of an image view (plus sampler) to the draw pipeline.
    DescriptorSetId
);

/// Where an allocation lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLocation {
    /// GPU memory that the host cannot map.
    DeviceLocal,
    /// Host-visible, host-coherent memory used for staging.
    HostVisible,
}

/// Intended use of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Source of a device-side copy.
    TransferSrc,
    /// Copy destination that is later bound as vertex input.
    Vertex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
    pub location: MemoryLocation,
}

/// Texel formats the panel layer allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Rgba8Srgb,
}

impl ImageFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            ImageFormat::Rgba8Srgb => 4,
        }
    }
}

/// Optimal-tiling, device-local image usable as copy destination and sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

/// Buffer-to-image copy covering the whole image.
///
/// `bytes_per_row` is the pitch of the rows inside the source buffer and may
/// exceed `width * bytes_per_pixel` when the device requires padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCopy {
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
}

/// Device, queue and command pool as one capability object.
///
/// Implementations serialise all work on a single queue and wait for every
/// submission before returning.
pub trait GpuDevice {
    /// Allocates a buffer together with its backing memory.
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<(BufferId, MemoryId), ResourceError>;

    fn destroy_buffer(&mut self, buffer: BufferId);

    /// Releases an allocation after the object bound to it has been destroyed.
    fn free_memory(&mut self, memory: MemoryId);

    /// Maps host-visible memory, copies `bytes` to its start and unmaps it.
    fn write_memory(&mut self, memory: MemoryId, bytes: &[u8]) -> Result<(), ResourceError>;

    /// Copies `size` bytes from the start of `src` to the start of `dst`.
    fn copy_buffer(&mut self, src: BufferId, dst: BufferId, size: u64)
        -> Result<(), ResourceError>;

    /// Allocates a device-local image together with its backing memory.
    ///
    /// The image starts in [`ImageLayout::Undefined`] with unspecified contents.
    fn create_image(&mut self, desc: &ImageDesc) -> Result<(ImageId, MemoryId), ResourceError>;

    fn destroy_image(&mut self, image: ImageId);

    fn create_image_view(&mut self, image: ImageId) -> Result<ImageViewId, ResourceError>;

    fn destroy_image_view(&mut self, view: ImageViewId);

    /// Copies rows laid out at `copy.bytes_per_row` from `src` into `dst`,
    /// which must be in [`ImageLayout::TransferDst`].
    fn copy_buffer_to_image(
        &mut self,
        src: BufferId,
        dst: ImageId,
        copy: &ImageCopy,
    ) -> Result<(), ResourceError>;

    /// Inserts the barrier moving `image` from `from` to `to`.
    fn transition_image_layout(
        &mut self,
        image: ImageId,
        from: ImageLayout,
        to: ImageLayout,
    ) -> Result<(), ResourceError>;

    fn create_descriptor_set(&mut self, view: ImageViewId)
        -> Result<DescriptorSetId, ResourceError>;

    fn destroy_descriptor_set(&mut self, set: DescriptorSetId);

    /// Alignment, in bytes, the device requires for staged image rows.
    fn row_pitch_alignment(&self) -> u32 {
        1
    }
}
