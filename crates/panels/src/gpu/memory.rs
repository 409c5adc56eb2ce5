//! CPU-resident [`GpuDevice`] for headless runs and tests.
//!
//! `MemoryDevice` keeps the bytes of every buffer and image in host memory,
//! records each successful call in order, and checks the same rules a
//! validation layer would: handles must be live, memory is freed only after
//! the object bound to it, an image outlives its views, and a view outlives
//! the descriptor sets that reference it. Rule breaks are collected in
//! [`MemoryDevice::violations`] instead of panicking so tests can assert on
//! them.
//!
//! Failures can be injected per call kind with [`MemoryDevice::fail_on`].

use std::collections::{BTreeMap, HashMap};

use crate::error::{ResourceError, ResourceKind};

use super::{
    BufferDesc, BufferId, DescriptorSetId, GpuDevice, ImageCopy, ImageDesc, ImageId, ImageLayout,
    ImageViewId, MemoryId, MemoryLocation,
};

/// Largest image edge accepted, matching wgpu's default 2D texture limit.
pub const MAX_IMAGE_DIMENSION: u32 = 8192;

/// Successful call observed by the device, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    CreateBuffer {
        buffer: BufferId,
        memory: MemoryId,
        size: u64,
        location: MemoryLocation,
    },
    DestroyBuffer(BufferId),
    FreeMemory(MemoryId),
    WriteMemory {
        memory: MemoryId,
        len: usize,
    },
    CopyBuffer {
        src: BufferId,
        dst: BufferId,
        size: u64,
    },
    CreateImage {
        image: ImageId,
        memory: MemoryId,
        width: u32,
        height: u32,
    },
    DestroyImage(ImageId),
    CreateImageView {
        view: ImageViewId,
        image: ImageId,
    },
    DestroyImageView(ImageViewId),
    CopyBufferToImage {
        src: BufferId,
        dst: ImageId,
    },
    TransitionImageLayout {
        image: ImageId,
        from: ImageLayout,
        to: ImageLayout,
    },
    CreateDescriptorSet {
        set: DescriptorSetId,
        view: ImageViewId,
    },
    DestroyDescriptorSet(DescriptorSetId),
}

/// Call kinds that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    CreateBuffer,
    WriteMemory,
    CopyBuffer,
    CreateImage,
    CreateImageView,
    CopyBufferToImage,
    TransitionImageLayout,
    CreateDescriptorSet,
}

impl FailPoint {
    fn error(self) -> ResourceError {
        match self {
            FailPoint::CreateBuffer => {
                ResourceError::allocation(ResourceKind::Buffer, "injected failure")
            }
            FailPoint::CreateImage => {
                ResourceError::allocation(ResourceKind::Image, "injected failure")
            }
            FailPoint::CreateImageView => {
                ResourceError::allocation(ResourceKind::ImageView, "injected failure")
            }
            FailPoint::CreateDescriptorSet => {
                ResourceError::allocation(ResourceKind::DescriptorSet, "injected failure")
            }
            FailPoint::WriteMemory => ResourceError::Copy("injected map failure".into()),
            FailPoint::CopyBuffer | FailPoint::CopyBufferToImage => {
                ResourceError::Copy("injected failure".into())
            }
            FailPoint::TransitionImageLayout => {
                ResourceError::Submission("injected barrier failure".into())
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Binding {
    Buffer(BufferId),
    Image(ImageId),
}

#[derive(Debug)]
struct MemorySlot {
    location: MemoryLocation,
    bytes: Vec<u8>,
    bound: Option<Binding>,
}

#[derive(Debug)]
struct BufferSlot {
    memory: MemoryId,
    size: u64,
}

#[derive(Debug)]
struct ImageSlot {
    memory: MemoryId,
    desc: ImageDesc,
    layout: ImageLayout,
}

/// Host-memory device with call recording and failure injection.
#[derive(Debug)]
pub struct MemoryDevice {
    next_id: u64,
    row_alignment: u32,
    memory: BTreeMap<MemoryId, MemorySlot>,
    buffers: BTreeMap<BufferId, BufferSlot>,
    images: BTreeMap<ImageId, ImageSlot>,
    views: BTreeMap<ImageViewId, ImageId>,
    sets: BTreeMap<DescriptorSetId, ImageViewId>,
    failures: HashMap<FailPoint, u32>,
    calls: Vec<DeviceCall>,
    violations: Vec<String>,
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            row_alignment: 1,
            memory: BTreeMap::new(),
            buffers: BTreeMap::new(),
            images: BTreeMap::new(),
            views: BTreeMap::new(),
            sets: BTreeMap::new(),
            failures: HashMap::new(),
            calls: Vec::new(),
            violations: Vec::new(),
        }
    }

    /// Emulates a device that wants staged image rows padded to `alignment`.
    pub fn with_row_alignment(mut self, alignment: u32) -> Self {
        self.row_alignment = alignment.max(1);
        self
    }

    /// Makes the `nth` upcoming call of kind `point` fail (1 = the next one).
    pub fn fail_on(&mut self, point: FailPoint, nth: u32) {
        self.failures.insert(point, nth.max(1));
    }

    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_memory(&self) -> usize {
        self.memory.len()
    }

    pub fn live_images(&self) -> usize {
        self.images.len()
    }

    pub fn live_views(&self) -> usize {
        self.views.len()
    }

    pub fn live_descriptor_sets(&self) -> usize {
        self.sets.len()
    }

    /// True when every object and allocation has been released.
    pub fn is_idle(&self) -> bool {
        self.memory.is_empty()
            && self.buffers.is_empty()
            && self.images.is_empty()
            && self.views.is_empty()
            && self.sets.is_empty()
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        let slot = self.buffers.get(&buffer)?;
        self.memory.get(&slot.memory).map(|mem| mem.bytes.as_slice())
    }

    /// Tightly packed texels of `image`.
    pub fn image_contents(&self, image: ImageId) -> Option<&[u8]> {
        let slot = self.images.get(&image)?;
        self.memory.get(&slot.memory).map(|mem| mem.bytes.as_slice())
    }

    pub fn image_layout(&self, image: ImageId) -> Option<ImageLayout> {
        self.images.get(&image).map(|slot| slot.layout)
    }

    /// Image sampled through `set`, if both are still live.
    pub fn descriptor_image(&self, set: DescriptorSetId) -> Option<ImageId> {
        let view = self.sets.get(&set)?;
        self.views.get(view).copied()
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check(&mut self, point: FailPoint) -> Result<(), ResourceError> {
        if let Some(remaining) = self.failures.get_mut(&point) {
            *remaining -= 1;
            if *remaining == 0 {
                self.failures.remove(&point);
                return Err(point.error());
            }
        }
        Ok(())
    }

    fn violation(&mut self, message: String) {
        tracing::warn!(%message, "device usage violation");
        self.violations.push(message);
    }

    fn unknown(&mut self, kind: ResourceKind, id: u64) -> ResourceError {
        self.violation(format!("use of unknown {kind} {id}"));
        ResourceError::UnknownHandle { kind, id }
    }

    fn allocate(&mut self, location: MemoryLocation, size: usize, bound: Binding) -> MemoryId {
        let memory = MemoryId(self.next());
        self.memory.insert(
            memory,
            MemorySlot {
                location,
                bytes: vec![0; size],
                bound: Some(bound),
            },
        );
        memory
    }
}

impl GpuDevice for MemoryDevice {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<(BufferId, MemoryId), ResourceError> {
        self.check(FailPoint::CreateBuffer)?;
        if desc.size == 0 {
            return Err(ResourceError::allocation(
                ResourceKind::Buffer,
                "zero-sized buffer",
            ));
        }
        let buffer = BufferId(self.next());
        let memory = self.allocate(desc.location, desc.size as usize, Binding::Buffer(buffer));
        self.buffers.insert(
            buffer,
            BufferSlot {
                memory,
                size: desc.size,
            },
        );
        self.calls.push(DeviceCall::CreateBuffer {
            buffer,
            memory,
            size: desc.size,
            location: desc.location,
        });
        Ok((buffer, memory))
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        match self.buffers.remove(&buffer) {
            Some(slot) => {
                if let Some(mem) = self.memory.get_mut(&slot.memory) {
                    mem.bound = None;
                }
                self.calls.push(DeviceCall::DestroyBuffer(buffer));
            }
            None => self.violation(format!("destroy of unknown buffer {buffer}")),
        }
    }

    fn free_memory(&mut self, memory: MemoryId) {
        let Some(slot) = self.memory.get(&memory) else {
            self.violation(format!("free of unknown memory {memory}"));
            return;
        };
        if let Some(bound) = slot.bound {
            self.violation(format!(
                "memory {memory} freed while still bound to {bound:?}"
            ));
        }
        self.memory.remove(&memory);
        self.calls.push(DeviceCall::FreeMemory(memory));
    }

    fn write_memory(&mut self, memory: MemoryId, bytes: &[u8]) -> Result<(), ResourceError> {
        self.check(FailPoint::WriteMemory)?;
        let Some(slot) = self.memory.get_mut(&memory) else {
            return Err(self.unknown(ResourceKind::Memory, memory.0));
        };
        if slot.location != MemoryLocation::HostVisible {
            return Err(ResourceError::NotHostVisible { id: memory.0 });
        }
        if bytes.len() > slot.bytes.len() {
            return Err(ResourceError::SizeMismatch {
                kind: ResourceKind::Memory,
                actual: bytes.len() as u64,
                capacity: slot.bytes.len() as u64,
            });
        }
        slot.bytes[..bytes.len()].copy_from_slice(bytes);
        self.calls.push(DeviceCall::WriteMemory {
            memory,
            len: bytes.len(),
        });
        Ok(())
    }

    fn copy_buffer(
        &mut self,
        src: BufferId,
        dst: BufferId,
        size: u64,
    ) -> Result<(), ResourceError> {
        self.check(FailPoint::CopyBuffer)?;
        let Some(src_slot) = self.buffers.get(&src) else {
            return Err(self.unknown(ResourceKind::Buffer, src.0));
        };
        let Some(dst_slot) = self.buffers.get(&dst) else {
            return Err(self.unknown(ResourceKind::Buffer, dst.0));
        };
        let capacity = src_slot.size.min(dst_slot.size);
        if size > capacity {
            return Err(ResourceError::SizeMismatch {
                kind: ResourceKind::Buffer,
                actual: size,
                capacity,
            });
        }
        let (src_mem, dst_mem) = (src_slot.memory, dst_slot.memory);
        let Some(source) = self.memory.get(&src_mem) else {
            return Err(self.unknown(ResourceKind::Memory, src_mem.0));
        };
        let data = source.bytes[..size as usize].to_vec();
        if let Some(target) = self.memory.get_mut(&dst_mem) {
            target.bytes[..size as usize].copy_from_slice(&data);
        }
        self.calls.push(DeviceCall::CopyBuffer { src, dst, size });
        Ok(())
    }

    fn create_image(&mut self, desc: &ImageDesc) -> Result<(ImageId, MemoryId), ResourceError> {
        self.check(FailPoint::CreateImage)?;
        if desc.width == 0 || desc.height == 0 {
            return Err(ResourceError::allocation(
                ResourceKind::Image,
                "zero-sized image",
            ));
        }
        if desc.width > MAX_IMAGE_DIMENSION || desc.height > MAX_IMAGE_DIMENSION {
            return Err(ResourceError::allocation(
                ResourceKind::Image,
                format!(
                    "{}x{} outside supported range 1..={MAX_IMAGE_DIMENSION}",
                    desc.width, desc.height
                ),
            ));
        }
        let size = u64::from(desc.width)
            .checked_mul(u64::from(desc.height))
            .and_then(|texels| texels.checked_mul(u64::from(desc.format.bytes_per_pixel())))
            .and_then(|bytes| usize::try_from(bytes).ok())
            .ok_or_else(|| {
                ResourceError::allocation(ResourceKind::Image, "image byte size overflows")
            })?;
        let image = ImageId(self.next());
        let memory = self.allocate(MemoryLocation::DeviceLocal, size, Binding::Image(image));
        self.images.insert(
            image,
            ImageSlot {
                memory,
                desc: *desc,
                layout: ImageLayout::Undefined,
            },
        );
        self.calls.push(DeviceCall::CreateImage {
            image,
            memory,
            width: desc.width,
            height: desc.height,
        });
        Ok((image, memory))
    }

    fn destroy_image(&mut self, image: ImageId) {
        if self.views.values().any(|viewed| *viewed == image) {
            self.violation(format!("image {image} destroyed while a view still uses it"));
        }
        match self.images.remove(&image) {
            Some(slot) => {
                if let Some(mem) = self.memory.get_mut(&slot.memory) {
                    mem.bound = None;
                }
                self.calls.push(DeviceCall::DestroyImage(image));
            }
            None => self.violation(format!("destroy of unknown image {image}")),
        }
    }

    fn create_image_view(&mut self, image: ImageId) -> Result<ImageViewId, ResourceError> {
        self.check(FailPoint::CreateImageView)?;
        if !self.images.contains_key(&image) {
            return Err(self.unknown(ResourceKind::Image, image.0));
        }
        let view = ImageViewId(self.next());
        self.views.insert(view, image);
        self.calls.push(DeviceCall::CreateImageView { view, image });
        Ok(view)
    }

    fn destroy_image_view(&mut self, view: ImageViewId) {
        if self.sets.values().any(|bound| *bound == view) {
            self.violation(format!(
                "image view {view} destroyed while a descriptor set still uses it"
            ));
        }
        if self.views.remove(&view).is_some() {
            self.calls.push(DeviceCall::DestroyImageView(view));
        } else {
            self.violation(format!("destroy of unknown image view {view}"));
        }
    }

    fn copy_buffer_to_image(
        &mut self,
        src: BufferId,
        dst: ImageId,
        copy: &ImageCopy,
    ) -> Result<(), ResourceError> {
        self.check(FailPoint::CopyBufferToImage)?;
        let Some(src_slot) = self.buffers.get(&src) else {
            return Err(self.unknown(ResourceKind::Buffer, src.0));
        };
        let Some(image) = self.images.get(&dst) else {
            return Err(self.unknown(ResourceKind::Image, dst.0));
        };
        if image.layout != ImageLayout::TransferDst {
            let layout = image.layout;
            self.violation(format!("copy into image {dst} while in {layout:?}"));
            return Err(ResourceError::Copy(format!(
                "image {dst} is in {layout:?}, expected TransferDst"
            )));
        }
        if copy.width != image.desc.width || copy.height != image.desc.height {
            return Err(ResourceError::Copy(format!(
                "copy extent {}x{} does not match image {}x{}",
                copy.width, copy.height, image.desc.width, image.desc.height
            )));
        }

        let row_bytes = copy.width as usize * image.desc.format.bytes_per_pixel() as usize;
        let pitch = copy.bytes_per_row as usize;
        let height = copy.height as usize;
        let required = pitch * (height - 1) + row_bytes;
        if pitch < row_bytes || (src_slot.size as usize) < required {
            return Err(ResourceError::SizeMismatch {
                kind: ResourceKind::Buffer,
                actual: src_slot.size,
                capacity: required as u64,
            });
        }

        let (src_mem, dst_mem) = (src_slot.memory, image.memory);
        let Some(source) = self.memory.get(&src_mem).map(|slot| slot.bytes.clone()) else {
            return Err(self.unknown(ResourceKind::Memory, src_mem.0));
        };
        if let Some(target) = self.memory.get_mut(&dst_mem) {
            for (row, texels) in target.bytes.chunks_exact_mut(row_bytes).enumerate() {
                let start = row * pitch;
                texels.copy_from_slice(&source[start..start + row_bytes]);
            }
        }
        self.calls.push(DeviceCall::CopyBufferToImage { src, dst });
        Ok(())
    }

    fn transition_image_layout(
        &mut self,
        image: ImageId,
        from: ImageLayout,
        to: ImageLayout,
    ) -> Result<(), ResourceError> {
        self.check(FailPoint::TransitionImageLayout)?;
        let Some(slot) = self.images.get_mut(&image) else {
            return Err(self.unknown(ResourceKind::Image, image.0));
        };
        // An `Undefined` source discards contents and is valid from any layout.
        if from != ImageLayout::Undefined && slot.layout != from {
            let actual = slot.layout;
            self.violation(format!(
                "image {image} transitioned from {from:?} but is in {actual:?}"
            ));
            return Err(ResourceError::Transition { from: actual, to });
        }
        from.transition(to)?;
        slot.layout = to;
        self.calls
            .push(DeviceCall::TransitionImageLayout { image, from, to });
        Ok(())
    }

    fn create_descriptor_set(
        &mut self,
        view: ImageViewId,
    ) -> Result<DescriptorSetId, ResourceError> {
        self.check(FailPoint::CreateDescriptorSet)?;
        if !self.views.contains_key(&view) {
            return Err(self.unknown(ResourceKind::ImageView, view.0));
        }
        let set = DescriptorSetId(self.next());
        self.sets.insert(set, view);
        self.calls.push(DeviceCall::CreateDescriptorSet { set, view });
        Ok(set)
    }

    fn destroy_descriptor_set(&mut self, set: DescriptorSetId) {
        if self.sets.remove(&set).is_some() {
            self.calls.push(DeviceCall::DestroyDescriptorSet(set));
        } else {
            self.violation(format!("destroy of unknown descriptor set {set}"));
        }
    }

    fn row_pitch_alignment(&self) -> u32 {
        self.row_alignment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{BufferUsage, ImageFormat};

    fn image_desc() -> ImageDesc {
        ImageDesc {
            width: 2,
            height: 2,
            format: ImageFormat::Rgba8Srgb,
        }
    }

    #[test]
    fn device_local_memory_cannot_be_mapped() {
        let mut device = MemoryDevice::new();
        let (_, memory) = device
            .create_buffer(&BufferDesc {
                size: 4,
                usage: BufferUsage::Vertex,
                location: MemoryLocation::DeviceLocal,
            })
            .unwrap();
        let err = device.write_memory(memory, &[1, 2, 3, 4]).unwrap_err();
        assert!(matches!(err, ResourceError::NotHostVisible { .. }));
    }

    #[test]
    fn freeing_bound_memory_is_flagged() {
        let mut device = MemoryDevice::new();
        let (buffer, memory) = device
            .create_buffer(&BufferDesc {
                size: 4,
                usage: BufferUsage::TransferSrc,
                location: MemoryLocation::HostVisible,
            })
            .unwrap();
        device.free_memory(memory);
        device.destroy_buffer(buffer);
        assert_eq!(device.violations().len(), 1);
        assert!(device.is_idle());
    }

    #[test]
    fn destroying_image_before_view_is_flagged() {
        let mut device = MemoryDevice::new();
        let (image, memory) = device.create_image(&image_desc()).unwrap();
        let view = device.create_image_view(image).unwrap();
        device.destroy_image(image);
        device.destroy_image_view(view);
        device.free_memory(memory);
        assert_eq!(device.violations().len(), 1);
    }

    #[test]
    fn double_destroy_is_flagged_not_fatal() {
        let mut device = MemoryDevice::new();
        let (image, memory) = device.create_image(&image_desc()).unwrap();
        device.destroy_image(image);
        device.destroy_image(image);
        device.free_memory(memory);
        device.free_memory(memory);
        assert_eq!(device.violations().len(), 2);
    }

    #[test]
    fn copy_requires_transfer_layout() {
        let mut device = MemoryDevice::new();
        let (image, _) = device.create_image(&image_desc()).unwrap();
        let (staging, _) = device
            .create_buffer(&BufferDesc {
                size: 16,
                usage: BufferUsage::TransferSrc,
                location: MemoryLocation::HostVisible,
            })
            .unwrap();
        let copy = ImageCopy {
            width: 2,
            height: 2,
            bytes_per_row: 8,
        };
        assert!(device.copy_buffer_to_image(staging, image, &copy).is_err());

        device
            .transition_image_layout(image, ImageLayout::Undefined, ImageLayout::TransferDst)
            .unwrap();
        device.copy_buffer_to_image(staging, image, &copy).unwrap();
        assert_eq!(device.image_layout(image), Some(ImageLayout::TransferDst));
    }

    #[test]
    fn injected_failure_hits_the_nth_call_only() {
        let mut device = MemoryDevice::new();
        device.fail_on(FailPoint::CreateImage, 2);
        assert!(device.create_image(&image_desc()).is_ok());
        assert!(device.create_image(&image_desc()).is_err());
        assert!(device.create_image(&image_desc()).is_ok());
        assert_eq!(device.live_images(), 2);
    }

    #[test]
    fn mismatched_transition_source_is_rejected() {
        let mut device = MemoryDevice::new();
        let (image, _) = device.create_image(&image_desc()).unwrap();
        let err = device
            .transition_image_layout(image, ImageLayout::TransferDst, ImageLayout::ShaderReadOnly)
            .unwrap_err();
        assert!(matches!(err, ResourceError::Transition { .. }));
        assert_eq!(device.image_layout(image), Some(ImageLayout::Undefined));
    }

    #[test]
    fn oversized_image_is_an_allocation_error() {
        let mut device = MemoryDevice::new();
        let sizes = [
            (65_536, 16_385),
            (u32::MAX, u32::MAX),
            (MAX_IMAGE_DIMENSION + 1, 1),
        ];
        for (width, height) in sizes {
            let err = device
                .create_image(&ImageDesc {
                    width,
                    height,
                    format: ImageFormat::Rgba8Srgb,
                })
                .unwrap_err();
            assert!(matches!(
                err,
                ResourceError::Allocation {
                    kind: ResourceKind::Image,
                    ..
                }
            ));
        }
        assert!(device.is_idle());
    }

    #[test]
    fn copy_from_buffer_whose_memory_was_freed_is_reported() {
        let mut device = MemoryDevice::new();
        let staging = BufferDesc {
            size: 16,
            usage: BufferUsage::TransferSrc,
            location: MemoryLocation::HostVisible,
        };
        let (src, src_memory) = device.create_buffer(&staging).unwrap();
        let (dst, _) = device.create_buffer(&staging).unwrap();
        device.free_memory(src_memory);

        let err = device.copy_buffer(src, dst, 16).unwrap_err();
        assert!(matches!(
            err,
            ResourceError::UnknownHandle {
                kind: ResourceKind::Memory,
                ..
            }
        ));

        let (image, _) = device.create_image(&image_desc()).unwrap();
        device
            .transition_image_layout(image, ImageLayout::Undefined, ImageLayout::TransferDst)
            .unwrap();
        let copy = ImageCopy {
            width: 2,
            height: 2,
            bytes_per_row: 8,
        };
        let err = device.copy_buffer_to_image(src, image, &copy).unwrap_err();
        assert!(matches!(err, ResourceError::UnknownHandle { .. }));
        assert!(!device.violations().is_empty());
    }
}
