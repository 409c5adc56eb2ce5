//! [`GpuDevice`] on top of `wgpu`.
//!
//! The explicit object model maps onto wgpu as follows:
//!
//! - host-visible memory is a `MAP_WRITE | COPY_SRC` buffer created mapped;
//!   device-local buffers are `COPY_DST | VERTEX`.
//! - memory handles share the wgpu object of the buffer or image they back
//!   and are dropped when freed; wgpu returns the allocation once both the
//!   object and its memory handle are gone.
//! - copies are recorded on a one-shot encoder, submitted, and waited on
//!   with `Device::poll` before returning.
//! - layout transitions are validated and recorded; wgpu tracks texture
//!   usage itself and places the barrier when the copy or draw is submitted.
//! - descriptor sets are bind groups of (texture view, shared sampler)
//!   against [`WgpuDevice::texture_layout`].
//!
//! Validation and out-of-memory errors are caught with error scopes and
//! returned as [`ResourceError`] instead of reaching the uncaptured-error
//! handler.

use std::collections::HashMap;

use crate::error::{ResourceError, ResourceKind};

use super::{
    BufferDesc, BufferId, BufferUsage, DescriptorSetId, GpuDevice, ImageCopy, ImageDesc,
    ImageFormat, ImageId, ImageLayout, ImageViewId, MemoryId, MemoryLocation,
};

struct BufferSlot {
    buffer: wgpu::Buffer,
    memory: MemoryId,
}

enum Backing {
    Buffer { buffer: wgpu::Buffer, mapped: bool },
    Image,
}

struct MemorySlot {
    location: MemoryLocation,
    backing: Backing,
}

struct ImageSlot {
    texture: wgpu::Texture,
    layout: ImageLayout,
}

/// Production device: one `wgpu::Device` and its single queue.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    next_id: u64,
    buffers: HashMap<BufferId, BufferSlot>,
    memory: HashMap<MemoryId, MemorySlot>,
    images: HashMap<ImageId, ImageSlot>,
    views: HashMap<ImageViewId, wgpu::TextureView>,
    sets: HashMap<DescriptorSetId, wgpu::BindGroup>,
}

impl WgpuDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("panel texture layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("panel sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            device,
            queue,
            texture_layout,
            sampler,
            next_id: 1,
            buffers: HashMap::new(),
            memory: HashMap::new(),
            images: HashMap::new(),
            views: HashMap::new(),
            sets: HashMap::new(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Layout every panel descriptor set is created against.
    pub fn texture_layout(&self) -> &wgpu::BindGroupLayout {
        &self.texture_layout
    }

    pub fn buffer(&self, buffer: BufferId) -> Option<&wgpu::Buffer> {
        self.buffers.get(&buffer).map(|slot| &slot.buffer)
    }

    pub fn descriptor_set(&self, set: DescriptorSetId) -> Option<&wgpu::BindGroup> {
        self.sets.get(&set)
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Runs `create` inside validation and out-of-memory error scopes.
    fn scoped<T>(
        &self,
        kind: ResourceKind,
        create: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T, ResourceError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        match validation.or(out_of_memory) {
            Some(error) => Err(ResourceError::allocation(kind, error.to_string())),
            None => Ok(value),
        }
    }

    /// Records `commands` on a one-shot encoder and blocks until the GPU has
    /// executed them.
    fn submit_and_wait(
        &self,
        label: &str,
        commands: impl FnOnce(&mut wgpu::CommandEncoder),
    ) -> Result<(), ResourceError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        commands(&mut encoder);
        let index = self.queue.submit(Some(encoder.finish()));
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(ResourceError::Copy(error.to_string()));
        }
        self.device
            .poll(wgpu::PollType::WaitForSubmissionIndex(index))
            .map_err(|err| ResourceError::Submission(err.to_string()))?;
        Ok(())
    }

    fn map_for_write(&self, buffer: &wgpu::Buffer) -> Result<(), ResourceError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        buffer
            .slice(..)
            .map_async(wgpu::MapMode::Write, move |result| {
                let _ = tx.send(result);
            });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| ResourceError::Submission(err.to_string()))?;
        match rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(ResourceError::Copy(format!("buffer map failed: {err}"))),
            Err(_) => Err(ResourceError::Submission(
                "buffer map callback never ran".into(),
            )),
        }
    }
}

/// Buffer sizes must be a multiple of `COPY_BUFFER_ALIGNMENT` to be mapped.
fn padded_size(size: u64) -> u64 {
    size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT)
}

fn texture_format(format: ImageFormat) -> wgpu::TextureFormat {
    match format {
        ImageFormat::Rgba8Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
    }
}

impl GpuDevice for WgpuDevice {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<(BufferId, MemoryId), ResourceError> {
        let (usage, mapped) = match (desc.location, desc.usage) {
            (MemoryLocation::HostVisible, _) => (
                wgpu::BufferUsages::MAP_WRITE | wgpu::BufferUsages::COPY_SRC,
                true,
            ),
            (MemoryLocation::DeviceLocal, BufferUsage::Vertex) => (
                wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::VERTEX,
                false,
            ),
            (MemoryLocation::DeviceLocal, BufferUsage::TransferSrc) => (
                wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
                false,
            ),
        };
        let size = padded_size(desc.size);
        let buffer = self.scoped(ResourceKind::Buffer, |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(match desc.location {
                    MemoryLocation::HostVisible => "panel staging buffer",
                    MemoryLocation::DeviceLocal => "panel vertex buffer",
                }),
                size,
                usage,
                mapped_at_creation: mapped,
            })
        })?;

        let id = BufferId(self.next());
        let memory = MemoryId(self.next());
        self.memory.insert(
            memory,
            MemorySlot {
                location: desc.location,
                backing: Backing::Buffer {
                    buffer: buffer.clone(),
                    mapped,
                },
            },
        );
        self.buffers.insert(id, BufferSlot { buffer, memory });
        tracing::trace!(buffer = %id, size, location = ?desc.location, "wgpu buffer created");
        Ok((id, memory))
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        match self.buffers.remove(&buffer) {
            Some(slot) => slot.buffer.destroy(),
            None => tracing::warn!(%buffer, "destroy of unknown buffer ignored"),
        }
    }

    fn free_memory(&mut self, memory: MemoryId) {
        if self.memory.remove(&memory).is_none() {
            tracing::warn!(%memory, "free of unknown memory ignored");
        }
    }

    fn write_memory(&mut self, memory: MemoryId, bytes: &[u8]) -> Result<(), ResourceError> {
        let slot = self
            .memory
            .get(&memory)
            .ok_or(ResourceError::UnknownHandle {
                kind: ResourceKind::Memory,
                id: memory.0,
            })?;
        let (buffer, mapped) = match (&slot.location, &slot.backing) {
            (MemoryLocation::HostVisible, Backing::Buffer { buffer, mapped }) => {
                (buffer.clone(), *mapped)
            }
            _ => return Err(ResourceError::NotHostVisible { id: memory.0 }),
        };
        if bytes.len() as u64 > buffer.size() {
            return Err(ResourceError::SizeMismatch {
                kind: ResourceKind::Memory,
                actual: bytes.len() as u64,
                capacity: buffer.size(),
            });
        }

        if !mapped {
            self.map_for_write(&buffer)?;
        }
        {
            let mut view = buffer.slice(..).get_mapped_range_mut();
            view[..bytes.len()].copy_from_slice(bytes);
        }
        buffer.unmap();

        if let Some(MemorySlot {
            backing: Backing::Buffer { mapped, .. },
            ..
        }) = self.memory.get_mut(&memory)
        {
            *mapped = false;
        }
        Ok(())
    }

    fn copy_buffer(
        &mut self,
        src: BufferId,
        dst: BufferId,
        size: u64,
    ) -> Result<(), ResourceError> {
        let source = self.buffer(src).ok_or(ResourceError::UnknownHandle {
            kind: ResourceKind::Buffer,
            id: src.0,
        })?;
        let target = self.buffer(dst).ok_or(ResourceError::UnknownHandle {
            kind: ResourceKind::Buffer,
            id: dst.0,
        })?;
        let size = padded_size(size);
        if size > source.size() || size > target.size() {
            return Err(ResourceError::SizeMismatch {
                kind: ResourceKind::Buffer,
                actual: size,
                capacity: source.size().min(target.size()),
            });
        }
        self.submit_and_wait("panel buffer copy", |encoder| {
            encoder.copy_buffer_to_buffer(source, 0, target, 0, size);
        })
    }

    fn create_image(&mut self, desc: &ImageDesc) -> Result<(ImageId, MemoryId), ResourceError> {
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(ResourceError::allocation(
                ResourceKind::Image,
                format!(
                    "{}x{} outside supported range 1..={max}",
                    desc.width, desc.height
                ),
            ));
        }
        let texture = self.scoped(ResourceKind::Image, |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some("panel texture"),
                size: wgpu::Extent3d {
                    width: desc.width,
                    height: desc.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: texture_format(desc.format),
                usage: wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
        })?;

        let image = ImageId(self.next());
        let memory = MemoryId(self.next());
        self.memory.insert(
            memory,
            MemorySlot {
                location: MemoryLocation::DeviceLocal,
                backing: Backing::Image,
            },
        );
        self.images.insert(
            image,
            ImageSlot {
                texture,
                layout: ImageLayout::Undefined,
            },
        );
        Ok((image, memory))
    }

    fn destroy_image(&mut self, image: ImageId) {
        match self.images.remove(&image) {
            Some(slot) => slot.texture.destroy(),
            None => tracing::warn!(%image, "destroy of unknown image ignored"),
        }
    }

    fn create_image_view(&mut self, image: ImageId) -> Result<ImageViewId, ResourceError> {
        let slot = self.images.get(&image).ok_or(ResourceError::UnknownHandle {
            kind: ResourceKind::Image,
            id: image.0,
        })?;
        let texture = slot.texture.clone();
        let view = self.scoped(ResourceKind::ImageView, |_| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("panel texture view"),
                ..Default::default()
            })
        })?;
        let id = ImageViewId(self.next());
        self.views.insert(id, view);
        Ok(id)
    }

    fn destroy_image_view(&mut self, view: ImageViewId) {
        if self.views.remove(&view).is_none() {
            tracing::warn!(%view, "destroy of unknown image view ignored");
        }
    }

    fn copy_buffer_to_image(
        &mut self,
        src: BufferId,
        dst: ImageId,
        copy: &ImageCopy,
    ) -> Result<(), ResourceError> {
        let source = self.buffer(src).ok_or(ResourceError::UnknownHandle {
            kind: ResourceKind::Buffer,
            id: src.0,
        })?;
        let slot = self.images.get(&dst).ok_or(ResourceError::UnknownHandle {
            kind: ResourceKind::Image,
            id: dst.0,
        })?;
        if slot.layout != ImageLayout::TransferDst {
            return Err(ResourceError::Copy(format!(
                "image {dst} is in {:?}, expected TransferDst",
                slot.layout
            )));
        }
        if copy.bytes_per_row % wgpu::COPY_BYTES_PER_ROW_ALIGNMENT != 0 {
            return Err(ResourceError::Copy(format!(
                "row pitch {} is not a multiple of {}",
                copy.bytes_per_row,
                wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
            )));
        }

        self.submit_and_wait("panel texture copy", |encoder| {
            encoder.copy_buffer_to_texture(
                wgpu::TexelCopyBufferInfo {
                    buffer: source,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(copy.bytes_per_row),
                        rows_per_image: Some(copy.height),
                    },
                },
                wgpu::TexelCopyTextureInfo {
                    texture: &slot.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::Extent3d {
                    width: copy.width,
                    height: copy.height,
                    depth_or_array_layers: 1,
                },
            );
        })
    }

    fn transition_image_layout(
        &mut self,
        image: ImageId,
        from: ImageLayout,
        to: ImageLayout,
    ) -> Result<(), ResourceError> {
        let slot = self
            .images
            .get_mut(&image)
            .ok_or(ResourceError::UnknownHandle {
                kind: ResourceKind::Image,
                id: image.0,
            })?;
        if from != ImageLayout::Undefined && slot.layout != from {
            return Err(ResourceError::Transition {
                from: slot.layout,
                to,
            });
        }
        from.transition(to)?;
        slot.layout = to;
        Ok(())
    }

    fn create_descriptor_set(
        &mut self,
        view: ImageViewId,
    ) -> Result<DescriptorSetId, ResourceError> {
        let texture_view = self.views.get(&view).ok_or(ResourceError::UnknownHandle {
            kind: ResourceKind::ImageView,
            id: view.0,
        })?;
        let bind_group = self.scoped(ResourceKind::DescriptorSet, |device| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("panel texture bind group"),
                layout: &self.texture_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(texture_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            })
        })?;
        let id = DescriptorSetId(self.next());
        self.sets.insert(id, bind_group);
        Ok(id)
    }

    fn destroy_descriptor_set(&mut self, set: DescriptorSetId) {
        if self.sets.remove(&set).is_none() {
            tracing::warn!(%set, "destroy of unknown descriptor set ignored");
        }
    }

    fn row_pitch_alignment(&self) -> u32 {
        wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
    }
}
