use crate::error::ResourceError;

use super::staging::{aligned_pitch, pack_rows, stage};
use super::{GpuDevice, ImageCopy, ImageDesc, ImageId, ImageLayout, MemoryId};

/// Device-local image plus its memory, with the layout it was last moved to.
///
/// The extent is fixed at allocation; a different size needs a new texture.
#[derive(Debug)]
pub struct Texture {
    image: ImageId,
    memory: MemoryId,
    desc: ImageDesc,
    layout: ImageLayout,
}

impl Texture {
    /// Allocates the image in [`ImageLayout::Undefined`] without uploading.
    pub fn allocate<D>(device: &mut D, desc: ImageDesc) -> Result<Self, ResourceError>
    where
        D: GpuDevice + ?Sized,
    {
        let (image, memory) = device.create_image(&desc)?;
        tracing::debug!(
            %image,
            width = desc.width,
            height = desc.height,
            format = ?desc.format,
            "texture image allocated"
        );
        Ok(Self {
            image,
            memory,
            desc,
            layout: ImageLayout::Undefined,
        })
    }

    pub fn image(&self) -> ImageId {
        self.image
    }

    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    /// Moves the image to `to`, recording the new layout only once the
    /// barrier has completed.
    pub fn transition<D>(&mut self, device: &mut D, to: ImageLayout) -> Result<(), ResourceError>
    where
        D: GpuDevice + ?Sized,
    {
        let (from, to) = self.layout.transition(to)?;
        device.transition_image_layout(self.image, from, to)?;
        self.layout = to;
        tracing::trace!(image = %self.image, ?from, ?to, "image layout transition");
        Ok(())
    }

    /// Replaces the texels with `pixels`, whose rows are `stride` bytes apart.
    ///
    /// On success the image is left in [`ImageLayout::ShaderReadOnly`].
    pub fn upload<D>(
        &mut self,
        device: &mut D,
        pixels: &[u8],
        stride: usize,
    ) -> Result<(), ResourceError>
    where
        D: GpuDevice + ?Sized,
    {
        let row_bytes = self.desc.width * self.desc.format.bytes_per_pixel();
        let pitch = aligned_pitch(row_bytes, device.row_pitch_alignment());
        let packed = pack_rows(
            pixels,
            stride,
            row_bytes as usize,
            pitch as usize,
            self.desc.height as usize,
        )?;
        let copy = ImageCopy {
            width: self.desc.width,
            height: self.desc.height,
            bytes_per_row: pitch,
        };

        stage(device, &packed, |device, staging| {
            self.transition(device, ImageLayout::TransferDst)?;
            device.copy_buffer_to_image(staging, self.image, &copy)?;
            self.transition(device, ImageLayout::ShaderReadOnly)
        })
    }

    /// Destroys the image, then frees its memory.
    pub fn release<D>(self, device: &mut D)
    where
        D: GpuDevice + ?Sized,
    {
        device.destroy_image(self.image);
        device.free_memory(self.memory);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::memory::{FailPoint, MemoryDevice};
    use crate::gpu::ImageFormat;

    fn desc(width: u32, height: u32) -> ImageDesc {
        ImageDesc {
            width,
            height,
            format: ImageFormat::Rgba8Srgb,
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn upload_round_trips_with_padded_rows() {
        let mut device = MemoryDevice::new().with_row_alignment(256);
        let mut texture = Texture::allocate(&mut device, desc(5, 3)).unwrap();
        let pixels = pattern(5 * 3 * 4);

        texture.upload(&mut device, &pixels, 20).unwrap();

        assert_eq!(device.image_contents(texture.image()).unwrap(), &pixels[..]);
        assert_eq!(texture.layout(), ImageLayout::ShaderReadOnly);
        assert_eq!(
            device.image_layout(texture.image()),
            Some(ImageLayout::ShaderReadOnly)
        );
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn repeated_uploads_cycle_through_transfer() {
        let mut device = MemoryDevice::new();
        let mut texture = Texture::allocate(&mut device, desc(2, 2)).unwrap();
        texture.upload(&mut device, &[1; 16], 8).unwrap();
        texture.upload(&mut device, &[2; 16], 8).unwrap();

        assert_eq!(device.image_contents(texture.image()).unwrap(), &[2; 16]);
        assert!(device.violations().is_empty());
    }

    #[test]
    fn failed_copy_leaves_transfer_layout_and_retry_succeeds() {
        let mut device = MemoryDevice::new();
        let mut texture = Texture::allocate(&mut device, desc(2, 1)).unwrap();
        device.fail_on(FailPoint::CopyBufferToImage, 1);

        assert!(texture.upload(&mut device, &[3; 8], 8).is_err());
        assert_eq!(texture.layout(), ImageLayout::TransferDst);
        assert_eq!(device.live_buffers(), 0);

        texture.upload(&mut device, &[4; 8], 8).unwrap();
        assert_eq!(texture.layout(), ImageLayout::ShaderReadOnly);
        assert_eq!(device.image_contents(texture.image()).unwrap(), &[4; 8]);
    }

    #[test]
    fn failed_barrier_keeps_previous_layout() {
        let mut device = MemoryDevice::new();
        let mut texture = Texture::allocate(&mut device, desc(1, 1)).unwrap();
        device.fail_on(FailPoint::TransitionImageLayout, 1);

        let err = texture
            .transition(&mut device, ImageLayout::TransferDst)
            .unwrap_err();
        assert!(matches!(err, ResourceError::Submission(_)));
        assert_eq!(texture.layout(), ImageLayout::Undefined);
    }

    #[test]
    fn release_destroys_image_before_memory() {
        let mut device = MemoryDevice::new();
        let texture = Texture::allocate(&mut device, desc(1, 1)).unwrap();
        texture.release(&mut device);
        assert!(device.is_idle());
        assert!(device.violations().is_empty());
    }
}
