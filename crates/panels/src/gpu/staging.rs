//! Staged uploads into device-local memory.
//!
//! Device-local buffers and images cannot be mapped, so every upload goes
//! through a temporary host-visible buffer:
//!
//! ```text
//!   bytes ──memcpy──▶ staging (host visible) ──device copy──▶ destination
//!                        │
//!                        └── destroyed + freed on every path
//! ```
//!
//! [`stage`] owns that sequence; callers only supply the device-side copy.

use std::borrow::Cow;

use crate::error::{ResourceError, ResourceKind};

use super::{BufferDesc, BufferId, BufferUsage, GpuDevice, MemoryLocation};

/// Runs `copy` against a freshly filled staging buffer holding `bytes`.
///
/// The staging buffer and its memory are released before this returns,
/// whether the write, the copy, or nothing failed. Allocation failure is
/// returned as is; there is nothing to release in that case.
pub fn stage<D, F>(device: &mut D, bytes: &[u8], copy: F) -> Result<(), ResourceError>
where
    D: GpuDevice + ?Sized,
    F: FnOnce(&mut D, BufferId) -> Result<(), ResourceError>,
{
    if bytes.is_empty() {
        return Err(ResourceError::allocation(
            ResourceKind::Buffer,
            "staging payload is empty",
        ));
    }

    let size = bytes.len() as u64;
    let (buffer, memory) = device.create_buffer(&BufferDesc {
        size,
        usage: BufferUsage::TransferSrc,
        location: MemoryLocation::HostVisible,
    })?;
    tracing::trace!(%buffer, size, "staging buffer allocated");

    let result = device
        .write_memory(memory, bytes)
        .and_then(|()| copy(device, buffer));

    device.destroy_buffer(buffer);
    device.free_memory(memory);
    tracing::trace!(%buffer, ok = result.is_ok(), "staging buffer released");

    result
}

/// Replaces the leading `bytes.len()` bytes of the device-local buffer `dst`.
pub fn upload_buffer<D>(device: &mut D, dst: BufferId, bytes: &[u8]) -> Result<(), ResourceError>
where
    D: GpuDevice + ?Sized,
{
    let size = bytes.len() as u64;
    stage(device, bytes, |device, staging| {
        device.copy_buffer(staging, dst, size)
    })
}

/// Rounds `row_bytes` up to the next multiple of `alignment`.
pub fn aligned_pitch(row_bytes: u32, alignment: u32) -> u32 {
    let alignment = alignment.max(1);
    row_bytes.div_ceil(alignment) * alignment
}

/// Lays out `height` rows of `row_bytes` each at `pitch` bytes apart.
///
/// `pixels` holds rows `stride` bytes apart. Borrows the input unchanged when
/// it already matches the requested layout.
pub fn pack_rows(
    pixels: &[u8],
    stride: usize,
    row_bytes: usize,
    pitch: usize,
    height: usize,
) -> Result<Cow<'_, [u8]>, ResourceError> {
    debug_assert!(pitch >= row_bytes && stride >= row_bytes);

    let required = stride * height.saturating_sub(1) + row_bytes;
    if height == 0 || pixels.len() < required {
        return Err(ResourceError::SizeMismatch {
            kind: ResourceKind::Image,
            actual: pixels.len() as u64,
            capacity: required as u64,
        });
    }

    if stride == pitch && pixels.len() == pitch * height {
        return Ok(Cow::Borrowed(pixels));
    }

    let mut packed = vec![0u8; pitch * height];
    for (row, dst) in packed.chunks_exact_mut(pitch).enumerate() {
        let start = row * stride;
        dst[..row_bytes].copy_from_slice(&pixels[start..start + row_bytes]);
    }
    Ok(Cow::Owned(packed))
}
