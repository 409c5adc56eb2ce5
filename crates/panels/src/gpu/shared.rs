//! Single-threaded shared access to a [`GpuDevice`].
//!
//! Panels hold a clone of the same [`SharedDevice`]. A panel can be dropped
//! while someone else is borrowing the device. In that case its teardown is
//! parked here and runs as soon as the device is next borrowed.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use super::texture::Texture;
use super::{BufferId, DescriptorSetId, GpuDevice, ImageViewId, MemoryId};

/// GPU objects to release together, in reverse acquisition order.
#[derive(Debug, Default)]
pub(crate) struct Teardown {
    pub(crate) descriptor_set: Option<DescriptorSetId>,
    pub(crate) view: Option<ImageViewId>,
    pub(crate) texture: Option<Texture>,
    pub(crate) vertex: Option<(BufferId, MemoryId)>,
}

impl Teardown {
    pub(crate) fn is_empty(&self) -> bool {
        self.descriptor_set.is_none()
            && self.view.is_none()
            && self.texture.is_none()
            && self.vertex.is_none()
    }

    /// Descriptor set → image view → image → image memory → buffer → buffer memory.
    pub(crate) fn run<D: GpuDevice>(self, gpu: &mut D) {
        if let Some(set) = self.descriptor_set {
            gpu.destroy_descriptor_set(set);
        }
        if let Some(view) = self.view {
            gpu.destroy_image_view(view);
        }
        if let Some(texture) = self.texture {
            texture.release(gpu);
        }
        if let Some((buffer, memory)) = self.vertex {
            gpu.destroy_buffer(buffer);
            gpu.free_memory(memory);
        }
    }
}

struct Slot<D: GpuDevice> {
    device: RefCell<D>,
    deferred: RefCell<Vec<Teardown>>,
}

impl<D: GpuDevice> Drop for Slot<D> {
    fn drop(&mut self) {
        let device = self.device.get_mut();
        for teardown in self.deferred.get_mut().drain(..) {
            teardown.run(device);
        }
    }
}

/// Reference-counted handle to the device every panel uploads through.
pub struct SharedDevice<D: GpuDevice> {
    slot: Rc<Slot<D>>,
}

impl<D: GpuDevice> SharedDevice<D> {
    pub fn new(device: D) -> Self {
        Self {
            slot: Rc::new(Slot {
                device: RefCell::new(device),
                deferred: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Runs any parked teardowns, then borrows the device.
    ///
    /// Parked work is skipped while another borrow is still alive.
    pub fn borrow(&self) -> Ref<'_, D> {
        self.flush();
        self.slot.device.borrow()
    }

    /// Runs any parked teardowns, then borrows the device mutably.
    ///
    /// # Panics
    ///
    /// Panics if the device is already borrowed, like [`RefCell::borrow_mut`].
    pub fn borrow_mut(&self) -> RefMut<'_, D> {
        self.flush();
        self.slot.device.borrow_mut()
    }

    /// Number of teardowns waiting for the device to become free.
    pub fn pending_releases(&self) -> usize {
        self.slot.deferred.borrow().len()
    }

    /// Releases `teardown` now, or parks it if the device is busy.
    pub(crate) fn release(&self, teardown: Teardown) {
        if teardown.is_empty() {
            return;
        }
        match self.slot.device.try_borrow_mut() {
            Ok(mut gpu) => {
                teardown.run(&mut *gpu);
                drop(gpu);
                self.flush();
            }
            Err(_) => {
                tracing::debug!("device busy; panel teardown deferred");
                self.slot.deferred.borrow_mut().push(teardown);
            }
        }
    }

    fn flush(&self) {
        if self.slot.deferred.borrow().is_empty() {
            return;
        }
        let Ok(mut gpu) = self.slot.device.try_borrow_mut() else {
            return;
        };
        let parked = self.slot.deferred.take();
        tracing::debug!(count = parked.len(), "running deferred panel teardowns");
        for teardown in parked {
            teardown.run(&mut *gpu);
        }
    }
}

impl<D: GpuDevice> Clone for SharedDevice<D> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<D: GpuDevice> fmt::Debug for SharedDevice<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedDevice")
            .field("pending_releases", &self.pending_releases())
            .finish_non_exhaustive()
    }
}
