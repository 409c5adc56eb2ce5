use crate::gpu::ImageLayout;

/// Kind of GPU object involved in a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Buffer,
    Memory,
    Image,
    ImageView,
    DescriptorSet,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Buffer => f.write_str("buffer"),
            ResourceKind::Memory => f.write_str("memory"),
            ResourceKind::Image => f.write_str("image"),
            ResourceKind::ImageView => f.write_str("image view"),
            ResourceKind::DescriptorSet => f.write_str("descriptor set"),
        }
    }
}

/// Failure raised by the GPU layer while allocating, copying or transitioning.
///
/// Lookup misses (no panel or region under the cursor) are not errors and are
/// reported as `None` by the manager instead.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("failed to allocate {kind}: {reason}")]
    Allocation { kind: ResourceKind, reason: String },
    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: ResourceKind, id: u64 },
    #[error("memory {id} is not host visible and cannot be mapped")]
    NotHostVisible { id: u64 },
    #[error("payload of {actual} bytes does not fit {kind} of {capacity} bytes")]
    SizeMismatch {
        kind: ResourceKind,
        actual: u64,
        capacity: u64,
    },
    #[error("copy failed: {0}")]
    Copy(String),
    #[error("command submission failed: {0}")]
    Submission(String),
    #[error("illegal image layout transition {from:?} -> {to:?}")]
    Transition { from: ImageLayout, to: ImageLayout },
    #[error("panel resources have already been released")]
    Released,
}

impl ResourceError {
    pub(crate) fn allocation(kind: ResourceKind, reason: impl Into<String>) -> Self {
        Self::Allocation {
            kind,
            reason: reason.into(),
        }
    }
}
