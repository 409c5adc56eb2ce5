use crate::error::ResourceError;

/// Layout an image is in, declaring its next use.
///
/// ```text
///   Undefined ──▶ TransferDst ──▶ ShaderReadOnly
///                     ▲                 │
///                     └─────────────────┘
/// ```
///
/// There is no edge back to `Undefined`. `TransferDst -> TransferDst` is
/// accepted so an upload that failed after the first barrier can be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageLayout {
    #[default]
    Undefined,
    TransferDst,
    ShaderReadOnly,
}

impl ImageLayout {
    /// Whether the barrier `self -> to` is legal for panel textures.
    pub fn can_transition_to(self, to: ImageLayout) -> bool {
        matches!(
            (self, to),
            (_, ImageLayout::TransferDst) | (ImageLayout::TransferDst, ImageLayout::ShaderReadOnly)
        )
    }

    /// Validates `self -> to`, returning the pair for the device call.
    pub fn transition(self, to: ImageLayout) -> Result<(ImageLayout, ImageLayout), ResourceError> {
        if self.can_transition_to(to) {
            Ok((self, to))
        } else {
            Err(ResourceError::Transition { from: self, to })
        }
    }

    pub fn is_shader_readable(self) -> bool {
        self == ImageLayout::ShaderReadOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_cycle_is_legal() {
        let (_, layout) = ImageLayout::Undefined
            .transition(ImageLayout::TransferDst)
            .unwrap();
        let (_, layout) = layout.transition(ImageLayout::ShaderReadOnly).unwrap();
        let (_, layout) = layout.transition(ImageLayout::TransferDst).unwrap();
        let (_, layout) = layout.transition(ImageLayout::ShaderReadOnly).unwrap();
        assert!(layout.is_shader_readable());
    }

    #[test]
    fn never_returns_to_undefined() {
        for from in [
            ImageLayout::Undefined,
            ImageLayout::TransferDst,
            ImageLayout::ShaderReadOnly,
        ] {
            assert!(!from.can_transition_to(ImageLayout::Undefined));
        }
    }

    #[test]
    fn cannot_sample_without_upload() {
        let err = ImageLayout::Undefined
            .transition(ImageLayout::ShaderReadOnly)
            .unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Transition {
                from: ImageLayout::Undefined,
                to: ImageLayout::ShaderReadOnly
            }
        ));
        assert!(!ImageLayout::ShaderReadOnly.can_transition_to(ImageLayout::ShaderReadOnly));
    }

    #[test]
    fn failed_upload_may_retry_transfer() {
        assert!(ImageLayout::TransferDst.can_transition_to(ImageLayout::TransferDst));
    }
}
