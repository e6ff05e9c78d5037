//! Resource usage states.
//!
//! Every buffer and texture carries a [`ResourceState`] tag describing how
//! the GPU last used it. Transition commands compare the tag against the
//! requested state and emit a barrier only when they differ.

/// Usage mode of a GPU resource, relevant to transition barriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ResourceState {
    /// Contents undefined; the initial state of every resource.
    #[default]
    Undefined = 0,
    /// Color render target.
    RenderTarget = 1,
    /// Depth/stencil attachment being written.
    DepthWrite = 2,
    /// Depth/stencil read-only (testing and sampling).
    DepthRead = 3,
    /// Read by shaders (sampled texture, uniform or read-only storage).
    ShaderRead = 4,
    /// Read and written by shaders (storage buffer/texture).
    UnorderedAccess = 5,
    /// Source of a copy.
    CopySrc = 6,
    /// Destination of a copy.
    CopyDst = 7,
    /// Vertex or index input.
    VertexInput = 8,
    /// Indirect argument source.
    IndirectArgument = 9,
    /// Handed to the presentation engine.
    Present = 10,
}

impl ResourceState {
    const ALL: [Self; 11] = [
        Self::Undefined,
        Self::RenderTarget,
        Self::DepthWrite,
        Self::DepthRead,
        Self::ShaderRead,
        Self::UnorderedAccess,
        Self::CopySrc,
        Self::CopyDst,
        Self::VertexInput,
        Self::IndirectArgument,
        Self::Present,
    ];

    /// Decode the raw tag stored in a resource.
    pub fn from_raw(raw: u8) -> Self {
        Self::ALL
            .get(raw as usize)
            .copied()
            .unwrap_or(Self::Undefined)
    }

    /// Returns true if the GPU writes the resource in this state.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::RenderTarget | Self::DepthWrite | Self::UnorderedAccess | Self::CopyDst
        )
    }

    /// Returns true if a barrier is needed to go from `self` to `next`.
    ///
    /// Read-to-same-read needs nothing; any write on either side does.
    pub fn needs_barrier(self, next: Self) -> bool {
        self != next || self.is_write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_round_trip_covers_all_states() {
        for state in ResourceState::ALL {
            assert_eq!(ResourceState::from_raw(state as u8), state);
        }
        assert_eq!(ResourceState::from_raw(200), ResourceState::Undefined);
    }

    #[test]
    fn test_needs_barrier() {
        assert!(!ResourceState::ShaderRead.needs_barrier(ResourceState::ShaderRead));
        assert!(ResourceState::UnorderedAccess.needs_barrier(ResourceState::UnorderedAccess));
        assert!(ResourceState::CopyDst.needs_barrier(ResourceState::ShaderRead));
    }
}
