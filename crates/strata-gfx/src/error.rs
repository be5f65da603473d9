//! Graphics factory error types

use thiserror::Error;

use crate::factory::ResourceId;

/// Errors that can occur during factory operations
#[derive(Error, Debug)]
pub enum GfxError {
    /// The transaction builder signalled failure; all partial resources were destroyed
    #[error("Transaction rejected: {0}")]
    TransactionRejected(String),

    /// A handle referenced a resource the factory does not know about
    #[error("Unknown resource id {0:?}")]
    UnknownResource(ResourceId),

    /// A handle referenced a resource from a group or pool that was already destroyed
    #[error("Resource id {0:?} belongs to a destroyed group")]
    DeadResource(ResourceId),

    /// load/map was attempted on a static buffer or texture
    #[error("Resource id {0:?} is not dynamic")]
    NotDynamic(ResourceId),

    /// Mapped or loaded region exceeds the resource's allocated size
    #[error("Requested {requested} bytes exceeds resource size {size}")]
    RegionOutOfRange { requested: usize, size: usize },

    /// The backend requires a vertex format for shader data bindings
    #[error("This backend requires a vertex format for shader data bindings")]
    VertexFormatRequired,

    /// Pipeline compilation failed
    #[error("Shader pipeline creation failed: {0}")]
    PipelineError(String),

    /// An operation was attempted on an empty (moved-from or dropped) token
    #[error("Token is empty")]
    EmptyToken,
}

/// Result type for factory operations
pub type GfxResult<T> = Result<T, GfxError>;
