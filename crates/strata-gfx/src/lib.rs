//! Strata graphics resource factory
//!
//! Backend-agnostic GPU resource management built around two ideas:
//!
//! - **Transactions**: resource creation is batched through a builder
//!   closure and committed atomically; either every resource in the batch
//!   becomes usable together or none of them exist.
//! - **Lifetime tokens**: each committed batch is owned by a move-only
//!   token whose drop destroys the whole group at once. Pools provide the
//!   same ownership shape for individually deletable dynamic buffers.
//!
//! The actual GPU command recording lives in backend crates implementing
//! [`GraphicsDataFactory`] and [`FactoryOps`]; this crate ships the
//! contract plus the headless [`NullDataFactory`] used for testing.

mod error;
pub mod factory;
mod null;
mod token;
pub mod types;

pub use error::{GfxError, GfxResult};
pub use factory::{
    BufferHandle, DataId, FactoryOps, GraphicsDataFactory, MappedBuffer, Platform, PoolId,
    ResourceId, ShaderDataBindingDesc, ShaderDataBindingHandle, ShaderPipelineHandle,
    TextureHandle, TransactionContext, VertexFormatHandle,
};
pub use null::NullDataFactory;
pub use token::{BufferPoolToken, GraphicsDataToken};
pub use types::{
    BlendFactor, BufferUse, CullMode, PipelineStage, Primitive, ShaderPipelineDesc, ShaderSource,
    TextureFormat, TextureType, UniformBinding, VertexElement, VertexSemantic,
};
