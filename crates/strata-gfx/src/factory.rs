//! The graphics data factory contract
//!
//! A factory batches GPU resource creation into atomic transactions. The
//! client opens a transaction, creates any number of resources through the
//! [`TransactionContext`], and receives a [`GraphicsDataToken`] owning the
//! whole group on commit. Dropping the token destroys every resource in the
//! group. A parallel pool API ([`BufferPoolToken`]) yields individually
//! deletable dynamic buffers grouped under a pool lifetime.
//!
//! Backends (OpenGL, Vulkan, Metal, D3D, or the in-tree null backend)
//! implement [`GraphicsDataFactory`] plus the [`FactoryOps`] hooks the
//! tokens drive on drop. Resource handles are plain ids the owning backend
//! resolves internally; they carry no backend pointers and are meaningless
//! outside the factory that minted them.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::error::GfxResult;
use crate::token::{BufferPoolToken, GraphicsDataToken};
use crate::types::{
    BufferUse, ShaderPipelineDesc, TextureFormat, UniformBinding, VertexElement,
};

/// Rendering platform a factory targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Null,
    OpenGl,
    D3D11,
    D3D12,
    Metal,
    Vulkan,
    Gx,
    Gx2,
}

/// Raw per-factory resource id; unique across all resource kinds
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(pub u64);

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

macro_rules! handle_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub ResourceId);

        impl $name {
            pub fn id(&self) -> ResourceId {
                self.0
            }
        }
    };
}

handle_type!(
    /// A static or dynamic GPU buffer (vertex, index, or uniform)
    BufferHandle
);
handle_type!(
    /// A texture of any storage class
    TextureHandle
);
handle_type!(
    /// An opaque vertex data layout object
    VertexFormatHandle
);
handle_type!(
    /// A compiled rasterization pipeline state
    ShaderPipelineHandle
);
handle_type!(
    /// An indirection table binding a pipeline to its resources
    ShaderDataBindingHandle
);

/// Id of a committed resource group, owned by a [`GraphicsDataToken`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataId(pub u64);

/// Id of a buffer pool, owned by a [`BufferPoolToken`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(pub u64);

/// Everything a shader data binding references
///
/// Bindings may only reference resources belonging to a live group or pool
/// of the same factory; backends are free to validate this at creation.
#[derive(Debug, Clone)]
pub struct ShaderDataBindingDesc {
    pub pipeline: ShaderPipelineHandle,
    /// Required when [`TransactionContext::binding_needs_vertex_format`]
    /// reports true; ignored by backends that bake the layout into the
    /// pipeline, but passing one there is not an error.
    pub vertex_format: Option<VertexFormatHandle>,
    pub vbo: Option<BufferHandle>,
    pub instance_vbo: Option<BufferHandle>,
    pub ibo: Option<BufferHandle>,
    pub uniforms: Vec<UniformBinding>,
    pub textures: Vec<TextureHandle>,
    pub base_vertex: usize,
    pub base_instance: usize,
}

impl ShaderDataBindingDesc {
    pub fn new(pipeline: ShaderPipelineHandle) -> Self {
        Self {
            pipeline,
            vertex_format: None,
            vbo: None,
            instance_vbo: None,
            ibo: None,
            uniforms: Vec::new(),
            textures: Vec::new(),
            base_vertex: 0,
            base_instance: 0,
        }
    }
}

/// Resource creation surface available inside a transaction
///
/// All resources created through one context become visible to the GPU
/// atomically when the transaction commits, and are destroyed together when
/// the resulting token drops. Creation failures should be propagated out of
/// the builder; the factory destroys all partially created resources when a
/// transaction is rejected.
pub trait TransactionContext {
    fn platform(&self) -> Platform;
    fn platform_name(&self) -> &'static str;

    /// Create a buffer filled once from `data`
    fn new_static_buffer(
        &mut self,
        use_: BufferUse,
        data: &[u8],
        stride: usize,
        count: usize,
    ) -> GfxResult<BufferHandle>;

    /// Create a buffer refilled per-frame via load/map on the factory
    fn new_dynamic_buffer(
        &mut self,
        use_: BufferUse,
        stride: usize,
        count: usize,
    ) -> GfxResult<BufferHandle>;

    fn new_static_texture(
        &mut self,
        width: usize,
        height: usize,
        mips: usize,
        fmt: TextureFormat,
        data: &[u8],
    ) -> GfxResult<TextureHandle>;

    fn new_static_array_texture(
        &mut self,
        width: usize,
        height: usize,
        layers: usize,
        mips: usize,
        fmt: TextureFormat,
        data: &[u8],
    ) -> GfxResult<TextureHandle>;

    fn new_dynamic_texture(
        &mut self,
        width: usize,
        height: usize,
        fmt: TextureFormat,
    ) -> GfxResult<TextureHandle>;

    /// Create a render target; the two flags declare whether the color and
    /// depth attachments are sampleable from shaders afterwards
    fn new_render_texture(
        &mut self,
        width: usize,
        height: usize,
        color_sampleable: bool,
        depth_sampleable: bool,
    ) -> GfxResult<TextureHandle>;

    /// Whether [`Self::new_shader_data_binding`] requires a vertex format
    ///
    /// OpenGL-like backends cache layout objects up front and return true;
    /// Metal/Vulkan-like backends bake the layout into the pipeline and
    /// return false. Clients query this and skip vertex-format creation
    /// where unused.
    fn binding_needs_vertex_format(&self) -> bool;

    fn new_vertex_format(
        &mut self,
        elements: &[VertexElement],
        base_vertex: usize,
        base_instance: usize,
    ) -> GfxResult<VertexFormatHandle>;

    fn new_shader_pipeline(
        &mut self,
        desc: ShaderPipelineDesc,
    ) -> GfxResult<ShaderPipelineHandle>;

    /// Retrieve the backend-compiled blob of a pipeline created in this
    /// transaction, for caching. `None` when the backend does not produce one.
    fn pipeline_blob(&self, pipeline: ShaderPipelineHandle) -> Option<Vec<u8>>;

    fn new_shader_data_binding(
        &mut self,
        desc: ShaderDataBindingDesc,
    ) -> GfxResult<ShaderDataBindingHandle>;
}

/// A transaction builder
pub type CommitFn<'a> = dyn FnMut(&mut dyn TransactionContext) -> GfxResult<()> + 'a;

/// Factory object creating batches of resources under lifetime tokens
pub trait GraphicsDataFactory: Send + Sync {
    fn platform(&self) -> Platform;
    fn platform_name(&self) -> &'static str;

    /// Run `builder` against a fresh transaction context
    ///
    /// If the builder returns `Ok`, every resource it created is finalized
    /// as one group and the returned token owns them all. If it returns
    /// `Err`, all resources created in the transaction are destroyed and
    /// the error is passed through.
    fn commit_transaction(&self, builder: &mut CommitFn<'_>) -> GfxResult<GraphicsDataToken>;

    /// Create an empty pool of individually deletable dynamic buffers
    fn new_buffer_pool(&self) -> GfxResult<BufferPoolToken>;

    /// Replace the full contents of a dynamic buffer
    fn load_dynamic_buffer(&self, buf: BufferHandle, data: &[u8]) -> GfxResult<()>;

    /// Map `len` bytes of a dynamic buffer for writing
    ///
    /// The mapped region is written back when the guard drops; it must be
    /// released before the next draw that consumes the buffer.
    fn map_dynamic_buffer(&self, buf: BufferHandle, len: usize) -> GfxResult<MappedBuffer>;

    /// Replace the full contents of a dynamic texture
    fn load_dynamic_texture(&self, tex: TextureHandle, data: &[u8]) -> GfxResult<()>;

    /// Map `len` bytes of a dynamic texture for writing
    fn map_dynamic_texture(&self, tex: TextureHandle, len: usize) -> GfxResult<MappedBuffer>;
}

/// Destruction and pool hooks driven by lifetime tokens
///
/// Implemented by backends alongside [`GraphicsDataFactory`]; clients never
/// call these directly. Tokens hold an `Arc<dyn FactoryOps>` so a group can
/// outlive the factory handle that created it.
pub trait FactoryOps: Send + Sync {
    /// Destroy every resource of a committed group, in backend-defined order
    fn destroy_data(&self, data: DataId);

    /// Destroy a pool and every buffer still alive inside it
    fn destroy_pool(&self, pool: PoolId);

    /// Create a dynamic buffer inside a live pool
    fn new_pool_buffer(
        &self,
        pool: PoolId,
        use_: BufferUse,
        stride: usize,
        count: usize,
    ) -> GfxResult<BufferHandle>;

    /// Destroy one pool buffer ahead of the pool itself
    fn delete_pool_buffer(&self, pool: PoolId, buf: BufferHandle);

    /// Write back a mapped region; called by [`MappedBuffer`] on drop
    fn unmap(&self, resource: ResourceId, data: &[u8]);
}

/// Scoped write mapping of a dynamic buffer or texture
///
/// Dereferences to the staging bytes; the contents are handed to the backend
/// when the guard drops.
pub struct MappedBuffer {
    data: Vec<u8>,
    resource: ResourceId,
    ops: Arc<dyn FactoryOps>,
}

impl MappedBuffer {
    pub fn new(ops: Arc<dyn FactoryOps>, resource: ResourceId, len: usize) -> Self {
        Self {
            data: vec![0; len],
            resource,
            ops,
        }
    }
}

impl Deref for MappedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for MappedBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for MappedBuffer {
    fn drop(&mut self) {
        self.ops.unmap(self.resource, &self.data);
    }
}
