//! Common graphics enums and descriptor types
//!
//! These are the backend-agnostic vocabulary types shared by every factory
//! implementation. Backends translate them into native API state.

use crate::factory::{BufferHandle, VertexFormatHandle};

/// Supported buffer uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUse {
    Null,
    Vertex,
    Index,
    Uniform,
}

/// Texture storage classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureType {
    Static,
    StaticArray,
    Dynamic,
    Render,
}

/// Supported texture formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8,
    I8,
    Dxt1,
    Pvrtc4,
}

impl TextureFormat {
    /// Bytes per pixel for uncompressed formats, block size estimate otherwise
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            TextureFormat::Rgba8 => 4,
            TextureFormat::I8 => 1,
            // Compressed formats average below 1 byte/pixel; callers size
            // uploads from the source data, not from this.
            TextureFormat::Dxt1 | TextureFormat::Pvrtc4 => 1,
        }
    }
}

/// Types of vertex attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexSemantic {
    Position3,
    Position4,
    Normal3,
    Normal4,
    Color,
    ColorUNorm,
    Uv2,
    Uv4,
    Weight,
    ModelView,
}

/// One element of a vertex format
///
/// `instanced` marks the attribute as advancing per-instance rather than
/// per-vertex.
#[derive(Debug, Clone, Copy)]
pub struct VertexElement {
    pub vert_buffer: BufferHandle,
    pub semantic: VertexSemantic,
    pub semantic_idx: u32,
    pub instanced: bool,
}

impl VertexElement {
    pub fn new(vert_buffer: BufferHandle, semantic: VertexSemantic) -> Self {
        Self {
            vert_buffer,
            semantic,
            semantic_idx: 0,
            instanced: false,
        }
    }

    pub fn with_index(mut self, idx: u32) -> Self {
        self.semantic_idx = idx;
        self
    }

    pub fn instanced(mut self) -> Self {
        self.instanced = true;
        self
    }
}

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Triangles,
    TriStrips,
}

/// Face culling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Backface,
    Frontface,
}

/// Blend factors for source and destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    DstColor,
    InvDstColor,
    SrcAlpha,
    InvSrcAlpha,
    DstAlpha,
    InvDstAlpha,
}

/// Pipeline stage a uniform buffer is bound for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Vertex,
    Fragment,
}

/// Shader program input, either source text or a precompiled blob
#[derive(Debug, Clone)]
pub enum ShaderSource {
    /// Source text compiled by the backend (GLSL, MSL, HLSL as appropriate)
    Text(String),
    /// Precompiled backend-specific blob (SPIR-V, DXBC, metallib)
    Blob(Vec<u8>),
}

/// Full pipeline state description
#[derive(Debug, Clone)]
pub struct ShaderPipelineDesc {
    pub vertex: ShaderSource,
    pub fragment: ShaderSource,
    /// Required on backends where the layout is baked into the pipeline;
    /// query [`binding_needs_vertex_format`] to know which side owns it.
    ///
    /// [`binding_needs_vertex_format`]: crate::factory::TransactionContext::binding_needs_vertex_format
    pub vertex_format: Option<VertexFormatHandle>,
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub primitive: Primitive,
    pub depth_test: bool,
    pub depth_write: bool,
    pub cull: CullMode,
}

/// One uniform-buffer slot of a shader data binding
#[derive(Debug, Clone, Copy)]
pub struct UniformBinding {
    pub buffer: BufferHandle,
    pub stage: PipelineStage,
    /// Byte offset into the buffer; `None` binds from the start
    pub offset: Option<usize>,
    /// Bound size in bytes; `None` binds the remainder
    pub size: Option<usize>,
}

impl UniformBinding {
    pub fn whole(buffer: BufferHandle, stage: PipelineStage) -> Self {
        Self {
            buffer,
            stage,
            offset: None,
            size: None,
        }
    }
}
