//! Null (headless) factory backend
//!
//! Implements the full factory contract against an in-memory store with no
//! GPU behind it. Every creation is validated and every destruction is
//! recorded in order, which makes this backend the reference the real GPU
//! backends are tested against, and the one integration tests run on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{GfxError, GfxResult};
use crate::factory::{
    BufferHandle, CommitFn, DataId, FactoryOps, GraphicsDataFactory, MappedBuffer, Platform,
    PoolId, ResourceId, ShaderDataBindingDesc, ShaderDataBindingHandle, ShaderPipelineHandle,
    TextureHandle, TransactionContext, VertexFormatHandle,
};
use crate::token::{BufferPoolToken, GraphicsDataToken};
use crate::types::{
    BufferUse, ShaderPipelineDesc, ShaderSource, TextureFormat, VertexElement,
};

/// What owns a resource's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owner {
    Group(u64),
    Pool(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceKind {
    Buffer,
    Texture,
    VertexFormat,
    Pipeline,
    Binding,
}

struct NullResource {
    kind: ResourceKind,
    owner: Owner,
    dynamic: bool,
    /// Allocated byte size for buffers and textures
    size: usize,
    /// Staging contents for buffers/textures, compiled blob for pipelines
    data: Vec<u8>,
    /// Handles this resource references (vertex formats and bindings)
    refs: Vec<u64>,
}

#[derive(Default)]
struct NullState {
    next_id: u64,
    resources: HashMap<u64, NullResource>,
    /// Group id -> member resource ids in creation order
    groups: HashMap<u64, Vec<u64>>,
    /// Pool id -> live buffer ids in creation order
    pools: HashMap<u64, Vec<u64>>,
    /// Every destroyed resource id, in destruction order
    destroy_log: Vec<ResourceId>,
}

impl NullState {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn resource(&self, id: ResourceId) -> GfxResult<&NullResource> {
        self.resources.get(&id.0).ok_or(GfxError::UnknownResource(id))
    }

    fn destroy_resource(&mut self, id: u64) {
        if self.resources.remove(&id).is_some() {
            self.destroy_log.push(ResourceId(id));
        }
    }

    /// Remove a whole group, warning about dangling references from other
    /// live groups (destroying a group whose resources are still referenced
    /// by a binding elsewhere is a contract violation).
    fn destroy_group(&mut self, group: u64) {
        let Some(members) = self.groups.remove(&group) else {
            return;
        };

        for (id, res) in &self.resources {
            if res.owner == Owner::Group(group) {
                continue;
            }
            for r in &res.refs {
                if members.contains(r) {
                    log::warn!(
                        "Destroying group {} while resource #{} still references member #{}",
                        group,
                        id,
                        r
                    );
                    debug_assert!(false, "group destroyed with live external references");
                }
            }
        }

        for id in members {
            self.destroy_resource(id);
        }
    }
}

struct NullShared {
    state: Mutex<NullState>,
    needs_vertex_format: bool,
}

/// Headless factory implementation
pub struct NullDataFactory {
    shared: Arc<NullShared>,
}

impl NullDataFactory {
    pub fn new() -> Self {
        Self::with_vertex_format_requirement(false)
    }

    /// Build a null factory that mimics an OpenGL-like backend requiring
    /// vertex format objects for bindings; used to exercise both client
    /// paths in tests.
    pub fn with_vertex_format_requirement(needs_vertex_format: bool) -> Self {
        Self {
            shared: Arc::new(NullShared {
                state: Mutex::new(NullState::default()),
                needs_vertex_format,
            }),
        }
    }

    /// Ids of every resource destroyed so far, in destruction order
    pub fn destroy_log(&self) -> Vec<ResourceId> {
        self.shared.state.lock().unwrap().destroy_log.clone()
    }

    /// Whether a handle still resolves to a live resource
    pub fn is_live(&self, id: ResourceId) -> bool {
        self.shared.state.lock().unwrap().resources.contains_key(&id.0)
    }

    /// Number of live resources across all groups and pools
    pub fn live_resource_count(&self) -> usize {
        self.shared.state.lock().unwrap().resources.len()
    }

    /// Current staging contents of a dynamic buffer or texture
    pub fn resource_bytes(&self, id: ResourceId) -> Option<Vec<u8>> {
        self.shared
            .state
            .lock()
            .unwrap()
            .resources
            .get(&id.0)
            .map(|r| r.data.clone())
    }
}

impl Default for NullDataFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Transaction context over the locked store
struct NullTransaction<'a> {
    state: &'a mut NullState,
    group: u64,
    created: Vec<u64>,
    needs_vertex_format: bool,
}

impl NullTransaction<'_> {
    fn insert(&mut self, res: NullResource) -> u64 {
        let id = self.state.alloc_id();
        self.state.resources.insert(id, res);
        self.created.push(id);
        id
    }

    fn check_ref(&self, id: ResourceId, kind: ResourceKind) -> GfxResult<()> {
        let res = self.state.resource(id)?;
        if res.kind != kind {
            return Err(GfxError::UnknownResource(id));
        }
        Ok(())
    }
}

impl TransactionContext for NullTransaction<'_> {
    fn platform(&self) -> Platform {
        Platform::Null
    }

    fn platform_name(&self) -> &'static str {
        "Null"
    }

    fn new_static_buffer(
        &mut self,
        _use: BufferUse,
        data: &[u8],
        stride: usize,
        count: usize,
    ) -> GfxResult<BufferHandle> {
        let size = stride * count;
        if data.len() < size {
            return Err(GfxError::RegionOutOfRange {
                requested: size,
                size: data.len(),
            });
        }
        let id = self.insert(NullResource {
            kind: ResourceKind::Buffer,
            owner: Owner::Group(self.group),
            dynamic: false,
            size,
            data: data[..size].to_vec(),
            refs: Vec::new(),
        });
        Ok(BufferHandle(ResourceId(id)))
    }

    fn new_dynamic_buffer(
        &mut self,
        _use: BufferUse,
        stride: usize,
        count: usize,
    ) -> GfxResult<BufferHandle> {
        let size = stride * count;
        let id = self.insert(NullResource {
            kind: ResourceKind::Buffer,
            owner: Owner::Group(self.group),
            dynamic: true,
            size,
            data: vec![0; size],
            refs: Vec::new(),
        });
        Ok(BufferHandle(ResourceId(id)))
    }

    fn new_static_texture(
        &mut self,
        width: usize,
        height: usize,
        _mips: usize,
        fmt: TextureFormat,
        data: &[u8],
    ) -> GfxResult<TextureHandle> {
        let _ = (width, height, fmt);
        let id = self.insert(NullResource {
            kind: ResourceKind::Texture,
            owner: Owner::Group(self.group),
            dynamic: false,
            size: data.len(),
            data: data.to_vec(),
            refs: Vec::new(),
        });
        Ok(TextureHandle(ResourceId(id)))
    }

    fn new_static_array_texture(
        &mut self,
        width: usize,
        height: usize,
        layers: usize,
        _mips: usize,
        fmt: TextureFormat,
        data: &[u8],
    ) -> GfxResult<TextureHandle> {
        let _ = (width, height, layers, fmt);
        let id = self.insert(NullResource {
            kind: ResourceKind::Texture,
            owner: Owner::Group(self.group),
            dynamic: false,
            size: data.len(),
            data: data.to_vec(),
            refs: Vec::new(),
        });
        Ok(TextureHandle(ResourceId(id)))
    }

    fn new_dynamic_texture(
        &mut self,
        width: usize,
        height: usize,
        fmt: TextureFormat,
    ) -> GfxResult<TextureHandle> {
        let size = width * height * fmt.bytes_per_pixel();
        let id = self.insert(NullResource {
            kind: ResourceKind::Texture,
            owner: Owner::Group(self.group),
            dynamic: true,
            size,
            data: vec![0; size],
            refs: Vec::new(),
        });
        Ok(TextureHandle(ResourceId(id)))
    }

    fn new_render_texture(
        &mut self,
        width: usize,
        height: usize,
        _color_sampleable: bool,
        _depth_sampleable: bool,
    ) -> GfxResult<TextureHandle> {
        let size = width * height * 4;
        let id = self.insert(NullResource {
            kind: ResourceKind::Texture,
            owner: Owner::Group(self.group),
            dynamic: false,
            size,
            data: Vec::new(),
            refs: Vec::new(),
        });
        Ok(TextureHandle(ResourceId(id)))
    }

    fn binding_needs_vertex_format(&self) -> bool {
        self.needs_vertex_format
    }

    fn new_vertex_format(
        &mut self,
        elements: &[VertexElement],
        _base_vertex: usize,
        _base_instance: usize,
    ) -> GfxResult<VertexFormatHandle> {
        let mut refs = Vec::with_capacity(elements.len());
        for elem in elements {
            self.check_ref(elem.vert_buffer.id(), ResourceKind::Buffer)?;
            refs.push(elem.vert_buffer.id().0);
        }
        let id = self.insert(NullResource {
            kind: ResourceKind::VertexFormat,
            owner: Owner::Group(self.group),
            dynamic: false,
            size: 0,
            data: Vec::new(),
            refs,
        });
        Ok(VertexFormatHandle(ResourceId(id)))
    }

    fn new_shader_pipeline(
        &mut self,
        desc: ShaderPipelineDesc,
    ) -> GfxResult<ShaderPipelineHandle> {
        if let Some(fmt) = desc.vertex_format {
            self.check_ref(fmt.id(), ResourceKind::VertexFormat)?;
        }
        // The null "compiler" just concatenates both stages into the blob.
        let mut blob = Vec::new();
        for src in [&desc.vertex, &desc.fragment] {
            match src {
                ShaderSource::Text(text) => blob.extend_from_slice(text.as_bytes()),
                ShaderSource::Blob(bytes) => blob.extend_from_slice(bytes),
            }
        }
        let id = self.insert(NullResource {
            kind: ResourceKind::Pipeline,
            owner: Owner::Group(self.group),
            dynamic: false,
            size: blob.len(),
            data: blob,
            refs: desc.vertex_format.map(|f| f.id().0).into_iter().collect(),
        });
        Ok(ShaderPipelineHandle(ResourceId(id)))
    }

    fn pipeline_blob(&self, pipeline: ShaderPipelineHandle) -> Option<Vec<u8>> {
        self.state
            .resources
            .get(&pipeline.id().0)
            .filter(|r| r.kind == ResourceKind::Pipeline)
            .map(|r| r.data.clone())
    }

    fn new_shader_data_binding(
        &mut self,
        desc: ShaderDataBindingDesc,
    ) -> GfxResult<ShaderDataBindingHandle> {
        if self.needs_vertex_format && desc.vertex_format.is_none() {
            return Err(GfxError::VertexFormatRequired);
        }

        let mut refs = Vec::new();
        self.check_ref(desc.pipeline.id(), ResourceKind::Pipeline)?;
        refs.push(desc.pipeline.id().0);
        if let Some(fmt) = desc.vertex_format {
            self.check_ref(fmt.id(), ResourceKind::VertexFormat)?;
            refs.push(fmt.id().0);
        }
        for buf in [desc.vbo, desc.instance_vbo, desc.ibo].into_iter().flatten() {
            self.check_ref(buf.id(), ResourceKind::Buffer)?;
            refs.push(buf.id().0);
        }
        for ubuf in &desc.uniforms {
            self.check_ref(ubuf.buffer.id(), ResourceKind::Buffer)?;
            if let (Some(off), Some(sz)) = (ubuf.offset, ubuf.size) {
                let res = self.state.resource(ubuf.buffer.id())?;
                if off + sz > res.size {
                    return Err(GfxError::RegionOutOfRange {
                        requested: off + sz,
                        size: res.size,
                    });
                }
            }
            refs.push(ubuf.buffer.id().0);
        }
        for tex in &desc.textures {
            self.check_ref(tex.id(), ResourceKind::Texture)?;
            refs.push(tex.id().0);
        }

        let id = self.insert(NullResource {
            kind: ResourceKind::Binding,
            owner: Owner::Group(self.group),
            dynamic: false,
            size: 0,
            data: Vec::new(),
            refs,
        });
        Ok(ShaderDataBindingHandle(ResourceId(id)))
    }
}

impl GraphicsDataFactory for NullDataFactory {
    fn platform(&self) -> Platform {
        Platform::Null
    }

    fn platform_name(&self) -> &'static str {
        "Null"
    }

    fn commit_transaction(&self, builder: &mut CommitFn<'_>) -> GfxResult<GraphicsDataToken> {
        let mut state = self.shared.state.lock().unwrap();
        let group = state.alloc_id();

        let mut ctx = NullTransaction {
            state: &mut *state,
            group,
            created: Vec::new(),
            needs_vertex_format: self.shared.needs_vertex_format,
        };

        let result = builder(&mut ctx);
        let created = std::mem::take(&mut ctx.created);

        match result {
            Ok(()) => {
                state.groups.insert(group, created);
                Ok(GraphicsDataToken::new(
                    self.shared.clone(),
                    DataId(group),
                ))
            }
            Err(err) => {
                let rolled_back = created.len();
                for id in created {
                    state.destroy_resource(id);
                }
                log::debug!("Transaction rejected, {} resource(s) rolled back: {}", rolled_back, err);
                Err(err)
            }
        }
    }

    fn new_buffer_pool(&self) -> GfxResult<BufferPoolToken> {
        let mut state = self.shared.state.lock().unwrap();
        let pool = state.alloc_id();
        state.pools.insert(pool, Vec::new());
        Ok(BufferPoolToken::new(
            self.shared.clone(),
            PoolId(pool),
        ))
    }

    fn load_dynamic_buffer(&self, buf: BufferHandle, data: &[u8]) -> GfxResult<()> {
        self.shared.load_dynamic(buf.id(), data)
    }

    fn map_dynamic_buffer(&self, buf: BufferHandle, len: usize) -> GfxResult<MappedBuffer> {
        self.shared.map_dynamic(buf.id(), len)
    }

    fn load_dynamic_texture(&self, tex: TextureHandle, data: &[u8]) -> GfxResult<()> {
        self.shared.load_dynamic(tex.id(), data)
    }

    fn map_dynamic_texture(&self, tex: TextureHandle, len: usize) -> GfxResult<MappedBuffer> {
        self.shared.map_dynamic(tex.id(), len)
    }
}

impl NullShared {
    fn load_dynamic(&self, id: ResourceId, data: &[u8]) -> GfxResult<()> {
        let mut state = self.state.lock().unwrap();
        let res = state
            .resources
            .get_mut(&id.0)
            .ok_or(GfxError::UnknownResource(id))?;
        if !res.dynamic {
            return Err(GfxError::NotDynamic(id));
        }
        if data.len() > res.size {
            return Err(GfxError::RegionOutOfRange {
                requested: data.len(),
                size: res.size,
            });
        }
        res.data[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn map_dynamic(self: &Arc<Self>, id: ResourceId, len: usize) -> GfxResult<MappedBuffer> {
        let state = self.state.lock().unwrap();
        let res = state
            .resources
            .get(&id.0)
            .ok_or(GfxError::UnknownResource(id))?;
        if !res.dynamic {
            return Err(GfxError::NotDynamic(id));
        }
        if len > res.size {
            return Err(GfxError::RegionOutOfRange {
                requested: len,
                size: res.size,
            });
        }
        drop(state);
        Ok(MappedBuffer::new(
            self.clone(),
            id,
            len,
        ))
    }
}

impl FactoryOps for NullShared {
    fn destroy_data(&self, data: DataId) {
        let mut state = self.state.lock().unwrap();
        state.destroy_group(data.0);
    }

    fn destroy_pool(&self, pool: PoolId) {
        let mut state = self.state.lock().unwrap();
        if let Some(bufs) = state.pools.remove(&pool.0) {
            for id in bufs {
                state.destroy_resource(id);
            }
        }
    }

    fn new_pool_buffer(
        &self,
        pool: PoolId,
        _use: BufferUse,
        stride: usize,
        count: usize,
    ) -> GfxResult<BufferHandle> {
        let mut state = self.state.lock().unwrap();
        if !state.pools.contains_key(&pool.0) {
            return Err(GfxError::EmptyToken);
        }
        let size = stride * count;
        let id = state.alloc_id();
        state.resources.insert(
            id,
            NullResource {
                kind: ResourceKind::Buffer,
                owner: Owner::Pool(pool.0),
                dynamic: true,
                size,
                data: vec![0; size],
                refs: Vec::new(),
            },
        );
        state.pools.get_mut(&pool.0).unwrap().push(id);
        Ok(BufferHandle(ResourceId(id)))
    }

    fn delete_pool_buffer(&self, pool: PoolId, buf: BufferHandle) {
        let mut state = self.state.lock().unwrap();
        if let Some(bufs) = state.pools.get_mut(&pool.0) {
            bufs.retain(|id| *id != buf.id().0);
        }
        state.destroy_resource(buf.id().0);
    }

    fn unmap(&self, resource: ResourceId, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        if let Some(res) = state.resources.get_mut(&resource.0) {
            let len = data.len().min(res.size);
            res.data[..len].copy_from_slice(&data[..len]);
        }
    }
}
