//! Transaction and token lifecycle tests against the null backend

use strata_gfx::{
    BlendFactor, BufferUse, CullMode, GfxError, GraphicsDataFactory, NullDataFactory,
    PipelineStage, Primitive, ShaderDataBindingDesc, ShaderPipelineDesc, ShaderSource,
    TextureFormat, TransactionContext, UniformBinding, VertexElement, VertexSemantic,
};

fn simple_pipeline_desc() -> ShaderPipelineDesc {
    ShaderPipelineDesc {
        vertex: ShaderSource::Text("void main() {}".into()),
        fragment: ShaderSource::Text("void main() {}".into()),
        vertex_format: None,
        src_factor: BlendFactor::SrcAlpha,
        dst_factor: BlendFactor::InvSrcAlpha,
        primitive: Primitive::Triangles,
        depth_test: true,
        depth_write: true,
        cull: CullMode::Backface,
    }
}

#[test]
fn test_commit_then_drop_destroys_every_resource_once() {
    let factory = NullDataFactory::new();
    let vert_data = vec![0u8; 16 * 3];

    let mut handles = Vec::new();
    let token = factory
        .commit_transaction(&mut |ctx| {
            for _ in 0..10 {
                handles.push(ctx.new_static_buffer(BufferUse::Vertex, &vert_data, 16, 3)?);
            }
            Ok(())
        })
        .unwrap();

    assert_eq!(factory.live_resource_count(), 10);
    for h in &handles {
        assert!(factory.is_live(h.id()));
    }

    drop(token);

    // Exactly ten destroy calls, and no handle resolves any more.
    assert_eq!(factory.destroy_log().len(), 10);
    assert_eq!(factory.live_resource_count(), 0);
    for h in &handles {
        assert!(!factory.is_live(h.id()));
    }
}

#[test]
fn test_rejected_transaction_rolls_back_partial_resources() {
    let factory = NullDataFactory::new();
    let data = vec![0u8; 64];

    let result = factory.commit_transaction(&mut |ctx| {
        ctx.new_static_buffer(BufferUse::Vertex, &data, 16, 4)?;
        ctx.new_static_buffer(BufferUse::Index, &data, 4, 16)?;
        Err(GfxError::TransactionRejected("builder bailed".into()))
    });

    assert!(result.is_err());
    assert_eq!(factory.live_resource_count(), 0);
    assert_eq!(factory.destroy_log().len(), 2);
}

#[test]
fn test_creation_failure_inside_builder_rolls_back() {
    let factory = NullDataFactory::new();
    let data = vec![0u8; 8];

    // Second creation under-supplies data and fails; the first must not survive.
    let result = factory.commit_transaction(&mut |ctx| {
        ctx.new_static_buffer(BufferUse::Vertex, &data, 8, 1)?;
        ctx.new_static_buffer(BufferUse::Vertex, &data, 16, 4)?;
        Ok(())
    });

    assert!(result.is_err());
    assert_eq!(factory.live_resource_count(), 0);
}

#[test]
fn test_pool_lifecycle() {
    let factory = NullDataFactory::new();
    let pool = factory.new_buffer_pool().unwrap();

    let a = pool.new_pool_buffer(BufferUse::Uniform, 64, 1).unwrap();
    let b = pool.new_pool_buffer(BufferUse::Uniform, 64, 1).unwrap();
    let c = pool.new_pool_buffer(BufferUse::Uniform, 64, 1).unwrap();
    assert_eq!(factory.live_resource_count(), 3);

    // One destroy at delete time...
    pool.delete_pool_buffer(b);
    assert_eq!(factory.destroy_log().len(), 1);
    assert!(factory.is_live(a.id()));
    assert!(!factory.is_live(b.id()));
    assert!(factory.is_live(c.id()));

    // ...and the remaining two at pool drop.
    drop(pool);
    assert_eq!(factory.destroy_log().len(), 3);
    assert_eq!(factory.live_resource_count(), 0);
}

#[test]
fn test_dynamic_buffer_load_and_map() {
    let factory = NullDataFactory::new();
    let mut handle = None;
    let _token = factory
        .commit_transaction(&mut |ctx| {
            handle = Some(ctx.new_dynamic_buffer(BufferUse::Uniform, 4, 8)?);
            Ok(())
        })
        .unwrap();
    let buf = handle.unwrap();

    factory.load_dynamic_buffer(buf, &[1, 2, 3, 4]).unwrap();
    assert_eq!(
        factory.resource_bytes(buf.id()).unwrap()[..4],
        [1, 2, 3, 4]
    );

    {
        let mut mapped = factory.map_dynamic_buffer(buf, 8).unwrap();
        mapped[..2].copy_from_slice(&[9, 9]);
    }
    assert_eq!(factory.resource_bytes(buf.id()).unwrap()[..2], [9, 9]);

    // Oversized requests are rejected.
    assert!(factory.map_dynamic_buffer(buf, 4096).is_err());
}

#[test]
fn test_static_buffer_rejects_load() {
    let factory = NullDataFactory::new();
    let data = vec![0u8; 32];
    let mut handle = None;
    let _token = factory
        .commit_transaction(&mut |ctx| {
            handle = Some(ctx.new_static_buffer(BufferUse::Vertex, &data, 32, 1)?);
            Ok(())
        })
        .unwrap();

    assert!(matches!(
        factory.load_dynamic_buffer(handle.unwrap(), &[0]),
        Err(GfxError::NotDynamic(_))
    ));
}

#[test]
fn test_full_binding_transaction() {
    let factory = NullDataFactory::new();
    let verts = vec![0u8; 24 * 4];
    let indices = vec![0u8; 2 * 6];
    let pixels = vec![0u8; 4 * 4 * 4];

    let token = factory
        .commit_transaction(&mut |ctx| {
            let vbo = ctx.new_static_buffer(BufferUse::Vertex, &verts, 24, 4)?;
            let ibo = ctx.new_static_buffer(BufferUse::Index, &indices, 2, 6)?;
            let ubo = ctx.new_dynamic_buffer(BufferUse::Uniform, 64, 1)?;
            let tex = ctx.new_static_texture(4, 4, 1, TextureFormat::Rgba8, &pixels)?;
            let pipeline = ctx.new_shader_pipeline(simple_pipeline_desc())?;

            assert!(ctx.pipeline_blob(pipeline).is_some());

            // This backend bakes the layout into the pipeline; no vertex
            // format object is needed.
            assert!(!ctx.binding_needs_vertex_format());

            let mut desc = ShaderDataBindingDesc::new(pipeline);
            desc.vbo = Some(vbo);
            desc.ibo = Some(ibo);
            desc.uniforms = vec![UniformBinding::whole(ubo, PipelineStage::Vertex)];
            desc.textures = vec![tex];
            ctx.new_shader_data_binding(desc)?;
            Ok(())
        })
        .unwrap();

    assert_eq!(factory.live_resource_count(), 6);
    drop(token);
    assert_eq!(factory.live_resource_count(), 0);
}

#[test]
fn test_vertex_format_required_backend() {
    let factory = NullDataFactory::with_vertex_format_requirement(true);
    let verts = vec![0u8; 12 * 3];

    let result = factory.commit_transaction(&mut |ctx| {
        assert!(ctx.binding_needs_vertex_format());
        let vbo = ctx.new_static_buffer(BufferUse::Vertex, &verts, 12, 3)?;
        let pipeline = ctx.new_shader_pipeline(simple_pipeline_desc())?;

        // Omitting the vertex format on a backend that needs one is an error.
        let mut desc = ShaderDataBindingDesc::new(pipeline);
        desc.vbo = Some(vbo);
        let err = ctx.new_shader_data_binding(desc.clone());
        assert!(matches!(err, Err(GfxError::VertexFormatRequired)));

        let fmt = ctx.new_vertex_format(
            &[VertexElement::new(vbo, VertexSemantic::Position3)],
            0,
            0,
        )?;
        desc.vertex_format = Some(fmt);
        ctx.new_shader_data_binding(desc)?;
        Ok(())
    });

    assert!(result.is_ok());
}
