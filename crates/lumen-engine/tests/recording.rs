mod common;

use lumen_engine::EngineError;
use lumen_engine::backend::sim::{SimBackend, SimConfig};
use lumen_engine::command::Command;
use lumen_engine::coords::{Color, Extent, ScissorRect};
use lumen_engine::device::{Device, DeviceConfig};
use lumen_engine::pipeline::{GraphicsPipelineDesc, PipelineInfo, PrimitiveTopology, ShaderDesc, ShaderStage};
use lumen_engine::resource::{
    AccessPattern, BufferDesc, Format, ResourceState, TextureDesc, TextureViews,
};
use lumen_engine::space::{PipelineResourceLayout, ResourceSpaceBuilder, SpaceId};

fn target_info(tri: &common::Triangle, device: &Device<SimBackend>) -> PipelineInfo {
    PipelineInfo {
        pipeline: Some(tri.pipeline),
        render_targets: vec![device.current_back_buffer()],
        depth_stencil_target: None,
    }
}

// ── triangle scenario ─────────────────────────────────────────────────────

#[test]
fn triangle_frame_draws_once_between_back_buffer_transitions() {
    let mut device = common::immediate();
    let mut gfx = device.create_graphics_context();
    let tri = common::triangle(&mut device);
    let bb = device.current_back_buffer().id();

    common::triangle_frame(&mut device, &mut gfx, &tri);

    let sim = device.backend();
    assert!(sim.violations().is_empty(), "{:?}", sim.violations());
    assert_eq!(sim.draws().len(), 1);
    let draw = &sim.draws()[0];
    assert_eq!(draw.pipeline, tri.pipeline);
    assert_eq!(draw.vertex_count, 3);
    assert_eq!(draw.instance_count, 1);
    assert_eq!(draw.render_targets, vec![bb]);
    assert_eq!(draw.resources, vec![tri.vertices.id()]);

    let commands: Vec<&Command> = sim.log().iter().map(|e| &e.command).collect();
    let to_target = commands
        .iter()
        .position(|c| matches!(c, Command::Barriers(b) if b.iter().any(|b| b.resource == bb && b.to == ResourceState::RenderTarget)))
        .unwrap();
    let clear = commands
        .iter()
        .position(|c| matches!(c, Command::ClearRenderTarget { .. }))
        .unwrap();
    let draw_at = commands
        .iter()
        .position(|c| matches!(c, Command::Draw { .. }))
        .unwrap();
    let to_present = commands
        .iter()
        .rposition(|c| matches!(c, Command::Barriers(b) if b.iter().any(|b| b.resource == bb && b.to == ResourceState::Present)))
        .unwrap();
    assert!(to_target < clear && clear < draw_at && draw_at < to_present);

    assert_eq!(sim.state_of(bb), Some(ResourceState::Present));
    assert_eq!(sim.last_clear(bb), Some(Color::black()));
    assert_eq!(sim.presented(), &[bb]);
}

// ── barrier ordering ──────────────────────────────────────────────────────

#[test]
fn clear_without_barrier_is_rejected() {
    let mut device = common::immediate();
    let mut gfx = device.create_graphics_context();
    device.begin_frame().unwrap();
    gfx.reset(&device).unwrap();
    let bb = device.current_back_buffer();

    let err = gfx.clear_render_target(&device, bb, Color::black()).unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidState {
            expected: ResourceState::RenderTarget,
            actual: ResourceState::Present,
            ..
        }
    ));
}

#[test]
fn unflushed_barrier_blocks_use_and_submission() {
    let mut device = common::immediate();
    let mut gfx = device.create_graphics_context();
    device.begin_frame().unwrap();
    gfx.reset(&device).unwrap();
    let bb = device.current_back_buffer();

    gfx.add_barrier(&device, bb, ResourceState::RenderTarget).unwrap();
    assert!(matches!(
        gfx.clear_render_target(&device, bb, Color::black()),
        Err(EngineError::UnflushedBarrier { .. })
    ));
    assert!(matches!(
        device.submit_context_work(&mut gfx),
        Err(EngineError::UnflushedBarrier { .. })
    ));
}

#[test]
fn barriers_to_one_resource_merge_and_cancel() {
    let mut device = common::immediate();
    let mut gfx = device.create_graphics_context();
    device.begin_frame().unwrap();
    gfx.reset(&device).unwrap();
    let bb = device.current_back_buffer();

    gfx.add_barrier(&device, bb, ResourceState::Present).unwrap();
    assert!(gfx.pending_barriers().is_empty());

    gfx.add_barrier(&device, bb, ResourceState::CopyDest).unwrap();
    gfx.add_barrier(&device, bb, ResourceState::RenderTarget).unwrap();
    assert_eq!(gfx.pending_barriers().len(), 1);
    assert_eq!(gfx.pending_barriers()[0].from, ResourceState::Present);
    assert_eq!(gfx.pending_barriers()[0].to, ResourceState::RenderTarget);

    gfx.add_barrier(&device, bb, ResourceState::Present).unwrap();
    assert!(gfx.pending_barriers().is_empty());

    gfx.flush_barriers();
    assert!(gfx.command_list().is_empty());
}

#[test]
fn one_flush_emits_one_batch() {
    let mut device = common::immediate();
    let mut gfx = device.create_graphics_context();
    let depth = device
        .create_texture(&TextureDesc::new(320, 240, Format::Depth32Float, TextureViews::DSV))
        .unwrap();
    device.begin_frame().unwrap();
    gfx.reset(&device).unwrap();
    let bb = device.current_back_buffer();

    gfx.add_barrier(&device, bb, ResourceState::RenderTarget).unwrap();
    gfx.add_barrier(&device, depth, ResourceState::DepthRead).unwrap();
    gfx.flush_barriers();
    gfx.flush_barriers();
    assert_eq!(gfx.command_list().barrier_batches(), 1);
    assert!(matches!(&gfx.command_list().commands()[0], Command::Barriers(b) if b.len() == 2));
}

#[test]
fn sim_catches_commands_recorded_behind_the_context() {
    let mut device = common::immediate();
    let mut gfx = device.create_graphics_context();
    device.begin_frame().unwrap();
    gfx.reset(&device).unwrap();
    let bb = device.current_back_buffer();

    // Raw overlay access skips record-time checks.
    gfx.command_list_mut().push(Command::ClearRenderTarget {
        target: bb,
        color: Color::black(),
    });
    device.submit_context_work(&mut gfx).unwrap();
    device.end_frame().unwrap();

    let violations = device.backend().violations();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].fence, 1);
}

#[test]
fn second_context_sees_states_committed_by_the_first() {
    let mut device = common::immediate();
    let mut first = device.create_graphics_context();
    let mut second = device.create_graphics_context();
    device.begin_frame().unwrap();
    first.reset(&device).unwrap();
    second.reset(&device).unwrap();
    let bb = device.current_back_buffer();

    first.add_barrier(&device, bb, ResourceState::RenderTarget).unwrap();
    first.flush_barriers();
    device.submit_context_work(&mut first).unwrap();

    second.add_barrier(&device, bb, ResourceState::Present).unwrap();
    second.flush_barriers();
    device.submit_context_work(&mut second).unwrap();
    device.end_frame().unwrap();
    device.present().unwrap();
    assert!(device.backend().violations().is_empty());
}

#[test]
fn context_with_outdated_observation_is_rejected() {
    let mut device = common::immediate();
    let mut first = device.create_graphics_context();
    let mut second = device.create_graphics_context();
    device.begin_frame().unwrap();
    first.reset(&device).unwrap();
    second.reset(&device).unwrap();
    let bb = device.current_back_buffer();

    // Both observe `Present`; the first one moves it on.
    first.add_barrier(&device, bb, ResourceState::RenderTarget).unwrap();
    first.flush_barriers();
    second.add_barrier(&device, bb, ResourceState::CopyDest).unwrap();
    second.flush_barriers();

    device.submit_context_work(&mut first).unwrap();
    assert!(matches!(
        device.submit_context_work(&mut second),
        Err(EngineError::InvalidState {
            expected: ResourceState::Present,
            actual: ResourceState::RenderTarget,
            ..
        })
    ));
}

// ── draw validation ───────────────────────────────────────────────────────

#[test]
fn draw_requires_pipeline_viewport_and_spaces() {
    let mut device = common::immediate();
    let mut gfx = device.create_graphics_context();
    let tri = common::triangle(&mut device);
    device.begin_frame().unwrap();
    gfx.reset(&device).unwrap();
    let bb = device.current_back_buffer();
    gfx.add_barrier(&device, bb, ResourceState::RenderTarget).unwrap();
    gfx.flush_barriers();

    assert!(matches!(gfx.draw(&device, 3), Err(EngineError::NoPipelineBound)));

    gfx.set_pipeline(&device, &target_info(&tri, &device)).unwrap();
    assert!(matches!(gfx.draw(&device, 3), Err(EngineError::ViewportNotSet)));

    gfx.set_default_viewport_and_scissor(device.screen_size()).unwrap();
    assert!(matches!(
        gfx.draw(&device, 3),
        Err(EngineError::SpaceNotBound {
            space: SpaceId::PerObject
        })
    ));

    gfx.set_pipeline_resources(&device, SpaceId::PerObject, &tri.space).unwrap();
    gfx.draw_instanced(&device, 3, 4).unwrap();
}

#[test]
fn draw_after_target_left_render_state_is_rejected() {
    let mut device = common::immediate();
    let mut gfx = device.create_graphics_context();
    let tri = common::triangle(&mut device);
    device.begin_frame().unwrap();
    gfx.reset(&device).unwrap();
    let bb = device.current_back_buffer();
    gfx.add_barrier(&device, bb, ResourceState::RenderTarget).unwrap();
    gfx.flush_barriers();
    gfx.set_pipeline(&device, &target_info(&tri, &device)).unwrap();
    gfx.set_pipeline_resources(&device, SpaceId::PerObject, &tri.space).unwrap();
    gfx.set_default_viewport_and_scissor(device.screen_size()).unwrap();

    gfx.add_barrier(&device, bb, ResourceState::Present).unwrap();
    gfx.flush_barriers();
    assert!(matches!(
        gfx.draw(&device, 3),
        Err(EngineError::InvalidState {
            expected: ResourceState::RenderTarget,
            ..
        })
    ));
}

#[test]
fn topology_must_match_pipeline() {
    let mut device = common::immediate();
    let mut gfx = device.create_graphics_context();
    let tri = common::triangle(&mut device);
    device.begin_frame().unwrap();
    gfx.reset(&device).unwrap();
    let bb = device.current_back_buffer();
    gfx.add_barrier(&device, bb, ResourceState::RenderTarget).unwrap();
    gfx.flush_barriers();
    gfx.set_pipeline(&device, &target_info(&tri, &device)).unwrap();
    gfx.set_pipeline_resources(&device, SpaceId::PerObject, &tri.space).unwrap();
    gfx.set_default_viewport_and_scissor(device.screen_size()).unwrap();

    gfx.set_primitive_topology(PrimitiveTopology::LineList).unwrap();
    assert!(matches!(gfx.draw(&device, 3), Err(EngineError::InvalidDescriptor(_))));
    gfx.set_primitive_topology(PrimitiveTopology::TriangleList).unwrap();
    gfx.draw(&device, 3).unwrap();
}

#[test]
fn empty_scissor_still_records() {
    let mut device = common::immediate();
    let mut gfx = device.create_graphics_context();
    device.begin_frame().unwrap();
    gfx.reset(&device).unwrap();
    gfx.set_scissor(ScissorRect::covering(Extent::new(0, 0))).unwrap();
    assert_eq!(gfx.command_list().len(), 1);
}

// ── pipeline targets ──────────────────────────────────────────────────────

#[test]
fn render_target_format_must_match_pipeline() {
    let mut device = common::immediate();
    let mut gfx = device.create_graphics_context();
    let vs = device
        .create_shader(&ShaderDesc::new("hdr.wgsl", "vs_main", ShaderStage::Vertex))
        .unwrap();
    let ps = device
        .create_shader(&ShaderDesc::new("hdr.wgsl", "fs_main", ShaderStage::Pixel))
        .unwrap();
    let mut desc = GraphicsPipelineDesc::new(vs, ps);
    desc.render_target_formats = vec![Format::Rgba16Float];
    let pipeline = device
        .create_graphics_pipeline(&desc, &PipelineResourceLayout::new())
        .unwrap();

    device.begin_frame().unwrap();
    gfx.reset(&device).unwrap();
    let bb = device.current_back_buffer();
    gfx.add_barrier(&device, bb, ResourceState::RenderTarget).unwrap();
    gfx.flush_barriers();
    let err = gfx
        .set_pipeline(
            &device,
            &PipelineInfo {
                pipeline: Some(pipeline),
                render_targets: vec![bb],
                depth_stencil_target: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::FormatMismatch(_)));
}

#[test]
fn swap_chain_format_substitution_is_reported() {
    let device = Device::new(
        DeviceConfig::default(),
        SimBackend::new(SimConfig {
            swapchain_format: Some(Format::Bgra8UnormSrgb),
            ..Default::default()
        }),
    )
    .unwrap();
    assert_eq!(device.back_buffer_format(), Format::Bgra8UnormSrgb);
    let bb = device.current_back_buffer();
    assert_eq!(
        device.resource(bb).unwrap().as_texture().unwrap().format,
        Format::Bgra8UnormSrgb
    );
}

#[test]
fn pipeline_rejects_shader_in_wrong_stage() {
    let mut device = common::immediate();
    let vs = device
        .create_shader(&ShaderDesc::new("a.wgsl", "vs_main", ShaderStage::Vertex))
        .unwrap();
    let mut desc = GraphicsPipelineDesc::new(vs, vs);
    desc.render_target_formats = vec![device.back_buffer_format()];
    assert!(matches!(
        device.create_graphics_pipeline(&desc, &PipelineResourceLayout::new()),
        Err(EngineError::InvalidDescriptor(_))
    ));
}

#[test]
fn overlay_binds_targets_without_pipeline() {
    let mut device = common::immediate();
    let mut gfx = device.create_graphics_context();
    device.begin_frame().unwrap();
    gfx.reset(&device).unwrap();
    let bb = device.current_back_buffer();
    gfx.add_barrier(&device, bb, ResourceState::RenderTarget).unwrap();
    gfx.flush_barriers();
    gfx.set_pipeline(
        &device,
        &PipelineInfo {
            pipeline: None,
            render_targets: vec![bb],
            depth_stencil_target: None,
        },
    )
    .unwrap();
    assert!(matches!(gfx.draw(&device, 3), Err(EngineError::NoPipelineBound)));
    assert_eq!(device.reserved_descriptor(0).map(|d| d.get()), Some(0));
    assert_eq!(device.reserved_descriptor(1).map(|d| d.get()), Some(1));
    assert!(device.reserved_descriptor(2).is_none());
}

// ── resource spaces ───────────────────────────────────────────────────────

#[test]
fn locked_space_swaps_values_but_not_layout() {
    let mut device = common::immediate();
    let mut gfx = device.create_graphics_context();
    let mut tri = common::triangle(&mut device);
    let other = device
        .create_buffer(&BufferDesc::structured(3, 32, AccessPattern::HostWritable, "other vertices"))
        .unwrap();
    let cb = device.create_buffer(&BufferDesc::constants(64, "cb")).unwrap();

    assert!(matches!(tri.space.set_srv(1, other), Err(EngineError::SpaceLocked)));
    assert!(matches!(tri.space.set_cbv(cb), Err(EngineError::SpaceLocked)));
    tri.space.set_srv(0, other).unwrap();

    common::triangle_frame(&mut device, &mut gfx, &tri);
    assert_eq!(device.backend().draws()[0].resources, vec![other.id()]);
}

#[test]
fn space_layout_must_match_pipeline() {
    let mut device = common::immediate();
    let mut gfx = device.create_graphics_context();
    let tri = common::triangle(&mut device);
    let cb = device.create_buffer(&BufferDesc::constants(64, "cb")).unwrap();
    let wrong = ResourceSpaceBuilder::new()
        .set_cbv(cb)
        .set_srv(0, tri.vertices)
        .lock();

    device.begin_frame().unwrap();
    gfx.reset(&device).unwrap();
    let bb = device.current_back_buffer();
    gfx.add_barrier(&device, bb, ResourceState::RenderTarget).unwrap();
    gfx.flush_barriers();
    gfx.set_pipeline(&device, &target_info(&tri, &device)).unwrap();
    assert!(matches!(
        gfx.set_pipeline_resources(&device, SpaceId::PerObject, &wrong),
        Err(EngineError::LayoutMismatch {
            space: SpaceId::PerObject
        })
    ));
    assert!(matches!(
        gfx.set_pipeline_resources(&device, SpaceId::PerPass, &tri.space),
        Err(EngineError::LayoutMismatch { space: SpaceId::PerPass })
    ));
}

#[test]
fn destroyed_resource_in_space_is_a_stale_handle() {
    let mut device = common::immediate();
    let mut gfx = device.create_graphics_context();
    let tri = common::triangle(&mut device);
    device.destroy_buffer(tri.vertices).unwrap();

    device.begin_frame().unwrap();
    gfx.reset(&device).unwrap();
    let bb = device.current_back_buffer();
    gfx.add_barrier(&device, bb, ResourceState::RenderTarget).unwrap();
    gfx.flush_barriers();
    gfx.set_pipeline(&device, &target_info(&tri, &device)).unwrap();
    assert!(matches!(
        gfx.set_pipeline_resources(&device, SpaceId::PerObject, &tri.space),
        Err(EngineError::StaleHandle(_))
    ));
}
