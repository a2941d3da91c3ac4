//! Frontend behavior against the null backend: command sequencing, deferred
//! destruction, statistics, swapchain handling.

use karst_render::buffer::{AttributeType, BufferType, ElementType};
use karst_render::command::{clear_color, Buffers, DrawTextures, PrimitiveType};
use karst_render::context::{ClearValue, Context};
use karst_render::null::NullBackend;
use karst_render::program::{InOut, InOutType, ProgramDescription, Shader, ShaderType, UniformType};
use karst_render::render_tag;
use karst_render::resource::ResourceKind;
use karst_render::state::State;
use karst_render::target::TargetHandle;
use karst_render::technique::{
    TechniqueDescription, TechniquePermute, TechniqueUniform,
};
use karst_render::texture::{FilterOptions, TextureFormat, TextureType, WrapType};
use glam::UVec2;
use std::sync::{Arc, Mutex};

type Trace = Arc<Mutex<Vec<String>>>;

fn context() -> Context {
    Context::new(Box::new(NullBackend::new()), &config::Config::new()).unwrap()
}

fn traced_context() -> (Context, Trace) {
    let trace: Trace = Arc::new(Mutex::new(Vec::new()));
    let context = Context::new(
        Box::new(NullBackend::with_trace(trace.clone())),
        &config::Config::new(),
    )
    .unwrap();
    (context, trace)
}

fn count(trace: &Trace, entry: &str) -> usize {
    trace
        .lock()
        .unwrap()
        .iter()
        .filter(|line| line.as_str() == entry)
        .count()
}

fn passthrough_program(context: &Context) -> karst_render::program::ProgramHandle {
    let tag = render_tag!("test program");
    let program = context.create_program(tag);
    {
        let mut program = context.program(program);
        program.record_description(ProgramDescription {
            name: String::from("passthrough"),
            data: vec![String::from("void main() { rx_position = vec4f(0.0); }")],
            layout: vec![],
            defines: vec![],
        });
        program.add_shader(Shader {
            kind: ShaderType::Vertex,
            source: String::from("void main() { rx_position = vec4f(a_position, 1.0); }"),
            inputs: vec![(
                String::from("a_position"),
                InOut {
                    kind: InOutType::Vec3F,
                    index: 0,
                },
            )],
            outputs: vec![],
        });
        program.add_shader(Shader {
            kind: ShaderType::Fragment,
            source: String::from("void main() { frag_color = vec4f(1.0); }"),
            inputs: vec![],
            outputs: vec![(
                String::from("frag_color"),
                InOut {
                    kind: InOutType::Vec4F,
                    index: 0,
                },
            )],
        });
    }
    context.initialize_program(tag, program);
    program
}

fn viewport_state(width: u32, height: u32) -> State {
    let mut state = State::new();
    state.viewport.record_dimensions(UVec2::new(width, height));
    state
}

fn offscreen_rgba8_target(context: &Context, width: u32, height: u32) -> TargetHandle {
    let tag = render_tag!("offscreen");
    let texture = context.create_texture2d(tag);
    {
        let mut texture = context.texture2d(texture);
        texture.record_format(TextureFormat::Rgba8);
        texture.record_type(TextureType::Attachment);
        texture.record_levels(1);
        texture.record_filter(FilterOptions::default());
        texture.record_dimensions(UVec2::new(width, height));
        texture.record_wrap((WrapType::ClampToEdge, WrapType::ClampToEdge));
    }
    context.initialize_texture2d(tag, texture);

    let target = context.create_target(tag);
    context.attach_texture2d(target, texture, 0);
    context.initialize_target(tag, target);
    target
}

#[test]
fn swapchain_bootstrap() {
    let (context, trace) = traced_context();

    // One frontend-owned attachment plus the presentable target.
    let target = context.swapchain();
    {
        let target = context.target(target);
        assert!(target.is_swapchain());
        assert_eq!(target.attachments().len(), 1);
        assert_eq!(target.dimensions(), UVec2::new(1600, 900));
    }
    assert!(context.texture2d(context.swapchain_texture()).is_swapchain());

    assert!(context.process());
    assert_eq!(count(&trace, "resource_allocate texture2D"), 1);
    assert_eq!(count(&trace, "resource_allocate target"), 1);
    assert_eq!(count(&trace, "resource_construct texture2D"), 1);
    assert_eq!(count(&trace, "resource_construct target"), 1);

    // Nothing pending: process reports idle.
    assert!(!context.process());
}

#[test]
fn bufferless_triangle_draw() {
    let (context, trace) = traced_context();
    let program = passthrough_program(&context);

    let mut draw_buffers = Buffers::new();
    draw_buffers.add(0);

    context.draw(
        render_tag!("triangle"),
        &viewport_state(256, 256),
        context.swapchain(),
        &draw_buffers,
        None,
        program,
        3,
        0,
        PrimitiveType::Triangles,
        &DrawTextures::new(),
    );

    assert!(context.process());
    context.swap();

    assert_eq!(count(&trace, "resource_allocate program"), 1);
    assert_eq!(count(&trace, "resource_construct program"), 1);
    assert_eq!(count(&trace, "draw"), 1);

    let stats = context.frame_stats();
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.triangles, 1);
    assert_eq!(stats.vertices, 3);
}

#[test]
fn clear_then_blit() {
    let (context, trace) = traced_context();
    let target = offscreen_rgba8_target(&context, 128, 64);

    let mut draw_buffers = Buffers::new();
    draw_buffers.add(0);

    context.clear(
        render_tag!("clear red"),
        &viewport_state(128, 64),
        target,
        &draw_buffers,
        clear_color(0),
        &[ClearValue::Color([1.0, 0.0, 0.0, 1.0])],
    );
    context.blit(
        render_tag!("present offscreen"),
        &viewport_state(128, 64),
        target,
        0,
        context.swapchain(),
        0,
    );

    assert!(context.process());
    let stats = context.frame_stats();
    assert_eq!(stats.clear_calls, 1);
    assert_eq!(stats.blit_calls, 1);
    assert_eq!(count(&trace, "clear"), 1);
    assert_eq!(count(&trace, "blit"), 1);
}

#[test]
fn combined_clear_values_decode_in_order() {
    let context = context();
    let target = context.create_target(render_tag!("depth target"));
    context.request_depth_stencil(
        render_tag!("depth target"),
        target,
        TextureFormat::D24S8,
        UVec2::new(64, 64),
    );
    let texture = context.create_texture2d(render_tag!("color"));
    {
        let mut texture = context.texture2d(texture);
        texture.record_format(TextureFormat::Rgba8);
        texture.record_type(TextureType::Attachment);
        texture.record_levels(1);
        texture.record_filter(FilterOptions::default());
        texture.record_dimensions(UVec2::new(64, 64));
        texture.record_wrap((WrapType::ClampToEdge, WrapType::ClampToEdge));
    }
    context.initialize_texture2d(render_tag!("color"), texture);
    context.attach_texture2d(target, texture, 0);
    context.initialize_target(render_tag!("depth target"), target);

    let mut draw_buffers = Buffers::new();
    draw_buffers.add(0);
    context.clear(
        render_tag!("clear all"),
        &viewport_state(64, 64),
        target,
        &draw_buffers,
        karst_render::CLEAR_DEPTH | karst_render::CLEAR_STENCIL | clear_color(0),
        &[
            ClearValue::Depth(1.0),
            ClearValue::Stencil(0),
            ClearValue::Color([0.0, 0.0, 0.0, 1.0]),
        ],
    );
    assert!(context.process());
    assert_eq!(context.frame_stats().clear_calls, 1);
}

#[test]
fn buffer_updates_carry_edit_records() {
    let (context, trace) = traced_context();
    let tag = render_tag!("dynamic buffer");

    let buffer = context.create_buffer(tag);
    {
        let mut buffer = context.buffer(buffer);
        buffer.record_type(BufferType::Dynamic);
        buffer.record_vertex_stride(16);
        buffer.record_element_type(ElementType::None);
        buffer.record_vertex_attribute(AttributeType::F32, 4, 0);
        buffer.write_vertices(&[0u8; 64]);
    }
    context.initialize_buffer(tag, buffer);

    {
        let mut buffer = context.buffer(buffer);
        buffer.update_vertices(0, &[1u8; 16]);
        buffer.update_vertices(48, &[2u8; 16]);
    }
    context.update_buffer(tag, buffer);

    // No edits pending: no command is recorded.
    context.update_buffer(tag, buffer);

    assert!(context.process());
    assert_eq!(count(&trace, "resource_update buffer 2"), 1);
    assert_eq!(count(&trace, "resource_update buffer 0"), 0);

    // Growth path: resize and update again.
    {
        let mut buffer = context.buffer(buffer);
        buffer.resize_vertices(1024);
    }
    context.update_buffer(tag, buffer);
    assert!(context.process());
    assert_eq!(count(&trace, "resource_update buffer 1"), 1);
}

#[test]
fn deferred_destruction_frees_the_slot_after_process() {
    let context = context();
    let tag = render_tag!("buffer lifecycle");

    let used_before = context.stats(ResourceKind::Buffer).used;
    let buffer = context.create_buffer(tag);
    {
        let mut buffer = context.buffer(buffer);
        buffer.record_type(BufferType::Static);
        buffer.record_vertex_stride(12);
        buffer.record_element_type(ElementType::None);
        buffer.write_vertices(&[0u8; 36]);
    }
    context.initialize_buffer(tag, buffer);
    assert_eq!(context.stats(ResourceKind::Buffer).used, used_before + 1);

    context.destroy_buffer(tag, buffer);
    // Destruction is deferred by one process tick.
    assert_eq!(context.stats(ResourceKind::Buffer).used, used_before + 1);

    assert!(context.process());
    assert_eq!(context.stats(ResourceKind::Buffer).used, used_before);

    // The freed slot is handed out to the next create, with a fresh
    // reference count (a single destroy retires it again).
    let replacement = context.create_buffer(tag);
    assert_eq!(replacement.index(), buffer.index());
    context.destroy_buffer(tag, replacement);
    assert!(context.process());
    assert_eq!(context.stats(ResourceKind::Buffer).used, used_before);
}

#[test]
fn named_cache_acquires_references() {
    let context = context();
    let tag = render_tag!("cached buffer");

    let buffer = context.create_buffer(tag);
    context.cache_buffer(buffer, "shared quad");
    assert_eq!(context.stats(ResourceKind::Buffer).cached, 1);

    let found = context.cached_buffer("shared quad").unwrap();
    assert_eq!(found, buffer);
    assert!(context.cached_buffer("unknown").is_none());

    // Two owners now; the first destroy only drops a reference.
    context.destroy_buffer(tag, buffer);
    assert_eq!(context.stats(ResourceKind::Buffer).cached, 1);
    context.destroy_buffer(tag, buffer);
    assert_eq!(context.stats(ResourceKind::Buffer).cached, 0);
    assert!(context.process());
}

#[test]
fn swapchain_resize_updates_dimensions_only() {
    let (context, trace) = traced_context();
    assert!(context.process());
    let allocations = trace.lock().unwrap().len();

    context.resize(UVec2::new(800, 600));

    assert_eq!(
        context.texture2d(context.swapchain_texture()).dimensions(),
        UVec2::new(800, 600)
    );
    assert_eq!(
        context.target(context.swapchain()).dimensions(),
        UVec2::new(800, 600)
    );
    // No commands were recorded for the resize.
    assert!(!context.process());
    assert_eq!(trace.lock().unwrap().len(), allocations);
}

#[test]
fn draw_flushes_dirty_uniforms_into_the_command() {
    let context = context();
    let program = passthrough_program(&context);
    {
        let mut guard = context.program(program);
        let slot = guard.add_uniform("u_model", UniformType::Mat4x4F);
        guard.uniform_mut(slot).record_mat4x4f(glam::Mat4::IDENTITY);
        assert_eq!(guard.dirty_uniforms_size(), 64);
    }

    let mut draw_buffers = Buffers::new();
    draw_buffers.add(0);
    context.draw(
        render_tag!("uniform flush"),
        &viewport_state(32, 32),
        context.swapchain(),
        &draw_buffers,
        None,
        program,
        3,
        0,
        PrimitiveType::Triangles,
        &DrawTextures::new(),
    );

    // The bits were consumed at enqueue time.
    assert_eq!(context.program(program).dirty_uniforms_bitset(), 0);
    assert_eq!(context.program(program).dirty_uniforms_size(), 0);
}

#[test]
fn technique_permutations_are_cached_per_flag_set() {
    let context = context();
    context.insert_technique(TechniqueDescription {
        name: String::from("geometry"),
        shaders: vec![Shader {
            kind: ShaderType::Vertex,
            source: String::from("void main() { rx_position = vec4f(0.0); }"),
            inputs: vec![],
            outputs: vec![],
        }],
        uniforms: vec![
            TechniqueUniform {
                name: String::from("u_model"),
                kind: UniformType::Mat4x4F,
                when: 0,
            },
            TechniqueUniform {
                name: String::from("u_albedo"),
                kind: UniformType::Sampler2D,
                when: 1 << 1,
            },
        ],
        permutes: vec![TechniquePermute {
            mask: 1 << 1,
            define: String::from("HAS_ALBEDO"),
        }],
    });
    assert!(context.has_technique("geometry"));

    let tag = render_tag!("permute");
    let plain = context.permute(tag, "geometry", 0).unwrap();
    let textured = context.permute(tag, "geometry", 1 << 1).unwrap();
    assert_ne!(plain, textured);
    assert_eq!(context.permute(tag, "geometry", 0).unwrap(), plain);
    assert!(context.permute(tag, "missing", 0).is_none());

    // Gated uniforms hold their slot as padding in the plain permutation.
    {
        let program = context.program(plain);
        assert_eq!(program.uniforms().len(), 2);
        assert!(!program.uniforms()[0].is_padding());
        assert!(program.uniforms()[1].is_padding());
    }
    assert!(!context.program(textured).uniforms()[1].is_padding());
}

#[test]
fn destroying_a_target_releases_owned_attachments() {
    let (context, trace) = traced_context();
    let tag = render_tag!("owned depth");

    let textures_before = context.stats(ResourceKind::Texture2D).used;
    let target = context.create_target(tag);
    context.request_depth_stencil(tag, target, TextureFormat::D24S8, UVec2::new(32, 32));
    context.initialize_target(tag, target);
    assert_eq!(context.stats(ResourceKind::Texture2D).used, textures_before + 1);

    context.destroy_target(tag, target);
    assert!(context.process());
    assert_eq!(context.stats(ResourceKind::Texture2D).used, textures_before);
    assert_eq!(count(&trace, "resource_destroy target"), 1);
    assert_eq!(count(&trace, "resource_destroy texture2D"), 1);
}

#[test]
#[should_panic(expected = "empty draw call")]
fn draw_rejects_zero_count() {
    let context = context();
    let program = passthrough_program(&context);
    let mut draw_buffers = Buffers::new();
    draw_buffers.add(0);
    context.draw(
        render_tag!("empty"),
        &viewport_state(32, 32),
        context.swapchain(),
        &draw_buffers,
        None,
        program,
        0,
        0,
        PrimitiveType::Triangles,
        &DrawTextures::new(),
    );
}

#[test]
#[should_panic(expected = "empty viewport")]
fn draw_rejects_empty_viewport() {
    let context = context();
    let program = passthrough_program(&context);
    let mut draw_buffers = Buffers::new();
    draw_buffers.add(0);
    context.draw(
        render_tag!("no viewport"),
        &State::new(),
        context.swapchain(),
        &draw_buffers,
        None,
        program,
        3,
        0,
        PrimitiveType::Triangles,
        &DrawTextures::new(),
    );
}

#[test]
#[should_panic(expected = "empty clear")]
fn clear_rejects_zero_mask() {
    let context = context();
    let mut draw_buffers = Buffers::new();
    draw_buffers.add(0);
    context.clear(
        render_tag!("empty clear"),
        &viewport_state(32, 32),
        context.swapchain(),
        &draw_buffers,
        0,
        &[],
    );
}

#[test]
#[should_panic(expected = "cannot blit to self")]
fn blit_rejects_same_target() {
    let context = context();
    let target = offscreen_rgba8_target(&context, 32, 32);
    context.blit(
        render_tag!("self blit"),
        &viewport_state(32, 32),
        target,
        0,
        target,
        0,
    );
}

#[test]
#[should_panic(expected = "cannot use swapchain as source")]
fn blit_rejects_swapchain_source() {
    let context = context();
    let target = offscreen_rgba8_target(&context, 32, 32);
    context.blit(
        render_tag!("swapchain source"),
        &viewport_state(32, 32),
        context.swapchain(),
        0,
        target,
        0,
    );
}

#[test]
fn pool_capacities_come_from_console_variables() {
    let mut cfg = config::Config::new();
    cfg.set("render.max_buffers", 4i64).unwrap();
    cfg.set("display.resolution", vec![320i64, 240i64]).unwrap();
    let context = Context::new(Box::new(NullBackend::new()), &cfg).unwrap();

    assert_eq!(context.stats(ResourceKind::Buffer).total, 4);
    assert_eq!(
        context.target(context.swapchain()).dimensions(),
        UVec2::new(320, 240)
    );
}

#[test]
fn recording_is_thread_safe() {
    // Destruction is deferred until process(), so everything created here
    // occupies its slot for the whole burst; stay under the default pool
    // capacity.
    let context = Arc::new(context());
    let mut threads = Vec::new();
    for _ in 0..4 {
        let context = context.clone();
        threads.push(std::thread::spawn(move || {
            for _ in 0..8 {
                let tag = render_tag!("threaded buffer");
                let buffer = context.create_buffer(tag);
                {
                    let mut buffer = context.buffer(buffer);
                    buffer.record_type(BufferType::Static);
                    buffer.record_vertex_stride(4);
                    buffer.record_element_type(ElementType::None);
                }
                context.initialize_buffer(tag, buffer);
                context.destroy_buffer(tag, buffer);
            }
        }));
    }
    for thread in threads {
        thread.join().unwrap();
    }

    assert!(context.process());
    let stats = context.stats(ResourceKind::Buffer);
    assert_eq!(stats.used, 0);
}