//! The thread-safe render frontend.
//!
//! A single `Context` instance is shared by every system that renders.
//! Public entry points take the context mutex for their whole duration,
//! record commands into the command buffer, and return; nothing talks to the
//! graphics API until `process()` hands the ordered stream to the backend on
//! the render thread. Destruction is deferred: a destroyed resource's slot
//! survives until the backend has replayed the frame that destroys it.

use crate::backend::{AllocationInfo, Backend, DeviceInfo, Frame, Resources};
use crate::buffer::{Buffer, BufferHandle};
use crate::command::{
    BlitCommand, Buffers, ClearCommand, Command, CommandBuffer, DrawCommand, DrawTextures, Edits,
    PrimitiveType, ResourceId, CLEAR_DEPTH, CLEAR_STENCIL, MAX_DRAW_BUFFERS,
};
use crate::pool::Pool;
use crate::program::{Program, ProgramHandle};
use crate::resource::ResourceKind;
use crate::state::State;
use crate::tag::Tag;
use crate::target::{Target, TargetHandle};
use crate::technique::{Technique, TechniqueDescription};
use crate::texture::{
    Face, FilterOptions, Texture1D, Texture1DHandle, Texture2D, Texture2DHandle, Texture3D,
    Texture3DHandle, TextureCM, TextureCMHandle, TextureFormat, TextureType, WrapType,
};
use crate::timer::FrameTimer;
use fxhash::FxHashMap;
use glam::UVec2;
use log::{error, info};
use std::error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
pub enum ContextError {
    BackendInit,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::BackendInit => write!(f, "backend failed to acquire a context"),
        }
    }
}

impl error::Error for ContextError {}

/// Pool statistics for one resource kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Statistics {
    pub total: usize,
    pub used: usize,
    pub cached: usize,
    pub memory: usize,
}

/// Snapshot of the previous frame's counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameStatistics {
    pub draw_calls: u64,
    pub clear_calls: u64,
    pub blit_calls: u64,
    pub vertices: u64,
    pub points: u64,
    pub lines: u64,
    pub triangles: u64,
}

/// Double-buffered counter: index 0 accumulates the current frame, index 1
/// holds the finished frame readers sample.
struct Counter([AtomicU64; 2]);

impl Counter {
    const fn new() -> Counter {
        Counter([AtomicU64::new(0), AtomicU64::new(0)])
    }

    fn add(&self, amount: u64) {
        self.0[0].fetch_add(amount, Ordering::Relaxed);
    }

    fn rotate(&self) {
        let finished = self.0[0].swap(0, Ordering::Relaxed);
        self.0[1].store(finished, Ordering::Relaxed);
    }

    fn finished(&self) -> u64 {
        self.0[1].load(Ordering::Relaxed)
    }
}

struct FrameCounters {
    draw_calls: Counter,
    clear_calls: Counter,
    blit_calls: Counter,
    vertices: Counter,
    points: Counter,
    lines: Counter,
    triangles: Counter,
}

impl FrameCounters {
    const fn new() -> FrameCounters {
        FrameCounters {
            draw_calls: Counter::new(),
            clear_calls: Counter::new(),
            blit_calls: Counter::new(),
            vertices: Counter::new(),
            points: Counter::new(),
            lines: Counter::new(),
            triangles: Counter::new(),
        }
    }

    fn rotate(&self) {
        self.draw_calls.rotate();
        self.clear_calls.rotate();
        self.blit_calls.rotate();
        self.vertices.rotate();
        self.points.rotate();
        self.lines.rotate();
        self.triangles.rotate();
    }
}

/// Typed clear values, decoded against the clear mask in the documented
/// order: depth, stencil, then one color per set color bit, ascending.
#[derive(Copy, Clone, Debug)]
pub enum ClearValue {
    Depth(f32),
    Stencil(i32),
    Color([f32; 4]),
}

struct Inner {
    backend: Box<dyn Backend>,
    resources: Resources,
    commands: CommandBuffer,

    destroy_buffers: Vec<BufferHandle>,
    destroy_targets: Vec<TargetHandle>,
    destroy_programs: Vec<ProgramHandle>,
    destroy_textures1d: Vec<Texture1DHandle>,
    destroy_textures2d: Vec<Texture2DHandle>,
    destroy_textures3d: Vec<Texture3DHandle>,
    destroy_textures_cm: Vec<TextureCMHandle>,

    cached_buffers: FxHashMap<String, BufferHandle>,
    cached_targets: FxHashMap<String, TargetHandle>,
    cached_textures1d: FxHashMap<String, Texture1DHandle>,
    cached_textures2d: FxHashMap<String, Texture2DHandle>,
    cached_textures3d: FxHashMap<String, Texture3DHandle>,
    cached_textures_cm: FxHashMap<String, TextureCMHandle>,

    techniques: FxHashMap<String, Technique>,

    swapchain_target: Option<TargetHandle>,
    swapchain_texture: Option<Texture2DHandle>,

    max_texture_dimensions: u32,
    timer: FrameTimer,
}

impl Inner {
    fn create_buffer_unlocked(&mut self, tag: Tag) -> BufferHandle {
        let handle = self.resources.buffers.insert(Buffer::new());
        self.commands.record(
            tag,
            Command::ResourceAllocate {
                resource: ResourceId::Buffer(handle),
            },
        );
        handle
    }

    fn create_target_unlocked(&mut self, tag: Tag) -> TargetHandle {
        let handle = self.resources.targets.insert(Target::new());
        self.commands.record(
            tag,
            Command::ResourceAllocate {
                resource: ResourceId::Target(handle),
            },
        );
        handle
    }

    fn create_program_unlocked(&mut self, tag: Tag) -> ProgramHandle {
        let handle = self.resources.programs.insert(Program::new());
        self.commands.record(
            tag,
            Command::ResourceAllocate {
                resource: ResourceId::Program(handle),
            },
        );
        handle
    }

    fn create_texture1d_unlocked(&mut self, tag: Tag) -> Texture1DHandle {
        let handle = self.resources.textures1d.insert(Texture1D::new());
        self.commands.record(
            tag,
            Command::ResourceAllocate {
                resource: ResourceId::Texture1D(handle),
            },
        );
        handle
    }

    fn create_texture2d_unlocked(&mut self, tag: Tag) -> Texture2DHandle {
        let handle = self.resources.textures2d.insert(Texture2D::new());
        self.commands.record(
            tag,
            Command::ResourceAllocate {
                resource: ResourceId::Texture2D(handle),
            },
        );
        handle
    }

    fn create_texture3d_unlocked(&mut self, tag: Tag) -> Texture3DHandle {
        let handle = self.resources.textures3d.insert(Texture3D::new());
        self.commands.record(
            tag,
            Command::ResourceAllocate {
                resource: ResourceId::Texture3D(handle),
            },
        );
        handle
    }

    fn create_texture_cm_unlocked(&mut self, tag: Tag) -> TextureCMHandle {
        let handle = self.resources.textures_cm.insert(TextureCM::new());
        self.commands.record(
            tag,
            Command::ResourceAllocate {
                resource: ResourceId::TextureCM(handle),
            },
        );
        handle
    }

    fn initialize_texture2d_unlocked(&mut self, tag: Tag, texture: Texture2DHandle) {
        self.resources.textures2d.get(texture).validate();
        self.commands.record(
            tag,
            Command::ResourceConstruct {
                resource: ResourceId::Texture2D(texture),
            },
        );
    }

    /// Texture2D destruction without re-taking the context lock; used from
    /// `destroy_target` for owned depth/stencil attachments.
    fn destroy_texture2d_unlocked(&mut self, tag: Tag, texture: Texture2DHandle) {
        if !self.resources.textures2d.get(texture).tracker().release() {
            return;
        }
        remove_cached(&mut self.cached_textures2d, texture);
        self.commands.record(
            tag,
            Command::ResourceDestroy {
                resource: ResourceId::Texture2D(texture),
            },
        );
        self.destroy_textures2d.push(texture);
    }

    /// Allocates and owns an attachment texture of the target's dimensions.
    fn request_attachment_unlocked(
        &mut self,
        tag: Tag,
        format: TextureFormat,
        dimensions: UVec2,
    ) -> Texture2DHandle {
        let handle = self.create_texture2d_unlocked(tag);
        let texture = self.resources.textures2d.get_mut(handle);
        texture.record_format(format);
        texture.record_type(TextureType::Attachment);
        texture.record_levels(1);
        texture.record_filter(FilterOptions::default());
        texture.record_dimensions(dimensions);
        texture.record_wrap((WrapType::ClampToEdge, WrapType::ClampToEdge));
        self.initialize_texture2d_unlocked(tag, handle);
        handle
    }

    fn update_target_usage(&mut self, target: TargetHandle) {
        let target_ref = self.resources.targets.get(target);
        let mut usage = 0;
        for attachment in target_ref.attachments() {
            usage += match *attachment {
                crate::target::Attachment::Texture2D { texture, .. } => {
                    let texture = self.resources.textures2d.get(texture);
                    texture.dimensions().x as usize * texture.dimensions().y as usize
                        * texture.format().bits_per_pixel()
                        / 8
                }
                crate::target::Attachment::TextureCM { texture, .. } => {
                    let texture = self.resources.textures_cm.get(texture);
                    texture.dimensions().x as usize * texture.dimensions().y as usize
                        * texture.format().bits_per_pixel()
                        / 8
                }
            };
        }
        if let Some(depth_stencil) = target_ref.depth_stencil_texture() {
            let texture = self.resources.textures2d.get(depth_stencil);
            usage += texture.dimensions().x as usize * texture.dimensions().y as usize
                * texture.format().bits_per_pixel()
                / 8;
        }
        self.resources.targets.get(target).tracker().set_usage(usage);
    }

    fn permute_unlocked(&mut self, tag: Tag, name: &str, flags: u64) -> Option<ProgramHandle> {
        if let Some(program) = self
            .techniques
            .get(name)
            .and_then(|technique| technique.cached_permutation(flags))
        {
            return Some(program);
        }

        let (description, shaders, uniforms) = {
            let technique = self.techniques.get(name)?;
            (
                technique.program_description(flags),
                technique.description().shaders.clone(),
                technique
                    .description()
                    .uniforms
                    .iter()
                    .map(|uniform| {
                        (
                            uniform.name.clone(),
                            uniform.kind,
                            Technique::uniform_live(uniform, flags),
                        )
                    })
                    .collect::<Vec<_>>(),
            )
        };

        let handle = self.create_program_unlocked(tag);
        let program = self.resources.programs.get_mut(handle);
        program.record_description(description);
        for shader in shaders {
            program.add_shader(shader);
        }
        for (name, kind, live) in uniforms {
            if live {
                program.add_uniform(&name, kind);
            } else {
                program.add_uniform_padding(&name, kind);
            }
        }
        program.validate();
        self.commands.record(
            tag,
            Command::ResourceConstruct {
                resource: ResourceId::Program(handle),
            },
        );

        self.techniques
            .get_mut(name)
            .expect("technique vanished")
            .insert_permutation(flags, handle);
        Some(handle)
    }
}

fn remove_cached<T: PartialEq + Copy>(cache: &mut FxHashMap<String, T>, handle: T) {
    cache.retain(|_, cached| *cached != handle);
}

pub struct Context {
    inner: Mutex<Inner>,
    counters: FrameCounters,
    allocation_info: AllocationInfo,
    device_info: DeviceInfo,
}

impl Context {
    /// Brings up the frontend over an initialized backend: queries
    /// allocation and device information, sizes the pools and the command
    /// buffer from the console variables, and creates the swapchain target
    /// with its single frontend-owned texture.
    pub fn new(mut backend: Box<dyn Backend>, cfg: &config::Config) -> Result<Context, ContextError> {
        if !backend.init() {
            error!(target: "render", "backend failed to initialize");
            return Err(ContextError::BackendInit);
        }

        let allocation_info = backend.query_allocation_info();
        let device_info = backend.query_device_info();
        info!(
            target: "render",
            "device: {} {} {}",
            device_info.vendor, device_info.renderer, device_info.version
        );

        let max_buffers = cvar_usize(cfg, "render.max_buffers", 64);
        let max_targets = cvar_usize(cfg, "render.max_targets", 16);
        let max_programs = cvar_usize(cfg, "render.max_programs", 512);
        let max_texture1d = cvar_usize(cfg, "render.max_texture1D", 16);
        let max_texture2d = cvar_usize(cfg, "render.max_texture2D", 1024);
        let max_texture3d = cvar_usize(cfg, "render.max_texture3D", 16);
        let max_texture_cm = cvar_usize(cfg, "render.max_textureCM", 16);
        let command_memory = cvar_usize(cfg, "render.command_memory", 2);
        let max_texture_dimensions = cvar_usize(cfg, "render.max_texture_dimensions", 2048) as u32;
        let resolution = cvar_resolution(cfg);
        let hdr = cfg.get::<bool>("display.hdr").unwrap_or(false);

        let mut inner = Inner {
            backend,
            resources: Resources {
                buffers: Pool::new(max_buffers),
                targets: Pool::new(max_targets),
                programs: Pool::new(max_programs),
                textures1d: Pool::new(max_texture1d),
                textures2d: Pool::new(max_texture2d),
                textures3d: Pool::new(max_texture3d),
                textures_cm: Pool::new(max_texture_cm),
            },
            commands: CommandBuffer::new(command_memory * 1024 * 1024),
            destroy_buffers: Vec::new(),
            destroy_targets: Vec::new(),
            destroy_programs: Vec::new(),
            destroy_textures1d: Vec::new(),
            destroy_textures2d: Vec::new(),
            destroy_textures3d: Vec::new(),
            destroy_textures_cm: Vec::new(),
            cached_buffers: FxHashMap::default(),
            cached_targets: FxHashMap::default(),
            cached_textures1d: FxHashMap::default(),
            cached_textures2d: FxHashMap::default(),
            cached_textures3d: FxHashMap::default(),
            cached_textures_cm: FxHashMap::default(),
            techniques: FxHashMap::default(),
            swapchain_target: None,
            swapchain_texture: None,
            max_texture_dimensions,
            timer: FrameTimer::new(),
        };

        // Swapchain bootstrap: one attachment texture owned by the frontend,
        // one target flagged as the presentable one.
        let tag = crate::render_tag!("swapchain");
        let texture = inner.create_texture2d_unlocked(tag);
        {
            let texture = inner.resources.textures2d.get_mut(texture);
            texture.record_format(if hdr {
                TextureFormat::RgbaF16
            } else {
                TextureFormat::Rgba8
            });
            texture.record_type(TextureType::Attachment);
            texture.record_levels(1);
            texture.record_filter(FilterOptions::default());
            texture.record_dimensions(resolution);
            texture.record_wrap((WrapType::ClampToEdge, WrapType::ClampToEdge));
            texture.mark_swapchain();
        }
        inner.initialize_texture2d_unlocked(tag, texture);

        let target = inner.create_target_unlocked(tag);
        {
            let dimensions = inner.resources.textures2d.get(texture).dimensions();
            let target = inner.resources.targets.get_mut(target);
            target.push_texture2d(texture, 0, dimensions);
            target.mark_swapchain();
            target.validate();
        }
        inner.commands.record(
            tag,
            Command::ResourceConstruct {
                resource: ResourceId::Target(target),
            },
        );

        inner.swapchain_texture = Some(texture);
        inner.swapchain_target = Some(target);

        Ok(Context {
            inner: Mutex::new(inner),
            counters: FrameCounters::new(),
            allocation_info,
            device_info,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn allocation_info(&self) -> AllocationInfo {
        self.allocation_info
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    pub fn max_texture_dimensions(&self) -> u32 {
        self.lock().max_texture_dimensions
    }

    pub fn swapchain(&self) -> TargetHandle {
        self.lock().swapchain_target.expect("no swapchain")
    }

    pub fn swapchain_texture(&self) -> Texture2DHandle {
        self.lock().swapchain_texture.expect("no swapchain")
    }

    // create_*

    pub fn create_buffer(&self, tag: Tag) -> BufferHandle {
        self.lock().create_buffer_unlocked(tag)
    }

    pub fn create_target(&self, tag: Tag) -> TargetHandle {
        self.lock().create_target_unlocked(tag)
    }

    pub fn create_program(&self, tag: Tag) -> ProgramHandle {
        self.lock().create_program_unlocked(tag)
    }

    pub fn create_texture1d(&self, tag: Tag) -> Texture1DHandle {
        self.lock().create_texture1d_unlocked(tag)
    }

    pub fn create_texture2d(&self, tag: Tag) -> Texture2DHandle {
        self.lock().create_texture2d_unlocked(tag)
    }

    pub fn create_texture3d(&self, tag: Tag) -> Texture3DHandle {
        self.lock().create_texture3d_unlocked(tag)
    }

    pub fn create_texture_cm(&self, tag: Tag) -> TextureCMHandle {
        self.lock().create_texture_cm_unlocked(tag)
    }

    // initialize_*

    pub fn initialize_buffer(&self, tag: Tag, buffer: BufferHandle) {
        let mut inner = self.lock();
        inner.resources.buffers.get(buffer).validate();
        inner.commands.record(
            tag,
            Command::ResourceConstruct {
                resource: ResourceId::Buffer(buffer),
            },
        );
    }

    pub fn initialize_target(&self, tag: Tag, target: TargetHandle) {
        let mut inner = self.lock();
        inner.resources.targets.get(target).validate();
        inner.commands.record(
            tag,
            Command::ResourceConstruct {
                resource: ResourceId::Target(target),
            },
        );
    }

    pub fn initialize_program(&self, tag: Tag, program: ProgramHandle) {
        let mut inner = self.lock();
        inner.resources.programs.get(program).validate();
        inner.commands.record(
            tag,
            Command::ResourceConstruct {
                resource: ResourceId::Program(program),
            },
        );
    }

    pub fn initialize_texture1d(&self, tag: Tag, texture: Texture1DHandle) {
        let mut inner = self.lock();
        inner.resources.textures1d.get(texture).validate();
        inner.commands.record(
            tag,
            Command::ResourceConstruct {
                resource: ResourceId::Texture1D(texture),
            },
        );
    }

    pub fn initialize_texture2d(&self, tag: Tag, texture: Texture2DHandle) {
        let mut inner = self.lock();
        inner.initialize_texture2d_unlocked(tag, texture);
    }

    pub fn initialize_texture3d(&self, tag: Tag, texture: Texture3DHandle) {
        let mut inner = self.lock();
        inner.resources.textures3d.get(texture).validate();
        inner.commands.record(
            tag,
            Command::ResourceConstruct {
                resource: ResourceId::Texture3D(texture),
            },
        );
    }

    pub fn initialize_texture_cm(&self, tag: Tag, texture: TextureCMHandle) {
        let mut inner = self.lock();
        inner.resources.textures_cm.get(texture).validate();
        inner.commands.record(
            tag,
            Command::ResourceConstruct {
                resource: ResourceId::TextureCM(texture),
            },
        );
    }

    // update_*

    pub fn update_buffer(&self, tag: Tag, buffer: BufferHandle) {
        let mut inner = self.lock();
        let edits = inner.resources.buffers.get_mut(buffer).take_edits();
        if edits.is_empty() {
            return;
        }
        inner.commands.record(
            tag,
            Command::ResourceUpdate {
                resource: ResourceId::Buffer(buffer),
                edits: Edits::Buffer(edits.into_boxed_slice()),
            },
        );
    }

    pub fn update_texture1d(&self, tag: Tag, texture: Texture1DHandle) {
        let mut inner = self.lock();
        let edits = inner.resources.textures1d.get_mut(texture).take_edits();
        if edits.is_empty() {
            return;
        }
        inner.commands.record(
            tag,
            Command::ResourceUpdate {
                resource: ResourceId::Texture1D(texture),
                edits: Edits::Texture1D(edits.into_boxed_slice()),
            },
        );
    }

    pub fn update_texture2d(&self, tag: Tag, texture: Texture2DHandle) {
        let mut inner = self.lock();
        let edits = inner.resources.textures2d.get_mut(texture).take_edits();
        if edits.is_empty() {
            return;
        }
        inner.commands.record(
            tag,
            Command::ResourceUpdate {
                resource: ResourceId::Texture2D(texture),
                edits: Edits::Texture2D(edits.into_boxed_slice()),
            },
        );
    }

    pub fn update_texture3d(&self, tag: Tag, texture: Texture3DHandle) {
        let mut inner = self.lock();
        let edits = inner.resources.textures3d.get_mut(texture).take_edits();
        if edits.is_empty() {
            return;
        }
        inner.commands.record(
            tag,
            Command::ResourceUpdate {
                resource: ResourceId::Texture3D(texture),
                edits: Edits::Texture3D(edits.into_boxed_slice()),
            },
        );
    }

    // destroy_*

    pub fn destroy_buffer(&self, tag: Tag, buffer: BufferHandle) {
        let mut inner = self.lock();
        if !inner.resources.buffers.get(buffer).tracker().release() {
            return;
        }
        remove_cached(&mut inner.cached_buffers, buffer);
        inner.commands.record(
            tag,
            Command::ResourceDestroy {
                resource: ResourceId::Buffer(buffer),
            },
        );
        inner.destroy_buffers.push(buffer);
    }

    /// Destroys the target and, through the unlocked variants, any owned
    /// depth/stencil attachment it requested.
    pub fn destroy_target(&self, tag: Tag, target: TargetHandle) {
        let mut inner = self.lock();
        if !inner.resources.targets.get(target).tracker().release() {
            return;
        }
        remove_cached(&mut inner.cached_targets, target);
        inner.commands.record(
            tag,
            Command::ResourceDestroy {
                resource: ResourceId::Target(target),
            },
        );
        inner.destroy_targets.push(target);

        let target_ref = inner.resources.targets.get(target);
        let owns = target_ref.owns_depth() || target_ref.owns_stencil();
        let owned_texture = target_ref.depth_stencil_texture();
        if owns {
            if let Some(texture) = owned_texture {
                inner.destroy_texture2d_unlocked(crate::render_tag!("target attachment"), texture);
            }
        }
    }

    pub fn destroy_program(&self, tag: Tag, program: ProgramHandle) {
        let mut inner = self.lock();
        if !inner.resources.programs.get(program).tracker().release() {
            return;
        }
        inner.commands.record(
            tag,
            Command::ResourceDestroy {
                resource: ResourceId::Program(program),
            },
        );
        inner.destroy_programs.push(program);
    }

    pub fn destroy_texture1d(&self, tag: Tag, texture: Texture1DHandle) {
        let mut inner = self.lock();
        if !inner.resources.textures1d.get(texture).tracker().release() {
            return;
        }
        remove_cached(&mut inner.cached_textures1d, texture);
        inner.commands.record(
            tag,
            Command::ResourceDestroy {
                resource: ResourceId::Texture1D(texture),
            },
        );
        inner.destroy_textures1d.push(texture);
    }

    pub fn destroy_texture2d(&self, tag: Tag, texture: Texture2DHandle) {
        self.lock().destroy_texture2d_unlocked(tag, texture);
    }

    pub fn destroy_texture3d(&self, tag: Tag, texture: Texture3DHandle) {
        let mut inner = self.lock();
        if !inner.resources.textures3d.get(texture).tracker().release() {
            return;
        }
        remove_cached(&mut inner.cached_textures3d, texture);
        inner.commands.record(
            tag,
            Command::ResourceDestroy {
                resource: ResourceId::Texture3D(texture),
            },
        );
        inner.destroy_textures3d.push(texture);
    }

    pub fn destroy_texture_cm(&self, tag: Tag, texture: TextureCMHandle) {
        let mut inner = self.lock();
        if !inner.resources.textures_cm.get(texture).tracker().release() {
            return;
        }
        remove_cached(&mut inner.cached_textures_cm, texture);
        inner.commands.record(
            tag,
            Command::ResourceDestroy {
                resource: ResourceId::TextureCM(texture),
            },
        );
        inner.destroy_textures_cm.push(texture);
    }

    // target composition

    /// Allocates and attaches an owned depth texture of `dimensions`.
    pub fn request_depth(
        &self,
        tag: Tag,
        target: TargetHandle,
        format: TextureFormat,
        dimensions: UVec2,
    ) {
        assert!(format.is_depth(), "not a valid depth format");
        let mut inner = self.lock();
        let texture = inner.request_attachment_unlocked(tag, format, dimensions);
        inner
            .resources
            .targets
            .get_mut(target)
            .set_depth(texture, dimensions, true);
        inner.update_target_usage(target);
    }

    /// Allocates and attaches an owned stencil texture of `dimensions`.
    pub fn request_stencil(
        &self,
        tag: Tag,
        target: TargetHandle,
        format: TextureFormat,
        dimensions: UVec2,
    ) {
        assert!(format.is_stencil(), "not a valid stencil format");
        let mut inner = self.lock();
        let texture = inner.request_attachment_unlocked(tag, format, dimensions);
        inner
            .resources
            .targets
            .get_mut(target)
            .set_stencil(texture, dimensions, true);
        inner.update_target_usage(target);
    }

    /// Allocates and attaches an owned combined depth-stencil texture.
    pub fn request_depth_stencil(
        &self,
        tag: Tag,
        target: TargetHandle,
        format: TextureFormat,
        dimensions: UVec2,
    ) {
        assert!(format.is_depth_stencil(), "not a valid depth stencil format");
        let mut inner = self.lock();
        let texture = inner.request_attachment_unlocked(tag, format, dimensions);
        inner
            .resources
            .targets
            .get_mut(target)
            .set_depth_stencil(texture, dimensions, true);
        inner.update_target_usage(target);
    }

    /// Attaches an externally owned depth texture.
    pub fn attach_depth(&self, target: TargetHandle, texture: Texture2DHandle) {
        let mut inner = self.lock();
        let (dimensions, format, kind) = {
            let texture = inner.resources.textures2d.get(texture);
            (texture.dimensions(), texture.format(), texture.kind())
        };
        assert!(format.is_depth(), "not a depth format texture");
        assert!(kind == TextureType::Attachment, "not attachable texture");
        inner
            .resources
            .targets
            .get_mut(target)
            .set_depth(texture, dimensions, false);
        inner.update_target_usage(target);
    }

    /// Attaches an externally owned stencil texture.
    pub fn attach_stencil(&self, target: TargetHandle, texture: Texture2DHandle) {
        let mut inner = self.lock();
        let (dimensions, format, kind) = {
            let texture = inner.resources.textures2d.get(texture);
            (texture.dimensions(), texture.format(), texture.kind())
        };
        assert!(format.is_stencil(), "not a stencil format texture");
        assert!(kind == TextureType::Attachment, "not attachable texture");
        inner
            .resources
            .targets
            .get_mut(target)
            .set_stencil(texture, dimensions, false);
        inner.update_target_usage(target);
    }

    /// Attaches an externally owned combined depth-stencil texture.
    pub fn attach_depth_stencil(&self, target: TargetHandle, texture: Texture2DHandle) {
        let mut inner = self.lock();
        let (dimensions, format, kind) = {
            let texture = inner.resources.textures2d.get(texture);
            (texture.dimensions(), texture.format(), texture.kind())
        };
        assert!(format.is_depth_stencil(), "not a depth stencil format texture");
        assert!(kind == TextureType::Attachment, "not attachable texture");
        inner
            .resources
            .targets
            .get_mut(target)
            .set_depth_stencil(texture, dimensions, false);
        inner.update_target_usage(target);
    }

    /// Adds a color attachment referencing mip `level` of a 2D texture.
    pub fn attach_texture2d(&self, target: TargetHandle, texture: Texture2DHandle, level: usize) {
        let mut inner = self.lock();
        let dimensions = {
            let texture = inner.resources.textures2d.get(texture);
            assert!(texture.kind() == TextureType::Attachment, "not attachable texture");
            assert!(texture.is_level_in_range(level), "level out of bounds");
            texture.info_for_level(level).dimensions
        };
        inner
            .resources
            .targets
            .get_mut(target)
            .push_texture2d(texture, level, dimensions);
        inner.update_target_usage(target);
    }

    /// Adds a color attachment referencing one face of a cubemap.
    pub fn attach_texture_cm(
        &self,
        target: TargetHandle,
        texture: TextureCMHandle,
        face: Face,
        level: usize,
    ) {
        let mut inner = self.lock();
        let dimensions = {
            let texture = inner.resources.textures_cm.get(texture);
            assert!(texture.kind() == TextureType::Attachment, "not attachable texture");
            assert!(texture.is_level_in_range(level), "level out of bounds");
            texture.info_for_level(level).dimensions
        };
        inner
            .resources
            .targets
            .get_mut(target)
            .push_texture_cm(texture, face, level, dimensions);
        inner.update_target_usage(target);
    }

    // drawing

    #[allow(clippy::too_many_arguments)]
    pub fn draw(
        &self,
        tag: Tag,
        state: &State,
        target: TargetHandle,
        draw_buffers: &Buffers,
        buffer: Option<BufferHandle>,
        program: ProgramHandle,
        count: usize,
        offset: usize,
        primitive: PrimitiveType,
        draw_textures: &DrawTextures,
    ) {
        assert!(
            state.viewport.dimensions().x * state.viewport.dimensions().y > 0,
            "empty viewport"
        );
        assert!(!draw_buffers.is_empty(), "missing draw buffers");
        assert!(count != 0, "empty draw call");
        if buffer.is_none() {
            assert!(offset == 0, "bufferless draws cannot have an offset");
        }

        self.counters.vertices.add(count as u64);
        match primitive {
            PrimitiveType::Lines => self.counters.lines.add(count as u64 / 2),
            PrimitiveType::Points => self.counters.points.add(count as u64),
            PrimitiveType::TriangleStrip => {
                self.counters.triangles.add((count as u64).saturating_sub(2))
            }
            PrimitiveType::Triangles => self.counters.triangles.add(count as u64 / 3),
        }

        {
            let mut inner = self.lock();
            let inner = &mut *inner;
            let program_ref = inner.resources.programs.get_mut(program);

            let dirty_uniforms = program_ref.dirty_uniforms_bitset();
            let dirty_size = program_ref.dirty_uniforms_size();
            let uniforms = inner.commands.allocate_bytes(dirty_size);
            if dirty_size != 0 {
                program_ref.flush_dirty_uniforms(inner.commands.bytes_mut(uniforms.clone()));
            }

            let mut state = *state;
            state.flush();

            inner.commands.record(
                tag,
                Command::Draw(DrawCommand {
                    state,
                    target,
                    buffer,
                    program,
                    count,
                    offset,
                    primitive,
                    draw_buffers: *draw_buffers,
                    draw_textures: *draw_textures,
                    dirty_uniforms,
                    uniforms,
                }),
            );
        }

        self.counters.draw_calls.add(1);
    }

    pub fn clear(
        &self,
        tag: Tag,
        state: &State,
        target: TargetHandle,
        draw_buffers: &Buffers,
        mask: u32,
        values: &[ClearValue],
    ) {
        assert!(
            state.viewport.dimensions().x * state.viewport.dimensions().y > 0,
            "empty viewport"
        );
        assert!(!draw_buffers.is_empty(), "expected draw buffers");
        assert!(mask != 0, "empty clear");

        let clear_depth = mask & CLEAR_DEPTH != 0;
        let clear_stencil = mask & CLEAR_STENCIL != 0;
        let clear_colors = mask >> 2;

        // Decode the value list in mask order: depth, stencil, then colors
        // by ascending attachment index.
        let mut cursor = values.iter();
        let mut depth_value = 0.0;
        let mut stencil_value = 0;
        let mut color_values = [[0.0f32; 4]; MAX_DRAW_BUFFERS];

        if clear_depth {
            match cursor.next() {
                Some(ClearValue::Depth(value)) => depth_value = *value,
                _ => panic!("expected depth clear value"),
            }
        }
        if clear_stencil {
            match cursor.next() {
                Some(ClearValue::Stencil(value)) => stencil_value = *value,
                _ => panic!("expected stencil clear value"),
            }
        }
        for index in 0..MAX_DRAW_BUFFERS {
            if clear_colors & (1 << index) != 0 {
                match cursor.next() {
                    Some(ClearValue::Color(value)) => color_values[index] = *value,
                    _ => panic!("expected color clear value"),
                }
            }
        }
        assert!(cursor.next().is_none(), "too many clear values");

        {
            let mut inner = self.lock();
            let mut state = *state;
            state.flush();
            inner.commands.record(
                tag,
                Command::Clear(ClearCommand {
                    state,
                    target,
                    draw_buffers: *draw_buffers,
                    clear_colors,
                    clear_depth,
                    clear_stencil,
                    depth_value,
                    stencil_value,
                    color_values,
                }),
            );
        }

        self.counters.clear_calls.add(1);
    }

    pub fn blit(
        &self,
        tag: Tag,
        state: &State,
        src_target: TargetHandle,
        src_attachment: usize,
        dst_target: TargetHandle,
        dst_attachment: usize,
    ) {
        assert!(src_target != dst_target, "cannot blit to self");

        {
            let mut inner = self.lock();
            {
                let src = inner.resources.targets.get(src_target);
                let dst = inner.resources.targets.get(dst_target);
                assert!(!src.is_swapchain(), "cannot use swapchain as source");
                assert!(src_attachment < src.attachments().len(), "source attachment out of bounds");
                assert!(
                    dst_attachment < dst.attachments().len(),
                    "destination attachment out of bounds"
                );

                let src_texture = match src.attachments()[src_attachment] {
                    crate::target::Attachment::Texture2D { texture, .. } => texture,
                    _ => panic!("source attachment not a 2D texture"),
                };
                let dst_texture = match dst.attachments()[dst_attachment] {
                    crate::target::Attachment::Texture2D { texture, .. } => texture,
                    _ => panic!("destination attachment not a 2D texture"),
                };
                // Targets may share attachments; a blit within one texture
                // makes no sense.
                assert!(src_texture != dst_texture, "cannot blit to self");

                let src_format = inner.resources.textures2d.get(src_texture).format();
                let dst_format = inner.resources.textures2d.get(dst_texture).format();
                assert!(src_format.is_color(), "cannot blit with non-color source attachment");
                assert!(dst_format.is_color(), "cannot blit with non-color destination attachment");
                assert!(
                    src_format.is_float_color() == dst_format.is_float_color(),
                    "incompatible formats between attachments"
                );
            }

            let mut state = *state;
            state.flush();
            inner.commands.record(
                tag,
                Command::Blit(BlitCommand {
                    state,
                    src_target,
                    src_attachment,
                    dst_target,
                    dst_attachment,
                }),
            );
        }

        self.counters.blit_calls.add(1);
    }

    /// Begins (`Some(tag)`) or ends (`None`) a GPU timing sample.
    pub fn profile(&self, tag: Option<&'static str>) {
        let mut inner = self.lock();
        inner
            .commands
            .record(crate::render_tag!("profile"), Command::Profile(tag));
    }

    /// Updates the swapchain texture and target dimensions. No allocations
    /// are rebuilt; the windowing system owns the storage.
    pub fn resize(&self, resolution: UVec2) {
        let mut inner = self.lock();
        let texture = inner.swapchain_texture.expect("no swapchain");
        let target = inner.swapchain_target.expect("no swapchain");
        inner
            .resources
            .textures2d
            .get_mut(texture)
            .override_dimensions(resolution);
        inner
            .resources
            .targets
            .get_mut(target)
            .override_dimensions(resolution);
    }

    /// Dispatches every recorded command to the backend, retires resources
    /// scheduled for destruction, and rotates the per-frame statistics.
    /// Returns false when there was nothing to do.
    pub fn process(&self) -> bool {
        let mut inner = self.lock();
        if inner.commands.is_empty() {
            return false;
        }

        {
            let inner = &mut *inner;
            inner.backend.process(Frame {
                resources: &inner.resources,
                commands: &inner.commands,
            });
        }

        // Destruction deferred to here so backend replay saw live slots.
        let destroy_buffers = std::mem::take(&mut inner.destroy_buffers);
        for handle in destroy_buffers {
            inner.resources.buffers.remove(handle);
        }
        let destroy_targets = std::mem::take(&mut inner.destroy_targets);
        for handle in destroy_targets {
            inner.resources.targets.remove(handle);
        }
        let destroy_programs = std::mem::take(&mut inner.destroy_programs);
        for handle in destroy_programs {
            inner.resources.programs.remove(handle);
        }
        let destroy_textures1d = std::mem::take(&mut inner.destroy_textures1d);
        for handle in destroy_textures1d {
            inner.resources.textures1d.remove(handle);
        }
        let destroy_textures2d = std::mem::take(&mut inner.destroy_textures2d);
        for handle in destroy_textures2d {
            inner.resources.textures2d.remove(handle);
        }
        let destroy_textures3d = std::mem::take(&mut inner.destroy_textures3d);
        for handle in destroy_textures3d {
            inner.resources.textures3d.remove(handle);
        }
        let destroy_textures_cm = std::mem::take(&mut inner.destroy_textures_cm);
        for handle in destroy_textures_cm {
            inner.resources.textures_cm.remove(handle);
        }

        inner.commands.reset();
        self.counters.rotate();
        true
    }

    /// Presents and ticks the frame timer. Returns true when the FPS counter
    /// rolled over a second.
    pub fn swap(&self) -> bool {
        let mut inner = self.lock();
        let inner = &mut *inner;
        inner.backend.swap();
        inner.timer.update()
    }

    pub fn frame(&self) -> u64 {
        self.lock().timer.frame()
    }

    pub fn delta_time(&self) -> f32 {
        self.lock().timer.delta_time()
    }

    // statistics

    pub fn stats(&self, kind: ResourceKind) -> Statistics {
        let inner = self.lock();
        let resources = &inner.resources;
        match kind {
            ResourceKind::Buffer => Statistics {
                total: resources.buffers.capacity(),
                used: resources.buffers.size(),
                cached: inner.cached_buffers.len(),
                memory: resources.buffers.iter().map(|(_, b)| b.tracker().usage()).sum(),
            },
            ResourceKind::Target => Statistics {
                total: resources.targets.capacity(),
                used: resources.targets.size(),
                cached: inner.cached_targets.len(),
                memory: resources.targets.iter().map(|(_, t)| t.tracker().usage()).sum(),
            },
            ResourceKind::Program => Statistics {
                total: resources.programs.capacity(),
                used: resources.programs.size(),
                cached: 0,
                memory: 0,
            },
            ResourceKind::Texture1D => Statistics {
                total: resources.textures1d.capacity(),
                used: resources.textures1d.size(),
                cached: inner.cached_textures1d.len(),
                memory: resources.textures1d.iter().map(|(_, t)| t.tracker().usage()).sum(),
            },
            ResourceKind::Texture2D => Statistics {
                total: resources.textures2d.capacity(),
                used: resources.textures2d.size(),
                cached: inner.cached_textures2d.len(),
                memory: resources.textures2d.iter().map(|(_, t)| t.tracker().usage()).sum(),
            },
            ResourceKind::Texture3D => Statistics {
                total: resources.textures3d.capacity(),
                used: resources.textures3d.size(),
                cached: inner.cached_textures3d.len(),
                memory: resources.textures3d.iter().map(|(_, t)| t.tracker().usage()).sum(),
            },
            ResourceKind::TextureCM => Statistics {
                total: resources.textures_cm.capacity(),
                used: resources.textures_cm.size(),
                cached: inner.cached_textures_cm.len(),
                memory: resources.textures_cm.iter().map(|(_, t)| t.tracker().usage()).sum(),
            },
        }
    }

    /// Previous frame's counters.
    pub fn frame_stats(&self) -> FrameStatistics {
        FrameStatistics {
            draw_calls: self.counters.draw_calls.finished(),
            clear_calls: self.counters.clear_calls.finished(),
            blit_calls: self.counters.blit_calls.finished(),
            vertices: self.counters.vertices.finished(),
            points: self.counters.points.finished(),
            lines: self.counters.lines.finished(),
            triangles: self.counters.triangles.finished(),
        }
    }

    // named caches

    pub fn cache_buffer(&self, buffer: BufferHandle, key: &str) {
        self.lock().cached_buffers.insert(key.to_string(), buffer);
    }

    pub fn cache_target(&self, target: TargetHandle, key: &str) {
        self.lock().cached_targets.insert(key.to_string(), target);
    }

    pub fn cache_texture1d(&self, texture: Texture1DHandle, key: &str) {
        self.lock().cached_textures1d.insert(key.to_string(), texture);
    }

    pub fn cache_texture2d(&self, texture: Texture2DHandle, key: &str) {
        self.lock().cached_textures2d.insert(key.to_string(), texture);
    }

    pub fn cache_texture3d(&self, texture: Texture3DHandle, key: &str) {
        self.lock().cached_textures3d.insert(key.to_string(), texture);
    }

    pub fn cache_texture_cm(&self, texture: TextureCMHandle, key: &str) {
        self.lock().cached_textures_cm.insert(key.to_string(), texture);
    }

    /// Looks up a cached buffer, taking a reference for the caller.
    pub fn cached_buffer(&self, key: &str) -> Option<BufferHandle> {
        let inner = self.lock();
        let handle = inner.cached_buffers.get(key).copied()?;
        inner.resources.buffers.get(handle).tracker().acquire();
        Some(handle)
    }

    pub fn cached_target(&self, key: &str) -> Option<TargetHandle> {
        let inner = self.lock();
        let handle = inner.cached_targets.get(key).copied()?;
        inner.resources.targets.get(handle).tracker().acquire();
        Some(handle)
    }

    pub fn cached_texture1d(&self, key: &str) -> Option<Texture1DHandle> {
        let inner = self.lock();
        let handle = inner.cached_textures1d.get(key).copied()?;
        inner.resources.textures1d.get(handle).tracker().acquire();
        Some(handle)
    }

    pub fn cached_texture2d(&self, key: &str) -> Option<Texture2DHandle> {
        let inner = self.lock();
        let handle = inner.cached_textures2d.get(key).copied()?;
        inner.resources.textures2d.get(handle).tracker().acquire();
        Some(handle)
    }

    pub fn cached_texture3d(&self, key: &str) -> Option<Texture3DHandle> {
        let inner = self.lock();
        let handle = inner.cached_textures3d.get(key).copied()?;
        inner.resources.textures3d.get(handle).tracker().acquire();
        Some(handle)
    }

    pub fn cached_texture_cm(&self, key: &str) -> Option<TextureCMHandle> {
        let inner = self.lock();
        let handle = inner.cached_textures_cm.get(key).copied()?;
        inner.resources.textures_cm.get(handle).tracker().acquire();
        Some(handle)
    }

    // techniques

    pub fn insert_technique(&self, description: TechniqueDescription) {
        let mut inner = self.lock();
        let name = description.name.clone();
        inner.techniques.insert(name, Technique::new(description));
    }

    pub fn has_technique(&self, name: &str) -> bool {
        self.lock().techniques.contains_key(name)
    }

    /// Returns the concrete program for `flags` within the named technique,
    /// building and initializing it on first use.
    pub fn permute(&self, tag: Tag, technique: &str, flags: u64) -> Option<ProgramHandle> {
        self.lock().permute_unlocked(tag, technique, flags)
    }
}

// Resource access guards: hold the context lock and deref to the resource.

macro_rules! resource_guards {
    ($guard:ident, $handle:ty, $resource:ty, $pool:ident, $method:ident) => {
        pub struct $guard<'a> {
            inner: MutexGuard<'a, Inner>,
            handle: $handle,
        }

        impl<'a> std::ops::Deref for $guard<'a> {
            type Target = $resource;

            fn deref(&self) -> &$resource {
                self.inner.resources.$pool.get(self.handle)
            }
        }

        impl<'a> std::ops::DerefMut for $guard<'a> {
            fn deref_mut(&mut self) -> &mut $resource {
                self.inner.resources.$pool.get_mut(self.handle)
            }
        }

        impl Context {
            pub fn $method(&self, handle: $handle) -> $guard<'_> {
                $guard {
                    inner: self.lock(),
                    handle,
                }
            }
        }
    };
}

resource_guards!(BufferGuard, BufferHandle, Buffer, buffers, buffer);
resource_guards!(TargetGuard, TargetHandle, Target, targets, target);
resource_guards!(ProgramGuard, ProgramHandle, Program, programs, program);
resource_guards!(Texture1DGuard, Texture1DHandle, Texture1D, textures1d, texture1d);
resource_guards!(Texture2DGuard, Texture2DHandle, Texture2D, textures2d, texture2d);
resource_guards!(Texture3DGuard, Texture3DHandle, Texture3D, textures3d, texture3d);
resource_guards!(TextureCMGuard, TextureCMHandle, TextureCM, textures_cm, texture_cm);

fn cvar_usize(cfg: &config::Config, key: &str, default: usize) -> usize {
    cfg.get::<usize>(key).unwrap_or(default)
}

fn cvar_resolution(cfg: &config::Config) -> UVec2 {
    cfg.get::<Vec<u32>>("display.resolution")
        .ok()
        .and_then(|values| {
            if values.len() == 2 {
                Some(UVec2::new(values[0], values[1]))
            } else {
                None
            }
        })
        .unwrap_or_else(|| UVec2::new(1600, 900))
}
