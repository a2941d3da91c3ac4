//! OpenGL 3.3 core backend: replays the frontend's command stream.
//!
//! Backend-private state lives in per-kind slot tables keyed by the handle
//! index of the frontend resource, built on `resource_allocate` and dropped
//! on `resource_destroy`. Replay goes through the shadow state so redundant
//! driver calls are elided.

use crate::api as gl;
use crate::api::types::*;
use crate::api::Gl;
use crate::convert::*;
use crate::shader::link_program;
use crate::state::ShadowState;
use crate::window::PlatformWindow;
use karst_render::backend::{AllocationInfo, Backend, DeviceInfo, Frame, Resources};
use karst_render::buffer::{BufferType, EditSource, ElementType};
use karst_render::command::{
    Buffers, Command, CommandBuffer, CommandRecord, DrawCommand, Edits, ResourceId,
    TEXTURE_TAG_1D, TEXTURE_TAG_2D, TEXTURE_TAG_3D, TEXTURE_TAG_CM,
};
use karst_render::program::UniformType;
use karst_render::target::{Attachment, Target};
use karst_render::texture::Face;
use log::{info, log_enabled, trace, Level};
use smallvec::SmallVec;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::time::Instant;

// Empty-side reserve so later updates have storage to grow into.
const BUFFER_SLAB_SIZE: usize = 16 << 20;

struct SlotTable<T>(Vec<Option<T>>);

impl<T> SlotTable<T> {
    fn new() -> SlotTable<T> {
        SlotTable(Vec::new())
    }

    fn insert(&mut self, index: usize, value: T) {
        if index >= self.0.len() {
            self.0.resize_with(index + 1, || None);
        }
        debug_assert!(self.0[index].is_none());
        self.0[index] = Some(value);
    }

    fn remove(&mut self, index: usize) -> T {
        self.0[index].take().expect("stale backend slot")
    }

    fn get(&self, index: usize) -> &T {
        self.0[index].as_ref().expect("stale backend slot")
    }

    fn get_mut(&mut self, index: usize) -> &mut T {
        self.0[index].as_mut().expect("stale backend slot")
    }
}

struct BufferSlot {
    bo: [GLuint; 2],
    va: GLuint,
    vertices_size: usize,
    elements_size: usize,
}

struct TargetSlot {
    fbo: GLuint,
    owned: bool,
    draw_buffers: Buffers,
    read_buffers: Buffers,
}

struct ProgramSlot {
    handle: GLuint,
    uniforms: Vec<GLint>,
}

struct TextureSlot {
    tex: GLuint,
}

struct Slots {
    buffers: SlotTable<BufferSlot>,
    targets: SlotTable<TargetSlot>,
    programs: SlotTable<ProgramSlot>,
    textures1d: SlotTable<TextureSlot>,
    textures2d: SlotTable<TextureSlot>,
    textures3d: SlotTable<TextureSlot>,
    textures_cm: SlotTable<TextureSlot>,
}

impl Slots {
    fn new() -> Slots {
        Slots {
            buffers: SlotTable::new(),
            targets: SlotTable::new(),
            programs: SlotTable::new(),
            textures1d: SlotTable::new(),
            textures2d: SlotTable::new(),
            textures3d: SlotTable::new(),
            textures_cm: SlotTable::new(),
        }
    }
}

pub struct Es3 {
    window: Box<dyn PlatformWindow>,
    gl: Option<Gl>,
    shadow: Option<ShadowState>,
    slots: Slots,
    // VAO used for bufferless draws; core profile refuses to draw without
    // one bound.
    bufferless_vao: GLuint,
    samples: Vec<(&'static str, Instant)>,
}

impl Es3 {
    pub fn new(window: Box<dyn PlatformWindow>) -> Es3 {
        Es3 {
            window,
            gl: None,
            shadow: None,
            slots: Slots::new(),
            bufferless_vao: 0,
            samples: Vec::new(),
        }
    }
}

// GL entry points are only reached from process()/swap(), which the
// frontend contract pins to the render thread.
unsafe impl Send for Es3 {}

impl Backend for Es3 {
    fn query_allocation_info(&self) -> AllocationInfo {
        AllocationInfo {
            buffer_size: std::mem::size_of::<BufferSlot>(),
            target_size: std::mem::size_of::<TargetSlot>(),
            program_size: std::mem::size_of::<ProgramSlot>(),
            texture1d_size: std::mem::size_of::<TextureSlot>(),
            texture2d_size: std::mem::size_of::<TextureSlot>(),
            texture3d_size: std::mem::size_of::<TextureSlot>(),
            texture_cm_size: std::mem::size_of::<TextureSlot>(),
        }
    }

    fn query_device_info(&self) -> DeviceInfo {
        let gl = match &self.gl {
            Some(gl) => gl,
            None => return DeviceInfo::default(),
        };
        unsafe {
            DeviceInfo {
                vendor: gl_string(gl, gl::VENDOR),
                renderer: gl_string(gl, gl::RENDERER),
                version: gl_string(gl, gl::VERSION),
            }
        }
    }

    fn init(&mut self) -> bool {
        if !self.window.acquire_context() {
            return false;
        }

        let window = &self.window;
        let gl = Gl::load_with(|name| window.get_proc_address(name));

        unsafe {
            info!(
                target: "render/es3",
                "GL {} {} {}",
                gl_string(&gl, gl::VENDOR),
                gl_string(&gl, gl::VERSION),
                gl_string(&gl, gl::RENDERER)
            );

            if log_enabled!(target: "render/es3", Level::Trace) {
                let mut extensions: GLint = 0;
                gl.GetIntegerv(gl::NUM_EXTENSIONS, &mut extensions);
                for index in 0..extensions {
                    let name = gl.GetStringi(gl::EXTENSIONS, index as GLuint);
                    if !name.is_null() {
                        let name = CStr::from_ptr(name as *const c_char);
                        trace!(target: "render/es3", "extension '{}' supported", name.to_string_lossy());
                    }
                }
            }

            gl.GenVertexArrays(1, &mut self.bufferless_vao);
        }

        self.shadow = Some(ShadowState::new(&gl));
        self.gl = Some(gl);
        true
    }

    fn process(&mut self, frame: Frame<'_>) {
        let Es3 {
            gl,
            shadow,
            slots,
            bufferless_vao,
            samples,
            ..
        } = self;
        let gl = gl.as_ref().expect("backend not initialized");
        let shadow = shadow.as_mut().expect("backend not initialized");

        for record in frame.commands.iter() {
            process_record(
                gl,
                shadow,
                slots,
                samples,
                *bufferless_vao,
                frame.resources,
                frame.commands,
                record,
            );
        }
    }

    fn swap(&mut self) {
        self.window.swap_buffers();
    }
}

unsafe fn gl_string(gl: &Gl, name: GLenum) -> String {
    let value = gl.GetString(name);
    if value.is_null() {
        String::new()
    } else {
        CStr::from_ptr(value as *const c_char)
            .to_string_lossy()
            .into_owned()
    }
}

/// Binds `target` as the draw framebuffer and applies the draw-buffer set.
/// Draw buffers never change on the swapchain; the window system owns its
/// attachment layout.
fn use_draw_target(
    gl: &Gl,
    shadow: &mut ShadowState,
    slot: &mut TargetSlot,
    target: &Target,
    draw_buffers: Option<&Buffers>,
) {
    shadow.use_draw_fbo(gl, slot.fbo);

    if let Some(draw_buffers) = draw_buffers {
        if !target.is_swapchain() && slot.draw_buffers != *draw_buffers {
            unsafe {
                if draw_buffers.is_empty() {
                    gl.DrawBuffer(gl::NONE);
                } else {
                    let attachments: SmallVec<[GLenum; 8]> = draw_buffers
                        .indices()
                        .iter()
                        .map(|&attachment| gl::COLOR_ATTACHMENT0 + attachment as GLenum)
                        .collect();
                    gl.DrawBuffers(attachments.len() as GLsizei, attachments.as_ptr());
                }
            }
            slot.draw_buffers = *draw_buffers;
        }
    }
}

fn use_read_target(
    gl: &Gl,
    shadow: &mut ShadowState,
    slot: &mut TargetSlot,
    target: &Target,
    read_buffers: Option<&Buffers>,
) {
    shadow.use_read_fbo(gl, slot.fbo);

    if let Some(read_buffers) = read_buffers {
        if !target.is_swapchain() && slot.read_buffers != *read_buffers {
            unsafe {
                if read_buffers.is_empty() {
                    gl.ReadBuffer(gl::NONE);
                } else {
                    let last = read_buffers.indices()[read_buffers.len() - 1];
                    gl.ReadBuffer(gl::COLOR_ATTACHMENT0 + last as GLenum);
                }
            }
            slot.read_buffers = *read_buffers;
        }
    }
}

fn cube_face_enum(face: Face) -> GLenum {
    gl::TEXTURE_CUBE_MAP_POSITIVE_X + face.index() as GLenum
}

#[allow(clippy::too_many_arguments)]
fn process_record(
    gl: &Gl,
    shadow: &mut ShadowState,
    slots: &mut Slots,
    samples: &mut Vec<(&'static str, Instant)>,
    bufferless_vao: GLuint,
    resources: &Resources,
    commands: &CommandBuffer,
    record: &CommandRecord,
) {
    match &record.command {
        Command::ResourceAllocate { resource } => match *resource {
            ResourceId::Buffer(handle) => {
                let mut bo = [0; 2];
                let mut va = 0;
                unsafe {
                    gl.GenBuffers(2, bo.as_mut_ptr());
                    gl.GenVertexArrays(1, &mut va);
                }
                slots.buffers.insert(
                    handle.index(),
                    BufferSlot {
                        bo,
                        va,
                        vertices_size: 0,
                        elements_size: 0,
                    },
                );
            }
            ResourceId::Target(handle) => {
                let slot = if resources.target(handle).is_swapchain() {
                    // The display target replays onto whatever framebuffer
                    // the window system had bound at startup.
                    TargetSlot {
                        fbo: shadow.swapchain_fbo,
                        owned: false,
                        draw_buffers: Buffers::new(),
                        read_buffers: Buffers::new(),
                    }
                } else {
                    let mut fbo = 0;
                    unsafe {
                        gl.GenFramebuffers(1, &mut fbo);
                    }
                    TargetSlot {
                        fbo,
                        owned: true,
                        draw_buffers: Buffers::new(),
                        read_buffers: Buffers::new(),
                    }
                };
                slots.targets.insert(handle.index(), slot);
            }
            ResourceId::Program(handle) => {
                let program = unsafe { gl.CreateProgram() };
                slots.programs.insert(
                    handle.index(),
                    ProgramSlot {
                        handle: program,
                        uniforms: Vec::new(),
                    },
                );
            }
            ResourceId::Texture1D(handle) => {
                slots.textures1d.insert(handle.index(), gen_texture(gl));
            }
            ResourceId::Texture2D(handle) => {
                if resources.texture2d(handle).is_swapchain() {
                    return;
                }
                slots.textures2d.insert(handle.index(), gen_texture(gl));
            }
            ResourceId::Texture3D(handle) => {
                slots.textures3d.insert(handle.index(), gen_texture(gl));
            }
            ResourceId::TextureCM(handle) => {
                slots.textures_cm.insert(handle.index(), gen_texture(gl));
            }
        },

        Command::ResourceConstruct { resource } => match *resource {
            ResourceId::Buffer(handle) => {
                let buffer = resources.buffer(handle);
                let slot = slots.buffers.get_mut(handle.index());
                let usage = buffer_usage(buffer.kind());

                shadow.use_vao(gl, slot.va);
                shadow.use_vbo(gl, slot.bo[0]);
                shadow.use_ebo(gl, slot.bo[1]);

                unsafe {
                    let vertices = buffer.vertices();
                    if !vertices.is_empty() {
                        gl.BufferData(
                            gl::ARRAY_BUFFER,
                            vertices.len() as GLsizeiptr,
                            vertices.as_ptr() as *const _,
                            usage,
                        );
                        slot.vertices_size = vertices.len();
                    } else {
                        gl.BufferData(
                            gl::ARRAY_BUFFER,
                            BUFFER_SLAB_SIZE as GLsizeiptr,
                            std::ptr::null(),
                            usage,
                        );
                        slot.vertices_size = BUFFER_SLAB_SIZE;
                    }

                    let elements = buffer.elements();
                    if !elements.is_empty() {
                        gl.BufferData(
                            gl::ELEMENT_ARRAY_BUFFER,
                            elements.len() as GLsizeiptr,
                            elements.as_ptr() as *const _,
                            usage,
                        );
                        slot.elements_size = elements.len();
                    } else {
                        gl.BufferData(
                            gl::ELEMENT_ARRAY_BUFFER,
                            BUFFER_SLAB_SIZE as GLsizeiptr,
                            std::ptr::null(),
                            usage,
                        );
                        slot.elements_size = BUFFER_SLAB_SIZE;
                    }

                    for (index, attribute) in buffer.attributes().iter().enumerate() {
                        let index = index as GLuint;
                        gl.EnableVertexAttribArray(index);
                        let kind = match attribute.kind {
                            karst_render::buffer::AttributeType::F32 => gl::FLOAT,
                            karst_render::buffer::AttributeType::U8 => gl::UNSIGNED_BYTE,
                        };
                        gl.VertexAttribPointer(
                            index,
                            attribute.count as GLint,
                            kind,
                            gl::FALSE,
                            buffer.stride() as GLsizei,
                            attribute.offset as *const _,
                        );
                    }
                }
            }
            ResourceId::Target(handle) => {
                let target = resources.target(handle);
                if target.is_swapchain() {
                    // No user-defined attachments on the display target.
                    return;
                }

                {
                    let slot = slots.targets.get_mut(handle.index());
                    use_draw_target(gl, shadow, slot, target, None);
                }

                if let Some(texture) = target.depth_stencil() {
                    attach_texture2d(gl, slots, texture, gl::DEPTH_STENCIL_ATTACHMENT, 0);
                } else if let Some(texture) = target.depth() {
                    attach_texture2d(gl, slots, texture, gl::DEPTH_ATTACHMENT, 0);
                } else if let Some(texture) = target.stencil() {
                    attach_texture2d(gl, slots, texture, gl::STENCIL_ATTACHMENT, 0);
                }

                for (index, attachment) in target.attachments().iter().enumerate() {
                    let attachment_enum = gl::COLOR_ATTACHMENT0 + index as GLenum;
                    match *attachment {
                        Attachment::Texture2D { texture, level } => {
                            attach_texture2d(gl, slots, texture, attachment_enum, level);
                        }
                        Attachment::TextureCM {
                            texture,
                            face,
                            level,
                        } => unsafe {
                            gl.FramebufferTexture2D(
                                gl::DRAW_FRAMEBUFFER,
                                attachment_enum,
                                cube_face_enum(face),
                                slots.textures_cm.get(texture.index()).tex,
                                level as GLint,
                            );
                        },
                    }
                }
            }
            ResourceId::Program(handle) => {
                let program = resources.program(handle);
                let slot = slots.programs.get_mut(handle.index());
                slot.uniforms = link_program(
                    gl,
                    slot.handle,
                    program.uniforms(),
                    &program.description().defines,
                    program.shaders(),
                );
            }
            ResourceId::Texture1D(handle) => {
                let texture = resources.texture1d(handle);
                let slot = slots.textures1d.get(handle.index());
                shadow.use_texture(gl, gl::TEXTURE_1D, slot.tex);

                let filter = convert_texture_filter(texture.filter());
                let format = texture.format();
                unsafe {
                    gl.TexParameteri(gl::TEXTURE_1D, gl::TEXTURE_MIN_FILTER, filter.min);
                    gl.TexParameteri(gl::TEXTURE_1D, gl::TEXTURE_MAG_FILTER, filter.mag);
                    gl.TexParameteri(
                        gl::TEXTURE_1D,
                        gl::TEXTURE_WRAP_S,
                        convert_texture_wrap(texture.wrap()),
                    );
                    gl.TexParameteri(gl::TEXTURE_1D, gl::TEXTURE_BASE_LEVEL, 0);
                    gl.TexParameteri(
                        gl::TEXTURE_1D,
                        gl::TEXTURE_MAX_LEVEL,
                        texture.levels() as GLint - 1,
                    );
                    set_border_color(gl, gl::TEXTURE_1D, texture.border());

                    let data = texture.data();
                    for level in 0..texture.levels() {
                        let info = texture.info_for_level(level);
                        let pixels = level_pixels(data, info.offset);
                        if texture.is_compressed_format() {
                            gl.CompressedTexImage1D(
                                gl::TEXTURE_1D,
                                level as GLint,
                                convert_texture_data_format(format),
                                info.dimensions as GLsizei,
                                0,
                                info.size as GLsizei,
                                pixels,
                            );
                        } else {
                            gl.TexImage1D(
                                gl::TEXTURE_1D,
                                level as GLint,
                                convert_texture_data_format(format) as GLint,
                                info.dimensions as GLsizei,
                                0,
                                convert_texture_format(format),
                                convert_texture_data_type(format),
                                pixels,
                            );
                        }
                    }
                }
            }
            ResourceId::Texture2D(handle) => {
                let texture = resources.texture2d(handle);
                if texture.is_swapchain() {
                    return;
                }
                let slot = slots.textures2d.get(handle.index());
                shadow.use_texture(gl, gl::TEXTURE_2D, slot.tex);

                let filter = convert_texture_filter(texture.filter());
                let format = texture.format();
                let wrap = texture.wrap();
                unsafe {
                    gl.TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, filter.min);
                    gl.TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, filter.mag);
                    gl.TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, convert_texture_wrap(wrap.0));
                    gl.TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, convert_texture_wrap(wrap.1));
                    gl.TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_BASE_LEVEL, 0);
                    gl.TexParameteri(
                        gl::TEXTURE_2D,
                        gl::TEXTURE_MAX_LEVEL,
                        texture.levels() as GLint - 1,
                    );
                    set_border_color(gl, gl::TEXTURE_2D, texture.border());

                    let data = texture.data();
                    for level in 0..texture.levels() {
                        let info = texture.info_for_level(level);
                        let pixels = level_pixels(data, info.offset);
                        if texture.is_compressed_format() {
                            gl.CompressedTexImage2D(
                                gl::TEXTURE_2D,
                                level as GLint,
                                convert_texture_data_format(format),
                                info.dimensions.x as GLsizei,
                                info.dimensions.y as GLsizei,
                                0,
                                info.size as GLsizei,
                                pixels,
                            );
                        } else {
                            gl.TexImage2D(
                                gl::TEXTURE_2D,
                                level as GLint,
                                convert_texture_data_format(format) as GLint,
                                info.dimensions.x as GLsizei,
                                info.dimensions.y as GLsizei,
                                0,
                                convert_texture_format(format),
                                convert_texture_data_type(format),
                                pixels,
                            );
                        }
                    }
                }
            }
            ResourceId::Texture3D(handle) => {
                let texture = resources.texture3d(handle);
                let slot = slots.textures3d.get(handle.index());
                shadow.use_texture(gl, gl::TEXTURE_3D, slot.tex);

                let filter = convert_texture_filter(texture.filter());
                let format = texture.format();
                let wrap = texture.wrap();
                unsafe {
                    gl.TexParameteri(gl::TEXTURE_3D, gl::TEXTURE_MIN_FILTER, filter.min);
                    gl.TexParameteri(gl::TEXTURE_3D, gl::TEXTURE_MAG_FILTER, filter.mag);
                    gl.TexParameteri(gl::TEXTURE_3D, gl::TEXTURE_WRAP_S, convert_texture_wrap(wrap.0));
                    gl.TexParameteri(gl::TEXTURE_3D, gl::TEXTURE_WRAP_T, convert_texture_wrap(wrap.1));
                    gl.TexParameteri(gl::TEXTURE_3D, gl::TEXTURE_WRAP_R, convert_texture_wrap(wrap.2));
                    gl.TexParameteri(gl::TEXTURE_3D, gl::TEXTURE_BASE_LEVEL, 0);
                    gl.TexParameteri(
                        gl::TEXTURE_3D,
                        gl::TEXTURE_MAX_LEVEL,
                        texture.levels() as GLint - 1,
                    );
                    set_border_color(gl, gl::TEXTURE_3D, texture.border());

                    let data = texture.data();
                    for level in 0..texture.levels() {
                        let info = texture.info_for_level(level);
                        let pixels = level_pixels(data, info.offset);
                        if texture.is_compressed_format() {
                            gl.CompressedTexImage3D(
                                gl::TEXTURE_3D,
                                level as GLint,
                                convert_texture_data_format(format),
                                info.dimensions.x as GLsizei,
                                info.dimensions.y as GLsizei,
                                info.dimensions.z as GLsizei,
                                0,
                                info.size as GLsizei,
                                pixels,
                            );
                        } else {
                            gl.TexImage3D(
                                gl::TEXTURE_3D,
                                level as GLint,
                                convert_texture_data_format(format) as GLint,
                                info.dimensions.x as GLsizei,
                                info.dimensions.y as GLsizei,
                                info.dimensions.z as GLsizei,
                                0,
                                convert_texture_format(format),
                                convert_texture_data_type(format),
                                pixels,
                            );
                        }
                    }
                }
            }
            ResourceId::TextureCM(handle) => {
                let texture = resources.texture_cm(handle);
                let slot = slots.textures_cm.get(handle.index());
                shadow.use_texture(gl, gl::TEXTURE_CUBE_MAP, slot.tex);

                let filter = convert_texture_filter(texture.filter());
                let format = texture.format();
                let wrap = texture.wrap();
                unsafe {
                    gl.TexParameteri(gl::TEXTURE_CUBE_MAP, gl::TEXTURE_MIN_FILTER, filter.min);
                    gl.TexParameteri(gl::TEXTURE_CUBE_MAP, gl::TEXTURE_MAG_FILTER, filter.mag);
                    gl.TexParameteri(
                        gl::TEXTURE_CUBE_MAP,
                        gl::TEXTURE_WRAP_S,
                        convert_texture_wrap(wrap.0),
                    );
                    gl.TexParameteri(
                        gl::TEXTURE_CUBE_MAP,
                        gl::TEXTURE_WRAP_T,
                        convert_texture_wrap(wrap.1),
                    );
                    gl.TexParameteri(
                        gl::TEXTURE_CUBE_MAP,
                        gl::TEXTURE_WRAP_R,
                        convert_texture_wrap(wrap.2),
                    );
                    gl.TexParameteri(gl::TEXTURE_CUBE_MAP, gl::TEXTURE_BASE_LEVEL, 0);
                    gl.TexParameteri(
                        gl::TEXTURE_CUBE_MAP,
                        gl::TEXTURE_MAX_LEVEL,
                        texture.levels() as GLint - 1,
                    );
                    set_border_color(gl, gl::TEXTURE_CUBE_MAP, texture.border());

                    // Six faces per level, each level.size / 6 bytes.
                    let data = texture.data();
                    for level in 0..texture.levels() {
                        let info = texture.info_for_level(level);
                        let face_size = info.size / 6;
                        for face in 0..6 {
                            let pixels = level_pixels(data, info.offset + face_size * face);
                            let face_enum = gl::TEXTURE_CUBE_MAP_POSITIVE_X + face as GLenum;
                            if texture.is_compressed_format() {
                                gl.CompressedTexImage2D(
                                    face_enum,
                                    level as GLint,
                                    convert_texture_data_format(format),
                                    info.dimensions.x as GLsizei,
                                    info.dimensions.y as GLsizei,
                                    0,
                                    face_size as GLsizei,
                                    pixels,
                                );
                            } else {
                                gl.TexImage2D(
                                    face_enum,
                                    level as GLint,
                                    convert_texture_data_format(format) as GLint,
                                    info.dimensions.x as GLsizei,
                                    info.dimensions.y as GLsizei,
                                    0,
                                    convert_texture_format(format),
                                    convert_texture_data_type(format),
                                    pixels,
                                );
                            }
                        }
                    }
                }
            }
        },

        Command::ResourceUpdate { resource, edits } => match (*resource, edits) {
            (ResourceId::Buffer(handle), Edits::Buffer(edits)) => {
                let buffer = resources.buffer(handle);
                let slot = slots.buffers.get_mut(handle.index());
                let usage = buffer_usage(buffer.kind());

                shadow.use_vao(gl, slot.va);
                shadow.use_vbo(gl, slot.bo[0]);
                shadow.use_ebo(gl, slot.bo[1]);

                let vertices = buffer.vertices();
                let elements = buffer.elements();

                // Grown sides respecify their whole storage; edits then only
                // apply to sides still within bounds.
                let vertices_respecified = vertices.len() > slot.vertices_size;
                if vertices_respecified {
                    unsafe {
                        gl.BufferData(
                            gl::ARRAY_BUFFER,
                            vertices.len() as GLsizeiptr,
                            vertices.as_ptr() as *const _,
                            usage,
                        );
                    }
                    slot.vertices_size = vertices.len();
                }

                let elements_respecified = elements.len() > slot.elements_size;
                if elements_respecified {
                    unsafe {
                        gl.BufferData(
                            gl::ELEMENT_ARRAY_BUFFER,
                            elements.len() as GLsizeiptr,
                            elements.as_ptr() as *const _,
                            usage,
                        );
                    }
                    slot.elements_size = elements.len();
                }

                for edit in edits.iter() {
                    match edit.source {
                        EditSource::Vertices if !vertices_respecified => unsafe {
                            gl.BufferSubData(
                                gl::ARRAY_BUFFER,
                                edit.offset as GLintptr,
                                edit.size as GLsizeiptr,
                                vertices[edit.offset..].as_ptr() as *const _,
                            );
                        },
                        EditSource::Elements if !elements_respecified => unsafe {
                            gl.BufferSubData(
                                gl::ELEMENT_ARRAY_BUFFER,
                                edit.offset as GLintptr,
                                edit.size as GLsizeiptr,
                                elements[edit.offset..].as_ptr() as *const _,
                            );
                        },
                        _ => {}
                    }
                }
            }
            (ResourceId::Texture1D(handle), Edits::Texture1D(edits)) => {
                let texture = resources.texture1d(handle);
                let slot = slots.textures1d.get(handle.index());
                shadow.use_texture(gl, gl::TEXTURE_1D, slot.tex);

                let format = texture.format();
                let pixel = format.bits_per_pixel() / 8;
                for edit in edits.iter() {
                    let info = texture.info_for_level(edit.level);
                    unsafe {
                        gl.TexSubImage1D(
                            gl::TEXTURE_1D,
                            edit.level as GLint,
                            edit.offset as GLint,
                            edit.size as GLsizei,
                            convert_texture_format(format),
                            convert_texture_data_type(format),
                            texture.data()[info.offset + edit.offset * pixel..].as_ptr()
                                as *const _,
                        );
                    }
                }
            }
            (ResourceId::Texture2D(handle), Edits::Texture2D(edits)) => {
                let texture = resources.texture2d(handle);
                let slot = slots.textures2d.get(handle.index());
                shadow.use_texture(gl, gl::TEXTURE_2D, slot.tex);

                let format = texture.format();
                let pixel = format.bits_per_pixel() / 8;
                for edit in edits.iter() {
                    let info = texture.info_for_level(edit.level);
                    let pitch = info.dimensions.x as usize;
                    let base = info.offset
                        + (edit.offset.y as usize * pitch + edit.offset.x as usize) * pixel;
                    unsafe {
                        // The client buffer keeps the full level pitch.
                        gl.PixelStorei(gl::UNPACK_ROW_LENGTH, pitch as GLint);
                        gl.TexSubImage2D(
                            gl::TEXTURE_2D,
                            edit.level as GLint,
                            edit.offset.x as GLint,
                            edit.offset.y as GLint,
                            edit.size.x as GLsizei,
                            edit.size.y as GLsizei,
                            convert_texture_format(format),
                            convert_texture_data_type(format),
                            texture.data()[base..].as_ptr() as *const _,
                        );
                        gl.PixelStorei(gl::UNPACK_ROW_LENGTH, 0);
                    }
                }
            }
            (ResourceId::Texture3D(handle), Edits::Texture3D(edits)) => {
                let texture = resources.texture3d(handle);
                let slot = slots.textures3d.get(handle.index());
                shadow.use_texture(gl, gl::TEXTURE_3D, slot.tex);

                let format = texture.format();
                let pixel = format.bits_per_pixel() / 8;
                for edit in edits.iter() {
                    let info = texture.info_for_level(edit.level);
                    let pitch = info.dimensions.x as usize;
                    let slice_pitch = pitch * info.dimensions.y as usize;
                    let base = info.offset
                        + (edit.offset.z as usize * slice_pitch
                            + edit.offset.y as usize * pitch
                            + edit.offset.x as usize)
                            * pixel;
                    unsafe {
                        gl.PixelStorei(gl::UNPACK_ROW_LENGTH, pitch as GLint);
                        gl.PixelStorei(gl::UNPACK_IMAGE_HEIGHT, info.dimensions.y as GLint);
                        gl.TexSubImage3D(
                            gl::TEXTURE_3D,
                            edit.level as GLint,
                            edit.offset.x as GLint,
                            edit.offset.y as GLint,
                            edit.offset.z as GLint,
                            edit.size.x as GLsizei,
                            edit.size.y as GLsizei,
                            edit.size.z as GLsizei,
                            convert_texture_format(format),
                            convert_texture_data_type(format),
                            texture.data()[base..].as_ptr() as *const _,
                        );
                        gl.PixelStorei(gl::UNPACK_ROW_LENGTH, 0);
                        gl.PixelStorei(gl::UNPACK_IMAGE_HEIGHT, 0);
                    }
                }
            }
            _ => unreachable!("mismatched update payload"),
        },

        Command::ResourceDestroy { resource } => match *resource {
            ResourceId::Buffer(handle) => {
                let slot = slots.buffers.remove(handle.index());
                if shadow.bound_vbo == slot.bo[0] {
                    shadow.bound_vbo = 0;
                }
                if shadow.bound_ebo == slot.bo[1] {
                    shadow.bound_ebo = 0;
                }
                if shadow.bound_vao == slot.va {
                    shadow.bound_vao = 0;
                }
                unsafe {
                    gl.DeleteBuffers(2, slot.bo.as_ptr());
                    gl.DeleteVertexArrays(1, &slot.va);
                }
            }
            ResourceId::Target(handle) => {
                let slot = slots.targets.remove(handle.index());
                if shadow.bound_draw_fbo == slot.fbo {
                    shadow.bound_draw_fbo = 0;
                }
                if shadow.bound_read_fbo == slot.fbo {
                    shadow.bound_read_fbo = 0;
                }
                if slot.owned {
                    unsafe {
                        gl.DeleteFramebuffers(1, &slot.fbo);
                    }
                }
            }
            ResourceId::Program(handle) => {
                let slot = slots.programs.remove(handle.index());
                if shadow.bound_program == slot.handle {
                    shadow.bound_program = 0;
                }
                unsafe {
                    gl.DeleteProgram(slot.handle);
                }
            }
            ResourceId::Texture1D(handle) => {
                let slot = slots.textures1d.remove(handle.index());
                shadow.invalidate_texture(gl::TEXTURE_1D, slot.tex);
                unsafe {
                    gl.DeleteTextures(1, &slot.tex);
                }
            }
            ResourceId::Texture2D(handle) => {
                if resources.texture2d(handle).is_swapchain() {
                    return;
                }
                let slot = slots.textures2d.remove(handle.index());
                shadow.invalidate_texture(gl::TEXTURE_2D, slot.tex);
                unsafe {
                    gl.DeleteTextures(1, &slot.tex);
                }
            }
            ResourceId::Texture3D(handle) => {
                let slot = slots.textures3d.remove(handle.index());
                shadow.invalidate_texture(gl::TEXTURE_3D, slot.tex);
                unsafe {
                    gl.DeleteTextures(1, &slot.tex);
                }
            }
            ResourceId::TextureCM(handle) => {
                let slot = slots.textures_cm.remove(handle.index());
                shadow.invalidate_texture(gl::TEXTURE_CUBE_MAP, slot.tex);
                unsafe {
                    gl.DeleteTextures(1, &slot.tex);
                }
            }
        },

        Command::Clear(command) => {
            shadow.use_state(gl, &command.state);
            {
                let target = resources.target(command.target);
                let slot = slots.targets.get_mut(command.target.index());
                use_draw_target(gl, shadow, slot, target, Some(&command.draw_buffers));
            }

            unsafe {
                if command.clear_colors != 0 {
                    for index in 0..command.color_values.len() {
                        if command.clear_colors & (1 << index) != 0 {
                            gl.ClearBufferfv(
                                gl::COLOR,
                                index as GLint,
                                command.color_values[index].as_ptr(),
                            );
                        }
                    }
                }

                if command.clear_depth && command.clear_stencil {
                    gl.ClearBufferfi(
                        gl::DEPTH_STENCIL,
                        0,
                        command.depth_value,
                        command.stencil_value,
                    );
                } else if command.clear_depth {
                    gl.ClearBufferfv(gl::DEPTH, 0, &command.depth_value);
                } else if command.clear_stencil {
                    gl.ClearBufferiv(gl::STENCIL, 0, &command.stencil_value);
                }
            }
        }

        Command::Draw(command) => {
            draw(gl, shadow, slots, bufferless_vao, resources, commands, command);
        }

        Command::Blit(command) => {
            shadow.use_state(gl, &command.state);

            let src_dimensions;
            let dst_dimensions;
            {
                let src = resources.target(command.src_target);
                let dst = resources.target(command.dst_target);
                src_dimensions = attachment_dimensions(resources, src, command.src_attachment);
                dst_dimensions = attachment_dimensions(resources, dst, command.dst_attachment);
            }

            let mut read_buffers = Buffers::new();
            read_buffers.add(command.src_attachment as u8);
            let mut draw_buffers = Buffers::new();
            draw_buffers.add(command.dst_attachment as u8);

            {
                let target = resources.target(command.src_target);
                let slot = slots.targets.get_mut(command.src_target.index());
                use_read_target(gl, shadow, slot, target, Some(&read_buffers));
            }
            {
                let target = resources.target(command.dst_target);
                let slot = slots.targets.get_mut(command.dst_target.index());
                use_draw_target(gl, shadow, slot, target, Some(&draw_buffers));
            }

            let width = src_dimensions.x.min(dst_dimensions.x) as GLint;
            let height = src_dimensions.y.min(dst_dimensions.y) as GLint;
            unsafe {
                gl.BlitFramebuffer(
                    0,
                    0,
                    width,
                    height,
                    0,
                    0,
                    width,
                    height,
                    gl::COLOR_BUFFER_BIT,
                    gl::NEAREST,
                );
            }
        }

        Command::Profile(tag) => match tag {
            Some(tag) => samples.push((tag, Instant::now())),
            None => {
                if let Some((tag, start)) = samples.pop() {
                    trace!(
                        target: "render/es3",
                        "sample '{}' {:.3}ms",
                        tag,
                        start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
        },
    }
}

fn gen_texture(gl: &Gl) -> TextureSlot {
    let mut tex = 0;
    unsafe {
        gl.GenTextures(1, &mut tex);
    }
    TextureSlot {
        tex,
    }
}

fn buffer_usage(kind: BufferType) -> GLenum {
    match kind {
        BufferType::Dynamic => gl::DYNAMIC_DRAW,
        BufferType::Static => gl::STATIC_DRAW,
    }
}

fn attach_texture2d(
    gl: &Gl,
    slots: &Slots,
    texture: karst_render::texture::Texture2DHandle,
    attachment: GLenum,
    level: usize,
) {
    unsafe {
        gl.FramebufferTexture2D(
            gl::DRAW_FRAMEBUFFER,
            attachment,
            gl::TEXTURE_2D,
            slots.textures2d.get(texture.index()).tex,
            level as GLint,
        );
    }
}

fn attachment_dimensions(
    resources: &Resources,
    target: &Target,
    attachment: usize,
) -> glam::UVec2 {
    match target.attachments()[attachment] {
        Attachment::Texture2D { texture, .. } => resources.texture2d(texture).dimensions(),
        Attachment::TextureCM { texture, .. } => resources.texture_cm(texture).dimensions(),
    }
}

fn set_border_color(gl: &Gl, target: GLenum, border: Option<glam::Vec4>) {
    if let Some(border) = border {
        let color = [
            (border.x * 255.0) as GLint,
            (border.y * 255.0) as GLint,
            (border.z * 255.0) as GLint,
            (border.w * 255.0) as GLint,
        ];
        unsafe {
            gl.TexParameteriv(target, gl::TEXTURE_BORDER_COLOR, color.as_ptr());
        }
    }
}

fn level_pixels(data: &[u8], offset: usize) -> *const std::ffi::c_void {
    if data.is_empty() {
        std::ptr::null()
    } else {
        data[offset..].as_ptr() as *const _
    }
}

fn draw(
    gl: &Gl,
    shadow: &mut ShadowState,
    slots: &mut Slots,
    bufferless_vao: GLuint,
    resources: &Resources,
    commands: &CommandBuffer,
    command: &DrawCommand,
) {
    {
        let target = resources.target(command.target);
        let slot = slots.targets.get_mut(command.target.index());
        use_draw_target(gl, shadow, slot, target, Some(&command.draw_buffers));
    }

    match command.buffer {
        Some(buffer) => {
            let slot = slots.buffers.get(buffer.index());
            shadow.use_vao(gl, slot.va);
        }
        None => shadow.use_vao(gl, bufferless_vao),
    }

    let program_slot = slots.programs.get(command.program.index());
    shadow.use_program(gl, program_slot.handle);
    shadow.use_state(gl, &command.state);

    // Upload the packed dirty uniforms, ascending by slot; padding slots
    // (location -1) consume their bytes without touching the driver.
    if command.dirty_uniforms != 0 {
        let program = resources.program(command.program);
        let data = commands.bytes(command.uniforms.clone());
        let mut cursor = 0;

        let mut scratch_f32: Vec<f32> = Vec::new();
        let mut scratch_i32: Vec<i32> = Vec::new();

        for (slot, uniform) in program.uniforms().iter().enumerate() {
            if command.dirty_uniforms & (1u64 << slot) == 0 {
                continue;
            }
            let size = uniform.size();
            let bytes = &data[cursor..cursor + size];
            cursor += size;

            let location = program_slot.uniforms[slot];
            if location == -1 {
                continue;
            }

            unsafe {
                match uniform.kind() {
                    UniformType::Sampler1D
                    | UniformType::Sampler2D
                    | UniformType::Sampler3D
                    | UniformType::SamplerCM
                    | UniformType::Bool
                    | UniformType::Int => {
                        ints_of(bytes, &mut scratch_i32);
                        gl.Uniform1i(location, scratch_i32[0]);
                    }
                    UniformType::Float => {
                        floats_of(bytes, &mut scratch_f32);
                        gl.Uniform1fv(location, 1, scratch_f32.as_ptr());
                    }
                    UniformType::Vec2I => {
                        ints_of(bytes, &mut scratch_i32);
                        gl.Uniform2iv(location, 1, scratch_i32.as_ptr());
                    }
                    UniformType::Vec3I => {
                        ints_of(bytes, &mut scratch_i32);
                        gl.Uniform3iv(location, 1, scratch_i32.as_ptr());
                    }
                    UniformType::Vec4I => {
                        ints_of(bytes, &mut scratch_i32);
                        gl.Uniform4iv(location, 1, scratch_i32.as_ptr());
                    }
                    UniformType::Vec2F => {
                        floats_of(bytes, &mut scratch_f32);
                        gl.Uniform2fv(location, 1, scratch_f32.as_ptr());
                    }
                    UniformType::Vec3F => {
                        floats_of(bytes, &mut scratch_f32);
                        gl.Uniform3fv(location, 1, scratch_f32.as_ptr());
                    }
                    UniformType::Vec4F => {
                        floats_of(bytes, &mut scratch_f32);
                        gl.Uniform4fv(location, 1, scratch_f32.as_ptr());
                    }
                    UniformType::Mat3x3F => {
                        floats_of(bytes, &mut scratch_f32);
                        gl.UniformMatrix3fv(location, 1, gl::FALSE, scratch_f32.as_ptr());
                    }
                    UniformType::Mat4x4F => {
                        floats_of(bytes, &mut scratch_f32);
                        gl.UniformMatrix4fv(location, 1, gl::FALSE, scratch_f32.as_ptr());
                    }
                    UniformType::Bones => {
                        floats_of(bytes, &mut scratch_f32);
                        gl.UniformMatrix3x4fv(
                            location,
                            (size / 48) as GLsizei,
                            gl::FALSE,
                            scratch_f32.as_ptr(),
                        );
                    }
                }
            }
        }
    }

    // Bind draw textures to their units by type tag.
    for (unit, (tag, index)) in command.draw_textures.binds().enumerate() {
        match tag {
            TEXTURE_TAG_1D => {
                let tex = slots.textures1d.get(index).tex;
                shadow.use_active_texture(gl, unit, gl::TEXTURE_1D, tex);
            }
            TEXTURE_TAG_2D => {
                let tex = slots.textures2d.get(index).tex;
                shadow.use_active_texture(gl, unit, gl::TEXTURE_2D, tex);
            }
            TEXTURE_TAG_3D => {
                let tex = slots.textures3d.get(index).tex;
                shadow.use_active_texture(gl, unit, gl::TEXTURE_3D, tex);
            }
            TEXTURE_TAG_CM => {
                let tex = slots.textures_cm.get(index).tex;
                shadow.use_active_texture(gl, unit, gl::TEXTURE_CUBE_MAP, tex);
            }
            _ => {}
        }
    }

    let primitive = convert_primitive_type(command.primitive);
    let element_type = command
        .buffer
        .map(|buffer| resources.buffer(buffer).element_type())
        .unwrap_or(ElementType::None);

    unsafe {
        match element_type {
            ElementType::U8 => gl.DrawElements(
                primitive,
                command.count as GLsizei,
                gl::UNSIGNED_BYTE,
                command.offset as *const _,
            ),
            ElementType::U16 => gl.DrawElements(
                primitive,
                command.count as GLsizei,
                gl::UNSIGNED_SHORT,
                (command.offset * 2) as *const _,
            ),
            ElementType::U32 => gl.DrawElements(
                primitive,
                command.count as GLsizei,
                gl::UNSIGNED_INT,
                (command.offset * 4) as *const _,
            ),
            ElementType::None => gl.DrawArrays(
                primitive,
                command.offset as GLint,
                command.count as GLsizei,
            ),
        }
    }
}

fn floats_of(bytes: &[u8], out: &mut Vec<f32>) {
    out.clear();
    for chunk in bytes.chunks_exact(4) {
        out.push(f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
}

fn ints_of(bytes: &[u8], out: &mut Vec<i32>) {
    out.clear();
    for chunk in bytes.chunks_exact(4) {
        out.push(i32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
}
