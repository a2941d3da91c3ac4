//! Shadow of the driver's state.
//!
//! Every mutation goes through a `use_*` helper that compares the incoming
//! value against the shadow and only then issues the GL call. The high-level
//! render state is hash-compared first; only categories that differ get
//! their fields compared.

use crate::api as gl;
use crate::api::types::*;
use crate::api::Gl;
use crate::convert::{
    convert_blend_factor, convert_cull_face, convert_front_face, convert_polygon_mode,
    convert_stencil_function, convert_stencil_operation,
};
use karst_render::command::MAX_TEXTURES;
use karst_render::state::State;

#[derive(Copy, Clone, Default)]
pub(crate) struct TextureUnit {
    pub texture1d: GLuint,
    pub texture2d: GLuint,
    pub texture3d: GLuint,
    pub texture_cm: GLuint,
}

pub(crate) struct ShadowState {
    render: State,
    color_mask: u8,
    pub bound_vbo: GLuint,
    pub bound_ebo: GLuint,
    pub bound_vao: GLuint,
    pub bound_draw_fbo: GLuint,
    pub bound_read_fbo: GLuint,
    pub bound_program: GLuint,
    pub swapchain_fbo: GLuint,
    pub texture_units: [TextureUnit; MAX_TEXTURES],
    active_texture: usize,
}

impl ShadowState {
    /// Captures the window system's framebuffer binding and drives the
    /// context to the frontend's default state.
    pub fn new(gl: &Gl) -> ShadowState {
        let mut swapchain_fbo: GLint = 0;
        unsafe {
            gl.GetIntegerv(gl::FRAMEBUFFER_BINDING, &mut swapchain_fbo);

            gl.Enable(gl::CULL_FACE);
            gl.CullFace(gl::BACK);
            gl.FrontFace(gl::CW);

            gl.DepthFunc(gl::LEQUAL);
            gl.Disable(gl::MULTISAMPLE);
            gl.PixelStorei(gl::UNPACK_ALIGNMENT, 1);
        }

        let mut render = State::new();
        render.flush();

        ShadowState {
            render,
            color_mask: 0b1111,
            bound_vbo: 0,
            bound_ebo: 0,
            bound_vao: 0,
            bound_draw_fbo: 0,
            bound_read_fbo: 0,
            bound_program: 0,
            swapchain_fbo: swapchain_fbo as GLuint,
            texture_units: [TextureUnit::default(); MAX_TEXTURES],
            active_texture: 0,
        }
    }

    fn use_enable(gl: &Gl, capability: GLenum, enable: bool) {
        unsafe {
            if enable {
                gl.Enable(capability);
            } else {
                gl.Disable(capability);
            }
        }
    }

    pub fn use_state(&mut self, gl: &Gl, incoming: &State) {
        if incoming.flushed_hash() == self.render.flushed_hash() && *incoming == self.render {
            return;
        }

        let scissor = incoming.scissor;
        if self.render.scissor != scissor {
            if self.render.scissor.enabled() != scissor.enabled() {
                Self::use_enable(gl, gl::SCISSOR_TEST, scissor.enabled());
            }
            if scissor.enabled()
                && (self.render.scissor.offset() != scissor.offset()
                    || self.render.scissor.size() != scissor.size())
            {
                unsafe {
                    gl.Scissor(
                        scissor.offset().x as GLint,
                        scissor.offset().y as GLint,
                        scissor.size().x as GLsizei,
                        scissor.size().y as GLsizei,
                    );
                }
            }
            self.render.scissor = scissor;
        }

        let blend = incoming.blend;
        if self.render.blend != blend {
            if self.render.blend.enabled() != blend.enabled() {
                Self::use_enable(gl, gl::BLEND, blend.enabled());
            }
            if blend.enabled() {
                if blend.write_mask() != self.color_mask {
                    let mask = blend.write_mask();
                    unsafe {
                        gl.ColorMask(
                            (mask & 0b0001 != 0) as GLboolean,
                            (mask & 0b0010 != 0) as GLboolean,
                            (mask & 0b0100 != 0) as GLboolean,
                            (mask & 0b1000 != 0) as GLboolean,
                        );
                    }
                    self.color_mask = mask;
                }
                if self.render.blend.color_src_factor() != blend.color_src_factor()
                    || self.render.blend.color_dst_factor() != blend.color_dst_factor()
                    || self.render.blend.alpha_src_factor() != blend.alpha_src_factor()
                    || self.render.blend.alpha_dst_factor() != blend.alpha_dst_factor()
                {
                    unsafe {
                        gl.BlendFuncSeparate(
                            convert_blend_factor(blend.color_src_factor()),
                            convert_blend_factor(blend.color_dst_factor()),
                            convert_blend_factor(blend.alpha_src_factor()),
                            convert_blend_factor(blend.alpha_dst_factor()),
                        );
                    }
                }
            }
            self.render.blend = blend;
        }

        let depth = incoming.depth;
        if self.render.depth != depth {
            if self.render.depth.test() != depth.test() {
                Self::use_enable(gl, gl::DEPTH_TEST, depth.test());
            }
            if depth.test() && self.render.depth.write() != depth.write() {
                unsafe {
                    gl.DepthMask(depth.write() as GLboolean);
                }
            }
            self.render.depth = depth;
        }

        let cull = incoming.cull;
        if self.render.cull != cull {
            if self.render.cull.enabled() != cull.enabled() {
                Self::use_enable(gl, gl::CULL_FACE, cull.enabled());
            }
            if cull.enabled() {
                if self.render.cull.front_face() != cull.front_face() {
                    unsafe {
                        gl.FrontFace(convert_front_face(cull.front_face()));
                    }
                }
                if self.render.cull.cull_face() != cull.cull_face() {
                    unsafe {
                        gl.CullFace(convert_cull_face(cull.cull_face()));
                    }
                }
            }
            self.render.cull = cull;
        }

        let stencil = incoming.stencil;
        if self.render.stencil != stencil {
            if self.render.stencil.enabled() != stencil.enabled() {
                Self::use_enable(gl, gl::STENCIL_TEST, stencil.enabled());
            }
            if stencil.enabled() {
                if self.render.stencil.write_mask() != stencil.write_mask() {
                    unsafe {
                        gl.StencilMask(stencil.write_mask() as GLuint);
                    }
                }
                if self.render.stencil.function() != stencil.function()
                    || self.render.stencil.reference() != stencil.reference()
                    || self.render.stencil.mask() != stencil.mask()
                {
                    unsafe {
                        gl.StencilFunc(
                            convert_stencil_function(stencil.function()),
                            stencil.reference() as GLint,
                            stencil.mask() as GLuint,
                        );
                    }
                }
                if self.render.stencil.front_fail_action() != stencil.front_fail_action()
                    || self.render.stencil.front_depth_fail_action()
                        != stencil.front_depth_fail_action()
                    || self.render.stencil.front_depth_pass_action()
                        != stencil.front_depth_pass_action()
                {
                    unsafe {
                        gl.StencilOpSeparate(
                            gl::FRONT,
                            convert_stencil_operation(stencil.front_fail_action()),
                            convert_stencil_operation(stencil.front_depth_fail_action()),
                            convert_stencil_operation(stencil.front_depth_pass_action()),
                        );
                    }
                }
                if self.render.stencil.back_fail_action() != stencil.back_fail_action()
                    || self.render.stencil.back_depth_fail_action()
                        != stencil.back_depth_fail_action()
                    || self.render.stencil.back_depth_pass_action()
                        != stencil.back_depth_pass_action()
                {
                    unsafe {
                        gl.StencilOpSeparate(
                            gl::BACK,
                            convert_stencil_operation(stencil.back_fail_action()),
                            convert_stencil_operation(stencil.back_depth_fail_action()),
                            convert_stencil_operation(stencil.back_depth_pass_action()),
                        );
                    }
                }
            }
            self.render.stencil = stencil;
        }

        let polygon = incoming.polygon;
        if self.render.polygon != polygon {
            unsafe {
                gl.PolygonMode(gl::FRONT_AND_BACK, convert_polygon_mode(polygon.mode()));
            }
            self.render.polygon = polygon;
        }

        let viewport = incoming.viewport;
        if self.render.viewport != viewport {
            unsafe {
                gl.Viewport(
                    viewport.offset().x as GLint,
                    viewport.offset().y as GLint,
                    viewport.dimensions().x as GLsizei,
                    viewport.dimensions().y as GLsizei,
                );
            }
            self.render.viewport = viewport;
        }

        self.render.flush();
    }

    pub fn use_vbo(&mut self, gl: &Gl, vbo: GLuint) {
        if self.bound_vbo != vbo {
            unsafe {
                gl.BindBuffer(gl::ARRAY_BUFFER, vbo);
            }
            self.bound_vbo = vbo;
        }
    }

    pub fn use_ebo(&mut self, gl: &Gl, ebo: GLuint) {
        if self.bound_ebo != ebo {
            unsafe {
                gl.BindBuffer(gl::ELEMENT_ARRAY_BUFFER, ebo);
            }
            self.bound_ebo = ebo;
        }
    }

    pub fn use_vao(&mut self, gl: &Gl, vao: GLuint) {
        if self.bound_vao != vao {
            unsafe {
                gl.BindVertexArray(vao);
            }
            self.bound_vao = vao;
        }
    }

    pub fn use_program(&mut self, gl: &Gl, program: GLuint) {
        if self.bound_program != program {
            unsafe {
                gl.UseProgram(program);
            }
            self.bound_program = program;
        }
    }

    pub fn use_draw_fbo(&mut self, gl: &Gl, fbo: GLuint) {
        if self.bound_draw_fbo != fbo {
            unsafe {
                gl.BindFramebuffer(gl::DRAW_FRAMEBUFFER, fbo);
            }
            self.bound_draw_fbo = fbo;
        }
    }

    pub fn use_read_fbo(&mut self, gl: &Gl, fbo: GLuint) {
        if self.bound_read_fbo != fbo {
            unsafe {
                gl.BindFramebuffer(gl::READ_FRAMEBUFFER, fbo);
            }
            self.bound_read_fbo = fbo;
        }
    }

    fn unit_slot(unit: &mut TextureUnit, target: GLenum) -> &mut GLuint {
        match target {
            gl::TEXTURE_1D => &mut unit.texture1d,
            gl::TEXTURE_2D => &mut unit.texture2d,
            gl::TEXTURE_3D => &mut unit.texture3d,
            gl::TEXTURE_CUBE_MAP => &mut unit.texture_cm,
            _ => panic!("not a texture unit target"),
        }
    }

    /// Binds on the currently active unit (uploads, parameter edits).
    pub fn use_texture(&mut self, gl: &Gl, target: GLenum, texture: GLuint) {
        let slot = Self::unit_slot(&mut self.texture_units[self.active_texture], target);
        if *slot != texture {
            *slot = texture;
            unsafe {
                gl.BindTexture(target, texture);
            }
        }
    }

    /// Binds on a specific unit for a draw, switching the active unit only
    /// when the binding actually changes.
    pub fn use_active_texture(&mut self, gl: &Gl, unit: usize, target: GLenum, texture: GLuint) {
        let slot = Self::unit_slot(&mut self.texture_units[unit], target);
        if *slot != texture {
            if self.active_texture != unit {
                unsafe {
                    gl.ActiveTexture(gl::TEXTURE0 + unit as GLenum);
                }
                self.active_texture = unit;
            }
            *slot = texture;
            unsafe {
                gl.BindTexture(target, texture);
            }
        }
    }

    /// Drops a deleted texture from every unit's shadow.
    pub fn invalidate_texture(&mut self, target: GLenum, texture: GLuint) {
        for unit in &mut self.texture_units {
            let slot = Self::unit_slot(unit, target);
            if *slot == texture {
                *slot = 0;
            }
        }
    }
}
