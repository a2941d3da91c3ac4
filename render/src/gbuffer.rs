//! Geometry-buffer helper: albedo, normal and emission color attachments
//! over a shared combined depth-stencil.

use crate::context::Context;
use crate::target::TargetHandle;
use crate::texture::{
    FilterOptions, Texture2DHandle, TextureFormat, TextureType, WrapType,
};
use glam::UVec2;

pub struct GBuffer {
    target: Option<TargetHandle>,
    albedo: Option<Texture2DHandle>,
    normal: Option<Texture2DHandle>,
    emission: Option<Texture2DHandle>,
}

impl GBuffer {
    pub fn new() -> GBuffer {
        GBuffer {
            target: None,
            albedo: None,
            normal: None,
            emission: None,
        }
    }

    fn create_attachment(context: &Context, resolution: UVec2, what: &'static str) -> Texture2DHandle {
        let tag = crate::render_tag!("gbuffer attachment");
        let texture = context.create_texture2d(tag);
        {
            let mut texture = context.texture2d(texture);
            texture.record_format(TextureFormat::Rgba8);
            texture.record_type(TextureType::Attachment);
            texture.record_levels(1);
            texture.record_filter(FilterOptions::default());
            texture.record_dimensions(resolution);
            texture.record_wrap((WrapType::ClampToEdge, WrapType::ClampToEdge));
        }
        context.initialize_texture2d(tag, texture);
        context.cache_texture2d(texture, what);
        texture
    }

    pub fn create(&mut self, context: &Context, resolution: UVec2) {
        let albedo = Self::create_attachment(context, resolution, "gbuffer albedo");
        let normal = Self::create_attachment(context, resolution, "gbuffer normal");
        let emission = Self::create_attachment(context, resolution, "gbuffer emission");

        let tag = crate::render_tag!("gbuffer");
        let target = context.create_target(tag);
        context.request_depth_stencil(tag, target, TextureFormat::D24S8, resolution);
        context.attach_texture2d(target, albedo, 0);
        context.attach_texture2d(target, normal, 0);
        context.attach_texture2d(target, emission, 0);
        context.initialize_target(tag, target);

        self.target = Some(target);
        self.albedo = Some(albedo);
        self.normal = Some(normal);
        self.emission = Some(emission);
    }

    pub fn destroy(&mut self, context: &Context) {
        let tag = crate::render_tag!("gbuffer");
        if let Some(albedo) = self.albedo.take() {
            context.destroy_texture2d(tag, albedo);
        }
        if let Some(normal) = self.normal.take() {
            context.destroy_texture2d(tag, normal);
        }
        if let Some(emission) = self.emission.take() {
            context.destroy_texture2d(tag, emission);
        }
        if let Some(target) = self.target.take() {
            context.destroy_target(tag, target);
        }
    }

    pub fn resize(&mut self, context: &Context, resolution: UVec2) {
        self.destroy(context);
        self.create(context, resolution);
    }

    pub fn target(&self) -> TargetHandle {
        self.target.expect("gbuffer not created")
    }

    pub fn albedo(&self) -> Texture2DHandle {
        self.albedo.expect("gbuffer not created")
    }

    pub fn normal(&self) -> Texture2DHandle {
        self.normal.expect("gbuffer not created")
    }

    pub fn emission(&self) -> Texture2DHandle {
        self.emission.expect("gbuffer not created")
    }

    pub fn depth_stencil(&self, context: &Context) -> Texture2DHandle {
        context
            .target(self.target())
            .depth_stencil()
            .expect("gbuffer has no depth stencil")
    }
}

impl Default for GBuffer {
    fn default() -> GBuffer {
        GBuffer::new()
    }
}
