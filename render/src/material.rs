//! Materials: the texture slots and alpha semantics a surface draws with.
//!
//! A material's occupied slots become feature bits for technique permutation
//! and its textures are bound into the draw's texture set.

use crate::texture::Texture2DHandle;
use glam::Mat3;

/// Feature bits contributed by a material (bit 0 is reserved for the
/// caller's animation flag).
pub const MATERIAL_ANIMATED: u64 = 1 << 0;
pub const MATERIAL_ALBEDO: u64 = 1 << 1;
pub const MATERIAL_NORMAL: u64 = 1 << 2;
pub const MATERIAL_METALNESS: u64 = 1 << 3;
pub const MATERIAL_ROUGHNESS: u64 = 1 << 4;
pub const MATERIAL_ALPHA_TEST: u64 = 1 << 5;
pub const MATERIAL_AMBIENT: u64 = 1 << 6;
pub const MATERIAL_EMISSIVE: u64 = 1 << 7;

#[derive(Default)]
pub struct Material {
    name: String,
    albedo: Option<Texture2DHandle>,
    normal: Option<Texture2DHandle>,
    metalness: Option<Texture2DHandle>,
    roughness: Option<Texture2DHandle>,
    ambient: Option<Texture2DHandle>,
    emissive: Option<Texture2DHandle>,
    alpha_test: bool,
    has_alpha: bool,
    roughness_value: f32,
    metalness_value: f32,
    transform: Option<Mat3>,
}

impl Material {
    pub fn new(name: &str) -> Material {
        Material {
            name: name.to_string(),
            roughness_value: 1.0,
            ..Material::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_albedo(&mut self, texture: Texture2DHandle) {
        self.albedo = Some(texture);
    }

    pub fn set_normal(&mut self, texture: Texture2DHandle) {
        self.normal = Some(texture);
    }

    pub fn set_metalness(&mut self, texture: Texture2DHandle) {
        self.metalness = Some(texture);
    }

    pub fn set_roughness(&mut self, texture: Texture2DHandle) {
        self.roughness = Some(texture);
    }

    pub fn set_ambient(&mut self, texture: Texture2DHandle) {
        self.ambient = Some(texture);
    }

    pub fn set_emissive(&mut self, texture: Texture2DHandle) {
        self.emissive = Some(texture);
    }

    pub fn set_alpha_test(&mut self, alpha_test: bool) {
        self.alpha_test = alpha_test;
    }

    pub fn set_has_alpha(&mut self, has_alpha: bool) {
        self.has_alpha = has_alpha;
    }

    pub fn set_roughness_value(&mut self, value: f32) {
        self.roughness_value = value;
    }

    pub fn set_metalness_value(&mut self, value: f32) {
        self.metalness_value = value;
    }

    pub fn set_transform(&mut self, transform: Mat3) {
        self.transform = Some(transform);
    }

    pub fn albedo(&self) -> Option<Texture2DHandle> {
        self.albedo
    }

    pub fn normal(&self) -> Option<Texture2DHandle> {
        self.normal
    }

    pub fn metalness(&self) -> Option<Texture2DHandle> {
        self.metalness
    }

    pub fn roughness(&self) -> Option<Texture2DHandle> {
        self.roughness
    }

    pub fn ambient(&self) -> Option<Texture2DHandle> {
        self.ambient
    }

    pub fn emissive(&self) -> Option<Texture2DHandle> {
        self.emissive
    }

    pub fn alpha_test(&self) -> bool {
        self.alpha_test
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    pub fn roughness_value(&self) -> f32 {
        self.roughness_value
    }

    pub fn metalness_value(&self) -> f32 {
        self.metalness_value
    }

    pub fn transform(&self) -> Option<Mat3> {
        self.transform
    }

    /// Permutation bits for this material; `animated` is the caller's bone
    /// animation flag. Together with the technique's permute table these
    /// select the concrete program a surface draws with.
    pub fn flags(&self, animated: bool) -> u64 {
        let mut flags = 0;
        if animated {
            flags |= MATERIAL_ANIMATED;
        }
        if self.albedo.is_some() {
            flags |= MATERIAL_ALBEDO;
        }
        if self.normal.is_some() {
            flags |= MATERIAL_NORMAL;
        }
        if self.metalness.is_some() {
            flags |= MATERIAL_METALNESS;
        }
        if self.roughness.is_some() {
            flags |= MATERIAL_ROUGHNESS;
        }
        if self.alpha_test {
            flags |= MATERIAL_ALPHA_TEST;
        }
        if self.ambient.is_some() {
            flags |= MATERIAL_AMBIENT;
        }
        if self.emissive.is_some() {
            flags |= MATERIAL_EMISSIVE;
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Handle;

    #[test]
    fn flags_follow_occupied_slots() {
        let mut material = Material::new("stone");
        assert_eq!(material.flags(false), 0);
        assert_eq!(material.flags(true), MATERIAL_ANIMATED);

        material.set_albedo(Handle::from_index(0));
        material.set_normal(Handle::from_index(1));
        material.set_alpha_test(true);
        assert_eq!(
            material.flags(false),
            MATERIAL_ALBEDO | MATERIAL_NORMAL | MATERIAL_ALPHA_TEST
        );
    }
}
