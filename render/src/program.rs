//! Shader programs and their uniform state.
//!
//! A program owns an ordered list of typed uniforms (at most 64, one dirty
//! bit each) and an ordered list of shaders with declared inputs and outputs.
//! Recording a uniform value writes its raw bytes and sets the program's
//! dirty bit for that slot; when a draw is enqueued the dirty values are
//! packed, ascending by slot and without padding, into the command tail and
//! the bits are cleared.
//!
//! Padding uniforms hold a slot index so permutations of the same family
//! agree on slot numbering; the backend resolves them to location -1 and
//! never uploads them.

use crate::pool::Handle;
use crate::resource::{ResourceKind, ResourceTracker};
use fxhash::FxHasher;
use glam::{IVec2, IVec3, IVec4, Mat3, Mat4, Vec2, Vec3, Vec4};
use std::hash::{Hash, Hasher};

pub type ProgramHandle = Handle<Program>;

/// Upper bound on uniform slots; the dirty mask is a single `u64`.
pub const MAX_UNIFORMS: usize = 64;

/// Bone matrices are 3x4, column-major rows, 48 bytes each.
pub const MAX_BONES: usize = 80;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UniformType {
    Sampler1D,
    Sampler2D,
    Sampler3D,
    SamplerCM,
    Bool,
    Int,
    Float,
    Vec2I,
    Vec3I,
    Vec4I,
    Vec2F,
    Vec3F,
    Vec4F,
    Mat3x3F,
    Mat4x4F,
    Bones,
}

impl UniformType {
    /// Fixed byte size of a value of this type.
    pub fn size(self) -> usize {
        match self {
            UniformType::Sampler1D
            | UniformType::Sampler2D
            | UniformType::Sampler3D
            | UniformType::SamplerCM
            | UniformType::Bool
            | UniformType::Int
            | UniformType::Float => 4,
            UniformType::Vec2I | UniformType::Vec2F => 8,
            UniformType::Vec3I | UniformType::Vec3F => 12,
            UniformType::Vec4I | UniformType::Vec4F => 16,
            UniformType::Mat3x3F => 36,
            UniformType::Mat4x4F => 64,
            UniformType::Bones => MAX_BONES * 48,
        }
    }

    pub fn is_sampler(self) -> bool {
        matches!(
            self,
            UniformType::Sampler1D
                | UniformType::Sampler2D
                | UniformType::Sampler3D
                | UniformType::SamplerCM
        )
    }
}

pub struct Uniform {
    name: String,
    kind: UniformType,
    value: Vec<u8>,
    padding: bool,
}

impl Uniform {
    pub fn new(name: &str, kind: UniformType) -> Uniform {
        Uniform {
            name: name.to_string(),
            kind,
            value: vec![0; kind.size()],
            padding: false,
        }
    }

    /// A slot reservation with no live value behind it.
    pub fn padding(name: &str, kind: UniformType) -> Uniform {
        Uniform {
            padding: true,
            ..Uniform::new(name, kind)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> UniformType {
        self.kind
    }

    pub fn size(&self) -> usize {
        self.kind.size()
    }

    pub fn is_padding(&self) -> bool {
        self.padding
    }

    pub fn data(&self) -> &[u8] {
        &self.value
    }
}

/// Mutable view of one uniform slot; recording through it marks the slot
/// dirty in the owning program.
pub struct UniformRecorder<'a> {
    uniform: &'a mut Uniform,
    dirty_bits: &'a mut u64,
    slot: usize,
}

impl<'a> UniformRecorder<'a> {
    fn record_raw(&mut self, data: &[u8]) {
        assert!(!self.uniform.padding, "cannot record into padding uniform");
        assert!(data.len() <= self.uniform.value.len(), "uniform value too large");
        self.uniform.value[..data.len()].copy_from_slice(data);
        *self.dirty_bits |= 1u64 << self.slot;
    }

    pub fn record_sampler(&mut self, unit: i32) {
        assert!(self.uniform.kind.is_sampler(), "not a sampler uniform");
        self.record_raw(&unit.to_ne_bytes());
    }

    pub fn record_bool(&mut self, value: bool) {
        assert!(self.uniform.kind == UniformType::Bool, "not a bool uniform");
        self.record_raw(&(value as i32).to_ne_bytes());
    }

    pub fn record_int(&mut self, value: i32) {
        assert!(self.uniform.kind == UniformType::Int, "not an int uniform");
        self.record_raw(&value.to_ne_bytes());
    }

    pub fn record_float(&mut self, value: f32) {
        assert!(self.uniform.kind == UniformType::Float, "not a float uniform");
        self.record_raw(&value.to_ne_bytes());
    }

    pub fn record_vec2i(&mut self, value: IVec2) {
        assert!(self.uniform.kind == UniformType::Vec2I, "not a vec2i uniform");
        self.record_raw(ivec_bytes(&value.to_array()));
    }

    pub fn record_vec3i(&mut self, value: IVec3) {
        assert!(self.uniform.kind == UniformType::Vec3I, "not a vec3i uniform");
        self.record_raw(ivec_bytes(&value.to_array()));
    }

    pub fn record_vec4i(&mut self, value: IVec4) {
        assert!(self.uniform.kind == UniformType::Vec4I, "not a vec4i uniform");
        self.record_raw(ivec_bytes(&value.to_array()));
    }

    pub fn record_vec2f(&mut self, value: Vec2) {
        assert!(self.uniform.kind == UniformType::Vec2F, "not a vec2f uniform");
        self.record_raw(fvec_bytes(&value.to_array()));
    }

    pub fn record_vec3f(&mut self, value: Vec3) {
        assert!(self.uniform.kind == UniformType::Vec3F, "not a vec3f uniform");
        self.record_raw(fvec_bytes(&value.to_array()));
    }

    pub fn record_vec4f(&mut self, value: Vec4) {
        assert!(self.uniform.kind == UniformType::Vec4F, "not a vec4f uniform");
        self.record_raw(fvec_bytes(&value.to_array()));
    }

    pub fn record_mat3x3f(&mut self, value: Mat3) {
        assert!(self.uniform.kind == UniformType::Mat3x3F, "not a mat3x3f uniform");
        self.record_raw(fvec_bytes(&value.to_cols_array()));
    }

    pub fn record_mat4x4f(&mut self, value: Mat4) {
        assert!(self.uniform.kind == UniformType::Mat4x4F, "not a mat4x4f uniform");
        self.record_raw(fvec_bytes(&value.to_cols_array()));
    }

    /// Records up to [`MAX_BONES`] 3x4 joint matrices; each matrix is twelve
    /// floats.
    pub fn record_bones(&mut self, frames: &[[f32; 12]]) {
        assert!(self.uniform.kind == UniformType::Bones, "not a bones uniform");
        let count = frames.len().min(MAX_BONES);
        let floats = unsafe {
            std::slice::from_raw_parts(frames.as_ptr() as *const f32, count * 12)
        };
        self.record_raw(fvec_bytes(floats));
    }
}

fn fvec_bytes(values: &[f32]) -> &[u8] {
    unsafe { std::slice::from_raw_parts(values.as_ptr() as *const u8, values.len() * 4) }
}

fn ivec_bytes(values: &[i32]) -> &[u8] {
    unsafe { std::slice::from_raw_parts(values.as_ptr() as *const u8, values.len() * 4) }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShaderType {
    Vertex,
    Fragment,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InOutType {
    F32,
    Vec2F,
    Vec3F,
    Vec4F,
    Vec2I,
    Vec3I,
    Vec4I,
    Vec4B,
    Mat3x3F,
    Mat4x4F,
}

/// A declared shader input or output: type plus location index.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct InOut {
    pub kind: InOutType,
    pub index: usize,
}

/// One shader stage: source body plus its declared interface. The backend
/// turns the declarations into `in`/`out` statements ahead of the source.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Shader {
    pub kind: ShaderType,
    pub source: String,
    pub inputs: Vec<(String, InOut)>,
    pub outputs: Vec<(String, InOut)>,
}

/// Cache key describing a concrete program: name, shader source bodies,
/// input layout and the `#define` set it was compiled with.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ProgramDescription {
    pub name: String,
    pub data: Vec<String>,
    pub layout: Vec<String>,
    pub defines: Vec<String>,
}

impl ProgramDescription {
    pub fn hash_value(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

pub struct Program {
    resource: ResourceTracker,
    uniforms: Vec<Uniform>,
    shaders: Vec<Shader>,
    description: ProgramDescription,
    has_description: bool,
    dirty_bits: u64,
}

impl Program {
    pub(crate) fn new() -> Program {
        Program {
            resource: ResourceTracker::new(ResourceKind::Program),
            uniforms: Vec::new(),
            shaders: Vec::new(),
            description: ProgramDescription::default(),
            has_description: false,
            dirty_bits: 0,
        }
    }

    pub fn record_description(&mut self, description: ProgramDescription) {
        assert!(!self.has_description, "description already recorded");
        self.description = description;
        self.has_description = true;
    }

    pub fn add_shader(&mut self, shader: Shader) {
        self.shaders.push(shader);
    }

    /// Adds a uniform and returns its slot index.
    pub fn add_uniform(&mut self, name: &str, kind: UniformType) -> usize {
        self.add_uniform_internal(name, kind, false)
    }

    /// Reserves a slot index without a live uniform behind it.
    pub fn add_uniform_padding(&mut self, name: &str, kind: UniformType) -> usize {
        self.add_uniform_internal(name, kind, true)
    }

    fn add_uniform_internal(&mut self, name: &str, kind: UniformType, padding: bool) -> usize {
        let slot = self.uniforms.len();
        assert!(slot < MAX_UNIFORMS, "too many uniforms");
        self.uniforms.push(if padding {
            Uniform::padding(name, kind)
        } else {
            Uniform::new(name, kind)
        });
        slot
    }

    pub fn validate(&self) {
        assert!(self.has_description, "description not recorded");
        assert!(!self.shaders.is_empty(), "no shaders");
    }

    pub fn uniform_mut(&mut self, slot: usize) -> UniformRecorder<'_> {
        UniformRecorder {
            uniform: &mut self.uniforms[slot],
            dirty_bits: &mut self.dirty_bits,
            slot,
        }
    }

    pub fn uniforms(&self) -> &[Uniform] {
        &self.uniforms
    }

    pub fn shaders(&self) -> &[Shader] {
        &self.shaders
    }

    pub fn description(&self) -> &ProgramDescription {
        &self.description
    }

    pub fn dirty_uniforms_bitset(&self) -> u64 {
        self.dirty_bits
    }

    /// Total bytes `flush_dirty_uniforms` will produce.
    pub fn dirty_uniforms_size(&self) -> usize {
        let mut size = 0;
        for (slot, uniform) in self.uniforms.iter().enumerate() {
            if self.dirty_bits & (1u64 << slot) != 0 {
                size += uniform.size();
            }
        }
        size
    }

    /// Packs the dirty uniform values into `dst`, ascending by slot index,
    /// with no padding between them, and clears the dirty bits.
    pub fn flush_dirty_uniforms(&mut self, dst: &mut [u8]) {
        let mut cursor = 0;
        for (slot, uniform) in self.uniforms.iter().enumerate() {
            if self.dirty_bits & (1u64 << slot) != 0 {
                dst[cursor..cursor + uniform.size()].copy_from_slice(&uniform.value);
                cursor += uniform.size();
            }
        }
        assert!(cursor == dst.len(), "dirty uniform size mismatch");
        self.dirty_bits = 0;
    }

    pub(crate) fn tracker(&self) -> &ResourceTracker {
        &self.resource
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program_with_uniforms() -> Program {
        let mut program = Program::new();
        program.add_uniform("u_model", UniformType::Mat4x4F);
        program.add_uniform("u_tint", UniformType::Vec4F);
        program.add_uniform_padding("u_bones", UniformType::Bones);
        program.add_uniform("u_albedo", UniformType::Sampler2D);
        program
    }

    #[test]
    fn type_sizes_are_fixed() {
        assert_eq!(UniformType::Float.size(), 4);
        assert_eq!(UniformType::Vec2F.size(), 8);
        assert_eq!(UniformType::Vec3F.size(), 12);
        assert_eq!(UniformType::Vec4F.size(), 16);
        assert_eq!(UniformType::Mat3x3F.size(), 36);
        assert_eq!(UniformType::Mat4x4F.size(), 64);
        assert_eq!(UniformType::Bones.size(), 80 * 48);
    }

    #[test]
    fn dirty_size_sums_only_set_bits() {
        let mut program = program_with_uniforms();
        assert_eq!(program.dirty_uniforms_size(), 0);

        program.uniform_mut(0).record_mat4x4f(Mat4::IDENTITY);
        program.uniform_mut(3).record_sampler(2);
        assert_eq!(program.dirty_uniforms_bitset(), 0b1001);
        assert_eq!(program.dirty_uniforms_size(), 64 + 4);
    }

    #[test]
    fn flush_packs_ascending_and_clears() {
        let mut program = program_with_uniforms();
        program.uniform_mut(3).record_sampler(7);
        program.uniform_mut(1).record_vec4f(Vec4::new(1.0, 2.0, 3.0, 4.0));

        let mut packed = vec![0u8; program.dirty_uniforms_size()];
        program.flush_dirty_uniforms(&mut packed);

        // Slot 1 (16 bytes) lands before slot 3 (4 bytes).
        assert_eq!(packed.len(), 20);
        assert_eq!(&packed[0..4], &1.0f32.to_ne_bytes());
        assert_eq!(&packed[16..20], &7i32.to_ne_bytes());
        assert_eq!(program.dirty_uniforms_bitset(), 0);
        assert_eq!(program.dirty_uniforms_size(), 0);
    }

    #[test]
    #[should_panic(expected = "cannot record into padding uniform")]
    fn padding_rejects_values() {
        let mut program = program_with_uniforms();
        program.uniform_mut(2).record_bones(&[[0.0; 12]; 4]);
    }

    #[test]
    fn round_trip_bytes_match() {
        let mut program = Program::new();
        program.add_uniform("u_value", UniformType::Vec3F);
        let value = Vec3::new(0.25, -2.0, 9.5);
        program.uniform_mut(0).record_vec3f(value);

        let recorded = program.uniforms()[0].data().to_vec();
        let mut packed = vec![0u8; program.dirty_uniforms_size()];
        program.flush_dirty_uniforms(&mut packed);
        assert_eq!(packed, recorded);
    }
}
