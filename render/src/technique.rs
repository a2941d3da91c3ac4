//! Techniques: named shader families parameterized by a 64-bit permutation
//! bitset.
//!
//! A technique description lists the shader stages, the full uniform layout
//! and the `#define` each feature bit enables. `permute(flags)` lazily
//! builds one concrete program per distinct flag set: uniforms whose gate
//! bits are not active become padding uniforms, so slot indices line up
//! across every permutation of the family.

use crate::program::{ProgramDescription, Shader, UniformType};
use crate::program::ProgramHandle;
use fxhash::FxHashMap;

#[derive(Clone, Debug)]
pub struct TechniqueUniform {
    pub name: String,
    pub kind: UniformType,
    /// Feature bits this uniform needs; zero means always live.
    pub when: u64,
}

#[derive(Clone, Debug)]
pub struct TechniquePermute {
    pub mask: u64,
    pub define: String,
}

#[derive(Clone, Debug)]
pub struct TechniqueDescription {
    pub name: String,
    pub shaders: Vec<Shader>,
    pub uniforms: Vec<TechniqueUniform>,
    pub permutes: Vec<TechniquePermute>,
}

pub struct Technique {
    description: TechniqueDescription,
    programs: FxHashMap<u64, ProgramHandle>,
}

impl Technique {
    pub(crate) fn new(description: TechniqueDescription) -> Technique {
        Technique {
            description,
            programs: FxHashMap::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.description.name
    }

    pub fn description(&self) -> &TechniqueDescription {
        &self.description
    }

    pub(crate) fn cached_permutation(&self, flags: u64) -> Option<ProgramHandle> {
        self.programs.get(&flags).copied()
    }

    pub(crate) fn insert_permutation(&mut self, flags: u64, program: ProgramHandle) {
        self.programs.insert(flags, program);
    }

    /// Defines active for `flags`, in declaration order.
    pub(crate) fn defines_for(&self, flags: u64) -> Vec<String> {
        self.description
            .permutes
            .iter()
            .filter(|permute| flags & permute.mask == permute.mask)
            .map(|permute| permute.define.clone())
            .collect()
    }

    /// True when the uniform participates in the permutation, false when its
    /// slot is padding.
    pub(crate) fn uniform_live(uniform: &TechniqueUniform, flags: u64) -> bool {
        uniform.when == 0 || flags & uniform.when == uniform.when
    }

    /// The description record used as the program cache key.
    pub(crate) fn program_description(&self, flags: u64) -> ProgramDescription {
        ProgramDescription {
            name: self.description.name.clone(),
            data: self
                .description
                .shaders
                .iter()
                .map(|shader| shader.source.clone())
                .collect(),
            layout: self
                .description
                .shaders
                .iter()
                .flat_map(|shader| shader.inputs.iter().map(|(name, _)| name.clone()))
                .collect(),
            defines: self.defines_for(flags),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{InOut, InOutType, ShaderType};

    fn description() -> TechniqueDescription {
        TechniqueDescription {
            name: String::from("geometry"),
            shaders: vec![Shader {
                kind: ShaderType::Vertex,
                source: String::from("void main() { rx_position = vec4f(0.0); }"),
                inputs: vec![(
                    String::from("a_position"),
                    InOut {
                        kind: InOutType::Vec3F,
                        index: 0,
                    },
                )],
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
        }
    }

    #[test]
    fn defines_follow_flags() {
        let technique = Technique::new(description());
        assert!(technique.defines_for(0).is_empty());
        assert_eq!(technique.defines_for(1 << 1), vec![String::from("HAS_ALBEDO")]);
    }

    #[test]
    fn descriptions_differ_by_defines_only() {
        let technique = Technique::new(description());
        let plain = technique.program_description(0);
        let textured = technique.program_description(1 << 1);
        assert_ne!(plain, textured);
        assert_eq!(plain.data, textured.data);
        assert_ne!(plain.hash_value(), textured.hash_value());
    }

    #[test]
    fn gated_uniforms_go_padding() {
        let technique = Technique::new(description());
        let uniforms = &technique.description().uniforms;
        assert!(Technique::uniform_live(&uniforms[0], 0));
        assert!(!Technique::uniform_live(&uniforms[1], 0));
        assert!(Technique::uniform_live(&uniforms[1], 1 << 1));
    }
}
