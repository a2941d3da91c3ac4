//! Shader assembly, compilation and program linking.
//!
//! Shader source arrives as a bare body plus declared inputs, outputs and
//! uniforms. We prepend the engine prelude (type aliases and sampler
//! wrappers), the permutation defines, the generated `in`/`out` and
//! `uniform` declarations, and a `#line 0` so driver diagnostics point into
//! the user's source.

use crate::api as gl;
use crate::api::types::*;
use crate::api::Gl;
use karst_render::program::{InOutType, Shader, ShaderType, Uniform, UniformType};
use log::error;
use std::ffi::CString;

const PRELUDE: &str = "#version 330 core\n\
#extension GL_OES_standard_derivatives : enable\n\
#define vec2f vec2\n\
#define vec3f vec3\n\
#define vec4f vec4\n\
#define vec2i ivec2\n\
#define vec3i ivec3\n\
#define vec4i ivec4\n\
#define vec4b vec4\n\
#define mat3x3f mat3\n\
#define mat4x4f mat4\n\
#define mat3x4f mat3x4\n\
#define bonesf mat3x4f[80]\n\
#define rx_sampler1D sampler1D\n\
#define rx_sampler2D sampler2D\n\
#define rx_sampler3D sampler3D\n\
#define rx_samplerCM samplerCube\n\
#define rx_texture1D texture\n\
#define rx_texture2D texture\n\
#define rx_texture3D texture\n\
#define rx_textureCM texture\n\
#define rx_texture1DLod textureLod\n\
#define rx_texture2DLod textureLod\n\
#define rx_texture3DLod textureLod\n\
#define rx_textureCMLod textureLod\n\
#define rx_position gl_Position\n\
#define rx_point_size gl_PointSize\n";

fn inout_to_string(kind: InOutType) -> &'static str {
    match kind {
        InOutType::Mat4x4F => "mat4",
        InOutType::Mat3x3F => "mat3",
        InOutType::Vec2F => "vec2f",
        InOutType::Vec3F => "vec3f",
        InOutType::Vec4F => "vec4f",
        InOutType::Vec2I => "vec2i",
        InOutType::Vec3I => "vec3i",
        InOutType::Vec4I => "vec4i",
        InOutType::Vec4B => "vec4b",
        InOutType::F32 => "float",
    }
}

fn uniform_to_string(kind: UniformType) -> &'static str {
    match kind {
        UniformType::Sampler1D => "rx_sampler1D",
        UniformType::Sampler2D => "rx_sampler2D",
        UniformType::Sampler3D => "rx_sampler3D",
        UniformType::SamplerCM => "rx_samplerCM",
        UniformType::Bool => "bool",
        UniformType::Int => "int",
        UniformType::Float => "float",
        UniformType::Vec2I => "vec2i",
        UniformType::Vec3I => "vec3i",
        UniformType::Vec4I => "vec4i",
        UniformType::Vec2F => "vec2f",
        UniformType::Vec3F => "vec3f",
        UniformType::Vec4F => "vec4f",
        UniformType::Mat4x4F => "mat4x4f",
        UniformType::Mat3x3F => "mat3x3f",
        UniformType::Bones => "bonesf",
    }
}

/// Builds the complete source handed to the driver.
pub(crate) fn assemble_shader(uniforms: &[Uniform], defines: &[String], shader: &Shader) -> String {
    let mut contents = String::from(PRELUDE);

    for define in defines {
        contents.push_str(&format!("#define {}\n", define));
    }

    match shader.kind {
        ShaderType::Vertex => {
            // Vertex attributes carry explicit locations; outputs are
            // matched by name against the fragment stage.
            for (name, inout) in &shader.inputs {
                contents.push_str(&format!(
                    "layout(location = {}) in {} {};\n",
                    inout.index,
                    inout_to_string(inout.kind),
                    name
                ));
            }
            for (name, inout) in &shader.outputs {
                contents.push_str(&format!("out {} {};\n", inout_to_string(inout.kind), name));
            }
        }
        ShaderType::Fragment => {
            for (name, inout) in &shader.inputs {
                contents.push_str(&format!("in {} {};\n", inout_to_string(inout.kind), name));
            }
            for (name, inout) in &shader.outputs {
                contents.push_str(&format!(
                    "layout(location = {}) out {} {};\n",
                    inout.index,
                    inout_to_string(inout.kind),
                    name
                ));
            }
        }
    }

    for uniform in uniforms {
        if !uniform.is_padding() {
            contents.push_str(&format!(
                "uniform {} {};\n",
                uniform_to_string(uniform.kind()),
                uniform.name()
            ));
        }
    }

    contents.push_str("#line 0\n");
    contents.push_str(&shader.source);
    contents
}

fn shader_info_log(gl: &Gl, handle: GLuint) -> String {
    unsafe {
        let mut log_size = 0;
        gl.GetShaderiv(handle, gl::INFO_LOG_LENGTH, &mut log_size);
        if log_size <= 0 {
            return String::new();
        }
        let mut log = vec![0u8; log_size as usize];
        gl.GetShaderInfoLog(
            handle,
            log_size,
            &mut log_size,
            log.as_mut_ptr() as *mut GLchar,
        );
        log.truncate(log_size as usize);
        String::from_utf8_lossy(&log).into_owned()
    }
}

fn program_info_log(gl: &Gl, handle: GLuint) -> String {
    unsafe {
        let mut log_size = 0;
        gl.GetProgramiv(handle, gl::INFO_LOG_LENGTH, &mut log_size);
        if log_size <= 0 {
            return String::new();
        }
        let mut log = vec![0u8; log_size as usize];
        gl.GetProgramInfoLog(
            handle,
            log_size,
            &mut log_size,
            log.as_mut_ptr() as *mut GLchar,
        );
        log.truncate(log_size as usize);
        String::from_utf8_lossy(&log).into_owned()
    }
}

/// Compiles one stage. A failed compile is logged and reported as `None`;
/// the frame continues without the program.
pub(crate) fn compile_shader(
    gl: &Gl,
    uniforms: &[Uniform],
    defines: &[String],
    shader: &Shader,
) -> Option<GLuint> {
    let kind = match shader.kind {
        ShaderType::Vertex => gl::VERTEX_SHADER,
        ShaderType::Fragment => gl::FRAGMENT_SHADER,
    };

    let contents = assemble_shader(uniforms, defines, shader);

    unsafe {
        let handle = gl.CreateShader(kind);
        let data = contents.as_ptr() as *const GLchar;
        let size = contents.len() as GLint;
        gl.ShaderSource(handle, 1, &data, &size);
        gl.CompileShader(handle);

        let mut status = 0;
        gl.GetShaderiv(handle, gl::COMPILE_STATUS, &mut status);
        if status != gl::TRUE as GLint {
            error!(target: "render/es3", "failed compiling shader");
            let log = shader_info_log(gl, handle);
            if !log.is_empty() {
                error!(target: "render/es3", "\n{}\n{}", log, contents);
            }
            gl.DeleteShader(handle);
            return None;
        }
        Some(handle)
    }
}

/// Compiles and links every stage into `program`, then detaches and deletes
/// the shader objects. Returns the uniform locations in slot order, -1 for
/// padding slots.
pub(crate) fn link_program(
    gl: &Gl,
    program: GLuint,
    uniforms: &[Uniform],
    defines: &[String],
    shaders: &[Shader],
) -> Vec<GLint> {
    let mut handles = Vec::with_capacity(shaders.len());
    for shader in shaders {
        if let Some(handle) = compile_shader(gl, uniforms, defines, shader) {
            unsafe {
                gl.AttachShader(program, handle);
            }
            handles.push(handle);
        }
    }

    unsafe {
        gl.LinkProgram(program);

        let mut status = 0;
        gl.GetProgramiv(program, gl::LINK_STATUS, &mut status);
        if status != gl::TRUE as GLint {
            error!(target: "render/es3", "failed linking program");
            let log = program_info_log(gl, program);
            if !log.is_empty() {
                error!(target: "render/es3", "\n{}", log);
            }
        }

        for handle in handles {
            gl.DetachShader(program, handle);
            gl.DeleteShader(handle);
        }
    }

    uniforms
        .iter()
        .map(|uniform| {
            if uniform.is_padding() {
                // Padding slots never reach the driver.
                -1
            } else {
                let name = CString::new(uniform.name()).unwrap_or_default();
                unsafe { gl.GetUniformLocation(program, name.as_ptr()) }
            }
        })
        .collect()
}

// Keeps the pointer-free parts testable without a context.
#[cfg(test)]
mod tests {
    use super::*;
    use karst_render::program::InOut;

    fn passthrough_vertex() -> Shader {
        Shader {
            kind: ShaderType::Vertex,
            source: String::from("void main() { rx_position = vec4f(a_position, 1.0); }"),
            inputs: vec![(
                String::from("a_position"),
                InOut {
                    kind: InOutType::Vec3F,
                    index: 0,
                },
            )],
            outputs: vec![(
                String::from("v_coordinate"),
                InOut {
                    kind: InOutType::Vec2F,
                    index: 0,
                },
            )],
        }
    }

    #[test]
    fn assembly_layout() {
        let uniforms = vec![
            Uniform::new("u_model", UniformType::Mat4x4F),
            Uniform::padding("u_bones", UniformType::Bones),
        ];

        let source = assemble_shader(
            &uniforms,
            &[String::from("HAS_ALBEDO")],
            &passthrough_vertex(),
        );

        assert!(source.starts_with("#version 330 core\n"));
        assert!(source.contains("#define HAS_ALBEDO\n"));
        assert!(source.contains("layout(location = 0) in vec3f a_position;\n"));
        assert!(source.contains("out vec2f v_coordinate;\n"));
        assert!(source.contains("uniform mat4x4f u_model;\n"));
        // Padding uniforms are not declared.
        assert!(!source.contains("u_bones"));
        assert!(source.contains("#line 0\n"));

        // The prelude precedes the declarations, declarations precede the
        // user source.
        let define = source.find("#define HAS_ALBEDO").unwrap();
        let input = source.find("layout(location = 0) in").unwrap();
        let line = source.find("#line 0").unwrap();
        let body = source.find("void main").unwrap();
        assert!(define < input && input < line && line < body);
    }
}
