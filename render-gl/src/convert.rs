//! Translation tables from frontend enums to GL constants.

use crate::api as gl;
use crate::api::types::*;
use karst_render::command::PrimitiveType;
use karst_render::state::{
    BlendFactor, CullFaceType, FrontFaceType, PolygonModeType, StencilFunction, StencilOperation,
};
use karst_render::texture::{FilterOptions, TextureFormat, WrapType};

pub fn convert_primitive_type(primitive: PrimitiveType) -> GLenum {
    match primitive {
        PrimitiveType::Points => gl::POINTS,
        PrimitiveType::Lines => gl::LINES,
        PrimitiveType::Triangles => gl::TRIANGLES,
        PrimitiveType::TriangleStrip => gl::TRIANGLE_STRIP,
    }
}

pub fn convert_blend_factor(factor: BlendFactor) -> GLenum {
    match factor {
        BlendFactor::Zero => gl::ZERO,
        BlendFactor::One => gl::ONE,
        BlendFactor::SrcColor => gl::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => gl::ONE_MINUS_SRC_COLOR,
        BlendFactor::DstColor => gl::DST_COLOR,
        BlendFactor::OneMinusDstColor => gl::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlpha => gl::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => gl::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => gl::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => gl::ONE_MINUS_DST_ALPHA,
        BlendFactor::ConstantColor => gl::CONSTANT_COLOR,
        BlendFactor::OneMinusConstantColor => gl::ONE_MINUS_CONSTANT_COLOR,
        BlendFactor::ConstantAlpha => gl::CONSTANT_ALPHA,
        BlendFactor::OneMinusConstantAlpha => gl::ONE_MINUS_CONSTANT_ALPHA,
        BlendFactor::SrcAlphaSaturate => gl::SRC_ALPHA_SATURATE,
    }
}

pub fn convert_stencil_function(function: StencilFunction) -> GLenum {
    match function {
        StencilFunction::Never => gl::NEVER,
        StencilFunction::Less => gl::LESS,
        StencilFunction::LessEqual => gl::LEQUAL,
        StencilFunction::Greater => gl::GREATER,
        StencilFunction::GreaterEqual => gl::GEQUAL,
        StencilFunction::Equal => gl::EQUAL,
        StencilFunction::NotEqual => gl::NOTEQUAL,
        StencilFunction::Always => gl::ALWAYS,
    }
}

pub fn convert_stencil_operation(operation: StencilOperation) -> GLenum {
    match operation {
        StencilOperation::Keep => gl::KEEP,
        StencilOperation::Zero => gl::ZERO,
        StencilOperation::Replace => gl::REPLACE,
        StencilOperation::Increment => gl::INCR,
        StencilOperation::IncrementWrap => gl::INCR_WRAP,
        StencilOperation::Decrement => gl::DECR,
        StencilOperation::DecrementWrap => gl::DECR_WRAP,
        StencilOperation::Invert => gl::INVERT,
    }
}

pub fn convert_polygon_mode(mode: PolygonModeType) -> GLenum {
    match mode {
        PolygonModeType::Point => gl::POINT,
        PolygonModeType::Line => gl::LINE,
        PolygonModeType::Fill => gl::FILL,
    }
}

pub fn convert_front_face(front_face: FrontFaceType) -> GLenum {
    match front_face {
        FrontFaceType::ClockWise => gl::CW,
        FrontFaceType::CounterClockWise => gl::CCW,
    }
}

pub fn convert_cull_face(cull_face: CullFaceType) -> GLenum {
    match cull_face {
        CullFaceType::Front => gl::FRONT,
        CullFaceType::Back => gl::BACK,
    }
}

pub fn convert_texture_wrap(wrap: WrapType) -> GLint {
    (match wrap {
        WrapType::ClampToEdge => gl::CLAMP_TO_EDGE,
        WrapType::ClampToBorder => gl::CLAMP_TO_BORDER,
        WrapType::Repeat => gl::REPEAT,
        WrapType::MirrorClampToEdge => gl::MIRROR_CLAMP_TO_EDGE,
        WrapType::MirroredRepeat => gl::MIRRORED_REPEAT,
    }) as GLint
}

pub struct Filter {
    pub min: GLint,
    pub mag: GLint,
}

pub fn convert_texture_filter(filter: FilterOptions) -> Filter {
    let mag = if filter.bilinear {
        gl::LINEAR
    } else {
        gl::NEAREST
    };

    let min = if filter.mipmaps {
        match (filter.bilinear, filter.trilinear) {
            (_, true) => gl::LINEAR_MIPMAP_LINEAR,
            (true, false) => gl::LINEAR_MIPMAP_NEAREST,
            (false, false) => gl::NEAREST_MIPMAP_NEAREST,
        }
    } else {
        mag
    };

    Filter {
        min: min as GLint,
        mag: mag as GLint,
    }
}

/// Sized internal format for texture storage.
pub fn convert_texture_data_format(format: TextureFormat) -> GLenum {
    match format {
        TextureFormat::Rgba8 | TextureFormat::Bgra8 => gl::RGBA8,
        TextureFormat::RgbaF16 | TextureFormat::BgraF16 => gl::RGBA16F,
        TextureFormat::R8 => gl::R8,
        TextureFormat::D16 => gl::DEPTH_COMPONENT16,
        TextureFormat::D24 => gl::DEPTH_COMPONENT24,
        TextureFormat::D32 => gl::DEPTH_COMPONENT32,
        TextureFormat::D32F => gl::DEPTH_COMPONENT32F,
        TextureFormat::D24S8 => gl::DEPTH24_STENCIL8,
        TextureFormat::D32FS8 => gl::DEPTH32F_STENCIL8,
        TextureFormat::S8 => gl::STENCIL_INDEX8,
        TextureFormat::Dxt1 => gl::COMPRESSED_RGBA_S3TC_DXT1_EXT,
        TextureFormat::Dxt5 => gl::COMPRESSED_RGBA_S3TC_DXT5_EXT,
    }
}

/// Client pixel format for uploads.
pub fn convert_texture_format(format: TextureFormat) -> GLenum {
    match format {
        TextureFormat::Rgba8 | TextureFormat::RgbaF16 => gl::RGBA,
        TextureFormat::Bgra8 | TextureFormat::BgraF16 => gl::BGRA,
        TextureFormat::R8 => gl::RED,
        TextureFormat::D16 | TextureFormat::D24 | TextureFormat::D32 | TextureFormat::D32F => {
            gl::DEPTH_COMPONENT
        }
        TextureFormat::D24S8 | TextureFormat::D32FS8 => gl::DEPTH_STENCIL,
        TextureFormat::S8 => gl::STENCIL_INDEX,
        TextureFormat::Dxt1 | TextureFormat::Dxt5 => {
            panic!("compressed formats upload through the compressed path")
        }
    }
}

/// Client pixel component type for uploads.
pub fn convert_texture_data_type(format: TextureFormat) -> GLenum {
    match format {
        TextureFormat::Rgba8 | TextureFormat::Bgra8 | TextureFormat::R8 | TextureFormat::S8 => {
            gl::UNSIGNED_BYTE
        }
        TextureFormat::RgbaF16 | TextureFormat::BgraF16 => gl::HALF_FLOAT,
        TextureFormat::D16 => gl::UNSIGNED_SHORT,
        TextureFormat::D24 | TextureFormat::D32 => gl::UNSIGNED_INT,
        TextureFormat::D32F => gl::FLOAT,
        TextureFormat::D24S8 => gl::UNSIGNED_INT_24_8,
        TextureFormat::D32FS8 => gl::FLOAT_32_UNSIGNED_INT_24_8_REV,
        TextureFormat::Dxt1 | TextureFormat::Dxt5 => {
            panic!("compressed formats upload through the compressed path")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_translation() {
        assert_eq!(convert_primitive_type(PrimitiveType::Triangles), gl::TRIANGLES);
        assert_eq!(
            convert_primitive_type(PrimitiveType::TriangleStrip),
            gl::TRIANGLE_STRIP
        );
    }

    #[test]
    fn filter_translation() {
        let nearest = convert_texture_filter(FilterOptions {
            bilinear: false,
            trilinear: false,
            mipmaps: false,
        });
        assert_eq!(nearest.min, gl::NEAREST as GLint);
        assert_eq!(nearest.mag, gl::NEAREST as GLint);

        let trilinear = convert_texture_filter(FilterOptions {
            bilinear: true,
            trilinear: true,
            mipmaps: true,
        });
        assert_eq!(trilinear.min, gl::LINEAR_MIPMAP_LINEAR as GLint);
        assert_eq!(trilinear.mag, gl::LINEAR as GLint);
    }

    #[test]
    fn format_translation_split() {
        assert_eq!(convert_texture_data_format(TextureFormat::Rgba8), gl::RGBA8);
        assert_eq!(convert_texture_format(TextureFormat::Bgra8), gl::BGRA);
        assert_eq!(
            convert_texture_data_type(TextureFormat::D24S8),
            gl::UNSIGNED_INT_24_8
        );
        assert_eq!(
            convert_texture_data_format(TextureFormat::D24S8),
            gl::DEPTH24_STENCIL8
        );
    }
}
