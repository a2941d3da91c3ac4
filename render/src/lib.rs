//! Command-buffer render frontend.
//!
//! Resources (buffers, textures, targets, programs) live in fixed-capacity
//! pools and are addressed by small `Copy` handles. A single shared
//! [`context::Context`] records every operation into a typed command stream;
//! a [`backend::Backend`] replays that stream against a concrete graphics
//! API on the render thread. Recording is thread-safe, replay is not:
//! `process()` and `swap()` belong to the thread that owns the graphics
//! context.
//!
//! Destruction is deferred by one `process()` so backend replay never sees a
//! dangling slot.

pub mod backend;
pub mod buffer;
pub mod command;
pub mod context;
pub mod gbuffer;
pub mod globals;
pub mod logger;
pub mod material;
pub mod model;
pub mod null;
pub mod pool;
pub mod program;
pub mod resource;
pub mod state;
pub mod tag;
pub mod target;
pub mod technique;
pub mod texture;
pub mod timer;

pub use self::backend::{AllocationInfo, Backend, DeviceInfo, Frame, Resources};
pub use self::buffer::{
    Attribute, AttributeType, Buffer, BufferEdit, BufferHandle, BufferType, EditSource,
    ElementType,
};
pub use self::command::{
    clear_color, Buffers, Command, CommandBuffer, CommandHeader, CommandRecord, DrawTextures,
    Edits, PrimitiveType, ResourceId, CLEAR_DEPTH, CLEAR_STENCIL, MAX_DRAW_BUFFERS, MAX_TEXTURES,
};
pub use self::context::{ClearValue, Context, ContextError, FrameStatistics, Statistics};
pub use self::material::Material;
pub use self::null::NullBackend;
pub use self::pool::{Handle, Pool};
pub use self::program::{
    InOut, InOutType, Program, ProgramDescription, ProgramHandle, Shader, ShaderType, Uniform,
    UniformType, MAX_BONES, MAX_UNIFORMS,
};
pub use self::resource::ResourceKind;
pub use self::state::State;
pub use self::tag::Tag;
pub use self::target::{Attachment, Target, TargetHandle};
pub use self::technique::{
    Technique, TechniqueDescription, TechniquePermute, TechniqueUniform,
};
pub use self::texture::{
    Face, FilterOptions, Texture1D, Texture1DHandle, Texture2D, Texture2DHandle, Texture3D,
    Texture3DHandle, TextureCM, TextureCMHandle, TextureFormat, TextureType, WrapType,
};
