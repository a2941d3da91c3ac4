//! The typed command stream shared by the frontend and backends.
//!
//! `CommandBuffer` owns an ordered list of header-tagged records plus a
//! fixed-capacity byte arena for variable-length tails (today: the packed
//! dirty-uniform bytes of draw commands). Capacity is set once from
//! `render.command_memory`; overflowing either side is a hard error, and
//! `reset` rewinds both without releasing storage.

use crate::buffer::{BufferEdit, BufferHandle};
use crate::program::ProgramHandle;
use crate::state::State;
use crate::tag::Tag;
use crate::target::TargetHandle;
use crate::texture::{
    Texture1DHandle, Texture2DHandle, Texture3DHandle, TextureCMHandle, TextureEdit1D,
    TextureEdit2D, TextureEdit3D,
};
use std::ops::Range;

pub const MAX_DRAW_BUFFERS: usize = 8;
pub const MAX_TEXTURES: usize = 8;

/// Clear-mask bits: depth, stencil, then one bit per color attachment.
pub const CLEAR_DEPTH: u32 = 1 << 0;
pub const CLEAR_STENCIL: u32 = 1 << 1;

pub const fn clear_color(index: usize) -> u32 {
    1 << (2 + index as u32)
}

/// Ordered set of color-attachment indices enabled for a draw or clear.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Buffers {
    elements: [u8; MAX_DRAW_BUFFERS],
    count: u8,
}

impl Buffers {
    pub fn new() -> Buffers {
        Buffers {
            elements: [0; MAX_DRAW_BUFFERS],
            count: 0,
        }
    }

    pub fn add(&mut self, attachment: u8) -> &mut Buffers {
        assert!((self.count as usize) < MAX_DRAW_BUFFERS, "too many draw buffers");
        self.elements[self.count as usize] = attachment;
        self.count += 1;
        self
    }

    pub fn indices(&self) -> &[u8] {
        &self.elements[..self.count as usize]
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl Default for Buffers {
    fn default() -> Buffers {
        Buffers::new()
    }
}

impl<'a> From<&'a [u8]> for Buffers {
    fn from(indices: &'a [u8]) -> Buffers {
        let mut buffers = Buffers::new();
        for &index in indices {
            buffers.add(index);
        }
        buffers
    }
}

/// Texture-unit bind tags; the type character tells the backend which
/// texture-unit slot the bind goes through.
pub const TEXTURE_TAG_1D: u8 = b'1';
pub const TEXTURE_TAG_2D: u8 = b'2';
pub const TEXTURE_TAG_3D: u8 = b'3';
pub const TEXTURE_TAG_CM: u8 = b'c';

/// Textures bound for a draw, in texture-unit order. `add_*` returns the unit
/// index, which the caller records into the matching sampler uniform.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DrawTextures {
    kinds: [u8; MAX_TEXTURES],
    binds: [u32; MAX_TEXTURES],
    count: u8,
}

impl DrawTextures {
    pub fn new() -> DrawTextures {
        DrawTextures {
            kinds: [0; MAX_TEXTURES],
            binds: [0; MAX_TEXTURES],
            count: 0,
        }
    }

    fn push(&mut self, kind: u8, index: usize) -> i32 {
        assert!((self.count as usize) < MAX_TEXTURES, "too many draw textures");
        let unit = self.count as usize;
        self.kinds[unit] = kind;
        self.binds[unit] = index as u32;
        self.count += 1;
        unit as i32
    }

    pub fn add_texture1d(&mut self, texture: Texture1DHandle) -> i32 {
        self.push(TEXTURE_TAG_1D, texture.index())
    }

    pub fn add_texture2d(&mut self, texture: Texture2DHandle) -> i32 {
        self.push(TEXTURE_TAG_2D, texture.index())
    }

    pub fn add_texture3d(&mut self, texture: Texture3DHandle) -> i32 {
        self.push(TEXTURE_TAG_3D, texture.index())
    }

    pub fn add_texture_cm(&mut self, texture: TextureCMHandle) -> i32 {
        self.push(TEXTURE_TAG_CM, texture.index())
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// (type tag, pool index) per occupied unit.
    pub fn binds(&self) -> impl Iterator<Item = (u8, usize)> + '_ {
        (0..self.count as usize).map(move |unit| (self.kinds[unit], self.binds[unit] as usize))
    }
}

impl Default for DrawTextures {
    fn default() -> DrawTextures {
        DrawTextures::new()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PrimitiveType {
    Points,
    Lines,
    Triangles,
    TriangleStrip,
}

/// Typed reference to a pooled resource inside a command.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResourceId {
    Buffer(BufferHandle),
    Target(TargetHandle),
    Program(ProgramHandle),
    Texture1D(Texture1DHandle),
    Texture2D(Texture2DHandle),
    Texture3D(Texture3DHandle),
    TextureCM(TextureCMHandle),
}

/// Edit lists carried by `resource_update` commands.
#[derive(Clone, Debug)]
pub enum Edits {
    Buffer(Box<[BufferEdit]>),
    Texture1D(Box<[TextureEdit1D]>),
    Texture2D(Box<[TextureEdit2D]>),
    Texture3D(Box<[TextureEdit3D]>),
}

impl Edits {
    pub fn len(&self) -> usize {
        match self {
            Edits::Buffer(edits) => edits.len(),
            Edits::Texture1D(edits) => edits.len(),
            Edits::Texture2D(edits) => edits.len(),
            Edits::Texture3D(edits) => edits.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug)]
pub struct ClearCommand {
    pub state: State,
    pub target: TargetHandle,
    pub draw_buffers: Buffers,
    /// Per-color-attachment clear bits, already shifted down past the
    /// depth/stencil bits.
    pub clear_colors: u32,
    pub clear_depth: bool,
    pub clear_stencil: bool,
    pub depth_value: f32,
    pub stencil_value: i32,
    pub color_values: [[f32; 4]; MAX_DRAW_BUFFERS],
}

#[derive(Clone, Debug)]
pub struct DrawCommand {
    pub state: State,
    pub target: TargetHandle,
    /// `None` for bufferless draws, which must use offset 0.
    pub buffer: Option<BufferHandle>,
    pub program: ProgramHandle,
    pub count: usize,
    pub offset: usize,
    pub primitive: PrimitiveType,
    pub draw_buffers: Buffers,
    pub draw_textures: DrawTextures,
    pub dirty_uniforms: u64,
    /// Packed dirty uniform bytes in the command buffer's arena.
    pub uniforms: Range<u32>,
}

#[derive(Clone, Debug)]
pub struct BlitCommand {
    pub state: State,
    pub src_target: TargetHandle,
    pub src_attachment: usize,
    pub dst_target: TargetHandle,
    pub dst_attachment: usize,
}

#[derive(Clone, Debug)]
pub enum Command {
    ResourceAllocate {
        resource: ResourceId,
    },
    ResourceConstruct {
        resource: ResourceId,
    },
    ResourceUpdate {
        resource: ResourceId,
        edits: Edits,
    },
    ResourceDestroy {
        resource: ResourceId,
    },
    Clear(ClearCommand),
    Draw(DrawCommand),
    Blit(BlitCommand),
    /// `Some(tag)` begins a GPU timing sample, `None` ends the innermost one.
    Profile(Option<&'static str>),
}

#[derive(Copy, Clone, Debug)]
pub struct CommandHeader {
    pub tag: Tag,
}

#[derive(Clone, Debug)]
pub struct CommandRecord {
    pub header: CommandHeader,
    pub command: Command,
}

pub struct CommandBuffer {
    records: Vec<CommandRecord>,
    arena: Vec<u8>,
    capacity: usize,
}

impl CommandBuffer {
    pub fn new(capacity: usize) -> CommandBuffer {
        CommandBuffer {
            records: Vec::new(),
            arena: Vec::with_capacity(capacity.min(1 << 20)),
            capacity,
        }
    }

    fn used(&self) -> usize {
        self.records.len() * std::mem::size_of::<CommandRecord>() + self.arena.len()
    }

    pub(crate) fn record(&mut self, tag: Tag, command: Command) {
        assert!(
            self.used() + std::mem::size_of::<CommandRecord>() <= self.capacity,
            "command buffer capacity exhausted"
        );
        self.records.push(CommandRecord {
            header: CommandHeader { tag },
            command,
        });
    }

    /// Reserves `size` bytes in the tail arena and returns their range.
    pub(crate) fn allocate_bytes(&mut self, size: usize) -> Range<u32> {
        assert!(
            self.used() + size <= self.capacity,
            "command buffer capacity exhausted"
        );
        let start = self.arena.len();
        self.arena.resize(start + size, 0);
        start as u32..(start + size) as u32
    }

    pub(crate) fn bytes_mut(&mut self, range: Range<u32>) -> &mut [u8] {
        &mut self.arena[range.start as usize..range.end as usize]
    }

    pub fn bytes(&self, range: Range<u32>) -> &[u8] {
        &self.arena[range.start as usize..range.end as usize]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CommandRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rewinds both the record list and the tail arena.
    pub fn reset(&mut self) {
        self.records.clear();
        self.arena.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_keep_order_and_reset() {
        let mut commands = CommandBuffer::new(1 << 20);
        commands.record(crate::render_tag!("a"), Command::Profile(Some("a")));
        commands.record(crate::render_tag!("b"), Command::Profile(None));
        assert_eq!(commands.len(), 2);

        let tags: Vec<_> = commands.iter().map(|r| r.header.tag.description).collect();
        assert_eq!(tags, vec!["a", "b"]);

        commands.reset();
        assert!(commands.is_empty());
    }

    #[test]
    fn arena_round_trips_bytes() {
        let mut commands = CommandBuffer::new(1 << 20);
        let range = commands.allocate_bytes(8);
        commands.bytes_mut(range.clone()).copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(commands.bytes(range), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    #[should_panic(expected = "command buffer capacity exhausted")]
    fn overflow_is_fatal() {
        let mut commands = CommandBuffer::new(64);
        loop {
            commands.record(crate::render_tag!("spin"), Command::Profile(None));
        }
    }

    #[test]
    fn clear_mask_bits() {
        assert_eq!(CLEAR_DEPTH, 0b01);
        assert_eq!(CLEAR_STENCIL, 0b10);
        assert_eq!(clear_color(0), 0b100);
        assert_eq!(clear_color(3), 0b100000);
    }
}
