//! Texture resources (1D, 2D, 3D, cubemap).
//!
//! A texture's description is recorded exactly once, field by field, before
//! `initialize_texture`; `validate` asserts the description is complete.
//! Client-side data is one contiguous byte buffer indexed by precomputed
//! per-level `{offset, size, dimensions}` records. Cubemaps store six faces
//! per level, concatenated in face-index order; each face is
//! `level.size / 6` bytes. `attachment` textures allocate no client bytes.

use crate::pool::Handle;
use crate::resource::{ResourceKind, ResourceTracker};
use bitflags::bitflags;
use glam::{UVec2, UVec3, Vec4};

pub type Texture1DHandle = Handle<Texture1D>;
pub type Texture2DHandle = Handle<Texture2D>;
pub type Texture3DHandle = Handle<Texture3D>;
pub type TextureCMHandle = Handle<TextureCM>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8,
    Bgra8,
    RgbaF16,
    BgraF16,
    R8,
    D16,
    D24,
    D32,
    D32F,
    D24S8,
    D32FS8,
    S8,
    Dxt1,
    Dxt5,
}

impl TextureFormat {
    pub fn is_color(self) -> bool {
        matches!(
            self,
            TextureFormat::Rgba8
                | TextureFormat::Bgra8
                | TextureFormat::RgbaF16
                | TextureFormat::BgraF16
                | TextureFormat::R8
                | TextureFormat::Dxt1
                | TextureFormat::Dxt5
        )
    }

    pub fn is_depth(self) -> bool {
        matches!(
            self,
            TextureFormat::D16 | TextureFormat::D24 | TextureFormat::D32 | TextureFormat::D32F
        )
    }

    pub fn is_stencil(self) -> bool {
        self == TextureFormat::S8
    }

    pub fn is_depth_stencil(self) -> bool {
        matches!(self, TextureFormat::D24S8 | TextureFormat::D32FS8)
    }

    pub fn is_compressed(self) -> bool {
        matches!(self, TextureFormat::Dxt1 | TextureFormat::Dxt5)
    }

    /// Floating-point color layouts; blits may not mix these with integer
    /// layouts.
    pub fn is_float_color(self) -> bool {
        matches!(self, TextureFormat::RgbaF16 | TextureFormat::BgraF16)
    }

    pub fn bits_per_pixel(self) -> usize {
        match self {
            TextureFormat::Rgba8 | TextureFormat::Bgra8 => 32,
            TextureFormat::RgbaF16 | TextureFormat::BgraF16 => 64,
            TextureFormat::R8 => 8,
            TextureFormat::D16 => 16,
            TextureFormat::D24 => 32,
            TextureFormat::D32 | TextureFormat::D32F => 32,
            TextureFormat::D24S8 => 32,
            TextureFormat::D32FS8 => 64,
            TextureFormat::S8 => 8,
            TextureFormat::Dxt1 => 4,
            TextureFormat::Dxt5 => 8,
        }
    }

    /// Bytes of one 4x4 block for compressed layouts.
    pub fn block_size(self) -> usize {
        match self {
            TextureFormat::Dxt1 => 8,
            TextureFormat::Dxt5 => 16,
            _ => panic!("not a compressed format"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TextureType {
    Static,
    Dynamic,
    /// Render-target storage; no client-side bytes are kept.
    Attachment,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WrapType {
    ClampToEdge,
    ClampToBorder,
    Repeat,
    MirrorClampToEdge,
    MirroredRepeat,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterOptions {
    pub bilinear: bool,
    pub trilinear: bool,
    pub mipmaps: bool,
}

/// Cubemap faces in attachment order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Face {
    Right,
    Left,
    Top,
    Bottom,
    Front,
    Back,
}

impl Face {
    pub fn index(self) -> usize {
        match self {
            Face::Right => 0,
            Face::Left => 1,
            Face::Top => 2,
            Face::Bottom => 3,
            Face::Front => 4,
            Face::Back => 5,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LevelInfo<D> {
    pub offset: usize,
    pub size: usize,
    pub dimensions: D,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TextureEdit1D {
    pub level: usize,
    pub offset: usize,
    pub size: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TextureEdit2D {
    pub level: usize,
    pub offset: UVec2,
    pub size: UVec2,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TextureEdit3D {
    pub level: usize,
    pub offset: UVec3,
    pub size: UVec3,
}

bitflags! {
    struct Recorded: u32 {
        const FORMAT = 1 << 0;
        const TYPE = 1 << 1;
        const FILTER = 1 << 2;
        const WRAP = 1 << 3;
        const DIMENSIONS = 1 << 4;
        const LEVELS = 1 << 5;
        const BORDER = 1 << 6;
    }
}

/// Record-once description fields shared by every texture dimensionality.
struct Description {
    recorded: Recorded,
    format: TextureFormat,
    kind: TextureType,
    filter: FilterOptions,
    levels: usize,
    border: Option<Vec4>,
    swapchain: bool,
}

impl Description {
    fn new() -> Description {
        Description {
            recorded: Recorded::empty(),
            format: TextureFormat::Rgba8,
            kind: TextureType::Static,
            filter: FilterOptions::default(),
            levels: 0,
            border: None,
            swapchain: false,
        }
    }

    fn record_format(&mut self, format: TextureFormat) {
        assert!(!self.recorded.contains(Recorded::FORMAT), "format already recorded");
        self.format = format;
        self.recorded |= Recorded::FORMAT;
    }

    fn record_type(&mut self, kind: TextureType) {
        assert!(!self.recorded.contains(Recorded::TYPE), "type already recorded");
        self.kind = kind;
        self.recorded |= Recorded::TYPE;
    }

    fn record_filter(&mut self, filter: FilterOptions) {
        assert!(!self.recorded.contains(Recorded::FILTER), "filter already recorded");
        self.filter = filter;
        self.recorded |= Recorded::FILTER;
    }

    fn record_levels(&mut self, levels: usize) {
        assert!(!self.recorded.contains(Recorded::LEVELS), "levels already recorded");
        assert!(
            !self.recorded.contains(Recorded::DIMENSIONS),
            "levels must be recorded before dimensions"
        );
        assert!(levels != 0, "mipmap chains cannot be empty");
        self.levels = levels;
        self.recorded |= Recorded::LEVELS;
    }

    fn record_border(&mut self, border: Vec4) {
        assert!(!self.recorded.contains(Recorded::BORDER), "border already recorded");
        self.border = Some(border);
        self.recorded |= Recorded::BORDER;
    }

    fn before_dimensions(&mut self) {
        assert!(
            !self.recorded.contains(Recorded::DIMENSIONS),
            "dimensions already recorded"
        );
        assert!(self.recorded.contains(Recorded::FORMAT), "format not recorded");
        assert!(self.recorded.contains(Recorded::TYPE), "type not recorded");
    }

    /// Level count: explicitly recorded, otherwise the full chain down from
    /// the largest dimension (`log2(max) + 1`).
    fn resolve_levels(&mut self, max_dimension: u32) {
        if !self.recorded.contains(Recorded::LEVELS) {
            self.levels = (32 - max_dimension.max(1).leading_zeros()) as usize;
            self.recorded |= Recorded::LEVELS;
        }
        self.recorded |= Recorded::DIMENSIONS;
    }

    fn validate(&self) {
        assert!(self.recorded.contains(Recorded::FORMAT), "format not recorded");
        assert!(self.recorded.contains(Recorded::TYPE), "type not recorded");
        assert!(self.recorded.contains(Recorded::FILTER), "filter not recorded");
        assert!(self.recorded.contains(Recorded::WRAP), "wrap not recorded");
        assert!(self.recorded.contains(Recorded::DIMENSIONS), "dimensions not recorded");
    }
}

/// Byte size of one level, `faces` images of `width x height x depth` pixels.
fn level_size(format: TextureFormat, width: u32, height: u32, depth: u32, faces: usize) -> usize {
    let image = if format.is_compressed() {
        let blocks_w = (width as usize + 3) / 4;
        let blocks_h = (height as usize + 3) / 4;
        blocks_w * blocks_h * depth as usize * format.block_size()
    } else {
        width as usize * height as usize * depth as usize * format.bits_per_pixel() / 8
    };
    image * faces
}

macro_rules! shared_texture_api {
    () => {
        pub fn record_format(&mut self, format: TextureFormat) {
            self.desc.record_format(format);
        }

        pub fn record_type(&mut self, kind: TextureType) {
            self.desc.record_type(kind);
        }

        pub fn record_filter(&mut self, filter: FilterOptions) {
            self.desc.record_filter(filter);
        }

        pub fn record_levels(&mut self, levels: usize) {
            self.desc.record_levels(levels);
        }

        pub fn record_border(&mut self, border: Vec4) {
            self.desc.record_border(border);
        }

        pub fn validate(&self) {
            self.desc.validate();
        }

        pub fn format(&self) -> TextureFormat {
            self.desc.format
        }

        pub fn kind(&self) -> TextureType {
            self.desc.kind
        }

        pub fn filter(&self) -> FilterOptions {
            self.desc.filter
        }

        pub fn levels(&self) -> usize {
            self.desc.levels
        }

        pub fn border(&self) -> Option<Vec4> {
            self.desc.border
        }

        pub fn is_compressed_format(&self) -> bool {
            self.desc.format.is_compressed()
        }

        pub fn is_color_format(&self) -> bool {
            self.desc.format.is_color()
        }

        pub fn is_depth_format(&self) -> bool {
            self.desc.format.is_depth()
        }

        pub fn is_stencil_format(&self) -> bool {
            self.desc.format.is_stencil()
        }

        pub fn is_depth_stencil_format(&self) -> bool {
            self.desc.format.is_depth_stencil()
        }

        pub fn is_swapchain(&self) -> bool {
            self.desc.swapchain
        }

        pub(crate) fn mark_swapchain(&mut self) {
            self.desc.swapchain = true;
        }

        pub fn is_level_in_range(&self, level: usize) -> bool {
            level < self.desc.levels
        }

        pub fn data(&self) -> &[u8] {
            &self.data
        }

        pub(crate) fn tracker(&self) -> &ResourceTracker {
            &self.resource
        }
    };
}

pub struct Texture1D {
    resource: ResourceTracker,
    desc: Description,
    wrap: WrapType,
    dimensions: u32,
    level_infos: Vec<LevelInfo<u32>>,
    data: Vec<u8>,
    edits: Vec<TextureEdit1D>,
}

impl Texture1D {
    pub(crate) fn new() -> Texture1D {
        Texture1D {
            resource: ResourceTracker::new(ResourceKind::Texture1D),
            desc: Description::new(),
            wrap: WrapType::ClampToEdge,
            dimensions: 0,
            level_infos: Vec::new(),
            data: Vec::new(),
            edits: Vec::new(),
        }
    }

    shared_texture_api!();

    pub fn record_wrap(&mut self, wrap: WrapType) {
        assert!(!self.desc.recorded.contains(Recorded::WRAP), "wrap already recorded");
        self.wrap = wrap;
        self.desc.recorded |= Recorded::WRAP;
    }

    pub fn record_dimensions(&mut self, dimensions: u32) {
        self.desc.before_dimensions();
        assert!(dimensions != 0, "empty texture");
        self.dimensions = dimensions;
        self.desc.resolve_levels(dimensions);

        let mut width = dimensions;
        let mut offset = 0;
        for _ in 0..self.desc.levels {
            let size = level_size(self.desc.format, width, 1, 1, 1);
            self.level_infos.push(LevelInfo {
                offset,
                size,
                dimensions: width,
            });
            offset += size;
            width = (width / 2).max(1);
        }

        if self.desc.kind != TextureType::Attachment {
            self.data.resize(offset, 0);
            self.resource.set_usage(offset);
        }
    }

    pub fn write(&mut self, data: &[u8], level: usize) {
        assert!(level < self.levels(), "mipmap level out of bounds");
        self.validate();
        let info = self.level_infos[level];
        assert_eq!(data.len(), info.size, "level data size mismatch");
        self.data[info.offset..info.offset + info.size].copy_from_slice(data);
    }

    /// Overwrites part of one level and records an edit for `update_texture`.
    pub fn update(&mut self, data: &[u8], level: usize, offset: usize) {
        assert!(level < self.levels(), "mipmap level out of bounds");
        let info = self.level_infos[level];
        assert!(offset + data.len() <= info.size, "texture edit out of bounds");
        let base = info.offset + offset;
        self.data[base..base + data.len()].copy_from_slice(data);
        self.edits.push(TextureEdit1D {
            level,
            offset,
            size: data.len(),
        });
    }

    pub(crate) fn take_edits(&mut self) -> Vec<TextureEdit1D> {
        std::mem::take(&mut self.edits)
    }

    pub fn wrap(&self) -> WrapType {
        self.wrap
    }

    pub fn dimensions(&self) -> u32 {
        self.dimensions
    }

    pub fn info_for_level(&self, level: usize) -> LevelInfo<u32> {
        self.level_infos[level]
    }
}

pub struct Texture2D {
    resource: ResourceTracker,
    desc: Description,
    wrap: (WrapType, WrapType),
    dimensions: UVec2,
    level_infos: Vec<LevelInfo<UVec2>>,
    data: Vec<u8>,
    edits: Vec<TextureEdit2D>,
}

impl Texture2D {
    pub(crate) fn new() -> Texture2D {
        Texture2D {
            resource: ResourceTracker::new(ResourceKind::Texture2D),
            desc: Description::new(),
            wrap: (WrapType::ClampToEdge, WrapType::ClampToEdge),
            dimensions: UVec2::ZERO,
            level_infos: Vec::new(),
            data: Vec::new(),
            edits: Vec::new(),
        }
    }

    shared_texture_api!();

    pub fn record_wrap(&mut self, wrap: (WrapType, WrapType)) {
        assert!(!self.desc.recorded.contains(Recorded::WRAP), "wrap already recorded");
        self.wrap = wrap;
        self.desc.recorded |= Recorded::WRAP;
    }

    pub fn record_dimensions(&mut self, dimensions: UVec2) {
        self.desc.before_dimensions();
        assert!(dimensions.x != 0 && dimensions.y != 0, "empty texture");
        self.dimensions = dimensions;
        self.desc.resolve_levels(dimensions.max_element());

        let mut level = dimensions;
        let mut offset = 0;
        for _ in 0..self.desc.levels {
            let size = level_size(self.desc.format, level.x, level.y, 1, 1);
            self.level_infos.push(LevelInfo {
                offset,
                size,
                dimensions: level,
            });
            offset += size;
            level = (level / 2).max(UVec2::ONE);
        }

        if self.desc.kind != TextureType::Attachment {
            self.data.resize(offset, 0);
            self.resource.set_usage(offset);
        }
    }

    pub fn write(&mut self, data: &[u8], level: usize) {
        assert!(level < self.levels(), "mipmap level out of bounds");
        self.validate();
        let info = self.level_infos[level];
        assert_eq!(data.len(), info.size, "level data size mismatch");
        self.data[info.offset..info.offset + info.size].copy_from_slice(data);
    }

    /// Overwrites a sub-rectangle of one level, row by row, and records an
    /// edit for `update_texture`.
    pub fn update(&mut self, data: &[u8], level: usize, offset: UVec2, size: UVec2) {
        assert!(level < self.levels(), "mipmap level out of bounds");
        assert!(!self.desc.format.is_compressed(), "cannot edit compressed textures");
        let info = self.level_infos[level];
        assert!(
            offset.x + size.x <= info.dimensions.x && offset.y + size.y <= info.dimensions.y,
            "texture edit out of bounds"
        );
        let pixel = self.desc.format.bits_per_pixel() / 8;
        let row_bytes = size.x as usize * pixel;
        assert_eq!(data.len(), row_bytes * size.y as usize, "edit data size mismatch");

        let pitch = info.dimensions.x as usize * pixel;
        for row in 0..size.y as usize {
            let dst = info.offset
                + (offset.y as usize + row) * pitch
                + offset.x as usize * pixel;
            self.data[dst..dst + row_bytes]
                .copy_from_slice(&data[row * row_bytes..(row + 1) * row_bytes]);
        }
        self.edits.push(TextureEdit2D {
            level,
            offset,
            size,
        });
    }

    pub(crate) fn take_edits(&mut self) -> Vec<TextureEdit2D> {
        std::mem::take(&mut self.edits)
    }

    /// Swapchain resize path: the backing pixels belong to the windowing
    /// system, so only the recorded dimensions change.
    pub(crate) fn override_dimensions(&mut self, dimensions: UVec2) {
        self.dimensions = dimensions;
        let mut level = dimensions;
        for info in &mut self.level_infos {
            info.dimensions = level;
            level = (level / 2).max(UVec2::ONE);
        }
    }

    pub fn wrap(&self) -> (WrapType, WrapType) {
        self.wrap
    }

    pub fn dimensions(&self) -> UVec2 {
        self.dimensions
    }

    pub fn info_for_level(&self, level: usize) -> LevelInfo<UVec2> {
        self.level_infos[level]
    }
}

pub struct Texture3D {
    resource: ResourceTracker,
    desc: Description,
    wrap: (WrapType, WrapType, WrapType),
    dimensions: UVec3,
    level_infos: Vec<LevelInfo<UVec3>>,
    data: Vec<u8>,
    edits: Vec<TextureEdit3D>,
}

impl Texture3D {
    pub(crate) fn new() -> Texture3D {
        Texture3D {
            resource: ResourceTracker::new(ResourceKind::Texture3D),
            desc: Description::new(),
            wrap: (
                WrapType::ClampToEdge,
                WrapType::ClampToEdge,
                WrapType::ClampToEdge,
            ),
            dimensions: UVec3::ZERO,
            level_infos: Vec::new(),
            data: Vec::new(),
            edits: Vec::new(),
        }
    }

    shared_texture_api!();

    pub fn record_wrap(&mut self, wrap: (WrapType, WrapType, WrapType)) {
        assert!(!self.desc.recorded.contains(Recorded::WRAP), "wrap already recorded");
        self.wrap = wrap;
        self.desc.recorded |= Recorded::WRAP;
    }

    pub fn record_dimensions(&mut self, dimensions: UVec3) {
        self.desc.before_dimensions();
        assert!(
            dimensions.x != 0 && dimensions.y != 0 && dimensions.z != 0,
            "empty texture"
        );
        self.dimensions = dimensions;
        self.desc.resolve_levels(dimensions.max_element());

        let mut level = dimensions;
        let mut offset = 0;
        for _ in 0..self.desc.levels {
            let size = level_size(self.desc.format, level.x, level.y, level.z, 1);
            self.level_infos.push(LevelInfo {
                offset,
                size,
                dimensions: level,
            });
            offset += size;
            level = (level / 2).max(UVec3::ONE);
        }

        if self.desc.kind != TextureType::Attachment {
            self.data.resize(offset, 0);
            self.resource.set_usage(offset);
        }
    }

    pub fn write(&mut self, data: &[u8], level: usize) {
        assert!(level < self.levels(), "mipmap level out of bounds");
        self.validate();
        let info = self.level_infos[level];
        assert_eq!(data.len(), info.size, "level data size mismatch");
        self.data[info.offset..info.offset + info.size].copy_from_slice(data);
    }

    /// Overwrites a sub-box of one level, row by row per slice, and records
    /// an edit for `update_texture`.
    pub fn update(&mut self, data: &[u8], level: usize, offset: UVec3, size: UVec3) {
        assert!(level < self.levels(), "mipmap level out of bounds");
        assert!(!self.desc.format.is_compressed(), "cannot edit compressed textures");
        let info = self.level_infos[level];
        assert!(
            offset.x + size.x <= info.dimensions.x
                && offset.y + size.y <= info.dimensions.y
                && offset.z + size.z <= info.dimensions.z,
            "texture edit out of bounds"
        );
        let pixel = self.desc.format.bits_per_pixel() / 8;
        let row_bytes = size.x as usize * pixel;
        assert_eq!(
            data.len(),
            row_bytes * size.y as usize * size.z as usize,
            "edit data size mismatch"
        );

        let pitch = info.dimensions.x as usize * pixel;
        let slice_pitch = pitch * info.dimensions.y as usize;
        for slice in 0..size.z as usize {
            for row in 0..size.y as usize {
                let dst = info.offset
                    + (offset.z as usize + slice) * slice_pitch
                    + (offset.y as usize + row) * pitch
                    + offset.x as usize * pixel;
                let src = (slice * size.y as usize + row) * row_bytes;
                self.data[dst..dst + row_bytes].copy_from_slice(&data[src..src + row_bytes]);
            }
        }
        self.edits.push(TextureEdit3D {
            level,
            offset,
            size,
        });
    }

    pub(crate) fn take_edits(&mut self) -> Vec<TextureEdit3D> {
        std::mem::take(&mut self.edits)
    }

    pub fn wrap(&self) -> (WrapType, WrapType, WrapType) {
        self.wrap
    }

    pub fn dimensions(&self) -> UVec3 {
        self.dimensions
    }

    pub fn info_for_level(&self, level: usize) -> LevelInfo<UVec3> {
        self.level_infos[level]
    }
}

pub struct TextureCM {
    resource: ResourceTracker,
    desc: Description,
    wrap: (WrapType, WrapType, WrapType),
    dimensions: UVec2,
    level_infos: Vec<LevelInfo<UVec2>>,
    data: Vec<u8>,
}

impl TextureCM {
    pub(crate) fn new() -> TextureCM {
        TextureCM {
            resource: ResourceTracker::new(ResourceKind::TextureCM),
            desc: Description::new(),
            wrap: (
                WrapType::ClampToEdge,
                WrapType::ClampToEdge,
                WrapType::ClampToEdge,
            ),
            dimensions: UVec2::ZERO,
            level_infos: Vec::new(),
            data: Vec::new(),
        }
    }

    shared_texture_api!();

    pub fn record_wrap(&mut self, wrap: (WrapType, WrapType, WrapType)) {
        assert!(!self.desc.recorded.contains(Recorded::WRAP), "wrap already recorded");
        self.wrap = wrap;
        self.desc.recorded |= Recorded::WRAP;
    }

    pub fn record_dimensions(&mut self, dimensions: UVec2) {
        self.desc.before_dimensions();
        assert!(dimensions.x != 0 && dimensions.y != 0, "empty texture");
        self.dimensions = dimensions;
        self.desc.resolve_levels(dimensions.max_element());

        let mut level = dimensions;
        let mut offset = 0;
        for _ in 0..self.desc.levels {
            let size = level_size(self.desc.format, level.x, level.y, 1, 6);
            self.level_infos.push(LevelInfo {
                offset,
                size,
                dimensions: level,
            });
            offset += size;
            level = (level / 2).max(UVec2::ONE);
        }

        if self.desc.kind != TextureType::Attachment {
            self.data.resize(offset, 0);
            self.resource.set_usage(offset);
        }
    }

    /// Writes one face of one level. The face slice is `level.size / 6`
    /// bytes.
    pub fn write(&mut self, data: &[u8], face: Face, level: usize) {
        assert!(level < self.levels(), "mipmap level out of bounds");
        self.validate();
        let info = self.level_infos[level];
        let face_size = info.size / 6;
        assert_eq!(data.len(), face_size, "face data size mismatch");
        let base = info.offset + face_size * face.index();
        self.data[base..base + face_size].copy_from_slice(data);
    }

    pub fn wrap(&self) -> (WrapType, WrapType, WrapType) {
        self.wrap
    }

    pub fn dimensions(&self) -> UVec2 {
        self.dimensions
    }

    pub fn info_for_level(&self, level: usize) -> LevelInfo<UVec2> {
        self.level_infos[level]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture2d(format: TextureFormat, kind: TextureType, dimensions: UVec2) -> Texture2D {
        let mut texture = Texture2D::new();
        texture.record_format(format);
        texture.record_type(kind);
        texture.record_filter(FilterOptions::default());
        texture.record_wrap((WrapType::ClampToEdge, WrapType::ClampToEdge));
        texture.record_dimensions(dimensions);
        texture
    }

    #[test]
    fn derived_level_counts() {
        let texture = texture2d(TextureFormat::Rgba8, TextureType::Static, UVec2::new(1, 1));
        assert_eq!(texture.levels(), 1);

        let texture = texture2d(
            TextureFormat::Rgba8,
            TextureType::Static,
            UVec2::new(1024, 1024),
        );
        assert_eq!(texture.levels(), 11);

        // Levels follow the largest dimension.
        let texture = texture2d(
            TextureFormat::Rgba8,
            TextureType::Static,
            UVec2::new(256, 16),
        );
        assert_eq!(texture.levels(), 9);
        assert_eq!(texture.info_for_level(8).dimensions, UVec2::new(1, 1));
    }

    #[test]
    fn level_infos_are_contiguous() {
        let texture = texture2d(TextureFormat::Rgba8, TextureType::Static, UVec2::new(8, 8));
        assert_eq!(texture.levels(), 4);
        let mut offset = 0;
        for level in 0..4 {
            let info = texture.info_for_level(level);
            assert_eq!(info.offset, offset);
            offset += info.size;
        }
        assert_eq!(texture.data().len(), offset);
        assert_eq!(texture.info_for_level(0).size, 8 * 8 * 4);
    }

    #[test]
    fn attachments_allocate_no_client_bytes() {
        let texture = texture2d(
            TextureFormat::Rgba8,
            TextureType::Attachment,
            UVec2::new(128, 128),
        );
        assert!(texture.data().is_empty());
        assert_eq!(texture.tracker().usage(), 0);
    }

    #[test]
    fn cubemap_face_slices() {
        let mut texture = TextureCM::new();
        texture.record_format(TextureFormat::Rgba8);
        texture.record_type(TextureType::Static);
        texture.record_filter(FilterOptions::default());
        texture.record_wrap((
            WrapType::ClampToEdge,
            WrapType::ClampToEdge,
            WrapType::ClampToEdge,
        ));
        texture.record_levels(1);
        texture.record_dimensions(UVec2::new(4, 4));

        let info = texture.info_for_level(0);
        assert_eq!(info.size, 4 * 4 * 4 * 6);

        let face = vec![0xabu8; info.size / 6];
        texture.write(&face, Face::Back, 0);
        let base = info.size / 6 * Face::Back.index();
        assert_eq!(texture.data()[base], 0xab);
        assert_eq!(texture.data()[base - 1], 0);
    }

    #[test]
    fn partial_update_records_edit() {
        let mut texture = texture2d(TextureFormat::R8, TextureType::Dynamic, UVec2::new(4, 4));
        texture.update(&[1, 2, 3, 4], 0, UVec2::new(1, 1), UVec2::new(2, 2));
        // Rows land at y=1 and y=2, x=1..3 of a 4-byte pitch.
        assert_eq!(&texture.data()[4..8], &[0, 1, 2, 0]);
        assert_eq!(&texture.data()[8..12], &[0, 3, 4, 0]);
        let edits = texture.take_edits();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].offset, UVec2::new(1, 1));
    }

    #[test]
    #[should_panic(expected = "levels must be recorded before dimensions")]
    fn levels_after_dimensions_is_fatal() {
        let mut texture = texture2d(TextureFormat::Rgba8, TextureType::Static, UVec2::new(4, 4));
        texture.record_levels(1);
    }
}
