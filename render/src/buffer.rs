//! Vertex/element buffer resource.
//!
//! The owner records an immutable description (stride, element type, usage,
//! attribute layout), fills the two append-only byte vectors and initializes
//! the buffer. Later mutations overwrite ranges in place and push edit
//! records; `update_buffer` drains those records into the command stream so
//! the backend can upload only what changed.

use crate::pool::Handle;
use crate::resource::{ResourceKind, ResourceTracker};
use bitflags::bitflags;
use smallvec::SmallVec;

pub type BufferHandle = Handle<Buffer>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferType {
    Static,
    Dynamic,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ElementType {
    None,
    U8,
    U16,
    U32,
}

impl ElementType {
    pub fn size(self) -> usize {
        match self {
            ElementType::None => 0,
            ElementType::U8 => 1,
            ElementType::U16 => 2,
            ElementType::U32 => 4,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttributeType {
    F32,
    U8,
}

/// One vertex attribute inside the interleaved vertex stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub kind: AttributeType,
    pub count: usize,
    pub offset: usize,
}

/// Which of the two data streams an edit touched.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EditSource {
    Vertices,
    Elements,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BufferEdit {
    pub source: EditSource,
    pub offset: usize,
    pub size: usize,
}

bitflags! {
    struct Recorded: u32 {
        const TYPE = 1 << 0;
        const STRIDE = 1 << 1;
        const ELEMENT_TYPE = 1 << 2;
        const INSTANCED = 1 << 3;
    }
}

pub struct Buffer {
    resource: ResourceTracker,
    recorded: Recorded,
    kind: BufferType,
    element_type: ElementType,
    stride: usize,
    instanced: bool,
    attributes: SmallVec<[Attribute; 8]>,
    vertices: Vec<u8>,
    elements: Vec<u8>,
    edits: Vec<BufferEdit>,
}

impl Buffer {
    pub(crate) fn new() -> Buffer {
        Buffer {
            resource: ResourceTracker::new(ResourceKind::Buffer),
            recorded: Recorded::empty(),
            kind: BufferType::Static,
            element_type: ElementType::None,
            stride: 0,
            instanced: false,
            attributes: SmallVec::new(),
            vertices: Vec::new(),
            elements: Vec::new(),
            edits: Vec::new(),
        }
    }

    pub fn record_type(&mut self, kind: BufferType) {
        assert!(!self.recorded.contains(Recorded::TYPE), "type already recorded");
        self.kind = kind;
        self.recorded |= Recorded::TYPE;
    }

    pub fn record_element_type(&mut self, element_type: ElementType) {
        assert!(
            !self.recorded.contains(Recorded::ELEMENT_TYPE),
            "element type already recorded"
        );
        self.element_type = element_type;
        self.recorded |= Recorded::ELEMENT_TYPE;
    }

    pub fn record_vertex_stride(&mut self, stride: usize) {
        assert!(!self.recorded.contains(Recorded::STRIDE), "stride already recorded");
        self.stride = stride;
        self.recorded |= Recorded::STRIDE;
    }

    pub fn record_instanced(&mut self, instanced: bool) {
        assert!(
            !self.recorded.contains(Recorded::INSTANCED),
            "instancing already recorded"
        );
        self.instanced = instanced;
        self.recorded |= Recorded::INSTANCED;
    }

    pub fn record_vertex_attribute(&mut self, kind: AttributeType, count: usize, offset: usize) {
        self.attributes.push(Attribute {
            kind,
            count,
            offset,
        });
    }

    pub fn validate(&self) {
        assert!(self.recorded.contains(Recorded::TYPE), "type not recorded");
        assert!(self.recorded.contains(Recorded::STRIDE), "stride not recorded");
        assert!(
            self.recorded.contains(Recorded::ELEMENT_TYPE),
            "element type not recorded"
        );
    }

    /// Appends raw bytes to the vertex stream.
    pub fn write_vertices(&mut self, data: &[u8]) {
        self.vertices.extend_from_slice(data);
        self.update_usage();
    }

    /// Appends raw bytes to the element stream.
    pub fn write_elements(&mut self, data: &[u8]) {
        self.elements.extend_from_slice(data);
        self.update_usage();
    }

    /// Overwrites `[offset, offset + data.len())` of the vertex stream and
    /// records an edit. The range must lie within the current data.
    pub fn update_vertices(&mut self, offset: usize, data: &[u8]) {
        assert!(offset + data.len() <= self.vertices.len(), "vertex edit out of bounds");
        self.vertices[offset..offset + data.len()].copy_from_slice(data);
        self.record_edit(EditSource::Vertices, offset, data.len());
    }

    /// Overwrites `[offset, offset + data.len())` of the element stream and
    /// records an edit. The range must lie within the current data.
    pub fn update_elements(&mut self, offset: usize, data: &[u8]) {
        assert!(offset + data.len() <= self.elements.len(), "element edit out of bounds");
        self.elements[offset..offset + data.len()].copy_from_slice(data);
        self.record_edit(EditSource::Elements, offset, data.len());
    }

    /// Grows the vertex stream to `size` bytes, zero filled, recording an
    /// edit over the grown region.
    pub fn resize_vertices(&mut self, size: usize) {
        let old = self.vertices.len();
        assert!(size >= old, "buffers only grow");
        self.vertices.resize(size, 0);
        self.record_edit(EditSource::Vertices, old, size - old);
        self.update_usage();
    }

    fn record_edit(&mut self, source: EditSource, offset: usize, size: usize) {
        if size == 0 {
            return;
        }
        self.edits.push(BufferEdit {
            source,
            offset,
            size,
        });
    }

    pub(crate) fn take_edits(&mut self) -> Vec<BufferEdit> {
        std::mem::take(&mut self.edits)
    }

    fn update_usage(&self) {
        self.resource
            .set_usage(self.vertices.len() + self.elements.len());
    }

    pub fn kind(&self) -> BufferType {
        self.kind
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn is_instanced(&self) -> bool {
        self.instanced
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn vertices(&self) -> &[u8] {
        &self.vertices
    }

    pub fn elements(&self) -> &[u8] {
        &self.elements
    }

    pub(crate) fn tracker(&self) -> &ResourceTracker {
        &self.resource
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorded_buffer() -> Buffer {
        let mut buffer = Buffer::new();
        buffer.record_type(BufferType::Dynamic);
        buffer.record_vertex_stride(12);
        buffer.record_element_type(ElementType::U32);
        buffer.record_vertex_attribute(AttributeType::F32, 3, 0);
        buffer
    }

    #[test]
    fn edits_accumulate_in_order() {
        let mut buffer = recorded_buffer();
        buffer.write_vertices(&[0u8; 64]);
        buffer.update_vertices(0, &[1u8; 16]);
        buffer.update_vertices(32, &[2u8; 8]);

        let edits = buffer.take_edits();
        assert_eq!(edits.len(), 2);
        assert_eq!(edits[0], BufferEdit { source: EditSource::Vertices, offset: 0, size: 16 });
        assert_eq!(edits[1], BufferEdit { source: EditSource::Vertices, offset: 32, size: 8 });
        assert!(buffer.take_edits().is_empty());
    }

    #[test]
    #[should_panic(expected = "vertex edit out of bounds")]
    fn out_of_bounds_edit_is_fatal() {
        let mut buffer = recorded_buffer();
        buffer.write_vertices(&[0u8; 16]);
        buffer.update_vertices(8, &[0u8; 16]);
    }

    #[test]
    #[should_panic(expected = "type already recorded")]
    fn double_record_is_fatal() {
        let mut buffer = recorded_buffer();
        buffer.record_type(BufferType::Static);
    }

    #[test]
    fn usage_tracks_both_streams() {
        let mut buffer = recorded_buffer();
        buffer.write_vertices(&[0u8; 48]);
        buffer.write_elements(&[0u8; 24]);
        assert_eq!(buffer.tracker().usage(), 72);
    }
}
