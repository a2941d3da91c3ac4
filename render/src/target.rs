//! Render target: a set of attachments drawn into as one unit.
//!
//! Depth/stencil storage is either *owned* (created on demand through the
//! `request_*` context operations) or *aliased* (an externally created
//! attachment texture passed to `attach_*`). A target holds at most one of
//! depth, stencil, or combined depth-stencil. All attachments of a
//! non-swapchain target must share the same dimensions; the swapchain target
//! is the presentable one and carries exactly one frontend-owned texture.

use crate::pool::Handle;
use crate::resource::{ResourceKind, ResourceTracker};
use crate::texture::{Face, Texture2DHandle, TextureCMHandle};
use bitflags::bitflags;
use glam::UVec2;
use smallvec::SmallVec;

pub type TargetHandle = Handle<Target>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Attachment {
    Texture2D {
        texture: Texture2DHandle,
        level: usize,
    },
    TextureCM {
        texture: TextureCMHandle,
        face: Face,
        level: usize,
    },
}

bitflags! {
    struct Flags: u32 {
        const DIMENSIONS = 1 << 0;
        const HAS_DEPTH = 1 << 1;
        const HAS_STENCIL = 1 << 2;
        const OWNS_DEPTH = 1 << 3;
        const OWNS_STENCIL = 1 << 4;
        const SWAPCHAIN = 1 << 5;
    }
}

pub struct Target {
    resource: ResourceTracker,
    flags: Flags,
    dimensions: UVec2,
    depth_stencil_texture: Option<Texture2DHandle>,
    attachments: SmallVec<[Attachment; 8]>,
}

impl Target {
    pub(crate) fn new() -> Target {
        Target {
            resource: ResourceTracker::new(ResourceKind::Target),
            flags: Flags::empty(),
            dimensions: UVec2::ZERO,
            depth_stencil_texture: None,
            attachments: SmallVec::new(),
        }
    }

    fn adopt_dimensions(&mut self, dimensions: UVec2) {
        if self.flags.contains(Flags::DIMENSIONS) {
            assert!(dimensions == self.dimensions, "invalid dimensions");
        } else {
            self.dimensions = dimensions;
            self.flags |= Flags::DIMENSIONS;
        }
    }

    pub(crate) fn set_depth(&mut self, texture: Texture2DHandle, dimensions: UVec2, owned: bool) {
        assert!(!self.is_swapchain(), "cannot attach to swapchain");
        assert!(!self.flags.contains(Flags::HAS_DEPTH), "depth already attached");
        assert!(
            !self.flags.contains(Flags::HAS_STENCIL),
            "use combined depth stencil"
        );
        self.adopt_dimensions(dimensions);
        self.depth_stencil_texture = Some(texture);
        self.flags |= Flags::HAS_DEPTH;
        if owned {
            self.flags |= Flags::OWNS_DEPTH;
        }
    }

    pub(crate) fn set_stencil(&mut self, texture: Texture2DHandle, dimensions: UVec2, owned: bool) {
        assert!(!self.is_swapchain(), "cannot attach to swapchain");
        assert!(!self.flags.contains(Flags::HAS_STENCIL), "stencil already attached");
        assert!(
            !self.flags.contains(Flags::HAS_DEPTH),
            "use combined depth stencil"
        );
        self.adopt_dimensions(dimensions);
        self.depth_stencil_texture = Some(texture);
        self.flags |= Flags::HAS_STENCIL;
        if owned {
            self.flags |= Flags::OWNS_STENCIL;
        }
    }

    pub(crate) fn set_depth_stencil(
        &mut self,
        texture: Texture2DHandle,
        dimensions: UVec2,
        owned: bool,
    ) {
        assert!(!self.is_swapchain(), "cannot attach to swapchain");
        assert!(!self.flags.contains(Flags::HAS_DEPTH), "depth already attached");
        assert!(!self.flags.contains(Flags::HAS_STENCIL), "stencil already attached");
        self.adopt_dimensions(dimensions);
        self.depth_stencil_texture = Some(texture);
        self.flags |= Flags::HAS_DEPTH | Flags::HAS_STENCIL;
        if owned {
            self.flags |= Flags::OWNS_DEPTH | Flags::OWNS_STENCIL;
        }
    }

    pub(crate) fn push_texture2d(
        &mut self,
        texture: Texture2DHandle,
        level: usize,
        dimensions: UVec2,
    ) {
        assert!(!self.is_swapchain(), "cannot attach to swapchain");
        for attachment in &self.attachments {
            if let Attachment::Texture2D { texture: existing, .. } = attachment {
                assert!(*existing != texture, "texture already attached");
            }
        }
        self.adopt_dimensions(dimensions);
        self.attachments.push(Attachment::Texture2D {
            texture,
            level,
        });
    }

    pub(crate) fn push_texture_cm(
        &mut self,
        texture: TextureCMHandle,
        face: Face,
        level: usize,
        dimensions: UVec2,
    ) {
        assert!(!self.is_swapchain(), "cannot attach to swapchain");
        // The same cubemap may appear once per face.
        for attachment in &self.attachments {
            if let Attachment::TextureCM {
                texture: existing,
                face: existing_face,
                ..
            } = attachment
            {
                assert!(
                    *existing != texture || *existing_face != face,
                    "texture already attached"
                );
            }
        }
        self.adopt_dimensions(dimensions);
        self.attachments.push(Attachment::TextureCM {
            texture,
            face,
            level,
        });
    }

    pub(crate) fn mark_swapchain(&mut self) {
        self.flags |= Flags::SWAPCHAIN;
    }

    pub(crate) fn override_dimensions(&mut self, dimensions: UVec2) {
        self.dimensions = dimensions;
    }

    pub fn validate(&self) {
        assert!(self.flags.contains(Flags::DIMENSIONS), "dimensions not recorded");
        if self.is_swapchain() {
            // The sole attachment is the one the frontend created for it.
            assert!(self.attachments.len() == 1, "swapchain cannot have attachments");
        } else if self.depth_stencil_texture.is_none() {
            assert!(!self.attachments.is_empty(), "no attachments");
        }
    }

    pub fn is_swapchain(&self) -> bool {
        self.flags.contains(Flags::SWAPCHAIN)
    }

    pub fn has_depth(&self) -> bool {
        self.flags.contains(Flags::HAS_DEPTH)
    }

    pub fn has_stencil(&self) -> bool {
        self.flags.contains(Flags::HAS_STENCIL)
    }

    pub fn has_depth_stencil(&self) -> bool {
        self.has_depth() && self.has_stencil()
    }

    pub fn owns_depth(&self) -> bool {
        self.flags.contains(Flags::OWNS_DEPTH)
    }

    pub fn owns_stencil(&self) -> bool {
        self.flags.contains(Flags::OWNS_STENCIL)
    }

    /// Depth-only attachment, if any.
    pub fn depth(&self) -> Option<Texture2DHandle> {
        if self.has_depth() && !self.has_stencil() {
            self.depth_stencil_texture
        } else {
            None
        }
    }

    /// Stencil-only attachment, if any.
    pub fn stencil(&self) -> Option<Texture2DHandle> {
        if self.has_stencil() && !self.has_depth() {
            self.depth_stencil_texture
        } else {
            None
        }
    }

    /// Combined depth-stencil attachment, if any.
    pub fn depth_stencil(&self) -> Option<Texture2DHandle> {
        if self.has_depth_stencil() {
            self.depth_stencil_texture
        } else {
            None
        }
    }

    pub(crate) fn depth_stencil_texture(&self) -> Option<Texture2DHandle> {
        self.depth_stencil_texture
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn dimensions(&self) -> UVec2 {
        self.dimensions
    }

    pub(crate) fn tracker(&self) -> &ResourceTracker {
        &self.resource
    }
}
