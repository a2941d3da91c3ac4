//! Contract between the frontend and a concrete graphics backend.
//!
//! The frontend queries allocation and device information once at
//! construction, then hands the backend the ordered command stream each
//! `process()`. `process` and `swap` must only be called from the thread
//! that owns the graphics context; the frontend's lock serializes the calls
//! but cannot pin the thread for you.

use crate::buffer::{Buffer, BufferHandle};
use crate::command::CommandBuffer;
use crate::pool::Pool;
use crate::program::{Program, ProgramHandle};
use crate::target::{Target, TargetHandle};
use crate::texture::{
    Texture1D, Texture1DHandle, Texture2D, Texture2DHandle, Texture3D, Texture3DHandle, TextureCM,
    TextureCMHandle,
};

/// Bytes of backend-private storage behind each resource slot, per kind.
/// Purely informational on the frontend side (memory accounting); backends
/// key their private tables off handle indices.
#[derive(Copy, Clone, Debug, Default)]
pub struct AllocationInfo {
    pub buffer_size: usize,
    pub target_size: usize,
    pub program_size: usize,
    pub texture1d_size: usize,
    pub texture2d_size: usize,
    pub texture3d_size: usize,
    pub texture_cm_size: usize,
}

#[derive(Clone, Debug, Default)]
pub struct DeviceInfo {
    pub vendor: String,
    pub renderer: String,
    pub version: String,
}

/// All resource pools, readable by the backend during replay.
pub struct Resources {
    pub(crate) buffers: Pool<Buffer>,
    pub(crate) targets: Pool<Target>,
    pub(crate) programs: Pool<Program>,
    pub(crate) textures1d: Pool<Texture1D>,
    pub(crate) textures2d: Pool<Texture2D>,
    pub(crate) textures3d: Pool<Texture3D>,
    pub(crate) textures_cm: Pool<TextureCM>,
}

impl Resources {
    pub fn buffer(&self, handle: BufferHandle) -> &Buffer {
        self.buffers.get(handle)
    }

    pub fn target(&self, handle: TargetHandle) -> &Target {
        self.targets.get(handle)
    }

    pub fn program(&self, handle: ProgramHandle) -> &Program {
        self.programs.get(handle)
    }

    pub fn texture1d(&self, handle: Texture1DHandle) -> &Texture1D {
        self.textures1d.get(handle)
    }

    pub fn texture2d(&self, handle: Texture2DHandle) -> &Texture2D {
        self.textures2d.get(handle)
    }

    pub fn texture3d(&self, handle: Texture3DHandle) -> &Texture3D {
        self.textures3d.get(handle)
    }

    pub fn texture_cm(&self, handle: TextureCMHandle) -> &TextureCM {
        self.textures_cm.get(handle)
    }
}

/// One `process()` worth of work: the ordered command records plus read
/// access to the pools they reference.
pub struct Frame<'a> {
    pub resources: &'a Resources,
    pub commands: &'a CommandBuffer,
}

pub trait Backend: Send {
    fn query_allocation_info(&self) -> AllocationInfo;

    fn query_device_info(&self) -> DeviceInfo;

    /// Acquires the native context. Returns `false` when the platform cannot
    /// provide one; the frontend refuses to come up in that case.
    fn init(&mut self) -> bool;

    /// Replays the recorded commands in order.
    fn process(&mut self, frame: Frame<'_>);

    /// Presents the swapchain.
    fn swap(&mut self);
}
