//! High-level render state captured per draw/clear/blit command.
//!
//! Every command carries a full `State`. The backend keeps a shadow copy and
//! only issues the driver calls for categories that actually changed; to make
//! that cheap, `flush` folds the whole state into a hash that is compared
//! before any per-category work happens.

use fxhash::FxHasher;
use glam::UVec2;
use std::hash::{Hash, Hasher};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
    SrcAlphaSaturate,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StencilFunction {
    Never,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    Always,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StencilOperation {
    Keep,
    Zero,
    Replace,
    Increment,
    IncrementWrap,
    Decrement,
    DecrementWrap,
    Invert,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FrontFaceType {
    ClockWise,
    CounterClockWise,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CullFaceType {
    Front,
    Back,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PolygonModeType {
    Point,
    Line,
    Fill,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScissorState {
    enabled: bool,
    offset: UVec2,
    size: UVec2,
}

impl Default for ScissorState {
    fn default() -> ScissorState {
        ScissorState {
            enabled: false,
            offset: UVec2::ZERO,
            size: UVec2::ZERO,
        }
    }
}

impl ScissorState {
    pub fn record_enable(&mut self, enable: bool) {
        self.enabled = enable;
    }

    pub fn record_offset(&mut self, offset: UVec2) {
        self.offset = offset;
    }

    pub fn record_size(&mut self, size: UVec2) {
        self.size = size;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn offset(&self) -> UVec2 {
        self.offset
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }
}

pub const BLEND_WRITE_MASK_ALL: u8 = 0b1111;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlendState {
    enabled: bool,
    color_src_factor: BlendFactor,
    color_dst_factor: BlendFactor,
    alpha_src_factor: BlendFactor,
    alpha_dst_factor: BlendFactor,
    write_mask: u8,
}

impl Default for BlendState {
    fn default() -> BlendState {
        BlendState {
            enabled: false,
            color_src_factor: BlendFactor::One,
            color_dst_factor: BlendFactor::Zero,
            alpha_src_factor: BlendFactor::One,
            alpha_dst_factor: BlendFactor::Zero,
            write_mask: BLEND_WRITE_MASK_ALL,
        }
    }
}

impl BlendState {
    pub fn record_enable(&mut self, enable: bool) {
        self.enabled = enable;
    }

    pub fn record_color_blend_factors(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.color_src_factor = src;
        self.color_dst_factor = dst;
    }

    pub fn record_alpha_blend_factors(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.alpha_src_factor = src;
        self.alpha_dst_factor = dst;
    }

    pub fn record_blend_factors(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.record_color_blend_factors(src, dst);
        self.record_alpha_blend_factors(src, dst);
    }

    pub fn record_write_mask(&mut self, write_mask: u8) {
        self.write_mask = write_mask;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn color_src_factor(&self) -> BlendFactor {
        self.color_src_factor
    }

    pub fn color_dst_factor(&self) -> BlendFactor {
        self.color_dst_factor
    }

    pub fn alpha_src_factor(&self) -> BlendFactor {
        self.alpha_src_factor
    }

    pub fn alpha_dst_factor(&self) -> BlendFactor {
        self.alpha_dst_factor
    }

    pub fn write_mask(&self) -> u8 {
        self.write_mask
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DepthState {
    test: bool,
    write: bool,
}

impl DepthState {
    pub fn record_test(&mut self, test: bool) {
        self.test = test;
    }

    pub fn record_write(&mut self, write: bool) {
        self.write = write;
    }

    pub fn test(&self) -> bool {
        self.test
    }

    pub fn write(&self) -> bool {
        self.write
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CullState {
    enabled: bool,
    front_face: FrontFaceType,
    cull_face: CullFaceType,
}

impl Default for CullState {
    fn default() -> CullState {
        CullState {
            enabled: true,
            front_face: FrontFaceType::ClockWise,
            cull_face: CullFaceType::Back,
        }
    }
}

impl CullState {
    pub fn record_enable(&mut self, enable: bool) {
        self.enabled = enable;
    }

    pub fn record_front_face(&mut self, front_face: FrontFaceType) {
        self.front_face = front_face;
    }

    pub fn record_cull_face(&mut self, cull_face: CullFaceType) {
        self.cull_face = cull_face;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn front_face(&self) -> FrontFaceType {
        self.front_face
    }

    pub fn cull_face(&self) -> CullFaceType {
        self.cull_face
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct StencilState {
    enabled: bool,
    write_mask: u32,
    function: StencilFunction,
    reference: i32,
    mask: u32,
    front_fail_action: StencilOperation,
    front_depth_fail_action: StencilOperation,
    front_depth_pass_action: StencilOperation,
    back_fail_action: StencilOperation,
    back_depth_fail_action: StencilOperation,
    back_depth_pass_action: StencilOperation,
}

impl Default for StencilState {
    fn default() -> StencilState {
        StencilState {
            enabled: false,
            write_mask: !0,
            function: StencilFunction::Always,
            reference: 0,
            mask: !0,
            front_fail_action: StencilOperation::Keep,
            front_depth_fail_action: StencilOperation::Keep,
            front_depth_pass_action: StencilOperation::Keep,
            back_fail_action: StencilOperation::Keep,
            back_depth_fail_action: StencilOperation::Keep,
            back_depth_pass_action: StencilOperation::Keep,
        }
    }
}

impl StencilState {
    pub fn record_enable(&mut self, enable: bool) {
        self.enabled = enable;
    }

    pub fn record_write_mask(&mut self, write_mask: u32) {
        self.write_mask = write_mask;
    }

    pub fn record_function(&mut self, function: StencilFunction) {
        self.function = function;
    }

    pub fn record_reference(&mut self, reference: i32) {
        self.reference = reference;
    }

    pub fn record_mask(&mut self, mask: u32) {
        self.mask = mask;
    }

    /// Sets the fail action for both faces.
    pub fn record_fail_action(&mut self, action: StencilOperation) {
        self.front_fail_action = action;
        self.back_fail_action = action;
    }

    /// Sets the depth-fail action for both faces.
    pub fn record_depth_fail_action(&mut self, action: StencilOperation) {
        self.front_depth_fail_action = action;
        self.back_depth_fail_action = action;
    }

    /// Sets the depth-pass action for both faces.
    pub fn record_depth_pass_action(&mut self, action: StencilOperation) {
        self.front_depth_pass_action = action;
        self.back_depth_pass_action = action;
    }

    pub fn record_front_fail_action(&mut self, action: StencilOperation) {
        self.front_fail_action = action;
    }

    pub fn record_front_depth_fail_action(&mut self, action: StencilOperation) {
        self.front_depth_fail_action = action;
    }

    pub fn record_front_depth_pass_action(&mut self, action: StencilOperation) {
        self.front_depth_pass_action = action;
    }

    pub fn record_back_fail_action(&mut self, action: StencilOperation) {
        self.back_fail_action = action;
    }

    pub fn record_back_depth_fail_action(&mut self, action: StencilOperation) {
        self.back_depth_fail_action = action;
    }

    pub fn record_back_depth_pass_action(&mut self, action: StencilOperation) {
        self.back_depth_pass_action = action;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn write_mask(&self) -> u32 {
        self.write_mask
    }

    pub fn function(&self) -> StencilFunction {
        self.function
    }

    pub fn reference(&self) -> i32 {
        self.reference
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn front_fail_action(&self) -> StencilOperation {
        self.front_fail_action
    }

    pub fn front_depth_fail_action(&self) -> StencilOperation {
        self.front_depth_fail_action
    }

    pub fn front_depth_pass_action(&self) -> StencilOperation {
        self.front_depth_pass_action
    }

    pub fn back_fail_action(&self) -> StencilOperation {
        self.back_fail_action
    }

    pub fn back_depth_fail_action(&self) -> StencilOperation {
        self.back_depth_fail_action
    }

    pub fn back_depth_pass_action(&self) -> StencilOperation {
        self.back_depth_pass_action
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PolygonState {
    mode: PolygonModeType,
}

impl Default for PolygonState {
    fn default() -> PolygonState {
        PolygonState {
            mode: PolygonModeType::Fill,
        }
    }
}

impl PolygonState {
    pub fn record_mode(&mut self, mode: PolygonModeType) {
        self.mode = mode;
    }

    pub fn mode(&self) -> PolygonModeType {
        self.mode
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ViewportState {
    offset: UVec2,
    dimensions: UVec2,
}

impl Default for ViewportState {
    fn default() -> ViewportState {
        ViewportState {
            offset: UVec2::ZERO,
            dimensions: UVec2::ZERO,
        }
    }
}

impl ViewportState {
    pub fn record_offset(&mut self, offset: UVec2) {
        self.offset = offset;
    }

    pub fn record_dimensions(&mut self, dimensions: UVec2) {
        self.dimensions = dimensions;
    }

    pub fn offset(&self) -> UVec2 {
        self.offset
    }

    pub fn dimensions(&self) -> UVec2 {
        self.dimensions
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct State {
    pub scissor: ScissorState,
    pub blend: BlendState,
    pub depth: DepthState,
    pub cull: CullState,
    pub stencil: StencilState,
    pub polygon: PolygonState,
    pub viewport: ViewportState,
    hash: u64,
}

impl State {
    pub fn new() -> State {
        State::default()
    }

    /// Recomputes the cached hash; the frontend calls this when the state is
    /// copied into a command.
    pub fn flush(&mut self) {
        let mut hasher = FxHasher::default();
        self.scissor.hash(&mut hasher);
        self.blend.hash(&mut hasher);
        self.depth.hash(&mut hasher);
        self.cull.hash(&mut hasher);
        self.stencil.hash(&mut hasher);
        self.polygon.hash(&mut hasher);
        self.viewport.hash(&mut hasher);
        self.hash = hasher.finish();
    }

    pub fn flushed_hash(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for State {
    fn eq(&self, other: &State) -> bool {
        self.scissor == other.scissor
            && self.blend == other.blend
            && self.depth == other.depth
            && self.cull == other.cull
            && self.stencil == other.stencil
            && self.polygon == other.polygon
            && self.viewport == other.viewport
    }
}

impl Eq for State {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_hash_tracks_contents() {
        let mut a = State::new();
        let mut b = State::new();
        a.flush();
        b.flush();
        assert_eq!(a.flushed_hash(), b.flushed_hash());

        b.depth.record_test(true);
        b.flush();
        assert_ne!(a.flushed_hash(), b.flushed_hash());
        assert_ne!(a, b);
    }
}
