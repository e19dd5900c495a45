//! Context handed down the generate call tree.

use crate::controller::Controller;
use crate::link::Link;
use ostinato_core::SharedBufferPool;

/// Snapshot of the instance fields every generator reads.
pub(crate) struct InstanceView<'a> {
    pub channel_count: usize,
    pub sample_rate: u32,
    pub inv_sample_rate: f32,
    pub controllers: &'a [Controller],
}

/// Everything a source or effect needs while generating.
pub(crate) struct RenderCtx<'a> {
    pub view: &'a InstanceView<'a>,
    pub links: &'a [Link],
    pub pool: &'a SharedBufferPool,
}

/// The curve evaluation window `(offset, factor)`.
///
/// A time-warping effect consumes from its upstream stage at a different
/// rate than it produces; the window maps an output sample index of the
/// current stage to the evaluation position inside the controller value
/// vectors prepared for the whole produce call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CurveWindow {
    pub offset: f32,
    pub factor: f32,
}

impl CurveWindow {
    /// The whole requested range, used for top-level sources.
    pub const FULL: CurveWindow = CurveWindow {
        offset: 0.0,
        factor: 1.0,
    };

    /// Nearest curve evaluation position for an output sample.
    #[inline]
    pub fn eval_pos(&self, sample: usize) -> usize {
        (self.offset + self.factor * sample as f32) as usize
    }
}

/// Linear blend between `a` and `b`.
#[inline]
pub(crate) fn mix(a: f32, b: f32, blend: f32) -> f32 {
    a + (b - a) * blend
}

/// Left/right gains for a panning scalar in [-1, 1].
#[inline]
pub(crate) fn pan_gains(panning: f32) -> (f32, f32) {
    ((1.0 - panning).min(1.0), (1.0 + panning).min(1.0))
}
