//! Targets: named scalar inputs of sources and effects.

use crate::render::RenderCtx;

/// Declared target: an ordered list of indices into the owning
/// synthesizer's declared link list.
#[derive(Debug, Clone, Default)]
pub struct TargetDef {
    pub links: Vec<usize>,
}

impl TargetDef {
    /// Target driven by a single link.
    pub fn with_link(link: usize) -> Self {
        Self { links: vec![link] }
    }
}

/// Compiled target holding indices into the compiled link table.
pub(crate) struct Target {
    links: Vec<usize>,
}

impl Target {
    pub fn compile(def: &TargetDef, first_link: usize) -> Target {
        Target {
            links: def.links.iter().map(|&index| first_link + index).collect(),
        }
    }

    /// Value at `sample`: the product of all active links clamped to
    /// [0, 1], or the consumer's default when no link is active.
    pub fn value(&self, ctx: &RenderCtx, sample: usize, default: f32) -> f32 {
        if self.links.is_empty() {
            return default;
        }

        let mut value = default;
        let mut first = true;
        for &index in &self.links {
            let Some(link) = ctx.links.get(index) else {
                continue;
            };
            if !link.has_controller() {
                continue;
            }
            let link_value = link.value(ctx.view, sample, 1.0);
            if first {
                value = link_value;
                first = false;
            } else {
                value *= link_value;
            }
        }

        value.clamp(0.0, 1.0)
    }
}
