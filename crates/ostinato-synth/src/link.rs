//! Links: bindings from one controller, through one curve, to a target.

use crate::curve::{Curve, CurveBezier};
use crate::render::InstanceView;

/// Declared link. A controller index of -1 leaves the link inert so the
/// target falls back to the consumer's default.
#[derive(Debug, Clone)]
pub struct LinkDef {
    pub controller: i32,
    /// Repeats the controller value over the curve, `>= 1`.
    pub repeat: u32,
    pub curve: CurveBezier,
}

impl Default for LinkDef {
    fn default() -> Self {
        Self {
            controller: -1,
            repeat: 1,
            curve: CurveBezier::ramp(),
        }
    }
}

/// Compiled link.
pub(crate) struct Link {
    controller: i32,
    repeat: u32,
    curve: Curve,
}

impl Link {
    pub fn new(def: &LinkDef) -> Link {
        Link {
            controller: def.controller,
            repeat: def.repeat.max(1),
            curve: Curve::from_bezier(&def.curve),
        }
    }

    /// Compile with controller indices remapped through a sub-synthesizer
    /// connection table; unmapped controllers turn inert.
    pub fn remapped(def: &LinkDef, mapping: &[i32]) -> Link {
        let mut link = Link::new(def);
        if link.controller >= 0 {
            link.controller = mapping
                .get(link.controller as usize)
                .copied()
                .unwrap_or(-1);
        }
        link
    }

    #[inline]
    pub fn has_controller(&self) -> bool {
        self.controller >= 0
    }

    /// Curve-mapped controller value at `sample`, or `default` when inert.
    pub fn value(&self, view: &InstanceView, sample: usize, default: f32) -> f32 {
        if self.controller < 0 {
            return default;
        }
        let Some(controller) = view.controllers.get(self.controller as usize) else {
            return default;
        };

        let mut value = controller.value(sample);
        if self.repeat > 1 {
            value *= self.repeat as f32;
            value -= value.floor();
        }
        self.curve.evaluate(value)
    }
}
