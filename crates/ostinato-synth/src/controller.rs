//! Per-instance controllers: time-varying scalars driving link values.

use crate::curve::{Curve, CurveBezier};

/// Declared shape of one controller: output range, clamp-or-wrap flag and
/// the value curve over playback time.
#[derive(Debug, Clone)]
pub struct ControllerDef {
    pub minimum: f32,
    pub maximum: f32,
    /// Clamp evaluation time to the curve range; wrapping instead makes
    /// the curve cycle.
    pub clamp: bool,
    pub curve: CurveBezier,
}

impl Default for ControllerDef {
    fn default() -> Self {
        Self {
            minimum: 0.0,
            maximum: 1.0,
            clamp: true,
            curve: CurveBezier::default(),
        }
    }
}

/// A compiled controller holding the dense value vector for the current
/// produce call. Values are normalized by the declared range so links see
/// 0..1.
pub(crate) struct Controller {
    clamp: bool,
    curve: Curve,
    dirty: bool,
    values: Vec<f32>,
    filled: usize,
}

impl Controller {
    pub fn new(def: &ControllerDef) -> Controller {
        let mut controller = Controller {
            clamp: true,
            curve: Curve::default(),
            dirty: false,
            values: Vec::new(),
            filled: 0,
        };
        controller.update_from(def);
        controller
    }

    /// Re-read range, clamp flag and curve from the declaration.
    pub fn update_from(&mut self, def: &ControllerDef) {
        self.clamp = def.clamp;
        self.curve = Curve::normalized(&def.curve, def.minimum, def.maximum);
        self.dirty = false;
    }

    pub fn dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Evaluate the curve over the call's time window into the dense
    /// value vector. The vector only grows, so steady-state calls do not
    /// allocate.
    ///
    /// Each value is evaluated at `step * (offset + i)` so that slicing a
    /// run into sub-calls samples bit-identical positions.
    pub fn update_values(&mut self, samples: usize, offset: u64, step: f32) {
        if samples == 0 {
            return;
        }
        if samples > self.values.len() {
            self.values.resize(samples, 0.0);
        }
        self.filled = samples;

        for i in 0..samples {
            let position = self.eval_position(step * (offset + i as u64) as f32);
            self.values[i] = self.curve.evaluate(position);
        }
    }

    /// Value at a sample of the current call's window.
    #[inline]
    pub fn value(&self, sample: usize) -> f32 {
        if self.filled == 0 {
            return 0.0;
        }
        self.values[sample.min(self.filled - 1)]
    }

    fn eval_position(&self, position: f32) -> f32 {
        if self.clamp {
            return position;
        }
        match self.curve.x_range() {
            Some((first, last)) => first + (position - first).rem_euclid(last - first),
            None => position,
        }
    }
}
