//! Compiled effects.
//!
//! Effects form a per-source chain; the last enabled effect is the entry
//! point for generation and each stage pulls from the nearest enabled
//! predecessor, or from the bare source. `compile_effect` is the single
//! edit point when new kinds are added.

pub(crate) mod stretch;

use crate::def::EffectDef;
use crate::source::CompileCtx;
use crate::state::StateCell;
use ostinato_core::Result;
use stretch::StretchEffect;

pub(crate) enum EffectKind {
    Stretch(StretchEffect),
}

pub(crate) struct Effect {
    state_offset: usize,
    pub kind: EffectKind,
}

pub(crate) fn compile_effect(
    ctx: &CompileCtx,
    def: &EffectDef,
    first_link: usize,
) -> Result<Effect> {
    let kind = match def {
        EffectDef::Stretch(def) => EffectKind::Stretch(StretchEffect::compile(ctx, def, first_link)),
    };
    Ok(Effect {
        state_offset: 0,
        kind,
    })
}

impl Effect {
    pub fn state_offset(&self) -> usize {
        self.state_offset
    }

    /// Record the slot offset and report the slots needed.
    pub fn state_size(&mut self, offset: usize) -> usize {
        self.state_offset = offset;
        match &self.kind {
            EffectKind::Stretch(_) => 1,
        }
    }

    pub fn init_state(&self, state: &mut [StateCell]) {
        match &self.kind {
            EffectKind::Stretch(effect) => {
                state[self.state_offset] = StateCell::Stretch(Box::new(effect.new_state()));
            }
        }
    }

    pub fn cleanup_state(&self, state: &mut [StateCell]) {
        state[self.state_offset] = StateCell::Empty;
    }
}
