//! `xfade~`: mixes two signals into one. The mixing factor comes from the
//! creation argument and can be changed through the third inlet.

use crate::host::class::{class_new, Class};
use crate::host::{
    ArgType, Atom, Context, DspAdd, Error, Inlet, InletKind, Inputs, Object, Outlet, OutletKind,
    Outputs, Sample, SignalId,
};
use std::sync::Once;
use tracing::warn;

pub const CLASS_NAME: &str = "xfade~";

pub const INLET_LEFT: usize = 0;
pub const INLET_RIGHT: usize = 1;
pub const INLET_BLEND: usize = 2;
pub const OUTLET: usize = 0;

/// Clips the mixing factor to [0, 1]. NaN is passed through, so a NaN
/// blend gives a NaN block.
pub fn clamp_blend(blend: Sample) -> Sample {
    if blend < 0.0 {
        0.0
    } else if blend > 1.0 {
        1.0
    } else {
        blend
    }
}

/// `out[i] = in1[i] * (1 - p) + in2[i] * p` with `p` the clipped blend,
/// over the common length of the three slices.
pub fn mix(in1: &[Sample], in2: &[Sample], out: &mut [Sample], blend: Sample) {
    let pan = clamp_blend(blend);
    for ((out, a), b) in out.iter_mut().zip(in1.iter()).zip(in2.iter()) {
        *out = a * (1.0 - pan) + b * pan;
    }
}

pub struct XfadeTilde {
    // stored as received; clipped when a block is computed
    blend: Sample,
    // used as the left signal when nothing is connected there
    scratch: Sample,

    // held for their lifetime; dropping the unit releases them
    _in_right: Inlet,
    _in_blend: Inlet,
    _out: Outlet,
}

impl XfadeTilde {
    pub fn new(ctx: &mut Context<'_>, blend: Sample) -> XfadeTilde {
        let in_right = ctx.inlet_new(InletKind::Signal);
        let in_blend = ctx.inlet_new(InletKind::Control);
        let out = ctx.outlet_new(OutletKind::Signal);
        debug_assert_eq!(in_right.index(), INLET_RIGHT);
        debug_assert_eq!(in_blend.index(), INLET_BLEND);
        debug_assert_eq!(out.index(), OUTLET);
        XfadeTilde {
            blend,
            scratch: 0.0,
            _in_right: in_right,
            _in_blend: in_blend,
            _out: out,
        }
    }

    pub fn blend(&self) -> Sample {
        self.blend
    }

    pub fn perform_block(&self, in1: &[Sample], in2: &[Sample], out: &mut [Sample]) {
        mix(in1, in2, out, self.blend);
    }
}

impl Object for XfadeTilde {
    fn float(&mut self, inlet: usize, value: Sample) -> Result<(), Error> {
        match inlet {
            INLET_LEFT => self.scratch = value,
            INLET_BLEND => self.blend = value,
            _ => return Err(Error::ExpectedSignal { inlet }),
        }
        Ok(())
    }

    fn main_signal_scalar(&self) -> Option<Sample> {
        Some(self.scratch)
    }

    fn dsp(&mut self, sp: &[SignalId], chain: &mut DspAdd<'_>) {
        match sp {
            [in1, in2, out] => chain.add(&[*in1, *in2], &[*out]),
            _ => warn!(signals = sp.len(), "{}: unexpected signal layout", CLASS_NAME),
        }
    }

    fn perform(&mut self, inputs: Inputs<'_>, mut outputs: Outputs<'_>) {
        self.perform_block(inputs.get(0), inputs.get(1), outputs.get_mut(0));
    }
}

fn xfade_tilde_new(ctx: &mut Context<'_>, args: &[Atom]) -> Box<dyn Object> {
    let blend = args.first().and_then(Atom::as_float).unwrap_or(0.0);
    Box::new(XfadeTilde::new(ctx, blend))
}

/// Registers `xfade~`. Safe to call any number of times.
pub fn setup() {
    static SETUP: Once = Once::new();
    SETUP.call_once(|| {
        let class = Class {
            name: CLASS_NAME,
            new: xfade_tilde_new,
            args: &[ArgType::DefFloat],
            main_signal_in: true,
        };
        if let Err(error) = class_new(class) {
            warn!("{}", error);
        }
    });
}
