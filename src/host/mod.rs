//! A small signal-graph host: class registry, object ports and a block
//! scheduler that runs the registered perform routines.

pub mod atom;
pub mod class;
pub mod graph;
pub mod port;
pub mod signal;

pub use atom::Atom;
pub use class::{ArgType, Class};
pub use graph::{Graph, InputId, ObjectId};
pub use port::{Context, Inlet, InletKind, Outlet, OutletKind};
pub use signal::{DspAdd, Inputs, Outputs, Sample, SignalId};

use thiserror::Error;

/// Host-side signal processing object.
///
/// Implementors are created by their class constructor and dropped by the
/// graph on teardown; any inlet/outlet handles they own are released then.
pub trait Object: Send {
    /// Float message arriving on `inlet`. The graph has already rejected
    /// floats aimed at secondary signal inlets.
    fn float(&mut self, inlet: usize, value: Sample) -> Result<(), Error>;

    /// Constant used in place of the main signal inlet when nothing is
    /// connected to it.
    fn main_signal_scalar(&self) -> Option<Sample> {
        None
    }

    /// Called when the schedule is (re)built. `sp` holds the signal inlets
    /// followed by the signal outlets.
    fn dsp(&mut self, sp: &[SignalId], chain: &mut DspAdd<'_>);

    /// Per-block routine. Must not allocate or block.
    fn perform(&mut self, inputs: Inputs<'_>, outputs: Outputs<'_>);
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("{0} ... couldn't create")]
    UnknownClass(String),

    #[error("class {0} is already registered")]
    DuplicateClass(&'static str),

    #[error("bad arguments for '{class}': {reason}")]
    BadArguments { class: &'static str, reason: String },

    #[error("no such object: {0}")]
    NoSuchObject(ObjectId),

    #[error("no such external input: {0}")]
    NoSuchInput(InputId),

    #[error("object {object} has no inlet {inlet}")]
    NoSuchInlet { object: ObjectId, inlet: usize },

    #[error("object {object} has no outlet {outlet}")]
    NoSuchOutlet { object: ObjectId, outlet: usize },

    #[error("inlet {inlet}: expected 'signal' but got 'float'")]
    ExpectedSignal { inlet: usize },

    #[error("can't connect signal outlet to control inlet {inlet} of object {object}")]
    NotSignal { object: ObjectId, inlet: usize },

    #[error("inlet {inlet} of object {object} is already connected")]
    InletOccupied { object: ObjectId, inlet: usize },

    #[error("DSP loop detected (some tilde objects not scheduled)")]
    DspLoop,

    #[error("block size must be positive")]
    InvalidBlockSize,
}
