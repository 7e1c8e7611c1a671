pub type Sample = f32;

/// Pd's traditional block size; also the default for offline rendering.
pub const DEFAULT_BLOCK_SIZE: usize = 64;

/// Index of a block buffer inside the schedule's buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalId(pub(crate) usize);

/// Read-only view of the input buffers of one perform call.
pub struct Inputs<'a> {
    pool: &'a [Vec<Sample>],
    ids: &'a [SignalId],
}

impl<'a> Inputs<'a> {
    pub(crate) fn new(pool: &'a [Vec<Sample>], ids: &'a [SignalId]) -> Inputs<'a> {
        Inputs { pool, ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn get(&self, index: usize) -> &'a [Sample] {
        &self.pool[self.ids[index].0]
    }
}

/// Writable view of the output buffers of one perform call. The buffers are
/// moved out of the pool for the duration of the call, so they never alias
/// an input.
pub struct Outputs<'a> {
    buffers: &'a mut [Vec<Sample>],
}

impl<'a> Outputs<'a> {
    pub(crate) fn new(buffers: &'a mut [Vec<Sample>]) -> Outputs<'a> {
        Outputs { buffers }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn get_mut(&mut self, index: usize) -> &mut [Sample] {
        &mut self.buffers[index]
    }
}

/// One scheduled perform call.
pub(crate) struct DspEntry {
    pub(crate) object: usize,
    pub(crate) inputs: Vec<SignalId>,
    pub(crate) outputs: Vec<SignalId>,
    // holds the output buffers while the object runs; capacity is reserved
    // at schedule time
    pub(crate) taken: Vec<Vec<Sample>>,
}

/// Handed to [`Object::dsp`](super::Object::dsp) so an object can put itself
/// on the chain with the buffers it wants to see in `perform`.
pub struct DspAdd<'a> {
    object: usize,
    chain: &'a mut Vec<DspEntry>,
}

impl<'a> DspAdd<'a> {
    pub(crate) fn new(object: usize, chain: &'a mut Vec<DspEntry>) -> DspAdd<'a> {
        DspAdd { object, chain }
    }

    pub fn add(&mut self, inputs: &[SignalId], outputs: &[SignalId]) {
        self.chain.push(DspEntry {
            object: self.object,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
            taken: Vec::with_capacity(outputs.len()),
        });
    }
}
