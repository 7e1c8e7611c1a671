use super::atom::Atom;
use super::class;
use super::port::{Context, InletKind, OutletKind, PortLedger};
use super::signal::{DspAdd, DspEntry, Inputs, Outputs, Sample, SignalId};
use super::{Error, Object};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::mem;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(usize);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A signal fed into the graph from outside, e.g. a JACK port or a WAV
/// channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputId(usize);

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Input(usize),
    Outlet(usize, usize),
}

#[derive(Debug, Clone, Copy)]
struct Connection {
    source: Source,
    sink: usize,
    inlet: usize,
}

struct Slot {
    class: &'static str,
    object: Box<dyn Object>,
    inlets: Vec<InletKind>,
    outlets: Vec<OutletKind>,
}

struct Schedule {
    pool: Vec<Vec<Sample>>,
    inputs: Vec<SignalId>,
    outlets: HashMap<(usize, usize), SignalId>,
    // unconnected main signal inlets, refilled from the object's scalar
    // before every block
    scalars: Vec<(usize, SignalId)>,
    chain: Vec<DspEntry>,
}

/// Object graph plus the DSP schedule built from it.
pub struct Graph {
    block_size: usize,
    ledger: Arc<PortLedger>,
    slots: Vec<Option<Slot>>,
    num_inputs: usize,
    connections: Vec<Connection>,
    schedule: Option<Schedule>,
}

impl Graph {
    pub fn new(block_size: usize) -> Graph {
        assert!(block_size > 0);
        Graph {
            block_size,
            ledger: Arc::new(PortLedger::new()),
            slots: vec![],
            num_inputs: 0,
            connections: vec![],
            schedule: None,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn is_dsp_on(&self) -> bool {
        self.schedule.is_some()
    }

    /// Number of inlet/outlet handles held by live objects.
    pub fn live_ports(&self) -> usize {
        self.ledger.live()
    }

    /// Creates an object of a registered class.
    pub fn instantiate(&mut self, name: &str, args: &[Atom]) -> Result<ObjectId, Error> {
        let class = class::find(name).ok_or_else(|| Error::UnknownClass(String::from(name)))?;
        let args = class.normalize_args(args)?;
        let mut ctx = Context::new(&self.ledger, class.main_signal_in);
        let object = (class.new)(&mut ctx, &args);
        let (inlets, outlets) = ctx.into_layout();

        let id = self.slots.len();
        self.slots.push(Some(Slot {
            class: class.name,
            object,
            inlets,
            outlets,
        }));
        debug!(class = class.name, id, "created object");
        self.update_dsp()?;
        Ok(ObjectId(id))
    }

    /// Tears an object down, dropping its connections and releasing its
    /// ports.
    pub fn remove(&mut self, object: ObjectId) -> Result<(), Error> {
        let slot = self
            .slots
            .get_mut(object.0)
            .and_then(Option::take)
            .ok_or(Error::NoSuchObject(object))?;
        self.connections.retain(|connection| {
            connection.sink != object.0
                && !matches!(connection.source, Source::Outlet(source, _) if source == object.0)
        });
        let rebuilt = self.update_dsp();
        debug!(class = slot.class, id = object.0, "freed object");
        drop(slot);
        rebuilt
    }

    pub fn add_input(&mut self) -> Result<InputId, Error> {
        let id = self.num_inputs;
        self.num_inputs += 1;
        self.update_dsp()?;
        Ok(InputId(id))
    }

    pub fn connect_input(
        &mut self,
        input: InputId,
        sink: ObjectId,
        inlet: usize,
    ) -> Result<(), Error> {
        if input.0 >= self.num_inputs {
            return Err(Error::NoSuchInput(input));
        }
        self.add_connection(Source::Input(input.0), sink, inlet)
    }

    pub fn connect(
        &mut self,
        source: ObjectId,
        outlet: usize,
        sink: ObjectId,
        inlet: usize,
    ) -> Result<(), Error> {
        let slot = self.slot(source)?;
        match slot.outlets.get(outlet) {
            Some(OutletKind::Signal) => (),
            // control connections are not routed by this host
            Some(OutletKind::Control) | None => {
                return Err(Error::NoSuchOutlet {
                    object: source,
                    outlet,
                })
            }
        }
        self.add_connection(Source::Outlet(source.0, outlet), sink, inlet)
    }

    fn add_connection(&mut self, source: Source, sink: ObjectId, inlet: usize) -> Result<(), Error> {
        let slot = self.slot(sink)?;
        match slot.inlets.get(inlet) {
            Some(InletKind::Signal) => (),
            Some(InletKind::Control) => {
                return Err(Error::NotSignal {
                    object: sink,
                    inlet,
                })
            }
            None => {
                return Err(Error::NoSuchInlet {
                    object: sink,
                    inlet,
                })
            }
        }
        if self
            .connections
            .iter()
            .any(|connection| connection.sink == sink.0 && connection.inlet == inlet)
        {
            return Err(Error::InletOccupied {
                object: sink,
                inlet,
            });
        }
        self.connections.push(Connection {
            source,
            sink: sink.0,
            inlet,
        });
        if let Err(error) = self.update_dsp() {
            self.connections.pop();
            return Err(error);
        }
        Ok(())
    }

    /// Delivers a float message. Takes effect for the next block.
    pub fn send_float(&mut self, object: ObjectId, inlet: usize, value: Sample) -> Result<(), Error> {
        let slot = self
            .slots
            .get_mut(object.0)
            .and_then(Option::as_mut)
            .ok_or(Error::NoSuchObject(object))?;
        match slot.inlets.get(inlet) {
            None => Err(Error::NoSuchInlet { object, inlet }),
            Some(InletKind::Signal) if inlet != 0 => Err(Error::ExpectedSignal { inlet }),
            Some(_) => slot.object.float(inlet, value),
        }
    }

    pub fn dsp_on(&mut self) -> Result<(), Error> {
        self.schedule = Some(self.build_schedule()?);
        Ok(())
    }

    pub fn dsp_off(&mut self) {
        if self.schedule.take().is_some() {
            info!("DSP off");
        }
    }

    pub fn set_block_size(&mut self, block_size: usize) -> Result<(), Error> {
        if block_size == 0 {
            return Err(Error::InvalidBlockSize);
        }
        if block_size != self.block_size {
            let previous = mem::replace(&mut self.block_size, block_size);
            if let Err(error) = self.update_dsp() {
                self.block_size = previous;
                return Err(error);
            }
        }
        Ok(())
    }

    /// Buffer to fill with the next block of an external input.
    pub fn input_mut(&mut self, input: InputId) -> Option<&mut [Sample]> {
        let schedule = self.schedule.as_mut()?;
        let id = *schedule.inputs.get(input.0)?;
        Some(&mut schedule.pool[id.0])
    }

    /// Last block written to a signal outlet.
    pub fn output(&self, object: ObjectId, outlet: usize) -> Option<&[Sample]> {
        let schedule = self.schedule.as_ref()?;
        let id = schedule.outlets.get(&(object.0, outlet))?;
        Some(&schedule.pool[id.0])
    }

    /// Runs the chain once. Does nothing while DSP is off.
    pub fn tick(&mut self) {
        let Graph {
            slots, schedule, ..
        } = self;
        let schedule = match schedule {
            Some(schedule) => schedule,
            None => return,
        };
        let Schedule {
            pool,
            scalars,
            chain,
            ..
        } = schedule;

        for &(object, id) in scalars.iter() {
            let value = slots[object]
                .as_ref()
                .and_then(|slot| slot.object.main_signal_scalar())
                .unwrap_or(0.0);
            pool[id.0].iter_mut().for_each(|sample| *sample = value);
        }

        for entry in chain.iter_mut() {
            let slot = match slots[entry.object].as_mut() {
                Some(slot) => slot,
                None => continue,
            };
            for id in entry.outputs.iter() {
                entry.taken.push(mem::take(&mut pool[id.0]));
            }
            slot.object
                .perform(Inputs::new(&pool[..], &entry.inputs), Outputs::new(&mut entry.taken[..]));
            for id in entry.outputs.iter().rev() {
                if let Some(buffer) = entry.taken.pop() {
                    pool[id.0] = buffer;
                }
            }
        }
    }

    fn slot(&self, object: ObjectId) -> Result<&Slot, Error> {
        self.slots
            .get(object.0)
            .and_then(Option::as_ref)
            .ok_or(Error::NoSuchObject(object))
    }

    // The running schedule is only replaced once the new one is built.
    fn update_dsp(&mut self) -> Result<(), Error> {
        if self.schedule.is_some() {
            let schedule = self.build_schedule()?;
            self.schedule = Some(schedule);
        }
        Ok(())
    }

    // Kahn's algorithm over signal connections; ties go to the lower id so
    // the order is stable.
    fn sort(&self) -> Result<Vec<usize>, Error> {
        let live: Vec<usize> = (0..self.slots.len())
            .filter(|&id| self.slots[id].is_some())
            .collect();
        let mut indegree: HashMap<usize, usize> = live.iter().map(|&id| (id, 0)).collect();
        for connection in &self.connections {
            if let Source::Outlet(_, _) = connection.source {
                *indegree.entry(connection.sink).or_insert(0) += 1;
            }
        }
        let mut ready: BTreeSet<usize> = live
            .iter()
            .copied()
            .filter(|id| indegree[id] == 0)
            .collect();
        let mut order = Vec::with_capacity(live.len());
        while let Some(id) = ready.iter().next().copied() {
            ready.remove(&id);
            order.push(id);
            for connection in &self.connections {
                if matches!(connection.source, Source::Outlet(source, _) if source == id) {
                    if let Some(count) = indegree.get_mut(&connection.sink) {
                        *count -= 1;
                        if *count == 0 {
                            ready.insert(connection.sink);
                        }
                    }
                }
            }
        }
        if order.len() != live.len() {
            return Err(Error::DspLoop);
        }
        Ok(order)
    }

    fn build_schedule(&mut self) -> Result<Schedule, Error> {
        let order = self.sort()?;
        let block_size = self.block_size;
        let mut pool: Vec<Vec<Sample>> = vec![];
        let alloc = |pool: &mut Vec<Vec<Sample>>| {
            pool.push(vec![0.0; block_size]);
            SignalId(pool.len() - 1)
        };

        let inputs: Vec<SignalId> = (0..self.num_inputs).map(|_| alloc(&mut pool)).collect();
        let mut outlets: HashMap<(usize, usize), SignalId> = HashMap::new();
        let mut scalars = vec![];
        let mut zero: Option<SignalId> = None;
        let mut chain = vec![];

        for &id in &order {
            let slot = match self.slots[id].as_mut() {
                Some(slot) => slot,
                None => continue,
            };
            let mut sp = vec![];
            for (inlet, kind) in slot.inlets.iter().enumerate() {
                if *kind != InletKind::Signal {
                    continue;
                }
                let source = self
                    .connections
                    .iter()
                    .find(|connection| connection.sink == id && connection.inlet == inlet)
                    .map(|connection| connection.source);
                let signal = match source {
                    Some(Source::Input(input)) => inputs[input],
                    // sources come earlier in `order`, so their outlet exists
                    Some(Source::Outlet(object, outlet)) => outlets[&(object, outlet)],
                    None if inlet == 0 => {
                        let signal = alloc(&mut pool);
                        scalars.push((id, signal));
                        signal
                    }
                    None => *zero.get_or_insert_with(|| alloc(&mut pool)),
                };
                sp.push(signal);
            }
            for (outlet, kind) in slot.outlets.iter().enumerate() {
                if *kind == OutletKind::Signal {
                    let signal = alloc(&mut pool);
                    outlets.insert((id, outlet), signal);
                    sp.push(signal);
                }
            }
            slot.object.dsp(&sp, &mut DspAdd::new(id, &mut chain));
        }

        info!(
            objects = order.len(),
            block_size,
            buffers = pool.len(),
            "DSP schedule built"
        );
        Ok(Schedule {
            pool,
            inputs,
            outlets,
            scalars,
            chain,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::class::{class_new, Class};
    use crate::host::port::{Inlet, Outlet};
    use std::sync::Once;

    // Doubles its signal inlet into its signal outlet.
    struct Twice {
        scalar: Sample,
        _out: Outlet,
    }

    // Has a control-only main inlet.
    struct Probe {
        _value: Sample,
        _in: Inlet,
    }

    impl Object for Twice {
        fn float(&mut self, _inlet: usize, value: Sample) -> Result<(), Error> {
            self.scalar = value;
            Ok(())
        }

        fn main_signal_scalar(&self) -> Option<Sample> {
            Some(self.scalar)
        }

        fn dsp(&mut self, sp: &[SignalId], chain: &mut DspAdd<'_>) {
            chain.add(&sp[..1], &sp[1..2]);
        }

        fn perform(&mut self, inputs: Inputs<'_>, mut outputs: Outputs<'_>) {
            let input = inputs.get(0);
            for (out, sample) in outputs.get_mut(0).iter_mut().zip(input) {
                *out = sample * 2.0;
            }
        }
    }

    impl Object for Probe {
        fn float(&mut self, _inlet: usize, value: Sample) -> Result<(), Error> {
            self._value = value;
            Ok(())
        }

        fn dsp(&mut self, _sp: &[SignalId], _chain: &mut DspAdd<'_>) {}

        fn perform(&mut self, _inputs: Inputs<'_>, _outputs: Outputs<'_>) {}
    }

    fn twice_new(ctx: &mut Context<'_>, _args: &[Atom]) -> Box<dyn Object> {
        Box::new(Twice {
            scalar: 0.0,
            _out: ctx.outlet_new(OutletKind::Signal),
        })
    }

    fn probe_new(ctx: &mut Context<'_>, args: &[Atom]) -> Box<dyn Object> {
        Box::new(Probe {
            _value: args[0].as_float().unwrap_or(0.0),
            _in: ctx.inlet_new(InletKind::Signal),
        })
    }

    fn setup() {
        static SETUP: Once = Once::new();
        SETUP.call_once(|| {
            class_new(Class {
                name: "graph_test_twice~",
                new: twice_new,
                args: &[],
                main_signal_in: true,
            })
            .unwrap();
            class_new(Class {
                name: "graph_test_probe",
                new: probe_new,
                args: &[crate::host::ArgType::DefFloat],
                main_signal_in: false,
            })
            .unwrap();
        });
    }

    #[test]
    fn chain_runs_in_topological_order() {
        setup();
        let mut graph = Graph::new(4);
        // created downstream-first to make sure order comes from the edges
        let b = graph.instantiate("graph_test_twice~", &[]).unwrap();
        let a = graph.instantiate("graph_test_twice~", &[]).unwrap();
        let input = graph.add_input().unwrap();
        graph.connect_input(input, a, 0).unwrap();
        graph.connect(a, 0, b, 0).unwrap();
        graph.dsp_on().unwrap();

        graph
            .input_mut(input)
            .unwrap()
            .copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        graph.tick();
        assert_eq!(graph.output(b, 0).unwrap(), &[4.0, 8.0, 12.0, 16.0]);
    }

    #[test]
    fn unconnected_main_inlet_uses_scalar() {
        setup();
        let mut graph = Graph::new(3);
        let a = graph.instantiate("graph_test_twice~", &[]).unwrap();
        graph.dsp_on().unwrap();
        graph.send_float(a, 0, 0.25).unwrap();
        graph.tick();
        assert_eq!(graph.output(a, 0).unwrap(), &[0.5, 0.5, 0.5]);
    }

    #[test]
    fn loops_are_rejected() {
        setup();
        let mut graph = Graph::new(4);
        let a = graph.instantiate("graph_test_twice~", &[]).unwrap();
        let b = graph.instantiate("graph_test_twice~", &[]).unwrap();
        graph.connect(a, 0, b, 0).unwrap();
        graph.connect(b, 0, a, 0).unwrap();
        assert_eq!(graph.dsp_on(), Err(Error::DspLoop));
        assert!(!graph.is_dsp_on());
    }

    #[test]
    fn loop_while_running_is_rolled_back() {
        setup();
        let mut graph = Graph::new(4);
        let a = graph.instantiate("graph_test_twice~", &[]).unwrap();
        let b = graph.instantiate("graph_test_twice~", &[]).unwrap();
        graph.connect(a, 0, b, 0).unwrap();
        graph.dsp_on().unwrap();

        assert_eq!(graph.connect(b, 0, a, 0), Err(Error::DspLoop));
        assert!(graph.is_dsp_on());

        // the rejected edge is gone, so a's inlet takes a new connection
        let input = graph.add_input().unwrap();
        graph.connect_input(input, a, 0).unwrap();
        graph.input_mut(input).unwrap().copy_from_slice(&[1.0; 4]);
        graph.tick();
        assert_eq!(graph.output(b, 0).unwrap(), &[4.0; 4]);

        graph.remove(b).unwrap();
        assert!(graph.is_dsp_on());
    }

    #[test]
    fn zero_block_size_is_rejected() {
        setup();
        let mut graph = Graph::new(4);
        let a = graph.instantiate("graph_test_twice~", &[]).unwrap();
        graph.dsp_on().unwrap();
        assert_eq!(graph.set_block_size(0), Err(Error::InvalidBlockSize));
        assert_eq!(graph.block_size(), 4);
        graph.tick();
        assert_eq!(graph.output(a, 0).unwrap().len(), 4);
    }

    #[test]
    fn connection_errors() {
        setup();
        let mut graph = Graph::new(4);
        let a = graph.instantiate("graph_test_twice~", &[]).unwrap();
        let probe = graph.instantiate("graph_test_probe", &[]).unwrap();
        let input = graph.add_input().unwrap();

        assert_eq!(
            graph.connect(a, 0, probe, 0),
            Err(Error::NotSignal {
                object: probe,
                inlet: 0
            })
        );
        assert_eq!(
            graph.connect(a, 1, probe, 1),
            Err(Error::NoSuchOutlet {
                object: a,
                outlet: 1
            })
        );
        assert_eq!(
            graph.connect_input(input, a, 3),
            Err(Error::NoSuchInlet { object: a, inlet: 3 })
        );
        graph.connect_input(input, a, 0).unwrap();
        assert_eq!(
            graph.connect(a, 0, a, 0),
            Err(Error::InletOccupied { object: a, inlet: 0 })
        );
        assert_eq!(
            graph.connect_input(InputId(7), a, 0),
            Err(Error::NoSuchInput(InputId(7)))
        );
    }

    #[test]
    fn float_on_secondary_signal_inlet_is_an_error() {
        setup();
        let mut graph = Graph::new(4);
        let probe = graph.instantiate("graph_test_probe", &[]).unwrap();
        assert_eq!(
            graph.send_float(probe, 1, 1.0),
            Err(Error::ExpectedSignal { inlet: 1 })
        );
        assert_eq!(graph.send_float(probe, 0, 1.0), Ok(()));
        assert_eq!(
            graph.send_float(probe, 2, 1.0),
            Err(Error::NoSuchInlet {
                object: probe,
                inlet: 2
            })
        );
    }

    #[test]
    fn remove_releases_ports_and_connections() {
        setup();
        let mut graph = Graph::new(4);
        let a = graph.instantiate("graph_test_twice~", &[]).unwrap();
        let b = graph.instantiate("graph_test_twice~", &[]).unwrap();
        graph.connect(a, 0, b, 0).unwrap();
        graph.dsp_on().unwrap();
        assert_eq!(graph.live_ports(), 2);

        graph.remove(a).unwrap();
        assert_eq!(graph.live_ports(), 1);
        assert_eq!(graph.remove(a), Err(Error::NoSuchObject(a)));

        // b's inlet is free again and falls back to its scalar
        graph.send_float(b, 0, 1.0).unwrap();
        graph.tick();
        assert_eq!(graph.output(b, 0).unwrap(), &[2.0; 4]);
        assert!(graph.output(a, 0).is_none());
    }

    #[test]
    fn block_size_change_rebuilds_schedule() {
        setup();
        let mut graph = Graph::new(4);
        let a = graph.instantiate("graph_test_twice~", &[]).unwrap();
        graph.dsp_on().unwrap();
        graph.set_block_size(8).unwrap();
        graph.tick();
        assert_eq!(graph.output(a, 0).unwrap().len(), 8);

        graph.dsp_off();
        assert!(!graph.is_dsp_on());
        assert!(graph.output(a, 0).is_none());
    }

    #[test]
    fn unknown_class() {
        let mut graph = Graph::new(4);
        assert_eq!(
            graph.instantiate("graph_test_nope~", &[]).err(),
            Some(Error::UnknownClass(String::from("graph_test_nope~")))
        );
    }

    #[test]
    fn tick_without_dsp_does_nothing() {
        setup();
        let mut graph = Graph::new(4);
        let a = graph.instantiate("graph_test_twice~", &[]).unwrap();
        graph.tick();
        assert!(graph.output(a, 0).is_none());
        assert!(graph.input_mut(InputId(0)).is_none());
    }
}
