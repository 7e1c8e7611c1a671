use crate::config::Config;
use crate::control;
use crate::host::{self, Atom, Graph, InputId, ObjectId, Sample};
use crate::level_event::LevelEvent;
use crate::xfade;
use thiserror::Error;
use tracing::{info, warn};

pub const PORT_IN_1: &str = "in_1";
pub const PORT_IN_2: &str = "in_2";
pub const PORT_OUT: &str = "out";

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    JackError(#[from] jack::Error),

    #[error(transparent)]
    HostError(#[from] host::Error),
}

/// The graph side of the client: one `xfade~` fed by two external inputs.
/// Works on plain slices, so the JACK callback only moves port buffers in
/// and out.
pub struct Engine {
    graph: Graph,
    input_1: InputId,
    input_2: InputId,
    unit: ObjectId,

    control: control::Receiver,
    // messages the unit refused, counted since nothing may log per block
    rejected: usize,
}

impl Engine {
    pub fn new(
        block_size: usize,
        blend: Sample,
        control: control::Receiver,
    ) -> Result<Engine, host::Error> {
        if block_size == 0 {
            return Err(host::Error::InvalidBlockSize);
        }
        xfade::setup();
        let mut graph = Graph::new(block_size);
        let unit = graph.instantiate(xfade::CLASS_NAME, &[Atom::Float(blend)])?;
        let input_1 = graph.add_input()?;
        let input_2 = graph.add_input()?;
        graph.connect_input(input_1, unit, xfade::INLET_LEFT)?;
        graph.connect_input(input_2, unit, xfade::INLET_RIGHT)?;
        graph.dsp_on()?;

        Ok(Engine {
            graph,
            input_1,
            input_2,
            unit,
            control,
            rejected: 0,
        })
    }

    pub fn block_size(&self) -> usize {
        self.graph.block_size()
    }

    /// Control messages dropped because the unit refused them.
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Rebuilds the schedule for a new block size. Allocates.
    pub fn resize(&mut self, block_size: usize) -> Result<(), host::Error> {
        self.graph.set_block_size(block_size)
    }

    // Messages queued since the last block; applied before this one.
    fn process_control(&mut self) {
        for message in self.control.try_iter() {
            match message {
                control::Message::Float { inlet, value } => {
                    if self.graph.send_float(self.unit, inlet, value).is_err() {
                        self.rejected += 1;
                    }
                }
            }
        }
    }

    /// Runs one block. A block whose length differs from the current block
    /// size comes out silent.
    pub fn process(&mut self, in_1: &[Sample], in_2: &[Sample], out: &mut [Sample]) {
        self.process_control();

        let block_size = self.graph.block_size();
        if in_1.len() != block_size || in_2.len() != block_size || out.len() != block_size {
            out.iter_mut().for_each(|sample| *sample = 0.0);
            return;
        }

        if let Some(buffer) = self.graph.input_mut(self.input_1) {
            buffer.copy_from_slice(in_1);
        }
        if let Some(buffer) = self.graph.input_mut(self.input_2) {
            buffer.copy_from_slice(in_2);
        }

        self.graph.tick();

        match self.graph.output(self.unit, xfade::OUTLET) {
            Some(buffer) => out.copy_from_slice(buffer),
            None => out.iter_mut().for_each(|sample| *sample = 0.0),
        }
    }
}

struct XfadeClient {
    in_1: jack::Port<jack::AudioIn>,
    in_2: jack::Port<jack::AudioIn>,
    out: jack::Port<jack::AudioOut>,

    engine: Engine,
}

impl XfadeClient {
    fn new(
        client: &jack::Client,
        config: &Config,
        control: control::Receiver,
    ) -> Result<XfadeClient, Error> {
        let in_1 = client.register_port(PORT_IN_1, jack::AudioIn::default())?;
        let in_2 = client.register_port(PORT_IN_2, jack::AudioIn::default())?;
        let out = client.register_port(PORT_OUT, jack::AudioOut::default())?;
        let engine = Engine::new(client.buffer_size() as usize, config.unit.blend, control)?;

        Ok(XfadeClient {
            in_1,
            in_2,
            out,
            engine,
        })
    }
}

impl jack::ProcessHandler for XfadeClient {
    fn process(&mut self, _: &jack::Client, ps: &jack::ProcessScope) -> jack::Control {
        self.engine.process(
            self.in_1.as_slice(ps),
            self.in_2.as_slice(ps),
            self.out.as_mut_slice(ps),
        );
        jack::Control::Continue
    }

    // Called by JACK between cycles, so the schedule can be rebuilt here.
    fn buffer_size(&mut self, _: &jack::Client, size: jack::Frames) -> jack::Control {
        if let Err(error) = self.engine.resize(size as usize) {
            warn!(size, "Keeping block size {}: {}", self.engine.block_size(), error);
        }
        jack::Control::Continue
    }
}

fn auto_connect(client: &jack::Client, config: &Config) {
    let own = |port: &str| format!("{}:{}", client.name(), port);
    let pairs = (config.jack.connect_in_1.iter())
        .map(|source| (source.clone(), own(PORT_IN_1)))
        .chain(
            (config.jack.connect_in_2.iter()).map(|source| (source.clone(), own(PORT_IN_2))),
        )
        .chain(
            (config.jack.connect_out.iter()).map(|destination| (own(PORT_OUT), destination.clone())),
        );
    for (source, destination) in pairs {
        match client.connect_ports_by_name(&source, &destination) {
            Ok(()) => info!("Connected {} -> {}", source, destination),
            Err(error) => warn!("Failed to connect {} -> {}: {}", source, destination, error),
        }
    }
}

/// Runs the JACK client until `exit` is raised.
pub fn main(config: Config, control: control::Receiver, exit: LevelEvent) -> Result<(), Error> {
    xfade::setup();

    let (client, _status) =
        jack::Client::new(&config.jack.client_name, jack::ClientOptions::NO_START_SERVER)?;
    info!(
        name = client.name(),
        sample_rate = client.sample_rate(),
        buffer_size = client.buffer_size(),
        "JACK client opened"
    );

    let xfade_client = XfadeClient::new(&client, &config, control)?;
    let active_client = client.activate_async((), xfade_client)?;
    auto_connect(active_client.as_client(), &config);

    exit.wait();

    let (_, (), xfade_client) = active_client.deactivate()?;
    let rejected = xfade_client.engine.rejected();
    if rejected > 0 {
        warn!(rejected, "{} refused some control messages", xfade::CLASS_NAME);
    }
    info!("JACK client closed");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONES: [Sample; 4] = [1.0; 4];
    const ZEROS: [Sample; 4] = [0.0; 4];

    fn engine(blend: Sample) -> (control::Sender, Engine) {
        let (sender, receiver) = control::channel();
        (sender, Engine::new(4, blend, receiver).unwrap())
    }

    fn blend(value: Sample) -> control::Message {
        control::Message::Float {
            inlet: xfade::INLET_BLEND,
            value,
        }
    }

    #[test]
    fn queued_messages_apply_to_the_next_block() {
        let (sender, mut engine) = engine(0.0);
        let mut out = [9.0; 4];
        engine.process(&ONES, &ZEROS, &mut out);
        assert_eq!(out, ONES);

        sender.send(blend(0.25)).unwrap();
        sender.send(blend(1.0)).unwrap();
        engine.process(&ONES, &ZEROS, &mut out);
        assert_eq!(out, ZEROS);

        // nothing queued, the last value holds
        engine.process(&ZEROS, &ONES, &mut out);
        assert_eq!(out, ONES);
    }

    #[test]
    fn scalar_message_has_no_effect_while_left_is_connected() {
        let (sender, mut engine) = engine(0.0);
        sender
            .send(control::Message::Float {
                inlet: xfade::INLET_LEFT,
                value: 0.5,
            })
            .unwrap();
        let mut out = [9.0; 4];
        engine.process(&ONES, &ZEROS, &mut out);
        assert_eq!(out, ONES);
        assert_eq!(engine.rejected(), 0);
    }

    #[test]
    fn refused_messages_are_counted() {
        let (sender, mut engine) = engine(0.5);
        for inlet in [xfade::INLET_RIGHT, 7] {
            sender
                .send(control::Message::Float { inlet, value: 1.0 })
                .unwrap();
        }
        let mut out = [9.0; 4];
        engine.process(&ONES, &ZEROS, &mut out);
        assert_eq!(engine.rejected(), 2);
        assert_eq!(out, [0.5; 4]);
    }

    #[test]
    fn wrong_length_block_is_silent_until_resized() {
        let (_sender, mut engine) = engine(0.0);
        let mut out = [9.0; 8];
        engine.process(&[1.0; 8], &[0.0; 8], &mut out);
        assert_eq!(out, [0.0; 8]);

        engine.resize(8).unwrap();
        engine.process(&[1.0; 8], &[0.0; 8], &mut out);
        assert_eq!(out, [1.0; 8]);
    }

    #[test]
    fn zero_size_is_refused() {
        let (_sender, receiver) = control::channel();
        assert!(matches!(
            Engine::new(0, 0.0, receiver),
            Err(host::Error::InvalidBlockSize)
        ));
        let (_sender, mut engine) = engine(0.0);
        assert_eq!(engine.resize(0), Err(host::Error::InvalidBlockSize));
        assert_eq!(engine.block_size(), 4);
    }
}
