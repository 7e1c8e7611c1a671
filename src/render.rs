//! Offline rendering: crossfades two WAV files through one `xfade~` per
//! channel, block by block, the same way the JACK client does live.

use crate::host::{self, Atom, Graph, InputId, ObjectId, Sample};
use crate::measure;
use crate::xfade;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    WavError(#[from] hound::Error),

    #[error(transparent)]
    HostError(#[from] host::Error),

    #[error("inputs differ in {what}: {first} vs {second}")]
    Mismatch {
        what: &'static str,
        first: u32,
        second: u32,
    },

    #[error("unsupported sample format: {0} bit integer")]
    UnsupportedBits(u16),

    #[error("block size must be positive")]
    InvalidBlockSize,

    #[error("invalid automation event '{0}', expected FRAME=VALUE")]
    InvalidEvent(String),
}

/// A blend change at a frame. It reaches the unit at the first block
/// boundary at or after `frame`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendEvent {
    pub frame: u64,
    pub value: Sample,
}

impl FromStr for BlendEvent {
    type Err = Error;

    fn from_str(text: &str) -> Result<BlendEvent, Error> {
        let invalid = || Error::InvalidEvent(String::from(text));
        let (frame, value) = text.split_once('=').ok_or_else(invalid)?;
        Ok(BlendEvent {
            frame: frame.trim().parse().map_err(|_| invalid())?,
            value: value.trim().parse().map_err(|_| invalid())?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub blend: Sample,
    pub block_size: usize,
    pub events: Vec<BlendEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub frames: u64,
    pub blocks: u64,
    pub channels: u16,
    pub sample_rate: u32,
}

struct Clip {
    spec: hound::WavSpec,
    // deinterleaved
    channels: Vec<Vec<Sample>>,
}

impl Clip {
    fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }
}

fn read(path: &Path) -> Result<Clip, Error> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let interleaved: Vec<Sample> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(Error::UnsupportedBits(spec.bits_per_sample));
            }
            let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|sample| sample.map(|sample| sample as f32 * scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };
    let num_channels = usize::from(spec.channels.max(1));
    let mut channels = vec![Vec::with_capacity(interleaved.len() / num_channels); num_channels];
    for frame in interleaved.chunks(num_channels) {
        for (channel, sample) in channels.iter_mut().zip(frame) {
            channel.push(*sample);
        }
    }
    debug!(
        path = %path.display(),
        channels = num_channels,
        frames = channels[0].len(),
        "read input"
    );
    Ok(Clip { spec, channels })
}

fn check_same(what: &'static str, first: u32, second: u32) -> Result<(), Error> {
    if first == second {
        Ok(())
    } else {
        Err(Error::Mismatch {
            what,
            first,
            second,
        })
    }
}

struct Lane {
    unit: ObjectId,
    left: InputId,
    right: InputId,
}

// Copies `source[start..]` into `buffer`, padding with silence.
fn fill(buffer: &mut [Sample], source: &[Sample], start: usize) {
    for (index, sample) in buffer.iter_mut().enumerate() {
        *sample = source.get(start + index).copied().unwrap_or(0.0);
    }
}

/// Mixes `in_1` and `in_2` into a 32 bit float WAV at `out`.
pub fn render(in_1: &Path, in_2: &Path, out: &Path, options: &Options) -> Result<Summary, Error> {
    if options.block_size == 0 {
        return Err(Error::InvalidBlockSize);
    }
    xfade::setup();

    let first = read(in_1)?;
    let second = read(in_2)?;
    check_same("sample rate", first.spec.sample_rate, second.spec.sample_rate)?;
    check_same(
        "channel count",
        u32::from(first.spec.channels),
        u32::from(second.spec.channels),
    )?;

    let mut graph = Graph::new(options.block_size);
    let mut lanes = Vec::with_capacity(first.channels.len());
    for _ in &first.channels {
        let unit = graph.instantiate(xfade::CLASS_NAME, &[Atom::Float(options.blend)])?;
        let left = graph.add_input()?;
        let right = graph.add_input()?;
        graph.connect_input(left, unit, xfade::INLET_LEFT)?;
        graph.connect_input(right, unit, xfade::INLET_RIGHT)?;
        lanes.push(Lane { unit, left, right });
    }
    graph.dsp_on()?;

    let mut events = options.events.clone();
    events.sort_by_key(|event| event.frame);
    let mut pending = events.iter().peekable();

    let spec = hound::WavSpec {
        channels: first.spec.channels,
        sample_rate: first.spec.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(out, spec)?;

    let frames = first.frames().max(second.frames());
    let mut timing = measure::Repeated::new();
    let mut blocks = 0u64;
    let mut start = 0;
    while start < frames {
        while let Some(event) = pending.next_if(|event| event.frame <= start as u64) {
            for lane in &lanes {
                graph.send_float(lane.unit, xfade::INLET_BLEND, event.value)?;
            }
        }

        for (index, lane) in lanes.iter().enumerate() {
            if let Some(buffer) = graph.input_mut(lane.left) {
                fill(buffer, &first.channels[index], start);
            }
            if let Some(buffer) = graph.input_mut(lane.right) {
                fill(buffer, &second.channels[index], start);
            }
        }

        timing.measure(|| graph.tick());

        let length = options.block_size.min(frames - start);
        for frame in 0..length {
            for lane in &lanes {
                let sample = graph
                    .output(lane.unit, xfade::OUTLET)
                    .map_or(0.0, |buffer| buffer[frame]);
                writer.write_sample(sample)?;
            }
        }

        blocks += 1;
        start += options.block_size;
    }
    writer.finalize()?;

    info!(
        frames,
        blocks,
        average = ?timing.average(),
        max = ?timing.max_time(),
        "rendered {}",
        out.display()
    );
    Ok(Summary {
        frames: frames as u64,
        blocks,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
    })
}
