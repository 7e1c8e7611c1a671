//! Control path from the terminal to the audio thread.
//!
//! Lines are parsed on a reader thread and the resulting messages go over a
//! bounded channel; the process callback drains it before each block.

use crate::host::{Atom, Sample};
use crate::level_event::LevelEvent;
use crate::xfade;
use std::io::{self, BufRead};
use std::thread;
use thiserror::Error;
use tracing::{debug, info, warn};

const CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message {
    Float { inlet: usize, value: Sample },
}

pub type Receiver = crossbeam_channel::Receiver<Message>;
pub type Sender = crossbeam_channel::Sender<Message>;

pub fn channel() -> (Sender, Receiver) {
    crossbeam_channel::bounded(CAPACITY)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Send(Message),
    Quit,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("not a number: '{0}'")]
    NotANumber(String),

    #[error("unknown selector '{0}'")]
    UnknownSelector(String),

    #[error("'{0}' takes exactly one number")]
    Arity(String),
}

fn send(inlet: usize, value: Sample) -> Option<Command> {
    Some(Command::Send(Message::Float { inlet, value }))
}

/// Parses one line: `0.3`, `blend 0.3`, `scalar 0.3` or `quit`, optionally
/// ending in `;`. Blank lines give `None`.
pub fn parse_line(line: &str) -> Result<Option<Command>, ParseError> {
    let atoms = Atom::parse_list(line.trim().trim_end_matches(';'));
    let (selector, args) = match atoms.split_first() {
        None => return Ok(None),
        Some(split) => split,
    };
    let selector = match selector {
        Atom::Float(value) if args.is_empty() => return Ok(send(xfade::INLET_BLEND, *value)),
        Atom::Float(_) => return Err(ParseError::UnknownSelector(selector.to_string())),
        Atom::Symbol(selector) => selector.as_str(),
    };
    let inlet = match selector {
        "quit" if args.is_empty() => return Ok(Some(Command::Quit)),
        "blend" => xfade::INLET_BLEND,
        "scalar" => xfade::INLET_LEFT,
        _ => return Err(ParseError::UnknownSelector(String::from(selector))),
    };
    match args {
        [Atom::Float(value)] => Ok(send(inlet, *value)),
        [other] => Err(ParseError::NotANumber(other.to_string())),
        _ => Err(ParseError::Arity(String::from(selector))),
    }
}

/// Reads control lines from stdin until EOF or `quit`, then raises `exit`.
pub fn spawn_stdin_reader(sender: Sender, exit: LevelEvent) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(error) => {
                    warn!("Reading stdin failed: {}", error);
                    break;
                }
            };
            match parse_line(&line) {
                Ok(None) => (),
                Ok(Some(Command::Quit)) => break,
                Ok(Some(Command::Send(message))) => {
                    debug!(?message, "control");
                    if sender.try_send(message).is_err() {
                        warn!("Control queue full, dropped {:?}", message);
                    }
                }
                Err(error) => warn!("{}", error),
            }
            if exit.test() {
                return;
            }
        }
        info!("Control input closed");
        exit.activate();
    })
}
