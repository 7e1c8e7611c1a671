//! `xfade~`, a two-input crossfade unit, together with the small block
//! host it runs in and two frontends: a JACK client and an offline WAV
//! renderer.

pub mod config;
pub mod control;
pub mod error;
pub mod host;
pub mod jack_host;
pub mod level_event;
pub mod measure;
pub mod render;
pub mod xfade;

pub use error::Error;

/// Registers every class this crate provides.
pub fn setup() {
    xfade::setup();
}
