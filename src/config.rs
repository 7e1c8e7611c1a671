use crate::host::signal::DEFAULT_BLOCK_SIZE;
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Unit {
    /// Initial mixing factor; clipped to [0, 1] only when mixing.
    pub blend: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Jack {
    pub client_name: String,
    // full JACK port names to connect to our ports on startup
    pub connect_in_1: Vec<String>,
    pub connect_in_2: Vec<String>,
    pub connect_out: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Render {
    pub block_size: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub unit: Unit,
    pub jack: Jack,
    pub render: Render,
}

impl Default for Unit {
    fn default() -> Unit {
        Unit { blend: 0.0 }
    }
}

impl Default for Jack {
    fn default() -> Jack {
        Jack {
            client_name: String::from("xfade"),
            connect_in_1: vec![],
            connect_in_2: vec![],
            connect_out: vec![],
        }
    }
}

impl Default for Render {
    fn default() -> Render {
        Render {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

#[derive(Error, Debug)]
pub struct ParseError {
    pub filename: String,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to parse {}: {}", self.filename, self.message)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    ParseError(ParseError),

    #[error("{0}: block_size must be positive")]
    InvalidBlockSize(String),

    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),

    #[error(transparent)]
    IOError(#[from] io::Error),

    #[error(transparent)]
    AtomicIOError(#[from] atomicwrites::Error<io::Error>),
}

pub static FILENAME: &str = "xfade.toml";

/// `<config dir>/xfade.toml`, or `xfade.toml` in the working directory when
/// the platform has no config dir.
pub fn default_path() -> PathBuf {
    match directories::ProjectDirs::from("", "", "xfade") {
        Some(dirs) => dirs.config_dir().join(FILENAME),
        None => PathBuf::from(FILENAME),
    }
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    // If no file is found, returns default config instead of error
    pub fn load(path: &Path) -> Result<Config, Error> {
        let filename = path.display().to_string();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Config::new()),
            Err(error) => return Err(Error::IOError(error)),
        };
        let config: Config = match toml::from_str(&contents) {
            Ok(contents) => contents,
            Err(error) if error.line_col().is_some() => {
                return Err(Error::ParseError(ParseError {
                    filename,
                    message: format!("{}", error),
                }));
            }
            Err(error) => return Err(Error::TomlDeError(error)),
        };
        if config.render.block_size == 0 {
            return Err(Error::InvalidBlockSize(filename));
        }
        info!("Loaded config from {}", filename);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let contents = toml::to_string(self)?;
        let writer = atomicwrites::AtomicFile::new(path, atomicwrites::AllowOverwrite);
        writer.write(|f| f.write_all(contents.as_bytes()))?;
        info!("Saved config to {}", path.display());
        Ok(())
    }
}
