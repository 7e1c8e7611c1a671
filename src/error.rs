use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    ConfigError(#[from] crate::config::Error),

    #[error(transparent)]
    JackHostError(#[from] crate::jack_host::Error),

    #[error(transparent)]
    RenderError(#[from] crate::render::Error),
}
