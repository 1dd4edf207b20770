use std::{io, path::PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Transport(#[from] tonic::transport::Error),
    #[error("failed to stop supervised processes: {0}")]
    Shutdown(#[from] proclib::Error),
}
