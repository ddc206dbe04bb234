use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Could not read {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed CSV input")]
    Csv(#[from] csv::Error),

    #[error("Malformed config")]
    Toml(#[from] toml::de::Error),

    #[error("Travel time matrix has no station columns")]
    EmptyTravelTimeHeader,

    #[error("No path configured for the {table} table")]
    MissingPath { table: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;
