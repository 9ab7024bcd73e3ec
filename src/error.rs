//! Error types shared by the codec, the resolver and the transports.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("malformed message at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: &'static str },

    #[error("could not resolve name server {host}")]
    ResolutionAborted {
        host: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("upstream answered with rcode {rcode}")]
    UpstreamServerError { rcode: u8 },

    #[error("could not read blacklist {}", path.display())]
    Blacklist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn malformed(offset: usize, reason: &'static str) -> Self {
        Error::Malformed { offset, reason }
    }
}
