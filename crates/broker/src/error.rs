//! Fatal error taxonomy.
//!
//! The broker has exactly two failure severities: warnings (logged, the
//! federation continues) and fatals (DIE is fanned out to every registered
//! member and the process exits nonzero). Everything in this enum is fatal;
//! warnings never leave their handler.

use cosim_transport::TransportError;
use cosim_wire::{ConfigError, Verb, WireError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FatalError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("malformed message: {0}")]
    Wire(#[from] WireError),

    #[error("bad registration config: {0}")]
    Config(#[from] ConfigError),

    #[error("simulator '{0}' already connected")]
    DuplicateHello(String),

    #[error("simulator '{0}' not connected")]
    UnknownSender(String),

    #[error("{verb} from '{sender}' before the federation barrier released")]
    EarlyVerb { sender: String, verb: Verb },

    #[error("HELLO from '{0}' after the federation barrier released")]
    LateHello(String),

    #[error("{verb} from '{sender}' is not a simulator-originated verb")]
    UnexpectedVerb { sender: String, verb: Verb },

    #[error("invalid time granularity '{value}' from '{sender}'")]
    BadTimeDelta { sender: String, value: String },

    #[error("DIE received from '{0}'")]
    Die(String),

    #[error("could not open trace file '{path}': {source}")]
    Trace {
        path: PathBuf,
        source: std::io::Error,
    },
}
