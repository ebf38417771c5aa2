//! Wire protocol for the federation broker.
//!
//! Messages travel over a router-style socket as multi-frame envelopes. The
//! first frame on receive is the sender identity; the first frame on send
//! selects the destination. The second frame is always the verb.
//!
//! This crate owns the frame-level codec ([`frames`]) and the hierarchical
//! key-value config blob a simulator attaches to its HELLO ([`config`]).

pub mod config;
pub mod frames;

pub use config::{ConfigError, ConfigNode, ConfigTree};
pub use frames::{Frame, Inbound, Verb, WireError};
