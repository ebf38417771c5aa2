//! Router transport trait.
//!
//! Defines the `Router` interface implemented by both the production backend
//! (`transport-zmq`) and the deterministic test backend (`transport-memory`).
//!
//! The broker relies on the router identity model: every inbound message
//! carries the sender's identity as its first frame, and setting the first
//! frame of an outbound message selects the destination. Any transport with
//! stable per-peer identities can sit behind this trait.

use cosim_wire::Frame;
use thiserror::Error;

/// Errors surfaced by a transport backend.
///
/// Every variant is fatal to the federation: the broker has no retry layer,
/// so a transport failure becomes a DIE broadcast and a nonzero exit.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind '{endpoint}': {reason}")]
    Bind { endpoint: String, reason: String },

    #[error("receive failed: {0}")]
    Recv(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("transport closed")]
    Closed,
}

/// A router-style socket: identity-addressed multi-frame messaging.
///
/// `recv` folds the infinite-timeout poll and the message read into one
/// blocking call; there is no per-request timeout anywhere in the broker.
pub trait Router {
    /// Block until one complete multi-frame message arrives.
    ///
    /// The first frame of the returned envelope is the sender identity.
    fn recv(&mut self) -> Result<Vec<Frame>, TransportError>;

    /// Send one multi-frame message.
    ///
    /// The first frame is consumed as the destination identity and is not
    /// delivered to the peer. Messages to unknown identities are dropped.
    fn send(&mut self, frames: Vec<Frame>) -> Result<(), TransportError>;
}
