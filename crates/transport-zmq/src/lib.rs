//! ZeroMQ ROUTER backend.
//!
//! Binds a ROUTER socket at the configured endpoint. ZeroMQ supplies exactly
//! the identity model the broker needs: inbound messages arrive with the
//! peer identity prepended, outbound messages are routed by their first
//! frame, and sends to unknown identities are silently dropped.

use cosim_transport::{Router, TransportError};
use cosim_wire::Frame;
use tracing::{debug, trace};

/// A bound ROUTER socket.
///
/// The context is kept alive alongside the socket; dropping both tears the
/// endpoint down.
pub struct ZmqRouter {
    socket: zmq::Socket,
    _context: zmq::Context,
}

impl ZmqRouter {
    /// Create a ROUTER socket and bind it to `endpoint`.
    pub fn bind(endpoint: &str) -> Result<ZmqRouter, TransportError> {
        let context = zmq::Context::new();
        let socket = context
            .socket(zmq::ROUTER)
            .map_err(|e| bind_error(endpoint, e))?;
        socket
            .bind(endpoint)
            .map_err(|e| bind_error(endpoint, e))?;
        debug!(endpoint, "router socket bound");
        Ok(ZmqRouter {
            socket,
            _context: context,
        })
    }
}

fn bind_error(endpoint: &str, e: zmq::Error) -> TransportError {
    TransportError::Bind {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    }
}

impl Router for ZmqRouter {
    fn recv(&mut self) -> Result<Vec<Frame>, TransportError> {
        // Poll with no timeout, then read the whole multi-frame message.
        self.socket
            .poll(zmq::POLLIN, -1)
            .map_err(|e| TransportError::Recv(e.to_string()))?;
        let frames = self
            .socket
            .recv_multipart(0)
            .map_err(|e| TransportError::Recv(e.to_string()))?;
        trace!(frames = frames.len(), "message received");
        Ok(frames)
    }

    fn send(&mut self, frames: Vec<Frame>) -> Result<(), TransportError> {
        self.socket
            .send_multipart(frames, 0)
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}
