//! Deterministic in-memory router backend.
//!
//! Reproduces the router identity model over crossbeam channels so the whole
//! broker can be driven in-process by tests: peers created with
//! [`MemoryRouter::connect`] play the simulators, the broker owns the router
//! end. Messages are delivered in send order with no latency model.
//!
//! Semantics mirror the production socket:
//! - a peer's sends arrive at the router with the peer identity prepended,
//! - the router's sends are routed by their first frame, which is stripped
//!   before delivery,
//! - sends to an identity nobody owns are dropped silently.

use cosim_transport::{Router, TransportError};
use cosim_wire::Frame;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::trace;

type PeerMap = Arc<Mutex<HashMap<String, Sender<Vec<Frame>>>>>;

/// The router end of an in-memory federation.
pub struct MemoryRouter {
    inbound_tx: Sender<Vec<Frame>>,
    inbound_rx: Receiver<Vec<Frame>>,
    peers: PeerMap,
}

impl MemoryRouter {
    pub fn new() -> MemoryRouter {
        let (inbound_tx, inbound_rx) = unbounded();
        MemoryRouter {
            inbound_tx,
            inbound_rx,
            peers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a peer under `identity` and return its handle.
    ///
    /// Reconnecting an existing identity replaces the previous handle's
    /// delivery queue, matching a socket reconnect.
    pub fn connect(&self, identity: &str) -> PeerHandle {
        let (deliver_tx, deliver_rx) = unbounded();
        self.peers
            .lock()
            .expect("peer map poisoned")
            .insert(identity.to_string(), deliver_tx);
        PeerHandle {
            identity: identity.to_string(),
            to_router: self.inbound_tx.clone(),
            from_router: deliver_rx,
        }
    }
}

impl Default for MemoryRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl Router for MemoryRouter {
    fn recv(&mut self) -> Result<Vec<Frame>, TransportError> {
        self.inbound_rx.recv().map_err(|_| TransportError::Closed)
    }

    fn send(&mut self, mut frames: Vec<Frame>) -> Result<(), TransportError> {
        if frames.is_empty() {
            return Err(TransportError::Send("empty envelope".to_string()));
        }
        let identity = frames.remove(0);
        let dest = String::from_utf8_lossy(&identity).into_owned();
        let peer = self
            .peers
            .lock()
            .expect("peer map poisoned")
            .get(&dest)
            .cloned();
        match peer {
            // A peer that dropped its handle is treated like an unknown
            // identity: the message is dropped.
            Some(tx) => {
                let _ = tx.send(frames);
            }
            None => trace!(dest = %dest, "dropping message to unknown identity"),
        }
        Ok(())
    }
}

/// A simulator-side handle: sends arrive at the router tagged with this
/// peer's identity; deliveries from the router land in its queue.
pub struct PeerHandle {
    identity: String,
    to_router: Sender<Vec<Frame>>,
    from_router: Receiver<Vec<Frame>>,
}

impl PeerHandle {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Send a message body (verb first); the identity frame is prepended
    /// the way a ROUTER socket tags inbound traffic.
    pub fn send(&self, body: Vec<Frame>) {
        let mut frames = Vec::with_capacity(body.len() + 1);
        frames.push(self.identity.as_bytes().to_vec());
        frames.extend(body);
        let _ = self.to_router.send(frames);
    }

    /// Block until the router delivers a message (identity frame stripped).
    pub fn recv(&self) -> Option<Vec<Frame>> {
        self.from_router.recv().ok()
    }

    /// Receive with a timeout; `None` means nothing arrived in time.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Vec<Frame>> {
        match self.from_router.recv_timeout(timeout) {
            Ok(frames) => Some(frames),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Non-blocking receive.
    pub fn try_recv(&self) -> Option<Vec<Frame>> {
        self.from_router.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(parts: &[&str]) -> Vec<Frame> {
        parts.iter().map(|p| p.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_peer_send_prepends_identity() {
        let mut router = MemoryRouter::new();
        let peer = router.connect("simA");
        peer.send(body(&["HELLO", "config"]));

        let frames = router.recv().unwrap();
        assert_eq!(frames[0], b"simA".to_vec());
        assert_eq!(frames[1], b"HELLO".to_vec());
        assert_eq!(frames[2], b"config".to_vec());
    }

    #[test]
    fn test_router_send_strips_identity() {
        let mut router = MemoryRouter::new();
        let peer = router.connect("simA");
        router.send(body(&["simA", "ACK", "0", "2"])).unwrap();

        let delivered = peer.recv().unwrap();
        assert_eq!(delivered, body(&["ACK", "0", "2"]));
    }

    #[test]
    fn test_unknown_identity_dropped() {
        let mut router = MemoryRouter::new();
        let peer = router.connect("simA");
        router.send(body(&["ghost", "DIE"])).unwrap();
        assert!(peer.recv_timeout(Duration::from_millis(20)).is_none());
    }

    #[test]
    fn test_messages_keep_per_peer_order() {
        let mut router = MemoryRouter::new();
        let peer = router.connect("simA");
        for i in 0..10u32 {
            router
                .send(vec![b"simA".to_vec(), i.to_string().into_bytes()])
                .unwrap();
        }
        for i in 0..10u32 {
            let frames = peer.recv().unwrap();
            assert_eq!(frames[0], i.to_string().into_bytes());
        }
    }

    #[test]
    fn test_empty_envelope_rejected() {
        let mut router = MemoryRouter::new();
        assert!(router.send(Vec::new()).is_err());
    }
}
