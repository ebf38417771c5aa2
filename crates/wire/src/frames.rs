//! Multi-frame message encoding and decoding.
//!
//! # Wire Format
//!
//! ```text
//! inbound:  [sender identity][verb][payload frames...]
//! outbound: [destination identity][verb][payload frames...]
//! ```
//!
//! Verbs and times are plain text frames; times are decimal nanosecond
//! strings. PUBLISH payloads carry an arbitrary value frame that is forwarded
//! byte-for-byte to subscribers.

use cosim_types::{SimIndex, SimTime};
use thiserror::Error;

/// A single message frame.
pub type Frame = Vec<u8>;

/// Errors from frame-level decoding.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("message missing sender frame")]
    MissingSender,

    #[error("message missing verb frame")]
    MissingVerb,

    #[error("message missing {0} frame")]
    MissingFrame(&'static str),

    #[error("unknown verb '{0}'")]
    UnknownVerb(String),

    #[error("frame is not valid UTF-8")]
    NotUtf8,

    #[error("frame '{0}' is not a decimal nanosecond value")]
    BadDecimal(String),
}

/// Protocol verbs.
///
/// `Ack` is broker-originated only; everything else arrives from simulators
/// and (for the lifecycle verbs) is echoed back out at shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Hello,
    Ack,
    TimeRequest,
    TimeDelta,
    Publish,
    Bye,
    Die,
}

impl Verb {
    /// The on-wire text for this verb.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Verb::Hello => "HELLO",
            Verb::Ack => "ACK",
            Verb::TimeRequest => "TIME_REQUEST",
            Verb::TimeDelta => "TIME_DELTA",
            Verb::Publish => "PUBLISH",
            Verb::Bye => "BYE",
            Verb::Die => "DIE",
        }
    }

    /// Parse a verb frame. Returns `None` for anything unrecognized.
    pub fn from_wire(bytes: &[u8]) -> Option<Verb> {
        match std::str::from_utf8(bytes).ok()? {
            "HELLO" => Some(Verb::Hello),
            "ACK" => Some(Verb::Ack),
            "TIME_REQUEST" => Some(Verb::TimeRequest),
            "TIME_DELTA" => Some(Verb::TimeDelta),
            "PUBLISH" => Some(Verb::Publish),
            "BYE" => Some(Verb::Bye),
            "DIE" => Some(Verb::Die),
            _ => None,
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// A decoded inbound message.
///
/// `frames` retains the complete original envelope so PUBLISH forwarding can
/// duplicate it and rewrite the identity frame without re-encoding.
#[derive(Debug, Clone)]
pub struct Inbound {
    /// Sender identity (first frame).
    pub sender: String,
    /// Message verb (second frame).
    pub verb: Verb,
    /// The complete original envelope, identity frame included.
    pub frames: Vec<Frame>,
}

impl Inbound {
    /// Decode a received multi-frame envelope.
    pub fn decode(frames: Vec<Frame>) -> Result<Inbound, WireError> {
        let sender_frame = frames.first().ok_or(WireError::MissingSender)?;
        let sender = std::str::from_utf8(sender_frame)
            .map_err(|_| WireError::NotUtf8)?
            .to_string();
        if sender.is_empty() {
            return Err(WireError::MissingSender);
        }

        let verb_frame = frames.get(1).ok_or(WireError::MissingVerb)?;
        let verb = Verb::from_wire(verb_frame).ok_or_else(|| {
            WireError::UnknownVerb(String::from_utf8_lossy(verb_frame).into_owned())
        })?;

        Ok(Inbound {
            sender,
            verb,
            frames,
        })
    }

    /// Payload frame at `index` (0 = first frame after the verb).
    pub fn payload(&self, index: usize, what: &'static str) -> Result<&[u8], WireError> {
        self.frames
            .get(2 + index)
            .map(|f| f.as_slice())
            .ok_or(WireError::MissingFrame(what))
    }

    /// Payload frame at `index` decoded as UTF-8 text.
    pub fn payload_text(&self, index: usize, what: &'static str) -> Result<&str, WireError> {
        std::str::from_utf8(self.payload(index, what)?).map_err(|_| WireError::NotUtf8)
    }

    /// Payload frame at `index` decoded as a decimal nanosecond value.
    pub fn payload_time(&self, index: usize, what: &'static str) -> Result<SimTime, WireError> {
        let text = self.payload_text(index, what)?;
        text.trim()
            .parse::<SimTime>()
            .map_err(|_| WireError::BadDecimal(text.to_string()))
    }

    /// Duplicate the envelope with the identity frame rewritten to `dest`.
    ///
    /// This is how a PUBLISH is fanned out: the router socket delivers the
    /// copy to whichever peer owns the new identity.
    pub fn redirect(&self, dest: &str) -> Vec<Frame> {
        let mut copy = self.frames.clone();
        copy[0] = dest.as_bytes().to_vec();
        copy
    }
}

/// Encode a bare control message: `[dest, verb]`.
pub fn control(dest: &str, verb: Verb) -> Vec<Frame> {
    vec![dest.as_bytes().to_vec(), verb.as_wire().as_bytes().to_vec()]
}

/// Encode the barrier-release ACK: `[dest, "ACK", index, member_count]`.
pub fn ack(dest: &str, index: SimIndex, member_count: usize) -> Vec<Frame> {
    vec![
        dest.as_bytes().to_vec(),
        Verb::Ack.as_wire().as_bytes().to_vec(),
        index.to_string().into_bytes(),
        member_count.to_string().into_bytes(),
    ]
}

/// Encode a time grant: `[dest, "TIME_REQUEST", granted_ns]`.
pub fn grant(dest: &str, granted: SimTime) -> Vec<Frame> {
    vec![
        dest.as_bytes().to_vec(),
        Verb::TimeRequest.as_wire().as_bytes().to_vec(),
        granted.to_string().into_bytes(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(parts: &[&str]) -> Vec<Frame> {
        parts.iter().map(|p| p.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_decode_time_request() {
        let msg = Inbound::decode(envelope(&["simA", "TIME_REQUEST", "3000000000"])).unwrap();
        assert_eq!(msg.sender, "simA");
        assert_eq!(msg.verb, Verb::TimeRequest);
        assert_eq!(msg.payload_time(0, "time").unwrap(), 3_000_000_000);
    }

    #[test]
    fn test_decode_publish_keeps_envelope() {
        let msg = Inbound::decode(envelope(&["simB", "PUBLISH", "topic/x", "value1"])).unwrap();
        assert_eq!(msg.verb, Verb::Publish);
        assert_eq!(msg.payload_text(0, "topic").unwrap(), "topic/x");
        assert_eq!(msg.payload(1, "value").unwrap(), b"value1");
        assert_eq!(msg.frames.len(), 4);
    }

    #[test]
    fn test_redirect_rewrites_only_identity() {
        let msg = Inbound::decode(envelope(&["simB", "PUBLISH", "topic/x", "value1"])).unwrap();
        let copy = msg.redirect("simA");
        assert_eq!(copy[0], b"simA".to_vec());
        assert_eq!(copy[1..], msg.frames[1..]);
        // Original untouched.
        assert_eq!(msg.frames[0], b"simB".to_vec());
    }

    #[test]
    fn test_decode_missing_verb() {
        assert!(matches!(
            Inbound::decode(envelope(&["simA"])),
            Err(WireError::MissingVerb)
        ));
    }

    #[test]
    fn test_decode_empty_envelope() {
        assert!(matches!(
            Inbound::decode(Vec::new()),
            Err(WireError::MissingSender)
        ));
    }

    #[test]
    fn test_decode_unknown_verb() {
        let err = Inbound::decode(envelope(&["simA", "GOSSIP"])).unwrap_err();
        match err {
            WireError::UnknownVerb(v) => assert_eq!(v, "GOSSIP"),
            other => panic!("expected UnknownVerb, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_payload_frame() {
        let msg = Inbound::decode(envelope(&["simA", "TIME_REQUEST"])).unwrap();
        assert!(matches!(
            msg.payload_time(0, "time"),
            Err(WireError::MissingFrame("time"))
        ));
    }

    #[test]
    fn test_bad_decimal_payload() {
        let msg = Inbound::decode(envelope(&["simA", "TIME_REQUEST", "soon"])).unwrap();
        assert!(matches!(
            msg.payload_time(0, "time"),
            Err(WireError::BadDecimal(_))
        ));
    }

    #[test]
    fn test_ack_encoding() {
        let frames = ack("simA", 0, 2);
        assert_eq!(frames[0], b"simA".to_vec());
        assert_eq!(frames[1], b"ACK".to_vec());
        assert_eq!(frames[2], b"0".to_vec());
        assert_eq!(frames[3], b"2".to_vec());
    }

    #[test]
    fn test_grant_encoding() {
        let frames = grant("simA", 3_000_000_000);
        assert_eq!(frames[1], b"TIME_REQUEST".to_vec());
        assert_eq!(frames[2], b"3000000000".to_vec());
    }

    #[test]
    fn test_verb_round_trip() {
        for verb in [
            Verb::Hello,
            Verb::Ack,
            Verb::TimeRequest,
            Verb::TimeDelta,
            Verb::Publish,
            Verb::Bye,
            Verb::Die,
        ] {
            assert_eq!(Verb::from_wire(verb.as_wire().as_bytes()), Some(verb));
        }
    }
}
