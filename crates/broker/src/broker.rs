//! The broker state machine and its event loop.
//!
//! All federation state lives in [`Broker`], owned by the single-threaded
//! event loop: poll the router socket, decode one message, demultiplex by
//! verb, repeat. The only other actor is the wall-clock [`Pacer`], which
//! shares one atomic counter.
//!
//! # Lifecycle
//!
//! ```text
//! HELLO × N  →  barrier release (ACK × N)  →  lockstep rounds  →  BYE × N
//! ```
//!
//! Any fatal condition short-circuits the loop: DIE is fanned out to every
//! registered member and [`Broker::run`] returns the error, which the binary
//! maps to a nonzero exit.

use crate::error::FatalError;
use crate::grant;
use crate::pacer::Pacer;
use crate::registry::{Registry, SimulatorState};
use crate::trace::TraceWriter;
use cosim_transport::Router;
use cosim_types::{parse_time, SimIndex, SimTime, DEFAULT_TIME_DELTA, TIME_NEVER};
use cosim_wire::{frames, ConfigTree, Inbound, Verb};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Startup configuration for a broker instance.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Number of simulators expected to register. Membership is fixed: the
    /// barrier releases on the Nth HELLO and no further registration is
    /// accepted.
    pub expected_members: usize,
    /// Wall-clock pacing tick; `None` disables real-time mode.
    pub realtime_interval: Option<Duration>,
    /// Trace file path; `None` disables publish tracing.
    pub trace_path: Option<PathBuf>,
}

/// Counters maintained by the event loop, logged at shutdown.
#[derive(Debug, Default, Clone)]
pub struct BrokerStats {
    /// Inbound messages decoded.
    pub messages_received: u64,
    /// Publish copies delivered to subscribers.
    pub publishes_routed: u64,
    /// Publishes with no matching subscriber.
    pub publishes_dropped: u64,
    /// Grant rounds computed.
    pub grant_rounds: u64,
}

/// Whether the event loop keeps running after a message.
enum Flow {
    Continue,
    Shutdown,
}

/// The federation broker.
pub struct Broker<R: Router> {
    socket: R,
    registry: Registry,
    expected_members: usize,
    barrier_released: bool,
    /// Most recently granted global simulated time.
    time_granted: SimTime,
    /// Members currently working on a granted step.
    n_processing: usize,
    /// Names that have said BYE.
    byes: HashSet<String>,
    realtime_interval: Option<Duration>,
    pacer: Option<Pacer>,
    trace: Option<TraceWriter>,
    stats: BrokerStats,
}

impl<R: Router> Broker<R> {
    /// Build a broker over an already-bound router socket.
    pub fn new(socket: R, config: BrokerConfig) -> Result<Broker<R>, FatalError> {
        let trace = match &config.trace_path {
            Some(path) => {
                let writer = TraceWriter::create(path).map_err(|source| FatalError::Trace {
                    path: path.clone(),
                    source,
                })?;
                info!(path = %path.display(), "publish tracing enabled");
                Some(writer)
            }
            None => None,
        };

        Ok(Broker {
            socket,
            registry: Registry::new(),
            expected_members: config.expected_members,
            barrier_released: false,
            time_granted: 0,
            n_processing: 0,
            byes: HashSet::new(),
            realtime_interval: config.realtime_interval,
            pacer: None,
            trace,
            stats: BrokerStats::default(),
        })
    }

    /// Run the event loop until graceful shutdown or a fatal condition.
    ///
    /// On a fatal condition DIE is sent to every registered member before
    /// the error is returned.
    pub fn run(&mut self) -> Result<(), FatalError> {
        info!(expected_members = self.expected_members, "broker running");
        loop {
            match self.step() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Shutdown) => {
                    self.finish();
                    return Ok(());
                }
                Err(fatal) => {
                    self.abort(&fatal);
                    return Err(fatal);
                }
            }
        }
    }

    /// Current global simulated time.
    pub fn time_granted(&self) -> SimTime {
        self.time_granted
    }

    pub fn stats(&self) -> &BrokerStats {
        &self.stats
    }

    // ═══════════════════════════════════════════════════════════════════
    // Dispatch
    // ═══════════════════════════════════════════════════════════════════

    /// Receive and handle one message.
    fn step(&mut self) -> Result<Flow, FatalError> {
        let envelope = self.socket.recv()?;
        let msg = Inbound::decode(envelope)?;
        self.stats.messages_received += 1;
        trace!(sender = %msg.sender, verb = %msg.verb, "message received");

        // Until every expected member has said HELLO, nothing else is legal.
        if !self.barrier_released && msg.verb != Verb::Hello {
            return Err(FatalError::EarlyVerb {
                sender: msg.sender,
                verb: msg.verb,
            });
        }

        match msg.verb {
            Verb::Hello => self.on_hello(msg),
            Verb::TimeRequest => self.on_time_request(msg),
            Verb::Bye => self.on_bye(msg),
            Verb::TimeDelta => self.on_time_delta(msg),
            Verb::Publish => self.on_publish(msg),
            Verb::Die => {
                self.require_registered(&msg.sender)?;
                Err(FatalError::Die(msg.sender))
            }
            Verb::Ack => Err(FatalError::UnexpectedVerb {
                sender: msg.sender,
                verb: msg.verb,
            }),
        }
    }

    fn require_registered(&self, sender: &str) -> Result<SimIndex, FatalError> {
        self.registry
            .index_of(sender)
            .ok_or_else(|| FatalError::UnknownSender(sender.to_string()))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Registration
    // ═══════════════════════════════════════════════════════════════════

    fn on_hello(&mut self, msg: Inbound) -> Result<Flow, FatalError> {
        if self.barrier_released {
            return Err(FatalError::LateHello(msg.sender));
        }
        if self.registry.contains(&msg.sender) {
            return Err(FatalError::DuplicateHello(msg.sender));
        }

        let config = ConfigTree::parse(msg.payload(0, "config")?)?;

        let time_delta = match config.value("/time_delta") {
            Some(text) => {
                let delta =
                    parse_time(text).map_err(|_| FatalError::BadTimeDelta {
                        sender: msg.sender.clone(),
                        value: text.to_string(),
                    })?;
                if delta == 0 {
                    return Err(FatalError::BadTimeDelta {
                        sender: msg.sender.clone(),
                        value: text.to_string(),
                    });
                }
                delta
            }
            None => {
                warn!(member = %msg.sender, "config does not contain 'time_delta'; defaulting to 1s");
                DEFAULT_TIME_DELTA
            }
        };

        let subscriptions = subscription_topics(&config);
        for topic in &subscriptions {
            trace!(member = %msg.sender, topic = %topic, "subscription added");
        }

        let index = self.registry.insert(SimulatorState::new(
            msg.sender.clone(),
            time_delta,
            subscriptions,
        ));
        info!(
            member = %msg.sender,
            index,
            time_delta,
            registered = self.registry.len(),
            expected = self.expected_members,
            "simulator registered"
        );

        if self.registry.len() == self.expected_members {
            self.release_barrier()?;
        }
        Ok(Flow::Continue)
    }

    /// All expected members are present: arm the pacer and ACK everyone.
    fn release_barrier(&mut self) -> Result<(), FatalError> {
        self.barrier_released = true;
        if let Some(interval) = self.realtime_interval {
            self.pacer = Some(Pacer::start(interval));
            debug!(interval_ns = interval.as_nanos() as u64, "wall-clock pacer armed");
        }

        let count = self.registry.len();
        self.n_processing = count;
        for member in self.registry.members_mut() {
            member.processing = true;
        }
        for index in 0..count {
            let name = self.registry.member(index).name.clone();
            self.socket.send(frames::ack(&name, index, count))?;
            debug!(member = %name, index, "ACK sent");
        }
        info!(members = count, "federation barrier released");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Time engine
    // ═══════════════════════════════════════════════════════════════════

    fn on_time_request(&mut self, msg: Inbound) -> Result<Flow, FatalError> {
        let index = self.require_registered(&msg.sender)?;
        let requested = msg.payload_time(0, "time")?;
        trace!(member = %msg.sender, requested, "TIME_REQUEST received");

        self.registry.member_mut(index).time_requested = requested;
        self.finish_step(index)?;
        Ok(Flow::Continue)
    }

    fn on_bye(&mut self, msg: Inbound) -> Result<Flow, FatalError> {
        let index = self.require_registered(&msg.sender)?;
        if self.byes.contains(&msg.sender) {
            warn!(member = %msg.sender, "duplicate BYE");
            return Ok(Flow::Continue);
        }
        self.byes.insert(msg.sender.clone());
        debug!(member = %msg.sender, byes = self.byes.len(), "BYE received");

        if self.byes.len() == self.expected_members {
            return Ok(Flow::Shutdown);
        }

        let member = self.registry.member_mut(index);
        member.time_requested = TIME_NEVER;
        // A departed member must never win the grant minimum; dropping its
        // mail flag keeps its actionable time at TIME_NEVER.
        member.messages_pending = false;

        self.finish_step(index)?;
        Ok(Flow::Continue)
    }

    /// Shared tail of TIME_REQUEST and BYE: the member has finished the step
    /// it was granted. When it was the last one out, compute the next round.
    fn finish_step(&mut self, index: SimIndex) -> Result<(), FatalError> {
        let time_granted = self.time_granted;
        let member = self.registry.member_mut(index);
        member.time_last_processed = time_granted;
        if member.processing {
            member.processing = false;
            self.n_processing -= 1;
        }

        if self.n_processing == 0 {
            self.grant_round()?;
        }
        Ok(())
    }

    /// Compute and send the next global time grant.
    fn grant_round(&mut self) -> Result<(), FatalError> {
        let round = grant::compute(self.registry.members(), self.time_granted);
        debug_assert!(round.time >= self.time_granted);
        debug_assert!(round.time != TIME_NEVER, "grant round with no live member");

        if let Some(pacer) = &self.pacer {
            trace!(
                time_granted = round.time,
                time_real = pacer.time_real(),
                "pacing against wall clock"
            );
            pacer.wait_until(round.time);
        }

        self.time_granted = round.time;
        self.stats.grant_rounds += 1;
        grant::apply(self.registry.members_mut(), &round);

        debug!(time_granted = round.time, waking = round.wake.len(), "grant round");
        for &index in &round.wake {
            let name = self.registry.member(index).name.clone();
            self.n_processing += 1;
            self.socket.send(frames::grant(&name, round.time))?;
            trace!(member = %name, time_granted = round.time, "granted");
        }
        Ok(())
    }

    fn on_time_delta(&mut self, msg: Inbound) -> Result<Flow, FatalError> {
        let index = self.require_registered(&msg.sender)?;
        let delta = msg.payload_time(0, "delta")?;
        if delta == 0 {
            return Err(FatalError::BadTimeDelta {
                sender: msg.sender,
                value: "0".to_string(),
            });
        }
        debug!(member = %msg.sender, time_delta = delta, "granularity updated");
        self.registry.member_mut(index).time_delta = delta;
        Ok(Flow::Continue)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Publish routing
    // ═══════════════════════════════════════════════════════════════════

    fn on_publish(&mut self, msg: Inbound) -> Result<Flow, FatalError> {
        self.require_registered(&msg.sender)?;
        let topic = msg.payload_text(0, "topic")?.to_string();
        let value = msg.payload(1, "value")?.to_vec();

        if let Some(writer) = &mut self.trace {
            if let Err(e) = writer.record(self.time_granted, &topic, &value) {
                warn!(error = %e, "trace write failed");
            }
        }

        let targets: Vec<SimIndex> = self
            .registry
            .members()
            .iter()
            .enumerate()
            .filter(|(_, m)| m.subscribes_to(&topic))
            .map(|(i, _)| i)
            .collect();

        if targets.is_empty() {
            trace!(topic = %topic, "no subscribers; publish dropped");
            self.stats.publishes_dropped += 1;
            return Ok(Flow::Continue);
        }

        for index in targets {
            let name = self.registry.member(index).name.clone();
            self.socket.send(msg.redirect(&name))?;
            self.stats.publishes_routed += 1;

            let member = self.registry.member_mut(index);
            if !member.has_departed() {
                member.messages_pending = true;
            }
            trace!(topic = %topic, subscriber = %name, "publish routed");
        }
        Ok(Flow::Continue)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Shutdown
    // ═══════════════════════════════════════════════════════════════════

    /// Graceful end: every member said BYE.
    fn finish(&mut self) {
        for index in 0..self.registry.len() {
            let name = self.registry.member(index).name.clone();
            if let Err(e) = self.socket.send(frames::control(&name, Verb::Bye)) {
                warn!(member = %name, error = %e, "BYE send failed during shutdown");
            }
        }
        if let Some(writer) = &mut self.trace {
            let _ = writer.flush();
        }
        self.pacer = None;
        info!(
            messages_received = self.stats.messages_received,
            publishes_routed = self.stats.publishes_routed,
            publishes_dropped = self.stats.publishes_dropped,
            grant_rounds = self.stats.grant_rounds,
            "federation complete"
        );
    }

    /// Fatal end: best-effort DIE fan-out, then the caller exits nonzero.
    fn abort(&mut self, fatal: &FatalError) {
        error!(error = %fatal, "fatal condition; aborting federation");
        for index in 0..self.registry.len() {
            let name = self.registry.member(index).name.clone();
            let _ = self.socket.send(frames::control(&name, Verb::Die));
        }
        if let Some(writer) = &mut self.trace {
            let _ = writer.flush();
        }
        self.pacer = None;
    }
}

/// Extract subscription topics from a registration config.
///
/// Each child of `/values` contributes one topic: its `topic` sub-key, or
/// its own value for plain `name = topic` entries. Children with neither are
/// ignored.
fn subscription_topics(config: &ConfigTree) -> HashSet<String> {
    let mut topics = HashSet::new();
    if let Some(values) = config.section("/values") {
        for entry in values.children() {
            match entry.value_of("topic").or_else(|| entry.value()) {
                Some(topic) => {
                    topics.insert(topic.to_string());
                }
                None => trace!(entry = %entry.name(), "subscription entry without topic"),
            }
        }
    }
    topics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_topics_from_both_forms() {
        let blob = b"time_delta = 1s\nvalues\n    a\n        topic = sim2/load\n    b = sim3/price\n";
        let config = ConfigTree::parse(blob).unwrap();
        let topics = subscription_topics(&config);
        assert_eq!(topics.len(), 2);
        assert!(topics.contains("sim2/load"));
        assert!(topics.contains("sim3/price"));
    }

    #[test]
    fn test_no_values_section_means_no_subscriptions() {
        let config = ConfigTree::parse(b"time_delta = 1s\n").unwrap();
        assert!(subscription_topics(&config).is_empty());
    }

    #[test]
    fn test_entry_without_topic_is_ignored() {
        let blob = b"values\n    a\n        default = 0\n";
        let config = ConfigTree::parse(blob).unwrap();
        assert!(subscription_topics(&config).is_empty());
    }
}
