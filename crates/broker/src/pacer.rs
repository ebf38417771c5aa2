//! Wall-clock pacer for real-time mode.
//!
//! A background thread ticks at the configured interval and stores
//! nanoseconds-elapsed-since-arm into an atomic counter. The event loop
//! reads the counter and sleeps until the wall clock catches up with a
//! freshly computed grant. The counter is the only state shared between the
//! pacer and the event loop.

use cosim_types::SimTime;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Lower bound on catch-up sleeps. The counter only advances once per tick,
/// so sub-millisecond residuals would otherwise degenerate into a spin.
const MIN_CATCHUP_SLEEP: Duration = Duration::from_millis(1);

/// Handle to the pacer thread. Dropping it stops and joins the thread.
pub struct Pacer {
    elapsed_ns: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Pacer {
    /// Arm the pacer: anchor the wall clock now and tick every `interval`.
    pub fn start(interval: Duration) -> Pacer {
        let elapsed_ns = Arc::new(AtomicU64::new(0));
        let stop = Arc::new(AtomicBool::new(false));

        let thread = {
            let elapsed_ns = Arc::clone(&elapsed_ns);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let origin = Instant::now();
                while !stop.load(Ordering::Relaxed) {
                    thread::sleep(interval);
                    let now = origin.elapsed().as_nanos().min(u64::MAX as u128) as u64;
                    elapsed_ns.store(now, Ordering::Relaxed);
                }
            })
        };

        Pacer {
            elapsed_ns,
            stop,
            thread: Some(thread),
        }
    }

    /// Wall-clock nanoseconds since the pacer was armed, as of the last tick.
    pub fn time_real(&self) -> SimTime {
        self.elapsed_ns.load(Ordering::Relaxed)
    }

    /// Block until `time_real` has reached `target`.
    pub fn wait_until(&self, target: SimTime) {
        loop {
            let real = self.time_real();
            if real >= target {
                return;
            }
            let lag = Duration::from_nanos(target - real);
            thread::sleep(lag.max(MIN_CATCHUP_SLEEP));
        }
    }
}

impl Drop for Pacer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_advances() {
        let pacer = Pacer::start(Duration::from_millis(5));
        thread::sleep(Duration::from_millis(40));
        assert!(pacer.time_real() > 0);
    }

    #[test]
    fn test_counter_is_monotonic() {
        let pacer = Pacer::start(Duration::from_millis(2));
        let mut last = 0;
        for _ in 0..10 {
            thread::sleep(Duration::from_millis(5));
            let now = pacer.time_real();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_wait_until_reaches_target() {
        let pacer = Pacer::start(Duration::from_millis(2));
        let target = 30_000_000; // 30ms
        pacer.wait_until(target);
        assert!(pacer.time_real() >= target);
    }

    #[test]
    fn test_wait_until_past_target_returns_immediately() {
        let pacer = Pacer::start(Duration::from_millis(2));
        thread::sleep(Duration::from_millis(10));
        let before = Instant::now();
        pacer.wait_until(1);
        assert!(before.elapsed() < Duration::from_millis(50));
    }
}
