//! Federation broker CLI.
//!
//! ```bash
//! # Two simulators, free-running simulated time
//! cosim-broker 2
//!
//! # Three simulators, simulated clock paced against the wall clock
//! cosim-broker 3 100ms
//! ```
//!
//! The bind endpoint comes from `FNCS_BROKER` (default `tcp://*:5570`);
//! setting `FNCS_TRACE` to a Y/T value dumps every routed publish to
//! `broker_trace.txt` in the working directory.

use clap::Parser;
use cosim_broker::{trace_flag, Broker, BrokerConfig};
use cosim_transport_zmq::ZmqRouter;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_ENDPOINT: &str = "tcp://*:5570";
const TRACE_FILE: &str = "broker_trace.txt";

/// Central coordination broker for a simulator federation.
#[derive(Parser, Debug)]
#[command(name = "cosim-broker")]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of simulators that will join the federation
    expected_members: usize,

    /// Wall-clock pacing interval (e.g. "100ms", "1s"); omit to let
    /// simulated time run free
    realtime_interval: Option<humantime::Duration>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if args.expected_members == 0 {
        error!("number of simulators must be >= 1");
        return ExitCode::FAILURE;
    }

    let endpoint = std::env::var("FNCS_BROKER").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
    let trace_path = match std::env::var("FNCS_TRACE") {
        Ok(value) if trace_flag(&value) => Some(PathBuf::from(TRACE_FILE)),
        _ => None,
    };

    let socket = match ZmqRouter::bind(&endpoint) {
        Ok(socket) => socket,
        Err(e) => {
            error!(error = %e, "socket creation failed");
            return ExitCode::FAILURE;
        }
    };
    info!(endpoint = %endpoint, "broker socket bound");

    let config = BrokerConfig {
        expected_members: args.expected_members,
        realtime_interval: args.realtime_interval.map(Into::into),
        trace_path,
    };

    let mut broker = match Broker::new(socket, config) {
        Ok(broker) => broker,
        Err(e) => {
            error!(error = %e, "broker startup failed");
            return ExitCode::FAILURE;
        }
    };

    match broker.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "broker terminated abnormally");
            ExitCode::FAILURE
        }
    }
}
