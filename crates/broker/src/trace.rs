//! Publish trace file writer.
//!
//! When `FNCS_TRACE` enables tracing, every inbound PUBLISH is appended to
//! `broker_trace.txt` as `<time_granted>\t<topic>\t<value>` under a
//! `#nanoseconds\ttopic\tvalue` header line.

use cosim_types::SimTime;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Truthy prefixes for the `FNCS_TRACE` environment variable.
pub fn trace_flag(value: &str) -> bool {
    matches!(value.as_bytes().first(), Some(b'Y' | b'y' | b'T' | b't'))
}

/// Append-only sink for delivered publishes.
pub struct TraceWriter {
    out: BufWriter<File>,
}

impl TraceWriter {
    /// Create the trace file and write the header line.
    pub fn create(path: &Path) -> io::Result<TraceWriter> {
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "#nanoseconds\ttopic\tvalue")?;
        Ok(TraceWriter { out })
    }

    /// Record one publish. The value is written lossily when not UTF-8.
    pub fn record(&mut self, time_granted: SimTime, topic: &str, value: &[u8]) -> io::Result<()> {
        writeln!(
            self.out,
            "{}\t{}\t{}",
            time_granted,
            topic,
            String::from_utf8_lossy(value)
        )
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl Drop for TraceWriter {
    fn drop(&mut self) {
        let _ = self.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_trace_flag_prefixes() {
        for yes in ["Y", "yes", "TRUE", "t", "Yaffirmative"] {
            assert!(trace_flag(yes), "{yes} should enable tracing");
        }
        for no in ["", "N", "no", "0", "false", "1"] {
            assert!(!trace_flag(no), "{no} should not enable tracing");
        }
    }

    #[test]
    fn test_header_and_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broker_trace.txt");
        {
            let mut writer = TraceWriter::create(&path).unwrap();
            writer.record(0, "topic/x", b"value1").unwrap();
            writer.record(1_000_000_000, "topic/y", b"13.7").unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "#nanoseconds\ttopic\tvalue\n0\ttopic/x\tvalue1\n1000000000\ttopic/y\t13.7\n"
        );
    }
}
