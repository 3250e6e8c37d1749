//! Per-request telemetry.
//!
//! # Responsibilities
//! - Describe each finished request as one `RequestRecord`
//! - Update the shared counters exactly once per record
//! - Fan the record out to the configured sinks
//!
//! # Design Decisions
//! - The relay owns no storage format; sinks decide what to keep
//! - The CSV sink only records hits and misses, matching its columns

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::net::IpAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::observability::metrics::{self, ProxyStats};

/// How a request was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Hit,
    Miss,
    Blocked,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Hit => "hit",
            Outcome::Miss => "miss",
            Outcome::Blocked => "blocked",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed or blocked request.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub timestamp: DateTime<Utc>,
    pub client_ip: IpAddr,
    pub method: String,
    pub url: String,
    pub status: String,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

impl RequestRecord {
    pub fn elapsed_ms(&self) -> u128 {
        self.elapsed.as_millis()
    }
}

/// Destination for request records.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, record: &RequestRecord);

    /// Push out anything buffered. Called on shutdown.
    fn flush(&self) {}
}

/// Emits one structured log event per request.
#[derive(Debug, Default)]
pub struct AccessLogSink;

impl TelemetrySink for AccessLogSink {
    fn record(&self, record: &RequestRecord) {
        tracing::info!(
            target: "forward_proxy::access",
            client = %record.client_ip,
            method = %record.method,
            url = %record.url,
            status = %record.status,
            outcome = %record.outcome,
            elapsed_ms = record.elapsed_ms() as u64,
            "request"
        );
    }
}

const CSV_HEADER: &str = "timestamp,url,cached,response_time_ms";

/// Appends `timestamp,url,cached,response_time_ms` rows to a file.
pub struct CsvTimingSink {
    writer: Mutex<BufWriter<File>>,
}

impl CsvTimingSink {
    /// Open `path` for appending; the header row is written only to an empty file.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_new = file.metadata()?.len() == 0;
        let mut writer = BufWriter::new(file);
        if is_new {
            writeln!(writer, "{}", CSV_HEADER)?;
            writer.flush()?;
        }
        tracing::info!(path = %path.display(), "Timing log opened");
        Ok(Self {
            writer: Mutex::new(writer),
        })
    }

    fn writer(&self) -> MutexGuard<'_, BufWriter<File>> {
        match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl TelemetrySink for CsvTimingSink {
    fn record(&self, record: &RequestRecord) {
        let cached = match record.outcome {
            Outcome::Hit => true,
            Outcome::Miss => false,
            Outcome::Blocked => return,
        };
        let row = format!(
            "{},{},{},{}",
            record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            csv_field(&record.url),
            cached,
            record.elapsed_ms()
        );
        if let Err(e) = writeln!(self.writer(), "{}", row) {
            tracing::warn!(error = %e, "Failed to append timing row");
        }
    }

    fn flush(&self) {
        if let Err(e) = self.writer().flush() {
            tracing::warn!(error = %e, "Failed to flush timing log");
        }
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Handle given to every relay: counters plus sinks.
#[derive(Clone)]
pub struct Telemetry {
    stats: Arc<ProxyStats>,
    sinks: Arc<Vec<Box<dyn TelemetrySink>>>,
}

impl Telemetry {
    pub fn new(stats: Arc<ProxyStats>, sinks: Vec<Box<dyn TelemetrySink>>) -> Self {
        Self {
            stats,
            sinks: Arc::new(sinks),
        }
    }

    pub fn record(&self, record: RequestRecord) {
        self.stats.record(record.outcome, record.elapsed);
        metrics::record_request(record.outcome, record.elapsed);
        for sink in self.sinks.iter() {
            sink.record(&record);
        }
    }

    pub fn flush(&self) {
        for sink in self.sinks.iter() {
            sink.flush();
        }
    }
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("stats", &self.stats)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
