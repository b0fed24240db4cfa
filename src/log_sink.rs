//! Append-only event logs, one JSON object per line, and the newest-first queries the admin
//! API serves from them.

use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// Written by the tracing JSON layer, read back as the system log.
pub const SYSTEM_LOG_FILE: &str = "combined.log";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogStream {
    IncomingCalls,
    OutboundCalls,
    CallStatus,
    Emails,
}

impl LogStream {
    pub fn file_name(self) -> &'static str {
        match self {
            LogStream::IncomingCalls => "call_logs.json",
            LogStream::OutboundCalls => "outbound_call_logs.json",
            LogStream::CallStatus => "call_status_logs.json",
            LogStream::Emails => "email_logs.json",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallFilter {
    All,
    Incoming,
    Outbound,
}

impl FromStr for CallFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(CallFilter::All),
            "incoming" => Ok(CallFilter::Incoming),
            "outbound" => Ok(CallFilter::Outbound),
            other => Err(format!("unknown call filter '{other}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SystemLevel {
    All,
    Info,
    Warn,
    Error,
}

impl SystemLevel {
    fn matches(self, record: &Value) -> bool {
        let wanted = match self {
            SystemLevel::All => return true,
            SystemLevel::Info => "info",
            SystemLevel::Warn => "warn",
            SystemLevel::Error => "error",
        };
        record
            .get("level")
            .and_then(Value::as_str)
            .map(|l| l.eq_ignore_ascii_case(wanted))
            .unwrap_or(false)
    }
}

impl FromStr for SystemLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(SystemLevel::All),
            "info" => Ok(SystemLevel::Info),
            "warn" => Ok(SystemLevel::Warn),
            "error" => Ok(SystemLevel::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

pub struct EventLog {
    dir: PathBuf,
    // Serializes appends so lines from concurrent writers never interleave.
    append_lock: Mutex<()>,
}

impl EventLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn system_log_path(&self) -> PathBuf {
        self.dir.join(SYSTEM_LOG_FILE)
    }

    pub async fn append(&self, stream: LogStream, record: &Value) -> io::Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let _guard = self.append_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(stream.file_name()))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    pub async fn read(&self, stream: LogStream) -> io::Result<Vec<Value>> {
        read_records(&self.dir.join(stream.file_name())).await
    }

    /// Incoming and/or outbound call records, each annotated with the newest known
    /// `callStatus` for its `callSid`.
    pub async fn call_logs(&self, filter: CallFilter) -> io::Result<Vec<Value>> {
        let mut logs = Vec::new();
        if matches!(filter, CallFilter::All | CallFilter::Incoming) {
            logs.extend(self.read(LogStream::IncomingCalls).await?);
        }
        if matches!(filter, CallFilter::All | CallFilter::Outbound) {
            logs.extend(self.read(LogStream::OutboundCalls).await?);
        }
        let statuses = self.read(LogStream::CallStatus).await?;
        for log in logs.iter_mut() {
            let Some(sid) = log.get("callSid").and_then(Value::as_str) else {
                continue;
            };
            if let Some(status) = status_for(&statuses, sid) {
                let status = status.to_string();
                if let Some(obj) = log.as_object_mut() {
                    obj.insert("callStatus".to_string(), Value::String(status));
                }
            }
        }
        sort_newest_first(&mut logs);
        Ok(logs)
    }

    pub async fn email_logs(&self) -> io::Result<Vec<Value>> {
        self.read(LogStream::Emails).await
    }

    pub async fn system_logs(&self, level: SystemLevel) -> io::Result<Vec<Value>> {
        let mut logs = read_records(&self.system_log_path()).await?;
        logs.retain(|r| level.matches(r));
        Ok(logs)
    }

    /// Derived view over the status log: duplicate deliveries of a status collapse to the same
    /// answer.
    pub async fn latest_call_status(&self, call_sid: &str) -> io::Result<Option<String>> {
        let statuses = self.read(LogStream::CallStatus).await?;
        Ok(status_for(&statuses, call_sid).map(str::to_string))
    }
}

/// `statuses` must already be newest-first.
fn status_for<'a>(statuses: &'a [Value], call_sid: &str) -> Option<&'a str> {
    statuses
        .iter()
        .find(|s| s.get("callSid").and_then(Value::as_str) == Some(call_sid))
        .and_then(|s| s.get("callStatus"))
        .and_then(Value::as_str)
}

async fn read_records(path: &Path) -> io::Result<Vec<Value>> {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut records: Vec<Value> = data
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "skipping unreadable log line");
                None
            }
        })
        .collect();
    sort_newest_first(&mut records);
    Ok(records)
}

fn record_time(record: &Value) -> Option<DateTime<FixedOffset>> {
    record
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
}

// Records without a parseable timestamp sink to the end.
fn sort_newest_first(records: &mut [Value]) {
    records.sort_by(|a, b| record_time(b).cmp(&record_time(a)));
}
