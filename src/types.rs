use crate::error::ConfigError;
use crate::log_sink::EventLog;
use crate::orchestrator::CallOrchestrator;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attendee {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A booking as fetched from the scheduling service.  Never cached; every run fetches fresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Appointment {
    pub id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub attendees: Vec<Attendee>,
}

impl Appointment {
    /// The patient is the first attendee on the booking.
    pub fn patient(&self) -> Option<&Attendee> {
        self.attendees.first()
    }

    pub fn patient_phone(&self) -> Option<&str> {
        self.patient()
            .and_then(|a| a.phone.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    pub fn patient_email(&self) -> Option<&str> {
        self.patient()
            .and_then(|a| a.email.as_deref())
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

/// Local time of day, written `HH:MM`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallTime {
    pub hour: u32,
    pub minute: u32,
}

impl FromStr for CallTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("expected HH:MM, got '{s}'"))?;
        let hour: u32 = h.parse().map_err(|_| format!("bad hour in '{s}'"))?;
        let minute: u32 = m.parse().map_err(|_| format!("bad minute in '{s}'"))?;
        if hour > 23 || minute > 59 {
            return Err(format!("'{s}' is not a valid time of day"));
        }
        Ok(Self { hour, minute })
    }
}

impl fmt::Display for CallTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl Serialize for CallTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Runtime-tunable reminder settings.  Held in memory only; a restart reverts to the values
/// from the environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub reminder_hours_before: u32,
    pub outbound_call_time: CallTime,
}

impl Settings {
    pub fn new(reminder_hours_before: u32, outbound_call_time: CallTime) -> Result<Self, ConfigError> {
        if reminder_hours_before == 0 {
            return Err(ConfigError::Invalid {
                key: "REMINDER_HOURS_BEFORE".to_string(),
                reason: "must be a positive number of hours".to_string(),
            });
        }
        Ok(Self {
            reminder_hours_before,
            outbound_call_time,
        })
    }
}

/// Shared handle to the live `Settings`.  Writers are last-write-wins; subscribers are woken on
/// every change.
#[derive(Clone)]
pub struct SettingsHandle {
    tx: Arc<watch::Sender<Settings>>,
}

impl SettingsHandle {
    pub fn new(settings: Settings) -> Self {
        let (tx, _rx) = watch::channel(settings);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Settings {
        *self.tx.borrow()
    }

    pub fn update(&self, f: impl FnOnce(&mut Settings)) -> Settings {
        self.tx.send_modify(f);
        self.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }
}

pub struct AppState {
    pub orchestrator: Arc<CallOrchestrator>,
    pub settings: SettingsHandle,
    pub event_log: Arc<EventLog>,
}
