//! Recording fakes for the provider ports.

use crate::error::ProviderError;
use crate::log_sink::EventLog;
use crate::orchestrator::CallOrchestrator;
use crate::patients::UnlistedPatients;
use crate::ports::{
    Mailer, OutboundCallRequest, OutgoingEmail, ProviderFuture, SchedulingApi, TelephonyApi,
    VoiceSession, VoiceSessionApi, WorkflowNotifier,
};
use crate::types::{Appointment, Attendee};
use crate::ultravox_types::CallConfig;
use crate::workflow::{EventPublisher, WorkflowEvent};

use chrono::{NaiveDate, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::time::Instant;

pub const BASE_URL: &str = "https://clinic.example";
pub const CLINIC_NUMBER: &str = "+15559990000";

fn upstream_down(service: &'static str) -> ProviderError {
    ProviderError::Status {
        service,
        status: 503,
        body: "unavailable".to_string(),
    }
}

pub fn appointment(id: &str, phone: Option<&str>) -> Appointment {
    Appointment {
        id: id.to_string(),
        title: "Follow-up Visit".to_string(),
        start_time: Utc.with_ymd_and_hms(2026, 10, 17, 15, 0, 0).unwrap(),
        attendees: vec![Attendee {
            name: "Pat Doe".to_string(),
            email: Some(format!("{id}@example.com")),
            phone: phone.map(str::to_string),
        }],
    }
}

pub struct RecordingVoice {
    join_url: String,
    fail: bool,
    configs: Mutex<Vec<CallConfig>>,
    started_at: Mutex<Vec<Instant>>,
}

impl RecordingVoice {
    pub fn new(join_url: &str) -> Self {
        Self {
            join_url: join_url.to_string(),
            fail: false,
            configs: Mutex::new(Vec::new()),
            started_at: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("")
        }
    }

    pub fn configs(&self) -> Vec<CallConfig> {
        self.configs.lock().unwrap().clone()
    }

    pub fn started_at(&self) -> Vec<Instant> {
        self.started_at.lock().unwrap().clone()
    }
}

impl VoiceSessionApi for RecordingVoice {
    fn create_session(&self, config: CallConfig) -> ProviderFuture<'_, VoiceSession> {
        Box::pin(async move {
            self.started_at.lock().unwrap().push(Instant::now());
            self.configs.lock().unwrap().push(config);
            if self.fail {
                return Err(upstream_down("ultravox"));
            }
            Ok(VoiceSession {
                join_url: self.join_url.clone(),
            })
        })
    }
}

#[derive(Default)]
pub struct RecordingTelephony {
    fail: bool,
    requests: Mutex<Vec<OutboundCallRequest>>,
}

impl RecordingTelephony {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<OutboundCallRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl TelephonyApi for RecordingTelephony {
    fn place_call(&self, request: OutboundCallRequest) -> ProviderFuture<'_, String> {
        Box::pin(async move {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            if self.fail {
                return Err(upstream_down("twilio"));
            }
            Ok(format!("CA-fake-{}", requests.len()))
        })
    }
}

#[derive(Default)]
pub struct RecordingWorkflow {
    fail: bool,
    stall: bool,
    events: Mutex<Vec<WorkflowEvent>>,
}

impl RecordingWorkflow {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Records the event, then never answers.
    pub fn stalled() -> Self {
        Self {
            stall: true,
            ..Default::default()
        }
    }

    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl WorkflowNotifier for RecordingWorkflow {
    fn notify<'a>(&'a self, event: &'a WorkflowEvent) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.events.lock().unwrap().push(event.clone());
            if self.stall {
                std::future::pending::<()>().await;
            }
            if self.fail {
                return Err(upstream_down("workflow webhook"));
            }
            Ok(())
        })
    }
}

/// Scheduling service returning a fixed listing for every date.
pub struct StaticScheduling {
    appointments: Option<Vec<Appointment>>,
    dates: Mutex<Vec<NaiveDate>>,
}

impl StaticScheduling {
    pub fn new(appointments: Vec<Appointment>) -> Self {
        Self {
            appointments: Some(appointments),
            dates: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            appointments: None,
            dates: Mutex::new(Vec::new()),
        }
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.dates.lock().unwrap().clone()
    }
}

impl SchedulingApi for StaticScheduling {
    fn bookings_on(&self, date: NaiveDate) -> ProviderFuture<'_, Vec<Appointment>> {
        Box::pin(async move {
            self.dates.lock().unwrap().push(date);
            self.appointments
                .clone()
                .ok_or_else(|| upstream_down("cal.com"))
        })
    }
}

/// Mailer that rejects any address listed in `reject`.
#[derive(Default)]
pub struct RecordingMailer {
    reject: Vec<String>,
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl RecordingMailer {
    pub fn rejecting(addresses: &[&str]) -> Self {
        Self {
            reject: addresses.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

impl Mailer for RecordingMailer {
    fn send<'a>(&'a self, email: &'a OutgoingEmail) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            if self.reject.contains(&email.to) {
                return Err(upstream_down("gmail"));
            }
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        })
    }
}

/// One set of fakes plus a private event log directory.
pub struct Fakes {
    pub voice: Arc<RecordingVoice>,
    pub telephony: Arc<RecordingTelephony>,
    pub workflow: Arc<RecordingWorkflow>,
    pub event_log: Arc<EventLog>,
    _dir: TempDir,
}

impl Fakes {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self {
            voice: Arc::new(RecordingVoice::new("wss://voice.example/join/1")),
            telephony: Arc::new(RecordingTelephony::default()),
            workflow: Arc::new(RecordingWorkflow::default()),
            event_log: Arc::new(EventLog::new(dir.path())),
            _dir: dir,
        }
    }

    pub fn with_join_url(mut self, join_url: &str) -> Self {
        self.voice = Arc::new(RecordingVoice::new(join_url));
        self
    }

    pub fn with_failing_voice(mut self) -> Self {
        self.voice = Arc::new(RecordingVoice::failing());
        self
    }

    pub fn with_failing_telephony(mut self) -> Self {
        self.telephony = Arc::new(RecordingTelephony::failing());
        self
    }

    pub fn with_failing_workflow(mut self) -> Self {
        self.workflow = Arc::new(RecordingWorkflow::failing());
        self
    }

    pub fn with_stalled_workflow(mut self) -> Self {
        self.workflow = Arc::new(RecordingWorkflow::stalled());
        self
    }

    pub fn publisher(&self) -> Arc<EventPublisher> {
        Arc::new(EventPublisher::new(
            self.workflow.clone(),
            self.event_log.clone(),
        ))
    }

    pub fn orchestrator(&self) -> CallOrchestrator {
        CallOrchestrator::new(
            self.voice.clone(),
            self.telephony.clone(),
            Arc::new(UnlistedPatients),
            self.publisher(),
            BASE_URL,
            CLINIC_NUMBER.to_string(),
        )
    }
}
