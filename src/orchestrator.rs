//! Call session orchestration: what to ask of the voice and telephony providers for each
//! inbound call, outbound reminder, answered-call handoff, and status callback.

use crate::consts::{
    CONNECT_APOLOGY, INBOUND_NOTIFY_TIMEOUT, INBOUND_STREAM_NAME, NO_CALLER_APOLOGY, OUTBOUND_APOLOGY,
    REMINDER_STREAM_NAME,
};
use crate::ports::{OutboundCallRequest, PatientDirectory, TelephonyApi, VoiceSessionApi};
use crate::prompts::{inbound_prompt, reminder_prompt, PatientStatus};
use crate::twilio_types::{bridge_twiml, say_twiml, CallStatus, TwimlReply};
use crate::types::Appointment;
use crate::ultravox_types::CallConfig;
use crate::utils::timestamp_now;
use crate::workflow::{
    CallStatusData, EventPublisher, IncomingCallData, OutboundCallData, WorkflowEvent,
};

use chrono::Local;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct CallOrchestrator {
    voice: Arc<dyn VoiceSessionApi>,
    telephony: Arc<dyn TelephonyApi>,
    patients: Arc<dyn PatientDirectory>,
    events: Arc<EventPublisher>,
    /// Public origin Twilio uses to reach our webhooks, without a trailing slash
    public_base_url: String,
    /// Caller id for outbound calls
    clinic_number: String,
}

impl CallOrchestrator {
    pub fn new(
        voice: Arc<dyn VoiceSessionApi>,
        telephony: Arc<dyn TelephonyApi>,
        patients: Arc<dyn PatientDirectory>,
        events: Arc<EventPublisher>,
        public_base_url: &str,
        clinic_number: String,
    ) -> Self {
        Self {
            voice,
            telephony,
            patients,
            events,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            clinic_number,
        }
    }

    /// Answer an inbound call by bridging it to a freshly created voice session.
    pub async fn handle_inbound_call(
        &self,
        caller_number: Option<&str>,
        call_sid: Option<&str>,
    ) -> TwimlReply {
        let Some(caller_number) = caller_number.map(str::trim).filter(|n| !n.is_empty()) else {
            warn!(call_sid = ?call_sid, "incoming call without a From number");
            return TwimlReply::ok(say_twiml(NO_CALLER_APOLOGY));
        };
        info!(caller = %caller_number, call_sid = ?call_sid, "incoming call");

        let started = WorkflowEvent::IncomingCall(IncomingCallData {
            caller_number: caller_number.to_string(),
            call_sid: call_sid.map(str::to_string),
            timestamp: timestamp_now(),
        });
        if let Err(e) = self.events.publish_within(started, INBOUND_NOTIFY_TIMEOUT).await {
            warn!(error = %e, caller = %caller_number, "continuing call without workflow record");
        }

        let patient = self.patient_status(caller_number).await;
        let config = CallConfig::with_prompt(inbound_prompt(caller_number, &patient));
        match self.voice.create_session(config).await {
            Ok(session) => {
                info!(join_url = %session.join_url, call_sid = ?call_sid, "bridging inbound call");
                TwimlReply::ok(bridge_twiml(&session.join_url, INBOUND_STREAM_NAME))
            }
            Err(e) => {
                error!(error = %e, caller = %caller_number, "failed to create voice session for incoming call");
                TwimlReply::failed(say_twiml(CONNECT_APOLOGY))
            }
        }
    }

    async fn patient_status(&self, caller_number: &str) -> PatientStatus {
        match self.patients.find_by_phone(caller_number).await {
            Ok(Some(record)) => PatientStatus::Existing { name: record.name },
            Ok(None) => PatientStatus::New,
            Err(e) => {
                error!(error = %e, caller = %caller_number, "patient lookup failed");
                PatientStatus::New
            }
        }
    }

    /// Dial the appointment's patient with a reminder session.  `false` means the attempt was
    /// skipped or failed and has already been logged.
    pub async fn handle_outbound_reminder(&self, appointment: &Appointment) -> bool {
        let Some(patient_phone) = appointment.patient_phone() else {
            error!(appointment_id = %appointment.id, "no phone number found for appointment");
            return false;
        };
        let patient_name = appointment
            .patient()
            .map(|p| p.name.as_str())
            .unwrap_or_default();
        let start = appointment.start_time.with_timezone(&Local);
        let prompt = reminder_prompt(patient_name, &start, &appointment.title);

        info!(appointment_id = %appointment.id, "creating outbound reminder call");
        let session = match self.voice.create_session(CallConfig::with_prompt(prompt)).await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, appointment_id = %appointment.id, "failed to create voice session for reminder");
                return false;
            }
        };

        let answer_url = match self.outbound_connect_url(&session.join_url) {
            Some(url) => url,
            None => {
                error!(join_url = %session.join_url, "could not encode outbound connect url");
                return false;
            }
        };
        let request = OutboundCallRequest {
            to: patient_phone.to_string(),
            from: self.clinic_number.clone(),
            answer_url,
            status_callback_url: format!("{}/call-status", self.public_base_url),
        };
        let call_sid = match self.telephony.place_call(request).await {
            Ok(sid) => sid,
            Err(e) => {
                error!(error = %e, appointment_id = %appointment.id, "failed to place outbound call");
                return false;
            }
        };
        info!(call_sid = %call_sid, appointment_id = %appointment.id, "outbound call initiated");

        let initiated = WorkflowEvent::OutboundCall(OutboundCallData {
            appointment_id: appointment.id.clone(),
            patient_phone: patient_phone.to_string(),
            call_sid,
            timestamp: timestamp_now(),
        });
        // The call is already ringing; a lost workflow record doesn't undo it.
        let _ = self.events.publish(initiated).await;
        true
    }

    fn outbound_connect_url(&self, join_url: &str) -> Option<String> {
        let query = serde_urlencoded::to_string([("joinUrl", join_url)]).ok()?;
        Some(format!("{}/outbound-connect?{query}", self.public_base_url))
    }

    /// Bridge an answered outbound call to the session created when it was placed.
    pub fn connect_outbound_session(&self, join_url: Option<&str>) -> TwimlReply {
        match join_url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) if is_session_url(url) => {
                debug!(join_url = %url, "bridging outbound call");
                TwimlReply::ok(bridge_twiml(url, REMINDER_STREAM_NAME))
            }
            Some(url) => {
                error!(join_url = %url, "refusing to bridge outbound call to a non-session url");
                TwimlReply::ok(say_twiml(OUTBOUND_APOLOGY))
            }
            None => {
                error!("no joinUrl provided for outbound call");
                TwimlReply::ok(say_twiml(OUTBOUND_APOLOGY))
            }
        }
    }

    /// Record a provider status callback.  Never fails: the acknowledgement to Twilio does not
    /// depend on whether the record or the workflow notification went through.
    pub async fn record_call_status(&self, call_sid: Option<&str>, call_status: Option<&str>) {
        let Some(call_sid) = call_sid.filter(|s| !s.is_empty()) else {
            warn!(call_status = ?call_status, "status callback without CallSid");
            return;
        };
        let call_status = call_status.unwrap_or("unknown");
        match CallStatus::from_wire(call_status) {
            Some(status) if status.is_unreached() => {
                warn!(call_sid = %call_sid, status = status.as_str(), "call did not reach patient")
            }
            Some(status) => info!(call_sid = %call_sid, status = status.as_str(), "call status"),
            None => warn!(call_sid = %call_sid, status = %call_status, "unrecognized call status"),
        }

        let update = WorkflowEvent::CallStatusUpdate(CallStatusData {
            call_sid: call_sid.to_string(),
            call_status: call_status.to_string(),
            timestamp: timestamp_now(),
        });
        let _ = self.events.publish(update).await;
    }
}

/// Voice sessions are only ever joined over `wss://` or `https://`.
fn is_session_url(url: &str) -> bool {
    ["wss://", "https://"]
        .iter()
        .any(|scheme| {
            url.len() > scheme.len()
                && url
                    .get(..scheme.len())
                    .map_or(false, |prefix| prefix.eq_ignore_ascii_case(scheme))
        })
}
