//! Seams to the external collaborators.  Production implementations live in `ultravox`,
//! `twilio`, `calcom`, `gmail`, `workflow` and `patients`; tests swap in recording fakes.

use crate::error::ProviderError;
use crate::types::Appointment;
use crate::ultravox_types::CallConfig;
use crate::workflow::WorkflowEvent;

use chrono::NaiveDate;
use futures_util::future::BoxFuture;

pub type ProviderFuture<'a, T> = BoxFuture<'a, Result<T, ProviderError>>;

/// A freshly created AI voice session, addressed by its one-time join URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoiceSession {
    pub join_url: String,
}

pub trait VoiceSessionApi: Send + Sync {
    fn create_session(&self, config: CallConfig) -> ProviderFuture<'_, VoiceSession>;
}

/// Everything Twilio needs to dial a patient and hand the answered call back to us.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundCallRequest {
    pub to: String,
    pub from: String,
    pub answer_url: String,
    pub status_callback_url: String,
}

pub trait TelephonyApi: Send + Sync {
    /// Returns the provider call sid.
    fn place_call(&self, request: OutboundCallRequest) -> ProviderFuture<'_, String>;
}

pub trait SchedulingApi: Send + Sync {
    fn bookings_on(&self, date: NaiveDate) -> ProviderFuture<'_, Vec<Appointment>>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub trait Mailer: Send + Sync {
    fn send<'a>(&'a self, email: &'a OutgoingEmail) -> ProviderFuture<'a, ()>;
}

pub trait WorkflowNotifier: Send + Sync {
    fn notify<'a>(&'a self, event: &'a WorkflowEvent) -> ProviderFuture<'a, ()>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientRecord {
    pub name: Option<String>,
}

pub trait PatientDirectory: Send + Sync {
    /// `Ok(None)` means the number is not on file.
    fn find_by_phone<'a>(&'a self, phone: &'a str) -> ProviderFuture<'a, Option<PatientRecord>>;
}
