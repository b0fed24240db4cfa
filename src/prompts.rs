use crate::ports::OutgoingEmail;
use crate::types::Appointment;

use chrono::{DateTime, TimeZone};
use std::fmt::Display;

pub const HEALTHCARE_SYSTEM_PROMPT: &str = "Your name is Dr. AI Assistant and you are handling calls for a healthcare clinic.

When speaking with patients:
1. Greet them warmly and introduce yourself as the clinic's appointment assistant.
2. Help patients with booking new appointments, rescheduling existing appointments, or canceling appointments.
3. For new appointments, collect:
   - Patient name
   - Reason for visit
   - Preferred date and time
   - Insurance information if applicable
4. For rescheduling, ask for:
   - Patient name
   - Current appointment details
   - Preferred new date and time
5. For cancellations, confirm:
   - Patient name
   - Appointment details to be canceled
   - Reason for cancellation (optional)

Always be professional, empathetic, and respectful of patient privacy.
Remind patients that this call may be recorded for quality assurance.
If you cannot assist with a specific request, offer to connect them with a human staff member.
";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatientStatus {
    New,
    Existing { name: Option<String> },
}

pub fn inbound_prompt(caller_number: &str, patient: &PatientStatus) -> String {
    let patient_line = match patient {
        PatientStatus::New => "- This may be a new patient.".to_string(),
        PatientStatus::Existing { name: Some(name) } => {
            format!("- This appears to be an existing patient: {name}.")
        }
        PatientStatus::Existing { name: None } => {
            "- This appears to be an existing patient.".to_string()
        }
    };
    format!(
        "{HEALTHCARE_SYSTEM_PROMPT}
IMPORTANT CONTEXT:
- The caller's phone number is: {caller_number}
{patient_line}

Your goal is to help the patient book, reschedule, or cancel an appointment. Collect all necessary information to complete their request."
    )
}

fn appointment_date<Tz: TimeZone>(start: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    start.format("%A, %B %-d, %Y").to_string()
}

fn appointment_time<Tz: TimeZone>(start: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    start.format("%-I:%M %p").to_string()
}

pub fn reminder_prompt<Tz: TimeZone>(
    patient_name: &str,
    start: &DateTime<Tz>,
    appointment_type: &str,
) -> String
where
    Tz::Offset: Display,
{
    format!(
        "{HEALTHCARE_SYSTEM_PROMPT}
IMPORTANT CONTEXT:
- This is an OUTBOUND call to remind a patient of their upcoming appointment.
- Patient Name: {patient_name}
- Appointment Date: {date}
- Appointment Time: {time}
- Appointment Type: {appointment_type}

Your goal is to:
1. Confirm the patient is aware of their upcoming appointment
2. Ask if they still plan to attend
3. If they need to reschedule, collect their preferred new date/time
4. If they need to cancel, confirm the cancellation
5. Thank them for their time",
        date = appointment_date(start),
        time = appointment_time(start),
    )
}

/// Reminder email for the appointment's patient, or `None` when no email is on the booking.
pub fn reminder_email<Tz: TimeZone>(
    appointment: &Appointment,
    tz: &Tz,
    clinic_phone: &str,
) -> Option<OutgoingEmail>
where
    Tz::Offset: Display,
{
    let to = appointment.patient_email()?.to_string();
    let name = appointment
        .patient()
        .map(|p| p.name.as_str())
        .filter(|n| !n.trim().is_empty())
        .unwrap_or("Patient");
    let start = appointment.start_time.with_timezone(tz);
    let body = format!(
        "Dear {name},

This is a friendly reminder about your upcoming appointment:

Date: {date}
Time: {time}

If you need to reschedule, please call our office at {clinic_phone}.

Thank you,
Healthcare Clinic
",
        date = appointment_date(&start),
        time = appointment_time(&start),
    );
    Some(OutgoingEmail {
        to,
        subject: format!("Appointment Reminder: {}", appointment.title),
        body,
    })
}
