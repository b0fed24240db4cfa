use crate::types::{Appointment, Attendee};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum BookingId {
    Number(i64),
    Text(String),
}

impl BookingId {
    fn into_string(self) -> String {
        match self {
            BookingId::Number(n) => n.to_string(),
            BookingId::Text(s) => s,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BookingAttendee {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "phoneNumber")]
    pub phone: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: BookingId,
    #[serde(default)]
    pub title: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub attendees: Vec<BookingAttendee>,
}

/// Booking listings come back either wrapped (`{"bookings": [...]}`) or bare.  Each booking is
/// decoded on its own so one malformed entry only costs that entry.
pub fn appointments_from_listing(listing: Value) -> Result<Vec<Appointment>, String> {
    let items = match listing {
        Value::Array(items) => items,
        Value::Object(mut wrapper) => match wrapper.remove("bookings") {
            Some(Value::Array(items)) => items,
            _ => return Err("booking listing has no \"bookings\" array".to_string()),
        },
        other => return Err(format!("unexpected booking listing: {other}")),
    };
    let appointments = items
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| match serde_json::from_value::<Booking>(item) {
            Ok(booking) => Some(Appointment::from(booking)),
            Err(e) => {
                warn!(index = idx, error = %e, "skipping malformed booking");
                None
            }
        })
        .collect();
    Ok(appointments)
}

impl From<Booking> for Appointment {
    fn from(b: Booking) -> Self {
        Appointment {
            id: b.id.into_string(),
            title: b.title,
            start_time: b.start_time,
            attendees: b
                .attendees
                .into_iter()
                .map(|a| Attendee {
                    name: a.name,
                    email: a.email,
                    phone: a.phone,
                })
                .collect(),
        }
    }
}
