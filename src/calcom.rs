use crate::calcom_types::appointments_from_listing;
use crate::error::ProviderError;
use crate::ports::{ProviderFuture, SchedulingApi};
use crate::types::Appointment;
use crate::utils::send_json;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::debug;

pub const CALCOM_API_URL: &str = "https://api.cal.com/v1";
const SERVICE: &str = "cal.com";

pub struct CalComClient {
    http_client: reqwest::Client,
    api_key: String,
    event_type_id: String,
}

impl CalComClient {
    pub fn new(http_client: reqwest::Client, api_key: String, event_type_id: String) -> Self {
        Self {
            http_client,
            api_key,
            event_type_id,
        }
    }

    /// Bookings of the clinic's event type on `date`.
    fn bookings_request(&self, date: NaiveDate) -> reqwest::RequestBuilder {
        let date = date.format("%Y-%m-%d").to_string();
        self.http_client
            .get(format!("{CALCOM_API_URL}/bookings"))
            .bearer_auth(&self.api_key)
            .query(&[
                ("date", date.as_str()),
                ("eventTypeId", self.event_type_id.as_str()),
            ])
    }
}

impl SchedulingApi for CalComClient {
    fn bookings_on(&self, date: NaiveDate) -> ProviderFuture<'_, Vec<Appointment>> {
        Box::pin(async move {
            debug!(%date, event_type_id = %self.event_type_id, "fetching cal.com bookings");
            let listing: Value = send_json(SERVICE, self.bookings_request(date)).await?;
            appointments_from_listing(listing).map_err(|reason| ProviderError::Decode {
                service: SERVICE,
                reason,
            })
        })
    }
}
