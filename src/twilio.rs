use crate::ports::{OutboundCallRequest, ProviderFuture, TelephonyApi};
use crate::twilio_types::CallResource;
use crate::utils::send_json;

use tracing::info;

const SERVICE: &str = "twilio";

/// Status transitions Twilio should report back to `/call-status`.
const STATUS_CALLBACK_EVENTS: &[&str] = &["initiated", "ringing", "answered", "completed"];

pub struct TwilioClient {
    http_client: reqwest::Client,
    account_sid: String,
    auth_token: String,
}

impl TwilioClient {
    pub fn new(http_client: reqwest::Client, account_sid: String, auth_token: String) -> Self {
        Self {
            http_client,
            account_sid,
            auth_token,
        }
    }
}

/// Form body for `Calls.json`.  `StatusCallbackEvent` is repeated once per event.
pub fn call_form(request: &OutboundCallRequest) -> Vec<(&'static str, &str)> {
    let mut form = vec![
        ("To", request.to.as_str()),
        ("From", request.from.as_str()),
        ("Url", request.answer_url.as_str()),
        ("StatusCallback", request.status_callback_url.as_str()),
        ("StatusCallbackMethod", "POST"),
    ];
    form.extend(STATUS_CALLBACK_EVENTS.iter().map(|e| ("StatusCallbackEvent", *e)));
    form
}

impl TelephonyApi for TwilioClient {
    fn place_call(&self, request: OutboundCallRequest) -> ProviderFuture<'_, String> {
        Box::pin(async move {
            let account_sid = &self.account_sid;
            let url = format!("https://api.twilio.com/2010-04-01/Accounts/{account_sid}/Calls.json");
            let rq = self
                .http_client
                .post(url)
                .basic_auth(account_sid, Some(&self.auth_token))
                .form(&call_form(&request));
            let call: CallResource = send_json(SERVICE, rq).await?;
            info!(call_sid = %call.sid, to = %request.to, "twilio outbound call created");
            Ok(call.sid)
        })
    }
}
