use crate::error::ConfigError;
use crate::types::{CallTime, Settings};

use lettre::message::Mailbox;
use std::path::PathBuf;
use std::time::Duration;

pub const REQUIRED_VARS: &[&str] = &[
    "ULTRAVOX_API_KEY",
    "TWILIO_ACCOUNT_SID",
    "TWILIO_AUTH_TOKEN",
    "TWILIO_PHONE_NUMBER",
    "CALCOM_API_KEY",
    "CALCOM_EVENT_TYPE_ID",
    "GMAIL_CLIENT_ID",
    "GMAIL_CLIENT_SECRET",
    "GMAIL_REFRESH_TOKEN",
    "GMAIL_SENDER",
    "N8N_WEBHOOK_URL",
    "PUBLIC_BASE_URL",
];

#[derive(Clone, Debug)]
pub struct Config {
    pub ultravox_api_key: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_phone_number: String,
    pub calcom_api_key: String,
    pub calcom_event_type_id: String,
    pub gmail_client_id: String,
    pub gmail_client_secret: String,
    pub gmail_refresh_token: String,
    /// From mailbox on reminder emails, e.g. `Clinic <front-desk@clinic.example>`
    pub gmail_sender: Mailbox,
    pub n8n_webhook_url: String,
    /// Origin Twilio reaches us on; callback URLs for scheduled calls are built from it
    pub public_base_url: String,
    pub settings: Settings,
    pub port: u16,
    pub log_dir: PathBuf,
    pub http_timeout: Duration,
    pub call_pacing: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup.  Every missing required key is reported at once.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let missing: Vec<String> = REQUIRED_VARS
            .iter()
            .filter(|key| get(**key).is_none())
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }
        let required = |key: &str| get(key).unwrap_or_default();

        let reminder_hours_before = parse_or(&get, "REMINDER_HOURS_BEFORE", 24u32)?;
        let outbound_call_time = parse_or(&get, "OUTBOUND_CALL_TIME", CallTime { hour: 9, minute: 0 })?;
        let settings = Settings::new(reminder_hours_before, outbound_call_time)?;
        let gmail_sender = parse_required(&get, "GMAIL_SENDER")?;

        Ok(Self {
            ultravox_api_key: required("ULTRAVOX_API_KEY"),
            twilio_account_sid: required("TWILIO_ACCOUNT_SID"),
            twilio_auth_token: required("TWILIO_AUTH_TOKEN"),
            twilio_phone_number: required("TWILIO_PHONE_NUMBER"),
            calcom_api_key: required("CALCOM_API_KEY"),
            calcom_event_type_id: required("CALCOM_EVENT_TYPE_ID"),
            gmail_client_id: required("GMAIL_CLIENT_ID"),
            gmail_client_secret: required("GMAIL_CLIENT_SECRET"),
            gmail_refresh_token: required("GMAIL_REFRESH_TOKEN"),
            gmail_sender,
            n8n_webhook_url: required("N8N_WEBHOOK_URL"),
            public_base_url: required("PUBLIC_BASE_URL"),
            settings,
            port: parse_or(&get, "PORT", 3000u16)?,
            log_dir: get("LOG_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("logs")),
            http_timeout: Duration::from_secs(parse_or(&get, "HTTP_TIMEOUT_SECS", 15u64)?),
            call_pacing: Duration::from_secs(parse_or(&get, "CALL_PACING_SECS", 60u64)?),
        })
    }
}

fn parse_required<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get(key).ok_or_else(|| ConfigError::Missing(vec![key.to_string()]))?;
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key: key.to_string(),
        reason: format!("'{raw}': {e}"),
    })
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("'{raw}': {e}"),
        }),
    }
}
