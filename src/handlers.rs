use crate::log_sink::{CallFilter, SystemLevel};
use crate::twilio_types::{CallStatusForm, IncomingCallForm, TwimlReply};
use crate::types::{AppState, CallTime, Settings};

use axum::{
    extract::{rejection::QueryRejection, Query, RawQuery, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, trace, warn};

pub fn routes(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/incoming", post(incoming_call))
        .route("/outbound-connect", post(outbound_connect))
        .route("/call-status", post(call_status))
        .route("/admin/settings", get(get_settings).post(update_settings))
        .route("/api/logs/calls", get(call_logs))
        .route("/api/logs/emails", get(email_logs))
        .route("/api/logs/system", get(system_logs))
        .route("/", get(|| async { "Healthcare appointment line" }))
        .with_state(app_state)
}

/// Parse a Twilio form body, falling back to an empty form so the call still gets TwiML back.
fn parse_form<T: for<'de> Deserialize<'de> + Default>(body: &str) -> T {
    match serde_urlencoded::from_str::<T>(body) {
        Ok(form) => form,
        Err(e) => {
            error!(error = %e, "failed to deserialize Twilio form payload");
            T::default()
        }
    }
}

pub async fn incoming_call(State(app_state): State<Arc<AppState>>, body: String) -> TwimlReply {
    trace!(body = %body, "incoming call request body");
    let form: IncomingCallForm = parse_form(&body);
    trace!(to = ?form.to, "incoming call destination");
    app_state
        .orchestrator
        .handle_inbound_call(form.from.as_deref(), form.call_sid.as_deref())
        .await
}

/// First `joinUrl` in the query string, read leniently so a malformed query still gets TwiML.
fn join_url_param(query: Option<&str>) -> Option<String> {
    let pairs: Vec<(String, String)> = match serde_urlencoded::from_str(query?) {
        Ok(pairs) => pairs,
        Err(e) => {
            warn!(error = %e, "unreadable outbound-connect query");
            return None;
        }
    };
    pairs
        .into_iter()
        .find(|(key, _)| key == "joinUrl")
        .map(|(_, value)| value)
}

pub async fn outbound_connect(
    State(app_state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> TwimlReply {
    let join_url = join_url_param(query.as_deref());
    app_state
        .orchestrator
        .connect_outbound_session(join_url.as_deref())
}

pub async fn call_status(State(app_state): State<Arc<AppState>>, body: String) -> StatusCode {
    let form: CallStatusForm = parse_form(&body);
    app_state
        .orchestrator
        .record_call_status(form.call_sid.as_deref(), form.call_status.as_deref())
        .await;
    StatusCode::OK
}

pub async fn get_settings(State(app_state): State<Arc<AppState>>) -> Json<Settings> {
    Json(app_state.settings.current())
}

fn settings_error(message: String) -> (StatusCode, Json<Value>) {
    warn!(%message, "rejected settings update");
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "message": message })),
    )
}

/// Accepts a JSON number or a numeric string.
fn parse_hours(raw: &Value) -> Result<u32, String> {
    let hours = match raw {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    match hours {
        Some(h) if h > 0 => Ok(h),
        _ => Err(format!("reminderHoursBefore must be a positive whole number, got {raw}")),
    }
}

pub async fn update_settings(
    State(app_state): State<Arc<AppState>>,
    body: String,
) -> (StatusCode, Json<Value>) {
    let update: Value = match serde_json::from_str(&body) {
        Ok(v @ Value::Object(_)) => v,
        Ok(_) => return settings_error("expected a JSON object".to_string()),
        Err(e) => return settings_error(format!("invalid JSON body: {e}")),
    };

    let hours = match update.get("reminderHoursBefore").filter(|v| !v.is_null()) {
        Some(raw) => match parse_hours(raw) {
            Ok(h) => Some(h),
            Err(message) => return settings_error(message),
        },
        None => None,
    };
    let call_time = match update.get("outboundCallTime").filter(|v| !v.is_null()) {
        Some(Value::String(s)) => match s.parse::<CallTime>() {
            Ok(t) => Some(t),
            Err(reason) => return settings_error(format!("outboundCallTime: {reason}")),
        },
        Some(other) => {
            return settings_error(format!("outboundCallTime must be an \"HH:MM\" string, got {other}"))
        }
        None => None,
    };

    let settings = app_state.settings.update(|s| {
        if let Some(h) = hours {
            s.reminder_hours_before = h;
        }
        if let Some(t) = call_time {
            s.outbound_call_time = t;
        }
    });
    info!(
        reminder_hours_before = settings.reminder_hours_before,
        outbound_call_time = %settings.outbound_call_time,
        "admin settings updated"
    );
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "Settings updated successfully",
            "settings": settings,
        })),
    )
}

#[derive(Deserialize, Debug, Default)]
pub struct LogQuery {
    pub filter: Option<String>,
    pub level: Option<String>,
}

fn log_response(result: std::io::Result<Vec<Value>>, what: &str) -> axum::response::Response {
    match result {
        Ok(logs) => Json(logs).into_response(),
        Err(e) => {
            error!(error = %e, "error retrieving {what}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("Failed to retrieve {what}") })),
            )
                .into_response()
        }
    }
}

fn bad_query(message: String) -> axum::response::Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

pub async fn call_logs(
    State(app_state): State<Arc<AppState>>,
    query: Result<Query<LogQuery>, QueryRejection>,
) -> axum::response::Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => return bad_query(rejection.body_text()),
    };
    let filter = match query.filter.as_deref().unwrap_or("all").parse::<CallFilter>() {
        Ok(f) => f,
        Err(message) => return bad_query(message),
    };
    log_response(app_state.event_log.call_logs(filter).await, "call logs")
}

pub async fn email_logs(State(app_state): State<Arc<AppState>>) -> axum::response::Response {
    log_response(app_state.event_log.email_logs().await, "email logs")
}

pub async fn system_logs(
    State(app_state): State<Arc<AppState>>,
    query: Result<Query<LogQuery>, QueryRejection>,
) -> axum::response::Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => return bad_query(rejection.body_text()),
    };
    let level = match query.level.as_deref().unwrap_or("all").parse::<SystemLevel>() {
        Ok(l) => l,
        Err(message) => return bad_query(message),
    };
    log_response(app_state.event_log.system_logs(level).await, "system logs")
}
