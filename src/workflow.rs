use crate::error::ProviderError;
use crate::log_sink::{EventLog, LogStream};
use crate::ports::{ProviderFuture, WorkflowNotifier};
use crate::utils::send_checked;

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const WEBHOOK_SERVICE: &str = "workflow webhook";

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCallData {
    pub caller_number: String,
    pub call_sid: Option<String>,
    pub timestamp: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutboundCallData {
    pub appointment_id: String,
    pub patient_phone: String,
    pub call_sid: String,
    pub timestamp: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CallStatusData {
    pub call_sid: String,
    pub call_status: String,
    pub timestamp: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EmailReminderData {
    pub appointment_id: String,
    pub patient_email: Option<String>,
    pub success: bool,
    pub timestamp: String,
}

/// Structured event posted to the automation webhook as `{"eventType": ..., "data": {...}}`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "eventType", content = "data", rename_all = "camelCase")]
pub enum WorkflowEvent {
    IncomingCall(IncomingCallData),
    OutboundCall(OutboundCallData),
    CallStatusUpdate(CallStatusData),
    EmailReminderSent(EmailReminderData),
}

impl WorkflowEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            WorkflowEvent::IncomingCall(_) => "incomingCall",
            WorkflowEvent::OutboundCall(_) => "outboundCall",
            WorkflowEvent::CallStatusUpdate(_) => "callStatusUpdate",
            WorkflowEvent::EmailReminderSent(_) => "emailReminderSent",
        }
    }

    pub fn log_stream(&self) -> LogStream {
        match self {
            WorkflowEvent::IncomingCall(_) => LogStream::IncomingCalls,
            WorkflowEvent::OutboundCall(_) => LogStream::OutboundCalls,
            WorkflowEvent::CallStatusUpdate(_) => LogStream::CallStatus,
            WorkflowEvent::EmailReminderSent(_) => LogStream::Emails,
        }
    }

    /// The event's data flattened alongside its `eventType`, as stored in the event logs.
    pub fn to_log_record(&self) -> Value {
        let mut data = match serde_json::to_value(self) {
            Ok(Value::Object(mut wrapper)) => wrapper.remove("data").unwrap_or(Value::Null),
            _ => Value::Null,
        };
        if let Some(obj) = data.as_object_mut() {
            obj.insert(
                "eventType".to_string(),
                Value::String(self.event_type().to_string()),
            );
        }
        data
    }
}

/// Posts events to the configured n8n webhook.
pub struct WebhookNotifier {
    http_client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(http_client: reqwest::Client, url: String) -> Self {
        Self { http_client, url }
    }
}

impl WorkflowNotifier for WebhookNotifier {
    fn notify<'a>(&'a self, event: &'a WorkflowEvent) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            let rq = self.http_client.post(&self.url).json(event);
            send_checked(WEBHOOK_SERVICE, rq).await?;
            Ok(())
        })
    }
}

/// Records an event in its log, then forwards it to the workflow webhook.  The log append is
/// best-effort; the notify outcome is handed back so callers can choose to act on it.
pub struct EventPublisher {
    notifier: Arc<dyn WorkflowNotifier>,
    event_log: Arc<EventLog>,
}

impl EventPublisher {
    pub fn new(notifier: Arc<dyn WorkflowNotifier>, event_log: Arc<EventLog>) -> Self {
        Self {
            notifier,
            event_log,
        }
    }

    pub async fn publish(&self, event: WorkflowEvent) -> Result<(), ProviderError> {
        self.record(&event).await;
        self.notify(&event).await
    }

    /// As `publish`, but gives up on the webhook after `limit`.  The log record is always written.
    pub async fn publish_within(
        &self,
        event: WorkflowEvent,
        limit: Duration,
    ) -> Result<(), ProviderError> {
        self.record(&event).await;
        match tokio::time::timeout(limit, self.notify(&event)).await {
            Ok(res) => res,
            Err(_) => {
                warn!(event_type = event.event_type(), ?limit, "workflow webhook timed out");
                Err(ProviderError::TimedOut {
                    service: WEBHOOK_SERVICE,
                    after: limit,
                })
            }
        }
    }

    async fn record(&self, event: &WorkflowEvent) {
        let stream = event.log_stream();
        if let Err(e) = self.event_log.append(stream, &event.to_log_record()).await {
            warn!(error = %e, log = stream.file_name(), "failed to append event log");
        }
    }

    async fn notify(&self, event: &WorkflowEvent) -> Result<(), ProviderError> {
        let res = self.notifier.notify(event).await;
        match &res {
            Ok(()) => info!(event_type = event.event_type(), "workflow triggered"),
            Err(e) => error!(error = %e, event_type = event.event_type(), "failed to trigger workflow"),
        }
        res
    }
}
