mod calcom;
mod calcom_types;
mod config;
mod cron;
mod error;
mod gmail;
mod handlers;
mod log_sink;
mod orchestrator;
mod patients;
mod ports;
mod prompts;
mod reminders;
#[cfg(test)]
mod testing;
mod twilio;
mod twilio_types;
mod types;
mod ultravox;
mod ultravox_types;
mod utils;
mod workflow;

use crate::calcom::CalComClient;
use crate::config::Config;
use crate::cron::CronSpec;
use crate::gmail::GmailClient;
use crate::log_sink::{EventLog, SYSTEM_LOG_FILE};
use crate::orchestrator::CallOrchestrator;
use crate::patients::UnlistedPatients;
use crate::reminders::ReminderScheduler;
use crate::twilio::TwilioClient;
use crate::types::{AppState, SettingsHandle};
use crate::ultravox::UltravoxClient;
use crate::workflow::{EventPublisher, WebhookNotifier};

use anyhow::Context;
use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{error, info};
use tracing_subscriber::prelude::*;

pub mod consts {
    pub const NO_CALLER_APOLOGY: &str = "Sorry, we could not identify your number. Please try again.";
    pub const CONNECT_APOLOGY: &str =
        "Sorry, there was an error connecting your call. Please try again later.";
    pub const OUTBOUND_APOLOGY: &str = "Sorry, there was an error connecting this call.";
    pub const INBOUND_STREAM_NAME: &str = "Healthcare Appointment Assistant";
    pub const REMINDER_STREAM_NAME: &str = "Healthcare Appointment Reminder";
    pub const EMAIL_REMINDER_CRON: &str = "0 7 * * *";
    /// Longest an inbound call waits on the workflow webhook before the session is requested.
    pub const INBOUND_NOTIFY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);
}

/// Console output always; the JSON system log only once we know where it lives.
fn init_tracing(log_dir: Option<&Path>) -> std::io::Result<()> {
    let system_log = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(SYSTEM_LOG_FILE))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_file(true)
                .with_line_number(true),
        )
        .with(system_log)
        .with(tracing_subscriber::filter::Targets::new().with_targets([
            ("hyper", tracing_subscriber::filter::LevelFilter::OFF),
            ("clinic_calls", tracing_subscriber::filter::LevelFilter::DEBUG),
        ]));
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let config = Config::from_env();
    if let Err(e) = init_tracing(config.as_ref().ok().map(|c| c.log_dir.as_path())) {
        eprintln!("failed to initialise logging: {e}");
        std::process::exit(1);
    }
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "refusing to start");
            std::process::exit(1);
        }
    };
    if let Err(e) = run(config).await {
        error!(error = %format!("{e:#}"), "server stopped");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let http_client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("building HTTP client")?;

    let event_log = Arc::new(EventLog::new(config.log_dir.clone()));
    let notifier = Arc::new(WebhookNotifier::new(
        http_client.clone(),
        config.n8n_webhook_url.clone(),
    ));
    let events = Arc::new(EventPublisher::new(notifier, event_log.clone()));

    let orchestrator = Arc::new(CallOrchestrator::new(
        Arc::new(UltravoxClient::new(
            http_client.clone(),
            config.ultravox_api_key.clone(),
        )),
        Arc::new(TwilioClient::new(
            http_client.clone(),
            config.twilio_account_sid.clone(),
            config.twilio_auth_token.clone(),
        )),
        Arc::new(UnlistedPatients),
        events.clone(),
        &config.public_base_url,
        config.twilio_phone_number.clone(),
    ));

    let mailer = GmailClient::connect(
        http_client.clone(),
        config.gmail_client_id.clone(),
        config.gmail_client_secret.clone(),
        config.gmail_refresh_token.clone(),
        config.gmail_sender.clone(),
    )
    .await
    .context("building gmail authenticator")?;

    let settings = SettingsHandle::new(config.settings.clone());
    let email_trigger = CronSpec::parse(consts::EMAIL_REMINDER_CRON).map_err(anyhow::Error::msg)?;
    let scheduler = Arc::new(ReminderScheduler::new(
        Arc::new(CalComClient::new(
            http_client,
            config.calcom_api_key.clone(),
            config.calcom_event_type_id.clone(),
        )),
        Arc::new(mailer),
        orchestrator.clone(),
        events,
        settings.clone(),
        config.twilio_phone_number.clone(),
        config.call_pacing,
        email_trigger,
    ));
    let _reminder_loops = scheduler.spawn();

    let app_state = Arc::new(AppState {
        orchestrator,
        settings,
        event_log,
    });
    let app = handlers::routes(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, "listening");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .context("HTTP server failed")?;
    Ok(())
}
