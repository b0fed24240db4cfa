//! The two daily reminder runs and the trigger loops that fire them.

use crate::cron::CronSpec;
use crate::orchestrator::CallOrchestrator;
use crate::ports::{Mailer, SchedulingApi};
use crate::prompts::reminder_email;
use crate::types::SettingsHandle;
use crate::utils::timestamp_now;
use crate::workflow::{EmailReminderData, EventPublisher, WorkflowEvent};

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub considered: usize,
    pub succeeded: usize,
}

/// Calendar date (in `now`'s zone) of the instant `hours` from now.
pub fn reminder_target_date<Tz: TimeZone>(now: &DateTime<Tz>, hours: u32) -> NaiveDate {
    (now.clone() + chrono::Duration::hours(i64::from(hours))).date_naive()
}

/// Local wall time read once, then carried forward on tokio's monotonic clock so wall-clock
/// adjustments cannot replay a trigger.
#[derive(Clone, Copy, Debug)]
struct LoopClock {
    wall: DateTime<Local>,
    start: Instant,
}

impl LoopClock {
    fn start() -> Self {
        Self {
            wall: Local::now(),
            start: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Local> {
        let elapsed = chrono::Duration::from_std(self.start.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }

    async fn sleep_until(&self, at: &DateTime<Local>) {
        let offset = (*at - self.wall).to_std().unwrap_or_default();
        tokio::time::sleep_until(self.start + offset).await
    }

    /// Where to look for the next firing: never at or before the last one.
    fn search_from(&self, last_fired: Option<DateTime<Local>>) -> DateTime<Local> {
        let now = self.now();
        last_fired.map_or(now, |fired| fired.max(now))
    }
}

pub struct ReminderScheduler {
    scheduling: Arc<dyn SchedulingApi>,
    mailer: Arc<dyn Mailer>,
    orchestrator: Arc<CallOrchestrator>,
    events: Arc<EventPublisher>,
    settings: SettingsHandle,
    /// Number patients are told to call back on
    clinic_number: String,
    /// Minimum gap between the end of one outbound attempt and the start of the next
    pacing: Duration,
    email_trigger: CronSpec,
}

impl ReminderScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scheduling: Arc<dyn SchedulingApi>,
        mailer: Arc<dyn Mailer>,
        orchestrator: Arc<CallOrchestrator>,
        events: Arc<EventPublisher>,
        settings: SettingsHandle,
        clinic_number: String,
        pacing: Duration,
        email_trigger: CronSpec,
    ) -> Self {
        Self {
            scheduling,
            mailer,
            orchestrator,
            events,
            settings,
            clinic_number,
            pacing,
            email_trigger,
        }
    }

    /// Email every patient booked on `today`.  Each appointment yields exactly one
    /// `emailReminderSent` event whether or not the send worked.
    pub async fn run_email_reminders(&self, today: NaiveDate) -> RunSummary {
        info!(%today, "running scheduled task: send email reminders");
        let appointments = match self.scheduling.bookings_on(today).await {
            Ok(appointments) => appointments,
            Err(e) => {
                error!(error = %e, %today, "failed to fetch appointments for email reminders");
                return RunSummary::default();
            }
        };
        info!(count = appointments.len(), %today, "found appointments for today");

        let mut summary = RunSummary {
            considered: appointments.len(),
            succeeded: 0,
        };
        for appointment in &appointments {
            let sent = match reminder_email(appointment, &Local, &self.clinic_number) {
                Some(email) => match self.mailer.send(&email).await {
                    Ok(()) => {
                        info!(to = %email.to, appointment_id = %appointment.id, "email reminder sent");
                        true
                    }
                    Err(e) => {
                        error!(error = %e, appointment_id = %appointment.id, "failed to send email reminder");
                        false
                    }
                },
                None => {
                    warn!(appointment_id = %appointment.id, "no email address for appointment");
                    false
                }
            };
            if sent {
                summary.succeeded += 1;
            }
            let event = WorkflowEvent::EmailReminderSent(EmailReminderData {
                appointment_id: appointment.id.clone(),
                patient_email: appointment.patient_email().map(str::to_string),
                success: sent,
                timestamp: timestamp_now(),
            });
            let _ = self.events.publish(event).await;
        }
        summary
    }

    /// Call every patient booked on the date `reminder_hours_before` from `now`, one at a time,
    /// pausing `pacing` between attempts.
    pub async fn run_outbound_calls(&self, now: DateTime<Local>) -> RunSummary {
        info!("running scheduled task: make outbound reminder calls");
        let settings = self.settings.current();
        let date = reminder_target_date(&now, settings.reminder_hours_before);
        let appointments = match self.scheduling.bookings_on(date).await {
            Ok(appointments) => appointments,
            Err(e) => {
                error!(error = %e, %date, "failed to fetch appointments for reminder calls");
                return RunSummary::default();
            }
        };
        info!(count = appointments.len(), %date, "found appointments for reminder calls");

        let mut summary = RunSummary {
            considered: appointments.len(),
            succeeded: 0,
        };
        for (idx, appointment) in appointments.iter().enumerate() {
            if idx > 0 {
                debug!(pacing_secs = self.pacing.as_secs(), "pausing before next reminder call");
                tokio::time::sleep(self.pacing).await;
            }
            if self.orchestrator.handle_outbound_reminder(appointment).await {
                summary.succeeded += 1;
            }
        }
        info!(
            considered = summary.considered,
            succeeded = summary.succeeded,
            "outbound reminder run finished"
        );
        summary
    }

    /// Start both trigger loops.  Campaigns already under way cannot be cancelled short of
    /// stopping the process.
    pub fn spawn(self: Arc<Self>) -> (JoinHandle<()>, JoinHandle<()>) {
        let email = tokio::spawn(self.clone().email_loop());
        let outbound = tokio::spawn(self.outbound_loop());
        (email, outbound)
    }

    async fn email_loop(self: Arc<Self>) {
        let clock = LoopClock::start();
        let mut last_fired = None;
        loop {
            let Some(next) = self.email_trigger.next_after(&clock.search_from(last_fired)) else {
                error!(cron = %self.email_trigger, "email reminder trigger never fires");
                return;
            };
            info!(cron = %self.email_trigger, next = %next, "email reminders scheduled");
            clock.sleep_until(&next).await;
            last_fired = Some(next);
            self.run_email_reminders(next.date_naive()).await;
        }
    }

    async fn outbound_loop(self: Arc<Self>) {
        let clock = LoopClock::start();
        let mut settings_rx = self.settings.subscribe();
        let mut last_fired = None;
        loop {
            let trigger = CronSpec::daily(self.settings.current().outbound_call_time);
            let Some(next) = trigger.next_after(&clock.search_from(last_fired)) else {
                error!(cron = %trigger, "outbound call trigger never fires");
                return;
            };
            info!(cron = %trigger, next = %next, "outbound reminder calls scheduled");
            tokio::select! {
                _ = clock.sleep_until(&next) => {
                    last_fired = Some(next);
                    self.run_outbound_calls(next).await;
                }
                changed = settings_rx.changed() => {
                    if changed.is_err() {
                        warn!("settings channel closed; outbound reminder calls stopped");
                        return;
                    }
                    debug!("settings changed; re-arming outbound trigger");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{appointment, Fakes, RecordingMailer, StaticScheduling, CLINIC_NUMBER};
    use crate::types::{Attendee, CallTime, Settings};
    use crate::log_sink::LogStream;
    use chrono::{FixedOffset, Timelike};

    const PACING: Duration = Duration::from_secs(60);

    fn scheduler(
        fakes: &Fakes,
        scheduling: Arc<StaticScheduling>,
        mailer: Arc<RecordingMailer>,
    ) -> ReminderScheduler {
        scheduler_with_trigger(fakes, scheduling, mailer, CronSpec::parse("0 7 * * *").unwrap())
    }

    fn scheduler_with_trigger(
        fakes: &Fakes,
        scheduling: Arc<StaticScheduling>,
        mailer: Arc<RecordingMailer>,
        email_trigger: CronSpec,
    ) -> ReminderScheduler {
        let settings = SettingsHandle::new(Settings::new(24, CallTime { hour: 9, minute: 0 }).unwrap());
        ReminderScheduler::new(
            scheduling,
            mailer,
            Arc::new(fakes.orchestrator()),
            fakes.publisher(),
            settings,
            CLINIC_NUMBER.to_string(),
            PACING,
            email_trigger,
        )
    }

    /// Time of day `hours` from `wall`, to the minute.
    fn call_time_in(wall: DateTime<Local>, hours: i64) -> CallTime {
        let at = wall + chrono::Duration::hours(hours);
        CallTime {
            hour: at.hour(),
            minute: at.minute(),
        }
    }

    fn email_events(fakes: &Fakes) -> Vec<EmailReminderData> {
        fakes
            .workflow
            .events()
            .into_iter()
            .filter_map(|e| match e {
                WorkflowEvent::EmailReminderSent(data) => Some(data),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn target_date_adds_lead_hours() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2026, 10, 16, 23, 30, 0).unwrap();
        assert_eq!(
            reminder_target_date(&now, 24),
            NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
        );
        assert_eq!(
            reminder_target_date(&now, 1),
            NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
        );
        assert_eq!(
            reminder_target_date(&now, 48),
            NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
        );
    }

    #[tokio::test]
    async fn empty_day_sends_nothing() {
        let fakes = Fakes::new();
        let mailer = Arc::new(RecordingMailer::default());
        let sched = scheduler(&fakes, Arc::new(StaticScheduling::new(vec![])), mailer.clone());
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();

        let summary = sched.run_email_reminders(today).await;
        assert_eq!(summary, RunSummary::default());
        assert!(fakes.workflow.events().is_empty());
        assert!(mailer.sent().is_empty());
        assert!(fakes.event_log.email_logs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn email_failures_are_isolated_per_appointment() {
        let fakes = Fakes::new();
        let mut no_email = appointment("C", Some("+1555"));
        no_email.attendees = vec![Attendee {
            name: "No Mail".to_string(),
            email: None,
            phone: None,
        }];
        let listing = vec![appointment("A", None), appointment("B", None), no_email];
        let mailer = Arc::new(RecordingMailer::rejecting(&["A@example.com"]));
        let sched = scheduler(&fakes, Arc::new(StaticScheduling::new(listing)), mailer.clone());

        let summary = sched
            .run_email_reminders(NaiveDate::from_ymd_opt(2026, 10, 16).unwrap())
            .await;
        assert_eq!(summary, RunSummary { considered: 3, succeeded: 1 });
        assert_eq!(mailer.sent().len(), 1);
        assert_eq!(mailer.sent()[0].to, "B@example.com");

        let events = email_events(&fakes);
        assert_eq!(events.len(), 3);
        let outcomes: Vec<(&str, bool)> = events
            .iter()
            .map(|e| (e.appointment_id.as_str(), e.success))
            .collect();
        assert_eq!(outcomes, vec![("A", false), ("B", true), ("C", false)]);
        assert_eq!(fakes.event_log.read(LogStream::Emails).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn scheduling_outage_is_a_quiet_no_op() {
        let fakes = Fakes::new();
        let sched = scheduler(
            &fakes,
            Arc::new(StaticScheduling::failing()),
            Arc::new(RecordingMailer::default()),
        );
        let summary = sched
            .run_email_reminders(NaiveDate::from_ymd_opt(2026, 10, 16).unwrap())
            .await;
        assert_eq!(summary.considered, 0);
        assert!(fakes.workflow.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_calls_are_sequential_and_paced() {
        let fakes = Fakes::new();
        let listing = vec![
            appointment("A", Some("+15550000001")),
            appointment("B", Some("+15550000002")),
            appointment("C", Some("+15550000003")),
        ];
        let scheduling = Arc::new(StaticScheduling::new(listing));
        let sched = scheduler(&fakes, scheduling.clone(), Arc::new(RecordingMailer::default()));
        let now = Local.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();

        let started = tokio::time::Instant::now();
        let summary = sched.run_outbound_calls(now).await;
        assert_eq!(summary, RunSummary { considered: 3, succeeded: 3 });
        assert_eq!(scheduling.dates(), vec![NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()]);

        let starts = fakes.voice.started_at();
        assert_eq!(starts.len(), 3);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= PACING);
        }
        assert!(started.elapsed() >= PACING * 2);

        let to: Vec<String> = fakes.telephony.requests().into_iter().map(|r| r.to).collect();
        assert_eq!(to, vec!["+15550000001", "+15550000002", "+15550000003"]);
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_holds_when_attempts_fail() {
        let fakes = Fakes::new().with_failing_voice();
        let listing = vec![
            appointment("A", Some("+15550000001")),
            appointment("B", Some("+15550000002")),
            appointment("C", Some("+15550000003")),
            appointment("D", Some("+15550000004")),
        ];
        let sched = scheduler(
            &fakes,
            Arc::new(StaticScheduling::new(listing)),
            Arc::new(RecordingMailer::default()),
        );
        let now = Local.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();

        let summary = sched.run_outbound_calls(now).await;
        assert_eq!(summary, RunSummary { considered: 4, succeeded: 0 });
        let starts = fakes.voice.started_at();
        assert_eq!(starts.len(), 4);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= PACING);
        }
        assert!(fakes.telephony.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_appointments_still_count_as_attempts() {
        let fakes = Fakes::new();
        let listing = vec![
            appointment("A", Some("+15550000001")),
            appointment("B", None),
            appointment("C", Some("+15550000003")),
        ];
        let sched = scheduler(
            &fakes,
            Arc::new(StaticScheduling::new(listing)),
            Arc::new(RecordingMailer::default()),
        );
        let now = Local.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();

        let started = tokio::time::Instant::now();
        let summary = sched.run_outbound_calls(now).await;
        assert_eq!(summary, RunSummary { considered: 3, succeeded: 2 });
        let starts = fakes.voice.started_at();
        assert_eq!(starts.len(), 2);
        assert!(starts[1] - starts[0] >= PACING * 2);
        assert!(started.elapsed() >= PACING * 2);
    }

    #[tokio::test]
    async fn outbound_uses_current_lead_time() {
        let fakes = Fakes::new();
        let scheduling = Arc::new(StaticScheduling::new(vec![]));
        let sched = scheduler(&fakes, scheduling.clone(), Arc::new(RecordingMailer::default()));
        sched.settings.update(|s| s.reminder_hours_before = 72);

        let now = Local.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
        let summary = sched.run_outbound_calls(now).await;
        assert_eq!(summary.considered, 0);
        assert_eq!(scheduling.dates(), vec![NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()]);
    }

    #[test]
    fn loop_clock_never_searches_before_last_firing() {
        let wall = Local.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap();
        let clock = LoopClock {
            wall,
            start: Instant::now(),
        };
        assert_eq!(clock.search_from(None), wall);

        // Wall time reads earlier than the firing that just happened.
        let fired = Local.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
        assert_eq!(clock.search_from(Some(fired)), fired);
        let next = CronSpec::daily(CallTime { hour: 9, minute: 0 })
            .next_after(&clock.search_from(Some(fired)))
            .unwrap();
        assert_eq!(next.date_naive(), NaiveDate::from_ymd_opt(2026, 10, 17).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_trigger_rearms_when_call_time_changes() {
        let fakes = Fakes::new();
        let sched = Arc::new(scheduler(
            &fakes,
            Arc::new(StaticScheduling::new(vec![appointment("A", Some("+15550000001"))])),
            Arc::new(RecordingMailer::default()),
        ));
        let wall = Local::now();
        sched.settings.update(|s| s.outbound_call_time = call_time_in(wall, 3));

        let started = Instant::now();
        let outbound = tokio::spawn(sched.clone().outbound_loop());
        tokio::task::yield_now().await;
        sched.settings.update(|s| s.outbound_call_time = call_time_in(wall, 1));

        tokio::time::sleep(Duration::from_secs(90 * 60)).await;
        let starts = fakes.voice.started_at();
        assert_eq!(starts.len(), 1);
        let fired_after = starts[0] - started;
        assert!(fired_after > Duration::from_secs(58 * 60));
        assert!(fired_after <= Duration::from_secs(60 * 60));

        // The original three-hour mark passes without a second run.
        tokio::time::sleep(Duration::from_secs(3 * 3600)).await;
        assert_eq!(fakes.voice.started_at().len(), 1);
        outbound.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn email_trigger_fires_once_per_day() {
        let fakes = Fakes::new();
        let scheduling = Arc::new(StaticScheduling::new(vec![]));
        let wall = Local::now();
        let at = call_time_in(wall, 1);
        let sched = Arc::new(scheduler_with_trigger(
            &fakes,
            scheduling.clone(),
            Arc::new(RecordingMailer::default()),
            CronSpec::daily(at),
        ));

        let email = tokio::spawn(sched.clone().email_loop());
        tokio::time::sleep(Duration::from_secs(90 * 60)).await;
        let first_day = (wall + chrono::Duration::hours(1)).date_naive();
        assert_eq!(scheduling.dates(), vec![first_day]);

        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        assert_eq!(
            scheduling.dates(),
            vec![first_day, first_day.succ_opt().unwrap()]
        );
        email.abort();
    }
}
