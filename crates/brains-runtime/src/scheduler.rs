//! Cron-driven run creation — §4.7 "Scheduler". A [`Scheduler`] holds a set
//! of registrations and a poll loop that, at each cron boundary an enabled
//! registration crosses, starts a new run of its brain through the
//! [`Supervisor`] and records whether that attempt succeeded.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Result, RuntimeError};
use crate::supervisor::Supervisor;

/// One cron registration: `{id, brainTitle, cronExpr, timezone, enabled}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRegistration {
    pub id: String,
    pub brain_title: String,
    pub cron_expression: String,
    pub timezone: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Outcome of one scheduler-triggered attempt to start a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerOutcome {
    Triggered,
    Failed,
}

/// A `triggered|failed` scheduled-run entry, keyed by the boundary it fired at.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledRunEntry {
    pub schedule_id: String,
    pub brain_title: String,
    pub fired_at: DateTime<Utc>,
    pub outcome: TriggerOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct Entry {
    registration: ScheduleRegistration,
    parsed: Schedule,
    tz: Tz,
    /// Last instant this registration was checked for due boundaries; the
    /// next poll only considers boundaries strictly after this.
    checked_through: DateTime<Utc>,
}

/// Registers and fires cron-driven runs. One `Scheduler` per process; the
/// supervisor it wraps is the same one the HTTP surface and webhook router use.
pub struct Scheduler {
    supervisor: Arc<Supervisor>,
    entries: Mutex<HashMap<String, Entry>>,
    history: Mutex<Vec<ScheduledRunEntry>>,
    default_timezone: Mutex<String>,
}

impl Scheduler {
    pub fn new(supervisor: Arc<Supervisor>) -> Arc<Self> {
        Arc::new(Self {
            supervisor,
            entries: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            default_timezone: Mutex::new("UTC".to_string()),
        })
    }

    pub fn default_timezone(&self) -> String {
        self.default_timezone.lock().unwrap().clone()
    }

    pub fn set_default_timezone(&self, timezone: &str) -> Result<()> {
        let _: Tz = timezone.parse().map_err(|_| RuntimeError::InvalidTimezone(timezone.to_string()))?;
        *self.default_timezone.lock().unwrap() = timezone.to_string();
        Ok(())
    }

    /// `POST /brains/schedules`: parse and validate the cron expression and
    /// timezone up front so a malformed registration never reaches the poll loop.
    pub fn register(
        &self,
        brain_title: impl Into<String>,
        cron_expression: impl Into<String>,
        timezone: Option<String>,
    ) -> Result<ScheduleRegistration> {
        let brain_title = brain_title.into();
        let cron_expression = cron_expression.into();
        let timezone = timezone.unwrap_or_else(|| self.default_timezone());

        let parsed = Schedule::from_str(&cron_expression)
            .map_err(|e| RuntimeError::InvalidCron(cron_expression.clone(), e.to_string()))?;
        let tz: Tz = timezone.parse().map_err(|_| RuntimeError::InvalidTimezone(timezone.clone()))?;

        let registration = ScheduleRegistration {
            id: uuid::Uuid::new_v4().to_string(),
            brain_title,
            cron_expression,
            timezone,
            enabled: true,
            created_at: Utc::now(),
        };
        self.entries.lock().unwrap().insert(
            registration.id.clone(),
            Entry { registration: registration.clone(), parsed, tz, checked_through: Utc::now() },
        );
        Ok(registration)
    }

    pub fn list(&self) -> Vec<ScheduleRegistration> {
        let mut out: Vec<_> = self.entries.lock().unwrap().values().map(|e| e.registration.clone()).collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }

    pub fn get(&self, id: &str) -> Result<ScheduleRegistration> {
        self.entries
            .lock()
            .unwrap()
            .get(id)
            .map(|e| e.registration.clone())
            .ok_or_else(|| RuntimeError::UnknownSchedule(id.to_string()))
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<ScheduleRegistration> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.get_mut(id).ok_or_else(|| RuntimeError::UnknownSchedule(id.to_string()))?;
        entry.registration.enabled = enabled;
        Ok(entry.registration.clone())
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::UnknownSchedule(id.to_string()))
    }

    pub fn history(&self) -> Vec<ScheduledRunEntry> {
        self.history.lock().unwrap().clone()
    }

    /// Check every enabled registration for cron boundaries crossed since it
    /// was last checked, and trigger a run for each one found. Called on a
    /// timer by [`Self::spawn_polling`], and directly by tests.
    pub async fn tick(self: &Arc<Self>, now: DateTime<Utc>) {
        let due: Vec<(String, String, DateTime<Utc>)> = {
            let mut entries = self.entries.lock().unwrap();
            let mut due = Vec::new();
            for entry in entries.values_mut() {
                if !entry.registration.enabled {
                    entry.checked_through = now;
                    continue;
                }
                let local_checked = entry.checked_through.with_timezone(&entry.tz);
                for boundary in entry.parsed.after(&local_checked) {
                    let boundary_utc = boundary.with_timezone(&Utc);
                    if boundary_utc > now {
                        break;
                    }
                    due.push((entry.registration.id.clone(), entry.registration.brain_title.clone(), boundary_utc));
                }
                entry.checked_through = now;
            }
            due
        };

        for (schedule_id, brain_title, fired_at) in due {
            let options = json!({ "scheduledAt": fired_at, "scheduleId": schedule_id });
            let record = self.supervisor.start_run(&brain_title, options, None).await;
            let entry = match record {
                Ok(record) => ScheduledRunEntry {
                    schedule_id,
                    brain_title,
                    fired_at,
                    outcome: TriggerOutcome::Triggered,
                    run_id: Some(record.run_id),
                    error: None,
                },
                Err(err) => ScheduledRunEntry {
                    schedule_id,
                    brain_title,
                    fired_at,
                    outcome: TriggerOutcome::Failed,
                    run_id: None,
                    error: Some(err.to_string()),
                },
            };
            self.history.lock().unwrap().push(entry);
        }
    }

    /// Start the background poll loop. The interval governs how close to a
    /// cron boundary a trigger actually fires; it does not need to subdivide
    /// evenly into any registration's schedule since `tick` catches up on
    /// every boundary crossed since the last poll, not just the most recent one.
    pub fn spawn_polling(self: &Arc<Self>, interval: Duration) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                scheduler.tick(Utc::now()).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BrainRegistry;
    use brains_checkpoint::InMemoryEventLog;
    use brains_core::{BrainBuilder, StepOutcome};
    use chrono::TimeZone;

    fn noop_brain(title: &str) -> Arc<brains_core::Brain> {
        Arc::new(
            BrainBuilder::new(title)
                .step("noop", |i| Box::pin(async move { Ok(StepOutcome::State(i.state)) }))
                .build()
                .unwrap(),
        )
    }

    fn test_supervisor(title: &str) -> Arc<Supervisor> {
        brains_core::graph::clear_title_registry();
        let mut registry = BrainRegistry::new();
        registry.register(noop_brain(title), "scheduled brain");
        let log = Arc::new(InMemoryEventLog::new());
        Supervisor::new(log, Arc::new(registry), None)
    }

    #[test]
    fn invalid_cron_expression_is_rejected_at_registration() {
        let scheduler = Scheduler::new(test_supervisor("sched-invalid"));
        let err = scheduler.register("sched-invalid", "not a cron expr", None).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidCron(_, _)));
    }

    #[test]
    fn invalid_timezone_is_rejected_at_registration() {
        let scheduler = Scheduler::new(test_supervisor("sched-tz"));
        let err = scheduler
            .register("sched-tz", "0 * * * * *", Some("Not/A_Zone".to_string()))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidTimezone(_)));
    }

    #[tokio::test]
    async fn tick_triggers_a_run_once_a_boundary_is_crossed() {
        let supervisor = test_supervisor("sched-tick");
        let scheduler = Scheduler::new(supervisor);
        let registration = scheduler.register("sched-tick", "* * * * * *", None).unwrap();

        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        scheduler.tick(now).await;
        let later = now + chrono::Duration::seconds(2);
        scheduler.tick(later).await;

        let history = scheduler.history();
        assert!(!history.is_empty());
        assert!(history.iter().all(|e| e.schedule_id == registration.id));
        assert!(history.iter().any(|e| e.outcome == TriggerOutcome::Triggered));
    }

    #[test]
    fn disabling_a_schedule_is_reflected_in_list() {
        let scheduler = Scheduler::new(test_supervisor("sched-disable"));
        let registration = scheduler.register("sched-disable", "0 0 * * * *", None).unwrap();
        scheduler.set_enabled(&registration.id, false).unwrap();
        let listed = scheduler.get(&registration.id).unwrap();
        assert!(!listed.enabled);
    }
}
