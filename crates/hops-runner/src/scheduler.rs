//! Cron schedules that publish source events
//!
//! Every fire publishes `{hops: {source: "hiphops", event: "schedule",
//! action: <name>}, trigger_time, ...inputs}`. The sequence id is derived from
//! that payload, and `trigger_time` is the scheduled minute, so nodes firing
//! the same schedule for the same minute publish the same subject and only
//! one event survives.

use chrono::{DateTime, SecondsFormat, Utc};
use croner::Cron;
use hops_broker::Client;
use hops_core::{create_source_event, Channel, SourceMeta, HOPS_SOURCE, SOURCE_EVENT_ID};
use hops_dsl::{eval_inputs, parse_cron, Automations, ScheduleAst};
use hops_expression::EvalContext;
use serde_json::{Map, Value};
use std::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{RunnerError, RunnerResult};

/// Event name of scheduled source events
pub const SCHEDULE_EVENT: &str = "schedule";

struct Job {
    schedule: ScheduleAst,
    cron: Cron,
}

/// Runs the schedules of one automations set at a time
pub struct Scheduler<C: Clock = SystemClock> {
    client: Client,
    clock: C,
    running: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler<SystemClock> {
    pub fn new(client: Client) -> Self {
        Self::with_clock(client, SystemClock)
    }
}

impl<C: Clock> Scheduler<C> {
    pub fn with_clock(client: Client, clock: C) -> Self {
        Self {
            client,
            clock,
            running: Mutex::new(Vec::new()),
        }
    }

    /// Replace the running schedules with those of `automations`
    ///
    /// Fires pending under the previous schedules are dropped. Returns the
    /// number of schedules now running.
    pub fn start(&self, automations: &Automations) -> usize {
        let jobs: Vec<Job> = automations
            .schedules()
            .iter()
            .filter_map(|schedule| match parse_cron(&schedule.cron) {
                Ok(cron) => Some(Job {
                    schedule: schedule.clone(),
                    cron,
                }),
                Err(e) => {
                    warn!(schedule = %schedule.name, "Skipping schedule with invalid cron: {}", e);
                    None
                }
            })
            .collect();

        let handles: Vec<JoinHandle<()>> = jobs
            .into_iter()
            .map(|job| {
                let client = self.client.clone();
                let clock = self.clock.clone();
                tokio::spawn(run_job(job, client, clock))
            })
            .collect();
        let count = handles.len();

        let previous = {
            let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *running, handles)
        };
        for handle in previous {
            handle.abort();
        }

        info!(count, hash = %automations.hash, "Started schedules");
        count
    }

    /// Stop every running schedule
    pub fn stop(&self) {
        let previous = {
            let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *running)
        };
        for handle in previous {
            handle.abort();
        }
    }
}

impl<C: Clock> Drop for Scheduler<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_job<C: Clock>(job: Job, client: Client, clock: C) {
    let mut after = clock.now();
    loop {
        let next = match job.cron.find_next_occurrence(&after, false) {
            Ok(next) => next,
            Err(e) => {
                error!(schedule = %job.schedule.name, "Unable to find next fire time: {}", e);
                return;
            }
        };
        after = next;

        let wait = (next - clock.now()).to_std().unwrap_or_default();
        debug!(schedule = %job.schedule.name, next = %next, "Waiting for schedule");
        tokio::time::sleep(wait).await;

        info!(schedule = %job.schedule.name, "Triggering schedule");
        if let Err(e) = fire(&client, &job.schedule, next).await {
            error!(schedule = %job.schedule.name, "Unable to dispatch schedule event: {}", e);
        }
    }
}

/// Build the source event for one fire of `schedule`
pub fn schedule_event(schedule: &ScheduleAst, trigger_time: DateTime<Utc>) -> RunnerResult<(Vec<u8>, String)> {
    let inputs = eval_inputs(schedule.inputs_expr.as_ref(), &EvalContext::new())?;
    let mut payload: Map<String, Value> = if inputs.is_empty() {
        Map::new()
    } else {
        serde_json::from_slice(&inputs)
            .map_err(|e| RunnerError::EventFatal(format!("schedule inputs must be an object: {}", e)))?
    };
    payload.insert(
        "trigger_time".to_string(),
        Value::String(trigger_time.to_rfc3339_opts(SecondsFormat::Secs, true)),
    );

    create_source_event(
        payload,
        SourceMeta {
            source: HOPS_SOURCE.to_string(),
            event: SCHEDULE_EVENT.to_string(),
            action: schedule.name.clone(),
        },
    )
    .map_err(|e| RunnerError::EventFatal(e.to_string()))
}

/// Publish one fire of `schedule`; returns false when another node already did
pub async fn fire(client: &Client, schedule: &ScheduleAst, trigger_time: DateTime<Utc>) -> RunnerResult<bool> {
    let (data, sequence_id) = schedule_event(schedule, trigger_time)?;
    let sent = client
        .publish_to(data, Channel::Notify, &[&sequence_id, SOURCE_EVENT_ID])
        .await?;
    if sent {
        info!(schedule = %schedule.name, sequence_id = %sequence_id, "Dispatched schedule event");
    }
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn schedule(name: &str, inputs: Option<&str>) -> ScheduleAst {
        let inputs_expr = inputs.map(|src| {
            let body: hcl::Body = hcl::parse(&format!("inputs = {}", src)).unwrap();
            body.attributes().next().unwrap().expr().clone()
        });
        ScheduleAst {
            name: name.to_string(),
            cron: "@hourly".to_string(),
            inputs_expr,
            file_path: "one/main.hops".to_string(),
        }
    }

    #[test]
    fn test_schedule_event_shape() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let (data, sequence_id) = schedule_event(&schedule("nightly", Some("{ team = \"ops\" }")), at).unwrap();

        let event: Value = serde_json::from_slice(&data).unwrap();
        assert_eq!(event["hops"]["source"], "hiphops");
        assert_eq!(event["hops"]["event"], "schedule");
        assert_eq!(event["hops"]["action"], "nightly");
        assert_eq!(event["team"], "ops");
        assert_eq!(event["trigger_time"], "2024-05-01T12:00:00Z");

        let (_, again) = schedule_event(&schedule("nightly", Some("{ team = \"ops\" }")), at).unwrap();
        assert_eq!(sequence_id, again);
    }

    #[test]
    fn test_different_minutes_get_different_sequences() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let (_, first) = schedule_event(&schedule("nightly", None), at).unwrap();
        let (_, second) =
            schedule_event(&schedule("nightly", None), at + chrono::Duration::minutes(1)).unwrap();
        assert_ne!(first, second);
    }
}
