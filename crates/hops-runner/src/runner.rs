//! Sequence runner
//!
//! For each notify message the runner reads the sequence's bundle, resolves
//! the automations the sequence is pinned to and decides what to publish:
//! call requests for calls that are ready and have not been dispatched, and
//! a `done` result for `on` blocks that have finished. Publishing is
//! idempotent per subject, so handling the same message twice publishes
//! nothing new.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use hops_broker::{Client, ConsumerConfig, SequenceError, SequenceHandler};
use hops_core::{notify_filter, request_subject, Channel, MessageBundle, DONE_MESSAGE_ID};
use hops_dsl::{eval_bool, eval_done, eval_inputs, Automations, Diagnostics, DoneOutcome, EvaluationCtx, OnAst};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::error::{RunnerError, RunnerResult};
use crate::loader::AutomationsLoader;

/// Durable consumer the runner reads notify messages from
pub const RUNNER_CONSUMER: &str = "runner";

/// Deliveries of one message before it is given up on
pub const RUNNER_MAX_DELIVER: u32 = 5;

/// Error carried by the result of an `on` that finished as errored
pub const PIPELINE_ERRORED: &str = "Pipeline errored";

/// One publish decided for a sequence
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Request a call from a worker
    Call {
        slug: String,
        subject: String,
        inputs: Vec<u8>,
    },
    /// Mark an `on` block as finished
    Done { on: String, outcome: DoneOutcome },
}

/// Dispatches calls for sequences as their messages arrive
pub struct Runner {
    loader: Arc<AutomationsLoader>,
    client: Client,
}

impl Runner {
    pub fn new(loader: Arc<AutomationsLoader>, client: Client) -> Self {
        Self { loader, client }
    }

    pub fn loader(&self) -> &Arc<AutomationsLoader> {
        &self.loader
    }

    /// Consumer over every notify message of `account_id`
    pub fn consumer_config(account_id: &str) -> ConsumerConfig {
        ConsumerConfig {
            name: RUNNER_CONSUMER.to_string(),
            filter: notify_filter(account_id),
            max_deliver: RUNNER_MAX_DELIVER,
        }
    }

    /// Handle notify messages until `shutdown` fires
    pub async fn run(self: Arc<Self>, shutdown: broadcast::Receiver<()>, grace: Duration) -> RunnerResult<()> {
        let client = self.client.clone();
        let consumer = client
            .jetstream()
            .consumer(Self::consumer_config(client.account_id()))
            .await?;

        info!(account_id = %client.account_id(), "Runner started");
        client.consume_sequences(consumer, self, shutdown, grace).await?;
        info!("Runner stopped");
        Ok(())
    }

    /// Publish whatever `bundle` makes ready; returns whether any `on` matched
    pub async fn handle_sequence(&self, sequence_id: &str, bundle: MessageBundle) -> RunnerResult<bool> {
        let automations = self.loader.get_for_sequence(sequence_id, &bundle).await?;
        let Some(dispatches) = plan(self.client.account_id(), sequence_id, &bundle, &automations)? else {
            debug!(sequence_id, "No matching on blocks");
            return Ok(false);
        };

        self.dispatch(sequence_id, dispatches).await?;
        Ok(true)
    }

    async fn dispatch(&self, sequence_id: &str, dispatches: Vec<Dispatch>) -> RunnerResult<()> {
        let publishes = dispatches.into_iter().map(|dispatch| async move {
            match dispatch {
                Dispatch::Call { slug, subject, inputs } => {
                    let sent = self.client.publish(inputs, &subject).await?;
                    if sent {
                        info!(sequence_id, call = %slug, "Dispatched call");
                    }
                    Ok::<_, RunnerError>(())
                }
                Dispatch::Done { on, outcome } => {
                    let error = (outcome == DoneOutcome::Errored).then(|| PIPELINE_ERRORED.to_string());
                    let completed = outcome == DoneOutcome::Completed;
                    let sent = self
                        .client
                        .publish_result(
                            Utc::now(),
                            Some(Value::Bool(completed)),
                            error,
                            Channel::Notify,
                            &[sequence_id, &on, DONE_MESSAGE_ID],
                        )
                        .await?;
                    if sent {
                        info!(sequence_id, on = %on, ?outcome, "On block done");
                    }
                    Ok(())
                }
            }
        });

        // Every publish is attempted before the first failure is reported
        join_all(publishes).await.into_iter().collect()
    }
}

#[async_trait]
impl SequenceHandler for Runner {
    async fn sequence_callback(
        &self,
        sequence_id: &str,
        bundle: MessageBundle,
    ) -> Result<bool, SequenceError> {
        self.handle_sequence(sequence_id, bundle)
            .await
            .map_err(SequenceError::from)
    }
}

/// Decide the publishes for `bundle`
///
/// Returns `None` when no `on` block matches the bundle's event.
pub fn plan(
    account_id: &str,
    sequence_id: &str,
    bundle: &MessageBundle,
    automations: &Automations,
) -> RunnerResult<Option<Vec<Dispatch>>> {
    let ctx = EvaluationCtx::from_bundle(bundle, automations.files.clone());
    let name = ctx
        .event_name()
        .map_err(|e| RunnerError::EventFatal(e.to_string()))?;

    let (ons, diagnostics) = ctx.matching_ons(automations, &name);
    log_diagnostics(automations, sequence_id, &diagnostics);
    if ons.is_empty() {
        return Ok(None);
    }

    let mut dispatches = Vec::new();
    for on in ons {
        dispatches.extend(plan_on(account_id, sequence_id, bundle, &ctx, on, automations));
    }
    Ok(Some(dispatches))
}

fn plan_on(
    account_id: &str,
    sequence_id: &str,
    bundle: &MessageBundle,
    ctx: &EvaluationCtx,
    on: &OnAst,
    automations: &Automations,
) -> Vec<Dispatch> {
    let scope = ctx.on_scoped(on);

    let (outcome, diagnostics) = eval_done(&on.dones, &scope);
    log_diagnostics(automations, sequence_id, &diagnostics);
    if outcome.is_done() {
        return vec![Dispatch::Done {
            on: on.slug.clone(),
            outcome,
        }];
    }

    let mut dispatches = Vec::new();
    let mut all_resolved = !on.calls.is_empty();
    for call in &on.calls {
        if bundle.contains_key(&call.slug) {
            continue;
        }
        all_resolved = false;

        match eval_bool(call.if_expr.as_ref(), true, &scope) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                debug!(sequence_id, call = %call.slug, "Skipping call, condition not met: {}", e);
                continue;
            }
        }

        match eval_inputs(call.inputs_expr.as_ref(), &scope) {
            Ok(inputs) => dispatches.push(Dispatch::Call {
                slug: call.slug.clone(),
                subject: request_subject(account_id, sequence_id, &call.slug, &call.app, &call.handler),
                inputs,
            }),
            Err(e) => {
                let automation = automations
                    .manifest_for(&on.file_path)
                    .map(|m| m.name.as_str())
                    .unwrap_or_default();
                warn!(sequence_id, automation, call = %call.slug, "Invalid call inputs: {}", e);
            }
        }
    }

    if all_resolved {
        dispatches.push(Dispatch::Done {
            on: on.slug.clone(),
            outcome: DoneOutcome::Completed,
        });
    }
    dispatches
}

fn log_diagnostics(automations: &Automations, sequence_id: &str, diagnostics: &Diagnostics) {
    for diag in diagnostics {
        let manifest = diag.file.as_deref().and_then(|f| automations.manifest_for(f));
        match manifest {
            Some(manifest) => error!(sequence_id, automation = %manifest.name, "{}", diag),
            None => error!(sequence_id, "{}", diag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hops_dsl::AutomationFile;
    use serde_json::json;

    fn automations(source: &str) -> Automations {
        let (automations, diagnostics) =
            Automations::from_files(vec![AutomationFile::new("one/main.hops", source.as_bytes().to_vec())]);
        assert!(!diagnostics.has_errors(), "{}", diagnostics);
        automations
    }

    fn bundle(entries: &[(&str, Value)]) -> MessageBundle {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::to_vec(v).unwrap()))
            .collect()
    }

    fn event(name: &str) -> (&'static str, Value) {
        ("event", json!({"hops": {"source": "test", "event": name}}))
    }

    #[test]
    fn test_plan_dispatches_ready_calls() {
        let a = automations(r#"on change { call app_handler { inputs = { a = "b" } } }"#);
        let plan = plan("acct", "seq", &bundle(&[event("change")]), &a).unwrap().unwrap();
        assert_eq!(
            plan,
            vec![Dispatch::Call {
                slug: "change-app_handler".to_string(),
                subject: "acct.request.seq.change-app_handler.app.handler".to_string(),
                inputs: br#"{"a":"b"}"#.to_vec(),
            }]
        );
    }

    #[test]
    fn test_unmatched_event_is_not_handled() {
        let a = automations("on change {}");
        assert!(plan("acct", "seq", &bundle(&[event("other")]), &a).unwrap().is_none());

        let a = automations("on change { if = false }");
        assert!(plan("acct", "seq", &bundle(&[event("change")]), &a).unwrap().is_none());
    }

    #[test]
    fn test_missing_event_name_is_fatal() {
        let a = automations("on change {}");
        let result = plan("acct", "seq", &bundle(&[("event", json!({"x": 1}))]), &a);
        assert!(matches!(result, Err(RunnerError::EventFatal(_))));
    }

    #[test]
    fn test_resolved_calls_complete_the_on() {
        let a = automations("on change { call first {} }");
        let b = bundle(&[event("change"), ("change-first", json!({"completed": true}))]);
        assert_eq!(
            plan("acct", "seq", &b, &a).unwrap().unwrap(),
            vec![Dispatch::Done {
                on: "change".to_string(),
                outcome: DoneOutcome::Completed,
            }]
        );
    }

    #[test]
    fn test_on_without_calls_is_never_implicitly_done() {
        let a = automations("on change {}");
        assert!(plan("acct", "seq", &bundle(&[event("change")]), &a).unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_explicit_done_stops_dispatch() {
        let a = automations(
            r#"on change {
              call first {}
              call second { if = first.completed }
              done { errored = try(first.errored, false) }
            }"#,
        );
        let b = bundle(&[
            event("change"),
            ("change-first", json!({"completed": false, "errored": true})),
        ]);
        assert_eq!(
            plan("acct", "seq", &b, &a).unwrap().unwrap(),
            vec![Dispatch::Done {
                on: "change".to_string(),
                outcome: DoneOutcome::Errored,
            }]
        );
    }

    #[test]
    fn test_call_waits_for_condition() {
        let a = automations("on change {\n call first {}\n call second { if = first.completed }\n}");

        let first = plan("acct", "seq", &bundle(&[event("change")]), &a).unwrap().unwrap();
        assert_eq!(first.len(), 1);
        assert!(matches!(&first[0], Dispatch::Call { slug, .. } if slug == "change-first"));

        let b = bundle(&[event("change"), ("change-first", json!({"completed": true}))]);
        let second = plan("acct", "seq", &b, &a).unwrap().unwrap();
        assert_eq!(second.len(), 1);
        assert!(matches!(&second[0], Dispatch::Call { slug, .. } if slug == "change-second"));
    }

    #[test]
    fn test_action_ons_run_before_event_ons() {
        let a = automations("on push { call generic {} }\non push_main { call specific {} }");
        let b = bundle(&[(
            "event",
            json!({"hops": {"source": "git", "event": "push", "action": "main"}}),
        )]);
        let slugs: Vec<String> = plan("acct", "seq", &b, &a)
            .unwrap()
            .unwrap()
            .into_iter()
            .filter_map(|d| match d {
                Dispatch::Call { slug, .. } => Some(slug),
                Dispatch::Done { .. } => None,
            })
            .collect();
        assert_eq!(slugs, vec!["push_main-specific", "push-generic"]);
    }
}
