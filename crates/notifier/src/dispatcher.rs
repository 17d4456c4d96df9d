//! Side-effect dispatcher: fan-out of live events to external collaborators.
//!
//! Callbacks are keyed by [`EventKind`] and run fire-and-forget in their own
//! task. Errors and panics stop at the task boundary; reducers never see them.

use anyhow::Result;
use common::types::{Event, EventKind};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, warn};

type Effect = Arc<dyn Fn(Event) -> BoxFuture<'static, Result<()>> + Send + Sync>;

struct Registration {
    name: String,
    effect: Effect,
}

#[derive(Default)]
pub struct SideEffectDispatcher {
    registry: RwLock<HashMap<EventKind, Vec<Registration>>>,
}

impl SideEffectDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `effect` to run for every live event of `kind`.
    pub fn register<F, Fut>(&self, kind: EventKind, name: &str, effect: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let effect: Effect = Arc::new(move |event| effect(event).boxed());
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(Registration {
                name: name.to_string(),
                effect,
            });
        debug!(kind = %kind, effect = name, "registered side effect");
    }

    pub fn registered(&self, kind: EventKind) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Spawn every effect registered for the event's kind. Backlog replays
    /// (`fresh = false`) never trigger effects.
    ///
    /// Must be called from within a Tokio runtime. Returns the number of effects spawned.
    pub fn dispatch(&self, event: &Event, fresh: bool) -> usize {
        if !fresh {
            return 0;
        }

        let kind = event.kind();
        let targets: Vec<(String, Effect)> = {
            let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            let Some(registrations) = registry.get(&kind) else {
                return 0;
            };
            registrations
                .iter()
                .map(|r| (r.name.clone(), Arc::clone(&r.effect)))
                .collect()
        };

        for (name, effect) in &targets {
            let name = name.clone();
            let effect = Arc::clone(effect);
            let event = event.clone();
            let event_id = event.id();

            tokio::spawn(async move {
                let run = AssertUnwindSafe(async move { effect(event).await }).catch_unwind();
                match run.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(effect = %name, kind = %kind, event_id = %event_id, error = %e, "side effect failed");
                        metrics::counter!("notifier_side_effect_failures_total", "effect" => name)
                            .increment(1);
                    }
                    Err(_) => {
                        error!(effect = %name, kind = %kind, event_id = %event_id, "side effect panicked");
                        metrics::counter!("notifier_side_effect_failures_total", "effect" => name)
                            .increment(1);
                    }
                }
            });
        }

        targets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::{
        CausedBy, EventInner, EventLevel, InstanceEvent, InstanceEventInner, InstanceState,
        Snowflake,
    };
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn transition(id: u64) -> Event {
        Event {
            snowflake: Snowflake::new(id),
            level: EventLevel::Info,
            event_inner: EventInner::InstanceEvent(InstanceEvent {
                instance_uuid: "inst-1".to_string(),
                instance_name: "Survival".to_string(),
                instance_event_inner: InstanceEventInner::StateTransition {
                    to: InstanceState::Running,
                },
            }),
            details: String::new(),
            caused_by: CausedBy::System,
        }
    }

    fn recording(dispatcher: &SideEffectDispatcher, name: &str) -> mpsc::UnboundedReceiver<u64> {
        let (tx, rx) = mpsc::unbounded_channel();
        dispatcher.register(EventKind::InstanceStateTransition, name, move |event: Event| {
            let tx = tx.clone();
            async move {
                tx.send(event.id().as_u64())?;
                Ok(())
            }
        });
        rx
    }

    #[tokio::test]
    async fn test_dispatch_runs_registered_effect_for_fresh_events() {
        let dispatcher = SideEffectDispatcher::new();
        let mut rx = recording(&dispatcher, "recorder");

        assert_eq!(dispatcher.dispatch(&transition(5), true), 1);
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(got, Some(5));
    }

    #[tokio::test]
    async fn test_backlog_events_do_not_trigger_effects() {
        let dispatcher = SideEffectDispatcher::new();
        let mut rx = recording(&dispatcher, "recorder");

        assert_eq!(dispatcher.dispatch(&transition(5), false), 0);
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregistered_kind_dispatches_nothing() {
        let dispatcher = SideEffectDispatcher::new();
        let mut event = transition(1);
        event.event_inner = EventInner::Unknown;
        assert_eq!(dispatcher.dispatch(&event, true), 0);
    }

    #[tokio::test]
    async fn test_failing_and_panicking_effects_are_isolated() {
        let dispatcher = SideEffectDispatcher::new();
        dispatcher.register(
            EventKind::InstanceStateTransition,
            "failing",
            |_event: Event| async { Err::<(), _>(anyhow::anyhow!("cache unavailable")) },
        );
        dispatcher.register(
            EventKind::InstanceStateTransition,
            "panicking",
            |event: Event| async move {
                assert_eq!(event.id().as_u64(), 0, "effect bug");
                Ok(())
            },
        );
        let mut rx = recording(&dispatcher, "recorder");

        assert_eq!(dispatcher.registered(EventKind::InstanceStateTransition), 3);
        assert_eq!(dispatcher.dispatch(&transition(8), true), 3);

        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(got, Some(8));

        // The dispatcher stays usable after failures.
        dispatcher.dispatch(&transition(9), true);
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(got, Some(9));
    }
}
