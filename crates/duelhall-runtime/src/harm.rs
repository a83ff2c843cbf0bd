//! Harm-event stream contract and an in-process bus implementing it.
//!
//! The host reports damage to a participant as a [`HarmEvent`] and receives a
//! [`HarmVerdict`]: `Suppress` means the damage must not be applied.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use duelhall_core::{ParticipantId, SubscriptionId};
use serde::{Deserialize, Serialize};

use crate::lock;

/// A participant is about to take damage.
#[derive(Debug, Clone, PartialEq)]
pub struct HarmEvent {
    pub target: ParticipantId,
    /// Damage about to be applied.
    pub magnitude: f64,
    /// Target's vitality before the damage.
    pub vitality: f64,
}

impl HarmEvent {
    pub fn new(target: impl Into<ParticipantId>, magnitude: f64, vitality: f64) -> Self {
        Self {
            target: target.into(),
            magnitude,
            vitality,
        }
    }

    /// Vitality left if the damage goes through.
    pub fn remaining(&self) -> f64 {
        self.vitality - self.magnitude
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarmVerdict {
    /// Apply the damage normally.
    PassThrough,
    /// Cancel the damage.
    Suppress,
}

/// Receives harm events for the participants it subscribed to.
pub trait HarmHandler: Send + Sync {
    fn on_harm(&self, event: &HarmEvent) -> HarmVerdict;
}

/// Per-participant harm subscriptions.
pub trait HarmEventStream: Send + Sync {
    /// Deliver events targeting either participant to `handler`.
    fn subscribe(
        &self,
        participants: [ParticipantId; 2],
        handler: Arc<dyn HarmHandler>,
    ) -> SubscriptionId;

    /// Returns `false` if the subscription was already gone.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

// ─── In-process bus ──────────────────────────────────────────────────

struct Subscriber {
    participants: [ParticipantId; 2],
    handler: Arc<dyn HarmHandler>,
}

#[derive(Default)]
struct BusState {
    next_id: u64,
    subscribers: BTreeMap<SubscriptionId, Subscriber>,
}

/// Fan-out dispatcher for harm events.
///
/// Handlers run without the bus lock held, so they may unsubscribe
/// themselves (or others) from inside `on_harm`.
#[derive(Default)]
pub struct HarmBus {
    state: Mutex<BusState>,
}

impl HarmBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every handler subscribed to its target, in
    /// subscription order. Suppressed if any handler suppresses it.
    pub fn dispatch(&self, event: &HarmEvent) -> HarmVerdict {
        let handlers: Vec<Arc<dyn HarmHandler>> = lock(&self.state)
            .subscribers
            .values()
            .filter(|s| s.participants.contains(&event.target))
            .map(|s| Arc::clone(&s.handler))
            .collect();

        let mut verdict = HarmVerdict::PassThrough;
        for handler in handlers {
            if handler.on_harm(event) == HarmVerdict::Suppress {
                verdict = HarmVerdict::Suppress;
            }
        }
        verdict
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.state).subscribers.len()
    }
}

impl std::fmt::Debug for HarmBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarmBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl HarmEventStream for HarmBus {
    fn subscribe(
        &self,
        participants: [ParticipantId; 2],
        handler: Arc<dyn HarmHandler>,
    ) -> SubscriptionId {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        state.subscribers.insert(
            id,
            Subscriber {
                participants,
                handler,
            },
        );
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.state).subscribers.remove(&id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        hits: AtomicUsize,
        verdict: HarmVerdict,
    }

    impl HarmHandler for Counter {
        fn on_harm(&self, _event: &HarmEvent) -> HarmVerdict {
            self.hits.fetch_add(1, Ordering::SeqCst);
            self.verdict
        }
    }

    fn counter(verdict: HarmVerdict) -> Arc<Counter> {
        Arc::new(Counter {
            hits: AtomicUsize::new(0),
            verdict,
        })
    }

    fn pair(a: &str, b: &str) -> [ParticipantId; 2] {
        [ParticipantId::new(a), ParticipantId::new(b)]
    }

    #[test]
    fn dispatch_reaches_only_subscribed_targets() {
        let bus = HarmBus::new();
        let h = counter(HarmVerdict::PassThrough);
        bus.subscribe(pair("rhea", "cato"), h.clone());

        assert_eq!(
            bus.dispatch(&HarmEvent::new("ivo", 5.0, 20.0)),
            HarmVerdict::PassThrough
        );
        assert_eq!(h.hits.load(Ordering::SeqCst), 0);

        bus.dispatch(&HarmEvent::new("cato", 5.0, 20.0));
        assert_eq!(h.hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn any_suppression_wins() {
        let bus = HarmBus::new();
        bus.subscribe(pair("rhea", "cato"), counter(HarmVerdict::PassThrough));
        bus.subscribe(pair("rhea", "ivo"), counter(HarmVerdict::Suppress));
        assert_eq!(
            bus.dispatch(&HarmEvent::new("rhea", 1.0, 2.0)),
            HarmVerdict::Suppress
        );
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = HarmBus::new();
        let h = counter(HarmVerdict::Suppress);
        let id = bus.subscribe(pair("rhea", "cato"), h.clone());
        assert_eq!(bus.subscriber_count(), 1);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id), "second unsubscribe is a no-op");
        assert_eq!(
            bus.dispatch(&HarmEvent::new("rhea", 1.0, 2.0)),
            HarmVerdict::PassThrough
        );
        assert_eq!(h.hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handler_may_unsubscribe_itself() {
        struct SelfRemoving {
            bus: Arc<HarmBus>,
            id: Mutex<Option<SubscriptionId>>,
        }
        impl HarmHandler for SelfRemoving {
            fn on_harm(&self, _event: &HarmEvent) -> HarmVerdict {
                if let Some(id) = lock(&self.id).take() {
                    self.bus.unsubscribe(id);
                }
                HarmVerdict::Suppress
            }
        }

        let bus = Arc::new(HarmBus::new());
        let handler = Arc::new(SelfRemoving {
            bus: Arc::clone(&bus),
            id: Mutex::new(None),
        });
        let id = bus.subscribe(pair("rhea", "cato"), handler.clone());
        *lock(&handler.id) = Some(id);

        assert_eq!(
            bus.dispatch(&HarmEvent::new("rhea", 1.0, 2.0)),
            HarmVerdict::Suppress
        );
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn remaining_vitality() {
        assert_eq!(HarmEvent::new("rhea", 6.5, 20.0).remaining(), 13.5);
    }
}
