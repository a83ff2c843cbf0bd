//! Termination listener: ends an Active duel on the first lethal harm event.
//!
//! One listener per Active session, subscribed to harm events for its two
//! participants. The first event that would drop a participant below the
//! survival threshold wins a compare-and-swap on the `armed` latch; the
//! winner unsubscribes, then asks the resolver to resolve with the other
//! participant as victor, and the damage is suppressed. Every later event,
//! including one racing on another thread, finds the latch open and passes
//! through untouched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use duelhall_core::{ParticipantId, SessionId, SubscriptionId};

use crate::harm::{HarmEvent, HarmEventStream, HarmHandler, HarmVerdict};
use crate::lock;

/// Receives the single resolution request a listener makes.
pub trait SessionResolver: Send + Sync {
    fn resolve_session(&self, session: SessionId, winner: &ParticipantId);
}

pub struct TerminationListener {
    session: SessionId,
    participants: [ParticipantId; 2],
    survival_threshold: f64,
    armed: AtomicBool,
    /// Set once the stream has assigned an id; taken on disarm.
    subscription: Mutex<Option<SubscriptionId>>,
    stream: Arc<dyn HarmEventStream>,
    resolver: Weak<dyn SessionResolver>,
}

impl TerminationListener {
    pub fn new(
        session: SessionId,
        participants: [ParticipantId; 2],
        survival_threshold: f64,
        stream: Arc<dyn HarmEventStream>,
        resolver: Weak<dyn SessionResolver>,
    ) -> Self {
        Self {
            session,
            participants,
            survival_threshold,
            armed: AtomicBool::new(true),
            subscription: Mutex::new(None),
            stream,
            resolver,
        }
    }

    /// Subscribe to the harm stream. Call exactly once.
    pub fn install(self: &Arc<Self>) -> SubscriptionId {
        let handler: Arc<dyn HarmHandler> = Arc::clone(self) as Arc<dyn HarmHandler>;
        let id = self.stream.subscribe(self.participants.clone(), handler);
        self.attach(id);
        id
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Close the latch and drop the subscription.
    ///
    /// Returns `true` for the one caller that closed it; every later call is
    /// a no-op returning `false`.
    pub fn disarm(&self) -> bool {
        if self
            .armed
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let id = lock(&self.subscription).take();
        if let Some(id) = id {
            self.stream.unsubscribe(id);
        }
        true
    }

    /// `vitality - magnitude < survival_threshold`.
    pub fn is_lethal(&self, event: &HarmEvent) -> bool {
        event.remaining() < self.survival_threshold
    }

    fn attach(&self, id: SubscriptionId) {
        let mut slot = lock(&self.subscription);
        if self.is_armed() {
            *slot = Some(id);
        } else {
            // Disarmed before the id arrived: nothing will take it later.
            drop(slot);
            self.stream.unsubscribe(id);
        }
    }

    fn opponent_of(&self, participant: &ParticipantId) -> Option<&ParticipantId> {
        let [a, b] = &self.participants;
        if participant == a {
            Some(b)
        } else if participant == b {
            Some(a)
        } else {
            None
        }
    }
}

impl HarmHandler for TerminationListener {
    fn on_harm(&self, event: &HarmEvent) -> HarmVerdict {
        let Some(victor) = self.opponent_of(&event.target) else {
            return HarmVerdict::PassThrough;
        };
        if !self.is_armed() || !self.is_lethal(event) {
            return HarmVerdict::PassThrough;
        }
        // Unsubscribe before resolving, whatever resolve turns out to do.
        if !self.disarm() {
            tracing::debug!(
                session = %self.session,
                target = %event.target,
                "lethal harm after listener closed, passing through"
            );
            return HarmVerdict::PassThrough;
        }
        tracing::info!(
            session = %self.session,
            loser = %event.target,
            victor = %victor,
            magnitude = event.magnitude,
            vitality = event.vitality,
            "lethal harm intercepted"
        );
        match self.resolver.upgrade() {
            Some(resolver) => resolver.resolve_session(self.session, victor),
            None => tracing::warn!(session = %self.session, "resolver dropped before resolution"),
        }
        HarmVerdict::Suppress
    }
}

impl std::fmt::Debug for TerminationListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminationListener")
            .field("session", &self.session)
            .field("participants", &self.participants)
            .field("armed", &self.is_armed())
            .finish_non_exhaustive()
    }
}
