//! Hardware session notifications and the bus that delivers them
//!
//! The platform raises interruption, route-change and service-reset
//! notifications asynchronously. They are published as [`SessionEvent`]s onto
//! an [`EventBus`] and drained by the controller on its own control path.

use crossbeam::channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Why the hardware route changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteChangeReason {
    Unknown,
    NewDeviceAvailable,
    OldDeviceUnavailable,
    CategoryChange,
    Override,
    WakeFromSleep,
    NoSuitableRouteForCategory,
    RouteConfigurationChange,
}

impl RouteChangeReason {
    /// Reasons that can alter the channel layout seen by the controller
    pub fn affects_channels(self) -> bool {
        matches!(
            self,
            RouteChangeReason::NewDeviceAvailable
                | RouteChangeReason::OldDeviceUnavailable
                | RouteChangeReason::Override
        )
    }
}

/// Notification delivered by the hardware session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    InterruptionBegan,
    InterruptionEnded {
        /// System hint that playback may resume
        should_resume: bool,
    },
    RouteChanged {
        reason: RouteChangeReason,
    },
    MediaServicesReset,
}

/// What to do when an interruption ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumePolicy {
    /// Resume regardless of the system hint
    #[default]
    Always,
    /// Resume only when the system says playback may resume
    RespectHint,
}

impl ResumePolicy {
    pub fn should_resume(self, hint: bool) -> bool {
        match self {
            ResumePolicy::Always => true,
            ResumePolicy::RespectHint => hint,
        }
    }
}

struct Subscriber {
    id: u64,
    sender: Sender<SessionEvent>,
}

#[derive(Default)]
struct BusState {
    next_id: u64,
    subscriber: Option<Subscriber>,
}

/// Single-subscriber publish point for session events
///
/// Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct EventBus {
    state: Arc<Mutex<BusState>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the subscriber, replacing any previous one
    pub fn subscribe(&self) -> EventSubscription {
        let (sender, receiver) = unbounded();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.next_id += 1;
        let id = state.next_id;
        if state.subscriber.replace(Subscriber { id, sender }).is_some() {
            debug!("Replacing existing session event subscriber");
        }
        EventSubscription {
            id,
            receiver,
            bus: self.clone(),
        }
    }

    /// Deliver `event` to the subscriber; returns false if nobody listens
    pub fn publish(&self, event: SessionEvent) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match &state.subscriber {
            Some(subscriber) => subscriber.sender.send(event).is_ok(),
            None => {
                debug!(?event, "Dropping session event without subscriber");
                false
            }
        }
    }

    pub fn has_subscriber(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .subscriber
            .is_some()
    }

    fn unsubscribe(&self, id: u64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.subscriber.as_ref().map(|s| s.id) == Some(id) {
            state.subscriber = None;
            debug!("Session event subscriber removed");
        }
    }
}

/// Receiving end of an [`EventBus`]; unsubscribes when dropped
pub struct EventSubscription {
    id: u64,
    receiver: Receiver<SessionEvent>,
    bus: EventBus,
}

impl EventSubscription {
    pub fn try_recv(&self) -> Option<SessionEvent> {
        self.receiver.try_recv().ok()
    }

    /// Channel handle for use in `select!` loops
    pub fn receiver(&self) -> &Receiver<SessionEvent> {
        &self.receiver
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}
