//! Schedule change pipeline: per-date serialization, diffing, gating and
//! message rendering.

pub mod gate;
pub mod intents;
pub mod keyed_lock;
pub mod message;
pub mod orchestrator;

pub use gate::{GateDecision, NotificationGate};
pub use intents::{IntentBroadcaster, ScheduleIntent};
pub use keyed_lock::{KeyedGuard, KeyedLock};
pub use orchestrator::{Outcome, ScheduleOrchestrator, SuppressReason};
