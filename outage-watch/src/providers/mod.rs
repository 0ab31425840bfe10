//! Provider polling: one [`ProviderPoller`] per configured source.

pub mod failures;
pub mod poller;

pub use failures::{FailureAction, FailureTracker};
pub use poller::{PollContext, PollerState, ProviderPoller};
